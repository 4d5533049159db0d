//! Compile-time evaluation of builtin operations on constants.
//!
//! Integer operations honour the declared width of their operand type:
//! results wrap modulo 2^W, signed operations sign-extend from W bits. Real
//! operations compute in f64 and round back to the operand width. Every
//! operation applies elementwise to vector constants.
//!
//! Errors raised here carry no anchor; the specializer attaches the active
//! anchor when they propagate.

use crate::builtin::Builtin;
use crate::error::Result;
use crate::types::{self, Type, TypeExt};
use crate::value::{mask, sign_extend, Value};
use crate::{bail_builtin, err_builtin};

// =============================================================================
// Helpers
// =============================================================================

/// Build an integer constant of type `ty`; bool types produce `Value::Bool`.
pub fn int_value(ty: &Type, bits: u64) -> Value {
    if ty.storage_type().is_bool() {
        return Value::Bool(bits & 1 != 0);
    }
    let width = integer_width(ty);
    Value::Int {
        ty: ty.clone(),
        bits: mask(bits, width),
    }
}

fn integer_width(ty: &Type) -> usize {
    ty.storage_type().integer_info().map(|(w, _)| w).unwrap_or(64)
}

fn invalid_operands(a: &Value, b: &Value) -> crate::error::CompilerError {
    err_builtin!(
        "invalid operand types {} and {}",
        a.type_of(),
        b.type_of()
    )
}

fn verify_same_type(a: &Value, b: &Value) -> Result<()> {
    if a.type_of() != b.type_of() {
        return Err(invalid_operands(a, b));
    }
    Ok(())
}

/// Apply `f` to a scalar or to each element of a vector.
fn map1(a: &Value, result_ty: Type, f: &dyn Fn(&Value) -> Result<Value>) -> Result<Value> {
    match a {
        Value::Vector { elements, .. } => Ok(Value::Vector {
            ty: result_ty,
            elements: elements.iter().map(f).collect::<Result<Vec<_>>>()?,
        }),
        scalar => f(scalar),
    }
}

/// Apply `f` pairwise to scalars or to corresponding vector elements.
fn map2(
    a: &Value,
    b: &Value,
    result_ty: Type,
    f: &dyn Fn(&Value, &Value) -> Result<Value>,
) -> Result<Value> {
    match (a, b) {
        (Value::Vector { elements: ea, .. }, Value::Vector { elements: eb, .. }) => {
            if ea.len() != eb.len() {
                bail_builtin!("vector size mismatch");
            }
            Ok(Value::Vector {
                ty: result_ty,
                elements: ea
                    .iter()
                    .zip(eb)
                    .map(|(x, y)| f(x, y))
                    .collect::<Result<Vec<_>>>()?,
            })
        }
        (Value::Vector { .. }, _) | (_, Value::Vector { .. }) => Err(invalid_operands(a, b)),
        (x, y) => f(x, y),
    }
}

fn scalar_int(v: &Value) -> Result<(u64, i64, &Type, usize)> {
    match v {
        Value::Int { ty, bits } => {
            let width = integer_width(ty);
            Ok((*bits, sign_extend(*bits, width), ty, width))
        }
        other => bail_builtin!("integer expected, got value of type {}", other.type_of()),
    }
}

fn scalar_bits(v: &Value) -> Result<(u64, i64, usize)> {
    match v {
        Value::Bool(b) => Ok((*b as u64, *b as i64, 1)),
        other => {
            let (u, s, _, w) = scalar_int(other)?;
            Ok((u, s, w))
        }
    }
}

fn scalar_real(v: &Value) -> Result<f64> {
    v.as_f64()
        .ok_or_else(|| err_builtin!("real expected, got value of type {}", v.type_of()))
}

fn real_result(like: &Value, x: f64) -> Value {
    Value::real(like.type_of(), x)
}

// =============================================================================
// Integer operations
// =============================================================================

pub fn fold_integer_binop(op: Builtin, a: &Value, b: &Value) -> Result<Value> {
    verify_same_type(a, b)?;
    map2(a, b, a.type_of(), &|x, y| integer_binop_scalar(op, x, y))
}

fn integer_binop_scalar(op: Builtin, a: &Value, b: &Value) -> Result<Value> {
    if let (Value::Bool(x), Value::Bool(y)) = (a, b) {
        return match op {
            Builtin::BAnd => Ok(Value::Bool(*x && *y)),
            Builtin::BOr => Ok(Value::Bool(*x || *y)),
            Builtin::BXor => Ok(Value::Bool(*x != *y)),
            _ => Err(invalid_operands(a, b)),
        };
    }
    let (ua, sa, ty, width) = scalar_int(a)?;
    let (ub, sb, _, _) = scalar_int(b)?;
    let shift = (ub % width as u64) as u32;
    let bits = match op {
        Builtin::Add | Builtin::AddNUW | Builtin::AddNSW => ua.wrapping_add(ub),
        Builtin::Sub | Builtin::SubNUW | Builtin::SubNSW => ua.wrapping_sub(ub),
        Builtin::Mul | Builtin::MulNUW | Builtin::MulNSW => ua.wrapping_mul(ub),
        Builtin::SDiv => {
            if sb == 0 {
                bail_builtin!("division by zero");
            }
            sa.wrapping_div(sb) as u64
        }
        Builtin::UDiv => {
            if ub == 0 {
                bail_builtin!("division by zero");
            }
            ua / ub
        }
        Builtin::SRem => {
            if sb == 0 {
                bail_builtin!("division by zero");
            }
            sa.wrapping_rem(sb) as u64
        }
        Builtin::URem => {
            if ub == 0 {
                bail_builtin!("division by zero");
            }
            ua % ub
        }
        Builtin::Shl => ua.wrapping_shl(shift),
        Builtin::LShr => ua.wrapping_shr(shift),
        Builtin::AShr => sa.wrapping_shr(shift) as u64,
        Builtin::BAnd => ua & ub,
        Builtin::BOr => ua | ub,
        Builtin::BXor => ua ^ ub,
        other => bail_builtin!("can not fold constant expression using builtin {}", other),
    };
    Ok(int_value(ty, bits))
}

/// Sign of a signed integer: -1, 0 or 1.
pub fn fold_ssign(a: &Value) -> Result<Value> {
    map1(a, a.type_of(), &|x| {
        let (_, sx, ty, _) = scalar_int(x)?;
        Ok(int_value(ty, sx.signum() as u64))
    })
}

pub fn fold_icmp(op: Builtin, a: &Value, b: &Value) -> Result<Value> {
    verify_same_type(a, b)?;
    let result_ty = types::bool_op_return_type(&a.type_of());
    map2(a, b, result_ty, &|x, y| {
        let (ux, sx, _) = scalar_bits(x)?;
        let (uy, sy, _) = scalar_bits(y)?;
        let r = match op {
            Builtin::ICmpEQ => ux == uy,
            Builtin::ICmpNE => ux != uy,
            Builtin::ICmpUGT => ux > uy,
            Builtin::ICmpUGE => ux >= uy,
            Builtin::ICmpULT => ux < uy,
            Builtin::ICmpULE => ux <= uy,
            Builtin::ICmpSGT => sx > sy,
            Builtin::ICmpSGE => sx >= sy,
            Builtin::ICmpSLT => sx < sy,
            Builtin::ICmpSLE => sx <= sy,
            other => bail_builtin!("can not fold constant expression using builtin {}", other),
        };
        Ok(Value::Bool(r))
    })
}

// =============================================================================
// Real operations
// =============================================================================

/// Ordered comparisons are false if either operand is NaN, unordered
/// comparisons are true.
pub fn fold_fcmp(op: Builtin, a: &Value, b: &Value) -> Result<Value> {
    verify_same_type(a, b)?;
    let result_ty = types::bool_op_return_type(&a.type_of());
    map2(a, b, result_ty, &|x, y| {
        let x = scalar_real(x)?;
        let y = scalar_real(y)?;
        let ordered = !x.is_nan() && !y.is_nan();
        let unordered = x.is_nan() || y.is_nan();
        let r = match op {
            Builtin::FCmpOEQ => ordered && x == y,
            Builtin::FCmpONE => ordered && x != y,
            Builtin::FCmpORD => ordered,
            Builtin::FCmpOGT => ordered && x > y,
            Builtin::FCmpOGE => ordered && x >= y,
            Builtin::FCmpOLT => ordered && x < y,
            Builtin::FCmpOLE => ordered && x <= y,
            Builtin::FCmpUEQ => unordered || x == y,
            Builtin::FCmpUNE => unordered || x != y,
            Builtin::FCmpUNO => unordered,
            Builtin::FCmpUGT => unordered || x > y,
            Builtin::FCmpUGE => unordered || x >= y,
            Builtin::FCmpULT => unordered || x < y,
            Builtin::FCmpULE => unordered || x <= y,
            other => bail_builtin!("can not fold constant expression using builtin {}", other),
        };
        Ok(Value::Bool(r))
    })
}

pub fn fold_real_unop(op: Builtin, a: &Value) -> Result<Value> {
    map1(a, a.type_of(), &|v| {
        let x = scalar_real(v)?;
        let r = match op {
            Builtin::FAbs => x.abs(),
            Builtin::FSign => {
                if x > 0.0 {
                    1.0
                } else if x < 0.0 {
                    -1.0
                } else {
                    x
                }
            }
            Builtin::Radians => x.to_radians(),
            Builtin::Degrees => x.to_degrees(),
            Builtin::Sin => x.sin(),
            Builtin::Cos => x.cos(),
            Builtin::Tan => x.tan(),
            Builtin::Asin => x.asin(),
            Builtin::Acos => x.acos(),
            Builtin::Atan => x.atan(),
            Builtin::Exp => x.exp(),
            Builtin::Log => x.ln(),
            Builtin::Exp2 => x.exp2(),
            Builtin::Log2 => x.log2(),
            Builtin::Trunc => x.trunc(),
            Builtin::Floor => x.floor(),
            Builtin::Sqrt => x.sqrt(),
            Builtin::InverseSqrt => 1.0 / x.sqrt(),
            other => bail_builtin!("can not fold constant expression using builtin {}", other),
        };
        Ok(real_result(v, r))
    })
}

pub fn fold_real_binop(op: Builtin, a: &Value, b: &Value) -> Result<Value> {
    verify_same_type(a, b)?;
    map2(a, b, a.type_of(), &|v, w| {
        let x = scalar_real(v)?;
        let y = scalar_real(w)?;
        let r = match op {
            Builtin::FAdd => x + y,
            Builtin::FSub => x - y,
            Builtin::FMul => x * y,
            Builtin::FDiv => x / y,
            Builtin::FRem => x % y,
            Builtin::Atan2 => x.atan2(y),
            // step(edge, x)
            Builtin::Step => {
                if y >= x {
                    1.0
                } else {
                    0.0
                }
            }
            Builtin::Pow => x.powf(y),
            other => bail_builtin!("can not fold constant expression using builtin {}", other),
        };
        Ok(real_result(v, r))
    })
}

/// Linear blend `a * (1 - t) + b * t`.
pub fn fold_fmix(a: &Value, b: &Value, t: &Value) -> Result<Value> {
    verify_same_type(a, b)?;
    verify_same_type(a, t)?;
    let xs = real_components(a)?;
    let ys = real_components(b)?;
    let ts = real_components(t)?;
    let mixed: Vec<f64> = xs
        .iter()
        .zip(&ys)
        .zip(&ts)
        .map(|((x, y), t)| x * (1.0 - t) + y * t)
        .collect();
    match a {
        Value::Vector { ty, .. } => {
            let elem = element_type(a);
            Ok(Value::Vector {
                ty: ty.clone(),
                elements: mixed.iter().map(|m| Value::real(elem.clone(), *m)).collect(),
            })
        }
        _ => Ok(Value::real(a.type_of(), mixed[0])),
    }
}

fn real_components(a: &Value) -> Result<Vec<f64>> {
    match a {
        Value::Vector { elements, .. } => elements.iter().map(scalar_real).collect(),
        scalar => Ok(vec![scalar_real(scalar)?]),
    }
}

fn element_type(a: &Value) -> Type {
    let ty = a.type_of();
    match ty.storage_type().vector_info() {
        Some((elem, _)) => elem.clone(),
        None => ty,
    }
}

pub fn fold_length(a: &Value) -> Result<Value> {
    let sum: f64 = real_components(a)?.iter().map(|x| x * x).sum();
    Ok(Value::real(element_type(a), sum.sqrt()))
}

pub fn fold_distance(a: &Value, b: &Value) -> Result<Value> {
    let diff = fold_real_binop(Builtin::FSub, a, b)?;
    fold_length(&diff)
}

/// Scale to unit length; a zero-length input is returned unchanged.
pub fn fold_normalize(a: &Value) -> Result<Value> {
    let len = real_components(a)?.iter().map(|x| x * x).sum::<f64>().sqrt();
    let factor = if len == 0.0 { 1.0 } else { 1.0 / len };
    map1(a, a.type_of(), &|v| Ok(real_result(v, scalar_real(v)? * factor)))
}

pub fn fold_cross(a: &Value, b: &Value) -> Result<Value> {
    verify_same_type(a, b)?;
    let x = real_components(a)?;
    let y = real_components(b)?;
    if x.len() != 3 || y.len() != 3 {
        bail_builtin!("cross product requires vectors of size 3");
    }
    let elem = element_type(a);
    let r = [
        x[1] * y[2] - x[2] * y[1],
        x[2] * y[0] - x[0] * y[2],
        x[0] * y[1] - x[1] * y[0],
    ];
    Ok(Value::Vector {
        ty: a.type_of(),
        elements: r.iter().map(|c| Value::real(elem.clone(), *c)).collect(),
    })
}

// =============================================================================
// Casts and selection
// =============================================================================

pub fn fold_cast(op: Builtin, a: &Value, dest: &Type) -> Result<Value> {
    let dest_elem = match dest.storage_type().vector_info() {
        Some((elem, _)) => elem.clone(),
        None => dest.clone(),
    };
    map1(a, dest.clone(), &|v| cast_scalar(op, v, &dest_elem))
}

fn cast_scalar(op: Builtin, v: &Value, dest: &Type) -> Result<Value> {
    match op {
        Builtin::ITrunc => {
            let (u, _, _) = scalar_bits(v)?;
            Ok(int_value(dest, u))
        }
        Builtin::ZExt => {
            let (u, _, width) = scalar_bits(v)?;
            Ok(int_value(dest, mask(u, width)))
        }
        Builtin::SExt => {
            let (u, _, width) = scalar_bits(v)?;
            Ok(int_value(dest, sign_extend(u, width) as u64))
        }
        Builtin::FPTrunc | Builtin::FPExt => Ok(Value::real(dest.clone(), scalar_real(v)?)),
        Builtin::FPToUI => Ok(int_value(dest, scalar_real(v)? as u64)),
        Builtin::FPToSI => Ok(int_value(dest, scalar_real(v)? as i64 as u64)),
        Builtin::UIToFP => {
            let (u, _, _) = scalar_bits(v)?;
            Ok(Value::real(dest.clone(), u as f64))
        }
        Builtin::SIToFP => {
            let (_, s, _) = scalar_bits(v)?;
            Ok(Value::real(dest.clone(), s as f64))
        }
        other => bail_builtin!("can not fold constant expression using builtin {}", other),
    }
}

/// Elementwise choice; a scalar condition applies to every element.
pub fn fold_select(cond: &Value, a: &Value, b: &Value) -> Result<Value> {
    verify_same_type(a, b)?;
    match (cond, a, b) {
        (Value::Bool(c), _, _) => Ok(if *c { a.clone() } else { b.clone() }),
        (
            Value::Vector { elements: ec, .. },
            Value::Vector { elements: ea, .. },
            Value::Vector { elements: eb, .. },
        ) => {
            if ec.len() != ea.len() {
                bail_builtin!("vector size mismatch");
            }
            let elements = ec
                .iter()
                .zip(ea.iter().zip(eb))
                .map(|(c, (x, y))| match c {
                    Value::Bool(true) => Ok(x.clone()),
                    Value::Bool(false) => Ok(y.clone()),
                    other => bail_builtin!("bool expected, got value of type {}", other.type_of()),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::Vector {
                ty: a.type_of(),
                elements,
            })
        }
        _ => bail_builtin!("invalid operand types {} and {}", cond.type_of(), a.type_of()),
    }
}
