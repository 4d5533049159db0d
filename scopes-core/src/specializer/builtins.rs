//! Typing and constant folding of builtin calls, and calls into native
//! functions.
//!
//! A builtin call is folded at compile time when the builtin always folds,
//! or when all of its arguments are constants and the builtin has no side
//! effects. Folding rewrites the body into a jump to the continuation with
//! the results; otherwise the call stands and the continuation is typed with
//! the builtin's result types.

use log::{debug, info};

use super::{extract_function_type, BuiltinFold, Specializer};
use crate::builtin::Builtin;
use crate::constant_folding as cf;
use crate::error::{CompilerError, Result};
use crate::label::LabelId;
use crate::types::{self, canonical_kind, PointerFlags, StorageClass, Type, TypeExt, TypeKind};
use crate::value::{Argument, Args, Value};
use crate::{bail_arity_at, bail_builtin_at, bail_type_at, err_builtin_at, err_type_at};

/// Scalar type behind a vector type, or the storage type itself.
fn scalar_of(ty: &Type) -> &Type {
    let ty = ty.storage_type();
    match ty.vector_info() {
        Some((elem, _)) => elem.storage_type(),
        None => ty,
    }
}

fn retargtypes(types: Vec<Type>) -> (bool, Args) {
    (
        false,
        types
            .into_iter()
            .map(|ty| Argument::from(Value::unknown_of(ty)))
            .collect(),
    )
}

impl<'s> Specializer<'s> {
    pub(crate) fn checkargs(&self, l: LabelId, mincount: usize, maxcount: Option<usize>) -> Result<()> {
        let count = self.session.label(l).body.args.len() - 1;
        if count < mincount {
            bail_arity_at!(
                self.at(),
                "at least {} arguments expected, got {}",
                mincount,
                count
            );
        }
        if let Some(maxcount) = maxcount {
            if count > maxcount {
                bail_arity_at!(
                    self.at(),
                    "excess argument. At most {} arguments expected",
                    maxcount
                );
            }
        }
        Ok(())
    }

    /// Rewrite the body into a jump to its continuation passing `values`.
    fn retargs(&mut self, l: LabelId, values: impl IntoIterator<Item = Argument>) {
        let body = &mut self.session.label_mut(l).body;
        let cont = std::mem::replace(&mut body.args[0], Argument::from(Value::None));
        body.enter = cont.value;
        body.args.truncate(1);
        body.args.extend(values);
    }

    fn arg_type(&self, args: &Args, index: usize) -> Type {
        self.session.indirect_type(&args[index].value)
    }

    // =========================================================================
    // Verification helpers
    // =========================================================================

    fn verify_integer(&self, ty: &Type) -> Result<()> {
        if scalar_of(ty).integer_info().is_none() {
            bail_type_at!(self.at(), "integer type expected, got {}", ty);
        }
        Ok(())
    }

    fn verify_real(&self, ty: &Type) -> Result<()> {
        if scalar_of(ty).real_width().is_none() {
            bail_type_at!(self.at(), "real type expected, got {}", ty);
        }
        Ok(())
    }

    fn verify_same_operands(&self, a: &Type, b: &Type) -> Result<()> {
        if a.storage_type() != b.storage_type() {
            bail_type_at!(self.at(), "invalid operand types {} and {}", a, b);
        }
        Ok(())
    }

    fn verify_integer_ops(&self, a: &Type, b: &Type) -> Result<()> {
        self.verify_integer(a)?;
        self.verify_same_operands(a, b)
    }

    fn verify_real_ops(&self, a: &Type, b: &Type) -> Result<()> {
        self.verify_real(a)?;
        self.verify_same_operands(a, b)
    }

    fn verify_type_arg(&self, value: &Value) -> Result<Type> {
        match value {
            Value::Type(ty) => Ok(ty.clone()),
            other => bail_type_at!(
                self.at(),
                "type expected, got value of type {}",
                self.session.indirect_type(other)
            ),
        }
    }

    fn verify_symbol<'v>(&self, value: &'v Value) -> Result<&'v str> {
        match value {
            Value::Symbol(s) => Ok(s),
            other => bail_type_at!(
                self.at(),
                "symbol expected, got value of type {}",
                self.session.indirect_type(other)
            ),
        }
    }

    fn verify_storage(&self, expected: &Type, got: &Type) -> Result<()> {
        if expected.storage_type() != got.storage_type() {
            bail_type_at!(self.at(), "type {} expected, got {}", expected, got);
        }
        Ok(())
    }

    fn verify_vector(&self, ty: &Type) -> Result<(Type, usize)> {
        match ty.storage_type().vector_info() {
            Some((elem, count)) => Ok((elem.clone(), count)),
            None => bail_type_at!(self.at(), "vector type expected, got {}", ty),
        }
    }

    fn verify_pointer(&self, ty: &Type) -> Result<(Type, PointerFlags)> {
        match ty.storage_type().pointer_info() {
            Some((elem, flags)) => Ok((elem.clone(), flags)),
            None => bail_type_at!(self.at(), "pointer type expected, got {}", ty),
        }
    }

    fn verify_readable(&self, ty: &Type) -> Result<Type> {
        let (elem, flags) = self.verify_pointer(ty)?;
        if !flags.readable {
            bail_type_at!(
                self.at(),
                "can not load value from address of type {} because the target is non-readable",
                ty
            );
        }
        Ok(elem)
    }

    fn verify_writable(&self, ty: &Type) -> Result<(Type, PointerFlags)> {
        let (elem, flags) = self.verify_pointer(ty)?;
        if !flags.writable {
            bail_type_at!(
                self.at(),
                "can not store value at address of type {} because the target is non-writable",
                ty
            );
        }
        Ok((elem, flags))
    }

    fn const_index(&self, value: &Value) -> Result<usize> {
        if let Value::Int { ty, .. } = value {
            let signed = matches!(ty.storage_type().integer_info(), Some((_, true)));
            if signed && value.as_i64().is_some_and(|index| index < 0) {
                bail_builtin_at!(self.at(), "index out of range");
            }
        }
        match value.as_u64() {
            Some(index) => usize::try_from(index)
                .map_err(|_| err_builtin_at!(self.at(), "index out of range")),
            None => bail_type_at!(
                self.at(),
                "constant integer index expected, got value of type {}",
                self.session.indirect_type(value)
            ),
        }
    }

    fn verify_cast(&self, op: Builtin, src: &Type, dest: &Type) -> Result<()> {
        let invalid = || err_type_at!(self.at(), "invalid operand types {} and {}", src, dest);
        match op {
            Builtin::ITrunc | Builtin::ZExt | Builtin::SExt => {
                self.verify_integer(src)?;
                self.verify_integer(dest)
            }
            Builtin::FPTrunc | Builtin::FPExt => {
                self.verify_real(src)?;
                self.verify_real(dest)?;
                let from = scalar_of(src).real_width().unwrap_or_default();
                let to = scalar_of(dest).real_width().unwrap_or_default();
                let ok = match op {
                    Builtin::FPTrunc => from >= to,
                    _ => from <= to,
                };
                if !ok {
                    return Err(invalid());
                }
                Ok(())
            }
            Builtin::FPToUI | Builtin::FPToSI => {
                self.verify_real(src)?;
                self.verify_integer(dest)
            }
            Builtin::UIToFP | Builtin::SIToFP => {
                self.verify_integer(src)?;
                self.verify_real(dest)
            }
            Builtin::IntToPtr => {
                self.verify_integer(src)?;
                self.verify_pointer(dest).map(|_| ())
            }
            Builtin::PtrToInt => {
                self.verify_pointer(src)?;
                self.verify_integer(dest)
            }
            _ => unreachable!("{} is not a cast", op),
        }
    }

    // =========================================================================
    // Builtin dispatch
    // =========================================================================

    pub(crate) fn fold_builtin(&mut self, l: LabelId, builtin: Builtin) -> Result<BuiltinFold> {
        if !builtin.has_keyed_args() {
            self.verify_no_keyed_args(l)?;
        }
        if (builtin.always_folds() || (!builtin.never_folds() && self.all_args_constant(l)))
            && self.fold_builtin_call(l, builtin)?
        {
            return Ok(BuiltinFold::Repeat);
        }
        match builtin {
            Builtin::Branch => {
                self.type_branch_continuations(l)?;
                Ok(BuiltinFold::Branched)
            }
            Builtin::Unreachable | Builtin::Discard => {
                self.checkargs(l, 0, Some(0))?;
                self.session.label_mut(l).body.args[0] = Argument::from(Value::None);
                Ok(BuiltinFold::Untyped)
            }
            _ => {
                let (fold, values) = self.values_from_builtin_call(l, builtin)?;
                if fold {
                    self.retargs(l, values);
                    return Ok(BuiltinFold::Repeat);
                }
                Ok(BuiltinFold::Typed(types::return_label(values)))
            }
        }
    }

    /// Evaluate a builtin call at compile time. Returns false if the call
    /// must stand even though its arguments are constant.
    fn fold_builtin_call(&mut self, l: LabelId, builtin: Builtin) -> Result<bool> {
        debug!(
            "folding builtin {} in {}",
            builtin,
            self.session.label_to_string(l)
        );
        let args = self.session.label(l).body.args.clone();
        let argc = args.len() - 1;
        let at = self.at();
        let folded = |e: CompilerError| e.with_anchor(&at);

        let result: Value = match builtin {
            Builtin::Forward => {
                self.retargs(l, args[1..].iter().cloned());
                return Ok(true);
            }
            Builtin::VaCountOf => Value::i32(argc as i32),
            Builtin::VaKeys => {
                let keys = args[1..].iter().map(|arg| {
                    Argument::from(match &arg.key {
                        Some(key) => Value::Symbol(key.clone()),
                        None => Value::None,
                    })
                });
                self.retargs(l, keys.collect::<Vec<_>>());
                return Ok(true);
            }
            Builtin::VaValues => {
                let values = args[1..]
                    .iter()
                    .map(|arg| Argument::from(arg.value.clone()))
                    .collect::<Vec<_>>();
                self.retargs(l, values);
                return Ok(true);
            }
            Builtin::VaKey => {
                self.checkargs(l, 2, Some(2))?;
                let key = self.verify_symbol(&args[1].value)?;
                self.retargs(l, [Argument::keyed(key, args[2].value.clone())]);
                return Ok(true);
            }
            Builtin::VaAt => {
                self.checkargs(l, 1, None)?;
                let values: Args = match &args[1].value {
                    Value::Symbol(key) => args[2..]
                        .iter()
                        .filter(|arg| arg.key.as_deref() == Some(key.as_str()))
                        .cloned()
                        .collect(),
                    index => {
                        let index = self.const_index(index)?;
                        args.iter().skip(index.saturating_add(2)).cloned().collect()
                    }
                };
                self.retargs(l, values);
                return Ok(true);
            }
            Builtin::IsConstant => {
                self.checkargs(l, 1, Some(1))?;
                Value::Bool(self.session.is_const(&args[1].value))
            }
            Builtin::TypeOf => {
                self.checkargs(l, 1, Some(1))?;
                Value::Type(self.arg_type(&args, 1))
            }
            Builtin::TupleType | Builtin::UnionType => {
                let fields = args[1..]
                    .iter()
                    .map(|arg| Ok((arg.key.clone(), self.verify_type_arg(&arg.value)?)))
                    .collect::<Result<Vec<_>>>()?;
                Value::Type(match builtin {
                    Builtin::TupleType => types::keyed_tuple(fields),
                    _ => types::union_type(fields),
                })
            }
            Builtin::ReturnLabelType => {
                let values = args[1..]
                    .iter()
                    .map(|arg| {
                        let ty = self.verify_type_arg(&arg.value)?;
                        Ok(Argument::new(arg.key.clone(), Value::unknown_of(ty)))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Value::Type(types::return_label(values))
            }
            Builtin::FunctionType => {
                self.checkargs(l, 1, None)?;
                let rtype = self.verify_type_arg(&args[1].value)?;
                let rtype = if rtype.is_return_label() {
                    rtype
                } else if rtype == types::void() {
                    types::return_label(Vec::new())
                } else {
                    types::return_label_of(vec![rtype])
                };
                let mut params = Vec::new();
                let mut flags = types::FunctionFlags::default();
                for arg in &args[2..] {
                    match &arg.value {
                        Value::Type(ty) => params.push(ty.clone()),
                        Value::Symbol(s) if s == "variadic" => flags.variadic = true,
                        Value::Symbol(s) => {
                            bail_type_at!(self.at(), "illegal option: {}", s);
                        }
                        other => {
                            self.verify_type_arg(other)?;
                        }
                    }
                }
                Value::Type(types::function(rtype, params, flags))
            }
            Builtin::Dump => {
                for arg in &args[1..] {
                    info!(
                        "{}: dump: {}",
                        at,
                        self.session.value_to_string(&arg.value)
                    );
                }
                self.retargs(l, args[1..].iter().cloned());
                return Ok(true);
            }
            Builtin::CompilerError => {
                self.checkargs(l, 1, Some(1))?;
                let msg = match &args[1].value {
                    Value::Symbol(s) => s.clone(),
                    other => self.session.value_to_string(other),
                };
                bail_builtin_at!(at, "{}", msg);
            }
            Builtin::Branch => {
                self.checkargs(l, 3, Some(3))?;
                let Value::Bool(cond) = args[1].value else {
                    bail_type_at!(
                        self.at(),
                        "bool expected, got value of type {}",
                        self.arg_type(&args, 1)
                    );
                };
                let arm = if cond { &args[2] } else { &args[3] };
                self.verify_branch_continuation(&arm.value)?;
                if let Value::Closure(c) = args[0].value {
                    let frame = self.session.closure(c).frame;
                    self.session.frame_mut(frame).inline_merge = true;
                }
                let body = &mut self.session.label_mut(l).body;
                body.enter = arm.value.clone();
                body.args = vec![args[0].clone()];
                return Ok(true);
            }
            Builtin::IntToPtr | Builtin::PtrToInt => return Ok(false),
            b if b.is_integer_binop() => {
                self.values_from_builtin_call(l, b)?;
                cf::fold_integer_binop(b, &args[1].value, &args[2].value).map_err(folded)?
            }
            Builtin::SSign => {
                self.values_from_builtin_call(l, builtin)?;
                cf::fold_ssign(&args[1].value).map_err(folded)?
            }
            b if b.is_icmp() => {
                self.values_from_builtin_call(l, b)?;
                cf::fold_icmp(b, &args[1].value, &args[2].value).map_err(folded)?
            }
            b if b.is_fcmp() => {
                self.values_from_builtin_call(l, b)?;
                cf::fold_fcmp(b, &args[1].value, &args[2].value).map_err(folded)?
            }
            b if b.is_real_unop() => {
                self.values_from_builtin_call(l, b)?;
                cf::fold_real_unop(b, &args[1].value).map_err(folded)?
            }
            b if b.is_real_binop() => {
                self.values_from_builtin_call(l, b)?;
                cf::fold_real_binop(b, &args[1].value, &args[2].value).map_err(folded)?
            }
            Builtin::FMix => {
                self.values_from_builtin_call(l, builtin)?;
                cf::fold_fmix(&args[1].value, &args[2].value, &args[3].value).map_err(folded)?
            }
            Builtin::Length => {
                self.values_from_builtin_call(l, builtin)?;
                cf::fold_length(&args[1].value).map_err(folded)?
            }
            Builtin::Distance => {
                self.values_from_builtin_call(l, builtin)?;
                cf::fold_distance(&args[1].value, &args[2].value).map_err(folded)?
            }
            Builtin::Normalize => {
                self.values_from_builtin_call(l, builtin)?;
                cf::fold_normalize(&args[1].value).map_err(folded)?
            }
            Builtin::Cross => {
                self.values_from_builtin_call(l, builtin)?;
                cf::fold_cross(&args[1].value, &args[2].value).map_err(folded)?
            }
            Builtin::ITrunc
            | Builtin::ZExt
            | Builtin::SExt
            | Builtin::FPTrunc
            | Builtin::FPExt
            | Builtin::FPToUI
            | Builtin::FPToSI
            | Builtin::UIToFP
            | Builtin::SIToFP => {
                self.checkargs(l, 2, Some(2))?;
                let dest = self.verify_type_arg(&args[2].value)?;
                self.verify_cast(builtin, &self.arg_type(&args, 1), &dest)?;
                cf::fold_cast(builtin, &args[1].value, &dest).map_err(folded)?
            }
            Builtin::ExtractElement => {
                self.values_from_builtin_call(l, builtin)?;
                let index = self.const_index(&args[2].value)?;
                match &args[1].value {
                    Value::Vector { elements, .. } => match elements.get(index) {
                        Some(elem) => elem.clone(),
                        None => bail_builtin_at!(at, "index out of range"),
                    },
                    _ => return Ok(false),
                }
            }
            Builtin::InsertElement => {
                self.values_from_builtin_call(l, builtin)?;
                let index = self.const_index(&args[3].value)?;
                match &args[1].value {
                    Value::Vector { ty, elements } => {
                        if index >= elements.len() {
                            bail_builtin_at!(at, "index out of range");
                        }
                        let mut elements = elements.clone();
                        elements[index] = args[2].value.clone();
                        Value::Vector {
                            ty: ty.clone(),
                            elements,
                        }
                    }
                    _ => return Ok(false),
                }
            }
            Builtin::ExtractValue => {
                self.values_from_builtin_call(l, builtin)?;
                let index = self.const_index(&args[2].value)?;
                match &args[1].value {
                    Value::Aggregate { elements, .. } => match elements.get(index) {
                        Some(elem) => elem.clone(),
                        None => bail_builtin_at!(at, "index out of range"),
                    },
                    _ => return Ok(false),
                }
            }
            Builtin::InsertValue => {
                self.values_from_builtin_call(l, builtin)?;
                let index = self.const_index(&args[3].value)?;
                match &args[1].value {
                    Value::Aggregate { ty, elements } => {
                        if index >= elements.len() {
                            bail_builtin_at!(at, "index out of range");
                        }
                        let mut elements = elements.clone();
                        elements[index] = args[2].value.clone();
                        Value::Aggregate {
                            ty: ty.clone(),
                            elements,
                        }
                    }
                    _ => return Ok(false),
                }
            }
            other => {
                bail_builtin_at!(
                    at,
                    "can not fold constant expression using builtin {}",
                    other
                );
            }
        };
        self.retargs(l, [Argument::from(result)]);
        Ok(true)
    }

    /// Result types of a builtin call that stands at runtime. The flag is
    /// set when the call turned out to be foldable after all; the values are
    /// then the results themselves.
    fn values_from_builtin_call(&mut self, l: LabelId, builtin: Builtin) -> Result<(bool, Args)> {
        let mut args = self.session.label(l).body.args.clone();
        match builtin {
            b if b.is_integer_binop() => {
                self.checkargs(l, 2, Some(2))?;
                let (a, b) = (self.arg_type(&args, 1), self.arg_type(&args, 2));
                self.verify_integer_ops(&a, &b)?;
                Ok(retargtypes(vec![a]))
            }
            Builtin::SSign => {
                self.checkargs(l, 1, Some(1))?;
                let a = self.arg_type(&args, 1);
                self.verify_integer(&a)?;
                Ok(retargtypes(vec![a]))
            }
            b if b.is_icmp() || b.is_fcmp() => {
                self.checkargs(l, 2, Some(2))?;
                let (a, c) = (self.arg_type(&args, 1), self.arg_type(&args, 2));
                if b.is_icmp() {
                    self.verify_integer_ops(&a, &c)?;
                } else {
                    self.verify_real_ops(&a, &c)?;
                }
                Ok(retargtypes(vec![types::bool_op_return_type(&a)]))
            }
            b if b.is_real_unop() => {
                self.checkargs(l, 1, Some(1))?;
                let a = self.arg_type(&args, 1);
                self.verify_real(&a)?;
                Ok(retargtypes(vec![a]))
            }
            b if b.is_real_binop() => {
                self.checkargs(l, 2, Some(2))?;
                let (a, c) = (self.arg_type(&args, 1), self.arg_type(&args, 2));
                self.verify_real_ops(&a, &c)?;
                Ok(retargtypes(vec![a]))
            }
            Builtin::FMix => {
                self.checkargs(l, 3, Some(3))?;
                let (a, b, c) = (self.arg_type(&args, 1), self.arg_type(&args, 2), self.arg_type(&args, 3));
                self.verify_real_ops(&a, &b)?;
                self.verify_real_ops(&a, &c)?;
                Ok(retargtypes(vec![a]))
            }
            Builtin::Length | Builtin::Normalize => {
                self.checkargs(l, 1, Some(1))?;
                let a = self.arg_type(&args, 1);
                self.verify_real(&a)?;
                let rtype = match builtin {
                    Builtin::Length => scalar_of(&a).clone(),
                    _ => a,
                };
                Ok(retargtypes(vec![rtype]))
            }
            Builtin::Distance => {
                self.checkargs(l, 2, Some(2))?;
                let (a, b) = (self.arg_type(&args, 1), self.arg_type(&args, 2));
                self.verify_real_ops(&a, &b)?;
                Ok(retargtypes(vec![scalar_of(&a).clone()]))
            }
            Builtin::Cross => {
                self.checkargs(l, 2, Some(2))?;
                let (a, b) = (self.arg_type(&args, 1), self.arg_type(&args, 2));
                self.verify_real_ops(&a, &b)?;
                let (_, count) = self.verify_vector(&a)?;
                if count != 3 {
                    bail_type_at!(self.at(), "vector of 3 elements expected, got {}", a);
                }
                Ok(retargtypes(vec![a]))
            }
            Builtin::ITrunc
            | Builtin::ZExt
            | Builtin::SExt
            | Builtin::FPTrunc
            | Builtin::FPExt
            | Builtin::FPToUI
            | Builtin::FPToSI
            | Builtin::UIToFP
            | Builtin::SIToFP
            | Builtin::IntToPtr
            | Builtin::PtrToInt => {
                self.checkargs(l, 2, Some(2))?;
                let dest = self.verify_type_arg(&args[2].value)?;
                self.verify_cast(builtin, &self.arg_type(&args, 1), &dest)?;
                Ok(retargtypes(vec![dest]))
            }
            Builtin::Bitcast => {
                self.checkargs(l, 2, Some(2))?;
                let src = self.arg_type(&args, 1);
                let dest = self.verify_type_arg(&args[2].value)?;
                if src == dest {
                    return Ok((true, vec![Argument::from(args[1].value.clone())]));
                }
                let (ssrc, sdest) = (src.storage_type(), dest.storage_type());
                if canonical_kind(ssrc) != canonical_kind(sdest) {
                    bail_type_at!(
                        self.at(),
                        "can not bitcast value of type {} to type {} because storage types are not of compatible category",
                        src,
                        dest
                    );
                }
                if ssrc != sdest && canonical_kind(sdest) == TypeKind::Aggregate {
                    bail_type_at!(
                        self.at(),
                        "can not bitcast value of type {} to type {} with aggregate storage type {}",
                        src,
                        dest,
                        sdest
                    );
                }
                Ok(retargtypes(vec![dest]))
            }
            Builtin::ExtractElement => {
                self.checkargs(l, 2, Some(2))?;
                let (elem, _) = self.verify_vector(&self.arg_type(&args, 1))?;
                self.verify_integer(&self.arg_type(&args, 2))?;
                Ok(retargtypes(vec![elem]))
            }
            Builtin::InsertElement => {
                self.checkargs(l, 3, Some(3))?;
                let vector = self.arg_type(&args, 1);
                let (elem, _) = self.verify_vector(&vector)?;
                self.verify_storage(&elem, &self.arg_type(&args, 2))?;
                self.verify_integer(&self.arg_type(&args, 3))?;
                Ok(retargtypes(vec![vector]))
            }
            Builtin::ExtractValue => {
                self.checkargs(l, 2, Some(2))?;
                let aggregate = self.arg_type(&args, 1);
                let index = self.const_index(&args[2].value)?;
                let elem = self.aggregate_field(&aggregate, index, "can not extract value from type")?;
                Ok(retargtypes(vec![elem]))
            }
            Builtin::InsertValue => {
                self.checkargs(l, 3, Some(3))?;
                let aggregate = self.arg_type(&args, 1);
                let index = self.const_index(&args[3].value)?;
                let elem = self.aggregate_field(&aggregate, index, "can not insert value into type")?;
                self.verify_storage(&elem, &self.arg_type(&args, 2))?;
                Ok(retargtypes(vec![aggregate]))
            }
            Builtin::Select => {
                self.checkargs(l, 3, Some(3))?;
                let (cond, a, b) = (self.arg_type(&args, 1), self.arg_type(&args, 2), self.arg_type(&args, 3));
                self.verify_same_operands(&a, &b)?;
                if let Value::Bool(choice) = args[1].value {
                    let chosen = if choice { &args[2] } else { &args[3] };
                    return Ok((true, vec![Argument::from(chosen.value.clone())]));
                }
                match cond.storage_type().vector_info() {
                    Some((elem, count)) => {
                        if !elem.storage_type().is_bool() {
                            bail_type_at!(self.at(), "bool vector expected, got {}", cond);
                        }
                        match a.storage_type().vector_info() {
                            Some((_, n)) if n == count => {}
                            _ => bail_type_at!(self.at(), "vector size mismatch"),
                        }
                    }
                    None if cond.storage_type().is_bool() => {}
                    None => bail_type_at!(self.at(), "bool expected, got {}", cond),
                }
                if self.all_args_constant(l) {
                    let at = self.at();
                    let value = cf::fold_select(&args[1].value, &args[2].value, &args[3].value)
                        .map_err(|e| e.with_anchor(&at))?;
                    return Ok((true, vec![Argument::from(value)]));
                }
                Ok(retargtypes(vec![a]))
            }
            Builtin::Undef | Builtin::Alloca | Builtin::Malloc => {
                self.checkargs(l, 1, Some(1))?;
                let ty = self.verify_type_arg(&args[1].value)?;
                Ok(retargtypes(vec![match builtin {
                    Builtin::Alloca => types::local_pointer(ty),
                    Builtin::Malloc => types::native_pointer(ty),
                    _ => ty,
                }]))
            }
            Builtin::AllocaArray | Builtin::MallocArray => {
                self.checkargs(l, 2, Some(2))?;
                let ty = self.verify_type_arg(&args[1].value)?;
                self.verify_integer(&self.arg_type(&args, 2))?;
                Ok(retargtypes(vec![match builtin {
                    Builtin::AllocaArray => types::local_pointer(ty),
                    _ => types::native_pointer(ty),
                }]))
            }
            Builtin::Free => {
                self.checkargs(l, 1, Some(1))?;
                let (_, flags) = self.verify_writable(&self.arg_type(&args, 1))?;
                if flags.storage != StorageClass::Default {
                    bail_type_at!(self.at(), "pointer is not a heap pointer");
                }
                Ok(retargtypes(Vec::new()))
            }
            Builtin::Load => {
                self.checkargs(l, 1, Some(1))?;
                let elem = self.verify_readable(&self.arg_type(&args, 1))?;
                Ok(retargtypes(vec![elem]))
            }
            Builtin::Store => {
                self.checkargs(l, 2, Some(2))?;
                let value = self.arg_type(&args, 1);
                let (elem, _) = self.verify_writable(&self.arg_type(&args, 2))?;
                self.verify_storage(&elem, &value)?;
                Ok(retargtypes(Vec::new()))
            }
            Builtin::GetElementPtr => {
                self.checkargs(l, 2, None)?;
                let (mut elem, flags) = self.verify_pointer(&self.arg_type(&args, 1))?;
                self.verify_integer(&self.arg_type(&args, 2))?;
                for i in 3..args.len() {
                    let storage = elem.storage_type().clone();
                    if let Some((inner, _)) = storage.array_info() {
                        let inner = inner.clone();
                        self.verify_integer(&self.arg_type(&args, i))?;
                        elem = inner;
                        continue;
                    }
                    if canonical_kind(&storage) != TypeKind::Aggregate {
                        bail_type_at!(self.at(), "can not get element pointer from type {}", elem);
                    }
                    let index = match &args[i].value {
                        Value::Symbol(field) => {
                            let Some(index) = types::field_index(&storage, field) else {
                                bail_type_at!(
                                    self.at(),
                                    "no such field {} in storage type {}",
                                    field,
                                    storage
                                );
                            };
                            index
                        }
                        other => self.const_index(other)?,
                    };
                    elem = match types::type_at_index(&storage, index) {
                        Some(ty) => ty,
                        None => bail_type_at!(self.at(), "index out of range"),
                    };
                    // fields are addressed by index from here on
                    args[i] = Argument::new(args[i].key.clone(), Value::i32(index as i32));
                }
                self.session.label_mut(l).body.args = args;
                Ok(retargtypes(vec![types::pointer(elem, flags)]))
            }
            Builtin::Unconst => {
                self.checkargs(l, 1, Some(1))?;
                let value = args[1].value.clone();
                if !self.session.is_const(&value) {
                    return Ok((true, vec![Argument::from(value)]));
                }
                match value {
                    Value::Label(label) => {
                        self.session.verify_return_label(label)?;
                        self.session.verify_compilable(label)?;
                        let fty = self.session.get_function_type(label);
                        Ok(retargtypes(vec![types::pointer(
                            fty,
                            PointerFlags {
                                readable: true,
                                writable: false,
                                storage: StorageClass::Default,
                            },
                        )]))
                    }
                    other => Ok(retargtypes(vec![self.session.indirect_type(&other)])),
                }
            }
            Builtin::ReturnLabelType | Builtin::FunctionType | Builtin::CompilerError => {
                bail_builtin_at!(self.at(), "all arguments must be constants");
            }
            other => bail_builtin_at!(self.at(), "can not type builtin {}", other),
        }
    }

    fn aggregate_field(&self, aggregate: &Type, index: usize, what: &str) -> Result<Type> {
        if canonical_kind(aggregate) != TypeKind::Aggregate {
            bail_type_at!(self.at(), "{} {}", what, aggregate);
        }
        match types::type_at_index(aggregate, index) {
            Some(ty) => Ok(ty),
            None => bail_type_at!(self.at(), "index out of range"),
        }
    }

    // =========================================================================
    // Native functions and callable values
    // =========================================================================

    /// Redirect a call to a value whose type has a call handler.
    pub(crate) fn fold_callable_call(&mut self, l: LabelId) {
        let ty = self
            .session
            .indirect_type(&self.session.label(l).body.enter);
        let handler = self
            .session
            .call_handler(&ty)
            .cloned()
            .expect("callable type without call handler");
        debug!(
            "redirecting call to value of type {} in {}",
            ty,
            self.session.label_to_string(l)
        );
        let body = &mut self.session.label_mut(l).body;
        let callee = std::mem::replace(&mut body.enter, handler);
        body.args.insert(1, Argument::from(callee));
    }

    pub(crate) fn verify_function_argument_signature(&self, fty: &Type, l: LabelId) -> Result<()> {
        let (_, params, flags) = fty
            .function_info()
            .expect("signature check against non-function type");
        let args = &self.session.label(l).body.args;
        let argcount = args.len() - 1;
        if flags.variadic {
            if argcount < params.len() {
                bail_arity_at!(
                    self.at(),
                    "argument count mismatch for call to function of type {} (need at least {}, got {})",
                    fty,
                    params.len(),
                    argcount
                );
            }
        } else if argcount != params.len() {
            bail_arity_at!(
                self.at(),
                "argument count mismatch for call to function of type {} (need {}, got {})",
                fty,
                params.len(),
                argcount
            );
        }
        for (arg, expected) in args[1..].iter().zip(params) {
            let argty = self.session.indirect_type(&arg.value);
            let (a, b) = (argty.storage_type(), expected.storage_type());
            if a == b {
                continue;
            }
            if let (Some((ea, fa)), Some((eb, fb))) = (a.pointer_info(), b.pointer_info()) {
                if ea == eb
                    && fa.readable == fb.readable
                    && fa.writable == fb.writable
                    && fb.storage == StorageClass::Default
                {
                    continue;
                }
            }
            bail_type_at!(
                self.at(),
                "argument of type {} expected, got {}",
                expected,
                argty
            );
        }
        Ok(())
    }

    /// Type a call to a native function. Pure functions called with constant
    /// arguments are evaluated through the session's foreign caller, in which
    /// case the body is rewritten and `None` is returned.
    pub(crate) fn fold_function_call(&mut self, l: LabelId) -> Result<Option<Type>> {
        let enter = self.session.label(l).body.enter.clone();
        let fty = extract_function_type(&self.session.indirect_type(&enter))
            .expect("not calling a function");
        self.verify_function_argument_signature(&fty, l)?;
        let (rtype, params, flags) = fty.function_info().expect("function type");

        let Value::Function(function) = &enter else {
            return Ok(Some(rtype.clone()));
        };
        if !flags.pure_ || !self.all_args_constant(l) {
            return Ok(Some(rtype.clone()));
        }

        let args = self.session.label(l).body.args.clone();
        let values: Vec<Value> = args[1..]
            .iter()
            .enumerate()
            .map(|(i, arg)| match &arg.value {
                // C variadics receive floats as doubles
                Value::Real { ty, bits } if i >= params.len() && *ty == types::f32() => {
                    Value::real(types::f64(), f64::from_bits(*bits))
                }
                other => other.clone(),
            })
            .collect();
        let at = self.at();
        let Some(caller) = self.session.foreign.as_mut() else {
            return Ok(Some(rtype.clone()));
        };
        debug!("evaluating pure function {} at compile time", function.symbol);
        let result = caller
            .call(function, &values)
            .map_err(|e| e.with_anchor(&at))?;
        let body = &mut self.session.label_mut(l).body;
        body.enter = args[0].value.clone();
        body.args = vec![Argument::from(Value::None), Argument::from(result)];
        Ok(None)
    }
}
