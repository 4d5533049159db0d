//! Tagged values flowing through label bodies.
//!
//! `Value` is a closed sum type over everything that can appear as the
//! `enter` of a body or as one of its arguments: compile-time constants,
//! references into the session arenas, and `Unknown` placeholders that
//! stand for a runtime value of a known (or not yet known) type.

use crate::builtin::Builtin;
use crate::closure::ClosureId;
use crate::ffi::{ForeignFunction, MacroId};
use crate::label::LabelId;
use crate::parameter::ParamId;
use crate::types::{self, Type, TypeExt};
use itertools::Itertools;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// The empty value; also marks a cleared continuation slot.
    None,
    Bool(bool),
    /// Integer constant, `bits` masked to the width of `ty`.
    Int { ty: Type, bits: u64 },
    /// Real constant stored as f64 bits; f32 values are rounded on construction.
    Real { ty: Type, bits: u64 },
    Vector { ty: Type, elements: Vec<Value> },
    /// Array or tuple constant.
    Aggregate { ty: Type, elements: Vec<Value> },
    Symbol(String),
    Type(Type),
    Label(LabelId),
    Closure(ClosureId),
    Parameter(ParamId),
    Builtin(Builtin),
    Function(ForeignFunction),
    LabelMacro(MacroId),
    /// Placeholder for a runtime value of the given type.
    Unknown(Type),
}

impl Value {
    /// Placeholder whose type is still to be inferred.
    pub fn untyped() -> Value {
        Value::Unknown(types::unknown())
    }

    pub fn unknown_of(ty: Type) -> Value {
        Value::Unknown(ty)
    }

    pub fn int(ty: Type, value: i64) -> Value {
        let width = ty.storage_type().integer_info().map(|(w, _)| w).unwrap_or(64);
        Value::Int {
            ty,
            bits: mask(value as u64, width),
        }
    }

    pub fn i32(value: i32) -> Value {
        Value::int(types::i32(), value as i64)
    }

    pub fn real(ty: Type, value: f64) -> Value {
        let value = match ty.storage_type().real_width() {
            Some(32) => value as f32 as f64,
            _ => value,
        };
        Value::Real {
            ty,
            bits: value.to_bits(),
        }
    }

    pub fn f32(value: f32) -> Value {
        Value::real(types::f32(), value as f64)
    }

    pub fn symbol(name: &str) -> Value {
        Value::Symbol(name.to_string())
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Value::Unknown(_))
    }

    /// True for placeholders whose type has been inferred.
    pub fn is_typed(&self) -> bool {
        match self {
            Value::Unknown(ty) => !ty.is_unknown_type(),
            _ => true,
        }
    }

    /// The type of the value itself. Parameters report `Parameter`;
    /// use `Session::indirect_type` to see through bound parameters.
    pub fn type_of(&self) -> Type {
        match self {
            Value::None => types::nothing(),
            Value::Bool(_) => types::bool_type(),
            Value::Int { ty, .. }
            | Value::Real { ty, .. }
            | Value::Vector { ty, .. }
            | Value::Aggregate { ty, .. } => ty.clone(),
            Value::Symbol(_) => types::symbol(),
            Value::Type(_) => types::type_type(),
            Value::Label(_) => types::label_type(),
            Value::Closure(_) => types::closure_type(),
            Value::Parameter(_) => types::parameter_type(),
            Value::Builtin(_) => types::builtin_type(),
            Value::Function(f) => f.ty.clone(),
            Value::LabelMacro(_) => types::label_macro_type(),
            Value::Unknown(ty) => ty.clone(),
        }
    }

    /// Unsigned integer payload, with bools as 0/1.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Int { bits, .. } => Some(*bits),
            Value::Bool(b) => Some(*b as u64),
            _ => None,
        }
    }

    /// Integer payload sign-extended from its declared width.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int { ty, bits } => {
                let width = ty.storage_type().integer_info().map(|(w, _)| w).unwrap_or(64);
                Some(sign_extend(*bits, width))
            }
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real { bits, .. } => Some(f64::from_bits(*bits)),
            _ => None,
        }
    }

    pub fn as_label(&self) -> Option<LabelId> {
        match self {
            Value::Label(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_parameter(&self) -> Option<ParamId> {
        match self {
            Value::Parameter(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_closure(&self) -> Option<ClosureId> {
        match self {
            Value::Closure(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<&Type> {
        match self {
            Value::Type(ty) => Some(ty),
            _ => None,
        }
    }
}

/// Truncate `bits` to `width` bits.
pub fn mask(bits: u64, width: usize) -> u64 {
    if width >= 64 {
        bits
    } else {
        bits & ((1u64 << width) - 1)
    }
}

/// Interpret the low `width` bits as a two's complement integer.
pub fn sign_extend(bits: u64, width: usize) -> i64 {
    if width >= 64 || width == 0 {
        bits as i64
    } else {
        let shift = 64 - width;
        ((bits << shift) as i64) >> shift
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::None => write!(f, "none"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int { ty, .. } => {
                let signed = ty.storage_type().integer_info().map(|(_, s)| s).unwrap_or(true);
                if signed {
                    write!(f, "{}:{}", self.as_i64().unwrap_or_default(), ty)
                } else {
                    write!(f, "{}:{}", self.as_u64().unwrap_or_default(), ty)
                }
            }
            Value::Real { ty, bits } => write!(f, "{}:{}", f64::from_bits(*bits), ty),
            Value::Vector { elements, .. } => {
                write!(f, "<{}>", elements.iter().join(" "))
            }
            Value::Aggregate { elements, .. } => {
                write!(f, "{{{}}}", elements.iter().join(" "))
            }
            Value::Symbol(s) => write!(f, "'{}", s),
            Value::Type(ty) => write!(f, "{}", ty),
            Value::Label(id) => write!(f, "label#{}", id.0),
            Value::Closure(id) => write!(f, "closure#{}", id.0),
            Value::Parameter(id) => write!(f, "param#{}", id.0),
            Value::Builtin(b) => write!(f, "{}", b),
            Value::Function(func) => write!(f, "{}", func.symbol),
            Value::LabelMacro(id) => write!(f, "macro#{}", id.0),
            Value::Unknown(ty) => write!(f, "?{}", ty),
        }
    }
}

/// One actual argument of a body: an optional keyword plus its value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Argument {
    pub key: Option<String>,
    pub value: Value,
}

impl Argument {
    pub fn new(key: Option<String>, value: Value) -> Self {
        Argument { key, value }
    }

    pub fn keyed(key: &str, value: Value) -> Self {
        Argument {
            key: Some(key.to_string()),
            value,
        }
    }

    pub fn is_keyed(&self) -> bool {
        self.key.is_some()
    }
}

impl From<Value> for Argument {
    fn from(value: Value) -> Self {
        Argument { key: None, value }
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{}={}", key, self.value),
            None => write!(f, "{}", self.value),
        }
    }
}

pub type Args = Vec<Argument>;
