use crate::anchor::Anchor;
use crate::label::LabelId;
use crate::types::{self, Type, TypeExt};
use std::fmt;

/// Index of the continuation slot in parameter and argument lists.
pub const PARAM_CONT: usize = 0;
/// Index of the first regular argument.
pub const PARAM_ARG0: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(pub u32);

impl From<u32> for ParamId {
    fn from(id: u32) -> Self {
        ParamId(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    Regular,
    /// Absorbs all remaining arguments; only valid as the last parameter.
    Variadic,
}

/// Formal slot of a label. Bound to exactly one label by `Session::append`.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub anchor: Anchor,
    /// Empty for unnamed parameters.
    pub name: String,
    pub ty: Type,
    pub label: Option<LabelId>,
    pub index: usize,
    pub kind: ParameterKind,
}

impl Parameter {
    pub fn new(anchor: Anchor, name: &str, ty: Type) -> Self {
        Parameter {
            anchor,
            name: name.to_string(),
            ty,
            label: None,
            index: 0,
            kind: ParameterKind::Regular,
        }
    }

    /// Untyped parameter
    pub fn untyped(anchor: Anchor, name: &str) -> Self {
        Parameter::new(anchor, name, types::unknown())
    }

    pub fn variadic(anchor: Anchor, name: &str, ty: Type) -> Self {
        Parameter {
            kind: ParameterKind::Variadic,
            ..Parameter::new(anchor, name, ty)
        }
    }

    /// Unbound copy of a template parameter
    pub fn from_template(template: &Parameter) -> Self {
        Parameter {
            label: None,
            index: 0,
            ..template.clone()
        }
    }

    pub fn is_variadic(&self) -> bool {
        self.kind == ParameterKind::Variadic
    }

    pub fn is_typed(&self) -> bool {
        !self.ty.is_unknown_type()
    }

    /// A parameter typed `Nothing` never receives a value.
    pub fn is_none(&self) -> bool {
        self.ty.is_nothing()
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = if self.name.is_empty() { "_" } else { &self.name };
        write!(f, "%{}", name)?;
        if self.is_variadic() {
            write!(f, "...")?;
        }
        if self.is_typed() {
            write!(f, ":{}", self.ty)?;
        }
        Ok(())
    }
}
