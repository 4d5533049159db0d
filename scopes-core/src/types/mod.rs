//! Type definitions and utilities for the label IR.
//!
//! This module contains:
//! - `TypeName`: the type name constructors understood by the specializer
//! - Helper functions for creating common types (i32, f32, vectors, return labels, ...)
//! - `TypeExt`: queries the specializer runs against types instead of matching
//!   on `TypeName` variants directly


use crate::value::{Argument, Value};
use itertools::Itertools;

// Type aliases for polytype types specialized to our TypeName
pub type Type = polytype::Type<TypeName>;

/// Field names of a tuple or union type, in declaration order.
/// Unnamed fields are `None`. The field types live in `Type::Constructed` args.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Fields(pub Vec<Option<String>>);

impl Fields {
    pub fn unnamed(count: usize) -> Self {
        Fields(vec![None; count])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Option<String>> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get_index(&self, key: &str) -> Option<usize> {
        self.0.iter().position(|name| name.as_deref() == Some(key))
    }
}

impl FromIterator<Option<String>> for Fields {
    fn from_iter<T: IntoIterator<Item = Option<String>>>(iter: T) -> Self {
        Fields(iter.into_iter().collect())
    }
}

/// Where the memory a pointer refers to lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StorageClass {
    /// Heap or foreign memory, freely returnable.
    #[default]
    Default,
    /// Stack memory of the current function.
    Function,
    /// Memory with static lifetime owned by the compiler.
    Private,
}

/// Access rights of a pointer type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PointerFlags {
    pub readable: bool,
    pub writable: bool,
    pub storage: StorageClass,
}

impl Default for PointerFlags {
    fn default() -> Self {
        PointerFlags {
            readable: true,
            writable: true,
            storage: StorageClass::Default,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FunctionFlags {
    /// Accepts further arguments after the declared ones.
    pub variadic: bool,
    /// Never returns to its caller.
    pub divergent: bool,
    /// Has no side effects; may be evaluated at compile time.
    pub pure_: bool,
}

/// Type name constructors for the label IR.
///
/// Note on type name variants:
/// - `Str`: primitive names hardcoded in the compiler ("bool", "void", "Nothing",
///   "Unknown", "type", "Symbol", "Label", "Closure", "Builtin", "Parameter", "LabelMacro")
/// - `Int/UInt/Float`: numeric types with bit widths
/// - `Vec/Array`: take `[Size(n), element]` as type args
/// - `ReturnLabel`: the type of a typed continuation, listing the values it receives
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeName {
    Str(&'static str),
    /// Signed integer types: i8, i16, i32, i64
    Int(usize),
    /// Unsigned integer types: u8, u16, u32, u64
    UInt(usize),
    /// Floating point types: f32, f64
    Float(usize),
    /// Element count of a vector or array
    Size(usize),
    /// Vector type constructor (takes size and element type)
    Vec,
    /// Array type constructor (takes size and element type)
    Array,
    /// Tuple type; field types stored in Type::Constructed args
    Tuple(Fields),
    /// Union type; field types stored in Type::Constructed args
    Union(Fields),
    /// Pointer type; the pointee is stored in Type::Constructed args
    Pointer(PointerFlags),
    /// Function signature; args are `[return label, param0, param1, ...]`
    Function(FunctionFlags),
    /// Binary arrow required by polytype; only used for display
    Arrow,
    /// Typed continuation receiving the given values
    ReturnLabel(Vec<Argument>),
    /// Continuation of a function that never returns
    NoReturn,
    /// Nominal type; the optional storage type is stored in args
    Named(String),
}

impl std::fmt::Display for TypeName {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", polytype::Name::show(self))
    }
}

impl polytype::Name for TypeName {
    fn arrow() -> Self {
        TypeName::Arrow
    }

    fn show(&self) -> String {
        match self {
            TypeName::Str(s) => s.to_string(),
            TypeName::Int(bits) => format!("i{}", bits),
            TypeName::UInt(bits) => format!("u{}", bits),
            TypeName::Float(bits) => format!("f{}", bits),
            TypeName::Size(n) => format!("{}", n),
            TypeName::Vec => "vector".to_string(),
            TypeName::Array => "array".to_string(),
            TypeName::Tuple(_) => "tuple".to_string(),
            TypeName::Union(_) => "union".to_string(),
            TypeName::Pointer(flags) => {
                let mut s = String::from("pointer");
                if !flags.writable {
                    s.push_str("-ro");
                }
                if !flags.readable {
                    s.push_str("-wo");
                }
                match flags.storage {
                    StorageClass::Default => {}
                    StorageClass::Function => s.push_str("-local"),
                    StorageClass::Private => s.push_str("-static"),
                }
                s
            }
            TypeName::Function(flags) => {
                if flags.variadic {
                    "function...".to_string()
                } else {
                    "function".to_string()
                }
            }
            TypeName::Arrow => "->".to_string(),
            TypeName::ReturnLabel(values) => {
                let inner = values.iter().map(show_return_value).join(" ");
                format!("λ({})", inner)
            }
            TypeName::NoReturn => "λ<noreturn>".to_string(),
            TypeName::Named(name) => name.clone(),
        }
    }
}

fn show_return_value(arg: &Argument) -> String {
    let value = match &arg.value {
        Value::Unknown(ty) => ty.to_string(),
        other => other.to_string(),
    };
    match &arg.key {
        Some(key) => format!("{}={}", key, value),
        None => value,
    }
}

impl From<&'static str> for TypeName {
    fn from(s: &'static str) -> Self {
        TypeName::Str(s)
    }
}

// =============================================================================
// Type helper functions
// =============================================================================

fn prim(name: &'static str) -> Type {
    Type::Constructed(TypeName::Str(name), vec![])
}

pub fn bool_type() -> Type {
    prim("bool")
}

pub fn void() -> Type {
    prim("void")
}

/// Type of `none`, and of continuation parameters that never receive a call.
pub fn nothing() -> Type {
    prim("Nothing")
}

/// Marker type of parameters that have not been typed yet.
pub fn unknown() -> Type {
    prim("Unknown")
}

pub fn type_type() -> Type {
    prim("type")
}

pub fn symbol() -> Type {
    prim("Symbol")
}

pub fn label_type() -> Type {
    prim("Label")
}

pub fn closure_type() -> Type {
    prim("Closure")
}

pub fn builtin_type() -> Type {
    prim("Builtin")
}

pub fn parameter_type() -> Type {
    prim("Parameter")
}

pub fn label_macro_type() -> Type {
    prim("LabelMacro")
}

pub fn int(bits: usize) -> Type {
    Type::Constructed(TypeName::Int(bits), vec![])
}

pub fn uint(bits: usize) -> Type {
    Type::Constructed(TypeName::UInt(bits), vec![])
}

pub fn float(bits: usize) -> Type {
    Type::Constructed(TypeName::Float(bits), vec![])
}

pub fn i8() -> Type {
    int(8)
}

pub fn i32() -> Type {
    int(32)
}

pub fn i64() -> Type {
    int(64)
}

pub fn u8() -> Type {
    uint(8)
}

pub fn u32() -> Type {
    uint(32)
}

pub fn u64() -> Type {
    uint(64)
}

pub fn f32() -> Type {
    float(32)
}

pub fn f64() -> Type {
    float(64)
}

fn size(n: usize) -> Type {
    Type::Constructed(TypeName::Size(n), vec![])
}

/// Create a vector type: vec(4, f32()) is a vector of four f32
pub fn vec(count: usize, element_type: Type) -> Type {
    Type::Constructed(TypeName::Vec, vec![size(count), element_type])
}

pub fn array(count: usize, element_type: Type) -> Type {
    Type::Constructed(TypeName::Array, vec![size(count), element_type])
}

pub fn tuple(types: Vec<Type>) -> Type {
    Type::Constructed(TypeName::Tuple(Fields::unnamed(types.len())), types)
}

/// Create a tuple type with (optionally) named fields
pub fn keyed_tuple(fields: Vec<(Option<String>, Type)>) -> Type {
    let (names, types): (Vec<Option<String>>, Vec<Type>) = fields.into_iter().unzip();
    Type::Constructed(TypeName::Tuple(Fields(names)), types)
}

pub fn union_type(fields: Vec<(Option<String>, Type)>) -> Type {
    let (names, types): (Vec<Option<String>>, Vec<Type>) = fields.into_iter().unzip();
    Type::Constructed(TypeName::Union(Fields(names)), types)
}

pub fn pointer(element_type: Type, flags: PointerFlags) -> Type {
    Type::Constructed(TypeName::Pointer(flags), vec![element_type])
}

/// Pointer to heap memory, readable and writable
pub fn native_pointer(element_type: Type) -> Type {
    pointer(element_type, PointerFlags::default())
}

/// Pointer to stack memory of the enclosing function
pub fn local_pointer(element_type: Type) -> Type {
    pointer(
        element_type,
        PointerFlags {
            storage: StorageClass::Function,
            ..PointerFlags::default()
        },
    )
}

/// Read-only pointer to stack memory of the enclosing function
pub fn local_ro_pointer(element_type: Type) -> Type {
    pointer(
        element_type,
        PointerFlags {
            writable: false,
            storage: StorageClass::Function,
            ..PointerFlags::default()
        },
    )
}

/// Function signature: `return_type` must be a return label type
pub fn function(return_type: Type, params: Vec<Type>, flags: FunctionFlags) -> Type {
    let mut args = Vec::with_capacity(params.len() + 1);
    args.push(return_type);
    args.extend(params);
    Type::Constructed(TypeName::Function(flags), args)
}

/// Create a return label type receiving `values`
pub fn return_label(values: Vec<Argument>) -> Type {
    Type::Constructed(TypeName::ReturnLabel(values), vec![])
}

/// Create a return label type receiving one untyped placeholder per type
pub fn return_label_of(types: Vec<Type>) -> Type {
    return_label(types.into_iter().map(|ty| Argument::from(Value::Unknown(ty))).collect())
}

pub fn no_return_label() -> Type {
    Type::Constructed(TypeName::NoReturn, vec![])
}

/// Nominal type stored as `storage`
pub fn named(name: &str, storage: Type) -> Type {
    Type::Constructed(TypeName::Named(name.to_string()), vec![storage])
}

// =============================================================================
// Type extension traits
// =============================================================================

/// Extension trait for common type queries.
///
/// Centralizes type queries so passes don't need to pattern-match
/// on TypeName variants directly.
pub trait TypeExt {
    /// Strip nominal wrappers down to the type used for storage
    fn storage_type(&self) -> &Type;

    /// True for the marker type of untyped parameters
    fn is_unknown_type(&self) -> bool;

    fn is_nothing(&self) -> bool;

    fn is_bool(&self) -> bool;

    /// Width and signedness for integer types; bool counts as unsigned 1-bit
    fn integer_info(&self) -> Option<(usize, bool)>;

    /// Width of a floating point type
    fn real_width(&self) -> Option<usize>;

    /// Element type and count of a vector type
    fn vector_info(&self) -> Option<(&Type, usize)>;

    /// Element type and count of an array type
    fn array_info(&self) -> Option<(&Type, usize)>;

    /// Pointee and flags of a pointer type
    fn pointer_info(&self) -> Option<(&Type, PointerFlags)>;

    /// Return label, parameter types and flags of a function type
    fn function_info(&self) -> Option<(&Type, &[Type], FunctionFlags)>;

    /// Values received by a return label; None for non-returning or non-labels
    fn return_values(&self) -> Option<&[Argument]>;

    fn is_return_label(&self) -> bool;

    /// False only for the non-returning return label
    fn is_returning(&self) -> bool;

    /// True if any value of a return label is not a constant
    fn has_variables(&self) -> bool;

    /// Replace constant values of a return label by placeholders of their type
    fn to_unconst(&self) -> Type;
}

impl TypeExt for Type {
    fn storage_type(&self) -> &Type {
        match self {
            Type::Constructed(TypeName::Named(_), args) if !args.is_empty() => {
                args[0].storage_type()
            }
            _ => self,
        }
    }

    fn is_unknown_type(&self) -> bool {
        matches!(self, Type::Constructed(TypeName::Str("Unknown"), _))
    }

    fn is_nothing(&self) -> bool {
        matches!(self, Type::Constructed(TypeName::Str("Nothing"), _))
    }

    fn is_bool(&self) -> bool {
        matches!(self, Type::Constructed(TypeName::Str("bool"), _))
    }

    fn integer_info(&self) -> Option<(usize, bool)> {
        match self {
            Type::Constructed(TypeName::Int(bits), _) => Some((*bits, true)),
            Type::Constructed(TypeName::UInt(bits), _) => Some((*bits, false)),
            Type::Constructed(TypeName::Str("bool"), _) => Some((1, false)),
            _ => None,
        }
    }

    fn real_width(&self) -> Option<usize> {
        match self {
            Type::Constructed(TypeName::Float(bits), _) => Some(*bits),
            _ => None,
        }
    }

    fn vector_info(&self) -> Option<(&Type, usize)> {
        match self {
            Type::Constructed(TypeName::Vec, args) if args.len() == 2 => match &args[0] {
                Type::Constructed(TypeName::Size(n), _) => Some((&args[1], *n)),
                _ => None,
            },
            _ => None,
        }
    }

    fn array_info(&self) -> Option<(&Type, usize)> {
        match self {
            Type::Constructed(TypeName::Array, args) if args.len() == 2 => match &args[0] {
                Type::Constructed(TypeName::Size(n), _) => Some((&args[1], *n)),
                _ => None,
            },
            _ => None,
        }
    }

    fn pointer_info(&self) -> Option<(&Type, PointerFlags)> {
        match self {
            Type::Constructed(TypeName::Pointer(flags), args) if args.len() == 1 => {
                Some((&args[0], *flags))
            }
            _ => None,
        }
    }

    fn function_info(&self) -> Option<(&Type, &[Type], FunctionFlags)> {
        match self {
            Type::Constructed(TypeName::Function(flags), args) if !args.is_empty() => {
                Some((&args[0], &args[1..], *flags))
            }
            _ => None,
        }
    }

    fn return_values(&self) -> Option<&[Argument]> {
        match self {
            Type::Constructed(TypeName::ReturnLabel(values), _) => Some(values),
            _ => None,
        }
    }

    fn is_return_label(&self) -> bool {
        matches!(
            self,
            Type::Constructed(TypeName::ReturnLabel(_), _) | Type::Constructed(TypeName::NoReturn, _)
        )
    }

    fn is_returning(&self) -> bool {
        !matches!(self, Type::Constructed(TypeName::NoReturn, _))
    }

    fn has_variables(&self) -> bool {
        self.return_values()
            .map(|values| values.iter().any(|arg| arg.value.is_unknown()))
            .unwrap_or(false)
    }

    fn to_unconst(&self) -> Type {
        match self.return_values() {
            Some(values) => return_label(
                values
                    .iter()
                    .map(|arg| match &arg.value {
                        Value::Unknown(_) => arg.clone(),
                        other => Argument::new(arg.key.clone(), Value::Unknown(other.type_of())),
                    })
                    .collect(),
            ),
            None => self.clone(),
        }
    }
}

/// Return type of comparisons: bool, or a bool vector matching the operand shape
pub fn bool_op_return_type(ty: &Type) -> Type {
    match ty.storage_type().vector_info() {
        Some((_, count)) => vec(count, bool_type()),
        None => bool_type(),
    }
}

/// Element type of arrays, vectors and tuples at `index`
pub fn type_at_index(ty: &Type, index: usize) -> Option<Type> {
    let ty = ty.storage_type();
    if let Some((elem, count)) = ty.vector_info().or_else(|| ty.array_info()) {
        return (index < count).then(|| elem.clone());
    }
    match ty {
        Type::Constructed(TypeName::Tuple(_), args) | Type::Constructed(TypeName::Union(_), args) => {
            args.get(index).cloned()
        }
        _ => None,
    }
}

/// Index of the field named `key` in a tuple type
pub fn field_index(ty: &Type, key: &str) -> Option<usize> {
    match ty.storage_type() {
        Type::Constructed(TypeName::Tuple(fields), _) => fields.get_index(key),
        _ => None,
    }
}

/// Coarse storage categories; values may only be bitcast within a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Integer,
    Pointer,
    Vector,
    Aggregate,
    Function,
    Other,
}

/// Category of a storage type; reals share the integer category
pub fn canonical_kind(ty: &Type) -> TypeKind {
    let ty = ty.storage_type();
    if ty.integer_info().is_some() || ty.real_width().is_some() {
        TypeKind::Integer
    } else if ty.pointer_info().is_some() {
        TypeKind::Pointer
    } else if ty.vector_info().is_some() {
        TypeKind::Vector
    } else if ty.array_info().is_some()
        || matches!(
            ty,
            Type::Constructed(TypeName::Tuple(_), _) | Type::Constructed(TypeName::Union(_), _)
        )
    {
        TypeKind::Aggregate
    } else if ty.function_info().is_some() {
        TypeKind::Function
    } else {
        TypeKind::Other
    }
}
