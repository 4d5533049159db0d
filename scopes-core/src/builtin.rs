//! Builtin opcodes and their folding classification.

use std::fmt;

macro_rules! builtins {
    ($($variant:ident => $name:literal,)*) => {
        /// Operations implemented by the compiler itself.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Builtin {
            $($variant,)*
        }

        impl Builtin {
            pub const ALL: &'static [Builtin] = &[$(Builtin::$variant,)*];

            /// Name as spelled in source.
            pub fn name(self) -> &'static str {
                match self {
                    $(Builtin::$variant => $name,)*
                }
            }

            pub fn from_name(name: &str) -> Option<Builtin> {
                match name {
                    $($name => Some(Builtin::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

builtins! {
    // integer arithmetic
    Add => "add",
    AddNUW => "add-nuw",
    AddNSW => "add-nsw",
    Sub => "sub",
    SubNUW => "sub-nuw",
    SubNSW => "sub-nsw",
    Mul => "mul",
    MulNUW => "mul-nuw",
    MulNSW => "mul-nsw",
    SDiv => "sdiv",
    UDiv => "udiv",
    SRem => "srem",
    URem => "urem",
    Shl => "shl",
    LShr => "lshr",
    AShr => "ashr",
    BAnd => "band",
    BOr => "bor",
    BXor => "bxor",
    SSign => "ssign",
    // integer comparison
    ICmpEQ => "icmp==",
    ICmpNE => "icmp!=",
    ICmpUGT => "icmp>u",
    ICmpUGE => "icmp>=u",
    ICmpULT => "icmp<u",
    ICmpULE => "icmp<=u",
    ICmpSGT => "icmp>s",
    ICmpSGE => "icmp>=s",
    ICmpSLT => "icmp<s",
    ICmpSLE => "icmp<=s",
    // real arithmetic
    FAdd => "fadd",
    FSub => "fsub",
    FMul => "fmul",
    FDiv => "fdiv",
    FRem => "frem",
    FAbs => "fabs",
    FSign => "fsign",
    Radians => "radians",
    Degrees => "degrees",
    Sin => "sin",
    Cos => "cos",
    Tan => "tan",
    Asin => "asin",
    Acos => "acos",
    Atan => "atan",
    Atan2 => "atan2",
    Exp => "exp",
    Log => "log",
    Exp2 => "exp2",
    Log2 => "log2",
    Trunc => "trunc",
    Floor => "floor",
    Step => "step",
    Pow => "pow",
    Sqrt => "sqrt",
    InverseSqrt => "inversesqrt",
    FMix => "fmix",
    Length => "length",
    Normalize => "normalize",
    Distance => "distance",
    Cross => "cross",
    // real comparison
    FCmpOEQ => "fcmp==o",
    FCmpONE => "fcmp!=o",
    FCmpORD => "fcmp-ord",
    FCmpOGT => "fcmp>o",
    FCmpOGE => "fcmp>=o",
    FCmpOLT => "fcmp<o",
    FCmpOLE => "fcmp<=o",
    FCmpUEQ => "fcmp==u",
    FCmpUNE => "fcmp!=u",
    FCmpUNO => "fcmp-uno",
    FCmpUGT => "fcmp>u",
    FCmpUGE => "fcmp>=u",
    FCmpULT => "fcmp<u",
    FCmpULE => "fcmp<=u",
    // casts
    ITrunc => "itrunc",
    ZExt => "zext",
    SExt => "sext",
    FPTrunc => "fptrunc",
    FPExt => "fpext",
    FPToUI => "fptoui",
    FPToSI => "fptosi",
    UIToFP => "uitofp",
    SIToFP => "sitofp",
    Bitcast => "bitcast",
    IntToPtr => "inttoptr",
    PtrToInt => "ptrtoint",
    // aggregates
    ExtractElement => "extractelement",
    InsertElement => "insertelement",
    ExtractValue => "extractvalue",
    InsertValue => "insertvalue",
    Select => "select",
    // memory
    Alloca => "alloca",
    AllocaArray => "alloca-array",
    Malloc => "malloc",
    MallocArray => "malloc-array",
    Free => "free",
    Load => "load",
    Store => "store",
    GetElementPtr => "getelementptr",
    Undef => "undef",
    Unconst => "unconst",
    // metaprogramming
    TypeOf => "typeof",
    IsConstant => "constant?",
    VaCountOf => "va-countof",
    VaKeys => "va-keys",
    VaValues => "va-values",
    VaKey => "va-key",
    VaAt => "va@",
    Forward => "forward",
    TupleType => "tuple-type",
    UnionType => "union-type",
    ReturnLabelType => "return-label-type",
    FunctionType => "function-type",
    CompilerError => "compiler-error!",
    Dump => "dump",
    // control flow
    Branch => "branch",
    Unreachable => "unreachable!",
    Discard => "discard!",
}

impl Builtin {
    /// Folds regardless of whether the arguments are constant.
    pub fn always_folds(self) -> bool {
        matches!(
            self,
            Builtin::TypeOf
                | Builtin::IsConstant
                | Builtin::VaCountOf
                | Builtin::VaKeys
                | Builtin::VaKey
                | Builtin::VaValues
                | Builtin::VaAt
                | Builtin::Dump
                | Builtin::TupleType
                | Builtin::UnionType
                | Builtin::Forward
        )
    }

    /// Has side effects or produces a fresh runtime value; never evaluated
    /// at compile time even with constant arguments.
    pub fn never_folds(self) -> bool {
        matches!(
            self,
            Builtin::Bitcast
                | Builtin::Unconst
                | Builtin::Undef
                | Builtin::Alloca
                | Builtin::AllocaArray
                | Builtin::Malloc
                | Builtin::MallocArray
                | Builtin::Free
                | Builtin::Unreachable
                | Builtin::Discard
                | Builtin::Store
                | Builtin::Load
                | Builtin::GetElementPtr
                | Builtin::Select
        )
    }

    /// Accepts keyword arguments.
    pub fn has_keyed_args(self) -> bool {
        matches!(
            self,
            Builtin::VaCountOf
                | Builtin::VaKeys
                | Builtin::VaValues
                | Builtin::VaAt
                | Builtin::Dump
                | Builtin::ReturnLabelType
                | Builtin::TupleType
                | Builtin::UnionType
        )
    }

    pub fn is_icmp(self) -> bool {
        matches!(
            self,
            Builtin::ICmpEQ
                | Builtin::ICmpNE
                | Builtin::ICmpUGT
                | Builtin::ICmpUGE
                | Builtin::ICmpULT
                | Builtin::ICmpULE
                | Builtin::ICmpSGT
                | Builtin::ICmpSGE
                | Builtin::ICmpSLT
                | Builtin::ICmpSLE
        )
    }

    pub fn is_fcmp(self) -> bool {
        matches!(
            self,
            Builtin::FCmpOEQ
                | Builtin::FCmpONE
                | Builtin::FCmpORD
                | Builtin::FCmpOGT
                | Builtin::FCmpOGE
                | Builtin::FCmpOLT
                | Builtin::FCmpOLE
                | Builtin::FCmpUEQ
                | Builtin::FCmpUNE
                | Builtin::FCmpUNO
                | Builtin::FCmpUGT
                | Builtin::FCmpUGE
                | Builtin::FCmpULT
                | Builtin::FCmpULE
        )
    }

    /// Two integer operands, result of the first operand's type.
    pub fn is_integer_binop(self) -> bool {
        matches!(
            self,
            Builtin::Add
                | Builtin::AddNUW
                | Builtin::AddNSW
                | Builtin::Sub
                | Builtin::SubNUW
                | Builtin::SubNSW
                | Builtin::Mul
                | Builtin::MulNUW
                | Builtin::MulNSW
                | Builtin::SDiv
                | Builtin::UDiv
                | Builtin::SRem
                | Builtin::URem
                | Builtin::Shl
                | Builtin::LShr
                | Builtin::AShr
                | Builtin::BAnd
                | Builtin::BOr
                | Builtin::BXor
        )
    }

    /// One real operand, result of the same type.
    pub fn is_real_unop(self) -> bool {
        matches!(
            self,
            Builtin::FAbs
                | Builtin::FSign
                | Builtin::Radians
                | Builtin::Degrees
                | Builtin::Sin
                | Builtin::Cos
                | Builtin::Tan
                | Builtin::Asin
                | Builtin::Acos
                | Builtin::Atan
                | Builtin::Exp
                | Builtin::Log
                | Builtin::Exp2
                | Builtin::Log2
                | Builtin::Trunc
                | Builtin::Floor
                | Builtin::Sqrt
                | Builtin::InverseSqrt
        )
    }

    /// Two real operands, result of the first operand's type.
    pub fn is_real_binop(self) -> bool {
        matches!(
            self,
            Builtin::FAdd
                | Builtin::FSub
                | Builtin::FMul
                | Builtin::FDiv
                | Builtin::FRem
                | Builtin::Atan2
                | Builtin::Step
                | Builtin::Pow
        )
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
