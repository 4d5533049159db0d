//! Native collaborators of the specializer.
//!
//! - `ForeignCaller`: evaluates a call to a native function at compile time
//! - label macros: native functions that rewrite a label body in place
//! - call handlers: per-type entry points used when a value of that type is called

use crate::error::Result;
use crate::label::LabelId;
use crate::session::Session;
use crate::types::Type;
use crate::value::Value;

/// A native function value: its link-time symbol and its function type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForeignFunction {
    pub symbol: String,
    pub ty: Type,
}

impl ForeignFunction {
    pub fn new(symbol: &str, ty: Type) -> Self {
        ForeignFunction {
            symbol: symbol.to_string(),
            ty,
        }
    }
}

/// Performs compile-time calls into native code.
///
/// The specializer only calls pure functions whose arguments are all
/// constants, and expects exactly one result value back.
pub trait ForeignCaller {
    fn call(&mut self, function: &ForeignFunction, args: &[Value]) -> Result<Value>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacroId(pub u32);

/// Rewrites the body of the given label. A macro must change the body's
/// enter, either to a final callee or to a further macro.
pub type LabelMacroFn = fn(&mut Session, LabelId) -> Result<()>;

impl Session {
    pub fn set_foreign_caller(&mut self, caller: Box<dyn ForeignCaller>) {
        self.foreign = Some(caller);
    }

    pub fn register_label_macro(&mut self, name: &str, f: LabelMacroFn) -> Value {
        let id = MacroId(self.label_macros.len() as u32);
        self.label_macros.push((name.to_string(), f));
        Value::LabelMacro(id)
    }

    pub fn label_macro(&self, id: MacroId) -> LabelMacroFn {
        self.label_macros[id.0 as usize].1
    }

    pub fn label_macro_name(&self, id: MacroId) -> &str {
        &self.label_macros[id.0 as usize].0
    }

    /// Calls to values of type `ty` are redirected to `handler`, with the
    /// called value inserted as first argument.
    pub fn set_call_handler(&mut self, ty: Type, handler: Value) {
        self.call_handlers.insert(ty, handler);
    }

    pub fn call_handler(&self, ty: &Type) -> Option<&Value> {
        self.call_handlers.get(ty)
    }
}
