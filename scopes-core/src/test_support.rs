//! Builders shared by the unit tests.

use crate::anchor::Anchor;
use crate::label::LabelId;
use crate::parameter::{ParamId, Parameter};
use crate::session::Session;
use crate::types::Type;
use crate::value::{Argument, Value};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn at(line: usize) -> Anchor {
    Anchor::new("test.sc", line, 1)
}

fn append_params(s: &mut Session, l: LabelId, params: &[(&str, Option<Type>)]) -> Vec<ParamId> {
    let mut ids = vec![s.label(l).params[0]];
    for (name, ty) in params {
        let param = match ty {
            Some(ty) => Parameter::new(at(1), name, ty.clone()),
            None => Parameter::untyped(at(1), name),
        };
        ids.push(s.append(l, param));
    }
    ids
}

/// Function template; the returned ids start with the continuation.
pub fn function(s: &mut Session, name: &str, params: &[(&str, Option<Type>)]) -> (LabelId, Vec<ParamId>) {
    let l = s.function_from(at(1), name);
    let ids = append_params(s, l, params);
    (l, ids)
}

pub fn inline(s: &mut Session, name: &str, params: &[(&str, Option<Type>)]) -> (LabelId, Vec<ParamId>) {
    let l = s.inline_from(at(1), name);
    let ids = append_params(s, l, params);
    (l, ids)
}

/// Basic block template; its continuation slot is typed `Nothing`.
pub fn block(s: &mut Session, name: &str, params: &[(&str, Option<Type>)]) -> (LabelId, Vec<ParamId>) {
    let l = s.continuation_from(at(1), name);
    let ids = append_params(s, l, params);
    (l, ids)
}

pub fn set_body(s: &mut Session, l: LabelId, enter: Value, args: Vec<Argument>) {
    let body = &mut s.label_mut(l).body;
    body.anchor = at(2);
    body.enter = enter;
    body.args = args;
}

pub fn param(p: ParamId) -> Argument {
    Argument::from(Value::Parameter(p))
}

pub fn label(l: LabelId) -> Argument {
    Argument::from(Value::Label(l))
}

pub fn none() -> Argument {
    Argument::from(Value::None)
}
