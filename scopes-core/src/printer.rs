//! Textual rendering of labels and values for diagnostics.

use std::fmt::Write;

use itertools::Itertools;

use crate::label::LabelId;
use crate::session::Session;
use crate::value::{Argument, Value};

impl Session {
    /// Short form, `name#uid`; templates are marked with a leading `$`.
    pub fn label_to_string(&self, id: LabelId) -> String {
        let label = self.label(id);
        let marker = if label.is_template() { "$" } else { "" };
        format!("{}{}#{}", marker, label.name, label.uid)
    }

    pub fn value_to_string(&self, value: &Value) -> String {
        match value {
            Value::Label(l) => self.label_to_string(*l),
            Value::Parameter(p) => {
                let param = self.param(*p);
                match param.label {
                    Some(owner) => format!("{}{}", self.label_to_string(owner), param),
                    None => param.to_string(),
                }
            }
            Value::Closure(c) => {
                let closure = self.closure(*c);
                format!(
                    "closure({} in frame {})",
                    self.label_to_string(closure.label),
                    closure.frame.0
                )
            }
            Value::LabelMacro(m) => format!("macro {}", self.label_macro_name(*m)),
            other => other.to_string(),
        }
    }

    fn argument_to_string(&self, arg: &Argument) -> String {
        match &arg.key {
            Some(key) => format!("{}={}", key, self.value_to_string(&arg.value)),
            None => self.value_to_string(&arg.value),
        }
    }

    /// One line per label: header with parameters, then the body call.
    pub fn body_to_string(&self, id: LabelId) -> String {
        let label = self.label(id);
        let params = label
            .params
            .iter()
            .map(|p| self.param(*p).to_string())
            .join(" ");
        let args = label
            .body
            .args
            .iter()
            .map(|arg| self.argument_to_string(arg))
            .join(" ");
        let mut flags = String::new();
        if label.is_inline() {
            flags.push_str(" inline");
        }
        if label.is_merge() {
            flags.push_str(" merge");
        }
        if label.is_reentrant() {
            flags.push_str(" reentrant");
        }
        format!(
            "{} ({}){} = {} {}",
            self.label_to_string(id),
            params,
            flags,
            self.value_to_string(&label.body.enter),
            args
        )
    }

    /// Every label reachable from `entry`, grouped by function.
    pub fn function_to_string(&self, entry: LabelId) -> String {
        let mut out = String::new();
        for l in self.build_reachable(entry) {
            let indent = if self.is_basic_block_like(l) { "  " } else { "" };
            let _ = writeln!(out, "{}{}", indent, self.body_to_string(l));
        }
        out
    }
}
