use std::rc::Rc;

/// Source location attached to labels, bodies and parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Anchor {
    pub path: Rc<str>,
    pub line: usize,
    pub column: usize,
}

impl Anchor {
    pub fn new(path: &str, line: usize, column: usize) -> Self {
        Anchor {
            path: Rc::from(path),
            line,
            column,
        }
    }

    /// Anchor used for values synthesized by the compiler itself.
    pub fn builtin() -> Self {
        Anchor::new("<builtin>", 0, 0)
    }

    /// Check if this anchor points at compiler-generated code
    pub fn is_generated(&self) -> bool {
        self.line == 0 && self.column == 0
    }
}

impl Default for Anchor {
    fn default() -> Self {
        Anchor::builtin()
    }
}

impl std::fmt::Display for Anchor {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.path, self.line, self.column)
    }
}
