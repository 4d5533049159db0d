use crate::anchor::Anchor;
use crate::label::LabelId;
use crate::value::{Args, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BodyFlags {
    /// Folded to its final form; never reverts.
    pub complete: bool,
    /// Successors have already been scheduled by the driver.
    pub optimized: bool,
    /// Call the enter directly, bypassing call handlers of its type.
    pub raw_call: bool,
    /// Set by the expander on calls made inside a `try`; carried through folding.
    pub try_call: bool,
}

/// The single instruction of a label: call `enter` with `args`.
/// `args[0]` is the continuation.
#[derive(Debug, Clone)]
pub struct Body {
    pub anchor: Anchor,
    pub enter: Value,
    pub args: Args,
    pub flags: BodyFlags,
    /// When set, closures created in this body capture the frame that
    /// instantiates this label instead of the current one.
    pub scope_label: Option<LabelId>,
}

impl Body {
    pub fn new(anchor: Anchor) -> Self {
        Body {
            anchor,
            enter: Value::None,
            args: Args::new(),
            flags: BodyFlags::default(),
            scope_label: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.flags.complete
    }

    pub fn set_complete(&mut self) {
        self.flags.complete = true;
    }

    pub fn is_optimized(&self) -> bool {
        self.flags.optimized
    }

    pub fn set_optimized(&mut self) {
        self.flags.optimized = true;
    }

    pub fn is_rawcall(&self) -> bool {
        self.flags.raw_call
    }

    pub fn set_rawcall(&mut self, enable: bool) {
        self.flags.raw_call = enable;
    }

    pub fn copy_traits_from(&mut self, other: &Body) {
        self.flags = other.flags;
        self.anchor = other.anchor.clone();
        self.scope_label = other.scope_label;
    }
}
