//! Instantiation contexts.
//!
//! A frame records how one template label was instantiated: its parent
//! context, the folded arguments that stand in for the template's
//! parameters, and the produced instance. Each frame memoizes its child
//! instantiations by `ArgsKey`, so the same (label, folded arguments) pair is
//! never instantiated twice under one parent.

use indexmap::IndexMap;

use crate::label::LabelId;
use crate::session::Session;
use crate::value::{Args, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u32);

impl From<u32> for FrameId {
    fn from(id: u32) -> Self {
        FrameId(id)
    }
}

/// Memo key: the template label plus the folded argument vector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArgsKey {
    pub label: LabelId,
    pub args: Args,
}

impl ArgsKey {
    pub fn new(label: LabelId, args: Args) -> Self {
        ArgsKey { label, args }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// Values bound to the template's parameters, in parameter order.
    pub args: Args,
    pub parent: Option<FrameId>,
    /// Template this frame instantiates; `None` for the root sentinel.
    pub label: Option<LabelId>,
    /// Number of consecutive re-entries of `label` from its own frame.
    pub loop_count: usize,
    /// Merge labels below this frame are inlined into the branch continuation.
    pub inline_merge: bool,
    instance: Option<LabelId>,
    frames: IndexMap<ArgsKey, FrameId>,
}

impl Frame {
    /// The sentinel every frame chain ends in.
    pub fn root() -> Self {
        Frame::default()
    }

    pub fn new(parent: FrameId, label: LabelId, instance: LabelId, loop_count: usize) -> Self {
        Frame {
            args: Args::new(),
            parent: Some(parent),
            label: Some(label),
            loop_count,
            inline_merge: false,
            instance: Some(instance),
            frames: IndexMap::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn instance(&self) -> LabelId {
        self.instance.expect("root frame has no instance")
    }

    /// True if every bound argument past the continuation is a compile-time constant.
    pub fn all_args_constant(&self) -> bool {
        self.args
            .iter()
            .skip(1)
            .all(|arg| !matches!(arg.value, Value::Unknown(_) | Value::Parameter(_)))
    }

    pub fn find_frame(&self, key: &ArgsKey) -> Option<FrameId> {
        self.frames.get(key).copied()
    }

    /// First instantiation of `label` under this frame, whatever its arguments.
    pub fn find_any_frame(&self, label: LabelId) -> Option<(&ArgsKey, FrameId)> {
        self.frames
            .iter()
            .find(|(key, _)| key.label == label)
            .map(|(key, frame)| (key, *frame))
    }

    pub fn insert_frame(&mut self, key: ArgsKey, frame: FrameId) {
        let old = self.frames.insert(key, frame);
        assert!(old.is_none(), "frame instantiated twice for the same key");
    }

    pub fn child_count(&self) -> usize {
        self.frames.len()
    }
}

impl Session {
    pub fn frame(&self, id: FrameId) -> &Frame {
        &self.frames[id]
    }

    pub fn frame_mut(&mut self, id: FrameId) -> &mut Frame {
        &mut self.frames[id]
    }

    pub fn new_frame(
        &mut self,
        parent: FrameId,
        label: LabelId,
        instance: LabelId,
        loop_count: usize,
    ) -> FrameId {
        self.frames.alloc(Frame::new(parent, label, instance, loop_count))
    }

    /// Innermost frame in the chain starting at `frame` that instantiates `label`.
    pub fn find_parent_frame(&self, frame: FrameId, label: LabelId) -> Option<FrameId> {
        let mut top = Some(frame);
        while let Some(id) = top {
            let f = &self.frames[id];
            if f.label == Some(label) {
                return Some(id);
            }
            top = f.parent;
        }
        None
    }
}
