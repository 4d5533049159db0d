use crate::frame::FrameId;
use crate::label::LabelId;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClosureId(pub u32);

impl From<u32> for ClosureId {
    fn from(id: u32) -> Self {
        ClosureId(id)
    }
}

/// A template label paired with the frame supplying its lexical bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Closure {
    pub label: LabelId,
    pub frame: FrameId,
}

impl Session {
    /// Intern the closure over (`label`, `frame`). The same pair always
    /// yields the same id, so closures compare equal exactly when their ids do.
    pub fn closure_from(&mut self, label: LabelId, frame: FrameId) -> ClosureId {
        let key = Closure { label, frame };
        if let Some(id) = self.closure_map.get(&key) {
            return *id;
        }
        let id = self.closures.alloc(key);
        self.closure_map.insert(key, id);
        id
    }

    pub fn closure(&self, id: ClosureId) -> Closure {
        self.closures[id]
    }
}
