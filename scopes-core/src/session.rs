//! Compile-request context.
//!
//! All arenas, the closure intern table and the registered native hooks
//! live here. A session is created per compile request and passed by
//! reference to every component; nothing is global, so independent
//! sessions can coexist in tests.

use std::collections::HashMap;

use crate::anchor::Anchor;
use crate::closure::{Closure, ClosureId};
use crate::config::SpecializerConfig;
use crate::ffi::{ForeignCaller, LabelMacroFn};
use crate::frame::{Frame, FrameId};
use crate::label::{Label, LabelId};
use crate::parameter::{ParamId, Parameter};
use crate::types::Type;
use crate::value::Value;
use crate::IdArena;

pub struct Session {
    pub labels: IdArena<LabelId, Label>,
    pub params: IdArena<ParamId, Parameter>,
    pub frames: IdArena<FrameId, Frame>,
    pub closures: IdArena<ClosureId, Closure>,
    pub(crate) closure_map: HashMap<Closure, ClosureId>,
    pub(crate) label_macros: Vec<(String, LabelMacroFn)>,
    pub(crate) call_handlers: HashMap<Type, Value>,
    pub(crate) foreign: Option<Box<dyn ForeignCaller>>,
    pub config: SpecializerConfig,
    root: FrameId,
    next_uid: usize,
    active_anchor: Anchor,
}

impl Session {
    pub fn new() -> Self {
        Session::with_config(SpecializerConfig::default())
    }

    pub fn with_config(config: SpecializerConfig) -> Self {
        let mut frames = IdArena::new();
        let root = frames.alloc(Frame::root());
        Session {
            labels: IdArena::new(),
            params: IdArena::new(),
            frames,
            closures: IdArena::new(),
            closure_map: HashMap::new(),
            label_macros: Vec::new(),
            call_handlers: HashMap::new(),
            foreign: None,
            config,
            root,
            next_uid: 0,
            active_anchor: Anchor::builtin(),
        }
    }

    /// The sentinel frame at the top of every frame chain.
    pub fn root_frame(&self) -> FrameId {
        self.root
    }

    pub(crate) fn next_label_uid(&mut self) -> usize {
        let uid = self.next_uid;
        self.next_uid += 1;
        uid
    }

    pub fn label(&self, id: LabelId) -> &Label {
        &self.labels[id]
    }

    pub fn label_mut(&mut self, id: LabelId) -> &mut Label {
        &mut self.labels[id]
    }

    pub fn param(&self, id: ParamId) -> &Parameter {
        &self.params[id]
    }

    pub fn param_mut(&mut self, id: ParamId) -> &mut Parameter {
        &mut self.params[id]
    }

    /// Source location errors are attributed to.
    pub fn active_anchor(&self) -> &Anchor {
        &self.active_anchor
    }

    pub fn set_active_anchor(&mut self, anchor: Anchor) {
        self.active_anchor = anchor;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
