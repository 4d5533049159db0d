//! Labels: the nodes of the CPS graph.
//!
//! A label owns its parameters and exactly one body. Templates are produced
//! by the expander and never mutated during specialization; instances are
//! created per calling context by the specializer and typed in place.
//!
//! Graph queries that need to look at parameters (basic-block detection,
//! reachability, scope construction) live on `Session`, which owns the
//! parameter arena.

use std::collections::HashSet;

use indexmap::{IndexMap, IndexSet};

use crate::anchor::Anchor;
use crate::body::Body;
use crate::error::Result;
use crate::frame::FrameId;
use crate::parameter::{ParamId, Parameter, PARAM_CONT};
use crate::session::Session;
use crate::types::{self, FunctionFlags, Type, TypeExt};
use crate::value::{Argument, Value};
use crate::bail_type_at;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub u32);

impl From<u32> for LabelId {
    fn from(id: u32) -> Self {
        LabelId(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LabelFlags {
    pub template: bool,
    pub reentrant: bool,
    pub inline: bool,
    /// Join point: all callers within a frame must pass the same argument types.
    pub merge: bool,
    /// Log instantiation details when this label is specialized.
    pub debug: bool,
}

#[derive(Debug, Clone)]
pub struct Label {
    pub uid: usize,
    /// Template this label was instantiated from.
    pub original: Option<LabelId>,
    next_instance_id: usize,
    pub name: String,
    pub anchor: Anchor,
    pub params: Vec<ParamId>,
    pub body: Body,
    pub flags: LabelFlags,
    /// Frame that produced this instance.
    pub frame: Option<FrameId>,
}

impl Label {
    fn new(anchor: Anchor, name: &str, flags: LabelFlags) -> Self {
        Label {
            uid: 0,
            original: None,
            next_instance_id: 1,
            name: name.to_string(),
            body: Body::new(anchor.clone()),
            anchor,
            params: Vec::new(),
            flags,
            frame: None,
        }
    }

    pub fn is_template(&self) -> bool {
        self.flags.template
    }

    pub fn is_reentrant(&self) -> bool {
        self.flags.reentrant
    }

    pub fn set_reentrant(&mut self) {
        self.flags.reentrant = true;
    }

    pub fn is_inline(&self) -> bool {
        self.flags.inline
    }

    pub fn set_inline(&mut self) {
        self.flags.inline = true;
    }

    pub fn is_merge(&self) -> bool {
        self.flags.merge
    }

    pub fn set_merge(&mut self) {
        self.flags.merge = true;
    }

    pub fn unset_merge(&mut self) {
        self.flags.merge = false;
    }

    pub fn is_debug(&self) -> bool {
        self.flags.debug
    }

    pub fn set_debug(&mut self) {
        self.flags.debug = true;
    }

    /// Important labels are never elided as useless blocks.
    pub fn is_important(&self) -> bool {
        self.flags.merge || self.flags.reentrant
    }

    pub fn has_params(&self) -> bool {
        self.params.len() > 1
    }

    /// The body does not pass a continuation.
    pub fn is_jumping(&self) -> bool {
        assert!(!self.body.args.is_empty(), "label body without arguments");
        self.body.args[0].value.is_none()
    }

    pub fn is_calling(&self, callee: LabelId) -> bool {
        self.body.enter == Value::Label(callee)
    }

    pub fn is_continuing_to(&self, callee: LabelId) -> bool {
        assert!(!self.body.args.is_empty(), "label body without arguments");
        self.body.args[0].value == Value::Label(callee)
    }
}

// =============================================================================
// UserMap
// =============================================================================

/// Reverse use/def relation: which labels mention a given label or parameter.
#[derive(Debug, Clone, Default)]
pub struct UserMap {
    pub label_map: IndexMap<LabelId, IndexSet<LabelId>>,
    pub param_map: IndexMap<ParamId, IndexSet<LabelId>>,
}

impl UserMap {
    pub fn new() -> Self {
        UserMap::default()
    }

    pub fn clear(&mut self) {
        self.label_map.clear();
        self.param_map.clear();
    }

    pub fn insert_label(&mut self, source: LabelId, dest: LabelId) {
        self.label_map.entry(dest).or_default().insert(source);
    }

    pub fn insert_param(&mut self, source: LabelId, dest: ParamId) {
        self.param_map.entry(dest).or_default().insert(source);
    }

    pub fn remove_label(&mut self, source: LabelId, dest: LabelId) {
        if let Some(users) = self.label_map.get_mut(&dest) {
            users.shift_remove(&source);
        }
    }

    pub fn remove_param(&mut self, source: LabelId, dest: ParamId) {
        if let Some(users) = self.param_map.get_mut(&dest) {
            users.shift_remove(&source);
        }
    }

    pub fn label_users(&self, label: LabelId) -> impl Iterator<Item = LabelId> + '_ {
        self.label_map.get(&label).into_iter().flatten().copied()
    }

    pub fn param_users(&self, param: ParamId) -> impl Iterator<Item = LabelId> + '_ {
        self.param_map.get(&param).into_iter().flatten().copied()
    }
}

// =============================================================================
// Construction
// =============================================================================

impl Session {
    /// Create a template label without parameters.
    pub fn new_label(&mut self, anchor: Anchor, name: &str) -> LabelId {
        let mut label = Label::new(
            anchor,
            name,
            LabelFlags {
                template: true,
                ..LabelFlags::default()
            },
        );
        label.uid = self.next_label_uid();
        self.labels.alloc(label)
    }

    /// A template whose continuation parameter is typed `Nothing`; entered
    /// from within a function rather than called.
    pub fn continuation_from(&mut self, anchor: Anchor, name: &str) -> LabelId {
        let id = self.new_label(anchor.clone(), name);
        self.append(id, Parameter::new(anchor, name, types::nothing()));
        id
    }

    /// A template function with an untyped continuation parameter.
    pub fn function_from(&mut self, anchor: Anchor, name: &str) -> LabelId {
        let id = self.new_label(anchor.clone(), name);
        self.append(id, Parameter::untyped(anchor, ""));
        id
    }

    /// A function template that is spliced into its callers.
    pub fn inline_from(&mut self, anchor: Anchor, name: &str) -> LabelId {
        let id = self.function_from(anchor, name);
        self.labels[id].set_inline();
        id
    }

    /// Fresh instance of `template`. Inherits name, anchor and the merge and
    /// debug flags; everything else starts empty.
    pub fn instance_of(&mut self, template: LabelId) -> LabelId {
        let source = &mut self.labels[template];
        let uid = source.next_instance_id;
        source.next_instance_id += 1;
        let mut label = Label::new(
            source.anchor.clone(),
            &source.name,
            LabelFlags {
                merge: source.flags.merge,
                debug: source.flags.debug,
                ..LabelFlags::default()
            },
        );
        label.uid = uid;
        label.original = Some(template);
        self.labels.alloc(label)
    }

    /// Bind `param` to `label` as its next parameter.
    pub fn append(&mut self, label: LabelId, mut param: Parameter) -> ParamId {
        assert!(param.label.is_none(), "parameter is already bound");
        param.label = Some(label);
        param.index = self.labels[label].params.len();
        let id = self.params.alloc(param);
        self.labels[label].params.push(id);
        id
    }

    /// Bind a complete parameter list to a label that has none yet.
    pub fn set_parameters(&mut self, label: LabelId, params: Vec<Parameter>) -> Vec<ParamId> {
        assert!(
            self.labels[label].params.is_empty(),
            "label already has parameters"
        );
        params
            .into_iter()
            .map(|param| self.append(label, param))
            .collect()
    }

    pub fn get_original(&self, label: LabelId) -> LabelId {
        let mut l = label;
        while let Some(original) = self.labels[l].original {
            l = original;
        }
        l
    }
}

// =============================================================================
// Queries
// =============================================================================

impl Session {
    pub fn get_param_by_name(&self, label: LabelId, name: &str) -> Option<ParamId> {
        self.labels[label]
            .params
            .iter()
            .skip(1)
            .copied()
            .find(|p| self.params[*p].name == name)
    }

    /// Entered from within the same function: no parameters, or a
    /// continuation parameter typed `Nothing`.
    pub fn is_basic_block_like(&self, label: LabelId) -> bool {
        match self.labels[label].params.first() {
            None => true,
            Some(cont) => self.params[*cont].is_none(),
        }
    }

    pub fn is_return_param_typed(&self, label: LabelId) -> bool {
        let params = &self.labels[label].params;
        assert!(!params.is_empty(), "label without parameters");
        self.params[params[PARAM_CONT]].is_typed()
    }

    pub fn is_variadic(&self, label: LabelId) -> bool {
        self.labels[label]
            .params
            .last()
            .map(|p| self.params[*p].is_variadic())
            .unwrap_or(false)
    }

    pub fn return_param(&self, label: LabelId) -> ParamId {
        let params = &self.labels[label].params;
        assert!(!params.is_empty(), "label without parameters");
        params[PARAM_CONT]
    }

    pub fn is_valid(&self, label: LabelId) -> bool {
        let l = &self.labels[label];
        !l.params.is_empty() && !l.body.args.is_empty()
    }

    pub fn verify_valid(&mut self, label: LabelId) -> Result<()> {
        let l = &self.labels[label];
        let msg = if l.params.is_empty() {
            "label corrupt: parameters are missing"
        } else if l.body.args.is_empty() {
            "label corrupt: body arguments are missing"
        } else {
            return Ok(());
        };
        let anchor = l.anchor.clone();
        self.set_active_anchor(anchor.clone());
        bail_type_at!(anchor, "{}", msg)
    }

    /// Type of the continuation parameter; fails unless it is a return label.
    pub fn verify_return_label(&self, label: LabelId) -> Result<Type> {
        let l = &self.labels[label];
        if let Some(cont) = l.params.first() {
            let ty = &self.params[*cont].ty;
            if ty.is_return_label() {
                return Ok(ty.clone());
            }
        }
        bail_type_at!(l.anchor, "label is not a function")
    }

    /// Return label type of a function, `void` while still untyped.
    pub fn get_return_type(&self, label: LabelId) -> Type {
        assert!(
            !self.is_basic_block_like(label),
            "basic blocks have no return type"
        );
        let cont = &self.params[self.return_param(label)];
        if !cont.is_typed() {
            return types::void();
        }
        assert!(cont.ty.is_return_label(), "continuation is not a return label");
        cont.ty.clone()
    }

    pub fn verify_compilable(&self, label: LabelId) -> Result<()> {
        let l = &self.labels[label];
        let cont = &self.params[l.params[PARAM_CONT]];
        if cont.is_typed() && !cont.is_none() && !cont.ty.is_return_label() {
            bail_type_at!(
                l.anchor,
                "cannot compile function with return type {}",
                cont.ty
            );
        }
        for param in l.params.iter().skip(1) {
            if !self.params[*param].is_typed() {
                bail_type_at!(l.anchor, "cannot compile function with untyped argument");
            }
        }
        Ok(())
    }

    /// The parameter list read as the values a return label would receive.
    pub fn get_params_as_return_label_type(&self, label: LabelId) -> Type {
        types::return_label(
            self.labels[label]
                .params
                .iter()
                .skip(1)
                .map(|p| Argument::from(Value::unknown_of(self.params[*p].ty.clone())))
                .collect(),
        )
    }

    /// Signature of a solved function; divergent while the return type is unknown.
    pub fn get_function_type(&self, label: LabelId) -> Type {
        let params: Vec<Type> = self.labels[label]
            .params
            .iter()
            .skip(1)
            .map(|p| self.params[*p].ty.clone())
            .collect();
        let flags = FunctionFlags {
            divergent: !self.is_return_param_typed(label),
            ..FunctionFlags::default()
        };
        types::function(self.get_return_type(label), params, flags)
    }

    /// Type of a value as seen by its users; bound parameters report their type.
    pub fn indirect_type(&self, value: &Value) -> Type {
        match value {
            Value::Parameter(p) if self.params[*p].label.is_some() => self.params[*p].ty.clone(),
            other => other.type_of(),
        }
    }

    /// Compile-time known: anything but a bound parameter or an unknown placeholder.
    pub fn is_const(&self, value: &Value) -> bool {
        match value {
            Value::Parameter(p) => self.params[*p].label.is_none(),
            Value::Unknown(_) => false,
            _ => true,
        }
    }

    /// A value is a return parameter if it is a continuation parameter typed
    /// by something other than `Nothing`.
    pub fn is_return_parameter(&self, value: &Value) -> bool {
        match value {
            Value::Parameter(p) => {
                let param = &self.params[*p];
                param.index == PARAM_CONT && !param.is_none()
            }
            _ => false,
        }
    }
}

// =============================================================================
// Use/def relation and reachability
// =============================================================================

impl Session {
    fn use_value(&self, label: LabelId, value: &Value, um: &mut UserMap) {
        match value {
            Value::Parameter(p) if self.params[*p].label != Some(label) => {
                um.insert_param(label, *p)
            }
            Value::Label(l) if *l != label => um.insert_label(label, *l),
            _ => {}
        }
    }

    fn unuse_value(&self, label: LabelId, value: &Value, um: &mut UserMap) {
        match value {
            Value::Parameter(p) if self.params[*p].label != Some(label) => {
                um.remove_param(label, *p)
            }
            Value::Label(l) if *l != label => um.remove_label(label, *l),
            _ => {}
        }
    }

    pub fn insert_into_usermap(&self, label: LabelId, um: &mut UserMap) {
        let body = &self.labels[label].body;
        self.use_value(label, &body.enter, um);
        for arg in &body.args {
            self.use_value(label, &arg.value, um);
        }
    }

    pub fn remove_from_usermap(&self, label: LabelId, um: &mut UserMap) {
        let body = &self.labels[label].body;
        self.unuse_value(label, &body.enter, um);
        for arg in &body.args {
            self.unuse_value(label, &arg.value, um);
        }
    }

    /// All labels reachable from `label` through enter and arguments.
    ///
    /// Basic-block-like labels are visited depth-first as part of the
    /// function that contains them; other labels are deferred until the
    /// current function is exhausted. The returned order lists each function
    /// followed by its blocks.
    pub fn build_reachable(&self, label: LabelId) -> Vec<LabelId> {
        let mut visited = HashSet::new();
        visited.insert(label);
        let mut ordered = Vec::new();
        let mut foreign_stack = vec![label];
        let mut stack: Vec<LabelId> = Vec::new();
        loop {
            let parent = if let Some(l) = stack.pop() {
                l
            } else if let Some(l) = foreign_stack.pop() {
                ordered.push(l);
                l
            } else {
                break;
            };
            let body = &self.labels[parent].body;
            let edges = std::iter::once(&body.enter).chain(body.args.iter().map(|a| &a.value));
            for value in edges {
                if let Value::Label(l) = value {
                    if visited.insert(*l) {
                        if self.is_basic_block_like(*l) {
                            ordered.push(*l);
                            stack.push(*l);
                        } else {
                            foreign_stack.push(*l);
                        }
                    }
                }
            }
        }
        ordered
    }

    /// Labels that are live in the scope of `label`: every label using one
    /// of its parameters, and transitively every user of those labels or of
    /// their parameters.
    pub fn build_scope_with(&self, label: LabelId, um: &UserMap) -> Vec<LabelId> {
        let mut visited = HashSet::new();
        visited.insert(label);
        let mut scope = Vec::new();
        for param in &self.labels[label].params {
            for user in um.param_users(*param) {
                if visited.insert(user) {
                    scope.push(user);
                }
            }
        }
        let mut index = 0;
        while index < scope.len() {
            let scope_label = scope[index];
            index += 1;
            let users = um
                .label_users(scope_label)
                .chain(
                    self.labels[scope_label]
                        .params
                        .iter()
                        .flat_map(|p| um.param_users(*p)),
                )
                .collect::<Vec<_>>();
            for user in users {
                if visited.insert(user) {
                    scope.push(user);
                }
            }
        }
        scope
    }

    pub fn build_scope(&self, label: LabelId) -> Vec<LabelId> {
        let mut um = UserMap::new();
        for l in self.build_reachable(label) {
            self.insert_into_usermap(l, &mut um);
        }
        self.build_scope_with(label, &um)
    }
}
