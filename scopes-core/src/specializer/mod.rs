//! Partial evaluation of template label graphs.
//!
//! The specializer instantiates a template label per calling context,
//! types its parameters from the folded arguments, and then drives every
//! label reachable from the instance to completion:
//!
//! 1. `fold_label_body` dispatches on the body's enter (completed label,
//!    label macro, callable, native function, builtin, closure or the
//!    continuation itself) and rewrites the body in place.
//! 2. `normalize_function` runs a worklist over one function and its blocks,
//!    deferring labels blocked on a callee whose return type is still being
//!    solved, and restarts them once the entry's return type is known.
//! 3. `fold_type_return` pushes a solved return label type into whatever
//!    receives it: a continuation parameter, a closure or a label.
//!
//! Instantiation and closure calls live in `instantiate`, builtin typing and
//! constant folding in `builtins`.

mod builtins;
mod instantiate;

use std::collections::{HashSet, VecDeque};

use log::debug;

use crate::anchor::Anchor;
use crate::builtin::Builtin;
use crate::error::Result;
use crate::frame::FrameId;
use crate::label::{LabelId, UserMap};
use crate::parameter::PARAM_CONT;
use crate::scc::SCCBuilder;
use crate::session::Session;
use crate::types::{self, StorageClass, Type, TypeExt};
use crate::value::{Argument, Args, Value};
use crate::{bail_arity_at, bail_capability_at, bail_recursion_at, bail_type_at};

/// One entry of the traceback collected while an error unwinds through
/// nested function normalizations.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    pub name: String,
    pub anchor: Anchor,
}

type LabelQueue = VecDeque<LabelId>;

pub struct Specializer<'s> {
    pub(crate) session: &'s mut Session,
    /// Nesting depth of `normalize_function`.
    depth: usize,
    solve_refs: usize,
    traceback: Vec<Trace>,
}

impl<'s> Specializer<'s> {
    pub fn new(session: &'s mut Session) -> Self {
        Specializer {
            session,
            depth: 0,
            solve_refs: 0,
            traceback: Vec::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &*self.session
    }

    /// Functions that were being normalized when the last error was raised,
    /// innermost first.
    pub fn traceback(&self) -> &[Trace] {
        &self.traceback
    }

    fn at(&self) -> Anchor {
        self.session.active_anchor().clone()
    }

    // =========================================================================
    // Entry points
    // =========================================================================

    /// Instantiate `label` for runtime arguments of the given types and solve it.
    pub fn typify(&mut self, frame: FrameId, label: LabelId, argtypes: &[Type]) -> Result<LabelId> {
        let mut args = Args::with_capacity(argtypes.len() + 1);
        args.push(Argument::from(Value::untyped()));
        args.extend(
            argtypes
                .iter()
                .map(|ty| Argument::from(Value::unknown_of(ty.clone()))),
        );
        self.solve_inline(frame, label, args)
    }

    /// Instantiate `label` with the given argument vector (continuation
    /// first) and solve the resulting function. Constant arguments are
    /// substituted into the body; `Unknown` placeholders become parameters.
    pub fn solve_inline(&mut self, frame: FrameId, label: LabelId, values: Args) -> Result<LabelId> {
        if self.solve_refs == 0 {
            self.traceback.clear();
        }
        let entryf = self.fold_type_label_single_frame(frame, label, values)?;
        let entry = self.session.frame(entryf).instance();
        if self.session.is_basic_block_like(entry) {
            bail_type_at!(self.session.label(entry).anchor, "label is not a function");
        }

        self.solve_refs += 1;
        let result = self.normalize_function(entryf);
        self.solve_refs -= 1;
        if let Err(err) = result {
            if self.solve_refs == 0 {
                self.log_traceback();
            }
            return Err(err);
        }

        self.validate_scope(entry)?;
        if self.solve_refs == 0 {
            self.mark_recursive_groups(entry);
            debug!(
                "solved {}:\n{}",
                self.session.label_to_string(entry),
                self.session.function_to_string(entry)
            );
        }
        Ok(entry)
    }

    fn log_traceback(&self) {
        if self.traceback.is_empty() {
            return;
        }
        let mut visited = HashSet::new();
        debug!("Traceback (most recent call last):");
        for trace in self.traceback.iter().rev() {
            if visited.insert(&trace.anchor) {
                let name = if trace.name.is_empty() {
                    "unnamed"
                } else {
                    &trace.name
                };
                debug!("  {} in {}", trace.anchor, name);
            }
        }
    }

    /// Flag every label in a cycle of the solved graph as reentrant.
    fn mark_recursive_groups(&mut self, entry: LabelId) {
        let scc = SCCBuilder::from_label(self.session, entry);
        for group in scc.groups() {
            if group.labels.len() < 2 {
                continue;
            }
            debug!(
                "recursive group #{}: {}",
                group.index,
                group
                    .labels
                    .iter()
                    .map(|l| self.session.label_to_string(*l))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            for label in &group.labels {
                self.session.label_mut(*label).set_reentrant();
            }
        }
    }

    // =========================================================================
    // Driver
    // =========================================================================

    /// Fold every label of the function instantiated by `frame`.
    pub(crate) fn normalize_function(&mut self, frame: FrameId) -> Result<()> {
        let entry = self.session.frame(frame).instance();
        if self.session.label(entry).body.is_complete() {
            return Ok(());
        }
        if self.depth >= self.session.config.max_stack_depth {
            bail_capability_at!(self.at(), "stack overflow during partial evaluation");
        }
        assert!(
            !self.session.is_basic_block_like(entry),
            "normalizing a basic block"
        );
        debug!("normalizing {}", self.session.label_to_string(entry));

        self.depth += 1;
        let mut current = entry;
        let result = self.drain_function(entry, &mut current);
        self.depth -= 1;

        if let Err(err) = result {
            let l = self.session.label(current);
            self.traceback.push(Trace {
                name: l.name.clone(),
                anchor: l.body.anchor.clone(),
            });
            if current != entry {
                let e = self.session.label(entry);
                self.traceback.push(Trace {
                    name: e.name.clone(),
                    anchor: e.anchor.clone(),
                });
            }
            return Err(err);
        }

        assert!(self.session.label(entry).body.is_complete());
        if !self.session.is_return_param_typed(entry) {
            // every path diverges
            let cont = Value::Parameter(self.session.return_param(entry));
            self.fold_type_return(cont, types::no_return_label())?;
        } else {
            self.validate_label_return_types(entry)?;
        }
        Ok(())
    }

    fn drain_function(&mut self, entry: LabelId, current: &mut LabelId) -> Result<()> {
        let mut todo = LabelQueue::new();
        let mut recursions = LabelQueue::new();
        todo.push_back(entry);
        let mut progress = true;
        loop {
            if todo.is_empty() {
                if recursions.is_empty() {
                    break;
                }
                self.session.label_mut(entry).set_reentrant();
                if !self.session.is_return_param_typed(entry) || !progress {
                    let anchor = self.session.label(entry).anchor.clone();
                    self.session.set_active_anchor(anchor);
                    bail_recursion_at!(self.at(), "recursive function never returns");
                }
                debug!(
                    "restarting {} with {} deferred labels",
                    self.session.label_to_string(entry),
                    recursions.len()
                );
                todo = std::mem::take(&mut recursions);
                progress = false;
            }
            let Some(l) = todo.pop_back() else {
                break;
            };
            *current = l;
            if !self.session.label(l).body.is_complete() {
                if self.fold_label_body(l)?.is_none() {
                    debug!(
                        "deferring {} until its callee is typed",
                        self.session.label_to_string(l)
                    );
                    recursions.push_front(l);
                    continue;
                }
                progress = true;
            }
            if !self.session.label(l).body.is_optimized() {
                self.session.label_mut(l).body.set_optimized();
                if let Some(next) = self.jumps_immediately(l) {
                    let next = self.skip_jumps(next, &mut todo, &mut recursions)?;
                    self.session.label_mut(l).body.enter = Value::Label(next);
                } else if let Some(next) = self.continuing_to_label(l) {
                    let next = self.skip_jumps(next, &mut todo, &mut recursions)?;
                    self.session.label_mut(l).body.args[0].value = Value::Label(next);
                } else if self.is_branching(l) {
                    for slot in [2, 3] {
                        let arm = self.session.label(l).body.args[slot].value.as_label();
                        if let Some(arm) = arm {
                            let arm = self.skip_jumps(arm, &mut todo, &mut recursions)?;
                            self.session.label_mut(l).body.args[slot].value = Value::Label(arm);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Fold `l` and follow the blocks it collapses into; returns the label
    /// that should replace `l` as a jump target.
    fn skip_jumps(
        &mut self,
        mut l: LabelId,
        todo: &mut LabelQueue,
        recursions: &mut LabelQueue,
    ) -> Result<LabelId> {
        let mut jumps = 0;
        loop {
            let mut next = l;
            if !self.session.label(l).body.is_complete() {
                match self.fold_label_body(l)? {
                    Some(folded) => next = folded,
                    None => {
                        recursions.push_front(l);
                        return Ok(l);
                    }
                }
            }
            if next == l || jumps >= self.session.config.max_skip_jumps {
                if !self.session.label(l).body.is_optimized() {
                    todo.push_back(l);
                }
                return Ok(l);
            }
            jumps += 1;
            l = next;
        }
    }

    /// Fold the body of a single label.
    ///
    /// Returns the label itself once its body is complete, a successor block
    /// that should be used in its place, or `None` if the body calls a
    /// function whose return type is not known yet.
    pub(crate) fn fold_label_body(&mut self, l: LabelId) -> Result<Option<LabelId>> {
        loop {
            assert!(
                !self.session.label(l).body.is_complete(),
                "folding a completed label"
            );
            assert!(
                !self.session.label(l).is_template(),
                "folding a template label"
            );
            self.session.verify_valid(l)?;
            let anchor = self.session.label(l).body.anchor.clone();
            self.session.set_active_anchor(anchor);

            if let Some(idx) = self.find_untyped_arg(l) {
                let arg = self.session.label(l).body.args[idx].value.clone();
                bail_type_at!(
                    self.at(),
                    "parameter {} passed as argument {} has not been typed yet",
                    self.session.value_to_string(&arg),
                    idx
                );
            }

            let enter = self.session.label(l).body.enter.clone();
            let rtype = match &enter {
                Value::Label(callee) => {
                    if !self.session.label(*callee).body.is_complete() {
                        bail_type_at!(
                            self.at(),
                            "failed to propagate return type from untyped label"
                        );
                    }
                    self.complete_existing_label_continuation(l, *callee)?
                }
                Value::LabelMacro(id) => {
                    let handler = self.session.label_macro(*id);
                    debug!(
                        "expanding label macro {} in {}",
                        self.session.label_macro_name(*id),
                        self.session.label_to_string(l)
                    );
                    handler(self.session, l)?;
                    if self.session.label(l).body.enter == enter {
                        bail_type_at!(self.at(), "label macro call failed to fold");
                    }
                    if !self.session.label(l).body.is_complete() {
                        continue;
                    }
                    None
                }
                _ if self.is_calling_callable(l) => {
                    self.fold_callable_call(l);
                    continue;
                }
                _ if self.is_calling_function(l) => {
                    self.verify_no_keyed_args(l)?;
                    match self.fold_function_call(l)? {
                        Some(rtype) => Some(rtype),
                        None => continue,
                    }
                }
                Value::Builtin(builtin) => match self.fold_builtin(l, *builtin)? {
                    BuiltinFold::Repeat => continue,
                    BuiltinFold::Branched => {
                        self.session.label_mut(l).body.set_complete();
                        return Ok(Some(l));
                    }
                    BuiltinFold::Typed(rtype) => Some(rtype),
                    BuiltinFold::Untyped => None,
                },
                Value::Closure(_) => {
                    if self.has_keyed_args(l) {
                        self.solve_keyed_args(l)?;
                    }
                    match self.fold_closure_call(l)? {
                        ClosureCall::Recursive => return Ok(None),
                        ClosureCall::Returns(rtype) => rtype,
                    }
                }
                _ if self.is_calling_continuation(l) => {
                    Some(self.get_return_type_from_call_arguments(l))
                }
                other => {
                    if !self.session.is_const(other) {
                        bail_type_at!(
                            self.at(),
                            "unable to call variable of type {}",
                            self.session.indirect_type(other)
                        );
                    }
                    bail_type_at!(
                        self.at(),
                        "unable to call constant of type {}",
                        other.type_of()
                    );
                }
            };

            if let Some(rtype) = rtype {
                if self.session.label(l).is_jumping() {
                    let dest = self.session.label(l).body.enter.clone();
                    let dest = self.fold_type_return(dest, rtype)?;
                    self.session.label_mut(l).body.enter = dest;
                } else {
                    let dest = self.session.label(l).body.args[0].value.clone();
                    let dest = self.fold_type_return(dest, rtype)?;
                    self.session.label_mut(l).body.args[0].value = dest;
                }
            }

            self.session.label_mut(l).body.set_complete();
            if self.fold_useless_labels(l) && !self.session.label(l).body.is_complete() {
                continue;
            }

            let jumps_to = self.jumps_immediately(l);
            if jumps_to.is_some() {
                self.session.label_mut(l).body.args[0] = Argument::from(Value::None);
            }
            let label = self.session.label(l);
            if !label.is_important() && self.session.is_basic_block_like(l) {
                if let Some(next) = jumps_to {
                    if !label.has_params() && !self.session.label(next).has_params() {
                        return Ok(Some(next));
                    }
                }
            }
            return Ok(Some(l));
        }
    }

    /// Replace a completed body that jumps into a chain of completed,
    /// parameterless blocks by the body at the end of the chain.
    fn fold_useless_labels(&mut self, start: LabelId) -> bool {
        let mut visited = HashSet::new();
        visited.insert(start);
        let mut l = start;
        while self.session.label(l).body.is_complete() {
            let Value::Label(next) = self.session.label(l).body.enter else {
                break;
            };
            let nextl = self.session.label(next);
            if !self.session.is_basic_block_like(next)
                || nextl.is_important()
                || nextl.has_params()
                || !visited.insert(next)
            {
                break;
            }
            l = next;
        }
        if l == start {
            return false;
        }
        debug!(
            "eliding {} into {}",
            self.session.label_to_string(l),
            self.session.label_to_string(start)
        );
        let mut body = self.session.label(l).body.clone();
        body.anchor = self.session.label(start).body.anchor.clone();
        self.session.label_mut(start).body = body;
        true
    }

    fn complete_existing_label_continuation(
        &mut self,
        l: LabelId,
        callee: LabelId,
    ) -> Result<Option<Type>> {
        if self.session.is_basic_block_like(callee) {
            return Ok(None);
        }
        assert!(self.session.is_return_param_typed(callee));
        let fty = self.session.get_function_type(callee);
        self.verify_function_argument_signature(&fty, l)?;
        Ok(Some(self.session.get_return_type(callee)))
    }

    fn get_return_type_from_call_arguments(&mut self, l: LabelId) -> Type {
        let values = self.session.label(l).body.args[1..]
            .iter()
            .map(|arg| {
                Argument::new(
                    arg.key.clone(),
                    Value::unknown_of(self.session.indirect_type(&arg.value)),
                )
            })
            .collect();
        self.session.label_mut(l).body.args[0] = Argument::from(Value::None);
        types::return_label(values)
    }

    // =========================================================================
    // Return typing
    // =========================================================================

    /// Deliver a solved return label type to `dest` and return the value that
    /// should replace it in the body.
    pub(crate) fn fold_type_return(&mut self, mut dest: Value, rtype: Type) -> Result<Value> {
        loop {
            match &dest {
                Value::Parameter(p) => {
                    let p = *p;
                    let param = self.session.param(p);
                    if param.is_none() {
                        bail_type_at!(
                            self.at(),
                            "attempting to type return continuation of non-returning label"
                        );
                    }
                    if !param.is_typed() {
                        let anchor = self.at();
                        let param = self.session.param_mut(p);
                        param.ty = rtype;
                        param.anchor = anchor;
                    } else if param.ty != rtype {
                        let rtype = rtype.to_unconst();
                        let ptype = param.ty.to_unconst();
                        if rtype != ptype {
                            debug!("{} first typed here as {}", param.anchor, ptype);
                            bail_type_at!(
                                self.at(),
                                "attempting to retype return continuation as {}",
                                rtype
                            );
                        }
                        let anchor = self.at();
                        let param = self.session.param_mut(p);
                        param.ty = rtype;
                        param.anchor = anchor;
                    }
                    return Ok(dest);
                }
                Value::Closure(c) => {
                    if !rtype.is_returning() {
                        return Ok(Value::None);
                    }
                    let closure = self.session.closure(*c);
                    let values = rtype.return_values().unwrap_or_default();
                    let mut args = Args::with_capacity(values.len() + 1);
                    args.push(Argument::from(Value::untyped()));
                    args.extend(values.iter().cloned());
                    let count = values.len();
                    let newl = self.fold_type_label_single(closure.frame, closure.label, args)?;
                    let label = self.session.label(newl);
                    if label.is_jumping()
                        && !label.is_important()
                        && (self.is_calling_continuation(newl)
                            || matches!(label.body.enter, Value::Closure(_)))
                        && self.matches_arg_count(newl, count)
                        && self.forwards_all_args(newl)
                    {
                        dest = label.body.enter.clone();
                        continue;
                    }
                    return Ok(Value::Label(newl));
                }
                Value::Label(l) => {
                    let expected = self.session.get_params_as_return_label_type(*l);
                    if rtype != expected {
                        debug!(
                            "{} typed as {}",
                            self.session.label(*l).anchor,
                            expected
                        );
                        bail_type_at!(self.at(), "attempting to retype label as {}", rtype);
                    }
                    return Ok(dest);
                }
                other => {
                    bail_type_at!(
                        self.at(),
                        "cannot type continuation of type {}",
                        self.session.indirect_type(other)
                    );
                }
            }
        }
    }

    /// Values returned from a function that is not inlined must not point
    /// into its stack frame.
    fn validate_label_return_types(&mut self, l: LabelId) -> Result<()> {
        assert!(!self.session.is_basic_block_like(l));
        assert!(self.session.is_return_param_typed(l));
        let rtype = self.session.param(self.session.return_param(l)).ty.clone();
        for (i, arg) in rtype.return_values().unwrap_or_default().iter().enumerate() {
            let Value::Unknown(ty) = &arg.value else {
                continue;
            };
            if let Some((_, flags)) = ty.storage_type().pointer_info() {
                if flags.storage != StorageClass::Default {
                    let anchor = self.session.label(l).anchor.clone();
                    self.session.set_active_anchor(anchor);
                    bail_capability_at!(
                        self.at(),
                        "return argument #{} is of non-returnable pointer type {} but function is not being inlined",
                        i,
                        ty
                    );
                }
            }
        }
        Ok(())
    }

    /// Reject functions that use parameters of another function; only
    /// inlined blocks may reach into an exterior scope.
    fn validate_scope(&mut self, entry: LabelId) -> Result<LabelId> {
        let labels = self.session.build_reachable(entry);
        let mut um = UserMap::new();
        for l in &labels {
            self.session.insert_into_usermap(*l, &mut um);
        }
        for l in &labels {
            if self.session.is_basic_block_like(*l) {
                continue;
            }
            for sub in self.session.build_scope_with(*l, &um) {
                if !self.session.is_basic_block_like(sub) {
                    debug!(
                        "{}: depends on this scope",
                        self.session.label(*l).anchor
                    );
                    let anchor = self.session.label(sub).anchor.clone();
                    self.session.set_active_anchor(anchor);
                    bail_capability_at!(
                        self.at(),
                        "expression using variable in exterior scope as well as provider of variable must be inline"
                    );
                }
            }
        }
        Ok(entry)
    }

    // =========================================================================
    // Body classification
    // =========================================================================

    /// The callee block if `l` jumps straight into a basic block.
    fn jumps_immediately(&self, l: LabelId) -> Option<LabelId> {
        match self.session.label(l).body.enter {
            Value::Label(next) if self.session.is_basic_block_like(next) => Some(next),
            _ => None,
        }
    }

    fn continuing_to_label(&self, l: LabelId) -> Option<LabelId> {
        self.session
            .label(l)
            .body
            .args
            .first()
            .and_then(|arg| arg.value.as_label())
    }

    fn is_branching(&self, l: LabelId) -> bool {
        self.session.label(l).body.enter == Value::Builtin(Builtin::Branch)
    }

    fn is_calling_continuation(&self, l: LabelId) -> bool {
        match self.session.label(l).body.enter {
            Value::Parameter(p) => self.session.param(p).index == PARAM_CONT,
            _ => false,
        }
    }

    fn is_calling_callable(&self, l: LabelId) -> bool {
        let body = &self.session.label(l).body;
        if body.is_rawcall() {
            return false;
        }
        let ty = self.session.indirect_type(&body.enter);
        self.session.call_handler(&ty).is_some()
    }

    fn is_calling_function(&self, l: LabelId) -> bool {
        let ty = self.session.indirect_type(&self.session.label(l).body.enter);
        extract_function_type(&ty).is_some()
    }

    fn find_untyped_arg(&self, l: LabelId) -> Option<usize> {
        self.session
            .label(l)
            .body
            .args
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, arg)| match arg.value {
                Value::Parameter(p) => {
                    let param = self.session.param(p);
                    param.index != PARAM_CONT && !param.is_typed()
                }
                _ => false,
            })
            .map(|(i, _)| i)
    }

    fn has_keyed_args(&self, l: LabelId) -> bool {
        self.session.label(l).body.args[1..]
            .iter()
            .any(Argument::is_keyed)
    }

    fn verify_no_keyed_args(&self, l: LabelId) -> Result<()> {
        if self.has_keyed_args(l) {
            bail_arity_at!(self.at(), "unexpected keyed argument");
        }
        Ok(())
    }

    fn all_args_constant(&self, l: LabelId) -> bool {
        self.session.label(l).body.args[1..]
            .iter()
            .all(|arg| self.session.is_const(&arg.value))
    }

    /// A function does no work if every path jumps through blocks straight
    /// into a continuation, and it returns only constants.
    fn is_empty_function(&self, l: LabelId) -> bool {
        let rtype = &self.session.param(self.session.return_param(l)).ty;
        if !rtype.is_return_label() || !rtype.is_returning() || rtype.has_variables() {
            return false;
        }
        let mut visited = HashSet::new();
        let mut l = l;
        while visited.insert(l) {
            if let Some(next) = self.jumps_immediately(l) {
                l = next;
                continue;
            }
            if !self.is_calling_continuation(l) {
                return false;
            }
            break;
        }
        true
    }

    /// Only valid on instances, which have no variadic parameters left.
    fn matches_arg_count(&self, l: LabelId, inargs: usize) -> bool {
        inargs + 1 == self.session.label(l).params.len().max(1)
    }

    fn forwards_all_args(&self, l: LabelId) -> bool {
        let label = self.session.label(l);
        let args = &label.body.args;
        if args.len() != label.params.len() {
            return false;
        }
        args.iter()
            .zip(&label.params)
            .skip(1)
            .all(|(arg, param)| arg.value == Value::Parameter(*param))
    }
}

/// Outcome of folding a builtin call.
pub(crate) enum BuiltinFold {
    /// The body was rewritten; fold it again.
    Repeat,
    /// A runtime branch whose arms have been instantiated.
    Branched,
    /// The call stands and returns values of this return label type.
    Typed(Type),
    /// The call stands and does not return.
    Untyped,
}

/// Outcome of folding a closure call.
pub(crate) enum ClosureCall {
    /// The callee's return type depends on a call that is still being solved.
    Recursive,
    Returns(Option<Type>),
}

/// Function signature behind a function or function pointer type.
pub(crate) fn extract_function_type(ty: &Type) -> Option<Type> {
    let ty = ty.storage_type();
    if ty.function_info().is_some() {
        return Some(ty.clone());
    }
    match ty.pointer_info() {
        Some((elem, _)) if elem.storage_type().function_info().is_some() => {
            Some(elem.storage_type().clone())
        }
        _ => None,
    }
}
