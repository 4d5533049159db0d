//! Instantiating template labels in frames.

use itertools::Itertools;
use log::{debug, trace};

use super::{ClosureCall, Specializer};
use crate::anchor::Anchor;
use crate::closure::Closure;
use crate::error::Result;
use crate::frame::{ArgsKey, FrameId};
use crate::label::LabelId;
use crate::parameter::{ParamId, Parameter, ParameterKind, PARAM_CONT};
use crate::types::{self, TypeExt};
use crate::value::{Argument, Args, Value};
use crate::{bail_arity_at, bail_control_at, bail_recursion_at, bail_type_at};

impl<'s> Specializer<'s> {
    pub(crate) fn fold_type_label_single(
        &mut self,
        parent: FrameId,
        label: LabelId,
        args: Args,
    ) -> Result<LabelId> {
        let frame = self.fold_type_label_single_frame(parent, label, args)?;
        Ok(self.session.frame(frame).instance())
    }

    /// Instantiate `label` under `parent` for the argument vector `args`.
    ///
    /// Arguments are read against the template's parameters:
    /// - `Unknown(T)` creates a parameter typed `T` (or left untyped for the
    ///   untyped marker);
    /// - any other value is substituted for the parameter, which is dropped,
    ///   except the continuation slot, which is kept and typed `Nothing`.
    ///
    /// The instance is memoized under `parent` by (label, arguments), so the
    /// same call site shape never produces two instances.
    pub(crate) fn fold_type_label_single_frame(
        &mut self,
        parent: FrameId,
        label: LabelId,
        args: Args,
    ) -> Result<FrameId> {
        assert!(
            !self.session.label(label).body.is_complete(),
            "instantiating a completed label"
        );
        let mut parent = parent;
        let mut loop_count = 0;
        let top = self.session.frame(parent);
        if !top.is_root() && top.label == Some(label) {
            loop_count = top.loop_count + 1;
            parent = top.parent.expect("non-root frame without parent");
            if loop_count > self.session.config.max_recursions {
                bail_recursion_at!(
                    self.at(),
                    "maximum number of recursions exceeded during compile time evaluation ({}). Use 'unconst' to prevent constant propagation.",
                    self.session.config.max_recursions
                );
            }
        }

        let caller_anchor = match self.session.frame(parent).label {
            Some(caller) => self.session.label(caller).body.anchor.clone(),
            None => self.session.label(label).anchor.clone(),
        };

        let template_params = self.session.label(label).params.clone();
        let mut tmp_args = Args::with_capacity(args.len().max(template_params.len()));
        let mut srci = 0;
        for param in &template_params {
            if self.session.param(*param).is_variadic() {
                while srci < args.len() {
                    tmp_args.push(args[srci].clone());
                    srci += 1;
                }
            } else {
                tmp_args.push(
                    args.get(srci)
                        .cloned()
                        .unwrap_or_else(|| Argument::from(Value::None)),
                );
                srci += 1;
            }
        }

        let debug_label = self.session.label(label).is_debug();
        if debug_label {
            debug!(
                "frame {}: instantiating {} with key {}{}",
                parent.0,
                self.session.label_to_string(label),
                tmp_args.iter().join(" "),
                if self.session.frame(parent).inline_merge {
                    " and merge inlined"
                } else {
                    ""
                }
            );
        } else {
            trace!(
                "instantiating {} with key {}",
                self.session.label_to_string(label),
                tmp_args.iter().join(" ")
            );
        }

        let key = ArgsKey::new(label, tmp_args.clone());
        if let Some(found) = self.session.frame(parent).find_frame(&key) {
            debug!(
                "reusing instance {} of {}",
                self.session.label_to_string(self.session.frame(found).instance()),
                self.session.label_to_string(label)
            );
            return Ok(found);
        }

        if self.session.label(label).is_merge() && !self.session.frame(parent).inline_merge {
            self.verify_merge(parent, &key, caller_anchor)?;
        }

        // (slot in tmp_args, new parameter)
        let mut new_params: Vec<(Option<usize>, Parameter)> = Vec::new();
        let mut srci = 0;
        for param in &template_params {
            let template = self.session.param(*param);
            if template.is_variadic() {
                while srci < args.len() {
                    if let Value::Unknown(ty) = &tmp_args[srci].value {
                        let mut newparam = Parameter::from_template(template);
                        newparam.kind = ParameterKind::Regular;
                        newparam.ty = ty.clone();
                        newparam.name = String::new();
                        new_params.push((Some(srci), newparam));
                    }
                    srci += 1;
                }
            } else {
                if srci < args.len() {
                    match &tmp_args[srci].value {
                        Value::Unknown(ty) => {
                            let mut newparam = Parameter::from_template(template);
                            if !ty.is_unknown_type() {
                                if newparam.is_typed() && newparam.ty != *ty {
                                    bail_type_at!(
                                        self.at(),
                                        "attempting to retype parameter of type {} as {}",
                                        newparam.ty,
                                        ty
                                    );
                                }
                                newparam.ty = ty.clone();
                            }
                            new_params.push((Some(srci), newparam));
                        }
                        _ if srci == PARAM_CONT => {
                            let mut newparam = Parameter::from_template(template);
                            newparam.ty = types::nothing();
                            new_params.push((None, newparam));
                        }
                        _ => {}
                    }
                }
                srci += 1;
            }
        }

        let instance = self.session.instance_of(label);
        let (slots, params): (Vec<_>, Vec<_>) = new_params.into_iter().unzip();
        let ids = self.session.set_parameters(instance, params);
        for (slot, id) in slots.into_iter().zip(ids) {
            if let Some(slot) = slot {
                let key = tmp_args[slot].key.clone();
                tmp_args[slot] = Argument::new(key, Value::Parameter(id));
            }
        }
        if self.session.frame(parent).inline_merge {
            self.session.label_mut(instance).unset_merge();
        }

        let frame = self.session.new_frame(parent, label, instance, loop_count);
        self.session.frame_mut(frame).args = tmp_args;
        self.session.label_mut(instance).frame = Some(frame);
        if debug_label {
            debug!("the label is contained in frame {}", frame.0);
        }
        self.session.frame_mut(parent).insert_frame(key, frame);

        self.evaluate_body(frame, instance, label)?;
        debug!(
            "instantiated {} as {}",
            self.session.label_to_string(label),
            self.session.label_to_string(instance)
        );
        Ok(frame)
    }

    /// All branches joining at a merge label must pass the same argument types.
    fn verify_merge(
        &mut self,
        parent: FrameId,
        key: &ArgsKey,
        caller_anchor: Anchor,
    ) -> Result<()> {
        for (i, arg) in key.args.iter().enumerate().skip(1) {
            if !arg.value.is_unknown() && self.session.is_const(&arg.value) {
                self.session.set_active_anchor(caller_anchor.clone());
                bail_control_at!(
                    self.at(),
                    "attempting to return from branch, but returned argument #{} of type {} is constant",
                    i,
                    arg.value.type_of()
                );
            }
        }
        let previous = self
            .session
            .frame(parent)
            .find_any_frame(key.label)
            .map(|(prev, _)| prev.clone());
        if let Some(prev) = previous {
            if prev != *key {
                let before = self.stream_arg_types(&prev.args);
                let after = self.stream_arg_types(&key.args);
                debug!("previously returned {}", before);
                self.session.set_active_anchor(caller_anchor);
                bail_control_at!(
                    self.at(),
                    "cannot merge conditional branches returning {}and {}",
                    before,
                    after
                );
            }
        }
        Ok(())
    }

    fn stream_arg_types(&self, args: &Args) -> String {
        if args.len() <= 1 {
            return format!("{} ", types::void());
        }
        args[1..]
            .iter()
            .map(|arg| format!("{} ", self.session.indirect_type(&arg.value)))
            .collect()
    }

    // =========================================================================
    // Argument evaluation
    // =========================================================================

    /// Resolve one template argument in the context of `frame`, appending the
    /// result to `dest`. A trailing variadic parameter may expand to several
    /// arguments.
    fn evaluate(&mut self, frame: FrameId, arg: &Argument, dest: &mut Args, last: bool) -> Result<()> {
        match &arg.value {
            Value::Label(l) if self.session.label(*l).is_template() => {
                let l = *l;
                let label = self.session.label(l);
                let mut scope = frame;
                if let Some(top) = self.session.find_parent_frame(frame, l) {
                    scope = top;
                } else if let Some(scope_label) = label.body.scope_label {
                    match self.session.find_parent_frame(frame, scope_label) {
                        Some(top) => scope = top,
                        None if label.is_debug() => {
                            debug!(
                                "frame {}: can't find scope label for closure {}",
                                frame.0,
                                self.session.label_to_string(l)
                            );
                        }
                        None => {}
                    }
                } else if label.is_debug() {
                    debug!(
                        "frame {}: label has no scope label for closure {}",
                        frame.0,
                        self.session.label_to_string(l)
                    );
                }
                let closure = self.session.closure_from(l, scope);
                dest.push(Argument::new(arg.key.clone(), Value::Closure(closure)));
            }
            Value::Parameter(p) if self.is_template_param(*p) => {
                let param = self.session.param(*p).clone();
                let owner = param.label.expect("template parameter without label");
                let Some(bound) = self.session.find_parent_frame(frame, owner) else {
                    bail_type_at!(
                        self.at(),
                        "parameter {} is unbound",
                        param
                    );
                };
                let fargs = &self.session.frame(bound).args;
                if last && param.is_variadic() && !arg.is_keyed() {
                    // forward as-is, with keys
                    dest.extend(fargs.iter().skip(param.index).cloned());
                } else if param.index < fargs.len() {
                    let src = &fargs[param.index];
                    if param.is_variadic() && !arg.is_keyed() {
                        dest.push(src.clone());
                    } else {
                        dest.push(Argument::new(arg.key.clone(), src.value.clone()));
                    }
                } else {
                    if !param.is_variadic() {
                        bail_arity_at!(
                            self.at(),
                            "parameter {} is out of bounds ({} >= {})",
                            param,
                            param.index,
                            fargs.len()
                        );
                    }
                    dest.push(Argument::new(arg.key.clone(), Value::None));
                }
            }
            _ => dest.push(arg.clone()),
        }
        Ok(())
    }

    fn is_template_param(&self, p: ParamId) -> bool {
        match self.session.param(p).label {
            Some(owner) => self.session.label(owner).is_template(),
            None => false,
        }
    }

    /// Copy the body of `source` into `dest`, resolving template references
    /// through `frame`.
    fn evaluate_body(&mut self, frame: FrameId, dest: LabelId, source: LabelId) -> Result<()> {
        let body = self.session.label(source).body.clone();
        let mut enter = Args::new();
        self.evaluate(frame, &Argument::from(body.enter.clone()), &mut enter, false)?;
        let mut args = Args::with_capacity(body.args.len());
        let lasti = body.args.len().saturating_sub(1);
        for (i, arg) in body.args.iter().enumerate() {
            self.evaluate(frame, arg, &mut args, i == lasti)?;
        }
        let target = &mut self.session.label_mut(dest).body;
        target.copy_traits_from(&body);
        target.enter = enter
            .into_iter()
            .next()
            .map(|arg| arg.value)
            .unwrap_or(Value::None);
        target.args = args;
        Ok(())
    }

    // =========================================================================
    // Closure calls
    // =========================================================================

    /// Instantiate the closure called by `l` and rewrite the call to enter
    /// the instance.
    pub(crate) fn fold_closure_call(&mut self, l: LabelId) -> Result<ClosureCall> {
        let Value::Closure(c) = self.session.label(l).body.enter else {
            unreachable!("fold_closure_call on a body not calling a closure");
        };
        let closure = self.session.closure(c);
        let enter_label = closure.label;
        let enter_frame = closure.frame;

        let inline_const = !self.session.label(enter_label).is_merge()
            || self.session.frame(enter_frame).inline_merge;

        let args = self.session.label(l).body.args.clone();
        let mut callargs = Args::with_capacity(args.len());
        let mut keys = Args::with_capacity(args.len());
        callargs.push(args[0].clone());
        keys.push(Argument::from(Value::untyped()));
        for arg in &args[1..] {
            if inline_const && self.session.is_const(&arg.value) {
                keys.push(arg.clone());
            } else if self.session.is_return_parameter(&arg.value) {
                keys.push(arg.clone());
            } else {
                let ty = self.session.indirect_type(&arg.value);
                keys.push(Argument::new(arg.key.clone(), Value::unknown_of(ty)));
                callargs.push(arg.clone());
            }
        }
        if self.session.label(enter_label).is_inline() {
            callargs[0] = Argument::from(Value::None);
            keys[0] = args[0].clone();
        }

        let newf = self.fold_type_label_single_frame(enter_frame, enter_label, keys)?;
        let newl = self.session.frame(newf).instance();

        // blocks are entered, not called
        if self.session.is_basic_block_like(newl) {
            let body = &mut self.session.label_mut(l).body;
            body.enter = Value::Label(newl);
            body.args = callargs;
            return Ok(ClosureCall::Returns(None));
        }

        self.normalize_function(newf)?;

        if !self.session.is_return_param_typed(newl) {
            // the callee is still being solved further up the stack
            return Ok(ClosureCall::Recursive);
        }
        self.validate_label_return_types(newl)?;

        let rtype = self.session.get_return_type(newl);
        if self.is_empty_function(newl) {
            debug!(
                "folding call to empty function {}",
                self.session.label_to_string(newl)
            );
            let mut folded = Args::new();
            folded.push(Argument::from(Value::None));
            folded.extend(rtype.return_values().unwrap_or_default().iter().cloned());
            let body = &mut self.session.label_mut(l).body;
            body.enter = args[0].value.clone();
            body.args = folded;
            return Ok(ClosureCall::Returns(Some(rtype)));
        }

        let body = &mut self.session.label_mut(l).body;
        body.enter = Value::Label(newl);
        body.args = callargs;
        if !rtype.is_returning() {
            return Ok(ClosureCall::Returns(None));
        }
        Ok(ClosureCall::Returns(Some(rtype)))
    }

    /// Permute keyed arguments of a closure call into parameter order.
    ///
    /// Unkeyed arguments fill the next free slot. A key naming a parameter
    /// binds to that parameter; an unknown key goes to the trailing variadic
    /// parameter if there is one, otherwise it is treated as positional.
    pub(crate) fn solve_keyed_args(&mut self, l: LabelId) -> Result<()> {
        let Value::Closure(c) = self.session.label(l).body.enter else {
            unreachable!("solve_keyed_args on a body not calling a closure");
        };
        let enter = self.session.closure(c).label;
        let vaparam = self
            .session
            .label(enter)
            .params
            .last()
            .copied()
            .filter(|p| self.session.param(*p).is_variadic());

        let args = self.session.label(l).body.args.clone();
        let mut newargs = Args::with_capacity(args.len());
        newargs.push(args[0].clone());
        let mut mapped = vec![true];
        let mut next_index = 1;

        fn reserve(mapped: &mut Vec<bool>, newargs: &mut Args, upto: usize) {
            while mapped.len() <= upto {
                mapped.push(false);
                newargs.push(Argument::from(Value::None));
            }
        }

        fn next_free(mapped: &mut Vec<bool>, newargs: &mut Args, next_index: &mut usize) -> usize {
            while *next_index < mapped.len() && mapped[*next_index] {
                *next_index += 1;
            }
            reserve(mapped, newargs, *next_index);
            let index = *next_index;
            *next_index += 1;
            index
        }

        for arg in &args[1..] {
            let named = arg
                .key
                .as_deref()
                .map(|key| (key, self.session.get_param_by_name(enter, key)));
            let index = match named {
                None => {
                    let index = next_free(&mut mapped, &mut newargs, &mut next_index);
                    newargs[index] = arg.clone();
                    mapped[index] = true;
                    continue;
                }
                // unknown name and nowhere to collect it: bind positionally
                Some((_, None)) if vaparam.is_none() => {
                    let index = next_free(&mut mapped, &mut newargs, &mut next_index);
                    newargs[index].key = None;
                    index
                }
                Some((key, Some(param))) if Some(param) != vaparam => {
                    let index = self.session.param(param).index;
                    reserve(&mut mapped, &mut newargs, index);
                    if mapped[index] {
                        bail_arity_at!(self.at(), "duplicate binding to parameter {}", key);
                    }
                    index
                }
                Some((key, _)) => {
                    let vaindex = vaparam
                        .map(|p| self.session.param(p).index)
                        .expect("keyed argument without variadic target");
                    while mapped.len() < vaindex {
                        mapped.push(false);
                        newargs.push(Argument::from(Value::None));
                    }
                    let index = newargs.len();
                    mapped.push(false);
                    newargs.push(Argument::keyed(key, Value::None));
                    index
                }
            };
            mapped[index] = true;
            newargs[index].value = arg.value.clone();
        }

        trace!("keyed arguments resolved to {}", newargs.iter().join(" "));
        self.session.label_mut(l).body.args = newargs;
        Ok(())
    }

    // =========================================================================
    // Branches
    // =========================================================================

    /// Instantiate both arms of a runtime branch against the branch's
    /// continuation, so type conflicts surface at the branch itself.
    pub(crate) fn type_branch_continuations(&mut self, l: LabelId) -> Result<()> {
        assert!(!self.session.label(l).body.is_complete());
        self.checkargs(l, 3, Some(3))?;
        let args = self.session.label(l).body.args.clone();

        let cond_ty = self.session.indirect_type(&args[1].value);
        if !cond_ty.storage_type().is_bool() {
            bail_type_at!(self.at(), "branch condition must be of type bool, got {}", cond_ty);
        }
        let then_br = self.verify_branch_continuation(&args[2].value)?;
        let else_br = self.verify_branch_continuation(&args[3].value)?;

        let cont = args[0].clone();
        let then_l = self.fold_type_label_single(then_br.frame, then_br.label, vec![cont.clone()])?;
        let else_l = self.fold_type_label_single(else_br.frame, else_br.label, vec![cont])?;

        let body = &mut self.session.label_mut(l).body;
        body.args[2].value = Value::Label(then_l);
        body.args[3].value = Value::Label(else_l);
        body.args[0] = Argument::from(Value::None);
        Ok(())
    }

    /// Branch arms must be inline closures.
    pub(crate) fn verify_branch_continuation(&self, arm: &Value) -> Result<Closure> {
        if let Value::Closure(c) = arm {
            let closure = self.session.closure(*c);
            if self.session.label(closure.label).is_inline() {
                return Ok(closure);
            }
        }
        bail_control_at!(self.at(), "branch destination must be inline")
    }
}
