//! End-to-end tests for specialization of small label graphs.

use crate::builtin::Builtin;
use crate::config::SpecializerConfig;
use crate::error::{CompilerError, Result};
use crate::ffi::{ForeignCaller, ForeignFunction};
use crate::label::LabelId;
use crate::parameter::{Parameter, PARAM_CONT};
use crate::session::Session;
use crate::specialize;
use crate::specializer::Specializer;
use crate::test_support::*;
use crate::types::{self, FunctionFlags, PointerFlags, TypeExt};
use crate::value::{Argument, Value};

// =============================================================================
// Test Helpers
// =============================================================================

fn return_type(s: &Session, l: LabelId) -> types::Type {
    s.param(s.return_param(l)).ty.clone()
}

/// `fn f(a) a + a`
fn double(s: &mut Session) -> LabelId {
    let (f, ps) = function(s, "double", &[("a", None)]);
    set_body(s, f, Value::Builtin(Builtin::Add), vec![param(ps[0]), param(ps[1]), param(ps[1])]);
    f
}

/// `fn id(x) x`
fn identity(s: &mut Session) -> LabelId {
    let (f, ps) = function(s, "id", &[("x", None)]);
    set_body(s, f, Value::Parameter(ps[0]), vec![none(), param(ps[1])]);
    f
}

// =============================================================================
// Instantiation
// =============================================================================

#[test]
fn test_typify_runtime_argument() {
    init_logging();
    let mut s = Session::new();
    let f = double(&mut s);
    let root = s.root_frame();

    let inst = specialize(&mut s, root, f, &[types::i32()]).unwrap();
    assert!(!s.label(inst).is_template());
    assert_eq!(s.get_original(inst), f);
    assert_eq!(s.label(inst).params.len(), 2);
    assert_eq!(s.param(s.label(inst).params[1]).ty, types::i32());
    assert_eq!(return_type(&s, inst), types::return_label_of(vec![types::i32()]));
    assert!(s.label(inst).body.is_complete());
    assert_eq!(s.label(inst).body.enter, Value::Builtin(Builtin::Add));
}

#[test]
fn test_constant_argument_is_folded() {
    init_logging();
    let mut s = Session::new();
    let f = double(&mut s);
    let root = s.root_frame();

    let args = vec![Argument::from(Value::untyped()), Argument::from(Value::i32(5))];
    let inst = Specializer::new(&mut s).solve_inline(root, f, args).unwrap();

    assert_eq!(s.label(inst).params.len(), 1);
    let body = &s.label(inst).body;
    assert_eq!(body.enter, Value::Parameter(s.return_param(inst)));
    assert_eq!(body.args.len(), 2);
    assert_eq!(body.args[0].value, Value::None);
    assert_eq!(body.args[1].value, Value::i32(10));
    // returned constants are not part of the signature
    assert_eq!(return_type(&s, inst), types::return_label_of(vec![types::i32()]));
}

#[test]
fn test_instances_are_memoized_per_argument_types() {
    let mut s = Session::new();
    let f = identity(&mut s);
    let root = s.root_frame();

    let a = specialize(&mut s, root, f, &[types::i32()]).unwrap();
    let b = specialize(&mut s, root, f, &[types::i32()]).unwrap();
    let c = specialize(&mut s, root, f, &[types::f32()]).unwrap();
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(s.frame(root).child_count(), 2);

    assert_eq!(s.param(s.label(a).params[1]).ty, types::i32());
    assert_eq!(s.param(s.label(c).params[1]).ty, types::f32());
    assert_eq!(return_type(&s, a), types::return_label_of(vec![types::i32()]));
    assert_eq!(return_type(&s, c), types::return_label_of(vec![types::f32()]));
}

#[test]
fn test_retyping_a_typed_parameter_fails() {
    let mut s = Session::new();
    let (f, ps) = function(&mut s, "f", &[("a", Some(types::i32()))]);
    set_body(&mut s, f, Value::Parameter(ps[0]), vec![none(), param(ps[1])]);
    let root = s.root_frame();

    match specialize(&mut s, root, f, &[types::f32()]) {
        Err(CompilerError::TypeError(msg, _)) => {
            assert_eq!(msg, "attempting to retype parameter of type i32 as f32")
        }
        other => panic!("Expected type error, got {:?}", other),
    }
}

#[test]
fn test_basic_block_is_not_a_function() {
    let mut s = Session::new();
    let (k, _) = block(&mut s, "k", &[]);
    set_body(&mut s, k, Value::Builtin(Builtin::Unreachable), vec![none()]);
    let root = s.root_frame();

    let err = specialize(&mut s, root, k, &[]).unwrap_err();
    assert_eq!(err.message(), "label is not a function");
}

#[test]
fn test_parameter_of_uninstantiated_function_is_unbound() {
    let mut s = Session::new();
    let (_, fps) = function(&mut s, "f", &[("x", None)]);
    let (g, gps) = function(&mut s, "g", &[]);
    set_body(&mut s, g, Value::Parameter(gps[0]), vec![none(), param(fps[1])]);
    let root = s.root_frame();

    match specialize(&mut s, root, g, &[]) {
        Err(CompilerError::TypeError(msg, _)) => assert_eq!(msg, "parameter %x is unbound"),
        other => panic!("Expected type error, got {:?}", other),
    }
}

#[test]
fn test_parameter_missing_from_frame_is_out_of_bounds() {
    let mut s = Session::new();
    let (f, fps) = function(&mut s, "f", &[("x", None)]);
    let (g, gps) = function(&mut s, "g", &[]);
    set_body(&mut s, g, Value::Parameter(gps[0]), vec![none(), param(fps[1])]);
    let root = s.root_frame();
    let inst = s.instance_of(f);
    let frame = s.new_frame(root, f, inst, 0);
    s.frame_mut(frame).args = vec![Argument::from(Value::untyped())];

    match specialize(&mut s, frame, g, &[]) {
        Err(CompilerError::ArityError(msg, _)) => {
            assert_eq!(msg, "parameter %x is out of bounds (1 >= 1)")
        }
        other => panic!("Expected arity error, got {:?}", other),
    }
}

// =============================================================================
// Calls
// =============================================================================

#[test]
fn test_keyed_arguments_are_permuted() {
    init_logging();
    let mut s = Session::new();
    let (f, fps) = function(&mut s, "sub", &[("a", None), ("b", None)]);
    set_body(
        &mut s,
        f,
        Value::Builtin(Builtin::Sub),
        vec![param(fps[0]), param(fps[1]), param(fps[2])],
    );
    let (g, gps) = function(&mut s, "g", &[]);
    set_body(
        &mut s,
        g,
        Value::Label(f),
        vec![
            param(gps[0]),
            Argument::keyed("b", Value::i32(2)),
            Argument::keyed("a", Value::i32(1)),
        ],
    );
    let root = s.root_frame();

    let gi = specialize(&mut s, root, g, &[]).unwrap();
    let callee = s.label(gi).body.enter.as_label().expect("call to instance");
    assert_eq!(s.get_original(callee), f);
    assert_eq!(s.label(callee).body.args[1].value, Value::i32(-1));
    assert_eq!(return_type(&s, gi), types::return_label_of(vec![types::i32()]));
}

#[test]
fn test_call_to_empty_function_is_elided() {
    let mut s = Session::new();
    let (g, gps) = function(&mut s, "g", &[]);
    set_body(&mut s, g, Value::Parameter(gps[0]), vec![none()]);
    let (f, fps) = function(&mut s, "f", &[]);
    set_body(&mut s, f, Value::Label(g), vec![param(fps[0])]);
    let root = s.root_frame();

    let fi = specialize(&mut s, root, f, &[]).unwrap();
    let body = &s.label(fi).body;
    assert_eq!(body.enter, Value::Parameter(s.return_param(fi)));
    assert_eq!(body.args.len(), 1);
    assert_eq!(return_type(&s, fi), types::return_label(vec![]));
}

#[test]
fn test_unreachable_function_never_returns() {
    let mut s = Session::new();
    let (f, fps) = function(&mut s, "f", &[]);
    set_body(&mut s, f, Value::Builtin(Builtin::Unreachable), vec![param(fps[0])]);
    let root = s.root_frame();

    let fi = specialize(&mut s, root, f, &[]).unwrap();
    assert_eq!(return_type(&s, fi), types::no_return_label());
    assert!(!return_type(&s, fi).is_returning());
}

fn as_add(s: &mut Session, l: LabelId) -> Result<()> {
    s.label_mut(l).body.enter = Value::Builtin(Builtin::Add);
    Ok(())
}

#[test]
fn test_label_macro_rewrites_body() {
    let mut s = Session::new();
    let mac = s.register_label_macro("as-add", as_add);
    let (f, ps) = function(&mut s, "f", &[("a", None)]);
    set_body(&mut s, f, mac, vec![param(ps[0]), param(ps[1]), Argument::from(Value::i32(1))]);
    let root = s.root_frame();

    let fi = specialize(&mut s, root, f, &[types::i32()]).unwrap();
    assert_eq!(s.label(fi).body.enter, Value::Builtin(Builtin::Add));
    assert_eq!(return_type(&s, fi), types::return_label_of(vec![types::i32()]));
}

struct Doubler;

impl ForeignCaller for Doubler {
    fn call(&mut self, function: &ForeignFunction, args: &[Value]) -> Result<Value> {
        assert_eq!(function.symbol, "twice");
        let x = args[0].as_i64().unwrap();
        Ok(Value::i32(x as i32 * 2))
    }
}

fn twice() -> Value {
    let flags = FunctionFlags {
        pure_: true,
        ..FunctionFlags::default()
    };
    let ty = types::function(types::return_label_of(vec![types::i32()]), vec![types::i32()], flags);
    Value::Function(ForeignFunction::new("twice", ty))
}

#[test]
fn test_pure_foreign_call_is_evaluated() {
    let mut s = Session::new();
    s.set_foreign_caller(Box::new(Doubler));
    let (f, ps) = function(&mut s, "f", &[]);
    set_body(&mut s, f, twice(), vec![param(ps[0]), Argument::from(Value::i32(21))]);
    let root = s.root_frame();

    let fi = specialize(&mut s, root, f, &[]).unwrap();
    let body = &s.label(fi).body;
    assert_eq!(body.enter, Value::Parameter(s.return_param(fi)));
    assert_eq!(body.args[1].value, Value::i32(42));
}

#[test]
fn test_foreign_call_with_runtime_argument_stands() {
    let mut s = Session::new();
    s.set_foreign_caller(Box::new(Doubler));
    let (f, ps) = function(&mut s, "f", &[("x", None)]);
    set_body(&mut s, f, twice(), vec![param(ps[0]), param(ps[1])]);
    let root = s.root_frame();

    let fi = specialize(&mut s, root, f, &[types::i32()]).unwrap();
    assert_eq!(s.label(fi).body.enter, twice());
    assert_eq!(return_type(&s, fi), types::return_label_of(vec![types::i32()]));
}

#[test]
fn test_foreign_call_arity_mismatch() {
    let mut s = Session::new();
    let (f, ps) = function(&mut s, "f", &[]);
    set_body(
        &mut s,
        f,
        twice(),
        vec![param(ps[0]), Argument::from(Value::i32(1)), Argument::from(Value::i32(2))],
    );
    let root = s.root_frame();

    match specialize(&mut s, root, f, &[]) {
        Err(CompilerError::ArityError(msg, Some(_))) => {
            assert!(msg.starts_with("argument count mismatch"), "{}", msg)
        }
        other => panic!("Expected arity error, got {:?}", other),
    }
}

#[test]
fn test_duplicate_binding_to_parameter() {
    let mut s = Session::new();
    let (f, fps) = function(&mut s, "sub", &[("a", None), ("b", None)]);
    set_body(
        &mut s,
        f,
        Value::Builtin(Builtin::Sub),
        vec![param(fps[0]), param(fps[1]), param(fps[2])],
    );
    let (g, gps) = function(&mut s, "g", &[]);
    set_body(
        &mut s,
        g,
        Value::Label(f),
        vec![
            param(gps[0]),
            Argument::from(Value::i32(1)),
            Argument::keyed("a", Value::i32(2)),
        ],
    );
    let root = s.root_frame();

    match specialize(&mut s, root, g, &[]) {
        Err(CompilerError::ArityError(msg, Some(_))) => {
            assert_eq!(msg, "duplicate binding to parameter a")
        }
        other => panic!("Expected arity error, got {:?}", other),
    }
}

#[test]
fn test_unknown_key_goes_to_variadic_parameter() {
    init_logging();
    let mut s = Session::new();
    let (f, fps) = function(&mut s, "f", &[("a", None)]);
    let rest = s.append(f, Parameter::variadic(at(1), "rest", types::unknown()));
    set_body(
        &mut s,
        f,
        Value::Parameter(fps[0]),
        vec![none(), param(fps[1]), param(rest)],
    );
    let (g, gps) = function(&mut s, "g", &[]);
    set_body(
        &mut s,
        g,
        Value::Label(f),
        vec![
            param(gps[0]),
            Argument::keyed("z", Value::i32(5)),
            Argument::from(Value::i32(1)),
        ],
    );
    let root = s.root_frame();

    let gi = specialize(&mut s, root, g, &[]).unwrap();
    let callee = s.label(gi).body.enter.as_label().expect("call to instance");
    let args = &s.label(callee).body.args;
    assert_eq!(args.len(), 3);
    assert_eq!(args[1], Argument::from(Value::i32(1)));
    assert_eq!(args[2], Argument::keyed("z", Value::i32(5)));
    assert_eq!(
        return_type(&s, gi),
        types::return_label(vec![
            Argument::from(Value::unknown_of(types::i32())),
            Argument::keyed("z", Value::unknown_of(types::i32())),
        ])
    );
}

#[test]
fn test_call_handler_receives_callee_first() {
    let mut s = Session::new();
    let counter = types::named("counter", types::i32());
    s.set_call_handler(counter.clone(), Value::Builtin(Builtin::VaValues));
    let callee = Value::int(counter, 3);
    let (f, ps) = function(&mut s, "f", &[]);
    set_body(&mut s, f, callee.clone(), vec![param(ps[0]), Argument::from(Value::i32(4))]);
    let root = s.root_frame();

    let fi = specialize(&mut s, root, f, &[]).unwrap();
    let body = &s.label(fi).body;
    assert_eq!(body.enter, Value::Parameter(s.return_param(fi)));
    assert_eq!(body.args[1].value, callee);
    assert_eq!(body.args[2].value, Value::i32(4));
}

#[test]
fn test_function_using_exterior_variable_must_be_inline() {
    let mut s = Session::new();
    let (f, fps) = function(&mut s, "f", &[("x", None)]);
    let (g, gps) = function(&mut s, "g", &[]);
    set_body(&mut s, g, Value::Parameter(gps[0]), vec![none(), param(fps[1])]);
    set_body(&mut s, f, Value::Label(g), vec![param(fps[0])]);
    let root = s.root_frame();

    match specialize(&mut s, root, f, &[types::i32()]) {
        Err(CompilerError::CapabilityError(msg, Some(_))) => assert_eq!(
            msg,
            "expression using variable in exterior scope as well as provider of variable must be inline"
        ),
        other => panic!("Expected capability error, got {:?}", other),
    }
}

// =============================================================================
// Branches
// =============================================================================

/// `fn f(c a b) (if c a else b)`, joined through a merge block.
fn select_through_merge(s: &mut Session) -> LabelId {
    let (f, fps) = function(s, "f", &[("c", None), ("a", None), ("b", None)]);
    let (m, mps) = block(s, "merge", &[("x", None)]);
    s.label_mut(m).set_merge();
    set_body(s, m, Value::Parameter(fps[0]), vec![none(), param(mps[1])]);
    let (t, tps) = inline(s, "then", &[]);
    set_body(s, t, Value::Parameter(tps[0]), vec![none(), param(fps[2])]);
    let (e, eps) = inline(s, "else", &[]);
    set_body(s, e, Value::Parameter(eps[0]), vec![none(), param(fps[3])]);
    set_body(
        s,
        f,
        Value::Builtin(Builtin::Branch),
        vec![label(m), param(fps[1]), label(t), label(e)],
    );
    f
}

#[test]
fn test_merge_of_matching_branches() {
    init_logging();
    let mut s = Session::new();
    let f = select_through_merge(&mut s);
    let root = s.root_frame();

    let fi = specialize(&mut s, root, f, &[types::bool_type(), types::i32(), types::i32()]).unwrap();
    assert_eq!(return_type(&s, fi), types::return_label_of(vec![types::i32()]));
    assert_eq!(s.label(fi).body.enter, Value::Builtin(Builtin::Branch));
    let reachable = s.build_reachable(fi);
    assert!(reachable.iter().any(|l| s.label(*l).is_merge()));
}

#[test]
fn test_merge_of_mismatched_branches() {
    let mut s = Session::new();
    let f = select_through_merge(&mut s);
    let root = s.root_frame();

    match specialize(&mut s, root, f, &[types::bool_type(), types::i32(), types::f32()]) {
        Err(CompilerError::ControlFlowError(msg, Some(_))) => {
            assert_eq!(msg, "cannot merge conditional branches returning i32 and f32 ")
        }
        other => panic!("Expected control flow error, got {:?}", other),
    }
}

#[test]
fn test_constant_branch_picks_one_arm() {
    let mut s = Session::new();
    let (f, fps) = function(&mut s, "f", &[]);
    let (t, tps) = inline(&mut s, "then", &[]);
    set_body(&mut s, t, Value::Parameter(tps[0]), vec![none(), Argument::from(Value::i32(1))]);
    let (e, eps) = inline(&mut s, "else", &[]);
    set_body(&mut s, e, Value::Parameter(eps[0]), vec![none(), Argument::from(Value::i32(2))]);
    set_body(
        &mut s,
        f,
        Value::Builtin(Builtin::Branch),
        vec![param(fps[0]), Argument::from(Value::Bool(false)), label(t), label(e)],
    );
    let root = s.root_frame();

    let fi = specialize(&mut s, root, f, &[]).unwrap();
    let body = &s.label(fi).body;
    assert_eq!(body.enter, Value::Parameter(s.return_param(fi)));
    assert_eq!(body.args[1].value, Value::i32(2));
    assert_eq!(s.build_reachable(fi), vec![fi]);
}

#[test]
fn test_branch_condition_must_be_bool() {
    let mut s = Session::new();
    let f = select_through_merge(&mut s);
    let root = s.root_frame();

    let err = specialize(&mut s, root, f, &[types::i32(), types::i32(), types::i32()]).unwrap_err();
    assert_eq!(err.message(), "branch condition must be of type bool, got i32");
}

#[test]
fn test_retyping_return_continuation_fails() {
    let mut s = Session::new();
    let (f, fps) = function(&mut s, "f", &[("c", None)]);
    let (t, tps) = inline(&mut s, "then", &[]);
    set_body(&mut s, t, Value::Parameter(tps[0]), vec![none(), Argument::from(Value::i32(1))]);
    let (e, eps) = inline(&mut s, "else", &[]);
    set_body(&mut s, e, Value::Parameter(eps[0]), vec![none(), Argument::from(Value::f32(1.0))]);
    set_body(
        &mut s,
        f,
        Value::Builtin(Builtin::Branch),
        vec![param(fps[0]), param(fps[1]), label(t), label(e)],
    );
    let root = s.root_frame();

    match specialize(&mut s, root, f, &[types::bool_type()]) {
        Err(CompilerError::TypeError(msg, Some(_))) => {
            assert!(msg.starts_with("attempting to retype return continuation as"), "{}", msg);
            assert!(msg.contains("f32"), "{}", msg);
        }
        other => panic!("Expected type error, got {:?}", other),
    }
}

// =============================================================================
// Recursion
// =============================================================================

/// `fn f(n) (if (n > 0) (f n) else n)`
fn countdown(s: &mut Session) -> LabelId {
    let (f, fps) = function(s, "countdown", &[("n", None)]);
    let (k, kps) = block(s, "cmp", &[("c", None)]);
    let (again, aps) = inline(s, "again", &[]);
    set_body(s, again, Value::Label(f), vec![param(aps[0]), param(fps[1])]);
    let (done, dps) = inline(s, "done", &[]);
    set_body(s, done, Value::Parameter(dps[0]), vec![none(), param(fps[1])]);
    set_body(
        s,
        k,
        Value::Builtin(Builtin::Branch),
        vec![param(fps[0]), param(kps[1]), label(again), label(done)],
    );
    set_body(
        s,
        f,
        Value::Builtin(Builtin::ICmpSGT),
        vec![label(k), param(fps[1]), Argument::from(Value::i32(0))],
    );
    f
}

#[test]
fn test_recursive_call_is_deferred_until_typed() {
    init_logging();
    let mut s = Session::new();
    let f = countdown(&mut s);
    let root = s.root_frame();

    let fi = specialize(&mut s, root, f, &[types::i32()]).unwrap();
    assert_eq!(return_type(&s, fi), types::return_label_of(vec![types::i32()]));
    assert!(s.label(fi).is_reentrant());
    let calls_self = s
        .build_reachable(fi)
        .into_iter()
        .any(|l| l != fi && s.label(l).is_calling(fi));
    assert!(calls_self);
}

#[test]
fn test_compile_time_recursion_limit() {
    init_logging();
    let mut s = Session::new();
    let (f, fps) = function(&mut s, "f", &[("n", None)]);
    let (k, kps) = block(&mut s, "k", &[("m", None)]);
    set_body(&mut s, k, Value::Label(f), vec![param(fps[PARAM_CONT]), param(kps[1])]);
    set_body(
        &mut s,
        f,
        Value::Builtin(Builtin::Add),
        vec![label(k), param(fps[1]), Argument::from(Value::i32(1))],
    );
    let root = s.root_frame();

    let args = vec![Argument::from(Value::untyped()), Argument::from(Value::i32(0))];
    let mut specializer = Specializer::new(&mut s);
    match specializer.solve_inline(root, f, args) {
        Err(CompilerError::RecursionError(msg, _)) => {
            assert!(msg.starts_with("maximum number of recursions exceeded"), "{}", msg);
            assert!(msg.contains("(32)"));
        }
        other => panic!("Expected recursion error, got {:?}", other),
    }
    assert!(!specializer.traceback().is_empty());
}

#[test]
fn test_stack_depth_limit() {
    let mut s = Session::with_config(SpecializerConfig::default().with_max_stack_depth(8));
    let (f, fps) = function(&mut s, "f", &[("n", None)]);
    set_body(&mut s, f, Value::Label(f), vec![param(fps[0]), param(fps[1])]);
    let root = s.root_frame();

    match specialize(&mut s, root, f, &[types::i32()]) {
        Err(CompilerError::CapabilityError(msg, _)) => {
            assert_eq!(msg, "stack overflow during partial evaluation")
        }
        other => panic!("Expected capability error, got {:?}", other),
    }
}

#[test]
fn test_recursive_function_never_returns() {
    let mut s = Session::new();
    let (f, fps) = function(&mut s, "spin", &[("n", None)]);
    let (k, kps) = block(&mut s, "cmp", &[("c", None)]);
    let (left, lps) = inline(&mut s, "left", &[]);
    set_body(&mut s, left, Value::Label(f), vec![param(lps[0]), param(fps[1])]);
    let (right, rps) = inline(&mut s, "right", &[]);
    set_body(&mut s, right, Value::Label(f), vec![param(rps[0]), param(fps[1])]);
    set_body(
        &mut s,
        k,
        Value::Builtin(Builtin::Branch),
        vec![param(fps[0]), param(kps[1]), label(left), label(right)],
    );
    set_body(
        &mut s,
        f,
        Value::Builtin(Builtin::ICmpSGT),
        vec![label(k), param(fps[1]), Argument::from(Value::i32(0))],
    );
    let root = s.root_frame();

    match specialize(&mut s, root, f, &[types::i32()]) {
        Err(CompilerError::RecursionError(msg, Some(_))) => {
            assert_eq!(msg, "recursive function never returns")
        }
        other => panic!("Expected recursion error, got {:?}", other),
    }
}

// =============================================================================
// Builtins
// =============================================================================

/// `fn f() (builtin args..)`, specialized without arguments.
fn solve_builtin(s: &mut Session, builtin: Builtin, args: Vec<Value>) -> Result<LabelId> {
    let (f, ps) = function(s, "f", &[]);
    let mut body = vec![param(ps[0])];
    body.extend(args.into_iter().map(Argument::from));
    set_body(s, f, Value::Builtin(builtin), body);
    let root = s.root_frame();
    specialize(s, root, f, &[])
}

fn returned(s: &Session, l: LabelId) -> Vec<Argument> {
    let body = &s.label(l).body;
    assert_eq!(body.enter, Value::Parameter(s.return_param(l)));
    body.args[1..].to_vec()
}

#[test]
fn test_va_at_by_index() {
    let mut s = Session::new();
    let args = vec![Value::i32(1), Value::i32(10), Value::i32(20), Value::i32(30)];
    let fi = solve_builtin(&mut s, Builtin::VaAt, args).unwrap();
    let values = returned(&s, fi);
    assert_eq!(values, vec![Argument::from(Value::i32(20)), Argument::from(Value::i32(30))]);
}

#[test]
fn test_va_at_by_key() {
    let mut s = Session::new();
    let (f, ps) = function(&mut s, "f", &[]);
    set_body(
        &mut s,
        f,
        Value::Builtin(Builtin::VaAt),
        vec![
            param(ps[0]),
            Argument::from(Value::symbol("b")),
            Argument::keyed("a", Value::i32(1)),
            Argument::keyed("b", Value::i32(2)),
        ],
    );
    let root = s.root_frame();

    let fi = specialize(&mut s, root, f, &[]).unwrap();
    assert_eq!(returned(&s, fi), vec![Argument::keyed("b", Value::i32(2))]);
}

#[test]
fn test_va_at_negative_index() {
    let mut s = Session::new();
    let args = vec![Value::int(types::i64(), -1), Value::i32(7)];
    match solve_builtin(&mut s, Builtin::VaAt, args) {
        Err(CompilerError::BuiltinError(msg, Some(_))) => assert_eq!(msg, "index out of range"),
        other => panic!("Expected builtin error, got {:?}", other),
    }
}

#[test]
fn test_select_on_constant_vectors_is_folded() {
    let mut s = Session::new();
    let vec_i32 = |xs: [i32; 2]| Value::Vector {
        ty: types::vec(2, types::i32()),
        elements: xs.iter().map(|x| Value::i32(*x)).collect(),
    };
    let cond = Value::Vector {
        ty: types::vec(2, types::bool_type()),
        elements: vec![Value::Bool(true), Value::Bool(false)],
    };
    let fi = solve_builtin(&mut s, Builtin::Select, vec![cond, vec_i32([1, 2]), vec_i32([3, 4])]).unwrap();
    assert_eq!(returned(&s, fi), vec![Argument::from(vec_i32([1, 4]))]);
}

#[test]
fn test_extract_and_insert_value_on_constant_aggregate() {
    let mut s = Session::new();
    let pair = Value::Aggregate {
        ty: types::tuple(vec![types::i32(), types::f32()]),
        elements: vec![Value::i32(1), Value::f32(2.0)],
    };

    let fi = solve_builtin(&mut s, Builtin::ExtractValue, vec![pair.clone(), Value::i32(1)]).unwrap();
    assert_eq!(returned(&s, fi), vec![Argument::from(Value::f32(2.0))]);
    assert_eq!(return_type(&s, fi), types::return_label_of(vec![types::f32()]));

    let args = vec![pair, Value::f32(5.0), Value::i32(1)];
    let fi = solve_builtin(&mut s, Builtin::InsertValue, args).unwrap();
    let expected = Value::Aggregate {
        ty: types::tuple(vec![types::i32(), types::f32()]),
        elements: vec![Value::i32(1), Value::f32(5.0)],
    };
    assert_eq!(returned(&s, fi), vec![Argument::from(expected)]);
}

#[test]
fn test_extract_value_requires_aggregate() {
    let mut s = Session::new();
    let (f, ps) = function(&mut s, "f", &[("x", None)]);
    set_body(
        &mut s,
        f,
        Value::Builtin(Builtin::ExtractValue),
        vec![param(ps[0]), param(ps[1]), Argument::from(Value::i32(0))],
    );
    let root = s.root_frame();

    let err = specialize(&mut s, root, f, &[types::i32()]).unwrap_err();
    assert_eq!(err.message(), "can not extract value from type i32");
}

/// `fn f(p) (gep p 0 index)`
fn element_pointer(s: &mut Session, index: Value) -> LabelId {
    let (f, ps) = function(s, "f", &[("p", None)]);
    set_body(
        s,
        f,
        Value::Builtin(Builtin::GetElementPtr),
        vec![param(ps[0]), param(ps[1]), Argument::from(Value::i32(0)), Argument::from(index)],
    );
    f
}

fn point_pointer() -> types::Type {
    types::native_pointer(types::keyed_tuple(vec![
        (Some("x".to_string()), types::i32()),
        (Some("y".to_string()), types::f32()),
    ]))
}

#[test]
fn test_get_element_ptr_by_field_name() {
    let mut s = Session::new();
    let f = element_pointer(&mut s, Value::symbol("y"));
    let root = s.root_frame();

    let fi = specialize(&mut s, root, f, &[point_pointer()]).unwrap();
    assert_eq!(
        return_type(&s, fi),
        types::return_label_of(vec![types::native_pointer(types::f32())])
    );
    // the field name is replaced by its index
    assert_eq!(s.label(fi).body.args[3].value, Value::i32(1));
}

#[test]
fn test_get_element_ptr_index_out_of_range() {
    let mut s = Session::new();
    let f = element_pointer(&mut s, Value::i32(5));
    let root = s.root_frame();

    match specialize(&mut s, root, f, &[point_pointer()]) {
        Err(CompilerError::TypeError(msg, Some(_))) => assert_eq!(msg, "index out of range"),
        other => panic!("Expected type error, got {:?}", other),
    }
}

#[test]
fn test_load_requires_readable_pointer() {
    let mut s = Session::new();
    let (f, ps) = function(&mut s, "f", &[("p", None)]);
    set_body(&mut s, f, Value::Builtin(Builtin::Load), vec![param(ps[0]), param(ps[1])]);
    let root = s.root_frame();
    let write_only = types::pointer(
        types::i32(),
        PointerFlags {
            readable: false,
            ..PointerFlags::default()
        },
    );

    let err = specialize(&mut s, root, f, &[write_only]).unwrap_err();
    assert!(err.message().starts_with("can not load value from address of type"));
    assert!(err.message().ends_with("because the target is non-readable"));
}

#[test]
fn test_store_requires_writable_pointer() {
    let mut s = Session::new();
    let (f, ps) = function(&mut s, "f", &[("v", None), ("p", None)]);
    set_body(
        &mut s,
        f,
        Value::Builtin(Builtin::Store),
        vec![param(ps[0]), param(ps[1]), param(ps[2])],
    );
    let root = s.root_frame();

    let err = specialize(&mut s, root, f, &[types::i32(), types::local_ro_pointer(types::i32())]).unwrap_err();
    assert!(err.message().starts_with("can not store value at address of type"));
    assert!(err.message().ends_with("because the target is non-writable"));
}

#[test]
fn test_stack_pointer_is_not_returnable() {
    let mut s = Session::new();
    match solve_builtin(&mut s, Builtin::Alloca, vec![Value::Type(types::i32())]) {
        Err(CompilerError::CapabilityError(msg, Some(_))) => {
            assert!(msg.starts_with("return argument #0 is of non-returnable pointer type"), "{}", msg);
            assert!(msg.ends_with("but function is not being inlined"), "{}", msg);
        }
        other => panic!("Expected capability error, got {:?}", other),
    }
}

// =============================================================================
// Diagnostics
// =============================================================================

#[test]
fn test_error_display_includes_anchor() {
    let mut s = Session::new();
    let f = select_through_merge(&mut s);
    let root = s.root_frame();

    let err = specialize(&mut s, root, f, &[types::bool_type(), types::i32(), types::f32()]).unwrap_err();
    let text = err.to_string();
    assert!(text.starts_with("test.sc:"), "{}", text);
    assert!(text.contains("control flow error: cannot merge"), "{}", text);
}

#[test]
fn test_function_to_string_lists_instance() {
    let mut s = Session::new();
    let f = double(&mut s);
    let root = s.root_frame();

    let fi = specialize(&mut s, root, f, &[types::i32()]).unwrap();
    let text = s.function_to_string(fi);
    assert!(text.starts_with(&s.label_to_string(fi)), "{}", text);
    assert!(text.contains("add"), "{}", text);
}
