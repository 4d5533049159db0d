use crate::label::UserMap;
use crate::parameter::{Parameter, PARAM_CONT};
use crate::session::Session;
use crate::test_support::*;
use crate::types::{self, FunctionFlags, TypeExt};
use crate::value::Value;
use crate::CompilerError;

// =============================================================================
// Construction
// =============================================================================

#[test]
fn test_function_and_continuation_templates() {
    let mut s = Session::new();
    let f = s.function_from(at(1), "f");
    let k = s.continuation_from(at(1), "k");

    assert!(s.label(f).is_template());
    assert!(!s.is_basic_block_like(f));
    assert!(!s.is_return_param_typed(f));
    assert!(s.is_basic_block_like(k));
    assert!(s.param(s.return_param(k)).ty.is_nothing());

    let inl = s.inline_from(at(1), "g");
    assert!(s.label(inl).is_inline());
}

#[test]
fn test_append_binds_parameter() {
    let mut s = Session::new();
    let (f, ps) = function(&mut s, "f", &[("a", None), ("b", Some(types::i32()))]);
    assert_eq!(s.label(f).params, ps);
    assert_eq!(s.param(ps[2]).index, 2);
    assert_eq!(s.param(ps[2]).label, Some(f));
    assert!(s.label(f).has_params());
    assert_eq!(s.get_param_by_name(f, "b"), Some(ps[2]));
    assert_eq!(s.get_param_by_name(f, ""), None);
}

#[test]
fn test_variadic_last_parameter() {
    let mut s = Session::new();
    let f = s.function_from(at(1), "f");
    assert!(!s.is_variadic(f));
    s.append(f, Parameter::variadic(at(1), "rest", types::unknown()));
    assert!(s.is_variadic(f));
}

#[test]
fn test_instance_of() {
    let mut s = Session::new();
    let (f, _) = block(&mut s, "m", &[]);
    s.label_mut(f).set_merge();

    let a = s.instance_of(f);
    let b = s.instance_of(f);
    assert!(!s.label(a).is_template());
    assert!(s.label(a).is_merge());
    assert_eq!(s.label(a).uid, 1);
    assert_eq!(s.label(b).uid, 2);
    assert!(s.label(a).params.is_empty());

    let c = s.instance_of(a);
    assert_eq!(s.get_original(c), f);
}

#[test]
fn test_set_parameters() {
    let mut s = Session::new();
    let f = s.function_from(at(1), "f");
    let inst = s.instance_of(f);
    let ids = s.set_parameters(
        inst,
        vec![
            Parameter::untyped(at(1), ""),
            Parameter::new(at(1), "x", types::f32()),
        ],
    );
    assert_eq!(ids.len(), 2);
    assert_eq!(s.param(ids[1]).index, 1);
    assert_eq!(s.get_params_as_return_label_type(inst), types::return_label_of(vec![types::f32()]));
}

// =============================================================================
// Queries
// =============================================================================

#[test]
fn test_return_type_of_untyped_function() {
    let mut s = Session::new();
    let (f, _) = function(&mut s, "f", &[("x", Some(types::i32()))]);
    assert_eq!(s.get_return_type(f), types::void());
    match s.verify_return_label(f) {
        Err(CompilerError::TypeError(msg, Some(_))) => assert_eq!(msg, "label is not a function"),
        other => panic!("Expected type error, got {:?}", other),
    }

    let fty = s.get_function_type(f);
    let (ret, params, flags) = fty.function_info().unwrap();
    assert_eq!(ret, &types::void());
    assert_eq!(params, &[types::i32()]);
    assert!(flags.divergent);
}

#[test]
fn test_function_type_after_typing_return() {
    let mut s = Session::new();
    let (f, ps) = function(&mut s, "f", &[]);
    let rl = types::return_label_of(vec![types::i32()]);
    s.param_mut(ps[PARAM_CONT]).ty = rl.clone();

    assert!(s.is_return_param_typed(f));
    assert_eq!(s.verify_return_label(f).unwrap(), rl);
    assert_eq!(
        s.get_function_type(f),
        types::function(rl, vec![], FunctionFlags::default())
    );
}

#[test]
fn test_verify_valid() {
    let mut s = Session::new();
    let f = s.new_label(at(1), "f");
    assert!(!s.is_valid(f));
    let err = s.verify_valid(f).unwrap_err();
    assert_eq!(err.message(), "label corrupt: parameters are missing");
    assert_eq!(s.active_anchor(), &at(1));
}

#[test]
fn test_verify_compilable_rejects_untyped_arguments() {
    let mut s = Session::new();
    let (f, _) = function(&mut s, "f", &[("x", None)]);
    let err = s.verify_compilable(f).unwrap_err();
    assert_eq!(err.message(), "cannot compile function with untyped argument");
}

#[test]
fn test_const_and_indirect_type() {
    let mut s = Session::new();
    let (_, ps) = function(&mut s, "f", &[("x", Some(types::i32()))]);
    let x = Value::Parameter(ps[1]);

    assert!(!s.is_const(&x));
    assert!(s.is_const(&Value::i32(3)));
    assert!(!s.is_const(&Value::unknown_of(types::i32())));
    assert_eq!(s.indirect_type(&x), types::i32());
    assert_eq!(x.type_of(), types::parameter_type());

    assert!(s.is_return_parameter(&Value::Parameter(ps[PARAM_CONT])));
    assert!(!s.is_return_parameter(&x));
    let (_, kps) = block(&mut s, "k", &[]);
    assert!(!s.is_return_parameter(&Value::Parameter(kps[PARAM_CONT])));
}

#[test]
fn test_jumping_and_calling() {
    let mut s = Session::new();
    let (f, _) = function(&mut s, "f", &[]);
    let (k, _) = block(&mut s, "k", &[]);
    set_body(&mut s, f, Value::Label(k), vec![none()]);
    assert!(s.label(f).is_jumping());
    assert!(s.label(f).is_calling(k));
    assert!(!s.label(f).is_continuing_to(k));
}

// =============================================================================
// Reachability and scope
// =============================================================================

/// f calls g returning to b1; b1 jumps to b2, which returns from f.
fn call_graph(s: &mut Session) -> [crate::LabelId; 4] {
    let (f, fps) = function(s, "f", &[]);
    let (g, gps) = function(s, "g", &[]);
    let (b1, _) = block(s, "b1", &[]);
    let (b2, _) = block(s, "b2", &[]);
    set_body(s, f, Value::Label(g), vec![label(b1)]);
    set_body(s, b1, Value::Label(b2), vec![none()]);
    set_body(s, b2, Value::Parameter(fps[PARAM_CONT]), vec![none()]);
    set_body(s, g, Value::Parameter(gps[PARAM_CONT]), vec![none()]);
    [f, g, b1, b2]
}

#[test]
fn test_build_reachable_lists_blocks_with_their_function() {
    let mut s = Session::new();
    let [f, g, b1, b2] = call_graph(&mut s);
    assert_eq!(s.build_reachable(f), vec![f, b1, b2, g]);
    assert_eq!(s.build_reachable(g), vec![g]);
}

#[test]
fn test_build_scope() {
    let mut s = Session::new();
    let [f, g, b1, b2] = call_graph(&mut s);
    assert_eq!(s.build_scope(f), vec![b2, b1]);
    assert!(s.build_scope(g).is_empty());
}

#[test]
fn test_usermap_insert_and_remove() {
    let mut s = Session::new();
    let [f, g, b1, _] = call_graph(&mut s);
    let mut um = UserMap::new();
    s.insert_into_usermap(f, &mut um);
    assert_eq!(um.label_users(g).collect::<Vec<_>>(), vec![f]);
    assert_eq!(um.label_users(b1).collect::<Vec<_>>(), vec![f]);

    s.remove_from_usermap(f, &mut um);
    assert_eq!(um.label_users(g).count(), 0);
}
