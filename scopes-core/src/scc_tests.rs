use crate::parameter::PARAM_CONT;
use crate::scc::SCCBuilder;
use crate::session::Session;
use crate::test_support::*;
use crate::value::Value;

#[test]
fn test_acyclic_graph_has_singleton_groups() {
    let mut s = Session::new();
    let (f, _) = function(&mut s, "f", &[]);
    let (g, gps) = function(&mut s, "g", &[]);
    let (b, _) = block(&mut s, "b", &[]);
    set_body(&mut s, f, Value::Label(g), vec![label(b)]);
    set_body(&mut s, g, Value::Parameter(gps[PARAM_CONT]), vec![none()]);
    set_body(&mut s, b, Value::None, vec![none()]);

    let scc = SCCBuilder::from_label(&s, f);
    assert_eq!(scc.groups().len(), 3);
    for l in [f, g, b] {
        assert!(scc.contains(l));
        assert!(!scc.is_recursive(l));
    }
    // callees are completed before their callers
    assert!(scc.group_id(g) < scc.group_id(f));
}

#[test]
fn test_mutual_recursion_forms_one_group() {
    let mut s = Session::new();
    let (f, fps) = function(&mut s, "f", &[]);
    let (g, gps) = function(&mut s, "g", &[]);
    let (h, hps) = function(&mut s, "h", &[]);
    set_body(&mut s, f, Value::Label(g), vec![param(fps[PARAM_CONT])]);
    set_body(&mut s, g, Value::Label(f), vec![param(gps[PARAM_CONT]), label(h)]);
    set_body(&mut s, h, Value::Parameter(hps[PARAM_CONT]), vec![none()]);

    let scc = SCCBuilder::from_label(&s, f);
    assert!(scc.is_recursive(f));
    assert!(scc.is_recursive(g));
    assert!(!scc.is_recursive(h));
    assert_eq!(scc.group_id(f), scc.group_id(g));

    let group = scc.group(f);
    assert_eq!(group.labels.len(), 2);
    assert!(group.labels.contains(&f) && group.labels.contains(&g));
}

#[test]
fn test_self_loop_is_not_recursive_group() {
    let mut s = Session::new();
    let (b, _) = block(&mut s, "loop", &[]);
    set_body(&mut s, b, Value::Label(b), vec![none()]);

    let scc = SCCBuilder::from_label(&s, b);
    assert_eq!(scc.groups().len(), 1);
    assert!(!scc.is_recursive(b));
}

#[test]
fn test_unreached_label_is_absent() {
    let mut s = Session::new();
    let (f, fps) = function(&mut s, "f", &[]);
    let (other, _) = function(&mut s, "other", &[]);
    set_body(&mut s, f, Value::Parameter(fps[PARAM_CONT]), vec![none()]);

    let scc = SCCBuilder::from_label(&s, f);
    assert!(scc.contains(f));
    assert!(!scc.contains(other));
}
