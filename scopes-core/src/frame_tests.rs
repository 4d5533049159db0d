use crate::frame::ArgsKey;
use crate::session::Session;
use crate::test_support::*;
use crate::types;
use crate::value::{Argument, Value};

#[test]
fn test_root_frame() {
    let s = Session::new();
    let root = s.frame(s.root_frame());
    assert!(root.is_root());
    assert!(root.label.is_none());
    assert_eq!(root.child_count(), 0);
}

#[test]
fn test_insert_and_find_frame() {
    let mut s = Session::new();
    let (f, _) = function(&mut s, "f", &[("x", None)]);
    let inst = s.instance_of(f);
    let root = s.root_frame();
    let frame = s.new_frame(root, f, inst, 0);

    let key = ArgsKey::new(f, vec![Argument::from(Value::unknown_of(types::i32()))]);
    s.frame_mut(root).insert_frame(key.clone(), frame);

    assert_eq!(s.frame(root).find_frame(&key), Some(frame));
    let other = ArgsKey::new(f, vec![Argument::from(Value::unknown_of(types::f32()))]);
    assert_eq!(s.frame(root).find_frame(&other), None);

    let (found, id) = s.frame(root).find_any_frame(f).unwrap();
    assert_eq!(found, &key);
    assert_eq!(id, frame);
    assert_eq!(s.frame(frame).instance(), inst);
}

#[test]
fn test_keys_distinguish_keywords() {
    let a = ArgsKey::new(crate::LabelId(0), vec![Argument::keyed("x", Value::i32(1))]);
    let b = ArgsKey::new(crate::LabelId(0), vec![Argument::from(Value::i32(1))]);
    assert_ne!(a, b);
}

#[test]
fn test_find_parent_frame() {
    let mut s = Session::new();
    let (f, _) = function(&mut s, "f", &[]);
    let (g, _) = function(&mut s, "g", &[]);
    let root = s.root_frame();
    let fi = s.instance_of(f);
    let gi = s.instance_of(g);
    let ff = s.new_frame(root, f, fi, 0);
    let gf = s.new_frame(ff, g, gi, 0);

    assert_eq!(s.find_parent_frame(gf, f), Some(ff));
    assert_eq!(s.find_parent_frame(gf, g), Some(gf));
    assert_eq!(s.find_parent_frame(ff, g), None);
}

#[test]
fn test_all_args_constant() {
    let mut s = Session::new();
    let (f, ps) = function(&mut s, "f", &[("x", None)]);
    let root = s.root_frame();
    let inst = s.instance_of(f);
    let frame = s.new_frame(root, f, inst, 0);

    s.frame_mut(frame).args = vec![
        Argument::from(Value::untyped()),
        Argument::from(Value::i32(4)),
    ];
    assert!(s.frame(frame).all_args_constant());

    s.frame_mut(frame).args[1] = Argument::from(Value::Parameter(ps[1]));
    assert!(!s.frame(frame).all_args_constant());
}
