//! Strongly connected components of the label call graph.
//!
//! Path-based algorithm: every label gets a preorder number, `stack` holds
//! labels not yet assigned to a group, and `path` holds candidate roots,
//! pruned whenever an edge leads back to a label with a lower preorder
//! number that is still unassigned. The walk uses an explicit work stack so
//! deep graphs cannot exhaust the native stack.

use std::collections::HashMap;

use crate::label::LabelId;
use crate::session::Session;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub index: usize,
    pub labels: Vec<LabelId>,
}

#[derive(Debug, Clone, Default)]
pub struct SCCBuilder {
    stack: Vec<LabelId>,
    path: Vec<LabelId>,
    preorder: HashMap<LabelId, usize>,
    groups: Vec<Group>,
    scc_map: HashMap<LabelId, usize>,
    counter: usize,
}

struct WalkFrame {
    label: LabelId,
    edges: Vec<LabelId>,
    next: usize,
}

impl SCCBuilder {
    pub fn new() -> Self {
        SCCBuilder::default()
    }

    pub fn from_label(session: &Session, top: LabelId) -> Self {
        let mut builder = SCCBuilder::new();
        builder.walk(session, top);
        builder
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn contains(&self, label: LabelId) -> bool {
        self.scc_map.contains_key(&label)
    }

    pub fn group_id(&self, label: LabelId) -> usize {
        self.scc_map[&label]
    }

    pub fn group(&self, label: LabelId) -> &Group {
        &self.groups[self.group_id(label)]
    }

    /// Part of a cycle through at least one other label.
    pub fn is_recursive(&self, label: LabelId) -> bool {
        self.group(label).labels.len() > 1
    }

    /// Assign groups to every label reachable from `top`.
    pub fn walk(&mut self, session: &Session, top: LabelId) {
        if self.preorder.contains_key(&top) {
            return;
        }
        let mut work = vec![self.enter(session, top)];
        while let Some(frame) = work.last_mut() {
            if frame.next < frame.edges.len() {
                let target = frame.edges[frame.next];
                frame.next += 1;
                match self.preorder.get(&target).copied() {
                    None => {
                        let child = self.enter(session, target);
                        work.push(child);
                    }
                    Some(target_order) => {
                        if !self.scc_map.contains_key(&target) {
                            while let Some(&candidate) = self.path.last() {
                                if self.preorder[&candidate] <= target_order {
                                    break;
                                }
                                self.path.pop();
                            }
                        }
                    }
                }
            } else {
                let label = frame.label;
                work.pop();
                self.leave(label);
            }
        }
    }

    fn enter(&mut self, session: &Session, label: LabelId) -> WalkFrame {
        self.preorder.insert(label, self.counter);
        self.counter += 1;
        self.stack.push(label);
        self.path.push(label);
        let body = &session.label(label).body;
        let edges = std::iter::once(&body.enter)
            .chain(body.args.iter().map(|arg| &arg.value))
            .filter_map(Value::as_label)
            .collect();
        WalkFrame {
            label,
            edges,
            next: 0,
        }
    }

    fn leave(&mut self, label: LabelId) {
        if self.path.last() != Some(&label) {
            return;
        }
        let index = self.groups.len();
        let mut labels = Vec::new();
        while let Some(member) = self.stack.pop() {
            labels.push(member);
            self.scc_map.insert(member, index);
            if member == label {
                break;
            }
        }
        self.groups.push(Group { index, labels });
        self.path.pop();
    }
}
