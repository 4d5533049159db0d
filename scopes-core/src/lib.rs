//! Partial evaluator and specializer for the Scopes label IR.
//!
//! Programs arrive as graphs of template labels in continuation-passing
//! style. The specializer instantiates templates per calling context,
//! propagates constants, types every parameter and continuation, and leaves
//! behind a graph of monomorphic instance labels ready for code generation.
//!
//! All state for one compile request lives in a [`Session`]; the entry point
//! is [`specialize`] or, for finer control, a [`Specializer`].

pub mod anchor;
pub mod body;
pub mod builtin;
pub mod closure;
pub mod config;
pub mod constant_folding;
pub mod error;
pub mod ffi;
pub mod frame;
pub mod label;
pub mod parameter;
pub mod printer;
pub mod scc;
pub mod session;
pub mod specializer;
pub mod types;
pub mod value;

#[cfg(test)]
mod test_support;

#[cfg(test)]
mod frame_tests;
#[cfg(test)]
mod label_tests;
#[cfg(test)]
mod scc_tests;
#[cfg(test)]
mod specializer_tests;

use std::hash::Hash;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

use indexmap::IndexMap;

// =============================================================================
// Generic ID allocation
// =============================================================================

/// Generic counter for generating unique IDs.
///
/// The ID type must implement `From<u32>` to convert the raw counter value.
#[derive(Debug, Clone)]
pub struct IdSource<Id> {
    next_id: u32,
    _phantom: PhantomData<Id>,
}

impl<Id: From<u32>> IdSource<Id> {
    pub fn new() -> Self {
        IdSource {
            next_id: 0,
            _phantom: PhantomData,
        }
    }

    pub fn next(&mut self) -> Id {
        let id = Id::from(self.next_id);
        self.next_id += 1;
        id
    }
}

impl<Id: From<u32>> Default for IdSource<Id> {
    fn default() -> Self {
        Self::new()
    }
}

/// Arena that allocates IDs and stores associated items.
///
/// Labels, parameters, frames and closures all live in arenas owned by the
/// session and refer to each other by id, so the cyclic label graph needs no
/// shared ownership. Iteration follows allocation order.
#[derive(Debug, Clone)]
pub struct IdArena<Id, T> {
    source: IdSource<Id>,
    items: IndexMap<Id, T>,
}

impl<Id: From<u32> + Copy + Eq + Hash, T> IdArena<Id, T> {
    pub fn new() -> Self {
        IdArena {
            source: IdSource::new(),
            items: IndexMap::new(),
        }
    }

    /// Allocate a new ID and store the item.
    pub fn alloc(&mut self, item: T) -> Id {
        let id = self.source.next();
        self.items.insert(id, item);
        id
    }

    pub fn get(&self, id: Id) -> Option<&T> {
        self.items.get(&id)
    }

    pub fn get_mut(&mut self, id: Id) -> Option<&mut T> {
        self.items.get_mut(&id)
    }

    /// Iterate over all (id, item) pairs in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (&Id, &T)> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<Id: From<u32> + Copy + Eq + Hash, T> Default for IdArena<Id, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Ids are only handed out by `alloc`, so a missing entry is a bug.
impl<Id: From<u32> + Copy + Eq + Hash + std::fmt::Debug, T> Index<Id> for IdArena<Id, T> {
    type Output = T;

    fn index(&self, id: Id) -> &T {
        match self.items.get(&id) {
            Some(item) => item,
            None => panic!("unknown id {:?}", id),
        }
    }
}

impl<Id: From<u32> + Copy + Eq + Hash + std::fmt::Debug, T> IndexMut<Id> for IdArena<Id, T> {
    fn index_mut(&mut self, id: Id) -> &mut T {
        match self.items.get_mut(&id) {
            Some(item) => item,
            None => panic!("unknown id {:?}", id),
        }
    }
}

impl<'a, Id: From<u32> + Copy + Eq + Hash, T> IntoIterator for &'a IdArena<Id, T> {
    type Item = (&'a Id, &'a T);
    type IntoIter = indexmap::map::Iter<'a, Id, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

// Re-export key types for the public API
pub use anchor::Anchor;
pub use builtin::Builtin;
pub use config::SpecializerConfig;
pub use error::{CompilerError, Result};
pub use frame::FrameId;
pub use label::LabelId;
pub use parameter::ParamId;
pub use session::Session;
pub use specializer::Specializer;
pub use types::Type;
pub use value::{Argument, Args, Value};

/// Specialize the function template `label` for runtime arguments of the
/// given types, instantiated in `frame` (usually the session's root frame).
///
/// Returns the typed entry instance. On failure the error carries the
/// anchor of the offending body.
pub fn specialize(
    session: &mut Session,
    frame: FrameId,
    label: LabelId,
    argtypes: &[Type],
) -> Result<LabelId> {
    Specializer::new(session).typify(frame, label, argtypes)
}
