//! Generation-salted identifiers for component instances.
//!
//! An identifier is an index into the per-scene tables plus the generation
//! the index had when the identifier was issued.
//! Releasing an identifier bumps nothing; acquiring an index again bumps its generation,
//! so a stale identifier never compares equal to the fresh one at the same index.

use std::fmt;
use std::num::NonZeroU32;

use parking_lot::Mutex;
use xias::Xias;

mod recycler;
pub use recycler::{BTreeHint, Recycler};

/// The number of times an index has been handed out.
/// This type is fully ordered, where a greater generation implies newer version
/// (until it wraps around).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(NonZeroU32);

impl Generation {
    const FIRST: Self = Self(NonZeroU32::MIN);

    fn next(self) -> Self {
        match NonZeroU32::new(self.0.get().wrapping_add(1)) {
            Some(next) => Self(next),
            None => Self::FIRST,
        }
    }

    /// Returns the raw generation counter.
    pub fn get(self) -> u32 { self.0.get() }
}

/// Identifies a live component instance within a scene.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentIdentifier {
    index:      u32,
    generation: Generation,
}

impl ComponentIdentifier {
    /// The slot index of this identifier.
    pub fn index(self) -> u32 { self.index }

    /// The slot index of this identifier as a `usize`.
    pub fn to_usize(self) -> usize { self.index.small_int() }

    /// The generation of the slot when this identifier was issued.
    pub fn generation(self) -> Generation { self.generation }
}

impl fmt::Debug for ComponentIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation.get())
    }
}

impl fmt::Display for ComponentIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { fmt::Debug::fmt(self, f) }
}

/// Allocates and recycles [`ComponentIdentifier`]s from a fixed index space.
pub struct IdentifierStorage<R: Recycler = Vec<u32>> {
    capacity: u32,
    inner:    Mutex<Inner<R>>,
}

struct Inner<R> {
    /// `generations[i]` is the generation last issued for index `i`.
    generations: Vec<Generation>,
    /// `live[i]` is true if index `i` is currently handed out.
    live:        Vec<bool>,
    /// Released indices available for reuse.
    recycler:    R,
    /// Number of currently live identifiers.
    live_count:  usize,
}

impl<R: Recycler> IdentifierStorage<R> {
    /// Creates a storage that can hold at most `capacity` live identifiers.
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner {
                generations: Vec::new(),
                live:        Vec::new(),
                recycler:    R::default(),
                live_count:  0,
            }),
        }
    }

    /// The maximum number of simultaneously live identifiers.
    pub fn capacity(&self) -> u32 { self.capacity }

    /// Acquires a fresh identifier.
    ///
    /// # Panics
    /// Panics if all indices are live.
    /// This is a configuration error; increase the capacity of the storage.
    pub fn acquire(&self) -> ComponentIdentifier { self.acquire_with_hint(R::Hint::default()) }

    /// Acquires a fresh identifier, passing `hint` to the recycler.
    pub fn acquire_with_hint(&self, hint: R::Hint) -> ComponentIdentifier {
        let mut inner = self.inner.lock();

        let index = match inner.recycler.poll(hint) {
            Some(index) => index,
            None => {
                let next = inner.generations.len();
                assert!(
                    next < self.capacity.small_int::<usize>(),
                    "Identifier storage exhausted all {} indices",
                    self.capacity
                );
                inner.generations.push(Generation::FIRST);
                inner.live.push(false);
                let index: u32 = next.small_int();
                let identifier = ComponentIdentifier { index, generation: Generation::FIRST };
                inner.mark_live(identifier);
                return identifier;
            }
        };

        let slot = inner.generations.get_mut(index.small_int::<usize>()).expect("recycled index");
        *slot = slot.next();
        let identifier = ComponentIdentifier { index, generation: *slot };
        inner.mark_live(identifier);
        identifier
    }

    /// Returns an identifier to the pool.
    ///
    /// # Panics
    /// Panics if `identifier` is not live.
    pub fn release(&self, identifier: ComponentIdentifier) {
        let mut inner = self.inner.lock();
        assert!(inner.is_valid(identifier), "Cannot release stale identifier {identifier:?}");

        *inner.live.get_mut(identifier.to_usize()).expect("validated index") = false;
        inner.live_count -= 1;
        inner.recycler.extend(Some(identifier.index));
        log::trace!("Released identifier {identifier:?}");
    }

    /// Checks whether `identifier` is currently live.
    pub fn is_valid(&self, identifier: ComponentIdentifier) -> bool {
        self.inner.lock().is_valid(identifier)
    }

    /// Returns the live identifier at `index`, if any.
    pub fn active_identifier(&self, index: u32) -> Option<ComponentIdentifier> {
        let inner = self.inner.lock();
        let index_usize = index.small_int::<usize>();
        match (inner.live.get(index_usize), inner.generations.get(index_usize)) {
            (Some(true), Some(&generation)) => Some(ComponentIdentifier { index, generation }),
            _ => None,
        }
    }

    /// The number of indices that have ever been handed out.
    /// All live identifiers have an index below this value.
    pub fn maximum_used_count(&self) -> u32 { self.inner.lock().generations.len().small_int() }

    /// The number of currently live identifiers.
    pub fn live_count(&self) -> usize { self.inner.lock().live_count }

    /// Returns a snapshot of all live identifiers in index order.
    pub fn iter_live(&self) -> impl Iterator<Item = ComponentIdentifier> {
        let inner = self.inner.lock();
        let live: Vec<_> = inner
            .live
            .iter()
            .zip(&inner.generations)
            .enumerate()
            .filter(|(_, (&live, _))| live)
            .map(|(index, (_, &generation))| ComponentIdentifier {
                index: index.small_int(),
                generation,
            })
            .collect();
        live.into_iter()
    }
}

impl<R> Inner<R> {
    fn is_valid(&self, identifier: ComponentIdentifier) -> bool {
        let index = identifier.to_usize();
        self.live.get(index).copied().unwrap_or(false)
            && self.generations.get(index) == Some(&identifier.generation)
    }

    fn mark_live(&mut self, identifier: ComponentIdentifier) {
        let live = self.live.get_mut(identifier.to_usize()).expect("index was just allocated");
        debug_assert!(!*live, "index {} allocated twice", identifier.index);
        *live = true;
        self.live_count += 1;
    }
}

#[cfg(test)]
mod tests;
