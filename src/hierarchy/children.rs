use parking_lot::{Mutex, MutexGuard};
use xias::Xias;

use crate::ComponentIdentifier;

/// The ordered child lists of all hierarchy components, indexed by identifier index.
///
/// Each list has its own mutex, so edits to different parents never contend.
pub(crate) struct ChildTable {
    lists: Box<[Mutex<Vec<ComponentIdentifier>>]>,
}

impl ChildTable {
    pub(crate) fn new(max_components: u32) -> Self {
        Self { lists: (0..max_components.small_int::<usize>()).map(|_| Mutex::default()).collect() }
    }

    /// Locks the child list of `parent`.
    pub(crate) fn lock(&self, parent: ComponentIdentifier) -> MutexGuard<'_, Vec<ComponentIdentifier>> {
        self.lists.get(parent.to_usize()).expect("identifier index out of range").lock()
    }

    /// Copies the child list of `parent`, so that the caller may recurse without holding the lock.
    pub(crate) fn snapshot(&self, parent: ComponentIdentifier) -> Vec<ComponentIdentifier> { self.lock(parent).clone() }

    pub(crate) fn first(&self, parent: ComponentIdentifier) -> Option<ComponentIdentifier> {
        self.lock(parent).first().copied()
    }

    pub(crate) fn len(&self, parent: ComponentIdentifier) -> usize { self.lock(parent).len() }

    /// Inserts `child` at `index`, or at the end if `index` is `None` or out of range.
    /// Returns the actual position.
    pub(crate) fn insert(
        &self,
        parent: ComponentIdentifier,
        child: ComponentIdentifier,
        index: Option<usize>,
    ) -> usize {
        let mut list = self.lock(parent);
        debug_assert!(!list.contains(&child), "{child} is already a child of {parent}");

        let index = index.map_or(list.len(), |index| index.min(list.len()));
        list.insert(index, child);
        index
    }

    /// Inserts `child` using `position` to pick the index under the lock.
    pub(crate) fn insert_with(
        &self,
        parent: ComponentIdentifier,
        child: ComponentIdentifier,
        position: impl FnOnce(&[ComponentIdentifier]) -> usize,
    ) -> usize {
        let mut list = self.lock(parent);
        debug_assert!(!list.contains(&child), "{child} is already a child of {parent}");

        let index = position(&list).min(list.len());
        list.insert(index, child);
        index
    }

    /// Removes `child` from the list of `parent`, returning its former position.
    pub(crate) fn remove(&self, parent: ComponentIdentifier, child: ComponentIdentifier) -> Option<usize> {
        let mut list = self.lock(parent);
        let index = list.iter().position(|&other| other == child)?;
        list.remove(index);
        Some(index)
    }

    /// Rotates the child list of `parent` to the right by `n` positions.
    ///
    /// Implemented as three in-place reversals so that no scratch buffer is allocated.
    pub(crate) fn rotate_right(&self, parent: ComponentIdentifier, n: usize) {
        let mut list = self.lock(parent);
        if list.is_empty() {
            return;
        }

        let n = n % list.len();
        list.reverse();
        let (head, tail) = list.split_at_mut(n);
        head.reverse();
        tail.reverse();
    }

    /// Empties the list of a destroyed component.
    pub(crate) fn clear(&self, parent: ComponentIdentifier) {
        let mut list = self.lock(parent);
        debug_assert!(list.is_empty(), "{parent} is removed with children {list:?}");
        list.clear();
        list.shrink_to_fit();
    }
}
