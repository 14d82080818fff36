use std::collections::BTreeSet;

/// A data structure that provides the ability to recycle released indices.
pub trait Recycler: Default + Extend<u32> + Send + 'static {
    /// Additional configuration for polling.
    type Hint: Default;

    /// Returns the number of indices waiting for reuse.
    fn len(&self) -> usize;

    /// Returns whether the recycler is empty.
    fn is_empty(&self) -> bool { self.len() == 0 }

    /// Polls an index from the recycler based on the given hint.
    fn poll(&mut self, hint: Self::Hint) -> Option<u32>;
}

/// A minimal recycler implemented through a FILO stack.
impl Recycler for Vec<u32> {
    type Hint = ();

    fn len(&self) -> usize { Vec::len(self) }

    fn poll(&mut self, (): ()) -> Option<u32> { self.pop() }
}

/// Additional configuration for polling indices from a BTreeSet recycler.
#[derive(Default)]
pub struct BTreeHint {
    /// Try to reuse the index nearest to the given value.
    pub near: Option<u32>,
}

/// Reuses the lowest index by default, which keeps dense tables compact.
impl Recycler for BTreeSet<u32> {
    type Hint = BTreeHint;

    fn len(&self) -> usize { BTreeSet::len(self) }

    fn poll(&mut self, hint: BTreeHint) -> Option<u32> {
        let Some(near) = hint.near else { return self.pop_first() };

        let left = self.range(..near).next_back().copied();
        let right = self.range(near..).next().copied();

        let selected = match (left, right) {
            (Some(left), Some(right)) => {
                if near - left <= right - near {
                    left
                } else {
                    right
                }
            }
            (Some(left), None) => left,
            (None, Some(right)) => right,
            (None, None) => return None,
        };

        let removed = self.remove(&selected);
        assert!(removed, "self.range() item is not in self");
        Some(selected)
    }
}
