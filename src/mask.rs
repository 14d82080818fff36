//! Fixed-width bit masks over component type identifiers.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::component::{ComponentTypeIdentifier, MAX_COMPONENT_TYPES};

const WORDS: usize = MAX_COMPONENT_TYPES / 64;

/// A snapshot of a set of component types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TypeMask([u64; WORDS]);

impl TypeMask {
    /// Checks whether `ty` is in the set.
    pub fn is_set(&self, ty: ComponentTypeIdentifier) -> bool {
        let (word, bit) = locate(ty);
        self.0[word] & bit != 0
    }

    /// Adds `ty` to the set.
    pub fn set(&mut self, ty: ComponentTypeIdentifier) {
        let (word, bit) = locate(ty);
        self.0[word] |= bit;
    }

    /// Removes `ty` from the set.
    pub fn clear(&mut self, ty: ComponentTypeIdentifier) {
        let (word, bit) = locate(ty);
        self.0[word] &= !bit;
    }

    /// Checks whether any type is in the set.
    pub fn any(&self) -> bool { self.0.iter().any(|&word| word != 0) }

    /// Checks whether every type in `other` is also in `self`.
    pub fn contains_all(&self, other: &TypeMask) -> bool {
        self.0.iter().zip(&other.0).all(|(&this, &that)| this & that == that)
    }

    /// The number of types in the set.
    pub fn count(&self) -> usize { self.0.iter().map(|word| word.count_ones() as usize).sum() }

    /// Iterates over the types in ascending identifier order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = ComponentTypeIdentifier> + '_ {
        (0..MAX_COMPONENT_TYPES)
            .map(ComponentTypeIdentifier::from_usize)
            .filter(move |&ty| self.is_set(ty))
    }
}

/// A [`TypeMask`] that can be updated concurrently.
#[derive(Debug, Default)]
pub struct AtomicTypeMask([AtomicU64; WORDS]);

impl AtomicTypeMask {
    /// Sets the bit of `ty`, returning true if it was previously unset.
    pub fn set(&self, ty: ComponentTypeIdentifier) -> bool {
        let (word, bit) = locate(ty);
        self.0[word].fetch_or(bit, Ordering::AcqRel) & bit == 0
    }

    /// Clears the bit of `ty`, returning true if it was previously set.
    pub fn clear(&self, ty: ComponentTypeIdentifier) -> bool {
        let (word, bit) = locate(ty);
        self.0[word].fetch_and(!bit, Ordering::AcqRel) & bit != 0
    }

    /// Checks whether the bit of `ty` is set.
    pub fn is_set(&self, ty: ComponentTypeIdentifier) -> bool {
        let (word, bit) = locate(ty);
        self.0[word].load(Ordering::Acquire) & bit != 0
    }

    /// Takes a snapshot of the mask.
    pub fn load(&self) -> TypeMask {
        TypeMask(std::array::from_fn(|word| self.0[word].load(Ordering::Acquire)))
    }

    /// Clears all bits and returns the previous contents.
    pub fn fetch_clear(&self) -> TypeMask {
        TypeMask(std::array::from_fn(|word| self.0[word].swap(0, Ordering::AcqRel)))
    }
}

fn locate(ty: ComponentTypeIdentifier) -> (usize, u64) {
    let index = ty.to_usize();
    (index / 64, 1 << (index % 64))
}
