//! Miscellaneous utilities shared across modules.

use std::any::{self, TypeId};
use std::sync::atomic::{AtomicPtr, AtomicU32, Ordering};
use std::{fmt, ptr};

/// A [`TypeId`] that remembers the type name for debugging.
#[derive(Clone, Copy)]
pub struct DbgTypeId {
    /// The underlying type ID.
    pub id:   TypeId,
    /// The name of the type, only used for diagnostics.
    pub name: &'static str,
}

impl DbgTypeId {
    /// Returns the debug type ID of `T`.
    pub fn of<T: 'static>() -> Self { Self { id: TypeId::of::<T>(), name: any::type_name::<T>() } }
}

impl fmt::Debug for DbgTypeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "{}", self.name) }
}

impl PartialEq for DbgTypeId {
    fn eq(&self, other: &Self) -> bool { self.id == other.id }
}

impl Eq for DbgTypeId {}

impl std::hash::Hash for DbgTypeId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) { self.id.hash(state) }
}

/// A lazily initialized heap slot that is filled by compare-and-swap.
///
/// Concurrent initializers may each construct a value,
/// but only the first successful swap is retained and the losers are dropped.
/// Values are never removed through a shared reference,
/// so references returned by [`get`](Self::get) live as long as the slot.
pub(crate) struct AtomicBox<T> {
    ptr: AtomicPtr<T>,
}

impl<T> AtomicBox<T> {
    pub(crate) const fn new() -> Self { Self { ptr: AtomicPtr::new(ptr::null_mut()) } }

    pub(crate) fn get(&self) -> Option<&T> {
        let ptr = self.ptr.load(Ordering::Acquire);
        // Safety: non-null pointers were created by `Box::into_raw` in `get_or_init`
        // and are only freed with unique access.
        unsafe { ptr.as_ref() }
    }

    pub(crate) fn get_or_init(&self, init: impl FnOnce() -> T) -> &T {
        if let Some(value) = self.get() {
            return value;
        }

        let new = Box::into_raw(Box::new(init()));
        match self.ptr.compare_exchange(ptr::null_mut(), new, Ordering::AcqRel, Ordering::Acquire) {
            // Safety: `new` was just leaked from a box and is now owned by the slot.
            Ok(_) => unsafe { &*new },
            Err(existing) => {
                // Safety: `new` was never published, so this is the only reference.
                drop(unsafe { Box::from_raw(new) });
                // Safety: `existing` is non-null since the swap from null failed.
                unsafe { &*existing }
            }
        }
    }

    pub(crate) fn take(&mut self) -> Option<Box<T>> {
        let ptr = std::mem::replace(self.ptr.get_mut(), ptr::null_mut());
        if ptr.is_null() {
            None
        } else {
            // Safety: the pointer came from `Box::into_raw` and is no longer reachable.
            Some(unsafe { Box::from_raw(ptr) })
        }
    }
}

impl<T> Default for AtomicBox<T> {
    fn default() -> Self { Self::new() }
}

impl<T> Drop for AtomicBox<T> {
    fn drop(&mut self) { drop(self.take()); }
}

// Safety: the slot hands out `&T` across threads and moves `T` on drop.
unsafe impl<T: Send + Sync> Send for AtomicBox<T> {}
// Safety: see above.
unsafe impl<T: Send + Sync> Sync for AtomicBox<T> {}

/// An `f32` stored as its bit pattern in an [`AtomicU32`].
#[derive(Default)]
pub(crate) struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub(crate) fn new(value: f32) -> Self { Self(AtomicU32::new(value.to_bits())) }

    pub(crate) fn load(&self, ordering: Ordering) -> f32 { f32::from_bits(self.0.load(ordering)) }

    pub(crate) fn store(&self, value: f32, ordering: Ordering) {
        self.0.store(value.to_bits(), ordering)
    }
}

#[cfg(test)]
mod tests;
