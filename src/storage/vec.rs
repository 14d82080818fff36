use std::mem::{self, MaybeUninit};

use bitvec::prelude::BitVec;

/// The basic storage indexed by identifier indices directly.
///
/// Presence is tracked in a bit vector;
/// `data[i]` is initialized if and only if `bits[i]` is set.
pub struct VecStorage<T> {
    cardinality: usize,
    bits:        BitVec,
    data:        Vec<MaybeUninit<T>>,
}

impl<T> VecStorage<T> {
    fn bit(&self, index: usize) -> bool {
        match self.bits.get(index) {
            Some(bit) => *bit,
            None => false,
        }
    }

    fn set_bit(&mut self, index: usize, bit: bool) {
        if self.bits.len() <= index {
            self.bits.resize(index + 1, false);
        }

        let delta_old = usize::from(*self.bits.get(index).expect("resized len >= index+1"));
        let delta_new = usize::from(bit);
        self.bits.set(index, bit);

        // split into two separate statements to avoid integer underflow
        self.cardinality -= delta_old;
        self.cardinality += delta_new;
    }

    /// Checks whether a value is present at `index`.
    pub fn contains(&self, index: usize) -> bool { self.bit(index) }

    /// Gets a shared reference to the value at `index` if it is present.
    pub fn get(&self, index: usize) -> Option<&T> {
        if self.bit(index) {
            let value = self.data.get(index).expect("bits mismatch");
            // Safety: the bit is set, so the slot is initialized.
            Some(unsafe { value.assume_init_ref() })
        } else {
            None
        }
    }

    /// Gets a mutable reference to the value at `index` if it is present.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if self.bit(index) {
            let value = self.data.get_mut(index).expect("bits mismatch");
            // Safety: the bit is set, so the slot is initialized.
            Some(unsafe { value.assume_init_mut() })
        } else {
            None
        }
    }

    /// Sets or removes the value at `index`, returning the original value if it was present.
    pub fn set(&mut self, index: usize, new: Option<T>) -> Option<T> {
        let old = if self.bit(index) {
            let value = self.data.get(index).expect("bits mismatch");
            // Safety: the bit is set, and it is overwritten or cleared below
            // so the moved-out value is never read again.
            Some(unsafe { value.assume_init_read() })
        } else {
            None
        };

        // the original value was already moved out, now we can overwrite the data or unmark it

        match new {
            Some(new) => {
                self.set_bit(index, true);
                if self.data.len() <= index {
                    self.data.resize_with(index + 1, MaybeUninit::uninit);
                }
                let bytes = self.data.get_mut(index).expect("just resized");
                *bytes = MaybeUninit::new(new);
            }
            None => {
                self.set_bit(index, false);
            }
        }

        old
    }

    /// Returns the number of values in this storage.
    pub fn cardinality(&self) -> usize { self.cardinality }

    /// Returns an immutable iterator over the storage, ordered by index.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> + '_ {
        let data = &self.data;
        self.bits.iter_ones().map(move |index| {
            let value = data.get(index).expect("bits mismatch");
            // Safety: `iter_ones` only yields initialized slots.
            (index, unsafe { value.assume_init_ref() })
        })
    }

    /// Returns a mutable iterator over the storage, ordered by index.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> + '_ {
        let data = &mut self.data;
        self.bits.iter_ones().map(move |index| {
            let value = data.get_mut(index).expect("bits mismatch");
            // Safety: `iter_ones` only yields initialized slots.
            let value = unsafe { value.assume_init_mut() };
            // Safety: `iter_ones` yields each index at most once, so the references never alias.
            (index, unsafe { mem::transmute::<&mut T, &mut T>(value) })
        })
    }

    /// Drops all values.
    pub fn clear(&mut self) {
        for index in self.bits.iter_ones() {
            let value = self.data.get_mut(index).expect("bits mismatch");
            // Safety: `iter_ones` only yields initialized slots, and the bits are cleared below.
            unsafe { value.assume_init_drop() };
        }
        self.bits.clear();
        self.data.clear();
        self.cardinality = 0;
    }
}

impl<T> Default for VecStorage<T> {
    fn default() -> Self { Self { cardinality: 0, bits: BitVec::new(), data: Vec::new() } }
}

impl<T> Drop for VecStorage<T> {
    fn drop(&mut self) { self.clear(); }
}
