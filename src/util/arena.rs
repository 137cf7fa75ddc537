//! Generational arena for wait-queue records.
//!
//! Wait nodes and condition lists live in one arena per lock and refer to
//! each other by [`ArenaIndex`] instead of pointers. Each slot carries a
//! generation counter that is bumped when the slot is freed, so an index kept
//! past its removal no longer resolves (ABA safety). No unsafe code.

use core::fmt;

/// Index into an [`Arena`], tagged with the slot generation.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct ArenaIndex {
    slot: u32,
    generation: u32,
}

#[cfg(test)]
impl ArenaIndex {
    /// Returns the slot number.
    #[inline]
    #[must_use]
    pub(crate) const fn slot(self) -> u32 {
        self.slot
    }

    /// Returns the generation the index was issued for.
    #[inline]
    #[must_use]
    pub(crate) const fn generation(self) -> u32 {
        self.generation
    }
}

impl ArenaIndex {
    /// Packs the index into one word for publication through an atomic.
    #[inline]
    #[must_use]
    pub(crate) const fn to_bits(self) -> u64 {
        ((self.slot as u64) << 32) | self.generation as u64
    }

    /// Inverse of [`to_bits`](Self::to_bits).
    #[inline]
    #[must_use]
    pub(crate) const fn from_bits(bits: u64) -> Self {
        Self {
            slot: (bits >> 32) as u32,
            generation: bits as u32,
        }
    }
}

impl fmt::Debug for ArenaIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.slot, self.generation)
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot storage with stable, generation-checked indices and slot reuse.
#[derive(Debug)]
pub(crate) struct Arena<T> {
    slots: Vec<Slot<T>>,
    /// Vacant slot numbers, reused LIFO.
    free: Vec<u32>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl<T> Arena<T> {
    /// Creates an arena with room for `capacity` values before growing.
    #[must_use]
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Number of occupied slots.
    #[inline]
    #[must_use]
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    /// Stores `value` and returns its index.
    pub(crate) fn insert(&mut self, value: T) -> ArenaIndex {
        self.len += 1;
        if let Some(slot) = self.free.pop() {
            let entry = &mut self.slots[slot as usize];
            entry.value = Some(value);
            return ArenaIndex {
                slot,
                generation: entry.generation,
            };
        }
        let slot = u32::try_from(self.slots.len()).expect("arena overflow");
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        ArenaIndex {
            slot,
            generation: 0,
        }
    }

    /// Removes and returns the value at `index`, if it is still live.
    pub(crate) fn remove(&mut self, index: ArenaIndex) -> Option<T> {
        let entry = self.slots.get_mut(index.slot as usize)?;
        if entry.generation != index.generation {
            return None;
        }
        let value = entry.value.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(index.slot);
        self.len -= 1;
        Some(value)
    }

    /// Returns the value at `index`, if it is still live.
    #[inline]
    #[must_use]
    pub(crate) fn get(&self, index: ArenaIndex) -> Option<&T> {
        let entry = self.slots.get(index.slot as usize)?;
        if entry.generation == index.generation {
            entry.value.as_ref()
        } else {
            None
        }
    }

    /// Returns the value at `index` mutably, if it is still live.
    #[inline]
    pub(crate) fn get_mut(&mut self, index: ArenaIndex) -> Option<&mut T> {
        let entry = self.slots.get_mut(index.slot as usize)?;
        if entry.generation == index.generation {
            entry.value.as_mut()
        } else {
            None
        }
    }

    /// Returns true if `index` resolves to a live value.
    #[must_use]
    pub(crate) fn contains(&self, index: ArenaIndex) -> bool {
        self.get(index).is_some()
    }
}
