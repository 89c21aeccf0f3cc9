// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::hash::{BuildHasherDefault, Hash};

pub type FxIndexMap<K, V> = indexmap::IndexMap<K, V, BuildHasherDefault<rustc_hash::FxHasher>>;
pub type FxIndexSet<K> = indexmap::IndexSet<K, BuildHasherDefault<rustc_hash::FxHasher>>;
pub type FxHashMap<K, V> =
    std::collections::HashMap<K, V, BuildHasherDefault<rustc_hash::FxHasher>>;

pub trait Id: Copy + Eq + Hash {
    /// Convert from a usize offset into an Id. This should be loss-less
    /// except for certain edges.
    /// # Panics
    /// Panics if the usize cannot be represented in the Id, for instance if
    /// the offset cannot fit in the underlying integer type. This is expected
    /// to be ultra-rare (more than u32::MAX items created?!).
    fn from_offset(inner: usize) -> Self;

    fn to_offset(&self) -> usize;
}

pub trait Item: Eq + Hash {
    /// The Id associated with this Item, e.g. Function -> FunctionId.
    type Id: Id;
}

/// Fits the offset into a 32-bit id, with guards against overflowing u32.
#[inline]
pub fn small_id(offset: usize) -> Option<u32> {
    offset.try_into().ok()
}

pub trait Dedup<T: Item> {
    /// Deduplicate the Item and return its associated Id.
    /// # Panics
    /// Panics if the number of items overflows the storage capabilities of
    /// the associated Id type.
    fn dedup(&mut self, item: T) -> <T as Item>::Id;

    /// Deduplicate the Item, and check that the generated Id is in range.
    fn checked_dedup(&mut self, item: T) -> anyhow::Result<<T as Item>::Id>;
}

impl<T: Item> Dedup<T> for FxIndexSet<T> {
    fn dedup(&mut self, item: T) -> <T as Item>::Id {
        let (id, _) = self.insert_full(item);
        <T as Item>::Id::from_offset(id)
    }

    /// An id that comes back out of bounds means the table is no longer
    /// trustworthy for any consumer, so the extra check is kept even in
    /// release builds.
    fn checked_dedup(&mut self, item: T) -> anyhow::Result<<T as Item>::Id> {
        let (id, _) = self.insert_full(item);

        anyhow::ensure!(
            id < self.len(),
            "out of bounds id generated {:?}, len was {:?}",
            id,
            self.len()
        );

        Ok(<T as Item>::Id::from_offset(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Eq, PartialEq, Hash)]
    struct Widget(u32);

    #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
    struct WidgetId(u32);

    impl Id for WidgetId {
        fn from_offset(inner: usize) -> Self {
            #[allow(clippy::expect_used)]
            Self(small_id(inner).expect("WidgetId to fit into a u32"))
        }

        fn to_offset(&self) -> usize {
            self.0 as usize
        }
    }

    impl Item for Widget {
        type Id = WidgetId;
    }

    #[test]
    fn dedup_returns_stable_ids() {
        let mut set = FxIndexSet::<Widget>::default();
        let a = set.dedup(Widget(10));
        let b = set.dedup(Widget(11));
        let a2 = set.dedup(Widget(10));

        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert_eq!(a.to_offset(), 0);
        assert_eq!(b.to_offset(), 1);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn checked_dedup_matches_dedup() {
        let mut set = FxIndexSet::<Widget>::default();
        let a = set.checked_dedup(Widget(7)).unwrap();
        let b = set.dedup(Widget(7));
        assert_eq!(a, b);
    }
}
