// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::collections::identifiable::{small_id, FxIndexSet, Id};

/// Id into a [StringTable]. The empty string is always id 0.
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct StringId(u32);

impl StringId {
    pub const ZERO: StringId = StringId(0);

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Id for StringId {
    fn from_offset(inner: usize) -> Self {
        #[allow(clippy::expect_used)]
        Self(small_id(inner).expect("StringId to fit into a u32"))
    }

    fn to_offset(&self) -> usize {
        self.0 as usize
    }
}

/// Append-only deduplicating string storage. Strings are special because the
/// empty string is allowed at index 0; most other 0 ids are ordinary entries.
pub struct StringTable {
    strings: FxIndexSet<Box<str>>,
}

impl StringTable {
    /// Creates a table whose first entry is the empty string.
    pub fn new() -> Self {
        Self::with_capacity(1)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut strings = FxIndexSet::with_capacity_and_hasher(capacity.max(1), Default::default());
        strings.insert("".into());
        Self { strings }
    }

    /// Interns the `str`, returning its id in the table. Allocates only when
    /// the string has not been seen before.
    pub fn intern(&mut self, str: &str) -> StringId {
        match self.strings.get_index_of(str) {
            Some(index) => StringId::from_offset(index),
            None => {
                let (index, inserted) = self.strings.insert_full(str.into());
                // This wouldn't make any sense; the item couldn't be found so
                // it was inserted but then it already existed?
                assert!(inserted);
                StringId::from_offset(index)
            }
        }
    }

    /// # Panics
    /// Panics if the id was not produced by this table.
    pub fn get(&self, id: StringId) -> &str {
        #[allow(clippy::expect_used)]
        self.strings
            .get_index(id.to_offset())
            .expect("StringId to be valid for this StringTable")
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        // The empty string is always present.
        false
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.strings.iter().map(|s| s.as_ref())
    }
}

impl Default for StringTable {
    fn default() -> Self {
        Self::new()
    }
}
