// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::*;
use crate::collections::string_table::StringId;

/// Identity of a callable unit. Two call sites referring to the same named
/// function at the same defining file and line are the same Function.
///  - The id is not stored on the struct. It's stored in the container that
///    holds the struct.
///  - Strings are ids into the owning interner's string table.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Function {
    pub name: StringId,
    pub filename: StringId,
    pub first_line: i32,
}

impl Item for Function {
    type Id = FunctionId;
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct FunctionId(u32);

impl Id for FunctionId {
    fn from_offset(offset: usize) -> Self {
        #[allow(clippy::expect_used)]
        Self(small_id(offset).expect("FunctionId to fit into a u32"))
    }

    fn to_offset(&self) -> usize {
        self.0 as usize
    }
}
