// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::*;

/// One position within a function: `line` is the currently-executing line,
/// not the definition line. Deduplicated by the `(function, line)` pair.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Frame {
    pub function: FunctionId,
    pub line: i32,
}

impl Item for Frame {
    type Id = FrameId;
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct FrameId(u32);

impl Id for FrameId {
    fn from_offset(offset: usize) -> Self {
        #[allow(clippy::expect_used)]
        Self(small_id(offset).expect("FrameId to fit into a u32"))
    }

    fn to_offset(&self) -> usize {
        self.0 as usize
    }
}
