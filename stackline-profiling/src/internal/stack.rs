// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::*;

/// One node of the call-stack prefix trie. `parent == None` marks a root
/// (outermost captured frame). A full call stack is the chain obtained by
/// following `parent` from a leaf [StackId] to `None`. Nodes are uniquely
/// identified by the `(frame, parent)` pair, so structurally identical call
/// chains always resolve to the same [StackId].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Stack {
    pub frame: FrameId,
    pub parent: Option<StackId>,
}

impl Item for Stack {
    type Id = StackId;
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct StackId(u32);

impl Id for StackId {
    fn from_offset(offset: usize) -> Self {
        #[allow(clippy::expect_used)]
        Self(small_id(offset).expect("StackId to fit into a u32"))
    }

    fn to_offset(&self) -> usize {
        self.0 as usize
    }
}

impl From<StackId> for u32 {
    fn from(value: StackId) -> Self {
        value.0
    }
}
