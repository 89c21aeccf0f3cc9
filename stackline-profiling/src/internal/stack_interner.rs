// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::*;
use crate::api::FrameRecord;
use crate::collections::string_table::{StringId, StringTable};
use crate::runtime::{FrameVisitor, RuntimeEventSource};
use std::fmt;
use std::mem;

/// Walks deeper than this are truncated at the root end.
pub const MAX_STACK_DEPTH: usize = 2048;

// Enough for most programs to never rehash mid-trace.
const FUNC_CAPACITY: usize = 1024;
const FRAME_CAPACITY: usize = 2048;
const STACK_CAPACITY: usize = 4096;

/// The three parallel, append-only interning tables forming a prefix trie
/// of captured call stacks, plus the string table backing function names.
///
/// Ids are dense, zero-based, and never change once assigned. With N
/// samples sharing overlapping call chains the trie grows with the number
/// of *distinct* chains, not with N.
pub struct StackInterner {
    strings: StringTable,
    functions: FxIndexSet<Function>,
    frames: FxIndexSet<Frame>,
    stacks: FxIndexSet<Stack>,
    // Reusable innermost-first walk buffer; kept here so steady-state
    // interning does not allocate.
    scratch: Vec<FrameId>,
}

impl StackInterner {
    pub fn new() -> Self {
        Self {
            strings: StringTable::with_capacity(FUNC_CAPACITY),
            functions: FxIndexSet::with_capacity_and_hasher(FUNC_CAPACITY, Default::default()),
            frames: FxIndexSet::with_capacity_and_hasher(FRAME_CAPACITY, Default::default()),
            stacks: FxIndexSet::with_capacity_and_hasher(STACK_CAPACITY, Default::default()),
            scratch: Vec::with_capacity(MAX_STACK_DEPTH),
        }
    }

    pub fn func_count(&self) -> usize {
        self.functions.len()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn stack_count(&self) -> usize {
        self.stacks.len()
    }

    /// # Panics
    /// Panics if the id was not produced by this interner.
    pub fn function(&self, id: FunctionId) -> &Function {
        #[allow(clippy::expect_used)]
        self.functions
            .get_index(id.to_offset())
            .expect("FunctionId to be valid for this interner")
    }

    /// # Panics
    /// Panics if the id was not produced by this interner.
    pub fn frame(&self, id: FrameId) -> &Frame {
        #[allow(clippy::expect_used)]
        self.frames
            .get_index(id.to_offset())
            .expect("FrameId to be valid for this interner")
    }

    /// # Panics
    /// Panics if the id was not produced by this interner.
    pub fn stack_node(&self, id: StackId) -> &Stack {
        #[allow(clippy::expect_used)]
        self.stacks
            .get_index(id.to_offset())
            .expect("StackId to be valid for this interner")
    }

    pub fn string(&self, id: StringId) -> &str {
        self.strings.get(id)
    }

    pub fn intern_function(&mut self, name: &str, filename: &str, first_line: i32) -> FunctionId {
        let name = self.strings.intern(name);
        let filename = self.strings.intern(filename);
        self.functions.dedup(Function {
            name,
            filename,
            first_line,
        })
    }

    pub fn intern_frame(&mut self, function: FunctionId, line: i32) -> FrameId {
        self.frames.dedup(Frame { function, line })
    }

    /// Interns an already-walked stack buffer, innermost frame first,
    /// skipping the `skip_frames` innermost entries. Returns the leaf
    /// [StackId], or None when nothing remains after skipping.
    pub fn intern_frames(&mut self, frames: &[FrameId], skip_frames: usize) -> Option<StackId> {
        let usable = frames.get(skip_frames..).unwrap_or_default();
        if usable.is_empty() {
            return None;
        }

        let mut parent = None;
        for &frame in usable.iter().rev() {
            parent = Some(self.stacks.dedup(Stack { frame, parent }));
        }
        parent
    }

    /// Walks the live call stack of `thread` through the runtime's walk
    /// primitive and interns it, skipping the `skip_frames` innermost
    /// frames (the profiler's own call frames). Returns None on a capture
    /// miss or an empty stack — the caller skips this tick silently.
    ///
    /// Runs on every sampling tick for every live thread: the only
    /// allocations are amortized growth of the backing maps and first-seen
    /// strings.
    pub fn intern_current_stack(
        &mut self,
        source: &dyn RuntimeEventSource,
        thread: ThreadId,
        skip_frames: usize,
    ) -> Option<StackId> {
        self.scratch.clear();
        let observed = {
            let mut collector = WalkCollector { interner: self };
            source.walk(thread, &mut collector)
        };
        if !observed {
            return None;
        }

        let scratch = mem::take(&mut self.scratch);
        let stack = self.intern_frames(&scratch, skip_frames);
        self.scratch = scratch;
        stack
    }

    /// Copies one full chain (root to leaf) from a foreign interner into
    /// `self`, remapping every function, frame, and stack node it touches
    /// and reusing entries that already match. The resulting backtrace is
    /// equal frame-for-frame to the source's.
    ///
    /// # Panics
    /// Panics if `stack` was not produced by `source`.
    pub fn convert(&mut self, source: &StackInterner, stack: StackId) -> StackId {
        assert!(
            stack.to_offset() < source.stack_count(),
            "stack id {:?} out of range for source interner",
            stack
        );

        // Chain ids leaf -> root, then rebuild root -> leaf. Iterative so
        // arbitrarily deep chains cannot blow the call stack.
        let mut chain = Vec::new();
        let mut cursor = Some(stack);
        while let Some(id) = cursor {
            chain.push(id);
            cursor = source.stack_node(id).parent;
        }

        let mut parent = None;
        for &id in chain.iter().rev() {
            let node = source.stack_node(id);
            let frame = source.frame(node.frame);
            let function = source.function(frame.function);

            let local_function = self.intern_function(
                source.string(function.name),
                source.string(function.filename),
                function.first_line,
            );
            let local_frame = self.intern_frame(local_function, frame.line);
            parent = Some(self.stacks.dedup(Stack {
                frame: local_frame,
                parent,
            }));
        }

        #[allow(clippy::expect_used)]
        parent.expect("converted chain to be non-empty")
    }

    /// Lazy leaf-to-root traversal for diagnostics; not on the hot path.
    pub fn backtrace(&self, stack: StackId) -> Backtrace<'_> {
        Backtrace {
            interner: self,
            cursor: Some(stack),
        }
    }
}

impl Default for StackInterner {
    fn default() -> Self {
        Self::new()
    }
}

struct WalkCollector<'a> {
    interner: &'a mut StackInterner,
}

impl FrameVisitor for WalkCollector<'_> {
    fn visit_frame(&mut self, record: FrameRecord<'_>) {
        if self.interner.scratch.len() >= MAX_STACK_DEPTH {
            return;
        }
        let function =
            self.interner
                .intern_function(record.name, record.filename, record.first_line);
        let frame = self.interner.intern_frame(function, record.line);
        self.interner.scratch.push(frame);
    }
}

/// One frame of a [Backtrace]. Displays as `file:line:in 'func'`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BacktraceFrame<'a> {
    pub name: &'a str,
    pub filename: &'a str,
    pub line: i32,
}

impl fmt::Display for BacktraceFrame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:in '{}'", self.filename, self.line, self.name)
    }
}

/// Lazy, finite, restartable ([Clone]) leaf-to-root frame sequence.
#[derive(Clone)]
pub struct Backtrace<'a> {
    interner: &'a StackInterner,
    cursor: Option<StackId>,
}

impl<'a> Iterator for Backtrace<'a> {
    type Item = BacktraceFrame<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let node = self.interner.stack_node(id);
        self.cursor = node.parent;

        let frame = self.interner.frame(node.frame);
        let function = self.interner.function(frame.function);
        Some(BacktraceFrame {
            name: self.interner.string(function.name),
            filename: self.interner.string(function.filename),
            line: frame.line,
        })
    }
}
