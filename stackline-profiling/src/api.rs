// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Borrowed input types. The runtime hands these to the profiler during a
//! stack walk; nothing is retained past the call, interning copies what it
//! needs into its own tables.

/// One walked frame: the identity of the executing function plus the
/// currently-executing line. `first_line` is the function's defining line.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FrameRecord<'a> {
    pub name: &'a str,
    pub filename: &'a str,
    pub first_line: i32,
    pub line: i32,
}
