// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod frame;
mod function;
mod marker;
mod sample;
mod stack;
mod stack_interner;
mod thread;
mod timestamp;

pub use frame::*;
pub use function::*;
pub use marker::*;
pub use sample::*;
pub use stack::*;
pub use stack_interner::*;
pub use thread::*;
pub use timestamp::*;

use crate::collections::identifiable::*;
