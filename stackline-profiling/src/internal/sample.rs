// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::*;

/// Broad bucket a sample falls into. Samples captured from a suspended
/// thread's stack-on-suspend snapshot are Idle.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum Category {
    #[default]
    Default,
    Idle,
}

/// One decoded sample, borrowed out of a [SampleList].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Sample {
    pub stack: StackId,
    pub weight: u64,
    pub timestamp: Timestamp,
    pub category: Category,
}

/// Columnar per-thread sample stream. Consecutive samples with the same
/// stack and category coalesce into one entry with a bumped weight; the
/// entry keeps the first timestamp.
#[derive(Default)]
pub struct SampleList {
    stacks: Vec<StackId>,
    weights: Vec<u64>,
    timestamps: Vec<Timestamp>,
    categories: Vec<Category>,
}

impl SampleList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    pub fn record(
        &mut self,
        stack: StackId,
        timestamp: Timestamp,
        weight: u64,
        category: Category,
    ) {
        if let (Some(last_stack), Some(last_category)) =
            (self.stacks.last(), self.categories.last())
        {
            if *last_stack == stack && *last_category == category {
                // Timestamps are not compared for coalescing.
                #[allow(clippy::expect_used)]
                let last_weight = self.weights.last_mut().expect("parallel columns");
                *last_weight += weight;
                return;
            }
        }

        self.stacks.push(stack);
        self.weights.push(weight);
        self.timestamps.push(timestamp);
        self.categories.push(category);
    }

    pub fn stacks(&self) -> &[StackId] {
        &self.stacks
    }

    pub fn weights(&self) -> &[u64] {
        &self.weights
    }

    pub fn timestamps(&self) -> &[Timestamp] {
        &self.timestamps
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn total_weight(&self) -> u64 {
        self.weights.iter().sum()
    }

    pub fn iter(&self) -> SampleIter<'_> {
        SampleIter {
            list: self,
            index: 0,
        }
    }
}

/// Lazy, finite, restartable ([Clone]) iterator over a [SampleList].
#[derive(Clone)]
pub struct SampleIter<'a> {
    list: &'a SampleList,
    index: usize,
}

impl Iterator for SampleIter<'_> {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        let i = self.index;
        if i >= self.list.len() {
            return None;
        }
        self.index += 1;
        Some(Sample {
            stack: self.list.stacks[i],
            weight: self.list.weights[i],
            timestamp: self.list.timestamps[i],
            category: self.list.categories[i],
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.list.len() - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for SampleIter<'_> {}
