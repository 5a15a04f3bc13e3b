//! Batch-producing data sources.

use crate::error::TrainError;

/// A group of inputs with their raw class indices.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<I> {
    pub inputs: I,
    pub targets: Vec<u32>,
}

impl<I> Batch<I> {
    pub fn new(inputs: I, targets: Vec<u32>) -> Self {
        Self { inputs, targets }
    }
}

/// A finite, restartable producer of batches.
///
/// Each call to [`DataSource::batches`] starts a fresh pass (one epoch).
pub trait DataSource {
    type Input;

    fn batches(&mut self) -> impl Iterator<Item = Result<Batch<Self::Input>, TrainError>> + '_;
}

/// Source replaying a fixed list of batches every epoch.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource<I> {
    batches: Vec<Batch<I>>,
}

impl<I> InMemorySource<I> {
    pub fn new(batches: Vec<Batch<I>>) -> Self {
        Self { batches }
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

impl<I: Clone> DataSource for InMemorySource<I> {
    type Input = I;

    fn batches(&mut self) -> impl Iterator<Item = Result<Batch<I>, TrainError>> + '_ {
        self.batches.iter().cloned().map(Ok)
    }
}
