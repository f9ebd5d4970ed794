//! Global LED index routing.
//!
//! The display is a concatenation of boards. Board `k` owns global
//! indices `offsets[k]..offsets[k + 1]`.

use serde::{Deserialize, Serialize};

use crate::error::RouteError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BoardSpec {
    pub name: String,
    pub led_count: usize,
}

/// Where a global index lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub board: usize,
    pub local: u32,
}

/// The members of one batch that belong to a single board, in batch order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardBatch<T> {
    pub indices: Vec<u32>,
    pub values: Vec<T>,
}

impl<T> BoardBatch<T> {
    fn new() -> Self {
        BoardBatch {
            indices: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Immutable board table with its cumulative offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardMap {
    boards: Vec<BoardSpec>,
    offsets: Vec<usize>,
}

impl BoardMap {
    pub fn new(boards: Vec<BoardSpec>) -> Self {
        let mut offsets = Vec::with_capacity(boards.len() + 1);
        offsets.push(0);
        let mut total = 0;
        for board in &boards {
            total += board.led_count;
            offsets.push(total);
        }
        BoardMap { boards, offsets }
    }

    pub fn boards(&self) -> &[BoardSpec] {
        &self.boards
    }

    pub fn len(&self) -> usize {
        self.boards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boards.is_empty()
    }

    /// Cumulative offsets; one more entry than there are boards.
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Total addressable LEDs.
    pub fn total_leds(&self) -> usize {
        self.offsets[self.offsets.len() - 1]
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.boards.iter().position(|b| b.name == name)
    }

    /// Global index range owned by board `board`.
    pub fn range(&self, board: usize) -> std::ops::Range<usize> {
        self.offsets[board]..self.offsets[board + 1]
    }

    /// Map a global index to its board and board-local index.
    pub fn locate(&self, index: u32) -> Result<Route, RouteError> {
        let i = index as usize;
        // First k with offsets[k] > i; offsets[0] == 0 so k >= 1 when found
        let k = self.offsets.partition_point(|&offset| offset <= i);
        if k >= self.offsets.len() {
            return Err(RouteError::InvalidLedIndex {
                index,
                total: self.total_leds(),
            });
        }
        Ok(Route {
            board: k - 1,
            local: (i - self.offsets[k - 1]) as u32,
        })
    }

    /// Stable partition of `indices` (with their parallel `values`) by board.
    ///
    /// Always returns one batch per board, empty where a board has no
    /// members. Fails on the first out-of-range index without partial output.
    pub fn partition<T: Clone>(
        &self,
        indices: &[u32],
        values: &[T],
    ) -> Result<Vec<BoardBatch<T>>, RouteError> {
        let mut batches: Vec<BoardBatch<T>> = (0..self.len()).map(|_| BoardBatch::new()).collect();
        for (&index, value) in indices.iter().zip(values) {
            let route = self.locate(index)?;
            let batch = &mut batches[route.board];
            batch.indices.push(route.local);
            batch.values.push(value.clone());
        }
        Ok(batches)
    }

    /// [`partition`](Self::partition) for batches without per-LED values.
    pub fn partition_indices(&self, indices: &[u32]) -> Result<Vec<Vec<u32>>, RouteError> {
        let mut batches = vec![Vec::new(); self.len()];
        for &index in indices {
            let route = self.locate(index)?;
            batches[route.board].push(route.local);
        }
        Ok(batches)
    }

    /// Split a whole-display sequence into per-board slices.
    pub fn split<'a, T>(&self, values: &'a [T]) -> Vec<&'a [T]> {
        (0..self.len())
            .map(|k| {
                let range = self.range(k);
                &values[range.start.min(values.len())..range.end.min(values.len())]
            })
            .collect()
    }
}
