//! A single cube face: an N×N colour grid plus a logical rotation counter.
//!
//! Face-wide quarter-turns never permute the physical cell array; they bump
//! `rotation` and every accessor routes `(row, col)` through the 4-case
//! rewrite below. That keeps face turns O(1) and layer turns O(N).
//!
//! Cells are `AtomicU8` because admitted same-direction rotations on distinct
//! planes mutate disjoint cell sets from different threads. The admission
//! controller provides the logical exclusion; the atomics make the disjoint
//! access sound without per-face locks, so plain `Relaxed` ordering suffices
//! (cross-epoch ordering comes from the controller's locks).

use std::sync::atomic::{AtomicU8, Ordering};

pub(crate) struct Face {
    size: usize,
    /// Cumulative clockwise quarter-turns of this face, modulo 4.
    rotation: AtomicU8,
    /// Row-major N×N grid in the face's native (rotation-0) orientation.
    cells: Vec<AtomicU8>,
}

impl Face {
    /// A face of the given size filled with one colour, unrotated.
    pub(crate) fn new(size: usize, colour: u8) -> Self {
        Self {
            size,
            rotation: AtomicU8::new(0),
            cells: (0..size * size).map(|_| AtomicU8::new(colour)).collect(),
        }
    }

    /// Advance the rotation counter by `quarter_turns` clockwise turns.
    pub(crate) fn bump_rotation(&self, quarter_turns: u8) {
        let r = self.rotation.load(Ordering::Relaxed);
        self.rotation
            .store((r + quarter_turns) % 4, Ordering::Relaxed);
    }

    /// Physical index of the cell observed at `(row, col)` when the face is
    /// viewed with `rotation_modifier` extra clockwise quarter-turns applied
    /// on top of its own rotation.
    pub(crate) fn cell_index(&self, row: usize, col: usize, rotation_modifier: u8) -> usize {
        let n = self.size;
        match (self.rotation.load(Ordering::Relaxed) + rotation_modifier) % 4 {
            0 => row * n + col,
            1 => (n - 1 - col) * n + row,
            2 => (n - 1 - row) * n + (n - 1 - col),
            _ => col * n + (n - 1 - row),
        }
    }

    /// Physical indices of one observed row, left to right. Resolving a whole
    /// row at once keeps the ring rotation a tight O(N) loop.
    pub(crate) fn row_indices(&self, row: usize, rotation_modifier: u8) -> Vec<usize> {
        (0..self.size)
            .map(|col| self.cell_index(row, col, rotation_modifier))
            .collect()
    }

    pub(crate) fn get(&self, index: usize) -> u8 {
        self.cells[index].load(Ordering::Relaxed)
    }

    pub(crate) fn set(&self, index: usize, colour: u8) {
        self.cells[index].store(colour, Ordering::Relaxed);
    }

    /// Append this face's observed cells, row-major, as digits.
    pub(crate) fn append_digits(&self, out: &mut String) {
        for row in 0..self.size {
            for col in 0..self.size {
                let colour = self.get(self.cell_index(row, col, 0));
                out.push(char::from(b'0' + colour));
            }
        }
    }
}
