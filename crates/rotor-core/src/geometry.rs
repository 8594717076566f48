//! Cube topology and the unsynchronized state mutations.
//!
//! The six faces are wired into the canonical Rubik topology by fixed tables:
//! for every face, its four neighbours in clockwise order, how each
//! neighbour's native orientation sits relative to the shared border, and the
//! opposite face. The tables are the single source of truth for the geometry;
//! everything else is derived.
//!
//! [`CubeState`] performs no synchronization of its own. Callers must hold
//! the admission the controller grants for the corresponding plane (rotation)
//! or for the snapshot group before touching it.

use crate::face::Face;

/// Clockwise neighbours of each face.
pub(crate) const NEIGHBOURS: [[usize; 4]; 6] = [
    [4, 3, 2, 1],
    [0, 2, 5, 4],
    [0, 3, 5, 1],
    [5, 2, 0, 4],
    [0, 1, 5, 3],
    [1, 2, 3, 4],
];

/// For each neighbour, the clockwise quarter-turns its native orientation
/// sits from the orientation whose top row borders this face.
pub(crate) const RELATIVE_ROTATIONS: [[u8; 4]; 6] = [
    [0, 0, 0, 0],
    [1, 1, 1, 3],
    [2, 1, 0, 3],
    [3, 3, 3, 1],
    [0, 1, 2, 3],
    [2, 2, 2, 2],
];

/// Opposite-face pairs: {0,5}, {1,3}, {2,4}.
pub(crate) const OPPOSITE: [usize; 6] = [5, 3, 4, 1, 2, 0];

/// The rotation axis a face belongs to: 0 for {0,5}, 1 for {1,3}, 2 for {2,4}.
#[must_use]
pub fn direction_of(face: usize) -> usize {
    match face {
        0 | 5 => 0,
        1 | 3 => 1,
        _ => 2,
    }
}

/// Direction-canonical plane of a layer, so that opposite-face rotations of
/// the same physical slab share a plane.
#[must_use]
pub fn plane_of(size: usize, face: usize, layer: usize) -> usize {
    if direction_of(face) == face {
        layer
    } else {
        size - 1 - layer
    }
}

/// The mutable cube: six faces plus their wiring.
///
/// All mutation goes through `&self`; see the module docs for the exclusion
/// contract.
pub struct CubeState {
    size: usize,
    faces: [Face; 6],
}

impl CubeState {
    /// A solved cube: face `i` uniformly coloured `i`, no rotations.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            size,
            faces: std::array::from_fn(|i| {
                #[allow(clippy::cast_possible_truncation)]
                Face::new(size, i as u8)
            }),
        }
    }

    /// Edge length N.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Apply one clockwise quarter-turn to the depth-`layer` slab viewed from
    /// `face`. Caller guarantees `face < 6` and `layer < N`, and holds the
    /// plane admission.
    pub fn rotate_layer(&self, face: usize, layer: usize) {
        if layer == 0 {
            self.faces[face].bump_rotation(1);
        }
        if layer == self.size - 1 {
            self.faces[OPPOSITE[face]].bump_rotation(3);
        }

        let neighbours = NEIGHBOURS[face];
        let rows: [Vec<usize>; 4] = std::array::from_fn(|i| {
            self.faces[neighbours[i]].row_indices(layer, RELATIVE_ROTATIONS[face][i])
        });

        // One step of the 4N-cell ring: n0 -> n1 -> n2 -> n3 -> n0.
        for i in 0..self.size {
            let carried = self.faces[neighbours[3]].get(rows[3][i]);
            self.faces[neighbours[3]].set(rows[3][i], self.faces[neighbours[2]].get(rows[2][i]));
            self.faces[neighbours[2]].set(rows[2][i], self.faces[neighbours[1]].get(rows[1][i]));
            self.faces[neighbours[1]].set(rows[1][i], self.faces[neighbours[0]].get(rows[0][i]));
            self.faces[neighbours[0]].set(rows[0][i], carried);
        }
    }

    /// Serialize the whole cube: faces 0..6 in order, each row-major in its
    /// current logical orientation, one digit per cell. Empty for N = 0.
    #[must_use]
    pub fn snapshot_string(&self) -> String {
        let mut out = String::with_capacity(6 * self.size * self.size);
        for face in &self.faces {
            face.append_digits(&mut out);
        }
        out
    }

    /// Count of cells per colour, as observed by a snapshot. Always sums to
    /// 6N²; the conservation law says every entry equals N².
    #[must_use]
    pub fn colour_counts(&self) -> [usize; 6] {
        let mut counts = [0usize; 6];
        for digit in self.snapshot_string().bytes() {
            counts[usize::from(digit - b'0')] += 1;
        }
        counts
    }
}

impl std::fmt::Debug for CubeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CubeState")
            .field("size", &self.size)
            .field("state", &self.snapshot_string())
            .finish()
    }
}
