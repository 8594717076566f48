//! Concurrent N×N×N Rubik's cube.
//!
//! Many threads may concurrently request single-layer rotations and
//! whole-state snapshots. An admission controller lets mutually
//! non-conflicting rotations (same axis, distinct planes) run in parallel,
//! serializes snapshots against all rotations, prevents starvation through
//! FIFO admission with round-robin batch wake-up, and stays consistent when
//! blocked requesters are cancelled.
//!
//! ```
//! use rotor_core::Cube;
//!
//! let cube = Cube::new(3);
//! cube.rotate(0, 1)?;
//! let snapshot = cube.snapshot()?;
//! assert_eq!(snapshot.len(), 6 * 3 * 3);
//! # Ok::<(), rotor_core::RotorError>(())
//! ```

mod face;

pub mod cube;
pub mod geometry;
pub mod monitor;

pub use cube::{Cube, HookError, Hooks};
pub use geometry::{CubeState, direction_of, plane_of};
pub use monitor::{Monitor, MonitorMetrics};
pub use rotor_error::{HookStage, Result, RotorError};
pub use rotor_sync::CancelToken;
