//! Public facade: argument validation, conflict classification, and the
//! hook-bracketed execution of rotations and snapshots.
//!
//! Control flow for a rotation: classify `(face, layer)` into
//! `(direction, plane)` → controller entry → pre-hook → geometry mutation →
//! post-hook → controller exit. Snapshots follow the same shape. The exit
//! protocol runs on every path past admission; hook failures are surfaced
//! only after it has run.

use rotor_error::{HookStage, Result, RotorError};
use rotor_sync::CancelToken;

use crate::geometry::{CubeState, direction_of, plane_of};
use crate::monitor::{Monitor, MonitorMetrics};

/// Error type hooks may raise; carried verbatim inside
/// [`RotorError::Hook`].
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

type RotationHook = Box<dyn Fn(usize, usize) -> std::result::Result<(), HookError> + Send + Sync>;
type SnapshotHook = Box<dyn Fn() -> std::result::Result<(), HookError> + Send + Sync>;

/// The four optional instrumentation hooks.
///
/// Each hook runs exactly once per admitted operation, synchronously, while
/// the requester holds its admission. Rotation hooks receive the call's
/// `(face, layer)`; snapshot hooks receive nothing. A hook may block, and may
/// fail; its failure reaches the caller after the controller exit protocol.
/// Absent hooks are no-ops and the invocation path does not branch on the
/// caller side.
#[derive(Default)]
pub struct Hooks {
    before_rotation: Option<RotationHook>,
    after_rotation: Option<RotationHook>,
    before_snapshot: Option<SnapshotHook>,
    after_snapshot: Option<SnapshotHook>,
}

impl Hooks {
    /// All hooks absent.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hook invoked directly before each rotation's geometry mutation.
    #[must_use]
    pub fn before_rotation(
        mut self,
        hook: impl Fn(usize, usize) -> std::result::Result<(), HookError> + Send + Sync + 'static,
    ) -> Self {
        self.before_rotation = Some(Box::new(hook));
        self
    }

    /// Hook invoked directly after each rotation's geometry mutation.
    #[must_use]
    pub fn after_rotation(
        mut self,
        hook: impl Fn(usize, usize) -> std::result::Result<(), HookError> + Send + Sync + 'static,
    ) -> Self {
        self.after_rotation = Some(Box::new(hook));
        self
    }

    /// Hook invoked directly before each snapshot's read of the faces.
    #[must_use]
    pub fn before_snapshot(
        mut self,
        hook: impl Fn() -> std::result::Result<(), HookError> + Send + Sync + 'static,
    ) -> Self {
        self.before_snapshot = Some(Box::new(hook));
        self
    }

    /// Hook invoked directly after each snapshot's read of the faces.
    #[must_use]
    pub fn after_snapshot(
        mut self,
        hook: impl Fn() -> std::result::Result<(), HookError> + Send + Sync + 'static,
    ) -> Self {
        self.after_snapshot = Some(Box::new(hook));
        self
    }

    fn run_rotation(
        hook: Option<&RotationHook>,
        stage: HookStage,
        face: usize,
        layer: usize,
    ) -> Result<()> {
        match hook {
            Some(hook) => hook(face, layer).map_err(|source| RotorError::Hook { stage, source }),
            None => Ok(()),
        }
    }

    fn run_snapshot(hook: Option<&SnapshotHook>, stage: HookStage) -> Result<()> {
        match hook {
            Some(hook) => hook().map_err(|source| RotorError::Hook { stage, source }),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("before_rotation", &self.before_rotation.is_some())
            .field("after_rotation", &self.after_rotation.is_some())
            .field("before_snapshot", &self.before_snapshot.is_some())
            .field("after_snapshot", &self.after_snapshot.is_some())
            .finish()
    }
}

/// A concurrent N×N×N Rubik's cube.
///
/// Safe to share across threads (`Arc<Cube>` or scoped borrows); the
/// embedded controller admits mutually non-conflicting rotations in parallel
/// and serializes snapshots against all rotations.
pub struct Cube {
    state: CubeState,
    monitor: Monitor,
    hooks: Hooks,
}

impl Cube {
    /// A solved cube of edge length `size` with no instrumentation hooks.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self::with_hooks(size, Hooks::new())
    }

    /// A solved cube of edge length `size` with the given hooks.
    #[must_use]
    pub fn with_hooks(size: usize, hooks: Hooks) -> Self {
        Self {
            state: CubeState::new(size),
            monitor: Monitor::new(size),
            hooks,
        }
    }

    /// Edge length N.
    #[must_use]
    pub fn size(&self) -> usize {
        self.state.size()
    }

    /// Rotate the depth-`layer` slab clockwise as viewed from `face`.
    ///
    /// # Errors
    ///
    /// [`RotorError::FaceOutOfRange`] / [`RotorError::LayerOutOfRange`] on
    /// bad arguments (no state touched), or [`RotorError::Hook`] if a hook
    /// failed (exit protocol already run).
    pub fn rotate(&self, face: usize, layer: usize) -> Result<()> {
        self.rotate_cancellable(face, layer, &CancelToken::new())
    }

    /// Like [`Cube::rotate`], observing `token` at every cancellable
    /// suspension point.
    ///
    /// # Errors
    ///
    /// Additionally [`RotorError::Cancelled`] if the token is cancelled while
    /// the request is blocked; a cancelled rotation mutates nothing.
    pub fn rotate_cancellable(
        &self,
        face: usize,
        layer: usize,
        token: &CancelToken,
    ) -> Result<()> {
        self.validate(face, layer)?;
        // An already-cancelled token fails deterministically instead of
        // depending on whether the entry protocol happens to suspend.
        if token.is_cancelled() {
            return Err(RotorError::Cancelled);
        }
        let direction = direction_of(face);
        let plane = plane_of(self.state.size(), face, layer);

        self.monitor.enter_rotate(direction, plane, token)?;
        tracing::trace!(target: "rotor.cube", face, layer, direction, plane, "rotate");

        let result = Hooks::run_rotation(
            self.hooks.before_rotation.as_ref(),
            HookStage::BeforeRotation,
            face,
            layer,
        )
        .and_then(|()| {
            self.state.rotate_layer(face, layer);
            Hooks::run_rotation(
                self.hooks.after_rotation.as_ref(),
                HookStage::AfterRotation,
                face,
                layer,
            )
        });

        self.monitor.exit_rotate(direction, plane);
        result
    }

    /// Serialize the cube: 6N² digits `'0'..'5'`, faces 0..6 in order, each
    /// row-major in its current logical orientation. Empty for N = 0.
    ///
    /// # Errors
    ///
    /// [`RotorError::Hook`] if a snapshot hook failed (exit protocol already
    /// run).
    pub fn snapshot(&self) -> Result<String> {
        self.snapshot_cancellable(&CancelToken::new())
    }

    /// Like [`Cube::snapshot`], observing `token` while blocked.
    ///
    /// # Errors
    ///
    /// Additionally [`RotorError::Cancelled`] if the token is cancelled while
    /// the request is blocked.
    pub fn snapshot_cancellable(&self, token: &CancelToken) -> Result<String> {
        if token.is_cancelled() {
            return Err(RotorError::Cancelled);
        }
        self.monitor.enter_snapshot(token)?;
        tracing::trace!(target: "rotor.cube", "snapshot");

        let result =
            Hooks::run_snapshot(self.hooks.before_snapshot.as_ref(), HookStage::BeforeSnapshot)
                .map(|()| self.state.snapshot_string())
                .and_then(|snapshot| {
                    Hooks::run_snapshot(
                        self.hooks.after_snapshot.as_ref(),
                        HookStage::AfterSnapshot,
                    )
                    .map(|()| snapshot)
                });

        self.monitor.exit_snapshot();
        result
    }

    /// Controller counters (admissions, wake pulses, cancellations).
    #[must_use]
    pub fn monitor_metrics(&self) -> MonitorMetrics {
        self.monitor.metrics()
    }

    fn validate(&self, face: usize, layer: usize) -> Result<()> {
        if face >= 6 {
            return Err(RotorError::FaceOutOfRange { face });
        }
        if layer >= self.state.size() {
            return Err(RotorError::LayerOutOfRange {
                layer,
                size: self.state.size(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for Cube {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cube")
            .field("size", &self.state.size())
            .finish_non_exhaustive()
    }
}
