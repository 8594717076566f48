use thiserror::Error;

/// Primary error type for rotor cube operations.
///
/// Structured variants for the two externally visible failure kinds
/// (cancellation and hook propagation) plus the contract faults for
/// out-of-range arguments.
#[derive(Error, Debug)]
pub enum RotorError {
    /// The operation was cancelled at a suspension point before or during
    /// execution. Cube and controller state are consistent: a cancelled
    /// operation is either fully applied or not applied at all.
    #[error("operation cancelled")]
    Cancelled,

    /// A caller-supplied hook failed. The controller exit protocol has
    /// already run; the hook's error is carried verbatim.
    #[error("{stage} hook failed: {source}")]
    Hook {
        stage: HookStage,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Face identifier outside `0..6`.
    #[error("face out of range: {face} (expected 0..6)")]
    FaceOutOfRange { face: usize },

    /// Layer outside `0..size`.
    #[error("layer out of range: {layer} (cube size {size})")]
    LayerOutOfRange { layer: usize, size: usize },
}

/// Which of the four instrumentation hooks raised an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    BeforeRotation,
    AfterRotation,
    BeforeSnapshot,
    AfterSnapshot,
}

impl std::fmt::Display for HookStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::BeforeRotation => "before-rotation",
            Self::AfterRotation => "after-rotation",
            Self::BeforeSnapshot => "before-snapshot",
            Self::AfterSnapshot => "after-snapshot",
        })
    }
}

impl RotorError {
    /// Whether this error is a cooperative cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether this error is a caller contract violation (bad arguments).
    #[must_use]
    pub const fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::FaceOutOfRange { .. } | Self::LayerOutOfRange { .. }
        )
    }

    /// Wrap a hook failure for the given stage.
    pub fn hook(
        stage: HookStage,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Hook {
            stage,
            source: Box::new(source),
        }
    }
}

/// Result type alias using `RotorError`.
pub type Result<T> = std::result::Result<T, RotorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_display() {
        assert_eq!(RotorError::Cancelled.to_string(), "operation cancelled");
        assert!(RotorError::Cancelled.is_cancelled());
        assert!(!RotorError::Cancelled.is_contract_violation());
    }

    #[test]
    fn contract_violation_display() {
        let err = RotorError::FaceOutOfRange { face: 9 };
        assert_eq!(err.to_string(), "face out of range: 9 (expected 0..6)");
        assert!(err.is_contract_violation());

        let err = RotorError::LayerOutOfRange { layer: 3, size: 3 };
        assert_eq!(err.to_string(), "layer out of range: 3 (cube size 3)");
        assert!(err.is_contract_violation());
        assert!(!err.is_cancelled());
    }

    #[test]
    fn hook_error_carries_source() {
        let inner = std::io::Error::new(std::io::ErrorKind::Other, "probe failed");
        let err = RotorError::hook(HookStage::BeforeRotation, inner);
        assert_eq!(err.to_string(), "before-rotation hook failed: probe failed");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn hook_stage_display() {
        assert_eq!(HookStage::BeforeRotation.to_string(), "before-rotation");
        assert_eq!(HookStage::AfterSnapshot.to_string(), "after-snapshot");
    }
}
