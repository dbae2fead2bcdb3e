use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarrenErrorCode {
    Io,
    Encode,
    Decode,
    Validation,
    UnknownItemKind,
    UnknownQuest,
    UnknownBoard,
    QueueTimeout,
    TaskPanicked,
    QueueClosed,
}

impl WarrenErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            WarrenErrorCode::Io => "io",
            WarrenErrorCode::Encode => "encode",
            WarrenErrorCode::Decode => "decode",
            WarrenErrorCode::Validation => "validation",
            WarrenErrorCode::UnknownItemKind => "unknown_item_kind",
            WarrenErrorCode::UnknownQuest => "unknown_quest",
            WarrenErrorCode::UnknownBoard => "unknown_board",
            WarrenErrorCode::QueueTimeout => "queue_timeout",
            WarrenErrorCode::TaskPanicked => "task_panicked",
            WarrenErrorCode::QueueClosed => "queue_closed",
        }
    }
}

#[derive(Debug, Error)]
pub enum WarrenError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("unknown item kind '{0}'")]
    UnknownItemKind(String),
    #[error("unknown quest '{0}'")]
    UnknownQuest(String),
    #[error("unknown board '{0}'")]
    UnknownBoard(String),
    /// The waiter timed out. The underlying task was dropped at its next
    /// suspension point and the shard advanced to its next queued task.
    #[error("queued task on shard '{shard}' timed out")]
    QueueTimeout { shard: String },
    /// The task panicked before producing a result. Distinct from a timeout:
    /// the task failed, the shard did not.
    #[error("queued task on shard '{shard}' panicked")]
    TaskPanicked { shard: String },
    #[error("shard queue closed")]
    QueueClosed,
}

impl WarrenError {
    pub fn code(&self) -> WarrenErrorCode {
        match self {
            WarrenError::Io(_) => WarrenErrorCode::Io,
            WarrenError::Encode(_) => WarrenErrorCode::Encode,
            WarrenError::Decode(_) => WarrenErrorCode::Decode,
            WarrenError::Validation(_) => WarrenErrorCode::Validation,
            WarrenError::UnknownItemKind(_) => WarrenErrorCode::UnknownItemKind,
            WarrenError::UnknownQuest(_) => WarrenErrorCode::UnknownQuest,
            WarrenError::UnknownBoard(_) => WarrenErrorCode::UnknownBoard,
            WarrenError::QueueTimeout { .. } => WarrenErrorCode::QueueTimeout,
            WarrenError::TaskPanicked { .. } => WarrenErrorCode::TaskPanicked,
            WarrenError::QueueClosed => WarrenErrorCode::QueueClosed,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }
}

/// Single logging point for errors from operations documented as best-effort
/// (leaderboard refresh after an award, for example). Suppressed errors are
/// recorded, never discarded.
pub(crate) fn log_suppressed(context: &str, err: &WarrenError) {
    tracing::warn!(context, code = err.code_str(), error = %err, "suppressed best-effort error");
}

#[cfg(test)]
mod tests {
    use super::{WarrenError, WarrenErrorCode};

    #[test]
    fn error_code_strings_are_stable() {
        assert_eq!(WarrenErrorCode::QueueTimeout.as_str(), "queue_timeout");
        assert_eq!(WarrenErrorCode::TaskPanicked.as_str(), "task_panicked");
        assert_eq!(
            WarrenErrorCode::UnknownItemKind.as_str(),
            "unknown_item_kind"
        );
        assert_eq!(WarrenErrorCode::Decode.as_str(), "decode");
    }

    #[test]
    fn error_code_matches_variant_mapping() {
        let err = WarrenError::QueueTimeout {
            shard: "entity-3".into(),
        };
        assert_eq!(err.code(), WarrenErrorCode::QueueTimeout);
        assert_eq!(err.code_str(), "queue_timeout");
    }
}
