use std::fmt;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    BoardNotFound,
    ConfigParseError,
    UnknownBucket,
    IndexOutOfRange,
    IssueNotFound,
    NoContainer,
    MissingBridge,
    InvalidEnumValue,
    MissingRoute,
    RemoteRejected,
    TransportFailure,
    DecodeFailure,
    BoardWriteFailed,
    LockContention,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::BoardNotFound => "E1001",
            Self::ConfigParseError => "E1002",
            Self::UnknownBucket => "E2001",
            Self::IndexOutOfRange => "E2002",
            Self::IssueNotFound => "E2003",
            Self::NoContainer => "E2004",
            Self::MissingBridge => "E2005",
            Self::InvalidEnumValue => "E2006",
            Self::MissingRoute => "E3001",
            Self::RemoteRejected => "E3002",
            Self::TransportFailure => "E3003",
            Self::DecodeFailure => "E3004",
            Self::BoardWriteFailed => "E5001",
            Self::LockContention => "E5002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::BoardNotFound => "Board file not found",
            Self::ConfigParseError => "Config file parse error",
            Self::UnknownBucket => "Unknown bucket",
            Self::IndexOutOfRange => "Index out of range",
            Self::IssueNotFound => "Issue not found",
            Self::NoContainer => "View is not scoped to a cycle or module",
            Self::MissingBridge => "Issue is not linked to the scoped container",
            Self::InvalidEnumValue => "Invalid priority/grouping/ordering value",
            Self::MissingRoute => "Workspace or project not set",
            Self::RemoteRejected => "Remote rejected the request",
            Self::TransportFailure => "Remote unreachable",
            Self::DecodeFailure => "Unexpected response payload",
            Self::BoardWriteFailed => "Board file write failed",
            Self::LockContention => "Lock contention",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::BoardNotFound => Some("Pass --board <file> or create .lanes/board.json."),
            Self::ConfigParseError => Some("Fix syntax in .lanes/config.toml and retry."),
            Self::UnknownBucket => Some("Run `lanes show` to list the buckets of this view."),
            Self::IndexOutOfRange | Self::IssueNotFound => None,
            Self::NoContainer => Some("Scope the view with --cycle or --module."),
            Self::MissingBridge => None,
            Self::InvalidEnumValue => {
                Some("Use one of the documented priority/group_by/order_by values.")
            }
            Self::MissingRoute => {
                Some("Set api.workspace_slug and api.project_id in .lanes/config.toml.")
            }
            Self::RemoteRejected => Some("Refresh the board; the issue may have changed remotely."),
            Self::TransportFailure => Some("Check api.base_url and network connectivity."),
            Self::DecodeFailure => Some("Check that api.base_url points at a compatible server."),
            Self::BoardWriteFailed => Some("Check disk space and write permissions."),
            Self::LockContention => Some("Retry after the other `lanes` process releases its lock."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors raised while planning a drop or container removal against the
/// locally cached board.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReorderError {
    #[error("unknown bucket '{0}'")]
    UnknownBucket(String),

    #[error("index {index} is out of range for bucket '{bucket}' ({len} issues)")]
    IndexOutOfRange {
        bucket: String,
        index: usize,
        len: usize,
    },

    #[error("issue not found: {0}")]
    IssueNotFound(String),

    #[error("view is not scoped to a cycle or module")]
    NoContainer,

    #[error("issue {0} is not linked to the scoped container")]
    MissingBridge(String),
}

impl ReorderError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownBucket(_) => ErrorCode::UnknownBucket,
            Self::IndexOutOfRange { .. } => ErrorCode::IndexOutOfRange,
            Self::IssueNotFound(_) => ErrorCode::IssueNotFound,
            Self::NoContainer => ErrorCode::NoContainer,
            Self::MissingBridge(_) => ErrorCode::MissingBridge,
        }
    }
}
