use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures reported by the graph store boundary.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("graph store unreachable: {0}")]
    Connection(String),

    #[error("graph query exceeded the {0:?} deadline")]
    Timeout(std::time::Duration),

    #[error("graph store rejected the query: {0}")]
    Query(String),
}

impl GatewayError {
    /// Connection and timeout faults are transient and may be retried;
    /// query rejections are caller defects and must not be.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Connection(_) | GatewayError::Timeout(_))
    }
}

/// Failures reported by the full-text index manager.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("full-text index '{0}' has not been built")]
    NotFound(String),

    #[error("failed to build full-text index '{name}': {message}")]
    Build { name: String, message: String },
}

/// Failures surfaced by tool registration, validation, and execution.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments: {}", .0.join("; "))]
    InvalidArguments(Vec<String>),

    #[error("no tool registered under the name '{0}'")]
    NotFound(String),

    #[error("a tool named '{0}' is already registered")]
    Duplicate(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("tool execution failed: {0}")]
    Execution(String),
}

impl ToolError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ToolError::Gateway(e) if e.is_retryable())
    }
}

/// Why a reasoning loop gave up before producing a final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    #[error("iteration budget exhausted")]
    IterationBudget,

    #[error("hard session deadline elapsed")]
    Timeout,

    #[error("session cancelled")]
    Cancelled,
}

/// Failure classification carried inside a `ToolResult` envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ToolNotFound,
    InvalidArguments,
    Connection,
    Timeout,
    Query,
    IndexNotFound,
    Execution,
    Cancelled,
}

impl From<&ToolError> for FailureKind {
    fn from(error: &ToolError) -> Self {
        match error {
            ToolError::InvalidArguments(_) => FailureKind::InvalidArguments,
            ToolError::NotFound(_) => FailureKind::ToolNotFound,
            ToolError::Duplicate(_) => FailureKind::Execution,
            ToolError::Gateway(GatewayError::Connection(_)) => FailureKind::Connection,
            ToolError::Gateway(GatewayError::Timeout(_)) => FailureKind::Timeout,
            ToolError::Gateway(GatewayError::Query(_)) => FailureKind::Query,
            ToolError::Index(IndexError::NotFound(_)) => FailureKind::IndexNotFound,
            ToolError::Index(IndexError::Build { .. }) => FailureKind::Execution,
            ToolError::Execution(_) => FailureKind::Execution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds_are_connection_and_timeout_only() {
        assert!(GatewayError::Connection("refused".into()).is_retryable());
        assert!(GatewayError::Timeout(std::time::Duration::from_secs(5)).is_retryable());
        assert!(!GatewayError::Query("bad syntax".into()).is_retryable());

        let defect = ToolError::InvalidArguments(vec!["missing 'product'".into()]);
        assert!(!defect.is_retryable());
        assert!(ToolError::Gateway(GatewayError::Connection("down".into())).is_retryable());
    }

    #[test]
    fn failure_kind_mirrors_the_taxonomy() {
        let error = ToolError::Index(IndexError::NotFound("supply_names".into()));
        assert_eq!(FailureKind::from(&error), FailureKind::IndexNotFound);
        let error = ToolError::NotFound("no_such_tool".into());
        assert_eq!(FailureKind::from(&error), FailureKind::ToolNotFound);
    }
}
