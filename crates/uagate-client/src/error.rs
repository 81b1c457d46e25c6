// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the client manager.
//!
//! ```text
//! ClientError
//! ├── UnreachableServer     - endpoint discovery could not contact the server
//! ├── SessionCreationFailed - the stack refused to open a session
//! ├── PublishFailed         - a publish request was rejected (with sub-reason)
//! ├── NotFound              - unpublish target (session or item) is absent
//! ├── PersistenceFailed     - durability degraded, live state still correct
//! ├── Cancelled             - the caller's cancellation token fired
//! ├── Configuration         - malformed node ids, filters or settings
//! ├── Credentials           - credential blob could not be protected/unprotected
//! └── Stack                 - raw failure reported by the protocol stack
//! ```
//!
//! Errors raised during steady-state operation (keep-alive handling,
//! reconnect attempts, heartbeats) are logged and never escape the
//! manager. Errors raised by explicit publish/unpublish calls are returned
//! to the caller.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tracing::Level;

use crate::types::{ServerAddress, StatusCode};

// =============================================================================
// ClientError
// =============================================================================

/// The main error type for client manager operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Endpoint discovery could not reach the server.
    #[error("Server unreachable at '{address}': {message}")]
    UnreachableServer {
        /// The server address.
        address: ServerAddress,
        /// Failure description.
        message: String,
    },

    /// The protocol stack failed to open a session.
    #[error("Session creation failed for '{address}': {message}")]
    SessionCreationFailed {
        /// The server address.
        address: ServerAddress,
        /// Failure description.
        message: String,
    },

    /// A publish request could not be honoured.
    #[error("Publish of '{node}' on '{address}' failed ({reason}): {message}")]
    PublishFailed {
        /// The server address.
        address: ServerAddress,
        /// External node identifier from the request.
        node: String,
        /// Classified reason.
        reason: PublishFailureReason,
        /// Failure description.
        message: String,
    },

    /// The session or monitored item does not exist.
    #[error("{kind} not found: {target}")]
    NotFound {
        /// What was looked up.
        kind: NotFoundKind,
        /// Identifier of the missing target.
        target: String,
    },

    /// The topology snapshot could not be stored or loaded.
    #[error("Persistence failed for '{path}': {message}")]
    PersistenceFailed {
        /// Storage path involved.
        path: String,
        /// Failure description.
        message: String,
    },

    /// The operation observed cancellation before completing.
    #[error("Operation '{operation}' cancelled")]
    Cancelled {
        /// Operation name.
        operation: &'static str,
    },

    /// Invalid configuration or request input.
    #[error("Invalid {field}: {message}")]
    Configuration {
        /// The offending field.
        field: String,
        /// Failure description.
        message: String,
    },

    /// Credential protection failed.
    #[error("Credential error: {message}")]
    Credentials {
        /// Failure description.
        message: String,
    },

    /// The protocol stack reported a failure.
    #[error("Stack call '{operation}' failed with {status}: {message}")]
    Stack {
        /// Stack operation name.
        operation: &'static str,
        /// Status code reported by the server or stack.
        status: StatusCode,
        /// Failure description.
        message: String,
    },
}

impl ClientError {
    // =========================================================================
    // Factory Methods
    // =========================================================================

    /// Creates an unreachable server error.
    pub fn unreachable(address: &ServerAddress, message: impl Into<String>) -> Self {
        Self::UnreachableServer {
            address: address.clone(),
            message: message.into(),
        }
    }

    /// Creates a session creation error.
    pub fn session_creation(address: &ServerAddress, message: impl Into<String>) -> Self {
        Self::SessionCreationFailed {
            address: address.clone(),
            message: message.into(),
        }
    }

    /// Creates a publish failure.
    pub fn publish_failed(
        address: &ServerAddress,
        node: impl Into<String>,
        reason: PublishFailureReason,
        message: impl Into<String>,
    ) -> Self {
        Self::PublishFailed {
            address: address.clone(),
            node: node.into(),
            reason,
            message: message.into(),
        }
    }

    /// Creates a session-not-found error.
    pub fn session_not_found(address: &ServerAddress) -> Self {
        Self::NotFound {
            kind: NotFoundKind::Session,
            target: address.to_string(),
        }
    }

    /// Creates a subscription-not-found error.
    pub fn subscription_not_found(interval_ms: u32) -> Self {
        Self::NotFound {
            kind: NotFoundKind::Subscription,
            target: format!("publishing interval {}ms", interval_ms),
        }
    }

    /// Creates a monitored-item-not-found error.
    pub fn item_not_found(node: impl Into<String>) -> Self {
        Self::NotFound {
            kind: NotFoundKind::MonitoredItem,
            target: node.into(),
        }
    }

    /// Creates a persistence error.
    pub fn persistence(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PersistenceFailed {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled(operation: &'static str) -> Self {
        Self::Cancelled { operation }
    }

    /// Creates a configuration error.
    pub fn configuration(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid node id error.
    pub fn invalid_node_id(node: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::Configuration {
            field: format!("node id '{}'", node),
            message: message.into(),
        }
    }

    /// Creates a credential error.
    pub fn credentials(message: impl Into<String>) -> Self {
        Self::Credentials {
            message: message.into(),
        }
    }

    /// Creates a stack error carrying a status code.
    pub fn stack(operation: &'static str, status: StatusCode, message: impl Into<String>) -> Self {
        Self::Stack {
            operation,
            status,
            message: message.into(),
        }
    }

    // =========================================================================
    // Error Properties
    // =========================================================================

    /// Returns the status code carried by this error, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Stack { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns `true` if this is a `NotFound` error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Returns `true` if a caller may retry the operation.
    ///
    /// The manager itself never retries publish requests; reconnects are
    /// handled by the reconnect supervisor.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::UnreachableServer { .. } => true,
            Self::PersistenceFailed { .. } => true,
            Self::PublishFailed { reason, .. } => reason.is_retryable(),
            Self::Stack { status, .. } => {
                matches!(
                    PublishFailureReason::classify(*status),
                    PublishFailureReason::StaleSession | PublishFailureReason::StaleSubscription
                )
            }
            _ => false,
        }
    }

    /// Returns the suggested retry delay for retryable errors.
    pub fn suggested_retry_delay(&self) -> Option<Duration> {
        if !self.is_retryable() {
            return None;
        }
        match self {
            Self::UnreachableServer { .. } => Some(Duration::from_secs(10)),
            _ => Some(Duration::from_secs(1)),
        }
    }

    /// Returns the severity level of this error.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::PersistenceFailed { .. } => ErrorSeverity::Warning,
            Self::NotFound { .. } | Self::Cancelled { .. } => ErrorSeverity::Info,
            Self::UnreachableServer { .. } | Self::Stack { .. } => ErrorSeverity::Warning,
            Self::PublishFailed { reason, .. } => match reason {
                PublishFailureReason::BadNodeId | PublishFailureReason::UnsupportedFilterOperator => {
                    ErrorSeverity::Error
                }
                _ => ErrorSeverity::Warning,
            },
            Self::SessionCreationFailed { .. } | Self::Credentials { .. } => ErrorSeverity::Error,
            Self::Configuration { .. } => ErrorSeverity::Critical,
        }
    }

    /// Returns the error category for logging and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::UnreachableServer { .. } => "unreachable",
            Self::SessionCreationFailed { .. } => "session",
            Self::PublishFailed { .. } => "publish",
            Self::NotFound { .. } => "not_found",
            Self::PersistenceFailed { .. } => "persistence",
            Self::Cancelled { .. } => "cancelled",
            Self::Configuration { .. } => "configuration",
            Self::Credentials { .. } => "credentials",
            Self::Stack { .. } => "stack",
        }
    }

    /// Returns a structured error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::UnreachableServer { .. } => ErrorCode::new(1, 1),
            Self::SessionCreationFailed { .. } => ErrorCode::new(2, 1),
            Self::PublishFailed { reason, .. } => ErrorCode::new(3, reason.code()),
            Self::NotFound { kind, .. } => ErrorCode::new(4, kind.code()),
            Self::PersistenceFailed { .. } => ErrorCode::new(5, 1),
            Self::Cancelled { .. } => ErrorCode::new(6, 1),
            Self::Configuration { .. } => ErrorCode::new(7, 1),
            Self::Credentials { .. } => ErrorCode::new(8, 1),
            Self::Stack { .. } => ErrorCode::new(9, 1),
        }
    }

    /// Returns the tracing level for this error.
    pub fn tracing_level(&self) -> Level {
        self.severity().to_tracing_level()
    }

    /// Logs this error with appropriate level and context.
    pub fn log(&self, context: &str) {
        let code = self.error_code();

        match self.tracing_level() {
            Level::ERROR => tracing::error!(
                error_code = %code,
                category = self.category(),
                context = context,
                "{self}"
            ),
            Level::WARN => tracing::warn!(
                error_code = %code,
                category = self.category(),
                context = context,
                "{self}"
            ),
            _ => tracing::debug!(
                error_code = %code,
                category = self.category(),
                context = context,
                "{self}"
            ),
        }
    }
}

// =============================================================================
// PublishFailureReason
// =============================================================================

/// Classified reason for a rejected publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PublishFailureReason {
    /// The server no longer knows the session id.
    StaleSession,
    /// The server no longer knows the subscription id.
    StaleSubscription,
    /// The node id is invalid or unknown on the server.
    BadNodeId,
    /// The event filter used an operator outside the supported set.
    UnsupportedFilterOperator,
    /// No session could be obtained for the address.
    SessionUnavailable,
    /// Any other protocol-level rejection.
    Other,
}

impl PublishFailureReason {
    /// Classifies a stack status code.
    pub fn classify(status: StatusCode) -> Self {
        match status {
            StatusCode::BAD_SESSION_ID_INVALID => Self::StaleSession,
            StatusCode::BAD_SUBSCRIPTION_ID_INVALID => Self::StaleSubscription,
            StatusCode::BAD_NODE_ID_INVALID | StatusCode::BAD_NODE_ID_UNKNOWN => Self::BadNodeId,
            StatusCode::BAD_FILTER_OPERATOR_UNSUPPORTED => Self::UnsupportedFilterOperator,
            _ => Self::Other,
        }
    }

    /// Returns `true` if a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StaleSession | Self::StaleSubscription | Self::SessionUnavailable
        )
    }

    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StaleSession => "stale_session",
            Self::StaleSubscription => "stale_subscription",
            Self::BadNodeId => "bad_node_id",
            Self::UnsupportedFilterOperator => "unsupported_filter_operator",
            Self::SessionUnavailable => "session_unavailable",
            Self::Other => "other",
        }
    }

    fn code(&self) -> u8 {
        match self {
            Self::StaleSession => 1,
            Self::StaleSubscription => 2,
            Self::BadNodeId => 3,
            Self::UnsupportedFilterOperator => 4,
            Self::SessionUnavailable => 5,
            Self::Other => 9,
        }
    }
}

impl fmt::Display for PublishFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// NotFoundKind
// =============================================================================

/// The kind of target a `NotFound` error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotFoundKind {
    /// A session keyed by server address.
    Session,
    /// A subscription keyed by publishing interval.
    Subscription,
    /// A monitored item keyed by node id.
    MonitoredItem,
}

impl NotFoundKind {
    fn code(&self) -> u8 {
        match self {
            Self::Session => 1,
            Self::Subscription => 2,
            Self::MonitoredItem => 3,
        }
    }
}

impl fmt::Display for NotFoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session => f.write_str("Session"),
            Self::Subscription => f.write_str("Subscription"),
            Self::MonitoredItem => f.write_str("Monitored item"),
        }
    }
}

// =============================================================================
// ErrorSeverity
// =============================================================================

/// Error severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    /// Informational, no action required.
    Info,
    /// Action may be required.
    Warning,
    /// Action required, but recoverable.
    Error,
    /// Immediate action required.
    Critical,
}

impl ErrorSeverity {
    /// Converts to tracing level.
    pub fn to_tracing_level(self) -> Level {
        match self {
            Self::Info => Level::INFO,
            Self::Warning => Level::WARN,
            Self::Error | Self::Critical => Level::ERROR,
        }
    }

    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// ErrorCode
// =============================================================================

/// Structured error code.
///
/// Format: `GW-XXYY` where XX is the category and YY the specific error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    /// Category (1-9).
    pub category: u8,
    /// Specific error within category.
    pub code: u8,
}

impl ErrorCode {
    /// Creates a new error code.
    pub const fn new(category: u8, code: u8) -> Self {
        Self { category, code }
    }

    /// Returns the full error code as a u16.
    pub fn as_u16(&self) -> u16 {
        ((self.category as u16) << 8) | (self.code as u16)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GW-{:02X}{:02X}", self.category, self.code)
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// A Result type with ClientError.
pub type ClientResult<T> = Result<T, ClientError>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> ServerAddress {
        ServerAddress::new("opc.tcp://plant1:4840")
    }

    #[test]
    fn test_classify_status_codes() {
        assert_eq!(
            PublishFailureReason::classify(StatusCode::BAD_SESSION_ID_INVALID),
            PublishFailureReason::StaleSession
        );
        assert_eq!(
            PublishFailureReason::classify(StatusCode::BAD_SUBSCRIPTION_ID_INVALID),
            PublishFailureReason::StaleSubscription
        );
        assert_eq!(
            PublishFailureReason::classify(StatusCode::BAD_NODE_ID_UNKNOWN),
            PublishFailureReason::BadNodeId
        );
        assert_eq!(
            PublishFailureReason::classify(StatusCode::BAD_NODE_ID_INVALID),
            PublishFailureReason::BadNodeId
        );
        assert_eq!(
            PublishFailureReason::classify(StatusCode(0x8001_0000)),
            PublishFailureReason::Other
        );
    }

    #[test]
    fn test_error_code_format() {
        let code = ErrorCode::new(3, 4);
        assert_eq!(code.to_string(), "GW-0304");
        assert_eq!(code.as_u16(), 0x0304);

        let error = ClientError::publish_failed(
            &address(),
            "ns=2;s=X",
            PublishFailureReason::BadNodeId,
            "unknown",
        );
        assert_eq!(error.error_code().to_string(), "GW-0303");
    }

    #[test]
    fn test_not_found_messages() {
        let error = ClientError::session_not_found(&address());
        assert!(error.is_not_found());
        assert_eq!(
            error.to_string(),
            "Session not found: opc.tcp://plant1:4840"
        );

        let error = ClientError::item_not_found("ns=2;s=Temperature");
        assert!(error.to_string().starts_with("Monitored item not found"));
    }

    #[test]
    fn test_retryable() {
        assert!(ClientError::unreachable(&address(), "refused").is_retryable());
        assert!(!ClientError::session_not_found(&address()).is_retryable());
        assert!(!ClientError::configuration("interval", "zero").is_retryable());
        assert!(ClientError::stack("add_item", StatusCode::BAD_SESSION_ID_INVALID, "gone")
            .is_retryable());
        assert!(ClientError::cancelled("publish").suggested_retry_delay().is_none());
    }

    #[test]
    fn test_severity_and_category() {
        let error = ClientError::persistence("settings/persistency.json", "disk full");
        assert_eq!(error.severity(), ErrorSeverity::Warning);
        assert_eq!(error.category(), "persistence");

        let error = ClientError::configuration("node id", "bad");
        assert_eq!(error.severity(), ErrorSeverity::Critical);
        assert_eq!(error.tracing_level(), Level::ERROR);
    }
}
