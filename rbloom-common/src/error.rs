//! # Client Error Taxonomy
//!
//! Purpose: Give every failure surfaced by the client a single enum with a
//! stable classification, so call sites and the cluster retry loop agree on
//! what is terminal and what is worth another attempt.
//!
//! ## Design Principles
//! 1. **One Enum**: Protocol, server, pool, and cluster failures share `ClientError`.
//! 2. **Verbatim Messages**: Server error text is carried unchanged.
//! 3. **Explicit Retry Policy**: `is_retryable()` is the only predicate the
//!    cluster executor consults.

use thiserror::Error;

/// Result type used across the client crates.
pub type ClientResult<T> = Result<T, ClientError>;

/// Coarse classification of a [`ClientError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Reply framing or shape did not match the issued command.
    Protocol,
    /// The server rejected the command.
    Server,
    /// The server redirected the command to another cluster node.
    Redirect,
    /// No pooled connection became available in time.
    PoolExhausted,
    /// IO failure, timeout, or a closed pool.
    Connectivity,
    /// The cluster retry budget was consumed.
    ClusterExhausted,
    /// Invalid address or configuration.
    Config,
}

/// Errors surfaced by the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or IO failure while connecting, reading, or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// RESP2 framing error.
    #[error("protocol error: {0}")]
    Protocol(&'static str),
    /// Reply type did not match the shape the command guarantees.
    #[error("unexpected reply: expected {expected}, found {found}")]
    UnexpectedReply {
        expected: &'static str,
        found: &'static str,
    },
    /// Server returned an error reply.
    #[error("server error: {message}")]
    Server { message: String },
    /// Slot is permanently served by another node.
    #[error("slot {slot} moved to {addr}")]
    Moved { slot: u16, addr: String },
    /// Slot is being migrated; retry once against `addr` after `ASKING`.
    #[error("slot {slot} asked at {addr}")]
    Ask { slot: u16, addr: String },
    /// No known cluster node serves the slot.
    #[error("no cluster node serves slot {0}")]
    SlotUncovered(u16),
    /// Pool is at capacity and no connection was released within the wait timeout.
    #[error("connection pool exhausted")]
    PoolExhausted,
    /// Pool was closed by its owner.
    #[error("connection pool closed")]
    PoolClosed,
    /// Address could not be resolved into a socket address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Cluster retry budget consumed without success.
    #[error("cluster command failed after {attempts} attempts: {last}")]
    ClusterExhausted {
        attempts: usize,
        last: Box<ClientError>,
    },
}

impl ClientError {
    /// Returns the taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Io(_) | ClientError::PoolClosed | ClientError::SlotUncovered(_) => {
                ErrorKind::Connectivity
            }
            ClientError::Protocol(_) | ClientError::UnexpectedReply { .. } => ErrorKind::Protocol,
            ClientError::Server { .. } => ErrorKind::Server,
            ClientError::Moved { .. } | ClientError::Ask { .. } => ErrorKind::Redirect,
            ClientError::PoolExhausted => ErrorKind::PoolExhausted,
            ClientError::InvalidAddress(_) | ClientError::Config(_) => ErrorKind::Config,
            ClientError::ClusterExhausted { .. } => ErrorKind::ClusterExhausted,
        }
    }

    /// Returns true when the cluster executor may spend another attempt on it.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_)
                | ClientError::Moved { .. }
                | ClientError::Ask { .. }
                | ClientError::PoolExhausted
                | ClientError::SlotUncovered(_)
        )
    }

    /// Classifies the text of a RESP error frame.
    ///
    /// `MOVED <slot> <addr>` and `ASK <slot> <addr>` become redirects; any
    /// other text (including malformed redirects) is a server error.
    pub fn from_server_message(message: String) -> Self {
        if let Some(rest) = message.strip_prefix("MOVED ") {
            if let Some((slot, addr)) = parse_redirect(rest) {
                return ClientError::Moved { slot, addr };
            }
        } else if let Some(rest) = message.strip_prefix("ASK ") {
            if let Some((slot, addr)) = parse_redirect(rest) {
                return ClientError::Ask { slot, addr };
            }
        }
        ClientError::Server { message }
    }
}

fn parse_redirect(rest: &str) -> Option<(u16, String)> {
    let mut parts = rest.split_whitespace();
    let slot = parts.next()?.parse().ok()?;
    let addr = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some((slot, addr.to_string()))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn classifies_moved() {
        let err = ClientError::from_server_message("MOVED 3999 127.0.0.1:6381".to_string());
        match err {
            ClientError::Moved { slot, addr } => {
                assert_eq!(slot, 3999);
                assert_eq!(addr, "127.0.0.1:6381");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn classifies_ask() {
        let err = ClientError::from_server_message("ASK 12 10.0.0.2:7000".to_string());
        assert!(matches!(err, ClientError::Ask { slot: 12, .. }));
        assert_eq!(err.kind(), ErrorKind::Redirect);
    }

    #[test]
    fn malformed_redirect_is_server_error() {
        let err = ClientError::from_server_message("MOVED nope".to_string());
        assert!(matches!(err, ClientError::Server { ref message } if message == "MOVED nope"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn plain_error_keeps_message() {
        let err = ClientError::from_server_message("ERR item exists".to_string());
        assert_eq!(err.to_string(), "server error: ERR item exists");
        assert_eq!(err.kind(), ErrorKind::Server);
    }

    #[test]
    fn retry_policy() {
        assert!(ClientError::PoolExhausted.is_retryable());
        assert!(ClientError::Io(std::io::ErrorKind::TimedOut.into()).is_retryable());
        assert!(!ClientError::Protocol("bad frame").is_retryable());
        assert!(!ClientError::PoolClosed.is_retryable());
        let exhausted = ClientError::ClusterExhausted {
            attempts: 5,
            last: Box::new(ClientError::PoolExhausted),
        };
        assert!(!exhausted.is_retryable());
        assert_eq!(exhausted.kind(), ErrorKind::ClusterExhausted);
    }

    #[rstest]
    #[case("MOVED 1 h:1", ErrorKind::Redirect, true)]
    #[case("ASK 16383 h:1", ErrorKind::Redirect, true)]
    #[case("ASK 1 h:1 extra", ErrorKind::Server, false)]
    #[case("WRONGTYPE Operation against a key", ErrorKind::Server, false)]
    #[case("", ErrorKind::Server, false)]
    fn error_frame_classification(
        #[case] message: &str,
        #[case] kind: ErrorKind,
        #[case] retryable: bool,
    ) {
        let err = ClientError::from_server_message(message.to_string());
        assert_eq!(err.kind(), kind);
        assert_eq!(err.is_retryable(), retryable);
    }
}
