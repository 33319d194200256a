//! Error classification.
//!
//! Backend failures are mapped onto a small, closed taxonomy so operators can
//! pattern-match exit conditions without depending on backend wording or
//! locale. Classification is layered: typed deadline sentinels first, then
//! errors the adapters already classified, then substring heuristics over the
//! combined (lowercased) message.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::shell_exec::DeadlineExceeded;

/// Coarse classification of a per-repo failure.
///
/// The wire representation is the snake_case tag; `None` serializes as the
/// empty string so successful rows stay visually quiet in reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorClass {
    #[default]
    None,
    Timeout,
    Auth,
    Network,
    Corrupt,
    MissingRemote,
    Missing,
    Invalid,
    Skipped,
    Unknown,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::None => "",
            ErrorClass::Timeout => "timeout",
            ErrorClass::Auth => "auth",
            ErrorClass::Network => "network",
            ErrorClass::Corrupt => "corrupt",
            ErrorClass::MissingRemote => "missing_remote",
            ErrorClass::Missing => "missing",
            ErrorClass::Invalid => "invalid",
            ErrorClass::Skipped => "skipped",
            ErrorClass::Unknown => "unknown",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ErrorClass::None)
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorClass {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "" => ErrorClass::None,
            "timeout" => ErrorClass::Timeout,
            "auth" => ErrorClass::Auth,
            "network" => ErrorClass::Network,
            "corrupt" => ErrorClass::Corrupt,
            "missing_remote" => ErrorClass::MissingRemote,
            "missing" => ErrorClass::Missing,
            "invalid" => ErrorClass::Invalid,
            "skipped" => ErrorClass::Skipped,
            _ => ErrorClass::Unknown,
        })
    }
}

impl Serialize for ErrorClass {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorClass {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(s.parse().expect("infallible"))
    }
}

/// An error the adapter already classified.
///
/// Adapters raise this when they can identify the failure mode directly
/// (e.g. a backend that reports authentication failures with a distinct exit
/// code), bypassing the substring heuristics.
#[derive(Debug)]
pub struct ClassifiedError {
    pub class: ErrorClass,
    pub message: String,
}

impl ClassifiedError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ClassifiedError {}

const AUTH_SUBSTRINGS: &[&str] = &[
    "permission denied",
    "authentication failed",
    "access denied",
    "publickey",
    "could not read username",
    "credential",
];

const NETWORK_SUBSTRINGS: &[&str] = &[
    "could not resolve host",
    "network is unreachable",
    "connection timed out",
    "failed to connect",
    "temporary failure in name resolution",
    "tls handshake timeout",
];

const TIMEOUT_SUBSTRINGS: &[&str] = &["timeout", "timed out", "deadline exceeded"];

const CORRUPT_SUBSTRINGS: &[&str] = &[
    "not a git repository",
    "bad object",
    "corrupt",
    "object file",
];

const MISSING_REMOTE_SUBSTRINGS: &[&str] = &[
    "repository not found",
    "couldn't find remote ref",
    "remote ref does not exist",
    "no such remote",
];

/// Classify a backend error into the fixed taxonomy.
///
/// Network is checked before timeout: "connection timed out" and
/// "tls handshake timeout" are network conditions despite the wording.
pub fn classify_error(err: &anyhow::Error) -> ErrorClass {
    for cause in err.chain() {
        if cause.downcast_ref::<DeadlineExceeded>().is_some() {
            return ErrorClass::Timeout;
        }
        if let Some(classified) = cause.downcast_ref::<ClassifiedError>() {
            return classified.class;
        }
    }

    let message = err
        .chain()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(": ")
        .to_lowercase();
    classify_message(&message)
}

/// Substring heuristics over an already-lowercased message.
pub fn classify_message(message: &str) -> ErrorClass {
    let tables: &[(&[&str], ErrorClass)] = &[
        (AUTH_SUBSTRINGS, ErrorClass::Auth),
        (NETWORK_SUBSTRINGS, ErrorClass::Network),
        (TIMEOUT_SUBSTRINGS, ErrorClass::Timeout),
        (CORRUPT_SUBSTRINGS, ErrorClass::Corrupt),
        (MISSING_REMOTE_SUBSTRINGS, ErrorClass::MissingRemote),
    ];
    for (substrings, class) in tables {
        if substrings.iter().any(|s| message.contains(s)) {
            return *class;
        }
    }
    ErrorClass::Unknown
}
