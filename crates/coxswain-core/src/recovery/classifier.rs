//! Failure classification.
//!
//! Maps failure text (and, when available, concrete error types) onto a
//! closed set of kinds that the retry strategies key off. Pattern groups
//! are checked in a fixed priority order and the first match wins, so a
//! message mentioning both "429" and "timeout" classifies as rate_limit.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Failure kind, from most to least specific in matching priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimit,
    Timeout,
    Network,
    FileNotFound,
    Permission,
    Syntax,
    Validation,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Network => "network",
            ErrorKind::FileNotFound => "file_not_found",
            ErrorKind::Permission => "permission",
            ErrorKind::Syntax => "syntax",
            ErrorKind::Validation => "validation",
            ErrorKind::Unknown => "unknown",
        }
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("(?i){}", p)).expect("valid classifier pattern"))
        .collect()
}

static RATE_LIMIT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"rate limit",
        r"too many requests",
        r"429.*too many",
        r"quota.*exceeded",
        r"throttled",
        r"request limit",
    ])
});

static TIMEOUT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"timeout",
        r"timed out",
        r"time.*out",
        r"deadline exceeded",
        r"operation.*timeout",
        r"request.*timeout",
    ])
});

static NETWORK_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"connection.*error",
        r"network.*error",
        r"unable to connect",
        r"connection refused",
        r"connection reset",
        r"network is unreachable",
        r"name resolution failed",
        r"dns.*failed",
        r"could not resolve host",
        r"failed to establish connection",
        r"socket.*error",
        r"http.*error",
        r"ssl.*error",
        r"certificate.*error",
    ])
});

static FILE_NOT_FOUND_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"no such file or directory",
        r"file not found",
        r"path not found",
        r"does not exist",
        r"cannot find.*file",
        r"cannot find.*path",
        r"os error 2",
    ])
});

static PERMISSION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"permission denied",
        r"access denied",
        r"access is denied",
        r"operation not permitted",
        r"you don't have permission",
        r"insufficient permissions",
        r"os error 13",
        r"forbidden",
        r"unauthorized",
        r"401.*unauthorized",
        r"403.*forbidden",
    ])
});

static SYNTAX_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"syntax.*error",
        r"invalid syntax",
        r"parse.*error",
        r"unexpected.*token",
        r"unexpected.*symbol",
        r"missing.*semicolon",
        r"unterminated.*string",
        r"expected.*found",
    ])
});

static VALIDATION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"validation.*error",
        r"invalid.*input",
        r"invalid.*parameter",
        r"invalid.*argument",
        r"bad.*request",
        r"400.*bad request",
        r"missing.*required",
        r"invalid type",
    ])
});

static REQUEST_SIZE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"413.*request entity too large",
        r"request.*too large",
        r"payload.*too large",
        r"content.*too large",
    ])
});

fn matches_any(text: &str, patterns: &[Regex]) -> bool {
    patterns.iter().any(|p| p.is_match(text))
}

/// Classify a failure from its message and, when available, the error value.
///
/// Concrete error types resolve first; text patterns are the fallback. The
/// text priority order is part of the contract: rate_limit beats timeout
/// beats network, and so on down to validation.
pub fn classify(message: &str, error: Option<&anyhow::Error>) -> ErrorKind {
    if message.is_empty() {
        return ErrorKind::Unknown;
    }
    let lowered = message.to_lowercase();

    if let Some(error) = error {
        if let Some(kind) = classify_by_type(error, &lowered) {
            return kind;
        }
    }

    if matches_any(&lowered, &RATE_LIMIT_PATTERNS) {
        return ErrorKind::RateLimit;
    }
    if matches_any(&lowered, &TIMEOUT_PATTERNS) {
        return ErrorKind::Timeout;
    }
    if matches_any(&lowered, &NETWORK_PATTERNS) {
        return ErrorKind::Network;
    }
    if matches_any(&lowered, &FILE_NOT_FOUND_PATTERNS) {
        return ErrorKind::FileNotFound;
    }
    if matches_any(&lowered, &PERMISSION_PATTERNS) {
        return ErrorKind::Permission;
    }
    if matches_any(&lowered, &SYNTAX_PATTERNS) {
        return ErrorKind::Syntax;
    }
    if matches_any(&lowered, &VALIDATION_PATTERNS) || matches_any(&lowered, &REQUEST_SIZE_PATTERNS) {
        return ErrorKind::Validation;
    }

    ErrorKind::Unknown
}

/// Classify an error value using its rendered message for text fallback
pub fn classify_error(error: &anyhow::Error) -> ErrorKind {
    classify(&error.to_string(), Some(error))
}

/// Walk the error chain looking for types that pin the kind directly
fn classify_by_type(error: &anyhow::Error, lowered: &str) -> Option<ErrorKind> {
    for cause in error.chain() {
        if let Some(io_error) = cause.downcast_ref::<std::io::Error>() {
            if let Some(kind) = classify_io_kind(io_error.kind(), lowered) {
                return Some(kind);
            }
        } else if cause.downcast_ref::<serde_json::Error>().is_some() {
            return Some(ErrorKind::Syntax);
        } else if cause.downcast_ref::<tokio::time::error::Elapsed>().is_some() {
            return Some(ErrorKind::Timeout);
        }
    }
    None
}

fn classify_io_kind(kind: std::io::ErrorKind, lowered: &str) -> Option<ErrorKind> {
    use std::io::ErrorKind as IoKind;

    match kind {
        // NotFound covers more than files; defer to permission text when present.
        IoKind::NotFound => {
            if matches_any(lowered, &PERMISSION_PATTERNS) {
                Some(ErrorKind::Permission)
            } else {
                Some(ErrorKind::FileNotFound)
            }
        }
        IoKind::PermissionDenied => Some(ErrorKind::Permission),
        IoKind::TimedOut | IoKind::WouldBlock => Some(ErrorKind::Timeout),
        IoKind::ConnectionRefused
        | IoKind::ConnectionReset
        | IoKind::ConnectionAborted
        | IoKind::NotConnected
        | IoKind::AddrNotAvailable
        | IoKind::BrokenPipe => Some(ErrorKind::Network),
        IoKind::InvalidInput | IoKind::InvalidData => Some(ErrorKind::Validation),
        _ => None,
    }
}

/// True for kinds worth retrying at all
pub fn is_retryable(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::Network | ErrorKind::Timeout | ErrorKind::RateLimit)
}

/// Remediation text surfaced in logs; never consulted by control logic
pub fn recovery_hint(kind: ErrorKind) -> Option<&'static str> {
    match kind {
        ErrorKind::FileNotFound => {
            Some("The file or directory does not exist. Check the path and try again.")
        }
        ErrorKind::Permission => Some(
            "Permission denied. You may need elevated privileges or need to check file permissions.",
        ),
        ErrorKind::Network => {
            Some("Network connection issue. Check your internet connection and try again.")
        }
        ErrorKind::Timeout => Some("Operation timed out. The server may be slow or unresponsive."),
        ErrorKind::RateLimit => Some("Rate limit exceeded. Waiting before retrying..."),
        ErrorKind::Syntax => Some("Syntax error in code. Review and fix the syntax."),
        ErrorKind::Validation => Some("Invalid input or parameters. Check the values and try again."),
        ErrorKind::Unknown => None,
    }
}
