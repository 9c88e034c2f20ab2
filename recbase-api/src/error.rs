//! Errors returned by `RecbaseClient`
//!
use snafu::prelude::*;

/// Errors returned by the recbase crate
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RecbaseError {
    // Http connection or timeout error
    #[snafu(display("HTTP error {method} url:{url}"))]
    Http {
        method: String,
        url: String,
        source: reqwest::Error,
    },

    /// Store responded with a non-success status.
    #[snafu(display("Api server reported error ({code}) {method} {url}: {message}"))]
    Api {
        code: u16,
        method: String,
        url: String,
        message: String,
    },

    /// Admin authentication failed.
    /// Login failures are fatal: nothing else works without a bearer token.
    #[snafu(display("Authentication failed: {message}"))]
    Auth { message: String },

    /// Collection or record does not exist (http 404).
    /// Callers usually treat this as an empty result rather than a failure.
    #[snafu(display("{what} {key} not found"))]
    NotFound { what: String, key: String },

    /// Deserialization error. A server response did not match the expected shape.
    #[snafu(display("Deserialization: {source}"))]
    Deserialization { source: serde_json::Error },

    /// Serialization error. Unlikely to occur.
    #[snafu(display("Serialization: {source}"))]
    Serialization { source: serde_json::Error },

    /// Some other error occurred
    #[snafu(display("{message}"))]
    Other { message: String },
}

impl RecbaseError {
    /// True for http 404 / missing-object errors.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_predicate() {
        let err = RecbaseError::NotFound {
            what: "collection".into(),
            key: "inventory".into(),
        };
        assert!(err.is_not_found());
        let err = RecbaseError::Auth {
            message: "bad password".into(),
        };
        assert!(!err.is_not_found());
    }
}
