use boring::error::ErrorStack;
use std::io;
use thiserror::Error;

pub(crate) const UNTRUSTED_MESSAGE: &str = "certificate is not trusted by the system trust store";

/// Every failure a trust context can report.
///
/// Only [`Error::CertificateVerification`] is an expected, caller-recoverable
/// outcome; the other variants describe misconfiguration, resource problems
/// or integration defects.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} is not supported")]
    UnsupportedPlatform(&'static str),

    #[error("unable to allocate {0}")]
    Allocation(&'static str),

    #[error("x509: peer did not present a certificate chain")]
    NoCertificate,

    #[error("certificate verify failed: {message}")]
    CertificateVerification { code: Option<i64>, message: String },

    #[error("internal trust evaluation error: {0}")]
    InternalEvaluation(String),

    #[error("invalid server hostname {0:?}")]
    InvalidHostname(String),

    #[error("tls handshake failed: {0}")]
    Handshake(String),

    #[error(transparent)]
    Ssl(#[from] ErrorStack),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn untrusted(code: Option<i64>, message: Option<String>) -> Self {
        Error::CertificateVerification {
            code,
            message: message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| UNTRUSTED_MESSAGE.to_owned()),
        }
    }

    /// True when the peer's chain was rejected, by the OS evaluator or by the
    /// engine's own verifier.
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            Error::CertificateVerification { .. } | Error::NoCertificate
        )
    }

    /// Native or engine verification code, when one was reported.
    pub fn verify_code(&self) -> Option<i64> {
        match self {
            Error::CertificateVerification { code, .. } => *code,
            _ => None,
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            Error::InvalidHostname(_) => io::Error::new(io::ErrorKind::InvalidInput, err),
            Error::UnsupportedPlatform(_) => io::Error::new(io::ErrorKind::Unsupported, err),
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}
