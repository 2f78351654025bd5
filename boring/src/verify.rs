use crate::error::Error;
use crate::native_certs::TrustEvaluator;
use boring::ssl::{HandshakeError, SslRef};
use boring::x509::X509VerifyResult;
use bytes::Bytes;
use std::io;
use truststore_common::{CertificateChain, TrustVerdict};

/// Copies the chain the peer presented out of a finished handshake, leaf first.
///
/// The chain is the unverified one: on a client, BoringSSL keeps the leaf at
/// index 0 followed by whatever the server sent.
pub fn peer_chain(ssl: &SslRef) -> Result<CertificateChain, Error> {
    let stack = ssl.peer_cert_chain().ok_or(Error::NoCertificate)?;
    let chain = stack
        .iter()
        .map(|cert| cert.to_der().map(Bytes::from))
        .collect::<Result<CertificateChain, _>>()?;
    if chain.is_empty() {
        return Err(Error::NoCertificate);
    }
    Ok(chain)
}

/// Runs the evaluator over the peer chain of a completed handshake.
pub(crate) fn verify_peer(
    evaluator: &dyn TrustEvaluator,
    ssl: &SslRef,
    hostname: Option<&str>,
) -> Result<(), Error> {
    let chain = peer_chain(ssl)?;
    match evaluator.evaluate(&chain, hostname)? {
        TrustVerdict::Trusted => Ok(()),
        TrustVerdict::Untrusted { code, message } => Err(Error::untrusted(code, message)),
    }
}

/// The engine's own verdict, if it rejected the chain.
pub(crate) fn engine_rejection(ssl: &SslRef) -> Option<Error> {
    // No certificate received yet: the failure happened before verification.
    ssl.peer_certificate()?;
    let result = ssl.verify_result();
    if result == X509VerifyResult::OK {
        return None;
    }
    Some(Error::untrusted(
        Some(result.as_raw() as i64),
        Some(result.error_string().to_owned()),
    ))
}

pub(crate) fn handshake_error<S>(err: HandshakeError<S>, engine_verifies: bool) -> Error {
    match err {
        HandshakeError::SetupFailure(stack) => Error::Ssl(stack),
        HandshakeError::Failure(mid) => {
            if engine_verifies {
                if let Some(rejection) = engine_rejection(mid.ssl()) {
                    return rejection;
                }
            }
            match mid.into_error().into_io_error() {
                Ok(e) => Error::Io(e),
                Err(e) => Error::Handshake(e.to_string()),
            }
        }
        HandshakeError::WouldBlock(_) => Error::Io(io::Error::new(
            io::ErrorKind::WouldBlock,
            "tls handshake would block",
        )),
    }
}

/// [`handshake_error`] for `tokio_boring` handshakes.
pub(crate) fn async_handshake_error<S>(
    err: tokio_boring::HandshakeError<S>,
    engine_verifies: bool,
) -> Error {
    if engine_verifies {
        if let Some(rejection) = err.ssl().and_then(engine_rejection) {
            return rejection;
        }
    }
    match err.as_io_error() {
        Some(e) => Error::Io(io::Error::new(e.kind(), e.to_string())),
        None => Error::Handshake(err.to_string()),
    }
}

/// Host names must be non-empty ASCII without NUL; IDNA encoding is the caller's job.
pub(crate) fn check_hostname(hostname: &str) -> Result<(), Error> {
    if hostname.is_empty() || !hostname.is_ascii() || hostname.contains('\0') {
        return Err(Error::InvalidHostname(hostname.to_owned()));
    }
    Ok(())
}
