//! Platform trust evaluation.
//!
//! On macOS and iOS the peer chain is judged by `SecTrustEvaluateWithError`
//! against the system anchors, with BoringSSL's own verifier switched off.
//! Elsewhere BoringSSL verifies the chain itself, seeded with the CA bundle
//! the distribution ships (see [`CaLocations`]).

mod cf;
#[cfg(test)]
pub(crate) mod counting;
#[cfg(any(target_os = "macos", target_os = "ios"))]
mod darwin;
mod sec_trust;
mod unix;

pub use cf::{CFIndex, CFTypeRef, OSStatus, SecurityApi};
#[cfg(any(target_os = "macos", target_os = "ios"))]
pub use darwin::SystemSecurity;
pub use sec_trust::SecTrustEvaluator;
pub use unix::{CaBundle, CaLocations, DelegatedEvaluator, CA_DIRS, CA_FILES};

use crate::error::Error;
use boring::ssl::SslContextBuilder;
use std::fmt;
use std::sync::Arc;
use truststore_common::{CertificateChain, TrustVerdict};

/// Decides whether a peer chain is trusted.
pub trait TrustEvaluator: Send + Sync + fmt::Debug {
    /// Applied once to the engine context before any handshake.
    fn configure(&self, builder: &mut SslContextBuilder) -> Result<(), Error>;

    /// Whether the engine's verifier is still active under this evaluator.
    /// When it is, engine verify failures are reported as
    /// [`Error::CertificateVerification`] and hostname checking is left to
    /// the engine.
    fn engine_verification(&self) -> bool;

    fn evaluate(
        &self,
        chain: &CertificateChain,
        hostname: Option<&str>,
    ) -> Result<TrustVerdict, Error>;
}

/// The evaluator for the platform this crate was compiled for.
pub fn platform_evaluator() -> Result<Arc<dyn TrustEvaluator>, Error> {
    cfg_if::cfg_if! {
        if #[cfg(any(target_os = "macos", target_os = "ios"))] {
            Ok(Arc::new(SecTrustEvaluator::new(SystemSecurity)))
        } else if #[cfg(windows)] {
            Err(Error::UnsupportedPlatform("windows"))
        } else {
            Ok(Arc::new(DelegatedEvaluator::new(CaLocations::system())))
        }
    }
}
