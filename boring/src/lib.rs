mod util;
mod verify;
pub mod buffers;
pub mod client;
pub mod error;
pub mod native_certs;
#[cfg(test)]
mod test_support;

pub use buffers::{HandshakeStatus, MemoryBio, SecureObject};
pub use client::{SecureSession, TlsStream, TrustContext, TrustContextBuilder};
pub use error::Error;
pub use native_certs::{platform_evaluator, TrustEvaluator};
pub use verify::peer_chain;
