//! TLS client contexts whose certificate trust decisions come from the
//! operating system.
//!
//! BoringSSL performs the handshake on every platform:
//! * macOS/iOS: BoringSSL's verifier is switched off and the peer chain is
//!   judged by `SecTrustEvaluateWithError` against the system anchors.
//! * Linux/BSD/Android: BoringSSL verifies the chain itself against the CA
//!   bundle the distribution ships (`SSL_CERT_FILE` / `SSL_CERT_DIR` override
//!   the lookup).
//! * Windows: not supported; building a context fails.
//!
//! ```no_run
//! use std::io::{Read, Write};
//! use std::net::TcpStream;
//!
//! let context = truststore::TrustContext::new()?;
//! let stream = TcpStream::connect("example.com:443")?;
//! let mut session = context.wrap_socket(stream, Some("example.com"))?;
//! session.write_all(b"GET / HTTP/1.0\r\nHost: example.com\r\n\r\n")?;
//! let mut response = Vec::new();
//! session.read_to_end(&mut response)?;
//! # Ok::<(), truststore::Error>(())
//! ```

pub use truststore_common::{read_bs, CertificateChain, ClientBuilder, TlsVersion, TrustVerdict};

pub use truststore_boring::*;
