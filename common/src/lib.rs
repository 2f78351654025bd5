pub mod chain;

pub use chain::{CertificateChain, TrustVerdict};

use bytes::Bytes;
use std::io;

fn path_as_bytes(path: &str) -> Option<&[u8]> {
    if path.starts_with("-----") {
        return Some(path.as_bytes());
    }
    if path.starts_with("blob:") {
        return Some(&path.as_bytes()["blob:".len()..]);
    }
    None
}

/// Reads a PEM blob, either inline (`-----BEGIN ...`, `blob:...`) or from a file.
pub fn read_bs<S: AsRef<str>>(path: S) -> io::Result<Bytes> {
    use io::Read;
    if let Some(bs) = path_as_bytes(path.as_ref()) {
        return Ok(Bytes::copy_from_slice(bs));
    }
    let mut file = std::fs::File::open(std::path::Path::new(path.as_ref()))?;
    let mut content = Vec::new();
    let n = file.read_to_end(&mut content)?;
    content.truncate(n);
    tracing::trace!(path = path.as_ref(), len = n, "read pem file");
    Ok(Bytes::from(content))
}

/// Encodes protocol names into the ALPN wire format, e.g. `b"\x02h2\x08http/1.1"`.
pub fn alpn_wire_format(alpn: &[String]) -> Vec<u8> {
    alpn.iter()
        .filter(|a| !a.is_empty() && a.len() <= u8::MAX as usize)
        .map(|a| [&[a.len() as u8], a.as_bytes()].concat())
        .collect::<Vec<Vec<u8>>>()
        .concat()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    Tls10,
    Tls11,
    Tls12,
    Tls13,
}

/// Client-side configuration shared by every engine backend.
///
/// Certificate verification cannot be turned off: a context built from this
/// trait always checks the peer against the system trust store.
pub trait ClientBuilder<Out> {
    type Error: From<io::Error>;

    fn set_session_ticket(&mut self, enable: bool) -> &mut Self;
    fn set_use_sni(&mut self, enable: bool) -> &mut Self;
    fn set_alpn(&mut self, alpn: Vec<String>) -> &mut Self;
    fn set_min_version(&mut self, version: Option<TlsVersion>) -> &mut Self;
    fn set_max_version(&mut self, version: Option<TlsVersion>) -> &mut Self;

    /// Set client certificate and private key
    fn set_identity<C: Into<Bytes>, K: Into<Bytes>>(&mut self, cert: C, key: K) -> &mut Self;

    fn set_identity_path<S: AsRef<str>, S2: AsRef<str>>(
        &mut self,
        cert: S,
        key: S2,
    ) -> io::Result<()> {
        let cert = read_bs(cert)?;
        let key = read_bs(key)?;
        self.set_identity(cert, key);
        Ok(())
    }

    fn build(self) -> Result<Out, Self::Error>;
}
