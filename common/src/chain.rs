use bytes::Bytes;
use std::fmt;

/// DER-encoded certificates presented by a peer, leaf first.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CertificateChain {
    certs: Vec<Bytes>,
}

impl CertificateChain {
    pub fn new(certs: Vec<Bytes>) -> Self {
        Self { certs }
    }

    pub fn leaf(&self) -> Option<&[u8]> {
        self.certs.first().map(|c| &c[..])
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.certs.iter().map(|c| &c[..])
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }
}

impl FromIterator<Bytes> for CertificateChain {
    fn from_iter<I: IntoIterator<Item = Bytes>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl fmt::Debug for CertificateChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.certs.iter().map(|c| c.len()))
            .finish()
    }
}

/// Outcome of a trust evaluation.
///
/// `code` and `message` are only filled in when the evaluator can say why a
/// chain was rejected; `None` means "untrusted, no further detail".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustVerdict {
    Trusted,
    Untrusted {
        code: Option<i64>,
        message: Option<String>,
    },
}

impl TrustVerdict {
    pub fn untrusted<S: Into<String>>(code: Option<i64>, message: Option<S>) -> Self {
        TrustVerdict::Untrusted {
            code,
            message: message.map(Into::into),
        }
    }

    pub fn is_trusted(&self) -> bool {
        matches!(self, TrustVerdict::Trusted)
    }
}
