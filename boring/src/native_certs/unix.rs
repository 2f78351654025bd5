use super::TrustEvaluator;
use crate::error::Error;
use crate::util;
use boring::ssl::{SslContextBuilder, SslVerifyMode};
use std::path::PathBuf;
use truststore_common::{CertificateChain, TrustVerdict};

/// Well-known CA bundle files, in lookup order.
pub const CA_FILES: [&str; 13] = [
    // Debian/Ubuntu/Gentoo etc.
    "/etc/ssl/certs/ca-certificates.crt",
    // Fedora/RHEL
    "/etc/pki/tls/certs/ca-bundle.crt",
    // OpenSUSE
    "/etc/ssl/ca-bundle.pem",
    // OpenELEC
    "/etc/pki/tls/cacert.pem",
    // CentOS/RHEL 7
    "/etc/pki/ca-trust/extracted/pem/tls-ca-bundle.pem",
    // Alpine Linux
    "/etc/ssl/cert.pem",
    // FreeBSD
    "/usr/local/etc/ssl/cert.pem",
    // OpenBSD
    "/etc/ssl/cert.pem",
    // DragonFly
    "/usr/local/share/certs/ca-root-nss.crt",
    // NetBSD
    "/etc/openssl/certs/ca-certificates.crt",
    // Solaris 11.2+
    "/etc/certs/ca-certificates.crt",
    // Joyent SmartOS
    "/etc/ssl/certs/ca-certificates.crt",
    // OmniOS
    "/etc/ssl/cacert.pem",
];

/// Hashed certificate directories, tried only when no bundle file exists.
pub const CA_DIRS: [&str; 6] = [
    // SLES10/SLES11
    "/etc/ssl/certs",
    // Fedora/RHEL
    "/etc/pki/tls/certs",
    // Android
    "/system/etc/security/cacerts",
    // FreeBSD
    "/usr/local/share/certs",
    // NetBSD
    "/etc/openssl/certs",
    // illumos
    "/etc/certs/CA",
];

// CERT_FILE_ENV is the environment variable which identifies where to locate
// the SSL certificate file. If set this overrides the system default.
const CERT_FILE_ENV: &str = "SSL_CERT_FILE";

// CERT_DIR_ENV is the environment variable which identifies which directory
// to check for SSL certificate files. If set this overrides the system default.
// It is a colon separated list of directories.
const CERT_DIR_ENV: &str = "SSL_CERT_DIR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaBundle {
    File(PathBuf),
    Dir(PathBuf),
}

/// Candidate CA locations, searched file-first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaLocations {
    files: Vec<PathBuf>,
    dirs: Vec<PathBuf>,
}

impl CaLocations {
    pub fn new<F, D>(files: F, dirs: D) -> Self
    where
        F: IntoIterator,
        F::Item: Into<PathBuf>,
        D: IntoIterator,
        D::Item: Into<PathBuf>,
    {
        Self {
            files: files.into_iter().map(Into::into).collect(),
            dirs: dirs.into_iter().map(Into::into).collect(),
        }
    }

    /// The built-in lists, overridden by `SSL_CERT_FILE` / `SSL_CERT_DIR`.
    pub fn system() -> Self {
        Self::with_overrides(
            std::env::var(CERT_FILE_ENV).ok(),
            std::env::var(CERT_DIR_ENV).ok(),
        )
    }

    fn with_overrides(file: Option<String>, dir: Option<String>) -> Self {
        let files = match file {
            Some(path) if !path.is_empty() => vec![PathBuf::from(path)],
            _ => CA_FILES.iter().map(PathBuf::from).collect(),
        };
        // OpenSSL and BoringSSL both use ":" as the SSL_CERT_DIR separator.
        let dirs = match dir {
            Some(paths) if !paths.is_empty() => paths
                .split(':')
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .collect(),
            _ => CA_DIRS.iter().map(PathBuf::from).collect(),
        };
        Self { files, dirs }
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// First existing file, else first existing directory.
    pub fn discover(&self) -> Option<CaBundle> {
        self.files
            .iter()
            .find(|p| p.is_file())
            .map(|p| CaBundle::File(p.clone()))
            .or_else(|| {
                self.dirs
                    .iter()
                    .find(|p| p.is_dir())
                    .map(|p| CaBundle::Dir(p.clone()))
            })
    }
}

/// Lets the engine verify the chain against OS-supplied roots.
#[derive(Debug, Clone)]
pub struct DelegatedEvaluator {
    locations: CaLocations,
}

impl DelegatedEvaluator {
    pub fn new(locations: CaLocations) -> Self {
        Self { locations }
    }

    pub fn locations(&self) -> &CaLocations {
        &self.locations
    }
}

impl TrustEvaluator for DelegatedEvaluator {
    fn configure(&self, builder: &mut SslContextBuilder) -> Result<(), Error> {
        match self.locations.discover() {
            Some(CaBundle::File(path)) => {
                builder.set_ca_file(&path)?;
                tracing::info!(path = %path.display(), "loaded CA file");
            }
            Some(CaBundle::Dir(path)) => {
                util::load_verify_dir(builder, &path)?;
                tracing::info!(path = %path.display(), "loaded CA directory");
            }
            // SslConnector::builder already installed the default verify paths.
            None => tracing::warn!("no CA bundle found, using the engine's default verify paths"),
        }
        builder.set_verify(SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT);
        Ok(())
    }

    fn engine_verification(&self) -> bool {
        true
    }

    fn evaluate(
        &self,
        chain: &CertificateChain,
        _hostname: Option<&str>,
    ) -> Result<TrustVerdict, Error> {
        if chain.is_empty() {
            return Ok(TrustVerdict::untrusted(
                None,
                Some("x509: empty certificate chain"),
            ));
        }
        Ok(TrustVerdict::Trusted)
    }
}
