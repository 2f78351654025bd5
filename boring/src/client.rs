use super::util;
use crate::buffers::{MemoryBio, SecureObject};
use crate::error::Error;
use crate::native_certs::{self, TrustEvaluator};
use crate::verify;
use boring::ssl::{
    ConnectConfiguration, SslConnector, SslMethod, SslOptions, SslSignatureAlgorithm,
};
use bytes::Bytes;
use std::fmt;
use std::io::{self, Read, Write};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use truststore_common::{alpn_wire_format, CertificateChain, ClientBuilder, TlsVersion};

pub struct TrustContextBuilder {
    alpn: Vec<String>,
    enable_session_ticket: bool,
    enable_sni: bool,
    min_version: Option<TlsVersion>,
    max_version: Option<TlsVersion>,
    identity: Option<(Bytes, Bytes)>,
    evaluator: Option<Arc<dyn TrustEvaluator>>,
}

impl TrustContextBuilder {
    pub fn new() -> Self {
        Self {
            alpn: vec![],
            enable_session_ticket: true,
            enable_sni: true,
            min_version: Some(TlsVersion::Tls12),
            max_version: None,
            identity: None,
            evaluator: None,
        }
    }

    /// Use `evaluator` instead of the one for the current platform.
    pub fn set_evaluator(&mut self, evaluator: Arc<dyn TrustEvaluator>) -> &mut Self {
        self.evaluator = Some(evaluator);
        self
    }
}

impl Default for TrustContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder<TrustContext> for TrustContextBuilder {
    type Error = Error;

    fn set_session_ticket(&mut self, enable: bool) -> &mut Self {
        self.enable_session_ticket = enable;
        self
    }

    fn set_use_sni(&mut self, enable: bool) -> &mut Self {
        self.enable_sni = enable;
        self
    }

    fn set_alpn(&mut self, alpn: Vec<String>) -> &mut Self {
        self.alpn = alpn;
        self
    }

    fn set_min_version(&mut self, version: Option<TlsVersion>) -> &mut Self {
        self.min_version = version;
        self
    }

    fn set_max_version(&mut self, version: Option<TlsVersion>) -> &mut Self {
        self.max_version = version;
        self
    }

    fn set_identity<C: Into<Bytes>, K: Into<Bytes>>(&mut self, cert: C, key: K) -> &mut Self {
        self.identity = Some((cert.into(), key.into()));
        self
    }

    fn build(self) -> Result<TrustContext, Error> {
        let evaluator = match self.evaluator {
            Some(evaluator) => evaluator,
            None => native_certs::platform_evaluator()?,
        };

        let mut builder = SslConnector::builder(SslMethod::tls())?;

        // Cipher List
        // Doc: https://www.openssl.org/docs/manmaster/man1/openssl-ciphers.html
        builder.set_cipher_list("ALL:!aPSK:!ECDSA+SHA1:!3DES")?;

        // Set Algorithm
        builder.set_verify_algorithm_prefs(&[
            SslSignatureAlgorithm::ECDSA_SECP256R1_SHA256,
            SslSignatureAlgorithm::RSA_PSS_RSAE_SHA256,
            SslSignatureAlgorithm::RSA_PKCS1_SHA256,
            SslSignatureAlgorithm::ECDSA_SECP384R1_SHA384,
            SslSignatureAlgorithm::RSA_PSS_RSAE_SHA384,
            SslSignatureAlgorithm::RSA_PKCS1_SHA384,
            SslSignatureAlgorithm::RSA_PSS_RSAE_SHA512,
            SslSignatureAlgorithm::RSA_PKCS1_SHA512,
        ])?;

        builder.set_min_proto_version(self.min_version.map(util::ssl_version))?;
        builder.set_max_proto_version(self.max_version.map(util::ssl_version))?;
        // Enable GREASE
        builder.set_grease_enabled(true);

        // 1. Trust: engine verifier on or off, CA bundle
        evaluator.configure(&mut builder)?;

        // 2. ALPN, b"\x02h2\x08http/1.1"
        let alpn = alpn_wire_format(&self.alpn);
        if !alpn.is_empty() {
            builder.set_alpn_protos(&alpn)?;
        }

        // 3. Session Ticket
        if !self.enable_session_ticket {
            builder.set_options(SslOptions::NO_TICKET);
        }

        // 4. Client certificate
        if let Some((cert, key)) = self.identity {
            let mut certs = util::parse_certs(&cert)?;
            let key = util::parse_keys(&key)?;
            if let Some(leaf) = certs.pop_front() {
                builder.set_certificate(leaf.as_ref())?;
            }
            while let Some(chain) = certs.pop_front() {
                builder.add_extra_chain_cert(chain)?;
            }
            builder.set_private_key(key.as_ref())?;
        }

        tracing::info!(
            ?evaluator,
            engine_verification = evaluator.engine_verification(),
            "trust context ready"
        );

        Ok(TrustContext {
            connector: builder.build(),
            evaluator,
            use_sni: self.enable_sni,
        })
    }
}

/// A TLS client configuration whose trust decisions come from the operating
/// system.
///
/// Cheap to clone and safe to share: concurrent handshakes need no locking.
#[derive(Clone)]
pub struct TrustContext {
    connector: SslConnector,
    evaluator: Arc<dyn TrustEvaluator>,
    use_sni: bool,
}

impl TrustContext {
    /// A context with default settings and the platform evaluator.
    pub fn new() -> Result<Self, Error> {
        TrustContextBuilder::new().build()
    }

    pub fn builder() -> TrustContextBuilder {
        TrustContextBuilder::new()
    }

    pub fn evaluator(&self) -> &dyn TrustEvaluator {
        &*self.evaluator
    }

    fn configure(&self, hostname: Option<&str>) -> Result<ConnectConfiguration, Error> {
        if let Some(hostname) = hostname {
            verify::check_hostname(hostname)?;
        }
        let mut configuration = self.connector.configure()?;
        configuration.set_use_server_name_indication(self.use_sni && hostname.is_some());
        configuration
            .set_verify_hostname(self.evaluator.engine_verification() && hostname.is_some());
        Ok(configuration)
    }

    /// Blocking client handshake over `stream`, then the trust check.
    pub fn wrap_socket<S>(
        &self,
        stream: S,
        hostname: Option<&str>,
    ) -> Result<SecureSession<S>, Error>
    where
        S: Read + Write,
    {
        let configuration = self.configure(hostname)?;
        let mut stream = configuration
            .connect(hostname.unwrap_or_default(), stream)
            .map_err(|e| verify::handshake_error(e, self.evaluator.engine_verification()))?;

        if let Err(err) = verify::verify_peer(&*self.evaluator, stream.ssl(), hostname) {
            tracing::debug!(%err, ?hostname, "closing untrusted session");
            let _ = stream.shutdown();
            return Err(err);
        }
        Ok(SecureSession { inner: stream })
    }

    /// Starts a handshake over a pair of memory pipes. The ClientHello is
    /// waiting in `outgoing` when this returns; drive the rest with
    /// [`SecureObject::do_handshake`].
    pub fn wrap_buffers(
        &self,
        incoming: MemoryBio,
        outgoing: MemoryBio,
        hostname: Option<&str>,
    ) -> Result<SecureObject, Error> {
        let configuration = self.configure(hostname)?;
        SecureObject::connect(
            configuration,
            incoming,
            outgoing,
            hostname,
            self.evaluator.clone(),
        )
    }

    pub async fn connect<IO>(
        &self,
        stream: IO,
        hostname: Option<&str>,
    ) -> Result<TlsStream<IO>, Error>
    where
        IO: AsyncRead + AsyncWrite + Unpin,
    {
        let configuration = self.configure(hostname)?;
        let engine_verifies = self.evaluator.engine_verification();
        let mut tls_stream =
            tokio_boring::connect(configuration, hostname.unwrap_or_default(), stream)
                .await
                .map_err(|e| verify::async_handshake_error(e, engine_verifies))?;

        if let Err(err) = verify::verify_peer(&*self.evaluator, tls_stream.ssl(), hostname) {
            tracing::debug!(%err, ?hostname, "closing untrusted session");
            let _ = tls_stream.shutdown().await;
            return Err(err);
        }
        Ok(TlsStream { inner: tls_stream })
    }
}

impl fmt::Debug for TrustContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustContext")
            .field("evaluator", &self.evaluator)
            .field("use_sni", &self.use_sni)
            .finish()
    }
}

/// A blocking session that passed the trust check.
pub struct SecureSession<S> {
    inner: boring::ssl::SslStream<S>,
}

impl<S> SecureSession<S> {
    pub fn alpn_protocol(&self) -> Option<&[u8]> {
        self.inner.ssl().selected_alpn_protocol()
    }

    pub fn version(&self) -> &'static str {
        self.inner.ssl().version_str()
    }

    pub fn peer_chain(&self) -> Result<CertificateChain, Error> {
        verify::peer_chain(self.inner.ssl())
    }

    pub fn get_ref(&self) -> &S {
        self.inner.get_ref()
    }

    pub fn get_mut(&mut self) -> &mut S {
        self.inner.get_mut()
    }
}

impl<S: Read + Write> SecureSession<S> {
    /// Sends close_notify.
    pub fn shutdown(&mut self) -> io::Result<()> {
        self.inner.shutdown().map(|_| ()).map_err(|e| {
            e.into_io_error()
                .unwrap_or_else(|e| io::Error::new(io::ErrorKind::Other, e))
        })
    }
}

impl<S: Read + Write> Read for SecureSession<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<S: Read + Write> Write for SecureSession<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<S: fmt::Debug> fmt::Debug for SecureSession<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureSession")
            .field("stream", self.inner.get_ref())
            .field("version", &self.version())
            .finish()
    }
}

pub struct TlsStream<IO> {
    inner: tokio_boring::SslStream<IO>,
}

impl<IO> TlsStream<IO> {
    pub fn alpn_protocol(&self) -> Option<&[u8]> {
        self.inner.ssl().selected_alpn_protocol()
    }

    pub fn version(&self) -> &'static str {
        self.inner.ssl().version_str()
    }

    pub fn peer_chain(&self) -> Result<CertificateChain, Error> {
        verify::peer_chain(self.inner.ssl())
    }

    #[inline]
    pub fn get_ref(&self) -> &IO {
        self.inner.get_ref()
    }

    #[inline]
    pub fn get_mut(&mut self) -> &mut IO {
        self.inner.get_mut()
    }
}

impl<IO> AsyncWrite for TlsStream<IO>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, io::Error>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<Result<usize, io::Error>> {
        Pin::new(&mut self.get_mut().inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }
}

impl<IO> AsyncRead for TlsStream<IO>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}
