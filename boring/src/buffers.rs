//! Memory-buffer driven sessions, for callers that run their own I/O loop.

use crate::error::Error;
use crate::native_certs::TrustEvaluator;
use crate::verify;
use boring::ssl::{ConnectConfiguration, HandshakeError, MidHandshakeSslStream, SslStream};
use bytes::{Buf, Bytes, BytesMut};
use parking_lot::Mutex;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::{cmp, fmt, mem};
use truststore_common::CertificateChain;

#[derive(Debug, Default)]
struct Pipe {
    buf: BytesMut,
    eof: bool,
}

/// A byte pipe shared between a [`SecureObject`] and the caller's I/O loop.
///
/// Clones refer to the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryBio {
    inner: Arc<Mutex<Pipe>>,
}

impl MemoryBio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `data`. Fails once [`write_eof`](Self::write_eof) was called.
    pub fn write(&self, data: &[u8]) -> io::Result<usize> {
        let mut pipe = self.inner.lock();
        if pipe.eof {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "cannot write to a MemoryBio after EOF",
            ));
        }
        pipe.buf.extend_from_slice(data);
        Ok(data.len())
    }

    /// Takes up to `max` bytes.
    pub fn read(&self, max: usize) -> Bytes {
        let mut pipe = self.inner.lock();
        let n = cmp::min(max, pipe.buf.len());
        pipe.buf.split_to(n).freeze()
    }

    pub fn read_all(&self) -> Bytes {
        self.inner.lock().buf.split().freeze()
    }

    pub fn pending(&self) -> usize {
        self.inner.lock().buf.len()
    }

    /// Marks the end of the stream; readers see EOF once the buffer drains.
    pub fn write_eof(&self) {
        self.inner.lock().eof = true;
    }

    /// True once EOF was written and everything before it was read.
    pub fn eof(&self) -> bool {
        let pipe = self.inner.lock();
        pipe.eof && pipe.buf.is_empty()
    }
}

/// The engine's view of the two pipes: reads drain `incoming`, writes fill
/// `outgoing`.
#[derive(Debug)]
struct BioStream {
    incoming: MemoryBio,
    outgoing: MemoryBio,
}

impl Read for BioStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut pipe = self.incoming.inner.lock();
        if pipe.buf.is_empty() {
            return if pipe.eof {
                Ok(0)
            } else {
                Err(io::ErrorKind::WouldBlock.into())
            };
        }
        let n = cmp::min(buf.len(), pipe.buf.len());
        buf[..n].copy_from_slice(&pipe.buf[..n]);
        pipe.buf.advance(n);
        Ok(n)
    }
}

impl Write for BioStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.outgoing.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStatus {
    Complete,
    /// More bytes from the peer are needed in the incoming pipe.
    WantRead,
}

enum State {
    Handshaking(MidHandshakeSslStream<BioStream>),
    Established(SslStream<BioStream>),
    Failed,
}

/// A client session over two [`MemoryBio`]s.
///
/// Application data can only be read or written once
/// [`do_handshake`](Self::do_handshake) has returned
/// [`HandshakeStatus::Complete`], which implies the peer passed the trust
/// check.
pub struct SecureObject {
    state: State,
    evaluator: Arc<dyn TrustEvaluator>,
    hostname: Option<String>,
}

impl SecureObject {
    pub(crate) fn connect(
        configuration: ConnectConfiguration,
        incoming: MemoryBio,
        outgoing: MemoryBio,
        hostname: Option<&str>,
        evaluator: Arc<dyn TrustEvaluator>,
    ) -> Result<Self, Error> {
        let stream = BioStream { incoming, outgoing };
        let mut object = SecureObject {
            state: State::Failed,
            evaluator,
            hostname: hostname.map(str::to_owned),
        };
        match configuration.connect(hostname.unwrap_or_default(), stream) {
            Ok(stream) => object.established(stream)?,
            Err(HandshakeError::WouldBlock(mid)) => object.state = State::Handshaking(mid),
            Err(e) => {
                return Err(verify::handshake_error(
                    e,
                    object.evaluator.engine_verification(),
                ))
            }
        }
        Ok(object)
    }

    fn established(&mut self, mut stream: SslStream<BioStream>) -> Result<(), Error> {
        if let Err(err) =
            verify::verify_peer(&*self.evaluator, stream.ssl(), self.hostname.as_deref())
        {
            tracing::debug!(%err, hostname = ?self.hostname, "closing untrusted session");
            // queues close_notify in the outgoing pipe
            let _ = stream.shutdown();
            return Err(err);
        }
        self.state = State::Established(stream);
        Ok(())
    }

    /// Advances the handshake with whatever is in the incoming pipe.
    ///
    /// Any bytes the engine produced (including alerts on failure) are left in
    /// the outgoing pipe for the caller to send. After an error the object is
    /// unusable.
    pub fn do_handshake(&mut self) -> Result<HandshakeStatus, Error> {
        match mem::replace(&mut self.state, State::Failed) {
            State::Handshaking(mid) => match mid.handshake() {
                Ok(stream) => {
                    self.established(stream)?;
                    Ok(HandshakeStatus::Complete)
                }
                Err(HandshakeError::WouldBlock(mid)) => {
                    self.state = State::Handshaking(mid);
                    Ok(HandshakeStatus::WantRead)
                }
                Err(e) => Err(verify::handshake_error(
                    e,
                    self.evaluator.engine_verification(),
                )),
            },
            State::Established(stream) => {
                self.state = State::Established(stream);
                Ok(HandshakeStatus::Complete)
            }
            State::Failed => Err(not_connected().into()),
        }
    }

    pub fn is_established(&self) -> bool {
        matches!(self.state, State::Established(_))
    }

    fn stream(&self) -> io::Result<&SslStream<BioStream>> {
        match &self.state {
            State::Established(stream) => Ok(stream),
            _ => Err(not_connected()),
        }
    }

    fn stream_mut(&mut self) -> io::Result<&mut SslStream<BioStream>> {
        match &mut self.state {
            State::Established(stream) => Ok(stream),
            _ => Err(not_connected()),
        }
    }

    /// Queues close_notify in the outgoing pipe.
    pub fn shutdown(&mut self) -> Result<(), Error> {
        let stream = self.stream_mut()?;
        match stream.shutdown() {
            Ok(_) => Ok(()),
            Err(e) => match e.into_io_error() {
                Ok(io) if io.kind() == io::ErrorKind::WouldBlock => Ok(()),
                Ok(io) => Err(Error::Io(io)),
                Err(e) => Err(Error::Handshake(e.to_string())),
            },
        }
    }

    pub fn alpn_protocol(&self) -> Option<&[u8]> {
        self.stream().ok()?.ssl().selected_alpn_protocol()
    }

    pub fn version(&self) -> Option<&'static str> {
        self.stream().ok().map(|s| s.ssl().version_str())
    }

    pub fn peer_chain(&self) -> Result<CertificateChain, Error> {
        verify::peer_chain(self.stream()?.ssl())
    }
}

fn not_connected() -> io::Error {
    io::Error::new(
        io::ErrorKind::NotConnected,
        "tls session is not established",
    )
}

impl Read for SecureObject {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream_mut()?.read(buf)
    }
}

impl Write for SecureObject {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream_mut()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream_mut()?.flush()
    }
}

impl fmt::Debug for SecureObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            State::Handshaking(_) => "handshaking",
            State::Established(_) => "established",
            State::Failed => "failed",
        };
        f.debug_struct("SecureObject")
            .field("state", &state)
            .field("hostname", &self.hostname)
            .finish()
    }
}
