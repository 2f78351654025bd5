//! Throwaway PKI, a local TLS server and a scripted evaluator for tests.

use crate::client::TrustContext;
use crate::error::Error;
use crate::native_certs::TrustEvaluator;
use crate::util;
use boring::ssl::{SslAcceptor, SslContextBuilder, SslMethod, SslOptions, SslVerifyMode};
use boring::x509::X509;
use parking_lot::Mutex;
use rcgen::{BasicConstraints, Certificate, CertificateParams, DnType, IsCa};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use truststore_common::{CertificateChain, ClientBuilder, TrustVerdict};

/// A private root and one leaf it signed.
pub(crate) struct TestPki {
    pub ca_pem: String,
    pub cert_pem: String,
    pub key_pem: String,
}

impl TestPki {
    pub fn new(names: &[&str]) -> Self {
        let mut ca_params = CertificateParams::new(Vec::new());
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params
            .distinguished_name
            .push(DnType::CommonName, "truststore test root");
        let ca = Certificate::from_params(ca_params).unwrap();

        let mut params =
            CertificateParams::new(names.iter().map(|n| n.to_string()).collect::<Vec<_>>());
        params
            .distinguished_name
            .push(DnType::CommonName, names.first().copied().unwrap_or("leaf"));
        let leaf = Certificate::from_params(params).unwrap();

        TestPki {
            ca_pem: ca.serialize_pem().unwrap(),
            cert_pem: leaf.serialize_pem_with_signer(&ca).unwrap(),
            key_pem: leaf.serialize_private_key_pem(),
        }
    }

    /// The root as a PEM bundle on disk.
    pub fn ca_bundle(&self) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(self.ca_pem.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    pub fn leaf_der(&self) -> Vec<u8> {
        X509::from_pem(self.cert_pem.as_bytes())
            .unwrap()
            .to_der()
            .unwrap()
    }

    pub fn ca_der(&self) -> Vec<u8> {
        X509::from_pem(self.ca_pem.as_bytes())
            .unwrap()
            .to_der()
            .unwrap()
    }
}

/// Serves `connections` TLS connections on 127.0.0.1, presenting leaf + root.
/// Each connection answers "ping" with "pong".
pub(crate) fn spawn_server(pki: &TestPki, connections: usize) -> SocketAddr {
    let mut builder = SslAcceptor::mozilla_modern(SslMethod::tls_server()).unwrap();
    builder.clear_options(SslOptions::NO_TLSV1_3);
    builder.set_verify(SslVerifyMode::NONE);
    let mut certs = util::parse_certs(pki.cert_pem.as_bytes()).unwrap();
    builder
        .set_certificate(&certs.pop_front().unwrap())
        .unwrap();
    builder
        .add_extra_chain_cert(X509::from_pem(pki.ca_pem.as_bytes()).unwrap())
        .unwrap();
    builder
        .set_private_key(&util::parse_keys(pki.key_pem.as_bytes()).unwrap())
        .unwrap();
    let acceptor = builder.build();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        for stream in listener.incoming().take(connections) {
            let stream = match stream {
                Ok(stream) => stream,
                Err(_) => continue,
            };
            let acceptor = acceptor.clone();
            thread::spawn(move || serve(&acceptor, stream));
        }
    });
    addr
}

fn serve(acceptor: &SslAcceptor, stream: TcpStream) {
    let mut tls = match acceptor.accept(stream) {
        Ok(tls) => tls,
        Err(_) => return,
    };
    let mut buf = [0u8; 4];
    if tls.read_exact(&mut buf).is_ok() && &buf == b"ping" {
        let _ = tls.write_all(b"pong");
    }
    let _ = tls.shutdown();
}

#[derive(Debug)]
pub(crate) enum Answer {
    Verdict(TrustVerdict),
    Internal(&'static str),
}

/// Answers every evaluation the same way and records what it was asked.
#[derive(Debug)]
pub(crate) struct ScriptedEvaluator {
    answer: Answer,
    seen: Mutex<Vec<(CertificateChain, Option<String>)>>,
}

impl ScriptedEvaluator {
    pub fn new(answer: Answer) -> Arc<Self> {
        Arc::new(ScriptedEvaluator {
            answer,
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn trusting() -> Arc<Self> {
        Self::new(Answer::Verdict(TrustVerdict::Trusted))
    }

    pub fn seen(&self) -> Vec<(CertificateChain, Option<String>)> {
        self.seen.lock().clone()
    }
}

impl TrustEvaluator for ScriptedEvaluator {
    fn configure(&self, builder: &mut SslContextBuilder) -> Result<(), Error> {
        builder.set_verify(SslVerifyMode::NONE);
        Ok(())
    }

    fn engine_verification(&self) -> bool {
        false
    }

    fn evaluate(
        &self,
        chain: &CertificateChain,
        hostname: Option<&str>,
    ) -> Result<TrustVerdict, Error> {
        self.seen
            .lock()
            .push((chain.clone(), hostname.map(str::to_owned)));
        match &self.answer {
            Answer::Verdict(verdict) => Ok(verdict.clone()),
            Answer::Internal(message) => Err(Error::InternalEvaluation((*message).to_owned())),
        }
    }
}

pub(crate) fn context_with(evaluator: Arc<dyn TrustEvaluator>) -> TrustContext {
    let mut builder = TrustContext::builder();
    builder.set_evaluator(evaluator);
    builder.build().unwrap()
}
