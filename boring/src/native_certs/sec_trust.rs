use super::cf::{
    CFData, CFMutableArray, CFString, Evaluation, Owned, SecCertificate, SecPolicy, SecTrust,
    SecurityApi,
};
use super::TrustEvaluator;
use crate::error::Error;
use crate::verify::check_hostname;
use boring::ssl::{SslContextBuilder, SslVerifyMode};
use std::fmt;
use truststore_common::{CertificateChain, TrustVerdict};

/// Hands the peer chain to `SecTrustEvaluateWithError`, anchored in the
/// system trust store only.
///
/// All native objects are local to one [`evaluate`](TrustEvaluator::evaluate)
/// call, so a single evaluator can serve any number of threads.
pub struct SecTrustEvaluator<A> {
    api: A,
}

impl<A: SecurityApi> SecTrustEvaluator<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    #[cfg(test)]
    pub(crate) fn api(&self) -> &A {
        &self.api
    }

    fn evaluate_chain(
        &self,
        chain: &CertificateChain,
        hostname: Option<&str>,
    ) -> Result<TrustVerdict, Error> {
        let api = &self.api;
        if chain.is_empty() {
            return Ok(TrustVerdict::untrusted(
                None,
                Some("x509: empty certificate chain"),
            ));
        }

        let policy = ssl_policy(api, hostname)?;
        let trust = {
            let mut certificates = Owned::<A, CFMutableArray>::new(api)?;
            for (index, der) in chain.iter().enumerate() {
                let data = Owned::<A, CFData>::from_bytes(api, der)?;
                match Owned::<A, SecCertificate>::from_der_data(api, &data) {
                    Some(certificate) => certificates.push(&certificate),
                    None => {
                        return Ok(TrustVerdict::untrusted(
                            None,
                            Some(format!(
                                "x509: certificate {} in chain could not be decoded",
                                index
                            )),
                        ))
                    }
                }
            }
            Owned::<A, SecTrust>::with_certificates(api, &certificates, &policy)?
        };
        drop(policy);

        trust.use_system_anchors()?;
        let verdict = match trust.evaluate()? {
            Evaluation::Trusted => TrustVerdict::Trusted,
            Evaluation::Untrusted(None) => TrustVerdict::untrusted::<String>(None, None),
            Evaluation::Untrusted(Some(error)) => TrustVerdict::Untrusted {
                code: Some(error.code() as i64),
                message: error.description(),
            },
        };
        Ok(verdict)
    }
}

fn ssl_policy<'a, A: SecurityApi>(
    api: &'a A,
    hostname: Option<&str>,
) -> Result<Owned<'a, A, SecPolicy>, Error> {
    match hostname {
        Some(hostname) => {
            check_hostname(hostname)?;
            let name = Owned::<A, CFString>::new(api, hostname)?;
            Owned::<A, SecPolicy>::ssl_server(api, Some(&name))
        }
        None => Owned::<A, SecPolicy>::ssl_server(api, None),
    }
}

impl<A> fmt::Debug for SecTrustEvaluator<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecTrustEvaluator")
    }
}

impl<A: SecurityApi> TrustEvaluator for SecTrustEvaluator<A> {
    fn configure(&self, builder: &mut SslContextBuilder) -> Result<(), Error> {
        // The engine must let every chain through; the verdict comes from `evaluate`.
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
        let result = self.evaluate_chain(chain, hostname);
        match &result {
            Ok(verdict) => tracing::debug!(
                certs = chain.len(),
                ?hostname,
                trusted = verdict.is_trusted(),
                "SecTrust evaluation finished"
            ),
            Err(err) => tracing::debug!(
                certs = chain.len(),
                ?hostname,
                %err,
                "SecTrust evaluation failed"
            ),
        }
        result
    }
}
