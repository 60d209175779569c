//! Client side TLS configuration.
//!
//! Peers are checked against the `webpki-roots` trust anchors. A configured
//! [`VerifyFn`] sees the outcome of that check together with the end-entity
//! certificate and makes the final decision.

use crate::protocol::ConnError;
use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use tracing::debug;

/// Peer verification callback: `(preverified, end_entity) -> accept`.
pub type VerifyFn = dyn Fn(bool, &CertificateDer<'_>) -> bool + Send + Sync;

pub(crate) fn client_tls_config(verify: Option<Arc<VerifyFn>>) -> Result<Arc<ClientConfig>, ConnError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let roots = Arc::new(RootCertStore { roots: webpki_roots::TLS_SERVER_ROOTS.to_vec() });

    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(ConnError::tls)?;

    let config = match verify {
        None => builder.with_root_certificates(roots).with_no_client_auth(),
        Some(predicate) => {
            let verifier = PredicateVerifier::new(roots, provider, predicate)?;
            builder.dangerous().with_custom_certificate_verifier(Arc::new(verifier)).with_no_client_auth()
        }
    };
    Ok(Arc::new(config))
}

struct PredicateVerifier {
    inner: Arc<WebPkiServerVerifier>,
    predicate: Arc<VerifyFn>,
}

impl PredicateVerifier {
    fn new(roots: Arc<RootCertStore>, provider: Arc<CryptoProvider>, predicate: Arc<VerifyFn>) -> Result<Self, ConnError> {
        let inner = WebPkiServerVerifier::builder_with_provider(roots, provider).build().map_err(ConnError::tls)?;
        Ok(Self { inner, predicate })
    }
}

impl Debug for PredicateVerifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicateVerifier").finish_non_exhaustive()
    }
}

impl ServerCertVerifier for PredicateVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let preverified = match self.inner.verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now) {
            Ok(_) => true,
            Err(e) => {
                debug!(cause = %e, "webpki rejected the server certificate");
                false
            }
        };

        if (self.predicate)(preverified, end_entity) {
            Ok(ServerCertVerified::assertion())
        } else {
            Err(rustls::Error::General("server certificate rejected by verify callback".to_string()))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_builds() {
        let config = client_tls_config(None).unwrap();
        assert!(config.alpn_protocols.is_empty());
    }

    #[test]
    fn test_predicate_config_builds() {
        let accept_all: Arc<VerifyFn> = Arc::new(|_, _| true);
        assert!(client_tls_config(Some(accept_all)).is_ok());
    }
}
