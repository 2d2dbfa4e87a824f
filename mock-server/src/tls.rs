//! rustls server config that requires a client certificate from the test CA.

use std::sync::Arc;

use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};

use crate::error::ServerError;
use crate::pki::TestPki;

/// Server config presenting the PKI's server certificate and rejecting any
/// client that does not present a certificate issued by the PKI's CA.
pub fn server_tls_config(pki: &TestPki) -> Result<Arc<ServerConfig>, ServerError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let mut roots = RootCertStore::empty();
    roots.add(CertificateDer::from_pem_slice(pki.ca_cert_pem.as_bytes())?)?;
    let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
        .build()?;

    let chain = vec![CertificateDer::from_pem_slice(pki.server_cert_pem.as_bytes())?];
    let key = PrivateKeyDer::from_pem_slice(pki.server_key_pem.as_bytes())?;

    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_client_cert_verifier(verifier)
        .with_single_cert(chain, key)?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}
