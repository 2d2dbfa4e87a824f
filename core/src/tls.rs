//! rustls client configuration for one authenticated call.
//!
//! The ring provider is passed explicitly instead of relying on a
//! process-wide default, so this crate works regardless of which rustls
//! backend other crates in the same binary enable.

use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::CertificateDer;
use rustls::{ClientConfig, ConfigBuilder, RootCertStore, WantsVerifier};

use crate::credentials::ClientIdentity;
use crate::error::{Error, Result};
use crate::options::SendOptions;
use crate::verifier::AcceptAnyServerCert;

pub(crate) fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Build the client config presenting `identity` and applying the
/// verification policy from `options`.
pub fn build_client_config(identity: &ClientIdentity, options: &SendOptions) -> Result<ClientConfig> {
    let provider = provider();
    let builder = versioned_builder(provider.clone())?;

    let builder = if options.insecure_skip_verify {
        tracing::warn!("server certificate verification is disabled (insecure_skip_verify)");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert::new(provider)))
    } else {
        builder.with_root_certificates(root_store(&options.extra_root_certificates)?)
    };

    builder
        .with_client_auth_cert(identity.chain(), identity.key())
        .map_err(|e| Error::Credential(format!("client cert config: {e}")))
}

fn versioned_builder(
    provider: Arc<CryptoProvider>,
) -> Result<ConfigBuilder<ClientConfig, WantsVerifier>> {
    ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::TlsHandshake(format!("TLS version config: {e}")))
}

/// Web PKI roots plus the caller's extra PEM anchors.
fn root_store(extra: &[String]) -> Result<RootCertStore> {
    let mut roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    for pem in extra {
        let certs = CertificateDer::pem_slice_iter(pem.as_bytes())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Credential(format!("unreadable root certificate PEM: {e}")))?;
        if certs.is_empty() {
            return Err(Error::Credential(
                "no CERTIFICATE block found in extra root".to_string(),
            ));
        }
        for cert in certs {
            roots
                .add(cert)
                .map_err(|e| Error::Credential(format!("invalid root certificate: {e}")))?;
        }
    }
    Ok(roots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mock_server::pki::TestPki;
    use rustls::client::ResolvesClientCert;

    fn identity(pki: &TestPki) -> ClientIdentity {
        ClientIdentity::from_pem(pki.client_cert_pem.as_bytes(), pki.client_key_pem.as_bytes())
            .unwrap()
    }

    #[test]
    fn verifying_config_builds() {
        let pki = TestPki::generate().unwrap();
        let config = build_client_config(&identity(&pki), &SendOptions::default()).unwrap();
        assert!(config.client_auth_cert_resolver.has_certs());
    }

    #[test]
    fn insecure_config_builds() {
        let pki = TestPki::generate().unwrap();
        let options = SendOptions::new().insecure_skip_verify(true);
        assert!(build_client_config(&identity(&pki), &options).is_ok());
    }

    #[test]
    fn extra_root_is_added() {
        let pki = TestPki::generate().unwrap();
        let roots = root_store(&[pki.ca_cert_pem.clone()]).unwrap();
        assert_eq!(roots.len(), webpki_roots::TLS_SERVER_ROOTS.len() + 1);
    }

    #[test]
    fn provider_without_suites_is_tls_error() {
        let empty = CryptoProvider {
            cipher_suites: Vec::new(),
            ..rustls::crypto::ring::default_provider()
        };
        match versioned_builder(Arc::new(empty)) {
            Err(err) => assert!(matches!(err, Error::TlsHandshake(_)), "got {err:?}"),
            Ok(_) => panic!("a provider without cipher suites must be refused"),
        }
    }

    #[test]
    fn bad_extra_root_is_credential_error() {
        let err = root_store(&["garbage".to_string()]).unwrap_err();
        assert!(matches!(err, Error::Credential(_)));
    }
}
