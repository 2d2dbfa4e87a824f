//! Client certificate and private key loading.
//!
//! A [`ClientIdentity`] is only constructed once the PEM blocks have been
//! decoded and the key has been checked against the leaf certificate's public
//! key, so a bad pair is reported before any socket is opened.

use std::path::Path;
use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::pki_types::pem::{Error as PemError, PemObject};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::sign::CertifiedKey;

use crate::error::{Error, Result};

/// A validated client certificate chain and its private key.
#[derive(Debug)]
pub struct ClientIdentity {
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl Clone for ClientIdentity {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            key: self.key.clone_key(),
        }
    }
}

impl ClientIdentity {
    /// Decode a PEM certificate chain (leaf first) and a PEM private key and
    /// check that they belong together.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self> {
        let chain = CertificateDer::pem_slice_iter(cert_pem)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Credential(format!("unreadable certificate PEM: {e}")))?;
        if chain.is_empty() {
            return Err(Error::Credential(
                "no CERTIFICATE block found in client certificate".to_string(),
            ));
        }

        let key = PrivateKeyDer::from_pem_slice(key_pem).map_err(|e| match e {
            PemError::NoItemsFound => {
                Error::Credential("no PRIVATE KEY block found in client key".to_string())
            }
            e => Error::Credential(format!("unreadable private key PEM: {e}")),
        })?;

        let identity = Self { chain, key };
        identity.check_pair(&crate::tls::provider())?;
        Ok(identity)
    }

    /// Read the certificate and key from files, then behave like
    /// [`ClientIdentity::from_pem`].
    pub fn from_files(cert_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> Result<Self> {
        let cert_path = cert_path.as_ref();
        let key_path = key_path.as_ref();
        let cert_pem = std::fs::read(cert_path).map_err(|e| {
            Error::Credential(format!("cannot read {}: {e}", cert_path.display()))
        })?;
        let key_pem = std::fs::read(key_path)
            .map_err(|e| Error::Credential(format!("cannot read {}: {e}", key_path.display())))?;
        Self::from_pem(&cert_pem, &key_pem)
    }

    pub fn leaf(&self) -> &CertificateDer<'static> {
        &self.chain[0]
    }

    pub(crate) fn chain(&self) -> Vec<CertificateDer<'static>> {
        self.chain.clone()
    }

    pub(crate) fn key(&self) -> PrivateKeyDer<'static> {
        self.key.clone_key()
    }

    fn check_pair(&self, provider: &Arc<CryptoProvider>) -> Result<()> {
        let signing_key = provider
            .key_provider
            .load_private_key(self.key.clone_key())
            .map_err(|e| Error::Credential(format!("unsupported private key: {e}")))?;
        CertifiedKey::new(self.chain.clone(), signing_key)
            .keys_match()
            .map_err(|e| {
                Error::Credential(format!("private key does not match certificate: {e}"))
            })
    }
}
