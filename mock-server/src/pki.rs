//! Ephemeral certificate authority for tests and local runs.
//!
//! Generates a private CA, a server certificate for `localhost`,
//! `127.0.0.1` and `::1`, and a client certificate, all as PEM strings. The CA
//! is not in any public trust store, so a verifying client rejects the
//! server unless the CA is added as an extra root.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose,
    IsCa, Issuer, KeyPair, SanType,
};

pub struct TestPki {
    pub ca_cert_pem: String,
    pub server_cert_pem: String,
    pub server_key_pem: String,
    pub client_cert_pem: String,
    pub client_key_pem: String,
    issuer: Issuer<'static, KeyPair>,
}

impl TestPki {
    pub fn generate() -> Result<Self, rcgen::Error> {
        let mut params = CertificateParams::new(Vec::default())?;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.distinguished_name = name("mock-server test CA");

        let ca_key = KeyPair::generate()?;
        let ca_cert = params.clone().self_signed(&ca_key)?;
        let issuer = Issuer::new(params, ca_key);

        let mut params = CertificateParams::new(vec!["localhost".to_string()])?;
        params.subject_alt_names.push(SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST)));
        params.subject_alt_names.push(SanType::IpAddress(IpAddr::V6(Ipv6Addr::LOCALHOST)));
        params.distinguished_name = name("mock-server");
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        let server_key = KeyPair::generate()?;
        let server_cert = params.signed_by(&server_key, &issuer)?;

        let mut pki = Self {
            ca_cert_pem: ca_cert.pem(),
            server_cert_pem: server_cert.pem(),
            server_key_pem: server_key.serialize_pem(),
            client_cert_pem: String::new(),
            client_key_pem: String::new(),
            issuer,
        };
        let (client_cert_pem, client_key_pem) = pki.issue_client("rgmclient")?;
        pki.client_cert_pem = client_cert_pem;
        pki.client_key_pem = client_key_pem;
        Ok(pki)
    }

    /// Issue another client certificate from the same CA. Returns
    /// `(certificate_pem, key_pem)`.
    pub fn issue_client(&self, common_name: &str) -> Result<(String, String), rcgen::Error> {
        let mut params = CertificateParams::new(Vec::default())?;
        params.distinguished_name = name(common_name);
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
        let key = KeyPair::generate()?;
        let cert = params.signed_by(&key, &self.issuer)?;
        Ok((cert.pem(), key.serialize_pem()))
    }

    /// A client certificate signed by an unrelated CA, which the server must
    /// refuse.
    pub fn foreign_client() -> Result<(String, String), rcgen::Error> {
        let mut params = CertificateParams::new(Vec::default())?;
        params.distinguished_name = name("stranger");
        let key = KeyPair::generate()?;
        let cert = params.self_signed(&key)?;
        Ok((cert.pem(), key.serialize_pem()))
    }
}

fn name(common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::OrganizationName, "mock-server");
    dn.push(DnType::CommonName, common_name);
    dn
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_pem_material() {
        let pki = TestPki::generate().unwrap();
        for pem in [&pki.ca_cert_pem, &pki.server_cert_pem, &pki.client_cert_pem] {
            assert!(pem.starts_with("-----BEGIN CERTIFICATE-----"));
        }
        assert!(pki.server_key_pem.contains("PRIVATE KEY"));
        assert!(pki.client_key_pem.contains("PRIVATE KEY"));
    }

    #[test]
    fn issued_clients_are_distinct() {
        let pki = TestPki::generate().unwrap();
        let (cert, key) = pki.issue_client("second").unwrap();
        assert_ne!(cert, pki.client_cert_pem);
        assert_ne!(key, pki.client_key_pem);
    }
}
