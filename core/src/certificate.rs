//! Peer certificate value and text formatting for manual inspection.
//!
//! # Design
//! Formatting is purely textual: the PEM armor lines are removed with the
//! same dash-run patterns the reference server used, and nothing inside the
//! certificate (subject, issuer, validity) is parsed. Both formatters are
//! idempotent.

use std::sync::LazyLock;

use regex::Regex;

static BEGIN_CERTIFICATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-+BEGIN CERTIFICATE-+").expect("static regex"));
static END_CERTIFICATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-+END CERTIFICATE-+").expect("static regex"));

/// Strip `BEGIN CERTIFICATE` / `END CERTIFICATE` delimiters and trim
/// surrounding whitespace, leaving the base64 body with its line breaks.
pub fn to_display_text(certificate: &str) -> String {
    let stripped = BEGIN_CERTIFICATE.replace_all(certificate, "");
    let stripped = END_CERTIFICATE.replace_all(&stripped, "");
    stripped.trim().to_string()
}

/// Like [`to_display_text`] but also removes all inner whitespace, giving a
/// single-line form suitable for comparing against a known-certificate list.
pub fn to_compact_text(certificate: &str) -> String {
    to_display_text(certificate)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// The leaf certificate the server presented during the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerCertificate {
    der: Vec<u8>,
}

impl PeerCertificate {
    pub fn from_der(der: impl Into<Vec<u8>>) -> Self {
        Self { der: der.into() }
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// PEM encoding with 64-column base64 lines.
    pub fn to_pem(&self) -> String {
        pem::encode_config(
            &pem::Pem::new("CERTIFICATE", self.der.clone()),
            pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF),
        )
    }

    /// The base64 body of [`PeerCertificate::to_pem`] without armor.
    pub fn display_text(&self) -> String {
        to_display_text(&self.to_pem())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "-----BEGIN CERTIFICATE-----\nMIIBszCCAVmgAwIBAgIU\nQ2VydGlmaWNhdGVCb2R5\n-----END CERTIFICATE-----\n";

    #[test]
    fn display_text_strips_armor_and_trims() {
        assert_eq!(
            to_display_text(SAMPLE),
            "MIIBszCCAVmgAwIBAgIU\nQ2VydGlmaWNhdGVCb2R5"
        );
    }

    #[test]
    fn display_text_is_idempotent() {
        let once = to_display_text(SAMPLE);
        assert_eq!(to_display_text(&once), once);
    }

    #[test]
    fn display_text_on_bare_body_only_trims() {
        assert_eq!(to_display_text("  \n abc \n"), "abc");
    }

    #[test]
    fn display_text_accepts_short_dash_runs() {
        assert_eq!(to_display_text("--BEGIN CERTIFICATE--abc--END CERTIFICATE--"), "abc");
    }

    #[test]
    fn display_text_handles_crlf() {
        let crlf = SAMPLE.replace('\n', "\r\n");
        assert_eq!(
            to_display_text(&crlf),
            "MIIBszCCAVmgAwIBAgIU\r\nQ2VydGlmaWNhdGVCb2R5"
        );
    }

    #[test]
    fn compact_text_removes_all_whitespace() {
        assert_eq!(
            to_compact_text(SAMPLE),
            "MIIBszCCAVmgAwIBAgIUQ2VydGlmaWNhdGVCb2R5"
        );
        let once = to_compact_text(SAMPLE);
        assert_eq!(to_compact_text(&once), once);
    }

    #[test]
    fn peer_certificate_pem_roundtrips_through_display() {
        let cert = PeerCertificate::from_der(vec![0x30, 0x03, 0x02, 0x01, 0x01]);
        let pem = cert.to_pem();
        assert!(pem.starts_with("-----BEGIN CERTIFICATE-----"));
        assert_eq!(cert.display_text(), "MAMCAQE=");
        assert_eq!(::pem::parse(pem).unwrap().contents(), cert.der());
    }
}
