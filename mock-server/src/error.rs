use thiserror::Error;

/// Errors raised while setting up or running the mock server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("certificate generation failed: {0}")]
    Certificate(#[from] rcgen::Error),

    #[error("PEM decoding failed: {0}")]
    Pem(#[from] rustls::pki_types::pem::Error),

    #[error("TLS configuration failed: {0}")]
    Tls(#[from] rustls::Error),

    #[error("client verifier configuration failed: {0}")]
    Verifier(#[from] rustls::server::VerifierBuilderError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
