use std::path::PathBuf;

use mock_server::{pki::TestPki, tls::server_tls_config, ServerError, Stats};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "44325".to_string());
    let cert_dir = PathBuf::from(std::env::var("CERT_DIR").unwrap_or_else(|_| ".".to_string()));

    let pki = TestPki::generate()?;
    std::fs::write(cert_dir.join("ca.crt"), &pki.ca_cert_pem)?;
    std::fs::write(cert_dir.join("rgmclient.crt"), &pki.client_cert_pem)?;
    std::fs::write(cert_dir.join("rgmclient.key"), &pki.client_key_pem)?;
    tracing::info!(dir = %cert_dir.display(), "wrote ca.crt, rgmclient.crt and rgmclient.key");

    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");
    mock_server::run(listener, server_tls_config(&pki)?, Stats::default()).await?;
    Ok(())
}
