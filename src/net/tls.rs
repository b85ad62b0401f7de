//! TLS configuration and certificate loading.

use axum_server::tls_rustls::RustlsConfig;
use std::path::Path;

use crate::config::HttpsConfig;

/// Load TLS configuration from certificate and key files.
pub async fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, std::io::Error> {
    if !cert_path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Certificate file not found: {}", cert_path.display()),
        ));
    }
    if !key_path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Private key file not found: {}", key_path.display()),
        ));
    }

    RustlsConfig::from_pem_file(cert_path, key_path).await
}

/// Load the material named by an `[https]` section.
///
/// Both files are required once the section is present.
pub async fn load_https(https: &HttpsConfig) -> Result<RustlsConfig, std::io::Error> {
    let missing = |what: &str| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("https is configured but {what} is missing"),
        )
    };
    let cert = https.certificate_file.as_deref().ok_or_else(|| missing("certificate_file"))?;
    let key = https.key_file.as_deref().ok_or_else(|| missing("key_file"))?;
    load_tls_config(cert, key).await
}
