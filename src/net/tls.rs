//! # Configuración TLS
//! src/net/tls.rs
//!
//! Carga de certificado y clave privada desde un único archivo PEM
//! (la opción `ssl_certificate`).

use crate::error::ServerError;
use rustls::ServerConfig;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

/// Construye la configuración de servidor rustls a partir de un PEM que
/// contiene la cadena de certificados y la clave privada.
pub fn load_server_config(pem_path: &Path) -> Result<Arc<ServerConfig>, ServerError> {
    if !pem_path.exists() {
        return Err(ServerError::Tls(format!(
            "certificate file not found: {}",
            pem_path.display()
        )));
    }

    let mut reader = BufReader::new(File::open(pem_path)?);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::Tls(format!("invalid certificate: {e}")))?;

    if certs.is_empty() {
        return Err(ServerError::Tls(format!(
            "no certificate in {}",
            pem_path.display()
        )));
    }

    let mut reader = BufReader::new(File::open(pem_path)?);
    let key = rustls_pemfile::private_key(&mut reader)
        .map_err(|e| ServerError::Tls(format!("invalid private key: {e}")))?
        .ok_or_else(|| ServerError::Tls(format!("no private key in {}", pem_path.display())))?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ServerError::Tls(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::Tls(e.to_string()))?;

    Ok(Arc::new(config))
}
