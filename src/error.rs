//! # Errores del motor
//! src/error.rs
//!
//! Taxonomía de errores en tres niveles:
//!
//! - [`TransferError`]: fallos del primitivo de I/O (push/pull)
//! - [`HttpError`]: fallos al procesar un request sobre una conexión
//! - [`AuthError`]: resultado negativo de la autenticación Digest
//! - [`ServerError`]: fallos al arrancar el servidor (config, bind, TLS)
//!
//! Ningún error de este módulo es fatal para el proceso: como mucho cierra
//! la conexión en la que ocurrió.

use crate::http::StatusCode;
use std::io;
use thiserror::Error;

/// Errores del primitivo de transferencia de bytes
#[derive(Debug, Error)]
pub enum TransferError {
    /// El flag de parada del servidor se activó durante la operación
    #[error("server is stopping")]
    Stopped,

    /// Se agotó el deadline sin poder transferir nada
    #[error("operation timed out")]
    TimedOut,

    /// El peer cerró la conexión mientras escribíamos
    #[error("connection closed by peer")]
    Closed,

    /// Error duro del transporte (reset, broken pipe, error TLS...)
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}

/// Errores al leer, enmarcar o responder un request HTTP
#[derive(Debug, Error)]
pub enum HttpError {
    #[error(transparent)]
    Transport(#[from] TransferError),

    /// Request line o headers con sintaxis inválida
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Framing chunked inválido
    #[error("malformed chunk: {0}")]
    MalformedChunk(String),

    /// El bloque de headers no cabe en `max_request_size`
    #[error("request too large")]
    RequestTooLarge,

    /// El peer cerró (o expiró) antes de completar los headers
    #[error("incomplete request")]
    IncompleteRequest,

    /// El peer cerró antes de enviar todo el body declarado
    #[error("incomplete request body")]
    IncompleteBody,

    /// Versión HTTP distinta de 1.0 / 1.1
    #[error("unsupported HTTP version: {0}")]
    UnsupportedVersion(String),

    /// Uso incorrecto de los helpers de respuesta por parte del handler
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl HttpError {
    /// Código de estado con el que se responde a este error (si se puede responder)
    pub fn status(&self) -> StatusCode {
        match self {
            HttpError::MalformedRequest(_) | HttpError::MalformedChunk(_) => StatusCode::BadRequest,
            HttpError::RequestTooLarge => StatusCode::PayloadTooLarge,
            HttpError::IncompleteRequest | HttpError::IncompleteBody => StatusCode::BadRequest,
            HttpError::UnsupportedVersion(_) => StatusCode::HttpVersionNotSupported,
            HttpError::Transport(TransferError::TimedOut) => StatusCode::RequestTimeout,
            HttpError::Transport(_) | HttpError::InvalidResponse(_) => {
                StatusCode::InternalServerError
            }
        }
    }

    /// `true` si el error deja el transporte inutilizable: no se intenta responder
    pub fn is_transport(&self) -> bool {
        matches!(self, HttpError::Transport(_))
    }
}

/// Resultado negativo de verificar un `Authorization: Digest`.
///
/// Siempre recuperable: se responde 401 con un challenge nuevo y la
/// conexión sigue viva.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing or malformed Authorization header")]
    Missing,

    /// Credenciales incorrectas, usuario desconocido o nonce-count repetido
    #[error("authentication failed")]
    Failed,

    /// El nonce salió de su ventana de validez: el cliente debe reintentar
    #[error("stale nonce")]
    StaleNonce,
}

/// Errores de arranque del servidor
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(HttpError::MalformedRequest("x".into()).status(), StatusCode::BadRequest);
        assert_eq!(HttpError::MalformedChunk("x".into()).status(), StatusCode::BadRequest);
        assert_eq!(HttpError::RequestTooLarge.status(), StatusCode::PayloadTooLarge);
        assert_eq!(
            HttpError::InvalidResponse("x".into()).status(),
            StatusCode::InternalServerError
        );
        assert_eq!(
            HttpError::UnsupportedVersion("HTTP/2.0".into()).status(),
            StatusCode::HttpVersionNotSupported
        );
        assert_eq!(
            HttpError::Transport(TransferError::TimedOut).status(),
            StatusCode::RequestTimeout
        );
    }

    #[test]
    fn test_transport_classification() {
        assert!(HttpError::from(TransferError::Closed).is_transport());
        assert!(!HttpError::IncompleteBody.is_transport());
    }

    #[test]
    fn test_display() {
        let err = HttpError::MalformedChunk("bad size".into());
        assert_eq!(err.to_string(), "malformed chunk: bad size");
        let err = ServerError::Config("num_threads must be >= 1".into());
        assert!(err.to_string().contains("num_threads"));
    }
}
