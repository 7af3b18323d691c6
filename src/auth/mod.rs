//! # Autenticación
//! src/auth/mod.rs
//!
//! - `nonce`: emisión y validación de nonces sin estado
//! - `digest`: verificación `Authorization: Digest` y challenges
//! - `credentials`: almacenes de HA1

pub mod credentials;
pub mod digest;
pub mod nonce;

pub use credentials::{CredentialStore, PasswordFile, StaticCredentials};
pub use digest::{DigestAlgorithm, DigestAuth, DigestCredentials};
pub use nonce::NonceSource;

/// Comparación en tiempo constante para evitar ataques de timing.
///
/// El tiempo solo depende de la longitud, nunca de la posición de la
/// primera diferencia.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b) {
        diff |= x ^ y;
    }
    diff == 0
}
