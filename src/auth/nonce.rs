//! # Nonces de autenticación Digest
//! src/auth/nonce.rs
//!
//! Nonces sin estado en el servidor: el propio nonce lleva el instante de
//! emisión, un contador y una firma con el secreto del servidor.
//!
//! ```text
//! nonce = hex16(emitido) ‖ hex16(contador) ‖ hex16(sha256(secreto ‖ emitido ‖ contador)[..8])
//! ```
//!
//! Al verificar se recalcula la firma y se acota la antigüedad sin buscar
//! nada. Lo único que se guarda es el último `nc` aceptado por nonce,
//! para rechazar repeticiones; esa tabla se purga cuando sus nonces expiran.

use crate::error::AuthError;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

const NONCE_LEN: usize = 48;

/// Segundos desde la época Unix
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[derive(Debug, Default)]
struct NonceState {
    /// Contador monótono de emisiones
    counter: u64,

    /// nonce → (emitido, último nc aceptado)
    accepted: HashMap<String, (u64, u64)>,
}

/// Emisor y verificador de nonces de un servidor
#[derive(Debug)]
pub struct NonceSource {
    secret: [u8; 32],

    /// Ventana de validez en segundos
    lifetime: u64,

    state: Mutex<NonceState>,
}

impl NonceSource {
    /// Secreto aleatorio, distinto en cada arranque
    pub fn new(lifetime_secs: u64) -> Self {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Self::with_secret(secret, lifetime_secs)
    }

    pub fn with_secret(secret: [u8; 32], lifetime_secs: u64) -> Self {
        Self {
            secret,
            lifetime: lifetime_secs,
            state: Mutex::new(NonceState::default()),
        }
    }

    pub fn lifetime(&self) -> u64 {
        self.lifetime
    }

    fn lock(&self) -> MutexGuard<'_, NonceState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn signature(&self, issued: u64, count: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret);
        hasher.update(issued.to_be_bytes());
        hasher.update(count.to_be_bytes());
        hex::encode(&hasher.finalize()[..8])
    }

    /// Emite un nonce nuevo
    pub fn issue(&self) -> String {
        self.issue_at(unix_now())
    }

    pub fn issue_at(&self, now: u64) -> String {
        let count = {
            let mut state = self.lock();
            state.counter += 1;
            state.counter
        };
        format!("{:016x}{:016x}{}", now, count, self.signature(now, count))
    }

    /// Instante de emisión de un nonce con firma válida
    fn decode(&self, nonce: &str) -> Result<u64, AuthError> {
        if nonce.len() != NONCE_LEN || !nonce.is_ascii() {
            return Err(AuthError::Failed);
        }

        let issued = u64::from_str_radix(&nonce[..16], 16).map_err(|_| AuthError::Failed)?;
        let count = u64::from_str_radix(&nonce[16..32], 16).map_err(|_| AuthError::Failed)?;

        let expected = self.signature(issued, count);
        if !super::constant_time_eq(expected.as_bytes(), nonce[32..].as_bytes()) {
            return Err(AuthError::Failed);
        }

        Ok(issued)
    }

    /// Comprueba firma y ventana de validez.
    ///
    /// Un nonce es válido mientras `now - emitido <= lifetime`.
    pub fn validate_at(&self, nonce: &str, now: u64) -> Result<(), AuthError> {
        let issued = self.decode(nonce)?;
        if now.saturating_sub(issued) > self.lifetime {
            return Err(AuthError::StaleNonce);
        }
        Ok(())
    }

    /// Registra el uso `nc` de un nonce ya validado.
    ///
    /// Cada uso tiene que traer un `nc` estrictamente mayor que el último
    /// aceptado para ese nonce.
    pub fn accept_count_at(&self, nonce: &str, nc: u64, now: u64) -> Result<(), AuthError> {
        let issued = self.decode(nonce)?;
        let lifetime = self.lifetime;

        let mut state = self.lock();
        state
            .accepted
            .retain(|_, (emitted, _)| now.saturating_sub(*emitted) <= lifetime);

        // nc empieza en 1: un 0 nunca se acepta
        let entry = state
            .accepted
            .entry(nonce.to_string())
            .or_insert((issued, 0));
        if nc <= entry.1 {
            return Err(AuthError::Failed);
        }
        entry.1 = nc;
        Ok(())
    }

    /// Nonces con usos registrados
    pub fn tracked(&self) -> usize {
        self.lock().accepted.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: u64 = 300;
    const T: u64 = 1_700_000_000;

    fn source() -> NonceSource {
        NonceSource::with_secret([7u8; 32], WINDOW)
    }

    #[test]
    fn test_nonces_are_unique() {
        let nonces = source();
        let a = nonces.issue_at(T);
        let b = nonces.issue_at(T);
        assert_ne!(a, b);
        assert_eq!(a.len(), NONCE_LEN);
    }

    #[test]
    fn test_window_boundaries() {
        let nonces = source();
        let nonce = nonces.issue_at(T);

        assert_eq!(nonces.validate_at(&nonce, T), Ok(()));
        assert_eq!(nonces.validate_at(&nonce, T + WINDOW - 1), Ok(()));
        assert_eq!(nonces.validate_at(&nonce, T + WINDOW + 1), Err(AuthError::StaleNonce));
    }

    #[test]
    fn test_tampered_or_foreign_nonce_fails() {
        let nonces = source();
        let nonce = nonces.issue_at(T);

        // Otro instante de emisión con la misma firma
        let forged = format!("{:016x}{}", T + 1000, &nonce[16..]);
        assert_eq!(nonces.validate_at(&forged, T), Err(AuthError::Failed));

        let other = NonceSource::with_secret([9u8; 32], WINDOW);
        assert_eq!(other.validate_at(&nonce, T), Err(AuthError::Failed));

        assert_eq!(nonces.validate_at("short", T), Err(AuthError::Failed));
    }

    #[test]
    fn test_nonce_count_must_increase() {
        let nonces = source();
        let nonce = nonces.issue_at(T);

        assert_eq!(nonces.accept_count_at(&nonce, 1, T), Ok(()));
        assert_eq!(nonces.accept_count_at(&nonce, 1, T), Err(AuthError::Failed));
        assert_eq!(nonces.accept_count_at(&nonce, 2, T), Ok(()));
        assert_eq!(nonces.accept_count_at(&nonce, 1, T), Err(AuthError::Failed));
        assert_eq!(nonces.accept_count_at(&nonce, 5, T), Ok(()));
    }

    #[test]
    fn test_expired_entries_are_pruned() {
        let nonces = source();
        let old = nonces.issue_at(T);
        nonces.accept_count_at(&old, 1, T).unwrap();
        assert_eq!(nonces.tracked(), 1);

        let fresh = nonces.issue_at(T + WINDOW + 10);
        nonces.accept_count_at(&fresh, 1, T + WINDOW + 10).unwrap();
        assert_eq!(nonces.tracked(), 1);
    }
}
