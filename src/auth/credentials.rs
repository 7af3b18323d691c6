//! # Almacenes de credenciales
//! src/auth/credentials.rs
//!
//! El motor nunca ve contraseñas en claro: un [`CredentialStore`] entrega
//! directamente `HA1 = hash(user:realm:password)`.
//!
//! Formato del archivo de contraseñas (uno por línea, `#` comenta):
//!
//! ```text
//! alice:mydomain.com:3b0e6c5c3e1f6e8e1d1b2e3f4a5b6c7d
//! ```

use super::digest::DigestAlgorithm;
use crate::error::ServerError;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Fuente de HA1 por usuario y realm
pub trait CredentialStore: Send + Sync {
    /// HA1 en hexadecimal, o `None` si el usuario no existe en ese realm
    fn ha1(&self, user: &str, realm: &str) -> Option<String>;
}

/// Credenciales en memoria
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    entries: HashMap<(String, String), String>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calcula y guarda el HA1 de una contraseña
    pub fn add_password(
        &mut self,
        user: &str,
        realm: &str,
        password: &str,
        algorithm: DigestAlgorithm,
    ) {
        let ha1 = algorithm.hash(&format!("{user}:{realm}:{password}"));
        self.add_ha1(user, realm, &ha1);
    }

    /// Guarda un HA1 ya calculado
    pub fn add_ha1(&mut self, user: &str, realm: &str, ha1: &str) {
        self.entries
            .insert((user.to_string(), realm.to_string()), ha1.to_ascii_lowercase());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CredentialStore for StaticCredentials {
    fn ha1(&self, user: &str, realm: &str) -> Option<String> {
        self.entries
            .get(&(user.to_string(), realm.to_string()))
            .cloned()
    }
}

/// Archivo `user:realm:ha1`, cargado en memoria al construirlo
#[derive(Debug, Clone)]
pub struct PasswordFile {
    path: PathBuf,
    credentials: StaticCredentials,
}

impl PasswordFile {
    pub fn load(path: &Path) -> Result<Self, ServerError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ServerError::Config(format!("cannot read passwords file {}: {e}", path.display()))
        })?;

        let mut credentials = StaticCredentials::new();
        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.splitn(3, ':');
            match (fields.next(), fields.next(), fields.next()) {
                (Some(user), Some(realm), Some(ha1))
                    if !user.is_empty() && !ha1.is_empty() && ha1.bytes().all(|b| b.is_ascii_hexdigit()) =>
                {
                    credentials.add_ha1(user, realm, ha1);
                }
                _ => {
                    return Err(ServerError::Config(format!(
                        "{}:{}: expected user:realm:ha1",
                        path.display(),
                        index + 1
                    )));
                }
            }
        }

        tracing::info!(path = %path.display(), users = credentials.len(), "passwords file loaded");

        Ok(Self {
            path: path.to_path_buf(),
            credentials,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for PasswordFile {
    fn ha1(&self, user: &str, realm: &str) -> Option<String> {
        self.credentials.ha1(user, realm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_static_credentials() {
        let mut store = StaticCredentials::new();
        store.add_password("alice", "test", "secret", DigestAlgorithm::Md5);

        let expected = DigestAlgorithm::Md5.hash("alice:test:secret");
        assert_eq!(store.ha1("alice", "test"), Some(expected));
        assert_eq!(store.ha1("alice", "other"), None);
        assert_eq!(store.ha1("bob", "test"), None);
    }

    #[test]
    fn test_password_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# usuarios").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "alice:mydomain.com:0123456789ABCDEF0123456789abcdef").unwrap();
        writeln!(file, "bob:other:ffffffffffffffffffffffffffffffff").unwrap();

        let passwords = PasswordFile::load(file.path()).unwrap();
        assert_eq!(
            passwords.ha1("alice", "mydomain.com").as_deref(),
            Some("0123456789abcdef0123456789abcdef")
        );
        assert!(passwords.ha1("bob", "mydomain.com").is_none());
        assert!(passwords.ha1("bob", "other").is_some());
    }

    #[test]
    fn test_password_file_rejects_bad_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "alice-without-fields").unwrap();
        assert!(matches!(PasswordFile::load(file.path()), Err(ServerError::Config(_))));

        let missing = Path::new("/no/such/passwords");
        assert!(matches!(PasswordFile::load(missing), Err(ServerError::Config(_))));
    }
}
