//! # Autenticación HTTP Digest
//! src/auth/digest.rs
//!
//! RFC 2617 / RFC 7616 con `qop=auth`:
//!
//! ```text
//! HA1      = H(user:realm:password)          (lo entrega el CredentialStore)
//! HA2      = H(method:uri)
//! response = H(HA1:nonce:nc:cnonce:qop:HA2)
//! ```
//!
//! Orden de verificación: realm y uri del header, firma y ventana del nonce,
//! HA1 del usuario, comparación en tiempo constante y, solo si todo eso
//! pasa, registro del `nc` para detectar repeticiones.

use super::credentials::CredentialStore;
use super::nonce::{unix_now, NonceSource};
use crate::error::AuthError;
use crate::http::{Request, Response, StatusCode};
use crate::router::AuthorizationHandler;
use crate::server::Connection;
use md5::Md5;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

/// Función hash de la autenticación
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestAlgorithm {
    #[default]
    Md5,
    Sha256,
}

impl DigestAlgorithm {
    /// Hash en hexadecimal minúscula
    pub fn hash(&self, data: &str) -> String {
        match self {
            DigestAlgorithm::Md5 => hex::encode(Md5::digest(data.as_bytes())),
            DigestAlgorithm::Sha256 => hex::encode(Sha256::digest(data.as_bytes())),
        }
    }

    /// Nombre en el parámetro `algorithm`
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "MD5",
            DigestAlgorithm::Sha256 => "SHA-256",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("MD5") {
            Some(DigestAlgorithm::Md5)
        } else if name.eq_ignore_ascii_case("SHA-256") {
            Some(DigestAlgorithm::Sha256)
        } else {
            None
        }
    }
}

/// Campos de un `Authorization: Digest ...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestCredentials {
    pub username: String,
    pub realm: String,
    pub nonce: String,
    pub uri: String,
    pub qop: String,
    pub nc: String,
    pub cnonce: String,
    pub response: String,
    pub algorithm: Option<String>,
}

impl DigestCredentials {
    /// Parsea el valor del header. `None` si no es Digest o falta algún campo.
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim_start();
        let (scheme, rest) = header.split_once(char::is_whitespace)?;
        if !scheme.eq_ignore_ascii_case("Digest") {
            return None;
        }

        let mut params = parse_params(rest)?;
        let mut take = |key: &str| params.remove(key);

        Some(Self {
            username: take("username")?,
            realm: take("realm")?,
            nonce: take("nonce")?,
            uri: take("uri")?,
            qop: take("qop")?,
            nc: take("nc")?,
            cnonce: take("cnonce")?,
            response: take("response")?,
            algorithm: take("algorithm"),
        })
    }
}

/// `key=value, key="quoted \"value\""` → mapa con claves en minúscula
fn parse_params(input: &str) -> Option<HashMap<String, String>> {
    let mut params = HashMap::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace() || *c == ',').is_some() {}
        if chars.peek().is_none() {
            return Some(params);
        }

        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| *c != '=' && *c != ',') {
            key.push(c);
        }
        if chars.next() != Some('=') {
            return None;
        }

        let mut value = String::new();
        if chars.next_if_eq(&'"').is_some() {
            loop {
                match chars.next()? {
                    '\\' => value.push(chars.next()?),
                    '"' => break,
                    c => value.push(c),
                }
            }
        } else {
            while let Some(c) = chars.next_if(|c| *c != ',') {
                value.push(c);
            }
        }

        params.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
    }
}

/// `H(HA1:nonce:nc:cnonce:qop:H(method:uri))`
#[allow(clippy::too_many_arguments)]
pub fn compute_response(
    algorithm: DigestAlgorithm,
    ha1: &str,
    nonce: &str,
    nc: &str,
    cnonce: &str,
    qop: &str,
    method: &str,
    uri: &str,
) -> String {
    let ha2 = algorithm.hash(&format!("{method}:{uri}"));
    algorithm.hash(&format!("{ha1}:{nonce}:{nc}:{cnonce}:{qop}:{ha2}"))
}

/// Authorization handler Digest para un realm
#[derive(Clone)]
pub struct DigestAuth {
    realm: String,
    store: Arc<dyn CredentialStore>,
    algorithm: DigestAlgorithm,
}

impl std::fmt::Debug for DigestAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigestAuth")
            .field("realm", &self.realm)
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

impl DigestAuth {
    pub fn new(realm: &str, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            realm: realm.to_string(),
            store,
            algorithm: DigestAlgorithm::Md5,
        }
    }

    pub fn with_algorithm(mut self, algorithm: DigestAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// Verifica el request en el instante `now` (segundos Unix).
    /// Retorna el usuario autenticado.
    pub fn verify(
        &self,
        request: &Request,
        nonces: &NonceSource,
        now: u64,
    ) -> Result<String, AuthError> {
        let creds = request
            .header("Authorization")
            .and_then(DigestCredentials::parse)
            .ok_or(AuthError::Missing)?;

        if creds.realm != self.realm || creds.uri != request.uri() {
            return Err(AuthError::Failed);
        }

        if let Some(name) = &creds.algorithm {
            if DigestAlgorithm::from_name(name) != Some(self.algorithm) {
                return Err(AuthError::Failed);
            }
        }

        if !creds.qop.eq_ignore_ascii_case("auth") {
            return Err(AuthError::Failed);
        }

        let nc = u64::from_str_radix(&creds.nc, 16).map_err(|_| AuthError::Failed)?;

        nonces.validate_at(&creds.nonce, now)?;

        let ha1 = self
            .store
            .ha1(&creds.username, &self.realm)
            .ok_or(AuthError::Failed)?;

        let expected = compute_response(
            self.algorithm,
            &ha1,
            &creds.nonce,
            &creds.nc,
            &creds.cnonce,
            &creds.qop,
            request.method().as_str(),
            &creds.uri,
        );

        if !super::constant_time_eq(expected.as_bytes(), creds.response.to_ascii_lowercase().as_bytes()) {
            return Err(AuthError::Failed);
        }

        nonces.accept_count_at(&creds.nonce, nc, now)?;

        Ok(creds.username)
    }

    /// Valor de `WWW-Authenticate` con un nonce nuevo
    pub fn challenge_header(&self, nonce: &str, stale: bool) -> String {
        let mut value = format!(
            "Digest realm=\"{}\", qop=\"auth\", nonce=\"{}\", algorithm={}",
            self.realm,
            nonce,
            self.algorithm.name()
        );
        if stale {
            value.push_str(", stale=true");
        }
        value
    }
}

impl AuthorizationHandler for DigestAuth {
    fn authorize(&self, request: &Request, conn: &Connection) -> Result<Option<String>, AuthError> {
        self.verify(request, conn.context().nonces(), unix_now())
            .map(Some)
    }

    fn challenge(&self, _request: &Request, conn: &Connection, error: &AuthError) -> Response {
        let nonce = conn.context().nonces().issue();
        let stale = *error == AuthError::StaleNonce;
        Response::error(StatusCode::Unauthorized, &error.to_string())
            .with_header("WWW-Authenticate", &self.challenge_header(&nonce, stale))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticCredentials;

    const REALM: &str = "test.realm";
    const T: u64 = 1_700_000_000;
    const WINDOW: u64 = 600;

    fn auth(algorithm: DigestAlgorithm) -> DigestAuth {
        let mut store = StaticCredentials::new();
        store.add_password("alice", REALM, "wonderland", algorithm);
        DigestAuth::new(REALM, Arc::new(store)).with_algorithm(algorithm)
    }

    /// Request firmado como lo haría un cliente
    fn signed_request(
        algorithm: DigestAlgorithm,
        method: &str,
        uri: &str,
        password: &str,
        nonce: &str,
        nc: &str,
    ) -> Request {
        let ha1 = algorithm.hash(&format!("alice:{REALM}:{password}"));
        let response = compute_response(algorithm, &ha1, nonce, nc, "c0ffee", "auth", method, uri);
        let raw = format!(
            "{method} {uri} HTTP/1.1\r\nAuthorization: Digest username=\"alice\", realm=\"{REALM}\", \
             nonce=\"{nonce}\", uri=\"{uri}\", qop=auth, nc={nc}, cnonce=\"c0ffee\", \
             response=\"{response}\", algorithm={}\r\n\r\n",
            algorithm.name()
        );
        Request::parse(raw.as_bytes()).unwrap()
    }

    #[test]
    fn test_parse_credentials() {
        let header = r#"Digest username="Mufasa", realm="http-auth@example.org", uri="/dir/index.html", algorithm=MD5, nonce="7ypf", nc=00000001, cnonce="f2/wE4q", qop=auth, response="8ca5", opaque="FQhe""#;
        let creds = DigestCredentials::parse(header).unwrap();

        assert_eq!(creds.username, "Mufasa");
        assert_eq!(creds.realm, "http-auth@example.org");
        assert_eq!(creds.uri, "/dir/index.html");
        assert_eq!(creds.nc, "00000001");
        assert_eq!(creds.qop, "auth");
        assert_eq!(creds.algorithm.as_deref(), Some("MD5"));
    }

    #[test]
    fn test_parse_quoted_escapes_and_commas() {
        let header = r#"digest username="a\"b,c", realm="r", nonce="n", uri="/", qop=auth, nc=1, cnonce="x", response="y""#;
        let creds = DigestCredentials::parse(header).unwrap();
        assert_eq!(creds.username, "a\"b,c");
    }

    #[test]
    fn test_parse_rejects_other_schemes_and_missing_fields() {
        assert!(DigestCredentials::parse("Basic YWxhZGRpbjpvcGVuc2VzYW1l").is_none());
        assert!(DigestCredentials::parse(r#"Digest username="a", realm="r""#).is_none());
        assert!(DigestCredentials::parse(r#"Digest username="unterminated"#).is_none());
    }

    #[test]
    fn test_known_md5_response() {
        // RFC 2617, sección 3.5
        let ha1 = DigestAlgorithm::Md5.hash("Mufasa:testrealm@host.com:Circle Of Life");
        let response = compute_response(
            DigestAlgorithm::Md5,
            &ha1,
            "dcd98b7102dd2f0e8b11d0f600bfb0c093",
            "00000001",
            "0a4f113b",
            "auth",
            "GET",
            "/dir/index.html",
        );
        assert_eq!(response, "6629fae49393a05397450978507c4ef1");
    }

    #[test]
    fn test_verify_once_replay_then_next_count() {
        let nonces = NonceSource::with_secret([1u8; 32], WINDOW);
        let auth = auth(DigestAlgorithm::Md5);
        let nonce = nonces.issue_at(T);

        let first = signed_request(DigestAlgorithm::Md5, "GET", "/private/a", "wonderland", &nonce, "00000001");
        assert_eq!(auth.verify(&first, &nonces, T + 1), Ok("alice".to_string()));

        // Mismo nc: repetición
        assert_eq!(auth.verify(&first, &nonces, T + 2), Err(AuthError::Failed));

        let next = signed_request(DigestAlgorithm::Md5, "GET", "/private/a", "wonderland", &nonce, "00000002");
        assert_eq!(auth.verify(&next, &nonces, T + 3), Ok("alice".to_string()));
    }

    #[test]
    fn test_verify_sha256() {
        let nonces = NonceSource::with_secret([2u8; 32], WINDOW);
        let auth = auth(DigestAlgorithm::Sha256);
        let nonce = nonces.issue_at(T);

        let request = signed_request(DigestAlgorithm::Sha256, "PUT", "/up", "wonderland", &nonce, "00000001");
        assert_eq!(auth.verify(&request, &nonces, T), Ok("alice".to_string()));
    }

    #[test]
    fn test_verify_failures() {
        let nonces = NonceSource::with_secret([3u8; 32], WINDOW);
        let auth = auth(DigestAlgorithm::Md5);
        let nonce = nonces.issue_at(T);

        let missing = Request::parse(b"GET /private HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(auth.verify(&missing, &nonces, T), Err(AuthError::Missing));

        let wrong = signed_request(DigestAlgorithm::Md5, "GET", "/p", "wrong", &nonce, "00000001");
        assert_eq!(auth.verify(&wrong, &nonces, T), Err(AuthError::Failed));

        let stale = signed_request(DigestAlgorithm::Md5, "GET", "/p", "wonderland", &nonce, "00000001");
        assert_eq!(auth.verify(&stale, &nonces, T + WINDOW + 1), Err(AuthError::StaleNonce));

        // Un fallo no consume el nc: el mismo request vale dentro de la ventana
        assert_eq!(auth.verify(&stale, &nonces, T + WINDOW - 1), Ok("alice".to_string()));
    }

    #[test]
    fn test_uri_must_match_request() {
        let nonces = NonceSource::with_secret([4u8; 32], WINDOW);
        let auth = auth(DigestAlgorithm::Md5);
        let nonce = nonces.issue_at(T);

        let signed = signed_request(DigestAlgorithm::Md5, "GET", "/a", "wonderland", &nonce, "00000001");
        let header = signed.header("Authorization").unwrap().to_string();
        let raw = format!("GET /b HTTP/1.1\r\nAuthorization: {header}\r\n\r\n");
        let moved = Request::parse(raw.as_bytes()).unwrap();

        assert_eq!(auth.verify(&moved, &nonces, T), Err(AuthError::Failed));
    }

    #[test]
    fn test_challenge_header() {
        let auth = auth(DigestAlgorithm::Sha256);
        let value = auth.challenge_header("abc", true);
        assert_eq!(
            value,
            "Digest realm=\"test.realm\", qop=\"auth\", nonce=\"abc\", algorithm=SHA-256, stale=true"
        );
        assert!(!auth.challenge_header("abc", false).contains("stale"));
    }
}
