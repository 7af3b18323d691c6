//! # Parsing de Requests HTTP/1.x
//! src/http/request.rs
//!
//! Convierte el bloque de headers ya delimitado por el [`Framer`] en un
//! [`Request`]. El body no pasa por aquí: lo lee la conexión según la
//! política que decide el framer.
//!
//! ## Formato
//!
//! ```text
//! PUT /files/a.txt?mode=raw HTTP/1.1\r\n
//! Host: localhost:8080\r\n
//! Content-Length: 5\r\n
//! \r\n
//! ```
//!
//! Se tolera LF sin CR como fin de línea.
//!
//! [`Framer`]: crate::http::Framer

use crate::error::HttpError;
use crate::http::Headers;
use std::collections::HashMap;

/// Máximo de headers por request
pub const MAX_HEADERS: usize = 64;

/// Métodos HTTP aceptados (incluye los de WebDAV)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    GET,
    HEAD,
    POST,
    PUT,
    DELETE,
    OPTIONS,
    CONNECT,
    TRACE,
    PATCH,
    PROPFIND,
    PROPPATCH,
    MKCOL,
    LOCK,
    UNLOCK,
    MOVE,
    COPY,
}

impl Method {
    const ALL: [Method; 16] = [
        Method::GET,
        Method::HEAD,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
        Method::CONNECT,
        Method::TRACE,
        Method::PATCH,
        Method::PROPFIND,
        Method::PROPPATCH,
        Method::MKCOL,
        Method::LOCK,
        Method::UNLOCK,
        Method::MOVE,
        Method::COPY,
    ];

    /// Parsea un método (sensible a mayúsculas, como exige HTTP)
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.as_str() == s)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::HEAD => "HEAD",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::OPTIONS => "OPTIONS",
            Method::CONNECT => "CONNECT",
            Method::TRACE => "TRACE",
            Method::PATCH => "PATCH",
            Method::PROPFIND => "PROPFIND",
            Method::PROPPATCH => "PROPPATCH",
            Method::MKCOL => "MKCOL",
            Method::LOCK => "LOCK",
            Method::UNLOCK => "UNLOCK",
            Method::MOVE => "MOVE",
            Method::COPY => "COPY",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request HTTP ya parseado (sin body)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: Method,

    /// Request target tal como llegó (lo firma el cliente en Digest)
    uri: String,

    /// Path decodificado y normalizado (sin `.`, `..` ni `//`)
    path: String,

    query_string: Option<String>,
    query_params: HashMap<String, String>,

    /// "HTTP/1.0" o "HTTP/1.1"
    version: String,

    headers: Headers,
}

impl Request {
    /// Parsea un bloque de headers completo (request line + headers + línea vacía)
    ///
    /// # Ejemplo
    ///
    /// ```
    /// use http_engine::http::Request;
    ///
    /// let raw = b"GET /status?verbose=1 HTTP/1.1\r\nHost: x\r\n\r\n";
    /// let request = Request::parse(raw).unwrap();
    ///
    /// assert_eq!(request.path(), "/status");
    /// assert_eq!(request.query_param("verbose"), Some("1"));
    /// ```
    pub fn parse(head: &[u8]) -> Result<Self, HttpError> {
        let text = String::from_utf8_lossy(head);
        let mut lines = text
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line));

        let request_line = lines
            .next()
            .filter(|line| !line.is_empty())
            .ok_or_else(|| HttpError::MalformedRequest("empty request line".into()))?;

        let (method, uri, version) = Self::parse_request_line(request_line)?;
        let (path, query_string) = Self::split_target(uri)?;
        let query_params = query_string
            .as_deref()
            .map(parse_query_string)
            .unwrap_or_default();

        let headers = Self::parse_headers(lines.take_while(|line| !line.is_empty()))?;

        Ok(Request {
            method,
            uri: uri.to_string(),
            path,
            query_string,
            query_params,
            version,
            headers,
        })
    }

    /// `METHOD SP request-target SP HTTP/x.y`
    fn parse_request_line(line: &str) -> Result<(Method, &str, String), HttpError> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(HttpError::MalformedRequest(format!(
                "invalid request line: {line}"
            )));
        }

        let method = Method::parse(parts[0]).ok_or_else(|| {
            HttpError::MalformedRequest(format!("unsupported method: {}", parts[0]))
        })?;

        let version = parts[2];
        match version {
            "HTTP/1.0" | "HTTP/1.1" => {}
            v if v.starts_with("HTTP/") => {
                return Err(HttpError::UnsupportedVersion(v.to_string()));
            }
            v => {
                return Err(HttpError::MalformedRequest(format!(
                    "invalid protocol: {v}"
                )));
            }
        }

        Ok((method, parts[1], version.to_string()))
    }

    /// Separa path y query. Acepta origin-form (`/a/b`), asterisk-form (`*`)
    /// y absolute-form (`http://host/a/b`).
    fn split_target(uri: &str) -> Result<(String, Option<String>), HttpError> {
        let origin = if uri == "*" {
            return Ok(("*".to_string(), None));
        } else if uri.starts_with('/') {
            uri
        } else if let Some(rest) = uri
            .strip_prefix("http://")
            .or_else(|| uri.strip_prefix("https://"))
        {
            rest.find('/').map(|i| &rest[i..]).unwrap_or("/")
        } else {
            return Err(HttpError::MalformedRequest(format!("invalid URI: {uri}")));
        };

        let (raw_path, query) = match origin.split_once('?') {
            Some((p, q)) => (p, Some(q.to_string())),
            None => (origin, None),
        };

        Ok((normalize_path(&percent_decode(raw_path, false)), query))
    }

    /// Headers `Name: Value`, uno por línea. No se admite obs-fold.
    fn parse_headers<'a>(lines: impl Iterator<Item = &'a str>) -> Result<Headers, HttpError> {
        let mut headers = Headers::new();

        for line in lines {
            if line.starts_with(' ') || line.starts_with('\t') {
                return Err(HttpError::MalformedRequest(
                    "folded header lines are not supported".into(),
                ));
            }

            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| HttpError::MalformedRequest(format!("invalid header: {line}")))?;

            if name.is_empty() || !name.bytes().all(is_token_byte) {
                return Err(HttpError::MalformedRequest(format!(
                    "invalid header name: {name}"
                )));
            }

            if headers.len() == MAX_HEADERS {
                return Err(HttpError::MalformedRequest("too many headers".into()));
            }

            headers.append(name, value.trim());
        }

        Ok(headers)
    }

    // === Accesores ===

    pub fn method(&self) -> Method {
        self.method
    }

    /// Request target original, sin decodificar
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    pub fn query_params(&self) -> &HashMap<String, String> {
        &self.query_params
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params.get(name).map(|s| s.as_str())
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn is_http11(&self) -> bool {
        self.version == "HTTP/1.1"
    }

    /// `Expect: 100-continue` en un request HTTP/1.1
    pub fn expects_continue(&self) -> bool {
        self.is_http11()
            && self
                .header("Expect")
                .is_some_and(|v| v.eq_ignore_ascii_case("100-continue"))
    }

    /// `Upgrade: websocket` + `Connection: upgrade`
    pub fn is_websocket_upgrade(&self) -> bool {
        self.headers.has_token("Upgrade", "websocket")
            && self.headers.has_token("Connection", "upgrade")
    }
}

/// tchar de RFC 9110
pub(crate) fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Decodifica `%XX` (y `+` como espacio si `form` es true).
/// Las secuencias inválidas se copian tal cual.
pub fn percent_decode(s: &str, form: bool) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        i += 3;
                        continue;
                    }
                    _ => out.push(b'%'),
                }
            }
            b'+' if form => out.push(b' '),
            b => out.push(b),
        }
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

/// Elimina segmentos `.` y `..` y colapsa barras repetidas.
/// Un `..` nunca sube por encima de la raíz.
pub fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    let mut normalized = String::with_capacity(path.len());
    normalized.push('/');
    normalized.push_str(&segments.join("/"));

    let trailing = path.ends_with('/') || path.ends_with("/.") || path.ends_with("/..");
    if trailing && !segments.is_empty() {
        normalized.push('/');
    }

    normalized
}

/// `a=1&b=hello+world` → {"a": "1", "b": "hello world"}
fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|param| !param.is_empty())
        .map(|param| match param.split_once('=') {
            Some((key, value)) => (percent_decode(key, true), percent_decode(value, true)),
            None => (percent_decode(param, true), String::new()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_get() {
        let request = Request::parse(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();

        assert_eq!(request.method(), Method::GET);
        assert_eq!(request.path(), "/");
        assert_eq!(request.version(), "HTTP/1.1");
        assert!(request.is_http11());
        assert!(request.query_params().is_empty());
    }

    #[test]
    fn test_parse_with_query_params() {
        let raw = b"GET /search?q=hello%20world&lang=es+ES&flag HTTP/1.0\r\n\r\n";
        let request = Request::parse(raw).unwrap();

        assert_eq!(request.path(), "/search");
        assert_eq!(request.query_string(), Some("q=hello%20world&lang=es+ES&flag"));
        assert_eq!(request.query_param("q"), Some("hello world"));
        assert_eq!(request.query_param("lang"), Some("es ES"));
        assert_eq!(request.query_param("flag"), Some(""));
    }

    #[test]
    fn test_headers_keep_duplicates_and_case() {
        let raw = b"GET / HTTP/1.1\r\nHost: a\r\nX-Tag: 1\r\nx-tag: 2\r\n\r\n";
        let request = Request::parse(raw).unwrap();

        assert_eq!(request.header("host"), Some("a"));
        assert_eq!(
            request.headers().get_all("X-TAG").collect::<Vec<_>>(),
            vec!["1", "2"]
        );
    }

    #[test]
    fn test_bare_lf_line_endings() {
        let request = Request::parse(b"DELETE /item/7 HTTP/1.1\nHost: x\n\n").unwrap();
        assert_eq!(request.method(), Method::DELETE);
        assert_eq!(request.header("Host"), Some("x"));
    }

    #[test]
    fn test_path_is_decoded_and_normalized() {
        let request = Request::parse(b"GET /a/./b/../c//d%20e HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(request.path(), "/a/c/d e");
        assert_eq!(request.uri(), "/a/./b/../c//d%20e");

        let request = Request::parse(b"GET /../../etc/passwd HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(request.path(), "/etc/passwd");
    }

    #[test]
    fn test_absolute_and_asterisk_targets() {
        let request = Request::parse(b"GET http://example.com/x?y=1 HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(request.path(), "/x");
        assert_eq!(request.query_param("y"), Some("1"));

        let request = Request::parse(b"OPTIONS * HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(request.path(), "*");
    }

    #[test]
    fn test_webdav_methods_accepted() {
        for method in ["PROPFIND", "MKCOL", "LOCK", "UNLOCK", "MOVE", "COPY", "PROPPATCH"] {
            let raw = format!("{method} /dav HTTP/1.1\r\n\r\n");
            let request = Request::parse(raw.as_bytes()).unwrap();
            assert_eq!(request.method().as_str(), method);
        }
    }

    #[test]
    fn test_unknown_method_is_malformed() {
        let result = Request::parse(b"BREW /pot HTTP/1.1\r\n\r\n");
        assert!(matches!(result, Err(HttpError::MalformedRequest(_))));

        let result = Request::parse(b"get / HTTP/1.1\r\n\r\n");
        assert!(matches!(result, Err(HttpError::MalformedRequest(_))));
    }

    #[test]
    fn test_unsupported_version() {
        let result = Request::parse(b"GET / HTTP/2.0\r\n\r\n");
        assert!(matches!(result, Err(HttpError::UnsupportedVersion(_))));

        let result = Request::parse(b"GET / FTP/1.0\r\n\r\n");
        assert!(matches!(result, Err(HttpError::MalformedRequest(_))));
    }

    #[test]
    fn test_invalid_request_line() {
        let result = Request::parse(b"GET\r\n\r\n");
        assert!(matches!(result, Err(HttpError::MalformedRequest(_))));

        let result = Request::parse(b"GET relative HTTP/1.1\r\n\r\n");
        assert!(matches!(result, Err(HttpError::MalformedRequest(_))));

        let result = Request::parse(b"");
        assert!(matches!(result, Err(HttpError::MalformedRequest(_))));
    }

    #[test]
    fn test_invalid_headers() {
        let result = Request::parse(b"GET / HTTP/1.1\r\nNoColonHere\r\n\r\n");
        assert!(matches!(result, Err(HttpError::MalformedRequest(_))));

        let result = Request::parse(b"GET / HTTP/1.1\r\nBad Name: x\r\n\r\n");
        assert!(matches!(result, Err(HttpError::MalformedRequest(_))));

        let result = Request::parse(b"GET / HTTP/1.1\r\nA: 1\r\n folded\r\n\r\n");
        assert!(matches!(result, Err(HttpError::MalformedRequest(_))));
    }

    #[test]
    fn test_too_many_headers() {
        let mut raw = String::from("GET / HTTP/1.1\r\n");
        for i in 0..=MAX_HEADERS {
            raw.push_str(&format!("X-{i}: v\r\n"));
        }
        raw.push_str("\r\n");

        let result = Request::parse(raw.as_bytes());
        assert!(matches!(result, Err(HttpError::MalformedRequest(_))));
    }

    #[test]
    fn test_expect_and_upgrade_helpers() {
        let raw = b"PUT /f HTTP/1.1\r\nExpect: 100-Continue\r\n\r\n";
        assert!(Request::parse(raw).unwrap().expects_continue());

        let raw = b"PUT /f HTTP/1.0\r\nExpect: 100-continue\r\n\r\n";
        assert!(!Request::parse(raw).unwrap().expects_continue());

        let raw = b"GET /ws HTTP/1.1\r\nUpgrade: WebSocket\r\nConnection: keep-alive, Upgrade\r\n\r\n";
        assert!(Request::parse(raw).unwrap().is_websocket_upgrade());
    }

    #[test]
    fn test_percent_decode_invalid_sequences() {
        assert_eq!(percent_decode("100%", false), "100%");
        assert_eq!(percent_decode("%zz", false), "%zz");
        assert_eq!(percent_decode("a+b", false), "a+b");
        assert_eq!(percent_decode("a+b", true), "a b");
        assert_eq!(percent_decode("%41%42", false), "AB");
    }
}
