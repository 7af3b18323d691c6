//! # Construcción de Respuestas HTTP
//! src/http/response.rs
//!
//! API para construir respuestas de forma programática y serializarlas.
//! La conexión completa los headers de transporte (`Date`, `Server`,
//! `Connection`) al enviarlas.
//!
//! ## Ejemplo de uso
//!
//! ```
//! use http_engine::http::{Response, StatusCode};
//!
//! let response = Response::new(StatusCode::Ok)
//!     .with_header("Content-Type", "text/plain")
//!     .with_body("hola");
//!
//! let bytes = response.to_bytes("HTTP/1.1");
//! assert!(bytes.starts_with(b"HTTP/1.1 200 OK\r\n"));
//! ```

use super::{Headers, StatusCode};
use serde::Serialize;

/// Respuesta HTTP completa en memoria
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,

    /// Headers en el orden en que se agregaron
    headers: Headers,

    body: Vec<u8>,
}

impl Response {
    /// Respuesta sin headers ni body
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// Fija un header, reemplazando el anterior del mismo nombre
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Agrega un header sin reemplazar (p. ej. varios `Set-Cookie`)
    pub fn add_header(&mut self, name: &str, value: &str) {
        self.headers.append(name, value);
    }

    /// Body de texto; calcula `Content-Length`
    pub fn with_body(self, body: &str) -> Self {
        self.with_body_bytes(body.as_bytes().to_vec())
    }

    /// Body binario; calcula `Content-Length`
    pub fn with_body_bytes(mut self, body: Vec<u8>) -> Self {
        self.headers.set("Content-Length", &body.len().to_string());
        self.body = body;
        self
    }

    /// 200 OK con `text/plain`
    pub fn text(body: &str) -> Self {
        Self::new(StatusCode::Ok)
            .with_header("Content-Type", "text/plain; charset=utf-8")
            .with_body(body)
    }

    /// 200 OK con el valor serializado a JSON
    ///
    /// # Ejemplo
    /// ```
    /// use http_engine::http::Response;
    ///
    /// let response = Response::json(&serde_json::json!({"status": "ok"}));
    /// assert_eq!(response.body(), br#"{"status":"ok"}"#);
    /// ```
    pub fn json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::new(StatusCode::Ok)
                .with_header("Content-Type", "application/json")
                .with_body_bytes(body),
            Err(e) => Self::error(StatusCode::InternalServerError, &e.to_string()),
        }
    }

    /// Error con mensaje JSON: `{"error": "mensaje"}`
    pub fn error(status: StatusCode, message: &str) -> Self {
        let body = serde_json::json!({ "error": message }).to_string();
        Self::new(status)
            .with_header("Content-Type", "application/json")
            .with_body(&body)
    }

    /// 302 hacia `location`
    pub fn redirect(location: &str) -> Self {
        Self::new(StatusCode::Found)
            .with_header("Location", location)
            .with_body("")
    }

    /// Status line + headers + línea vacía
    pub fn head_bytes(&self, version: &str) -> Vec<u8> {
        let mut head = format!("{} {}\r\n", version, self.status);
        for (name, value) in self.headers.iter() {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");
        head.into_bytes()
    }

    /// Respuesta completa lista para enviar
    pub fn to_bytes(&self, version: &str) -> Vec<u8> {
        let mut bytes = self.head_bytes(version);
        bytes.extend_from_slice(&self.body);
        bytes
    }

    /// `true` si el tamaño del body queda delimitado para el cliente
    pub fn is_delimited(&self) -> bool {
        !self.status.allows_body()
            || self.headers.contains("Content-Length")
            || self.headers.has_token("Transfer-Encoding", "chunked")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_response() {
        let response = Response::new(StatusCode::Ok);
        assert_eq!(response.status(), StatusCode::Ok);
        assert!(response.headers().is_empty());
        assert!(response.body().is_empty());
    }

    #[test]
    fn test_with_header_replaces_add_header_appends() {
        let mut response = Response::new(StatusCode::Ok)
            .with_header("Content-Type", "text/plain")
            .with_header("content-type", "text/html");
        response.add_header("Set-Cookie", "a=1");
        response.add_header("Set-Cookie", "b=2");

        assert_eq!(response.headers().get("Content-Type"), Some("text/html"));
        assert_eq!(response.headers().get_all("set-cookie").count(), 2);
    }

    #[test]
    fn test_with_body_sets_length() {
        let response = Response::new(StatusCode::Ok).with_body("Hello World");
        assert_eq!(response.body(), b"Hello World");
        assert_eq!(response.headers().get("Content-Length"), Some("11"));

        let response = Response::new(StatusCode::Ok).with_body_bytes(vec![0, 1, 2, 0xff]);
        assert_eq!(response.headers().get("Content-Length"), Some("4"));
    }

    #[test]
    fn test_json_and_error() {
        let response = Response::json(&serde_json::json!({"n": 1}));
        assert_eq!(response.headers().get("Content-Type"), Some("application/json"));
        assert_eq!(response.body(), br#"{"n":1}"#);

        let response = Response::error(StatusCode::BadRequest, "bad \"quote\"");
        assert_eq!(response.status(), StatusCode::BadRequest);
        let parsed: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(parsed["error"], "bad \"quote\"");
    }

    #[test]
    fn test_to_bytes_keeps_header_order() {
        let response = Response::new(StatusCode::NotFound)
            .with_header("X-First", "1")
            .with_header("X-Second", "2")
            .with_body("nope");

        let text = String::from_utf8(response.to_bytes("HTTP/1.0")).unwrap();
        assert!(text.starts_with("HTTP/1.0 404 Not Found\r\n"));
        assert!(text.find("X-First").unwrap() < text.find("X-Second").unwrap());
        assert!(text.ends_with("Content-Length: 4\r\n\r\nnope"));
    }

    #[test]
    fn test_is_delimited() {
        assert!(Response::new(StatusCode::Ok).with_body("").is_delimited());
        assert!(Response::new(StatusCode::NoContent).is_delimited());
        assert!(!Response::new(StatusCode::Ok).is_delimited());
        assert!(Response::new(StatusCode::Ok)
            .with_header("Transfer-Encoding", "chunked")
            .is_delimited());
    }

    #[test]
    fn test_redirect() {
        let response = Response::redirect("https://example.com:8443/x");
        assert_eq!(response.status(), StatusCode::Found);
        assert_eq!(response.headers().get("Location"), Some("https://example.com:8443/x"));
        assert_eq!(response.headers().get("Content-Length"), Some("0"));
    }
}
