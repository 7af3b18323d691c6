//! # Headers HTTP
//! src/http/headers.rs
//!
//! Mapa ordenado y case-insensitive que admite nombres duplicados
//! (`Set-Cookie`, `WWW-Authenticate`...). Se conserva el orden de llegada.

/// Lista ordenada de headers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega un header sin reemplazar los existentes
    pub fn append(&mut self, name: &str, value: &str) {
        self.entries.push((name.to_string(), value.to_string()));
    }

    /// Reemplaza todas las apariciones de `name` por un único valor
    pub fn set(&mut self, name: &str, value: &str) {
        self.remove(name);
        self.append(name, value);
    }

    /// Elimina todas las apariciones de `name`
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Primer valor de `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Todos los valores de `name` en orden de llegada
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// `true` si alguna aparición de `name` contiene `token` en su lista
    /// separada por comas (p. ej. `Connection: keep-alive, Upgrade`)
    pub fn has_token(&self, name: &str, token: &str) -> bool {
        self.get_all(name)
            .flat_map(|v| v.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case(token))
    }

    /// Agrega todos los headers de `other` al final
    pub fn extend(&mut self, other: Headers) {
        self.entries.extend(other.entries);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_lookup() {
        let mut headers = Headers::new();
        headers.append("Content-Type", "text/plain");
        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/plain"));
        assert!(headers.get("Content-Length").is_none());
    }

    #[test]
    fn test_duplicates_keep_order() {
        let mut headers = Headers::new();
        headers.append("X-A", "1");
        headers.append("x-a", "2");
        headers.append("X-B", "3");

        assert_eq!(headers.get("X-A"), Some("1"));
        assert_eq!(headers.get_all("X-A").collect::<Vec<_>>(), vec!["1", "2"]);
        assert_eq!(headers.len(), 3);
    }

    #[test]
    fn test_set_replaces_all() {
        let mut headers = Headers::new();
        headers.append("Connection", "keep-alive");
        headers.append("connection", "upgrade");
        headers.set("Connection", "close");

        assert_eq!(headers.get_all("connection").count(), 1);
        assert_eq!(headers.get("Connection"), Some("close"));
    }

    #[test]
    fn test_has_token() {
        let mut headers = Headers::new();
        headers.append("Connection", "keep-alive, Upgrade");
        assert!(headers.has_token("connection", "upgrade"));
        assert!(headers.has_token("Connection", "Keep-Alive"));
        assert!(!headers.has_token("Connection", "close"));
    }
}
