//! Case-insensitive HTTP header map.

/// An order-preserving header list with case-insensitive lookup.
///
/// [`append`](Self::append) keeps duplicates (CORS and `Vary` decoration rely
/// on this); [`set`](Self::set) replaces every existing entry of that name.
///
/// # Examples
///
/// ```
/// use multilab::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.append("Content-Type", "text/plain");
/// headers.set("content-type", "application/json");
///
/// assert_eq!(headers.get("CONTENT-TYPE"), Some("application/json"));
/// assert_eq!(headers.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Headers {
    inner: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Vec::with_capacity(capacity),
        }
    }

    /// Appends an entry, keeping any earlier values for the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Replaces all entries for `name` with a single value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.inner.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.inner.push((name, value.into()));
    }

    /// Returns the first value for `name`, ignoring ASCII case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of entries, counting duplicates.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        let mut h = Headers::new();
        h.append("Origin", "http://localhost:5173");
        assert_eq!(h.get("origin"), Some("http://localhost:5173"));
        assert!(h.contains("ORIGIN"));
        assert!(!h.contains("authorization"));
    }

    #[test]
    fn append_keeps_duplicates() {
        let mut h = Headers::new();
        h.append("Vary", "Origin");
        h.append("Vary", "Accept");
        assert_eq!(h.len(), 2);
        assert_eq!(h.get("vary"), Some("Origin"));
    }

    #[test]
    fn set_replaces_every_entry() {
        let mut h = Headers::new();
        h.append("X-Title", "a");
        h.append("x-title", "b");
        h.set("X-Title", "Multi AI Lab");
        let all: Vec<_> = h.iter().collect();
        assert_eq!(all, vec![("X-Title", "Multi AI Lab")]);
    }
}
