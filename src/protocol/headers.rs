//! Ordered multi-valued header collection

use bytes::{BufMut, BytesMut};

/// HTTP headers in insertion order
///
/// Values sharing a name (compared ASCII case-insensitively) are grouped
/// under the first spelling of that name, at the position it first appeared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, Vec<String>)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Add a value, keeping any existing ones
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        match self.position(&name) {
            Some(i) => self.entries[i].1.push(value.into()),
            None => self.entries.push((name, vec![value.into()])),
        }
    }

    /// Replace all values of `name` with a single value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        match self.position(&name) {
            Some(i) => self.entries[i].1 = vec![value.into()],
            None => self.entries.push((name, vec![value.into()])),
        }
    }

    /// First value of a header; the authoritative one when duplicated
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).first().map(String::as_str)
    }

    pub fn get_all(&self, name: &str) -> &[String] {
        match self.position(name) {
            Some(i) => &self.entries[i].1,
            None => &[],
        }
    }

    /// Iterate `(name, value)` pairs in serialization order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|(n, vs)| vs.iter().map(move |v| (n.as_str(), v.as_str())))
    }

    /// Number of distinct header names
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write every pair as `Name: value\r\n`
    pub fn write_to(&self, buf: &mut BytesMut) {
        for (name, value) in self.iter() {
            buf.put_slice(name.as_bytes());
            buf.put_slice(b": ");
            buf.put_slice(value.as_bytes());
            buf.put_slice(b"\r\n");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_is_kept() {
        let mut headers = Headers::new();
        headers.append("Zeta", "1");
        headers.append("Alpha", "2");
        headers.append("Middle", "3");

        let names: Vec<_> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["Zeta", "Alpha", "Middle"]);
    }

    #[test]
    fn test_multi_values_grouped_under_first_spelling() {
        let mut headers = Headers::new();
        headers.append("Set-Cookie", "a=1");
        headers.append("X-Other", "x");
        headers.append("set-cookie", "b=2");

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("SET-COOKIE"), Some("a=1"));
        assert_eq!(headers.get_all("Set-Cookie"), ["a=1", "b=2"]);

        let mut buf = BytesMut::new();
        headers.write_to(&mut buf);
        assert_eq!(
            &buf[..],
            b"Set-Cookie: a=1\r\nSet-Cookie: b=2\r\nX-Other: x\r\n"
        );
    }

    #[test]
    fn test_set_replaces_all_values() {
        let mut headers = Headers::new();
        headers.append("Content-Length", "3");
        headers.append("Content-Length", "4");
        headers.set("content-length", "10");
        assert_eq!(headers.get_all("Content-Length"), ["10"]);
        assert_eq!(headers.len(), 1);
    }
}
