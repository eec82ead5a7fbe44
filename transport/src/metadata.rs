//! Call metadata (headers, initial metadata, trailers).

/// Ordered key-value metadata attached to a call.
///
/// Metadata rides in three positions: client request headers, server
/// initial metadata (before the first message), and the trailers
/// delivered with the terminal status. Entries keep their insertion
/// order and may repeat; keys compare case-insensitively, the way header
/// names do on the wire, and are stored exactly as given.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pairs: Vec<(String, String)>,
}

impl Metadata {
    /// Create empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a key-value pair. Repeated keys accumulate in order.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    /// First value recorded for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Every value recorded for `key`, in insertion order.
    pub fn all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> {
        self.pairs
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// All entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Number of entries, repeats included.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }
}

/// Response compression hint carried in the terminal op batch.
///
/// The loopback link records the level without compressing; a real
/// transport would honor it per message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionLevel {
    None,
    Low,
    Medium,
    High,
}

impl CompressionLevel {
    /// Wire name of the level.
    pub fn as_str(self) -> &'static str {
        match self {
            CompressionLevel::None => "none",
            CompressionLevel::Low => "low",
            CompressionLevel::Medium => "medium",
            CompressionLevel::High => "high",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_compare_case_insensitively_but_keep_their_spelling() {
        let mut md = Metadata::new();
        md.insert("Content-Type", "text/event-stream; charset=UTF-8");
        assert_eq!(md.get("content-type"), Some("text/event-stream; charset=UTF-8"));
        assert_eq!(md.get("CONTENT-TYPE"), Some("text/event-stream; charset=UTF-8"));
        let (key, _) = md.iter().next().unwrap();
        assert_eq!(key, "Content-Type");
    }

    #[test]
    fn test_repeats_keep_insertion_order() {
        let mut md = Metadata::new();
        md.insert("x-tag", "a");
        md.insert("other", "z");
        md.insert("X-Tag", "b");
        assert_eq!(md.get("x-tag"), Some("a"));
        let values: Vec<&str> = md.all("x-tag").collect();
        assert_eq!(values, ["a", "b"]);
        assert_eq!(md.len(), 3);
    }

    #[test]
    fn test_iter_preserves_order_across_keys() {
        let mut md = Metadata::new();
        md.insert("first", "1");
        md.insert("second", "2");
        md.insert("first", "3");
        let entries: Vec<(&str, &str)> = md.iter().collect();
        assert_eq!(entries, [("first", "1"), ("second", "2"), ("first", "3")]);
    }

    #[test]
    fn test_missing_key() {
        let md = Metadata::new();
        assert!(md.is_empty());
        assert_eq!(md.get("absent"), None);
        assert_eq!(md.all("absent").count(), 0);
    }

    #[test]
    fn test_compression_level_names() {
        assert_eq!(CompressionLevel::None.as_str(), "none");
        assert_eq!(CompressionLevel::High.as_str(), "high");
    }
}
