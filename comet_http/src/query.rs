//! Query-string parameters with forgiving defaults.

use std::collections::HashMap;

/// Parsed query parameters.
///
/// Absent or malformed values fall back to the caller's default, so every
/// endpoint keeps answering in JSONP instead of surfacing parse errors to
/// clients that cannot read them.
#[derive(Debug)]
pub(crate) struct Params(HashMap<String, String>);

impl Params {
    pub(crate) fn new(params: HashMap<String, String>) -> Self {
        Self(params)
    }

    pub(crate) fn get_i64(&self, name: &str, default: i64) -> i64 {
        self.0.get(name).and_then(|v| v.parse().ok()).unwrap_or(default)
    }

    pub(crate) fn get_u32(&self, name: &str, default: u32) -> u32 {
        self.0.get(name).and_then(|v| v.parse().ok()).unwrap_or(default)
    }

    pub(crate) fn get_str(&self, name: &str, default: &str) -> String {
        self.0.get(name).cloned().unwrap_or_else(|| default.to_owned())
    }

    pub(crate) fn get_opt(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Params {
        Params::new(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
        )
    }

    #[test]
    fn numbers_parse_with_defaults() {
        let q = params(&[("cid", "3"), ("seq", "junk")]);
        assert_eq!(q.get_i64("cid", -1), 3);
        assert_eq!(q.get_u32("seq", 0), 0);
        assert_eq!(q.get_i64("missing", -1), -1);
    }

    #[test]
    fn strings_fall_back() {
        let q = params(&[("cb", "f")]);
        assert_eq!(q.get_str("cb", "jsonp"), "f");
        assert_eq!(q.get_str("token", ""), "");
        assert_eq!(q.get_opt("cb"), Some("f"));
        assert_eq!(q.get_opt("cname"), None);
    }
}
