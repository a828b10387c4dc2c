//! Approximate form decoding for response bodies.
//!
//! Multipart payloads are scanned, not parsed: every `name="key"` followed by a blank line
//! yields the text up to the next boundary. Nested parts, transfer encodings and part headers
//! other than the name are ignored. Anything that does not look like a form decodes to an empty
//! [`FormData`].

use std::sync::LazyLock;

use regex::Regex;

static LEADING_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^--\w+").expect("leading boundary pattern is valid"));

/// Ordered form entries. Keys may repeat.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormData {
    entries: Vec<(String, String)>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// First value recorded for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(key, _)| key == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<(String, String)> {
        self.entries
    }
}

impl IntoIterator for FormData {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K, V> FromIterator<(K, V)> for FormData
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

/// Decodes `text` according to the response content type.
///
/// `application/x-www-form-urlencoded` bodies are decoded as query strings. Everything else goes
/// through the multipart scan, using the content type's `boundary` parameter when present.
pub(crate) fn decode_form(content_type: Option<&str>, text: &str) -> FormData {
    if let Some(content_type) = content_type {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if essence == "application/x-www-form-urlencoded" {
            return url::form_urlencoded::parse(text.as_bytes())
                .map(|(name, value)| (name.into_owned(), value.into_owned()))
                .collect();
        }
        if let Some(boundary) = boundary_parameter(content_type) {
            return scan_multipart(text, &format!("--{boundary}"));
        }
    }

    match LEADING_BOUNDARY.find(text) {
        Some(boundary) => scan_multipart(text, boundary.as_str()),
        None => FormData::new(),
    }
}

fn boundary_parameter(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|parameter| {
        let (name, value) = parameter.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let value = value.trim().trim_matches('"');
        (!value.is_empty()).then_some(value)
    })
}

fn scan_multipart(text: &str, boundary: &str) -> FormData {
    let pattern = format!(
        r#"(?s)name="([^"]*)"[^\r\n]*(?:\r?\n[^\r\n]+)*\r?\n\r?\n(.*?){}"#,
        regex::escape(boundary)
    );
    let Ok(field) = Regex::new(&pattern) else {
        return FormData::new();
    };

    field
        .captures_iter(text)
        .map(|captures| {
            let name = captures.get(1).map_or("", |item| item.as_str());
            let value = captures.get(2).map_or("", |item| item.as_str()).trim();
            (name.to_owned(), value.to_owned())
        })
        .collect()
}
