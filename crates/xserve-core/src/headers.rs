//! Normalized header view.
//!
//! [`Headers`] exposes only the operations every host supports: get, set,
//! append, has, delete and iteration. Host-specific conveniences (value
//! counts, JSON serialization, "get all values") are not part of this
//! surface.

use std::collections::BTreeSet;

use http::header::{HeaderMap, HeaderName, HeaderValue};

use xserve_common::RequestError;

/// Case-insensitive HTTP header collection.
///
/// Repeated headers are combined with `", "` when read, matching the web
/// platform's `Headers.get`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Headers {
    map: HeaderMap,
}

impl Headers {
    /// Create an empty header collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the combined value of a header, or `None` if absent.
    ///
    /// Invalid names are treated as absent.
    pub fn get(&self, name: &str) -> Option<String> {
        let mut values = self.map.get_all(name).iter().peekable();
        values.peek()?;

        let combined = values
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(", ");
        Some(combined)
    }

    /// Check whether a header is present.
    pub fn has(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    /// Replace every value of `name` with `value`.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), RequestError> {
        let (name, value) = parse_pair(name, value)?;
        self.map.insert(name, value);
        Ok(())
    }

    /// Add `value` to `name`, keeping existing values.
    pub fn append(&mut self, name: &str, value: &str) -> Result<(), RequestError> {
        let (name, value) = parse_pair(name, value)?;
        self.map.append(name, value);
        Ok(())
    }

    /// Remove every value of `name`. Returns `true` if anything was removed.
    pub fn delete(&mut self, name: &str) -> bool {
        self.map.remove(name).is_some()
    }

    /// Distinct header names, lowercase and sorted.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.map
            .keys()
            .map(HeaderName::as_str)
            .collect::<BTreeSet<_>>()
            .into_iter()
    }

    /// `(name, combined value)` pairs, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (String, String)> + '_ {
        self.keys()
            .filter_map(|name| self.get(name).map(|value| (name.to_string(), value)))
    }
}

impl From<HeaderMap> for Headers {
    fn from(map: HeaderMap) -> Self {
        Self { map }
    }
}

fn parse_pair(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), RequestError> {
    let header_name =
        HeaderName::try_from(name).map_err(|_| RequestError::invalid_header_name(name))?;
    let header_value =
        HeaderValue::try_from(value).map_err(|_| RequestError::invalid_header_value(name))?;
    Ok((header_name, header_value))
}
