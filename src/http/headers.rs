//! Case-insensitive header set with last-write-wins merging.
//!
//! Keeps insertion order and the caller's original casing so headers read
//! back through `get_headers` look the way they were configured.

use crate::base::neterror::NetError;
use http::header::{HeaderName, HeaderValue, SET_COOKIE};
use http::HeaderMap;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Header values cannot contain a line break, so it splits repeated cookies.
const COOKIE_SEPARATOR: char = '\n';

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    name: HeaderName,
    display: String,
    value: String,
}

/// Ordered header collection keyed case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    entries: Vec<Entry>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Build a set from name/value pairs, validating every pair.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, NetError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut set = Self::new();
        for (name, value) in pairs {
            set.insert(name.as_ref(), value.as_ref())?;
        }
        Ok(set)
    }

    /// Insert or overwrite a header. An existing entry with the same name in
    /// any casing is replaced in place, taking the new casing and value.
    pub fn insert(&mut self, name: &str, value: &str) -> Result<(), NetError> {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| NetError::InvalidHeader(name.to_string()))?;
        HeaderValue::from_str(value).map_err(|_| NetError::InvalidHeader(name.to_string()))?;

        if let Some(entry) = self.entries.iter_mut().find(|e| e.name == header_name) {
            entry.display = name.to_string();
            entry.value = value.to_string();
        } else {
            self.entries.push(Entry {
                name: header_name,
                display: name.to_string(),
                value: value.to_string(),
            });
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        let target = HeaderName::from_bytes(name.as_bytes()).ok()?;
        self.entries
            .iter()
            .find(|e| e.name == target)
            .map(|e| e.value.as_str())
    }

    /// Every value stored under `name`. Only `Set-Cookie` collected from a
    /// response yields more than one.
    pub fn get_all(&self, name: &str) -> impl Iterator<Item = &str> + '_ {
        self.get(name)
            .into_iter()
            .flat_map(|value| value.split(COOKIE_SEPARATOR))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) {
        if let Ok(target) = HeaderName::from_bytes(name.as_bytes()) {
            self.entries.retain(|e| e.name != target);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate as `(name, value)` using the original casing.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.entries
            .iter()
            .map(|e| (e.display.as_str(), e.value.as_str()))
    }

    /// Merge `other` into `self`; values from `other` win.
    pub fn merge(&mut self, other: &HeaderSet) {
        for entry in &other.entries {
            if let Some(existing) = self.entries.iter_mut().find(|e| e.name == entry.name) {
                existing.display = entry.display.clone();
                existing.value = entry.value.clone();
            } else {
                self.entries.push(entry.clone());
            }
        }
    }

    /// Non-mutating form of [`merge`](Self::merge).
    pub fn merged(&self, other: &HeaderSet) -> HeaderSet {
        let mut out = self.clone();
        out.merge(other);
        out
    }

    /// Convert into a wire `HeaderMap`, preserving insertion order.
    pub fn to_header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for entry in &self.entries {
            // Values were validated on insert; only Set-Cookie carries line breaks.
            for part in entry.value.split(COOKIE_SEPARATOR) {
                if let Ok(value) = HeaderValue::from_str(part) {
                    map.append(entry.name.clone(), value);
                }
            }
        }
        map
    }

    /// Collect response headers. Non UTF-8 bytes are replaced.
    ///
    /// Repeated fields are joined with `", "`. `Set-Cookie` is the exception:
    /// its values may contain commas, so they are joined with `'\n'` and read
    /// back one by one through [`get_all`](Self::get_all).
    pub fn from_header_map(map: &HeaderMap) -> HeaderSet {
        let mut set = HeaderSet::new();
        for name in map.keys() {
            let separator = if *name == SET_COOKIE { "\n" } else { ", " };
            let value = map
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .collect::<Vec<_>>()
                .join(separator);
            set.entries.push(Entry {
                name: name.clone(),
                display: name.as_str().to_string(),
                value,
            });
        }
        set
    }
}

impl Serialize for HeaderSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for HeaderSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HeaderSetVisitor;

        impl<'de> Visitor<'de> for HeaderSetVisitor {
            type Value = HeaderSet;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of header names to string values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<HeaderSet, A::Error> {
                let mut set = HeaderSet::new();
                while let Some((name, value)) = access.next_entry::<String, String>()? {
                    set.insert(&name, &value).map_err(serde::de::Error::custom)?;
                }
                Ok(set)
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<HeaderSet, E> {
                Ok(HeaderSet::new())
            }
        }

        deserializer.deserialize_any(HeaderSetVisitor)
    }
}
