//! Owner-scoped cache keys.
//!
//! A `CacheKey` names exactly one cached collection: one collection kind for
//! one owner. Its private inner struct means a key can only be built from an
//! already validated `CollectionKind` and `OwnerId`, so a malformed key never
//! reaches a cache store.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Separator between the collection kind and the owner in the rendered key.
pub const SEPARATOR: char = ':';

/// Maximum byte length of either key component.
pub const MAX_PART_LEN: usize = 256;

fn validate_part(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: field.to_string(),
        });
    }
    if value.len() > MAX_PART_LEN {
        return Err(ValidationError::invalid(
            field,
            format!("longer than {} bytes", MAX_PART_LEN),
        ));
    }
    if let Some(c) = value
        .chars()
        .find(|c| *c == SEPARATOR || c.is_whitespace() || c.is_control())
    {
        return Err(ValidationError::invalid(
            field,
            format!("contains forbidden character {:?}", c),
        ));
    }
    Ok(())
}

/// Identifier of the owner of a collection (usually a user id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        validate_part("owner_id", &value)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for OwnerId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OwnerId> for String {
    fn from(owner: OwnerId) -> Self {
        owner.0
    }
}

impl FromStr for OwnerId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Namespace of one kind of owner-scoped collection, e.g. `dashboards`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionKind(Cow<'static, str>);

impl CollectionKind {
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        validate_part("collection_kind", &value)?;
        Ok(Self(Cow::Owned(value)))
    }

    /// Build a kind from a literal. Literals are checked in debug builds.
    pub fn from_static(value: &'static str) -> Self {
        debug_assert!(
            validate_part("collection_kind", value).is_ok(),
            "invalid collection kind literal {:?}",
            value
        );
        Self(Cow::Borrowed(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A cache key scoped to one owner and one collection kind.
///
/// Rendered as `"{kind}:{owner}"`, e.g. `"dashboards:u1"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    inner: CacheKeyInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct CacheKeyInner {
    kind: CollectionKind,
    owner: OwnerId,
    rendered: String,
}

impl CacheKey {
    pub fn new(kind: CollectionKind, owner: OwnerId) -> Self {
        let rendered = format!("{}{}{}", kind, SEPARATOR, owner);
        Self {
            inner: CacheKeyInner {
                kind,
                owner,
                rendered,
            },
        }
    }

    /// Parse a rendered key. Exactly one separator is allowed.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let (kind, owner) = value.split_once(SEPARATOR).ok_or_else(|| {
            ValidationError::invalid("cache_key", format!("missing '{}' separator", SEPARATOR))
        })?;
        Ok(Self::new(CollectionKind::new(kind)?, OwnerId::new(owner)?))
    }

    pub fn kind(&self) -> &CollectionKind {
        &self.inner.kind
    }

    pub fn owner(&self) -> &OwnerId {
        &self.inner.owner
    }

    pub fn as_str(&self) -> &str {
        &self.inner.rendered
    }

    /// Rendered key with an optional namespace prefix, for shared stores.
    pub fn namespaced(&self, namespace: Option<&str>) -> String {
        match namespace {
            Some(ns) if !ns.is_empty() => format!("{}{}{}", ns, SEPARATOR, self.as_str()),
            _ => self.inner.rendered.clone(),
        }
    }
}

impl FromStr for CacheKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Serialize for CacheKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CacheKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dashboards() -> CollectionKind {
        CollectionKind::from_static("dashboards")
    }

    #[test]
    fn test_new_and_getters() {
        let owner = OwnerId::new("u1").expect("valid owner");
        let key = CacheKey::new(dashboards(), owner.clone());

        assert_eq!(key.kind().as_str(), "dashboards");
        assert_eq!(key.owner(), &owner);
        assert_eq!(key.as_str(), "dashboards:u1");
        assert_eq!(key.to_string(), "dashboards:u1");
    }

    #[test]
    fn test_parse_rendered_key() {
        let key = CacheKey::parse("dashboards:user_2abc").expect("parse should succeed");
        assert_eq!(key.kind().as_str(), "dashboards");
        assert_eq!(key.owner().as_str(), "user_2abc");
    }

    #[test]
    fn test_parse_rejects_malformed_keys() {
        assert!(CacheKey::parse("dashboards").is_err());
        assert!(CacheKey::parse(":u1").is_err());
        assert!(CacheKey::parse("dashboards:").is_err());
        assert!(CacheKey::parse("dashboards:u1:extra").is_err());
        assert!(CacheKey::parse("dash boards:u1").is_err());
        assert!(CacheKey::parse("").is_err());
    }

    #[test]
    fn test_owner_id_validation() {
        assert!(OwnerId::new("u1").is_ok());
        assert_eq!(
            OwnerId::new(""),
            Err(ValidationError::RequiredFieldMissing {
                field: "owner_id".to_string()
            })
        );
        assert!(OwnerId::new("a:b").is_err());
        assert!(OwnerId::new("tab\there").is_err());
        assert!(OwnerId::new("x".repeat(MAX_PART_LEN)).is_ok());
        assert!(OwnerId::new("x".repeat(MAX_PART_LEN + 1)).is_err());
    }

    #[test]
    fn test_different_owners_different_keys() {
        let k1 = CacheKey::new(dashboards(), OwnerId::new("u1").expect("valid owner"));
        let k2 = CacheKey::new(dashboards(), OwnerId::new("u2").expect("valid owner"));
        assert_ne!(k1, k2);
        assert_ne!(k1.as_str(), k2.as_str());
    }

    #[test]
    fn test_same_owner_different_kinds_different_keys() {
        let owner = OwnerId::new("u1").expect("valid owner");
        let k1 = CacheKey::new(dashboards(), owner.clone());
        let k2 = CacheKey::new(CollectionKind::from_static("themes"), owner);
        assert_ne!(k1.as_str(), k2.as_str());
    }

    #[test]
    fn test_namespaced() {
        let key = CacheKey::parse("dashboards:u1").expect("parse should succeed");
        assert_eq!(key.namespaced(Some("vantage")), "vantage:dashboards:u1");
        assert_eq!(key.namespaced(Some("")), "dashboards:u1");
        assert_eq!(key.namespaced(None), "dashboards:u1");
    }

    #[test]
    fn test_owner_try_from_string() {
        assert!(OwnerId::try_from(String::from("u1")).is_ok());
        assert!(OwnerId::try_from(String::from("bad owner")).is_err());
        assert_eq!(String::from(OwnerId::new("u1").expect("valid owner")), "u1");
    }
}
