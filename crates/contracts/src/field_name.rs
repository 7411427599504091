//! FieldName - shared field identifier
//!
//! Every decoded record repeats the schema's field names. Backing them with
//! `Arc<str>` turns the per-frame clone into a reference count bump.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

/// Name of a schema field, cheap to clone.
///
/// ```
/// use contracts::FieldName;
///
/// let name: FieldName = "altitude".into();
/// let copy = name.clone();
/// assert_eq!(copy, "altitude");
/// assert_eq!(name.unit_key(), "altitude_unit");
/// ```
#[derive(Clone, Default)]
pub struct FieldName(Arc<str>);

impl FieldName {
    #[inline]
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key of the `<name>_unit` companion entry in serialized records.
    pub fn unit_key(&self) -> String {
        format!("{}_unit", self.0)
    }
}

impl Deref for FieldName {
    type Target = str;

    #[inline]
    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for FieldName {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for FieldName {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FieldName {
    #[inline]
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for FieldName {
    #[inline]
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldName({:?})", self.0)
    }
}

impl PartialEq for FieldName {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for FieldName {}

impl PartialEq<str> for FieldName {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for FieldName {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

// Must hash like `str` so `HashMap<FieldName, _>` can be queried with `&str`.
impl Hash for FieldName {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl Serialize for FieldName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for FieldName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn clone_shares_storage() {
        let a: FieldName = "velocity".into();
        let b = a.clone();
        assert_eq!(a.as_str().as_ptr(), b.as_str().as_ptr());
    }

    #[test]
    fn set_lookup_by_str() {
        let mut names: HashSet<FieldName> = HashSet::new();
        names.insert("sync_word".into());
        assert!(names.contains("sync_word"));
        assert!(!names.contains("checksum"));
    }

    #[test]
    fn serde_as_plain_string() {
        let name: FieldName = "engine_pressure".into();
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"engine_pressure\"");
        let back: FieldName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, name);
    }
}
