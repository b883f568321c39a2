//! Record kinds.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;

/// Longest accepted kind, in bytes.
pub const MAX_KIND_LEN: usize = 128;

/// Stable identifier of a record type.
///
/// A kind selects the store a record lives in and names that store's
/// subdirectory under the database root, so it must be a plain path segment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKind(Cow<'static, str>);

impl RecordKind {
    /// Creates a kind from a static name, usable in `const` position.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Creates a kind from a runtime name, e.g. a directory found on disk.
    #[must_use]
    pub fn from_name(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// Returns the name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks that the kind can be used as a directory name.
    ///
    /// # Errors
    ///
    /// Returns a short reason when the kind is empty, too long, `.` or `..`,
    /// or contains anything other than ASCII alphanumerics, `_`, `-` and `.`.
    pub fn validate(&self) -> Result<(), &'static str> {
        let name = self.as_str();
        if name.is_empty() {
            return Err("kind is empty");
        }
        if name.len() > MAX_KIND_LEN {
            return Err("kind is longer than 128 bytes");
        }
        if name == "." || name == ".." {
            return Err("kind is a relative path component");
        }
        if !name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'))
        {
            return Err("kind may only contain ASCII letters, digits, '_', '-' and '.'");
        }
        Ok(())
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A type that can be stored in a [`crate::Db`].
///
/// Every value of the type lives in the store named by [`Record::KIND`].
///
/// ```rust
/// use kindstore_core::{Record, RecordKind};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Account {
///     name: String,
///     balance: i64,
/// }
///
/// impl Record for Account {
///     const KIND: RecordKind = RecordKind::new("Account");
/// }
/// ```
pub trait Record: Serialize + DeserializeOwned {
    /// The kind shared by every value of this type.
    const KIND: RecordKind;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_type_like_names() {
        for name in ["Account", "hw.Device", "battery_v2", "Task-Queue"] {
            assert!(RecordKind::new(name).validate().is_ok(), "{name}");
        }
    }

    #[test]
    fn rejects_path_escapes() {
        for name in ["", ".", "..", "a/b", "a\\b", "acc ount", "ünï"] {
            assert!(RecordKind::from_name(name).validate().is_err(), "{name:?}");
        }
        let long = "k".repeat(MAX_KIND_LEN + 1);
        assert!(RecordKind::from_name(long).validate().is_err());
    }

    proptest::proptest! {
        #[test]
        fn safe_segments_validate(name in "[A-Za-z0-9_][A-Za-z0-9_.-]{0,63}") {
            proptest::prop_assert!(RecordKind::from_name(name).validate().is_ok());
        }

        #[test]
        fn separators_never_validate(a in "[a-z]{0,8}", b in "[a-z]{0,8}") {
            for sep in ['/', '\\'] {
                let kind = RecordKind::from_name(format!("{a}{sep}{b}"));
                proptest::prop_assert!(kind.validate().is_err());
            }
        }
    }

    #[test]
    fn static_and_owned_kinds_compare_equal() {
        assert_eq!(RecordKind::new("Account"), RecordKind::from_name("Account"));
        assert_eq!(RecordKind::new("Account").to_string(), "Account");
    }
}
