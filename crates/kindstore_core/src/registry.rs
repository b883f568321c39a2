//! The set of record kinds a database serves.

use crate::error::{CoreResult, InitializationError};
use crate::kind::{Record, RecordKind};
use kindstore_codec::Codec;

/// One registered kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindEntry {
    /// The kind.
    pub kind: RecordKind,
    /// Rust type that declared it, or `"<runtime>"` for
    /// [`TypeRegistry::register_kind`].
    pub type_name: &'static str,
}

/// Ordered, duplicate-free list of kinds.
///
/// Registration order is the order stores are opened and reopened in.
///
/// ```rust
/// use kindstore_core::{Record, RecordKind, TypeRegistry};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Account { name: String }
/// impl Record for Account { const KIND: RecordKind = RecordKind::new("Account"); }
///
/// let mut registry = TypeRegistry::new();
/// registry.register::<Account>().unwrap();
/// assert!(registry.register::<Account>().is_err());
/// assert_eq!(registry.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    entries: Vec<KindEntry>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` under [`Record::KIND`].
    ///
    /// # Errors
    ///
    /// [`InitializationError::InvalidKind`] or
    /// [`InitializationError::DuplicateKind`].
    pub fn register<T: Record>(&mut self) -> CoreResult<&mut Self> {
        self.insert(T::KIND, std::any::type_name::<T>())
    }

    /// Registers `T` after checking that `sample` survives encode then decode.
    ///
    /// # Errors
    ///
    /// As [`TypeRegistry::register`], plus
    /// [`InitializationError::SampleRoundTrip`].
    pub fn register_sample<T: Record>(&mut self, sample: &T) -> CoreResult<&mut Self> {
        self.check_insertable(&T::KIND, std::any::type_name::<T>())?;
        Codec::new()
            .round_trip(sample)
            .map_err(|source| InitializationError::SampleRoundTrip {
                kind: T::KIND,
                source,
            })?;
        self.insert(T::KIND, std::any::type_name::<T>())
    }

    /// Registers a kind with no Rust type behind it.
    ///
    /// Used by tooling that only moves raw store directories around.
    ///
    /// # Errors
    ///
    /// As [`TypeRegistry::register`].
    pub fn register_kind(&mut self, kind: RecordKind) -> CoreResult<&mut Self> {
        self.insert(kind, "<runtime>")
    }

    /// Returns the entries in registration order.
    #[must_use]
    pub fn entries(&self) -> &[KindEntry] {
        &self.entries
    }

    /// Returns the kinds in registration order.
    pub fn kinds(&self) -> impl Iterator<Item = &RecordKind> {
        self.entries.iter().map(|e| &e.kind)
    }

    /// Returns true if `kind` is registered.
    #[must_use]
    pub fn contains(&self, kind: &RecordKind) -> bool {
        self.entries.iter().any(|e| &e.kind == kind)
    }

    /// Number of registered kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, kind: RecordKind, type_name: &'static str) -> CoreResult<&mut Self> {
        self.check_insertable(&kind, type_name)?;
        self.entries.push(KindEntry { kind, type_name });
        Ok(self)
    }

    fn check_insertable(&self, kind: &RecordKind, type_name: &'static str) -> CoreResult<()> {
        kind.validate()
            .map_err(|reason| InitializationError::InvalidKind {
                kind: kind.to_string(),
                reason,
            })?;
        if let Some(existing) = self.entries.iter().find(|e| &e.kind == kind) {
            return Err(InitializationError::DuplicateKind {
                kind: kind.clone(),
                first: existing.type_name,
                second: type_name,
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Account {
        name: String,
    }
    impl Record for Account {
        const KIND: RecordKind = RecordKind::new("Account");
    }

    #[derive(Serialize, Deserialize)]
    struct LegacyAccount {
        owner: String,
    }
    impl Record for LegacyAccount {
        const KIND: RecordKind = RecordKind::new("Account");
    }

    #[derive(Serialize, Deserialize)]
    struct Device {
        serial: u64,
    }
    impl Record for Device {
        const KIND: RecordKind = RecordKind::new("Device");
    }

    #[derive(Serialize, Deserialize)]
    struct BadKind;
    impl Record for BadKind {
        const KIND: RecordKind = RecordKind::new("../escape");
    }

    /// Serializes as a string but only deserializes from a map.
    #[derive(Debug)]
    struct Lopsided;
    impl Serialize for Lopsided {
        fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
            s.serialize_str("lopsided")
        }
    }
    impl<'de> Deserialize<'de> for Lopsided {
        fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
            #[derive(Deserialize)]
            struct Shape {
                #[allow(dead_code)]
                field: u8,
            }
            Shape::deserialize(d).map(|_| Self)
        }
    }
    impl Record for Lopsided {
        const KIND: RecordKind = RecordKind::new("Lopsided");
    }

    #[test]
    fn keeps_registration_order() {
        let mut registry = TypeRegistry::new();
        registry
            .register::<Device>()
            .unwrap()
            .register::<Account>()
            .unwrap();

        let kinds: Vec<_> = registry.kinds().map(RecordKind::as_str).collect();
        assert_eq!(kinds, ["Device", "Account"]);
        assert!(registry.entries()[0].type_name.ends_with("Device"));
    }

    #[test]
    fn rejects_colliding_kinds() {
        let mut registry = TypeRegistry::new();
        registry.register::<Account>().unwrap();

        let err = registry.register::<LegacyAccount>().unwrap_err();
        match err {
            CoreError::Initialization(InitializationError::DuplicateKind {
                kind,
                first,
                second,
            }) => {
                assert_eq!(kind, Account::KIND);
                assert!(first.ends_with("Account"));
                assert!(second.ends_with("LegacyAccount"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn rejects_unsafe_kind() {
        let mut registry = TypeRegistry::new();
        assert!(matches!(
            registry.register::<BadKind>(),
            Err(CoreError::Initialization(
                InitializationError::InvalidKind { .. }
            ))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn sample_must_round_trip() {
        let mut registry = TypeRegistry::new();
        registry
            .register_sample(&Device { serial: 7 })
            .unwrap();

        assert!(matches!(
            registry.register_sample(&Lopsided),
            Err(CoreError::Initialization(
                InitializationError::SampleRoundTrip { .. }
            ))
        ));
        assert!(!registry.contains(&Lopsided::KIND));
    }

    #[test]
    fn runtime_kinds_collide_with_typed_ones() {
        let mut registry = TypeRegistry::new();
        registry
            .register_kind(RecordKind::from_name("Account"))
            .unwrap();
        assert!(registry.register::<Account>().is_err());
    }
}
