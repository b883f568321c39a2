//! Sample record types.

use kindstore_core::{Record, RecordKind, TypeRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A bank account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Owner name.
    pub name: String,
    /// Balance in cents.
    pub balance: i64,
}

impl Account {
    /// Creates an account.
    pub fn new(name: impl Into<String>, balance: i64) -> Self {
        Self {
            name: name.into(),
            balance,
        }
    }
}

impl Record for Account {
    const KIND: RecordKind = RecordKind::new("Account");
}

/// A device whose owner and labels are shared with other values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Serial number.
    pub serial: u64,
    /// Shared owner name.
    pub owner: Arc<String>,
    /// Shared label set.
    pub labels: Arc<Vec<String>>,
}

impl Device {
    /// Creates a device with no labels.
    pub fn new(serial: u64, owner: &Arc<String>) -> Self {
        Self {
            serial,
            owner: Arc::clone(owner),
            labels: Arc::new(Vec::new()),
        }
    }
}

impl Record for Device {
    const KIND: RecordKind = RecordKind::new("Device");
}

/// A record declaring the same kind as [`Account`] with another shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountV2 {
    /// Account number.
    pub number: u64,
}

impl Record for AccountV2 {
    const KIND: RecordKind = RecordKind::new("Account");
}

/// A registry with [`Account`] and [`Device`].
pub fn sample_registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    registry
        .register_sample(&Account::new("sample", 0))
        .expect("Account registers")
        .register_sample(&Device::new(0, &Arc::new("sample".into())))
        .expect("Device registers");
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_registry_order() {
        let registry = sample_registry();
        let kinds: Vec<_> = registry.kinds().map(RecordKind::as_str).collect();
        assert_eq!(kinds, ["Account", "Device"]);
    }

    #[test]
    fn shared_fields_serialize_by_value() {
        let owner = Arc::new("alice".to_string());
        let device = Device::new(1, &owner);
        let json = serde_json::to_string(&device).unwrap();
        assert!(json.contains("\"owner\":\"alice\""));
    }
}
