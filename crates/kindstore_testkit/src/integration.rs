//! Cross-crate integration test helpers.
//!
//! [`IntegrationHarness`] drives a real database and an in-memory model side
//! by side, so any divergence after writes, compaction or reopen shows up as
//! a failed verification.

use crate::fixtures::TestDb;
use crate::generators::RecordOperation;
use crate::records::{Account, Device};
use kindstore_core::{CompactionReport, CoreResult};
use std::collections::BTreeMap;

/// A test harness for integration testing.
pub struct IntegrationHarness {
    /// The database under test.
    pub db: TestDb,
    accounts: BTreeMap<String, Account>,
    devices: BTreeMap<String, Device>,
}

impl IntegrationHarness {
    /// Creates a harness over a fresh [`TestDb`].
    pub fn new() -> Self {
        Self {
            db: TestDb::new(),
            accounts: BTreeMap::new(),
            devices: BTreeMap::new(),
        }
    }

    /// Applies one operation to both the database and the model.
    pub fn apply(&mut self, op: &RecordOperation) {
        match op {
            RecordOperation::PutAccount { key, account } => {
                self.db.put(key, account).expect("Failed to put account");
                self.accounts.insert(key.clone(), account.clone());
            }
            RecordOperation::PutDevice { key, device } => {
                self.db.put(key, device).expect("Failed to put device");
                self.devices.insert(key.clone(), device.clone());
            }
            RecordOperation::DeleteAccount { key } => {
                self.db.del::<Account>(key).expect("Failed to delete account");
                self.accounts.remove(key);
            }
            RecordOperation::DeleteDevice { key } => {
                self.db.del::<Device>(key).expect("Failed to delete device");
                self.devices.remove(key);
            }
        }
    }

    /// Applies every operation in order.
    pub fn apply_all(&mut self, ops: &[RecordOperation]) {
        for op in ops {
            self.apply(op);
        }
    }

    /// Compacts the database into the fixture's scratch directory.
    pub fn backup(&self) -> CoreResult<CompactionReport> {
        self.db.backup(&self.db.tmp())
    }

    /// Closes and reopens the database.
    pub fn reopen(&mut self) {
        self.db.reopen();
    }

    /// Number of live records the model expects, per kind.
    pub fn expected_counts(&self) -> (usize, usize) {
        (self.accounts.len(), self.devices.len())
    }

    /// Checks every key of both kinds against the model.
    ///
    /// Returns a description of the first mismatch.
    pub fn verify(&self) -> Result<(), String> {
        let keys = self.db.keys::<Account>().map_err(|e| e.to_string())?;
        let expected: Vec<&String> = self.accounts.keys().collect();
        if keys.iter().collect::<Vec<_>>() != expected {
            return Err(format!("account keys {keys:?}, expected {expected:?}"));
        }
        for (key, account) in &self.accounts {
            let actual = self.db.get::<Account>(key).map_err(|e| e.to_string())?;
            if actual.as_ref() != Some(account) {
                return Err(format!("account {key}: got {actual:?}, expected {account:?}"));
            }
        }

        let keys = self.db.keys::<Device>().map_err(|e| e.to_string())?;
        let expected: Vec<&String> = self.devices.keys().collect();
        if keys.iter().collect::<Vec<_>>() != expected {
            return Err(format!("device keys {keys:?}, expected {expected:?}"));
        }
        for (key, device) in &self.devices {
            let actual = self.db.get::<Device>(key).map_err(|e| e.to_string())?;
            if actual.as_ref() != Some(device) {
                return Err(format!("device {key}: got {actual:?}, expected {device:?}"));
            }
        }
        Ok(())
    }
}

impl Default for IntegrationHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn harness_tracks_puts_and_deletes() {
        let mut harness = IntegrationHarness::new();
        let owner = Arc::new("alice".to_string());
        harness.apply_all(&[
            RecordOperation::PutAccount {
                key: "k".into(),
                account: Account::new("alice", 1),
            },
            RecordOperation::PutDevice {
                key: "k".into(),
                device: Device::new(9, &owner),
            },
            RecordOperation::DeleteAccount { key: "k".into() },
        ]);

        assert_eq!(harness.expected_counts(), (0, 1));
        harness.verify().unwrap();
        harness.backup().unwrap();
        harness.verify().unwrap();
    }
}
