//! Property-based test generators using proptest.
//!
//! Keys are drawn from a small pool so sequences overwrite and delete the
//! same keys often, which is what compaction has to get right.

use crate::records::{Account, Device};
use proptest::prelude::*;
use std::sync::Arc;

/// Strategy for keys from a pool of 16.
pub fn key_strategy() -> impl Strategy<Value = String> {
    (0u8..16).prop_map(|i| format!("key-{i}"))
}

/// Strategy for accounts.
pub fn account_strategy() -> impl Strategy<Value = Account> {
    ("[a-z]{1,12}", any::<i64>()).prop_map(|(name, balance)| Account::new(name, balance))
}

/// Strategy for devices drawing owners from a shared pool, so several
/// devices in one sequence point at the same `Arc`.
pub fn device_strategy() -> impl Strategy<Value = Device> {
    let owners: Vec<Arc<String>> = ["alice", "bob", "carol"]
        .iter()
        .map(|n| Arc::new((*n).to_string()))
        .collect();
    (
        any::<u64>(),
        prop::sample::select(owners),
        prop::collection::vec("[a-z]{1,6}", 0..4),
    )
        .prop_map(|(serial, owner, labels)| Device {
            serial,
            owner,
            labels: Arc::new(labels),
        })
}

/// One step of a generated workload.
#[derive(Debug, Clone)]
pub enum RecordOperation {
    /// Put an account.
    PutAccount {
        /// Key.
        key: String,
        /// Value.
        account: Account,
    },
    /// Put a device.
    PutDevice {
        /// Key.
        key: String,
        /// Value.
        device: Device,
    },
    /// Delete an account.
    DeleteAccount {
        /// Key.
        key: String,
    },
    /// Delete a device.
    DeleteDevice {
        /// Key.
        key: String,
    },
}

/// Strategy for a single operation, weighted towards puts.
pub fn record_operation_strategy() -> impl Strategy<Value = RecordOperation> {
    prop_oneof![
        3 => (key_strategy(), account_strategy())
            .prop_map(|(key, account)| RecordOperation::PutAccount { key, account }),
        2 => (key_strategy(), device_strategy())
            .prop_map(|(key, device)| RecordOperation::PutDevice { key, device }),
        1 => key_strategy().prop_map(|key| RecordOperation::DeleteAccount { key }),
        1 => key_strategy().prop_map(|key| RecordOperation::DeleteDevice { key }),
    ]
}

/// Strategy for a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<RecordOperation>> {
    prop::collection::vec(record_operation_strategy(), min_ops..max_ops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::strategy::ValueTree;
    use proptest::test_runner::TestRunner;

    #[test]
    fn keys_come_from_the_pool() {
        let mut runner = TestRunner::default();
        for _ in 0..64 {
            let key = key_strategy().new_tree(&mut runner).unwrap().current();
            let index: u8 = key.trim_start_matches("key-").parse().unwrap();
            assert!(index < 16);
        }
    }

    proptest! {
        #[test]
        fn sequences_respect_bounds(ops in operation_sequence_strategy(1, 20)) {
            prop_assert!(!ops.is_empty() && ops.len() < 20);
        }
    }
}
