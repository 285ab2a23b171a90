// Staked position ledger - positionId -> beneficial owner while the gauge holds the NFT

use dashmap::DashMap;
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

/// Who a staked position belongs to, and where it is staked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakedPositionRecord {
    pub beneficial_owner: Address,
    pub gauge: Address,
}

/// Storage for [`StakedPositionRecord`]s.
///
/// The lifecycle manager is the only writer and only writes after the enclosing operation
/// has committed, so implementations need no rollback support.
pub trait StakedPositionStore: Send + Sync {
    fn get(&self, position_id: U256) -> Option<StakedPositionRecord>;
    fn insert(&self, position_id: U256, record: StakedPositionRecord);
    fn remove(&self, position_id: U256) -> Option<StakedPositionRecord>;
    fn positions_of(&self, owner: Address) -> Vec<U256>;
}

#[derive(Default)]
pub struct InMemoryStakeLedger {
    records: DashMap<U256, StakedPositionRecord>,
}

impl InMemoryStakeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl StakedPositionStore for InMemoryStakeLedger {
    fn get(&self, position_id: U256) -> Option<StakedPositionRecord> {
        self.records.get(&position_id).map(|r| *r)
    }

    fn insert(&self, position_id: U256, record: StakedPositionRecord) {
        self.records.insert(position_id, record);
    }

    fn remove(&self, position_id: U256) -> Option<StakedPositionRecord> {
        self.records.remove(&position_id).map(|(_, r)| r)
    }

    fn positions_of(&self, owner: Address) -> Vec<U256> {
        let mut ids: Vec<U256> = self
            .records
            .iter()
            .filter(|entry| entry.value().beneficial_owner == owner)
            .map(|entry| *entry.key())
            .collect();
        ids.sort();
        ids
    }
}

/// A ledger mutation held back until the operation's checkpoint is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagedChange {
    Record(U256, StakedPositionRecord),
    Clear(U256),
}

impl StagedChange {
    pub fn apply(self, store: &dyn StakedPositionStore) {
        match self {
            StagedChange::Record(id, record) => store.insert(id, record),
            StagedChange::Clear(id) => {
                store.remove(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_lifecycle() {
        let ledger = InMemoryStakeLedger::new();
        let alice = Address::from_low_u64_be(1);
        let gauge = Address::from_low_u64_be(2);
        let record = StakedPositionRecord {
            beneficial_owner: alice,
            gauge,
        };

        StagedChange::Record(U256::from(7u64), record).apply(&ledger);
        StagedChange::Record(U256::from(3u64), record).apply(&ledger);
        assert_eq!(ledger.get(U256::from(7u64)), Some(record));
        assert_eq!(
            ledger.positions_of(alice),
            vec![U256::from(3u64), U256::from(7u64)]
        );

        StagedChange::Clear(U256::from(7u64)).apply(&ledger);
        assert_eq!(ledger.get(U256::from(7u64)), None);
        assert_eq!(ledger.len(), 1);
    }
}
