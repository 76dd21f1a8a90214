use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use futures_util::future::{self, BoxFuture, FutureExt};

use crate::error::StoreError;
use crate::ports::RecordStore;
use crate::types::{StoreStats, SubscriptionRecord};

/// Record store kept in process memory. Records come back in insertion order.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<Vec<SubscriptionRecord>>,
    users: Mutex<HashSet<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<SubscriptionRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            users: Mutex::new(HashSet::new()),
        }
    }

    pub fn add_user(&self, user_id: &str) {
        lock(&self.users).insert(user_id.to_string());
    }

    /// Inserts or replaces the record with the same id.
    pub fn insert(&self, record: SubscriptionRecord) {
        let mut records = lock(&self.records);
        match records.iter_mut().find(|existing| existing.id == record.id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
    }

    pub fn records(&self) -> Vec<SubscriptionRecord> {
        lock(&self.records).clone()
    }

    pub fn contains(&self, record_id: &str) -> bool {
        lock(&self.records).iter().any(|record| record.id == record_id)
    }

    fn filtered<F>(&self, predicate: F) -> Vec<SubscriptionRecord>
    where
        F: Fn(&SubscriptionRecord) -> bool,
    {
        lock(&self.records)
            .iter()
            .filter(|record| predicate(record))
            .cloned()
            .collect()
    }
}

impl RecordStore for MemoryRecordStore {
    fn query_all(&self) -> BoxFuture<'_, Result<Vec<SubscriptionRecord>, StoreError>> {
        future::ready(Ok(self.records())).boxed()
    }

    fn query_by_user_ids<'a>(
        &'a self,
        user_ids: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<SubscriptionRecord>, StoreError>> {
        let records = self.filtered(|record| {
            record
                .user_id
                .as_ref()
                .is_some_and(|user_id| user_ids.contains(user_id))
        });
        future::ready(Ok(records)).boxed()
    }

    fn query_by_role<'a>(
        &'a self,
        role: &'a str,
    ) -> BoxFuture<'a, Result<Vec<SubscriptionRecord>, StoreError>> {
        let records = self.filtered(|record| record.user_role.as_deref() == Some(role));
        future::ready(Ok(records)).boxed()
    }

    fn delete<'a>(&'a self, record_id: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        let mut records = lock(&self.records);
        let before = records.len();
        records.retain(|record| record.id != record_id);
        let result = if records.len() == before {
            Err(StoreError::NotFound(record_id.to_string()))
        } else {
            Ok(())
        };
        future::ready(result).boxed()
    }

    fn query_active_user_ids(&self) -> BoxFuture<'_, Result<HashSet<String>, StoreError>> {
        future::ready(Ok(lock(&self.users).clone())).boxed()
    }

    fn save<'a>(&'a self, record: &'a SubscriptionRecord) -> BoxFuture<'a, Result<(), StoreError>> {
        self.insert(record.clone());
        future::ready(Ok(())).boxed()
    }

    fn delete_by_user<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<u64, StoreError>> {
        let mut records = lock(&self.records);
        let before = records.len();
        records.retain(|record| record.user_id.as_deref() != Some(user_id));
        let removed = (before - records.len()) as u64;
        future::ready(Ok(removed)).boxed()
    }

    fn stats(&self) -> BoxFuture<'_, Result<StoreStats, StoreError>> {
        let stats = StoreStats {
            subscriptions: lock(&self.records).len() as u64,
            users: lock(&self.users).len() as u64,
        };
        future::ready(Ok(stats)).boxed()
    }
}
