use std::collections::BTreeMap;

use crate::error::StoreError;
use crate::model::Lookup;

use super::{SharedBlobStore, keys, read_json, write_json};

/// iTunes id → resolved feed, one record per id plus a combined index
#[derive(Clone)]
pub struct LookupStore {
    store: SharedBlobStore,
}

impl LookupStore {
    pub fn new(store: SharedBlobStore) -> Self {
        Self { store }
    }

    pub async fn get(&self, itunes_id: &str) -> Result<Lookup, StoreError> {
        read_json(self.store.as_ref(), &keys::lookup(itunes_id)?).await
    }

    /// Every lookup recorded so far, keyed by iTunes id
    pub async fn all(&self) -> Result<BTreeMap<String, Lookup>, StoreError> {
        match read_json(self.store.as_ref(), keys::ALL_LOOKUPS).await {
            Err(e) if e.is_not_found() => Ok(BTreeMap::new()),
            other => other,
        }
    }

    /// Write each lookup under its own key, then merge them into the index
    pub async fn put_all(&self, lookups: &[Lookup]) -> Result<(), StoreError> {
        if lookups.is_empty() {
            return Ok(());
        }

        for lookup in lookups {
            write_json(self.store.as_ref(), &keys::lookup(&lookup.itunes_id)?, lookup).await?;
        }

        let mut index = self.all().await?;
        for lookup in lookups {
            index.insert(lookup.itunes_id.clone(), lookup.clone());
        }
        write_json(self.store.as_ref(), keys::ALL_LOOKUPS, &index).await
    }
}
