use crate::error::StoreError;
use crate::model::{RequestId, ResultRecord};

use super::{SharedBlobStore, keys, read_json, write_json};

/// Request id → terminal result record.
///
/// Logically write-once: nothing here refuses a second write, the worker's
/// single result exit is what guarantees it.
#[derive(Clone)]
pub struct ResultStore {
    store: SharedBlobStore,
}

impl ResultStore {
    pub fn new(store: SharedBlobStore) -> Self {
        Self { store }
    }

    pub async fn get(&self, request_id: &RequestId) -> Result<ResultRecord, StoreError> {
        read_json(self.store.as_ref(), &keys::result(request_id)?).await
    }

    pub async fn put(&self, record: &ResultRecord) -> Result<(), StoreError> {
        write_json(self.store.as_ref(), &keys::result(&record.request_id)?, record).await
    }

    pub async fn exists(&self, request_id: &RequestId) -> Result<bool, StoreError> {
        self.store.exists(&keys::result(request_id)?).await
    }
}
