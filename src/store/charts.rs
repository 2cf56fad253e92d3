use crate::error::StoreError;
use crate::model::TopChart;

use super::{SharedBlobStore, keys, read_json, write_json};

/// Country → latest published top chart
#[derive(Clone)]
pub struct ChartStore {
    store: SharedBlobStore,
}

impl ChartStore {
    pub fn new(store: SharedBlobStore) -> Self {
        Self { store }
    }

    pub async fn get(&self, country: &str) -> Result<TopChart, StoreError> {
        read_json(self.store.as_ref(), &keys::top_chart(country)?).await
    }

    pub async fn put(&self, chart: &TopChart) -> Result<(), StoreError> {
        write_json(self.store.as_ref(), &keys::top_chart(&chart.country)?, chart).await
    }
}
