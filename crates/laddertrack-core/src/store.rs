//! Warehouse-backed implementations of the local store traits.

use laddertrack_warehouse::Warehouse;

use crate::error::StoreError;
use crate::health::VariableStore;
use crate::season::{Region, Season, SeasonStore};

impl VariableStore for Warehouse {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.get_var(key)?)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        Ok(self.set_var(key, value)?)
    }
}

impl SeasonStore for Warehouse {
    fn seasons_for_region(&self, region: Region) -> Result<Vec<Season>, StoreError> {
        Warehouse::seasons_for_region(self, region.as_str())?
            .iter()
            .map(|record| {
                Season::from_record(record).map_err(|error| StoreError::new(error.to_string()))
            })
            .collect()
    }

    fn save_season(&self, season: &Season) -> Result<(), StoreError> {
        Ok(self.upsert_season(&season.to_record())?)
    }
}
