use super::TallyStore;
use crate::model::CountryTally;
use crate::model::CountryTotal;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

struct Tally {
    total_clicks: i64,
    country_code: String,
}

/// Tallies held in process memory.  Nothing survives a restart.
#[derive(Default)]
pub struct MemoryTallyStore {
    tallies: Mutex<BTreeMap<String, Tally>>,
}

impl MemoryTallyStore {
    pub fn new() -> MemoryTallyStore {
        MemoryTallyStore::default()
    }
}

#[async_trait]
impl TallyStore for MemoryTallyStore {
    async fn ensure_schema(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn increment(
        &self,
        country: &str,
        country_code: &str,
    ) -> anyhow::Result<i64> {
        let mut tallies = self.tallies.lock().await;
        let tally = tallies.entry(country.to_owned()).or_insert_with(|| Tally {
            total_clicks: 0,
            country_code: country_code.to_owned(),
        });
        tally.total_clicks += 1;
        Ok(tally.total_clicks)
    }

    async fn totals_by_country(&self) -> anyhow::Result<Vec<CountryTotal>> {
        let tallies = self.tallies.lock().await;
        Ok(tallies
            .iter()
            .map(|(country, tally)| CountryTotal {
                country: country.clone(),
                total_clicks: tally.total_clicks,
            })
            .collect())
    }

    async fn top_by_clicks(
        &self,
        limit: usize,
    ) -> anyhow::Result<Vec<CountryTally>> {
        let tallies = self.tallies.lock().await;
        let mut ranked: Vec<CountryTally> = tallies
            .iter()
            .map(|(country, tally)| CountryTally {
                country: country.clone(),
                total_clicks: tally.total_clicks,
                country_code: Some(tally.country_code.clone()),
            })
            .collect();
        // The map iterates in name order and the sort is stable, so equal
        // totals stay ordered by name.
        ranked.sort_by(|a, b| b.total_clicks.cmp(&a.total_clicks));
        ranked.truncate(limit);
        Ok(ranked)
    }

    async fn clear(&self) -> anyhow::Result<usize> {
        let mut tallies = self.tallies.lock().await;
        let removed = tallies.len();
        tallies.clear();
        Ok(removed)
    }
}
