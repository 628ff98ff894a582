//! Storage backends for the click tallies.
//!
//! A backend is a durable map from country name to tally that supports an
//! atomic increment-or-insert and ordered scans.  All ordering rules live in
//! the backend so that every caller sees the same order.

use crate::model::CountryTally;
use crate::model::CountryTotal;
use async_trait::async_trait;

mod memory;
mod postgres;

pub use memory::MemoryTallyStore;
pub use postgres::PgTallyStore;

#[async_trait]
pub trait TallyStore: Send + Sync {
    /// Makes sure the tally table exists, creating it if needed.
    async fn ensure_schema(&self) -> anyhow::Result<()>;

    /// Adds one click for `country` and returns its new total.
    ///
    /// A new row starts at 1 with `country_code`; an existing row keeps its
    /// code.  Must be a single atomic step.
    async fn increment(
        &self,
        country: &str,
        country_code: &str,
    ) -> anyhow::Result<i64>;

    /// Every tally, ordered by country name ascending.
    async fn totals_by_country(&self) -> anyhow::Result<Vec<CountryTotal>>;

    /// At most `limit` tallies, by total descending then country ascending.
    async fn top_by_clicks(
        &self,
        limit: usize,
    ) -> anyhow::Result<Vec<CountryTally>>;

    /// Deletes every tally, returning how many were removed.
    async fn clear(&self) -> anyhow::Result<usize>;
}
