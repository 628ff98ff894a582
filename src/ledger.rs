//! Click accounting on top of a [`TallyStore`].
//!
//! The ledger validates input, picks defaults and maps store failures into
//! [`ApiError`].  It never retries and never returns partial results.

use crate::country_codes::FALLBACK_CODE;
use crate::errors::ApiError;
use crate::model::CountryTally;
use crate::model::CountryTotal;
use crate::store::TallyStore;
use std::sync::Arc;

/// Number of entries on the leaderboard.
pub const LEADERBOARD_SIZE: usize = 20;

/// Result of recording one click.
#[derive(Debug)]
pub struct ClickOutcome {
    pub new_count: i64,
    pub leaderboard: Vec<CountryTally>,
}

#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn TallyStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn TallyStore>) -> Ledger {
        Ledger { store }
    }

    /// Must succeed before any other operation is attempted.
    pub async fn ensure_schema(&self) -> Result<(), ApiError> {
        self.store.ensure_schema().await.map_err(ApiError::StoreUnavailable)
    }

    pub async fn record_click(
        &self,
        country: Option<&str>,
        country_code: Option<&str>,
    ) -> Result<ClickOutcome, ApiError> {
        let country = match country {
            Some(country) if !country.is_empty() => country,
            _ => return Err(ApiError::validation("Country is required")),
        };
        let country_code = country_code
            .filter(|code| !code.is_empty())
            .unwrap_or(FALLBACK_CODE);

        let new_count = self
            .store
            .increment(country, country_code)
            .await
            .map_err(ApiError::StoreOperation)?;
        let leaderboard = self.leaderboard().await?;
        Ok(ClickOutcome { new_count, leaderboard })
    }

    pub async fn list_countries(&self) -> Result<Vec<CountryTotal>, ApiError> {
        self.store
            .totals_by_country()
            .await
            .map_err(ApiError::StoreOperation)
    }

    pub async fn leaderboard(&self) -> Result<Vec<CountryTally>, ApiError> {
        self.store
            .top_by_clicks(LEADERBOARD_SIZE)
            .await
            .map_err(ApiError::StoreOperation)
    }

    /// Irreversibly removes every tally.
    pub async fn reset_all(&self) -> Result<usize, ApiError> {
        self.store.clear().await.map_err(ApiError::StoreOperation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTallyStore;

    fn ledger() -> Ledger {
        Ledger::new(Arc::new(MemoryTallyStore::new()))
    }

    #[tokio::test]
    async fn japan_and_brazil_scenario() {
        let ledger = ledger();
        for _ in 0..3 {
            ledger.record_click(Some("Japan"), Some("jp")).await.unwrap();
        }
        let outcome = ledger.record_click(Some("Brazil"), None).await.unwrap();
        assert_eq!(outcome.new_count, 1);
        assert_eq!(
            outcome.leaderboard,
            vec![
                CountryTally {
                    country: String::from("Japan"),
                    total_clicks: 3,
                    country_code: Some(String::from("jp")),
                },
                CountryTally {
                    country: String::from("Brazil"),
                    total_clicks: 1,
                    country_code: Some(String::from("un")),
                },
            ]
        );
    }

    #[tokio::test]
    async fn explicit_code_on_first_click_is_kept() {
        let ledger = ledger();
        ledger.record_click(Some("Brazil"), Some("br")).await.unwrap();
        let outcome = ledger.record_click(Some("Brazil"), None).await.unwrap();
        assert_eq!(outcome.new_count, 2);
        assert_eq!(outcome.leaderboard[0].country_code.as_deref(), Some("br"));
    }

    #[tokio::test]
    async fn missing_country_touches_nothing() {
        let ledger = ledger();
        ledger.record_click(Some("Kenya"), Some("ke")).await.unwrap();

        for country in [None, Some("")] {
            let error = ledger.record_click(country, Some("ke")).await.unwrap_err();
            assert!(matches!(error, ApiError::Validation(_)));
        }

        let countries = ledger.list_countries().await.unwrap();
        assert_eq!(
            countries,
            vec![CountryTotal { country: String::from("Kenya"), total_clicks: 1 }]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_clicks_are_not_lost() {
        let ledger = ledger();
        let mut tasks = Vec::new();
        for _ in 0..200 {
            let ledger = ledger.clone();
            tasks.push(tokio::spawn(async move {
                ledger.record_click(Some("Chile"), Some("cl")).await.map(|_| ())
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        let countries = ledger.list_countries().await.unwrap();
        assert_eq!(countries[0].total_clicks, 200);
    }

    #[tokio::test]
    async fn leaderboard_is_capped_and_sorted() {
        let ledger = ledger();
        for i in 0..30 {
            let country = format!("Country {:02}", i);
            for _ in 0..=(i % 7) {
                ledger.record_click(Some(country.as_str()), None).await.unwrap();
            }
        }

        let leaderboard = ledger.leaderboard().await.unwrap();
        assert_eq!(leaderboard.len(), LEADERBOARD_SIZE);
        assert!(leaderboard
            .windows(2)
            .all(|pair| pair[0].total_clicks >= pair[1].total_clicks));

        let countries = ledger.list_countries().await.unwrap();
        assert_eq!(countries.len(), 30);
        assert!(countries.windows(2).all(|pair| pair[0].country < pair[1].country));
    }

    #[tokio::test]
    async fn reset_empties_everything() {
        let ledger = ledger();
        ledger.record_click(Some("Japan"), Some("jp")).await.unwrap();
        ledger.record_click(Some("Japan"), Some("jp")).await.unwrap();
        ledger.record_click(Some("Peru"), None).await.unwrap();

        assert_eq!(ledger.reset_all().await.unwrap(), 2);
        assert!(ledger.list_countries().await.unwrap().is_empty());
        assert!(ledger.leaderboard().await.unwrap().is_empty());

        let outcome = ledger.record_click(Some("Japan"), None).await.unwrap();
        assert_eq!(outcome.new_count, 1);
        assert_eq!(outcome.leaderboard[0].country_code.as_deref(), Some("un"));
    }
}
