use super::TallyStore;
use crate::model::CountryTally;
use crate::model::CountryTotal;
use crate::pool;
use crate::pool::DbPool;
use crate::schema::clicks::dsl;
use anyhow::Context;
use async_bb8_diesel::AsyncRunQueryDsl;
use async_bb8_diesel::AsyncSimpleConnection;
use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sql_types::Bool;
use slog::info;
use slog::warn;
use std::time::Duration;
use tokio::sync::OnceCell;

const TABLE_EXISTS: &str = r#"
    SELECT EXISTS (
        SELECT FROM information_schema.tables
        WHERE table_schema = current_schema() AND table_name = 'clicks'
    ) AS table_present
"#;

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS clicks (
        country TEXT PRIMARY KEY,
        total_clicks BIGINT NOT NULL DEFAULT 0,
        country_code TEXT
    );
"#;

#[derive(QueryableByName)]
struct TablePresence {
    #[diesel(sql_type = Bool)]
    table_present: bool,
}

/// Tallies kept in PostgreSQL.
///
/// The pool is built on first use and shared by every request afterwards.
/// Once the table has been seen in this process the catalog is not checked
/// again; a failed bootstrap is retried by the next caller.
pub struct PgTallyStore {
    log: slog::Logger,
    db_url: String,
    max_connections: u32,
    connection_timeout: Duration,
    pool: OnceCell<DbPool>,
    schema_ready: OnceCell<()>,
}

impl PgTallyStore {
    pub fn new(
        log: slog::Logger,
        db_url: String,
        max_connections: u32,
        connection_timeout: Duration,
    ) -> PgTallyStore {
        PgTallyStore {
            log,
            db_url,
            max_connections,
            connection_timeout,
            pool: OnceCell::new(),
            schema_ready: OnceCell::new(),
        }
    }

    async fn pool(&self) -> anyhow::Result<&DbPool> {
        self.pool
            .get_or_try_init(|| {
                pool::create_pool(
                    self.log.clone(),
                    &self.db_url,
                    self.max_connections,
                    self.connection_timeout,
                )
            })
            .await
            .context("setting up database pool")
    }

    async fn table_exists(&self, pool: &DbPool) -> anyhow::Result<bool> {
        let presence = diesel::sql_query(TABLE_EXISTS)
            .get_result_async::<TablePresence>(pool)
            .await
            .context("checking for tally table")?;
        Ok(presence.table_present)
    }

    async fn bootstrap(&self) -> anyhow::Result<()> {
        let pool = self.pool().await?;
        if self.table_exists(pool).await? {
            return Ok(());
        }

        match pool.batch_execute_async(CREATE_TABLE).await {
            Ok(()) => {
                info!(&self.log, "created tally table");
                Ok(())
            }
            // Two processes racing on CREATE TABLE IF NOT EXISTS can still
            // collide in the catalog.  The loser sees the winner's table.
            Err(error) => {
                if self.table_exists(pool).await? {
                    warn!(
                        &self.log,
                        "tally table created concurrently";
                        "error_message" => %error
                    );
                    Ok(())
                } else {
                    Err(error).context("creating tally table")
                }
            }
        }
    }
}

#[async_trait]
impl TallyStore for PgTallyStore {
    async fn ensure_schema(&self) -> anyhow::Result<()> {
        self.schema_ready.get_or_try_init(|| self.bootstrap()).await?;
        Ok(())
    }

    async fn increment(
        &self,
        country: &str,
        country_code: &str,
    ) -> anyhow::Result<i64> {
        let pool = self.pool().await?;
        diesel::insert_into(dsl::clicks)
            .values((
                dsl::country.eq(country.to_owned()),
                dsl::total_clicks.eq(1_i64),
                dsl::country_code.eq(Some(country_code.to_owned())),
            ))
            .on_conflict(dsl::country)
            .do_update()
            .set(dsl::total_clicks.eq(dsl::total_clicks + 1_i64))
            .returning(dsl::total_clicks)
            .get_result_async::<i64>(pool)
            .await
            .context("recording click")
    }

    async fn totals_by_country(&self) -> anyhow::Result<Vec<CountryTotal>> {
        let pool = self.pool().await?;
        dsl::clicks
            .order(dsl::country.asc())
            .select(CountryTotal::as_select())
            .load_async::<CountryTotal>(pool)
            .await
            .context("loading countries")
    }

    async fn top_by_clicks(
        &self,
        limit: usize,
    ) -> anyhow::Result<Vec<CountryTally>> {
        let pool = self.pool().await?;
        let limit = i64::try_from(limit).context("leaderboard limit")?;
        dsl::clicks
            .order((dsl::total_clicks.desc(), dsl::country.asc()))
            .limit(limit)
            .select(CountryTally::as_select())
            .load_async::<CountryTally>(pool)
            .await
            .context("loading leaderboard")
    }

    async fn clear(&self) -> anyhow::Result<usize> {
        let pool = self.pool().await?;
        diesel::delete(dsl::clicks)
            .execute_async(pool)
            .await
            .context("clearing tallies")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A store on `POPCAT_TEST_DATABASE_URL`, or `None` when it is unset.
    fn test_store() -> Option<PgTallyStore> {
        let db_url = std::env::var("POPCAT_TEST_DATABASE_URL").ok()?;
        let log = slog::Logger::root(slog::Discard, slog::o!());
        Some(PgTallyStore::new(log, db_url, 4, Duration::from_secs(5)))
    }

    #[tokio::test]
    async fn unreachable_database_fails_bootstrap() {
        let log = slog::Logger::root(slog::Discard, slog::o!());
        let store = PgTallyStore::new(
            log,
            String::from("postgresql://nobody@127.0.0.1:1/none"),
            1,
            Duration::from_millis(200),
        );
        assert!(store.ensure_schema().await.is_err());
        // A failure is not remembered.
        assert!(store.schema_ready.get().is_none());
    }

    /// Everything touching the real `clicks` table runs in this one test so
    /// that parallel tests cannot interfere.  It is skipped (returns early)
    /// unless `POPCAT_TEST_DATABASE_URL` is set.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn upsert_and_scans_against_postgres() {
        let Some(store) = test_store() else {
            return;
        };
        store.ensure_schema().await.unwrap();
        store.ensure_schema().await.unwrap();
        store.clear().await.unwrap();

        assert_eq!(store.increment("Japan", "jp").await.unwrap(), 1);
        assert_eq!(store.increment("Japan", "xx").await.unwrap(), 2);
        assert_eq!(store.increment("Brazil", "un").await.unwrap(), 1);

        let store = std::sync::Arc::new(store);
        let mut tasks = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.increment("Chile", "cl").await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let top = store.top_by_clicks(20).await.unwrap();
        let names: Vec<_> = top.iter().map(|t| t.country.as_str()).collect();
        assert_eq!(names, ["Chile", "Japan", "Brazil"]);
        assert_eq!(top[0].total_clicks, 20);
        assert_eq!(top[1].country_code.as_deref(), Some("jp"));

        let totals = store.totals_by_country().await.unwrap();
        let names: Vec<_> = totals.iter().map(|t| t.country.as_str()).collect();
        assert_eq!(names, ["Brazil", "Chile", "Japan"]);

        assert_eq!(store.clear().await.unwrap(), 3);
        assert!(store.totals_by_country().await.unwrap().is_empty());

        // Without the table, fresh stores racing through bootstrap must all
        // succeed and leave exactly one usable table behind.
        let pool = store.pool().await.unwrap();
        pool.batch_execute_async("DROP TABLE clicks").await.unwrap();
        assert!(!store.table_exists(pool).await.unwrap());

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let fresh = test_store().unwrap();
            tasks.push(tokio::spawn(async move {
                fresh.ensure_schema().await?;
                anyhow::Ok(fresh)
            }));
        }
        let mut fresh_stores = Vec::new();
        for task in tasks {
            fresh_stores.push(task.await.unwrap().unwrap());
        }
        assert!(store.table_exists(pool).await.unwrap());

        let fresh = &fresh_stores[0];
        assert!(fresh.schema_ready.get().is_some());
        assert_eq!(fresh.increment("Japan", "jp").await.unwrap(), 1);
        assert_eq!(fresh.clear().await.unwrap(), 1);
    }
}
