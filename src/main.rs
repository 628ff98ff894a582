use anyhow::anyhow;
use anyhow::Context;
use clap::Parser;
use slog::info;
use slog::o;
use std::sync::Arc;

mod config;
mod country_codes;
mod errors;
mod http;
mod ledger;
mod model;
mod pool;
mod schema;
mod store;

use config::Args;
use config::Config;
use config::DatabaseConfig;
use config::StoreBackend;
use ledger::Ledger;
use store::MemoryTallyStore;
use store::PgTallyStore;
use store::TallyStore;

type DbConnection = diesel::PgConnection;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(&args).context("loading configuration")?;
    let log = config.log.to_logger("popcat-api").context("creating logger")?;

    let store = create_store(&log, &config.database)?;
    info!(&log, "setting up dropshot server";
        "store" => ?config.database.backend);
    let server =
        http::create_dropshot_server(config.dropshot, log.clone(), Ledger::new(store))
            .await?;
    info!(&log, "set up dropshot server";
        "local_address" => ?server.local_addr());
    server.await.map_err(|error| anyhow!("waiting for server: {:#}", error))
}

fn create_store(
    log: &slog::Logger,
    database: &DatabaseConfig,
) -> anyhow::Result<Arc<dyn TallyStore>> {
    let store: Arc<dyn TallyStore> = match database.backend {
        StoreBackend::Postgres => {
            let db_url = database
                .url
                .clone()
                .context("postgres store configured without a URL")?;
            Arc::new(PgTallyStore::new(
                log.new(o!("component" => "store")),
                db_url,
                database.max_connections,
                database.connection_timeout(),
            ))
        }
        StoreBackend::Memory => Arc::new(MemoryTallyStore::new()),
    };
    Ok(store)
}
