//! Server configuration: an optional TOML file plus command-line overrides.

use anyhow::bail;
use anyhow::Context;
use clap::Parser;
use clap::ValueEnum;
use dropshot::ConfigDropshot;
use dropshot::ConfigLogging;
use dropshot::ConfigLoggingLevel;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "popcat-api", about = "Click-counting leaderboard API")]
pub struct Args {
    /// Path to a TOML configuration file
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Address to listen on, overriding the configuration file
    #[arg(long)]
    pub bind_address: Option<SocketAddr>,

    /// Where tallies are kept, overriding the configuration file
    #[arg(long, value_enum)]
    pub store: Option<StoreBackend>,

    /// PostgreSQL connection URL, overriding the configuration file
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Postgres,
    Memory,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            backend: StoreBackend::default(),
            url: None,
            max_connections: 4,
            connection_timeout_secs: 5,
        }
    }
}

impl DatabaseConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }
}

#[derive(Deserialize)]
pub struct Config {
    #[serde(default)]
    pub dropshot: ConfigDropshot,
    #[serde(default = "default_logging")]
    pub log: ConfigLogging,
    #[serde(default)]
    pub database: DatabaseConfig,
}

fn default_logging() -> ConfigLogging {
    ConfigLogging::StderrTerminal { level: ConfigLoggingLevel::Info }
}

impl Config {
    pub fn from_file(path: &Path) -> anyhow::Result<Config> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Config::from_toml(&contents)
            .with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Config> {
        let config: Config = toml::from_str(contents)?;
        Ok(config)
    }

    /// Loads the file named by `args` (if any), applies the command-line
    /// overrides and validates the result.
    pub fn load(args: &Args) -> anyhow::Result<Config> {
        let mut config = match &args.config {
            Some(path) => Config::from_file(path)?,
            None => Config::from_toml("")?,
        };
        config.apply(args);
        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, args: &Args) {
        if let Some(bind_address) = args.bind_address {
            self.dropshot.bind_address = bind_address;
        }
        if let Some(store) = args.store {
            self.database.backend = store;
        }
        if let Some(url) = &args.database_url {
            self.database.url = Some(url.clone());
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        let database = &self.database;
        if database.backend == StoreBackend::Postgres {
            match database.url.as_deref() {
                Some(url) if !url.is_empty() => (),
                _ => bail!(
                    "the postgres store needs a database URL \
                     (set database.url, --database-url or DATABASE_URL)"
                ),
            }
        }
        if database.max_connections == 0 {
            bail!("database.max_connections must be at least 1");
        }
        Ok(())
    }
}
