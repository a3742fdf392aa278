use std::collections::HashMap;

use anyhow::Context;
use config::{Config, Environment, File};
use serde::Deserialize;

use piwi_observability::LogFormat;

/// Runtime settings, read from an optional `piwi.toml` and `PIWI__*`
/// environment variables (`PIWI__DATABASE_URL`, `PIWI__TABLE_PREFIX`, ...).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Settings {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_database_url() -> String {
    "sqlite::memory:".to_string()
}

fn default_table_prefix() -> String {
    "piwi_".to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            table_prefix: default_table_prefix(),
            log_filter: default_log_filter(),
            log_format: LogFormat::default(),
        }
    }
}

impl Settings {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_sources("piwi", None)
    }

    /// `env` replaces the process environment when given.
    fn from_sources(file: &str, env: Option<HashMap<String, String>>) -> anyhow::Result<Self> {
        let settings: Settings = Config::builder()
            .add_source(File::with_name(file).required(false))
            .add_source(Environment::with_prefix("PIWI").separator("__").source(env))
            .build()
            .context("failed to read piwi configuration")?
            .try_deserialize()
            .context("invalid piwi configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        crate::history::sqlite::table_name(&self.table_prefix)?;
        Ok(())
    }

    pub fn init_tracing(&self) {
        piwi_observability::init(&self.log_filter, self.log_format);
    }
}
