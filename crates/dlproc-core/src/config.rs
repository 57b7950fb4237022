//! Flow runner configuration.
//!
//! Loaded from environment variables (a `.env` file is honoured by the
//! binary):
//! - `DLPROC_PROPERTY_ROOT`: directory holding property files (default: "/dlproc/property")
//! - `DLPROC_AUDIT_SINK`: `postgres` or `warehouse` (default: "postgres")
//! - `DLPROC_AUDIT_TABLE`: audit table (default: "datalake_monitoring.dlproc_audit")
//! - `DLPROC_ENGINE_DB`: DuckDB database file (default: in-memory)
//! - `DLPROC_LEGACY_ABORT_RECORD`: write `UNKNOWN` flow name and context id on
//!   the flow-level failure record (default: false)
//! - `DATABASE_URL`: audit store connection string (overrides `POSTGRES_*`)
//! - `POSTGRES_HOST`, `POSTGRES_PORT`, `POSTGRES_USER`, `POSTGRES_PASSWORD`,
//!   `POSTGRES_DATABASE`

use serde::Deserialize;
use std::path::PathBuf;

use crate::error::DlprocError;
use crate::sink::SinkKind;

/// Audit store connection settings, read from `POSTGRES_*` variables.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: String,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default)]
    pub password: String,

    #[serde(default = "default_database")]
    pub database: String,
}

fn default_host() -> String {
    "master-02".to_string()
}

fn default_port() -> String {
    "5432".to_string()
}

fn default_user() -> String {
    "dlproc".to_string()
}

fn default_database() -> String {
    "datalake_monitoring".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            user: default_user(),
            password: String::new(),
            database: default_database(),
        }
    }
}

/// Quote a value for a libpq key/value connection string.
fn quote_conn_value(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

impl DatabaseConfig {
    /// Key/value connection string; safe for passwords containing `@` or `/`.
    pub fn connection_string(&self) -> String {
        let mut conn = format!(
            "host={} port={} user={} dbname={}",
            quote_conn_value(&self.host),
            quote_conn_value(&self.port),
            quote_conn_value(&self.user),
            quote_conn_value(&self.database)
        );
        if !self.password.is_empty() {
            conn.push_str(" password=");
            conn.push_str(&quote_conn_value(&self.password));
        }
        conn
    }
}

/// Flow runner configuration.
///
/// The `DLPROC_*` settings deserialize from the prefixed variables; the
/// audit store settings are filled in by [`DlprocConfig::from_vars`].
#[derive(Debug, Clone, Deserialize)]
pub struct DlprocConfig {
    #[serde(default = "default_property_root")]
    pub property_root: PathBuf,

    #[serde(default)]
    pub audit_sink: SinkKind,

    #[serde(default = "default_audit_table")]
    pub audit_table: String,

    /// DuckDB database file; `None` keeps the engine in memory.
    #[serde(default)]
    pub engine_db: Option<String>,

    #[serde(default)]
    pub legacy_abort_record: bool,

    #[serde(skip)]
    pub database_url: Option<String>,

    #[serde(skip)]
    pub database: DatabaseConfig,
}

/// Unprefixed `DATABASE_URL`.
#[derive(Debug, Deserialize)]
struct AuditStoreUrl {
    database_url: Option<String>,
}

fn default_property_root() -> PathBuf {
    PathBuf::from("/dlproc/property")
}

fn default_audit_table() -> String {
    "datalake_monitoring.dlproc_audit".to_string()
}

impl DlprocConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, DlprocError> {
        Self::from_vars(std::env::vars())
    }

    /// Load configuration from an explicit set of variables.
    ///
    /// Variables set to an empty string count as unset.
    pub fn from_vars<I>(vars: I) -> Result<Self, DlprocError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: Vec<(String, String)> = vars
            .into_iter()
            .filter(|(_, value)| !value.is_empty())
            .collect();

        let mut config: DlprocConfig = envy::prefixed("DLPROC_").from_iter(vars.iter().cloned())?;
        config.database = envy::prefixed("POSTGRES_").from_iter(vars.iter().cloned())?;
        config.database_url = envy::from_iter::<_, AuditStoreUrl>(vars)?.database_url;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot run a flow.
    ///
    /// The warehouse sink writes through the engine session, so it needs a
    /// database file that outlives the session.
    pub fn validate(&self) -> Result<(), DlprocError> {
        let in_memory = matches!(self.engine_db.as_deref(), None | Some(":memory:"));
        if self.audit_sink == SinkKind::Warehouse && in_memory {
            return Err(DlprocError::Config(
                "DLPROC_AUDIT_SINK=warehouse requires DLPROC_ENGINE_DB to name a database file"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Connection string for the relational audit store.
    pub fn postgres_connection_string(&self) -> String {
        self.database_url
            .clone()
            .unwrap_or_else(|| self.database.connection_string())
    }
}

impl Default for DlprocConfig {
    fn default() -> Self {
        Self {
            property_root: default_property_root(),
            audit_sink: SinkKind::Postgres,
            audit_table: default_audit_table(),
            engine_db: None,
            legacy_abort_record: false,
            database_url: None,
            database: DatabaseConfig::default(),
        }
    }
}
