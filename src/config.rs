use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, str::FromStr, time::Duration};

/// Requests to the upload route may carry this many bytes. Larger than the
/// validator's image limit so oversized images are rejected with a precise
/// size report rather than a truncated body.
pub const UPLOAD_BODY_LIMIT: usize = 16 * 1024 * 1024;

/// Where evidence metadata is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MetadataBackend {
    /// Process memory; lost on restart.
    Memory,
    /// One JSON document per tracking number.
    Json,
    /// SQLite database via sqlx.
    Sqlite,
}

impl FromStr for MetadataBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "json" => Ok(Self::Json),
            "sqlite" => Ok(Self::Sqlite),
            other => bail!(
                "unknown metadata backend `{}` (expected memory, json or sqlite)",
                other
            ),
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub metadata_backend: MetadataBackend,
    pub metadata_dir: String,
    pub database_url: String,
    pub io_timeout_secs: u64,
}

/// One-shot modes requested on the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunMode {
    pub migrate: bool,
    pub reconcile: bool,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Package tracking delivery evidence API")]
pub struct Args {
    /// Host to bind to (overrides EVIDENCE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides EVIDENCE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where evidence images are stored (overrides EVIDENCE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Metadata backend (overrides EVIDENCE_METADATA_BACKEND)
    #[arg(long, value_enum)]
    pub metadata_backend: Option<MetadataBackend>,

    /// Directory for JSON metadata documents (overrides EVIDENCE_METADATA_DIR)
    #[arg(long)]
    pub metadata_dir: Option<String>,

    /// Database URL for the sqlite backend (overrides EVIDENCE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Seconds before a file operation is abandoned (overrides EVIDENCE_IO_TIMEOUT_SECS)
    #[arg(long)]
    pub io_timeout_secs: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,

    /// Compare stored files with metadata, print the report and exit
    #[arg(long)]
    pub reconcile: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and run mode.
    pub fn from_env_and_args() -> Result<(Self, RunMode)> {
        let args = Args::parse();
        Self::from_args(args)
    }

    /// Merge parsed arguments over environment values and defaults.
    pub fn from_args(args: Args) -> Result<(Self, RunMode)> {
        // --- Environment fallback ---
        let env_host = env::var("EVIDENCE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parsed("EVIDENCE_PORT", 8080u16)?;
        let env_storage =
            env::var("EVIDENCE_STORAGE_DIR").unwrap_or_else(|_| "./uploads/evidence".into());
        let env_backend = env_parsed("EVIDENCE_METADATA_BACKEND", MetadataBackend::Json)?;
        let env_metadata_dir =
            env::var("EVIDENCE_METADATA_DIR").unwrap_or_else(|_| "./data/metadata".into());
        let env_db = env::var("EVIDENCE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/evidence.db".into());
        let env_timeout = env_parsed("EVIDENCE_IO_TIMEOUT_SECS", 10u64)?;

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            metadata_backend: args.metadata_backend.unwrap_or(env_backend),
            metadata_dir: args.metadata_dir.unwrap_or(env_metadata_dir),
            database_url: args.database_url.unwrap_or(env_db),
            io_timeout_secs: args.io_timeout_secs.unwrap_or(env_timeout),
        };

        if cfg.io_timeout_secs == 0 {
            bail!("io timeout must be at least one second");
        }

        let mode = RunMode {
            migrate: args.migrate,
            reconcile: args.reconcile,
        };
        Ok((cfg, mode))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }
}

/// Read and parse an environment variable, falling back to `default` when unset.
fn env_parsed<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}
