//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
};

use apalis_cron::Schedule;
use clap::{Args, Parser, Subcommand};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "murmur";
const ENV_PREFIX: &str = "MURMUR";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_SYNC_MINUTES: u32 = 5;
const DEFAULT_PURGE_MINUTES: u32 = 10;
const DEFAULT_SEQUENCE_START: i64 = 0;
const DEFAULT_HOME_SIZE: usize = 100;
const DEFAULT_SYNC_SCHEDULE: &str = "0 * * * * *";
const DEFAULT_PURGE_SCHEDULE: &str = "0 */5 * * * *";
const DEFAULT_SYNC_CONCURRENCY: u32 = 8;
const DEFAULT_SEED_USERS: usize = 10;
const DEFAULT_SEED_COMMENTS: usize = 100;

/// Command-line arguments for the murmur binary.
#[derive(Debug, Parser)]
#[command(name = "murmur", version, about = "Write-back cache for users and comments")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "MURMUR_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the sync and purge workers until interrupted.
    Serve(Box<ServeArgs>),
    /// Reset both stores, fill them with demo data and sync once.
    Seed(SeedArgs),
    /// Apply pending database migrations.
    Migrate(MigrateArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,

    /// Seed both stores before the workers start.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub seed: bool,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Override the log format (compact|json).
    #[arg(long = "log-format", value_name = "FORMAT")]
    pub log_format: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the sync grace period.
    #[arg(long = "sync-minutes", value_name = "MINUTES")]
    pub sync_minutes: Option<u32>,

    /// Override the purge staleness window.
    #[arg(long = "purge-minutes", value_name = "MINUTES")]
    pub purge_minutes: Option<u32>,

    /// Override the sync cron expression.
    #[arg(long = "sync-schedule", value_name = "CRON")]
    pub sync_schedule: Option<String>,

    /// Override the purge cron expression.
    #[arg(long = "purge-schedule", value_name = "CRON")]
    pub purge_schedule: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct SeedArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Override the number of seeded users.
    #[arg(long = "users", value_name = "COUNT")]
    pub number_users: Option<usize>,

    /// Override the number of seeded comments.
    #[arg(long = "comments", value_name = "COUNT")]
    pub number_comments: Option<usize>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub jobs: JobsSettings,
    pub seed: SeedSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub sync_minutes: u32,
    pub purge_minutes: u32,
    pub sequence_start: i64,
    pub home_size: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct JobsSettings {
    pub sync_schedule: String,
    pub purge_schedule: String,
    pub sync_concurrency: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct SeedSettings {
    pub number_users: usize,
    pub number_comments: usize,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Seed(args)) => raw.apply_seed_overrides(args),
        Some(Command::Migrate(args)) => raw.apply_database_override(&args.database),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    jobs: RawJobsSettings,
    seed: RawSeedSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        self.apply_database_override(&overrides.database);
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(format) = overrides.log_format.as_ref() {
            self.logging.format = Some(format.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(minutes) = overrides.sync_minutes {
            self.cache.sync_minutes = Some(minutes);
        }
        if let Some(minutes) = overrides.purge_minutes {
            self.cache.purge_minutes = Some(minutes);
        }
        if let Some(schedule) = overrides.sync_schedule.as_ref() {
            self.jobs.sync_schedule = Some(schedule.clone());
        }
        if let Some(schedule) = overrides.purge_schedule.as_ref() {
            self.jobs.purge_schedule = Some(schedule.clone());
        }
    }

    fn apply_seed_overrides(&mut self, args: &SeedArgs) {
        self.apply_database_override(&args.database);
        if let Some(count) = args.number_users {
            self.seed.number_users = Some(count);
        }
        if let Some(count) = args.number_comments {
            self.seed.number_comments = Some(count);
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            cache,
            jobs,
            seed,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            jobs: build_jobs_settings(jobs)?,
            seed: build_seed_settings(seed),
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = match logging.format.as_deref().map(str::trim) {
        None | Some("compact") => LogFormat::Compact,
        Some("json") => LogFormat::Json,
        Some(other) => {
            return Err(LoadError::invalid(
                "logging.format",
                format!("expected `compact` or `json`, got `{other}`"),
            ));
        }
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let sequence_start = cache.sequence_start.unwrap_or(DEFAULT_SEQUENCE_START);
    if sequence_start < 0 {
        return Err(LoadError::invalid(
            "cache.sequence_start",
            "must not be negative",
        ));
    }

    let home_size = NonZeroUsize::new(cache.home_size.unwrap_or(DEFAULT_HOME_SIZE))
        .ok_or_else(|| LoadError::invalid("cache.home_size", "must be greater than zero"))?;

    Ok(CacheSettings {
        sync_minutes: cache.sync_minutes.unwrap_or(DEFAULT_SYNC_MINUTES),
        purge_minutes: cache.purge_minutes.unwrap_or(DEFAULT_PURGE_MINUTES),
        sequence_start,
        home_size,
    })
}

fn build_jobs_settings(jobs: RawJobsSettings) -> Result<JobsSettings, LoadError> {
    let sync_schedule = cron_expression(
        jobs.sync_schedule
            .unwrap_or_else(|| DEFAULT_SYNC_SCHEDULE.to_string()),
        "jobs.sync_schedule",
    )?;
    let purge_schedule = cron_expression(
        jobs.purge_schedule
            .unwrap_or_else(|| DEFAULT_PURGE_SCHEDULE.to_string()),
        "jobs.purge_schedule",
    )?;
    let sync_concurrency = non_zero_u32(
        jobs.sync_concurrency.unwrap_or(DEFAULT_SYNC_CONCURRENCY),
        "jobs.sync_concurrency",
    )?;

    Ok(JobsSettings {
        sync_schedule,
        purge_schedule,
        sync_concurrency,
    })
}

fn build_seed_settings(seed: RawSeedSettings) -> SeedSettings {
    SeedSettings {
        number_users: seed.number_users.unwrap_or(DEFAULT_SEED_USERS),
        number_comments: seed.number_comments.unwrap_or(DEFAULT_SEED_COMMENTS),
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    format: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    sync_minutes: Option<u32>,
    purge_minutes: Option<u32>,
    sequence_start: Option<i64>,
    home_size: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawJobsSettings {
    sync_schedule: Option<String>,
    purge_schedule: Option<String>,
    sync_concurrency: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSeedSettings {
    number_users: Option<usize>,
    number_comments: Option<usize>,
}

fn non_zero_u32(value: u32, key: &'static str) -> Result<NonZeroU32, LoadError> {
    NonZeroU32::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn cron_expression(value: String, key: &'static str) -> Result<String, LoadError> {
    let trimmed = value.trim();
    Schedule::from_str(trimmed)
        .map_err(|err| LoadError::invalid(key, format!("invalid cron expression: {err}")))?;
    Ok(trimmed.to_string())
}

pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
