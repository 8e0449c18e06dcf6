//! Configuration file loading and settings resolution.
//!
//! Precedence: command line, then the config file, then built-in defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use zotsync_core::remote::{CONNECT_TIMEOUT_SECS, DEFAULT_API_BASE_URL, READ_TIMEOUT_SECS};
use zotsync_core::sync::{DEFAULT_FETCH_WIDTH, DEFAULT_INGEST_WIDTH};
use zotsync_core::{ClientOptions, DEFAULT_MAX_RETRIES, DatabaseOptions};

use crate::cli::{Cli, SyncArgs};

const APP_DIR: &str = "zotsync";
const DATABASE_FILE: &str = "zotsync.db";
const CONTENT_DIR: &str = "documents";

/// Values read from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    pub database_path: Option<PathBuf>,
    pub content_dir: Option<PathBuf>,
    pub api_base_url: Option<String>,
    pub fetch_concurrency: Option<u8>,
    pub download_concurrency: Option<u8>,
    pub ingest_concurrency: Option<u8>,
    pub max_retries: Option<u8>,
    pub connect_timeout_secs: Option<u64>,
    pub read_timeout_secs: Option<u64>,
    /// Database pool max connections (1..=20).
    pub db_max_connections: Option<u32>,
    pub db_busy_timeout_ms: Option<u32>,
    pub verbosity: Option<VerbositySetting>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        validate_concurrency("fetch_concurrency", self.fetch_concurrency)?;
        validate_concurrency("download_concurrency", self.download_concurrency)?;
        validate_concurrency("ingest_concurrency", self.ingest_concurrency)?;

        if let Some(max_retries) = self.max_retries
            && max_retries > 10
        {
            bail!("Invalid config value for `max_retries`: {max_retries}. Expected range: 0..=10");
        }

        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;

        if let Some(value) = self.db_max_connections
            && !(1..=20).contains(&value)
        {
            bail!("Invalid config value for `db_max_connections`: {value}. Expected range: 1..=20");
        }
        if let Some(value) = self.db_busy_timeout_ms
            && value > 120_000
        {
            bail!("Invalid config value for `db_busy_timeout_ms`: {value}. Expected range: 0..=120000");
        }
        Ok(())
    }
}

fn validate_concurrency(field: &str, value: Option<u8>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=100).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=100");
    }
    Ok(())
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

impl VerbositySetting {
    /// Log filter level for this setting.
    #[must_use]
    pub fn level(self) -> &'static str {
        match self {
            Self::Default => "info",
            Self::Verbose => "debug",
            Self::Quiet => "error",
            Self::Debug => "trace",
        }
    }
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/zotsync/config.toml`
/// 2. `$HOME/.config/zotsync/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home).join(APP_DIR).join("config.toml"));
    }
    let home = env_var_non_empty_os("HOME")?;
    Some(PathBuf::from(home).join(".config").join(APP_DIR).join("config.toml"))
}

/// Resolves the default data directory (database and documents).
///
/// Priority: `$XDG_DATA_HOME/zotsync`, `$HOME/.local/share/zotsync`, `./zotsync`.
#[must_use]
pub fn resolve_default_data_dir() -> PathBuf {
    if let Some(xdg_data_home) = env_var_non_empty_os("XDG_DATA_HOME") {
        return PathBuf::from(xdg_data_home).join(APP_DIR);
    }
    match env_var_non_empty_os("HOME") {
        Some(home) => PathBuf::from(home).join(".local").join("share").join(APP_DIR),
        None => PathBuf::from(APP_DIR),
    }
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config file from the default path, if one exists.
pub fn load_default_file_config() -> Result<Option<FileConfig>> {
    let Some(path) = resolve_default_config_path() else {
        return Ok(None);
    };
    if !path.exists() {
        return Ok(None);
    }
    load_file_config(&path).map(Some)
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_number = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_number}: expected key = value");
        };
        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = || format!("Invalid `{key}` value on line {line_number}");

        match key {
            "database_path" => {
                cfg.database_path = Some(PathBuf::from(
                    parse_string_literal(value).with_context(invalid)?,
                ));
            }
            "content_dir" => {
                cfg.content_dir = Some(PathBuf::from(
                    parse_string_literal(value).with_context(invalid)?,
                ));
            }
            "api_base_url" => {
                cfg.api_base_url = Some(parse_string_literal(value).with_context(invalid)?);
            }
            "fetch_concurrency" => {
                cfg.fetch_concurrency = Some(parse_integer_u8(value).with_context(invalid)?);
            }
            "download_concurrency" => {
                cfg.download_concurrency = Some(parse_integer_u8(value).with_context(invalid)?);
            }
            "ingest_concurrency" => {
                cfg.ingest_concurrency = Some(parse_integer_u8(value).with_context(invalid)?);
            }
            "max_retries" => {
                cfg.max_retries = Some(parse_integer_u8(value).with_context(invalid)?);
            }
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "read_timeout_secs" => {
                cfg.read_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "db_max_connections" => {
                let parsed = parse_integer_u64(value).with_context(invalid)?;
                let n = u32::try_from(parsed)
                    .map_err(|_| anyhow::anyhow!("db_max_connections out of range for u32"))?;
                cfg.db_max_connections = Some(n);
            }
            "db_busy_timeout_ms" => {
                let parsed = parse_integer_u64(value).with_context(invalid)?;
                let n = u32::try_from(parsed)
                    .map_err(|_| anyhow::anyhow!("db_busy_timeout_ms out of range for u32"))?;
                cfg.db_busy_timeout_ms = Some(n);
            }
            "verbosity" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.verbosity = Some(parse_verbosity(&parsed).with_context(|| {
                    format!("Invalid `verbosity` value '{parsed}' on line {line_number}")
                })?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_number}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u8(raw_value: &str) -> Result<u8> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<u16>()?;
    u8::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u8"))
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_verbosity(value: &str) -> Result<VerbositySetting> {
    match value {
        "default" => Ok(VerbositySetting::Default),
        "verbose" => Ok(VerbositySetting::Verbose),
        "quiet" => Ok(VerbositySetting::Quiet),
        "debug" => Ok(VerbositySetting::Debug),
        _ => bail!("Expected one of: default, verbose, quiet, debug"),
    }
}

/// Settings shared by every command.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_path: PathBuf,
    pub content_dir: PathBuf,
    pub client: ClientOptions,
    pub database: DatabaseOptions,
    /// Level used when `RUST_LOG` is not forced by a flag.
    pub log_level: &'static str,
    /// True when `-v`/`-q` were passed; they override `RUST_LOG`.
    pub force_log_level: bool,
}

impl Settings {
    /// Merges command-line values over the config file over defaults.
    #[must_use]
    pub fn resolve(cli: &Cli, file: Option<&FileConfig>) -> Self {
        let file = file.cloned().unwrap_or_default();
        let data_dir = resolve_default_data_dir();

        let force_log_level = cli.quiet || cli.verbose > 0;
        let log_level = if cli.quiet {
            "error"
        } else {
            match cli.verbose {
                0 => file
                    .verbosity
                    .map_or(VerbositySetting::Default.level(), VerbositySetting::level),
                1 => "debug",
                _ => "trace",
            }
        };

        let defaults = DatabaseOptions::default();
        Self {
            database_path: cli
                .db
                .clone()
                .or(file.database_path)
                .unwrap_or_else(|| data_dir.join(DATABASE_FILE)),
            content_dir: cli
                .content_dir
                .clone()
                .or(file.content_dir)
                .unwrap_or_else(|| data_dir.join(CONTENT_DIR)),
            client: ClientOptions {
                base_url: cli
                    .api_base_url
                    .clone()
                    .or(file.api_base_url)
                    .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
                connect_timeout_secs: file.connect_timeout_secs.unwrap_or(CONNECT_TIMEOUT_SECS),
                read_timeout_secs: file.read_timeout_secs.unwrap_or(READ_TIMEOUT_SECS),
            },
            database: DatabaseOptions {
                max_connections: file.db_max_connections.unwrap_or(defaults.max_connections),
                busy_timeout_ms: file.db_busy_timeout_ms.unwrap_or(defaults.busy_timeout_ms),
            },
            log_level,
            force_log_level,
        }
    }
}

/// Worker widths and retry budget of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub fetch_concurrency: usize,
    pub download_concurrency: usize,
    pub ingest_concurrency: usize,
    pub max_retries: u32,
}

impl SyncSettings {
    #[must_use]
    pub fn resolve(args: &SyncArgs, file: Option<&FileConfig>) -> Self {
        let pick = |cli: Option<u8>, file: Option<u8>, default: usize| {
            cli.or(file).map_or(default, usize::from)
        };
        Self {
            fetch_concurrency: pick(
                args.fetch_concurrency,
                file.and_then(|f| f.fetch_concurrency),
                DEFAULT_FETCH_WIDTH,
            ),
            download_concurrency: pick(
                args.download_concurrency,
                file.and_then(|f| f.download_concurrency),
                DEFAULT_FETCH_WIDTH,
            ),
            ingest_concurrency: pick(
                args.ingest_concurrency,
                file.and_then(|f| f.ingest_concurrency),
                DEFAULT_INGEST_WIDTH,
            ),
            max_retries: args
                .max_retries
                .or(file.and_then(|f| f.max_retries))
                .map_or(DEFAULT_MAX_RETRIES, u32::from),
        }
    }
}
