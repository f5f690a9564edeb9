// src/config/mod.rs

use anyhow::{bail, Context, Result};
use std::{
    env,
    io::{BufRead, Write},
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};
use tracing::{debug, warn};

pub const CSV_FILE_NAME: &str = "Export_Analiz.csv";
pub const ENV_FILE_NAME: &str = ".env.local";
pub const ENDPOINT_KEY: &str = "NEXT_PUBLIC_CONVEX_URL";
pub const MUTATION_PATH: &str = "beneficiaries:importExportDataBatch";
pub const ERROR_LOG_FILE_NAME: &str = "import_errors.log";

pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_PAUSE: Duration = Duration::from_millis(500);

/// Everything the import needs to know up front.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub project_root: PathBuf,
    pub csv_file_name: String,
    pub env_file_name: String,
    pub endpoint_key: String,
    pub mutation_path: String,
    pub batch_size: usize,
    pub timeout: Duration,
    pub pause: Duration,
    pub error_log_file_name: String,
}

impl ImportConfig {
    pub fn for_root(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            csv_file_name: CSV_FILE_NAME.to_string(),
            env_file_name: ENV_FILE_NAME.to_string(),
            endpoint_key: ENDPOINT_KEY.to_string(),
            mutation_path: MUTATION_PATH.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            timeout: DEFAULT_TIMEOUT,
            pause: DEFAULT_PAUSE,
            error_log_file_name: ERROR_LOG_FILE_NAME.to_string(),
        }
    }

    /// Defaults, with the root and tuning knobs taken from `BENEFICIARY_IMPORT_*`
    /// variables when present.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`ImportConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let root = match lookup("BENEFICIARY_IMPORT_ROOT") {
            Some(r) if !r.trim().is_empty() => PathBuf::from(r),
            _ => env::current_dir().context("resolving current directory")?,
        };
        let mut cfg = Self::for_root(root);

        if let Some(n) = parse_override::<usize>(&lookup, "BENEFICIARY_IMPORT_BATCH_SIZE") {
            cfg.batch_size = n;
        }
        if let Some(secs) = parse_override::<u64>(&lookup, "BENEFICIARY_IMPORT_TIMEOUT_SECS") {
            cfg.timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_override::<u64>(&lookup, "BENEFICIARY_IMPORT_PAUSE_MS") {
            cfg.pause = Duration::from_millis(ms);
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("batch size must be at least 1");
        }
        if self.timeout.is_zero() {
            bail!("request timeout must be greater than zero");
        }
        Ok(())
    }

    pub fn env_file_path(&self) -> PathBuf {
        self.project_root.join(&self.env_file_name)
    }

    pub fn error_log_path(&self) -> PathBuf {
        self.project_root.join(&self.error_log_file_name)
    }
}

fn parse_override<T: FromStr>(lookup: impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable override");
            None
        }
    }
}

/// Base URL of the backend deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Endpoint(base_url.into())
    }

    pub fn base_url(&self) -> &str {
        &self.0
    }

    /// `{base}/api/mutation`. The base is not validated.
    pub fn mutation_url(&self) -> String {
        format!("{}/api/mutation", self.0.trim_end_matches('/'))
    }
}

/// A way of finding the endpoint. `Ok(None)` means this strategy has no answer.
pub trait ResolveEndpoint {
    fn resolve(&mut self) -> Result<Option<Endpoint>>;
}

/// Reads `KEY=value` from an env-style file.
pub struct EnvFileEndpoint {
    path: PathBuf,
    key: String,
}

impl EnvFileEndpoint {
    pub fn new(path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            key: key.into(),
        }
    }

    pub fn from_config(cfg: &ImportConfig) -> Self {
        Self::new(cfg.env_file_path(), cfg.endpoint_key.clone())
    }
}

impl ResolveEndpoint for EnvFileEndpoint {
    fn resolve(&mut self) -> Result<Option<Endpoint>> {
        if !self.path.is_file() {
            debug!(path = %self.path.display(), "env file not found");
            return Ok(None);
        }
        lookup_env_file(&self.path, &self.key).map(|v| v.map(Endpoint::new))
    }
}

fn lookup_env_file(path: &Path, key: &str) -> Result<Option<String>> {
    let iter = dotenvy::from_path_iter(path)
        .with_context(|| format!("opening env file {}", path.display()))?;
    for item in iter {
        match item {
            Ok((k, v)) if k == key => {
                let v = v.trim();
                return Ok((!v.is_empty()).then(|| v.to_string()));
            }
            Ok(_) => {}
            Err(e) => warn!(path = %path.display(), error = %e, "skipping malformed env line"),
        }
    }
    Ok(None)
}

/// Asks the operator to type the URL. An empty answer declines.
pub struct PromptEndpoint<R, W> {
    input: R,
    output: W,
    key: String,
}

impl<R: BufRead, W: Write> PromptEndpoint<R, W> {
    pub fn new(input: R, output: W, key: impl Into<String>) -> Self {
        Self {
            input,
            output,
            key: key.into(),
        }
    }
}

impl<R: BufRead, W: Write> ResolveEndpoint for PromptEndpoint<R, W> {
    fn resolve(&mut self) -> Result<Option<Endpoint>> {
        writeln!(self.output, "❌ {} not found!", self.key)?;
        writeln!(self.output, "ℹ️  Add {} to {}", self.key, ENV_FILE_NAME)?;
        writeln!(
            self.output,
            "ℹ️  Example: {}=https://fleet-octopus-839.convex.cloud",
            self.key
        )?;
        write!(
            self.output,
            "\n💡 Enter the backend URL manually (or press Enter to cancel): "
        )?;
        self.output.flush()?;

        let mut line = String::new();
        self.input
            .read_line(&mut line)
            .context("reading endpoint from stdin")?;
        let line = line.trim();
        Ok((!line.is_empty()).then(|| Endpoint::new(line)))
    }
}

/// Always answers with the same value.
pub struct FixedEndpoint(pub Option<Endpoint>);

impl ResolveEndpoint for FixedEndpoint {
    fn resolve(&mut self) -> Result<Option<Endpoint>> {
        Ok(self.0.clone())
    }
}

/// First strategy with an answer wins.
pub fn resolve_endpoint(strategies: &mut [&mut dyn ResolveEndpoint]) -> Result<Option<Endpoint>> {
    for s in strategies.iter_mut() {
        if let Some(ep) = s.resolve()? {
            return Ok(Some(ep));
        }
    }
    Ok(None)
}
