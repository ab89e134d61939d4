//! Controller configuration
//!
//! Timeout detection, resync cadence and cleanup parallelism. Every timeout
//! can be switched off independently; a disabled timeout is `None`.

use anyhow::Context;
use std::path::PathBuf;
use std::time::Duration;

/// Controller configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Time a deployer has to pick up a deploy item
    pub pickup_timeout: Option<Duration>,

    /// Time a deployer has to honor an abort request
    pub aborting_timeout: Option<Duration>,

    /// Progressing timeout for deploy items that do not declare their own
    pub default_timeout: Option<Duration>,

    /// Upper bound between two passes over all deploy items
    pub resync_interval: Duration,

    /// Max environments cleaned up in parallel for one registration
    pub max_concurrent_deletions: usize,

    /// Directory holding deploy item manifests, one subdirectory per namespace
    pub deploy_items_dir: PathBuf,
}

impl Config {
    /// Creates a configuration with the default timeouts
    pub fn new(deploy_items_dir: impl Into<PathBuf>) -> Self {
        Self {
            pickup_timeout: Some(Duration::from_secs(60 * 60)),
            aborting_timeout: Some(Duration::from_secs(5 * 60)),
            default_timeout: Some(Duration::from_secs(10 * 60)),
            resync_interval: Duration::from_secs(60),
            max_concurrent_deletions: 4,
            deploy_items_dir: deploy_items_dir.into(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - TERRACE_PICKUP_TIMEOUT (`none` or a duration, default: 60m)
    /// - TERRACE_ABORTING_TIMEOUT (`none` or a duration, default: 5m)
    /// - TERRACE_DEFAULT_TIMEOUT (`none` or a duration, default: 10m)
    /// - TERRACE_RESYNC_INTERVAL (duration, default: 60s)
    /// - TERRACE_MAX_CONCURRENT_DELETIONS (default: 4)
    /// - TERRACE_DEPLOY_ITEMS_DIR (default: ./deployitems)
    ///
    /// Durations are integer seconds, optionally suffixed with `s`, `m` or `h`.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unparsable value.
    pub fn from_env() -> anyhow::Result<Self> {
        let dir = std::env::var("TERRACE_DEPLOY_ITEMS_DIR").unwrap_or_else(|_| "./deployitems".into());
        let mut config = Self::new(dir);

        if let Ok(raw) = std::env::var("TERRACE_PICKUP_TIMEOUT") {
            config.pickup_timeout =
                parse_timeout(&raw).context("invalid TERRACE_PICKUP_TIMEOUT")?;
        }
        if let Ok(raw) = std::env::var("TERRACE_ABORTING_TIMEOUT") {
            config.aborting_timeout =
                parse_timeout(&raw).context("invalid TERRACE_ABORTING_TIMEOUT")?;
        }
        if let Ok(raw) = std::env::var("TERRACE_DEFAULT_TIMEOUT") {
            config.default_timeout =
                parse_timeout(&raw).context("invalid TERRACE_DEFAULT_TIMEOUT")?;
        }
        if let Ok(raw) = std::env::var("TERRACE_RESYNC_INTERVAL") {
            config.resync_interval =
                parse_duration(&raw).context("invalid TERRACE_RESYNC_INTERVAL")?;
        }
        if let Ok(raw) = std::env::var("TERRACE_MAX_CONCURRENT_DELETIONS") {
            config.max_concurrent_deletions = raw
                .trim()
                .parse::<usize>()
                .context("invalid TERRACE_MAX_CONCURRENT_DELETIONS")?;
        }

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.resync_interval.is_zero() {
            anyhow::bail!("resync_interval must be greater than 0");
        }

        if self.max_concurrent_deletions == 0 {
            anyhow::bail!("max_concurrent_deletions must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new("./deployitems")
    }
}

/// Parses a timeout where `none` and zero disable detection
pub fn parse_timeout(raw: &str) -> anyhow::Result<Option<Duration>> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    let duration = parse_duration(raw)?;
    Ok(Some(duration).filter(|d| !d.is_zero()))
}

/// Parses `90`, `90s`, `15m` or `2h`
pub fn parse_duration(raw: &str) -> anyhow::Result<Duration> {
    let raw = raw.trim();
    let (digits, multiplier) = match raw.chars().last() {
        Some('s') => (&raw[..raw.len() - 1], 1),
        Some('m') => (&raw[..raw.len() - 1], 60),
        Some('h') => (&raw[..raw.len() - 1], 60 * 60),
        _ => (raw, 1),
    };
    let value = digits
        .parse::<u64>()
        .with_context(|| format!("{:?} is not a duration", raw))?;
    Ok(Duration::from_secs(value * multiplier))
}
