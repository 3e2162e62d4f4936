//! Sync configuration.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use diskmirror_common::{file_name_of, AccessToken, Error, Result};
use diskmirror_storage::DiskConfig;

use crate::reconcile::ReconcileStrategy;
use crate::scheduler::InvalidPeriodPolicy;

/// Names of the variables read by [`SyncConfig::from_vars`].
pub mod vars {
    pub const TOKEN: &str = "YANDEX_DISK_TOKEN";
    pub const CLOUD_FOLDER: &str = "CLOUD_FOLDER";
    pub const SYNC_FOLDER: &str = "SYNCHRONIZED_FOLDER";
    pub const SYNC_PERIOD: &str = "SYNC_PERIOD";
    pub const IGNORED_NAMES: &str = "IGNORED_NAMES";
    pub const LOG_FILE: &str = "LOG_FILE";
    pub const API_BASE: &str = "DISK_API_BASE";
    pub const QUEUE_CAPACITY: &str = "QUEUE_CAPACITY";
    pub const DEBOUNCE_MS: &str = "DEBOUNCE_MS";
    pub const REQUEST_TIMEOUT: &str = "REQUEST_TIMEOUT";
    pub const RECONCILE_STRATEGY: &str = "RECONCILE_STRATEGY";
    pub const INVALID_PERIOD_POLICY: &str = "INVALID_PERIOD_POLICY";
}

const DEFAULT_SYNC_PERIOD: &str = "1";
const DEFAULT_IGNORED: &[&str] = &[".DS_Store"];
const DEFAULT_QUEUE_CAPACITY: usize = 256;
const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for the sync engine.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// OAuth token for the remote service.
    pub token: AccessToken,
    /// Remote folder mirrored to (e.g. `disk:/backup`).
    pub cloud_folder: String,
    /// Local folder being watched.
    pub sync_folder: PathBuf,
    /// Heartbeat period in seconds, unparsed. Validated by the scheduler on
    /// every tick.
    pub sync_period: String,
    /// File names excluded from every sync action.
    pub ignored_names: BTreeSet<String>,
    /// Log file for the logging layer, if any.
    pub log_file: Option<PathBuf>,
    /// Override of the remote API base URL.
    pub api_base_url: Option<String>,
    /// Capacity of the watcher → dispatcher queue.
    pub queue_capacity: usize,
    /// Per-path coalescing window; zero disables coalescing.
    pub debounce: Duration,
    /// Connect and API-call timeout for remote calls. Uploads get this plus
    /// time proportional to the file size.
    pub request_timeout: Duration,
    /// Run reconciliation before watching.
    pub reconcile_on_start: bool,
    pub reconcile_strategy: ReconcileStrategy,
    pub invalid_period_policy: InvalidPeriodPolicy,
}

impl SyncConfig {
    /// Create a configuration with defaults for everything but the three
    /// required values.
    pub fn new(
        token: AccessToken,
        cloud_folder: impl Into<String>,
        sync_folder: impl Into<PathBuf>,
    ) -> Self {
        Self {
            token,
            cloud_folder: cloud_folder.into(),
            sync_folder: sync_folder.into(),
            sync_period: DEFAULT_SYNC_PERIOD.to_string(),
            ignored_names: DEFAULT_IGNORED.iter().map(|s| s.to_string()).collect(),
            log_file: None,
            api_base_url: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            debounce: DEFAULT_DEBOUNCE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            reconcile_on_start: true,
            reconcile_strategy: ReconcileStrategy::default(),
            invalid_period_policy: InvalidPeriodPolicy::default(),
        }
    }

    /// Build a configuration from named variables.
    ///
    /// `lookup` is usually backed by the process environment after a `.env`
    /// file was loaded into it. Empty values count as unset.
    ///
    /// # Errors
    /// - A required variable is missing
    /// - A numeric or enumerated variable does not parse
    ///
    /// The sync period is not validated here; the scheduler checks it on
    /// every tick.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let require =
            |name: &str| get(name).ok_or_else(|| Error::Config(format!("{} is not set", name)));

        let token = AccessToken::new(require(vars::TOKEN)?)?;
        let mut config = Self::new(token, require(vars::CLOUD_FOLDER)?, require(vars::SYNC_FOLDER)?);

        if let Some(period) = lookup(vars::SYNC_PERIOD) {
            config.sync_period = period;
        }
        if let Some(names) = lookup(vars::IGNORED_NAMES) {
            config.ignored_names = names
                .split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(String::from)
                .collect();
        }
        config.log_file = get(vars::LOG_FILE).map(PathBuf::from);
        config.api_base_url = get(vars::API_BASE);

        if let Some(capacity) = get(vars::QUEUE_CAPACITY) {
            config.queue_capacity = parse_number::<usize>(vars::QUEUE_CAPACITY, &capacity)?;
            if config.queue_capacity == 0 {
                return Err(Error::Config(format!("{} must be positive", vars::QUEUE_CAPACITY)));
            }
        }
        if let Some(ms) = get(vars::DEBOUNCE_MS) {
            config.debounce = Duration::from_millis(parse_number::<u64>(vars::DEBOUNCE_MS, &ms)?);
        }
        if let Some(secs) = get(vars::REQUEST_TIMEOUT) {
            let secs = parse_number::<u64>(vars::REQUEST_TIMEOUT, &secs)?;
            if secs == 0 {
                return Err(Error::Config(format!("{} must be positive", vars::REQUEST_TIMEOUT)));
            }
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(strategy) = get(vars::RECONCILE_STRATEGY) {
            config.reconcile_strategy = strategy.parse()?;
        }
        if let Some(policy) = get(vars::INVALID_PERIOD_POLICY) {
            config.invalid_period_policy = policy.parse()?;
        }

        Ok(config)
    }

    /// Parse the heartbeat period.
    ///
    /// # Errors
    /// - `Error::Config` if the value is not a positive integer
    pub fn sync_period(&self) -> Result<Duration> {
        match self.sync_period.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
            _ => Err(Error::Config(format!(
                "sync period must be a positive integer number of seconds, got {:?}",
                self.sync_period
            ))),
        }
    }

    /// Whether a file name is on the ignore-list.
    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignored_names.contains(name)
    }

    /// Whether the file name of `path` is on the ignore-list.
    pub fn is_ignored_path(&self, path: &Path) -> bool {
        file_name_of(path).is_some_and(|name| self.is_ignored(name))
    }

    /// Remote provider configuration derived from this config.
    pub fn disk_config(&self) -> DiskConfig {
        let config = DiskConfig::new(self.token.clone()).with_timeout(self.request_timeout);
        match &self.api_base_url {
            Some(base) => config.with_base_url(base.clone()),
            None => config,
        }
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} must be a number, got {:?}", name, value)))
}
