//! Worker settings read from the environment.

mod dependencies;

pub use dependencies::Dependencies;

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::retry::RetryPolicy;
use crate::IndexingError;

/// Default tenant prefix for topics and consumer groups.
const DEFAULT_TENANT: &str = "default";

const DEFAULT_PIPELINE_MGMT_URL: &str = "http://localhost:13011";
const DEFAULT_INDEX_BASE_URL: &str = "http://localhost:13012";

const DEFAULT_FLUSH_MIB: usize = 5;
const DEFAULT_FLUSH_ITEMS: usize = 10_000;
const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 5;
const DEFAULT_RETRY_INTERVAL_MS: u64 = 3000;
const DEFAULT_FAILURE_THRESHOLD: usize = 10;
const DEFAULT_PACKAGE_POOL_SIZE: usize = 20;
const DEFAULT_POLL_TIMEOUT_MS: u64 = 1000;
const DEFAULT_WATCH_WORKERS_INTERVAL_SECS: u64 = 600;
const DEFAULT_CONFIG_POLL_INTERVAL_MS: u64 = 1000;

/// Batching and retry settings of an ingestion task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSettings {
    /// Tenant prefix used to derive consumer groups and output topics.
    pub tenant: String,
    /// Flush once the batch payload reaches this many bytes.
    pub flush_bytes: usize,
    /// Flush once the batch holds this many records.
    pub flush_items: usize,
    /// Flush a non-empty batch when this much time passed since the last flush.
    pub flush_interval: Duration,
    pub retry_interval: Duration,
    /// Attempts allowed for a poll or a bulk index flush.
    pub failure_threshold: usize,
    /// Parallel enrichment jobs per flush.
    pub package_pool_size: usize,
    pub poll_timeout: Duration,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            tenant: DEFAULT_TENANT.to_string(),
            flush_bytes: DEFAULT_FLUSH_MIB * 1024 * 1024,
            flush_items: DEFAULT_FLUSH_ITEMS,
            flush_interval: Duration::from_secs(DEFAULT_FLUSH_INTERVAL_SECS),
            retry_interval: Duration::from_millis(DEFAULT_RETRY_INTERVAL_MS),
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            package_pool_size: DEFAULT_PACKAGE_POOL_SIZE,
            poll_timeout: Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS),
        }
    }
}

impl TaskSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.failure_threshold, self.retry_interval)
    }
}

/// Settings of the whole worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
    /// The pipeline owned by this process.
    pub pipeline_id: String,
    pub pipeline_mgmt_url: String,
    pub index_base_url: String,
    pub task: TaskSettings,
    /// Period of the auto-recovery reconciliation.
    pub watch_workers_interval: Duration,
    /// Pause between two configuration polls.
    pub config_poll_interval: Duration,
}

impl WorkerSettings {
    /// Load settings from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `PIPELINE_ID`: Pipeline owned by this worker (required)
    /// - `MQ_TENANT`: Tenant prefix (default: default)
    /// - `PIPELINE_MGMT_URL`: Pipeline configuration store (default: http://localhost:13011)
    /// - `INDEX_BASE_URL`: Index base metadata service (default: http://localhost:13012)
    /// - `FLUSH_MIB`: Batch size threshold in MiB (default: 5)
    /// - `FLUSH_ITEMS`: Batch record threshold (default: 10000)
    /// - `FLUSH_INTERVAL_SECS`: Batch age threshold (default: 5)
    /// - `RETRY_INTERVAL_MS`: Pause between retries (default: 3000)
    /// - `FAILURE_THRESHOLD`: Attempts per poll or flush (default: 10)
    /// - `PACKAGE_POOL_SIZE`: Parallel enrichment jobs (default: 20)
    /// - `KAFKA_POLL_TIMEOUT_MS`: Upper bound of one poll (default: 1000)
    /// - `WATCH_WORKERS_INTERVAL_SECS`: Auto-recovery period (default: 600)
    /// - `CONFIG_POLL_INTERVAL_MS`: Configuration poll period (default: 1000)
    ///
    /// Invalid numbers fall back to their default with a warning.
    pub fn from_env() -> Result<Self, IndexingError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, IndexingError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pipeline_id = lookup("PIPELINE_ID")
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| IndexingError::config("PIPELINE_ID is required"))?;

        let flush_mib: usize = parse_or_default(&lookup, "FLUSH_MIB", DEFAULT_FLUSH_MIB);
        let task = TaskSettings {
            tenant: lookup("MQ_TENANT").unwrap_or_else(|| DEFAULT_TENANT.to_string()),
            flush_bytes: flush_mib * 1024 * 1024,
            flush_items: parse_or_default(&lookup, "FLUSH_ITEMS", DEFAULT_FLUSH_ITEMS),
            flush_interval: Duration::from_secs(parse_or_default(
                &lookup,
                "FLUSH_INTERVAL_SECS",
                DEFAULT_FLUSH_INTERVAL_SECS,
            )),
            retry_interval: Duration::from_millis(parse_or_default(
                &lookup,
                "RETRY_INTERVAL_MS",
                DEFAULT_RETRY_INTERVAL_MS,
            )),
            failure_threshold: parse_or_default(
                &lookup,
                "FAILURE_THRESHOLD",
                DEFAULT_FAILURE_THRESHOLD,
            ),
            package_pool_size: parse_or_default(
                &lookup,
                "PACKAGE_POOL_SIZE",
                DEFAULT_PACKAGE_POOL_SIZE,
            ),
            poll_timeout: Duration::from_millis(parse_or_default(
                &lookup,
                "KAFKA_POLL_TIMEOUT_MS",
                DEFAULT_POLL_TIMEOUT_MS,
            )),
        };

        if task.failure_threshold == 0 {
            return Err(IndexingError::config("FAILURE_THRESHOLD must be at least 1"));
        }
        if task.package_pool_size == 0 {
            return Err(IndexingError::config("PACKAGE_POOL_SIZE must be at least 1"));
        }

        Ok(Self {
            pipeline_id,
            pipeline_mgmt_url: lookup("PIPELINE_MGMT_URL")
                .unwrap_or_else(|| DEFAULT_PIPELINE_MGMT_URL.to_string()),
            index_base_url: lookup("INDEX_BASE_URL")
                .unwrap_or_else(|| DEFAULT_INDEX_BASE_URL.to_string()),
            task,
            watch_workers_interval: Duration::from_secs(parse_or_default(
                &lookup,
                "WATCH_WORKERS_INTERVAL_SECS",
                DEFAULT_WATCH_WORKERS_INTERVAL_SECS,
            )),
            config_poll_interval: Duration::from_millis(parse_or_default(
                &lookup,
                "CONFIG_POLL_INTERVAL_MS",
                DEFAULT_CONFIG_POLL_INTERVAL_MS,
            )),
        })
    }
}

fn parse_or_default<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display + Copy,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            warn!(variable = %name, value = %raw, default = %default, "Invalid value, using default");
            default
        }),
        None => default,
    }
}
