// Copyright (c) 2020-present, UMD Database Group.
//
// This program is free software: you can use, redistribute, and/or modify
// it under the terms of the GNU Affero General Public License, version 3
// or later ("AGPL"), as published by the Free Software Foundation.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

//! This module provides various default configurations for the data source.

mod datasource;
pub use self::datasource::ATHENA_CONF;
use humantime::parse_duration;
use lazy_static::lazy_static;
use std::time::Duration;

lazy_static! {
    /// Number of rows kept per query execution when the query doesn't set
    /// `maxRows`.
    pub static ref ATHENA_DEFAULT_MAX_ROWS: i64 = ATHENA_CONF["athena"]["default_max_rows"].parse::<i64>().unwrap();
    /// Maximum number of status polls while waiting for started queries.
    pub static ref ATHENA_QUERY_WAIT_COUNT: usize = ATHENA_CONF["athena"]["query_wait_count"].parse::<usize>().unwrap();
    /// Sleep between two status polls.
    pub static ref ATHENA_QUERY_WAIT_INTERVAL: Duration = parse_duration(&ATHENA_CONF["athena"]["query_wait_interval"]).unwrap();
    /// Maximum number of ids accepted by one `BatchGet*` call.
    pub static ref ATHENA_API_RESULT_MAX_LENGTH: usize = ATHENA_CONF["athena"]["api_result_max_length"].parse::<usize>().unwrap();
    /// Region used by the health check.
    pub static ref ATHENA_HEALTH_CHECK_REGION: String = ATHENA_CONF["athena"]["health_check_region"].to_string();

    /// Expiration of cached workgroup configurations.
    pub static ref ATHENA_WORKGROUP_TTL: Duration = parse_duration(&ATHENA_CONF["cache"]["workgroup_ttl"]).unwrap();
    /// Expiration of the cached query execution listing.
    pub static ref ATHENA_QUERY_EXECUTIONS_TTL: Duration = parse_duration(&ATHENA_CONF["cache"]["query_executions_ttl"]).unwrap();
    /// Interval of the cache janitor.
    pub static ref ATHENA_CACHE_CLEANUP_INTERVAL: Duration = parse_duration(&ATHENA_CONF["cache"]["cleanup_interval"]).unwrap();

    /// Namespace of the exported metrics.
    pub static ref ATHENA_METRICS_NAMESPACE: String = ATHENA_CONF["metrics"]["namespace"].to_string();
}

/// How long the executor waits for freshly started queries.
///
/// The executor polls the query status at most `max_attempts` times and
/// sleeps `interval` between two polls. When the budget is exhausted the
/// results are fetched anyway.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaitPolicy {
    /// Maximum number of status polls.
    pub max_attempts: usize,
    /// Sleep between two polls.
    pub interval:     Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        WaitPolicy {
            max_attempts: *ATHENA_QUERY_WAIT_COUNT,
            interval:     *ATHENA_QUERY_WAIT_INTERVAL,
        }
    }
}

/// Settings of one data source instance.
///
/// The defaults come from the embedded `config.toml`. A data source owns its
/// settings, so tests can shrink the wait policy without touching the globals.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Polling policy for started queries.
    pub wait:                 WaitPolicy,
    /// Row cap used when a query leaves `maxRows` empty.
    pub default_max_rows:     i64,
    /// Chunk size of the `BatchGet*` calls.
    pub batch_size:           usize,
    /// Expiration of cached workgroups.
    pub workgroup_ttl:        Duration,
    /// Expiration of the cached execution listing.
    pub query_executions_ttl: Duration,
    /// How often expired cache entries are purged.
    pub cache_cleanup:        Duration,
    /// Region used by the health check.
    pub health_check_region:  String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            wait:                 WaitPolicy::default(),
            default_max_rows:     *ATHENA_DEFAULT_MAX_ROWS,
            batch_size:           *ATHENA_API_RESULT_MAX_LENGTH,
            workgroup_ttl:        *ATHENA_WORKGROUP_TTL,
            query_executions_ttl: *ATHENA_QUERY_EXECUTIONS_TTL,
            cache_cleanup:        *ATHENA_CACHE_CLEANUP_INTERVAL,
            health_check_region:  ATHENA_HEALTH_CHECK_REGION.clone(),
        }
    }
}

impl Settings {
    /// Returns the settings with a different polling policy.
    pub fn with_wait_policy(mut self, max_attempts: usize, interval: Duration) -> Self {
        self.wait = WaitPolicy {
            max_attempts,
            interval,
        };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings() {
        let settings = Settings::default();
        assert_eq!(1000, settings.default_max_rows);
        assert_eq!(30, settings.wait.max_attempts);
        assert_eq!(Duration::from_secs(1), settings.wait.interval);
        assert_eq!(50, settings.batch_size);
        assert_eq!("us-east-1", settings.health_check_region);
        assert_eq!(Duration::from_secs(300), settings.workgroup_ttl);
        assert_eq!(Duration::from_secs(24 * 3600), settings.query_executions_ttl);
        assert_eq!(Duration::from_secs(5), settings.cache_cleanup);

        let settings = settings.with_wait_policy(3, Duration::from_millis(1));
        assert_eq!(3, settings.wait.max_attempts);
        assert_eq!(Duration::from_millis(1), settings.wait.interval);
    }
}
