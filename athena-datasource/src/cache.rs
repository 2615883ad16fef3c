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

//! An in-memory cache shared by every request of a data source.
//!
//! Each entry carries its own expiration. Entries are never updated in place:
//! a writer replaces the whole value, the last writer wins. Expired entries are
//! dropped when they are read and by a periodic janitor.
//!
//! # Key namespaces
//! * `QueryResults/<datasource>/<region>/<query execution id>/<max rows>`
//! * `Workgroup/<datasource>/<region>/<workgroup>`
//! * `StartQueryExecution/<datasource>/<region>/<query>/<max rows>`
//! * `LastQueryExecutionId/<datasource>/<region>/<workgroup>`
//! * `QueryExecutions/<datasource>/<region>/<workgroup>`

use crate::aws::{QueryExecution, ResultSet, WorkGroup};
use dashmap::DashMap;
use log::debug;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// A cache key. Each namespace has exactly one constructor so that the parts
/// of a key are always joined in the same order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// The header-less result rows of a query execution.
    pub fn query_results(
        datasource_id: i64,
        region: &str,
        query_execution_id: &str,
        max_rows: i64,
    ) -> Self {
        CacheKey(format!(
            "QueryResults/{}/{}/{}/{}",
            datasource_id, region, query_execution_id, max_rows
        ))
    }

    /// The configuration of a workgroup.
    pub fn workgroup(datasource_id: i64, region: &str, work_group: &str) -> Self {
        CacheKey(format!(
            "Workgroup/{}/{}/{}",
            datasource_id, region, work_group
        ))
    }

    /// The execution id of an already started query.
    pub fn start_query_execution(
        datasource_id: i64,
        region: &str,
        query_string: &str,
        max_rows: i64,
    ) -> Self {
        CacheKey(format!(
            "StartQueryExecution/{}/{}/{}/{}",
            datasource_id, region, query_string, max_rows
        ))
    }

    /// The newest query execution id seen when listing a workgroup.
    pub fn last_query_execution_id(datasource_id: i64, region: &str, work_group: &str) -> Self {
        CacheKey(format!(
            "LastQueryExecutionId/{}/{}/{}",
            datasource_id, region, work_group
        ))
    }

    /// The query executions of a workgroup.
    pub fn query_executions(datasource_id: i64, region: &str, work_group: &str) -> Self {
        CacheKey(format!(
            "QueryExecutions/{}/{}/{}",
            datasource_id, region, work_group
        ))
    }

    /// Returns the key as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A cached value.
#[derive(Debug, Clone)]
pub enum CacheValue {
    /// Result rows of one query execution, header already trimmed.
    QueryResults(Arc<ResultSet>),
    /// A workgroup configuration.
    WorkGroup(Arc<WorkGroup>),
    /// A query execution id.
    QueryExecutionId(String),
    /// A list of query executions.
    QueryExecutions(Arc<Vec<QueryExecution>>),
}

#[derive(Debug)]
struct Entry {
    value:      CacheValue,
    /// `None` if the expiration lies beyond what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map_or(false, |expires_at| now >= expires_at)
    }
}

/// A concurrent key-value store with per-entry expiration.
#[derive(Debug, Default)]
pub struct Cache(DashMap<CacheKey, Entry>);

impl Cache {
    /// Create a new `Cache`.
    pub fn new() -> Cache {
        Cache(DashMap::new())
    }

    /// Returns the live value of `key`.
    pub fn get(&self, key: &CacheKey) -> Option<CacheValue> {
        let now = Instant::now();
        if let Some(entry) = self.0.get(key) {
            if !entry.is_expired(now) {
                return Some(entry.value.clone());
            }
        }
        self.0.remove_if(key, |_, entry| entry.is_expired(now));
        None
    }

    /// Stores `value` under `key` for `ttl`, replacing any previous value.
    ///
    /// An entry whose `ttl` overflows the clock never expires.
    pub fn set(&self, key: CacheKey, value: CacheValue, ttl: Duration) {
        let expires_at = Instant::now().checked_add(ttl);
        self.0.insert(key, Entry { value, expires_at });
    }

    /// Returns the cached result rows of `key`.
    pub fn get_query_results(&self, key: &CacheKey) -> Option<Arc<ResultSet>> {
        match self.get(key) {
            Some(CacheValue::QueryResults(results)) => Some(results),
            _ => None,
        }
    }

    /// Returns the cached workgroup of `key`.
    pub fn get_work_group(&self, key: &CacheKey) -> Option<Arc<WorkGroup>> {
        match self.get(key) {
            Some(CacheValue::WorkGroup(work_group)) => Some(work_group),
            _ => None,
        }
    }

    /// Returns the cached query execution id of `key`.
    pub fn get_query_execution_id(&self, key: &CacheKey) -> Option<String> {
        match self.get(key) {
            Some(CacheValue::QueryExecutionId(id)) => Some(id),
            _ => None,
        }
    }

    /// Returns the cached query executions of `key`.
    pub fn get_query_executions(&self, key: &CacheKey) -> Option<Arc<Vec<QueryExecution>>> {
        match self.get(key) {
            Some(CacheValue::QueryExecutions(executions)) => Some(executions),
            _ => None,
        }
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.0.len();
        self.0.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.0.len())
    }

    /// Returns the number of entries, expired ones included.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the cache holds no entry.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Spawns a task that purges expired entries every `interval`.
    ///
    /// The task only holds a weak reference and stops once the cache is
    /// dropped.
    pub fn spawn_janitor(cache: &Arc<Cache>, interval: Duration) -> JoinHandle<()> {
        let cache: Weak<Cache> = Arc::downgrade(cache);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match cache.upgrade() {
                    Some(cache) => {
                        let purged = cache.purge_expired();
                        if purged > 0 {
                            debug!("Purged {} expired cache entries", purged);
                        }
                    }
                    None => break,
                }
            }
        })
    }
}
