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

//! The executor turns a query into the ids of completed query executions.
//!
//! Existing executions are deduplicated by their SQL text. An ad hoc query
//! is only started in a workgroup that limits the data scanned per query,
//! and a started execution is reused while the query's cache duration lasts.
//! Freshly started executions are polled until they leave the queued and
//! running states or the wait budget is spent.

use super::RequestContext;
use crate::aws::{QueryExecution, QueryService, QueryState, WorkGroup};
use crate::cache::{Cache, CacheKey, CacheValue};
use crate::configs::Settings;
use crate::error::{DatasourceError, Result};
use crate::metrics::DatasourceMetrics;
use crate::query::{AthenaQuery, QueryInput, QuerySource};
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Resolves queries into completed query executions.
pub struct QueryExecutor<'a> {
    client:   &'a dyn QueryService,
    cache:    &'a Cache,
    metrics:  &'a DatasourceMetrics,
    settings: &'a Settings,
}

impl<'a> QueryExecutor<'a> {
    /// Creates an executor on top of a region scoped client.
    pub fn new(
        client: &'a dyn QueryService,
        cache: &'a Cache,
        metrics: &'a DatasourceMetrics,
        settings: &'a Settings,
    ) -> Self {
        QueryExecutor {
            client,
            cache,
            metrics,
            settings,
        }
    }

    /// Returns the ids of the query executions whose results answer `query`.
    ///
    /// `max_rows` is part of the cache key of started queries, so the same SQL
    /// with another row cap is started again.
    pub async fn execute(
        &self,
        ctx: &RequestContext,
        query: &AthenaQuery,
        max_rows: i64,
    ) -> Result<Vec<String>> {
        match query.source() {
            QuerySource::Executions(inputs) => self.dedup(ctx, inputs).await,
            QuerySource::Adhoc {
                query_string,
                work_group,
                output_location,
            } => {
                let work_group_conf = self.work_group(ctx, work_group).await?;
                if work_group_conf.bytes_scanned_cutoff_per_query.is_none() {
                    return Err(DatasourceError::Config(format!(
                        "workgroup {:?} should set scan data limit",
                        work_group
                    )));
                }

                let key = CacheKey::start_query_execution(
                    ctx.datasource_id,
                    &ctx.region,
                    query_string,
                    max_rows,
                );
                if query.is_cacheable() {
                    if let Some(id) = self.cache.get_query_execution_id(&key) {
                        debug!("Reusing query execution {} of {}", id, key);
                        return Ok(vec![id]);
                    }
                }

                let id = ctx
                    .call(
                        "StartQueryExecution",
                        self.client
                            .start_query_execution(query_string, work_group, output_location),
                    )
                    .await?;
                info!("Started query execution {} in workgroup {}", id, work_group);
                if query.is_cacheable() {
                    self.cache.set(
                        key,
                        CacheValue::QueryExecutionId(id.clone()),
                        *query.cache_duration,
                    );
                }

                let ids = vec![id];
                self.wait_for_completion(ctx, &ids).await?;
                Ok(ids)
            }
        }
    }

    /// Returns the configuration of a workgroup, served from the cache for
    /// the configured workgroup TTL.
    pub async fn work_group(&self, ctx: &RequestContext, name: &str) -> Result<Arc<WorkGroup>> {
        let key = CacheKey::workgroup(ctx.datasource_id, &ctx.region, name);
        if let Some(work_group) = self.cache.get_work_group(&key) {
            return Ok(work_group);
        }

        let work_group = Arc::new(
            ctx.call("GetWorkGroup", self.client.get_work_group(name))
                .await?,
        );
        self.cache.set(
            key,
            CacheValue::WorkGroup(work_group.clone()),
            self.settings.workgroup_ttl,
        );
        Ok(work_group)
    }

    /// Keeps the first execution of every distinct SQL text, in input order.
    /// Ids the backend doesn't know are dropped.
    async fn dedup(&self, ctx: &RequestContext, inputs: &[QueryInput]) -> Result<Vec<String>> {
        let ids: Vec<String> = inputs
            .iter()
            .map(|input| input.query_execution_id.clone())
            .collect();
        let executions: HashMap<String, QueryExecution> = self
            .batch_get(ctx, &ids)
            .await?
            .into_iter()
            .map(|e| (e.query_execution_id.clone(), e))
            .collect();

        let mut seen = HashSet::new();
        let mut handles = vec![];
        for id in ids {
            match executions.get(&id) {
                Some(execution) => {
                    if seen.insert(execution.query.as_str()) {
                        handles.push(id);
                    } else {
                        debug!("Skipping query execution {} with duplicate query", id);
                    }
                }
                None => warn!("Query execution {} not found", id),
            }
        }
        Ok(handles)
    }

    /// Fetches the executions of `ids` in chunks of the backend's batch limit.
    pub async fn batch_get(
        &self,
        ctx: &RequestContext,
        ids: &[String],
    ) -> Result<Vec<QueryExecution>> {
        let mut executions = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(self.settings.batch_size.max(1)) {
            executions.extend(
                ctx.call(
                    "BatchGetQueryExecution",
                    self.client.batch_get_query_execution(chunk),
                )
                .await?,
            );
        }
        Ok(executions)
    }

    /// Polls the executions of `ids` until none of them is queued or running.
    ///
    /// Failed and cancelled executions count as complete. When the wait
    /// budget is spent the caller proceeds with whatever results exist.
    pub async fn wait_for_completion(&self, ctx: &RequestContext, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let policy = self.settings.wait;
        for attempt in 1..=policy.max_attempts {
            ctx.check_deadline()?;
            let executions = self.batch_get(ctx, ids).await?;
            let complete = executions.iter().filter(|e| !e.state.is_pending()).count();
            if complete == ids.len() {
                for execution in &executions {
                    match &execution.state {
                        QueryState::Failed | QueryState::Cancelled => warn!(
                            "Query execution {} finished as {}",
                            execution.query_execution_id,
                            String::from(execution.state.clone())
                        ),
                        _ => {}
                    }
                    if let Some(bytes) = execution.data_scanned_bytes {
                        self.metrics.add_scanned_bytes(&ctx.region, bytes);
                    }
                }
                return Ok(());
            }

            debug!(
                "{} of {} query executions complete after poll {}",
                complete,
                ids.len(),
                attempt
            );
            if attempt < policy.max_attempts {
                ctx.sleep(policy.interval).await?;
            }
        }

        warn!(
            "Query executions {:?} still running after {} polls",
            ids, policy.max_attempts
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{execution, MockQueryService};
    use prometheus::Registry;
    use std::time::Duration;

    fn fixture() -> (Cache, DatasourceMetrics, Settings) {
        let settings = Settings::default().with_wait_policy(3, Duration::from_millis(1));
        let metrics = DatasourceMetrics::new(&Registry::new()).unwrap();
        (Cache::new(), metrics, settings)
    }

    fn reuse(ids: &[&str]) -> AthenaQuery {
        AthenaQuery {
            ref_id: "A".to_string(),
            inputs: ids.iter().map(|id| QueryInput::new(*id)).collect(),
            ..Default::default()
        }
    }

    fn adhoc(sql: &str, cache_duration: &str) -> AthenaQuery {
        AthenaQuery {
            ref_id: "A".to_string(),
            query_string: sql.to_string(),
            work_group: "primary".to_string(),
            output_location: "s3://bucket/results".to_string(),
            cache_duration: crate::duration::Duration::parse(cache_duration).unwrap(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn dedup_by_query_text() -> Result<()> {
        let (cache, metrics, settings) = fixture();
        let mock = MockQueryService::new()
            .with_execution(execution("h1", "SELECT a"))
            .with_execution(execution("h2", "SELECT a"))
            .with_execution(execution("h3", "SELECT b"));
        let executor = QueryExecutor::new(&mock, &cache, &metrics, &settings);
        let ctx = RequestContext::new(1, "us-east-1");

        let ids = executor
            .execute(&ctx, &reuse(&["h1", "h2", "h3", "missing"]), 1000)
            .await?;
        assert_eq!(vec!["h1".to_string(), "h3".to_string()], ids);
        assert_eq!(1, mock.count("batch_get_query_execution"));
        Ok(())
    }

    #[tokio::test]
    async fn no_inputs_no_calls() -> Result<()> {
        let (cache, metrics, settings) = fixture();
        let mock = MockQueryService::new();
        let executor = QueryExecutor::new(&mock, &cache, &metrics, &settings);

        let ids = executor
            .execute(&RequestContext::new(1, "us-east-1"), &reuse(&[]), 1000)
            .await?;
        assert!(ids.is_empty());
        assert!(mock.calls().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn batch_calls_are_chunked() -> Result<()> {
        let (cache, metrics, mut settings) = fixture();
        settings.batch_size = 2;
        let mock = MockQueryService::new()
            .with_execution(execution("h1", "SELECT 1"))
            .with_execution(execution("h2", "SELECT 2"))
            .with_execution(execution("h3", "SELECT 3"));
        let executor = QueryExecutor::new(&mock, &cache, &metrics, &settings);

        let ids = executor
            .execute(&RequestContext::new(1, "us-east-1"), &reuse(&["h1", "h2", "h3"]), 1000)
            .await?;
        assert_eq!(3, ids.len());
        assert_eq!(2, mock.count("batch_get_query_execution"));
        Ok(())
    }

    #[tokio::test]
    async fn workgroup_without_scan_limit() {
        let (cache, metrics, settings) = fixture();
        let mock = MockQueryService::new().with_work_group("primary", None);
        let executor = QueryExecutor::new(&mock, &cache, &metrics, &settings);

        let result = executor
            .execute(&RequestContext::new(1, "us-east-1"), &adhoc("SELECT 1", "5m"), 1000)
            .await;
        match result {
            Err(DatasourceError::Config(msg)) => assert!(msg.contains("should set scan data limit")),
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(0, mock.count("start_query_execution"));
    }

    #[tokio::test]
    async fn started_query_is_reused() -> Result<()> {
        let (cache, metrics, settings) = fixture();
        let mock = MockQueryService::new().with_work_group("primary", Some(1 << 30));
        let executor = QueryExecutor::new(&mock, &cache, &metrics, &settings);
        let ctx = RequestContext::new(1, "us-east-1");
        let query = adhoc("SELECT 1", "5m");

        let first = executor.execute(&ctx, &query, 1000).await?;
        let second = executor.execute(&ctx, &query, 1000).await?;
        assert_eq!(first, second);
        assert_eq!(1, mock.count("start_query_execution"));
        // the workgroup is cached as well
        assert_eq!(1, mock.count("get_work_group"));
        // only the fresh execution is polled
        assert_eq!(1, mock.count("batch_get_query_execution"));

        // another row cap is another query
        executor.execute(&ctx, &query, 10).await?;
        assert_eq!(2, mock.count("start_query_execution"));
        Ok(())
    }

    #[tokio::test]
    async fn uncached_query_is_started_again() -> Result<()> {
        let (cache, metrics, settings) = fixture();
        let mock = MockQueryService::new().with_work_group("primary", Some(1 << 30));
        let executor = QueryExecutor::new(&mock, &cache, &metrics, &settings);
        let ctx = RequestContext::new(1, "us-east-1");
        let query = adhoc("SELECT 1", "");

        let first = executor.execute(&ctx, &query, 1000).await?;
        let second = executor.execute(&ctx, &query, 1000).await?;
        assert_ne!(first, second);
        assert_eq!(2, mock.count("start_query_execution"));
        Ok(())
    }

    #[tokio::test]
    async fn wait_records_scanned_bytes() -> Result<()> {
        let (cache, metrics, settings) = fixture();
        let mock = MockQueryService::new()
            .with_execution(execution("h1", "SELECT 1"))
            .with_pending_polls("h1", 2);
        let executor = QueryExecutor::new(&mock, &cache, &metrics, &settings);
        let ctx = RequestContext::new(1, "us-east-1");

        executor.wait_for_completion(&ctx, &["h1".to_string()]).await?;
        assert_eq!(3, mock.count("batch_get_query_execution"));
        assert_eq!(
            1024.0,
            metrics
                .data_scanned_bytes_total
                .with_label_values(&["us-east-1"])
                .get()
        );
        Ok(())
    }

    #[tokio::test]
    async fn wait_budget_exhausted() -> Result<()> {
        let (cache, metrics, settings) = fixture();
        let mock = MockQueryService::new()
            .with_execution(execution("h1", "SELECT 1"))
            .with_pending_polls("h1", 10);
        let executor = QueryExecutor::new(&mock, &cache, &metrics, &settings);

        executor
            .wait_for_completion(&RequestContext::new(1, "us-east-1"), &["h1".to_string()])
            .await?;
        assert_eq!(3, mock.count("batch_get_query_execution"));
        assert_eq!(
            0.0,
            metrics
                .data_scanned_bytes_total
                .with_label_values(&["us-east-1"])
                .get()
        );
        Ok(())
    }

    #[tokio::test]
    async fn failed_queries_are_complete() -> Result<()> {
        let (cache, metrics, settings) = fixture();
        let mut failed = execution("h1", "SELECT 1");
        failed.state = QueryState::Failed;
        let mock = MockQueryService::new().with_execution(failed);
        let executor = QueryExecutor::new(&mock, &cache, &metrics, &settings);

        executor
            .wait_for_completion(&RequestContext::new(1, "us-east-1"), &["h1".to_string()])
            .await?;
        assert_eq!(1, mock.count("batch_get_query_execution"));
        Ok(())
    }

    #[tokio::test]
    async fn status_errors_abort() {
        let (cache, metrics, settings) = fixture();
        let mock = MockQueryService::new().failing("batch_get_query_execution");
        let executor = QueryExecutor::new(&mock, &cache, &metrics, &settings);

        let result = executor
            .wait_for_completion(&RequestContext::new(1, "us-east-1"), &["h1".to_string()])
            .await;
        assert!(matches!(result, Err(DatasourceError::AWS(_))));
        assert_eq!(1, mock.count("batch_get_query_execution"));
    }
}
