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

//! The data source: what the host calls to check the configuration, answer
//! panel queries and feed the query editor.
//!
//! A data source owns the cache, the metrics and the backend clients of all
//! its instances. The queries of one request run one after the other, and a
//! failing query only fails its own response.

use crate::aws::{ClientPool, QueryExecution};
use crate::cache::Cache;
use crate::configs::Settings;
use crate::error::Result;
use crate::frame::{build_frames, Frame};
use crate::metrics::DatasourceMetrics;
use crate::query::{AthenaQuery, TimeRange};
use crate::resources::Resources;
use crate::runtime::{QueryExecutor, RequestContext, ResultFetcher};
use chrono::{DateTime, Utc};
use log::{info, warn};
use prometheus::Registry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Settings of one configured data source instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasourceSettings {
    /// The instance id.
    pub id:             i64,
    /// The instance name.
    #[serde(default)]
    pub name:           String,
    /// The region of queries that don't name one.
    #[serde(default)]
    pub default_region: String,
}

/// One query of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQuery {
    /// The reference id the response is stored under.
    pub ref_id:     String,
    /// The time range of the panel.
    pub time_range: TimeRange,
    /// The query as written by the query editor.
    pub json:       serde_json::Value,
}

/// A batch of queries against one data source instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryDataRequest {
    /// The instance the queries run against.
    pub datasource: DatasourceSettings,
    /// The queries.
    pub queries:    Vec<DataQuery>,
    /// The instant after which the caller stops waiting.
    #[serde(skip)]
    pub deadline:   Option<Instant>,
}

/// The answer to one query: frames, or an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataResponse {
    /// The frames of the query.
    pub frames: Vec<Frame>,
    /// Why the query failed.
    pub error:  Option<String>,
}

/// The answers of a request by reference id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryDataResponse {
    /// One response per reference id.
    pub responses: BTreeMap<String, DataResponse>,
}

/// Outcome of a health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    /// The data source works.
    Ok,
    /// The data source is misconfigured or the backend is unreachable.
    Error,
}

/// The result of a health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckHealthResult {
    /// The outcome.
    pub status:  HealthStatus,
    /// A human readable message.
    pub message: String,
}

impl CheckHealthResult {
    fn new(status: HealthStatus, message: &str) -> Self {
        CheckHealthResult {
            status,
            message: message.to_string(),
        }
    }
}

/// The Athena data source.
pub struct AthenaDatasource {
    settings: Settings,
    cache:    Arc<Cache>,
    metrics:  DatasourceMetrics,
    clients:  ClientPool,
}

impl AthenaDatasource {
    /// Creates a data source that registers its metrics into `registry` and
    /// builds its backend clients through `clients`.
    pub fn new(settings: Settings, registry: &Registry, clients: ClientPool) -> Result<Self> {
        Ok(AthenaDatasource {
            settings,
            cache: Arc::new(Cache::new()),
            metrics: DatasourceMetrics::new(registry)?,
            clients,
        })
    }

    /// Creates a data source with the default settings and rusoto clients.
    pub fn athena(registry: &Registry) -> Result<Self> {
        AthenaDatasource::new(Settings::default(), registry, ClientPool::athena())
    }

    /// Starts purging expired cache entries in the background. Must be called
    /// from within a tokio runtime.
    pub fn spawn_janitor(&self) -> JoinHandle<()> {
        Cache::spawn_janitor(&self.cache, self.settings.cache_cleanup)
    }

    /// Returns the settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Returns the shared cache.
    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    /// Returns the counters.
    pub fn metrics(&self) -> &DatasourceMetrics {
        &self.metrics
    }

    /// Runs every query of the request and collects the responses by
    /// reference id.
    pub async fn query_data(&self, request: QueryDataRequest) -> QueryDataResponse {
        let mut response = QueryDataResponse::default();
        for query in &request.queries {
            let result = self
                .run_query(&request.datasource, query, request.deadline)
                .await;
            let slot = response.responses.entry(query.ref_id.clone()).or_default();
            match result {
                Ok(frames) => slot.frames.extend(frames),
                Err(e) => {
                    warn!("Query {} failed: {}", query.ref_id, e);
                    *slot = DataResponse {
                        frames: vec![],
                        error:  Some(e.to_string()),
                    };
                }
            }
        }
        response
    }

    async fn run_query(
        &self,
        datasource: &DatasourceSettings,
        data_query: &DataQuery,
        deadline: Option<Instant>,
    ) -> Result<Vec<Frame>> {
        let mut query = AthenaQuery::from_json(&data_query.json)?;
        if query.ref_id.is_empty() {
            query.ref_id = data_query.ref_id.clone();
        }
        query.time_range = data_query.time_range;
        query.resolve_region(&datasource.default_region);
        let max_rows = query.max_rows(self.settings.default_max_rows)?;

        info!(
            "Running query {} of data source {} in {}",
            query.ref_id, datasource.id, query.region
        );
        let ctx = RequestContext::new(datasource.id, query.region.as_str()).with_deadline(deadline);
        let client = self.clients.get(datasource.id, &query.region)?;

        let executor = QueryExecutor::new(client.as_ref(), &self.cache, &self.metrics, &self.settings);
        let ids = executor.execute(&ctx, &query, max_rows).await?;

        let fetcher = ResultFetcher::new(client.as_ref(), &self.cache, &self.metrics);
        let result = fetcher
            .fetch_all(&ctx, &ids, max_rows, *query.cache_duration)
            .await?;

        build_frames(&result, &query)
    }

    /// Checks that the backend of the data source can be reached.
    pub async fn check_health(&self, datasource: Option<&DatasourceSettings>) -> CheckHealthResult {
        let datasource = match datasource {
            Some(datasource) => datasource,
            None => return CheckHealthResult::new(HealthStatus::Ok, "Plugin is Running"),
        };

        let region = self.settings.health_check_region.as_str();
        let client = match self.clients.get(datasource.id, region) {
            Ok(client) => client,
            Err(e) => {
                warn!("Health check of data source {} failed: {}", datasource.id, e);
                return CheckHealthResult::new(HealthStatus::Error, "Unable to create client");
            }
        };

        let ctx = RequestContext::new(datasource.id, region);
        match ctx
            .call("ListNamedQueries", client.list_named_queries(None, None))
            .await
        {
            Ok(_) => CheckHealthResult::new(HealthStatus::Ok, "Success"),
            Err(e) => {
                warn!("Health check of data source {} failed: {}", datasource.id, e);
                CheckHealthResult::new(HealthStatus::Error, "Unable to call Athena API")
            }
        }
    }

    /// Searches the succeeded query executions of a workgroup, see
    /// [`Resources::query_executions`].
    pub async fn query_executions(
        &self,
        ctx: &RequestContext,
        work_group: &str,
        pattern: &str,
        to: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<QueryExecution>> {
        let client = self.clients.get(ctx.datasource_id, &ctx.region)?;
        Resources::new(client.as_ref(), &self.cache, &self.settings)
            .query_executions(ctx, work_group, pattern, to, limit)
            .await
    }

    /// Returns the SQL of the named queries matching `pattern`.
    pub async fn named_query_queries(
        &self,
        ctx: &RequestContext,
        work_group: &str,
        pattern: &str,
    ) -> Result<Vec<String>> {
        let client = self.clients.get(ctx.datasource_id, &ctx.region)?;
        Resources::new(client.as_ref(), &self.cache, &self.settings)
            .named_query_queries(ctx, work_group, pattern)
            .await
    }

    /// Returns the executions of the first named query matching `pattern`.
    pub async fn query_executions_by_name(
        &self,
        ctx: &RequestContext,
        work_group: &str,
        pattern: &str,
        to: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<QueryExecution>> {
        let client = self.clients.get(ctx.datasource_id, &ctx.region)?;
        Resources::new(client.as_ref(), &self.cache, &self.settings)
            .query_executions_by_name(ctx, work_group, pattern, to, limit)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::QueryService;
    use crate::error::DatasourceError;
    use crate::test_util::{columns, execution, row, utc, MockQueryService};
    use arrow::array::{Array, Float64Array};
    use serde_json::json;
    use std::time::Duration;

    fn datasource(mock: MockQueryService) -> (AthenaDatasource, Arc<MockQueryService>) {
        let mock = Arc::new(mock);
        let client = mock.clone();
        let pool = ClientPool::new(Arc::new(move |_region: &str| -> Result<Arc<dyn QueryService>> {
            Ok(client.clone())
        }));
        let settings = Settings::default().with_wait_policy(3, Duration::from_millis(1));
        let ds = AthenaDatasource::new(settings, &Registry::new(), pool).unwrap();
        (ds, mock)
    }

    fn instance() -> DatasourceSettings {
        DatasourceSettings {
            id:             1,
            name:           "athena".to_string(),
            default_region: "us-east-1".to_string(),
        }
    }

    fn request(queries: Vec<(&str, serde_json::Value)>) -> QueryDataRequest {
        QueryDataRequest {
            datasource: instance(),
            queries:    queries
                .into_iter()
                .map(|(ref_id, json)| DataQuery {
                    ref_id: ref_id.to_string(),
                    time_range: TimeRange::new(utc(2024, 1, 1, 0, 0, 0), utc(2024, 1, 2, 0, 0, 0)),
                    json,
                })
                .collect(),
            deadline:   None,
        }
    }

    #[tokio::test]
    async fn end_to_end() -> Result<()> {
        let (ds, mock) = datasource(
            MockQueryService::new()
                .with_execution(execution("h1", "SELECT ts, host, v FROM t"))
                .with_results(
                    "h1",
                    columns(&[("ts", "timestamp"), ("host", "varchar"), ("v", "bigint")]),
                    vec![
                        row(&["2024-01-01 00:01:00.000", "a", "200"]),
                        row(&["2024-01-01 00:00:00.000", "a", "100"]),
                    ],
                ),
        );
        let response = ds
            .query_data(request(vec![(
                "A",
                json!({
                    "refId": "A",
                    "region": "default",
                    "inputs": [{ "queryExecutionId": "h1" }],
                    "timestampColumn": "ts",
                    "valueColumn": "v",
                    "legendFormat": "{{host}}",
                    "maxRows": "1000",
                    "cacheDuration": "0s"
                }),
            )]))
            .await;

        let a = &response.responses["A"];
        assert_eq!(None, a.error);
        assert_eq!(1, a.frames.len());
        let frame = &a.frames[0];
        assert_eq!("a", frame.name);
        let v = frame
            .column("v")
            .unwrap()
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert_eq!(vec![Some(100.0), Some(200.0)], v.iter().collect::<Vec<_>>());
        assert_eq!(
            1,
            ds.metrics()
                .queries_total
                .with_label_values(&["us-east-1"])
                .get()
        );
        assert_eq!(1, mock.count("get_query_results"));
        Ok(())
    }

    #[tokio::test]
    async fn errors_stay_in_their_slot() -> Result<()> {
        let (ds, _mock) = datasource(
            MockQueryService::new()
                .with_work_group("primary", None)
                .with_execution(execution("h1", "SELECT 1"))
                .with_results("h1", columns(&[("n", "integer")]), vec![row(&["1"])]),
        );
        let response = ds
            .query_data(request(vec![
                (
                    "A",
                    json!({
                        "refId": "A",
                        "queryString": "SELECT 1",
                        "workGroup": "primary",
                        "outputLocation": "s3://bucket/"
                    }),
                ),
                ("B", json!({ "refId": "B", "inputs": [{ "queryExecutionId": "h1" }] })),
                ("C", json!({ "refId": "C", "maxRows": "lots" })),
                ("D", json!({ "refId": "D", "cacheDuration": 30 })),
                (
                    "E",
                    json!({
                        "refId": "E",
                        "inputs": [{ "queryExecutionId": "h1" }],
                        "cacheDuration": "300000000000y"
                    }),
                ),
            ]))
            .await;

        assert_eq!(
            Some("Configuration error: workgroup \"primary\" should set scan data limit".to_string()),
            response.responses["A"].error
        );
        assert_eq!(None, response.responses["B"].error);
        assert_eq!(1, response.responses["B"].frames.len());
        assert!(response.responses["C"].error.is_some());
        assert!(response.responses["D"].error.is_some());
        assert!(response.responses["E"]
            .error
            .as_deref()
            .unwrap()
            .contains("out of range"));
        Ok(())
    }

    #[tokio::test]
    async fn health() {
        let (ds, _) = datasource(MockQueryService::new());
        assert_eq!(
            CheckHealthResult::new(HealthStatus::Ok, "Plugin is Running"),
            ds.check_health(None).await
        );
        assert_eq!(
            CheckHealthResult::new(HealthStatus::Ok, "Success"),
            ds.check_health(Some(&instance())).await
        );

        let (ds, _) = datasource(MockQueryService::new().failing("list_named_queries"));
        assert_eq!(
            CheckHealthResult::new(HealthStatus::Error, "Unable to call Athena API"),
            ds.check_health(Some(&instance())).await
        );

        let pool = ClientPool::new(Arc::new(|region: &str| -> Result<Arc<dyn QueryService>> {
            Err(DatasourceError::Config(format!("unknown region {}", region)))
        }));
        let ds = AthenaDatasource::new(Settings::default(), &Registry::new(), pool).unwrap();
        assert_eq!(
            CheckHealthResult::new(HealthStatus::Error, "Unable to create client"),
            ds.check_health(Some(&instance())).await
        );
    }

    #[test]
    fn parse_request() -> Result<()> {
        let request: QueryDataRequest = serde_json::from_value(json!({
            "datasource": { "id": 3, "defaultRegion": "eu-west-1" },
            "queries": [{
                "refId": "A",
                "timeRange": { "from": "2024-01-01T00:00:00Z", "to": "2024-01-02T00:00:00Z" },
                "json": { "refId": "A", "region": "" }
            }]
        }))?;
        assert_eq!(3, request.datasource.id);
        assert_eq!("eu-west-1", request.datasource.default_region);
        assert_eq!(utc(2024, 1, 2, 0, 0, 0), request.queries[0].time_range.to);
        Ok(())
    }
}
