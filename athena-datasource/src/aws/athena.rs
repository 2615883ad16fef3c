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

//! The rusoto implementation of [`QueryService`].

use super::{
    ColumnInfo, IdPage, NamedQuery, QueryExecution, QueryService, QueryState, ResultPage, Row,
    WorkGroup,
};
use crate::error::{DatasourceError, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use log::debug;
use rusoto_athena::{
    Athena, AthenaClient, BatchGetNamedQueryInput, BatchGetQueryExecutionInput,
    GetQueryResultsInput, GetWorkGroupInput, ListNamedQueriesInput, ListQueryExecutionsInput,
    ResultConfiguration, StartQueryExecutionInput,
};
use rusoto_core::Region;
use std::fmt;

/// Amazon Athena client bound to one region.
pub struct AthenaService {
    client: AthenaClient,
    region: Region,
}

impl fmt::Debug for AthenaService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AthenaService({})", self.region.name())
    }
}

impl AthenaService {
    /// Creates a client for the given region name, e.g. `us-east-1`.
    ///
    /// Credentials are resolved by the default rusoto provider chain.
    pub fn new(region: &str) -> Result<Self> {
        let region = region
            .parse::<Region>()
            .map_err(|e| DatasourceError::Config(format!("{}: {}", region, e)))?;
        Ok(AthenaService {
            client: AthenaClient::new(region.clone()),
            region,
        })
    }
}

/// Converts the epoch seconds used by the Athena API to a UTC timestamp.
fn to_datetime(seconds: f64) -> Option<DateTime<Utc>> {
    let nanos = (seconds.fract() * 1e9).round() as u32;
    Utc.timestamp_opt(seconds.trunc() as i64, nanos.min(999_999_999))
        .single()
}

fn to_query_execution(execution: rusoto_athena::QueryExecution) -> QueryExecution {
    let status = execution.status.unwrap_or_default();
    QueryExecution {
        query_execution_id: execution.query_execution_id.unwrap_or_default(),
        query:              execution.query.unwrap_or_default(),
        work_group:         execution.work_group,
        state:              QueryState::from(status.state.unwrap_or_default()),
        submission_time:    status.submission_date_time.and_then(to_datetime),
        completion_time:    status.completion_date_time.and_then(to_datetime),
        data_scanned_bytes: execution
            .statistics
            .and_then(|statistics| statistics.data_scanned_in_bytes),
    }
}

#[async_trait]
impl QueryService for AthenaService {
    async fn start_query_execution(
        &self,
        query_string: &str,
        work_group: &str,
        output_location: &str,
    ) -> Result<String> {
        let output = self
            .client
            .start_query_execution(StartQueryExecutionInput {
                query_string: query_string.to_owned(),
                work_group: Some(work_group.to_owned()),
                result_configuration: Some(ResultConfiguration {
                    output_location: Some(output_location.to_owned()),
                    ..Default::default()
                }),
                ..Default::default()
            })
            .await
            .map_err(|e| DatasourceError::AWS(e.to_string()))?;
        output
            .query_execution_id
            .ok_or_else(|| DatasourceError::AWS("No query execution id!".to_string()))
    }

    async fn batch_get_query_execution(&self, ids: &[String]) -> Result<Vec<QueryExecution>> {
        let output = self
            .client
            .batch_get_query_execution(BatchGetQueryExecutionInput {
                query_execution_ids: ids.to_vec(),
            })
            .await
            .map_err(|e| DatasourceError::AWS(e.to_string()))?;
        if let Some(unprocessed) = &output.unprocessed_query_execution_ids {
            debug!("{} query executions were not processed", unprocessed.len());
        }
        Ok(output
            .query_executions
            .into_iter()
            .flatten()
            .map(to_query_execution)
            .collect())
    }

    async fn get_query_results(
        &self,
        query_execution_id: &str,
        next_token: Option<String>,
    ) -> Result<ResultPage> {
        let output = self
            .client
            .get_query_results(GetQueryResultsInput {
                query_execution_id: query_execution_id.to_owned(),
                next_token,
                ..Default::default()
            })
            .await
            .map_err(|e| DatasourceError::AWS(e.to_string()))?;

        let result_set = output.result_set.unwrap_or_default();
        let columns = result_set
            .result_set_metadata
            .and_then(|metadata| metadata.column_info)
            .into_iter()
            .flatten()
            .map(|column| ColumnInfo::new(column.name, column.type_))
            .collect();
        let rows = result_set
            .rows
            .into_iter()
            .flatten()
            .map(|row| {
                row.data
                    .into_iter()
                    .flatten()
                    .map(|datum| datum.var_char_value)
                    .collect::<Row>()
            })
            .collect();

        Ok(ResultPage {
            columns,
            rows,
            next_token: output.next_token,
        })
    }

    async fn get_work_group(&self, work_group: &str) -> Result<WorkGroup> {
        let output = self
            .client
            .get_work_group(GetWorkGroupInput {
                work_group: work_group.to_owned(),
            })
            .await
            .map_err(|e| DatasourceError::AWS(e.to_string()))?;
        let work_group = output
            .work_group
            .ok_or_else(|| DatasourceError::AWS(format!("No workgroup {}!", work_group)))?;
        Ok(WorkGroup {
            name:                           work_group.name,
            bytes_scanned_cutoff_per_query: work_group
                .configuration
                .and_then(|configuration| configuration.bytes_scanned_cutoff_per_query),
        })
    }

    async fn list_named_queries(
        &self,
        work_group: Option<&str>,
        next_token: Option<String>,
    ) -> Result<IdPage> {
        let output = self
            .client
            .list_named_queries(ListNamedQueriesInput {
                work_group: work_group.map(|w| w.to_owned()),
                next_token,
                ..Default::default()
            })
            .await
            .map_err(|e| DatasourceError::AWS(e.to_string()))?;
        Ok(IdPage {
            ids:        output.named_query_ids.unwrap_or_default(),
            next_token: output.next_token,
        })
    }

    async fn batch_get_named_query(&self, ids: &[String]) -> Result<Vec<NamedQuery>> {
        let output = self
            .client
            .batch_get_named_query(BatchGetNamedQueryInput {
                named_query_ids: ids.to_vec(),
            })
            .await
            .map_err(|e| DatasourceError::AWS(e.to_string()))?;
        Ok(output
            .named_queries
            .into_iter()
            .flatten()
            .map(|query| NamedQuery {
                name:         query.name,
                query_string: query.query_string,
            })
            .collect())
    }

    async fn list_query_executions(
        &self,
        work_group: Option<&str>,
        next_token: Option<String>,
    ) -> Result<IdPage> {
        let output = self
            .client
            .list_query_executions(ListQueryExecutionsInput {
                work_group: work_group.map(|w| w.to_owned()),
                next_token,
                ..Default::default()
            })
            .await
            .map_err(|e| DatasourceError::AWS(e.to_string()))?;
        Ok(IdPage {
            ids:        output.query_execution_ids.unwrap_or_default(),
            next_token: output.next_token,
        })
    }
}
