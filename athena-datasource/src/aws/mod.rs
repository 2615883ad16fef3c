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

//! This crate contains the Amazon Athena backend used by the data source: the
//! [`QueryService`] seam, the types that cross it, the rusoto implementation
//! and a pool that reuses clients across requests.

mod athena;
pub use self::athena::AthenaService;

mod clients;
pub use self::clients::{ClientFactory, ClientPool};

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// One result row: a nullable string per column.
pub type Row = Vec<Option<String>>;

/// The lifecycle state of a query execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum QueryState {
    /// The query has been submitted but not started.
    Queued,
    /// The query is running.
    Running,
    /// The query finished and its results are available.
    Succeeded,
    /// The query failed.
    Failed,
    /// The query was cancelled.
    Cancelled,
    /// A state this data source doesn't know about.
    Unknown(String),
}

impl QueryState {
    /// Returns true while the query is queued or running.
    pub fn is_pending(&self) -> bool {
        matches!(self, QueryState::Queued | QueryState::Running)
    }
}

impl From<String> for QueryState {
    fn from(state: String) -> Self {
        match state.as_str() {
            "QUEUED" => QueryState::Queued,
            "RUNNING" => QueryState::Running,
            "SUCCEEDED" => QueryState::Succeeded,
            "FAILED" => QueryState::Failed,
            "CANCELLED" => QueryState::Cancelled,
            _ => QueryState::Unknown(state),
        }
    }
}

impl From<QueryState> for String {
    fn from(state: QueryState) -> Self {
        match state {
            QueryState::Queued => "QUEUED".to_string(),
            QueryState::Running => "RUNNING".to_string(),
            QueryState::Succeeded => "SUCCEEDED".to_string(),
            QueryState::Failed => "FAILED".to_string(),
            QueryState::Cancelled => "CANCELLED".to_string(),
            QueryState::Unknown(state) => state,
        }
    }
}

/// Status and statistics of one query execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryExecution {
    /// The unique identifier of the execution.
    pub query_execution_id: String,
    /// The SQL text that was executed.
    pub query:              String,
    /// The workgroup the query ran in.
    pub work_group:         Option<String>,
    /// The current state.
    pub state:              QueryState,
    /// When the query was submitted.
    pub submission_time:    Option<DateTime<Utc>>,
    /// When the query reached a terminal state.
    pub completion_time:    Option<DateTime<Utc>>,
    /// The number of bytes scanned by the query.
    pub data_scanned_bytes: Option<i64>,
}

/// Name and declared SQL type of a result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// The column name.
    pub name:      String,
    /// The declared type, e.g. `varchar` or `bigint`.
    #[serde(rename = "type")]
    pub type_name: String,
}

impl ColumnInfo {
    /// Creates a new column description.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        ColumnInfo {
            name:      name.into(),
            type_name: type_name.into(),
        }
    }
}

/// One page of `GetQueryResults`.
///
/// The first page of a result starts with a header row holding the column
/// names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultPage {
    /// The result columns.
    pub columns:    Vec<ColumnInfo>,
    /// The rows of this page.
    pub rows:       Vec<Row>,
    /// The token of the next page, if any.
    pub next_token: Option<String>,
}

/// The rows of one or more query executions together with their columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    /// The result columns.
    pub columns: Vec<ColumnInfo>,
    /// The data rows, without header.
    pub rows:    Vec<Row>,
}

/// The part of a workgroup configuration the data source cares about.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkGroup {
    /// The workgroup name.
    pub name:                           String,
    /// The per query scan limit. Ad hoc queries are refused without it.
    pub bytes_scanned_cutoff_per_query: Option<i64>,
}

/// A saved query.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedQuery {
    /// The name of the saved query.
    pub name:         String,
    /// The SQL text.
    pub query_string: String,
}

/// One page of identifiers returned by the `List*` APIs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdPage {
    /// The identifiers of this page, newest first.
    pub ids:        Vec<String>,
    /// The token of the next page, if any.
    pub next_token: Option<String>,
}

/// The Athena operations used by the data source.
///
/// A service is scoped to one region. Every error is returned as
/// [`DatasourceError::AWS`](crate::error::DatasourceError::AWS) and is never
/// retried by the caller.
#[async_trait]
pub trait QueryService: Debug + Send + Sync {
    /// Starts a query and returns its execution id.
    async fn start_query_execution(
        &self,
        query_string: &str,
        work_group: &str,
        output_location: &str,
    ) -> Result<String>;

    /// Returns the executions of the given ids. Unknown ids are left out.
    async fn batch_get_query_execution(&self, ids: &[String]) -> Result<Vec<QueryExecution>>;

    /// Returns one page of the results of a query execution.
    async fn get_query_results(
        &self,
        query_execution_id: &str,
        next_token: Option<String>,
    ) -> Result<ResultPage>;

    /// Returns the configuration of a workgroup.
    async fn get_work_group(&self, work_group: &str) -> Result<WorkGroup>;

    /// Returns one page of named query ids.
    async fn list_named_queries(
        &self,
        work_group: Option<&str>,
        next_token: Option<String>,
    ) -> Result<IdPage>;

    /// Returns the named queries of the given ids.
    async fn batch_get_named_query(&self, ids: &[String]) -> Result<Vec<NamedQuery>>;

    /// Returns one page of query execution ids, newest first.
    async fn list_query_executions(
        &self,
        work_group: Option<&str>,
        next_token: Option<String>,
    ) -> Result<IdPage>;
}
