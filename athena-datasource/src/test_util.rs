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

//! Common unit test utility methods

use crate::aws::{
    ColumnInfo, IdPage, NamedQuery, QueryExecution, QueryService, QueryState, ResultPage, Row,
    WorkGroup,
};
use crate::error::{DatasourceError, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Builds a succeeded query execution.
pub fn execution(id: &str, query: &str) -> QueryExecution {
    QueryExecution {
        query_execution_id: id.to_string(),
        query:              query.to_string(),
        work_group:         Some("primary".to_string()),
        state:              QueryState::Succeeded,
        submission_time:    None,
        completion_time:    None,
        data_scanned_bytes: Some(1024),
    }
}

/// Returns a UTC timestamp from its calendar parts.
pub fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}

/// Builds a row of non-null cells.
pub fn row(cells: &[&str]) -> Row {
    cells.iter().map(|c| Some(c.to_string())).collect()
}

/// Builds the column list of a result set.
pub fn columns(specs: &[(&str, &str)]) -> Vec<ColumnInfo> {
    specs.iter().map(|(n, t)| ColumnInfo::new(*n, *t)).collect()
}

#[derive(Debug, Default)]
struct MockState {
    executions:    HashMap<String, QueryExecution>,
    pending_polls: HashMap<String, usize>,
    listing:       Vec<String>,
    results:       HashMap<String, (Vec<ColumnInfo>, Vec<Row>)>,
    sql_results:   HashMap<String, (Vec<ColumnInfo>, Vec<Row>)>,
    work_groups:   HashMap<String, WorkGroup>,
    named_queries: Vec<(String, NamedQuery)>,
    failing:       HashSet<String>,
    calls:         Vec<String>,
    started:       usize,
}

/// An in-memory [`QueryService`].
///
/// Result rows are served in pages of `page_size` rows, the first page
/// starting with a header row like Athena does. Every call is recorded and
/// can be inspected with [`MockQueryService::calls`].
#[derive(Debug)]
pub struct MockQueryService {
    state:     Mutex<MockState>,
    page_size: usize,
}

impl Default for MockQueryService {
    fn default() -> Self {
        MockQueryService::new()
    }
}

impl MockQueryService {
    /// Creates an empty backend serving pages of 1000 rows.
    pub fn new() -> Self {
        MockQueryService {
            state:     Mutex::new(MockState::default()),
            page_size: 1000,
        }
    }

    /// Serves result pages of `page_size` rows, header included.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Adds a query execution. Executions are listed in the order they are
    /// added, so add the newest first.
    pub fn with_execution(self, execution: QueryExecution) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.listing.push(execution.query_execution_id.clone());
            state
                .executions
                .insert(execution.query_execution_id.clone(), execution);
        }
        self
    }

    /// Keeps the execution running for the next `polls` status calls.
    pub fn with_pending_polls(self, id: &str, polls: usize) -> Self {
        self.state
            .lock()
            .unwrap()
            .pending_polls
            .insert(id.to_string(), polls);
        self
    }

    /// Sets the data rows of an execution. The header row is added by the
    /// mock.
    pub fn with_results(self, id: &str, columns: Vec<ColumnInfo>, rows: Vec<Row>) -> Self {
        self.state
            .lock()
            .unwrap()
            .results
            .insert(id.to_string(), (columns, rows));
        self
    }

    /// Sets the data rows returned by queries started with `sql`.
    pub fn with_query_results(self, sql: &str, columns: Vec<ColumnInfo>, rows: Vec<Row>) -> Self {
        self.state
            .lock()
            .unwrap()
            .sql_results
            .insert(sql.to_string(), (columns, rows));
        self
    }

    /// Adds a workgroup.
    pub fn with_work_group(self, name: &str, cutoff: Option<i64>) -> Self {
        self.state.lock().unwrap().work_groups.insert(
            name.to_string(),
            WorkGroup {
                name:                           name.to_string(),
                bytes_scanned_cutoff_per_query: cutoff,
            },
        );
        self
    }

    /// Adds a named query.
    pub fn with_named_query(self, id: &str, name: &str, sql: &str) -> Self {
        self.state.lock().unwrap().named_queries.push((
            id.to_string(),
            NamedQuery {
                name:         name.to_string(),
                query_string: sql.to_string(),
            },
        ));
        self
    }

    /// Makes every call of the operation fail.
    pub fn failing(self, operation: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing
            .insert(operation.to_string());
        self
    }

    /// Returns the recorded calls, e.g. `get_query_results:q1`.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Returns how often the operation was called.
    pub fn count(&self, operation: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.split(':').next() == Some(operation))
            .count()
    }

    fn record(&self, operation: &str, arg: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("{}:{}", operation, arg));
        if state.failing.contains(operation) {
            return Err(DatasourceError::AWS(format!("{} failed", operation)));
        }
        Ok(())
    }
}

fn parse_token(token: Option<String>) -> Result<usize> {
    token.map_or(Ok(0), |t| {
        t.parse::<usize>()
            .map_err(|_| DatasourceError::AWS(format!("invalid token {}", t)))
    })
}

fn next_token(end: usize, len: usize) -> Option<String> {
    if end < len {
        Some(end.to_string())
    } else {
        None
    }
}

#[async_trait]
impl QueryService for MockQueryService {
    async fn start_query_execution(
        &self,
        query_string: &str,
        work_group: &str,
        _output_location: &str,
    ) -> Result<String> {
        self.record("start_query_execution", query_string)?;
        let mut state = self.state.lock().unwrap();
        state.started += 1;
        let id = format!("started-{}", state.started);
        let mut started = execution(&id, query_string);
        started.work_group = Some(work_group.to_string());
        state.listing.insert(0, id.clone());
        state.executions.insert(id.clone(), started);
        if let Some(results) = state.sql_results.get(query_string).cloned() {
            state.results.insert(id.clone(), results);
        }
        Ok(id)
    }

    async fn batch_get_query_execution(&self, ids: &[String]) -> Result<Vec<QueryExecution>> {
        self.record("batch_get_query_execution", &ids.join(","))?;
        let mut state = self.state.lock().unwrap();
        let mut executions = vec![];
        for id in ids {
            let mut execution = match state.executions.get(id) {
                Some(e) => e.clone(),
                None => continue,
            };
            if let Some(polls) = state.pending_polls.get_mut(id) {
                if *polls > 0 {
                    *polls -= 1;
                    execution.state = QueryState::Running;
                    execution.data_scanned_bytes = None;
                }
            }
            executions.push(execution);
        }
        Ok(executions)
    }

    async fn get_query_results(
        &self,
        query_execution_id: &str,
        next_token: Option<String>,
    ) -> Result<ResultPage> {
        self.record("get_query_results", query_execution_id)?;
        let state = self.state.lock().unwrap();
        let (columns, data) = state.results.get(query_execution_id).cloned().ok_or_else(|| {
            DatasourceError::AWS(format!("no results for {}", query_execution_id))
        })?;

        let mut rows: Vec<Row> = vec![columns.iter().map(|c| Some(c.name.clone())).collect()];
        rows.extend(data);

        let start = parse_token(next_token)?.min(rows.len());
        let end = (start + self.page_size).min(rows.len());
        Ok(ResultPage {
            columns,
            rows: rows[start..end].to_vec(),
            next_token: self::next_token(end, rows.len()),
        })
    }

    async fn get_work_group(&self, work_group: &str) -> Result<WorkGroup> {
        self.record("get_work_group", work_group)?;
        self.state
            .lock()
            .unwrap()
            .work_groups
            .get(work_group)
            .cloned()
            .ok_or_else(|| DatasourceError::AWS(format!("workgroup {} not found", work_group)))
    }

    async fn list_named_queries(
        &self,
        work_group: Option<&str>,
        next_token: Option<String>,
    ) -> Result<IdPage> {
        self.record("list_named_queries", work_group.unwrap_or_default())?;
        let state = self.state.lock().unwrap();
        let ids: Vec<String> = state.named_queries.iter().map(|(id, _)| id.clone()).collect();
        let start = parse_token(next_token)?.min(ids.len());
        let end = (start + self.page_size).min(ids.len());
        Ok(IdPage {
            ids:        ids[start..end].to_vec(),
            next_token: self::next_token(end, ids.len()),
        })
    }

    async fn batch_get_named_query(&self, ids: &[String]) -> Result<Vec<NamedQuery>> {
        self.record("batch_get_named_query", &ids.join(","))?;
        let state = self.state.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| {
                state
                    .named_queries
                    .iter()
                    .find(|(named_id, _)| named_id == id)
                    .map(|(_, q)| q.clone())
            })
            .collect())
    }

    async fn list_query_executions(
        &self,
        work_group: Option<&str>,
        next_token: Option<String>,
    ) -> Result<IdPage> {
        self.record("list_query_executions", work_group.unwrap_or_default())?;
        let state = self.state.lock().unwrap();
        let start = parse_token(next_token)?.min(state.listing.len());
        let end = (start + self.page_size).min(state.listing.len());
        Ok(IdPage {
            ids:        state.listing[start..end].to_vec(),
            next_token: self::next_token(end, state.listing.len()),
        })
    }
}
