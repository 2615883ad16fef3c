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

//! Lookups behind the query editor: searching past query executions and
//! saved queries of a workgroup.

use crate::aws::{QueryExecution, QueryService, QueryState};
use crate::cache::{Cache, CacheKey, CacheValue};
use crate::configs::Settings;
use crate::error::{DatasourceError, Result};
use crate::runtime::RequestContext;
use chrono::{DateTime, Utc};
use log::{debug, info};
use regex::Regex;
use std::sync::Arc;

/// Searches the query executions and named queries of a region.
pub struct Resources<'a> {
    client:   &'a dyn QueryService,
    cache:    &'a Cache,
    settings: &'a Settings,
}

impl<'a> Resources<'a> {
    /// Creates the lookups on top of a region scoped client.
    pub fn new(client: &'a dyn QueryService, cache: &'a Cache, settings: &'a Settings) -> Self {
        Resources {
            client,
            cache,
            settings,
        }
    }

    /// Returns the succeeded executions of `work_group` that completed at or
    /// before `to` and whose query matches `pattern`, newest first.
    ///
    /// `limit` caps the number of executions, `-1` returns all of them. An
    /// empty workgroup searches every workgroup.
    pub async fn query_executions(
        &self,
        ctx: &RequestContext,
        work_group: &str,
        pattern: &str,
        to: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<QueryExecution>> {
        if limit < -1 {
            return Err(DatasourceError::Config(format!("invalid limit {}", limit)));
        }
        let pattern = Regex::new(pattern)?;
        let all = self.all_query_executions(ctx, work_group).await?;

        let mut executions: Vec<QueryExecution> = all
            .iter()
            .filter(|e| e.state == QueryState::Succeeded)
            .filter(|e| e.completion_time.map_or(false, |t| t <= to))
            .filter(|e| pattern.is_match(&e.query))
            .cloned()
            .collect();
        executions.sort_by(|a, b| b.completion_time.cmp(&a.completion_time));
        if limit != -1 {
            executions.truncate(limit as usize);
        }
        Ok(executions)
    }

    /// Returns the SQL of the named queries whose name matches `pattern`.
    pub async fn named_query_queries(
        &self,
        ctx: &RequestContext,
        work_group: &str,
        pattern: &str,
    ) -> Result<Vec<String>> {
        let pattern = Regex::new(pattern)?;
        let work_group = non_empty(work_group);

        let mut ids = vec![];
        let mut next_token = None;
        loop {
            let page = ctx
                .call(
                    "ListNamedQueries",
                    self.client.list_named_queries(work_group, next_token),
                )
                .await?;
            ids.extend(page.ids);
            match page.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }

        let mut queries = vec![];
        for chunk in ids.chunks(self.settings.batch_size.max(1)) {
            let named = ctx
                .call("BatchGetNamedQuery", self.client.batch_get_named_query(chunk))
                .await?;
            queries.extend(
                named
                    .into_iter()
                    .filter(|q| pattern.is_match(&q.name))
                    .map(|q| q.query_string),
            );
        }
        Ok(queries)
    }

    /// Returns the executions of the first named query matching `pattern`.
    ///
    /// An execution matches if its query is exactly the saved SQL without
    /// trailing spaces and semicolons.
    pub async fn query_executions_by_name(
        &self,
        ctx: &RequestContext,
        work_group: &str,
        pattern: &str,
        to: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<QueryExecution>> {
        let queries = self.named_query_queries(ctx, work_group, pattern).await?;
        let sql = queries.first().ok_or_else(|| {
            DatasourceError::NotFound("No query with that name found".to_string())
        })?;
        let sql = sql.trim_end_matches(&[' ', ';'][..]);
        let exact = format!("^{}$", regex::escape(sql));
        self.query_executions(ctx, work_group, &exact, to, limit)
            .await
    }

    /// Lists every execution of the workgroup. The listing is reused while
    /// the newest execution id is the one seen last time.
    async fn all_query_executions(
        &self,
        ctx: &RequestContext,
        work_group: &str,
    ) -> Result<Arc<Vec<QueryExecution>>> {
        let last_key = CacheKey::last_query_execution_id(ctx.datasource_id, &ctx.region, work_group);
        let list_key = CacheKey::query_executions(ctx.datasource_id, &ctx.region, work_group);
        let last_seen = self.cache.get_query_execution_id(&last_key);

        let mut ids: Vec<String> = vec![];
        let mut next_token = None;
        loop {
            let page = ctx
                .call(
                    "ListQueryExecutions",
                    self.client
                        .list_query_executions(non_empty(work_group), next_token),
                )
                .await?;
            ids.extend(page.ids);

            if ids.first().is_some() && ids.first() == last_seen.as_ref() {
                if let Some(executions) = self.cache.get_query_executions(&list_key) {
                    debug!("Serving {} from cache", list_key);
                    return Ok(executions);
                }
            }
            match page.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }

        let newest = match ids.first() {
            Some(id) => id.clone(),
            None => return Ok(Arc::new(vec![])),
        };

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
        info!(
            "Listed {} query executions of workgroup {:?} in {}",
            executions.len(),
            work_group,
            ctx.region
        );

        let executions = Arc::new(executions);
        let ttl = self.settings.query_executions_ttl;
        self.cache
            .set(last_key, CacheValue::QueryExecutionId(newest), ttl);
        self.cache
            .set(list_key, CacheValue::QueryExecutions(executions.clone()), ttl);
        Ok(executions)
    }
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
