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

//! The fetcher pages through the results of query executions.

use super::RequestContext;
use crate::aws::{QueryService, ResultSet};
use crate::cache::{Cache, CacheKey, CacheValue};
use crate::error::Result;
use crate::metrics::DatasourceMetrics;
use log::debug;
use std::sync::Arc;
use std::time::Duration;

/// Reads and caches the result rows of query executions.
pub struct ResultFetcher<'a> {
    client:  &'a dyn QueryService,
    cache:   &'a Cache,
    metrics: &'a DatasourceMetrics,
}

impl<'a> ResultFetcher<'a> {
    /// Creates a fetcher on top of a region scoped client.
    pub fn new(client: &'a dyn QueryService, cache: &'a Cache, metrics: &'a DatasourceMetrics) -> Self {
        ResultFetcher {
            client,
            cache,
            metrics,
        }
    }

    /// Returns the rows of all executions in order, with the columns of the
    /// last one.
    pub async fn fetch_all(
        &self,
        ctx: &RequestContext,
        ids: &[String],
        max_rows: i64,
        cache_duration: Duration,
    ) -> Result<ResultSet> {
        let mut merged = ResultSet::default();
        for id in ids {
            let result = self.fetch(ctx, id, max_rows, cache_duration).await?;
            merged.columns = result.columns.clone();
            merged.rows.extend(result.rows.iter().cloned());
        }
        Ok(merged)
    }

    /// Returns at most `max_rows` data rows of one execution, or all of them
    /// if `max_rows` is `-1`.
    ///
    /// Paging stops once the rows read, header included, exceed `max_rows + 1`.
    /// A page ending exactly on the cap is followed by one more request. The
    /// header row is dropped before the result is cached.
    pub async fn fetch(
        &self,
        ctx: &RequestContext,
        query_execution_id: &str,
        max_rows: i64,
        cache_duration: Duration,
    ) -> Result<Arc<ResultSet>> {
        let key = CacheKey::query_results(
            ctx.datasource_id,
            &ctx.region,
            query_execution_id,
            max_rows,
        );
        if !cache_duration.is_zero() {
            if let Some(result) = self.cache.get_query_results(&key) {
                debug!("Serving {} from cache", key);
                return Ok(result);
            }
        }

        // header included
        let limit = if max_rows < 0 {
            None
        } else {
            Some(max_rows as usize + 1)
        };

        let mut columns = vec![];
        let mut rows = vec![];
        let mut next_token = None;
        loop {
            ctx.check_deadline()?;
            let page = ctx
                .call(
                    "GetQueryResults",
                    self.client.get_query_results(query_execution_id, next_token),
                )
                .await?;
            self.metrics.inc_queries(&ctx.region);

            if columns.is_empty() {
                columns = page.columns;
            }
            rows.extend(page.rows);

            if let Some(limit) = limit {
                if rows.len() > limit {
                    rows.truncate(limit);
                    break;
                }
            }
            match page.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }

        if !rows.is_empty() {
            rows.remove(0);
        }
        debug!(
            "Fetched {} rows of query execution {}",
            rows.len(),
            query_execution_id
        );

        let result = Arc::new(ResultSet { columns, rows });
        if !cache_duration.is_zero() {
            self.cache
                .set(key, CacheValue::QueryResults(result.clone()), cache_duration);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{columns, row, MockQueryService};
    use prometheus::Registry;

    fn numbered(n: usize) -> Vec<crate::aws::Row> {
        (0..n).map(|i| row(&[&i.to_string()])).collect()
    }

    fn mock(rows: usize, page_size: usize) -> MockQueryService {
        MockQueryService::new().with_page_size(page_size).with_results(
            "q1",
            columns(&[("n", "bigint")]),
            numbered(rows),
        )
    }

    #[tokio::test]
    async fn row_cap_stops_paging() -> Result<()> {
        let cache = Cache::new();
        let metrics = DatasourceMetrics::new(&Registry::new())?;
        // 1 header + 25 rows in pages of 10
        let mock = mock(25, 10);
        let fetcher = ResultFetcher::new(&mock, &cache, &metrics);
        let ctx = RequestContext::new(1, "us-east-1");

        // the first page holds exactly the header and 9 rows
        let result = fetcher.fetch(&ctx, "q1", 9, Duration::ZERO).await?;
        assert_eq!(numbered(9), result.rows);
        assert_eq!(2, mock.count("get_query_results"));

        let result = fetcher.fetch(&ctx, "q1", 8, Duration::ZERO).await?;
        assert_eq!(numbered(8), result.rows);
        assert_eq!(3, mock.count("get_query_results"));

        let result = fetcher.fetch(&ctx, "q1", 12, Duration::ZERO).await?;
        assert_eq!(numbered(12), result.rows);
        assert_eq!(5, mock.count("get_query_results"));

        assert_eq!(5, metrics.queries_total.with_label_values(&["us-east-1"]).get());
        Ok(())
    }

    #[tokio::test]
    async fn unlimited_fetches_every_page() -> Result<()> {
        let cache = Cache::new();
        let metrics = DatasourceMetrics::new(&Registry::new())?;
        let mock = mock(25, 10);
        let fetcher = ResultFetcher::new(&mock, &cache, &metrics);

        let result = fetcher
            .fetch(&RequestContext::new(1, "us-east-1"), "q1", -1, Duration::ZERO)
            .await?;
        assert_eq!(numbered(25), result.rows);
        assert_eq!(3, mock.count("get_query_results"));
        Ok(())
    }

    #[tokio::test]
    async fn small_results_are_not_padded() -> Result<()> {
        let cache = Cache::new();
        let metrics = DatasourceMetrics::new(&Registry::new())?;
        let mock = mock(3, 10);
        let fetcher = ResultFetcher::new(&mock, &cache, &metrics);

        let result = fetcher
            .fetch(&RequestContext::new(1, "us-east-1"), "q1", 1000, Duration::ZERO)
            .await?;
        assert_eq!(numbered(3), result.rows);
        assert_eq!(columns(&[("n", "bigint")]), result.columns);
        Ok(())
    }

    #[tokio::test]
    async fn cached_results_skip_the_backend() -> Result<()> {
        let cache = Cache::new();
        let metrics = DatasourceMetrics::new(&Registry::new())?;
        let mock = mock(5, 10);
        let fetcher = ResultFetcher::new(&mock, &cache, &metrics);
        let ctx = RequestContext::new(1, "us-east-1");
        let ttl = Duration::from_secs(60);

        let first = fetcher.fetch(&ctx, "q1", 1000, ttl).await?;
        let second = fetcher.fetch(&ctx, "q1", 1000, ttl).await?;
        // the cached copy has no header either
        assert_eq!(first, second);
        assert_eq!(numbered(5), second.rows);
        assert_eq!(1, mock.count("get_query_results"));

        // another row cap is another cache entry
        fetcher.fetch(&ctx, "q1", 2, ttl).await?;
        assert_eq!(2, mock.count("get_query_results"));
        Ok(())
    }

    #[tokio::test]
    async fn huge_cache_duration() -> Result<()> {
        let cache = Cache::new();
        let metrics = DatasourceMetrics::new(&Registry::new())?;
        let mock = mock(5, 10);
        let fetcher = ResultFetcher::new(&mock, &cache, &metrics);
        let ctx = RequestContext::new(1, "us-east-1");

        fetcher.fetch(&ctx, "q1", 1000, Duration::MAX).await?;
        let cached = fetcher.fetch(&ctx, "q1", 1000, Duration::MAX).await?;
        assert_eq!(numbered(5), cached.rows);
        assert_eq!(1, mock.count("get_query_results"));
        Ok(())
    }

    #[tokio::test]
    async fn merge_keeps_last_columns() -> Result<()> {
        let cache = Cache::new();
        let metrics = DatasourceMetrics::new(&Registry::new())?;
        let mock = MockQueryService::new()
            .with_results("q1", columns(&[("a", "varchar")]), vec![row(&["x"])])
            .with_results("q2", columns(&[("b", "varchar")]), vec![row(&["y"]), row(&["z"])]);
        let fetcher = ResultFetcher::new(&mock, &cache, &metrics);

        let merged = fetcher
            .fetch_all(
                &RequestContext::new(1, "us-east-1"),
                &["q1".to_string(), "q2".to_string()],
                1000,
                Duration::ZERO,
            )
            .await?;
        assert_eq!(columns(&[("b", "varchar")]), merged.columns);
        assert_eq!(vec![row(&["x"]), row(&["y"]), row(&["z"])], merged.rows);
        Ok(())
    }

    #[tokio::test]
    async fn page_errors_propagate() {
        let cache = Cache::new();
        let metrics = DatasourceMetrics::new(&Registry::new()).unwrap();
        let mock = mock(5, 10).failing("get_query_results");
        let fetcher = ResultFetcher::new(&mock, &cache, &metrics);

        let result = fetcher
            .fetch(&RequestContext::new(1, "us-east-1"), "q1", 1000, Duration::from_secs(60))
            .await;
        assert!(result.is_err());
        assert!(cache.is_empty());
    }
}
