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

//! The query model: what a panel asks the data source for.

use crate::duration::Duration;
use crate::error::{DatasourceError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The time range a query is evaluated for. Attached by the host, not part of
/// the query JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeRange {
    /// Inclusive start of the range.
    pub from: DateTime<Utc>,
    /// Inclusive end of the range.
    pub to:   DateTime<Utc>,
}

impl TimeRange {
    /// Creates a new time range.
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        TimeRange { from, to }
    }

    /// Returns true if `t` lies in `[from, to]`.
    pub fn contains(&self, t: &DateTime<Utc>) -> bool {
        *t >= self.from && *t <= self.to
    }
}

/// A query execution whose results should be reused.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryInput {
    /// The id of an existing query execution.
    #[serde(alias = "QueryExecutionId")]
    pub query_execution_id: String,
}

impl QueryInput {
    /// Creates an input for an existing query execution.
    pub fn new(query_execution_id: impl Into<String>) -> Self {
        QueryInput {
            query_execution_id: query_execution_id.into(),
        }
    }
}

/// Where the rows of a query come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuerySource<'a> {
    /// Results of query executions that already ran.
    Executions(&'a [QueryInput]),
    /// A new query that has to be started in a workgroup.
    Adhoc {
        /// The SQL text.
        query_string:    &'a str,
        /// The workgroup to run in.
        work_group:      &'a str,
        /// The S3 location of the results.
        output_location: &'a str,
    },
}

/// One query of a request, as sent by the query editor.
///
/// Exactly one of `inputs` and `query_string` decides where the rows come
/// from: a non-empty `query_string` starts a new query, otherwise the
/// results of `inputs` are reused.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AthenaQuery {
    /// The panel's reference id of the query.
    pub ref_id:           String,
    /// The AWS region, `default` or empty for the data source's region.
    pub region:           String,
    /// Existing query executions to read.
    pub inputs:           Vec<QueryInput>,
    /// The column holding the time axis.
    pub timestamp_column: String,
    /// The column holding the series value.
    pub value_column:     String,
    /// Template naming the series, e.g. `{{ host }}`.
    pub legend_format:    String,
    /// Layout of a textual timestamp column, e.g. `2006-01-02 15:04:05`.
    pub time_format:      String,
    /// Row cap per query execution as text, `-1` for no limit.
    pub max_rows:         String,
    /// How long results may be served from the cache. Zero disables caching.
    pub cache_duration:   Duration,
    /// Workgroup of an ad hoc query.
    pub work_group:       String,
    /// SQL text of an ad hoc query.
    pub query_string:     String,
    /// Result location of an ad hoc query.
    pub output_location:  String,
    /// The time range of the request.
    #[serde(skip)]
    pub time_range:       TimeRange,
}

impl AthenaQuery {
    /// Parses the query JSON of a panel.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        Ok(AthenaQuery::deserialize(json)?)
    }

    /// Returns where the rows of this query come from.
    pub fn source(&self) -> QuerySource<'_> {
        if self.query_string.is_empty() {
            QuerySource::Executions(&self.inputs)
        } else {
            QuerySource::Adhoc {
                query_string:    &self.query_string,
                work_group:      &self.work_group,
                output_location: &self.output_location,
            }
        }
    }

    /// Returns the row cap, or `default` if none is set. `-1` disables the
    /// cap.
    pub fn max_rows(&self, default: i64) -> Result<i64> {
        let text = self.max_rows.trim();
        if text.is_empty() {
            return Ok(default);
        }
        match text.parse::<i64>() {
            Ok(n) if n >= -1 => Ok(n),
            Ok(n) => Err(DatasourceError::Config(format!(
                "maxRows must be -1 or a positive number, got {}",
                n
            ))),
            Err(e) => Err(DatasourceError::Config(format!(
                "invalid maxRows {:?}: {}",
                self.max_rows, e
            ))),
        }
    }

    /// Returns true if results may be served from the cache.
    pub fn is_cacheable(&self) -> bool {
        !self.cache_duration.is_zero()
    }

    /// Replaces an empty or `default` region with `default_region`.
    pub fn resolve_region(&mut self, default_region: &str) {
        if self.region.is_empty() || self.region == "default" {
            self.region = default_region.to_owned();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_panel_json() -> Result<()> {
        let query = AthenaQuery::from_json(&json!({
            "refId": "A",
            "region": "us-east-1",
            "inputs": [
                { "queryExecutionId": "43bcaae3-22f0-4dcf-a861-bbab3084d6a2" },
                { "QueryExecutionId": "0c8e3ad5-d62a-4d64-8f4e-7b7f6c1c2c0b" }
            ],
            "timestampColumn": "ts",
            "valueColumn": "_col2",
            "legendFormat": "{{ host }}",
            "maxRows": "500",
            "cacheDuration": "5m",
            "format": "timeserie"
        }))?;

        assert_eq!("A", query.ref_id);
        assert_eq!(2, query.inputs.len());
        assert_eq!("0c8e3ad5-d62a-4d64-8f4e-7b7f6c1c2c0b", query.inputs[1].query_execution_id);
        assert_eq!(500, query.max_rows(1000)?);
        assert_eq!(std::time::Duration::from_secs(300), *query.cache_duration);
        assert!(query.is_cacheable());
        assert_eq!(QuerySource::Executions(&query.inputs), query.source());
        Ok(())
    }

    #[test]
    fn adhoc_source() -> Result<()> {
        let query = AthenaQuery::from_json(&json!({
            "refId": "B",
            "queryString": "SELECT 1",
            "workGroup": "primary",
            "outputLocation": "s3://bucket/prefix",
            "cacheDuration": ""
        }))?;
        assert!(!query.is_cacheable());
        assert_eq!(
            QuerySource::Adhoc {
                query_string:    "SELECT 1",
                work_group:      "primary",
                output_location: "s3://bucket/prefix",
            },
            query.source()
        );
        Ok(())
    }

    #[test]
    fn max_rows() {
        let mut query = AthenaQuery::default();
        assert_eq!(1000, query.max_rows(1000).unwrap());

        query.max_rows = "-1".to_string();
        assert_eq!(-1, query.max_rows(1000).unwrap());

        query.max_rows = "ten".to_string();
        assert!(matches!(query.max_rows(1000), Err(DatasourceError::Config(_))));

        query.max_rows = "-5".to_string();
        assert!(matches!(query.max_rows(1000), Err(DatasourceError::Config(_))));
    }

    #[test]
    fn invalid_cache_duration() {
        let err = AthenaQuery::from_json(&json!({ "refId": "A", "cacheDuration": 60 }));
        assert!(matches!(err, Err(DatasourceError::SerdeJson(_))));

        let err = AthenaQuery::from_json(&json!({
            "refId": "A",
            "cacheDuration": "300000000000y"
        }));
        assert!(matches!(err, Err(DatasourceError::SerdeJson(_))));

        let query = AthenaQuery::from_json(&json!({ "refId": "A", "cacheDuration": "1.5h" }))
            .unwrap();
        assert_eq!(std::time::Duration::from_secs(5400), *query.cache_duration);
    }

    #[test]
    fn default_region() {
        let mut query = AthenaQuery {
            region: "default".to_string(),
            ..Default::default()
        };
        query.resolve_region("eu-west-1");
        assert_eq!("eu-west-1", query.region);

        query.region = "ap-northeast-1".to_string();
        query.resolve_region("eu-west-1");
        assert_eq!("ap-northeast-1", query.region);
    }
}
