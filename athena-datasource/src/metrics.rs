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

//! Prometheus counters of the data source.

use crate::configs::ATHENA_METRICS_NAMESPACE;
use crate::error::Result;
use prometheus::{CounterVec, Encoder, IntCounterVec, Opts, Registry, TextEncoder};

/// Counters shared by every request of a data source.
#[derive(Debug, Clone)]
pub struct DatasourceMetrics {
    /// Number of `GetQueryResults` pages fetched, by region.
    pub queries_total:            IntCounterVec,
    /// Bytes scanned by completed queries, by region.
    pub data_scanned_bytes_total: CounterVec,
}

impl DatasourceMetrics {
    /// Creates the counters and registers them into `registry`.
    pub fn new(registry: &Registry) -> Result<Self> {
        let queries_total = IntCounterVec::new(
            Opts::new("data_query_total", "data query counter")
                .namespace(ATHENA_METRICS_NAMESPACE.as_str()),
            &["region"],
        )?;
        let data_scanned_bytes_total = CounterVec::new(
            Opts::new("data_scanned_bytes_total", "scanned data size counter")
                .namespace(ATHENA_METRICS_NAMESPACE.as_str()),
            &["region"],
        )?;
        registry.register(Box::new(queries_total.clone()))?;
        registry.register(Box::new(data_scanned_bytes_total.clone()))?;

        Ok(DatasourceMetrics {
            queries_total,
            data_scanned_bytes_total,
        })
    }

    /// Counts one fetched result page.
    pub fn inc_queries(&self, region: &str) {
        self.queries_total.with_label_values(&[region]).inc();
    }

    /// Adds the bytes scanned by a completed query.
    pub fn add_scanned_bytes(&self, region: &str, bytes: i64) {
        self.data_scanned_bytes_total
            .with_label_values(&[region])
            .inc_by(bytes.max(0) as f64);
    }
}

/// Renders every metric of `registry` in the Prometheus text format.
pub fn gather_text(registry: &Registry) -> Result<String> {
    let mut buffer = vec![];
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
