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

#![warn(missing_docs, clippy::needless_borrow)]
// Clippy lints, some should be disabled incrementally
#![allow(
    clippy::new_without_default,
    clippy::upper_case_acronyms,
    clippy::comparison_to_empty
)]

//! An Amazon Athena data source backend. It starts or reuses Athena query
//! executions, waits for them within a bounded budget, pages through and
//! caches their results and reshapes the rows into typed, legend-grouped
//! time series frames backed by Arrow record batches.

pub mod aws;
pub mod cache;
pub mod configs;
pub mod datasource;
pub mod duration;
pub mod error;
pub mod frame;
pub mod metrics;
pub mod prelude;
pub mod query;
pub mod resources;
pub mod runtime;
pub mod test_util;
