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

//! A "prelude" for users of the athena-datasource crate.
//!
//! Like the standard library's prelude, this module simplifies importing of
//! common items. Unlike the standard prelude, the contents of this module must
//! be imported manually:
//!
//! ```
//! use athena_datasource::prelude::*;
//! ```

pub use crate::aws::{
    AthenaService, ClientFactory, ClientPool, ColumnInfo, QueryExecution, QueryService,
    QueryState, ResultSet, WorkGroup,
};
pub use crate::cache::{Cache, CacheKey, CacheValue};
pub use crate::configs::*;
pub use crate::datasource::{
    AthenaDatasource, CheckHealthResult, DataQuery, DataResponse, DatasourceSettings,
    HealthStatus, QueryDataRequest, QueryDataResponse,
};
pub use crate::duration::Duration;
pub use crate::error::{DatasourceError, Result};
pub use crate::frame::{build_frames, CellValue, Converter, Frame, FrameMeta, TimeLayout};
pub use crate::metrics::{gather_text, DatasourceMetrics};
pub use crate::query::{AthenaQuery, QueryInput, QuerySource, TimeRange};
pub use crate::runtime::{QueryExecutor, RequestContext, ResultFetcher};
