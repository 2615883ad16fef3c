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

//! Athena data source error types

use arrow::error::ArrowError;

use std::error;
use std::fmt::{Display, Formatter};
use std::io;
use std::result;

/// Result type for operations that could result in an [DatasourceError]
pub type Result<T> = result::Result<T, DatasourceError>;

/// Athena data source error
#[derive(Debug)]
pub enum DatasourceError {
    /// Error associated to I/O operations and associated traits.
    IoError(io::Error),
    /// Error returned when Arrow fails to assemble a record batch.
    Arrow(ArrowError),
    /// Error returned when serde_json failed to serialize or deserialize data.
    SerdeJson(serde_json::Error),
    /// Error returned when a user supplied pattern is not a valid regex.
    Regex(regex::Error),
    /// Error returned when a metric cannot be created or registered.
    Prometheus(prometheus::Error),
    /// Error returned when a query or data source setting is invalid.
    /// Examples include a workgroup without a scan data limit, a malformed
    /// `maxRows` or an unknown region.
    Config(String),
    /// Error returned when a result cell cannot be converted to the type of its
    /// column. A conversion error fails the whole query.
    Conversion(String),
    /// Error returned when the caller's deadline expires before a backend call
    /// or the job polling loop completes.
    Timeout(String),
    /// Error returned as a consequence of an error in the data source.
    /// This error should not happen in normal usage. The data source has
    /// internal invariants that we are unable to ask the compiler to check
    /// for us. This error is raised when one of those invariants is not
    /// verified during execution.
    Internal(String),
    /// Error returned when a named resource, such as a saved query, doesn't
    /// exist.
    NotFound(String),
    /// Error returned when accessing the AWS services fails.
    AWS(String),
}

impl From<io::Error> for DatasourceError {
    fn from(e: io::Error) -> Self {
        DatasourceError::IoError(e)
    }
}

impl From<ArrowError> for DatasourceError {
    fn from(e: ArrowError) -> Self {
        DatasourceError::Arrow(e)
    }
}

impl From<serde_json::Error> for DatasourceError {
    fn from(e: serde_json::Error) -> Self {
        DatasourceError::SerdeJson(e)
    }
}

impl From<regex::Error> for DatasourceError {
    fn from(e: regex::Error) -> Self {
        DatasourceError::Regex(e)
    }
}

impl From<prometheus::Error> for DatasourceError {
    fn from(e: prometheus::Error) -> Self {
        DatasourceError::Prometheus(e)
    }
}

impl From<&str> for DatasourceError {
    fn from(e: &str) -> Self {
        DatasourceError::Internal(e.to_string())
    }
}

impl Display for DatasourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match *self {
            DatasourceError::IoError(ref desc) => write!(f, "IO error: {}", desc),
            DatasourceError::Arrow(ref desc) => write!(f, "Arrow error: {}", desc),
            DatasourceError::SerdeJson(ref desc) => write!(f, "serde_json error: {}", desc),
            DatasourceError::Regex(ref desc) => write!(f, "Invalid pattern: {}", desc),
            DatasourceError::Prometheus(ref desc) => write!(f, "Metrics error: {}", desc),
            DatasourceError::Config(ref desc) => write!(f, "Configuration error: {}", desc),
            DatasourceError::Conversion(ref desc) => write!(f, "Conversion error: {}", desc),
            DatasourceError::Timeout(ref desc) => write!(f, "Timeout: {}", desc),
            DatasourceError::Internal(ref desc) => write!(
                f,
                "Internal error: {}. This was likely caused by a bug in the data source's \
                    code and we would welcome that you file an bug report in our issue tracker",
                desc
            ),
            DatasourceError::NotFound(ref desc) => write!(f, "{}", desc),
            DatasourceError::AWS(ref desc) => write!(f, "AWS error: {}", desc),
        }
    }
}

impl error::Error for DatasourceError {}
