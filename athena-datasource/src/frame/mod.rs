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

//! Frames are the typed, named series a query answers with. Every distinct
//! legend name of a result becomes one frame holding an Arrow record batch
//! with one nullable column per result column.

mod builder;
mod convert;
mod layout;
mod legend;

pub use self::builder::build_frames;
pub use self::convert::{CellValue, Converter, DATE_LAYOUT, TIMESTAMP_LAYOUT};
pub use self::layout::{TimeLayout, RFC3339, RFC3339_NANO};
pub use self::legend::format_legend;

use crate::error::Result;
use arrow::array::ArrayRef;
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use serde::{Deserialize, Serialize};

/// Custom metadata of a frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameMeta {
    /// Problems found while converting the result, e.g. unknown column types.
    pub warnings: Vec<String>,
}

/// One series of a query response.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// The legend name.
    pub name:   String,
    /// The reference id of the query.
    pub ref_id: String,
    /// Custom metadata.
    pub meta:   FrameMeta,
    /// The rows. The schema metadata repeats `name`, `refId` and `meta`.
    pub batch:  RecordBatch,
}

impl Frame {
    /// Returns the number of rows.
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// Returns the column names.
    pub fn field_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    /// Returns the column with the given name.
    pub fn column(&self, name: &str) -> Option<&ArrayRef> {
        self.batch.column_by_name(name)
    }

    /// Renders the frame as a text table.
    pub fn pretty(&self) -> Result<String> {
        Ok(pretty_format_batches(&[self.batch.clone()])?.to_string())
    }
}
