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

//! Reshapes merged result rows into frames.
//!
//! Rows without a timestamp are dropped and the rest are sorted by the text
//! of their timestamp cell. Note that the sort is lexical: it is only
//! chronological for layouts that order like their values, such as the
//! Athena `timestamp` type. Each row is then labelled with its non-null cells
//! outside the timestamp and value columns, named through the legend format
//! and appended to the frame of that name. Rows outside the time range are
//! left out.

use super::convert::{CellValue, Converter};
use super::layout::TimeLayout;
use super::legend::format_legend;
use super::{Frame, FrameMeta};
use crate::aws::{ResultSet, Row};
use crate::error::{DatasourceError, Result};
use crate::query::{AthenaQuery, TimeRange};
use arrow::array::{
    ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray, TimestampMicrosecondArray,
};
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use chrono::{DateTime, NaiveDate, Utc};
use lazy_static::lazy_static;
use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

lazy_static! {
    /// `0001-01-01T00:00:00Z`, the time of an unset timestamp.
    static ref ZERO_TIME: DateTime<Utc> =
        NaiveDate::from_ymd_opt(1, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap().and_utc();
}

/// Builds the frames of `query` from its merged result, in the order their
/// names first appear.
pub fn build_frames(result: &ResultSet, query: &AthenaQuery) -> Result<Vec<Frame>> {
    let time_layout = TimeLayout::new(&query.time_format);

    let mut warnings = vec![];
    let mut timestamp_index = None;
    let mut converters = Vec::with_capacity(result.columns.len());
    for (i, column) in result.columns.iter().enumerate() {
        let mut converter = Converter::for_column_type(&column.type_name).unwrap_or_else(|| {
            warnings.push(format!("unknown column type: {}", column.type_name));
            Converter::String
        });
        if column.name == query.timestamp_column {
            timestamp_index = Some(i);
            if column.type_name == "varchar" {
                converter = Converter::Timestamp(time_layout.clone());
            }
        }
        if column.name == query.value_column {
            converter = Converter::Float64;
        }
        converters.push(converter);
    }

    let mut rows: Vec<&Row> = result.rows.iter().collect();
    if let Some(ts) = timestamp_index {
        rows.retain(|row| cell(row, ts).is_some());
        rows.sort_by(|a, b| cell(a, ts).cmp(&cell(b, ts)));
    }

    let mut groups: Vec<FrameGroup> = vec![];
    let mut by_name: HashMap<String, usize> = HashMap::new();
    for row in rows {
        let mut labels = BTreeMap::new();
        for (i, column) in result.columns.iter().enumerate() {
            if column.name == query.timestamp_column || column.name == query.value_column {
                continue;
            }
            if let Some(value) = cell(row, i) {
                labels.insert(column.name.clone(), value.to_string());
            }
        }
        let name = format_legend(&labels, &query.legend_format);

        let values = converters
            .iter()
            .enumerate()
            .map(|(i, converter)| {
                converter.convert_cell(cell(row, i)).map_err(|e| match e {
                    DatasourceError::Conversion(msg) => DatasourceError::Conversion(format!(
                        "column {}: {}",
                        result.columns[i].name, msg
                    )),
                    e => e,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(ts) = timestamp_index {
            if let CellValue::Timestamp(t) = &values[ts] {
                if !in_window(t, &query.time_range) {
                    continue;
                }
            }
        }

        let index = *by_name.entry(name.clone()).or_insert_with(|| {
            groups.push(FrameGroup::new(name, converters.len()));
            groups.len() - 1
        });
        groups[index].push(values);
    }

    debug!(
        "Built {} frames of query {} from {} rows",
        groups.len(),
        query.ref_id,
        result.rows.len()
    );

    let meta = FrameMeta { warnings };
    groups
        .into_iter()
        .map(|group| group.finish(result, &converters, &query.ref_id, &meta))
        .collect()
}

fn cell(row: &Row, index: usize) -> Option<&str> {
    row.get(index).and_then(|c| c.as_deref())
}

fn in_window(t: &DateTime<Utc>, range: &TimeRange) -> bool {
    *t != *ZERO_TIME && range.contains(t)
}

/// The converted rows of one frame, column by column.
struct FrameGroup {
    name:    String,
    columns: Vec<Vec<CellValue>>,
    rows:    usize,
}

impl FrameGroup {
    fn new(name: String, width: usize) -> Self {
        FrameGroup {
            name,
            columns: vec![vec![]; width],
            rows: 0,
        }
    }

    fn push(&mut self, values: Vec<CellValue>) {
        for (column, value) in self.columns.iter_mut().zip(values) {
            column.push(value);
        }
        self.rows += 1;
    }

    fn finish(
        self,
        result: &ResultSet,
        converters: &[Converter],
        ref_id: &str,
        meta: &FrameMeta,
    ) -> Result<Frame> {
        let fields: Vec<Field> = result
            .columns
            .iter()
            .zip(converters)
            .map(|(column, converter)| Field::new(&column.name, converter.data_type(), true))
            .collect();

        let mut metadata = HashMap::new();
        metadata.insert("name".to_string(), self.name.clone());
        metadata.insert("refId".to_string(), ref_id.to_string());
        metadata.insert("meta".to_string(), serde_json::to_string(meta)?);
        let schema = Arc::new(Schema::new(fields).with_metadata(metadata));

        let arrays = self
            .columns
            .into_iter()
            .zip(converters)
            .map(|(values, converter)| to_array(values, converter))
            .collect::<Result<Vec<_>>>()?;
        let batch = RecordBatch::try_new_with_options(
            schema,
            arrays,
            &RecordBatchOptions::new().with_row_count(Some(self.rows)),
        )?;

        Ok(Frame {
            name: self.name,
            ref_id: ref_id.to_string(),
            meta: meta.clone(),
            batch,
        })
    }
}

fn to_array(values: Vec<CellValue>, converter: &Converter) -> Result<ArrayRef> {
    let mismatch = |value: &CellValue| {
        DatasourceError::Internal(format!(
            "{:?} in a {:?} column",
            value,
            converter.data_type()
        ))
    };

    let array: ArrayRef = match converter {
        Converter::String => Arc::new(
            values
                .into_iter()
                .map(|v| match v {
                    CellValue::String(s) => Ok(Some(s)),
                    CellValue::Null => Ok(None),
                    v => Err(mismatch(&v)),
                })
                .collect::<Result<StringArray>>()?,
        ),
        Converter::Int64 => Arc::new(
            values
                .iter()
                .map(|v| match v {
                    CellValue::Int64(n) => Ok(Some(*n)),
                    CellValue::Null => Ok(None),
                    v => Err(mismatch(v)),
                })
                .collect::<Result<Int64Array>>()?,
        ),
        Converter::Float64 => Arc::new(
            values
                .iter()
                .map(|v| match v {
                    CellValue::Float64(n) => Ok(Some(*n)),
                    CellValue::Null => Ok(None),
                    v => Err(mismatch(v)),
                })
                .collect::<Result<Float64Array>>()?,
        ),
        Converter::Bool => Arc::new(
            values
                .iter()
                .map(|v| match v {
                    CellValue::Bool(b) => Ok(Some(*b)),
                    CellValue::Null => Ok(None),
                    v => Err(mismatch(v)),
                })
                .collect::<Result<BooleanArray>>()?,
        ),
        Converter::Timestamp(_) => Arc::new(
            values
                .iter()
                .map(|v| match v {
                    CellValue::Timestamp(t) => Ok(Some(t.timestamp_micros())),
                    CellValue::Null => Ok(None),
                    v => Err(mismatch(v)),
                })
                .collect::<Result<TimestampMicrosecondArray>>()?
                .with_timezone("UTC"),
        ),
    };
    Ok(array)
}
