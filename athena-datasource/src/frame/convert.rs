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

//! Type directed conversion of result cells.

use super::layout::TimeLayout;
use crate::error::{DatasourceError, Result};
use arrow::datatypes::{DataType, TimeUnit};
use chrono::{DateTime, Utc};

/// Layout of Athena `date` values.
pub const DATE_LAYOUT: &str = "2006-01-02";
/// Layout of Athena `timestamp` values.
pub const TIMESTAMP_LAYOUT: &str = "2006-01-02 15:04:05.000";

/// A converted cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// A null cell.
    Null,
    /// Text.
    String(String),
    /// A 64-bit integer.
    Int64(i64),
    /// A 64-bit float.
    Float64(f64),
    /// A boolean.
    Bool(bool),
    /// A UTC timestamp.
    Timestamp(DateTime<Utc>),
}

/// Converts the text of a cell into the value of its output column.
#[derive(Debug, Clone, PartialEq)]
pub enum Converter {
    /// Keeps the text.
    String,
    /// Parses a base 10 integer.
    Int64,
    /// Parses a decimal number.
    Float64,
    /// `true` if the text is exactly `true`.
    Bool,
    /// Parses a timestamp with the given layout.
    Timestamp(TimeLayout),
}

impl Converter {
    /// Returns the converter of an Athena column type, or `None` if the type
    /// is unknown.
    pub fn for_column_type(type_name: &str) -> Option<Self> {
        match type_name {
            "varchar" => Some(Converter::String),
            "integer" | "tinyint" | "smallint" | "bigint" => Some(Converter::Int64),
            "float" | "double" => Some(Converter::Float64),
            "boolean" => Some(Converter::Bool),
            "date" => Some(Converter::Timestamp(TimeLayout::new(DATE_LAYOUT))),
            "timestamp" => Some(Converter::Timestamp(TimeLayout::new(TIMESTAMP_LAYOUT))),
            _ => None,
        }
    }

    /// Returns the Arrow type of the output column.
    pub fn data_type(&self) -> DataType {
        match self {
            Converter::String => DataType::Utf8,
            Converter::Int64 => DataType::Int64,
            Converter::Float64 => DataType::Float64,
            Converter::Bool => DataType::Boolean,
            Converter::Timestamp(_) => {
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
            }
        }
    }

    /// Converts a non-null cell.
    pub fn convert(&self, text: &str) -> Result<CellValue> {
        match self {
            Converter::String => Ok(CellValue::String(text.to_string())),
            Converter::Int64 => text.parse::<i64>().map(CellValue::Int64).map_err(|e| {
                DatasourceError::Conversion(format!("cannot parse integer {:?}: {}", text, e))
            }),
            Converter::Float64 => text.parse::<f64>().map(CellValue::Float64).map_err(|e| {
                DatasourceError::Conversion(format!("cannot parse float {:?}: {}", text, e))
            }),
            Converter::Bool => Ok(CellValue::Bool(text == "true")),
            Converter::Timestamp(layout) => layout.parse(text).map(CellValue::Timestamp),
        }
    }

    /// Converts a nullable cell.
    pub fn convert_cell(&self, cell: Option<&str>) -> Result<CellValue> {
        cell.map_or(Ok(CellValue::Null), |text| self.convert(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_table() -> Result<()> {
        let convert = |type_name: &str, text: &str| {
            Converter::for_column_type(type_name).unwrap().convert(text)
        };

        assert_eq!(CellValue::String("a b".to_string()), convert("varchar", "a b")?);
        for t in &["integer", "tinyint", "smallint", "bigint"] {
            assert_eq!(CellValue::Int64(-42), convert(t, "-42")?);
        }
        assert_eq!(CellValue::Float64(1.5), convert("float", "1.5")?);
        assert_eq!(CellValue::Float64(100.0), convert("double", "100")?);
        assert_eq!(CellValue::Bool(true), convert("boolean", "true")?);
        assert_eq!(CellValue::Bool(false), convert("boolean", "TRUE")?);

        match convert("date", "2024-01-02")? {
            CellValue::Timestamp(t) => assert_eq!("2024-01-02T00:00:00+00:00", t.to_rfc3339()),
            other => panic!("unexpected {:?}", other),
        }
        match convert("timestamp", "2024-01-02 03:04:05.678")? {
            CellValue::Timestamp(t) => {
                assert_eq!("2024-01-02T03:04:05.678+00:00", t.to_rfc3339())
            }
            other => panic!("unexpected {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn conversion_failures() {
        let int = Converter::for_column_type("bigint").unwrap();
        assert!(matches!(int.convert("1.5"), Err(DatasourceError::Conversion(_))));
        let float = Converter::for_column_type("double").unwrap();
        assert!(matches!(float.convert("abc"), Err(DatasourceError::Conversion(_))));
        let date = Converter::for_column_type("date").unwrap();
        assert!(matches!(date.convert("02/01/2024"), Err(DatasourceError::Conversion(_))));
    }

    #[test]
    fn unknown_types_and_nulls() -> Result<()> {
        assert_eq!(None, Converter::for_column_type("array<string>"));
        assert_eq!(CellValue::Null, Converter::Int64.convert_cell(None)?);
        assert_eq!(
            DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
            Converter::for_column_type("timestamp").unwrap().data_type()
        );
        Ok(())
    }
}
