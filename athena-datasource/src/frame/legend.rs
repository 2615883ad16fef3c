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

//! Series names.

use itertools::Itertools;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::BTreeMap;

lazy_static! {
    static ref LEGEND_FORMAT_PATTERN: Regex = Regex::new(r"\{\{\s*(.+?)\s*\}\}").unwrap();
}

/// Names a series after its labels.
///
/// Without a template the name lists every label as `{name="value",...}`,
/// sorted by label name. A template replaces each `{{ label }}` with the
/// label's value and keeps placeholders of unknown labels as they are.
pub fn format_legend(labels: &BTreeMap<String, String>, legend_format: &str) -> String {
    if legend_format.is_empty() {
        return format!(
            "{{{}}}",
            labels
                .iter()
                .map(|(k, v)| format!("{}=\"{}\"", k, v))
                .join(",")
        );
    }

    LEGEND_FORMAT_PATTERN
        .replace_all(legend_format, |caps: &Captures| {
            labels
                .get(caps[1].trim())
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
