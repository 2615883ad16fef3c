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

//! Searches the succeeded query executions of a workgroup.

use crate::args;
use anyhow::{Context, Result};
use athena_datasource::prelude::*;
use chrono::{DateTime, Utc};
use clap::{App, Arg, ArgMatches};
use prometheus::Registry;

pub fn command_args() -> App<'static> {
    App::new("executions")
        .about("Lists the succeeded query executions matching a pattern")
        .args(args::get_datasource_args())
        .arg(
            Arg::new("pattern")
                .short('p')
                .long("pattern")
                .value_name("REGEX")
                .help("Matches the query text, or the saved query name with --by-name")
                .required(true)
                .takes_value(true),
        )
        .arg(
            Arg::new("work-group")
                .short('w')
                .long("work-group")
                .value_name("NAME")
                .help("Restricts the search to a workgroup")
                .takes_value(true),
        )
        .arg(
            Arg::new("limit")
                .short('l')
                .long("limit")
                .value_name("N")
                .help("Prints at most N executions, -1 for all [default: -1]")
                .allow_hyphen_values(true)
                .takes_value(true),
        )
        .arg(
            Arg::new("to")
                .long("to")
                .value_name("RFC3339")
                .help("Ignores executions completed after this time [default: now]")
                .takes_value(true),
        )
        .arg(
            Arg::new("by-name")
                .long("by-name")
                .help("Searches the executions of the first matching saved query")
                .takes_value(false),
        )
}

pub async fn command(matches: &ArgMatches) -> Result<()> {
    let region = matches
        .value_of("region")
        .unwrap_or(ATHENA_HEALTH_CHECK_REGION.as_str());
    let datasource_id = args::get_datasource_id(matches)?.unwrap_or_default();
    let pattern = matches.value_of("pattern").context("No pattern provided")?;
    let work_group = matches.value_of("work-group").unwrap_or_default();
    let limit = parse_limit(matches.value_of("limit"))?;
    let to = parse_to(matches.value_of("to"))?;

    let datasource = AthenaDatasource::athena(&Registry::new())?;
    let ctx = RequestContext::new(datasource_id, region);
    let executions = if matches.is_present("by-name") {
        datasource
            .query_executions_by_name(&ctx, work_group, pattern, to, limit)
            .await?
    } else {
        datasource
            .query_executions(&ctx, work_group, pattern, to, limit)
            .await?
    };

    println!("{}", serde_json::to_string_pretty(&executions)?);
    Ok(())
}

fn parse_limit(limit: Option<&str>) -> Result<i64> {
    Ok(match limit {
        Some(limit) => limit
            .parse::<i64>()
            .with_context(|| format!("Invalid limit {}", limit))?,
        None => -1,
    })
}

fn parse_to(to: Option<&str>) -> Result<DateTime<Utc>> {
    Ok(match to {
        Some(to) => DateTime::parse_from_rfc3339(to)
            .with_context(|| format!("Invalid time {}", to))?
            .with_timezone(&Utc),
        None => Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits() -> Result<()> {
        assert_eq!(-1, parse_limit(None)?);
        assert_eq!(10, parse_limit(Some("10"))?);
        assert!(parse_limit(Some("ten")).is_err());
        Ok(())
    }

    #[test]
    fn negative_limit_is_a_value() -> Result<()> {
        let matches = command_args().try_get_matches_from(vec!["executions", "-p", ".*", "-l", "-1"])?;
        assert_eq!(-1, parse_limit(matches.value_of("limit"))?);
        Ok(())
    }

    #[test]
    fn upper_bound() -> Result<()> {
        let to = parse_to(Some("2024-01-02T03:04:05+02:00"))?;
        assert_eq!("2024-01-02T01:04:05+00:00", to.to_rfc3339());
        assert!(parse_to(Some("yesterday")).is_err());
        Ok(())
    }
}
