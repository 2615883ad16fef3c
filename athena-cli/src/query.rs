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

//! Runs a query request file through the data source.

use crate::args;
use anyhow::{Context, Result};
use athena_datasource::prelude::*;
use clap::{App, Arg, ArgMatches};
use log::info;
use prometheus::Registry;
use std::fs;

pub fn command_args() -> App<'static> {
    App::new("query")
        .about("Runs the queries of a request file and prints the frames")
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .value_name("FILE")
                .help("Sets the request file")
                .required(true)
                .takes_value(true),
        )
        .args(args::get_datasource_args())
        .arg(
            Arg::new("timeout")
                .short('t')
                .long("timeout")
                .value_name("DURATION")
                .help("Gives up after the given time, e.g. 90s")
                .takes_value(true),
        )
        .arg(
            Arg::new("metrics")
                .long("metrics")
                .help("Prints the data source metrics")
                .takes_value(false),
        )
}

pub async fn command(matches: &ArgMatches) -> Result<()> {
    let path = matches.value_of("file").context("No request file provided")?;
    let text = fs::read_to_string(path).with_context(|| format!("Cannot read {}", path))?;
    let mut request = parse_request(&text)?;

    if let Some(id) = args::get_datasource_id(matches)? {
        request.datasource.id = id;
    }
    if let Some(region) = matches.value_of("region") {
        request.datasource.default_region = region.to_string();
    }
    if let Some(timeout) = matches.value_of("timeout") {
        request.deadline = deadline(timeout)?;
    }

    let registry = Registry::new();
    let datasource = AthenaDatasource::athena(&registry)?;
    let _janitor = datasource.spawn_janitor();

    info!("Running {} queries from {}", request.queries.len(), path);
    let response = datasource.query_data(request).await;
    print_response(&response)?;

    if matches.is_present("metrics") {
        print!("{}", gather_text(&registry)?);
    }
    Ok(())
}

fn parse_request(text: &str) -> Result<QueryDataRequest> {
    serde_json::from_str(text).context("Invalid request file")
}

fn print_response(response: &QueryDataResponse) -> Result<()> {
    for (ref_id, data) in &response.responses {
        match &data.error {
            Some(error) => println!("{}: error: {}", ref_id, error),
            None => {
                println!("{}: {} frames", ref_id, data.frames.len());
                for frame in &data.frames {
                    println!("{}", frame.name);
                    for warning in &frame.meta.warnings {
                        println!("warning: {}", warning);
                    }
                    println!("{}", frame.pretty()?);
                }
            }
        }
    }
    Ok(())
}

/// The instant `timeout` from now, or none if it lies beyond the clock.
fn deadline(timeout: &str) -> Result<Option<tokio::time::Instant>> {
    let timeout = humantime::parse_duration(timeout)?;
    Ok(tokio::time::Instant::now().checked_add(timeout))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_file() -> Result<()> {
        let request = parse_request(
            r#"{
                "datasource": { "id": 1, "defaultRegion": "us-east-1" },
                "queries": [{
                    "refId": "A",
                    "timeRange": { "from": "2024-01-01T00:00:00Z", "to": "2024-01-02T00:00:00Z" },
                    "json": { "refId": "A", "inputs": [{ "queryExecutionId": "43bcaae3" }] }
                }]
            }"#,
        )?;
        assert_eq!(1, request.queries.len());
        assert!(request.deadline.is_none());
        assert!(parse_request("{}").is_err());
        Ok(())
    }

    #[test]
    fn timeouts() -> Result<()> {
        assert!(deadline("90s")?.is_some());
        assert!(deadline("300000000000y")?.is_none());
        assert!(deadline("soon").is_err());
        Ok(())
    }

    #[test]
    fn errors_are_printed() -> Result<()> {
        let mut response = QueryDataResponse::default();
        response.responses.insert(
            "A".to_string(),
            DataResponse {
                frames: vec![],
                error:  Some("AWS error: AccessDenied".to_string()),
            },
        );
        print_response(&response)
    }
}
