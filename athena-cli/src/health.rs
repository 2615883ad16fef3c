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

//! Checks that the Athena API can be reached.

use crate::args;
use anyhow::Result;
use athena_datasource::prelude::*;
use clap::{App, ArgMatches};
use prometheus::Registry;

pub fn command_args() -> App<'static> {
    App::new("health")
        .about("Runs the data source health check")
        .arg(args::get_datasource_id_arg())
}

pub async fn command(matches: &ArgMatches) -> Result<()> {
    let datasource = AthenaDatasource::athena(&Registry::new())?;
    let settings = args::get_datasource_id(matches)?.map(|id| DatasourceSettings {
        id,
        ..Default::default()
    });

    let result = datasource.check_health(settings.as_ref()).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    if result.status == HealthStatus::Error {
        anyhow::bail!("{}", result.message);
    }
    Ok(())
}
