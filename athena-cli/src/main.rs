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

mod args;
mod executions;
mod health;
mod query;

use anyhow::Result;
use clap::{crate_version, App};

#[tokio::main]
pub async fn main() -> Result<()> {
    // Command line arg parsing and configuration.
    let matches = App::new("athena-cli")
        .version(crate_version!())
        .about("Command line client of the Athena data source")
        .author("UMD Database Group")
        .args(args::get_logging_args())
        .subcommand(query::command_args())
        .subcommand(executions::command_args())
        .subcommand(health::command_args())
        .get_matches();

    args::init_logging(&matches)?;

    match matches.subcommand() {
        Some(("query", query_matches)) => query::command(query_matches).await?,
        Some(("executions", executions_matches)) => {
            executions::command(executions_matches).await?
        }
        Some(("health", health_matches)) => health::command(health_matches).await?,
        _ => {
            println!("No subcommand given, try --help");
        }
    }

    Ok(())
}
