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

use anyhow::Result;
use clap::{Arg, ArgMatches};
use env_logger::fmt::TimestampPrecision;
use log::LevelFilter;

pub fn get_logging_args() -> Vec<Arg<'static>> {
    [
        Arg::new("log-level")
            .short('L')
            .long("log-level")
            .possible_values(&["error", "warn", "info", "debug", "trace", "off"])
            .help("Log level [default: info]")
            .global(true)
            .takes_value(true),
        Arg::new("trace")
            .long("trace")
            .help("Log ultra-verbose (trace level) information")
            .global(true)
            .takes_value(false),
        Arg::new("silent")
            .long("silent")
            .help("Suppress all output")
            .global(true)
            .takes_value(false),
    ]
    .to_vec()
}

/// Arguments selecting the data source instance and region.
pub fn get_datasource_args() -> Vec<Arg<'static>> {
    vec![get_datasource_id_arg(), get_region_arg()]
}

pub fn get_datasource_id_arg() -> Arg<'static> {
    Arg::new("datasource-id")
        .short('d')
        .long("datasource-id")
        .value_name("ID")
        .help("Sets the data source instance id [default: 0]")
        .takes_value(true)
}

pub fn get_region_arg() -> Arg<'static> {
    Arg::new("region")
        .short('r')
        .long("region")
        .value_name("REGION")
        .help("Sets the AWS region")
        .takes_value(true)
}

pub fn get_datasource_id(matches: &ArgMatches) -> Result<Option<i64>> {
    Ok(match matches.value_of("datasource-id") {
        Some(id) => Some(id.parse::<i64>()?),
        None => None,
    })
}

/// The log level picked by `--silent`, `--trace` or `--log-level`, in that
/// order of precedence.
pub fn log_level(matches: &ArgMatches) -> Result<LevelFilter> {
    if matches.is_present("silent") {
        return Ok(LevelFilter::Off);
    }
    if matches.is_present("trace") {
        return Ok(LevelFilter::Trace);
    }
    Ok(match matches.value_of("log-level") {
        Some(level) => level.parse::<LevelFilter>()?,
        None => LevelFilter::Info,
    })
}

/// Installs the global logger. The AWS client and its HTTP stack only report
/// warnings and errors.
pub fn init_logging(matches: &ArgMatches) -> Result<()> {
    let level = log_level(matches)?;
    let verbose = level >= LevelFilter::Debug;
    env_logger::Builder::new()
        .filter_level(level)
        .filter_module("rusoto_core", LevelFilter::Warn)
        .filter_module("hyper", LevelFilter::Warn)
        .format_timestamp(verbose.then(|| TimestampPrecision::Millis))
        .format_target(verbose)
        .try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::App;

    fn app() -> App<'static> {
        App::new("test")
            .args(get_logging_args())
            .args(get_datasource_args())
    }

    #[test]
    fn datasource_id() -> Result<()> {
        let matches = app().try_get_matches_from(vec!["test", "-d", "7", "--region", "eu-west-1"])?;
        assert_eq!(Some(7), get_datasource_id(&matches)?);
        assert_eq!(Some("eu-west-1"), matches.value_of("region"));

        let matches = app().try_get_matches_from(vec!["test"])?;
        assert_eq!(None, get_datasource_id(&matches)?);

        let matches = app().try_get_matches_from(vec!["test", "-d", "seven"])?;
        assert!(get_datasource_id(&matches).is_err());
        Ok(())
    }

    #[test]
    fn log_levels() -> Result<()> {
        let level = |args: Vec<&str>| -> Result<LevelFilter> {
            log_level(&app().try_get_matches_from(args)?)
        };
        assert_eq!(LevelFilter::Info, level(vec!["test"])?);
        assert_eq!(LevelFilter::Debug, level(vec!["test", "-L", "debug"])?);
        assert_eq!(LevelFilter::Off, level(vec!["test", "--log-level", "off"])?);
        assert_eq!(LevelFilter::Trace, level(vec!["test", "-L", "warn", "--trace"])?);
        assert_eq!(LevelFilter::Off, level(vec!["test", "--trace", "--silent"])?);
        assert!(app()
            .try_get_matches_from(vec!["test", "--log-level", "loud"])
            .is_err());
        Ok(())
    }
}
