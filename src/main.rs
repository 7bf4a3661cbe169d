#![cfg(feature = "cli")]
use std::process;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::{ArgAction, CommandFactory, FromArgMatches, Parser};
use tracing::{debug, error, Level};

use cpix_packager::config::{split_known_args, Config, Settings};
use cpix_packager::cpix::{kms_url, CpixClient};
use cpix_packager::packager::ProcessRunner;
use cpix_packager::pipeline::{self, EXIT_CONFIG_ERROR};

#[derive(Debug, Parser)]
#[command(
    name = "cpix-packager",
    args_override_self = true,
    override_usage = "cpix-packager [options] [Shaka options]",
    about = "Sample tool for integrating DoveRunner CPIX with Shaka Packager",
    after_help = "Arguments not listed above are passed to Shaka Packager unchanged."
)]
struct Cli {
    /// KMS token used for CPIX API communication with KMS
    #[arg(long = "enc_token", value_name = "TOKEN")]
    enc_token: String,

    /// Content ID
    #[arg(long = "content_id", value_name = "ID")]
    content_id: String,

    /// DRM type(s) separated by comma. Options: widevine, playready, fairplay
    #[arg(long = "drm_type", value_name = "TYPES")]
    drm_type: String,

    /// Encryption scheme. Options: cenc, cbc1, cens, cbcs
    #[arg(long = "encryption_scheme", value_name = "SCHEME", default_value = "cenc")]
    encryption_scheme: String,

    /// Track type(s) separated by comma. Options: all_tracks, audio, sd, hd, uhd1, uhd2
    #[arg(long = "track_type", value_name = "TYPES", default_value = "all_tracks")]
    track_type: String,

    /// Enable debug logging
    #[arg(short = 'd', long = "debug", action = ArgAction::SetTrue)]
    debug: bool,
}

/// Split the process arguments into this tool's flags and the packager
/// passthrough, then parse the flags.
///
/// An empty command line fails with the full help text.
fn parse_args<I>(argv: I) -> Result<(Cli, Vec<String>), clap::Error>
where
    I: IntoIterator<Item = String>,
{
    let mut argv = argv.into_iter();
    let program = argv.next().unwrap_or_else(|| "cpix-packager".to_string());
    let rest: Vec<String> = argv.collect();

    let command = Cli::command().arg_required_else_help(rest.is_empty());
    let (known, packager_args) = split_known_args(rest);
    let matches = command.try_get_matches_from(std::iter::once(program).chain(known))?;
    let cli = Cli::from_arg_matches(&matches)?;
    Ok((cli, packager_args))
}

/// Exit status for a command line that could not be parsed.
fn parse_exit_status(err: &clap::Error) -> i32 {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => EXIT_CONFIG_ERROR,
    }
}

fn main() -> anyhow::Result<()> {
    let (cli, packager_args) = match parse_args(std::env::args()) {
        Ok(parsed) => parsed,
        Err(e) => {
            e.print().ok();
            process::exit(parse_exit_status(&e));
        }
    };

    let level = if cli.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    debug!("cpix-packager version {}", env!("CARGO_PKG_VERSION"));

    let config = match Config::from_flags(
        &cli.enc_token,
        &cli.content_id,
        &cli.drm_type,
        &cli.encryption_scheme,
        &cli.track_type,
        packager_args,
    ) {
        Ok(config) => config,
        Err(e) => {
            error!("Error: {}", e);
            process::exit(EXIT_CONFIG_ERROR);
        }
    };

    let settings = Settings::from_env();
    debug!("Packager binary: {}", settings.packager_bin.display());

    let url = kms_url(&settings.kms_url, &config.enc_token).context("Invalid KMS URL")?;
    let client = CpixClient::new(url).context("Failed to create HTTP client")?;

    let outcome = pipeline::run(&config, &client, &ProcessRunner, &settings.packager_bin);
    match outcome.exit_code() {
        0 => Ok(()),
        code => process::exit(code),
    }
}
