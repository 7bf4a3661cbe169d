//! Run configuration.
//!
//! Flags this tool understands are separated from the rest of the command
//! line up front; everything else belongs to the packager and is forwarded
//! untouched.
use std::collections::BTreeSet;
use std::env;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::flags::{parse_enum_value, parse_flag_enum, DrmType, EncryptionScheme, TrackType};
use crate::utils::get_binary_path;

/// Default DoveRunner CPIX endpoint; the enc token is appended to it.
pub const DEFAULT_KMS_URL: &str = "https://drm-kms.doverunner.com/v2/cpix/pallycon/getKey/";

/// Packager binaries searched for on PATH, in order.
pub const PACKAGER_BINARIES: &[&str] = &[
    "packager",
    "shaka-packager",
    "packager-linux-x64",
    "packager-linux-arm64",
    "packager-osx-x64",
    "packager-osx-arm64",
    "packager-win-x64",
];

/// Flags that take a value.
pub const VALUE_FLAGS: &[&str] = &[
    "--enc_token",
    "--content_id",
    "--drm_type",
    "--encryption_scheme",
    "--track_type",
];

/// Flags without a value.
pub const SWITCH_FLAGS: &[&str] = &["-h", "--help", "-d", "--debug"];

/// Split a command line (without the program name) into the arguments this
/// tool parses and the arguments forwarded to the packager.
///
/// Both `--flag value` and `--flag=value` are recognized. Order is preserved
/// on both sides.
pub fn split_known_args<I, S>(args: I) -> (Vec<String>, Vec<String>)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut known = Vec::new();
    let mut passthrough = Vec::new();
    let mut args = args.into_iter().map(Into::into);

    while let Some(arg) = args.next() {
        let flag = arg.split_once('=').map_or(arg.as_str(), |(flag, _)| flag);
        if VALUE_FLAGS.contains(&flag) {
            let inline = flag.len() != arg.len();
            known.push(arg);
            if !inline {
                if let Some(value) = args.next() {
                    known.push(value);
                }
            }
        } else if SWITCH_FLAGS.contains(&arg.as_str()) {
            known.push(arg);
        } else {
            passthrough.push(arg);
        }
    }

    (known, passthrough)
}

/// Validated configuration for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// KMS token; part of the endpoint path.
    pub enc_token: String,
    pub content_id: String,
    pub drm_types: BTreeSet<DrmType>,
    pub encryption_scheme: EncryptionScheme,
    pub track_types: BTreeSet<TrackType>,
    /// Track types as typed by the user, used as key labels.
    pub track_labels: Vec<String>,
    /// Arguments forwarded to the packager.
    pub packager_args: Vec<String>,
}

impl Config {
    /// Decode raw flag values into a configuration.
    pub fn from_flags(
        enc_token: &str,
        content_id: &str,
        drm_type: &str,
        encryption_scheme: &str,
        track_type: &str,
        packager_args: Vec<String>,
    ) -> Result<Self> {
        if enc_token.trim().is_empty() {
            return Err(Error::MissingValue("--enc_token".to_string()));
        }
        if content_id.trim().is_empty() {
            return Err(Error::MissingValue("--content_id".to_string()));
        }

        let drm_types = parse_flag_enum(drm_type)?;
        let track_types = parse_flag_enum(track_type)?;
        let encryption_scheme = parse_enum_value(encryption_scheme)?;
        let track_labels = track_type
            .split(',')
            .map(|label| label.trim().to_string())
            .collect();

        Ok(Self {
            enc_token: enc_token.to_string(),
            content_id: content_id.to_string(),
            drm_types,
            encryption_scheme,
            track_types,
            track_labels,
            packager_args,
        })
    }

    /// Whether a single key is shared by every track.
    pub fn is_all_tracks(&self) -> bool {
        self.track_types.contains(&TrackType::AllTracks)
    }
}

/// Settings read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// KMS base URL (`CPIX_KMS_URL`).
    pub kms_url: String,
    /// Packager executable (`PACKAGER_BIN`, else PATH lookup).
    pub packager_bin: PathBuf,
}

impl Settings {
    pub fn from_env() -> Self {
        let kms_url = env::var("CPIX_KMS_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_KMS_URL.to_string());

        let packager_bin = env::var_os("PACKAGER_BIN")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| get_binary_path(PACKAGER_BINARIES))
            .unwrap_or_else(|| PathBuf::from(PACKAGER_BINARIES[0]));

        Self {
            kms_url,
            packager_bin,
        }
    }
}
