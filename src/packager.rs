//! Shaka Packager command line assembly and invocation.
//!
//! Keys are passed with `--enable_raw_key_encryption`: every key becomes a
//! `label=..:key_id=..:key=..` entry of `--keys`, and the PSSH boxes of all
//! requested DRM systems are concatenated into `--pssh`.
use std::collections::BTreeSet;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::flags::DrmType;
use crate::key::{ContentKeyInfo, MultiDrmInfo};
use crate::pssh::Pssh;
use crate::utils::{base64_to_hex, uuid_to_hex};

/// Runs the packager binary.
pub trait PackagerRunner {
    /// Run `program` to completion and return its exit code.
    ///
    /// `None` means the process ended without one (killed by a signal).
    fn run(&self, program: &Path, args: &[String]) -> Result<Option<i32>>;
}

/// Spawns the packager as a child process with inherited stdio.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl PackagerRunner for ProcessRunner {
    fn run(&self, program: &Path, args: &[String]) -> Result<Option<i32>> {
        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| Error::Other(format!("Failed to run shaka-packager: {}", e)))?;
        Ok(status.code())
    }
}

/// Result of a packaging attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackagerOutcome {
    /// No keys were available; the packager was not started.
    Skipped,
    /// The packager exited with status 0.
    Completed,
    /// The packager failed or could not be started.
    Failed,
}

/// Label for a key: the user's track type spelling that matches the key's
/// track type, or empty when one key covers all tracks.
pub fn key_label(info: &MultiDrmInfo, config: &Config) -> String {
    if config.is_all_tracks() {
        return String::new();
    }

    config
        .track_labels
        .iter()
        .find(|label| label.eq_ignore_ascii_case(&info.track_type))
        .cloned()
        .unwrap_or_default()
}

/// Build the packager arguments for a key response.
///
/// Returns `None` when the response holds no keys.
pub fn build_packager_args(info: &ContentKeyInfo, config: &Config) -> Result<Option<Vec<String>>> {
    if info.is_empty() {
        return Ok(None);
    }

    let mut keys = Vec::with_capacity(info.multidrm_infos.len());
    let mut pssh = BTreeSet::new();
    let mut iv = None;

    for key_info in info.multidrm_infos.iter() {
        let label = key_label(key_info, config);
        let kid = uuid_to_hex(&key_info.key_id);
        let key = base64_to_hex(&key_info.key)?;
        keys.push(format!("label={}:key_id={}:key={}", label, kid, key));

        if iv.is_none() {
            if let Some(key_iv) = key_info.iv.as_deref().filter(|v| !v.is_empty()) {
                iv = Some(base64_to_hex(key_iv)?);
            }
        }

        if config.drm_types.contains(&DrmType::Widevine) {
            if let Some(data) = key_info.widevine_pssh.as_deref().filter(|v| !v.is_empty()) {
                pssh.insert(base64_to_hex(data)?);
            }
        }
        if config.drm_types.contains(&DrmType::PlayReady) {
            if let Some(data) = key_info.playready_pssh.as_deref().filter(|v| !v.is_empty()) {
                pssh.insert(base64_to_hex(data)?);
            }
        }
        // The KMS FairPlay key URI is left out; the packager derives its own
        // per-key URIs.
        if config.drm_types.contains(&DrmType::FairPlay) {
            pssh.insert(Pssh::fairplay_placeholder().to_hex());
        }
    }

    let mut args = vec![
        "--enable_raw_key_encryption".to_string(),
        "--keys".to_string(),
        keys.join(","),
        "--protection_scheme".to_string(),
        config.encryption_scheme.as_str().to_string(),
    ];

    if let Some(iv) = iv.filter(|_| config.drm_types.contains(&DrmType::FairPlay)) {
        args.push("--iv".to_string());
        args.push(iv);
    }

    if !pssh.is_empty() {
        args.push("--pssh".to_string());
        args.push(pssh.into_iter().collect::<String>());
    }

    args.extend(config.packager_args.iter().cloned());
    Ok(Some(args))
}

/// Command line for logs, with key material hidden.
pub fn redacted_command(program: &Path, args: &[String]) -> String {
    let mut out = program.display().to_string();
    let mut hide_next = false;
    for arg in args {
        out.push(' ');
        if hide_next {
            out.push_str("<redacted>");
        } else if arg.contains(char::is_whitespace) {
            out.push_str(&format!("'{}'", arg));
        } else {
            out.push_str(arg);
        }
        hide_next = arg == "--keys";
    }
    out
}

/// Build the command for `info` and run it.
pub fn run_packager<R>(
    runner: &R,
    program: &Path,
    info: &ContentKeyInfo,
    config: &Config,
) -> Result<PackagerOutcome>
where
    R: PackagerRunner + ?Sized,
{
    let Some(args) = build_packager_args(info, config)? else {
        info!("No valid key information.");
        return Ok(PackagerOutcome::Skipped);
    };

    debug!("Packager command: {}", redacted_command(program, &args));

    match runner.run(program, &args) {
        Ok(Some(0)) => {
            info!("Packaging complete.");
            Ok(PackagerOutcome::Completed)
        }
        Ok(code) => {
            error!("An error occurred while running Shaka Packager");
            debug!("Packager exit code: {:?}", code);
            Ok(PackagerOutcome::Failed)
        }
        Err(e) => {
            error!("An error occurred while running Shaka Packager");
            debug!("Failed to start {}: {}", program.display(), e);
            Ok(PackagerOutcome::Failed)
        }
    }
}
