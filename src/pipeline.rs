//! One run: fetch keys for the configured content, then package.
use std::path::Path;

use crate::config::Config;
use crate::cpix::KeyInfoClient;
use crate::packager::{run_packager, PackagerOutcome, PackagerRunner};

/// Process exit status for bad flags.
pub const EXIT_CONFIG_ERROR: i32 = 1;
/// Process exit status when no key information could be obtained.
pub const EXIT_KEY_ERROR: i32 = 2;
/// Process exit status when the packager failed.
pub const EXIT_PACKAGER_ERROR: i32 = 3;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The packager ran and succeeded.
    Packaged,
    /// The KMS returned no keys; nothing was packaged.
    NoKeys,
    /// Key retrieval failed or returned unusable data.
    KeyFetchFailed,
    /// The packager failed or could not be started.
    PackagerFailed,
}

impl Outcome {
    pub fn exit_code(self) -> i32 {
        match self {
            Outcome::Packaged | Outcome::NoKeys => 0,
            Outcome::KeyFetchFailed => EXIT_KEY_ERROR,
            Outcome::PackagerFailed => EXIT_PACKAGER_ERROR,
        }
    }
}

/// Fetch keys through `client` and hand them to the packager at `program`.
///
/// Failures are logged here and reported through the returned [`Outcome`].
pub fn run<C, R>(config: &Config, client: &C, runner: &R, program: &Path) -> Outcome
where
    C: KeyInfoClient + ?Sized,
    R: PackagerRunner + ?Sized,
{
    let key_info = match client.get_content_key_info(
        &config.content_id,
        &config.drm_types,
        config.encryption_scheme,
        &config.track_types,
    ) {
        Ok(key_info) => key_info,
        Err(e) => {
            error!("Failed to get key information: {}", e);
            error!("Error type: {}", e.category());
            error!("Failed to get key information. Exit the program.");
            return Outcome::KeyFetchFailed;
        }
    };

    match run_packager(runner, program, &key_info, config) {
        Ok(PackagerOutcome::Completed) => Outcome::Packaged,
        Ok(PackagerOutcome::Skipped) => Outcome::NoKeys,
        Ok(PackagerOutcome::Failed) => Outcome::PackagerFailed,
        Err(e) => {
            error!("Invalid key information: {}", e);
            error!("Error type: {}", e.category());
            Outcome::KeyFetchFailed
        }
    }
}
