//! Miscellaneous helper utilities.
use std::env;
use std::path::PathBuf;

use base64::Engine;
use uuid::Uuid;

use crate::error::Result;

/// Search PATH for the first matching binary name.
#[must_use]
pub fn get_binary_path(names: &[&str]) -> Option<PathBuf> {
    let path_var = env::var_os("PATH")?;
    let paths = env::split_paths(&path_var);

    for dir in paths {
        for name in names {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }

            if cfg!(windows) {
                for ext in ["exe", "cmd", "bat"] {
                    let candidate = dir.join(format!("{}.{}", name, ext));
                    if candidate.is_file() {
                        return Some(candidate);
                    }
                }
            }
        }
    }

    None
}

/// Decode standard base64 and re-encode as lower-case hex.
pub fn base64_to_hex(data_b64: &str) -> Result<String> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(data_b64.trim())?;
    Ok(hex::encode(bytes))
}

/// Key id as 32 hex digits without hyphens.
#[must_use]
pub fn uuid_to_hex(uuid: &Uuid) -> String {
    uuid.as_simple().to_string()
}
