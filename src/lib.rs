//! cpix-packager - DoveRunner CPIX key retrieval for Shaka Packager.
//!
//! This crate provides:
//! - Decoding of DRM type, track type and encryption scheme flags.
//! - A CPIX client that requests content keys and PSSH data from the KMS.
//! - Conversion of the key response into Shaka Packager raw-key arguments.
//! - Invocation of the packager as a child process.
//!
//! Feature flags:
//! - `cli`: enable the CLI binary.
//! - `log`: log through the `log` crate.
//! - `tracing`: log through `tracing` (takes precedence over `log`).

#[macro_use]
mod macros;

/// Run configuration and argument splitting.
pub mod config;
/// CPIX request/response handling and the KMS client.
pub mod cpix;
/// Common error types and Result alias.
pub mod error;
/// Flag enumerations and their decoding.
pub mod flags;
/// Key information model.
pub mod key;
/// Packager argument building and invocation.
pub mod packager;
/// The fetch-then-package run.
pub mod pipeline;
/// PSSH box handling.
pub mod pssh;
/// Shared helper utilities.
pub mod utils;
