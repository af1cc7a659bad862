//! Model checkpoints.
//!
//! Checkpoints are `.apr` files written through aprender's format module
//! with [`ModelType::Custom`]. The container carries the model type,
//! format version and a checksum; loading rejects any mismatch.

use crate::error::{JitError, Result};
use aprender::format::{self, ModelType, SaveOptions};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Name stored in the checkpoint metadata.
pub const CHECKPOINT_NAME: &str = "jitsdp-orb";

/// Write a checkpoint file.
///
/// # Errors
///
/// Returns [`JitError::Checkpoint`] if serialization or the write fails.
pub fn save<T: Serialize>(state: &T, path: impl AsRef<Path>) -> Result<()> {
    let options = SaveOptions::default()
        .with_name(CHECKPOINT_NAME)
        .with_description("online defect-prediction model state");
    format::save(state, ModelType::Custom, path, options)
        .map_err(|e| JitError::checkpoint(e.to_string()))
}

/// Read a checkpoint file.
///
/// # Errors
///
/// Returns [`JitError::Checkpoint`] if the file cannot be read, fails its
/// integrity checks, or does not hold a `T`.
pub fn load<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    format::load(path, ModelType::Custom).map_err(|e| JitError::checkpoint(e.to_string()))
}

/// Restore state from checkpoint bytes.
///
/// # Errors
///
/// Returns [`JitError::Checkpoint`] if the bytes are not a valid checkpoint
/// of a `T`.
pub fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    format::load_from_bytes(bytes, ModelType::Custom)
        .map_err(|e| JitError::checkpoint(e.to_string()))
}
