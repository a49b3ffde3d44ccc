//! Error types for the Strata GPU core
//!
//! This module defines the error types used by the command-recording engine
//! and by the backend collaborators it drives (render-pass cache, command
//! buffer pool, device submission).

use std::fmt;

/// Result type for Strata operations
pub type Result<T> = std::result::Result<T, Error>;

/// Strata errors
///
/// Only backend failures travel through this type. Resource exhaustion while
/// recording (missing pipeline state, missing command buffer) is absorbed by
/// the recorder and never becomes an `Error`.
#[derive(Debug, Clone)]
pub enum Error {
    /// Backend-specific error (Vulkan, etc.)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Invalid resource (render target, texture, buffer, render pass, etc.)
    InvalidResource(String),

    /// Initialization failed (device, caches, subsystems)
    InitializationFailed(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
