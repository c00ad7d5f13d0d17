//! Error and warning types shared by the renderer.
//!
//! Everything that can abort an operation is a [`RenderError`]. Conditions that
//! are reported but let rendering continue (an incomplete framebuffer, an asset
//! that could not be found) are [`RenderWarning`]s and go to the log.

use thiserror::Error;

use crate::device::FramebufferStatus;

/// Library-wide result alias.
pub type Result<T> = std::result::Result<T, RenderError>;

#[derive(Error, Debug)]
pub enum RenderError {
    /// Caller supplied inconsistent data, e.g. vertex arrays of unequal length.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// An operation was issued in a state that cannot support it, e.g. drawing
    /// with a program that never linked.
    #[error("Invalid render state: {0}")]
    RenderState(String),

    /// The device refused to create a GPU object.
    #[error("Failed to allocate {what}: {reason}")]
    ResourceAllocation { what: String, reason: String },

    #[error("Shader program '{label}' failed to link: {log}")]
    ShaderLink { label: String, log: String },

    #[error("Asset not found: {0}")]
    AssetMissing(String),

    #[error("Frame capture failed: {0}")]
    Capture(String),

    #[error("Scene manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl RenderError {
    pub fn allocation(what: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ResourceAllocation {
            what: what.into(),
            reason: reason.into(),
        }
    }
}

/// Non-fatal conditions. They are logged and the frame carries on.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderWarning {
    FramebufferIncomplete {
        label: String,
        status: FramebufferStatus,
    },
    AssetMissing {
        path: String,
        reason: String,
    },
}

impl RenderWarning {
    pub fn emit(&self) {
        log::warn!("{}", self);
    }
}

impl std::fmt::Display for RenderWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderWarning::FramebufferIncomplete { label, status } => {
                write!(f, "Framebuffer '{}' is not complete: {}", label, status)
            }
            RenderWarning::AssetMissing { path, reason } => {
                write!(f, "Asset '{}' could not be loaded: {}", path, reason)
            }
        }
    }
}
