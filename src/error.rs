//! Error types for the KMS output pipeline

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to open DRM device {path}: {source}")]
    DeviceOpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("device does not support dumb buffers")]
    CapabilityUnsupported,

    #[error("could not become DRM master: {0}")]
    ExclusiveAccessDenied(#[source] io::Error),

    #[error("could not query mode resources: {0}")]
    ResourceQueryFailed(String),

    #[error("no connected connector with a usable mode")]
    NoActiveConnector,

    #[error("no usable CRTC for connector {connector_id}")]
    NoUsableCrtc { connector_id: u32 },

    #[error("color depth {depth} is not valid for {bpp} bits per pixel")]
    InvalidDepth { depth: u32, bpp: u32 },

    #[error("dumb buffer allocation failed: {0}")]
    AllocationFailed(#[source] io::Error),

    #[error("framebuffer registration failed: {0}")]
    RegistrationFailed(#[source] io::Error),

    #[error("mapping dumb buffer failed: {0}")]
    MappingFailed(#[source] io::Error),

    /// The image could not be opened, or reading it failed part way
    #[error("failed to read image {path}: {source}")]
    FileOpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("mode set on CRTC {crtc_id} failed: {source}")]
    CommitFailed {
        crtc_id: u32,
        #[source]
        source: io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Process exit code for this failure, distinct per pipeline stage.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::DeviceOpenFailed { .. } => 1,
            Error::CapabilityUnsupported => 2,
            Error::ExclusiveAccessDenied(_) => 3,
            Error::ResourceQueryFailed(_) => 4,
            Error::NoActiveConnector => 5,
            Error::NoUsableCrtc { .. } => 6,
            Error::InvalidDepth { .. } => 7,
            Error::AllocationFailed(_) => 8,
            Error::RegistrationFailed(_) => 9,
            Error::MappingFailed(_) => 10,
            Error::FileOpenFailed { .. } => 11,
            Error::CommitFailed { .. } => 12,
            Error::Config(_) => 13,
        }
    }
}
