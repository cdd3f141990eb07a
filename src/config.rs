//! Output configuration
//!
//! Fixed before the session starts. Every key is optional in the TOML form:
//!
//! ```toml
//! device_path = "/dev/dri/card1"
//! pixel_format = "rgb565"
//! color_depth = 16
//! ```

use crate::buffer::DEFAULT_COLOR_DEPTH;
use crate::format::PixelFormat;
use crate::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_DEVICE_PATH: &str = "/dev/dri/card0";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// DRM card node to drive
    pub device_path: PathBuf,
    /// Layout of the source image; decides bits per pixel
    pub pixel_format: PixelFormat,
    /// Depth registered with the framebuffer
    pub color_depth: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            device_path: PathBuf::from(DEFAULT_DEVICE_PATH),
            pixel_format: PixelFormat::default(),
            color_depth: DEFAULT_COLOR_DEPTH,
        }
    }
}

impl OutputConfig {
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {}", path.display(), e)))?;
        let config = Self::from_toml(&contents)?;
        tracing::info!("Loaded output config from {:?}", path);
        Ok(config)
    }

    pub fn bits_per_pixel(&self) -> u32 {
        self.pixel_format.bits_per_pixel()
    }
}
