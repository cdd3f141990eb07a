//! Display session: one device, one output, one buffer
//!
//! A [`DisplaySession`] only exists once init has fully succeeded. Any init
//! failure releases everything acquired so far, in reverse order, and closes
//! the device before the error is returned.

use crate::buffer::PixelBuffer;
use crate::config::OutputConfig;
use crate::device::{Card, KmsDevice};
use crate::resolver::{self, MasterLease, Resolution, ResolvedOutput};
use crate::source::ImageFile;
use crate::writer;
use crate::{Error, Result};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    DeviceOpen,
    ResourcesAcquired,
    BufferReady,
    Displaying,
    Closed,
}

/// Exclusive owner of a KMS device driving a single buffer on a single output
pub struct DisplaySession<D: KmsDevice = Card> {
    state: SessionState,
    output: ResolvedOutput,
    // Teardown runs in field order: buffer, then master, then the device
    // handle itself once the last reference is gone.
    buffer: PixelBuffer<D>,
    _master: MasterLease<D>,
    device: Arc<D>,
}

impl DisplaySession<Card> {
    /// Open the configured card node and bring up the output
    pub fn open(config: &OutputConfig) -> Result<Self> {
        let card = Card::open(&config.device_path).map_err(|source| Error::DeviceOpenFailed {
            path: config.device_path.clone(),
            source,
        })?;
        Self::with_device(card, config)
    }
}

impl<D: KmsDevice> DisplaySession<D> {
    /// Bring up the output on an already open device.
    ///
    /// Takes ownership of the device; on failure it is closed before returning.
    pub fn with_device(device: D, config: &OutputConfig) -> Result<Self> {
        let mut state = SessionState::Uninitialized;
        let device = Arc::new(device);
        transition(&mut state, SessionState::DeviceOpen);

        let Resolution { master, output } = resolver::resolve(&device)?;
        transition(&mut state, SessionState::ResourcesAcquired);

        let buffer = PixelBuffer::allocate(
            &device,
            output.mode.width(),
            output.mode.height(),
            config.bits_per_pixel(),
            config.color_depth,
        )?;
        transition(&mut state, SessionState::BufferReady);

        info!(
            "Display session ready on connector {} / CRTC {}: {}x{} {} ({} bpp)",
            output.connector_id,
            output.crtc_id,
            buffer.width(),
            buffer.height(),
            config.pixel_format,
            buffer.bits_per_pixel()
        );

        Ok(Self {
            state,
            output,
            buffer,
            _master: master,
            device,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Connector, CRTC and mode in use
    pub fn output(&self) -> &ResolvedOutput {
        &self.output
    }

    pub fn buffer(&self) -> &PixelBuffer<D> {
        &self.buffer
    }

    /// Copy raw frame bytes into the buffer; returns the number copied
    pub fn write_frame(&mut self, source: &[u8]) -> usize {
        writer::write(&mut self.buffer, source)
    }

    /// Fill the whole buffer with one byte value
    pub fn clear(&mut self, value: u8) {
        writer::fill(&mut self.buffer, value);
    }

    /// Set the mode and scan out the buffer.
    ///
    /// A failed commit leaves the session as it was; the caller may retry.
    pub fn commit(&mut self) -> Result<()> {
        let ResolvedOutput {
            connector_id,
            crtc_id,
            mode,
        } = self.output;

        self.device
            .set_crtc(crtc_id, self.buffer.fb_id(), connector_id, &mode)
            .map_err(|source| {
                warn!("Mode set on CRTC {} failed: {}", crtc_id, source);
                Error::CommitFailed { crtc_id, source }
            })?;

        if self.state != SessionState::Displaying {
            transition(&mut self.state, SessionState::Displaying);
        }
        debug!("Committed framebuffer {} to CRTC {}", self.buffer.fb_id(), crtc_id);
        Ok(())
    }

    /// Stream a raw image file into the buffer and commit it.
    ///
    /// Returns the number of bytes copied, at most the buffer size.
    pub fn draw_image(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let mut image = ImageFile::open(path)?;
        if image.is_empty() {
            warn!("Image {} is empty, committing the buffer as is", image.path().display());
        }
        let copied = writer::copy_from(&mut self.buffer, &mut image).map_err(|source| Error::FileOpenFailed {
            path: image.path().to_path_buf(),
            source,
        })?;

        if image.len() > self.buffer.size() as u64 {
            info!(
                "Image {} is {} bytes, showing the first {}",
                image.path().display(),
                image.len(),
                copied
            );
        } else {
            debug!("Copied {} bytes from {}", copied, image.path().display());
        }

        self.commit()?;
        Ok(copied)
    }

    /// Alternate full white and full black frames, committing each one
    pub fn flash(&mut self, cycles: u32, interval: Duration) -> Result<()> {
        for cycle in 0..cycles {
            let value = if cycle % 2 == 1 { 0x00 } else { 0xFF };
            self.clear(value);
            self.commit()?;
            thread::sleep(interval);
        }
        Ok(())
    }

    /// Tear the session down now. Dropping the session does the same.
    pub fn close(self) {
        drop(self);
    }
}

impl<D: KmsDevice> Drop for DisplaySession<D> {
    fn drop(&mut self) {
        transition(&mut self.state, SessionState::Closed);
        debug!(
            "Releasing fb {}, DRM master and device ({} refs)",
            self.buffer.fb_id(),
            Arc::strong_count(&self.device)
        );
    }
}

fn transition(state: &mut SessionState, next: SessionState) {
    debug!("Display session {:?} -> {:?}", state, next);
    *state = next;
}
