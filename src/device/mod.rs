//! Kernel mode-setting device interface
//!
//! [`KmsDevice`] is the seam between the output pipeline and the kernel. The
//! real implementation is [`Card`], which talks to a `/dev/dri/card*` node via
//! raw ioctls. Everything above this module only sees the trait.
//!
//! # Descriptors
//! Resources, connectors and encoders are queried as descriptors. A queried
//! descriptor is wrapped in a [`Descriptor`] guard which hands it back to the
//! device through [`KmsDevice::release`] when dropped, on every path.

mod card;
#[cfg(test)]
pub(crate) mod fake;

pub use card::Card;

use std::fmt;
use std::io;
use std::ops::Deref;
use std::ptr::NonNull;

/// DRM mode info (matches the kernel's `drm_mode_modeinfo`)
#[repr(C)]
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayMode {
    pub clock: u32,
    pub hdisplay: u16,
    pub hsync_start: u16,
    pub hsync_end: u16,
    pub htotal: u16,
    pub hskew: u16,
    pub vdisplay: u16,
    pub vsync_start: u16,
    pub vsync_end: u16,
    pub vtotal: u16,
    pub vscan: u16,
    pub vrefresh: u32,
    pub flags: u32,
    pub type_: u32,
    pub name: [u8; 32],
}

impl DisplayMode {
    pub fn width(&self) -> u32 {
        self.hdisplay as u32
    }

    pub fn height(&self) -> u32 {
        self.vdisplay as u32
    }

    pub fn refresh(&self) -> u32 {
        self.vrefresh
    }

    /// Mode name as reported by the driver
    pub fn name(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }
}

impl fmt::Debug for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplayMode")
            .field("name", &self.name())
            .field("width", &self.hdisplay)
            .field("height", &self.vdisplay)
            .field("refresh", &self.vrefresh)
            .field("clock", &self.clock)
            .finish()
    }
}

/// Connector connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connection {
    Connected,
    Disconnected,
    Unknown,
}

/// Mode resources enumeration
#[derive(Debug, Clone, Default)]
pub struct Resources {
    pub connectors: Vec<u32>,
    pub crtcs: Vec<u32>,
    pub encoders: Vec<u32>,
}

/// Connector info
#[derive(Debug, Clone)]
pub struct ConnectorInfo {
    pub id: u32,
    pub connection: Connection,
    pub modes: Vec<DisplayMode>,
    pub encoders: Vec<u32>,
}

/// Encoder info
#[derive(Debug, Clone)]
pub struct EncoderInfo {
    pub id: u32,
    /// Bitmask of CRTC indices (into [`Resources::crtcs`]) this encoder can drive
    pub possible_crtcs: u32,
}

/// Result of a dumb buffer allocation. Pitch and size come from the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumbAllocation {
    pub handle: u32,
    pub pitch: u32,
    pub size: u64,
}

/// Kind of a queried descriptor, for [`KmsDevice::release`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    Resources,
    Connector,
    Encoder,
}

/// Legacy KMS operations the output pipeline needs.
///
/// All calls are synchronous and block until the kernel returns.
pub trait KmsDevice {
    /// Read a device capability value
    fn get_cap(&self, capability: u64) -> io::Result<u64>;

    /// Become DRM master
    fn set_master(&self) -> io::Result<()>;

    /// Give up DRM master
    fn drop_master(&self) -> io::Result<()>;

    fn resources(&self) -> io::Result<Resources>;

    fn connector(&self, connector_id: u32) -> io::Result<ConnectorInfo>;

    fn encoder(&self, encoder_id: u32) -> io::Result<EncoderInfo>;

    /// Hand back a queried descriptor. Called exactly once per successful query.
    fn release(&self, kind: DescriptorKind, id: u32);

    fn create_dumb(&self, width: u32, height: u32, bpp: u32) -> io::Result<DumbAllocation>;

    fn destroy_dumb(&self, handle: u32) -> io::Result<()>;

    /// Register a dumb buffer as a scanout framebuffer; returns the fb id
    fn add_framebuffer(
        &self,
        width: u32,
        height: u32,
        depth: u32,
        bpp: u32,
        pitch: u32,
        handle: u32,
    ) -> io::Result<u32>;

    fn remove_framebuffer(&self, fb_id: u32) -> io::Result<()>;

    /// Map a dumb buffer read/write into process memory
    fn map_dumb(&self, handle: u32, size: usize) -> io::Result<NonNull<u8>>;

    /// Undo [`KmsDevice::map_dumb`]
    ///
    /// # Safety
    /// `ptr` and `size` must come from a single successful `map_dumb` call on
    /// this device, and the region must not be accessed afterwards.
    unsafe fn unmap(&self, ptr: NonNull<u8>, size: usize) -> io::Result<()>;

    /// Set `mode` on `crtc_id`, scanning out `fb_id` to `connector_id`
    fn set_crtc(&self, crtc_id: u32, fb_id: u32, connector_id: u32, mode: &DisplayMode) -> io::Result<()>;
}

/// A queried descriptor that is released back to its device on drop
pub struct Descriptor<'d, D: KmsDevice + ?Sized, T> {
    device: &'d D,
    kind: DescriptorKind,
    id: u32,
    info: T,
}

impl<'d, D: KmsDevice + ?Sized, T> Descriptor<'d, D, T> {
    pub fn new(device: &'d D, kind: DescriptorKind, id: u32, info: T) -> Self {
        Self { device, kind, id, info }
    }
}

impl<D: KmsDevice + ?Sized, T> Deref for Descriptor<'_, D, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.info
    }
}

impl<D: KmsDevice + ?Sized, T> Drop for Descriptor<'_, D, T> {
    fn drop(&mut self) {
        self.device.release(self.kind, self.id);
    }
}
