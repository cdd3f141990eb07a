//! Dumb buffer backed pixel storage
//!
//! A [`PixelBuffer`] is built in three steps: allocate a dumb buffer, register
//! it as a framebuffer, and map it into memory. Each step is held by its own
//! guard so a failure part way through releases exactly what was acquired.

use crate::device::{DumbAllocation, KmsDevice};
use crate::format::legacy_depth_supported;
use crate::{Error, Result};
use std::io;
use std::ptr::NonNull;
use std::slice;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Color depth registered with the framebuffer unless configured otherwise
pub const DEFAULT_COLOR_DEPTH: u32 = 24;

struct DumbBuffer<D: KmsDevice + ?Sized> {
    device: Arc<D>,
    alloc: DumbAllocation,
}

impl<D: KmsDevice + ?Sized> Drop for DumbBuffer<D> {
    fn drop(&mut self) {
        match self.device.destroy_dumb(self.alloc.handle) {
            Ok(()) => debug!("Destroyed dumb buffer {}", self.alloc.handle),
            Err(e) => warn!("Failed to destroy dumb buffer {}: {}", self.alloc.handle, e),
        }
    }
}

struct Registration<D: KmsDevice + ?Sized> {
    device: Arc<D>,
    fb_id: u32,
}

impl<D: KmsDevice + ?Sized> Drop for Registration<D> {
    fn drop(&mut self) {
        match self.device.remove_framebuffer(self.fb_id) {
            Ok(()) => debug!("Removed framebuffer {}", self.fb_id),
            Err(e) => warn!("Failed to remove framebuffer {}: {}", self.fb_id, e),
        }
    }
}

struct Mapping<D: KmsDevice + ?Sized> {
    device: Arc<D>,
    ptr: NonNull<u8>,
    len: usize,
}

impl<D: KmsDevice + ?Sized> Drop for Mapping<D> {
    fn drop(&mut self) {
        // SAFETY: ptr/len came from map_dumb on this device and the region is
        // only reachable through this guard.
        match unsafe { self.device.unmap(self.ptr, self.len) } {
            Ok(()) => debug!("Unmapped {} bytes", self.len),
            Err(e) => warn!("Failed to unmap dumb buffer: {}", e),
        }
    }
}

/// A mapped, registered dumb buffer
pub struct PixelBuffer<D: KmsDevice + ?Sized> {
    // Fields drop in declaration order, which is the order the kernel wants:
    // unregister, unmap, then destroy.
    registration: Registration<D>,
    mapping: Mapping<D>,
    dumb: DumbBuffer<D>,
    width: u32,
    height: u32,
    bpp: u32,
    depth: u32,
}

impl<D: KmsDevice + ?Sized> PixelBuffer<D> {
    /// Allocate, register and map a `width` x `height` buffer.
    ///
    /// Pitch and size are whatever the driver returns for the allocation.
    /// `depth` must form a legal legacy framebuffer format with `bpp`.
    pub fn allocate(device: &Arc<D>, width: u32, height: u32, bpp: u32, depth: u32) -> Result<Self> {
        if !legacy_depth_supported(bpp, depth) {
            return Err(Error::InvalidDepth { depth, bpp });
        }

        let alloc = device
            .create_dumb(width, height, bpp)
            .map_err(Error::AllocationFailed)?;
        let dumb = DumbBuffer {
            device: Arc::clone(device),
            alloc,
        };
        debug!(
            "Created dumb buffer {}: {}x{} bpp={} pitch={} size={}",
            alloc.handle, width, height, bpp, alloc.pitch, alloc.size
        );

        let fb_id = device
            .add_framebuffer(width, height, depth, bpp, alloc.pitch, alloc.handle)
            .map_err(Error::RegistrationFailed)?;
        let registration = Registration {
            device: Arc::clone(device),
            fb_id,
        };
        debug!("Registered framebuffer {} (depth {})", fb_id, depth);

        let len = usize::try_from(alloc.size)
            .map_err(|_| Error::MappingFailed(io::Error::new(io::ErrorKind::InvalidData, "buffer too large to map")))?;
        let ptr = device.map_dumb(alloc.handle, len).map_err(Error::MappingFailed)?;
        let mapping = Mapping {
            device: Arc::clone(device),
            ptr,
            len,
        };

        info!("Pixel buffer ready: {}x{} pitch={} size={} fb={}", width, height, alloc.pitch, len, fb_id);

        Ok(Self {
            registration,
            mapping,
            dumb,
            width,
            height,
            bpp,
            depth,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bits_per_pixel(&self) -> u32 {
        self.bpp
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Bytes per row, as chosen by the driver
    pub fn pitch(&self) -> u32 {
        self.dumb.alloc.pitch
    }

    /// Size of the mapping in bytes, as chosen by the driver
    pub fn size(&self) -> usize {
        self.mapping.len
    }

    pub fn handle(&self) -> u32 {
        self.dumb.alloc.handle
    }

    /// Framebuffer id to attach to a CRTC
    pub fn fb_id(&self) -> u32 {
        self.registration.fb_id
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the mapping is live and `len` bytes long for as long as self is
        unsafe { slice::from_raw_parts(self.mapping.ptr.as_ptr(), self.mapping.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and &mut self guarantees exclusive access
        unsafe { slice::from_raw_parts_mut(self.mapping.ptr.as_ptr(), self.mapping.len) }
    }

    /// Unregister, unmap and free the buffer now
    pub fn release(self) {
        debug!("Releasing pixel buffer fb={}", self.fb_id());
        drop(self);
    }
}
