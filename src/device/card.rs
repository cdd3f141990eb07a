//! DRM card node backed by raw ioctls

use super::{
    Connection, ConnectorInfo, DescriptorKind, DisplayMode, DumbAllocation, EncoderInfo, KmsDevice, Resources,
};
use crate::ioctl::*;
use std::fs::OpenOptions;
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};
use tracing::{debug, info, trace};

/// How often a two-pass array query is retried when counts change in between
const MAX_QUERY_ATTEMPTS: usize = 4;

/// An open `/dev/dri/card*` node.
///
/// The descriptor is closed when the `Card` is dropped.
#[derive(Debug)]
pub struct Card {
    fd: OwnedFd,
    path: PathBuf,
}

impl Card {
    /// Open a DRM card node read/write
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        info!("Opening DRM device {}", path.display());

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_CLOEXEC | libc::O_NONBLOCK)
            .open(path)?;

        debug!("Opened {} as fd {}", path.display(), file.as_raw_fd());
        Ok(Self {
            fd: file.into(),
            path: path.to_path_buf(),
        })
    }

}

impl AsRawFd for Card {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl Drop for Card {
    fn drop(&mut self) {
        debug!("Closing DRM device {}", self.path.display());
    }
}

/// User pointer for an ioctl array argument; null for empty arrays
fn user_ptr<T>(v: &mut [T]) -> u64 {
    if v.is_empty() {
        0
    } else {
        v.as_mut_ptr() as u64
    }
}

fn unstable_query(what: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::Other,
        format!("{} changed on every query attempt", what),
    )
}

impl KmsDevice for Card {
    fn get_cap(&self, capability: u64) -> io::Result<u64> {
        let mut cap = DrmGetCap { capability, value: 0 };
        unsafe { drm_ioctl_with(self.as_raw_fd(), DRM_IOCTL_GET_CAP, &mut cap)? };
        trace!("GET_CAP 0x{:x} = {}", capability, cap.value);
        Ok(cap.value)
    }

    fn set_master(&self) -> io::Result<()> {
        unsafe { drm_ioctl(self.as_raw_fd(), DRM_IOCTL_SET_MASTER, ptr::null_mut()) }
    }

    fn drop_master(&self) -> io::Result<()> {
        unsafe { drm_ioctl(self.as_raw_fd(), DRM_IOCTL_DROP_MASTER, ptr::null_mut()) }
    }

    fn resources(&self) -> io::Result<Resources> {
        let fd = self.as_raw_fd();

        for _ in 0..MAX_QUERY_ATTEMPTS {
            let mut res = DrmModeCardRes::default();
            unsafe { drm_ioctl_with(fd, DRM_IOCTL_MODE_GETRESOURCES, &mut res)? };

            // Framebuffer ids are not needed, leave count_fbs at zero so the
            // kernel skips copying them.
            let mut crtcs = vec![0u32; res.count_crtcs as usize];
            let mut connectors = vec![0u32; res.count_connectors as usize];
            let mut encoders = vec![0u32; res.count_encoders as usize];

            let mut fill = DrmModeCardRes {
                crtc_id_ptr: user_ptr(&mut crtcs),
                connector_id_ptr: user_ptr(&mut connectors),
                encoder_id_ptr: user_ptr(&mut encoders),
                count_crtcs: res.count_crtcs,
                count_connectors: res.count_connectors,
                count_encoders: res.count_encoders,
                ..Default::default()
            };
            unsafe { drm_ioctl_with(fd, DRM_IOCTL_MODE_GETRESOURCES, &mut fill)? };

            if fill.count_crtcs as usize > crtcs.len()
                || fill.count_connectors as usize > connectors.len()
                || fill.count_encoders as usize > encoders.len()
            {
                debug!("Mode resources changed during query, retrying");
                continue;
            }
            crtcs.truncate(fill.count_crtcs as usize);
            connectors.truncate(fill.count_connectors as usize);
            encoders.truncate(fill.count_encoders as usize);

            return Ok(Resources {
                connectors,
                crtcs,
                encoders,
            });
        }

        Err(unstable_query("mode resources"))
    }

    fn connector(&self, connector_id: u32) -> io::Result<ConnectorInfo> {
        let fd = self.as_raw_fd();

        for _ in 0..MAX_QUERY_ATTEMPTS {
            // count_modes == 0 makes the kernel probe the connector
            let mut probe = DrmModeGetConnector {
                connector_id,
                ..Default::default()
            };
            unsafe { drm_ioctl_with(fd, DRM_IOCTL_MODE_GETCONNECTOR, &mut probe)? };

            let mut modes = vec![DisplayMode::default(); probe.count_modes as usize];
            let mut encoders = vec![0u32; probe.count_encoders as usize];

            let mut fill = DrmModeGetConnector {
                connector_id,
                modes_ptr: user_ptr(&mut modes),
                encoders_ptr: user_ptr(&mut encoders),
                count_modes: probe.count_modes,
                count_encoders: probe.count_encoders,
                ..Default::default()
            };
            unsafe { drm_ioctl_with(fd, DRM_IOCTL_MODE_GETCONNECTOR, &mut fill)? };

            if fill.count_modes as usize > modes.len() || fill.count_encoders as usize > encoders.len() {
                debug!("Connector {} changed during query, retrying", connector_id);
                continue;
            }
            modes.truncate(fill.count_modes as usize);
            encoders.truncate(fill.count_encoders as usize);

            let connection = match fill.connection {
                DRM_MODE_CONNECTED => Connection::Connected,
                DRM_MODE_DISCONNECTED => Connection::Disconnected,
                _ => Connection::Unknown,
            };

            return Ok(ConnectorInfo {
                id: fill.connector_id,
                connection,
                modes,
                encoders,
            });
        }

        Err(unstable_query("connector"))
    }

    fn encoder(&self, encoder_id: u32) -> io::Result<EncoderInfo> {
        let mut enc = DrmModeGetEncoder {
            encoder_id,
            ..Default::default()
        };
        unsafe { drm_ioctl_with(self.as_raw_fd(), DRM_IOCTL_MODE_GETENCODER, &mut enc)? };

        Ok(EncoderInfo {
            id: enc.encoder_id,
            possible_crtcs: enc.possible_crtcs,
        })
    }

    fn release(&self, kind: DescriptorKind, id: u32) {
        // Descriptors are copied out by the ioctls, nothing is held kernel-side
        trace!("Released {:?} descriptor {}", kind, id);
    }

    fn create_dumb(&self, width: u32, height: u32, bpp: u32) -> io::Result<DumbAllocation> {
        let mut create = DrmModeCreateDumb {
            width,
            height,
            bpp,
            ..Default::default()
        };
        unsafe { drm_ioctl_with(self.as_raw_fd(), DRM_IOCTL_MODE_CREATE_DUMB, &mut create)? };

        Ok(DumbAllocation {
            handle: create.handle,
            pitch: create.pitch,
            size: create.size,
        })
    }

    fn destroy_dumb(&self, handle: u32) -> io::Result<()> {
        let mut destroy = DrmModeDestroyDumb { handle };
        unsafe { drm_ioctl_with(self.as_raw_fd(), DRM_IOCTL_MODE_DESTROY_DUMB, &mut destroy) }
    }

    fn add_framebuffer(
        &self,
        width: u32,
        height: u32,
        depth: u32,
        bpp: u32,
        pitch: u32,
        handle: u32,
    ) -> io::Result<u32> {
        let mut cmd = DrmModeFbCmd {
            fb_id: 0,
            width,
            height,
            pitch,
            bpp,
            depth,
            handle,
        };
        unsafe { drm_ioctl_with(self.as_raw_fd(), DRM_IOCTL_MODE_ADDFB, &mut cmd)? };
        Ok(cmd.fb_id)
    }

    fn remove_framebuffer(&self, fb_id: u32) -> io::Result<()> {
        let mut id = fb_id;
        unsafe { drm_ioctl_with(self.as_raw_fd(), DRM_IOCTL_MODE_RMFB, &mut id) }
    }

    fn map_dumb(&self, handle: u32, size: usize) -> io::Result<NonNull<u8>> {
        let mut map = DrmModeMapDumb {
            handle,
            ..Default::default()
        };
        unsafe { drm_ioctl_with(self.as_raw_fd(), DRM_IOCTL_MODE_MAP_DUMB, &mut map)? };

        let offset = libc::off_t::try_from(map.offset)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "map offset out of range"))?;

        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.as_raw_fd(),
                offset,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        NonNull::new(addr as *mut u8)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned null"))
    }

    unsafe fn unmap(&self, ptr: NonNull<u8>, size: usize) -> io::Result<()> {
        if libc::munmap(ptr.as_ptr() as *mut libc::c_void, size) != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn set_crtc(&self, crtc_id: u32, fb_id: u32, connector_id: u32, mode: &DisplayMode) -> io::Result<()> {
        let connectors = [connector_id];
        let mut crtc = DrmModeCrtc {
            set_connectors_ptr: connectors.as_ptr() as u64,
            count_connectors: 1,
            crtc_id,
            fb_id,
            x: 0,
            y: 0,
            gamma_size: 0,
            mode_valid: 1,
            mode: *mode,
        };
        unsafe { drm_ioctl_with(self.as_raw_fd(), DRM_IOCTL_MODE_SETCRTC, &mut crtc) }
    }
}
