//! Raw DRM ioctl definitions (from drm.h and drm_mode.h)
//!
//! Only the legacy mode-setting and dumb-buffer subset is defined here.
//! Request numbers are built from the struct sizes so they always match the
//! layouts below.

use crate::device::DisplayMode;
use std::io;
use std::mem::size_of;
use std::os::raw::{c_ulong, c_void};
use std::os::unix::io::RawFd;
use tracing::trace;

const DRM_IOCTL_BASE: c_ulong = 0x64; // 'd'

const fn drm_iowr<T>(nr: c_ulong) -> c_ulong {
    // _IOWR('d', nr, T)
    (3 << 30) | (DRM_IOCTL_BASE << 8) | nr | ((size_of::<T>() as c_ulong) << 16)
}

const fn drm_io(nr: c_ulong) -> c_ulong {
    // _IO('d', nr)
    (DRM_IOCTL_BASE << 8) | nr
}

pub const DRM_IOCTL_GET_CAP: c_ulong = drm_iowr::<DrmGetCap>(0x0c);
pub const DRM_IOCTL_SET_MASTER: c_ulong = drm_io(0x1e);
pub const DRM_IOCTL_DROP_MASTER: c_ulong = drm_io(0x1f);

pub const DRM_IOCTL_MODE_GETRESOURCES: c_ulong = drm_iowr::<DrmModeCardRes>(0xa0);
pub const DRM_IOCTL_MODE_SETCRTC: c_ulong = drm_iowr::<DrmModeCrtc>(0xa2);
pub const DRM_IOCTL_MODE_GETENCODER: c_ulong = drm_iowr::<DrmModeGetEncoder>(0xa6);
pub const DRM_IOCTL_MODE_GETCONNECTOR: c_ulong = drm_iowr::<DrmModeGetConnector>(0xa7);
pub const DRM_IOCTL_MODE_ADDFB: c_ulong = drm_iowr::<DrmModeFbCmd>(0xae);
pub const DRM_IOCTL_MODE_RMFB: c_ulong = drm_iowr::<u32>(0xaf);
pub const DRM_IOCTL_MODE_CREATE_DUMB: c_ulong = drm_iowr::<DrmModeCreateDumb>(0xb2);
pub const DRM_IOCTL_MODE_MAP_DUMB: c_ulong = drm_iowr::<DrmModeMapDumb>(0xb3);
pub const DRM_IOCTL_MODE_DESTROY_DUMB: c_ulong = drm_iowr::<DrmModeDestroyDumb>(0xb4);

pub const DRM_CAP_DUMB_BUFFER: u64 = 0x1;

/// Connection status; anything else is unknown
pub const DRM_MODE_CONNECTED: u32 = 1;
pub const DRM_MODE_DISCONNECTED: u32 = 2;

// drm_get_cap struct
#[repr(C)]
#[derive(Debug, Default)]
pub struct DrmGetCap {
    pub capability: u64,
    pub value: u64,
}

// drm_mode_card_res struct
#[repr(C)]
#[derive(Debug, Default)]
pub struct DrmModeCardRes {
    pub fb_id_ptr: u64,
    pub crtc_id_ptr: u64,
    pub connector_id_ptr: u64,
    pub encoder_id_ptr: u64,
    pub count_fbs: u32,
    pub count_crtcs: u32,
    pub count_connectors: u32,
    pub count_encoders: u32,
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
}

// drm_mode_get_connector struct
#[repr(C)]
#[derive(Debug, Default)]
pub struct DrmModeGetConnector {
    pub encoders_ptr: u64,
    pub modes_ptr: u64,
    pub props_ptr: u64,
    pub prop_values_ptr: u64,
    pub count_modes: u32,
    pub count_props: u32,
    pub count_encoders: u32,
    pub encoder_id: u32,
    pub connector_id: u32,
    pub connector_type: u32,
    pub connector_type_id: u32,
    pub connection: u32,
    pub mm_width: u32,
    pub mm_height: u32,
    pub subpixel: u32,
    pub pad: u32,
}

// drm_mode_get_encoder struct
#[repr(C)]
#[derive(Debug, Default)]
pub struct DrmModeGetEncoder {
    pub encoder_id: u32,
    pub encoder_type: u32,
    pub crtc_id: u32,
    pub possible_crtcs: u32,
    pub possible_clones: u32,
}

// drm_mode_crtc struct
#[repr(C)]
#[derive(Debug, Default)]
pub struct DrmModeCrtc {
    pub set_connectors_ptr: u64,
    pub count_connectors: u32,
    pub crtc_id: u32,
    pub fb_id: u32,
    pub x: u32,
    pub y: u32,
    pub gamma_size: u32,
    pub mode_valid: u32,
    pub mode: DisplayMode,
}

// drm_mode_fb_cmd struct (legacy ADDFB)
#[repr(C)]
#[derive(Debug, Default)]
pub struct DrmModeFbCmd {
    pub fb_id: u32,
    pub width: u32,
    pub height: u32,
    pub pitch: u32,
    pub bpp: u32,
    pub depth: u32,
    pub handle: u32,
}

// drm_mode_create_dumb struct
#[repr(C)]
#[derive(Debug, Default)]
pub struct DrmModeCreateDumb {
    pub height: u32,
    pub width: u32,
    pub bpp: u32,
    pub flags: u32,
    pub handle: u32,
    pub pitch: u32,
    pub size: u64,
}

// drm_mode_map_dumb struct
#[repr(C)]
#[derive(Debug, Default)]
pub struct DrmModeMapDumb {
    pub handle: u32,
    pub pad: u32,
    pub offset: u64,
}

// drm_mode_destroy_dumb struct
#[repr(C)]
#[derive(Debug, Default)]
pub struct DrmModeDestroyDumb {
    pub handle: u32,
}

/// Issue a DRM ioctl, restarting on EINTR/EAGAIN the way libdrm's drmIoctl does.
///
/// # Safety
/// `arg` must be null or point to a value whose layout matches `request`, and
/// any user pointers embedded in it must be valid for the kernel to access.
pub unsafe fn drm_ioctl(fd: RawFd, request: c_ulong, arg: *mut c_void) -> io::Result<()> {
    loop {
        let ret = libc::ioctl(fd, request as _, arg);
        if ret == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) | Some(libc::EAGAIN) => {
                trace!("ioctl 0x{:x} interrupted, retrying", request);
                continue;
            }
            _ => return Err(err),
        }
    }
}

/// Typed wrapper over [`drm_ioctl`] for requests that take a struct argument.
///
/// # Safety
/// `T` must be the struct `request` was built from, and embedded pointers must
/// be valid for the kernel to access.
pub unsafe fn drm_ioctl_with<T>(fd: RawFd, request: c_ulong, arg: &mut T) -> io::Result<()> {
    drm_ioctl(fd, request, arg as *mut T as *mut c_void)
}
