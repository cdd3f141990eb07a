//! In-memory KMS device for tests
//!
//! Keeps a ledger of everything the pipeline acquires so tests can check
//! release order and leaks. The ledger is shared, so it stays readable after
//! the session has dropped the device.

use super::{
    Connection, ConnectorInfo, DescriptorKind, DisplayMode, DumbAllocation, EncoderInfo, KmsDevice, Resources,
};
use crate::ioctl::DRM_CAP_DUMB_BUFFER;
use std::collections::{HashMap, HashSet};
use std::io;
use std::ptr::{self, NonNull};
use std::sync::{Arc, Mutex, MutexGuard};

/// Operations that can be told to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Fail {
    GetCap,
    SetMaster,
    Resources,
    Connector(u32),
    Encoder(u32),
    CreateDumb,
    AddFramebuffer,
    MapDumb,
    SetCrtc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    SetMaster,
    DropMaster,
    Query(DescriptorKind, u32),
    Release(DescriptorKind, u32),
    CreateDumb { width: u32, height: u32, bpp: u32 },
    AddFramebuffer { depth: u32, bpp: u32, pitch: u32, handle: u32 },
    MapDumb { handle: u32, size: usize },
    RemoveFramebuffer(u32),
    Unmap(usize),
    DestroyDumb(u32),
    SetCrtc { crtc_id: u32, fb_id: u32, connector_id: u32 },
    Close,
}

#[derive(Debug, Default)]
pub(crate) struct Ledger {
    pub calls: Vec<Call>,
    pub fail: HashSet<Fail>,
    pub master: bool,
    pub descriptors: HashMap<(DescriptorKind, u32), usize>,
    pub dumb_buffers: HashMap<u32, u64>,
    pub framebuffers: HashMap<u32, u32>,
    pub mappings: HashMap<usize, usize>,
    pub closed: usize,
    next_handle: u32,
    next_fb: u32,
}

impl Ledger {
    /// True when nothing acquired from the device is still held
    pub fn is_clean(&self) -> bool {
        !self.master
            && self.descriptors.values().all(|&n| n == 0)
            && self.dumb_buffers.is_empty()
            && self.framebuffers.is_empty()
            && self.mappings.is_empty()
    }

    /// Position of the first call matching `pred`
    pub fn position(&self, pred: impl Fn(&Call) -> bool) -> Option<usize> {
        self.calls.iter().position(pred)
    }

    pub fn queried(&self, kind: DescriptorKind) -> Vec<u32> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Query(k, id) if *k == kind => Some(*id),
                _ => None,
            })
            .collect()
    }

    fn acquire(&mut self, kind: DescriptorKind, id: u32) {
        self.calls.push(Call::Query(kind, id));
        *self.descriptors.entry((kind, id)).or_insert(0) += 1;
    }

    fn check(&self, op: Fail) -> io::Result<()> {
        if self.fail.contains(&op) {
            Err(io::Error::new(io::ErrorKind::Other, format!("injected {:?} failure", op)))
        } else {
            Ok(())
        }
    }
}

pub(crate) struct FakeCard {
    has_dumb: bool,
    crtcs: Vec<u32>,
    connectors: Vec<ConnectorInfo>,
    encoders: Vec<EncoderInfo>,
    ledger: Arc<Mutex<Ledger>>,
}

pub(crate) const CONNECTOR_ID: u32 = 31;
pub(crate) const ENCODER_ID: u32 = 41;
pub(crate) const CRTC_ID: u32 = 51;

impl FakeCard {
    pub fn new() -> Self {
        Self {
            has_dumb: true,
            crtcs: Vec::new(),
            connectors: Vec::new(),
            encoders: Vec::new(),
            ledger: Arc::new(Mutex::new(Ledger {
                next_handle: 1,
                next_fb: 100,
                ..Default::default()
            })),
        }
    }

    /// One connected connector with a single mode, one encoder, one CRTC
    pub fn single_output(width: u16, height: u16) -> Self {
        Self::new()
            .with_crtcs(&[CRTC_ID])
            .with_connector(connector(CONNECTOR_ID, Connection::Connected, &[(width, height)], &[ENCODER_ID]))
            .with_encoder(encoder(ENCODER_ID, 0b1))
    }

    pub fn with_crtcs(mut self, crtcs: &[u32]) -> Self {
        self.crtcs = crtcs.to_vec();
        self
    }

    pub fn with_connector(mut self, info: ConnectorInfo) -> Self {
        self.connectors.push(info);
        self
    }

    pub fn with_encoder(mut self, info: EncoderInfo) -> Self {
        self.encoders.push(info);
        self
    }

    pub fn without_dumb_buffers(mut self) -> Self {
        self.has_dumb = false;
        self
    }

    pub fn failing(self, op: Fail) -> Self {
        self.ledger.lock().unwrap().fail.insert(op);
        self
    }

    /// Shared handle to the ledger, valid after the card is dropped
    pub fn ledger(&self) -> Arc<Mutex<Ledger>> {
        Arc::clone(&self.ledger)
    }

    fn state(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap()
    }
}

pub(crate) fn connector(id: u32, connection: Connection, modes: &[(u16, u16)], encoders: &[u32]) -> ConnectorInfo {
    ConnectorInfo {
        id,
        connection,
        modes: modes.iter().map(|&(w, h)| mode(w, h, 60)).collect(),
        encoders: encoders.to_vec(),
    }
}

pub(crate) fn encoder(id: u32, possible_crtcs: u32) -> EncoderInfo {
    EncoderInfo { id, possible_crtcs }
}

/// A mode with simplified blanking, named `WxH`
pub(crate) fn mode(width: u16, height: u16, refresh: u32) -> DisplayMode {
    let htotal = width.saturating_add(160);
    let vtotal = height.saturating_add(45);
    let clock = (htotal as u64 * vtotal as u64).saturating_mul(refresh as u64) / 1000;

    let mut name = [0u8; 32];
    let label = format!("{}x{}", width, height);
    let len = label.len().min(name.len() - 1);
    name[..len].copy_from_slice(&label.as_bytes()[..len]);

    DisplayMode {
        clock: u32::try_from(clock).unwrap_or(u32::MAX),
        hdisplay: width,
        hsync_start: width.saturating_add(48),
        hsync_end: width.saturating_add(80),
        htotal,
        vdisplay: height,
        vsync_start: height.saturating_add(3),
        vsync_end: height.saturating_add(8),
        vtotal,
        vrefresh: refresh,
        name,
        ..Default::default()
    }
}

impl KmsDevice for FakeCard {
    fn get_cap(&self, capability: u64) -> io::Result<u64> {
        self.state().check(Fail::GetCap)?;
        Ok(match capability {
            DRM_CAP_DUMB_BUFFER => self.has_dumb as u64,
            _ => 0,
        })
    }

    fn set_master(&self) -> io::Result<()> {
        let mut state = self.state();
        state.check(Fail::SetMaster)?;
        state.calls.push(Call::SetMaster);
        state.master = true;
        Ok(())
    }

    fn drop_master(&self) -> io::Result<()> {
        let mut state = self.state();
        state.calls.push(Call::DropMaster);
        state.master = false;
        Ok(())
    }

    fn resources(&self) -> io::Result<Resources> {
        let mut state = self.state();
        state.check(Fail::Resources)?;
        state.acquire(DescriptorKind::Resources, 0);
        Ok(Resources {
            connectors: self.connectors.iter().map(|c| c.id).collect(),
            crtcs: self.crtcs.clone(),
            encoders: self.encoders.iter().map(|e| e.id).collect(),
        })
    }

    fn connector(&self, connector_id: u32) -> io::Result<ConnectorInfo> {
        let mut state = self.state();
        state.check(Fail::Connector(connector_id))?;
        let info = self
            .connectors
            .iter()
            .find(|c| c.id == connector_id)
            .cloned()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        state.acquire(DescriptorKind::Connector, connector_id);
        Ok(info)
    }

    fn encoder(&self, encoder_id: u32) -> io::Result<EncoderInfo> {
        let mut state = self.state();
        state.check(Fail::Encoder(encoder_id))?;
        let info = self
            .encoders
            .iter()
            .find(|e| e.id == encoder_id)
            .cloned()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        state.acquire(DescriptorKind::Encoder, encoder_id);
        Ok(info)
    }

    fn release(&self, kind: DescriptorKind, id: u32) {
        let mut state = self.state();
        state.calls.push(Call::Release(kind, id));
        let count = state.descriptors.entry((kind, id)).or_insert(0);
        assert!(*count > 0, "released {:?} {} more often than queried", kind, id);
        *count -= 1;
    }

    fn create_dumb(&self, width: u32, height: u32, bpp: u32) -> io::Result<DumbAllocation> {
        let mut state = self.state();
        state.check(Fail::CreateDumb)?;
        state.calls.push(Call::CreateDumb { width, height, bpp });

        // Rows padded to 64 bytes, like many scanout engines
        let pitch = (width * bpp.div_ceil(8) + 63) & !63;
        let size = pitch as u64 * height as u64;
        let handle = state.next_handle;
        state.next_handle += 1;
        state.dumb_buffers.insert(handle, size);

        Ok(DumbAllocation { handle, pitch, size })
    }

    fn destroy_dumb(&self, handle: u32) -> io::Result<()> {
        let mut state = self.state();
        state.calls.push(Call::DestroyDumb(handle));
        state
            .dumb_buffers
            .remove(&handle)
            .map(|_| ())
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    fn add_framebuffer(
        &self,
        _width: u32,
        _height: u32,
        depth: u32,
        bpp: u32,
        pitch: u32,
        handle: u32,
    ) -> io::Result<u32> {
        let mut state = self.state();
        state.check(Fail::AddFramebuffer)?;
        state.calls.push(Call::AddFramebuffer { depth, bpp, pitch, handle });
        let fb_id = state.next_fb;
        state.next_fb += 1;
        state.framebuffers.insert(fb_id, handle);
        Ok(fb_id)
    }

    fn remove_framebuffer(&self, fb_id: u32) -> io::Result<()> {
        let mut state = self.state();
        state.calls.push(Call::RemoveFramebuffer(fb_id));
        state
            .framebuffers
            .remove(&fb_id)
            .map(|_| ())
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    fn map_dumb(&self, handle: u32, size: usize) -> io::Result<NonNull<u8>> {
        let mut state = self.state();
        state.check(Fail::MapDumb)?;
        state.calls.push(Call::MapDumb { handle, size });

        // Fresh dumb buffers hold garbage as far as callers are concerned
        let region = vec![0xA5u8; size].into_boxed_slice();
        let ptr = Box::into_raw(region) as *mut u8;
        state.mappings.insert(ptr as usize, size);
        NonNull::new(ptr).ok_or_else(|| io::Error::from(io::ErrorKind::OutOfMemory))
    }

    unsafe fn unmap(&self, ptr: NonNull<u8>, size: usize) -> io::Result<()> {
        let mut state = self.state();
        state.calls.push(Call::Unmap(size));
        match state.mappings.remove(&(ptr.as_ptr() as usize)) {
            Some(mapped) => {
                assert_eq!(mapped, size, "unmap size differs from map size");
                drop(Box::from_raw(ptr::slice_from_raw_parts_mut(ptr.as_ptr(), size)));
                Ok(())
            }
            None => Err(io::Error::from(io::ErrorKind::NotFound)),
        }
    }

    fn set_crtc(&self, crtc_id: u32, fb_id: u32, connector_id: u32, _mode: &DisplayMode) -> io::Result<()> {
        let mut state = self.state();
        state.check(Fail::SetCrtc)?;
        state.calls.push(Call::SetCrtc { crtc_id, fb_id, connector_id });
        Ok(())
    }
}

impl Drop for FakeCard {
    fn drop(&mut self) {
        if let Ok(mut state) = self.ledger.lock() {
            state.calls.push(Call::Close);
            state.closed += 1;
        }
    }
}
