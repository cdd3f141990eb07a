//! Output resolution: from an open device to a connector, CRTC and mode
//!
//! Resolution is first-fit throughout. The first connected connector with at
//! least one mode wins, the first CRTC its encoders can drive wins, and the
//! connector's first listed mode is used as-is.

use crate::device::{Connection, ConnectorInfo, Descriptor, DescriptorKind, DisplayMode, KmsDevice, Resources};
use crate::ioctl::DRM_CAP_DUMB_BUFFER;
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The display path chosen for output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedOutput {
    pub connector_id: u32,
    pub crtc_id: u32,
    pub mode: DisplayMode,
}

/// DRM master claim on a device, given up on drop
pub struct MasterLease<D: KmsDevice + ?Sized> {
    device: Arc<D>,
}

impl<D: KmsDevice + ?Sized> MasterLease<D> {
    /// Become master of `device`
    pub fn acquire(device: &Arc<D>) -> Result<Self> {
        device.set_master().map_err(Error::ExclusiveAccessDenied)?;
        debug!("Acquired DRM master");
        Ok(Self {
            device: Arc::clone(device),
        })
    }
}

impl<D: KmsDevice + ?Sized> Drop for MasterLease<D> {
    fn drop(&mut self) {
        match self.device.drop_master() {
            Ok(()) => debug!("Dropped DRM master"),
            Err(e) => warn!("Failed to drop DRM master: {}", e),
        }
    }
}

/// A resolved output together with the master claim that backs it
pub struct Resolution<D: KmsDevice + ?Sized> {
    pub master: MasterLease<D>,
    pub output: ResolvedOutput,
}

/// Find a usable display path on `device`.
///
/// Claims DRM master on the way. If resolution fails the claim is released
/// before returning, as is every descriptor queried along the way.
pub fn resolve<D: KmsDevice + ?Sized>(device: &Arc<D>) -> Result<Resolution<D>> {
    match device.get_cap(DRM_CAP_DUMB_BUFFER) {
        Ok(0) => return Err(Error::CapabilityUnsupported),
        Ok(_) => {}
        Err(e) => {
            debug!("Dumb buffer capability query failed: {}", e);
            return Err(Error::CapabilityUnsupported);
        }
    }

    let master = MasterLease::acquire(device)?;
    let output = find_output(device.as_ref())?;

    info!(
        connector = output.connector_id,
        crtc = output.crtc_id,
        "Resolved output {} @ {}Hz",
        output.mode.name(),
        output.mode.refresh()
    );

    Ok(Resolution { master, output })
}

fn find_output<D: KmsDevice + ?Sized>(device: &D) -> Result<ResolvedOutput> {
    let info = device
        .resources()
        .map_err(|e| Error::ResourceQueryFailed(e.to_string()))?;
    let resources = Descriptor::new(device, DescriptorKind::Resources, 0, info);

    if resources.connectors.is_empty() || resources.crtcs.is_empty() {
        return Err(Error::ResourceQueryFailed(format!(
            "device reports {} connectors and {} CRTCs",
            resources.connectors.len(),
            resources.crtcs.len()
        )));
    }
    debug!(
        "Resources: {} connectors, {} CRTCs, {} encoders",
        resources.connectors.len(),
        resources.crtcs.len(),
        resources.encoders.len()
    );

    let connector = find_connector(device, &resources).ok_or(Error::NoActiveConnector)?;
    let crtc_id = find_crtc(device, &resources, &connector).ok_or(Error::NoUsableCrtc {
        connector_id: connector.id,
    })?;

    Ok(ResolvedOutput {
        connector_id: connector.id,
        crtc_id,
        mode: connector.modes[0],
    })
}

/// First connector that is connected and reports at least one mode
fn find_connector<'d, D: KmsDevice + ?Sized>(
    device: &'d D,
    resources: &Resources,
) -> Option<Descriptor<'d, D, ConnectorInfo>> {
    for &id in &resources.connectors {
        let info = match device.connector(id) {
            Ok(info) => info,
            Err(e) => {
                debug!("Skipping connector {}: {}", id, e);
                continue;
            }
        };
        let connector = Descriptor::new(device, DescriptorKind::Connector, id, info);

        if connector.connection == Connection::Connected && !connector.modes.is_empty() {
            debug!("Using connector {} ({} modes)", id, connector.modes.len());
            return Some(connector);
        }
        debug!(
            "Connector {} not usable: {:?}, {} modes",
            id,
            connector.connection,
            connector.modes.len()
        );
    }
    None
}

/// First CRTC, in encoder then index order, that an encoder can drive and
/// that has a nonzero id
fn find_crtc<D: KmsDevice + ?Sized>(device: &D, resources: &Resources, connector: &ConnectorInfo) -> Option<u32> {
    for &encoder_id in &connector.encoders {
        let info = match device.encoder(encoder_id) {
            Ok(info) => info,
            Err(e) => {
                debug!("Skipping encoder {}: {}", encoder_id, e);
                continue;
            }
        };
        let encoder = Descriptor::new(device, DescriptorKind::Encoder, encoder_id, info);

        let found = resources
            .crtcs
            .iter()
            .take(u32::BITS as usize)
            .enumerate()
            .find(|&(index, &crtc_id)| encoder.possible_crtcs & (1 << index) != 0 && crtc_id != 0)
            .map(|(_, &crtc_id)| crtc_id);

        if let Some(crtc_id) = found {
            debug!("Encoder {} drives CRTC {}", encoder_id, crtc_id);
            return Some(crtc_id);
        }
    }
    None
}
