//! Device Context
//!
//! Everything one attach of the device owns, in one value. The context is
//! created by [`load`](super::bringup::load), handed back to the caller on
//! success and consumed by [`unload`](super::teardown::unload). Nothing in
//! the driver core keeps device state anywhere else.
//!
//! # Bring-up States
//! ```text
//! Unloaded → MmioMapped → GeometryProbed → RingReady
//!          → StatusPageReady → AuxReady → Operational
//! ```
//! `marker` is the highest state reached. It only moves up during bring-up
//! and only moves down during teardown, one stage at a time.

use alloc::boxed::Box;

use super::identity::DeviceIdentity;
use super::probe::ApertureGeometry;
use super::status_page::{self, StatusPageStrategy};
use crate::hal::{Mmio, Workqueue};
use crate::mm::address::PhysAddr;
use crate::mm::region::RegionAllocator;

/// Bring-up stage, in bring-up order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BringupState {
    Unloaded,
    MmioMapped,
    GeometryProbed,
    RingReady,
    StatusPageReady,
    AuxReady,
    Operational,
}

impl BringupState {
    /// The stage below this one. `Unloaded` has none.
    pub const fn prev(self) -> Option<Self> {
        match self {
            Self::Unloaded => None,
            Self::MmioMapped => Some(Self::Unloaded),
            Self::GeometryProbed => Some(Self::MmioMapped),
            Self::RingReady => Some(Self::GeometryProbed),
            Self::StatusPageReady => Some(Self::RingReady),
            Self::AuxReady => Some(Self::StatusPageReady),
            Self::Operational => Some(Self::AuxReady),
        }
    }
}

/// Driver tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    /// Name of the single-threaded driver workqueue.
    pub workqueue_name: &'static str,
    /// Whether clients may submit batch buffers.
    pub allow_batchbuffer: bool,
    /// Upper bound on buffers validated per submission.
    pub max_validate_buffers: u32,
    /// Forwarded to the initial output configuration.
    pub initial_config_can_grow: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            workqueue_name: "i915",
            allow_batchbuffer: true,
            max_validate_buffers: 4096,
            initial_config_can_grow: false,
        }
    }
}

/// PCI resources discovered before anything is mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceResources {
    /// BAR index holding the control registers.
    pub mmio_bar: usize,
    pub mmio_base: PhysAddr,
    pub mmio_len: u64,
    /// Framebuffer base, rounded down to 16 MiB.
    pub fb_base: PhysAddr,
    /// Aperture base; the status page is mapped relative to it.
    pub aperture_base: PhysAddr,
}

/// Per-attach device state.
#[derive(Debug)]
pub struct DeviceContext {
    pub(super) identity: DeviceIdentity,
    pub(super) config: DriverConfig,
    pub(super) marker: BringupState,
    pub(super) resources: DeviceResources,
    pub(super) cursor_needs_physical: bool,
    pub(super) stolen_base: Option<u32>,
    pub(super) mmio: Option<Mmio>,
    pub(super) geometry: Option<ApertureGeometry>,
    pub(super) regions: Option<RegionAllocator>,
    pub(super) gem_ready: bool,
    pub(super) ring_ready: bool,
    pub(super) status_page: Box<dyn StatusPageStrategy>,
    pub(super) workqueue: Option<Workqueue>,
    pub(super) modeset_ready: bool,
    pub(super) irq_installed: bool,
}

impl DeviceContext {
    /// A context with nothing acquired yet.
    pub fn new(identity: DeviceIdentity, config: DriverConfig, resources: DeviceResources) -> Self {
        Self {
            identity,
            config,
            marker: BringupState::Unloaded,
            resources,
            cursor_needs_physical: identity.cursor_needs_physical(),
            stolen_base: None,
            mmio: None,
            geometry: None,
            regions: None,
            gem_ready: false,
            ring_ready: false,
            status_page: status_page::select(&identity),
            workqueue: None,
            modeset_ready: false,
            irq_installed: false,
        }
    }

    #[inline]
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    #[inline]
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Highest bring-up stage reached and not yet torn down.
    #[inline]
    pub fn state(&self) -> BringupState {
        self.marker
    }

    #[inline]
    pub fn resources(&self) -> &DeviceResources {
        &self.resources
    }

    pub fn cursor_needs_physical(&self) -> bool {
        self.cursor_needs_physical
    }

    /// Stolen memory base from device config space, 9-series parts only.
    pub fn stolen_base(&self) -> Option<u32> {
        self.stolen_base
    }

    pub fn geometry(&self) -> Option<ApertureGeometry> {
        self.geometry
    }

    pub fn mmio(&self) -> Option<&Mmio> {
        self.mmio.as_ref()
    }

    pub fn regions(&self) -> Option<&RegionAllocator> {
        self.regions.as_ref()
    }

    pub fn status_page(&self) -> &dyn StatusPageStrategy {
        self.status_page.as_ref()
    }

    pub fn is_operational(&self) -> bool {
        self.marker == BringupState::Operational
    }

    /// Advance the marker after `stage` succeeded.
    pub(super) fn reached(&mut self, stage: BringupState) {
        debug_assert!(stage > self.marker);
        self.marker = stage;
    }
}
