//! Bring-up error type.

use core::fmt;

use super::probe::ProbeError;
use super::status_page::StatusPageError;
use crate::hal::HalError;
use crate::mm::region::RegionError;

/// Why attach failed.
///
/// The value reported by the failing stage is returned unchanged after the
/// stages before it have been rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BringupError {
    /// Not an Intel IGD this driver knows.
    UnsupportedDevice,
    /// No usable register BAR.
    NoMmioResource,
    /// The register BAR could not be mapped.
    MmioMapFailed,
    /// Aperture geometry could not be determined.
    Probe(ProbeError),
    /// The stolen region allocator refused a request.
    Region(RegionError),
    /// Ring buffer construction failed.
    Ring(HalError),
    /// Hardware status page setup failed.
    StatusPage(StatusPageError),
    /// The driver workqueue could not be created.
    WorkqueueUnavailable,
    /// Video BIOS tables are missing.
    NoVbios,
    /// Mode setting init failed.
    Modeset(HalError),
    /// The interrupt handler could not be installed.
    Irq(HalError),
    /// The device already has a live context.
    AlreadyAttached,
}

impl BringupError {
    /// Negative errno for the kernel's attach path.
    pub const fn errno(self) -> i32 {
        match self {
            Self::UnsupportedDevice | Self::NoMmioResource | Self::NoVbios => {
                HalError::NoDevice.errno()
            }
            Self::Probe(_) => HalError::NoDevice.errno(),
            Self::MmioMapFailed | Self::WorkqueueUnavailable => HalError::NoMemory.errno(),
            Self::Region(_) => HalError::NoMemory.errno(),
            Self::StatusPage(_) => HalError::NoMemory.errno(),
            Self::Ring(err) | Self::Modeset(err) | Self::Irq(err) => err.errno(),
            Self::AlreadyAttached => HalError::Busy.errno(),
        }
    }
}

impl fmt::Display for BringupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedDevice => write!(f, "unsupported device"),
            Self::NoMmioResource => write!(f, "can not find MMIO resource"),
            Self::MmioMapFailed => write!(f, "can not map MMIO registers"),
            Self::Probe(err) => write!(f, "geometry probe failed: {}", err),
            Self::Region(err) => write!(f, "stolen memory: {}", err),
            Self::Ring(err) => write!(f, "ring buffer init failed: {}", err),
            Self::StatusPage(err) => write!(f, "{}", err),
            Self::WorkqueueUnavailable => write!(f, "can not create workqueue"),
            Self::NoVbios => write!(f, "no VBIOS tables found"),
            Self::Modeset(err) => write!(f, "mode setting init failed: {}", err),
            Self::Irq(err) => write!(f, "can not install interrupt handler: {}", err),
            Self::AlreadyAttached => write!(f, "device already attached"),
        }
    }
}

impl From<ProbeError> for BringupError {
    fn from(err: ProbeError) -> Self {
        Self::Probe(err)
    }
}

impl From<RegionError> for BringupError {
    fn from(err: RegionError) -> Self {
        Self::Region(err)
    }
}

impl From<StatusPageError> for BringupError {
    fn from(err: StatusPageError) -> Self {
        Self::StatusPage(err)
    }
}
