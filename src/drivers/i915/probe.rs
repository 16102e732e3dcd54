//! Aperture and Stolen Memory Geometry
//!
//! Intel integrated graphics are UMA: the BIOS sets aside some system RAM
//! for the framebuffer at early boot ("stolen" memory) and reports how much
//! in the GMCH control word of the host bridge. This module decodes that
//! word into the aperture size and the usable stolen size.
//!
//! # GMCH Control Word (host bridge config offset 0x52)
//! ```text
//!  15          8 7      4 3     1  0
//! ┌─────────────┬────────┬───────┬───┐
//! │   reserved  │  GMS   │  ...  │MEM│
//! └─────────────┴────────┴───────┴───┘
//!   MEM: aperture select on 8xx parts (1 = 64 MiB, 0 = 128 MiB)
//!   GMS: graphics mode select, i.e. the stolen amount
//! ```
//!
//! Part of the stolen space is taken by the GTT (1 KiB per MiB of aperture)
//! and a 4 KiB popup, and that overhead is deducted from the result.

use core::fmt;

use super::identity::{DeviceIdentity, Generation};
use crate::hal::{ConfigSpace, Resources};
use crate::mm::address::MIB;

/// GMCH control register in the host bridge configuration space.
pub const INTEL_GMCH_CTRL: u16 = 0x52;

/// Aperture select bit, 8xx parts only.
pub const INTEL_GMCH_MEM_MASK: u16 = 0x1;
pub const INTEL_GMCH_MEM_64M: u16 = 0x1;
pub const INTEL_GMCH_MEM_128M: u16 = 0x0;

/// Stolen amount window. The 855/915 encodings use the low three bits of
/// the window; anything with bit 7 set is reserved on these parts.
pub const INTEL_GMCH_GMS_MASK: u16 = 0xf0;

pub const INTEL_855_GMCH_GMS_DISABLED: u16 = 0x00;
pub const INTEL_855_GMCH_GMS_STOLEN_1M: u16 = 0x10;
pub const INTEL_855_GMCH_GMS_STOLEN_4M: u16 = 0x20;
pub const INTEL_855_GMCH_GMS_STOLEN_8M: u16 = 0x30;
pub const INTEL_855_GMCH_GMS_STOLEN_16M: u16 = 0x40;
pub const INTEL_855_GMCH_GMS_STOLEN_32M: u16 = 0x50;
pub const INTEL_915G_GMCH_GMS_STOLEN_48M: u16 = 0x60;
pub const INTEL_915G_GMCH_GMS_STOLEN_64M: u16 = 0x70;

/// BAR carrying the graphics aperture on 9-series parts.
pub const APERTURE_BAR: usize = 2;

/// Fixed pad reserved next to the GTT.
const POPUP_SIZE: u64 = 4096;

/// Error type for geometry probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeError {
    /// The host bridge could not be found.
    BridgeUnavailable,
    /// The BIOS disabled video memory.
    Disabled,
    /// The GMS field holds a code outside the table.
    Unrecognized(u16),
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BridgeUnavailable => write!(f, "bridge device not found"),
            Self::Disabled => write!(f, "video memory is disabled"),
            Self::Unrecognized(gms) => write!(f, "unexpected GMCH_GMS value: {:#04x}", gms),
        }
    }
}

/// Probed memory geometry. Immutable once computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApertureGeometry {
    /// Size of the graphics aperture in bytes.
    pub aperture_size: u64,
    /// Stolen bytes left after the GTT and popup overhead.
    ///
    /// Signed: a very large aperture on a 1 MiB stolen setting yields a
    /// negative value, which is reported as-is.
    pub stolen_size: i64,
}

impl ApertureGeometry {
    /// Bytes of stolen memory taken by the GTT and popup.
    #[inline]
    pub const fn overhead(&self) -> u64 {
        gtt_overhead(self.aperture_size)
    }

    /// Stolen bytes available to carve, never negative.
    #[inline]
    pub fn usable_stolen(&self) -> u64 {
        u64::try_from(self.stolen_size).unwrap_or(0)
    }
}

/// GTT (1 KiB per MiB of aperture) plus the popup page.
#[inline]
pub const fn gtt_overhead(aperture_size: u64) -> u64 {
    aperture_size / 1024 + POPUP_SIZE
}

/// Decode the GMS field into a multiple of 1 MiB.
pub fn stolen_multiplier(gmch_ctrl: u16) -> Result<u64, ProbeError> {
    match gmch_ctrl & INTEL_GMCH_GMS_MASK {
        INTEL_855_GMCH_GMS_STOLEN_1M => Ok(1),
        INTEL_855_GMCH_GMS_STOLEN_4M => Ok(4),
        INTEL_855_GMCH_GMS_STOLEN_8M => Ok(8),
        INTEL_855_GMCH_GMS_STOLEN_16M => Ok(16),
        INTEL_855_GMCH_GMS_STOLEN_32M => Ok(32),
        INTEL_915G_GMCH_GMS_STOLEN_48M => Ok(48),
        INTEL_915G_GMCH_GMS_STOLEN_64M => Ok(64),
        INTEL_855_GMCH_GMS_DISABLED => Err(ProbeError::Disabled),
        other => Err(ProbeError::Unrecognized(other)),
    }
}

/// Compute the geometry from the GMCH control word.
///
/// `aperture_len` is the length of the aperture BAR; it is only consulted
/// on 9-series parts, whose aperture can be larger than the legacy select
/// bit can express.
pub fn probe(
    identity: &DeviceIdentity,
    gmch_ctrl: u16,
    aperture_len: u64,
) -> Result<ApertureGeometry, ProbeError> {
    let aperture_size = match identity.generation() {
        Generation::Legacy => {
            if gmch_ctrl & INTEL_GMCH_MEM_MASK == INTEL_GMCH_MEM_64M {
                64 * MIB
            } else {
                128 * MIB
            }
        }
        Generation::I9xx | Generation::G33 => aperture_len,
    };

    let overhead = gtt_overhead(aperture_size);
    let preallocated = match stolen_multiplier(gmch_ctrl) {
        Ok(mult) => mult * MIB,
        Err(err) => {
            log::error!("[GMCH] {}", err);
            return Err(err);
        }
    };

    let stolen_size = preallocated as i64 - overhead as i64;
    if stolen_size < 0 {
        log::warn!(
            "[GMCH] GTT overhead {:#x} exceeds {} MiB stolen",
            overhead,
            preallocated / MIB
        );
    }

    Ok(ApertureGeometry {
        aperture_size,
        stolen_size,
    })
}

/// Read the GMCH control word and aperture facts, then [`probe`].
pub fn read_geometry<P>(
    identity: &DeviceIdentity,
    platform: &mut P,
) -> Result<ApertureGeometry, ProbeError>
where
    P: ConfigSpace + Resources + ?Sized,
{
    let Some(gmch_ctrl) = platform.bridge_read16(INTEL_GMCH_CTRL) else {
        log::error!("[GMCH] bridge device not found");
        return Err(ProbeError::BridgeUnavailable);
    };

    let geometry = probe(identity, gmch_ctrl, platform.resource_len(APERTURE_BAR))?;
    log::debug!(
        "[GMCH] aperture {} KiB, stolen {} bytes (ctrl {:#06x})",
        geometry.aperture_size / 1024,
        geometry.stolen_size,
        gmch_ctrl
    );
    Ok(geometry)
}
