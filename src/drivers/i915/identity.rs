//! Device Identity
//!
//! Maps a PCI vendor/device pair to the generation class and feature set
//! that every later branch decision is made from. An identity is built once
//! at attach time and never changes.

use core::fmt;

/// Intel's PCI vendor id.
pub const INTEL_VENDOR_ID: u16 = 0x8086;

/// PCI device ids of the supported integrated graphics functions.
pub mod device_ids {
    // 8xx
    pub const I830_CGC: u16 = 0x3577;
    pub const I845G_IG: u16 = 0x2562;
    pub const I855GM_IG: u16 = 0x3582;
    pub const I865_IG: u16 = 0x2572;

    // 9xx
    pub const I915G: u16 = 0x2582;
    pub const I915GM: u16 = 0x2592;
    pub const I945G: u16 = 0x2772;
    pub const I945GM: u16 = 0x27a2;
    pub const I945GME: u16 = 0x27ae;

    // 965 class
    pub const I946GZ: u16 = 0x2972;
    pub const G35: u16 = 0x2982;
    pub const Q965: u16 = 0x2992;
    pub const I965G: u16 = 0x29a2;
    pub const I965GM: u16 = 0x2a02;
    pub const I965GME: u16 = 0x2a12;
    pub const GM45: u16 = 0x2a42;
    pub const IGD_E: u16 = 0x2e02;
    pub const Q45: u16 = 0x2e12;
    pub const G45: u16 = 0x2e22;
    pub const G41: u16 = 0x2e32;

    // G33 class
    pub const G33: u16 = 0x29c2;
    pub const Q35: u16 = 0x29b2;
    pub const Q33: u16 = 0x29d2;
}

/// Hardware generation class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Generation {
    /// 830/845/855/865: aperture size comes from the GMCH control word.
    Legacy,
    /// 915 and later: aperture size is the length of the aperture BAR.
    I9xx,
    /// G33/Q33/Q35: 9-series with the status page in stolen memory.
    G33,
}

bitflags::bitflags! {
    /// Chipset traits consulted outside the generation split.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChipFeatures: u32 {
        /// Mobile part.
        const MOBILE = 1 << 0;
        /// 915 or later.
        const I9XX = 1 << 1;
        /// 965-class render core.
        const I965G = 1 << 2;
        /// G33-class memory controller.
        const G33 = 1 << 3;
    }
}

struct DeviceInfo {
    device: u16,
    name: &'static str,
    generation: Generation,
    features: ChipFeatures,
}

const fn info(
    device: u16,
    name: &'static str,
    generation: Generation,
    features: ChipFeatures,
) -> DeviceInfo {
    DeviceInfo {
        device,
        name,
        generation,
        features,
    }
}

const NONE: ChipFeatures = ChipFeatures::empty();
const MOBILE: ChipFeatures = ChipFeatures::MOBILE;
const I9XX: ChipFeatures = ChipFeatures::I9XX;
const I965: ChipFeatures = ChipFeatures::I9XX.union(ChipFeatures::I965G);
const I965_MOBILE: ChipFeatures = I965.union(ChipFeatures::MOBILE);
const G33_CHIP: ChipFeatures = ChipFeatures::I9XX.union(ChipFeatures::G33);

static DEVICES: &[DeviceInfo] = &[
    info(device_ids::I830_CGC, "830M", Generation::Legacy, MOBILE),
    info(device_ids::I845G_IG, "845G", Generation::Legacy, NONE),
    info(device_ids::I855GM_IG, "855GM", Generation::Legacy, MOBILE),
    info(device_ids::I865_IG, "865G", Generation::Legacy, NONE),
    info(device_ids::I915G, "915G", Generation::I9xx, I9XX),
    info(device_ids::I915GM, "915GM", Generation::I9xx, I9XX.union(MOBILE)),
    info(device_ids::I945G, "945G", Generation::I9xx, I9XX),
    info(device_ids::I945GM, "945GM", Generation::I9xx, I9XX.union(MOBILE)),
    info(device_ids::I945GME, "945GME", Generation::I9xx, I9XX.union(MOBILE)),
    info(device_ids::I946GZ, "946GZ", Generation::I9xx, I965),
    info(device_ids::G35, "G35", Generation::I9xx, I965),
    info(device_ids::Q965, "Q965", Generation::I9xx, I965),
    info(device_ids::I965G, "965G", Generation::I9xx, I965),
    info(device_ids::I965GM, "965GM", Generation::I9xx, I965_MOBILE),
    info(device_ids::I965GME, "965GME", Generation::I9xx, I965_MOBILE),
    info(device_ids::GM45, "GM45", Generation::I9xx, I965_MOBILE),
    info(device_ids::IGD_E, "IGD-E", Generation::I9xx, I965),
    info(device_ids::Q45, "Q45", Generation::I9xx, I965),
    info(device_ids::G45, "G45", Generation::I9xx, I965),
    info(device_ids::G41, "G41", Generation::I9xx, I965),
    info(device_ids::G33, "G33", Generation::G33, G33_CHIP),
    info(device_ids::Q35, "Q35", Generation::G33, G33_CHIP),
    info(device_ids::Q33, "Q33", Generation::G33, G33_CHIP),
];

/// Who the device is. Drives every hardware-variant decision.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdentity {
    vendor: u16,
    device: u16,
    name: &'static str,
    generation: Generation,
    features: ChipFeatures,
}

impl DeviceIdentity {
    /// Look a PCI function up in the device table.
    ///
    /// Returns `None` for anything that is not a supported Intel IGD.
    pub fn from_pci(vendor: u16, device: u16) -> Option<Self> {
        if vendor != INTEL_VENDOR_ID {
            return None;
        }
        DEVICES.iter().find(|d| d.device == device).map(|d| Self {
            vendor,
            device,
            name: d.name,
            generation: d.generation,
            features: d.features,
        })
    }

    #[inline]
    pub const fn vendor(&self) -> u16 {
        self.vendor
    }

    #[inline]
    pub const fn device(&self) -> u16 {
        self.device
    }

    /// Marketing name of the chipset.
    #[inline]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub const fn generation(&self) -> Generation {
        self.generation
    }

    #[inline]
    pub const fn features(&self) -> ChipFeatures {
        self.features
    }

    /// 915 or later, G33 class included.
    #[inline]
    pub const fn is_i9xx(&self) -> bool {
        self.features.contains(ChipFeatures::I9XX)
    }

    /// Whether the hardware cursor must live in physically addressed memory.
    ///
    /// Mobile and 9-series parts need it, except the 965 and G33 classes
    /// which scan the cursor out through the GTT.
    pub const fn cursor_needs_physical(&self) -> bool {
        if self
            .features
            .intersects(ChipFeatures::I965G.union(ChipFeatures::G33))
        {
            return false;
        }
        self.features
            .intersects(ChipFeatures::MOBILE.union(ChipFeatures::I9XX))
    }
}

impl fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DeviceIdentity({} {:04x}:{:04x}, {:?})",
            self.name, self.vendor, self.device, self.generation
        )
    }
}
