//! Hardware Status Page
//!
//! The status page is one page of memory the GPU writes progress and
//! completion data into. Where that page lives depends on the chipset:
//!
//! - **Host backed** (everything but G33 class): a DMA-coherent page from
//!   system memory; `HWS_PGA` holds its bus address.
//! - **Device backed** (G33 class): a page carved from stolen memory and
//!   mapped through the aperture; `HWS_PGA` holds its offset into the
//!   aperture.
//!
//! The strategy is picked once per device by [`select`] and only reached
//! through the [`StatusPageStrategy`] trait afterwards.
//!
//! # Safety Considerations
//! - The page is cleared before the device is told where it is
//! - Teardown always finishes by pointing `HWS_PGA` at the disabled
//!   sentinel, so the device stops referencing memory about to be freed

use alloc::boxed::Box;
use core::fmt;

use super::identity::{DeviceIdentity, Generation};
use crate::hal::mmio::{self, regs, HWS_PGA_DISABLED};
use crate::hal::{DmaBuffer, IoMapping, Mmio, Platform};
use crate::mm::address::{PhysAddr, VirtAddr, PAGE_SIZE};
use crate::mm::region::{MemoryRegion, RegionAllocator};

/// Highest bus address `HWS_PGA` can point at.
const HWS_MAX_BUS_ADDR: u64 = 0xffff_ffff;

/// Error type for status page setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusPageError {
    /// No memory for the page, either DMA or stolen.
    OutOfMemory,
    /// The carved page could not be mapped.
    MappingFailed,
}

impl fmt::Display for StatusPageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "can not allocate hardware status page"),
            Self::MappingFailed => write!(f, "can not map hardware status page"),
        }
    }
}

/// Which kind of memory backs the status page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusPageKind {
    HostBacked,
    DeviceBacked,
}

/// Construction and destruction of the status page.
pub trait StatusPageStrategy: fmt::Debug + Send {
    fn kind(&self) -> StatusPageKind;

    /// Allocate, clear and program the page.
    ///
    /// On error nothing stays allocated or carved.
    fn bring_up(
        &mut self,
        platform: &mut dyn Platform,
        mmio: &Mmio,
        regions: &mut RegionAllocator,
        aperture_base: PhysAddr,
    ) -> Result<(), StatusPageError>;

    /// Release whatever `bring_up` acquired and disable the page.
    ///
    /// Safe to call when nothing is held.
    fn tear_down(
        &mut self,
        platform: &mut dyn Platform,
        mmio: Option<&Mmio>,
        regions: Option<&mut RegionAllocator>,
    );

    /// CPU view of the live page.
    fn vaddr(&self) -> Option<VirtAddr>;

    /// Whether a page is currently held.
    fn is_live(&self) -> bool {
        self.vaddr().is_some()
    }
}

/// Pick the strategy for this chipset.
pub fn select(identity: &DeviceIdentity) -> Box<dyn StatusPageStrategy> {
    match identity.generation() {
        Generation::G33 => Box::new(DeviceBacked::default()),
        Generation::Legacy | Generation::I9xx => Box::new(HostBacked::default()),
    }
}

fn disable(mmio: Option<&Mmio>) {
    match mmio {
        Some(mmio) => mmio.write32(regs::HWS_PGA, HWS_PGA_DISABLED),
        None => log::warn!("[HWS] registers unmapped, cannot disable status page"),
    }
}

/// Status page in DMA-coherent system memory.
#[derive(Debug, Default)]
pub struct HostBacked {
    dma: Option<DmaBuffer>,
}

impl StatusPageStrategy for HostBacked {
    fn kind(&self) -> StatusPageKind {
        StatusPageKind::HostBacked
    }

    fn bring_up(
        &mut self,
        platform: &mut dyn Platform,
        mmio: &Mmio,
        _regions: &mut RegionAllocator,
        _aperture_base: PhysAddr,
    ) -> Result<(), StatusPageError> {
        let Some(dma) = platform.alloc_coherent(PAGE_SIZE, PAGE_SIZE, HWS_MAX_BUS_ADDR) else {
            log::error!("[HWS] Can not allocate hardware status page");
            return Err(StatusPageError::OutOfMemory);
        };

        let Some(bus) = dma.bus_addr().to_reg32() else {
            log::error!("[HWS] status page at {} is above 4 GiB", dma.bus_addr());
            if let Err(err) = platform.free_coherent(dma) {
                log::warn!("[HWS] can not free rejected page: {}", err);
            }
            return Err(StatusPageError::OutOfMemory);
        };

        // SAFETY: DmaBuffer guarantees vaddr is valid for size bytes
        unsafe { mmio::clear_io(dma.vaddr(), PAGE_SIZE) };
        mmio.write32(regs::HWS_PGA, bus);

        log::debug!("[HWS] Enabled hardware status page at bus {:#010x}", bus);
        self.dma = Some(dma);
        Ok(())
    }

    fn tear_down(
        &mut self,
        platform: &mut dyn Platform,
        mmio: Option<&Mmio>,
        _regions: Option<&mut RegionAllocator>,
    ) {
        if let Some(dma) = self.dma.take() {
            if let Err(err) = platform.free_coherent(dma) {
                log::warn!("[HWS] can not free hardware status page: {}", err);
            }
        }
        disable(mmio);
    }

    fn vaddr(&self) -> Option<VirtAddr> {
        self.dma.as_ref().map(DmaBuffer::vaddr)
    }
}

/// Status page carved from stolen memory and mapped through the aperture.
#[derive(Debug, Default)]
pub struct DeviceBacked {
    region: Option<MemoryRegion>,
    mapping: Option<IoMapping>,
}

impl DeviceBacked {
    /// Aperture offset programmed into `HWS_PGA`, while live.
    pub fn aperture_offset(&self) -> Option<u64> {
        self.region.as_ref().map(MemoryRegion::base_offset)
    }
}

impl StatusPageStrategy for DeviceBacked {
    fn kind(&self) -> StatusPageKind {
        StatusPageKind::DeviceBacked
    }

    fn bring_up(
        &mut self,
        platform: &mut dyn Platform,
        mmio: &Mmio,
        regions: &mut RegionAllocator,
        aperture_base: PhysAddr,
    ) -> Result<(), StatusPageError> {
        let page = PAGE_SIZE as u64;
        let region = match regions.carve(page, page) {
            Ok(region) => region,
            Err(err) => {
                log::error!("[HWS] No free vram available, aborting ({})", err);
                return Err(StatusPageError::OutOfMemory);
            }
        };

        let offset = region.base_offset();
        let Ok(hws_offset) = u32::try_from(offset) else {
            regions.release(region);
            return Err(StatusPageError::OutOfMemory);
        };

        let mapping = platform
            .map(aperture_base.add(offset), PAGE_SIZE)
            .filter(|m| !m.virt().is_null());
        let Some(mapping) = mapping else {
            log::error!("[HWS] can not ioremap virtual addr for G33 hw status page");
            regions.release(region);
            return Err(StatusPageError::MappingFailed);
        };

        // SAFETY: IoMapping guarantees virt is valid for len bytes
        unsafe { mmio::clear_io(mapping.virt(), PAGE_SIZE) };
        mmio.write32(regs::HWS_PGA, hws_offset);

        log::debug!("[HWS] Enabled hardware status page at aperture offset {:#x}", offset);
        self.region = Some(region);
        self.mapping = Some(mapping);
        Ok(())
    }

    fn tear_down(
        &mut self,
        platform: &mut dyn Platform,
        mmio: Option<&Mmio>,
        regions: Option<&mut RegionAllocator>,
    ) {
        if let Some(mapping) = self.mapping.take() {
            if let Err(err) = platform.unmap(mapping) {
                log::warn!("[HWS] can not unmap hardware status page: {}", err);
            }
        }
        if let Some(region) = self.region.take() {
            match regions {
                Some(regions) => regions.release(region),
                None => log::warn!("[HWS] stolen allocator already gone, dropping carve"),
            }
        }
        disable(mmio);
    }

    fn vaddr(&self) -> Option<VirtAddr> {
        self.mapping.as_ref().map(IoMapping::virt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::i915::identity::{device_ids, INTEL_VENDOR_ID};
    use crate::drivers::i915::probe::INTEL_855_GMCH_GMS_STOLEN_8M;
    use crate::hal::mock::{Event, MockPlatform};
    use crate::hal::IoMapper;

    const STOLEN: u64 = 16 * PAGE_SIZE as u64;

    fn registers(platform: &mut MockPlatform) -> Mmio {
        let base = platform.mmio_bar();
        Mmio::new(platform.map(base, platform.mmio_len()).unwrap())
    }

    #[test]
    fn test_selection_by_generation() {
        let g33 = DeviceIdentity::from_pci(INTEL_VENDOR_ID, device_ids::G33).unwrap();
        let i945 = DeviceIdentity::from_pci(INTEL_VENDOR_ID, device_ids::I945G).unwrap();
        let i855 = DeviceIdentity::from_pci(INTEL_VENDOR_ID, device_ids::I855GM_IG).unwrap();
        assert_eq!(select(&g33).kind(), StatusPageKind::DeviceBacked);
        assert_eq!(select(&i945).kind(), StatusPageKind::HostBacked);
        assert_eq!(select(&i855).kind(), StatusPageKind::HostBacked);
    }

    #[test]
    fn test_host_backed_lifecycle() {
        let mut platform = MockPlatform::i9xx(INTEL_855_GMCH_GMS_STOLEN_8M);
        let mmio = registers(&mut platform);
        let mut regions = RegionAllocator::new(STOLEN);
        let mut page = HostBacked::default();

        page.bring_up(&mut platform, &mmio, &mut regions, PhysAddr::new(0))
            .unwrap();
        let bus = platform.last_dma_bus().unwrap();
        assert_eq!(platform.reg(regs::HWS_PGA), bus as u32);
        assert!(platform.dma_page_is_zeroed(page.vaddr().unwrap()));
        assert_eq!(regions.outstanding(), 0);

        page.tear_down(&mut platform, Some(&mmio), Some(&mut regions));
        assert!(!page.is_live());
        assert_eq!(platform.dma_used(), 0);
        assert_eq!(platform.reg(regs::HWS_PGA), HWS_PGA_DISABLED);
    }

    #[test]
    fn test_host_backed_out_of_memory() {
        let mut platform = MockPlatform::i9xx(INTEL_855_GMCH_GMS_STOLEN_8M);
        platform.fail.dma = true;
        let mmio = registers(&mut platform);
        let mut regions = RegionAllocator::new(STOLEN);
        let mut page = HostBacked::default();

        assert_eq!(
            page.bring_up(&mut platform, &mmio, &mut regions, PhysAddr::new(0)),
            Err(StatusPageError::OutOfMemory)
        );
        assert!(!page.is_live());
        assert_eq!(platform.reg(regs::HWS_PGA), 0);
    }

    #[test]
    fn test_device_backed_lifecycle() {
        let mut platform = MockPlatform::g33(INTEL_855_GMCH_GMS_STOLEN_8M);
        let mmio = registers(&mut platform);
        let aperture = platform.aperture_bar();
        let mut regions = RegionAllocator::new(STOLEN);
        let mut page = DeviceBacked::default();

        page.bring_up(&mut platform, &mmio, &mut regions, aperture)
            .unwrap();
        assert_eq!(page.aperture_offset(), Some(0));
        assert_eq!(regions.outstanding(), 1);
        assert_eq!(platform.reg(regs::HWS_PGA), 0);
        assert!(platform
            .events
            .contains(&Event::Map { phys: aperture.as_u64(), len: PAGE_SIZE }));
        assert!(platform.mapping_is_zeroed(aperture));

        page.tear_down(&mut platform, Some(&mmio), Some(&mut regions));
        assert!(!page.is_live());
        assert_eq!(regions.outstanding(), 0);
        assert_eq!(platform.live_mappings(), 1);
        assert_eq!(platform.reg(regs::HWS_PGA), HWS_PGA_DISABLED);
    }

    #[test]
    fn test_device_backed_programs_carve_offset() {
        let mut platform = MockPlatform::g33(INTEL_855_GMCH_GMS_STOLEN_8M);
        let mmio = registers(&mut platform);
        let aperture = platform.aperture_bar();
        let mut regions = RegionAllocator::new(STOLEN);
        let first = regions.carve(PAGE_SIZE as u64, PAGE_SIZE as u64).unwrap();
        let mut page = DeviceBacked::default();

        page.bring_up(&mut platform, &mmio, &mut regions, aperture)
            .unwrap();
        assert_eq!(page.aperture_offset(), Some(PAGE_SIZE as u64));
        assert_eq!(platform.reg(regs::HWS_PGA), PAGE_SIZE as u32);
        assert!(platform.events.contains(&Event::Map {
            phys: aperture.as_u64() + PAGE_SIZE as u64,
            len: PAGE_SIZE,
        }));

        page.tear_down(&mut platform, Some(&mmio), Some(&mut regions));
        regions.release(first);
        assert_eq!(regions.outstanding(), 0);
        assert_eq!(regions.free_bytes(), STOLEN);
    }

    #[test]
    fn test_device_backed_map_failure_returns_carve() {
        let mut platform = MockPlatform::g33(INTEL_855_GMCH_GMS_STOLEN_8M);
        let mmio = registers(&mut platform);
        let aperture = platform.aperture_bar();
        platform.fail.map_aperture = true;
        let mut regions = RegionAllocator::new(PAGE_SIZE as u64);
        let mut page = DeviceBacked::default();

        assert_eq!(
            page.bring_up(&mut platform, &mmio, &mut regions, aperture),
            Err(StatusPageError::MappingFailed)
        );
        assert_eq!(regions.outstanding(), 0);

        // The only page of stolen space is available again.
        let again = regions.carve(PAGE_SIZE as u64, PAGE_SIZE as u64).unwrap();
        assert_eq!(again.base_offset(), 0);
    }

    #[test]
    fn test_device_backed_no_stolen_space() {
        let mut platform = MockPlatform::g33(INTEL_855_GMCH_GMS_STOLEN_8M);
        let mmio = registers(&mut platform);
        let aperture = platform.aperture_bar();
        let mut regions = RegionAllocator::new(0);
        let mut page = DeviceBacked::default();

        assert_eq!(
            page.bring_up(&mut platform, &mmio, &mut regions, aperture),
            Err(StatusPageError::OutOfMemory)
        );
        assert_eq!(platform.live_mappings(), 1);
    }

    #[test]
    fn test_tear_down_when_idle_only_disables() {
        let mut platform = MockPlatform::g33(INTEL_855_GMCH_GMS_STOLEN_8M);
        let mmio = registers(&mut platform);
        let mut page = DeviceBacked::default();
        page.tear_down(&mut platform, Some(&mmio), None);
        assert_eq!(platform.reg(regs::HWS_PGA), HWS_PGA_DISABLED);
        assert_eq!(platform.live_mappings(), 1);
    }
}
