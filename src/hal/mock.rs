//! In-memory platform for unit tests.
//!
//! Every mapping is backed by a real heap buffer and DMA comes from a
//! [`CoherentPool`], so register writes and page clears can be checked
//! byte for byte. Collaborator calls are appended to `events` in order.

use super::{
    CommandEngine, ConfigSpace, DisplayAux, DmaAllocator, DmaBuffer, HalError, InterruptLine,
    IoMapper, IoMapping, Resources, Workqueue,
};
use crate::drivers::i915::probe::INTEL_GMCH_CTRL;
use crate::mm::address::{PhysAddr, VirtAddr, MIB, PAGE_SIZE};
use crate::mm::coherent::CoherentPool;

/// Stolen base reported at config offset 0x5C.
pub const MOCK_STOLEN_BASE: u32 = 0x7f80_0000;
/// Bus address of the DMA arena.
pub const MOCK_DMA_BUS: u64 = 0x1000_0000;

const MMIO_BASE: u64 = 0xfeb0_0000;
const MMIO_LEN: u64 = 0x8_0000;
const APERTURE_BASE: u64 = 0xd000_0000;
const DMA_ARENA: usize = 16 * PAGE_SIZE;
const POISON: u64 = 0xa5a5_a5a5_a5a5_a5a5;

/// A collaborator call, as observed by the mock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Map { phys: u64, len: usize },
    Unmap { phys: u64 },
    DmaAlloc { bus: u64 },
    DmaFree { bus: u64 },
    GemInit { start: u64, end: u64 },
    RingInit,
    RingCleanup,
    LastClose,
    WorkqueueCreate(&'static str),
    WorkqueueDestroy,
    BiosInit,
    ModesetInit,
    InitialConfig,
    ModesetCleanup,
    IrqInstall,
    IrqUninstall,
}

/// Failure injection switches.
#[derive(Debug, Default, Clone, Copy)]
pub struct Failures {
    pub map_mmio: bool,
    pub map_aperture: bool,
    pub dma: bool,
    pub ring: bool,
    pub workqueue: bool,
    pub bios: bool,
    pub modeset: bool,
    pub irq: bool,
    pub ring_cleanup: bool,
    pub irq_uninstall: bool,
}

struct MapRecord {
    phys: PhysAddr,
    virt: VirtAddr,
    len: usize,
    buffer: usize,
    live: bool,
}

#[repr(C, align(4096))]
struct DmaArena([u8; DMA_ARENA]);

pub struct MockPlatform {
    pub gmch_ctrl: Option<u16>,
    pub stolen_base: u32,
    pub bars: [(PhysAddr, u64); 3],
    pub fail: Failures,
    pub events: Vec<Event>,
    mmio_bar_index: usize,
    aperture_bar_index: usize,
    /// Never freed, so tests can inspect memory after unmap.
    buffers: Vec<Vec<u64>>,
    maps: Vec<MapRecord>,
    mmio_buffer: Option<usize>,
    dma: CoherentPool,
    _arena: Box<DmaArena>,
    next_wq: u32,
}

impl MockPlatform {
    fn with_bars(
        gmch_ctrl: u16,
        bars: [(PhysAddr, u64); 3],
        mmio_bar_index: usize,
        aperture_bar_index: usize,
    ) -> Self {
        let mut arena = Box::new(DmaArena([0xa5; DMA_ARENA]));
        let base = VirtAddr::from_ptr(arena.0.as_mut_ptr());
        // SAFETY: the arena is boxed, owned by the mock and outlives the pool
        let dma = unsafe { CoherentPool::new(base, PhysAddr::new(MOCK_DMA_BUS), DMA_ARENA) };
        Self {
            gmch_ctrl: Some(gmch_ctrl),
            stolen_base: MOCK_STOLEN_BASE,
            bars,
            fail: Failures::default(),
            events: Vec::new(),
            mmio_bar_index,
            aperture_bar_index,
            buffers: Vec::new(),
            maps: Vec::new(),
            mmio_buffer: None,
            dma,
            _arena: arena,
            next_wq: 0,
        }
    }

    /// 9-series layout: MMIO in BAR 0, 256 MiB aperture in BAR 2.
    pub fn i9xx(gmch_ctrl: u16) -> Self {
        Self::with_bars(
            gmch_ctrl,
            [
                (PhysAddr::new(MMIO_BASE), MMIO_LEN),
                (PhysAddr::new(0), 0),
                (PhysAddr::new(APERTURE_BASE), 256 * MIB),
            ],
            0,
            2,
        )
    }

    /// G33 parts share the 9-series layout.
    pub fn g33(gmch_ctrl: u16) -> Self {
        Self::i9xx(gmch_ctrl)
    }

    /// 8xx layout: framebuffer in BAR 0, MMIO in BAR 1.
    pub fn legacy(gmch_ctrl: u16) -> Self {
        Self::with_bars(
            gmch_ctrl,
            [
                (PhysAddr::new(0xe000_0000), 128 * MIB),
                (PhysAddr::new(MMIO_BASE), MMIO_LEN),
                (PhysAddr::new(0), 0),
            ],
            1,
            0,
        )
    }

    pub fn mmio_bar(&self) -> PhysAddr {
        self.bars[self.mmio_bar_index].0
    }

    pub fn mmio_len(&self) -> usize {
        self.bars[self.mmio_bar_index].1 as usize
    }

    pub fn aperture_bar(&self) -> PhysAddr {
        self.bars[self.aperture_bar_index].0
    }

    /// Current value of an MMIO register, mapped or not.
    pub fn reg(&self, offset: u32) -> u32 {
        let Some(idx) = self.mmio_buffer else {
            return 0;
        };
        let bytes = self.buffers[idx].as_ptr() as *const u8;
        // SAFETY: offsets used by tests are inside the MMIO window
        unsafe { core::ptr::read_volatile(bytes.add(offset as usize) as *const u32) }
    }

    /// Number of mappings not yet unmapped.
    pub fn live_mappings(&self) -> usize {
        self.maps.iter().filter(|m| m.live).count()
    }

    /// Whether the most recent mapping of `phys` reads as all zeroes.
    pub fn mapping_is_zeroed(&self, phys: PhysAddr) -> bool {
        self.maps
            .iter()
            .rev()
            .find(|m| m.phys == phys)
            .map(|m| {
                let words = &self.buffers[m.buffer];
                words.iter().take(m.len / 8).all(|&w| w == 0)
            })
            .unwrap_or(false)
    }

    /// Whether the page at `vaddr` inside the DMA arena reads as zeroes.
    pub fn dma_page_is_zeroed(&self, vaddr: VirtAddr) -> bool {
        // SAFETY: vaddr came from the arena, which holds at least a page there
        let page = unsafe { core::slice::from_raw_parts(vaddr.as_ptr::<u8>(), PAGE_SIZE) };
        page.iter().all(|&b| b == 0)
    }

    pub fn dma_used(&self) -> usize {
        self.dma.used()
    }

    pub fn last_dma_bus(&self) -> Option<u64> {
        self.events.iter().rev().find_map(|e| match e {
            Event::DmaAlloc { bus } => Some(*bus),
            _ => None,
        })
    }

    pub fn count(&self, event: Event) -> usize {
        self.events.iter().filter(|&&e| e == event).count()
    }

    /// Index of the first occurrence of `event`.
    pub fn position(&self, event: Event) -> Option<usize> {
        self.events.iter().position(|&e| e == event)
    }
}

impl ConfigSpace for MockPlatform {
    fn bridge_read16(&mut self, offset: u16) -> Option<u16> {
        let ctrl = self.gmch_ctrl?;
        Some(if offset == INTEL_GMCH_CTRL { ctrl } else { 0 })
    }

    fn device_read32(&mut self, offset: u16) -> u32 {
        if offset == 0x5c {
            self.stolen_base
        } else {
            0
        }
    }
}

impl Resources for MockPlatform {
    fn resource_start(&self, index: usize) -> PhysAddr {
        self.bars.get(index).map_or(PhysAddr::new(0), |b| b.0)
    }

    fn resource_len(&self, index: usize) -> u64 {
        self.bars.get(index).map_or(0, |b| b.1)
    }
}

// SAFETY: every mapping points into a buffer owned by the mock that is never
// freed while the mock lives.
unsafe impl IoMapper for MockPlatform {
    fn map(&mut self, phys: PhysAddr, len: usize) -> Option<IoMapping> {
        let is_mmio = phys == self.mmio_bar();
        if (is_mmio && self.fail.map_mmio) || (!is_mmio && self.fail.map_aperture) {
            return None;
        }

        let fill = if is_mmio { 0 } else { POISON };
        let mut buffer = vec![fill; len.div_ceil(8)];
        let virt = VirtAddr::from_ptr(buffer.as_mut_ptr());
        self.buffers.push(buffer);
        let idx = self.buffers.len() - 1;
        if is_mmio {
            self.mmio_buffer = Some(idx);
        }

        self.maps.push(MapRecord {
            phys,
            virt,
            len,
            buffer: idx,
            live: true,
        });
        self.events.push(Event::Map {
            phys: phys.as_u64(),
            len,
        });
        // SAFETY: the buffer is len bytes or more and outlives the mapping
        Some(unsafe { IoMapping::new(phys, virt, len) })
    }

    fn unmap(&mut self, mapping: IoMapping) -> Result<(), HalError> {
        let record = self
            .maps
            .iter_mut()
            .find(|m| m.live && m.virt == mapping.virt())
            .ok_or(HalError::Invalid)?;
        record.live = false;
        self.events.push(Event::Unmap {
            phys: mapping.phys().as_u64(),
        });
        Ok(())
    }
}

// SAFETY: delegates to the CoherentPool over the mock's arena
unsafe impl DmaAllocator for MockPlatform {
    fn alloc_coherent(&mut self, size: usize, align: usize, max_addr: u64) -> Option<DmaBuffer> {
        if self.fail.dma {
            return None;
        }
        let buffer = self.dma.alloc_coherent(size, align, max_addr)?;
        self.events.push(Event::DmaAlloc {
            bus: buffer.bus_addr().as_u64(),
        });
        Some(buffer)
    }

    fn free_coherent(&mut self, buffer: DmaBuffer) -> Result<(), HalError> {
        let bus = buffer.bus_addr().as_u64();
        self.dma.free_coherent(buffer)?;
        self.events.push(Event::DmaFree { bus });
        Ok(())
    }
}

impl CommandEngine for MockPlatform {
    fn init_gem(&mut self, start: u64, end: u64) {
        self.events.push(Event::GemInit { start, end });
    }

    fn init_ringbuffer(&mut self) -> Result<(), HalError> {
        if self.fail.ring {
            return Err(HalError::NoMemory);
        }
        self.events.push(Event::RingInit);
        Ok(())
    }

    fn cleanup_ringbuffer(&mut self) -> Result<(), HalError> {
        if self.fail.ring_cleanup {
            return Err(HalError::Io);
        }
        self.events.push(Event::RingCleanup);
        Ok(())
    }

    fn lastclose(&mut self) -> Result<(), HalError> {
        self.events.push(Event::LastClose);
        Ok(())
    }
}

impl DisplayAux for MockPlatform {
    fn create_workqueue(&mut self, name: &'static str) -> Option<Workqueue> {
        if self.fail.workqueue {
            return None;
        }
        self.next_wq += 1;
        self.events.push(Event::WorkqueueCreate(name));
        Some(Workqueue(self.next_wq))
    }

    fn destroy_workqueue(&mut self, _wq: Workqueue) -> Result<(), HalError> {
        self.events.push(Event::WorkqueueDestroy);
        Ok(())
    }

    fn init_bios(&mut self) -> Result<(), HalError> {
        if self.fail.bios {
            return Err(HalError::NoDevice);
        }
        self.events.push(Event::BiosInit);
        Ok(())
    }

    fn modeset_init(&mut self) -> Result<(), HalError> {
        if self.fail.modeset {
            return Err(HalError::Io);
        }
        self.events.push(Event::ModesetInit);
        Ok(())
    }

    fn initial_config(&mut self, _can_grow: bool) {
        self.events.push(Event::InitialConfig);
    }

    fn modeset_cleanup(&mut self) -> Result<(), HalError> {
        self.events.push(Event::ModesetCleanup);
        Ok(())
    }
}

impl InterruptLine for MockPlatform {
    fn irq_install(&mut self) -> Result<(), HalError> {
        if self.fail.irq {
            return Err(HalError::Busy);
        }
        self.events.push(Event::IrqInstall);
        Ok(())
    }

    fn irq_uninstall(&mut self) -> Result<(), HalError> {
        if self.fail.irq_uninstall {
            return Err(HalError::Busy);
        }
        self.events.push(Event::IrqUninstall);
        Ok(())
    }
}
