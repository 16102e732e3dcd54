//! Platform Service Boundary
//!
//! The driver core never touches the bus, the page tables or the DMA
//! allocator directly. Everything it needs from the platform is expressed
//! as a small trait here, and the embedding kernel implements them:
//!
//! | Trait            | Provides                                            |
//! |------------------|-----------------------------------------------------|
//! | [`ConfigSpace`]  | host bridge and device configuration reads          |
//! | [`Resources`]    | BAR start/length facts reported by the device       |
//! | [`IoMapper`]     | `map(phys, len)` / `unmap(handle)`                  |
//! | [`DmaAllocator`] | `alloc_coherent` / `free_coherent`                  |
//! | [`CommandEngine`]| GEM range hand-off and ring buffer construction     |
//! | [`DisplayAux`]   | workqueue, VBIOS tables, mode setting               |
//! | [`InterruptLine`]| interrupt handler install/uninstall                 |
//!
//! [`Platform`] bundles all of them so the sequencers can take a single
//! `&mut dyn Platform`.
//!
//! Release hooks report failure like the setup hooks do. Teardown logs such
//! an error and moves on to the next stage.
//!
//! # Safety Considerations
//! [`IoMapper`] and [`DmaAllocator`] are `unsafe` traits: the core performs
//! volatile reads and writes through the addresses they return, so a
//! wrong address there is memory corruption, not a logic error.

pub mod mmio;

#[cfg(test)]
pub mod mock;

use core::fmt;

use crate::mm::address::{PhysAddr, VirtAddr};

pub use mmio::Mmio;

/// Error reported by an external collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError {
    /// The device or one of its tables is absent.
    NoDevice,
    /// The collaborator could not allocate.
    NoMemory,
    /// The resource is already claimed.
    Busy,
    /// Hardware did not respond as expected.
    Io,
    /// Bad argument.
    Invalid,
}

impl HalError {
    /// The negative errno the kernel would report for this error.
    pub const fn errno(self) -> i32 {
        match self {
            Self::NoDevice => -19,
            Self::NoMemory => -12,
            Self::Busy => -16,
            Self::Io => -5,
            Self::Invalid => -22,
        }
    }
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoDevice => write!(f, "no such device"),
            Self::NoMemory => write!(f, "out of memory"),
            Self::Busy => write!(f, "resource busy"),
            Self::Io => write!(f, "I/O error"),
            Self::Invalid => write!(f, "invalid argument"),
        }
    }
}

/// A live CPU mapping of a physical range.
///
/// Returned by [`IoMapper::map`] and consumed by [`IoMapper::unmap`]; it is
/// not `Clone`, so a mapping can be torn down only once.
#[derive(Debug, PartialEq, Eq)]
pub struct IoMapping {
    phys: PhysAddr,
    virt: VirtAddr,
    len: usize,
}

impl IoMapping {
    /// Wrap a mapping produced by the platform.
    ///
    /// # Safety
    /// `virt` must be valid for volatile reads and writes of `len` bytes
    /// until the mapping is passed back to [`IoMapper::unmap`].
    pub const unsafe fn new(phys: PhysAddr, virt: VirtAddr, len: usize) -> Self {
        Self { phys, virt, len }
    }

    /// Physical start of the mapped range.
    #[inline]
    pub const fn phys(&self) -> PhysAddr {
        self.phys
    }

    /// CPU address of the mapped range.
    #[inline]
    pub const fn virt(&self) -> VirtAddr {
        self.virt
    }

    /// Length of the mapped range in bytes.
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A DMA-coherent allocation: CPU address plus the address the device uses.
#[derive(Debug, PartialEq, Eq)]
pub struct DmaBuffer {
    vaddr: VirtAddr,
    bus_addr: PhysAddr,
    size: usize,
    align: usize,
}

impl DmaBuffer {
    /// Wrap an allocation produced by the platform.
    ///
    /// # Safety
    /// `vaddr` must be valid for reads and writes of `size` bytes until the
    /// buffer is passed back to [`DmaAllocator::free_coherent`], and the
    /// device must see the same memory at `bus_addr`.
    pub const unsafe fn new(vaddr: VirtAddr, bus_addr: PhysAddr, size: usize, align: usize) -> Self {
        Self {
            vaddr,
            bus_addr,
            size,
            align,
        }
    }

    #[inline]
    pub const fn vaddr(&self) -> VirtAddr {
        self.vaddr
    }

    #[inline]
    pub const fn bus_addr(&self) -> PhysAddr {
        self.bus_addr
    }

    #[inline]
    pub const fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub const fn align(&self) -> usize {
        self.align
    }
}

/// Opaque token for a driver workqueue.
#[derive(Debug, PartialEq, Eq)]
pub struct Workqueue(pub u32);

/// Configuration space access.
pub trait ConfigSpace {
    /// Read a 16-bit register from the host bridge (bus 0, device 0,
    /// function 0). `None` when the bridge cannot be found.
    fn bridge_read16(&mut self, offset: u16) -> Option<u16>;

    /// Read a 32-bit register from the graphics device's own config space.
    fn device_read32(&mut self, offset: u16) -> u32;
}

/// BAR facts reported by the device.
pub trait Resources {
    /// Start address of BAR `index`, zero when unassigned.
    fn resource_start(&self, index: usize) -> PhysAddr;

    /// Length of BAR `index` in bytes, zero when unassigned.
    fn resource_len(&self, index: usize) -> u64;
}

/// Physical-to-virtual mapping service.
///
/// # Safety
/// A `Some` returned from [`map`](IoMapper::map) must describe memory that
/// stays valid for volatile access until it is unmapped.
pub unsafe trait IoMapper {
    /// Map `len` bytes at `phys`. `None` when no mapping could be made.
    fn map(&mut self, phys: PhysAddr, len: usize) -> Option<IoMapping>;

    /// Tear a mapping down. The handle is gone either way.
    fn unmap(&mut self, mapping: IoMapping) -> Result<(), HalError>;
}

/// DMA-coherent memory service.
///
/// # Safety
/// Buffers returned from [`alloc_coherent`](DmaAllocator::alloc_coherent)
/// must satisfy the contract of [`DmaBuffer::new`].
pub unsafe trait DmaAllocator {
    /// Allocate `size` bytes aligned to `align` whose bus address range ends
    /// at or below `max_addr`. `None` on exhaustion.
    fn alloc_coherent(&mut self, size: usize, align: usize, max_addr: u64) -> Option<DmaBuffer>;

    /// Free a buffer from [`alloc_coherent`](DmaAllocator::alloc_coherent).
    fn free_coherent(&mut self, buffer: DmaBuffer) -> Result<(), HalError>;
}

/// The command-submission engine, seen only through its lifecycle hooks.
pub trait CommandEngine {
    /// Hand `[start, end)` of the aperture to the GEM object manager.
    fn init_gem(&mut self, start: u64, end: u64);

    /// Build the ring buffer.
    fn init_ringbuffer(&mut self) -> Result<(), HalError>;

    /// Destroy the ring buffer.
    fn cleanup_ringbuffer(&mut self) -> Result<(), HalError>;

    /// Release everything handed over by [`init_gem`](CommandEngine::init_gem).
    fn lastclose(&mut self) -> Result<(), HalError>;
}

/// Display and auxiliary subsystems brought up after the status page.
pub trait DisplayAux {
    fn create_workqueue(&mut self, name: &'static str) -> Option<Workqueue>;

    fn destroy_workqueue(&mut self, wq: Workqueue) -> Result<(), HalError>;

    /// Locate and parse the video BIOS tables.
    fn init_bios(&mut self) -> Result<(), HalError>;

    /// Enumerate outputs and set up the mode-setting objects.
    fn modeset_init(&mut self) -> Result<(), HalError>;

    /// Pick the initial output configuration.
    fn initial_config(&mut self, can_grow: bool);

    fn modeset_cleanup(&mut self) -> Result<(), HalError>;
}

/// Interrupt delivery.
pub trait InterruptLine {
    fn irq_install(&mut self) -> Result<(), HalError>;

    fn irq_uninstall(&mut self) -> Result<(), HalError>;
}

/// Every service the bring-up and teardown sequencers call.
pub trait Platform:
    ConfigSpace + Resources + IoMapper + DmaAllocator + CommandEngine + DisplayAux + InterruptLine
{
}

impl<T> Platform for T where
    T: ConfigSpace
        + Resources
        + IoMapper
        + DmaAllocator
        + CommandEngine
        + DisplayAux
        + InterruptLine
{
}
