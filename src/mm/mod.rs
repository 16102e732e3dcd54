//! Memory management for the driver core
//!
//! Provides:
//! - Physical/bus and virtual address types
//! - The stolen memory region allocator
//! - A coherent DMA pool for platforms without their own
//!
//! # Principles
//! - Carved regions and DMA buffers are move-only and released once
//! - Hardware-visible memory is cleared before the device sees it

pub mod address;
pub mod coherent;
pub mod region;

pub use address::{PhysAddr, VirtAddr, PAGE_SIZE};
pub use coherent::CoherentPool;
pub use region::{MemoryRegion, RegionAllocator, RegionError};
