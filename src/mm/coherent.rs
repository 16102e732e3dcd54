//! Coherent DMA Pool
//!
//! Uses `linked_list_allocator` to hand out DMA-coherent buffers from a
//! physically contiguous carve-out that the platform reserved at boot.
//!
//! # Memory Layout
//! The carve-out is described by two bases that refer to the same memory:
//! - `virt_base`: where the CPU sees it
//! - `bus_base`: where the device sees it
//!
//! A buffer at `virt_base + n` is therefore at `bus_base + n` for the device.

use core::alloc::Layout;
use core::ptr::NonNull;

use linked_list_allocator::Heap;

use super::address::{PhysAddr, VirtAddr};
use crate::hal::{DmaAllocator, DmaBuffer, HalError};

/// A [`DmaAllocator`] over one contiguous carve-out.
pub struct CoherentPool {
    heap: Heap,
    virt_base: VirtAddr,
    bus_base: PhysAddr,
    size: usize,
}

impl CoherentPool {
    /// Build a pool over `size` bytes.
    ///
    /// # Safety
    /// - `virt_base` must be valid for reads and writes of `size` bytes for
    ///   the lifetime of the pool, and nothing else may use that memory
    /// - the device must see the same memory at `bus_base`
    pub unsafe fn new(virt_base: VirtAddr, bus_base: PhysAddr, size: usize) -> Self {
        let mut heap = Heap::empty();
        // SAFETY: the caller hands the region over exclusively
        unsafe { heap.init(virt_base.as_mut_ptr::<u8>(), size) };
        Self {
            heap,
            virt_base,
            bus_base,
            size,
        }
    }

    /// Bytes currently handed out.
    pub fn used(&self) -> usize {
        self.heap.used()
    }

    /// Size of the carve-out.
    pub fn size(&self) -> usize {
        self.size
    }

    fn contains(&self, buffer: &DmaBuffer) -> bool {
        let start = self.virt_base.as_usize();
        let addr = buffer.vaddr().as_usize();
        addr >= start
            && !buffer.vaddr().is_null()
            && addr
                .checked_add(buffer.size())
                .is_some_and(|end| end <= start + self.size)
    }

    fn bus_addr_of(&self, vaddr: VirtAddr) -> PhysAddr {
        let offset = vaddr.as_usize() - self.virt_base.as_usize();
        self.bus_base.add(offset as u64)
    }
}

// SAFETY: every buffer comes from the carve-out the pool was given, whose
// bus alias is fixed at construction.
unsafe impl DmaAllocator for CoherentPool {
    fn alloc_coherent(&mut self, size: usize, align: usize, max_addr: u64) -> Option<DmaBuffer> {
        if size == 0 {
            return None;
        }
        let layout = Layout::from_size_align(size, align).ok()?;
        let ptr = self.heap.allocate_first_fit(layout).ok()?;

        let vaddr = VirtAddr::from_ptr(ptr.as_ptr());
        let bus = self.bus_addr_of(vaddr);
        let last = bus.as_u64().checked_add(size as u64 - 1);

        if last.map_or(true, |last| last > max_addr) {
            log::debug!("[DMA] {} bytes at {} exceed limit {:#x}", size, bus, max_addr);
            // SAFETY: ptr was just allocated with this layout
            unsafe { self.heap.deallocate(ptr, layout) };
            return None;
        }

        // SAFETY: the memory lies inside the carve-out, see CoherentPool::new
        Some(unsafe { DmaBuffer::new(vaddr, bus, size, align) })
    }

    fn free_coherent(&mut self, buffer: DmaBuffer) -> Result<(), HalError> {
        if !self.contains(&buffer) {
            log::warn!("[DMA] free of foreign buffer at {}", buffer.vaddr());
            return Err(HalError::Invalid);
        }
        let layout =
            Layout::from_size_align(buffer.size(), buffer.align()).map_err(|_| HalError::Invalid)?;
        // SAFETY: contains() rejects null
        let ptr = unsafe { NonNull::new_unchecked(buffer.vaddr().as_mut_ptr::<u8>()) };
        // SAFETY: the buffer is move-only and lies inside this pool, so it was
        // produced by alloc_coherent here with this very layout.
        unsafe { self.heap.deallocate(ptr, layout) };
        Ok(())
    }
}
