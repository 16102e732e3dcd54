//! GMCH Register Window
//!
//! Volatile access to the memory-mapped control registers once the MMIO BAR
//! has been mapped, plus the volatile fill used to clear hardware-visible
//! pages.
//!
//! # Safety Considerations
//! - Every access is bounds-checked against the mapping length
//! - Accesses outside the window are dropped (writes) or read as all-ones,
//!   the value a master abort produces on the bus

use core::ptr;
use core::sync::atomic::{compiler_fence, Ordering};

use super::IoMapping;
use crate::mm::address::VirtAddr;

/// Register offsets within the MMIO BAR.
pub mod regs {
    /// Primary ring buffer control register.
    pub const PRB0_CTL: u32 = 0x0203c;
    /// Hardware status page address register.
    pub const HWS_PGA: u32 = 0x02080;
}

/// Writing this to `HWS_PGA` stops the device from using any status page.
pub const HWS_PGA_DISABLED: u32 = 0x1ffff000;

/// Mapped control registers.
#[derive(Debug)]
pub struct Mmio {
    mapping: IoMapping,
}

impl Mmio {
    /// Take over a mapping of the register BAR.
    pub fn new(mapping: IoMapping) -> Self {
        Self { mapping }
    }

    /// Give the mapping back, e.g. to unmap it.
    pub fn into_mapping(self) -> IoMapping {
        self.mapping
    }

    /// Length of the register window.
    #[inline]
    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    fn reg_ptr(&self, reg: u32) -> Option<*mut u32> {
        let offset = reg as usize;
        if offset % 4 != 0 || offset.checked_add(4)? > self.mapping.len() {
            return None;
        }
        // SAFETY: the offset is inside the mapping, which IoMapping::new
        // guarantees is valid for volatile access.
        Some(unsafe { self.mapping.virt().add(offset).as_mut_ptr::<u32>() })
    }

    /// Read a 32-bit register.
    pub fn read32(&self, reg: u32) -> u32 {
        match self.reg_ptr(reg) {
            // SAFETY: reg_ptr only yields aligned in-bounds pointers
            Some(p) => unsafe { ptr::read_volatile(p) },
            None => {
                log::warn!("[MMIO] read of {:#07x} outside register window", reg);
                u32::MAX
            }
        }
    }

    /// Write a 32-bit register.
    pub fn write32(&self, reg: u32, value: u32) {
        match self.reg_ptr(reg) {
            // SAFETY: reg_ptr only yields aligned in-bounds pointers
            Some(p) => unsafe { ptr::write_volatile(p, value) },
            None => log::warn!("[MMIO] write of {:#07x} outside register window", reg),
        }
    }
}

/// Clear `len` bytes of device-visible memory at `dst`.
///
/// Volatile so the stores reach memory the CPU never reads back itself.
///
/// # Safety
/// `dst` must be valid for writes of `len` bytes.
pub unsafe fn clear_io(dst: VirtAddr, len: usize) {
    // SAFETY: caller guarantees dst is valid for len bytes
    let base = unsafe { dst.as_mut_ptr::<u8>() };
    for i in 0..len {
        // SAFETY: i < len
        unsafe { ptr::write_volatile(base.add(i), 0) };
    }
    compiler_fence(Ordering::SeqCst);
}
