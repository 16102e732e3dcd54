//! Stolen Memory Region Allocator
//!
//! Carves fixed-size, fixed-alignment blocks out of the stolen (BIOS
//! preallocated) region of the aperture. Offsets are relative to the start
//! of the stolen region, not physical addresses.
//!
//! # Design
//! - One free-extent list, kept sorted by offset and coalesced on release
//! - First-fit search honoring the requested alignment
//! - Carved blocks are handed out as move-only [`MemoryRegion`] values, so a
//!   block can only be given back once
//!
//! The allocator is driven single-threaded by the bring-up and teardown
//! paths; it carries no lock of its own.

use alloc::vec::Vec;

use super::address::align_up;

/// A block carved out of the stolen region.
///
/// Deliberately neither `Clone` nor `Copy`: whoever receives it from
/// [`RegionAllocator::carve`] owns it until it is passed back to
/// [`RegionAllocator::release`].
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a carved region leaks stolen memory unless it is released"]
pub struct MemoryRegion {
    base_offset: u64,
    length: u64,
}

impl MemoryRegion {
    /// Offset of the block from the start of the stolen region.
    #[inline]
    pub const fn base_offset(&self) -> u64 {
        self.base_offset
    }

    /// Length of the block in bytes.
    #[inline]
    pub const fn length(&self) -> u64 {
        self.length
    }

    /// One past the last byte of the block.
    #[inline]
    pub const fn end(&self) -> u64 {
        self.base_offset + self.length
    }
}

/// A free extent `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Extent {
    start: u64,
    end: u64,
}

impl Extent {
    #[inline]
    const fn len(&self) -> u64 {
        self.end - self.start
    }
}

/// Error type for region allocator operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionError {
    /// No free extent can satisfy the size and alignment.
    OutOfSpace,
    /// Zero-sized request or an alignment that is not a power of two.
    InvalidRequest,
}

impl core::fmt::Display for RegionError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::OutOfSpace => write!(f, "no free stolen memory available"),
            Self::InvalidRequest => write!(f, "invalid size or alignment"),
        }
    }
}

/// First-fit extent allocator over the stolen region.
#[derive(Debug, Default)]
pub struct RegionAllocator {
    /// Free extents, sorted by start offset, never adjacent.
    free: Vec<Extent>,
    /// Total bytes under management.
    length: u64,
    /// Number of carves not yet released.
    outstanding: usize,
}

impl RegionAllocator {
    /// Create an allocator managing `[0, region_length)`.
    pub fn new(region_length: u64) -> Self {
        let mut allocator = Self::default();
        allocator.init(region_length);
        allocator
    }

    /// (Re)seed the allocator with a single free extent `[0, region_length)`.
    ///
    /// Any previous bookkeeping is discarded.
    pub fn init(&mut self, region_length: u64) {
        self.free.clear();
        if region_length > 0 {
            self.free.push(Extent {
                start: 0,
                end: region_length,
            });
        }
        self.length = region_length;
        self.outstanding = 0;
    }

    /// Carve `size` bytes aligned to `alignment` from the first extent that fits.
    pub fn carve(&mut self, size: u64, alignment: u64) -> Result<MemoryRegion, RegionError> {
        if size == 0 || !alignment.is_power_of_two() {
            return Err(RegionError::InvalidRequest);
        }

        let found = self.free.iter().enumerate().find_map(|(idx, ext)| {
            let start = align_up(ext.start, alignment)?;
            let end = start.checked_add(size)?;
            (end <= ext.end).then_some((idx, start, end))
        });
        let (idx, start, end) = found.ok_or(RegionError::OutOfSpace)?;

        let ext = self.free[idx];
        let head = Extent {
            start: ext.start,
            end: start,
        };
        let tail = Extent { start: end, end: ext.end };

        // Split the matched extent, keeping whichever remainders are non-empty.
        match (head.len() > 0, tail.len() > 0) {
            (true, true) => {
                self.free[idx] = head;
                self.free.insert(idx + 1, tail);
            }
            (true, false) => self.free[idx] = head,
            (false, true) => self.free[idx] = tail,
            (false, false) => {
                self.free.remove(idx);
            }
        }

        self.outstanding += 1;
        Ok(MemoryRegion {
            base_offset: start,
            length: size,
        })
    }

    /// Return a carved region to the free list, merging with its neighbours.
    pub fn release(&mut self, region: MemoryRegion) {
        let ext = Extent {
            start: region.base_offset,
            end: region.end(),
        };

        let idx = self.free.partition_point(|e| e.start < ext.start);

        let overlaps_prev = idx > 0 && self.free[idx - 1].end > ext.start;
        let overlaps_next = idx < self.free.len() && self.free[idx].start < ext.end;
        if overlaps_prev || overlaps_next || ext.end > self.length {
            log::warn!(
                "[VRAM] ignoring release of foreign block {:#x}+{:#x}",
                ext.start,
                ext.end - ext.start
            );
            return;
        }

        self.free.insert(idx, ext);

        if idx + 1 < self.free.len() && self.free[idx].end == self.free[idx + 1].start {
            self.free[idx].end = self.free[idx + 1].end;
            self.free.remove(idx + 1);
        }
        if idx > 0 && self.free[idx - 1].end == self.free[idx].start {
            self.free[idx - 1].end = self.free[idx].end;
            self.free.remove(idx);
        }

        self.outstanding = self.outstanding.saturating_sub(1);
    }

    /// Drop all bookkeeping.
    ///
    /// Outstanding carves are reported but never cause a failure; their
    /// hardware resources belong to their owners.
    pub fn takedown(&mut self) {
        if self.outstanding != 0 {
            log::warn!(
                "[VRAM] takedown with {} block(s) still carved",
                self.outstanding
            );
        }
        self.free.clear();
        self.length = 0;
        self.outstanding = 0;
    }

    /// Total bytes under management.
    #[inline]
    pub fn len(&self) -> u64 {
        self.length
    }

    /// True when nothing is under management.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Number of carves not yet released.
    #[inline]
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Bytes currently free.
    pub fn free_bytes(&self) -> u64 {
        self.free.iter().map(Extent::len).sum()
    }
}
