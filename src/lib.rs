//! i915-core - Staged bring-up and teardown for Intel GMCH graphics
//!
//! The resource lifecycle of the Intel 8xx/9xx/G33/G4x integrated graphics
//! driver, as a `no_std` library the embedding kernel links in.
//!
//! # What it does
//! - Decodes aperture and stolen memory geometry from the GMCH control word
//! - Carves blocks out of stolen memory with a first-fit extent allocator
//! - Places the hardware status page in DMA memory or in stolen memory,
//!   depending on the chipset
//! - Brings the device up in fixed stages and rolls back exactly the
//!   stages that completed when one fails
//!
//! # Architecture
//! - `mm`: address types, the stolen region allocator, a coherent DMA pool
//! - `hal`: the platform services the kernel provides (config space, BARs,
//!   mapping, DMA, command engine, display, interrupts)
//! - `drivers::i915`: the driver core proper
//!
//! Logging goes through the `log` facade; no logger is installed here.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod drivers;
pub mod hal;
pub mod mm;

pub use drivers::i915::{BringupError, BringupState, Device, DeviceContext, DriverConfig};
