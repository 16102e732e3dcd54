//! Intel GMCH integrated graphics (830 through G45).
//!
//! Only the resource lifecycle lives here: working out how much stolen
//! memory there is, putting the hardware status page somewhere the GPU can
//! reach, and bringing the device up and down in a fixed, reversible order.
//! Rendering, mode setting and interrupt handling are reached through the
//! [`hal`](crate::hal) traits.

pub mod bringup;
pub mod context;
pub mod device;
pub mod error;
pub mod identity;
pub mod probe;
pub mod status_page;
pub mod teardown;

pub use bringup::{init_core, load};
pub use context::{BringupState, DeviceContext, DriverConfig};
pub use device::Device;
pub use error::BringupError;
pub use identity::{ChipFeatures, DeviceIdentity, Generation};
pub use probe::{ApertureGeometry, ProbeError};
pub use status_page::{StatusPageError, StatusPageKind, StatusPageStrategy};
pub use teardown::{unload, unwind};
