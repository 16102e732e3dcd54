//! Attach/detach entry points.
//!
//! [`Device`] owns the platform services for one PCI function together with
//! the live [`DeviceContext`], if any, behind a spinlock. Holding the lock
//! across the whole of bring-up and teardown is what keeps attach and
//! detach of the same device from overlapping.

use spin::Mutex;

use super::bringup;
use super::context::{BringupState, DeviceContext, DriverConfig};
use super::error::BringupError;
use super::identity::DeviceIdentity;
use super::teardown;
use crate::hal::Platform;

struct Slot<P> {
    platform: P,
    config: DriverConfig,
    ctx: Option<DeviceContext>,
}

/// One graphics device and its attach state.
pub struct Device<P: Platform> {
    slot: Mutex<Slot<P>>,
}

impl<P: Platform> Device<P> {
    pub const fn new(platform: P, config: DriverConfig) -> Self {
        Self {
            slot: Mutex::new(Slot {
                platform,
                config,
                ctx: None,
            }),
        }
    }

    /// Bring the device up.
    ///
    /// Fails with [`BringupError::AlreadyAttached`] while a previous attach
    /// is still live, and with [`BringupError::UnsupportedDevice`] for ids
    /// outside the device table.
    pub fn attach(&self, vendor: u16, device: u16) -> Result<(), BringupError> {
        let mut slot = self.slot.lock();
        if slot.ctx.is_some() {
            return Err(BringupError::AlreadyAttached);
        }

        let Some(identity) = DeviceIdentity::from_pci(vendor, device) else {
            log::error!("[LOAD] unsupported device {:04x}:{:04x}", vendor, device);
            return Err(BringupError::UnsupportedDevice);
        };

        let slot = &mut *slot;
        let ctx = bringup::load(&mut slot.platform, identity, slot.config)?;
        slot.ctx = Some(ctx);
        Ok(())
    }

    /// Tear the device down. Nothing happens when it is not attached.
    pub fn detach(&self) {
        let mut slot = self.slot.lock();
        let slot = &mut *slot;
        if let Some(mut ctx) = slot.ctx.take() {
            teardown::unload(&mut ctx, &mut slot.platform);
        }
    }

    pub fn is_attached(&self) -> bool {
        self.slot.lock().ctx.is_some()
    }

    /// Bring-up stage of the live context, `Unloaded` when detached.
    pub fn state(&self) -> BringupState {
        self.slot
            .lock()
            .ctx
            .as_ref()
            .map_or(BringupState::Unloaded, DeviceContext::state)
    }

    /// Run `f` against the live context, if attached.
    pub fn with_context<R>(&self, f: impl FnOnce(&DeviceContext) -> R) -> Option<R> {
        self.slot.lock().ctx.as_ref().map(f)
    }

    /// Run `f` against the platform services.
    pub fn with_platform<R>(&self, f: impl FnOnce(&mut P) -> R) -> R {
        f(&mut self.slot.lock().platform)
    }
}
