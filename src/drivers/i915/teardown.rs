//! Teardown Sequencer
//!
//! Undoes bring-up in reverse, driven only by the context marker. Each
//! stage's leave action releases the handles that stage acquired and
//! clears them as it goes, so running teardown again finds nothing to
//! release.
//!
//! Teardown never fails. A problem while releasing one stage is logged and
//! the next stage is released anyway.

use super::context::{BringupState, DeviceContext};
use crate::hal::mmio::regs;
use crate::hal::{HalError, Platform};

/// Normal detach: stop the ring, then release everything.
pub fn unload(ctx: &mut DeviceContext, platform: &mut dyn Platform) {
    if ctx.marker >= BringupState::RingReady {
        if let Some(mmio) = ctx.mmio.as_ref() {
            mmio.write32(regs::PRB0_CTL, 0);
        }
    }

    unwind(ctx, platform, BringupState::Unloaded);
    log::debug!("[UNLOAD] {} released", ctx.identity.name());
}

/// Leave every stage above `floor`, highest first.
pub fn unwind(ctx: &mut DeviceContext, platform: &mut dyn Platform, floor: BringupState) {
    while ctx.marker > floor {
        let stage = ctx.marker;
        leave(ctx, platform, stage);
        match stage.prev() {
            Some(prev) => ctx.marker = prev,
            None => break,
        }
    }
}

/// Log a failed release. The handle counts as gone either way.
fn check(what: &str, result: Result<(), HalError>) {
    if let Err(err) = result {
        log::warn!("[UNLOAD] {} failed: {}, continuing", what, err);
    }
}

fn leave(ctx: &mut DeviceContext, platform: &mut dyn Platform, stage: BringupState) {
    match stage {
        BringupState::Unloaded => {}
        BringupState::Operational => {
            if core::mem::take(&mut ctx.irq_installed) {
                check("irq uninstall", platform.irq_uninstall());
            }
        }
        BringupState::AuxReady => release_aux(ctx, platform),
        BringupState::StatusPageReady => {
            ctx.status_page
                .tear_down(platform, ctx.mmio.as_ref(), ctx.regions.as_mut());
        }
        BringupState::RingReady => {
            if core::mem::take(&mut ctx.ring_ready) {
                check("ring cleanup", platform.cleanup_ringbuffer());
            }
        }
        BringupState::GeometryProbed => {
            if let Some(mut regions) = ctx.regions.take() {
                regions.takedown();
            }
            if core::mem::take(&mut ctx.gem_ready) {
                check("lastclose", platform.lastclose());
            }
            ctx.geometry = None;
        }
        BringupState::MmioMapped => match ctx.mmio.take() {
            Some(mmio) => check("register unmap", platform.unmap(mmio.into_mapping())),
            None => log::warn!("[UNLOAD] registers already unmapped"),
        },
    }
}

/// Mode setting and the workqueue, in reverse of how they came up.
///
/// Also used by the aux stage itself when one of its later steps fails.
pub(super) fn release_aux(ctx: &mut DeviceContext, platform: &mut dyn Platform) {
    if core::mem::take(&mut ctx.modeset_ready) {
        check("modeset cleanup", platform.modeset_cleanup());
    }
    if let Some(wq) = ctx.workqueue.take() {
        check("workqueue destroy", platform.destroy_workqueue(wq));
    }
}
