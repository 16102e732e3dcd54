//! Bring-up Sequencer
//!
//! Drives a [`DeviceContext`] from `Unloaded` to `Operational` one stage at
//! a time:
//!
//! | Stage             | Acquires                                           |
//! |-------------------|----------------------------------------------------|
//! | `MmioMapped`      | mapping of the register BAR                        |
//! | `GeometryProbed`  | aperture geometry, stolen allocator, GEM range     |
//! | `RingReady`       | primary ring buffer                                |
//! | `StatusPageReady` | hardware status page                               |
//! | `AuxReady`        | workqueue, VBIOS tables, mode setting              |
//! | `Operational`     | interrupt handler                                  |
//!
//! A stage either acquires everything it lists or nothing. The context
//! marker is advanced only after a stage succeeds, so on failure the
//! [teardown sequencer](super::teardown) knows exactly what to undo.
//!
//! There are two rollback layers. [`init_core`] rolls back the stages it
//! entered itself and leaves the register mapping alone; [`load`] owns the
//! register mapping and releases it when the core fails.

use super::context::{BringupState, DeviceContext, DeviceResources, DriverConfig};
use super::error::BringupError;
use super::identity::DeviceIdentity;
use super::probe;
use super::teardown;
use crate::hal::{Mmio, Platform, Resources};
use crate::mm::address::PhysAddr;
use crate::mm::region::{RegionAllocator, RegionError};

/// Config dword holding the stolen memory base on 9-series parts.
const STOLEN_BASE_OFFSET: u16 = 0x5c;

/// The framebuffer base is reported at 16 MiB granularity.
const FB_BASE_MASK: u64 = 0xff00_0000;

/// Stages in the order they are entered.
const STAGES: [BringupState; 6] = [
    BringupState::MmioMapped,
    BringupState::GeometryProbed,
    BringupState::RingReady,
    BringupState::StatusPageReady,
    BringupState::AuxReady,
    BringupState::Operational,
];

/// Find the register and framebuffer BARs.
///
/// 9-series parts put the registers in BAR 0 and the aperture in BAR 2.
/// Older parts put the aperture in BAR 0 and the registers in BAR 1.
pub fn discover_resources<P>(
    identity: &DeviceIdentity,
    platform: &P,
) -> Result<DeviceResources, BringupError>
where
    P: Resources + ?Sized,
{
    let (mmio_bar, fb_bar) = if identity.is_i9xx() {
        (0, 2)
    } else if platform.resource_start(1).as_u64() != 0 {
        (1, 0)
    } else {
        log::error!("[LOAD] can not find MMIO resource");
        return Err(BringupError::NoMmioResource);
    };

    let mmio_base = platform.resource_start(mmio_bar);
    let mmio_len = platform.resource_len(mmio_bar);
    if mmio_len == 0 {
        log::error!("[LOAD] MMIO resource {} is empty", mmio_bar);
        return Err(BringupError::NoMmioResource);
    }

    let aperture_base = platform.resource_start(fb_bar);
    let fb_base = PhysAddr::new(aperture_base.as_u64() & FB_BASE_MASK);
    log::debug!("[LOAD] fb_base: {}", fb_base);

    Ok(DeviceResources {
        mmio_bar,
        mmio_base,
        mmio_len,
        fb_base,
        aperture_base,
    })
}

/// Bring the device all the way up.
///
/// On success the returned context is `Operational`. On failure every
/// stage that was entered has been rolled back and the error of the stage
/// that failed is returned.
pub fn load(
    platform: &mut dyn Platform,
    identity: DeviceIdentity,
    config: DriverConfig,
) -> Result<DeviceContext, BringupError> {
    log::debug!("[LOAD] attaching {:?}", identity);

    let resources = discover_resources(&identity, &*platform)?;
    let mut ctx = DeviceContext::new(identity, config, resources);

    if identity.is_i9xx() {
        let stolen_base = platform.device_read32(STOLEN_BASE_OFFSET);
        log::debug!("[LOAD] stolen base {:#010x}", stolen_base);
        ctx.stolen_base = Some(stolen_base);
    }

    advance(&mut ctx, platform, BringupState::MmioMapped)?;

    if let Err(err) = init_core(&mut ctx, platform) {
        teardown::unwind(&mut ctx, platform, BringupState::Unloaded);
        return Err(err);
    }

    log::info!("[LOAD] {} operational", identity.name());
    Ok(ctx)
}

/// Run every stage above the current marker.
///
/// On failure the stages entered by this call are rolled back, so the
/// context ends where it started. With a context in `MmioMapped` that means
/// the register mapping survives and the caller stays responsible for it.
pub fn init_core(ctx: &mut DeviceContext, platform: &mut dyn Platform) -> Result<(), BringupError> {
    let floor = ctx.marker;
    if let Err(err) = advance(ctx, platform, BringupState::Operational) {
        log::error!("[LOAD] bring-up failed after {:?}: {}", ctx.marker, err);
        teardown::unwind(ctx, platform, floor);
        return Err(err);
    }
    Ok(())
}

/// Enter stages above the marker up to and including `target`.
///
/// Stops at the first failure with the marker on the last stage that
/// succeeded. Does not roll anything back.
pub(super) fn advance(
    ctx: &mut DeviceContext,
    platform: &mut dyn Platform,
    target: BringupState,
) -> Result<(), BringupError> {
    for stage in STAGES {
        if stage <= ctx.marker {
            continue;
        }
        if stage > target {
            break;
        }
        enter(ctx, platform, stage)?;
        ctx.reached(stage);
    }
    Ok(())
}

fn enter(
    ctx: &mut DeviceContext,
    platform: &mut dyn Platform,
    stage: BringupState,
) -> Result<(), BringupError> {
    match stage {
        BringupState::Unloaded => Ok(()),
        BringupState::MmioMapped => map_registers(ctx, platform),
        BringupState::GeometryProbed => init_geometry(ctx, platform),
        BringupState::RingReady => {
            platform.init_ringbuffer().map_err(BringupError::Ring)?;
            ctx.ring_ready = true;
            Ok(())
        }
        BringupState::StatusPageReady => init_status_page(ctx, platform),
        BringupState::AuxReady => init_aux(ctx, platform),
        BringupState::Operational => {
            platform.irq_install().map_err(BringupError::Irq)?;
            ctx.irq_installed = true;
            Ok(())
        }
    }
}

fn map_registers(ctx: &mut DeviceContext, platform: &mut dyn Platform) -> Result<(), BringupError> {
    let res = ctx.resources;
    let Ok(len) = usize::try_from(res.mmio_len) else {
        return Err(BringupError::NoMmioResource);
    };

    let mapping = platform
        .map(res.mmio_base, len)
        .filter(|m| !m.virt().is_null());
    let Some(mapping) = mapping else {
        log::error!("[LOAD] can not map MMIO registers at {}", res.mmio_base);
        return Err(BringupError::MmioMapFailed);
    };

    ctx.mmio = Some(Mmio::new(mapping));
    Ok(())
}

fn init_geometry(ctx: &mut DeviceContext, platform: &mut dyn Platform) -> Result<(), BringupError> {
    let geometry = probe::read_geometry(&ctx.identity, platform)?;

    // A negative stolen size seeds an empty allocator; the first carve fails.
    let usable = geometry.usable_stolen();
    ctx.regions = Some(RegionAllocator::new(usable));
    ctx.geometry = Some(geometry);

    platform.init_gem(usable, geometry.aperture_size);
    ctx.gem_ready = true;
    Ok(())
}

fn init_status_page(
    ctx: &mut DeviceContext,
    platform: &mut dyn Platform,
) -> Result<(), BringupError> {
    let Some(mmio) = ctx.mmio.as_ref() else {
        return Err(BringupError::MmioMapFailed);
    };
    let Some(regions) = ctx.regions.as_mut() else {
        return Err(BringupError::Region(RegionError::InvalidRequest));
    };

    ctx.status_page
        .bring_up(platform, mmio, regions, ctx.resources.aperture_base)?;
    Ok(())
}

/// Workqueue, VBIOS and mode setting. Rolls back its own sub-steps.
fn init_aux(ctx: &mut DeviceContext, platform: &mut dyn Platform) -> Result<(), BringupError> {
    let Some(wq) = platform.create_workqueue(ctx.config.workqueue_name) else {
        log::error!("[LOAD] can not create workqueue");
        return Err(BringupError::WorkqueueUnavailable);
    };
    ctx.workqueue = Some(wq);

    if let Err(err) = init_display(ctx, platform) {
        teardown::release_aux(ctx, platform);
        return Err(err);
    }
    Ok(())
}

fn init_display(ctx: &mut DeviceContext, platform: &mut dyn Platform) -> Result<(), BringupError> {
    if platform.init_bios().is_err() {
        log::error!("[LOAD] failed to find VBIOS tables");
        return Err(BringupError::NoVbios);
    }

    platform.modeset_init().map_err(BringupError::Modeset)?;
    ctx.modeset_ready = true;

    platform.initial_config(ctx.config.initial_config_can_grow);
    Ok(())
}
