//! Configuration transactions
//!
//! [`Device::set_config`](crate::device::Device::set_config) is the
//! single entry point for changing what a crtc scans out and which
//! outputs it drives. A request is validated in
//! full before anything is touched; the mode-apply sequence then walks
//! the driver hooks in a fixed order (fixup, prepare, mode_set, commit)
//! and on a fixup rejection every tracked entity is restored from a
//! pre-transaction snapshot. Framebuffer-only and position-only changes
//! take the cheap rebase path when the crtc supports it.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::assign;
use crate::backend::{DpmsMode, OutputBackend};
use crate::device::ModeConfig;
use crate::error::Error;
use crate::mode::ModeInfo;
use crate::probe;
use crate::registry::ObjectId;

/// Dimension bound used when probing for an initial or hotplug
/// configuration
const PROBE_LIMIT: u16 = 2048;

/// A caller-specified configuration for one crtc.
///
/// `mode: None` disables the crtc; it then requires an empty output
/// list, and a mode requires at least one output plus a framebuffer.
#[derive(Debug, Clone)]
pub struct ModeRequest {
    /// The crtc to (re)configure
    pub crtc: ObjectId,
    /// New scan-out origin
    pub x: i32,
    /// New scan-out origin
    pub y: i32,
    /// The mode to apply, or `None` to disable
    pub mode: Option<ModeInfo>,
    /// Outputs the crtc should drive after the transaction
    pub outputs: Vec<ObjectId>,
    /// Framebuffer to scan out; required with a mode
    pub framebuffer: Option<ObjectId>,
}

#[profiling::function]
pub(crate) fn set_config(config: &mut ModeConfig, request: &ModeRequest) -> Result<(), Error> {
    if request.mode.is_some() {
        if request.outputs.is_empty() {
            return Err(Error::InvalidArgument("a mode requires at least one output"));
        }
        if request.framebuffer.is_none() {
            return Err(Error::InvalidArgument("a mode requires a framebuffer"));
        }
    } else if !request.outputs.is_empty() {
        return Err(Error::InvalidArgument("outputs listed without a mode"));
    }

    let ci = config.crtc_index(request.crtc)?;
    if let Some(fb) = request.framebuffer {
        let fi = config.framebuffer_index(fb)?;
        if let Some(mode) = &request.mode {
            let info = &config.framebuffers[fi].info;
            if u32::from(mode.hdisplay) > info.width || u32::from(mode.vdisplay) > info.height {
                return Err(Error::InvalidArgument("mode does not fit the framebuffer"));
            }
        }
    }
    for &output in &request.outputs {
        config.output_index(output)?;
    }

    // snapshot for rollback
    let saved_bindings: Vec<Option<ObjectId>> = config.outputs.iter().map(|o| o.crtc).collect();
    let saved_enabled = config.crtcs[ci].enabled;
    let saved_mode = config.crtcs[ci].mode.clone();
    let saved_x = config.crtcs[ci].x;
    let saved_y = config.crtcs[ci].y;
    let saved_fb = config.crtcs[ci].fb;

    let mut moved = false;
    let mut changed = false;

    if saved_fb != request.framebuffer || saved_x != request.x || saved_y != request.y {
        moved = true;
    }
    match (&saved_mode, &request.mode) {
        (Some(current), Some(next)) => {
            if !current.same_timings(next) || !saved_enabled {
                changed = true;
            }
        }
        (None, Some(_)) | (Some(_), None) => changed = true,
        (None, None) => {
            if saved_enabled {
                changed = true;
            }
        }
    }

    // rewrite the output bindings up front; hardware is only touched on
    // the changed path below
    for oi in 0..config.outputs.len() {
        let id = config.outputs[oi].id;
        let binding = if request.outputs.contains(&id) {
            Some(request.crtc)
        } else if config.outputs[oi].crtc == Some(request.crtc) {
            None
        } else {
            config.outputs[oi].crtc
        };
        if binding != config.outputs[oi].crtc {
            debug!("{} binding changes", config.outputs[oi].name());
            changed = true;
            config.outputs[oi].crtc = binding;
        }
    }

    if moved && !config.crtcs[ci].backend.has_set_base() {
        changed = true;
    }

    if changed {
        config.crtcs[ci].fb = request.framebuffer;
        config.crtcs[ci].enabled = request.mode.is_some();
        if let Some(mode) = &request.mode {
            if let Err(err) = apply_mode(config, ci, mode, request.x, request.y) {
                for (oi, binding) in saved_bindings.into_iter().enumerate() {
                    config.outputs[oi].crtc = binding;
                }
                config.crtcs[ci].enabled = saved_enabled;
                config.crtcs[ci].mode = saved_mode;
                config.crtcs[ci].x = saved_x;
                config.crtcs[ci].y = saved_y;
                config.crtcs[ci].fb = saved_fb;
                return Err(err);
            }
            config.crtcs[ci].desired_mode = Some(mode.clone());
            config.crtcs[ci].desired_x = request.x;
            config.crtcs[ci].desired_y = request.y;
        }
        disable_unused(config);
    } else if moved {
        config.crtcs[ci].fb = request.framebuffer;
        config.crtcs[ci].x = request.x;
        config.crtcs[ci].y = request.y;
        config.crtcs[ci].backend.set_base(request.x, request.y);
    }
    Ok(())
}

/// Runs the full mode-apply sequence on one crtc.
///
/// The crtc's enabled flag is derived from whether any output is bound
/// to it; an unused crtc short-circuits successfully. Tracked mode and
/// position are updated before the hooks run and restored if a fixup
/// hook rejects the mode.
#[profiling::function]
pub(crate) fn apply_mode(
    config: &mut ModeConfig,
    ci: usize,
    mode: &ModeInfo,
    x: i32,
    y: i32,
) -> Result<(), Error> {
    let crtc_id = config.crtcs[ci].id;
    let in_use = config.outputs.iter().any(|o| o.crtc == Some(crtc_id));
    config.crtcs[ci].enabled = in_use;
    if !in_use {
        return Ok(());
    }

    let crtc_backend = config.crtcs[ci].backend.clone();
    let bound: Vec<(String, Arc<dyn OutputBackend>)> = config
        .outputs
        .iter()
        .filter(|o| o.crtc == Some(crtc_id))
        .map(|o| (o.name(), o.backend.clone()))
        .collect();

    let saved_mode = config.crtcs[ci].mode.clone();
    let saved_x = config.crtcs[ci].x;
    let saved_y = config.crtcs[ci].y;

    config.crtcs[ci].mode = Some(mode.clone());
    config.crtcs[ci].x = x;
    config.crtcs[ci].y = y;

    // position-only change with unchanged timings takes the rebase path
    if let Some(current) = &saved_mode {
        if current.same_timings(mode)
            && (saved_x != x || saved_y != y)
            && crtc_backend.has_set_base()
        {
            crtc_backend.set_base(x, y);
            return Ok(());
        }
    }

    let mut adjusted = mode.clone();
    let mut accepted = true;
    for (name, backend) in &bound {
        if !backend.mode_fixup(mode, &mut adjusted) {
            debug!("{} rejected mode {}", name, mode.name);
            accepted = false;
            break;
        }
    }
    if accepted && !crtc_backend.mode_fixup(mode, &mut adjusted) {
        debug!("crtc {:?} rejected mode {}", crtc_id, mode.name);
        accepted = false;
    }
    if !accepted {
        config.crtcs[ci].mode = saved_mode;
        config.crtcs[ci].x = saved_x;
        config.crtcs[ci].y = saved_y;
        return Err(Error::ModeRejected(crtc_id));
    }

    for (_, backend) in &bound {
        backend.prepare();
    }
    crtc_backend.prepare();

    crtc_backend.mode_set(mode, &adjusted, x, y);
    for (name, backend) in &bound {
        info!("{}: applying mode {}", name, mode.name);
        backend.mode_set(mode, &adjusted);
    }

    crtc_backend.commit();
    for (_, backend) in &bound {
        backend.commit();
    }
    Ok(())
}

/// Powers down everything no configuration uses: outputs without a crtc
/// and crtcs no output is bound to. A crtc disabled here also drops its
/// framebuffer reference.
pub(crate) fn disable_unused(config: &mut ModeConfig) {
    for output in &config.outputs {
        if output.crtc.is_none() {
            output.backend.dpms(DpmsMode::Off);
        }
    }
    for ci in 0..config.crtcs.len() {
        let crtc_id = config.crtcs[ci].id;
        let in_use = config.outputs.iter().any(|o| o.crtc == Some(crtc_id));
        config.crtcs[ci].enabled = in_use;
        if !in_use {
            config.crtcs[ci].backend.dpms(DpmsMode::Off);
            config.crtcs[ci].fb = None;
        }
    }
}

/// Probes, assigns and applies a sane configuration for everything
/// currently connected. Framebuffers come from the device's
/// framebuffer handler; a crtc whose handler declines stays untouched.
pub(crate) fn initial_config(config: &mut ModeConfig) -> Result<(), Error> {
    probe::probe_all(config, PROBE_LIMIT, PROBE_LIMIT)?;
    assign::assign_crtcs(config);

    for ci in 0..config.crtcs.len() {
        let crtc_id = config.crtcs[ci].id;
        let Some(mode) = config.crtcs[ci].desired_mode.clone() else {
            continue;
        };
        let Some(output) = config
            .outputs
            .iter()
            .find(|o| o.crtc == Some(crtc_id))
            .map(|o| o.id)
        else {
            continue;
        };

        if config.crtcs[ci].fb.is_none() {
            let handler = config.fb_handler.clone();
            if let Some(info) = handler.fb_probe(crtc_id, output) {
                let fb = config.register_framebuffer(info)?;
                config.crtcs[ci].fb = Some(fb);
            }
        }
        if config.crtcs[ci].fb.is_some() {
            let x = config.crtcs[ci].desired_x;
            let y = config.crtcs[ci].desired_y;
            if apply_mode(config, ci, &mode, x, y).is_err() {
                error!("failed to apply initial mode {} on crtc {:?}", mode.name, crtc_id);
            }
        }
    }
    disable_unused(config);
    Ok(())
}

/// Reacts to a connection change on one output.
///
/// The hotplug counter is bumped unconditionally so pollers see every
/// event. A disconnect bumps the counter and nothing else; the tracked
/// status is refreshed by the next probe cycle. Returns whether a
/// configuration was applied.
pub(crate) fn hotplug(
    config: &mut ModeConfig,
    output: ObjectId,
    connected: bool,
) -> Result<bool, Error> {
    let oi = config.output_index(output)?;
    config.hotplug_counter = config.hotplug_counter.wrapping_add(1);

    if !connected {
        debug!("{} reported disconnected", config.outputs[oi].name());
        return Ok(false);
    }

    let had_config = match config.outputs[oi].crtc {
        Some(crtc_id) => {
            let ci = config.crtc_index(crtc_id)?;
            config.crtcs[ci].desired_mode.is_some()
        }
        None => false,
    };

    probe::probe_all(config, PROBE_LIMIT, PROBE_LIMIT)?;
    if !had_config {
        assign::assign_crtcs(config);
    }

    let mut applied = false;
    if let Some(crtc_id) = config.outputs[oi].crtc {
        let ci = config.crtc_index(crtc_id)?;
        if let Some(mode) = config.crtcs[ci].desired_mode.clone() {
            let handler = config.fb_handler.clone();
            if config.crtcs[ci].fb.is_none() {
                if let Some(info) = handler.fb_probe(crtc_id, output) {
                    let fb = config.register_framebuffer(info)?;
                    config.crtcs[ci].fb = Some(fb);
                }
            } else {
                handler.fb_resize(crtc_id);
            }
            if config.crtcs[ci].fb.is_some() {
                let x = config.crtcs[ci].desired_x;
                let y = config.crtcs[ci].desired_y;
                applied = apply_mode(config, ci, &mode, x, y).is_ok();
            }
        }
    }
    disable_unused(config);
    Ok(applied)
}
