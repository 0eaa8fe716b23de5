//! Mode probing
//!
//! Rebuilds an output's usable mode list from a fresh detection cycle:
//! re-detect the sink, stage the advertised modes in the probed list,
//! merge them into the usable list on timing equality, validate against
//! the size bounds and the output's own judgement, prune everything that
//! did not survive and keep the result sorted. An output that is connected but advertises nothing
//! usable receives the built-in 640x480 fallback so that assignment
//! always has something to work with.

use tracing::debug;

use crate::device::ModeConfig;
use crate::error::Error;
use crate::mode::{self, builtin_fallback, Mode, ModeKind, ModeStatus};
use crate::output::ConnectionStatus;
use crate::registry::{ObjectId, ObjectKind};

/// Probes a single output.
///
/// `max_width`/`max_height` bound the acceptable mode size; pass zero
/// for either to skip size filtering. A disconnected output keeps its
/// stale list untouched (marked unverified) so a later reconnect can
/// revalidate it cheaply.
pub(crate) fn probe_output(
    config: &mut ModeConfig,
    output: ObjectId,
    max_width: u16,
    max_height: u16,
) -> Result<(), Error> {
    let oi = config.output_index(output)?;
    let backend = config.outputs[oi].backend.clone();
    let name = config.outputs[oi].name();

    for mode in &mut config.outputs[oi].usable {
        mode.status = ModeStatus::Unverified;
    }

    let status = backend.detect();
    config.outputs[oi].status = status;
    debug!("{} is {}", name, status.name());
    if status == ConnectionStatus::Disconnected {
        return Ok(());
    }

    let ModeConfig {
        outputs, registry, ..
    } = config;
    let out = &mut outputs[oi];

    // stage the raw detection results, then merge them into the usable
    // list on timing equality, folding the kind bits of duplicates
    // together
    out.probed = backend.modes();
    for info in &out.probed {
        match out.usable.iter_mut().find(|m| m.info.same_timings(info)) {
            Some(existing) => {
                existing.info.kind |= info.kind;
                existing.status = ModeStatus::Ok;
            }
            None => {
                let id = registry.allocate(ObjectKind::Mode)?;
                let mut mode = Mode::new(id, info.clone());
                mode.status = ModeStatus::Ok;
                out.usable.push(mode);
            }
        }
    }

    if max_width > 0 && max_height > 0 {
        mode::filter_size(&mut out.usable, max_width, max_height);
    }

    for mode in &mut out.usable {
        if mode.status == ModeStatus::Ok {
            mode.status = backend.mode_valid(&mode.info);
        }
    }

    // prune everything that is not verified-ok
    let mut kept = Vec::with_capacity(out.usable.len());
    for mode in out.usable.drain(..) {
        if mode.status == ModeStatus::Ok {
            kept.push(mode);
        } else {
            debug!("{}: pruning {} ({:?})", name, mode.info.name, mode.status);
            registry.release(mode.id);
        }
    }
    out.usable = kept;

    if out.usable.is_empty() {
        debug!("{} advertises no usable mode, adding 640x480", name);
        let id = registry.allocate(ObjectKind::Mode)?;
        let mut info = builtin_fallback();
        info.kind |= ModeKind::PREFERRED;
        let mut fallback = Mode::new(id, info);
        fallback.status = ModeStatus::Ok;
        out.usable.push(fallback);
    }

    mode::sort(&mut out.usable);
    for mode in &mut out.usable {
        mode.info.vrefresh = mode.info.refresh_millihertz();
        debug!(
            "{}: {} {}x{}@{}mHz clock {}",
            name, mode.info.name, mode.info.hdisplay, mode.info.vdisplay, mode.info.vrefresh,
            mode.info.clock
        );
    }
    Ok(())
}

/// Probes every output of the device in device order
pub(crate) fn probe_all(
    config: &mut ModeConfig,
    max_width: u16,
    max_height: u16,
) -> Result<(), Error> {
    let ids: Vec<ObjectId> = config.outputs.iter().map(|o| o.id).collect();
    for id in ids {
        probe_output(config, id, max_width, max_height)?;
    }
    Ok(())
}
