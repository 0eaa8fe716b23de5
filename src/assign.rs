//! Output-to-crtc assignment
//!
//! Greedy first-fit over device order: every connected output with a
//! usable mode takes the first crtc its eligibility mask allows. A crtc
//! that is already taken can still be shared when the two outputs are
//! clone-compatible (their clone masks overlap) and advertise a common
//! timing; the first compatible partner in device order wins. The same
//! input state always produces the same assignment.
//!
//! Assignment only records recommendations (`Output::crtc` and the
//! crtc's desired mode); nothing is applied to hardware here.

use tracing::debug;

use crate::device::ModeConfig;
use crate::mode::{ModeInfo, ModeKind};
use crate::output::ConnectionStatus;

fn desired_mode(config: &ModeConfig, oi: usize) -> Option<ModeInfo> {
    let usable = &config.outputs[oi].usable;
    usable
        .iter()
        .find(|m| m.info.kind.contains(ModeKind::PREFERRED))
        .or_else(|| usable.first())
        .map(|m| m.info.clone())
}

pub(crate) fn assign_crtcs(config: &mut ModeConfig) {
    let output_count = config.outputs.len();
    for oi in 0..output_count {
        // bindings are dropped one output at a time; an earlier
        // output's scan still sees the standing bindings of the later
        // ones
        config.outputs[oi].crtc = None;
        if config.outputs[oi].status != ConnectionStatus::Connected {
            debug!("{} not connected, skipping", config.outputs[oi].name());
            continue;
        }
        let Some(des_mode) = desired_mode(config, oi) else {
            continue;
        };

        for ci in 0..config.crtcs.len() {
            if config.outputs[oi].possible_crtcs & (1 << ci) == 0 {
                continue;
            }
            let crtc_id = config.crtcs[ci].id;

            let mut taken = (0..output_count)
                .any(|oj| oj != oi && config.outputs[oj].crtc == Some(crtc_id));
            let mut chosen = des_mode.clone();

            if taken {
                // clone scan: the crtc can still be shared with the
                // first clone-compatible partner advertising a common
                // timing
                'clone: for oj in 0..output_count {
                    if oj == oi || config.outputs[oj].crtc != Some(crtc_id) {
                        continue;
                    }
                    if config.outputs[oi].possible_clones & config.outputs[oj].possible_clones == 0
                    {
                        continue;
                    }
                    for mine in &config.outputs[oi].usable {
                        for theirs in &config.outputs[oj].usable {
                            if mine.info.same_timings(&theirs.info) {
                                chosen = mine.info.clone();
                                taken = false;
                                break 'clone;
                            }
                        }
                    }
                }
            }
            if taken {
                continue;
            }

            debug!(
                "assigning crtc {} to {} ({})",
                ci,
                config.outputs[oi].name(),
                chosen.name
            );
            config.outputs[oi].crtc = Some(crtc_id);
            config.crtcs[ci].desired_mode = Some(chosen);
            config.crtcs[ci].desired_x = 0;
            config.crtcs[ci].desired_y = 0;
            break;
        }
    }
}
