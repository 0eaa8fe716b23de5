//! Capability interfaces towards the driver
//!
//! The state manager never programs hardware itself. Every output, every
//! crtc and the device carry a driver-supplied hook object implementing
//! one of the traits below; hooks are injected at entity creation and
//! invoked synchronously with the device region held.
//!
//! Hooks must not call back into [`Device`](crate::device::Device) entry
//! points for the same device: no re-entrancy guarantee is provided and
//! a re-entering hook deadlocks on the device region.

use std::fmt;

use crate::error::Error;
use crate::framebuffer::{BufferHandle, FramebufferInfo};
use crate::mode::{ModeInfo, ModeStatus};
use crate::output::ConnectionStatus;
use crate::registry::ObjectId;

/// Power level passed to the dpms hooks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DpmsMode {
    /// Fully on
    On = 0,
    /// Standby
    Standby = 1,
    /// Suspend
    Suspend = 2,
    /// Powered off
    Off = 3,
}

impl DpmsMode {
    /// Value stored in the standard DPMS enum property
    pub fn value(self) -> u64 {
        self as u64
    }

    /// Name registered for this level in the standard DPMS property
    pub fn name(self) -> &'static str {
        match self {
            DpmsMode::On => "On",
            DpmsMode::Standby => "Standby",
            DpmsMode::Suspend => "Suspend",
            DpmsMode::Off => "Off",
        }
    }
}

/// Driver hooks of one output.
///
/// `detect`, `modes` and `mode_valid` feed the prober; the
/// fixup/prepare/mode_set/commit group participates in the mode-apply
/// sequence for the crtc the output is bound to.
pub trait OutputBackend: fmt::Debug + Send + Sync {
    /// Detects whether a sink is attached
    fn detect(&self) -> ConnectionStatus;

    /// Enumerates the timing descriptors the sink advertises
    fn modes(&self) -> Vec<ModeInfo>;

    /// Judges a single candidate mode
    fn mode_valid(&self, _mode: &ModeInfo) -> ModeStatus {
        ModeStatus::Ok
    }

    /// Adjusts `adjusted` to the output's limitations, or rejects the
    /// mode entirely by returning `false`
    fn mode_fixup(&self, _mode: &ModeInfo, _adjusted: &mut ModeInfo) -> bool {
        true
    }

    /// Called before the mode is programmed; expected to disable the output
    fn prepare(&self) {}

    /// Programs the output for the given mode
    fn mode_set(&self, _mode: &ModeInfo, _adjusted: &ModeInfo) {}

    /// Enables what `prepare`/`mode_set` staged
    fn commit(&self) {}

    /// Sets the power level of the output
    fn dpms(&self, _level: DpmsMode) {}

    /// Applies a validated property value in hardware.
    ///
    /// A rejection here is surfaced unchanged to the caller of
    /// [`validate_and_set`](crate::device::Device::validate_and_set).
    fn set_property(&self, _property: ObjectId, _value: u64) -> Result<(), Error> {
        Ok(())
    }

    /// Invoked once when the output is destroyed
    fn cleanup(&self) {}
}

/// Driver hooks of one crtc
pub trait CrtcBackend: fmt::Debug + Send + Sync {
    /// Adjusts `adjusted` to the controller's limitations, or rejects
    /// the mode entirely by returning `false`
    fn mode_fixup(&self, _mode: &ModeInfo, _adjusted: &mut ModeInfo) -> bool {
        true
    }

    /// Called before the mode is programmed
    fn prepare(&self) {}

    /// Programs the controller: DPLL, plane and scan-out origin
    fn mode_set(&self, _mode: &ModeInfo, _adjusted: &ModeInfo, _x: i32, _y: i32) {}

    /// Whether [`set_base`](CrtcBackend::set_base) is implemented.
    ///
    /// Without it, a plain framebuffer or position change forces a full
    /// mode-apply sequence.
    fn has_set_base(&self) -> bool {
        false
    }

    /// Rebases scan-out to a new origin without a full mode set
    fn set_base(&self, _x: i32, _y: i32) {}

    /// Enables the clocks, plane and pipe that `mode_set` staged
    fn commit(&self) {}

    /// Sets the power level of the controller
    fn dpms(&self, _level: DpmsMode) {}

    /// Invoked once when the crtc is destroyed
    fn cleanup(&self) {}

    /// Binds (or with `None` hides) a cursor image; `false` if cursors
    /// are unsupported
    fn cursor_set(&self, _buffer: Option<BufferHandle>, _width: u32, _height: u32) -> bool {
        false
    }

    /// Moves the cursor; `false` if cursors are unsupported
    fn cursor_move(&self, _x: i32, _y: i32) -> bool {
        false
    }
}

/// Device-level framebuffer collaborator, consulted when an initial or
/// hotplug configuration needs a backing framebuffer.
pub trait FramebufferHandler: fmt::Debug + Send + Sync {
    /// Asks the driver for scan-out metadata backing `crtc` for
    /// `output`. Returning `Some` makes the device register the
    /// framebuffer and bind it to the crtc; `None` keeps the current
    /// binding.
    fn fb_probe(&self, _crtc: ObjectId, _output: ObjectId) -> Option<FramebufferInfo> {
        None
    }

    /// Notifies the driver that the framebuffer of `crtc` should be
    /// resized for a re-probed configuration
    fn fb_resize(&self, _crtc: ObjectId) {}

    /// Notifies the driver that a framebuffer is going away
    fn fb_remove(&self, _fb: ObjectId) {}
}
