//! Scan-out controller entities

use std::sync::Arc;

use crate::backend::CrtcBackend;
use crate::mode::ModeInfo;
use crate::registry::ObjectId;

/// One scan-out controller.
///
/// The current mode is held by value: mutating the mode list it was
/// chosen from cannot retroactively change what the crtc is scanning
/// out. The framebuffer reference is a plain id resolved through the
/// store at use time.
#[derive(Debug)]
pub(crate) struct Crtc {
    pub(crate) id: ObjectId,
    pub(crate) enabled: bool,
    pub(crate) mode: Option<ModeInfo>,
    pub(crate) x: i32,
    pub(crate) y: i32,
    /// Recommendation of the assignment engine, separate from the
    /// currently applied mode
    pub(crate) desired_mode: Option<ModeInfo>,
    pub(crate) desired_x: i32,
    pub(crate) desired_y: i32,
    pub(crate) fb: Option<ObjectId>,
    pub(crate) backend: Arc<dyn CrtcBackend>,
}

impl Crtc {
    pub(crate) fn new(id: ObjectId, backend: Arc<dyn CrtcBackend>) -> Self {
        Crtc {
            id,
            enabled: false,
            mode: None,
            x: 0,
            y: 0,
            desired_mode: None,
            desired_x: 0,
            desired_y: 0,
            fb: None,
            backend,
        }
    }
}
