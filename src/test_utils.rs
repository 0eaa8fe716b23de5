//! Scripted driver hooks and device builders shared by the unit tests

use std::ops::Deref;
use std::sync::{Arc, Mutex};

use crate::backend::{CrtcBackend, DpmsMode, FramebufferHandler, OutputBackend};
use crate::device::{Device, SizeLimits};
use crate::error::Error;
use crate::framebuffer::{BufferHandle, FramebufferInfo};
use crate::mode::{ModeFlags, ModeInfo, ModeKind, ModeStatus};
use crate::output::{ConnectionStatus, OutputSettings, OutputType, SubPixel};
use crate::registry::ObjectId;

/// One recorded hook invocation
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum HookCall {
    OutputPrepare(String),
    OutputModeSet { tag: String, mode: String },
    OutputCommit(String),
    OutputDpms(String, DpmsMode),
    OutputSetProperty { tag: String, value: u64 },
    CrtcPrepare(String),
    CrtcModeSet { tag: String, mode: String, x: i32, y: i32 },
    CrtcSetBase { tag: String, x: i32, y: i32 },
    CrtcCommit(String),
    CrtcDpms(String, DpmsMode),
    FbProbe { crtc: ObjectId, output: ObjectId },
    FbResize(ObjectId),
    FbRemove(ObjectId),
}

pub(crate) type CallLog = Arc<Mutex<Vec<HookCall>>>;

/// An output backend driven entirely by the test script
#[derive(Debug)]
pub(crate) struct ScriptedOutput {
    tag: String,
    log: Mutex<Option<CallLog>>,
    status: Mutex<ConnectionStatus>,
    modes: Mutex<Vec<ModeInfo>>,
    rejected: Mutex<Vec<(String, ModeStatus)>>,
    fixup_ok: Mutex<bool>,
    property_error: Mutex<Option<Error>>,
}

impl ScriptedOutput {
    pub(crate) fn connected(modes: Vec<ModeInfo>) -> Self {
        ScriptedOutput {
            tag: "output".into(),
            log: Mutex::new(None),
            status: Mutex::new(ConnectionStatus::Connected),
            modes: Mutex::new(modes),
            rejected: Mutex::new(Vec::new()),
            fixup_ok: Mutex::new(true),
            property_error: Mutex::new(None),
        }
    }

    pub(crate) fn logged(tag: &str, modes: Vec<ModeInfo>) -> Self {
        let mut out = Self::connected(modes);
        out.tag = tag.into();
        out
    }

    pub(crate) fn set_status(&self, status: ConnectionStatus) {
        *self.status.lock().unwrap() = status;
    }

    pub(crate) fn set_modes(&self, modes: Vec<ModeInfo>) {
        *self.modes.lock().unwrap() = modes;
    }

    pub(crate) fn reject_mode(&self, name: &str, status: ModeStatus) {
        self.rejected.lock().unwrap().push((name.into(), status));
    }

    pub(crate) fn fail_fixup(&self) {
        *self.fixup_ok.lock().unwrap() = false;
    }

    pub(crate) fn reject_properties(&self, error: Error) {
        *self.property_error.lock().unwrap() = Some(error);
    }

    fn attach_log(&self, log: &CallLog) {
        *self.log.lock().unwrap() = Some(log.clone());
    }

    fn record(&self, call: HookCall) {
        if let Some(log) = self.log.lock().unwrap().as_ref() {
            log.lock().unwrap().push(call);
        }
    }
}

impl OutputBackend for ScriptedOutput {
    fn detect(&self) -> ConnectionStatus {
        *self.status.lock().unwrap()
    }

    fn modes(&self) -> Vec<ModeInfo> {
        self.modes.lock().unwrap().clone()
    }

    fn mode_valid(&self, mode: &ModeInfo) -> ModeStatus {
        self.rejected
            .lock()
            .unwrap()
            .iter()
            .find(|(name, _)| *name == mode.name)
            .map(|(_, status)| *status)
            .unwrap_or(ModeStatus::Ok)
    }

    fn mode_fixup(&self, _mode: &ModeInfo, _adjusted: &mut ModeInfo) -> bool {
        *self.fixup_ok.lock().unwrap()
    }

    fn prepare(&self) {
        self.record(HookCall::OutputPrepare(self.tag.clone()));
    }

    fn mode_set(&self, mode: &ModeInfo, _adjusted: &ModeInfo) {
        self.record(HookCall::OutputModeSet {
            tag: self.tag.clone(),
            mode: mode.name.clone(),
        });
    }

    fn commit(&self) {
        self.record(HookCall::OutputCommit(self.tag.clone()));
    }

    fn dpms(&self, level: DpmsMode) {
        self.record(HookCall::OutputDpms(self.tag.clone(), level));
    }

    fn set_property(&self, _property: ObjectId, value: u64) -> Result<(), Error> {
        if let Some(err) = self.property_error.lock().unwrap().take() {
            return Err(err);
        }
        self.record(HookCall::OutputSetProperty {
            tag: self.tag.clone(),
            value,
        });
        Ok(())
    }
}

/// A crtc backend recording every invocation
#[derive(Debug)]
pub(crate) struct ScriptedCrtc {
    tag: String,
    log: CallLog,
    has_base: Mutex<bool>,
    fixup_ok: Mutex<bool>,
    cursor_ok: Mutex<bool>,
}

impl ScriptedCrtc {
    pub(crate) fn logged(tag: String, log: CallLog) -> Self {
        ScriptedCrtc {
            tag,
            log,
            has_base: Mutex::new(false),
            fixup_ok: Mutex::new(true),
            cursor_ok: Mutex::new(false),
        }
    }

    pub(crate) fn enable_set_base(&self) {
        *self.has_base.lock().unwrap() = true;
    }

    pub(crate) fn enable_cursor(&self) {
        *self.cursor_ok.lock().unwrap() = true;
    }

    pub(crate) fn fail_fixup(&self) {
        *self.fixup_ok.lock().unwrap() = false;
    }

    fn record(&self, call: HookCall) {
        self.log.lock().unwrap().push(call);
    }
}

impl CrtcBackend for ScriptedCrtc {
    fn mode_fixup(&self, _mode: &ModeInfo, _adjusted: &mut ModeInfo) -> bool {
        *self.fixup_ok.lock().unwrap()
    }

    fn prepare(&self) {
        self.record(HookCall::CrtcPrepare(self.tag.clone()));
    }

    fn mode_set(&self, mode: &ModeInfo, _adjusted: &ModeInfo, x: i32, y: i32) {
        self.record(HookCall::CrtcModeSet {
            tag: self.tag.clone(),
            mode: mode.name.clone(),
            x,
            y,
        });
    }

    fn has_set_base(&self) -> bool {
        *self.has_base.lock().unwrap()
    }

    fn set_base(&self, x: i32, y: i32) {
        self.record(HookCall::CrtcSetBase {
            tag: self.tag.clone(),
            x,
            y,
        });
    }

    fn commit(&self) {
        self.record(HookCall::CrtcCommit(self.tag.clone()));
    }

    fn dpms(&self, level: DpmsMode) {
        self.record(HookCall::CrtcDpms(self.tag.clone(), level));
    }

    fn cursor_set(&self, _buffer: Option<BufferHandle>, _width: u32, _height: u32) -> bool {
        *self.cursor_ok.lock().unwrap()
    }

    fn cursor_move(&self, _x: i32, _y: i32) -> bool {
        *self.cursor_ok.lock().unwrap()
    }
}

/// Framebuffer handler with a scriptable probe result
#[derive(Debug)]
pub(crate) struct ScriptedFb {
    log: CallLog,
    probe_result: Mutex<Option<FramebufferInfo>>,
}

impl ScriptedFb {
    fn new(log: CallLog) -> Self {
        ScriptedFb {
            log,
            probe_result: Mutex::new(None),
        }
    }

    pub(crate) fn set_probe(&self, info: FramebufferInfo) {
        *self.probe_result.lock().unwrap() = Some(info);
    }
}

impl FramebufferHandler for ScriptedFb {
    fn fb_probe(&self, crtc: ObjectId, output: ObjectId) -> Option<FramebufferInfo> {
        self.log
            .lock()
            .unwrap()
            .push(HookCall::FbProbe { crtc, output });
        self.probe_result.lock().unwrap().clone()
    }

    fn fb_resize(&self, crtc: ObjectId) {
        self.log.lock().unwrap().push(HookCall::FbResize(crtc));
    }

    fn fb_remove(&self, fb: ObjectId) {
        self.log.lock().unwrap().push(HookCall::FbRemove(fb));
    }
}

/// A device with scripted hooks and direct access to them
#[derive(Debug)]
pub(crate) struct TestDevice {
    pub(crate) device: Device,
    pub(crate) crtcs: Vec<ObjectId>,
    pub(crate) crtc_backends: Vec<Arc<ScriptedCrtc>>,
    pub(crate) fb_handler: Arc<ScriptedFb>,
    log: CallLog,
}

impl Deref for TestDevice {
    type Target = Device;

    fn deref(&self) -> &Device {
        &self.device
    }
}

impl TestDevice {
    pub(crate) fn add_output(&self, backend: &Arc<ScriptedOutput>) -> ObjectId {
        self.add_output_with(default_settings(), backend)
    }

    pub(crate) fn add_output_with(
        &self,
        settings: OutputSettings,
        backend: &Arc<ScriptedOutput>,
    ) -> ObjectId {
        backend.attach_log(&self.log);
        self.device
            .create_output(settings, backend.clone())
            .unwrap()
    }
}

pub(crate) fn default_settings() -> OutputSettings {
    OutputSettings {
        output_type: OutputType::Tmds,
        possible_crtcs: !0,
        possible_clones: 0,
        width_mm: 600,
        height_mm: 340,
        subpixel: SubPixel::Unknown,
    }
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Builds a device with `crtc_count` scripted crtcs tagged `crtc0`,
/// `crtc1`, ... and a shared call log.
pub(crate) fn test_device(crtc_count: usize) -> (TestDevice, CallLog) {
    init_logging();
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let fb_handler = Arc::new(ScriptedFb::new(log.clone()));
    let device = Device::new(SizeLimits::default(), fb_handler.clone()).unwrap();

    let mut crtcs = Vec::new();
    let mut crtc_backends = Vec::new();
    for i in 0..crtc_count {
        let backend = Arc::new(ScriptedCrtc::logged(format!("crtc{i}"), log.clone()));
        crtcs.push(device.create_crtc(backend.clone()).unwrap());
        crtc_backends.push(backend);
    }

    (
        TestDevice {
            device,
            crtcs,
            crtc_backends,
            fb_handler,
            log: log.clone(),
        },
        log,
    )
}

pub(crate) fn fb_info(width: u32, height: u32) -> FramebufferInfo {
    FramebufferInfo {
        width,
        height,
        pitch: width * 4,
        depth: 24,
        bits_per_pixel: 32,
        buffer: BufferHandle(0xdead_beef),
    }
}

pub(crate) fn mode_1080p() -> ModeInfo {
    ModeInfo {
        name: "1920x1080".into(),
        clock: 148_500,
        hdisplay: 1920,
        hsync_start: 2008,
        hsync_end: 2052,
        htotal: 2200,
        hskew: 0,
        vdisplay: 1080,
        vsync_start: 1084,
        vsync_end: 1089,
        vtotal: 1125,
        vscan: 0,
        vrefresh: 0,
        flags: ModeFlags::PHSYNC | ModeFlags::PVSYNC,
        kind: ModeKind::DRIVER,
    }
}

pub(crate) fn mode_720p() -> ModeInfo {
    ModeInfo {
        name: "1280x720".into(),
        clock: 74_250,
        hdisplay: 1280,
        hsync_start: 1390,
        hsync_end: 1430,
        htotal: 1650,
        hskew: 0,
        vdisplay: 720,
        vsync_start: 725,
        vsync_end: 730,
        vtotal: 750,
        vscan: 0,
        vrefresh: 0,
        flags: ModeFlags::PHSYNC | ModeFlags::PVSYNC,
        kind: ModeKind::DRIVER,
    }
}
