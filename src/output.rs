//! Display output entities
//!
//! An output abstracts one display connector/sink. Outputs are created
//! by the driver at device init and persist for the device lifetime;
//! the prober, the assignment engine and configuration transactions
//! mutate their state through the [`Device`](crate::device::Device).

use std::sync::Arc;

use crate::backend::OutputBackend;
use crate::mode::{Mode, ModeInfo};
use crate::registry::ObjectId;

/// Fixed capacity of an output's property attachment table.
///
/// A hard limit, not a growable collection; attaching beyond it reports
/// [`AttachmentFull`](crate::error::Error::AttachmentFull).
pub const OUTPUT_MAX_PROPERTIES: usize = 16;

/// Connection state of an output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// A sink is attached
    Connected,
    /// No sink attached
    Disconnected,
    /// Detection was inconclusive
    Unknown,
}

impl ConnectionStatus {
    /// Display name, e.g. for logging
    pub fn name(self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Unknown => "unknown",
        }
    }
}

/// Electrical classification of an output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputType {
    /// Unclassified
    None,
    /// Analog DAC (VGA style)
    Dac,
    /// TMDS (DVI/HDMI style)
    Tmds,
    /// Integrated flat panel
    Lvds,
    /// TV encoder DAC
    TvDac,
}

impl OutputType {
    /// Name used as the prefix of the output name
    pub fn name(self) -> &'static str {
        match self {
            OutputType::None => "None",
            OutputType::Dac => "DAC",
            OutputType::Tmds => "TMDS",
            OutputType::Lvds => "LVDS",
            OutputType::TvDac => "TV",
        }
    }
}

/// Subpixel geometry of the sink, as far as it is known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubPixel {
    /// Unknown geometry
    Unknown,
    /// Horizontal RGB stripes
    HorizontalRgb,
    /// Horizontal BGR stripes
    HorizontalBgr,
    /// Vertical RGB stripes
    VerticalRgb,
    /// Vertical BGR stripes
    VerticalBgr,
    /// No subpixel structure
    None,
}

/// Driver-supplied description of a new output
#[derive(Debug, Clone)]
pub struct OutputSettings {
    /// Electrical classification
    pub output_type: OutputType,
    /// Bitmask of crtc indices this output can be driven by
    pub possible_crtcs: u32,
    /// Clone group bitmask; two outputs sharing a bit may be cloned
    pub possible_clones: u32,
    /// Physical width in millimeters
    pub width_mm: u32,
    /// Physical height in millimeters
    pub height_mm: u32,
    /// Subpixel layout of the sink
    pub subpixel: SubPixel,
}

/// One property id/value pair attached to an output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyValue {
    /// The attached property
    pub property: ObjectId,
    /// Its current value for this output
    pub value: u64,
}

#[derive(Debug)]
pub(crate) struct Output {
    pub(crate) id: ObjectId,
    pub(crate) output_type: OutputType,
    pub(crate) type_id: u32,
    pub(crate) status: ConnectionStatus,
    pub(crate) width_mm: u32,
    pub(crate) height_mm: u32,
    pub(crate) subpixel: SubPixel,
    /// Raw detection results of the latest probe cycle, insertion order
    pub(crate) probed: Vec<ModeInfo>,
    /// Validated and sorted modes, the ones exposed to assignment
    pub(crate) usable: Vec<Mode>,
    /// Caller-attached modes, persist across probes
    pub(crate) user: Vec<Mode>,
    pub(crate) possible_crtcs: u32,
    pub(crate) possible_clones: u32,
    /// Currently bound crtc, resolved through the store at use time
    pub(crate) crtc: Option<ObjectId>,
    pub(crate) properties: [Option<PropertyValue>; OUTPUT_MAX_PROPERTIES],
    /// Blob currently backing the EDID property, if any
    pub(crate) edid_blob: Option<ObjectId>,
    pub(crate) backend: Arc<dyn OutputBackend>,
}

impl Output {
    pub(crate) fn new(
        id: ObjectId,
        type_id: u32,
        settings: OutputSettings,
        backend: Arc<dyn OutputBackend>,
    ) -> Self {
        Output {
            id,
            output_type: settings.output_type,
            type_id,
            status: ConnectionStatus::Unknown,
            width_mm: settings.width_mm,
            height_mm: settings.height_mm,
            subpixel: settings.subpixel,
            probed: Vec::new(),
            usable: Vec::new(),
            user: Vec::new(),
            possible_crtcs: settings.possible_crtcs,
            possible_clones: settings.possible_clones,
            crtc: None,
            properties: [None; OUTPUT_MAX_PROPERTIES],
            edid_blob: None,
            backend,
        }
    }

    /// User visible name, e.g. `LVDS-1`
    pub(crate) fn name(&self) -> String {
        format!("{}-{}", self.output_type.name(), self.type_id)
    }

    pub(crate) fn attach_property(&mut self, property: ObjectId, value: u64) -> Option<()> {
        let slot = self.properties.iter_mut().find(|slot| slot.is_none())?;
        *slot = Some(PropertyValue { property, value });
        Some(())
    }

    pub(crate) fn property_slot(&self, property: ObjectId) -> Option<usize> {
        self.properties
            .iter()
            .position(|slot| matches!(slot, Some(pv) if pv.property == property))
    }
}
