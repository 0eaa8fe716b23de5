//! The per-device mode configuration context
//!
//! [`Device`] owns everything the state manager tracks for one graphics
//! device: the identifier registry, the entity collections (outputs,
//! crtcs, framebuffers, properties, blobs), the device-wide size limits
//! and the hotplug counter. There is no process-wide singleton; a driver
//! constructs a `Device`, registers its crtcs and outputs with their
//! capability hooks, and hands the device to whoever marshals requests.
//!
//! One coarse exclusive region protects the whole store: every public
//! entry point locks it for its full duration, so partial state of a
//! configuration transaction is never visible to other callers. The
//! capability hooks run with the region held and must not re-enter the
//! device (see [`crate::backend`]).

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, info_span, instrument};

use crate::assign;
use crate::backend::{CrtcBackend, DpmsMode, FramebufferHandler, OutputBackend};
use crate::config::{self, ModeRequest};
use crate::crtc::Crtc;
use crate::error::Error;
use crate::framebuffer::{BufferHandle, Framebuffer, FramebufferInfo};
use crate::mode::{Mode, ModeInfo, ModeKind};
use crate::output::{ConnectionStatus, Output, OutputSettings, OutputType, PropertyValue, SubPixel};
use crate::probe;
use crate::property::{Property, PropertyBlob, PropertyEnumEntry, PropertyFlags};
use crate::registry::{ObjectId, ObjectKind, Registry};

/// Names for the standard connector type property, one entry per
/// physical connector variant
const CONNECTOR_TYPES: &[(u64, &str)] = &[
    (0, "Unknown"),
    (1, "VGA"),
    (2, "DVI-I"),
    (3, "DVI-D"),
    (4, "DVI-A"),
    (5, "Composite"),
    (6, "SVIDEO"),
    (7, "LVDS"),
    (8, "Component"),
    (9, "9-pin DIN"),
    (10, "DisplayPort"),
    (11, "HDMI Type A"),
    (12, "HDMI Type B"),
];

const DPMS_LEVELS: [DpmsMode; 4] = [
    DpmsMode::On,
    DpmsMode::Standby,
    DpmsMode::Suspend,
    DpmsMode::Off,
];

/// Device-wide framebuffer and mode dimension limits
#[derive(Debug, Clone, Copy)]
pub struct SizeLimits {
    /// Minimum framebuffer width
    pub min_width: u32,
    /// Minimum framebuffer height
    pub min_height: u32,
    /// Maximum framebuffer width
    pub max_width: u32,
    /// Maximum framebuffer height
    pub max_height: u32,
}

impl Default for SizeLimits {
    fn default() -> Self {
        SizeLimits {
            min_width: 0,
            min_height: 0,
            max_width: 4096,
            max_height: 4096,
        }
    }
}

/// Ids of the TV specific property bundle created by
/// [`Device::create_tv_properties`]
#[derive(Debug, Clone, Copy)]
pub struct TvProperties {
    /// Left margin, range `[0, 100]`
    pub left_margin: ObjectId,
    /// Right margin, range `[0, 100]`
    pub right_margin: ObjectId,
    /// Top margin, range `[0, 100]`
    pub top_margin: ObjectId,
    /// Bottom margin, range `[0, 100]`
    pub bottom_margin: ObjectId,
    /// TV signal format, one enum entry per supported format
    pub mode: ObjectId,
}

/// Resource counts and id lists of a device, for a transport layer to
/// marshal
#[derive(Debug, Clone)]
pub struct ResourceSummary {
    /// Minimum framebuffer width
    pub min_width: u32,
    /// Minimum framebuffer height
    pub min_height: u32,
    /// Maximum framebuffer width
    pub max_width: u32,
    /// Maximum framebuffer height
    pub max_height: u32,
    /// Live framebuffer ids, device order
    pub framebuffers: Vec<ObjectId>,
    /// Live crtc ids, device order
    pub crtcs: Vec<ObjectId>,
    /// Live output ids, device order
    pub outputs: Vec<ObjectId>,
}

/// Current configuration of one crtc
#[derive(Debug, Clone)]
pub struct CrtcSnapshot {
    /// The crtc
    pub id: ObjectId,
    /// Scan-out origin
    pub x: i32,
    /// Scan-out origin
    pub y: i32,
    /// Bound framebuffer, if any
    pub framebuffer: Option<ObjectId>,
    /// Current mode; `Some` only while the crtc is enabled
    pub mode: Option<ModeInfo>,
    /// Bitmask of device-order output indices bound to this crtc
    pub outputs: u32,
}

/// Current state of one output
#[derive(Debug, Clone)]
pub struct OutputSnapshot {
    /// The output
    pub id: ObjectId,
    /// Electrical classification
    pub output_type: OutputType,
    /// Index within outputs of the same type, starting at 1
    pub type_id: u32,
    /// User visible name, e.g. `TMDS-1`
    pub name: String,
    /// Physical width in millimeters
    pub width_mm: u32,
    /// Physical height in millimeters
    pub height_mm: u32,
    /// Subpixel layout
    pub subpixel: SubPixel,
    /// Connection state of the last probe
    pub status: ConnectionStatus,
    /// Bound crtc, if any
    pub crtc: Option<ObjectId>,
    /// Crtc eligibility bitmask
    pub possible_crtcs: u32,
    /// Clone group bitmask
    pub possible_clones: u32,
    /// The usable (validated, sorted) mode list
    pub modes: Vec<ModeInfo>,
    /// Attached property id/value pairs
    pub properties: Vec<PropertyValue>,
}

/// Definition and side lists of one property
#[derive(Debug, Clone)]
pub struct PropertySnapshot {
    /// The property
    pub id: ObjectId,
    /// Property name
    pub name: String,
    /// Type and mutability flags
    pub flags: PropertyFlags,
    /// The value table
    pub values: Vec<u64>,
    /// Named choices of an enum property
    pub enum_entries: Vec<PropertyEnumEntry>,
    /// Blob id and payload length per registered blob
    pub blobs: Vec<BlobRef>,
}

/// Reference to a property blob
#[derive(Debug, Clone, Copy)]
pub struct BlobRef {
    /// The blob
    pub id: ObjectId,
    /// Payload length in bytes
    pub length: usize,
}

#[derive(Debug)]
pub(crate) struct ModeConfig {
    pub(crate) registry: Registry,
    pub(crate) outputs: Vec<Output>,
    pub(crate) crtcs: Vec<Crtc>,
    pub(crate) framebuffers: Vec<Framebuffer>,
    pub(crate) properties: Vec<Property>,
    pub(crate) blobs: Vec<PropertyBlob>,
    pub(crate) limits: SizeLimits,
    pub(crate) hotplug_counter: u32,
    pub(crate) fb_handler: Arc<dyn FramebufferHandler>,
    edid_property: ObjectId,
    dpms_property: ObjectId,
    connector_type_property: ObjectId,
    connector_id_property: ObjectId,
}

impl ModeConfig {
    pub(crate) fn output_index(&self, id: ObjectId) -> Result<usize, Error> {
        self.registry.expect(id, ObjectKind::Output)?;
        self.outputs
            .iter()
            .position(|o| o.id == id)
            .ok_or(Error::NotFound(id))
    }

    pub(crate) fn crtc_index(&self, id: ObjectId) -> Result<usize, Error> {
        self.registry.expect(id, ObjectKind::Crtc)?;
        self.crtcs
            .iter()
            .position(|c| c.id == id)
            .ok_or(Error::NotFound(id))
    }

    pub(crate) fn framebuffer_index(&self, id: ObjectId) -> Result<usize, Error> {
        self.registry.expect(id, ObjectKind::Framebuffer)?;
        self.framebuffers
            .iter()
            .position(|f| f.id == id)
            .ok_or(Error::NotFound(id))
    }

    fn property_index(&self, id: ObjectId) -> Result<usize, Error> {
        self.registry.expect(id, ObjectKind::Property)?;
        self.properties
            .iter()
            .position(|p| p.id == id)
            .ok_or(Error::NotFound(id))
    }

    fn blob_index(&self, id: ObjectId) -> Result<usize, Error> {
        self.registry.expect(id, ObjectKind::Blob)?;
        self.blobs
            .iter()
            .position(|b| b.id == id)
            .ok_or(Error::NotFound(id))
    }

    pub(crate) fn register_framebuffer(&mut self, info: FramebufferInfo) -> Result<ObjectId, Error> {
        if info.width < self.limits.min_width || info.width > self.limits.max_width {
            return Err(Error::InvalidArgument("framebuffer width not within limits"));
        }
        if info.height < self.limits.min_height || info.height > self.limits.max_height {
            return Err(Error::InvalidArgument(
                "framebuffer height not within limits",
            ));
        }
        let id = self.registry.allocate(ObjectKind::Framebuffer)?;
        self.framebuffers.push(Framebuffer { id, info });
        Ok(id)
    }

    fn create_blob(&mut self, property: ObjectId, data: &[u8]) -> Result<ObjectId, Error> {
        if data.is_empty() {
            return Err(Error::InvalidArgument("empty blob payload"));
        }
        let pi = self.property_index(property)?;
        let id = self.registry.allocate(ObjectKind::Blob)?;
        self.blobs.push(PropertyBlob {
            id,
            data: data.to_vec(),
        });
        self.properties[pi].blobs.push(id);
        Ok(id)
    }

    fn destroy_blob(&mut self, id: ObjectId) {
        if let Some(index) = self.blobs.iter().position(|b| b.id == id) {
            self.blobs.remove(index);
            self.registry.release(id);
        }
        for property in &mut self.properties {
            property.blobs.retain(|&b| b != id);
        }
    }

    fn release_mode_list(&mut self, modes: Vec<Mode>) {
        for mode in modes {
            self.registry.release(mode.id);
        }
    }
}

/// A graphics device's mode configuration state manager.
///
/// See the [module documentation](self) for the ownership and locking
/// model.
#[derive(Debug)]
pub struct Device {
    inner: Mutex<ModeConfig>,
    span: tracing::Span,
}

impl Device {
    /// Creates an empty mode configuration and registers the standard
    /// output properties (EDID, DPMS, connector type, connector id).
    pub fn new(
        limits: SizeLimits,
        fb_handler: Arc<dyn FramebufferHandler>,
    ) -> Result<Self, Error> {
        let span = info_span!("kms_device");
        let _guard = span.enter();
        info!("Initializing mode configuration");

        let mut registry = Registry::new();
        let mut properties = Vec::new();

        let edid_property = registry.allocate(ObjectKind::Property)?;
        properties.push(Property::new(
            edid_property,
            PropertyFlags::BLOB | PropertyFlags::IMMUTABLE,
            "EDID",
            0,
        ));

        let dpms_property = registry.allocate(ObjectKind::Property)?;
        let mut dpms = Property::new(dpms_property, PropertyFlags::ENUM, "DPMS", DPMS_LEVELS.len());
        for (i, level) in DPMS_LEVELS.iter().enumerate() {
            dpms.add_enum_entry(i, level.value(), level.name())?;
        }
        properties.push(dpms);

        let connector_type_property = registry.allocate(ObjectKind::Property)?;
        let mut connector_type = Property::new(
            connector_type_property,
            PropertyFlags::ENUM | PropertyFlags::IMMUTABLE,
            "Connector Type",
            CONNECTOR_TYPES.len(),
        );
        for (i, &(value, name)) in CONNECTOR_TYPES.iter().enumerate() {
            connector_type.add_enum_entry(i, value, name)?;
        }
        properties.push(connector_type);

        let connector_id_property = registry.allocate(ObjectKind::Property)?;
        let mut connector_id = Property::new(
            connector_id_property,
            PropertyFlags::RANGE | PropertyFlags::IMMUTABLE,
            "Connector ID",
            2,
        );
        connector_id.values[0] = 0;
        connector_id.values[1] = 20;
        properties.push(connector_id);

        drop(_guard);
        Ok(Device {
            inner: Mutex::new(ModeConfig {
                registry,
                outputs: Vec::new(),
                crtcs: Vec::new(),
                framebuffers: Vec::new(),
                properties,
                blobs: Vec::new(),
                limits,
                hotplug_counter: 0,
                fb_handler,
                edid_property,
                dpms_property,
                connector_type_property,
                connector_id_property,
            }),
            span,
        })
    }

    fn lock(&self) -> MutexGuard<'_, ModeConfig> {
        self.inner.lock().unwrap()
    }

    #[cfg(test)]
    pub(crate) fn with_config<R>(&self, f: impl FnOnce(&ModeConfig) -> R) -> R {
        f(&self.lock())
    }

    /// Id of the standard EDID blob property
    pub fn edid_property(&self) -> ObjectId {
        self.lock().edid_property
    }

    /// Id of the standard DPMS enum property
    pub fn dpms_property(&self) -> ObjectId {
        self.lock().dpms_property
    }

    /// Id of the standard connector type property
    pub fn connector_type_property(&self) -> ObjectId {
        self.lock().connector_type_property
    }

    /// Id of the standard connector id property
    pub fn connector_id_property(&self) -> ObjectId {
        self.lock().connector_id_property
    }

    /// Monotonic counter bumped on every hotplug event, for change
    /// detection by polling callers
    pub fn hotplug_counter(&self) -> u32 {
        self.lock().hotplug_counter
    }

    // ------------------------------------------------------------------
    // Entity creation and destruction

    /// Registers a new crtc with its driver hooks
    pub fn create_crtc(&self, backend: Arc<dyn CrtcBackend>) -> Result<ObjectId, Error> {
        let mut config = self.lock();
        let id = config.registry.allocate(ObjectKind::Crtc)?;
        config.crtcs.push(Crtc::new(id, backend));
        Ok(id)
    }

    /// Removes a crtc, invoking its cleanup hook
    pub fn destroy_crtc(&self, crtc: ObjectId) -> Result<(), Error> {
        let mut config = self.lock();
        let ci = config.crtc_index(crtc)?;
        let removed = config.crtcs.remove(ci);
        removed.backend.cleanup();
        config.registry.release(crtc);
        Ok(())
    }

    /// Registers a new output with its driver hooks.
    ///
    /// The standard EDID and DPMS properties are attached with value 0.
    #[instrument(parent = &self.span, skip(self, backend, settings))]
    pub fn create_output(
        &self,
        settings: OutputSettings,
        backend: Arc<dyn OutputBackend>,
    ) -> Result<ObjectId, Error> {
        let mut config = self.lock();
        let id = config.registry.allocate(ObjectKind::Output)?;
        let type_id = config
            .outputs
            .iter()
            .filter(|o| o.output_type == settings.output_type)
            .count() as u32
            + 1;
        let mut output = Output::new(id, type_id, settings, backend);
        info!("Initializing output {}", output.name());

        let edid = config.edid_property;
        let dpms = config.dpms_property;
        // a fresh table always has room for the two standard properties
        let _ = output.attach_property(edid, 0);
        let _ = output.attach_property(dpms, 0);
        config.outputs.push(output);
        Ok(id)
    }

    /// Removes an output: cleanup hook first, then its mode lists are
    /// released along with the output's id
    pub fn destroy_output(&self, output: ObjectId) -> Result<(), Error> {
        let mut config = self.lock();
        let oi = config.output_index(output)?;
        let removed = config.outputs.remove(oi);
        removed.backend.cleanup();
        config.release_mode_list(removed.usable);
        config.release_mode_list(removed.user);
        if let Some(blob) = removed.edid_blob {
            config.destroy_blob(blob);
        }
        config.registry.release(output);
        Ok(())
    }

    /// Registers framebuffer metadata for a caller-owned pixel buffer
    pub fn create_framebuffer(&self, info: FramebufferInfo) -> Result<ObjectId, Error> {
        self.lock().register_framebuffer(info)
    }

    /// Destroys a framebuffer, nulling the reference of every crtc
    /// currently scanning it out
    pub fn destroy_framebuffer(&self, fb: ObjectId) -> Result<(), Error> {
        let mut config = self.lock();
        let fi = config.framebuffer_index(fb)?;
        for crtc in &mut config.crtcs {
            if crtc.fb == Some(fb) {
                crtc.fb = None;
            }
        }
        config.framebuffers.remove(fi);
        config.registry.release(fb);
        Ok(())
    }

    /// Swaps the metadata and backing buffer of a live framebuffer and
    /// rebases every crtc scanning it out (where the crtc supports it)
    pub fn replace_framebuffer(&self, fb: ObjectId, info: FramebufferInfo) -> Result<(), Error> {
        let mut config = self.lock();
        let fi = config.framebuffer_index(fb)?;
        config.framebuffers[fi].info = info;
        for crtc in &config.crtcs {
            if crtc.fb == Some(fb) && crtc.backend.has_set_base() {
                crtc.backend.set_base(crtc.x, crtc.y);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Properties

    /// Creates a property with a value table of `value_count` slots
    pub fn create_property(
        &self,
        flags: PropertyFlags,
        name: &str,
        value_count: usize,
    ) -> Result<ObjectId, Error> {
        let mut config = self.lock();
        let id = config.registry.allocate(ObjectKind::Property)?;
        config
            .properties
            .push(Property::new(id, flags, name, value_count));
        Ok(id)
    }

    /// Sets a range property's bounds, `values[0]` and `values[1]`
    pub fn set_property_range(
        &self,
        property: ObjectId,
        min: u64,
        max: u64,
    ) -> Result<(), Error> {
        let mut config = self.lock();
        let pi = config.property_index(property)?;
        let prop = &mut config.properties[pi];
        if !prop.flags.contains(PropertyFlags::RANGE) || prop.values.len() < 2 {
            return Err(Error::InvalidArgument("property is not a range"));
        }
        prop.values[0] = min;
        prop.values[1] = max;
        Ok(())
    }

    /// Registers a named choice of an enum property; re-registering an
    /// existing value renames it in place
    pub fn add_enum_entry(
        &self,
        property: ObjectId,
        index: usize,
        value: u64,
        name: &str,
    ) -> Result<(), Error> {
        let mut config = self.lock();
        let pi = config.property_index(property)?;
        config.properties[pi].add_enum_entry(index, value, name)
    }

    /// Destroys a property: blobs and enum side entries are released
    /// first, then the property's own id
    pub fn destroy_property(&self, property: ObjectId) -> Result<(), Error> {
        let mut config = self.lock();
        let pi = config.property_index(property)?;
        let removed = config.properties.remove(pi);
        for blob in removed.blobs {
            if let Some(index) = config.blobs.iter().position(|b| b.id == blob) {
                config.blobs.remove(index);
                config.registry.release(blob);
            }
        }
        config.registry.release(property);
        Ok(())
    }

    /// Creates the TV specific property bundle: four margin ranges and
    /// one format enum with an entry per name in `formats`
    pub fn create_tv_properties(&self, formats: &[&str]) -> Result<TvProperties, Error> {
        let margin = |config: &mut ModeConfig, name: &str, flags| -> Result<ObjectId, Error> {
            let id = config.registry.allocate(ObjectKind::Property)?;
            let mut property = Property::new(id, flags, name, 2);
            property.values[0] = 0;
            property.values[1] = 100;
            config.properties.push(property);
            Ok(id)
        };

        let mut config = self.lock();
        let left_margin = margin(
            &mut config,
            "left margin",
            PropertyFlags::RANGE | PropertyFlags::IMMUTABLE,
        )?;
        let right_margin = margin(&mut config, "right margin", PropertyFlags::RANGE)?;
        let top_margin = margin(&mut config, "top margin", PropertyFlags::RANGE)?;
        let bottom_margin = margin(&mut config, "bottom margin", PropertyFlags::RANGE)?;

        let mode = config.registry.allocate(ObjectKind::Property)?;
        let mut format = Property::new(mode, PropertyFlags::ENUM, "mode", formats.len());
        for (i, name) in formats.iter().enumerate() {
            format.add_enum_entry(i, i as u64, name)?;
        }
        config.properties.push(format);

        Ok(TvProperties {
            left_margin,
            right_margin,
            top_margin,
            bottom_margin,
            mode,
        })
    }

    /// Attaches a property to an output with an initial value.
    ///
    /// The attachment table has a fixed capacity of
    /// [`OUTPUT_MAX_PROPERTIES`](crate::output::OUTPUT_MAX_PROPERTIES)
    /// slots.
    pub fn attach_property(
        &self,
        output: ObjectId,
        property: ObjectId,
        initial_value: u64,
    ) -> Result<(), Error> {
        let mut config = self.lock();
        let oi = config.output_index(output)?;
        config.property_index(property)?;
        config.outputs[oi]
            .attach_property(property, initial_value)
            .ok_or(Error::AttachmentFull(output))
    }

    /// Stores a property value for an output without domain validation.
    ///
    /// This is the driver-side write path; callers go through
    /// [`validate_and_set`](Device::validate_and_set).
    pub fn set_property_value(
        &self,
        output: ObjectId,
        property: ObjectId,
        value: u64,
    ) -> Result<(), Error> {
        let mut config = self.lock();
        let oi = config.output_index(output)?;
        let slot = config.outputs[oi]
            .property_slot(property)
            .ok_or(Error::NotAttached { output, property })?;
        config.outputs[oi].properties[slot] = Some(PropertyValue { property, value });
        Ok(())
    }

    /// Reads the value of a property attached to an output
    pub fn property_value(&self, output: ObjectId, property: ObjectId) -> Result<u64, Error> {
        let config = self.lock();
        let oi = config.output_index(output)?;
        let slot = config.outputs[oi]
            .property_slot(property)
            .ok_or(Error::NotAttached { output, property })?;
        Ok(config.outputs[oi].properties[slot]
            .as_ref()
            .map(|pv| pv.value)
            .unwrap_or(0))
    }

    /// The transactional property write path exposed to callers.
    ///
    /// Rejects immutable properties, values outside a range property's
    /// bounds and values missing from a discrete property's value set;
    /// otherwise delegates to the output's `set_property` hook and, on
    /// its acceptance, stores the value.
    #[instrument(parent = &self.span, skip(self))]
    pub fn validate_and_set(
        &self,
        output: ObjectId,
        property: ObjectId,
        value: u64,
    ) -> Result<(), Error> {
        let mut config = self.lock();
        let oi = config.output_index(output)?;
        let slot = config.outputs[oi]
            .property_slot(property)
            .ok_or(Error::NotAttached { output, property })?;
        let pi = config.property_index(property)?;
        config.properties[pi].validate_value(value)?;

        let backend = config.outputs[oi].backend.clone();
        backend.set_property(property, value)?;

        config.outputs[oi].properties[slot] = Some(PropertyValue { property, value });
        Ok(())
    }

    /// Replaces the EDID blob of an output and rewrites the standard
    /// EDID property value to the id of the new blob
    pub fn update_edid(&self, output: ObjectId, edid: &[u8]) -> Result<ObjectId, Error> {
        let mut config = self.lock();
        let oi = config.output_index(output)?;
        let property = config.edid_property;
        let slot = config.outputs[oi]
            .property_slot(property)
            .ok_or(Error::NotAttached { output, property })?;

        if let Some(old) = config.outputs[oi].edid_blob.take() {
            config.destroy_blob(old);
        }
        let blob = config.create_blob(property, edid)?;
        config.outputs[oi].edid_blob = Some(blob);
        config.outputs[oi].properties[slot] = Some(PropertyValue {
            property,
            value: blob.get() as u64,
        });
        Ok(blob)
    }

    // ------------------------------------------------------------------
    // User modes

    /// Attaches a caller-supplied mode to an output.
    ///
    /// User modes persist across probe cycles and are kept separate
    /// from the probed/usable lists.
    pub fn attach_user_mode(&self, output: ObjectId, info: ModeInfo) -> Result<ObjectId, Error> {
        let mut config = self.lock();
        let oi = config.output_index(output)?;
        let id = config.registry.allocate(ObjectKind::Mode)?;
        let mut mode = Mode::new(id, info);
        mode.info.kind |= ModeKind::USERDEF;
        config.outputs[oi].user.push(mode);
        Ok(id)
    }

    /// Detaches the first user mode matching `info` on timing equality
    pub fn detach_user_mode(&self, output: ObjectId, info: &ModeInfo) -> Result<(), Error> {
        let mut config = self.lock();
        let oi = config.output_index(output)?;
        let index = config.outputs[oi]
            .user
            .iter()
            .position(|m| m.info.same_timings(info))
            .ok_or(Error::InvalidArgument("no matching user mode"))?;
        let removed = config.outputs[oi].user.remove(index);
        config.registry.release(removed.id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Probing, assignment, configuration

    /// Re-detects one output and rebuilds its usable mode list.
    ///
    /// Pass zero for either bound to skip size filtering.
    #[instrument(parent = &self.span, skip(self))]
    pub fn probe_output(
        &self,
        output: ObjectId,
        max_width: u16,
        max_height: u16,
    ) -> Result<(), Error> {
        probe::probe_output(&mut self.lock(), output, max_width, max_height)
    }

    /// Probes every output of the device
    #[instrument(parent = &self.span, skip(self))]
    pub fn probe_all(&self, max_width: u16, max_height: u16) -> Result<(), Error> {
        probe::probe_all(&mut self.lock(), max_width, max_height)
    }

    /// Recomputes the output-to-crtc assignment for the whole device.
    ///
    /// Greedy and deterministic; see [`crate::assign`]'s notes in the
    /// module source for the clone rules.
    #[instrument(parent = &self.span, skip(self))]
    pub fn assign_crtcs(&self) {
        assign::assign_crtcs(&mut self.lock());
    }

    /// Applies a caller-specified configuration request.
    ///
    /// All-or-nothing with respect to tracked entity state: on
    /// [`Error::ModeRejected`] every output binding and the crtc's
    /// enabled/mode/position are restored from the pre-call snapshot.
    #[instrument(parent = &self.span, skip(self))]
    pub fn set_config(&self, request: &ModeRequest) -> Result<(), Error> {
        config::set_config(&mut self.lock(), request)
    }

    /// Computes and applies a sane initial configuration: probe,
    /// assign, framebuffer probing, mode apply and a disable sweep
    #[instrument(parent = &self.span, skip(self))]
    pub fn initial_config(&self) -> Result<(), Error> {
        config::initial_config(&mut self.lock())
    }

    /// Handles a connection change on `output`.
    ///
    /// Bumps the hotplug counter; a disconnect does nothing beyond
    /// that. On a connect the output is re-probed and, if it had no
    /// prior configuration, assignment is re-run. Returns whether a
    /// configuration was (re-)applied.
    #[instrument(parent = &self.span, skip(self))]
    pub fn hotplug(&self, output: ObjectId, connected: bool) -> Result<bool, Error> {
        config::hotplug(&mut self.lock(), output, connected)
    }

    // ------------------------------------------------------------------
    // Cursor

    /// Binds (or with `None` hides) a cursor image on a crtc
    pub fn set_cursor(
        &self,
        crtc: ObjectId,
        buffer: Option<BufferHandle>,
        width: u32,
        height: u32,
    ) -> Result<(), Error> {
        let config = self.lock();
        let ci = config.crtc_index(crtc)?;
        if !config.crtcs[ci].backend.cursor_set(buffer, width, height) {
            return Err(Error::CursorNotSupported(crtc));
        }
        Ok(())
    }

    /// Moves the cursor of a crtc
    pub fn move_cursor(&self, crtc: ObjectId, x: i32, y: i32) -> Result<(), Error> {
        let config = self.lock();
        let ci = config.crtc_index(crtc)?;
        if !config.crtcs[ci].backend.cursor_move(x, y) {
            return Err(Error::CursorNotSupported(crtc));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read side

    /// Resource counts, id lists and device limits
    pub fn resources(&self) -> ResourceSummary {
        let config = self.lock();
        ResourceSummary {
            min_width: config.limits.min_width,
            min_height: config.limits.min_height,
            max_width: config.limits.max_width,
            max_height: config.limits.max_height,
            framebuffers: config.framebuffers.iter().map(|f| f.id).collect(),
            crtcs: config.crtcs.iter().map(|c| c.id).collect(),
            outputs: config.outputs.iter().map(|o| o.id).collect(),
        }
    }

    /// Current configuration of one crtc
    pub fn crtc_snapshot(&self, crtc: ObjectId) -> Result<CrtcSnapshot, Error> {
        let config = self.lock();
        let ci = config.crtc_index(crtc)?;
        let c = &config.crtcs[ci];
        let mut outputs = 0u32;
        for (oi, output) in config.outputs.iter().enumerate() {
            if output.crtc == Some(crtc) {
                outputs |= 1 << oi;
            }
        }
        Ok(CrtcSnapshot {
            id: c.id,
            x: c.x,
            y: c.y,
            framebuffer: c.fb,
            mode: if c.enabled { c.mode.clone() } else { None },
            outputs,
        })
    }

    /// Current state of one output
    pub fn output_snapshot(&self, output: ObjectId) -> Result<OutputSnapshot, Error> {
        let config = self.lock();
        let oi = config.output_index(output)?;
        let o = &config.outputs[oi];
        Ok(OutputSnapshot {
            id: o.id,
            output_type: o.output_type,
            type_id: o.type_id,
            name: o.name(),
            width_mm: o.width_mm,
            height_mm: o.height_mm,
            subpixel: o.subpixel,
            status: o.status,
            crtc: o.crtc,
            possible_crtcs: o.possible_crtcs,
            possible_clones: o.possible_clones,
            modes: o.usable.iter().map(|m| m.info.clone()).collect(),
            properties: o.properties.iter().filter_map(|slot| *slot).collect(),
        })
    }

    /// Metadata of one framebuffer
    pub fn framebuffer_info(&self, fb: ObjectId) -> Result<FramebufferInfo, Error> {
        let config = self.lock();
        let fi = config.framebuffer_index(fb)?;
        Ok(config.framebuffers[fi].info.clone())
    }

    /// Definition and side lists of one property
    pub fn property_snapshot(&self, property: ObjectId) -> Result<PropertySnapshot, Error> {
        let config = self.lock();
        let pi = config.property_index(property)?;
        let p = &config.properties[pi];
        let blobs = p
            .blobs
            .iter()
            .filter_map(|&id| {
                config
                    .blobs
                    .iter()
                    .find(|b| b.id == id)
                    .map(|b| BlobRef {
                        id,
                        length: b.data.len(),
                    })
            })
            .collect();
        Ok(PropertySnapshot {
            id: p.id,
            name: p.name.clone(),
            flags: p.flags,
            values: p.values.to_vec(),
            enum_entries: p.enum_entries.clone(),
            blobs,
        })
    }

    /// Payload of a property blob
    pub fn blob_data(&self, blob: ObjectId) -> Result<Vec<u8>, Error> {
        let config = self.lock();
        let bi = config.blob_index(blob)?;
        Ok(config.blobs[bi].data.clone())
    }

    // ------------------------------------------------------------------
    // Teardown

    /// Tears the whole configuration down: outputs first (cleanup hooks
    /// and mode lists), then properties, framebuffers (with their
    /// `fb_remove` notifications) and crtcs.
    pub fn cleanup(&self) {
        let mut config = self.lock();
        debug!("Tearing down mode configuration");

        while let Some(output) = config.outputs.pop() {
            output.backend.cleanup();
            config.release_mode_list(output.usable);
            config.release_mode_list(output.user);
        }

        config.properties.clear();
        config.blobs.clear();

        let handler = config.fb_handler.clone();
        while let Some(fb) = config.framebuffers.pop() {
            handler.fb_remove(fb.id);
        }

        while let Some(crtc) = config.crtcs.pop() {
            crtc.backend.cleanup();
        }

        config.registry.clear();
    }
}
