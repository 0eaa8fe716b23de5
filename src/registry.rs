//! Per-device identifier registry
//!
//! Every entity of a device (modes, outputs, crtcs, framebuffers,
//! properties, property blobs) is addressed by a small dense integer
//! handle allocated here. `0` is reserved as "unset" and is made
//! unrepresentable by backing [`ObjectId`] with a [`NonZeroU32`], so
//! nullable references are modeled as `Option<ObjectId>`.

use std::collections::{BTreeSet, HashMap};
use std::num::NonZeroU32;

use crate::error::Error;

/// Handle of an object in one device's identifier space.
///
/// Ids are only meaningful relative to the [`Device`](crate::device::Device)
/// that allocated them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(NonZeroU32);

impl ObjectId {
    /// Returns the raw integer value of the handle
    pub fn get(self) -> u32 {
        self.0.get()
    }

    pub(crate) fn from_raw(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(ObjectId)
    }
}

/// Kind of entity an id resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// A display timing descriptor
    Mode,
    /// A display connector/sink
    Output,
    /// A scan-out controller
    Crtc,
    /// Scan-out metadata for a pixel buffer
    Framebuffer,
    /// A named, typed output attribute
    Property,
    /// An opaque property payload
    Blob,
}

/// Allocator and resolver for one device's identifier space.
///
/// Allocation hands out the lowest free id starting at 1; an id is only
/// reused after an explicit [`release`](Registry::release). Resolution of
/// a released id misses, which guards callers holding stale handles.
#[derive(Debug)]
pub(crate) struct Registry {
    live: HashMap<ObjectId, ObjectKind>,
    free: BTreeSet<u32>,
    next: u32,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Registry {
            live: HashMap::new(),
            free: BTreeSet::new(),
            next: 1,
        }
    }

    /// Allocates a fresh id for an object of `kind`.
    ///
    /// Exhaustion of the id space reports [`Error::OutOfIds`]; the device
    /// stays usable.
    pub(crate) fn allocate(&mut self, kind: ObjectKind) -> Result<ObjectId, Error> {
        let raw = match self.free.iter().next().copied() {
            Some(raw) => {
                self.free.remove(&raw);
                raw
            }
            None => {
                if self.next == u32::MAX {
                    return Err(Error::OutOfIds);
                }
                let raw = self.next;
                self.next += 1;
                raw
            }
        };
        // raw >= 1 by construction
        let id = ObjectId::from_raw(raw).ok_or(Error::OutOfIds)?;
        self.live.insert(id, kind);
        Ok(id)
    }

    /// Returns `id` to the free pool
    pub(crate) fn release(&mut self, id: ObjectId) {
        if self.live.remove(&id).is_some() {
            self.free.insert(id.get());
        }
    }

    /// Resolves `id` to the kind of object it was allocated for
    pub(crate) fn resolve(&self, id: ObjectId) -> Option<ObjectKind> {
        self.live.get(&id).copied()
    }

    /// Like [`resolve`](Registry::resolve), but an absent id or a kind
    /// mismatch is an error
    pub(crate) fn expect(&self, id: ObjectId, kind: ObjectKind) -> Result<(), Error> {
        match self.resolve(id) {
            Some(found) if found == kind => Ok(()),
            _ => Err(Error::NotFound(id)),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.live.clear();
        self.free.clear();
        self.next = 1;
    }
}
