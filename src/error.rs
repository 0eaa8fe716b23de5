//! Errors of the configuration entry points

use crate::registry::ObjectId;

/// Errors reported by the [`Device`](crate::device::Device) entry points.
///
/// All errors are synchronous and none are retried internally. A failed
/// configuration transaction rolls the tracked entity state back to its
/// pre-call snapshot before returning [`Error::ModeRejected`]; hardware
/// state touched before the rejection is explicitly *not* undone.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The id does not resolve to a live object of the expected kind
    #[error("Object `{0:?}` not found or of unexpected kind")]
    NotFound(ObjectId),
    /// The request shape is malformed
    #[error("Invalid configuration request: {0}")]
    InvalidArgument(&'static str),
    /// The identifier space of the device is exhausted
    ///
    /// Fatal to the requested operation only, never to the device.
    #[error("Ran out of object identifiers")]
    OutOfIds,
    /// Attempt to set a property carrying the immutable flag
    #[error("Property `{0:?}` is immutable")]
    Immutable(ObjectId),
    /// Value outside the declared bounds of a range property
    #[error("Value {value} is out of range for property `{property:?}`")]
    OutOfRange {
        /// Property whose bounds were violated
        property: ObjectId,
        /// The rejected value
        value: u64,
    },
    /// Value matching none of the declared choices of a discrete property
    #[error("Value {value} is not a valid choice for property `{property:?}`")]
    InvalidEnum {
        /// Property whose value set was missed
        property: ObjectId,
        /// The rejected value
        value: u64,
    },
    /// A fixup, prepare or apply step of the mode-set sequence declined the mode
    #[error("Mode rejected by the pipeline of crtc `{0:?}`")]
    ModeRejected(ObjectId),
    /// The fixed property attachment table of an output has no empty slot left
    #[error("Property attachment table of output `{0:?}` is full")]
    AttachmentFull(ObjectId),
    /// The property is not attached to this output
    #[error("Property `{property:?}` is not attached to output `{output:?}`")]
    NotAttached {
        /// Output queried
        output: ObjectId,
        /// Property that is not attached to it
        property: ObjectId,
    },
    /// Cursor request against a crtc without cursor support
    #[error("Crtc `{0:?}` does not support cursors")]
    CursorNotSupported(ObjectId),
}
