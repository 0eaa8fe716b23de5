//! Framebuffer metadata
//!
//! A framebuffer binds an opaque, caller-owned pixel buffer to the
//! dimensions and format used for scan-out. The device only tracks which
//! buffer handle is bound where; allocation and mapping of the pixels
//! themselves are out of scope.

use crate::registry::ObjectId;

/// Opaque handle of a pixel buffer owned by the calling process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

/// Scan-out metadata for one pixel buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramebufferInfo {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Bytes per scanline
    pub pitch: u32,
    /// Color depth
    pub depth: u32,
    /// Bits per pixel
    pub bits_per_pixel: u32,
    /// The backing pixel buffer
    pub buffer: BufferHandle,
}

/// A framebuffer tracked by the device.
///
/// May be referenced by any number of crtcs; destroying it nulls every
/// such reference first.
#[derive(Debug)]
pub(crate) struct Framebuffer {
    pub(crate) id: ObjectId,
    pub(crate) info: FramebufferInfo,
}
