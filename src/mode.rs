//! Display timing descriptors
//!
//! A [`ModeInfo`] is a complete timing set for one video mode: pixel
//! clock, horizontal and vertical sync geometry, scan flags and the
//! classification bits reported alongside it. [`Mode`] pairs the timings
//! with a registry id and the verification status the prober maintains.

use std::cmp::Ordering;

use bitflags::bitflags;

use crate::registry::ObjectId;

/// Maximum byte length of a mode name; longer names are truncated
pub const MODE_NAME_LEN: usize = 32;

bitflags! {
    /// Scan and sync polarity flags of a mode
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ModeFlags: u32 {
        /// Positive horizontal sync polarity
        const PHSYNC = 1 << 0;
        /// Negative horizontal sync polarity
        const NHSYNC = 1 << 1;
        /// Positive vertical sync polarity
        const PVSYNC = 1 << 2;
        /// Negative vertical sync polarity
        const NVSYNC = 1 << 3;
        /// Interlaced scan
        const INTERLACE = 1 << 4;
        /// Doublescan
        const DBLSCAN = 1 << 5;
    }
}

bitflags! {
    /// Classification bits of a mode
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ModeKind: u32 {
        /// The built-in safe fallback
        const BUILTIN = 1 << 0;
        /// Preferred mode of the sink
        const PREFERRED = 1 << 3;
        /// Default mode of the sink
        const DEFAULT = 1 << 4;
        /// Attached by a caller
        const USERDEF = 1 << 5;
        /// Reported by the driver
        const DRIVER = 1 << 6;
    }
}

/// Why a candidate mode was rejected during probing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeRejectReason {
    /// Declined by the output without further detail
    Bad,
    /// Wider than the probe's size bound
    BadWidth,
    /// Taller than the probe's size bound
    BadHeight,
    /// Pixel clock outside the supported range
    BadClock,
    /// Not compatible with a fixed panel
    Panel,
}

/// Verification state of a mode in an output's usable list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeStatus {
    /// Not confirmed by the most recent probe
    Unverified,
    /// Validated, eligible for assignment
    Ok,
    /// Declined, about to be pruned
    Rejected(ModeRejectReason),
}

/// A complete display timing descriptor.
///
/// Equality derives over every field; use
/// [`same_timings`](ModeInfo::same_timings) to compare only the fields
/// that define the signal (lists are deduplicated on that relation, not
/// on names).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeInfo {
    /// Human readable name, e.g. `1920x1080`
    pub name: String,
    /// Pixel clock in kHz
    pub clock: u32,
    /// Visible width in pixels
    pub hdisplay: u16,
    /// Horizontal sync start
    pub hsync_start: u16,
    /// Horizontal sync end
    pub hsync_end: u16,
    /// Total horizontal timing including blanking
    pub htotal: u16,
    /// Horizontal skew
    pub hskew: u16,
    /// Visible height in lines
    pub vdisplay: u16,
    /// Vertical sync start
    pub vsync_start: u16,
    /// Vertical sync end
    pub vsync_end: u16,
    /// Total vertical timing including blanking
    pub vtotal: u16,
    /// Vertical scan multiplier, 0 or 1 mean single scan
    pub vscan: u16,
    /// Refresh rate in millihertz, derived from the timing fields.
    ///
    /// `60000` is 60 Hz. Maintained by the prober; a freshly constructed
    /// descriptor may carry 0 here.
    pub vrefresh: u32,
    /// Scan and sync polarity flags
    pub flags: ModeFlags,
    /// Classification bits
    pub kind: ModeKind,
}

impl ModeInfo {
    /// Compares the timing fields only: clock, horizontal and vertical
    /// geometry and the scan flags. Name, kind and the derived refresh
    /// field do not participate.
    pub fn same_timings(&self, other: &ModeInfo) -> bool {
        self.clock == other.clock
            && self.hdisplay == other.hdisplay
            && self.hsync_start == other.hsync_start
            && self.hsync_end == other.hsync_end
            && self.htotal == other.htotal
            && self.hskew == other.hskew
            && self.vdisplay == other.vdisplay
            && self.vsync_start == other.vsync_start
            && self.vsync_end == other.vsync_end
            && self.vtotal == other.vtotal
            && self.vscan == other.vscan
            && self.flags == other.flags
    }

    /// Derives the refresh rate in millihertz from the timing fields.
    ///
    /// Interlaced modes double the rate, doublescan halves it, and a
    /// vertical scan multiplier above 1 divides it.
    pub fn refresh_millihertz(&self) -> u32 {
        if self.htotal == 0 || self.vtotal == 0 {
            return 0;
        }
        let clock = self.clock as u64;
        let htotal = self.htotal as u64;
        let vtotal = self.vtotal as u64;

        let mut refresh = (clock * 1_000_000 / htotal + vtotal / 2) / vtotal;

        if self.flags.contains(ModeFlags::INTERLACE) {
            refresh *= 2;
        }
        if self.flags.contains(ModeFlags::DBLSCAN) {
            refresh /= 2;
        }
        if self.vscan > 1 {
            refresh /= self.vscan as u64;
        }

        refresh as u32
    }
}

/// A mode tracked by the device: timings plus id and verification state.
///
/// A mode does not know which list holds it; removing it from every list
/// referencing it (and releasing its id) is the caller's responsibility.
#[derive(Debug, Clone)]
pub struct Mode {
    pub(crate) id: ObjectId,
    pub(crate) status: ModeStatus,
    pub(crate) info: ModeInfo,
}

impl Mode {
    pub(crate) fn new(id: ObjectId, mut info: ModeInfo) -> Self {
        if info.name.len() > MODE_NAME_LEN {
            let mut end = MODE_NAME_LEN;
            while !info.name.is_char_boundary(end) {
                end -= 1;
            }
            info.name.truncate(end);
        }
        Mode {
            id,
            status: ModeStatus::Unverified,
            info,
        }
    }

    /// Registry id of this mode
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Timing descriptor
    pub fn info(&self) -> &ModeInfo {
        &self.info
    }

    /// Verification state
    pub fn status(&self) -> ModeStatus {
        self.status
    }
}

/// The built-in safe 640x480@60Hz fallback, synthesized when probing
/// leaves an output without a single usable mode.
pub(crate) fn builtin_fallback() -> ModeInfo {
    ModeInfo {
        name: "640x480".into(),
        clock: 25_200,
        hdisplay: 640,
        hsync_start: 656,
        hsync_end: 752,
        htotal: 800,
        hskew: 0,
        vdisplay: 480,
        vsync_start: 490,
        vsync_end: 492,
        vtotal: 525,
        vscan: 0,
        vrefresh: 0,
        flags: ModeFlags::NHSYNC | ModeFlags::NVSYNC,
        kind: ModeKind::BUILTIN,
    }
}

/// Total order used for an output's usable list: width descending, then
/// height descending, then refresh descending, preferred modes first.
/// Remaining ties keep insertion order (the sort is stable).
pub(crate) fn compare(a: &ModeInfo, b: &ModeInfo) -> Ordering {
    b.hdisplay
        .cmp(&a.hdisplay)
        .then(b.vdisplay.cmp(&a.vdisplay))
        .then(b.refresh_millihertz().cmp(&a.refresh_millihertz()))
        .then(
            b.kind
                .contains(ModeKind::PREFERRED)
                .cmp(&a.kind.contains(ModeKind::PREFERRED)),
        )
}

pub(crate) fn sort(modes: &mut [Mode]) {
    modes.sort_by(|a, b| compare(&a.info, &b.info));
}

/// Marks every mode exceeding the given bounds as rejected
pub(crate) fn filter_size(modes: &mut [Mode], max_width: u16, max_height: u16) {
    for mode in modes {
        if mode.info.hdisplay > max_width {
            mode.status = ModeStatus::Rejected(ModeRejectReason::BadWidth);
        } else if mode.info.vdisplay > max_height {
            mode.status = ModeStatus::Rejected(ModeRejectReason::BadHeight);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ObjectKind, Registry};

    fn simple(name: &str, w: u16, h: u16, clock: u32, htotal: u16, vtotal: u16) -> ModeInfo {
        ModeInfo {
            name: name.into(),
            clock,
            hdisplay: w,
            hsync_start: w + 16,
            hsync_end: w + 112,
            htotal,
            hskew: 0,
            vdisplay: h,
            vsync_start: h + 10,
            vsync_end: h + 12,
            vtotal,
            vscan: 0,
            vrefresh: 0,
            flags: ModeFlags::empty(),
            kind: ModeKind::DRIVER,
        }
    }

    #[test]
    fn builtin_fallback_is_60hz() {
        assert_eq!(builtin_fallback().refresh_millihertz(), 60_000);
    }

    #[test]
    fn interlace_doubles_refresh() {
        let mut mode = builtin_fallback();
        mode.flags |= ModeFlags::INTERLACE;
        assert_eq!(mode.refresh_millihertz(), 120_000);
    }

    #[test]
    fn timings_ignore_name_and_kind() {
        let a = builtin_fallback();
        let mut b = builtin_fallback();
        b.name = "something else".into();
        b.kind = ModeKind::PREFERRED | ModeKind::USERDEF;
        assert!(a.same_timings(&b));

        let mut c = builtin_fallback();
        c.clock += 1;
        assert!(!a.same_timings(&c));
    }

    #[test]
    fn sort_is_width_height_refresh_preferred() {
        let mut registry = Registry::new();
        let mut alloc = |info: ModeInfo| {
            Mode::new(registry.allocate(ObjectKind::Mode).unwrap(), info)
        };

        let mut preferred_720 = simple("1280x720", 1280, 720, 74_250, 1650, 750);
        preferred_720.kind |= ModeKind::PREFERRED;

        let mut modes = vec![
            alloc(simple("1280x720", 1280, 720, 74_250, 1650, 750)),
            alloc(simple("640x480", 640, 480, 25_200, 800, 525)),
            alloc(preferred_720),
            alloc(simple("1920x1080", 1920, 1080, 148_500, 2200, 1125)),
        ];
        sort(&mut modes);

        let names: Vec<&str> = modes.iter().map(|m| m.info.name.as_str()).collect();
        assert_eq!(names, ["1920x1080", "1280x720", "1280x720", "640x480"]);
        // preferred wins the tie between the two 720p entries
        assert!(modes[1].info.kind.contains(ModeKind::PREFERRED));
    }

    #[test]
    fn sorting_a_sorted_list_is_a_noop() {
        let mut registry = Registry::new();
        let mut modes: Vec<Mode> = [
            simple("a", 1920, 1080, 148_500, 2200, 1125),
            simple("b", 1920, 1080, 148_500, 2200, 1125),
            simple("c", 1280, 720, 74_250, 1650, 750),
        ]
        .into_iter()
        .map(|info| Mode::new(registry.allocate(ObjectKind::Mode).unwrap(), info))
        .collect();

        sort(&mut modes);
        let before: Vec<ObjectId> = modes.iter().map(|m| m.id).collect();
        sort(&mut modes);
        let after: Vec<ObjectId> = modes.iter().map(|m| m.id).collect();
        // equal-key entries a and b keep their relative order
        assert_eq!(before, after);
    }

    #[test]
    fn long_names_are_truncated() {
        let mut registry = Registry::new();
        let mut info = builtin_fallback();
        info.name = "x".repeat(MODE_NAME_LEN + 10);
        let mode = Mode::new(registry.allocate(ObjectKind::Mode).unwrap(), info);
        assert_eq!(mode.info.name.len(), MODE_NAME_LEN);
    }
}
