//! Recognition results as the kiosk sees them.
//!
//! The recognition service does all detection; this module only models its
//! reply (`ScanReply`) and the `Detection` the overlay and gate consume.

mod result;

pub use result::{BoundingBox, Detection, IdentityFields, ScanData, ScanReply};
