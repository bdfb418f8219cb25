//! faceclock-store — Persisted identity gallery and attendance ledger.
//!
//! Everything here is flat files: one PNG per registered face sample, a
//! status snapshot rewritten in full on every change, and append-only
//! per-action event logs.

pub mod attendance;
pub mod gallery;

pub use attendance::{AttendanceEvent, AttendanceLedger, ClockAction, ClockError};
pub use gallery::{Gallery, RegisterError};
