//! Presentation of session state: countdown badge, warning modal and the
//! refresh button. These only read `SessionState` and call back into the
//! session handle.

pub mod refresh;
pub mod timer;
pub mod warning;

pub use crate::session::clock::format_mmss;
pub use refresh::{AdminRefreshButton, DataReloader, RefreshOutcome};
pub use timer::{SessionTimerView, TimerTone};
pub use warning::{WarningAction, WarningModalView, WarningUrgency};
