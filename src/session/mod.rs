//! Inactivity auto-logout for the admin dashboard
//!
//! This module provides functionality to:
//! - Detect user activity and group it into bursts
//! - Keep the warning, logout and countdown timers consistent with one clock
//! - Move a session through Active -> Warning -> Expired
//! - Hand the host a handle to extend, log out or tear down the session

pub mod clock;
pub mod config;
pub mod machine;
pub mod monitor;
pub mod notify;
pub mod state;
pub mod supervisor;
pub mod timers;

pub use clock::{SessionClock, format_mmss};
pub use config::{ActivityKind, SessionConfig, TimeoutConfig};
pub use machine::{SessionMachine, Transition};
pub use monitor::{ActivityListener, ActivityMonitor, ActivitySignal, BurstTracker};
pub use notify::{Notifier, TracingNotifier, build_notifier};
pub use state::{ExpiryCause, Phase, SessionEnd, SessionState, StartMode};
pub use supervisor::{LogoutHandler, SessionCommand, SessionExtender, SessionHandle, start_session};
pub use timers::{TimerCoordinator, TimerFired, TimerKind};
