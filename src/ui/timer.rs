use crate::session::clock::format_mmss;
use crate::session::state::{Phase, SessionState};

/// Colour band of the session badge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerTone {
    /// More than two minutes left
    Calm,
    /// Two minutes or less
    Caution,
    /// Warning raised or one minute or less
    Urgent,
    Expired,
}

/// Always-visible session countdown badge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTimerView {
    pub remaining: String,
    pub tone: TimerTone,
    pub is_active: bool,
    pub show_warning: bool,
}

impl SessionTimerView {
    pub fn from_state(state: &SessionState) -> Self {
        Self {
            remaining: format_mmss(state.remaining_seconds),
            tone: tone_for(state),
            is_active: state.is_active,
            show_warning: state.show_warning,
        }
    }

    /// One-line rendering, e.g. `⏱ 4:59 ●`
    pub fn render(&self) -> String {
        let marker = match self.tone {
            TimerTone::Calm => "⏱",
            TimerTone::Caution => "⏳",
            TimerTone::Urgent => "⚠",
            TimerTone::Expired => "✗",
        };
        let activity = if self.is_active { " ●" } else { "" };

        if self.tone == TimerTone::Expired {
            format!("{} session expired", marker)
        } else {
            format!("{} {}{}", marker, self.remaining, activity)
        }
    }
}

fn tone_for(state: &SessionState) -> TimerTone {
    if state.phase == Phase::Expired {
        TimerTone::Expired
    } else if state.show_warning || state.remaining_seconds <= 60 {
        TimerTone::Urgent
    } else if state.remaining_seconds <= 120 {
        TimerTone::Caution
    } else {
        TimerTone::Calm
    }
}
