use crate::session::clock::format_mmss;
use crate::session::state::SessionState;
use crate::session::supervisor::SessionHandle;

/// Escalation level of the warning modal. Cosmetic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WarningUrgency {
    Notice,
    /// 30 seconds or less
    Elevated,
    /// 10 seconds or less
    Critical,
}

impl WarningUrgency {
    pub fn for_seconds(seconds: u64) -> Self {
        match seconds {
            0..=10 => WarningUrgency::Critical,
            11..=30 => WarningUrgency::Elevated,
            _ => WarningUrgency::Notice,
        }
    }
}

/// Buttons offered by the modal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningAction {
    StayLoggedIn,
    LogoutNow,
}

impl WarningAction {
    /// Map typed input to a modal button
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "stay" | "s" | "stay logged in" | "extend" => Some(WarningAction::StayLoggedIn),
            "logout" | "l" | "logout now" => Some(WarningAction::LogoutNow),
            _ => None,
        }
    }

    /// Forward the choice to the session. Returns false if it already ended.
    pub fn dispatch(self, session: &SessionHandle) -> bool {
        match self {
            WarningAction::StayLoggedIn => session.reset_session(),
            WarningAction::LogoutNow => session.logout_now(),
        }
    }
}

/// "Session expiring" modal, shown only during the Warning phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarningModalView {
    pub countdown: String,
    pub urgency: WarningUrgency,
}

impl WarningModalView {
    /// The modal for `state`, or `None` when it should be hidden
    pub fn from_state(state: &SessionState) -> Option<Self> {
        if !state.show_warning {
            return None;
        }

        let seconds = state.time_left();
        Some(Self {
            countdown: format_mmss(seconds),
            urgency: WarningUrgency::for_seconds(seconds),
        })
    }

    pub fn render(&self) -> Vec<String> {
        let headline = match self.urgency {
            WarningUrgency::Notice => "Session Expiring Soon",
            WarningUrgency::Elevated => "Session Expiring!",
            WarningUrgency::Critical => "SESSION EXPIRING NOW",
        };

        vec![
            format!("━━ {} ━━", headline),
            format!("You will be logged out in {} due to inactivity.", self.countdown),
            "[stay] Stay Logged In    [logout] Logout Now".to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::config::TimeoutConfig;
    use crate::session::machine::SessionMachine;
    use crate::session::state::StartMode;
    use std::time::Duration;
    use tokio::time::Instant;

    fn state_after(secs: u64) -> SessionState {
        let t0 = Instant::now();
        let mut machine = SessionMachine::new(TimeoutConfig::default(), StartMode::Fresh, t0);
        machine.begin_warning(t0 + Duration::from_secs(240));
        let now = t0 + Duration::from_secs(secs);
        machine.snapshot(now, false)
    }

    #[test]
    fn test_hidden_outside_warning() {
        let t0 = Instant::now();
        let machine = SessionMachine::new(TimeoutConfig::default(), StartMode::Fresh, t0);
        let state = machine.snapshot(t0 + Duration::from_secs(100), false);
        assert!(WarningModalView::from_state(&state).is_none());
    }

    #[test]
    fn test_countdown_and_escalation() {
        let modal = WarningModalView::from_state(&state_after(241)).unwrap();
        assert_eq!(modal.countdown, "0:59");
        assert_eq!(modal.urgency, WarningUrgency::Notice);

        let modal = WarningModalView::from_state(&state_after(275)).unwrap();
        assert_eq!(modal.urgency, WarningUrgency::Elevated);

        let modal = WarningModalView::from_state(&state_after(292)).unwrap();
        assert_eq!(modal.countdown, "0:08");
        assert_eq!(modal.urgency, WarningUrgency::Critical);
    }

    #[test]
    fn test_render_mentions_countdown() {
        let modal = WarningModalView::from_state(&state_after(240)).unwrap();
        let lines = modal.render();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("1:00"));
    }

    #[test]
    fn test_parse_actions() {
        assert_eq!(WarningAction::parse(" Stay "), Some(WarningAction::StayLoggedIn));
        assert_eq!(WarningAction::parse("logout now"), Some(WarningAction::LogoutNow));
        assert_eq!(WarningAction::parse("refresh"), None);
    }
}
