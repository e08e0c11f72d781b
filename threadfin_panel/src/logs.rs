use crate::controller::{Controller, Outcome};
use crate::error::PanelError;
use crate::host::{element_ids, PanelHost};
use crate::html::Element;
use crate::state::ServerState;
use crate::transport::{Command, RequestId};
use std::time::Duration;
use threadfin_protocol::commands;
use tracing::{debug, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// CSS class for a log line. Later markers win when several appear.
pub fn classify(entry: &str) -> Option<&'static str> {
    let mut class = None;
    if entry.contains("WARNING") {
        class = Some("warningMsg");
    }
    if entry.contains("ERROR") {
        class = Some("errorMsg");
    }
    if entry.contains("DEBUG") {
        class = Some("debugMsg");
    }
    class
}

pub fn render_log_entry(entry: &str) -> Element {
    let pre = Element::new("pre");
    let pre = match classify(entry) {
        Some(class) => pre.class(class),
        None => pre,
    };
    pre.text(entry)
}

pub fn render_logs(state: &ServerState) -> Element {
    Element::new("div")
        .id(element_ids::LOG_VIEW)
        .children(state.log_entries().iter().map(|e| render_log_entry(e)))
}

pub fn update_log_command() -> Command {
    Command::new(commands::UPDATE_LOG)
}

pub fn reset_logs(ctrl: &mut Controller) -> Result<RequestId, PanelError> {
    ctrl.send(&Command::new(commands::RESET_LOGS))
}

/// Polls `updateLog` every `interval`; `rounds` of `None` polls until an error.
pub struct LogPoller {
    pub interval: Duration,
    pub rounds: Option<usize>,
}

impl Default for LogPoller {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            rounds: None,
        }
    }
}

impl LogPoller {
    pub async fn run(
        &self,
        ctrl: &mut Controller,
        host: &mut dyn PanelHost,
    ) -> Result<usize, PanelError> {
        let mut done = 0;
        while self.rounds.map_or(true, |n| done < n) {
            match ctrl.request(&update_log_command(), host).await? {
                Outcome::ConnectionFailed { .. } => {
                    warn!("log poll could not reach the server");
                }
                outcome => debug!(round = done, ?outcome, "log poll"),
            }
            done += 1;
            if self.rounds.map_or(true, |n| done < n) {
                ctrl.pump_for(self.interval, host).await?;
            }
        }
        Ok(done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn classification_prefers_later_markers() {
        assert_eq!(classify("[Threadfin] WARNING: x"), Some("warningMsg"));
        assert_eq!(classify("ERROR and WARNING"), Some("errorMsg"));
        assert_eq!(classify("DEBUG ERROR"), Some("debugMsg"));
        assert_eq!(classify("plain"), None);
    }

    #[test]
    fn one_pre_per_entry() {
        let state = match json!({ "log": { "log": ["ok", "[x] ERROR: boom"] } }) {
            Value::Object(m) => ServerState::from_map(m),
            _ => unreachable!(),
        };
        let view = render_logs(&state);
        assert_eq!(view.get_attr("id"), Some("content_log"));
        let mut pres = Vec::new();
        view.find_all("pre", &mut pres);
        assert_eq!(pres.len(), 2);
        assert_eq!(pres[0].get_attr("class"), None);
        assert_eq!(pres[1].get_attr("class"), Some("errorMsg"));
    }
}
