//! Request lifecycle and reply interpretation.
//!
//! Every request opens its own connection. Replies are applied in arrival
//! order, so when requests overlap the last reply to arrive wins.

use crate::config::PanelConfig;
use crate::error::PanelError;
use crate::host::{element_ids, PanelHost};
use crate::location::{CookieJar, PageLocation};
use crate::state::AppState;
use crate::transport::{dispatch, Command, RequestId, TransportEvent};
use crate::wizard;
use serde_json::{Map, Value};
use std::time::Duration;
use threadfin_protocol::{commands, reply_error, reply_keys, Directive, TOKEN_COOKIE};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const NO_CONNECTION_MESSAGE: &str =
    "No websocket connection to Threadfin could be established. Check your network configuration.";

/// What applying one transport event did.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Opened,
    ConnectionFailed { notified: bool },
    ServerError(String),
    LogoUpdated(String),
    LogUpdated,
    Applied { directives: Vec<Directive> },
}

pub struct Controller {
    page: PageLocation,
    pub state: AppState,
    next_id: RequestId,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl Controller {
    pub fn new(config: &PanelConfig) -> Result<Self, PanelError> {
        let mut cookies = match &config.cookie_file {
            Some(path) => CookieJar::load(path)?,
            None => CookieJar::default(),
        };
        if let Some(token) = &config.initial_token {
            cookies.set(TOKEN_COOKIE, token);
        }
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(Self {
            page: config.page.clone(),
            state: AppState::new(cookies),
            next_id: 1,
            events_tx,
            events_rx,
        })
    }

    pub fn page(&self) -> &PageLocation {
        &self.page
    }

    /// Starts a request and returns its id. Must run inside a tokio runtime.
    pub fn send(&mut self, command: &Command) -> Result<RequestId, PanelError> {
        let url = self.page.connection_url(self.state.cookies.token())?;
        let request_id = self.next_id;
        self.next_id += 1;

        self.state.begin_request(&command.name);
        dispatch(&self.events_tx, request_id, url, command);
        Ok(request_id)
    }

    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events_rx.recv().await
    }

    pub fn apply_event(
        &mut self,
        event: TransportEvent,
        host: &mut dyn PanelHost,
    ) -> Result<Outcome, PanelError> {
        match event {
            TransportEvent::Opened { request_id } => {
                debug!(request_id, "connection open");
                self.state.ws_available = true;
                Ok(Outcome::Opened)
            }
            TransportEvent::Failed {
                request_id,
                cmd,
                error,
            } => Ok(self.on_connect_failed(request_id, &cmd, &error, host)),
            TransportEvent::Reply { cmd, text, .. } => self.on_reply(&cmd, &text, host),
        }
    }

    fn on_connect_failed(
        &mut self,
        request_id: RequestId,
        cmd: &str,
        error: &str,
        host: &mut dyn PanelHost,
    ) -> Outcome {
        warn!(request_id, %cmd, "{NO_CONNECTION_MESSAGE} ({error})");
        self.state.in_flight = false;

        let notify = !self.state.ws_available && !self.state.unreachable_notified;
        if notify {
            self.state.unreachable_notified = true;
            host.alert(NO_CONNECTION_MESSAGE);
        }
        Outcome::ConnectionFailed { notified: notify }
    }

    /// Interprets one reply for the request `cmd`.
    pub fn on_reply(
        &mut self,
        cmd: &str,
        text: &str,
        host: &mut dyn PanelHost,
    ) -> Result<Outcome, PanelError> {
        self.state.in_flight = false;
        host.show_element(element_ids::LOADING, false);

        let reply: Map<String, Value> = serde_json::from_str(text).inspect_err(|e| {
            warn!(%cmd, "unreadable reply: {e}");
        })?;

        if let Some(token) = reply.get(reply_keys::TOKEN).and_then(Value::as_str) {
            self.state.cookies.set(TOKEN_COOKIE, token);
            if let Err(e) = self.state.cookies.save() {
                warn!("session cookie not persisted: {e}");
            }
        }

        if let Some(error) = reply_error(&reply) {
            warn!(%cmd, %error, "server reported an error");
            return Ok(Outcome::ServerError(error));
        }

        if let Some(logo) = reply.get(reply_keys::LOGO_URL) {
            let url = match logo {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            host.set_input(element_ids::CHANNEL_ICON, &url, true);
            return Ok(Outcome::LogoUpdated(url));
        }

        if cmd == commands::UPDATE_LOG {
            let log = reply.get(reply_keys::LOG).cloned().unwrap_or(Value::Null);
            self.state.server.replace_log(log);
            if host.log_view_visible() {
                host.render_logs(&self.state.server, false);
            }
            return Ok(Outcome::LogUpdated);
        }

        let directives = Directive::decode_all(&reply);
        self.state.server.replace(reply);

        for directive in &directives {
            match directive {
                Directive::OpenMenu { menu } => {
                    host.click_menu(menu);
                    host.show_element(element_ids::POPUP, false);
                }
                Directive::OpenLink { url } => host.navigate(url),
                Directive::Alert { text } => host.alert(text),
                Directive::Reload => host.reload(),
                Directive::Wizard { step } => {
                    host.render_layout(&self.state.server);
                    if *step < wizard::STEPS.len() {
                        host.open_wizard(*step);
                    } else {
                        warn!(step, "server asked for an unknown wizard step");
                    }
                }
            }
        }
        if directives.is_empty() {
            host.render_layout(&self.state.server);
        }

        info!(%cmd, directives = directives.len(), "reply applied");
        Ok(Outcome::Applied { directives })
    }

    /// Sends `command` and applies events until its own reply or failure.
    ///
    /// Events of other outstanding requests are applied along the way.
    pub async fn request(
        &mut self,
        command: &Command,
        host: &mut dyn PanelHost,
    ) -> Result<Outcome, PanelError> {
        let id = self.send(command)?;
        self.wait_for(id, host).await
    }

    /// Applies events until request `id` got its reply or failed.
    ///
    /// Errors from other requests' events are logged; only an error for
    /// `id` itself is returned.
    pub async fn wait_for(
        &mut self,
        id: RequestId,
        host: &mut dyn PanelHost,
    ) -> Result<Outcome, PanelError> {
        loop {
            let event = self.next_event().await.ok_or(PanelError::ChannelClosed)?;
            let request_id = event.request_id();
            let own = request_id == id;
            let opened = matches!(event, TransportEvent::Opened { .. });
            match self.apply_event(event, host) {
                Ok(outcome) if own && !opened => return Ok(outcome),
                Ok(_) => {}
                Err(e) if own => return Err(e),
                Err(e) => warn!(request_id, "event not applied: {e}"),
            }
        }
    }

    /// Applies events as they arrive until `duration` has passed.
    pub async fn pump_for(
        &mut self,
        duration: Duration,
        host: &mut dyn PanelHost,
    ) -> Result<(), PanelError> {
        let deadline = tokio::time::sleep(duration);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => return Ok(()),
                event = self.events_rx.recv() => {
                    let event = event.ok_or(PanelError::ChannelClosed)?;
                    if let Err(e) = self.apply_event(event, host) {
                        warn!("event not applied: {e}");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostCall, RecordingHost};
    use serde_json::json;

    fn controller() -> Controller {
        Controller::new(&PanelConfig::default()).unwrap()
    }

    fn apply(c: &mut Controller, host: &mut RecordingHost, cmd: &str, reply: Value) -> Outcome {
        c.state.begin_request(cmd);
        c.on_reply(cmd, &reply.to_string(), host).unwrap()
    }

    #[test]
    fn plain_reply_replaces_state_and_renders_once() {
        let mut c = controller();
        let mut host = RecordingHost::default();
        let reply = json!({ "settings": { "tuner": 3 }, "status": true });

        let outcome = apply(&mut c, &mut host, commands::GET_SERVER_CONFIG, reply.clone());

        assert_eq!(outcome, Outcome::Applied { directives: vec![] });
        assert_eq!(Value::Object(c.state.server.as_map().clone()), reply);
        assert_eq!(host.render_count(), 1);
        assert!(!c.state.in_flight);
        assert_eq!(
            host.calls[0],
            HostCall::ShowElement {
                id: "loading".to_string(),
                visible: false
            }
        );
    }

    #[test]
    fn token_is_stored_even_when_reply_is_an_error() {
        let mut c = controller();
        let mut host = RecordingHost::default();
        apply(&mut c, &mut host, commands::GET_SERVER_CONFIG, json!({ "settings": {} }));
        let before = c.state.server.clone();

        let outcome = apply(
            &mut c,
            &mut host,
            commands::SAVE_SETTINGS,
            json!({ "token": "next", "err": "denied", "settings": { "x": 1 } }),
        );

        assert_eq!(outcome, Outcome::ServerError("denied".to_string()));
        assert_eq!(c.state.cookies.token(), Some("next"));
        assert_eq!(c.state.server, before);
        assert_eq!(host.render_count(), 1);
    }

    #[test]
    fn log_reply_touches_only_the_log() {
        let mut c = controller();
        let mut host = RecordingHost::with_log_view();
        apply(
            &mut c,
            &mut host,
            commands::GET_SERVER_CONFIG,
            json!({ "settings": { "tuner": 1 }, "log": { "log": ["old"] } }),
        );

        let outcome = apply(
            &mut c,
            &mut host,
            commands::UPDATE_LOG,
            json!({ "log": { "log": ["old", "new"], "errors": 0, "warnings": 0 } }),
        );

        assert_eq!(outcome, Outcome::LogUpdated);
        assert_eq!(c.state.server.log_entries(), vec!["old", "new"]);
        assert_eq!(c.state.server.setting("tuner"), Some(&json!(1)));
        assert_eq!(host.count(&HostCall::RenderLogs { scroll_down: false }), 1);
        assert_eq!(host.render_count(), 1);
    }

    #[test]
    fn hidden_log_view_is_not_redrawn() {
        let mut c = controller();
        let mut host = RecordingHost::default();
        apply(&mut c, &mut host, commands::UPDATE_LOG, json!({ "log": { "log": [] } }));
        assert_eq!(host.count(&HostCall::RenderLogs { scroll_down: false }), 0);
    }

    #[test]
    fn logo_reply_updates_the_icon_field_only() {
        let mut c = controller();
        let mut host = RecordingHost::default();
        let outcome = apply(
            &mut c,
            &mut host,
            commands::UPLOAD_LOGO,
            json!({ "logoURL": "/data_images/a.png", "settings": {} }),
        );

        assert_eq!(outcome, Outcome::LogoUpdated("/data_images/a.png".to_string()));
        assert!(c.state.server.is_empty());
        assert!(host.calls.contains(&HostCall::SetInput {
            id: "channel-icon".to_string(),
            value: "/data_images/a.png".to_string(),
            changed: true
        }));
        assert_eq!(host.render_count(), 0);
    }

    #[test]
    fn directives_fire_in_order_without_a_second_render() {
        let mut c = controller();
        let mut host = RecordingHost::default();
        apply(
            &mut c,
            &mut host,
            commands::SAVE_SETTINGS,
            json!({ "openMenu": "5", "alert": "saved", "reload": true }),
        );

        let tail: Vec<_> = host.calls[1..].to_vec();
        assert_eq!(
            tail,
            vec![
                HostCall::ClickMenu("5".to_string()),
                HostCall::ShowElement {
                    id: "popup".to_string(),
                    visible: false
                },
                HostCall::Alert("saved".to_string()),
                HostCall::Reload,
            ]
        );
    }

    #[test]
    fn wizard_directive_renders_then_opens_step() {
        let mut c = controller();
        let mut host = RecordingHost::default();
        apply(
            &mut c,
            &mut host,
            commands::SAVE_WIZARD,
            json!({ "wizard": 2, "configurationWizard": true }),
        );
        assert_eq!(
            host.calls[1..].to_vec(),
            vec![HostCall::RenderLayout, HostCall::OpenWizard(2)]
        );
    }

    #[test]
    fn malformed_reply_is_an_error_after_bookkeeping() {
        let mut c = controller();
        let mut host = RecordingHost::default();
        c.state.begin_request(commands::GET_SERVER_CONFIG);

        let err = c
            .on_reply(commands::GET_SERVER_CONFIG, "not json", &mut host)
            .unwrap_err();

        assert!(matches!(err, PanelError::MalformedReply(_)));
        assert!(!c.state.in_flight);
        assert_eq!(host.calls.len(), 1);
    }

    #[test]
    fn unreachable_server_is_announced_once() {
        let mut c = controller();
        let mut host = RecordingHost::default();
        let failed = |id| TransportEvent::Failed {
            request_id: id,
            cmd: commands::GET_SERVER_CONFIG.to_string(),
            error: "refused".to_string(),
        };

        c.state.begin_request(commands::GET_SERVER_CONFIG);
        let first = c.apply_event(failed(1), &mut host).unwrap();
        let second = c.apply_event(failed(2), &mut host).unwrap();

        assert_eq!(first, Outcome::ConnectionFailed { notified: true });
        assert_eq!(second, Outcome::ConnectionFailed { notified: false });
        assert_eq!(host.alerts(), vec![NO_CONNECTION_MESSAGE]);
        assert!(!c.state.in_flight);
    }

    #[test]
    fn failures_after_a_successful_open_stay_silent() {
        let mut c = controller();
        let mut host = RecordingHost::default();
        c.apply_event(TransportEvent::Opened { request_id: 1 }, &mut host)
            .unwrap();
        let outcome = c
            .apply_event(
                TransportEvent::Failed {
                    request_id: 2,
                    cmd: commands::UPDATE_LOG.to_string(),
                    error: "reset".to_string(),
                },
                &mut host,
            )
            .unwrap();
        assert_eq!(outcome, Outcome::ConnectionFailed { notified: false });
        assert!(host.alerts().is_empty());
    }

    fn reply(request_id: RequestId, cmd: &str, text: &str) -> TransportEvent {
        TransportEvent::Reply {
            request_id,
            cmd: cmd.to_string(),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn malformed_reply_to_another_request_does_not_abandon_the_wait() {
        let mut c = controller();
        let mut host = RecordingHost::default();
        c.state.begin_request(commands::UPDATE_LOG);
        c.state.begin_request(commands::GET_SERVER_CONFIG);
        c.events_tx
            .send(reply(2, commands::UPDATE_LOG, "garbage"))
            .unwrap();
        c.events_tx
            .send(reply(1, commands::GET_SERVER_CONFIG, r#"{"settings":{"tuner":4}}"#))
            .unwrap();

        let outcome = c.wait_for(1, &mut host).await.unwrap();

        assert_eq!(outcome, Outcome::Applied { directives: vec![] });
        assert_eq!(c.state.server.setting("tuner"), Some(&json!(4)));
    }

    #[tokio::test]
    async fn malformed_own_reply_is_returned() {
        let mut c = controller();
        let mut host = RecordingHost::default();
        c.state.begin_request(commands::GET_SERVER_CONFIG);
        c.events_tx
            .send(TransportEvent::Opened { request_id: 1 })
            .unwrap();
        c.events_tx
            .send(reply(1, commands::GET_SERVER_CONFIG, "garbage"))
            .unwrap();

        let err = c.wait_for(1, &mut host).await.unwrap_err();
        assert!(matches!(err, PanelError::MalformedReply(_)));
    }

    #[tokio::test]
    async fn overlapping_replies_apply_in_arrival_order() {
        let mut c = controller();
        let mut host = RecordingHost::default();

        // A second request goes out while the first is still outstanding.
        c.state.begin_request(commands::GET_SERVER_CONFIG);
        c.state.begin_request(commands::SAVE_SETTINGS);
        assert!(c.state.in_flight);

        // The later request answers first; the earlier answer arrives last.
        c.events_tx
            .send(reply(2, commands::SAVE_SETTINGS, r#"{"settings":{"tuner":2}}"#))
            .unwrap();
        c.events_tx
            .send(reply(1, commands::GET_SERVER_CONFIG, r#"{"settings":{"tuner":1}}"#))
            .unwrap();

        let outcome = c.wait_for(1, &mut host).await.unwrap();

        assert_eq!(outcome, Outcome::Applied { directives: vec![] });
        assert_eq!(c.state.server.setting("tuner"), Some(&json!(1)));
        assert_eq!(host.render_count(), 2);
    }

    #[test]
    fn send_with_unbuildable_url_leaves_state_untouched() {
        let cfg = PanelConfig {
            page: PageLocation {
                host: "bad host".to_string(),
                ..PanelConfig::default().page
            },
            ..PanelConfig::default()
        };
        let mut c = Controller::new(&cfg).unwrap();
        c.state.pending_edits.record("tuner", json!(1));

        let err = c.send(&Command::new(commands::GET_SERVER_CONFIG)).unwrap_err();

        assert!(matches!(err, PanelError::InvalidUrl(_)));
        assert!(!c.state.in_flight);
        assert_eq!(c.state.pending_edits.original("tuner"), Some(&json!(1)));
        assert_eq!(c.next_id, 1);
    }

    #[test]
    fn initial_token_seeds_the_cookie_jar() {
        let cfg = PanelConfig::default().with_token(Some("seed".to_string()));
        let c = Controller::new(&cfg).unwrap();
        assert_eq!(c.state.cookies.token(), Some("seed"));
    }
}
