use crate::protocol::{
    commands, ClientInfo, InboundMsg, OutboundMsg, ServerReply, WebLog, CMD_KEY,
};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

/// Menu ids in display order; `openMenu` replies carry an index into this list.
pub const MENU: &[&str] = &[
    "playlist", "filter", "xmltv", "mapping", "users", "settings", "log", "logout",
];

pub const WIZARD_STEPS: usize = 4;

#[derive(Debug, Clone)]
pub struct MockConfig {
    /// When set, web authentication is on and requests must present this token first.
    pub initial_token: Option<String>,
    pub start_in_wizard: bool,
    pub version: String,
    pub beta: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            initial_token: None,
            start_in_wizard: false,
            version: "1.2.0 (10)".to_string(),
            beta: false,
        }
    }
}

pub struct MockBackend {
    inbound_rx: Receiver<InboundMsg>,
    outbound_tx: Sender<OutboundMsg>,
    config: MockConfig,

    settings: Map<String, Value>,
    log: WebLog,
    current_token: Option<String>,
    configuration_wizard: bool,
    wizard_step: usize,
}

impl MockBackend {
    pub fn new(
        inbound_rx: Receiver<InboundMsg>,
        outbound_tx: Sender<OutboundMsg>,
        config: MockConfig,
    ) -> Self {
        let mut settings = default_settings();
        if config.initial_token.is_some() {
            settings.insert("authentication.web".to_string(), Value::Bool(true));
        }
        Self {
            inbound_rx,
            outbound_tx,
            current_token: config.initial_token.clone(),
            configuration_wizard: config.start_in_wizard,
            wizard_step: 0,
            config,
            settings,
            log: WebLog::default(),
        }
    }

    pub fn tick(&mut self) {
        loop {
            match self.inbound_rx.try_recv() {
                Ok(InboundMsg::Request {
                    conn_id,
                    token,
                    envelope,
                }) => {
                    let reply = self.handle(token.as_deref(), &envelope);
                    let reply = match serde_json::to_value(&reply) {
                        Ok(v) => v,
                        Err(e) => {
                            warn!("reply serialization failed: {e}");
                            continue;
                        }
                    };
                    let _ = self
                        .outbound_tx
                        .try_send(OutboundMsg::Reply { conn_id, reply });
                }
                Ok(InboundMsg::Closed { conn_id }) => debug!(conn_id, "client went away"),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    pub fn handle(&mut self, token: Option<&str>, envelope: &Map<String, Value>) -> ServerReply {
        let cmd = envelope
            .get(CMD_KEY)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        info!(%cmd, "panel request");

        let mut issued_token = None;
        if !self.configuration_wizard {
            if let Some(expected) = self.current_token.as_deref() {
                if token != Some(expected) {
                    return ServerReply {
                        status: false,
                        reload: true,
                        error: Some("invalid session token".to_string()),
                        ..ServerReply::default()
                    };
                }
                let next = new_token();
                self.current_token = Some(next.clone());
                issued_token = Some(next);
            }
        }

        if cmd != commands::UPDATE_LOG {
            self.push_log(format!("[Threadfin] WEB: {cmd}"));
        }

        let mut reply = match cmd.as_str() {
            commands::GET_SERVER_CONFIG => self.full_reply(),
            commands::UPDATE_LOG => ServerReply {
                status: true,
                client_info: Some(self.client_info()),
                log: Some(self.log.clone()),
                ..ServerReply::default()
            },
            commands::SAVE_SETTINGS => self.save_settings(envelope),
            commands::RESET_LOGS => {
                self.log = WebLog::default();
                ServerReply {
                    open_menu: menu_index("log"),
                    ..self.full_reply()
                }
            }
            commands::SAVE_WIZARD => self.save_wizard(envelope),
            commands::UPLOAD_LOGO => {
                let filename = envelope
                    .get("filename")
                    .and_then(Value::as_str)
                    .unwrap_or("logo.png");
                ServerReply {
                    status: true,
                    logo_url: Some(format!("/data_images/{filename}")),
                    ..ServerReply::default()
                }
            }
            commands::BACKUP => ServerReply {
                open_link: Some("/download/threadfin_backup.zip".to_string()),
                ..self.full_reply()
            },
            commands::UPDATE_THREADFIN => ServerReply {
                alert: Some("Update started".to_string()),
                ..self.full_reply()
            },
            commands::UPLOAD_CUSTOM_IMAGE => self.full_reply(),
            commands::CHANGE_VERSION => {
                self.config.beta = !self.config.beta;
                self.push_log(format!("[Threadfin] Switched beta to {}", self.config.beta));
                ServerReply {
                    reload: true,
                    ..self.full_reply()
                }
            }
            other => {
                self.push_log(format!("[Threadfin] ERROR: unknown command {other}"));
                ServerReply {
                    status: false,
                    error: Some(format!("unknown command: {other}")),
                    settings: Some(self.settings.clone()),
                    ..ServerReply::default()
                }
            }
        };

        reply.token = issued_token;
        reply
    }

    fn save_settings(&mut self, envelope: &Map<String, Value>) -> ServerReply {
        let web_auth_before = self.web_auth();
        if let Some(Value::Object(changes)) = envelope.get("settings") {
            for (k, v) in changes {
                self.settings.insert(k.clone(), v.clone());
            }
        }
        ServerReply {
            open_menu: menu_index("settings"),
            reload: self.web_auth() && !web_auth_before,
            ..self.full_reply()
        }
    }

    fn save_wizard(&mut self, envelope: &Map<String, Value>) -> ServerReply {
        if let Some(Value::Object(values)) = envelope.get("wizard") {
            for (k, v) in values {
                self.settings.insert(k.clone(), v.clone());
            }
        }
        self.wizard_step += 1;
        if self.wizard_step >= WIZARD_STEPS {
            self.configuration_wizard = false;
            return ServerReply {
                reload: true,
                ..self.full_reply()
            };
        }
        ServerReply {
            wizard: Some(self.wizard_step),
            ..self.full_reply()
        }
    }

    fn full_reply(&self) -> ServerReply {
        ServerReply {
            status: true,
            client_info: Some(self.client_info()),
            settings: Some(self.settings.clone()),
            log: Some(self.log.clone()),
            configuration_wizard: self.configuration_wizard,
            ..ServerReply::default()
        }
    }

    fn client_info(&self) -> ClientInfo {
        ClientInfo {
            arch: std::env::consts::ARCH.to_string(),
            os: std::env::consts::OS.to_string(),
            version: self.config.version.clone(),
            beta: self.config.beta,
            dvr: "127.0.0.1:34400".to_string(),
            epg_source: self
                .settings
                .get("epgSource")
                .and_then(Value::as_str)
                .unwrap_or("XEPG")
                .to_string(),
            errors: self.log.errors,
            warnings: self.log.warnings,
            streams: "0 / 0".to_string(),
            xepg: 0,
            m3u_url: "http://127.0.0.1:34400/m3u/threadfin.m3u".to_string(),
            xepg_url: "http://127.0.0.1:34400/xmltv/threadfin.xml".to_string(),
            uuid: "mock-0000".to_string(),
        }
    }

    fn web_auth(&self) -> bool {
        self.settings
            .get("authentication.web")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    fn push_log(&mut self, entry: String) {
        if entry.contains("ERROR") {
            self.log.errors += 1;
        }
        if entry.contains("WARNING") {
            self.log.warnings += 1;
        }
        self.log.log.push(entry);
    }
}

fn menu_index(id: &str) -> Option<String> {
    MENU.iter().position(|m| *m == id).map(|i| i.to_string())
}

fn new_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

fn default_settings() -> Map<String, Value> {
    let defaults = [
        ("tuner", json!(1)),
        ("epgSource", json!("XEPG")),
        ("update", json!(["0000"])),
        ("files.update", json!(true)),
        ("cache.images", json!(false)),
        ("xepg.replace.missing.images", json!(true)),
        ("xepg.replace.channel.title", json!(false)),
        ("authentication.web", json!(false)),
        ("authentication.pms", json!(false)),
        ("authentication.m3u", json!(false)),
        ("authentication.xml", json!(false)),
        ("authentication.api", json!(false)),
        ("backup.path", json!("/home/threadfin/backup/")),
        ("backup.keep", json!(10)),
        ("temp.path", json!("/tmp/threadfin/")),
        ("buffer", json!("-")),
        ("buffer.size.kb", json!(1024)),
        ("buffer.timeout", json!(500.0)),
        ("buffer.autoReconnect", json!(false)),
        ("storeBufferInRAM", json!(true)),
        ("user.agent", json!("Threadfin")),
        ("ffmpeg.path", json!("/usr/bin/ffmpeg")),
        ("ffmpeg.options", json!("-hide_banner -loglevel error -i [URL] -c copy -f mpegts pipe:1")),
        ("vlc.path", json!("/usr/bin/cvlc")),
        ("vlc.options", json!("-I dummy [URL] --sout #std{mux=ts,access=file,dst=-}")),
        ("bindingIPs", json!("")),
        ("threadfinDomain", json!("")),
        ("udpxy", json!("")),
        ("epgCategories", json!("Kids:kids|News:news|Movie:movie|Series:series|Sports:sports")),
        ("epgCategoriesColors", json!("kids:mediumpurple|news:tomato|movie:royalblue|series:gold|sports:yellowgreen")),
        ("dummy", json!(false)),
        ("dummyChannel", json!("PPV")),
        ("ignoreFilters", json!(false)),
        ("api", json!(false)),
        ("ssdp", json!(true)),
        ("ThreadfinAutoUpdate", json!(true)),
        ("omitPorts", json!(false)),
        ("useHttps", json!(false)),
        ("forceHttps", json!(false)),
        ("forceClientHttps", json!(false)),
        ("domainUseHttps", json!(false)),
        ("enableNonAscii", json!(false)),
    ];
    defaults
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    fn backend(config: MockConfig) -> MockBackend {
        let (_in_tx, in_rx) = bounded(crate::protocol::INBOUND_CAP);
        let (out_tx, _out_rx) = bounded(crate::protocol::OUTBOUND_CAP);
        MockBackend::new(in_rx, out_tx, config)
    }

    fn request(cmd: &str, extra: Value) -> Map<String, Value> {
        let mut m = match extra {
            Value::Object(m) => m,
            _ => Map::new(),
        };
        m.insert(CMD_KEY.to_string(), Value::String(cmd.to_string()));
        m
    }

    #[test]
    fn save_settings_merges_and_opens_settings_menu() {
        let mut b = backend(MockConfig::default());
        let reply = b.handle(
            None,
            &request(commands::SAVE_SETTINGS, json!({ "settings": { "tuner": 4 } })),
        );
        assert_eq!(reply.open_menu.as_deref(), Some("5"));
        assert_eq!(reply.settings.unwrap().get("tuner"), Some(&json!(4)));
        assert!(!reply.reload);
    }

    #[test]
    fn server_config_reply_carries_default_settings() {
        let mut b = backend(MockConfig::default());
        let reply = b.handle(None, &request(commands::GET_SERVER_CONFIG, json!({})));
        let settings = reply.settings.expect("settings");
        assert_eq!(settings.len(), 42);
        assert_eq!(settings.get("tuner"), Some(&json!(1)));
        assert_eq!(settings.get("update"), Some(&json!(["0000"])));
        assert_eq!(settings.get("buffer.timeout"), Some(&json!(500.0)));
        assert_eq!(settings.get("enableNonAscii"), Some(&json!(false)));
    }

    #[test]
    fn enabling_web_auth_requests_reload() {
        let mut b = backend(MockConfig::default());
        let reply = b.handle(
            None,
            &request(
                commands::SAVE_SETTINGS,
                json!({ "settings": { "authentication.web": true } }),
            ),
        );
        assert!(reply.reload);
    }

    #[test]
    fn tokens_rotate_and_stale_tokens_are_rejected() {
        let mut b = backend(MockConfig {
            initial_token: Some("first".to_string()),
            ..MockConfig::default()
        });
        let ok = b.handle(Some("first"), &request(commands::GET_SERVER_CONFIG, json!({})));
        let next = ok.token.expect("rotated token");
        assert_ne!(next, "first");

        let stale = b.handle(Some("first"), &request(commands::GET_SERVER_CONFIG, json!({})));
        assert!(stale.error.is_some());
        assert!(stale.reload);
        assert!(stale.settings.is_none());

        let again = b.handle(Some(next.as_str()), &request(commands::GET_SERVER_CONFIG, json!({})));
        assert!(again.error.is_none());
    }

    #[test]
    fn wizard_advances_then_finishes_with_reload() {
        let mut b = backend(MockConfig {
            start_in_wizard: true,
            ..MockConfig::default()
        });
        for step in 1..WIZARD_STEPS {
            let reply = b.handle(
                None,
                &request(commands::SAVE_WIZARD, json!({ "wizard": { "tuner": 2 } })),
            );
            assert_eq!(reply.wizard, Some(step));
            assert!(reply.configuration_wizard);
        }
        let last = b.handle(
            None,
            &request(commands::SAVE_WIZARD, json!({ "wizard": { "xmltv": "x.xml" } })),
        );
        assert!(last.reload);
        assert!(!last.configuration_wizard);
        assert_eq!(last.wizard, None);
    }

    #[test]
    fn update_log_carries_no_settings() {
        let mut b = backend(MockConfig::default());
        b.handle(None, &request(commands::GET_SERVER_CONFIG, json!({})));
        let reply = b.handle(None, &request(commands::UPDATE_LOG, json!({})));
        assert!(reply.settings.is_none());
        assert_eq!(reply.log.unwrap().log.len(), 1);
    }

    #[test]
    fn change_version_toggles_beta_and_reloads() {
        let mut b = backend(MockConfig::default());
        let before = b.handle(None, &request(commands::GET_SERVER_CONFIG, json!({})));
        let beta = before.client_info.expect("client info").beta;

        let reply = b.handle(None, &request(commands::CHANGE_VERSION, json!({})));
        assert!(reply.reload);
        assert_eq!(reply.client_info.expect("client info").beta, !beta);
    }

    #[test]
    fn unknown_command_reports_error() {
        let mut b = backend(MockConfig::default());
        let reply = b.handle(None, &request("bogus", json!({})));
        assert_eq!(reply.error.as_deref(), Some("unknown command: bogus"));
        assert!(!reply.status);
    }
}
