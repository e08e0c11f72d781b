use crate::form::{Control, FormField};
use crate::location::CookieJar;
use crate::settings::display_value;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use threadfin_protocol::{commands, reply_keys, ClientInfo};
use tracing::{debug, warn};

/// Last full reply received from the server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerState {
    data: Map<String, Value>,
}

impl ServerState {
    pub fn from_map(data: Map<String, Value>) -> Self {
        Self { data }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn replace(&mut self, data: Map<String, Value>) {
        self.data = data;
    }

    /// Swaps only the `log` field; everything else is kept.
    pub fn replace_log(&mut self, log: Value) {
        self.data.insert(reply_keys::LOG.to_string(), log);
    }

    pub fn settings(&self) -> Option<&Map<String, Value>> {
        self.data.get("settings").and_then(Value::as_object)
    }

    /// Setting keys contain dots, so they are looked up as flat keys.
    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.settings().and_then(|s| s.get(key))
    }

    /// Falls back to an empty `ClientInfo` when the field is missing or unreadable.
    pub fn client_info(&self) -> ClientInfo {
        let Some(raw) = self.data.get("clientInfo") else {
            return ClientInfo::default();
        };
        match serde_json::from_value::<ClientInfo>(raw.clone()) {
            Ok(info) => info,
            Err(e) => {
                warn!("clientInfo not readable, using defaults: {e}");
                ClientInfo::default()
            }
        }
    }

    pub fn configuration_wizard(&self) -> bool {
        self.data
            .get("configurationWizard")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Log lines in display order. Keyed objects are ordered by key.
    pub fn log_entries(&self) -> Vec<String> {
        let Some(log) = self.data.get(reply_keys::LOG).and_then(|l| l.get("log")) else {
            return Vec::new();
        };
        match log {
            Value::Array(items) => items.iter().map(value_text).collect(),
            Value::Object(items) => {
                let sorted: BTreeMap<&String, &Value> = items.iter().collect();
                sorted.into_values().map(value_text).collect()
            }
            _ => Vec::new(),
        }
    }
}

fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Form edits made since the last non-log request, keyed by setting name.
/// Each entry holds the value the field had before the first edit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingEdits {
    original: BTreeMap<String, Value>,
}

impl PendingEdits {
    pub fn record(&mut self, key: &str, previous: Value) {
        self.original.entry(key.to_string()).or_insert(previous);
    }

    pub fn original(&self, key: &str) -> Option<&Value> {
        self.original.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.original.is_empty()
    }

    pub fn clear(&mut self) {
        self.original.clear();
    }

    /// Puts recorded values back onto `fields` and unmarks them.
    pub fn revert(&self, fields: &mut [FormField]) {
        for field in fields.iter_mut() {
            let Some(original) = self.original.get(&field.name) else {
                continue;
            };
            field.control = match (&field.control, original) {
                (Control::Checkbox(_), v) => Control::Checkbox(v.as_bool().unwrap_or(false)),
                (Control::Text(_), v) => Control::Text(display_value(Some(v))),
                (Control::Select(_), v) => Control::Select(display_value(Some(v))),
                (Control::Button, _) => Control::Button,
            };
            field.changed = false;
        }
    }
}

/// Process-wide panel state shared by the transport and presentation code.
#[derive(Debug, Default)]
pub struct AppState {
    pub server: ServerState,
    pub cookies: CookieJar,
    pub pending_edits: PendingEdits,
    /// Set while a request is outstanding, cleared on reply or failure.
    pub in_flight: bool,
    /// Set once any connection has opened.
    pub ws_available: bool,
    /// Set once the user has been told the server is unreachable.
    pub unreachable_notified: bool,
}

impl AppState {
    pub fn new(cookies: CookieJar) -> Self {
        Self {
            cookies,
            ..Self::default()
        }
    }

    /// Bookkeeping done before a request goes out.
    pub fn begin_request(&mut self, cmd: &str) {
        if cmd != commands::UPDATE_LOG && !self.pending_edits.is_empty() {
            debug!(%cmd, "discarding pending form edits");
            self.pending_edits.clear();
        }
        self.in_flight = true;
    }
}
