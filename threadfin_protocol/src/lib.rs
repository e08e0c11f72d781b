use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved envelope key holding the command name.
pub const CMD_KEY: &str = "cmd";

/// Cookie and query-parameter name carrying the session token.
pub const TOKEN_COOKIE: &str = "Token";

/// Path of the panel websocket endpoint.
pub const WS_PATH: &str = "/ws/";

pub mod commands {
    pub const GET_SERVER_CONFIG: &str = "getServerConfig";
    pub const UPDATE_LOG: &str = "updateLog";
    pub const RESET_LOGS: &str = "resetLogs";
    pub const SAVE_SETTINGS: &str = "saveSettings";
    pub const SAVE_WIZARD: &str = "saveWizard";
    pub const UPLOAD_CUSTOM_IMAGE: &str = "uploadCustomImage";
    pub const UPLOAD_LOGO: &str = "uploadLogo";
    pub const UPDATE_THREADFIN: &str = "updateThreadfin";
    pub const CHANGE_VERSION: &str = "changeVersion";
    pub const BACKUP: &str = "ThreadfinBackup";
}

/// Top-level reply keys the client interprets instead of treating as state.
pub mod reply_keys {
    pub const TOKEN: &str = "token";
    pub const ERROR: &str = "error";
    pub const ERR: &str = "err";
    pub const LOGO_URL: &str = "logoURL";
    pub const LOG: &str = "log";
    pub const OPEN_MENU: &str = "openMenu";
    pub const OPEN_LINK: &str = "openLink";
    pub const ALERT: &str = "alert";
    pub const RELOAD: &str = "reload";
    pub const WIZARD: &str = "wizard";
}

/// Side effect a reply asks the client to perform after its state is applied.
///
/// Variants are listed in evaluation order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Directive {
    OpenMenu { menu: String },
    OpenLink { url: String },
    Alert { text: String },
    Reload,
    Wizard { step: usize },
}

impl Directive {
    /// Decodes every directive present in `reply`, in evaluation order.
    pub fn decode_all(reply: &Map<String, Value>) -> Vec<Directive> {
        let mut out = Vec::new();

        if let Some(menu) = reply.get(reply_keys::OPEN_MENU).and_then(scalar_text) {
            out.push(Directive::OpenMenu { menu });
        }
        if let Some(url) = reply.get(reply_keys::OPEN_LINK).and_then(scalar_text) {
            out.push(Directive::OpenLink { url });
        }
        if let Some(text) = reply.get(reply_keys::ALERT).and_then(scalar_text) {
            out.push(Directive::Alert { text });
        }
        if reply
            .get(reply_keys::RELOAD)
            .is_some_and(|v| !matches!(v, Value::Null | Value::Bool(false)))
        {
            out.push(Directive::Reload);
        }
        if let Some(step) = reply.get(reply_keys::WIZARD).and_then(Value::as_u64) {
            out.push(Directive::Wizard {
                step: step as usize,
            });
        }

        out
    }
}

/// Returns the server-reported error text, if the reply carries one.
///
/// Both spellings the server has used (`error` and `err`) are honored. Empty
/// strings, `false` and `null` do not count as errors.
pub fn reply_error(reply: &Map<String, Value>) -> Option<String> {
    [reply_keys::ERROR, reply_keys::ERR]
        .iter()
        .filter_map(|k| reply.get(*k))
        .find_map(|v| match v {
            Value::Null | Value::Bool(false) => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })
}

fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Server log block as carried under the `log` reply key.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct WebLog {
    #[serde(default)]
    pub log: Vec<String>,
    #[serde(default)]
    pub errors: i64,
    #[serde(default)]
    pub warnings: i64,
}

/// Subset of `clientInfo` the panel renders.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ClientInfo {
    #[serde(default)]
    pub arch: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub beta: bool,
    #[serde(default, rename = "DVR")]
    pub dvr: String,
    #[serde(default, rename = "epgSource")]
    pub epg_source: String,
    #[serde(default)]
    pub errors: i64,
    #[serde(default)]
    pub warnings: i64,
    #[serde(default)]
    pub streams: String,
    #[serde(default)]
    pub xepg: i64,
    #[serde(default, rename = "m3u-url")]
    pub m3u_url: String,
    #[serde(default, rename = "xepg-url")]
    pub xepg_url: String,
    #[serde(default)]
    pub uuid: String,
}

/// Reply envelope as the server writes it. Clients read replies as untyped
/// maps; this shape exists for servers and fixtures.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ServerReply {
    #[serde(rename = "clientInfo", skip_serializing_if = "Option::is_none")]
    pub client_info: Option<ClientInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<WebLog>,
    #[serde(rename = "configurationWizard", default)]
    pub configuration_wizard: bool,
    #[serde(default)]
    pub status: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(rename = "err", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "logoURL", skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(rename = "openMenu", skip_serializing_if = "Option::is_none")]
    pub open_menu: Option<String>,
    #[serde(rename = "openLink", skip_serializing_if = "Option::is_none")]
    pub open_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub reload: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wizard: Option<usize>,
}

/// GitHub release entry used by the update check.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub prerelease: bool,
}
