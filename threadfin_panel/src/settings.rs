//! Settings view, driven by a static table of setting definitions.

use crate::controller::Controller;
use crate::error::PanelError;
use crate::form::{select_value, Control, FormField};
use crate::host::{element_ids, PanelHost};
use crate::html::Element;
use crate::state::{AppState, ServerState};
use crate::transport::{Command, RequestId};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{Map, Value};
use thiserror::Error;
use threadfin_protocol::commands;
use tracing::debug;

pub const SETTINGS_VIEW_ID: &str = "content_settings";
const WEB_AUTH_KEY: &str = "authentication.web";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text { placeholder: &'static str },
    Checkbox,
    /// (label, value) pairs.
    Select(&'static [(&'static str, &'static str)]),
    TunerCount,
    IpBinding,
    Button { label: &'static str, action: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingDef {
    pub key: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub kind: FieldKind,
    /// Only shown while web authentication is enabled.
    pub requires_web_auth: bool,
}

const fn def(
    key: &'static str,
    title: &'static str,
    description: &'static str,
    kind: FieldKind,
) -> SettingDef {
    SettingDef {
        key,
        title,
        description,
        kind,
        requires_web_auth: false,
    }
}

const fn auth_def(key: &'static str, title: &'static str, description: &'static str) -> SettingDef {
    SettingDef {
        key,
        title,
        description,
        kind: FieldKind::Checkbox,
        requires_web_auth: true,
    }
}

const DUMMY_CHANNEL_OPTIONS: &[(&str, &str)] = &[
    ("PPV", "PPV"),
    ("30 Minutes", "30_Minutes"),
    ("60 Minutes", "60_Minutes"),
    ("90 Minutes", "90_Minutes"),
    ("120 Minutes", "120_Minutes"),
    ("180 Minutes", "180_Minutes"),
    ("240 Minutes", "240_Minutes"),
    ("360 Minutes", "360_Minutes"),
];
const EPG_SOURCE_OPTIONS: &[(&str, &str)] = &[("PMS", "PMS"), ("XEPG", "XEPG")];
const BACKUP_KEEP_OPTIONS: &[(&str, &str)] = &[
    ("5", "5"),
    ("10", "10"),
    ("20", "20"),
    ("30", "30"),
    ("40", "40"),
    ("50", "50"),
];
const BUFFER_SIZE_OPTIONS: &[(&str, &str)] = &[
    ("0.5 MB", "512"),
    ("1 MB", "1024"),
    ("2 MB", "2048"),
    ("3 MB", "3072"),
    ("4 MB", "4096"),
    ("5 MB", "5120"),
    ("6 MB", "6144"),
    ("7 MB", "7168"),
    ("8 MB", "8192"),
];
const BUFFER_OPTIONS: &[(&str, &str)] = &[
    ("No buffer", "-"),
    ("FFmpeg: (external)", "ffmpeg"),
    ("VLC: (external)", "vlc"),
    ("Threadfin: (internal)", "threadfin"),
];

pub const SETTINGS: &[SettingDef] = &[
    def("tuner", "Number of tuners", "Number of parallel connections that can be established to the provider.", FieldKind::TunerCount),
    def("epgSource", "EPG source", "PMS: use the EPG data of the media server.\nXEPG: use one or more XMLTV files.", FieldKind::Select(EPG_SOURCE_OPTIONS)),
    def("update", "Schedule for updating", "Time in 24-hour format (0000 = 12:00 AM). Separate several times with a comma.", FieldKind::Text { placeholder: "0000,1000,2000" }),
    def("api", "API interface", "Enables the API interface.", FieldKind::Checkbox),
    def("ssdp", "SSDP", "Announces the tuner on the local network.", FieldKind::Checkbox),
    def("ThreadfinAutoUpdate", "Automatic update", "Installs new versions automatically.", FieldKind::Checkbox),
    def("files.update", "Update files at startup", "Updates all playlists and XMLTV files at startup.", FieldKind::Checkbox),
    def("cache.images", "Image caching", "Caches all channel logos and EPG images locally.", FieldKind::Checkbox),
    def("xepg.replace.missing.images", "Replace missing program images", "Uses the channel logo when a program has no image.", FieldKind::Checkbox),
    def("xepg.replace.channel.title", "Replace channel title", "Uses the channel name as program title.", FieldKind::Checkbox),
    def("enableNonAscii", "Enable non-ASCII characters", "", FieldKind::Checkbox),
    def("epgCategories", "EPG categories", "Category mappings in the form Name:category, separated by |.", FieldKind::Text { placeholder: "Kids:kids|News:news" }),
    def("epgCategoriesColors", "EPG category colors", "Colors in the form category:color, separated by |.", FieldKind::Text { placeholder: "kids:mediumpurple|news:tomato" }),
    def("dummy", "Dummy channels", "Adds a dummy EPG to channels without program data.", FieldKind::Checkbox),
    def("dummyChannel", "Dummy program length", "", FieldKind::Select(DUMMY_CHANNEL_OPTIONS)),
    def("ignoreFilters", "Ignore filters", "", FieldKind::Checkbox),
    def("buffer", "Stream buffer", "Buffering of the stream before it is sent to the client.", FieldKind::Select(BUFFER_OPTIONS)),
    def("buffer.size.kb", "Buffer size", "Size of the buffer before playback starts.", FieldKind::Select(BUFFER_SIZE_OPTIONS)),
    def("buffer.timeout", "Timeout for new client connections", "Milliseconds to wait for a new stream connection.", FieldKind::Text { placeholder: "100" }),
    def("buffer.autoReconnect", "Automatic reconnect", "Reconnects to the provider when the stream drops.", FieldKind::Checkbox),
    def("storeBufferInRAM", "Store buffer in RAM", "Keeps the buffer in memory instead of on disk.", FieldKind::Checkbox),
    def("user.agent", "User agent", "User agent sent to the provider.", FieldKind::Text { placeholder: "Threadfin" }),
    def("ffmpeg.path", "FFmpeg binary path", "Path to the FFmpeg binary.", FieldKind::Text { placeholder: "/path/to/ffmpeg" }),
    def("ffmpeg.options", "FFmpeg options", "Do not change unless you know what you are doing.", FieldKind::Text { placeholder: "FFmpeg options" }),
    def("vlc.path", "VLC path", "Path to the cvlc binary.", FieldKind::Text { placeholder: "/path/to/cvlc" }),
    def("vlc.options", "VLC options", "Do not change unless you know what you are doing.", FieldKind::Text { placeholder: "VLC options" }),
    def("udpxy", "udpxy address", "Address of a udpxy proxy, e.g. host:4022.", FieldKind::Text { placeholder: "udpxy.local:4022" }),
    def("bindingIPs", "Binding IPs", "IP addresses Threadfin listens on. Leave empty for all.", FieldKind::IpBinding),
    def("threadfinDomain", "Threadfin domain", "Domain used in the generated playlist URLs.", FieldKind::Text { placeholder: "threadfin.local" }),
    def("omitPorts", "Omit ports", "Leaves the port out of generated URLs.", FieldKind::Checkbox),
    def("useHttps", "Use HTTPS", "Serves the web interface over HTTPS.", FieldKind::Checkbox),
    def("forceHttps", "Force HTTPS", "Redirects all plain requests to HTTPS.", FieldKind::Checkbox),
    def("forceClientHttps", "Force client HTTPS", "Generated client URLs use HTTPS.", FieldKind::Checkbox),
    def("domainUseHttps", "Domain uses HTTPS", "", FieldKind::Checkbox),
    def("backup.path", "Backup path", "Folder where automatic backups are stored.", FieldKind::Text { placeholder: "/mnt/data/backup/threadfin/" }),
    def("backup.keep", "Number of backups to keep", "Older backups are deleted.", FieldKind::Select(BACKUP_KEEP_OPTIONS)),
    def("temp.path", "Temporary path", "Folder for temporary files.", FieldKind::Text { placeholder: "/tmp/threadfin/" }),
    def("uploadCustomImage", "Custom channel image", "Image used for channels that have no logo.", FieldKind::Button { label: "Upload", action: "upload" }),
    def("authentication.web", "WEB authentication", "Access to the web interface only with credentials.", FieldKind::Checkbox),
    auth_def("authentication.pms", "PMS authentication", "The media server has to authenticate."),
    auth_def("authentication.m3u", "M3U authentication", "Downloading the M3U file requires credentials."),
    auth_def("authentication.xml", "XML authentication", "Downloading the XMLTV file requires credentials."),
    auth_def("authentication.api", "API authentication", "API requests require credentials."),
];

#[derive(Debug, Clone, Copy)]
pub struct SettingsCategory {
    pub headline: &'static str,
    pub keys: &'static [&'static str],
}

pub const SETTINGS_CATEGORIES: &[SettingsCategory] = &[
    SettingsCategory {
        headline: "General",
        keys: &["ThreadfinAutoUpdate", "ssdp", "tuner", "epgSource", "api"],
    },
    SettingsCategory {
        headline: "Files",
        keys: &[
            "update",
            "files.update",
            "temp.path",
            "cache.images",
            "xepg.replace.missing.images",
            "xepg.replace.channel.title",
            "enableNonAscii",
            "epgCategories",
            "epgCategoriesColors",
            "dummy",
            "dummyChannel",
            "ignoreFilters",
            "uploadCustomImage",
        ],
    },
    SettingsCategory {
        headline: "Network",
        keys: &[
            "bindingIPs",
            "threadfinDomain",
            "omitPorts",
            "useHttps",
            "forceHttps",
            "forceClientHttps",
            "domainUseHttps",
            "udpxy",
        ],
    },
    SettingsCategory {
        headline: "Streaming",
        keys: &[
            "buffer",
            "buffer.size.kb",
            "storeBufferInRAM",
            "buffer.autoReconnect",
            "buffer.timeout",
            "user.agent",
            "ffmpeg.path",
            "ffmpeg.options",
            "vlc.path",
            "vlc.options",
        ],
    },
    SettingsCategory {
        headline: "Backup",
        keys: &["backup.path", "backup.keep"],
    },
    SettingsCategory {
        headline: "Authentication",
        keys: &[
            "authentication.web",
            "authentication.pms",
            "authentication.m3u",
            "authentication.xml",
            "authentication.api",
        ],
    },
];

pub fn setting_def(key: &str) -> Option<&'static SettingDef> {
    SETTINGS.iter().find(|d| d.key == key)
}

/// Text shown in an input for a stored setting value.
pub fn display_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| display_value(Some(v)))
            .collect::<Vec<_>>()
            .join(","),
        Some(other) => other.to_string(),
    }
}

pub fn render_settings(state: &ServerState) -> Element {
    let web_auth = state
        .setting(WEB_AUTH_KEY)
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let mut view = Element::new("div").id(SETTINGS_VIEW_ID);
    for category in SETTINGS_CATEGORIES {
        view.push(Element::new("h4").text(category.headline));
        let mut table = Element::new("table");
        for def in category.keys.iter().filter_map(|k| setting_def(k)) {
            if def.requires_web_auth && !web_auth {
                continue;
            }
            table.push(render_setting_row(def, state.setting(def.key)));
            table.push(description_row(def, web_auth));
        }
        view.push(table);
        view.push(Element::new("hr"));
    }
    view
}

pub fn render_setting_row(def: &SettingDef, value: Option<&Value>) -> Element {
    let label = Element::new("td").text(format!("{}:", def.title));
    let control = match def.kind {
        FieldKind::Text { placeholder } => text_input(def.key)
            .attr("value", display_value(value))
            .attr("placeholder", placeholder),
        FieldKind::Checkbox => {
            let input = Element::new("input")
                .attr("type", "checkbox")
                .id(def.key)
                .attr("name", def.key);
            if value.and_then(Value::as_bool).unwrap_or(false) {
                input.attr("checked", "checked")
            } else {
                input
            }
        }
        FieldKind::Select(options) => select(
            def.key,
            options.iter().map(|(l, v)| (l.to_string(), v.to_string())),
            value,
        ),
        FieldKind::TunerCount => select(
            def.key,
            (1..=100).map(|n| (n.to_string(), n.to_string())),
            value,
        ),
        FieldKind::IpBinding => text_input(def.key)
            .attr("value", display_value(value))
            .attr("readonly", "true")
            .attr("onclick", "showIPBindingDialogue()"),
        FieldKind::Button { label, action } => Element::new("input")
            .attr("type", "button")
            .id(action)
            .attr("value", label),
    };
    Element::new("tr")
        .child(label)
        .child(Element::new("td").child(control))
}

fn description_row(def: &SettingDef, web_auth: bool) -> Element {
    let text = if def.key == "authentication.api" && !web_auth {
        ""
    } else {
        def.description
    };
    Element::new("tr")
        .child(Element::new("td"))
        .child(Element::new("td").child(Element::new("pre").text(text)))
}

fn text_input(key: &str) -> Element {
    Element::new("input")
        .attr("type", "text")
        .id(key)
        .attr("name", key)
}

pub(crate) fn select(
    key: &str,
    options: impl Iterator<Item = (String, String)>,
    current: Option<&Value>,
) -> Element {
    let current = display_value(current);
    let mut el = Element::new("select").id(key).attr("name", key);
    for (label, value) in options {
        let mut option = Element::new("option").attr("value", value.as_str());
        if value == current {
            option.set_attr("selected", "selected");
        }
        el.push(option.text(label));
    }
    el
}

/// Payload of `saveSettings`: every changed field, typed per control.
pub fn collect_settings(fields: &[FormField]) -> Map<String, Value> {
    let mut out = Map::new();
    for field in fields.iter().filter(|f| f.changed) {
        let value = match &field.control {
            Control::Checkbox(checked) => Value::Bool(*checked),
            Control::Text(text) => text_setting_value(&field.name, text),
            Control::Select(raw) => select_value(raw),
            Control::Button => continue,
        };
        out.insert(field.name.clone(), value);
    }
    out
}

fn text_setting_value(name: &str, text: &str) -> Value {
    match name {
        "update" => Value::Array(
            text.split(',')
                .filter(|s| !s.is_empty())
                .map(|s| Value::String(s.to_string()))
                .collect(),
        ),
        "buffer.timeout" => leading_float(text)
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        _ => Value::String(text.to_string()),
    }
}

/// Longest numeric prefix, the way a lenient float parse reads "250ms".
fn leading_float(text: &str) -> Option<f64> {
    let text = text.trim_start();
    (1..=text.len())
        .rev()
        .filter(|&end| text.is_char_boundary(end))
        .find_map(|end| text[..end].parse::<f64>().ok())
        .filter(|f| f.is_finite())
}

pub fn save_settings_command(fields: &[FormField]) -> Command {
    Command::new(commands::SAVE_SETTINGS).with("settings", collect_settings(fields))
}

pub fn save_settings(ctrl: &mut Controller, fields: &[FormField]) -> Result<RequestId, PanelError> {
    debug!(changed = fields.iter().filter(|f| f.changed).count(), "saving settings");
    ctrl.send(&save_settings_command(fields))
}

/// Remembers the stored value of `field` before its first edit.
pub fn record_edit(app: &mut AppState, field: &FormField) {
    let previous = app.server.setting(&field.name).cloned().unwrap_or(Value::Null);
    app.pending_edits.record(&field.name, previous);
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("unknown setting {0}")]
    UnknownKey(String),
    #[error("setting {0} cannot be set from a value")]
    NotEditable(String),
    #[error("setting {key} expects true or false, got {value:?}")]
    InvalidBool { key: String, value: String },
}

/// Builds an edited form field for `key` from its textual value.
pub fn field_from_text(key: &str, raw: &str) -> Result<FormField, SettingsError> {
    let def = setting_def(key).ok_or_else(|| SettingsError::UnknownKey(key.to_string()))?;
    match def.kind {
        FieldKind::Checkbox => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "on" | "yes" => Ok(FormField::checkbox(key, true)),
            "false" | "0" | "off" | "no" => Ok(FormField::checkbox(key, false)),
            _ => Err(SettingsError::InvalidBool {
                key: key.to_string(),
                value: raw.to_string(),
            }),
        },
        FieldKind::Text { .. } | FieldKind::IpBinding => Ok(FormField::text(key, raw)),
        FieldKind::Select(_) | FieldKind::TunerCount => Ok(FormField::select(key, raw)),
        FieldKind::Button { .. } => Err(SettingsError::NotEditable(key.to_string())),
    }
}

fn image_mime(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}

pub fn upload_custom_image_command(filename: &str, bytes: &[u8]) -> Command {
    let data_url = format!("data:{};base64,{}", image_mime(filename), STANDARD.encode(bytes));
    Command::new(commands::UPLOAD_CUSTOM_IMAGE)
        .with("base64", data_url)
        .with("filename", filename)
}

pub fn upload_custom_image(
    ctrl: &mut Controller,
    host: &mut dyn PanelHost,
    filename: &str,
    bytes: &[u8],
) -> Result<RequestId, PanelError> {
    let id = ctrl.send(&upload_custom_image_command(filename, bytes))?;
    host.set_checked(element_ids::UPDATE_ICON, false, true);
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(v: Value) -> ServerState {
        match v {
            Value::Object(m) => ServerState::from_map(m),
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn every_category_key_has_a_definition() {
        for category in SETTINGS_CATEGORIES {
            for key in category.keys {
                assert!(setting_def(key).is_some(), "missing definition for {key}");
            }
        }
    }

    #[test]
    fn auth_sub_options_hidden_without_web_auth() {
        let off = render_settings(&state(json!({ "settings": { "authentication.web": false } })));
        assert!(off.find_by_id("authentication.web").is_some());
        assert!(off.find_by_id("authentication.pms").is_none());

        let on = render_settings(&state(json!({ "settings": { "authentication.web": true } })));
        assert!(on.find_by_id("authentication.pms").is_some());
        assert!(on.find_by_id("authentication.api").is_some());
    }

    #[test]
    fn rows_reflect_stored_values() {
        let view = render_settings(&state(json!({ "settings": {
            "update": ["0000", "1200"],
            "ssdp": true,
            "buffer.size.kb": 2048,
            "tuner": 3,
        } })));

        let update = view.find_by_id("update").unwrap();
        assert_eq!(update.get_attr("value"), Some("0000,1200"));
        assert_eq!(view.find_by_id("ssdp").unwrap().get_attr("checked"), Some("checked"));

        let selected = |id: &str| {
            let mut opts = Vec::new();
            view.find_by_id(id).unwrap().find_all("option", &mut opts);
            opts.into_iter()
                .find(|o| o.get_attr("selected").is_some())
                .and_then(|o| o.get_attr("value").map(str::to_string))
        };
        assert_eq!(selected("buffer.size.kb").as_deref(), Some("2048"));
        assert_eq!(selected("tuner").as_deref(), Some("3"));

        let mut tuner_opts = Vec::new();
        view.find_by_id("tuner").unwrap().find_all("option", &mut tuner_opts);
        assert_eq!(tuner_opts.len(), 100);
    }

    #[test]
    fn collect_types_values_per_control() {
        let fields = vec![
            FormField::checkbox("ssdp", false),
            FormField::text("update", "0000,,1200,"),
            FormField::text("buffer.timeout", "250"),
            FormField::text("user.agent", "VLC"),
            FormField::select("backup.keep", "20"),
            FormField::select("buffer", "ffmpeg"),
            FormField::text("temp.path", "/ignored/").unchanged(),
        ];
        assert_eq!(
            Value::Object(collect_settings(&fields)),
            json!({
                "ssdp": false,
                "update": ["0000", "1200"],
                "buffer.timeout": 250.0,
                "user.agent": "VLC",
                "backup.keep": 20,
                "buffer": "ffmpeg",
            })
        );
    }

    #[test]
    fn non_numeric_buffer_timeout_becomes_null() {
        let out = collect_settings(&[FormField::text("buffer.timeout", "soon")]);
        assert_eq!(out.get("buffer.timeout"), Some(&Value::Null));
        let out = collect_settings(&[FormField::text("buffer.timeout", "1.5s")]);
        assert_eq!(out.get("buffer.timeout"), Some(&json!(1.5)));
    }

    #[test]
    fn save_command_wraps_changes() {
        let cmd = save_settings_command(&[FormField::select("tuner", "4")]);
        assert_eq!(cmd.name, "saveSettings");
        assert_eq!(cmd.payload.get("settings"), Some(&json!({ "tuner": 4 })));
    }

    #[test]
    fn text_values_map_onto_setting_kinds() {
        assert_eq!(field_from_text("ssdp", "off"), Ok(FormField::checkbox("ssdp", false)));
        assert_eq!(field_from_text("tuner", "2"), Ok(FormField::select("tuner", "2")));
        assert_eq!(
            field_from_text("nope", "1"),
            Err(SettingsError::UnknownKey("nope".to_string()))
        );
        assert!(matches!(
            field_from_text("uploadCustomImage", "x"),
            Err(SettingsError::NotEditable(_))
        ));
    }

    #[test]
    fn custom_image_is_sent_as_data_url() {
        let cmd = upload_custom_image_command("logo.PNG", b"hi");
        assert_eq!(cmd.name, "uploadCustomImage");
        assert_eq!(cmd.payload.get("base64"), Some(&json!("data:image/png;base64,aGk=")));
        assert_eq!(cmd.payload.get("filename"), Some(&json!("logo.PNG")));
    }

    #[test]
    fn record_edit_keeps_first_value() {
        let mut app = AppState::default();
        app.server = state(json!({ "settings": { "tuner": 1 } }));
        record_edit(&mut app, &FormField::select("tuner", "2"));
        app.server = state(json!({ "settings": { "tuner": 2 } }));
        record_edit(&mut app, &FormField::select("tuner", "3"));
        assert_eq!(app.pending_edits.original("tuner"), Some(&json!(1)));
    }
}
