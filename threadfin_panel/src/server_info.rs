use crate::html::Element;
use crate::state::ServerState;
use crate::transport::Command;
use std::str::FromStr;
use threadfin_protocol::{commands, ClientInfo};
use tracing::warn;

pub const SERVER_INFO_VIEW_ID: &str = "server_information";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoItem {
    Version,
    Errors,
    Warnings,
    Dvr,
    Streams,
    Xepg,
    M3uUrl,
    XepgUrl,
    ChangeVersion,
}

impl FromStr for InfoItem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "version" => InfoItem::Version,
            "errors" => InfoItem::Errors,
            "warnings" => InfoItem::Warnings,
            "dvr" => InfoItem::Dvr,
            "streams" => InfoItem::Streams,
            "xepg" => InfoItem::Xepg,
            "m3uUrl" => InfoItem::M3uUrl,
            "xepgUrl" => InfoItem::XepgUrl,
            "changeVersion" => InfoItem::ChangeVersion,
            other => return Err(other.to_string()),
        })
    }
}

impl InfoItem {
    pub fn id(self) -> &'static str {
        match self {
            InfoItem::Version => "version",
            InfoItem::Errors => "errors",
            InfoItem::Warnings => "warnings",
            InfoItem::Dvr => "dvr",
            InfoItem::Streams => "streams",
            InfoItem::Xepg => "xepg",
            InfoItem::M3uUrl => "m3uUrl",
            InfoItem::XepgUrl => "xepgUrl",
            InfoItem::ChangeVersion => "changeVersion",
        }
    }

    fn label(self) -> &'static str {
        match self {
            InfoItem::Version => "Version",
            InfoItem::Errors => "Errors",
            InfoItem::Warnings => "Warnings",
            InfoItem::Dvr => "DVR IP",
            InfoItem::Streams => "Available streams",
            InfoItem::Xepg => "XEPG channels",
            InfoItem::M3uUrl => "M3U URL",
            InfoItem::XepgUrl => "XEPG URL",
            InfoItem::ChangeVersion => "",
        }
    }

    pub fn value(self, info: &ClientInfo) -> String {
        match self {
            InfoItem::Version => info.version.clone(),
            InfoItem::Errors => info.errors.to_string(),
            InfoItem::Warnings => info.warnings.to_string(),
            InfoItem::Dvr => info.dvr.clone(),
            InfoItem::Streams => info.streams.clone(),
            InfoItem::Xepg => info.xepg.to_string(),
            InfoItem::M3uUrl => info.m3u_url.clone(),
            InfoItem::XepgUrl => info.xepg_url.clone(),
            InfoItem::ChangeVersion if info.beta => "Switch to stable".to_string(),
            InfoItem::ChangeVersion => "Switch to beta".to_string(),
        }
    }
}

/// (group title, comma separated items)
pub const SERVER_INFO_GROUPS: &[(&str, &str)] = &[
    ("Threadfin", "version,changeVersion"),
    ("Log", "errors,warnings"),
    ("Streaming", "dvr,streams,xepg"),
    ("URLs", "m3uUrl,xepgUrl"),
];

pub fn render_server_information(state: &ServerState) -> Element {
    let info = state.client_info();
    let row = Element::new("div").class("row").children(
        SERVER_INFO_GROUPS
            .iter()
            .map(|(title, items)| render_group(title, items, &info)),
    );

    let header = Element::new("div")
        .class("modal-header")
        .child(Element::new("h3").class("modal-title").text("Server information"))
        .child(
            Element::new("button")
                .class("btn-close btn-close-white")
                .attr("type", "button")
                .attr("data-bs-dismiss", "modal"),
        );
    let body = Element::new("div")
        .class("modal-body")
        .child(Element::new("div").class("container-fluid").child(row));

    Element::new("div").id(SERVER_INFO_VIEW_ID).child(
        Element::new("div").class("modal-dialog modal-xl").child(
            Element::new("div")
                .class("modal-content")
                .child(header)
                .child(body),
        ),
    )
}

fn render_group(title: &str, items: &str, info: &ClientInfo) -> Element {
    let mut body = Element::new("div").class("card-body");
    for raw in items.split(',') {
        let item = match raw.parse::<InfoItem>() {
            Ok(item) => item,
            Err(unknown) => {
                warn!(item = %unknown, "unknown server information item");
                continue;
            }
        };
        let value = item.value(info);
        match item {
            InfoItem::ChangeVersion => body.push(
                Element::new("input")
                    .attr("type", "button")
                    .id(item.id())
                    .attr("value", value),
            ),
            InfoItem::M3uUrl | InfoItem::XepgUrl => {
                body.push(label(item));
                body.push(
                    Element::new("div")
                        .class("input-group")
                        .child(readonly_input(item, value, false))
                        .child(
                            Element::new("button")
                                .attr("type", "button")
                                .class("input-group-text copy-btn")
                                .attr("data-clipboard-target", format!("#{}", item.id()))
                                .attr("data-bs-title", "Copy to clipboard"),
                        ),
                );
            }
            _ => {
                body.push(label(item));
                body.push(readonly_input(item, value, true));
            }
        }
    }
    Element::new("div")
        .class("card text-bg-dark mb-3")
        .child(Element::new("div").class("card-header").text(title))
        .child(body)
}

fn label(item: InfoItem) -> Element {
    Element::new("label")
        .class("form-label")
        .attr("for", item.id())
        .text(item.label())
}

fn readonly_input(item: InfoItem, value: String, disabled: bool) -> Element {
    let input = Element::new("input")
        .attr("type", "text")
        .class("form-control")
        .id(item.id())
        .attr("value", value)
        .attr("readonly", "readonly");
    if disabled {
        input.attr("disabled", "disabled")
    } else {
        input
    }
}

pub fn change_version_command() -> Command {
    Command::new(commands::CHANGE_VERSION)
}
