//! First-run configuration wizard.

use crate::controller::Controller;
use crate::error::PanelError;
use crate::form::{select_value, Control, FormField};
use crate::host::{element_ids, PanelHost};
use crate::html::Element;
use crate::settings::select;
use crate::transport::{Command, RequestId};
use serde_json::{Map, Value};
use thiserror::Error;
use threadfin_protocol::commands;

pub const WIZARD_VIEW_ID: &str = "content";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Tuner { default: u32 },
    Select { options: &'static [&'static str], default: &'static str },
    Text { placeholder: &'static str },
}

#[derive(Debug, Clone, Copy)]
pub struct WizardStep {
    pub key: &'static str,
    pub headline: &'static str,
    pub description: &'static str,
    pub kind: StepKind,
}

pub const STEPS: &[WizardStep] = &[
    WizardStep {
        key: "tuner",
        headline: "Number of tuners",
        description: "Number of parallel connections that can be established to the provider.",
        kind: StepKind::Tuner { default: 1 },
    },
    WizardStep {
        key: "epgSource",
        headline: "EPG source",
        description: "PMS: use the EPG data of the media server.\nXEPG: use one or more XMLTV files.",
        kind: StepKind::Select {
            options: &["PMS", "XEPG"],
            default: "XEPG",
        },
    },
    WizardStep {
        key: "m3u",
        headline: "M3U playlist",
        description: "Local or remote playlist.",
        kind: StepKind::Text {
            placeholder: "File path or URL of the M3U",
        },
    },
    WizardStep {
        key: "xmltv",
        headline: "XMLTV file",
        description: "Local or remote XMLTV file.",
        kind: StepKind::Text {
            placeholder: "File path or URL of the XMLTV",
        },
    },
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WizardError {
    #[error("{}: Missing input", .name.to_uppercase())]
    MissingInput { name: String },
}

pub fn render_wizard_step(index: usize) -> Option<Element> {
    let step = STEPS.get(index)?;
    let control = match step.kind {
        StepKind::Tuner { default } => {
            let default = Value::from(default);
            select(
                step.key,
                (1..=100).map(|n| (n.to_string(), n.to_string())),
                Some(&default),
            )
        }
        StepKind::Select { options, default } => {
            let default = Value::from(default);
            select(
                step.key,
                options.iter().map(|o| (o.to_string(), o.to_string())),
                Some(&default),
            )
        }
        StepKind::Text { placeholder } => Element::new("input")
            .attr("type", "text")
            .id(step.key)
            .attr("name", step.key)
            .attr("value", "")
            .attr("placeholder", placeholder),
    }
    .class("wizard");

    Some(
        Element::new("div")
            .id(WIZARD_VIEW_ID)
            .child(Element::new("h4").text(step.headline))
            .child(control)
            .child(Element::new("pre").text(step.description)),
    )
}

/// Reads the wizard controls; stops at the first empty text input.
pub fn collect_wizard(fields: &[FormField]) -> Result<Map<String, Value>, WizardError> {
    let mut out = Map::new();
    for field in fields {
        match &field.control {
            Control::Select(raw) => {
                out.insert(field.name.clone(), select_value(raw));
            }
            Control::Text(text) if text.is_empty() => {
                return Err(WizardError::MissingInput {
                    name: field.name.clone(),
                });
            }
            Control::Text(text) => {
                out.insert(field.name.clone(), Value::String(text.clone()));
            }
            Control::Checkbox(_) | Control::Button => {}
        }
    }
    Ok(out)
}

/// Sends `saveWizard`, or alerts the user when an input is missing.
pub fn save_wizard(
    ctrl: &mut Controller,
    host: &mut dyn PanelHost,
    fields: &[FormField],
) -> Result<Option<RequestId>, PanelError> {
    match collect_wizard(fields) {
        Ok(values) => {
            let id = ctrl.send(&Command::new(commands::SAVE_WIZARD).with("wizard", values))?;
            Ok(Some(id))
        }
        Err(e) => {
            host.alert(&e.to_string());
            Ok(None)
        }
    }
}

pub fn ready_for_configuration(
    ctrl: &mut Controller,
    host: &mut dyn PanelHost,
    step: usize,
) -> Result<RequestId, PanelError> {
    let id = ctrl.send(&Command::new(commands::GET_SERVER_CONFIG))?;
    host.show_element(element_ids::LOADING, false);
    host.open_wizard(step);
    Ok(id)
}
