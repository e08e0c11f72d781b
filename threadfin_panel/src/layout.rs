use crate::html::Element;
use crate::logs::render_logs;
use crate::server_info::render_server_information;
use crate::settings::render_settings;
use crate::state::ServerState;
use crate::wizard::render_wizard_step;

/// Full page for the current state. While the server is in first-run mode
/// only the wizard container is shown, starting at `wizard_step`.
pub fn render_page(state: &ServerState, wizard_step: usize) -> Element {
    let mut body = Element::new("body");
    if state.configuration_wizard() {
        if let Some(step) = render_wizard_step(wizard_step) {
            body.push(step);
        }
    } else {
        body.push(render_server_information(state));
        if state.settings().is_some() {
            body.push(render_settings(state));
        }
        body.push(
            Element::new("div")
                .id("box-wrapper")
                .child(render_logs(state)),
        );
    }
    Element::new("html").child(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn state(v: Value) -> ServerState {
        match v {
            Value::Object(m) => ServerState::from_map(m),
            _ => unreachable!(),
        }
    }

    #[test]
    fn wizard_mode_shows_only_the_step() {
        let page = render_page(&state(json!({ "configurationWizard": true })), 2);
        assert!(page.find_by_id("m3u").is_some());
        assert!(page.find_by_id("content_settings").is_none());
        assert!(page.find_by_id("server_information").is_none());
    }

    #[test]
    fn regular_mode_shows_all_views() {
        let page = render_page(
            &state(json!({ "settings": { "tuner": 1 }, "log": { "log": ["a"] } })),
            0,
        );
        assert!(page.find_by_id("content_settings").is_some());
        assert!(page.find_by_id("content_log").is_some());
        assert!(page.find_by_id("server_information").is_some());
    }
}
