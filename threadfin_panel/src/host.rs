use crate::state::ServerState;

/// Ids of page elements the reply handler touches directly.
pub mod element_ids {
    pub const LOADING: &str = "loading";
    pub const POPUP: &str = "popup";
    pub const CHANNEL_ICON: &str = "channel-icon";
    pub const UPDATE_ICON: &str = "update-icon";
    pub const LOG_VIEW: &str = "content_log";
}

/// Presentation surface driven by the reply handler.
///
/// A browser page, a terminal or a test double can sit behind this.
pub trait PanelHost {
    /// Rebuild every visible view from `state`.
    fn render_layout(&mut self, state: &ServerState);
    fn show_element(&mut self, id: &str, visible: bool);
    fn alert(&mut self, text: &str);
    /// Activate the menu entry at `menu` (the server sends the index as text).
    fn click_menu(&mut self, menu: &str);
    fn navigate(&mut self, url: &str);
    fn reload(&mut self);
    fn open_wizard(&mut self, step: usize);
    fn set_input(&mut self, id: &str, value: &str, changed: bool);
    fn set_checked(&mut self, id: &str, checked: bool, changed: bool);
    fn log_view_visible(&self) -> bool;
    fn render_logs(&mut self, state: &ServerState, scroll_down: bool);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    RenderLayout,
    ShowElement { id: String, visible: bool },
    Alert(String),
    ClickMenu(String),
    Navigate(String),
    Reload,
    OpenWizard(usize),
    SetInput { id: String, value: String, changed: bool },
    SetChecked { id: String, checked: bool, changed: bool },
    RenderLogs { scroll_down: bool },
}

/// Headless host that records every call in order.
#[derive(Debug, Default)]
pub struct RecordingHost {
    pub calls: Vec<HostCall>,
    pub log_visible: bool,
}

impl RecordingHost {
    pub fn with_log_view() -> Self {
        Self {
            calls: Vec::new(),
            log_visible: true,
        }
    }

    pub fn alerts(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                HostCall::Alert(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &HostCall) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }

    pub fn render_count(&self) -> usize {
        self.count(&HostCall::RenderLayout)
    }
}

impl PanelHost for RecordingHost {
    fn render_layout(&mut self, _state: &ServerState) {
        self.calls.push(HostCall::RenderLayout);
    }

    fn show_element(&mut self, id: &str, visible: bool) {
        self.calls.push(HostCall::ShowElement {
            id: id.to_string(),
            visible,
        });
    }

    fn alert(&mut self, text: &str) {
        self.calls.push(HostCall::Alert(text.to_string()));
    }

    fn click_menu(&mut self, menu: &str) {
        self.calls.push(HostCall::ClickMenu(menu.to_string()));
    }

    fn navigate(&mut self, url: &str) {
        self.calls.push(HostCall::Navigate(url.to_string()));
    }

    fn reload(&mut self) {
        self.calls.push(HostCall::Reload);
    }

    fn open_wizard(&mut self, step: usize) {
        self.calls.push(HostCall::OpenWizard(step));
    }

    fn set_input(&mut self, id: &str, value: &str, changed: bool) {
        self.calls.push(HostCall::SetInput {
            id: id.to_string(),
            value: value.to_string(),
            changed,
        });
    }

    fn set_checked(&mut self, id: &str, checked: bool, changed: bool) {
        self.calls.push(HostCall::SetChecked {
            id: id.to_string(),
            checked,
            changed,
        });
    }

    fn log_view_visible(&self) -> bool {
        self.log_visible
    }

    fn render_logs(&mut self, _state: &ServerState, scroll_down: bool) {
        self.calls.push(HostCall::RenderLogs { scroll_down });
    }
}
