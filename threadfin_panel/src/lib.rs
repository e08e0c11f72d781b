//! Client side of the Threadfin web control panel.
//!
//! Each command travels on its own websocket connection; the reply is
//! applied to [`state::AppState`] and pushed to a [`host::PanelHost`].

pub mod auth;
pub mod config;
pub mod controller;
pub mod error;
pub mod form;
pub mod host;
pub mod html;
pub mod layout;
pub mod location;
pub mod logs;
pub mod server_info;
pub mod settings;
pub mod state;
pub mod transport;
pub mod version_check;
pub mod wizard;

pub use crate::config::PanelConfig;
pub use crate::controller::{Controller, Outcome};
pub use crate::error::{ConfigError, PanelError};
pub use crate::host::{PanelHost, RecordingHost};
pub use crate::transport::{Command, TransportEvent};
