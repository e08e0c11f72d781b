use futures_util::{SinkExt, StreamExt};
use serde_json::{Map, Value};
use threadfin_protocol::CMD_KEY;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use url::Url;

pub type RequestId = u64;

/// Command name plus its payload fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: String,
    pub payload: Map<String, Value>,
}

impl Command {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            payload: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }

    /// JSON text sent on the socket: the payload with `cmd` set to the name.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        encode_envelope(&self.name, &self.payload)
    }
}

pub fn encode_envelope(cmd: &str, payload: &Map<String, Value>) -> Result<String, serde_json::Error> {
    serde_json::to_string(&envelope(cmd, payload.clone()))
}

/// The payload's own `cmd` field, if any, is overwritten.
pub fn envelope(cmd: &str, mut payload: Map<String, Value>) -> Map<String, Value> {
    payload.insert(CMD_KEY.to_string(), Value::String(cmd.to_string()));
    payload
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Opened {
        request_id: RequestId,
    },
    Failed {
        request_id: RequestId,
        cmd: String,
        error: String,
    },
    Reply {
        request_id: RequestId,
        cmd: String,
        text: String,
    },
}

impl TransportEvent {
    pub fn request_id(&self) -> RequestId {
        match self {
            TransportEvent::Opened { request_id }
            | TransportEvent::Failed { request_id, .. }
            | TransportEvent::Reply { request_id, .. } => *request_id,
        }
    }
}

/// Opens one connection for one request on the current runtime.
///
/// The socket is not closed after the reply; it is dropped with the task.
pub fn spawn_exchange(
    events: mpsc::UnboundedSender<TransportEvent>,
    request_id: RequestId,
    url: Url,
    cmd: String,
    text: String,
) {
    tokio::spawn(exchange(events, request_id, url, cmd, text));
}

async fn exchange(
    events: mpsc::UnboundedSender<TransportEvent>,
    request_id: RequestId,
    url: Url,
    cmd: String,
    text: String,
) {
    let fail = |error: String| TransportEvent::Failed {
        request_id,
        cmd: cmd.clone(),
        error,
    };

    let mut socket = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((socket, _)) => socket,
        Err(e) => {
            let _ = events.send(fail(e.to_string()));
            return;
        }
    };
    let _ = events.send(TransportEvent::Opened { request_id });

    if let Err(e) = socket.send(Message::Text(text.into())).await {
        let _ = events.send(fail(e.to_string()));
        return;
    }

    while let Some(incoming) = socket.next().await {
        match incoming {
            Ok(Message::Text(reply)) => {
                let _ = events.send(TransportEvent::Reply {
                    request_id,
                    cmd: cmd.clone(),
                    text: reply.as_str().to_owned(),
                });
                return;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                let _ = events.send(fail(e.to_string()));
                return;
            }
        }
    }
    debug!(request_id, %cmd, "connection closed without a reply");
}

/// Sends the envelope for `command` on a fresh connection.
pub fn dispatch(
    events: &mpsc::UnboundedSender<TransportEvent>,
    request_id: RequestId,
    url: Url,
    command: &Command,
) {
    match command.encode() {
        Ok(text) => {
            debug!(request_id, cmd = %command.name, %url, "sending request");
            spawn_exchange(events.clone(), request_id, url, command.name.clone(), text);
        }
        Err(e) => {
            warn!(cmd = %command.name, "request encoding failed: {e}");
            let _ = events.send(TransportEvent::Failed {
                request_id,
                cmd: command.name.clone(),
                error: e.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_adds_cmd_and_keeps_payload() {
        let cmd = Command::new("saveSettings").with("settings", json!({ "tuner": 2 }));
        let decoded: Value = serde_json::from_str(&cmd.encode().unwrap()).unwrap();
        assert_eq!(
            decoded,
            json!({ "cmd": "saveSettings", "settings": { "tuner": 2 } })
        );
    }

    #[test]
    fn payload_cmd_field_is_overwritten() {
        let cmd = Command::new("updateLog").with("cmd", "spoofed");
        let decoded: Value = serde_json::from_str(&cmd.encode().unwrap()).unwrap();
        assert_eq!(decoded, json!({ "cmd": "updateLog" }));
    }
}
