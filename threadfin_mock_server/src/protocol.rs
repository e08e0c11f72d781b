use serde_json::{Map, Value};

pub const INBOUND_CAP: usize = 256;
pub const OUTBOUND_CAP: usize = 256;

pub type ConnId = u64;

pub enum InboundMsg {
    Request {
        conn_id: ConnId,
        token: Option<String>,
        envelope: Map<String, Value>,
    },
    Closed {
        conn_id: ConnId,
    },
}

pub enum OutboundMsg {
    Reply { conn_id: ConnId, reply: Value },
}

pub use threadfin_protocol::{commands, ClientInfo, ServerReply, WebLog, CMD_KEY, TOKEN_COOKIE};
