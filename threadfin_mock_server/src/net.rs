use crate::protocol::{ConnId, InboundMsg, OutboundMsg, TOKEN_COOKIE};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::protocol::Message;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(500);
const READ_TIMEOUT: Duration = Duration::from_millis(10);
const WRITE_TIMEOUT: Duration = Duration::from_millis(200);

struct ActiveConn {
    ws: tungstenite::WebSocket<TcpStream>,
    token: Option<String>,
    socket_addr: SocketAddr,
}

pub struct NetworkThread {
    listen_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl NetworkThread {
    pub fn spawn_with_addr(
        addr: &str,
        in_tx: Sender<InboundMsg>,
        out_rx: Receiver<OutboundMsg>,
    ) -> Result<Self, String> {
        let listener =
            TcpListener::bind(addr).map_err(|e| format!("ws bind failed on {addr}: {e}"))?;
        let listen_addr = listener
            .local_addr()
            .map_err(|e| format!("ws local addr unavailable: {e}"))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| format!("ws listener setup failed: {e}"))?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_for_thread = Arc::clone(&shutdown);

        let join_handle =
            thread::spawn(move || run_server(listener, in_tx, out_rx, shutdown_for_thread));

        Ok(Self {
            listen_addr,
            shutdown,
            join_handle: Mutex::new(Some(join_handle)),
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Ok(mut h) = self.join_handle.lock() {
            if let Some(h) = h.take() {
                let _ = h.join();
            }
        }
    }
}

impl Drop for NetworkThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_server(
    listener: TcpListener,
    in_tx: Sender<InboundMsg>,
    out_rx: Receiver<OutboundMsg>,
    shutdown: Arc<AtomicBool>,
) {
    let mut conns: HashMap<ConnId, ActiveConn> = HashMap::new();
    let mut next_id: ConnId = 1;

    while !shutdown.load(Ordering::Relaxed) {
        // Every panel request arrives on a fresh connection.
        loop {
            match listener.accept() {
                Ok((stream, socket_addr)) => match accept_conn(stream, socket_addr) {
                    Ok(conn) => {
                        debug!(conn_id = next_id, %socket_addr, "ws connection accepted");
                        conns.insert(next_id, conn);
                        next_id += 1;
                    }
                    Err(e) => warn!(%socket_addr, "ws handshake failed: {e}"),
                },
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("ws accept failed: {e}");
                    break;
                }
            }
        }

        loop {
            match out_rx.try_recv() {
                Ok(OutboundMsg::Reply { conn_id, reply }) => {
                    let Some(conn) = conns.get_mut(&conn_id) else {
                        debug!(conn_id, "reply for a connection that is gone");
                        continue;
                    };
                    if send_json(&mut conn.ws, &reply).is_err() {
                        let _ = conn.ws.close(None);
                        conns.remove(&conn_id);
                        let _ = in_tx.try_send(InboundMsg::Closed { conn_id });
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return,
            }
        }

        let mut closed = Vec::new();
        for (conn_id, conn) in conns.iter_mut() {
            match conn.ws.read() {
                Ok(msg) => {
                    if handle_inbound(&in_tx, *conn_id, conn, msg).is_err() {
                        closed.push(*conn_id);
                    }
                }
                Err(tungstenite::Error::Io(e))
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(_) => closed.push(*conn_id),
            }
        }
        for conn_id in closed {
            if let Some(conn) = conns.remove(&conn_id) {
                debug!(conn_id, socket_addr = %conn.socket_addr, "ws connection closed");
            }
            let _ = in_tx.try_send(InboundMsg::Closed { conn_id });
        }

        if conns.is_empty() {
            thread::sleep(Duration::from_millis(5));
        }
    }

    for (_, mut conn) in conns {
        let _ = conn.ws.close(None);
    }
}

fn accept_conn(stream: TcpStream, socket_addr: SocketAddr) -> Result<ActiveConn, String> {
    let _ = stream.set_nonblocking(false);
    let _ = stream.set_nodelay(true);
    let _ = stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT));
    let _ = stream.set_write_timeout(Some(WRITE_TIMEOUT));

    let mut token = None;
    let ws = tungstenite::accept_hdr(
        stream,
        |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            token = token_from_query(req.uri().query());
            Ok(resp)
        },
    )
    .map_err(|e| e.to_string())?;

    let _ = ws.get_ref().set_read_timeout(Some(READ_TIMEOUT));

    Ok(ActiveConn {
        ws,
        token,
        socket_addr,
    })
}

fn token_from_query(query: Option<&str>) -> Option<String> {
    let query = query?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == TOKEN_COOKIE)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

fn handle_inbound(
    in_tx: &Sender<InboundMsg>,
    conn_id: ConnId,
    conn: &mut ActiveConn,
    msg: Message,
) -> Result<(), ()> {
    let text = match msg {
        Message::Text(s) => s,
        Message::Binary(_) => return Ok(()),
        Message::Ping(payload) => {
            let _ = conn.ws.send(Message::Pong(payload));
            return Ok(());
        }
        Message::Pong(_) => return Ok(()),
        Message::Close(_) => return Err(()),
        Message::Frame(_) => return Ok(()),
    };

    let envelope: Map<String, Value> = match serde_json::from_str(&text) {
        Ok(m) => m,
        Err(e) => {
            warn!(conn_id, "invalid request json: {e}");
            // An unreadable request ends the connection.
            return Err(());
        }
    };

    if in_tx
        .try_send(InboundMsg::Request {
            conn_id,
            token: conn.token.clone(),
            envelope,
        })
        .is_err()
    {
        let _ = send_json(
            &mut conn.ws,
            &serde_json::json!({ "status": false, "err": "server busy" }),
        );
    }

    Ok(())
}

fn send_json(ws: &mut tungstenite::WebSocket<TcpStream>, reply: &Value) -> Result<(), ()> {
    let payload = serde_json::to_string(reply).map_err(|_| ())?;
    ws.send(Message::Text(payload)).map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::token_from_query;

    #[test]
    fn token_is_read_from_query() {
        assert_eq!(
            token_from_query(Some("Token=abc123")).as_deref(),
            Some("abc123")
        );
        assert_eq!(
            token_from_query(Some("x=1&Token=a%2Bb")).as_deref(),
            Some("a+b")
        );
        assert_eq!(token_from_query(Some("Token=")), None);
        assert_eq!(token_from_query(None), None);
    }
}
