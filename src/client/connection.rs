use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{info, warn};
use tungstenite::protocol::Message;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::WebSocket;

use crate::error::ConnectionError;
use crate::protocol::{decode_server_message, ServerMessage};

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    pub url: String,
    pub reconnect_delay: Duration,
}

/// Reader thread feeding decoded server messages to the frame loop. Every
/// lost session is reported as `ServerMessage::Disconnected` before the next
/// attempt.
pub struct Connection {
    messages: mpsc::Receiver<ServerMessage>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl Connection {
    pub fn spawn(config: ConnectionConfig) -> Self {
        let (tx, messages) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let reader_stop = stop.clone();
        let reader = thread::spawn(move || reconnect_loop(&config, &tx, &reader_stop));
        Self {
            messages,
            stop,
            reader: Some(reader),
        }
    }

    /// Everything received since the last call, in arrival order.
    pub fn drain(&self) -> Vec<ServerMessage> {
        self.messages.try_iter().collect()
    }

    /// Stops reconnecting. A session already blocked in `read` ends when the
    /// server closes it.
    pub fn shutdown(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(reader) = self.reader.take() {
            if reader.is_finished() {
                let _ = reader.join();
            }
        }
    }
}

fn reconnect_loop(config: &ConnectionConfig, tx: &mpsc::Sender<ServerMessage>, stop: &AtomicBool) {
    while !stop.load(Ordering::Relaxed) {
        match run_session(&config.url, tx, stop) {
            Ok(()) => return,
            Err(error) => warn!(url = %config.url, %error, "connection lost"),
        }
        if tx.send(ServerMessage::Disconnected {}).is_err() {
            return;
        }
        thread::sleep(config.reconnect_delay);
    }
}

/// Returns `Ok` only when the consumer is gone or a stop was requested.
fn run_session(
    url: &str,
    tx: &mpsc::Sender<ServerMessage>,
    stop: &AtomicBool,
) -> Result<(), ConnectionError> {
    let (mut socket, _response) = tungstenite::connect(url)?;
    info!(url, "connected");
    while !stop.load(Ordering::Relaxed) {
        let Some(message) = read_message(&mut socket)? else {
            continue;
        };
        if tx.send(message).is_err() {
            let _ = socket.close(None);
            return Ok(());
        }
    }
    let _ = socket.close(None);
    Ok(())
}

fn read_message(socket: &mut Socket) -> Result<Option<ServerMessage>, ConnectionError> {
    let raw = match socket.read()? {
        Message::Text(text) => text,
        Message::Binary(bytes) => match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(_) => {
                warn!("dropping non-utf8 binary frame");
                return Ok(None);
            }
        },
        Message::Close(_) => return Err(ConnectionError::Closed),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => return Ok(None),
    };
    match decode_server_message(&raw) {
        Ok(message) => Ok(Some(message)),
        Err(error) => {
            warn!(%error, "skipping undecodable frame");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_server_reports_disconnects() {
        let connection = Connection::spawn(ConnectionConfig {
            url: "ws://127.0.0.1:9/ws".to_string(),
            reconnect_delay: Duration::from_millis(10),
        });
        let received = connection
            .messages
            .recv_timeout(Duration::from_secs(5))
            .expect("disconnect notice");
        assert_eq!(received, ServerMessage::Disconnected {});
        connection.shutdown();
    }
}
