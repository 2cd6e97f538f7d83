//! Live update channel: a WebSocket connection that reports new captures,
//! kept alive by a fixed-delay reconnect loop on its own thread.

use serde::Deserialize;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use crate::error::MalformedMessage;
use crate::ImageRef;

const NEW_IMAGE: &str = "new_image";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

impl ConnectionState {
    pub fn label(self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "live",
            ConnectionState::Closed => "offline",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeEvent {
    State(ConnectionState),
    NewImage(ImageRef),
}

#[derive(Debug, Deserialize)]
struct Notification {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    url: Option<String>,
}

/// Decode one text frame. `Ok(None)` for well-formed messages of other types.
pub fn decode_notification(text: &str) -> Result<Option<ImageRef>, MalformedMessage> {
    let n: Notification = serde_json::from_str(text)?;
    if n.kind != NEW_IMAGE {
        return Ok(None);
    }
    match n.url {
        Some(url) if !url.is_empty() => Ok(Some(url)),
        _ => Err(MalformedMessage::MissingUrl),
    }
}

#[derive(Debug, Clone)]
pub struct RealtimeListener {
    url: String,
    reconnect_delay: Duration,
    read_poll: Duration,
}

impl RealtimeListener {
    pub fn new(url: impl Into<String>, reconnect_delay: Duration) -> Self {
        Self {
            url: url.into(),
            reconnect_delay,
            read_poll: Duration::from_millis(250),
        }
    }

    /// How long a blocked read waits before the stop flag is checked again.
    pub fn with_read_poll(mut self, poll: Duration) -> Self {
        self.read_poll = poll;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Start the connect/read/reconnect loop. The thread exits when stopped
    /// or when the receiving end of `tx` is gone.
    pub fn spawn<T>(self, tx: Sender<T>) -> RealtimeHandle
    where
        T: From<RealtimeEvent> + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop2 = stop.clone();
        let join = thread::spawn(move || self.run(tx, stop2));
        RealtimeHandle {
            stop,
            join: Some(join),
        }
    }

    fn run<T: From<RealtimeEvent>>(self, tx: Sender<T>, stop: Arc<AtomicBool>) {
        let emit = |ev: RealtimeEvent| tx.send(T::from(ev)).is_ok();
        while !stop.load(Ordering::SeqCst) {
            if !emit(RealtimeEvent::State(ConnectionState::Connecting)) {
                return;
            }
            match tungstenite::connect(self.url.as_str()) {
                Ok((mut socket, _resp)) => {
                    set_read_timeout(socket.get_mut(), self.read_poll);
                    info!(url = %self.url, "realtime channel open");
                    if !emit(RealtimeEvent::State(ConnectionState::Open)) {
                        return;
                    }
                    if !self.read_until_closed(&mut socket, &emit, &stop) {
                        return;
                    }
                }
                Err(e) => warn!(url = %self.url, error = %e, "realtime connect failed"),
            }
            if !emit(RealtimeEvent::State(ConnectionState::Closed)) {
                return;
            }
            sleep_unless_stopped(self.reconnect_delay, &stop);
        }
    }

    /// Returns false when the event receiver is gone.
    fn read_until_closed(
        &self,
        socket: &mut WebSocket<MaybeTlsStream<TcpStream>>,
        emit: &dyn Fn(RealtimeEvent) -> bool,
        stop: &AtomicBool,
    ) -> bool {
        loop {
            if stop.load(Ordering::SeqCst) {
                let _ = socket.close(None);
                return true;
            }
            match socket.read() {
                Ok(Message::Text(text)) => match decode_notification(&text) {
                    Ok(Some(image)) => {
                        debug!(%image, "realtime insert");
                        if !emit(RealtimeEvent::NewImage(image)) {
                            return false;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => debug!(error = %e, "discarding malformed realtime message"),
                },
                Ok(Message::Close(_)) => {
                    // The reply is queued by tungstenite; send it and stop
                    // reading even if the peer keeps the TCP stream open.
                    let _ = socket.flush();
                    info!(url = %self.url, "realtime channel closed by server");
                    return true;
                }
                Ok(_) => {}
                Err(tungstenite::Error::Io(ref e))
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) => {}
                Err(e) => {
                    info!(error = %e, "realtime channel closed");
                    return true;
                }
            }
        }
    }
}

/// Bound blocking reads so the stop flag gets polled.
fn set_read_timeout(stream: &mut MaybeTlsStream<TcpStream>, poll: Duration) {
    let tcp = match stream {
        MaybeTlsStream::Plain(s) => s,
        MaybeTlsStream::Rustls(s) => &mut s.sock,
        _ => return,
    };
    let _ = tcp.set_read_timeout(Some(poll));
}

fn sleep_unless_stopped(total: Duration, stop: &AtomicBool) {
    let until = Instant::now() + total;
    while !stop.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= until {
            break;
        }
        thread::sleep((until - now).min(Duration::from_millis(50)));
    }
}

/// Owns the listener thread. Dropping the handle asks the thread to stop
/// without waiting for it.
pub struct RealtimeHandle {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl RealtimeHandle {
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

impl Drop for RealtimeHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// One-shot connectivity check of the update channel.
pub fn probe(url: &str) -> Result<(), tungstenite::Error> {
    let (mut socket, _resp) = tungstenite::connect(url)?;
    let _ = socket.close(None);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_new_image() {
        let got = decode_notification(r#"{"type":"new_image","url":"/static/a.jpg"}"#).unwrap();
        assert_eq!(got.as_deref(), Some("/static/a.jpg"));
    }

    #[test]
    fn other_types_are_ignored() {
        assert_eq!(decode_notification(r#"{"type":"heartbeat"}"#).unwrap(), None);
    }

    #[test]
    fn malformed_messages_are_errors() {
        assert!(decode_notification("not json").is_err());
        assert!(decode_notification(r#"{"url":"/a.jpg"}"#).is_err());
        assert!(matches!(
            decode_notification(r#"{"type":"new_image"}"#),
            Err(MalformedMessage::MissingUrl)
        ));
        assert!(decode_notification(r#"{"type":"new_image","url":""}"#).is_err());
    }
}
