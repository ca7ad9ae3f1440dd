//! Socket connection to the backend
//!
//! ```text
//!   session thread                     ipc-reader thread
//!   ──────────────                     ─────────────────
//!   invoke() ──Invoke{id}──► socket ──► Reply{id}  ──► pending[id].send()
//!                                       Notify{..} ──► notifications queue
//! ```
//!
//! The reader thread never touches component state: replies complete oneshot
//! channels, notifications are queued for the session loop.

use crossbeam::channel::{Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use tokio::sync::oneshot;

use super::framing::{read_frame, write_message};
use crate::commands::{Backend, BackendCommand, Reply};
use crate::error::SyncResult;

/// Frames sent to the backend
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    Invoke {
        request_id: u64,
        command: BackendCommand,
    },
}

/// Frames received from the backend
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    Reply { request_id: u64, result: Reply },
    Notify { channel: String, payload: Value },
}

/// A notification as it came off the wire, not yet decoded
#[derive(Debug, Clone, PartialEq)]
pub struct InboundNotification {
    pub channel: String,
    pub payload: Value,
}

type PendingReplies = Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>;

/// Live connection to a backend
pub struct IpcConnection {
    writer: Mutex<Box<dyn Write + Send>>,
    pending: PendingReplies,
    next_request_id: AtomicU64,
    connected: Arc<AtomicBool>,
    notifications: Receiver<InboundNotification>,
    socket: Option<TcpStream>,
}

impl IpcConnection {
    /// Connect over TCP
    pub fn connect(address: &str, queue_capacity: usize) -> SyncResult<Self> {
        let stream = TcpStream::connect(address)?;
        stream.set_nodelay(true)?;
        log::info!("Connected to backend at {}", address);

        let reader = stream.try_clone()?;
        let writer = stream.try_clone()?;
        let mut connection = Self::from_parts(reader, writer, queue_capacity)?;
        connection.socket = Some(stream);
        Ok(connection)
    }

    /// Build a connection over any byte stream pair
    ///
    /// `queue_capacity` bounds the inbound notification queue; zero means
    /// unbounded. A full bounded queue drops notifications instead of
    /// stalling replies behind them.
    pub fn from_parts<R, W>(reader: R, writer: W, queue_capacity: usize) -> SyncResult<Self>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let (notify_tx, notify_rx) = if queue_capacity == 0 {
            crossbeam::channel::unbounded()
        } else {
            crossbeam::channel::bounded(queue_capacity)
        };
        let pending: PendingReplies = Arc::new(Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));

        let thread_pending = pending.clone();
        let thread_connected = connected.clone();
        thread::Builder::new()
            .name("ipc-reader".into())
            .spawn(move || read_loop(reader, thread_pending, notify_tx, thread_connected))?;

        Ok(Self {
            writer: Mutex::new(Box::new(writer)),
            pending,
            next_request_id: AtomicU64::new(1),
            connected,
            notifications: notify_rx,
            socket: None,
        })
    }

    /// Receiver of inbound notifications
    ///
    /// Disconnects once the backend closes the stream.
    pub fn notifications(&self) -> Receiver<InboundNotification> {
        self.notifications.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Shut the socket down, unblocking the reader thread
    pub fn close(&self) {
        if let Some(socket) = &self.socket {
            let _ = socket.shutdown(Shutdown::Both);
        }
    }

    fn forget(&self, request_id: u64) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&request_id);
        }
    }
}

impl Backend for IpcConnection {
    fn invoke(&self, command: BackendCommand) -> oneshot::Receiver<Reply> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if !self.is_connected() {
            return reply_rx;
        }

        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(request_id, reply_tx);
        }
        // Reader may have drained the map between the check above and the insert
        if !self.is_connected() {
            self.forget(request_id);
            return reply_rx;
        }

        let name = command.name();
        let frame = ClientFrame::Invoke {
            request_id,
            command,
        };
        let written = match self.writer.lock() {
            Ok(mut writer) => write_message(&mut *writer, &frame),
            Err(_) => Err(io::Error::new(io::ErrorKind::Other, "writer lock poisoned")),
        };
        if let Err(e) = written {
            log::error!("Failed to send {}: {}", name, e);
            self.forget(request_id);
        }
        reply_rx
    }
}

impl Drop for IpcConnection {
    fn drop(&mut self) {
        self.close();
    }
}

fn read_loop<R: Read>(
    mut reader: R,
    pending: PendingReplies,
    notify_tx: Sender<InboundNotification>,
    connected: Arc<AtomicBool>,
) {
    log::debug!("ipc reader started");

    loop {
        let bytes = match read_frame(&mut reader) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                log::info!("Backend closed the connection");
                break;
            }
            Err(e) => {
                log::error!("Connection to backend lost: {}", e);
                break;
            }
        };

        // The length prefix keeps the stream in sync even if the body is garbage
        let frame = match serde_json::from_slice::<ServerFrame>(&bytes) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("Skipping undecodable frame ({} bytes): {}", bytes.len(), e);
                continue;
            }
        };

        match frame {
            ServerFrame::Reply { request_id, result } => {
                let reply_tx = pending
                    .lock()
                    .ok()
                    .and_then(|mut pending| pending.remove(&request_id));
                match reply_tx {
                    Some(reply_tx) => {
                        let _ = reply_tx.send(result);
                    }
                    None => log::warn!("Reply for unknown request {}", request_id),
                }
            }
            ServerFrame::Notify { channel, payload } => {
                match notify_tx.try_send(InboundNotification { channel, payload }) {
                    Ok(()) => {}
                    Err(TrySendError::Full(dropped)) => {
                        log::warn!("Notification queue full, dropping {}", dropped.channel);
                    }
                    Err(TrySendError::Disconnected(_)) => {
                        log::debug!("Notification receiver dropped");
                        break;
                    }
                }
            }
        }
    }

    connected.store(false, Ordering::Release);
    // Dropping the senders resolves every outstanding reply as disconnected
    if let Ok(mut pending) = pending.lock() {
        pending.clear();
    }
    log::debug!("ipc reader stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandClient;
    use crate::error::SyncError;
    use crate::ipc::framing::read_message;
    use serde_json::json;
    use std::io::Cursor;
    use std::net::TcpListener;
    use std::rc::Rc;
    use std::time::Duration;

    fn frames(frames: &[ServerFrame]) -> Cursor<Vec<u8>> {
        let mut buf = Vec::new();
        for frame in frames {
            write_message(&mut buf, frame).unwrap();
        }
        Cursor::new(buf)
    }

    #[test]
    fn test_notifications_are_queued_in_order() {
        let reader = frames(&[
            ServerFrame::Notify {
                channel: "AudioDeckCreated".into(),
                payload: json!({ "id": 1 }),
            },
            ServerFrame::Notify {
                channel: "TagListChanged".into(),
                payload: json!({}),
            },
        ]);
        let connection = IpcConnection::from_parts(reader, Vec::new(), 0).unwrap();
        let rx = connection.notifications();

        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(first.channel, "AudioDeckCreated");
        assert_eq!(second.channel, "TagListChanged");

        // End of stream disconnects the queue
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_err());
        assert!(!connection.is_connected());
    }

    #[test]
    fn test_undecodable_frame_is_skipped() {
        let mut buf = Vec::new();
        write_message(
            &mut buf,
            &ServerFrame::Notify {
                channel: "AudioDeckCreated".into(),
                payload: json!({ "id": 1 }),
            },
        )
        .unwrap();
        write_message(&mut buf, &json!({ "type": "Bogus" })).unwrap();
        write_message(&mut buf, &json!({ "channel": "no type tag" })).unwrap();
        write_message(
            &mut buf,
            &ServerFrame::Notify {
                channel: "AudioDeckCreated".into(),
                payload: json!({ "id": 2 }),
            },
        )
        .unwrap();

        let connection = IpcConnection::from_parts(Cursor::new(buf), Vec::new(), 0).unwrap();
        let rx = connection.notifications();

        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(first.payload, json!({ "id": 1 }));
        assert_eq!(second.payload, json!({ "id": 2 }));
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_err());
    }

    #[test]
    fn test_full_queue_does_not_stall_reader() {
        let reader = frames(&[
            ServerFrame::Notify {
                channel: "TagListChanged".into(),
                payload: json!({}),
            },
            ServerFrame::Notify {
                channel: "EntryListChanged".into(),
                payload: json!({}),
            },
            ServerFrame::Notify {
                channel: "AudioDeckCreated".into(),
                payload: json!({ "id": 3 }),
            },
        ]);
        let connection = IpcConnection::from_parts(reader, Vec::new(), 1).unwrap();
        let rx = connection.notifications();

        // Nobody consumes while the reader runs to the end of the stream
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while connection.is_connected() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!connection.is_connected());

        let queued: Vec<String> = rx.try_iter().map(|n| n.channel).collect();
        assert_eq!(queued, vec!["TagListChanged".to_string()]);
    }

    #[test]
    fn test_invoke_after_disconnect_fails_fast() {
        let connection = IpcConnection::from_parts(Cursor::new(Vec::new()), Vec::new(), 0).unwrap();
        let rx = connection.notifications();
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_err());

        let client = CommandClient::new(Rc::new(connection));
        assert!(matches!(
            client.get_audio_decks().wait(),
            Err(SyncError::Disconnected("get_audio_decks"))
        ));
    }

    #[test]
    fn test_tcp_request_reply_and_notify() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();

            let request: Value = read_message(&mut stream).unwrap();
            assert_eq!(request["type"], "Invoke");
            assert_eq!(request["command"]["command"], "create_audio_deck");
            let request_id = request["request_id"].as_u64().unwrap();

            write_message(
                &mut stream,
                &ServerFrame::Notify {
                    channel: "AudioDeckCreated".into(),
                    payload: json!({ "id": 7 }),
                },
            )
            .unwrap();
            write_message(
                &mut stream,
                &ServerFrame::Reply {
                    request_id,
                    result: Ok(json!(7)),
                },
            )
            .unwrap();

            // Swallow the next request and hang up without answering
            let _: Value = read_message(&mut stream).unwrap();
        });

        let connection = IpcConnection::connect(&address, 16).unwrap();
        let notifications = connection.notifications();
        let client = CommandClient::new(Rc::new(connection));

        assert_eq!(client.create_audio_deck().wait().unwrap(), 7);
        let inbound = notifications.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(inbound.channel, "AudioDeckCreated");
        assert_eq!(inbound.payload, json!({ "id": 7 }));

        let unanswered = client.get_audio_decks();
        server.join().unwrap();
        assert!(matches!(
            unanswered.wait(),
            Err(SyncError::Disconnected(_))
        ));
    }
}
