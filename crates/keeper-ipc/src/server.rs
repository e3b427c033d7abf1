//! Socket server
//!
//! One connection carries newline-delimited JSON both ways: requests in,
//! responses and (once subscribed) events out. Each connection gets a reader
//! task that forwards parsed requests to the daemon and a writer task that
//! interleaves responses with broadcast events.

use keeper_api::{ClientInfo, Command, ErrorCode, ErrorInfo, Event, Request, Response};
use keeper_util::ClientId;
use serde::Serialize;
use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::{IpcError, IpcResult};

/// Capacity of the event fan-out. A slow subscriber skips ahead rather than
/// stalling the daemon.
const EVENT_BUFFER: usize = 256;

/// What the server hands to the daemon loop
pub enum ServerMessage {
    Request {
        client_id: ClientId,
        request: Request,
    },
    ClientConnected {
        client_id: ClientId,
        info: ClientInfo,
    },
    ClientDisconnected {
        client_id: ClientId,
    },
}

struct Peer {
    info: ClientInfo,
    outbox: mpsc::UnboundedSender<String>,
    subscribed: bool,
}

type PeerTable = Arc<RwLock<HashMap<ClientId, Peer>>>;

pub struct IpcServer {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    peers: PeerTable,
    events: broadcast::Sender<Event>,
    inbox_tx: mpsc::UnboundedSender<ServerMessage>,
    inbox_rx: Mutex<Option<mpsc::UnboundedReceiver<ServerMessage>>>,
}

impl IpcServer {
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();

        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            listener: None,
            peers: Arc::new(RwLock::new(HashMap::new())),
            events,
            inbox_tx,
            inbox_rx: Mutex::new(Some(inbox_rx)),
        }
    }

    /// Bind the socket, replacing a stale one left by a previous run
    pub async fn start(&mut self) -> IpcResult<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        std::fs::set_permissions(&self.socket_path, std::fs::Permissions::from_mode(0o660))?;
        info!(path = %self.socket_path.display(), "IPC server listening");

        self.listener = Some(listener);
        Ok(())
    }

    /// The daemon-side receiver. Available once.
    pub async fn take_message_receiver(&self) -> Option<mpsc::UnboundedReceiver<ServerMessage>> {
        self.inbox_rx.lock().await.take()
    }

    /// Accept connections until the task is dropped
    pub async fn run(&self) -> IpcResult<()> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| IpcError::ServerError("Server not started".into()))?;

        loop {
            match listener.accept().await {
                Ok((stream, _)) => self.attach(stream).await,
                Err(e) => error!(error = %e, "Failed to accept connection"),
            }
        }
    }

    async fn attach(&self, stream: UnixStream) {
        let info = ClientInfo {
            client_id: ClientId::new(),
            uid: peer_uid(&stream),
        };
        let client_id = info.client_id;
        info!(client_id = %client_id, uid = ?info.uid, "Client connected");

        let (outbox, outbox_rx) = mpsc::unbounded_channel();
        self.peers.write().await.insert(
            client_id,
            Peer {
                info: info.clone(),
                outbox,
                subscribed: false,
            },
        );
        let _ = self
            .inbox_tx
            .send(ServerMessage::ClientConnected { client_id, info });

        let (read_half, write_half) = stream.into_split();
        tokio::spawn(read_requests(
            client_id,
            read_half,
            self.peers.clone(),
            self.inbox_tx.clone(),
        ));
        tokio::spawn(write_replies(
            client_id,
            write_half,
            outbox_rx,
            self.events.subscribe(),
            self.peers.clone(),
            self.inbox_tx.clone(),
        ));
    }

    pub async fn send_response(&self, client_id: &ClientId, response: Response) -> IpcResult<()> {
        let line = encode_line(&response)?;
        if let Some(peer) = self.peers.read().await.get(client_id) {
            peer.outbox
                .send(line)
                .map_err(|_| IpcError::ConnectionClosed)?;
        }
        Ok(())
    }

    /// Queue an event for every subscribed connection
    pub fn broadcast_event(&self, event: Event) {
        let _ = self.events.send(event);
    }

    pub async fn get_client_info(&self, client_id: &ClientId) -> Option<ClientInfo> {
        self.peers.read().await.get(client_id).map(|p| p.info.clone())
    }

    /// Remove the socket file
    pub fn shutdown(&self) {
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// `Some(flag)` for commands that toggle the event subscription
fn subscription_change(command: &Command) -> Option<bool> {
    match command {
        Command::SubscribeEvents => Some(true),
        Command::UnsubscribeEvents => Some(false),
        _ => None,
    }
}

fn encode_line<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    Ok(line)
}

async fn read_requests(
    client_id: ClientId,
    read_half: OwnedReadHalf,
    peers: PeerTable,
    inbox: mpsc::UnboundedSender<ServerMessage>,
) {
    let mut reader = BufReader::new(read_half);
    let mut buf = String::new();

    loop {
        buf.clear();
        match reader.read_line(&mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(client_id = %client_id, error = %e, "Read error");
                break;
            }
        }
        let line = buf.trim();
        if line.is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<Request>(line) {
            Ok(request) => request,
            Err(e) => {
                warn!(client_id = %client_id, error = %e, "Invalid request");
                // No request id to echo back
                let reply = Response::error(0, ErrorInfo::new(ErrorCode::InvalidRequest, e.to_string()));
                if let Ok(reply) = encode_line(&reply)
                    && let Some(peer) = peers.read().await.get(&client_id)
                {
                    let _ = peer.outbox.send(reply);
                }
                continue;
            }
        };

        if let Some(subscribed) = subscription_change(&request.command)
            && let Some(peer) = peers.write().await.get_mut(&client_id)
        {
            peer.subscribed = subscribed;
        }
        let _ = inbox.send(ServerMessage::Request { client_id, request });
    }

    debug!(client_id = %client_id, "Client hung up");
    // Dropping the only outbox sender ends the writer
    peers.write().await.remove(&client_id);
}

async fn write_replies(
    client_id: ClientId,
    mut writer: OwnedWriteHalf,
    mut outbox: mpsc::UnboundedReceiver<String>,
    mut events: broadcast::Receiver<Event>,
    peers: PeerTable,
    inbox: mpsc::UnboundedSender<ServerMessage>,
) {
    loop {
        let line = tokio::select! {
            reply = outbox.recv() => match reply {
                Some(line) => line,
                None => break,
            },
            event = events.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(client_id = %client_id, skipped, "Subscriber lagging");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let subscribed = peers
                    .read()
                    .await
                    .get(&client_id)
                    .is_some_and(|p| p.subscribed);
                if !subscribed {
                    continue;
                }
                match encode_line(&event) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(error = %e, "Failed to encode event");
                        continue;
                    }
                }
            }
        };

        if let Err(e) = writer.write_all(line.as_bytes()).await {
            debug!(client_id = %client_id, error = %e, "Write error");
            break;
        }
    }

    let _ = inbox.send(ServerMessage::ClientDisconnected { client_id });
    peers.write().await.remove(&client_id);
}

fn peer_uid(stream: &UnixStream) -> Option<u32> {
    use std::os::unix::io::AsFd;

    nix::sys::socket::getsockopt(&stream.as_fd(), nix::sys::socket::sockopt::PeerCredentials)
        .ok()
        .map(|cred| cred.uid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IpcClient;
    use keeper_api::{EventPayload, ResponsePayload, ResponseResult};
    use tempfile::tempdir;

    async fn running_server(socket_path: &Path) -> (Arc<IpcServer>, mpsc::UnboundedReceiver<ServerMessage>) {
        let mut server = IpcServer::new(socket_path);
        server.start().await.unwrap();
        let rx = server.take_message_receiver().await.unwrap();
        let server = Arc::new(server);
        let accept = server.clone();
        tokio::spawn(async move {
            let _ = accept.run().await;
        });
        (server, rx)
    }

    /// Answer every request with `reply(client_id)`
    fn respond_with(
        server: Arc<IpcServer>,
        mut rx: mpsc::UnboundedReceiver<ServerMessage>,
        reply: fn(ClientId) -> ResponsePayload,
    ) {
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let ServerMessage::Request { client_id, request } = msg {
                    let response = Response::success(request.request_id, reply(client_id));
                    let _ = server.send_response(&client_id, response).await;
                }
            }
        });
    }

    #[tokio::test]
    async fn start_creates_socket() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");

        let mut server = IpcServer::new(&socket_path);
        server.start().await.unwrap();
        assert!(socket_path.exists());

        server.shutdown();
        assert!(!socket_path.exists());
    }

    #[tokio::test]
    async fn request_response_round_trip() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("keeperd.sock");
        let (server, rx) = running_server(&socket_path).await;
        respond_with(server, rx, |_| ResponsePayload::Pong);

        let mut client = IpcClient::connect(&socket_path).await.unwrap();
        let response = client.send(Command::Ping).await.unwrap();
        assert_eq!(response.request_id, 1);
        assert!(matches!(
            response.result,
            ResponseResult::Ok(ResponsePayload::Pong)
        ));
    }

    #[tokio::test]
    async fn garbage_line_gets_invalid_request() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("keeperd.sock");
        let (_server, _rx) = running_server(&socket_path).await;

        let stream = UnixStream::connect(&socket_path).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        write_half.write_all(b"{not json\n").await.unwrap();

        let mut line = String::new();
        BufReader::new(read_half).read_line(&mut line).await.unwrap();
        let response: Response = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(response.request_id, 0);
        match response.result {
            ResponseResult::Err(e) => assert_eq!(e.code, ErrorCode::InvalidRequest),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn subscribers_receive_events() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("keeperd.sock");
        let (server, rx) = running_server(&socket_path).await;
        respond_with(server.clone(), rx, |client_id| ResponsePayload::Subscribed { client_id });

        let client = IpcClient::connect(&socket_path).await.unwrap();
        let mut events = client.subscribe().await.unwrap();

        server.broadcast_event(Event::new(EventPayload::MonitoringChanged { active: true }));
        let event = events.next().await.unwrap();
        assert!(matches!(
            event.payload,
            EventPayload::MonitoringChanged { active: true }
        ));
    }
}
