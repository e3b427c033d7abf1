//! IPC client implementation

use keeper_api::{Command, Event, Request, Response, ResponseResult};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use crate::{IpcError, IpcResult};

/// IPC Client for connecting to keeperd
pub struct IpcClient {
    reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    writer: tokio::net::unix::OwnedWriteHalf,
    next_request_id: u64,
}

impl IpcClient {
    /// Connect to keeperd
    pub async fn connect(socket_path: impl AsRef<Path>) -> IpcResult<Self> {
        let stream = UnixStream::connect(socket_path).await?;
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            next_request_id: 1,
        })
    }

    /// Send a command and wait for its response
    pub async fn send(&mut self, command: Command) -> IpcResult<Response> {
        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let request = Request::new(request_id, command);
        let mut json = serde_json::to_string(&request)?;
        json.push('\n');

        self.writer.write_all(json.as_bytes()).await?;

        // Event lines may precede the response once subscribed
        let mut line = String::new();
        loop {
            line.clear();
            let n = self.reader.read_line(&mut line).await?;
            if n == 0 {
                return Err(IpcError::ConnectionClosed);
            }

            if let Ok(response) = serde_json::from_str::<Response>(line.trim()) {
                // Unparseable requests are answered with id 0
                if response.request_id == request_id || response.request_id == 0 {
                    return Ok(response);
                }
            }
        }
    }

    /// Subscribe to events and consume this client to return an event stream
    pub async fn subscribe(mut self) -> IpcResult<EventStream> {
        let response = self.send(Command::SubscribeEvents).await?;

        if let ResponseResult::Err(e) = response.result {
            return Err(IpcError::ServerError(e.message));
        }

        Ok(EventStream {
            reader: self.reader,
            _writer: self.writer,
        })
    }
}

/// Stream of events from keeperd
pub struct EventStream {
    reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    /// Dropping the write half would shut down our side of the socket
    _writer: tokio::net::unix::OwnedWriteHalf,
}

impl EventStream {
    /// Wait for the next event
    pub async fn next(&mut self) -> IpcResult<Event> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(IpcError::ConnectionClosed);
        }

        let event: Event = serde_json::from_str(line.trim())?;
        Ok(event)
    }
}
