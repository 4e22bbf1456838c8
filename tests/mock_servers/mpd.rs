#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]
//! Mock MPD server for testing
//!
//! Speaks the line protocol on a random local port. It enforces the idle
//! rule of the real server: anything other than `noidle` while a client is
//! idling is recorded as a violation and the client is dropped.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

/// Mock MPD state
#[derive(Debug, Clone)]
pub struct MockMpdState {
    pub version: String,
    pub commands: Vec<String>,
    pub tag_types: Vec<String>,
    pub password: Option<String>,
    /// Response body (without the terminal `OK`) per exact command line
    pub responses: HashMap<String, String>,
    /// Full `ACK ...` line per exact command line
    pub acks: HashMap<String, String>,
    /// Commands that never get an answer
    pub silent: HashSet<String>,
    /// Every line received, across connections
    pub received: Vec<String>,
    /// Lines received while the sender was idling
    pub violations: Vec<String>,
    pub connections: usize,
    /// Gap between pushed `changed:` lines and their `OK` while idling
    pub changed_ok_delay: Option<Duration>,
}

impl Default for MockMpdState {
    fn default() -> Self {
        let commands = [
            "add", "clear", "close", "commands", "currentsong", "delete", "find", "idle", "list",
            "listplaylists", "lsinfo", "noidle", "outputs", "password", "pause", "play",
            "playlistinfo", "search", "searchadd", "seek", "setvol", "stats", "status",
            "tagtypes",
        ];
        let tag_types = [
            "Artist",
            "Album",
            "AlbumArtist",
            "Title",
            "Track",
            "Date",
            "Disc",
            "MUSICBRAINZ_ARTISTID",
            "MUSICBRAINZ_ALBUMID",
        ];
        Self {
            version: "0.23.5".to_string(),
            commands: commands.iter().map(|s| s.to_string()).collect(),
            tag_types: tag_types.iter().map(|s| s.to_string()).collect(),
            password: None,
            responses: HashMap::new(),
            acks: HashMap::new(),
            silent: HashSet::new(),
            received: Vec::new(),
            violations: Vec::new(),
            connections: 0,
            changed_ok_delay: None,
        }
    }
}

#[derive(Debug, Clone)]
enum Push {
    Changed(String),
    Close,
}

/// Mock MPD server
pub struct MockMpdServer {
    addr: SocketAddr,
    state: Arc<RwLock<MockMpdState>>,
    push: broadcast::Sender<Push>,
    handle: JoinHandle<()>,
}

impl MockMpdServer {
    /// Start a mock MPD server on a random port
    pub async fn start() -> Self {
        Self::start_with(MockMpdState::default()).await
    }

    pub async fn start_with(initial: MockMpdState) -> Self {
        let state = Arc::new(RwLock::new(initial));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (push, _) = broadcast::channel(16);

        let state_clone = state.clone();
        let push_clone = push.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = state_clone.clone();
                let push = push_clone.subscribe();
                tokio::spawn(async move {
                    handle_connection(stream, state, push).await;
                });
            }
        });

        Self {
            addr,
            state,
            push,
            handle,
        }
    }

    /// Get the server address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn set_version(&self, version: &str) {
        self.state.write().await.version = version.to_string();
    }

    pub async fn set_password(&self, password: &str) {
        self.state.write().await.password = Some(password.to_string());
    }

    pub async fn set_response(&self, command: &str, body: &str) {
        self.state
            .write()
            .await
            .responses
            .insert(command.to_string(), body.to_string());
    }

    pub async fn set_ack(&self, command: &str, ack: &str) {
        self.state
            .write()
            .await
            .acks
            .insert(command.to_string(), ack.to_string());
    }

    /// Hold back the `OK` after pushed `changed:` lines
    pub async fn set_changed_ok_delay(&self, delay: Duration) {
        self.state.write().await.changed_ok_delay = Some(delay);
    }

    pub async fn set_silent(&self, command: &str) {
        self.state.write().await.silent.insert(command.to_string());
    }

    /// Report a changed subsystem to every connected client
    pub fn push_changed(&self, subsystem: &str) {
        let _ = self.push.send(Push::Changed(subsystem.to_string()));
    }

    /// Drop every client connection
    pub fn close_clients(&self) {
        let _ = self.push.send(Push::Close);
    }

    pub async fn received(&self) -> Vec<String> {
        self.state.read().await.received.clone()
    }

    /// Received lines without the idle traffic
    pub async fn received_commands(&self) -> Vec<String> {
        self.received()
            .await
            .into_iter()
            .filter(|l| l != "idle" && l != "noidle")
            .collect()
    }

    pub async fn clear_received(&self) {
        self.state.write().await.received.clear();
    }

    pub async fn violations(&self) -> Vec<String> {
        self.state.read().await.violations.clone()
    }

    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections
    }

    /// Stop the mock server
    pub async fn stop(self) {
        self.handle.abort();
        self.close_clients();
    }
}

async fn send(writer: &mut OwnedWriteHalf, text: &str) -> bool {
    writer.write_all(text.as_bytes()).await.is_ok()
}

fn changed_block(subsystems: &mut Vec<String>) -> String {
    let mut out: String = subsystems
        .drain(..)
        .map(|s| format!("changed: {}\n", s))
        .collect();
    out.push_str("OK\n");
    out
}

/// Handle a single TCP connection
async fn handle_connection(
    stream: TcpStream,
    state: Arc<RwLock<MockMpdState>>,
    mut push: broadcast::Receiver<Push>,
) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let greeting = {
        let mut st = state.write().await;
        st.connections += 1;
        format!("OK MPD {}\n", st.version)
    };
    if !send(&mut writer, &greeting).await {
        return;
    }

    let mut idling = false;
    let mut pending: Vec<String> = Vec::new();
    let mut batch: Option<Vec<String>> = None;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Ok(Some(line)) = line else {
                    return;
                };
                let command = line.trim_end().to_string();
                state.write().await.received.push(command.clone());

                if idling {
                    if command == "noidle" {
                        idling = false;
                        if !send(&mut writer, &changed_block(&mut pending)).await {
                            return;
                        }
                        continue;
                    }
                    state.write().await.violations.push(command);
                    return;
                }

                if let Some(commands) = batch.as_mut() {
                    if command == "command_list_end" {
                        let commands = batch.take().unwrap_or_default();
                        let reply = process_list(&commands, &state).await;
                        if !send(&mut writer, &reply).await {
                            return;
                        }
                    } else {
                        commands.push(command);
                    }
                    continue;
                }

                match command.as_str() {
                    "idle" => {
                        if pending.is_empty() {
                            idling = true;
                        } else if !send(&mut writer, &changed_block(&mut pending)).await {
                            return;
                        }
                    }
                    // Outside idle the real server ignores noidle
                    "noidle" => {}
                    "close" => return,
                    "command_list_begin" => batch = Some(Vec::new()),
                    _ => {
                        if let Some(reply) = process_command(&command, &state).await {
                            if !send(&mut writer, &reply).await {
                                return;
                            }
                        }
                    }
                }
            }
            event = push.recv() => {
                match event {
                    Ok(Push::Changed(subsystem)) => {
                        pending.push(subsystem);
                        if idling {
                            idling = false;
                            let delay = state.read().await.changed_ok_delay;
                            let sent = match delay {
                                Some(delay) => {
                                    let mut block = changed_block(&mut pending);
                                    block.truncate(block.len() - "OK\n".len());
                                    let first = send(&mut writer, &block).await;
                                    tokio::time::sleep(delay).await;
                                    first && send(&mut writer, "OK\n").await
                                }
                                None => send(&mut writer, &changed_block(&mut pending)).await,
                            };
                            if !sent {
                                return;
                            }
                        }
                    }
                    Ok(Push::Close) | Err(broadcast::error::RecvError::Closed) => return,
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                }
            }
        }
    }
}

/// Process one command; `None` means the server stays silent
async fn process_command(command: &str, state: &Arc<RwLock<MockMpdState>>) -> Option<String> {
    let state = state.read().await;

    if state.silent.contains(command) {
        return None;
    }
    if let Some(ack) = state.acks.get(command) {
        return Some(format!("{}\n", ack));
    }

    let body = match command {
        "commands" => state
            .commands
            .iter()
            .map(|c| format!("command: {}\n", c))
            .collect(),
        "tagtypes" => state
            .tag_types
            .iter()
            .map(|t| format!("tagtype: {}\n", t))
            .collect(),
        _ if command.starts_with("password ") => {
            let given = command["password ".len()..].trim_matches('"');
            if state.password.as_deref() == Some(given) {
                String::new()
            } else {
                return Some("ACK [3@0] {password} incorrect password\n".to_string());
            }
        }
        _ => state
            .responses
            .get(command)
            .map(|body| format!("{}\n", body.trim_end()))
            .unwrap_or_default(),
    };

    Some(format!("{}OK\n", body))
}

/// A command list succeeds unless one of its commands has an ACK configured
async fn process_list(commands: &[String], state: &Arc<RwLock<MockMpdState>>) -> String {
    let state = state.read().await;
    for (index, command) in commands.iter().enumerate() {
        if let Some(ack) = state.acks.get(command) {
            return format!("{}\n", ack.replacen("@0]", &format!("@{}]", index), 1));
        }
    }
    "OK\n".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn mock_mpd_sends_greeting() {
        let server = MockMpdServer::start().await;

        let mut stream = TcpStream::connect(server.addr()).await.unwrap();
        let mut greeting = vec![0u8; 64];
        let n = stream.read(&mut greeting).await.unwrap();
        assert_eq!(&greeting[..n], b"OK MPD 0.23.5\n");

        server.stop().await;
    }
}
