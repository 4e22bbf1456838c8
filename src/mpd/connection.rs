//! MPD connection engine
//!
//! One `MpdConnection` owns one TCP socket. Every request holds the session
//! lock for its full duration, leaves idle first if needed, writes its
//! command, reads until `OK`/`ACK` and re-arms the idle timer when it lets
//! go of the lock.

use std::collections::HashSet;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch, Mutex, OwnedMutexGuard, RwLock};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::capabilities::{Capabilities, ServerVersion};
use super::commands::{self, SearchType};
use super::error::{MpdError, MpdResult};
use super::idle::{self, Handoff, IdleCoordinator, IdleState, IdleWake};
use super::objects::{Album, Artist, FileEntry, Output, Playlist, Statistics, Status, Track};
use super::responses::{self, Terminal, TrackFilter};
use crate::bus::{MpdEvent, SharedBus};

pub const DEFAULT_PORT: u16 = 6600;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);
/// Quiet period before the connection enters idle
const IDLE_DELAY: Duration = Duration::from_millis(500);

/// Where and how to connect. Changes apply on the next `connect()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub connect_timeout: Duration,
    pub response_timeout: Duration,
    pub idle_delay: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            password: None,
            connect_timeout: CONNECT_TIMEOUT,
            response_timeout: RESPONSE_TIMEOUT,
            idle_delay: IDLE_DELAY,
        }
    }
}

/// Raw response: data lines plus the terminal line
#[derive(Debug, Clone)]
pub struct Response {
    pub lines: Vec<String>,
    pub terminal: Terminal,
}

impl Response {
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// Turn an `ACK` terminal into an error
    pub fn ok(self) -> MpdResult<Self> {
        match self.terminal {
            Terminal::Ok => Ok(self),
            Terminal::Ack(ack) => {
                tracing::warn!("MPD error: {}", ack);
                Err(MpdError::Ack(ack))
            }
        }
    }
}

type Reader = BufReader<OwnedReadHalf>;

/// Socket state, only touched while holding the session lock
struct Session {
    reader: Option<Reader>,
    writer: Option<OwnedWriteHalf>,
    host: String,
    response_timeout: Duration,
    ready: bool,
    /// `Connected` was published for this socket
    announced: bool,
    caps: Capabilities,
    /// Version the capability snapshot was derived from
    caps_version: Option<ServerVersion>,
    /// Set while a listener holds the reader
    handoff: Option<Handoff<Reader>>,
    /// A command was written and its response is not fully read yet
    in_flight: bool,
    /// Bumped on every connect
    epoch: u64,
}

impl Session {
    fn new() -> Self {
        Self {
            reader: None,
            writer: None,
            host: String::new(),
            response_timeout: RESPONSE_TIMEOUT,
            ready: false,
            announced: false,
            caps: Capabilities::default(),
            caps_version: None,
            handoff: None,
            in_flight: false,
            epoch: 0,
        }
    }

    async fn write_line(&mut self, text: &str) -> MpdResult<()> {
        let writer = self.writer.as_mut().ok_or(MpdError::NotConnected)?;
        if text.starts_with("password ") {
            tracing::debug!("MPD >> password ****");
        } else {
            tracing::debug!("MPD >> {}", text);
        }
        let limit = self.response_timeout;
        let write = async {
            writer.write_all(text.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        };
        timeout(limit, write).await.map_err(|_| MpdError::Timeout)??;
        Ok(())
    }

    async fn read_response(&mut self) -> MpdResult<Response> {
        let limit = self.response_timeout;
        let reader = self.reader.as_mut().ok_or(MpdError::NotConnected)?;
        let mut lines = Vec::new();

        loop {
            let mut line = String::new();
            let read = timeout(limit, reader.read_line(&mut line))
                .await
                .map_err(|_| MpdError::Timeout)??;
            if read == 0 {
                return Err(MpdError::Closed);
            }
            let line = line.trim_end_matches(['\r', '\n']).to_string();
            if let Some(terminal) = responses::terminal(&line) {
                return Ok(Response { lines, terminal });
            }
            lines.push(line);
        }
    }
}

struct Inner {
    settings: RwLock<ConnectionSettings>,
    session: Arc<Mutex<Session>>,
    idle: IdleCoordinator,
    connected: AtomicBool,
    bus: SharedBus,
}

/// Session lock held by a request. Dropping it arms the idle timer.
struct RequestGuard {
    session: OwnedMutexGuard<Session>,
    inner: Arc<Inner>,
}

impl Deref for RequestGuard {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl DerefMut for RequestGuard {
    fn deref_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        if self.session.in_flight {
            // Request future dropped mid-response; the stream position is lost
            tracing::warn!("MPD request abandoned before its response was read, closing connection");
            self.inner.release(&mut self.session);
            return;
        }
        if self.session.ready && self.session.caps.has_idle() {
            self.inner.schedule_idle();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.idle.cancel_timer();
        self.idle.abort_listener();
    }
}

impl Inner {
    async fn lock_request(self: &Arc<Self>) -> RequestGuard {
        self.idle.cancel_timer();
        let session = self.session.clone().lock_owned().await;
        RequestGuard {
            session,
            inner: self.clone(),
        }
    }

    fn schedule_idle(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.idle.schedule(move |token| async move {
            if let Some(inner) = weak.upgrade() {
                inner.enter_idle(token).await;
            }
        });
    }

    // ===== Connection lifecycle =====

    async fn open_session(&self, session: &mut Session) -> MpdResult<()> {
        if session.ready || session.writer.is_some() {
            self.close_session(session).await;
        }

        let settings = self.settings.read().await.clone();
        if settings.host.is_empty() {
            return Err(MpdError::NotConfigured);
        }

        let addr = format!("{}:{}", settings.host, settings.port);
        let stream = timeout(settings.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| MpdError::Timeout)?
            .map_err(MpdError::Connect)?;

        let (read_half, write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let mut greeting = String::new();
        let read = timeout(settings.response_timeout, reader.read_line(&mut greeting))
            .await
            .map_err(|_| MpdError::Timeout)??;
        if read == 0 {
            return Err(MpdError::Closed);
        }
        let greeting = greeting.trim_end();
        let version = responses::greeting_version(greeting)
            .map(ServerVersion::parse)
            .ok_or_else(|| MpdError::Greeting(greeting.to_string()))?;

        session.reader = Some(reader);
        session.writer = Some(write_half);
        session.host = settings.host.clone();
        session.response_timeout = settings.response_timeout;
        session.ready = true;
        session.epoch += 1;
        self.idle.set_state(IdleState::NotIdling);

        if let Err(e) = self.handshake(session, &settings, version).await {
            self.release(session);
            return Err(e);
        }

        session.announced = true;
        self.connected.store(true, Ordering::SeqCst);
        tracing::info!("MPD connected: {}:{} v{}", settings.host, settings.port, version);
        self.bus.publish(MpdEvent::Connected {
            host: settings.host,
            port: settings.port,
            version: version.to_string(),
        });

        Ok(())
    }

    async fn handshake(
        &self,
        session: &mut Session,
        settings: &ConnectionSettings,
        version: ServerVersion,
    ) -> MpdResult<()> {
        if let Some(password) = settings.password.as_deref().filter(|p| !p.is_empty()) {
            self.execute(session, &commands::password(password))
                .await?
                .ok()?;
        }

        if session.caps_version != Some(version) {
            let command_list = self.execute(session, commands::COMMANDS).await?.ok()?;
            let tag_types = self.execute(session, commands::TAG_TYPES).await?.ok()?;
            session.caps = Capabilities::negotiate(
                version,
                &responses::decode_commands(command_list.lines()),
                &responses::decode_tag_types(tag_types.lines()),
            );
            session.caps_version = Some(version);
            tracing::debug!("MPD capabilities: {:?}", session.caps);
        }

        Ok(())
    }

    /// Orderly shutdown: leave idle, say goodbye, drop the socket
    async fn close_session(&self, session: &mut Session) {
        self.idle.cancel_timer();
        if session.ready {
            if session.handoff.is_some() {
                if let Err(e) = self.deidle(session).await {
                    tracing::debug!("Leaving idle during disconnect failed: {}", e);
                }
            }
            if session.writer.is_some() {
                if let Err(e) = session.write_line(commands::CLOSE).await {
                    tracing::debug!("Sending close failed: {}", e);
                }
            }
            tracing::info!("MPD disconnected from {}", session.host);
        }
        self.release(session);
    }

    /// Shared socket-error path
    fn fail_session(&self, session: &mut Session, error: &MpdError) {
        if session.ready {
            tracing::warn!("MPD connection lost to {}: {}", session.host, error);
        }
        self.release(session);
    }

    fn release(&self, session: &mut Session) {
        self.idle.cancel_timer();
        self.idle.abort_listener();
        session.handoff = None;
        session.reader = None;
        session.writer = None;
        session.ready = false;
        session.in_flight = false;
        self.idle.set_state(IdleState::NotIdling);
        self.connected.store(false, Ordering::SeqCst);

        if std::mem::replace(&mut session.announced, false) {
            self.bus.publish(MpdEvent::Disconnected {
                host: session.host.clone(),
            });
        }
    }

    // ===== Idle handshake =====

    /// Take the reader back from the listener. Writes `noidle` unless the
    /// server already ended the idle on its own.
    async fn deidle(&self, session: &mut Session) -> MpdResult<()> {
        let Some(handoff) = session.handoff.take() else {
            return Ok(());
        };

        if self.idle.state() == IdleState::Idling {
            self.idle.set_state(IdleState::LeavingIdle);
            session.write_line(commands::NOIDLE).await?;
        }

        let wake = match timeout(session.response_timeout, handoff).await {
            Err(_) => return Err(MpdError::Timeout),
            Ok(Err(_)) => return Err(MpdError::ListenerLost),
            Ok(Ok(result)) => result?,
        };

        session.reader = Some(wake.reader);
        self.idle.set_state(IdleState::NotIdling);
        Ok(())
    }

    async fn enter_idle(self: &Arc<Self>, token: CancellationToken) {
        let mut session = self.session.lock().await;
        if token.is_cancelled() || !session.ready || !session.caps.has_idle() {
            return;
        }

        // Collect a reader parked by a server-initiated wake-up
        if session.handoff.is_some() {
            if let Err(e) = self.deidle(&mut session).await {
                self.fail_session(&mut session, &e);
                return;
            }
        }

        let Some(reader) = session.reader.take() else {
            return;
        };

        self.idle.set_state(IdleState::EnteringIdle);
        if let Err(e) = session.write_line(commands::IDLE).await {
            session.reader = Some(reader);
            self.fail_session(&mut session, &e);
            return;
        }
        self.idle.set_state(IdleState::Idling);

        let (handoff_tx, handoff_rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        self.idle.set_listener(cancel.clone());
        session.handoff = Some(handoff_rx);

        tokio::spawn(run_listener(
            Arc::downgrade(self),
            reader,
            handoff_tx,
            cancel,
            session.epoch,
            session.response_timeout,
            session.host.clone(),
        ));

        self.bus.publish(MpdEvent::Idle {
            host: session.host.clone(),
        });
    }

    /// Tear down after a listener failed with nobody waiting on its handoff
    async fn reap_listener(&self, epoch: u64) {
        let mut session = self.session.lock().await;
        if session.epoch == epoch && session.ready && session.handoff.is_some() {
            session.handoff = None;
            self.fail_session(&mut session, &MpdError::Closed);
        }
    }

    // ===== Dispatch =====

    /// Send one command (or a command-list block) and read its response.
    /// Transport failures release the socket before returning.
    async fn execute(&self, session: &mut Session, command: &str) -> MpdResult<Response> {
        if !session.ready {
            return Err(MpdError::NotConnected);
        }

        session.in_flight = true;
        let result = async {
            self.deidle(session).await?;
            session.write_line(command).await?;
            session.read_response().await
        }
        .await;
        session.in_flight = false;

        if let Err(e) = &result {
            if e.is_transport() {
                self.fail_session(session, e);
            }
        }
        result
    }

    async fn execute_list<S: AsRef<str>>(
        &self,
        session: &mut Session,
        batch: &[S],
    ) -> MpdResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.execute(session, &commands::command_list(batch))
            .await?
            .ok()
            .map(|_| ())
    }

    /// Apply the Mopidy downgrade when a grouped `list` was not understood
    async fn check_list_compat(&self, session: &mut Session, response: &Response) {
        let Terminal::Ack(ack) = &response.terminal else {
            return;
        };
        if !ack.is_parse_args_failure() {
            return;
        }

        tracing::warn!("Server could not parse list arguments, enabling Mopidy workaround");
        session.caps.enable_mopidy_workaround();
        if let Err(e) = self.open_session(session).await {
            tracing::warn!("Reconnect after Mopidy workaround failed: {}", e);
        }
    }

    // ===== Shared request bodies =====

    async fn list_albums(&self, session: &mut Session, command: &str) -> MpdResult<Vec<Album>> {
        let response = self.execute(session, command).await?;
        self.check_list_compat(session, &response).await;
        let response = response.ok()?;
        Ok(responses::decode_albums(response.lines()))
    }

    async fn list_artists(
        &self,
        session: &mut Session,
        command: &str,
    ) -> MpdResult<Vec<Artist>> {
        let response = self.execute(session, command).await?;
        self.check_list_compat(session, &response).await;
        let response = response.ok()?;

        let mut artists = responses::decode_artists(response.lines());
        artists.sort_by(Artist::name_cmp);

        if session.caps.has_musicbrainz_tags() && session.caps.has_list_group() {
            let mut merged: Vec<Artist> = Vec::with_capacity(artists.len());
            for artist in artists {
                match merged.last_mut() {
                    Some(last) if last.name == artist.name => *last = artist,
                    _ => merged.push(artist),
                }
            }
            artists = merged;
        }
        Ok(artists)
    }

    async fn artist_albums(&self, session: &mut Session, artist: &str) -> MpdResult<Vec<Album>> {
        let caps = session.caps.clone();
        let mut albums = self
            .list_albums(session, &commands::artist_albums(artist, &caps))
            .await?;

        if caps.has_tag_album_artist() && caps.has_list_group() {
            let extra = self
                .list_albums(session, &commands::album_artist_albums(artist, &caps))
                .await?;
            let mut seen: HashSet<Album> = albums.iter().cloned().collect();
            albums.extend(extra.into_iter().filter(|album| seen.insert(album.clone())));
        }

        albums.sort_by(Album::name_cmp);
        Ok(albums)
    }

    async fn entries(
        &self,
        session: &mut Session,
        command: &str,
        filter: &TrackFilter,
    ) -> MpdResult<Vec<FileEntry>> {
        let response = self.execute(session, command).await?.ok()?;
        Ok(responses::decode_file_entries(response.lines(), filter))
    }

    async fn tracks(&self, session: &mut Session, command: &str) -> MpdResult<Vec<Track>> {
        let response = self.execute(session, command).await?.ok()?;
        Ok(responses::decode_tracks(
            response.lines(),
            &TrackFilter::default(),
        ))
    }

    async fn album_tracks(
        &self,
        session: &mut Session,
        album: &str,
        filter: &TrackFilter,
    ) -> MpdResult<Vec<Track>> {
        let response = self
            .execute(session, &commands::album_tracks(album))
            .await?
            .ok()?;
        let mut tracks = responses::decode_tracks(response.lines(), filter);
        tracks.sort_by(Track::index_cmp);
        Ok(tracks)
    }

    async fn add_album(
        &self,
        session: &mut Session,
        album: &str,
        artist: &str,
        album_mbid: &str,
    ) -> MpdResult<()> {
        let filter = TrackFilter::new(artist, album_mbid);
        let tracks = self.album_tracks(session, album, &filter).await?;
        let adds: Vec<String> = tracks.iter().map(|t| commands::add(&t.path)).collect();
        self.execute_list(session, &adds).await
    }

    async fn status(&self, session: &mut Session) -> MpdResult<Status> {
        let response = self.execute(session, commands::STATUS).await?.ok()?;
        Ok(responses::decode_status(response.lines()))
    }
}

/// Background half of the idle handshake
async fn run_listener(
    inner: Weak<Inner>,
    reader: Reader,
    handoff: oneshot::Sender<MpdResult<IdleWake<Reader>>>,
    cancel: CancellationToken,
    epoch: u64,
    drain_timeout: Duration,
    host: String,
) {
    let result = idle::listen(reader, &cancel, drain_timeout).await;
    let Some(inner) = inner.upgrade() else {
        return;
    };

    match result {
        Ok(wake) => {
            let external = wake.is_external();
            let changed = wake.changed.clone();
            inner.idle.set_state(IdleState::NotIdling);
            let _ = handoff.send(Ok(wake));

            tracing::debug!("MPD left idle (external: {}, changed: {:?})", external, changed);
            inner.bus.publish(MpdEvent::NonIdle {
                host,
                changed,
                external,
            });
            if external {
                inner.schedule_idle();
            }
        }
        Err(e) => {
            if !cancel.is_cancelled() {
                tracing::warn!("MPD idle listener failed: {}", e);
            }
            inner.idle.set_state(IdleState::NotIdling);
            let _ = handoff.send(Err(e));
            if !cancel.is_cancelled() {
                inner.reap_listener(epoch).await;
            }
        }
    }
}

/// Handle to one MPD server connection. Cheap to clone; clones share the
/// socket and serialize on it.
#[derive(Clone)]
pub struct MpdConnection {
    inner: Arc<Inner>,
}

impl MpdConnection {
    pub fn new(settings: ConnectionSettings, bus: SharedBus) -> Self {
        let idle = IdleCoordinator::new(settings.idle_delay);
        Self {
            inner: Arc::new(Inner {
                settings: RwLock::new(settings),
                session: Arc::new(Mutex::new(Session::new())),
                idle,
                connected: AtomicBool::new(false),
                bus,
            }),
        }
    }

    // ===== Connection =====

    /// Set host, password and port for the next `connect()`
    pub async fn set_server_parameters(&self, host: &str, password: Option<&str>, port: u16) {
        {
            let mut settings = self.inner.settings.write().await;
            settings.host = host.to_string();
            settings.password = password.map(str::to_string);
            settings.port = port;
        }
        // A different server needs its capabilities queried again
        self.inner.session.lock().await.caps_version = None;
    }

    pub async fn settings(&self) -> ConnectionSettings {
        self.inner.settings.read().await.clone()
    }

    /// Connect, authenticate and negotiate capabilities. An open connection
    /// is closed first.
    pub async fn connect(&self) -> MpdResult<()> {
        let mut session = self.inner.lock_request().await;
        self.inner.open_session(&mut session).await
    }

    /// Close the connection. Safe to call at any time, never fails.
    pub async fn disconnect(&self) {
        self.inner.idle.cancel_timer();
        let mut session = match self.inner.session.try_lock() {
            Ok(session) => session,
            Err(_) => {
                // A request is in flight; unblock it if it waits on the listener
                self.inner.idle.abort_listener();
                self.inner.session.lock().await
            }
        };
        self.inner.close_session(&mut session).await;
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Capability snapshot of the connected server
    pub async fn capabilities(&self) -> Option<Capabilities> {
        let session = self.inner.session.lock().await;
        session.ready.then(|| session.caps.clone())
    }

    pub async fn server_features(&self) -> Option<String> {
        self.capabilities().await.map(|caps| caps.server_features())
    }

    pub fn idle_state(&self) -> IdleState {
        self.inner.idle.state()
    }

    pub fn subscribe_idle_state(&self) -> watch::Receiver<IdleState> {
        self.inner.idle.subscribe()
    }

    pub fn bus(&self) -> &SharedBus {
        &self.inner.bus
    }

    // ===== Helpers =====

    async fn run(&self, command: &str) -> MpdResult<()> {
        let mut session = self.inner.lock_request().await;
        self.inner.execute(&mut session, command).await?.ok()?;
        Ok(())
    }

    async fn run_list(&self, batch: &[String]) -> MpdResult<()> {
        let mut session = self.inner.lock_request().await;
        self.inner.execute_list(&mut session, batch).await
    }

    async fn query(&self, command: &str) -> MpdResult<Response> {
        let mut session = self.inner.lock_request().await;
        self.inner.execute(&mut session, command).await?.ok()
    }

    async fn query_tracks(&self, command: &str) -> MpdResult<Vec<Track>> {
        let mut session = self.inner.lock_request().await;
        self.inner.tracks(&mut session, command).await
    }

    /// Send any command and return its raw response
    pub async fn send_raw(&self, command: &str) -> MpdResult<Response> {
        self.query(command).await
    }

    // ===== Library =====

    /// All albums, sorted case-insensitively
    pub async fn get_albums(&self) -> MpdResult<Vec<Album>> {
        let mut session = self.inner.lock_request().await;
        let command = commands::albums(&session.caps);
        let mut albums = self.inner.list_albums(&mut session, &command).await?;
        albums.sort_by(Album::name_cmp);
        Ok(albums)
    }

    /// Albums with music below `path`
    pub async fn get_albums_in_path(&self, path: &str) -> MpdResult<Vec<Album>> {
        let mut session = self.inner.lock_request().await;
        let command = commands::albums_in_path(path, &session.caps);
        let mut albums = self.inner.list_albums(&mut session, &command).await?;
        albums.sort_by(Album::name_cmp);
        Ok(albums)
    }

    /// Albums by `artist`, including those where it is only the album artist
    pub async fn get_artist_albums(&self, artist: &str) -> MpdResult<Vec<Album>> {
        let mut session = self.inner.lock_request().await;
        self.inner.artist_albums(&mut session, artist).await
    }

    pub async fn get_album_artist_albums(&self, artist: &str) -> MpdResult<Vec<Album>> {
        let mut session = self.inner.lock_request().await;
        let command = commands::album_artist_albums(artist, &session.caps);
        let mut albums = self.inner.list_albums(&mut session, &command).await?;
        albums.sort_by(Album::name_cmp);
        Ok(albums)
    }

    pub async fn get_artists(&self) -> MpdResult<Vec<Artist>> {
        let mut session = self.inner.lock_request().await;
        let group = session.caps.has_musicbrainz_tags() && session.caps.has_list_group();
        self.inner
            .list_artists(&mut session, &commands::artists(group))
            .await
    }

    pub async fn get_album_artists(&self) -> MpdResult<Vec<Artist>> {
        let mut session = self.inner.lock_request().await;
        let group = session.caps.has_musicbrainz_tags() && session.caps.has_list_group();
        self.inner
            .list_artists(&mut session, &commands::album_artists(group))
            .await
    }

    /// Tracks of an album in disc/track order. An empty `album_mbid`
    /// matches every album of that name.
    pub async fn get_album_tracks(&self, album: &str, album_mbid: &str) -> MpdResult<Vec<Track>> {
        let mut session = self.inner.lock_request().await;
        let filter = TrackFilter::new("", album_mbid);
        self.inner.album_tracks(&mut session, album, &filter).await
    }

    pub async fn get_artist_album_tracks(
        &self,
        album: &str,
        artist: &str,
        album_mbid: &str,
    ) -> MpdResult<Vec<Track>> {
        let mut session = self.inner.lock_request().await;
        let filter = TrackFilter::new(artist, album_mbid);
        self.inner.album_tracks(&mut session, album, &filter).await
    }

    pub async fn get_all_tracks(&self) -> MpdResult<Vec<Track>> {
        self.query_tracks(commands::ALL_FILES).await
    }

    /// Directory listing: directories, then playlists, then tracks
    pub async fn get_files(&self, path: &str) -> MpdResult<Vec<FileEntry>> {
        let mut session = self.inner.lock_request().await;
        let mut entries = self
            .inner
            .entries(&mut session, &commands::lsinfo(path), &TrackFilter::default())
            .await?;
        entries.sort_by(FileEntry::listing_cmp);
        Ok(entries)
    }

    pub async fn search_files(&self, term: &str, kind: SearchType) -> MpdResult<Vec<FileEntry>> {
        let mut session = self.inner.lock_request().await;
        self.inner
            .entries(
                &mut session,
                &commands::search(term, kind),
                &TrackFilter::default(),
            )
            .await
    }

    /// Queue entries whose file is `url`
    pub async fn get_playlist_find_track(&self, url: &str) -> MpdResult<Vec<Track>> {
        self.query_tracks(&commands::playlist_find_file(url)).await
    }

    /// Start a database update, returning the job id
    pub async fn update_database(&self, path: Option<&str>) -> MpdResult<Option<u32>> {
        let response = self.query(&commands::update_database(path)).await?;
        let job = responses::decode_status(response.lines()).update_db_job;
        Ok(u32::try_from(job).ok())
    }

    // ===== Stored playlists =====

    pub async fn get_playlists(&self) -> MpdResult<Vec<Playlist>> {
        let mut session = self.inner.lock_request().await;
        let mut entries = self
            .inner
            .entries(
                &mut session,
                commands::SAVED_PLAYLISTS,
                &TrackFilter::default(),
            )
            .await?;
        entries.sort_by(FileEntry::listing_cmp);
        Ok(entries
            .into_iter()
            .filter_map(|entry| match entry {
                FileEntry::Playlist(playlist) => Some(playlist),
                _ => None,
            })
            .collect())
    }

    pub async fn get_saved_playlist(&self, name: &str) -> MpdResult<Vec<Track>> {
        self.query_tracks(&commands::saved_playlist(name)).await
    }

    pub async fn save_playlist(&self, name: &str) -> MpdResult<()> {
        self.run(&commands::save_playlist(name)).await
    }

    pub async fn load_playlist(&self, name: &str) -> MpdResult<()> {
        self.run(&commands::load_playlist(name)).await
    }

    pub async fn remove_playlist(&self, name: &str) -> MpdResult<()> {
        self.run(&commands::remove_playlist(name)).await
    }

    pub async fn add_song_to_playlist(&self, name: &str, uri: &str) -> MpdResult<()> {
        self.run(&commands::add_to_playlist(name, uri)).await
    }

    pub async fn remove_song_from_playlist(&self, name: &str, index: u32) -> MpdResult<()> {
        self.run(&commands::remove_from_playlist(name, index)).await
    }

    // ===== Current playlist =====

    pub async fn get_current_playlist(&self) -> MpdResult<Vec<Track>> {
        self.query_tracks(commands::CURRENT_PLAYLIST).await
    }

    /// Queue entries in `start..end`
    pub async fn get_current_playlist_window(&self, start: u32, end: u32) -> MpdResult<Vec<Track>> {
        let mut session = self.inner.lock_request().await;
        if session.caps.has_ranged_current_playlist() {
            let command = commands::current_playlist_window(start, end);
            return self.inner.tracks(&mut session, &command).await;
        }

        let tracks = self
            .inner
            .tracks(&mut session, commands::CURRENT_PLAYLIST)
            .await?;
        Ok(tracks
            .into_iter()
            .skip(start as usize)
            .take(end.saturating_sub(start) as usize)
            .collect())
    }

    /// Append many URIs in one command list
    pub async fn add_track_list<S: AsRef<str>>(&self, uris: &[S]) -> MpdResult<()> {
        let adds: Vec<String> = uris.iter().map(|u| commands::add(u.as_ref())).collect();
        self.run_list(&adds).await
    }

    /// Clear the queue, append `uris` and play from the first. Whatever was
    /// queued before is lost.
    pub async fn play_track_list<S: AsRef<str>>(&self, uris: &[S]) -> MpdResult<()> {
        let mut block = vec![commands::CLEAR_PLAYLIST.to_string()];
        block.extend(uris.iter().map(|u| commands::add(u.as_ref())));
        block.push(commands::play(0));
        self.run_list(&block).await
    }

    pub async fn add_song(&self, uri: &str) -> MpdResult<()> {
        self.run(&commands::add(uri)).await
    }

    pub async fn add_song_at_index(&self, uri: &str, index: u32) -> MpdResult<()> {
        self.run(&commands::add_at_index(uri, index)).await
    }

    /// Queue an album's tracks, restricted to `artist` and `album_mbid`
    /// when they are not empty
    pub async fn add_album_tracks(
        &self,
        album: &str,
        artist: &str,
        album_mbid: &str,
    ) -> MpdResult<()> {
        let mut session = self.inner.lock_request().await;
        self.inner
            .add_album(&mut session, album, artist, album_mbid)
            .await
    }

    /// Queue every album of an artist
    pub async fn add_artist(&self, artist: &str) -> MpdResult<()> {
        let mut session = self.inner.lock_request().await;
        let albums = self.inner.artist_albums(&mut session, artist).await?;
        for album in albums {
            self.inner
                .add_album(&mut session, &album.name, artist, &album.mbid)
                .await?;
        }
        Ok(())
    }

    /// Queue search results, server side when `searchadd` is available
    pub async fn add_searched_files(&self, term: &str, kind: SearchType) -> MpdResult<()> {
        let mut session = self.inner.lock_request().await;
        if session.caps.has_search_add() {
            self.inner
                .execute(&mut session, &commands::search_add(term, kind))
                .await?
                .ok()?;
            return Ok(());
        }

        let found = self
            .inner
            .entries(
                &mut session,
                &commands::search(term, kind),
                &TrackFilter::default(),
            )
            .await?;
        let adds: Vec<String> = found
            .iter()
            .filter_map(FileEntry::as_track)
            .map(|t| commands::add(&t.path))
            .collect();
        self.inner.execute_list(&mut session, &adds).await
    }

    pub async fn clear_playlist(&self) -> MpdResult<()> {
        self.run(commands::CLEAR_PLAYLIST).await
    }

    pub async fn shuffle_playlist(&self) -> MpdResult<()> {
        self.run(commands::SHUFFLE_PLAYLIST).await
    }

    pub async fn remove_index(&self, index: u32) -> MpdResult<()> {
        self.run(&commands::remove_index(index)).await
    }

    /// Remove queue positions `start..=end`. Servers without ranged delete
    /// get one `delete` per position, capped at the queue length.
    pub async fn remove_range(&self, start: u32, end: u32) -> MpdResult<()> {
        if start > end {
            return Ok(());
        }
        let mut session = self.inner.lock_request().await;
        if session.caps.has_current_playlist_remove_range() {
            let command = commands::remove_range(start, end.saturating_add(1));
            self.inner.execute(&mut session, &command).await?.ok()?;
            return Ok(());
        }

        // One delete per position, so never go past the end of the queue
        let length = self.inner.status(&mut session).await?.playlist_length;
        if start >= length {
            return Ok(());
        }
        let end = end.min(length - 1);

        // Each delete shifts the rest of the queue down by one
        let deletes: Vec<String> = (start..=end)
            .map(|_| commands::remove_index(start))
            .collect();
        self.inner.execute_list(&mut session, &deletes).await
    }

    pub async fn move_song_from_index_to_index(&self, from: u32, to: u32) -> MpdResult<()> {
        self.run(&commands::move_song(from, to)).await
    }

    // ===== Playback =====

    pub async fn pause(&self, paused: bool) -> MpdResult<()> {
        self.run(&commands::pause(paused)).await
    }

    pub async fn play_next(&self) -> MpdResult<()> {
        self.run(commands::NEXT).await
    }

    pub async fn play_previous(&self) -> MpdResult<()> {
        self.run(commands::PREVIOUS).await
    }

    pub async fn stop(&self) -> MpdResult<()> {
        self.run(commands::STOP).await
    }

    pub async fn play_song_index(&self, index: u32) -> MpdResult<()> {
        self.run(&commands::play(index)).await
    }

    /// Seek within the current song. Does nothing when no song is selected.
    pub async fn seek_seconds(&self, seconds: u32) -> MpdResult<()> {
        let mut session = self.inner.lock_request().await;
        let status = self.inner.status(&mut session).await?;
        let Ok(index) = u32::try_from(status.current_song_index) else {
            tracing::debug!("Seek ignored, no current song");
            return Ok(());
        };
        self.inner
            .execute(&mut session, &commands::seek(index, seconds))
            .await?
            .ok()?;
        Ok(())
    }

    pub async fn set_random(&self, enabled: bool) -> MpdResult<()> {
        self.run(&commands::random(enabled)).await
    }

    pub async fn set_repeat(&self, enabled: bool) -> MpdResult<()> {
        self.run(&commands::repeat(enabled)).await
    }

    pub async fn set_single(&self, enabled: bool) -> MpdResult<()> {
        self.run(&commands::single(enabled)).await
    }

    pub async fn set_consume(&self, enabled: bool) -> MpdResult<()> {
        self.run(&commands::consume(enabled)).await
    }

    /// Volume outside 0..=100 is clamped
    pub async fn set_volume(&self, volume: i32) -> MpdResult<()> {
        self.run(&commands::set_volume(volume)).await
    }

    // ===== Status =====

    pub async fn get_current_status(&self) -> MpdResult<Status> {
        let mut session = self.inner.lock_request().await;
        self.inner.status(&mut session).await
    }

    pub async fn get_statistics(&self) -> MpdResult<Statistics> {
        let response = self.query(commands::STATS).await?;
        Ok(responses::decode_statistics(response.lines()))
    }

    /// The playing song, if the server reports exactly one
    pub async fn get_current_song(&self) -> MpdResult<Option<Track>> {
        let mut tracks = self.query_tracks(commands::CURRENT_SONG).await?;
        Ok(match tracks.len() {
            1 => tracks.pop(),
            _ => None,
        })
    }

    pub async fn get_outputs(&self) -> MpdResult<Vec<Output>> {
        let response = self.query(commands::OUTPUTS).await?;
        Ok(responses::decode_outputs(response.lines()))
    }

    pub async fn toggle_output(&self, id: u32) -> MpdResult<()> {
        self.run(&commands::toggle_output(id)).await
    }

    // ===== Stickers =====

    /// Files below `base` whose sticker `name` equals `value`
    pub async fn find_sticker_files(
        &self,
        base: &str,
        name: &str,
        value: &str,
    ) -> MpdResult<Vec<String>> {
        let response = self
            .query(&commands::sticker_find(base, name, value))
            .await?;
        Ok(responses::decode_file_paths(response.lines()))
    }

    /// `rating` sticker of a song; `None` when unset
    pub async fn get_rating(&self, uri: &str) -> MpdResult<Option<u32>> {
        match self.query(&commands::sticker_rating(uri)).await {
            Ok(response) => Ok(responses::decode_sticker(response.lines(), "rating")
                .and_then(|value| value.trim().parse().ok())),
            Err(MpdError::Ack(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::create_bus;

    #[test]
    fn test_default_settings() {
        let settings = ConnectionSettings::default();
        assert_eq!(settings.port, 6600);
        assert_eq!(settings.idle_delay, Duration::from_millis(500));
        assert_eq!(settings.response_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_response_ok_maps_ack() {
        let response = Response {
            lines: vec!["file: a".to_string()],
            terminal: responses::terminal("ACK [50@0] {lsinfo} No such directory")
                .expect("terminal"),
        };
        let err = response.ok().unwrap_err();
        assert_eq!(err.ack().map(|a| a.code), Some(50));
    }

    #[tokio::test]
    async fn test_disconnect_when_never_connected() {
        let conn = MpdConnection::new(ConnectionSettings::default(), create_bus());
        conn.disconnect().await;
        conn.disconnect().await;
        assert!(!conn.is_connected());
        assert_eq!(conn.idle_state(), IdleState::NotIdling);
    }

    #[tokio::test]
    async fn test_requests_fail_when_not_connected() {
        let conn = MpdConnection::new(ConnectionSettings::default(), create_bus());
        assert!(matches!(conn.stop().await, Err(MpdError::NotConnected)));
        assert!(matches!(conn.get_albums().await, Err(MpdError::NotConnected)));
        assert!(conn.capabilities().await.is_none());
    }

    #[tokio::test]
    async fn test_connect_without_host() {
        let conn = MpdConnection::new(ConnectionSettings::default(), create_bus());
        conn.set_server_parameters("", None, 6600).await;
        assert!(matches!(conn.connect().await, Err(MpdError::NotConfigured)));
    }
}
