#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Mock MPD server for testing
//!
//! Speaks the line protocol on a random local port: welcome line, a small
//! command set backed by an in-memory queue and database, command lists,
//! password checks and idle/noidle with per-client pending changes.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

pub const WELCOME: &str = "OK MPD 0.23.5\n";

/// A song in the mock database
#[derive(Debug, Clone)]
pub struct MockSong {
    pub file: String,
    pub artist: String,
    pub album: String,
    pub title: String,
    pub time: u32,
}

impl MockSong {
    pub fn new(file: &str, artist: &str, album: &str, title: &str, time: u32) -> Self {
        Self {
            file: file.to_string(),
            artist: artist.to_string(),
            album: album.to_string(),
            title: title.to_string(),
            time,
        }
    }

    fn tag(&self, name: &str) -> Option<&str> {
        match name.to_ascii_lowercase().as_str() {
            "file" | "filename" => Some(&self.file),
            "artist" => Some(&self.artist),
            "album" => Some(&self.album),
            "title" => Some(&self.title),
            _ => None,
        }
    }

    fn render(&self, out: &mut String) {
        out.push_str(&format!(
            "file: {}\nArtist: {}\nAlbum: {}\nTitle: {}\nTime: {}\n",
            self.file, self.artist, self.album, self.title, self.time
        ));
    }
}

/// Mock MPD state
#[derive(Debug, Clone)]
pub struct MockMpdState {
    pub state: String, // play, pause, stop
    pub volume: u32,
    pub queue: Vec<MockSong>,
    pub database: Vec<MockSong>,
    pub password: Option<String>,
    pub update_job: u32,
    /// Client connections accepted so far
    pub connections: u32,
}

impl Default for MockMpdState {
    fn default() -> Self {
        Self {
            state: "stop".to_string(),
            volume: 50,
            queue: Vec::new(),
            database: vec![
                MockSong::new("jazz/nina/sinnerman.flac", "Nina Simone", "Pastel Blues", "Sinnerman", 620),
                MockSong::new("jazz/nina/be_my_husband.flac", "Nina Simone", "Pastel Blues", "Be My Husband", 171),
                MockSong::new("rock/acdc/live_wire.flac", "AC/DC", "High Voltage", "Live Wire", 349),
            ],
            password: None,
            update_job: 0,
            connections: 0,
        }
    }
}

#[derive(Debug, Clone)]
enum ServerEvent {
    Changed(String),
    Kick,
}

struct Shared {
    state: RwLock<MockMpdState>,
    events: broadcast::Sender<ServerEvent>,
}

impl Shared {
    fn notify(&self, subsystem: &str) {
        let _ = self.events.send(ServerEvent::Changed(subsystem.to_string()));
    }
}

/// Mock MPD server
pub struct MockMpdServer {
    addr: SocketAddr,
    shared: Arc<Shared>,
    handle: JoinHandle<()>,
}

impl MockMpdServer {
    /// Start a mock MPD server on a random port
    pub async fn start() -> Self {
        Self::start_with(MockMpdState::default()).await
    }

    pub async fn start_with(state: MockMpdState) -> Self {
        let (events, _) = broadcast::channel(64);
        let shared = Arc::new(Shared {
            state: RwLock::new(state),
            events,
        });
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let shared_clone = shared.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let shared = shared_clone.clone();
                tokio::spawn(async move {
                    handle_connection(stream, shared).await;
                });
            }
        });

        Self {
            addr,
            shared,
            handle,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Report a change in `subsystem` to every connected client
    pub fn notify(&self, subsystem: &str) {
        self.shared.notify(subsystem);
    }

    /// Close every open client connection
    pub fn kick_clients(&self) {
        let _ = self.shared.events.send(ServerEvent::Kick);
    }

    pub async fn state(&self) -> MockMpdState {
        self.shared.state.read().await.clone()
    }

    /// Stop the mock server
    pub async fn stop(self) {
        self.handle.abort();
        self.kick_clients();
    }
}

struct Session {
    shared: Arc<Shared>,
    authorized: bool,
    /// Changes seen while the client was not idle
    pending: BTreeSet<String>,
}

/// Handle a single TCP connection
async fn handle_connection(stream: TcpStream, shared: Arc<Shared>) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut events = shared.events.subscribe();
    let authorized = {
        let mut state = shared.state.write().await;
        state.connections += 1;
        state.password.is_none()
    };
    let mut session = Session {
        authorized,
        shared,
        pending: BTreeSet::new(),
    };
    let mut list: Option<(bool, Vec<String>)> = None;

    if writer.write_all(WELCOME.as_bytes()).await.is_err() {
        return;
    }

    loop {
        let line = tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => line,
                _ => break,
            },
            event = events.recv() => match event {
                Ok(ServerEvent::Changed(subsystem)) => {
                    session.pending.insert(subsystem);
                    continue;
                }
                Ok(ServerEvent::Kick) => break,
                Err(_) => continue,
            },
        };

        let response = if let Some((ok_mode, commands)) = list.as_mut() {
            if line == "command_list_end" {
                let ok_mode = *ok_mode;
                let commands = std::mem::take(commands);
                list = None;
                session.run_list(ok_mode, &commands).await
            } else {
                commands.push(line);
                continue;
            }
        } else if line == "command_list_begin" || line == "command_list_ok_begin" {
            list = Some((line == "command_list_ok_begin", Vec::new()));
            continue;
        } else if line == "idle" || line.starts_with("idle ") {
            match session.idle(&line, &mut lines, &mut events, &mut writer).await {
                Some(()) => continue,
                None => break,
            }
        } else if line == "close" {
            break;
        } else {
            match session.execute(&line).await {
                Ok(body) => body + "OK\n",
                Err((code, msg)) => ack(code, 0, &line, &msg),
            }
        };

        if writer.write_all(response.as_bytes()).await.is_err() {
            break;
        }
    }
}

fn ack(code: i32, index: usize, line: &str, msg: &str) -> String {
    let command = line.split_whitespace().next().unwrap_or("");
    format!("ACK [{}@{}] {{{}}} {}\n", code, index, command, msg)
}

/// Split a command line into words, honouring double quotes and backslash
/// escapes inside them.
fn split_args(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c == ' ' {
            chars.next();
            continue;
        }
        let mut word = String::new();
        if c == '"' {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            word.push(escaped);
                        }
                    }
                    '"' => break,
                    _ => word.push(c),
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ' ' {
                    break;
                }
                word.push(c);
                chars.next();
            }
        }
        args.push(word);
    }
    args
}

impl Session {
    /// Run one idle request. `None` when the connection should close.
    async fn idle(
        &mut self,
        line: &str,
        lines: &mut tokio::io::Lines<BufReader<tokio::net::tcp::OwnedReadHalf>>,
        events: &mut broadcast::Receiver<ServerEvent>,
        writer: &mut OwnedWriteHalf,
    ) -> Option<()> {
        let wanted: Vec<String> = split_args(line).into_iter().skip(1).collect();
        let matches = |subsystem: &str| wanted.is_empty() || wanted.iter().any(|w| w == subsystem);

        let ready: Vec<String> = self.pending.iter().filter(|s| matches(s.as_str())).cloned().collect();
        if !ready.is_empty() {
            for subsystem in &ready {
                self.pending.remove(subsystem);
            }
            writer.write_all(changed(&ready).as_bytes()).await.ok()?;
            return Some(());
        }

        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) if line == "noidle" => {
                        writer.write_all(b"OK\n").await.ok()?;
                        return Some(());
                    }
                    // Anything else during idle closes the connection
                    _ => return None,
                },
                event = events.recv() => match event {
                    Ok(ServerEvent::Changed(subsystem)) if matches(&subsystem) => {
                        writer.write_all(changed(&[subsystem]).as_bytes()).await.ok()?;
                        return Some(());
                    }
                    Ok(ServerEvent::Changed(subsystem)) => {
                        self.pending.insert(subsystem);
                    }
                    Ok(ServerEvent::Kick) => return None,
                    Err(_) => {}
                },
            }
        }
    }

    async fn run_list(&mut self, ok_mode: bool, commands: &[String]) -> String {
        let mut out = String::new();
        for (index, command) in commands.iter().enumerate() {
            match self.execute(command).await {
                Ok(body) => {
                    out.push_str(&body);
                    if ok_mode {
                        out.push_str("list_OK\n");
                    }
                }
                Err((code, msg)) => {
                    out.push_str(&ack(code, index, command, &msg));
                    return out;
                }
            }
        }
        out.push_str("OK\n");
        out
    }

    async fn execute(&mut self, line: &str) -> Result<String, (i32, String)> {
        let args = split_args(line);
        let Some(command) = args.first().map(String::as_str) else {
            return Err((5, "No command given".to_string()));
        };

        if command == "password" {
            let state = self.shared.state.read().await;
            return match (&state.password, args.get(1)) {
                (Some(expected), Some(given)) if expected == given => {
                    self.authorized = true;
                    Ok(String::new())
                }
                _ => Err((3, "incorrect password".to_string())),
            };
        }
        if !self.authorized && command != "ping" {
            return Err((4, format!("you don't have permission for \"{}\"", command)));
        }

        let mut state = self.shared.state.write().await;
        let mut out = String::new();
        match command {
            "ping" => {}
            "status" => {
                out.push_str(&format!(
                    "volume: {}\nstate: {}\nplaylistlength: {}\n",
                    state.volume,
                    state.state,
                    state.queue.len()
                ));
            }
            "play" | "pause" | "stop" => {
                if let Some(pos) = args.get(1) {
                    let pos: usize = pos
                        .parse()
                        .map_err(|_| (2, format!("Integer expected: {}", pos)))?;
                    if pos >= state.queue.len() {
                        return Err((2, "Bad song index".to_string()));
                    }
                }
                state.state = command.to_string();
                drop(state);
                self.shared.notify("player");
            }
            "setvol" => {
                let volume = args
                    .get(1)
                    .and_then(|v| v.parse::<u32>().ok())
                    .filter(|v| *v <= 100)
                    .ok_or((2, "Invalid volume value".to_string()))?;
                state.volume = volume;
                drop(state);
                self.shared.notify("mixer");
            }
            "add" | "addid" => {
                let uri = args.get(1).ok_or((2, "wrong number of arguments".to_string()))?;
                let song = state
                    .database
                    .iter()
                    .find(|s| &s.file == uri)
                    .cloned()
                    .ok_or((50, "No such directory".to_string()))?;
                state.queue.push(song);
                if command == "addid" {
                    out.push_str(&format!("Id: {}\n", state.queue.len()));
                }
                drop(state);
                self.shared.notify("playlist");
            }
            "clear" => {
                state.queue.clear();
                drop(state);
                self.shared.notify("playlist");
            }
            "playlistinfo" => {
                for (pos, song) in state.queue.iter().enumerate() {
                    song.render(&mut out);
                    out.push_str(&format!("Pos: {}\nId: {}\n", pos, pos + 1));
                }
            }
            "lsinfo" => {
                let dir = args.get(1).map(String::as_str).unwrap_or("");
                let prefix = if dir.is_empty() {
                    String::new()
                } else {
                    format!("{}/", dir)
                };
                let mut subdirs = BTreeSet::new();
                let mut files = Vec::new();
                for song in &state.database {
                    let Some(rest) = song.file.strip_prefix(&prefix) else {
                        continue;
                    };
                    match rest.split_once('/') {
                        Some((sub, _)) => {
                            subdirs.insert(format!("{}{}", prefix, sub));
                        }
                        None => files.push(song.clone()),
                    }
                }
                if subdirs.is_empty() && files.is_empty() && !dir.is_empty() {
                    return Err((50, "No such directory".to_string()));
                }
                for sub in subdirs {
                    out.push_str(&format!("directory: {}\nLast-Modified: 2024-01-01T00:00:00Z\n", sub));
                }
                for song in files {
                    song.render(&mut out);
                }
            }
            "find" | "search" | "count" | "list" => {
                let (field, constraints) = if command == "list" {
                    let field = args.get(1).ok_or((2, "too few arguments".to_string()))?;
                    (Some(field.clone()), &args[2..])
                } else {
                    (None, &args[1..])
                };
                if constraints.len() % 2 != 0 {
                    return Err((2, "Incorrect number of filter arguments".to_string()));
                }
                let exact = command != "search";
                let hits: Vec<&MockSong> = state
                    .database
                    .iter()
                    .filter(|song| {
                        constraints.chunks(2).all(|pair| {
                            let wanted = &pair[1];
                            let values: Vec<&str> = if pair[0] == "any" {
                                ["artist", "album", "title", "file"]
                                    .iter()
                                    .filter_map(|t| song.tag(t))
                                    .collect()
                            } else {
                                song.tag(&pair[0]).into_iter().collect()
                            };
                            values.iter().any(|v| {
                                if exact {
                                    *v == wanted.as_str()
                                } else {
                                    v.to_lowercase().contains(&wanted.to_lowercase())
                                }
                            })
                        })
                    })
                    .collect();

                match (command, field) {
                    ("list", Some(field)) => {
                        let key = capitalize(&field);
                        let mut seen = BTreeSet::new();
                        for song in hits {
                            let value = song
                                .tag(&field)
                                .ok_or((2, format!("Unknown tag type: {}", field)))?;
                            if seen.insert(value.to_string()) {
                                out.push_str(&format!("{}: {}\n", key, value));
                            }
                        }
                    }
                    ("count", _) => {
                        let playtime: u32 = hits.iter().map(|s| s.time).sum();
                        out.push_str(&format!("songs: {}\nplaytime: {}\n", hits.len(), playtime));
                    }
                    _ => {
                        for song in hits {
                            song.render(&mut out);
                        }
                    }
                }
            }
            "update" => {
                state.update_job += 1;
                out.push_str(&format!("updating_db: {}\n", state.update_job));
                drop(state);
                self.shared.notify("update");
                self.shared.notify("database");
            }
            _ => return Err((5, format!("unknown command \"{}\"", command))),
        }
        Ok(out)
    }
}

fn changed(subsystems: &[String]) -> String {
    let mut out = String::new();
    for subsystem in subsystems {
        out.push_str(&format!("changed: {}\n", subsystem));
    }
    out.push_str("OK\n");
    out
}

fn capitalize(tag: &str) -> String {
    let mut chars = tag.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}
