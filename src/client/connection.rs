//! The MPD connection: handshake, command dispatch, response consumption,
//! command lists, searches and idle mode over one stream.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use super::entity::InfoEntity;
use super::idle::{IdleCanceller, IdleProgress, IdleState, IdleStatus};
use super::pipeline::{ListMode, ListOkStep, Pipeline, Step};
use super::transport::Transport;
use crate::error::{ErrorKind, MpdError, Result};
use crate::protocol::{
    parse_line, AckError, Command, IdleFlags, LineReader, Pair, ProtocolVersion, Reply,
    SearchBuilder, SearchKind, TagType, WELCOME_PREFIX,
};

pub const DEFAULT_PORT: u16 = 6600;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// How an idle response ended.
enum IdleOutcome {
    Changed(IdleFlags),
    Rejected(AckError),
}

/// A client connection to an MPD server.
///
/// One connection carries at most one outstanding response. After sending a
/// command, read its result with [`next_pair`](Self::next_pair),
/// [`next_entity`](Self::next_entity) or [`next_value`](Self::next_value),
/// then retire it with [`finish`](Self::finish) before sending the next one.
pub struct Connection<S = Transport> {
    stream: S,
    reader: LineReader,
    timeout: Duration,
    version: ProtocolVersion,
    pipeline: Pipeline,
    idle: IdleState,
    search: SearchBuilder,
    last_ack: Option<AckError>,
    fatal: Option<ErrorKind>,
}

impl Connection<Transport> {
    /// Connect to `host:port` and read the welcome line. A host starting with
    /// `/` is taken as the path of a Unix socket and `port` is ignored.
    pub async fn open(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        #[cfg(unix)]
        if host.starts_with('/') {
            let stream = connect_unix(host, timeout).await?;
            return Self::handshake(Transport::Unix(stream), timeout).await;
        }

        let stream = connect_tcp(host, port, timeout).await?;
        Self::handshake(Transport::Tcp(stream), timeout).await
    }
}

async fn connect_tcp(host: &str, port: u16, limit: Duration) -> Result<TcpStream> {
    let addrs: Vec<SocketAddr> = match timeout(limit, tokio::net::lookup_host((host, port))).await
    {
        Ok(Ok(addrs)) => addrs.collect(),
        Ok(Err(e)) => {
            debug!("Failed to resolve {}: {}", host, e);
            return Err(MpdError::UnknownHost(host.to_string()));
        }
        Err(_) => return Err(MpdError::UnknownHost(host.to_string())),
    };

    let mut last_error = None;
    for addr in addrs {
        match timeout(limit, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                // Commands are small and latency-bound.
                let _ = stream.set_nodelay(true);
                return Ok(stream);
            }
            Ok(Err(e)) => {
                debug!("Connection to {} failed: {}", addr, e);
                last_error = Some(MpdError::Connect {
                    addr: addr.to_string(),
                    source: e,
                });
            }
            Err(_) => {
                last_error = Some(MpdError::Connect {
                    addr: addr.to_string(),
                    source: io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
                });
            }
        }
    }

    Err(last_error.unwrap_or_else(|| MpdError::UnknownHost(host.to_string())))
}

#[cfg(unix)]
async fn connect_unix(path: &str, limit: Duration) -> Result<tokio::net::UnixStream> {
    match timeout(limit, tokio::net::UnixStream::connect(path)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(MpdError::Connect {
            addr: path.to_string(),
            source: e,
        }),
        Err(_) => Err(MpdError::Connect {
            addr: path.to_string(),
            source: io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
        }),
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already-open stream and read the server's welcome line.
    pub async fn handshake(stream: S, timeout: Duration) -> Result<Self> {
        let mut conn = Self {
            stream,
            reader: LineReader::new(),
            timeout,
            version: ProtocolVersion::default(),
            pipeline: Pipeline::default(),
            idle: IdleState::default(),
            search: SearchBuilder::default(),
            last_ack: None,
            fatal: None,
        };

        let line = match conn.reader.next_line(&mut conn.stream, Some(timeout)).await {
            Ok(line) => line,
            Err(MpdError::Timeout) => {
                return Err(MpdError::NoResponse(
                    "timeout in attempting to get a response".into(),
                ))
            }
            Err(MpdError::ConnectionClosed) => {
                return Err(MpdError::NoResponse(
                    "connection closed before welcome".into(),
                ))
            }
            Err(e) => return Err(e),
        };

        if !line.starts_with(WELCOME_PREFIX) {
            return Err(MpdError::NotMpd(format!("unexpected welcome {:?}", line)));
        }
        conn.version = ProtocolVersion::from_welcome(&line).ok_or_else(|| {
            MpdError::NotMpd(format!("error parsing version number at {:?}", line))
        })?;

        info!("Connected to MPD (protocol {})", conn.version);
        Ok(conn)
    }

    // =========================================================================
    // State accessors
    // =========================================================================

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Set the per-read and per-write timeout. Idle waits are not bounded.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// The most recent server error. Stays set across later successful
    /// commands until [`clear_error`](Self::clear_error) is called.
    pub fn last_ack(&self) -> Option<&AckError> {
        self.last_ack.as_ref()
    }

    /// Forget the last server error. A broken connection stays broken.
    pub fn clear_error(&mut self) {
        self.last_ack = None;
    }

    /// Kind of the fatal error that broke this connection, if any.
    pub fn fatal_error(&self) -> Option<ErrorKind> {
        self.fatal
    }

    pub fn is_broken(&self) -> bool {
        self.fatal.is_some()
    }

    pub fn list_mode(&self) -> ListMode {
        self.pipeline.mode()
    }

    /// Whether the last response has been fully consumed.
    pub fn done_processing(&self) -> bool {
        self.pipeline.done_processing()
    }

    pub fn idle_status(&self) -> IdleStatus {
        self.idle.status
    }

    /// Handle that ends a blocking [`idle`](Self::idle) wait from elsewhere.
    pub fn idle_canceller(&self) -> IdleCanceller {
        self.idle.canceller.clone()
    }

    fn ensure_usable(&self) -> Result<()> {
        match self.fatal {
            Some(kind) => Err(MpdError::Broken(kind)),
            None => Ok(()),
        }
    }

    fn ensure_active(&self) -> Result<()> {
        self.ensure_usable()?;
        if self.idle.is_waiting() {
            return Err(MpdError::usage("connection is in idle mode"));
        }
        Ok(())
    }

    /// Record a fatal error so every later call fails fast.
    fn fail(&mut self, err: MpdError) -> MpdError {
        if err.is_fatal() && self.fatal.is_none() {
            warn!("MPD connection failed: {}", err);
            self.fatal = Some(err.kind());
        }
        err
    }

    // =========================================================================
    // Low-level I/O
    // =========================================================================

    async fn write_raw(&mut self, data: &str) -> Result<()> {
        let stream = &mut self.stream;
        let result = timeout(self.timeout, async move {
            stream.write_all(data.as_bytes()).await?;
            stream.flush().await
        })
        .await;

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(self.fail(MpdError::Sending(e))),
            Err(_) => Err(self.fail(MpdError::Timeout)),
        }
    }

    async fn dispatch(&mut self, line: &str) -> Result<()> {
        if line.starts_with("password ") {
            debug!("-> password <redacted>");
        } else {
            debug!("-> {}", line);
        }
        let mut data = String::with_capacity(line.len() + 1);
        data.push_str(line);
        data.push('\n');
        self.write_raw(&data).await?;
        self.pipeline.dispatched();
        Ok(())
    }

    fn accept_line(&mut self, line: &str) -> Result<Step> {
        trace!("<- {}", line);
        let reply = match parse_line(line) {
            Ok(reply) => reply,
            Err(e) => return Err(self.fail(e)),
        };
        let is_ack = matches!(reply, Reply::Ack(_));
        let step = match self.pipeline.accept(reply) {
            Ok(step) => step,
            Err(e) => return Err(self.fail(e)),
        };
        if is_ack {
            if let Some(ref ack) = self.pipeline.pending_ack {
                debug!("Server error: {}", ack);
                self.last_ack = Some(ack.clone());
            }
        }
        Ok(step)
    }

    async fn next_step(&mut self) -> Result<Step> {
        if let Some(pair) = self.pipeline.peeked.take() {
            return Ok(Step::Pair(pair));
        }
        if self.pipeline.done_processing() {
            return Ok(Step::Done);
        }
        if self.pipeline.at_list_ok() {
            return Ok(Step::ListOk);
        }

        let line = match self
            .reader
            .next_line(&mut self.stream, Some(self.timeout))
            .await
        {
            Ok(line) => line,
            Err(e) => return Err(self.fail(e)),
        };
        self.accept_line(&line)
    }

    // =========================================================================
    // Commands and responses
    // =========================================================================

    pub async fn send(&mut self, command: &Command) -> Result<()> {
        self.send_line(command.as_str()).await
    }

    /// Send one command line (without its newline).
    ///
    /// Inside a command list the line is queued until
    /// [`command_list_end`](Self::command_list_end). While idle it is parked
    /// and written as soon as idle mode ends; only one command can be parked.
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        self.ensure_usable()?;
        if line.contains('\n') {
            return Err(MpdError::usage("command line contains a newline"));
        }

        if self.idle.is_waiting() {
            if self.idle.pending.is_some() {
                return Err(MpdError::usage("already have a request pending"));
            }
            debug!("Holding '{}' until idle ends", line);
            self.idle.pending = Some(line.to_string());
            return Ok(());
        }

        if self.pipeline.mode() != ListMode::None {
            trace!("queued in command list: {}", line);
            self.pipeline.queue(line);
            return Ok(());
        }

        self.pipeline.ensure_ready()?;
        self.dispatch(line).await
    }

    /// Next `key: value` pair of the current response.
    ///
    /// Returns `None` at the end of the response, and at each sub-command
    /// boundary of a `command_list_ok_begin` list. A response ending in
    /// `ACK` yields the error here.
    pub async fn next_pair(&mut self) -> Result<Option<Pair>> {
        self.ensure_active()?;
        match self.next_step().await? {
            Step::Pair(pair) => Ok(Some(pair)),
            Step::ListOk => Ok(None),
            Step::Done => match self.pipeline.pending_ack.take() {
                Some(ack) => Err(MpdError::Ack(ack)),
                None => Ok(None),
            },
        }
    }

    /// Next value stored under `key` (ASCII case-insensitive), skipping
    /// other pairs.
    pub async fn next_value(&mut self, key: &str) -> Result<Option<String>> {
        while let Some(pair) = self.next_pair().await? {
            if pair.is(key) {
                return Ok(Some(pair.value));
            }
        }
        Ok(None)
    }

    /// Next value of `tag`, for `list` responses.
    pub async fn next_tag(&mut self, tag: TagType) -> Result<Option<String>> {
        self.next_value(tag.key()).await
    }

    /// Assemble the next directory, song or playlist record.
    pub async fn next_entity(&mut self) -> Result<Option<InfoEntity>> {
        loop {
            let Some(first) = self.next_pair().await? else {
                return Ok(None);
            };
            let Some(mut entity) = InfoEntity::start(&first) else {
                debug!("Skipping '{}' outside of a record", first.key);
                continue;
            };

            loop {
                match self.next_pair().await? {
                    Some(pair) if InfoEntity::is_primary_key(&pair) => {
                        self.pipeline.peeked = Some(pair);
                        break;
                    }
                    Some(pair) => entity.absorb(pair),
                    None => break,
                }
            }
            return Ok(Some(entity));
        }
    }

    /// Drain the rest of the current response (including every sub-command
    /// of a finished command list) and report how it ended.
    pub async fn finish(&mut self) -> Result<()> {
        self.ensure_active()?;
        if self.pipeline.mode() != ListMode::None {
            return Err(MpdError::usage("command list is still open"));
        }

        loop {
            match self.next_step().await? {
                Step::Pair(_) => {}
                Step::ListOk => self.pipeline.clear_list_ok(),
                Step::Done => break,
            }
        }

        match self.pipeline.pending_ack.take() {
            Some(ack) => Err(MpdError::Ack(ack)),
            None => Ok(()),
        }
    }

    /// Send a command and wait for its (pair-less) response.
    pub async fn run(&mut self, command: &Command) -> Result<()> {
        self.send(command).await?;
        self.finish().await
    }

    pub async fn password(&mut self, password: &str) -> Result<()> {
        self.run(&Command::new("password").arg(password)).await
    }

    /// Job id from the response to `update`/`rescan`.
    pub async fn update_id(&mut self) -> Result<Option<u32>> {
        let id = self.next_value("updating_db").await?;
        self.finish().await?;
        Ok(id.and_then(|v| v.parse().ok()))
    }

    // =========================================================================
    // Command lists
    // =========================================================================

    pub fn command_list_begin(&mut self) -> Result<()> {
        self.begin_list(false)
    }

    /// Like [`command_list_begin`](Self::command_list_begin), but the server
    /// acknowledges every sub-command with `list_OK`.
    pub fn command_list_ok_begin(&mut self) -> Result<()> {
        self.begin_list(true)
    }

    fn begin_list(&mut self, ok: bool) -> Result<()> {
        self.ensure_active()?;
        self.pipeline.begin_list(ok)?;
        debug!("Command list opened (list_OK: {})", ok);
        Ok(())
    }

    /// Write the queued commands as one batch.
    pub async fn command_list_end(&mut self) -> Result<()> {
        self.ensure_active()?;
        let envelope = self.pipeline.end_list()?;
        debug!("-> command list ({} bytes)", envelope.len());
        self.write_raw(&envelope).await
    }

    /// Move past the next `list_OK` of a list-ok response, skipping any
    /// unread pairs of the current sub-command.
    pub async fn advance_list_ok(&mut self) -> Result<ListOkStep> {
        self.ensure_active()?;
        if self.pipeline.at_list_ok() {
            self.pipeline.clear_list_ok();
            return Ok(ListOkStep::Advanced);
        }

        loop {
            match self.next_step().await? {
                Step::Pair(_) => {}
                Step::ListOk => {
                    self.pipeline.clear_list_ok();
                    return Ok(ListOkStep::Advanced);
                }
                Step::Done => return Ok(ListOkStep::Finished),
            }
        }
    }

    // =========================================================================
    // Search
    // =========================================================================

    pub fn search_in_progress(&self) -> bool {
        self.search.in_progress()
    }

    pub fn start_search(&mut self, kind: SearchKind, exact: bool) -> Result<()> {
        self.search.start(kind, exact)
    }

    pub fn add_constraint(&mut self, tag: TagType, value: impl Into<String>) -> Result<()> {
        self.search.add_constraint(tag, value)
    }

    /// Send the search built so far. Results are read like any listing.
    /// If the command cannot be sent the search stays in progress.
    pub async fn commit_search(&mut self) -> Result<()> {
        let command = self.search.command()?;
        self.send(&command).await?;
        self.search.abandon();
        Ok(())
    }

    /// Drop the search being built without sending anything.
    pub fn abandon_search(&mut self) {
        self.search.abandon();
    }

    // =========================================================================
    // Idle
    // =========================================================================

    /// Enter idle mode for all subsystems without waiting. See
    /// [`start_idle_for`](Self::start_idle_for).
    pub async fn start_idle<F>(&mut self, callback: F) -> Result<IdleStatus>
    where
        F: FnOnce(IdleFlags) + Send + 'static,
    {
        self.start_idle_for(IdleFlags::empty(), callback).await
    }

    /// Send `idle` (restricted to `subsystems` unless empty) and return
    /// immediately. Drive it with [`readable`](Self::readable) and
    /// [`resume_idle`](Self::resume_idle). Calling this while already idle
    /// changes nothing and drops `callback`.
    pub async fn start_idle_for<F>(&mut self, subsystems: IdleFlags, callback: F) -> Result<IdleStatus>
    where
        F: FnOnce(IdleFlags) + Send + 'static,
    {
        self.ensure_usable()?;
        if self.idle.is_waiting() {
            debug!("Already idle");
            return Ok(IdleStatus::Waiting);
        }
        if self.pipeline.mode() != ListMode::None {
            return Err(MpdError::usage("cannot enter idle inside a command list"));
        }
        self.pipeline.ensure_ready()?;

        let command = subsystems
            .names()
            .into_iter()
            .fold(Command::new("idle"), |cmd, name| cmd.arg_raw(name));
        if self.idle.canceller.discard_stale() {
            debug!("Dropping idle cancel issued while active");
        }
        self.dispatch(command.as_str()).await?;
        self.idle.enter(Box::new(callback));
        Ok(IdleStatus::Waiting)
    }

    /// Wait until bytes arrive from the server. Safe to drop before it
    /// completes, so it can sit in a `tokio::select!` next to other events.
    pub async fn readable(&mut self) -> Result<()> {
        self.ensure_usable()?;
        if self.reader.has_line() {
            return Ok(());
        }
        match self.reader.fill(&mut self.stream, None).await {
            Ok(_) => Ok(()),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Process whatever idle response lines are already buffered. Never
    /// waits for the network.
    pub async fn resume_idle(&mut self) -> Result<IdleProgress> {
        self.ensure_usable()?;
        if !self.idle.is_waiting() {
            return Err(MpdError::usage("not in idle mode"));
        }

        match self.drain_idle()? {
            None => Ok(IdleProgress::Pending),
            Some(IdleOutcome::Changed(flags)) => {
                debug!("Idle notification: {:?}", flags.names());
                if let Some(callback) = self.idle.leave() {
                    callback(flags);
                }
                self.dispatch_pending().await?;
                Ok(IdleProgress::Notified(flags))
            }
            Some(IdleOutcome::Rejected(ack)) => {
                self.idle.leave();
                self.dispatch_pending().await?;
                Err(MpdError::Ack(ack))
            }
        }
    }

    /// Enter idle mode and wait for the next notification.
    ///
    /// Returns the reported subsystems after `callback` has run with them,
    /// or `None` when the wait was ended through
    /// [`idle_canceller`](Self::idle_canceller).
    pub async fn idle<F>(&mut self, callback: F) -> Result<Option<IdleFlags>>
    where
        F: FnOnce(IdleFlags) + Send + 'static,
    {
        self.start_idle(callback).await?;
        let canceller = self.idle.canceller.clone();

        loop {
            if let IdleProgress::Notified(flags) = self.resume_idle().await? {
                return Ok(Some(flags));
            }

            let filled = tokio::select! {
                result = self.reader.fill(&mut self.stream, None) => Some(result),
                _ = canceller.cancelled() => None,
            };
            match filled {
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(self.fail(e)),
                None => {
                    debug!("Idle wait cancelled");
                    self.stop_idle().await?;
                    return Ok(None);
                }
            }
        }
    }

    /// Leave idle mode without a notification: send `noidle`, drain and
    /// discard the server's answer, then write any parked command. The
    /// callback is not invoked. No-op when not idle.
    pub async fn stop_idle(&mut self) -> Result<()> {
        self.ensure_usable()?;
        if !self.idle.is_waiting() {
            return Ok(());
        }

        let outcome = match self.drain_idle()? {
            // The notification completed before we asked to stop; the server
            // would ignore a noidle now.
            Some(outcome) => outcome,
            None => {
                self.write_raw("noidle\n").await?;
                loop {
                    let step = self.next_step().await?;
                    if let Some(outcome) = self.idle_step(step) {
                        break outcome;
                    }
                }
            }
        };

        if let IdleOutcome::Changed(flags) = &outcome {
            if !flags.is_empty() {
                debug!("Discarding idle changes {:?} after cancel", flags.names());
            }
        }
        self.idle.leave();
        self.dispatch_pending().await?;

        match outcome {
            IdleOutcome::Rejected(ack) => Err(MpdError::Ack(ack)),
            IdleOutcome::Changed(_) => Ok(()),
        }
    }

    fn drain_idle(&mut self) -> Result<Option<IdleOutcome>> {
        while let Some(line) = self.reader.buffered_line() {
            let step = self.accept_line(&line)?;
            if let Some(outcome) = self.idle_step(step) {
                return Ok(Some(outcome));
            }
        }
        Ok(None)
    }

    fn idle_step(&mut self, step: Step) -> Option<IdleOutcome> {
        match step {
            Step::Pair(pair) if pair.is("changed") => {
                self.idle.accumulated |= IdleFlags::from_changed(&pair.value);
                None
            }
            Step::Pair(pair) => {
                debug!("Ignoring '{}' in idle response", pair.key);
                None
            }
            Step::ListOk => None,
            Step::Done => Some(match self.pipeline.pending_ack.take() {
                Some(ack) => IdleOutcome::Rejected(ack),
                None => IdleOutcome::Changed(self.idle.accumulated),
            }),
        }
    }

    async fn dispatch_pending(&mut self) -> Result<()> {
        if let Some(line) = self.idle.pending.take() {
            self.dispatch(&line).await?;
        }
        Ok(())
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Shut the stream down. Valid in any state, including after a fatal
    /// error.
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!("Error shutting down MPD stream: {}", e);
        }
        info!("MPD connection closed");
    }
}
