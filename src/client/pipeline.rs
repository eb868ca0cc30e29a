//! Command pipeline state: plain dispatch, command lists, and bookkeeping of
//! the one outstanding response.
//!
//! This type does no I/O. [`super::Connection`] feeds it every reply it reads
//! and asks it whether a new command may be written.

use crate::error::{MpdError, Result};
use crate::protocol::{AckError, Pair, Reply};

/// Which command-list envelope, if any, is being collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMode {
    None,
    /// `command_list_begin`: one `OK`/`ACK` for the whole batch.
    List,
    /// `command_list_ok_begin`: one `list_OK` per sub-command, then `OK`.
    ListOk,
}

/// Result of [`super::Connection::advance_list_ok`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOkStep {
    /// Moved past one `list_OK`; more sub-command results follow.
    Advanced,
    /// The terminal `OK` or `ACK` was reached; call `finish()` next.
    Finished,
}

/// What reading one more reply produced.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Step {
    Pair(Pair),
    /// A sub-command boundary inside a list-ok response.
    ListOk,
    /// The response is fully consumed.
    Done,
}

#[derive(Debug)]
pub(crate) struct Pipeline {
    mode: ListMode,
    queued: String,
    queued_count: usize,
    list_oks_expected: usize,
    list_oks_seen: usize,
    /// No response is outstanding.
    done_processing: bool,
    /// A `list_OK` was read and not yet moved past with `advance_list_ok`.
    at_list_ok: bool,
    /// The outstanding response answers a command list.
    list_response: bool,
    /// One-pair lookahead used by record assembly.
    pub(crate) peeked: Option<Pair>,
    /// ACK terminator read but not yet reported to the caller.
    pub(crate) pending_ack: Option<AckError>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            mode: ListMode::None,
            queued: String::new(),
            queued_count: 0,
            list_oks_expected: 0,
            list_oks_seen: 0,
            done_processing: true,
            at_list_ok: false,
            list_response: false,
            peeked: None,
            pending_ack: None,
        }
    }
}

impl Pipeline {
    pub fn mode(&self) -> ListMode {
        self.mode
    }

    pub fn done_processing(&self) -> bool {
        self.done_processing && self.peeked.is_none()
    }

    pub fn at_list_ok(&self) -> bool {
        self.at_list_ok
    }

    pub fn clear_list_ok(&mut self) {
        self.at_list_ok = false;
    }

    /// Fail unless a plain command may be written right now.
    pub fn ensure_ready(&self) -> Result<()> {
        if !self.done_processing() {
            return Err(MpdError::usage("not done processing current command"));
        }
        Ok(())
    }

    pub fn begin_list(&mut self, ok: bool) -> Result<()> {
        if self.mode != ListMode::None {
            return Err(MpdError::usage("already in command list mode"));
        }
        self.ensure_ready()?;
        self.mode = if ok { ListMode::ListOk } else { ListMode::List };
        self.queued.clear();
        self.queued_count = 0;
        Ok(())
    }

    /// Append one command to the open list.
    pub fn queue(&mut self, line: &str) {
        self.queued.push_str(line);
        self.queued.push('\n');
        self.queued_count += 1;
    }

    /// Close the open list and return the full envelope to write. The
    /// pipeline then expects the list's response.
    pub fn end_list(&mut self) -> Result<String> {
        let begin = match self.mode {
            ListMode::None => return Err(MpdError::usage("not in command list mode")),
            ListMode::List => "command_list_begin\n",
            ListMode::ListOk => "command_list_ok_begin\n",
        };

        let mut envelope = String::with_capacity(self.queued.len() + 48);
        envelope.push_str(begin);
        envelope.push_str(&self.queued);
        envelope.push_str("command_list_end\n");

        self.list_oks_expected = if self.mode == ListMode::ListOk {
            self.queued_count
        } else {
            0
        };
        self.list_oks_seen = 0;
        self.mode = ListMode::None;
        self.queued.clear();
        self.queued_count = 0;
        self.dispatched();
        self.list_response = true;
        Ok(envelope)
    }

    /// A command (or list envelope) was written; its response is outstanding.
    pub fn dispatched(&mut self) {
        self.done_processing = false;
        self.at_list_ok = false;
        self.list_response = false;
        self.peeked = None;
        self.pending_ack = None;
    }

    /// Account for one reply of the outstanding response.
    pub fn accept(&mut self, reply: Reply) -> Result<Step> {
        match reply {
            Reply::Pair(pair) => Ok(Step::Pair(pair)),
            Reply::ListOk => {
                if self.list_oks_seen >= self.list_oks_expected {
                    return Err(MpdError::Protocol("got an unexpected list_OK".into()));
                }
                self.list_oks_seen += 1;
                self.at_list_ok = true;
                Ok(Step::ListOk)
            }
            Reply::Ok => {
                if self.list_oks_seen < self.list_oks_expected {
                    return Err(MpdError::Protocol(format!(
                        "expected {} more list_OK's",
                        self.list_oks_expected - self.list_oks_seen
                    )));
                }
                self.response_done();
                Ok(Step::Done)
            }
            Reply::Ack(mut ack) => {
                if !self.list_response {
                    ack.position = None;
                }
                self.pending_ack = Some(ack);
                self.response_done();
                Ok(Step::Done)
            }
        }
    }

    fn response_done(&mut self) {
        self.done_processing = true;
        self.at_list_ok = false;
        self.list_response = false;
        self.list_oks_expected = 0;
        self.list_oks_seen = 0;
    }
}
