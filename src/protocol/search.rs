//! Incremental construction of `search`/`find`/`list`/`count` commands.

use crate::error::{MpdError, Result};
use crate::protocol::command::{quote, Command};
use crate::protocol::tag::TagType;

/// What a search returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    /// Songs from the database (`search` / `find`).
    Song,
    /// Songs from the queue (`playlistsearch` / `playlistfind`).
    Playlist,
    /// Distinct values of one tag (`list <tag>`).
    Field(TagType),
    /// Song count and total play time of the matches (`count`).
    Stats,
}

/// A search with its accumulated constraints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    kind: SearchKind,
    exact: bool,
    constraints: Vec<(TagType, String)>,
}

impl SearchRequest {
    /// `exact` selects exact matching for song and playlist searches; field
    /// listings and stats always match exactly.
    pub fn new(kind: SearchKind, exact: bool) -> Result<Self> {
        if kind == SearchKind::Field(TagType::Any) {
            return Err(MpdError::usage("cannot list values of the 'any' tag"));
        }
        Ok(Self {
            kind,
            exact,
            constraints: Vec::new(),
        })
    }

    pub fn add_constraint(&mut self, tag: TagType, value: impl Into<String>) {
        self.constraints.push((tag, value.into()));
    }

    fn verb(&self) -> String {
        match (self.kind, self.exact) {
            (SearchKind::Song, true) => "find".to_string(),
            (SearchKind::Song, false) => "search".to_string(),
            (SearchKind::Playlist, true) => "playlistfind".to_string(),
            (SearchKind::Playlist, false) => "playlistsearch".to_string(),
            (SearchKind::Field(tag), _) => format!("list {}", tag.command_name()),
            (SearchKind::Stats, _) => "count".to_string(),
        }
    }

    /// Render as one command: the verb followed by `<tag> "<value>"` per
    /// constraint, in insertion order.
    pub fn to_command(&self) -> Command {
        let mut line = self.verb();
        for (tag, value) in &self.constraints {
            line.push(' ');
            line.push_str(&tag.command_name());
            line.push(' ');
            line.push_str(&quote(value));
        }
        Command::from(line.as_str())
    }
}

/// Start/add/commit state machine around a [`SearchRequest`].
#[derive(Debug, Default)]
pub struct SearchBuilder {
    current: Option<SearchRequest>,
}

impl SearchBuilder {
    pub fn in_progress(&self) -> bool {
        self.current.is_some()
    }

    pub fn start(&mut self, kind: SearchKind, exact: bool) -> Result<()> {
        if self.current.is_some() {
            return Err(MpdError::usage("search already in progress"));
        }
        self.current = Some(SearchRequest::new(kind, exact)?);
        Ok(())
    }

    pub fn add_constraint(&mut self, tag: TagType, value: impl Into<String>) -> Result<()> {
        match self.current.as_mut() {
            Some(request) => {
                request.add_constraint(tag, value);
                Ok(())
            }
            None => Err(MpdError::usage("no search in progress")),
        }
    }

    /// Render the search built so far. The request stays in place until
    /// [`abandon`](Self::abandon) is called.
    pub fn command(&self) -> Result<Command> {
        self.current
            .as_ref()
            .map(SearchRequest::to_command)
            .ok_or_else(|| MpdError::usage("no search in progress"))
    }

    /// Drop an in-progress search without sending it.
    pub fn abandon(&mut self) {
        self.current = None;
    }
}
