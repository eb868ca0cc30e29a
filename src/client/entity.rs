//! Records produced by listing commands (`lsinfo`, `listallinfo`, searches).

use crate::protocol::{Pair, TagType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistFile {
    pub path: String,
}

/// A song record: its URI plus every other pair the server sent for it, in
/// the order received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Song {
    pub file: String,
    pub tags: Vec<Pair>,
}

impl Song {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            tags: Vec::new(),
        }
    }

    /// First value for `key`, ignoring ASCII case.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|pair| pair.is(key))
            .map(|pair| pair.value.as_str())
    }

    pub fn tag(&self, tag: TagType) -> Option<&str> {
        self.get(tag.key())
    }

    /// Duration in whole seconds, from `Time`.
    pub fn time(&self) -> Option<u32> {
        self.get("Time").and_then(|v| v.parse().ok())
    }

    /// Queue position, for songs listed from the queue.
    pub fn pos(&self) -> Option<u32> {
        self.get("Pos").and_then(|v| v.parse().ok())
    }

    /// Queue song id, for songs listed from the queue.
    pub fn id(&self) -> Option<u32> {
        self.get("Id").and_then(|v| v.parse().ok())
    }
}

/// One record of a listing response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfoEntity {
    Directory(Directory),
    Song(Song),
    PlaylistFile(PlaylistFile),
}

impl InfoEntity {
    /// Start a record if `pair` is one of the keys that open one.
    pub(crate) fn start(pair: &Pair) -> Option<Self> {
        if pair.is("file") {
            Some(InfoEntity::Song(Song::new(pair.value.clone())))
        } else if pair.is("directory") {
            Some(InfoEntity::Directory(Directory {
                path: pair.value.clone(),
            }))
        } else if pair.is("playlist") {
            Some(InfoEntity::PlaylistFile(PlaylistFile {
                path: pair.value.clone(),
            }))
        } else {
            None
        }
    }

    pub(crate) fn is_primary_key(pair: &Pair) -> bool {
        pair.is("file") || pair.is("directory") || pair.is("playlist")
    }

    /// Attach a follow-up pair. Only songs carry attributes; anything sent
    /// after a directory or playlist key (e.g. `Last-Modified`) is dropped.
    pub(crate) fn absorb(&mut self, pair: Pair) {
        if let InfoEntity::Song(song) = self {
            song.tags.push(pair);
        }
    }

    pub fn path(&self) -> &str {
        match self {
            InfoEntity::Directory(dir) => &dir.path,
            InfoEntity::Song(song) => &song.file,
            InfoEntity::PlaylistFile(pl) => &pl.path,
        }
    }
}
