//! Metadata tag types used by listings and search constraints.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagType {
    Artist,
    Album,
    Title,
    Track,
    Name,
    Genre,
    Date,
    Composer,
    Performer,
    Comment,
    Disc,
    Filename,
    /// Wildcard: matches any tag in a search constraint.
    Any,
}

impl TagType {
    pub const ALL: [TagType; 13] = [
        TagType::Artist,
        TagType::Album,
        TagType::Title,
        TagType::Track,
        TagType::Name,
        TagType::Genre,
        TagType::Date,
        TagType::Composer,
        TagType::Performer,
        TagType::Comment,
        TagType::Disc,
        TagType::Filename,
        TagType::Any,
    ];

    /// Key as it appears in response pairs (`Artist: ...`).
    pub fn key(self) -> &'static str {
        match self {
            TagType::Artist => "Artist",
            TagType::Album => "Album",
            TagType::Title => "Title",
            TagType::Track => "Track",
            TagType::Name => "Name",
            TagType::Genre => "Genre",
            TagType::Date => "Date",
            TagType::Composer => "Composer",
            TagType::Performer => "Performer",
            TagType::Comment => "Comment",
            TagType::Disc => "Disc",
            TagType::Filename => "filename",
            TagType::Any => "any",
        }
    }

    /// Name used in command arguments: the key with a lowercase first letter.
    pub fn command_name(self) -> String {
        let key = self.key();
        let mut chars = key.chars();
        match chars.next() {
            Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
            None => String::new(),
        }
    }
}

impl fmt::Display for TagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for TagType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TagType::ALL
            .iter()
            .copied()
            .find(|tag| tag.key().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown tag type '{}'", s))
    }
}
