//! Idle subsystem flags and their wire names.

use bitflags::bitflags;

bitflags! {
    /// Subsystems reported by `changed:` lines of an idle notification.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct IdleFlags: u32 {
        /// The song database has been updated.
        const DATABASE = 0x1;
        /// A stored playlist was modified, created, deleted or renamed.
        const STORED_PLAYLIST = 0x2;
        /// The queue (current playlist) has been modified.
        const PLAYLIST = 0x4;
        /// Player state changed: play, stop, pause, seek, ...
        const PLAYER = 0x8;
        /// The volume changed.
        const MIXER = 0x10;
        /// An output was enabled or disabled.
        const OUTPUT = 0x20;
        /// Options changed: crossfade, random, repeat, ...
        const OPTIONS = 0x40;
    }
}

const NAMES: [(IdleFlags, &str); 7] = [
    (IdleFlags::DATABASE, "database"),
    (IdleFlags::STORED_PLAYLIST, "stored_playlist"),
    (IdleFlags::PLAYLIST, "playlist"),
    (IdleFlags::PLAYER, "player"),
    (IdleFlags::MIXER, "mixer"),
    (IdleFlags::OUTPUT, "output"),
    (IdleFlags::OPTIONS, "options"),
];

impl IdleFlags {
    /// Look up a single subsystem by its wire name.
    pub fn from_subsystem(name: &str) -> Option<Self> {
        NAMES
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(flag, _)| *flag)
    }

    /// Decode the value of a `changed:` line, which may hold several
    /// space-separated subsystem names. Unknown names are skipped.
    pub fn from_changed(value: &str) -> Self {
        value
            .split_ascii_whitespace()
            .fold(IdleFlags::empty(), |flags, token| match Self::from_subsystem(token) {
                Some(flag) => flags | flag,
                None => {
                    tracing::debug!("ignoring unknown idle subsystem '{}'", token);
                    flags
                }
            })
    }

    /// Wire names of the set subsystems, in protocol order.
    pub fn names(self) -> Vec<&'static str> {
        NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_single_and_multiple_tokens() {
        assert_eq!(IdleFlags::from_changed("player"), IdleFlags::PLAYER);
        assert_eq!(
            IdleFlags::from_changed("player mixer"),
            IdleFlags::PLAYER | IdleFlags::MIXER
        );
    }

    #[test]
    fn unknown_names_are_skipped() {
        assert_eq!(
            IdleFlags::from_changed("sticker options"),
            IdleFlags::OPTIONS
        );
        assert_eq!(IdleFlags::from_subsystem("partition"), None);
    }

    #[test]
    fn names_follow_protocol_order() {
        let flags = IdleFlags::OPTIONS | IdleFlags::DATABASE | IdleFlags::STORED_PLAYLIST;
        assert_eq!(flags.names(), vec!["database", "stored_playlist", "options"]);
    }
}
