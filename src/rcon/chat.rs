//! Buffering of the chat messages a server pushes onto the RCON connection.

use bytes::Bytes;
use std::collections::BTreeMap;

const STEAM_ID_TAG: &str = "[SteamID:";

/// Chat messages recieved since the last flush, in arrival order.
///
/// Messages only arrive while the client is reading from the socket, i.e.
/// during `authenticate`, `execute` or `listen`. There is no background
/// reader, so chat is never delivered in real time.
#[derive(Debug, Default)]
pub struct ChatBuffer {
    messages: Vec<String>,
}

impl ChatBuffer {
    /// Store the body of a chat packet.
    pub fn push(&mut self, body: &Bytes) {
        let text = String::from_utf8_lossy(body);
        self.messages.push(text.trim_end_matches('\0').to_string());
    }

    /// Drain the buffer, returning everything recieved since the last flush.
    pub fn flush(&mut self) -> Vec<String> {
        std::mem::take(&mut self.messages)
    }

    /// Number of buffered messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether no messages are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Extract the player id from a chat line such as
/// `[ChatAll] [SteamID:76561198000000000] Alice : hi`.
#[must_use]
pub fn steam_id(message: &str) -> Option<&str> {
    let start = message.find(STEAM_ID_TAG)? + STEAM_ID_TAG.len();
    let rest = &message[start..];
    let end = rest.find(']')?;
    let id = &rest[..end];

    if !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Some(id)
    } else {
        None
    }
}

/// Group chat lines by the Steam id of their sender, keeping each player's
/// messages in chronological order. Lines without a Steam id are skipped.
#[must_use]
pub fn group_by_steam_id(messages: &[String]) -> BTreeMap<String, Vec<String>> {
    let mut players: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for message in messages {
        let text = message.trim_matches('\0');
        if let Some(id) = steam_id(text) {
            players.entry(id.to_string()).or_default().push(text.to_string());
        }
    }

    players
}

#[cfg(test)]
mod tests {
    use super::{group_by_steam_id, steam_id, ChatBuffer};
    use bytes::Bytes;

    #[test]
    fn test_flush_drains_in_order() {
        let mut buffer = ChatBuffer::default();
        buffer.push(&Bytes::from_static(b"first"));
        buffer.push(&Bytes::from_static(b"second\0"));
        buffer.push(&Bytes::from_static(b"first"));

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.flush(), vec!["first", "second", "first"]);
        assert!(buffer.is_empty());
        assert!(buffer.flush().is_empty());
    }

    #[test]
    fn test_steam_id() {
        assert_eq!(
            steam_id("[ChatAll] [SteamID:76561198012345678] Alice : hi"),
            Some("76561198012345678")
        );
        assert_eq!(steam_id("[ChatAll] Alice : hi"), None);
        assert_eq!(steam_id("[SteamID:] x"), None);
        assert_eq!(steam_id("[SteamID:123"), None);
    }

    #[test]
    fn test_group_by_steam_id() {
        let messages = vec![
            "[ChatAll] [SteamID:111] Alice : hi".to_string(),
            "[ChatTeam] [SteamID:222] Bob : yo".to_string(),
            "server notice".to_string(),
            "[ChatAll] [SteamID:111] Alice : gg\0".to_string(),
        ];

        let grouped = group_by_steam_id(&messages);

        assert_eq!(grouped.len(), 2);
        assert_eq!(
            grouped["111"],
            vec![
                "[ChatAll] [SteamID:111] Alice : hi",
                "[ChatAll] [SteamID:111] Alice : gg"
            ]
        );
        assert_eq!(grouped["222"], vec!["[ChatTeam] [SteamID:222] Bob : yo"]);
    }
}
