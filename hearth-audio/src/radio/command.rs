//! Radio client commands
//!
//! The radio client reads single-character codes from its control pipe. The
//! rest of the service only ever sees [`RadioCommand`]; the wire codes live
//! here and nowhere else.

use serde::{Deserialize, Serialize};

/// Command understood by the radio client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum RadioCommand {
    /// Toggle play/pause
    TogglePause,
    /// Resume playback
    Play,
    /// Pause playback
    Pause,
    /// Skip to the next song
    Next,
    /// Rate the current song up
    Love,
    /// Rate the current song down (also skips)
    Ban,
    /// Put the current song on the shelf for a month
    Tired,
    /// Raise the client's own volume one step
    VolumeUp,
    /// Lower the client's own volume one step
    VolumeDown,
    /// Switch to the station at `index` in the client's station list
    SelectStation { index: u32 },
    /// Quit the client
    Quit,
}

impl RadioCommand {
    /// Encode as a control-pipe line (code plus newline)
    pub fn to_wire(&self) -> String {
        match self {
            RadioCommand::TogglePause => "p\n".to_string(),
            RadioCommand::Play => "P\n".to_string(),
            RadioCommand::Pause => "S\n".to_string(),
            RadioCommand::Next => "n\n".to_string(),
            RadioCommand::Love => "+\n".to_string(),
            RadioCommand::Ban => "-\n".to_string(),
            RadioCommand::Tired => "t\n".to_string(),
            RadioCommand::VolumeUp => ")\n".to_string(),
            RadioCommand::VolumeDown => "(\n".to_string(),
            RadioCommand::SelectStation { index } => format!("s{}\n", index),
            RadioCommand::Quit => "q\n".to_string(),
        }
    }

    /// Playing belief after the command was delivered, if the command changes it
    pub fn playing_after(&self, playing_before: bool) -> Option<bool> {
        match self {
            RadioCommand::TogglePause => Some(!playing_before),
            RadioCommand::Play | RadioCommand::SelectStation { .. } | RadioCommand::Next => {
                Some(true)
            }
            RadioCommand::Pause | RadioCommand::Quit => Some(false),
            _ => None,
        }
    }
}

impl std::fmt::Display for RadioCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RadioCommand::SelectStation { index } => write!(f, "select_station({})", index),
            other => write!(f, "{:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_codes() {
        assert_eq!(RadioCommand::TogglePause.to_wire(), "p\n");
        assert_eq!(RadioCommand::Next.to_wire(), "n\n");
        assert_eq!(RadioCommand::Love.to_wire(), "+\n");
        assert_eq!(RadioCommand::Quit.to_wire(), "q\n");
        assert_eq!(RadioCommand::SelectStation { index: 12 }.to_wire(), "s12\n");
    }

    #[test]
    fn test_every_command_is_one_line() {
        let commands = [
            RadioCommand::TogglePause,
            RadioCommand::Play,
            RadioCommand::Pause,
            RadioCommand::Next,
            RadioCommand::Love,
            RadioCommand::Ban,
            RadioCommand::Tired,
            RadioCommand::VolumeUp,
            RadioCommand::VolumeDown,
            RadioCommand::SelectStation { index: 3 },
            RadioCommand::Quit,
        ];
        for command in commands {
            let wire = command.to_wire();
            assert!(wire.ends_with('\n'));
            assert_eq!(wire.matches('\n').count(), 1, "{:?}", command);
            assert!(wire.is_ascii());
        }
    }

    #[test]
    fn test_json_form_is_tagged() {
        let command: RadioCommand =
            serde_json::from_str(r#"{"command":"select_station","index":4}"#).unwrap();
        assert_eq!(command, RadioCommand::SelectStation { index: 4 });

        let command: RadioCommand = serde_json::from_str(r#"{"command":"next"}"#).unwrap();
        assert_eq!(command, RadioCommand::Next);
    }

    #[test]
    fn test_playing_belief_transitions() {
        assert_eq!(RadioCommand::TogglePause.playing_after(true), Some(false));
        assert_eq!(RadioCommand::TogglePause.playing_after(false), Some(true));
        assert_eq!(RadioCommand::Pause.playing_after(true), Some(false));
        assert_eq!(RadioCommand::Love.playing_after(true), None);
    }
}
