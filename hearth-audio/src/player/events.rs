//! Player IPC messages
//!
//! The player speaks newline-delimited JSON over a local socket. Requests carry
//! a `request_id`; the matching reply echoes it with an `error` field
//! (`"success"` on success). Unsolicited lines carry an `event` name instead.

use serde_json::{json, Value};

/// Observed property ids; replies to `observe_property` echo these
pub const OBS_TIME_POS: u64 = 1;
pub const OBS_DURATION: u64 = 2;
pub const OBS_PAUSE: u64 = 3;

/// Properties the session subscribes to on every fresh connection
pub const OBSERVED_PROPERTIES: [(u64, &str); 3] = [
    (OBS_TIME_POS, "time-pos"),
    (OBS_DURATION, "duration"),
    (OBS_PAUSE, "pause"),
];

/// Why the player stopped playing a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Reached the end of the file
    Eof,
    /// Stopped by a `stop` command or replaced by another `loadfile`
    Stop,
    /// Player is quitting
    Quit,
    /// File could not be opened or decoded
    Error,
    /// File was a playlist/redirect that expanded into other entries
    Redirect,
    Unknown,
}

impl EndReason {
    fn parse(reason: &str) -> Self {
        match reason {
            "eof" => EndReason::Eof,
            "stop" => EndReason::Stop,
            "quit" => EndReason::Quit,
            "error" => EndReason::Error,
            "redirect" => EndReason::Redirect,
            _ => EndReason::Unknown,
        }
    }
}

/// Unsolicited player event
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    FileLoaded,
    EndFile {
        reason: EndReason,
        file_error: Option<String>,
    },
    TimePos(f64),
    Duration(f64),
    Pause(bool),
    /// Nothing loaded
    Idle,
    /// The IPC connection closed; emitted by the session, not the player
    Disconnected,
}

/// A line read from the IPC socket
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Reply {
        request_id: u64,
        error: String,
        data: Value,
    },
    Event(PlayerEvent),
    /// Well-formed but irrelevant (other events, null property values)
    Ignored,
}

/// Encode a request line, newline included
pub fn encode_request(request_id: u64, command: &[Value]) -> String {
    let mut line = json!({ "command": command, "request_id": request_id }).to_string();
    line.push('\n');
    line
}

/// Classify one received line
pub fn parse_line(line: &str) -> Option<Incoming> {
    let value: Value = serde_json::from_str(line.trim()).ok()?;

    if let Some(event) = value.get("event").and_then(Value::as_str) {
        return Some(match parse_event(event, &value) {
            Some(event) => Incoming::Event(event),
            None => Incoming::Ignored,
        });
    }

    let request_id = value.get("request_id").and_then(Value::as_u64)?;
    Some(Incoming::Reply {
        request_id,
        error: value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("success")
            .to_string(),
        data: value.get("data").cloned().unwrap_or(Value::Null),
    })
}

fn parse_event(name: &str, value: &Value) -> Option<PlayerEvent> {
    match name {
        "file-loaded" => Some(PlayerEvent::FileLoaded),
        "end-file" => Some(PlayerEvent::EndFile {
            reason: EndReason::parse(value.get("reason").and_then(Value::as_str).unwrap_or("")),
            file_error: value
                .get("file_error")
                .and_then(Value::as_str)
                .map(str::to_string),
        }),
        "idle" => Some(PlayerEvent::Idle),
        "property-change" => {
            let data = value.get("data")?;
            match value.get("name").and_then(Value::as_str)? {
                "time-pos" => data.as_f64().map(PlayerEvent::TimePos),
                "duration" => data.as_f64().map(PlayerEvent::Duration),
                "pause" => data.as_bool().map(PlayerEvent::Pause),
                _ => None,
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_request() {
        let line = encode_request(7, &[json!("loadfile"), json!("/music/a.mp3"), json!("replace")]);
        assert!(line.ends_with('\n'));
        let value: Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(value["request_id"], 7);
        assert_eq!(value["command"][0], "loadfile");
    }

    #[test]
    fn test_parse_reply() {
        let incoming = parse_line(r#"{"data":null,"request_id":3,"error":"success"}"#).unwrap();
        assert_eq!(
            incoming,
            Incoming::Reply {
                request_id: 3,
                error: "success".to_string(),
                data: Value::Null
            }
        );
    }

    #[test]
    fn test_parse_end_file_reasons() {
        let incoming = parse_line(r#"{"event":"end-file","reason":"eof","playlist_entry_id":1}"#);
        assert_eq!(
            incoming,
            Some(Incoming::Event(PlayerEvent::EndFile {
                reason: EndReason::Eof,
                file_error: None
            }))
        );

        let incoming = parse_line(
            r#"{"event":"end-file","reason":"error","file_error":"loading failed"}"#,
        );
        assert_eq!(
            incoming,
            Some(Incoming::Event(PlayerEvent::EndFile {
                reason: EndReason::Error,
                file_error: Some("loading failed".to_string())
            }))
        );
    }

    #[test]
    fn test_parse_property_changes() {
        assert_eq!(
            parse_line(r#"{"event":"property-change","id":1,"name":"time-pos","data":12.5}"#),
            Some(Incoming::Event(PlayerEvent::TimePos(12.5)))
        );
        assert_eq!(
            parse_line(r#"{"event":"property-change","id":3,"name":"pause","data":true}"#),
            Some(Incoming::Event(PlayerEvent::Pause(true)))
        );
        // Property reported as unavailable
        assert_eq!(
            parse_line(r#"{"event":"property-change","id":2,"name":"duration"}"#),
            Some(Incoming::Ignored)
        );
    }

    #[test]
    fn test_garbage_line_is_none() {
        assert_eq!(parse_line("not json"), None);
        assert_eq!(parse_line(r#"{"something":"else"}"#), None);
    }
}
