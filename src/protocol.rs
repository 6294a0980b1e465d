use bytes::{Buf, BytesMut};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use crate::error::{HeosError, Result};
use crate::types::PlayerId;

/// URL scheme prefixed to every command line
pub const COMMAND_SCHEME: &str = "heos://";

/// Line terminator for command frames
pub const LINE_END: &str = "\r\n";

/// Parameter key carrying the player identifier
pub const PLAYER_ID_KEY: &str = "pid";

const UNDER_PROCESS: &str = "command under process";

/// Flat key/value mapping parsed from a message string
pub type MessageMap = HashMap<String, String>;

/// Value of a command parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Text(String),
    Number(i64),
    /// Filled from the session's current player when the command is encoded
    Unset,
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Text(s) => f.write_str(s),
            ParamValue::Number(n) => write!(f, "{}", n),
            ParamValue::Unset => Ok(()),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Number(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Number(value.into())
    }
}

impl From<u8> for ParamValue {
    fn from(value: u8) -> Self {
        ParamValue::Number(value.into())
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Number(value.into())
    }
}

/// A command path plus its ordered parameters
///
/// ```
/// use heos::Command;
///
/// let cmd = Command::new("player/get_volume").param("pid", 123);
/// assert_eq!(cmd.encode(None).unwrap(), "heos://player/get_volume?pid=123\r\n");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    path: String,
    params: Vec<(String, ParamValue)>,
}

impl Command {
    /// Create a command with no parameters, e.g. `player/get_players`
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            params: Vec::new(),
        }
    }

    /// Append a parameter, keeping insertion order
    pub fn param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Append the player identifier, left unset when `pid` is `None`
    pub fn player(mut self, pid: Option<PlayerId>) -> Self {
        let value = pid.map(ParamValue::Number).unwrap_or(ParamValue::Unset);
        self.params.push((PLAYER_ID_KEY.to_string(), value));
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn params(&self) -> &[(String, ParamValue)] {
        &self.params
    }

    /// True when the player identifier must come from the session
    pub fn needs_player(&self) -> bool {
        self.params
            .iter()
            .any(|(k, v)| k == PLAYER_ID_KEY && *v == ParamValue::Unset)
    }

    /// Parameters with any unset player identifier replaced by `default_pid`
    ///
    /// Returns a new parameter list; `self` is left as it was.
    pub fn resolve_params(&self, default_pid: Option<PlayerId>) -> Result<Vec<(String, ParamValue)>> {
        self.params
            .iter()
            .map(|(key, value)| match value {
                ParamValue::Unset if key == PLAYER_ID_KEY => default_pid
                    .map(|pid| (key.clone(), ParamValue::Number(pid)))
                    .ok_or(HeosError::NoPlayer),
                ParamValue::Unset => Err(HeosError::Validation(format!(
                    "parameter {} has no value",
                    key
                ))),
                _ => Ok((key.clone(), value.clone())),
            })
            .collect()
    }

    /// Encode the command as a wire frame, terminated by CRLF
    pub fn encode(&self, default_pid: Option<PlayerId>) -> Result<String> {
        let params = self.resolve_params(default_pid)?;

        let mut line = String::with_capacity(COMMAND_SCHEME.len() + self.path.len() + 32);
        line.push_str(COMMAND_SCHEME);
        line.push_str(&self.path);

        if !params.is_empty() {
            let query = params
                .iter()
                .map(|(key, value)| format!("{}={}", key, escape_value(&value.to_string())))
                .collect::<Vec<_>>()
                .join("&");
            line.push('?');
            line.push_str(&query);
        }

        line.push_str(LINE_END);
        Ok(line)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// `result` discriminator of a wire message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CommandResult {
    Success,
    Fail,
}

/// The `heos` object of a wire message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Header {
    pub command: String,
    pub result: CommandResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// One JSON document received from the device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireMessage {
    pub heos: Header,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl WireMessage {
    pub fn command(&self) -> &str {
        &self.heos.command
    }

    /// Unsolicited change events use the `event/` namespace
    pub fn is_event(&self) -> bool {
        self.heos.command.starts_with("event/")
    }

    /// Acknowledgement sent before the final reply of a slow command
    pub fn is_interim(&self) -> bool {
        self.heos.result == CommandResult::Success
            && self
                .heos
                .message
                .as_deref()
                .is_some_and(|m| m.starts_with(UNDER_PROCESS))
    }

    /// Normalize into a reply, or the device's failure
    pub fn into_reply(self) -> Result<Reply> {
        match self.heos.result {
            CommandResult::Fail => Err(HeosError::CommandFailed {
                command: self.heos.command,
                message: self.heos.message.unwrap_or_default(),
            }),
            CommandResult::Success => match self.payload {
                Some(payload) => Ok(Reply::Payload(payload)),
                None => Ok(Reply::Mapping(
                    self.heos
                        .message
                        .as_deref()
                        .map(parse_message)
                        .unwrap_or_default(),
                )),
            },
        }
    }
}

/// Result of decoding one chunk of text
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Message(WireMessage),
    /// Not JSON, or JSON without the `heos.command`/`heos.result` pair
    Invalid(String),
}

/// Decode one complete chunk into a wire message
pub fn decode(data: &[u8]) -> Decoded {
    match serde_json::from_slice::<Value>(data) {
        Ok(value) => decode_value(value),
        Err(e) => Decoded::Invalid(e.to_string()),
    }
}

fn decode_value(value: Value) -> Decoded {
    match serde_json::from_value::<WireMessage>(value) {
        Ok(message) => Decoded::Message(message),
        Err(e) => Decoded::Invalid(format!("not a command message: {}", e)),
    }
}

/// Normalized result of a successful command
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Structured `payload` of the message
    Payload(Value),
    /// Key/value pairs parsed from the `message` string
    Mapping(MessageMap),
}

impl Reply {
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Reply::Payload(value) => Some(value),
            Reply::Mapping(_) => None,
        }
    }

    pub fn mapping(&self) -> Option<&MessageMap> {
        match self {
            Reply::Mapping(map) => Some(map),
            Reply::Payload(_) => None,
        }
    }

    /// Look up a key in the mapping
    pub fn get(&self, key: &str) -> Option<&str> {
        self.mapping().and_then(|m| m.get(key)).map(String::as_str)
    }

    /// Deserialize the payload into a typed value
    pub fn into_payload<T: DeserializeOwned>(self) -> Result<T> {
        match self {
            Reply::Payload(value) => Ok(serde_json::from_value(value)?),
            Reply::Mapping(_) => Err(HeosError::Protocol(
                "expected a payload, got a message".to_string(),
            )),
        }
    }
}

/// Parse `k1=v1&k2=v2` into a mapping
///
/// A segment without `=` maps to an empty value.
pub fn parse_message(message: &str) -> MessageMap {
    message
        .split('&')
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.split_once('=') {
            Some((key, value)) => (key.to_string(), unescape_value(value)),
            None => (segment.to_string(), String::new()),
        })
        .collect()
}

fn escape_value(value: &str) -> String {
    if !value.contains(['%', '&', '=']) {
        return value.to_string();
    }
    value
        .replace('%', "%25")
        .replace('&', "%26")
        .replace('=', "%3D")
}

fn unescape_value(value: &str) -> String {
    if !value.contains('%') {
        return value.to_string();
    }
    value
        .replace("%26", "&")
        .replace("%3D", "=")
        .replace("%25", "%")
}

/// Reassembles JSON documents from an unframed byte stream
///
/// The device may deliver several documents in one read or split one
/// document across reads.
#[derive(Debug, Default)]
pub struct MessageBuffer {
    buf: BytesMut,
}

impl MessageBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Number of buffered, not yet decoded bytes
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Take the next complete document, if one is buffered
    pub fn next_message(&mut self) -> Option<Decoded> {
        match self.buf.iter().position(|b| !b.is_ascii_whitespace()) {
            Some(start) => self.buf.advance(start),
            None => {
                self.buf.clear();
                return None;
            }
        }

        let parsed = {
            let mut stream = serde_json::Deserializer::from_slice(&self.buf).into_iter::<Value>();
            match stream.next() {
                Some(Ok(value)) => Ok(Some((value, stream.byte_offset()))),
                Some(Err(e)) if e.is_eof() => Ok(None),
                Some(Err(e)) => Err(e),
                None => Ok(None),
            }
        };

        match parsed {
            Ok(Some((value, end))) => {
                self.buf.advance(end);
                Some(decode_value(value))
            }
            Ok(None) => None,
            Err(e) => {
                self.resync();
                Some(Decoded::Invalid(e.to_string()))
            }
        }
    }

    /// Drop bytes up to and including the next line break
    fn resync(&mut self) {
        match self.buf.iter().position(|&b| b == b'\n') {
            Some(pos) => self.buf.advance(pos + 1),
            None => self.buf.clear(),
        }
    }
}
