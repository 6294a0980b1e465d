use crate::error::HeosError;
use crate::types::PlayerId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Playback state of a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayState {
    Play,
    Pause,
    Stop,
}

impl PlayState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayState::Play => "play",
            PlayState::Pause => "pause",
            PlayState::Stop => "stop",
        }
    }
}

impl fmt::Display for PlayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlayState {
    type Err = HeosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "play" => Ok(PlayState::Play),
            "pause" => Ok(PlayState::Pause),
            "stop" => Ok(PlayState::Stop),
            other => Err(HeosError::Validation(format!(
                "not an accepted play state: {:?}",
                other
            ))),
        }
    }
}

/// Last known state of the device, as confirmed by replies
///
/// `None` means unknown. Values are only written after a matching reply
/// was parsed successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Implicit target of player-scoped commands
    pub player_id: Option<PlayerId>,
    /// Volume level, 0 to 100
    pub volume: Option<u8>,
    pub muted: Option<bool>,
    pub play_state: Option<PlayState>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything, including the selected player
    pub fn invalidate(&mut self) {
        *self = Self::default();
    }
}

/// Clamp a requested volume into the accepted 0..=100 range
pub fn clamp_volume(level: i32) -> u8 {
    level.clamp(0, 100) as u8
}

/// Parse a device volume value
pub(crate) fn parse_volume(value: &str) -> Option<u8> {
    value.trim().parse::<i32>().ok().map(clamp_volume)
}

/// Parse a device on/off value
pub(crate) fn parse_on_off(value: &str) -> Option<bool> {
    match value {
        "on" => Some(true),
        "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(150, 100)]
    #[case(-5, 0)]
    #[case(0, 0)]
    #[case(100, 100)]
    #[case(42, 42)]
    fn test_clamp_volume(#[case] input: i32, #[case] expected: u8) {
        assert_eq!(clamp_volume(input), expected);
    }

    #[rstest]
    #[case("play", PlayState::Play)]
    #[case("pause", PlayState::Pause)]
    #[case("stop", PlayState::Stop)]
    fn test_play_state_round_trip(#[case] text: &str, #[case] state: PlayState) {
        assert_eq!(text.parse::<PlayState>().unwrap(), state);
        assert_eq!(state.to_string(), text);
    }

    #[rstest]
    #[case("")]
    #[case("PLAY")]
    #[case("rewind")]
    fn test_play_state_rejects_unknown(#[case] text: &str) {
        assert!(matches!(text.parse::<PlayState>(), Err(HeosError::Validation(_))));
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_volume("42"), Some(42));
        assert_eq!(parse_volume("250"), Some(100));
        assert_eq!(parse_volume("loud"), None);
        assert_eq!(parse_on_off("on"), Some(true));
        assert_eq!(parse_on_off("off"), Some(false));
        assert_eq!(parse_on_off("maybe"), None);
    }

    #[test]
    fn test_invalidate() {
        let mut state = SessionState {
            player_id: Some(1),
            volume: Some(10),
            muted: Some(false),
            play_state: Some(PlayState::Play),
        };
        state.invalidate();
        assert_eq!(state, SessionState::new());
    }
}
