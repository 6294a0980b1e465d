use crate::config::{ClientConfig, DiscoveryConfig};
use crate::connection::Connection;
use crate::content::ContentServer;
use crate::correlator::Correlator;
use crate::discovery;
use crate::error::{HeosError, Result};
use crate::protocol::{Command, Reply};
use crate::state::{clamp_volume, parse_on_off, parse_volume, PlayState, SessionState};
use crate::types::{
    DeviceAddress, Group, MusicSource, NowPlayingMedia, Player, PlayerId, QueueItem, SourceId,
};
use bytes::Bytes;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

const DEFAULT_RANGE: &str = "0,29";

/// Client for controlling a HEOS device
///
/// Owns the command connection and a cache of the last confirmed device
/// state. Player-scoped methods take an optional player id; `None` targets
/// the player selected by [`get_players`](Self::get_players) or
/// [`set_player_id`](Self::set_player_id).
///
/// # Example
///
/// ```no_run
/// use heos::HeosClient;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut client = HeosClient::connect("192.168.1.27", 1255).await?;
///     client.get_players().await?;
///
///     let volume = client.get_volume(None).await?;
///     client.set_volume(i32::from(volume) + 5, None).await?;
///     client.play(None).await?;
///
///     client.close().await;
///     Ok(())
/// }
/// ```
pub struct HeosClient<S = TcpStream> {
    correlator: Correlator<S>,
    state: SessionState,
    content: Option<ContentServer>,
}

impl HeosClient<TcpStream> {
    /// Connect to a device at the given host and port with default settings
    pub async fn connect(host: impl Into<String>, port: u16) -> Result<Self> {
        let address = DeviceAddress::new(host).with_port(port);
        Self::connect_with_config(&address, ClientConfig::default().with_port(port)).await
    }

    /// Connect to a device address
    ///
    /// The port in `address` takes precedence over `config.port`.
    pub async fn connect_with_config(address: &DeviceAddress, config: ClientConfig) -> Result<Self> {
        let connection =
            Connection::connect(&address.host, address.port, config.connect_timeout).await?;
        Ok(Self::with_connection(connection, &config))
    }

    /// Discover the first device on the network and connect to it
    pub async fn discover(discovery: &DiscoveryConfig, config: ClientConfig) -> Result<Self> {
        let address = discovery::discover(discovery).await?.with_port(config.port);
        Self::connect_with_config(&address, config).await
    }

    /// Serve `content` over HTTP and have the player stream it
    ///
    /// Returns the URL the content is served at. Content registered by a
    /// previous call is released.
    pub async fn play_content(
        &mut self,
        content: impl Into<Bytes>,
        mime_type: &str,
        pid: Option<PlayerId>,
    ) -> Result<String> {
        let target = self.resolve_player(pid)?;

        if self.content.is_none() {
            let local = self
                .correlator
                .connection()
                .local_addr()
                .ok_or(HeosError::ConnectionClosed)?;
            self.content = Some(ContentServer::start(local.ip()).await?);
        }

        let url = match &self.content {
            Some(server) => {
                server.clear();
                server.register(content, mime_type)
            }
            None => return Err(HeosError::ConnectionClosed),
        };

        self.play_url(&url, Some(target)).await?;
        Ok(url)
    }
}

impl<S> HeosClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an established connection
    pub fn with_connection(connection: Connection<S>, config: &ClientConfig) -> Self {
        Self {
            correlator: Correlator::new(connection, config),
            state: SessionState::new(),
            content: None,
        }
    }

    /// Wrap any connected byte stream
    pub fn from_stream(stream: S, config: &ClientConfig) -> Self {
        Self::with_connection(Connection::from_stream(stream, "stream"), config)
    }

    /// Last confirmed device state
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Player targeted when no explicit id is given
    pub fn player_id(&self) -> Option<PlayerId> {
        self.state.player_id
    }

    /// Override the implicit target player
    ///
    /// Cached volume, mute and play state belong to the previous player and
    /// are forgotten.
    pub fn set_player_id(&mut self, pid: PlayerId) {
        if self.state.player_id != Some(pid) {
            self.state.invalidate();
            self.state.player_id = Some(pid);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.correlator.is_open()
    }

    /// Send an arbitrary command and wait for its reply
    ///
    /// An unset `pid` parameter is filled with the current player. Any error
    /// that leaves the connection closed also clears the session state.
    pub async fn send_command(&mut self, command: &Command) -> Result<Reply> {
        let result = self.correlator.invoke(command, self.state.player_id).await;
        if result.is_err() && !self.correlator.is_open() && self.state != SessionState::new() {
            tracing::info!("Connection lost; clearing session state");
            self.state.invalidate();
        }
        result
    }

    /// Close the connection and forget all cached state
    pub async fn close(&mut self) {
        self.correlator.close().await;
        self.state.invalidate();
        self.content = None;
    }

    fn resolve_player(&self, pid: Option<PlayerId>) -> Result<PlayerId> {
        pid.or(self.state.player_id).ok_or(HeosError::NoPlayer)
    }

    /// Whether a reply for `pid` describes the cached player
    fn is_session_player(&self, pid: Option<PlayerId>) -> bool {
        pid.is_none() || pid == self.state.player_id
    }

    // ========== Players ==========

    /// List players; the first one becomes the implicit target
    pub async fn get_players(&mut self) -> Result<Vec<Player>> {
        let reply = self.send_command(&Command::new("player/get_players")).await?;
        let players: Vec<Player> = reply.into_payload()?;

        if let Some(first) = players.first() {
            if self.state.player_id != Some(first.pid) {
                tracing::info!("Selected player {} ({})", first.name, first.pid);
                self.set_player_id(first.pid);
            }
        } else {
            tracing::warn!("Device reported no players");
        }

        Ok(players)
    }

    pub async fn get_player_info(&mut self, pid: Option<PlayerId>) -> Result<Player> {
        let command = Command::new("player/get_player_info").player(pid);
        self.send_command(&command).await?.into_payload()
    }

    // ========== Volume ==========

    pub async fn get_volume(&mut self, pid: Option<PlayerId>) -> Result<u8> {
        let command = Command::new("player/get_volume").player(pid);
        let reply = self.send_command(&command).await?;
        let level = reply
            .get("level")
            .and_then(parse_volume)
            .ok_or_else(|| HeosError::Protocol("get_volume reply has no level".to_string()))?;

        if self.is_session_player(pid) {
            self.state.volume = Some(level);
        }
        Ok(level)
    }

    /// Set the volume, clamped to 0..=100
    pub async fn set_volume(&mut self, level: i32, pid: Option<PlayerId>) -> Result<u8> {
        let level = clamp_volume(level);
        let command = Command::new("player/set_volume")
            .player(pid)
            .param("level", level);
        let reply = self.send_command(&command).await?;
        let confirmed = reply.get("level").and_then(parse_volume).unwrap_or(level);

        if self.is_session_player(pid) {
            self.state.volume = Some(confirmed);
        }
        Ok(confirmed)
    }

    pub async fn volume_up(&mut self, step: u8, pid: Option<PlayerId>) -> Result<u8> {
        let current = self.get_volume(pid).await?;
        self.set_volume(i32::from(current) + i32::from(step), pid).await
    }

    pub async fn volume_down(&mut self, step: u8, pid: Option<PlayerId>) -> Result<u8> {
        let current = self.get_volume(pid).await?;
        self.set_volume(i32::from(current) - i32::from(step), pid).await
    }

    // ========== Mute ==========

    pub async fn get_mute(&mut self, pid: Option<PlayerId>) -> Result<bool> {
        let command = Command::new("player/get_mute").player(pid);
        let reply = self.send_command(&command).await?;
        let muted = reply
            .get("state")
            .and_then(parse_on_off)
            .ok_or_else(|| HeosError::Protocol("get_mute reply has no state".to_string()))?;

        if self.is_session_player(pid) {
            self.state.muted = Some(muted);
        }
        Ok(muted)
    }

    pub async fn set_mute(&mut self, muted: bool, pid: Option<PlayerId>) -> Result<()> {
        let command = Command::new("player/set_mute")
            .player(pid)
            .param("state", if muted { "on" } else { "off" });
        self.send_command(&command).await?;

        if self.is_session_player(pid) {
            self.state.muted = Some(muted);
        }
        Ok(())
    }

    /// Toggle mute; returns the new state when the device reports it
    pub async fn toggle_mute(&mut self, pid: Option<PlayerId>) -> Result<Option<bool>> {
        let command = Command::new("player/toggle_mute").player(pid);
        let reply = self.send_command(&command).await?;
        let muted = reply.get("state").and_then(parse_on_off);

        if self.is_session_player(pid) {
            self.state.muted = muted;
        }
        Ok(muted)
    }

    // ========== Playback ==========

    pub async fn get_play_state(&mut self, pid: Option<PlayerId>) -> Result<PlayState> {
        let command = Command::new("player/get_play_state").player(pid);
        let reply = self.send_command(&command).await?;
        let state = reply
            .get("state")
            .ok_or_else(|| HeosError::Protocol("get_play_state reply has no state".to_string()))?
            .parse::<PlayState>()
            .map_err(|e| HeosError::Protocol(e.to_string()))?;

        if self.is_session_player(pid) {
            self.state.play_state = Some(state);
        }
        Ok(state)
    }

    /// Set the play state from its wire name (`play`, `pause` or `stop`)
    ///
    /// Any other value is rejected before anything is sent.
    pub async fn set_play_state(&mut self, state: &str, pid: Option<PlayerId>) -> Result<PlayState> {
        let requested: PlayState = state.parse()?;
        let command = Command::new("player/set_play_state")
            .player(pid)
            .param("state", requested.as_str());
        let reply = self.send_command(&command).await?;
        let confirmed = reply
            .get("state")
            .and_then(|s| s.parse().ok())
            .unwrap_or(requested);

        if self.is_session_player(pid) {
            self.state.play_state = Some(confirmed);
        }
        Ok(confirmed)
    }

    pub async fn play(&mut self, pid: Option<PlayerId>) -> Result<()> {
        self.set_play_state(PlayState::Play.as_str(), pid).await.map(|_| ())
    }

    pub async fn pause(&mut self, pid: Option<PlayerId>) -> Result<()> {
        self.set_play_state(PlayState::Pause.as_str(), pid).await.map(|_| ())
    }

    pub async fn stop(&mut self, pid: Option<PlayerId>) -> Result<()> {
        self.set_play_state(PlayState::Stop.as_str(), pid).await.map(|_| ())
    }

    pub async fn get_now_playing_media(&mut self, pid: Option<PlayerId>) -> Result<NowPlayingMedia> {
        let command = Command::new("player/get_now_playing_media").player(pid);
        match self.send_command(&command).await? {
            Reply::Payload(value) => Ok(serde_json::from_value(value)?),
            // Nothing loaded on the player
            Reply::Mapping(_) => Ok(NowPlayingMedia::default()),
        }
    }

    /// Have the player stream a URL
    pub async fn play_url(&mut self, url: &str, pid: Option<PlayerId>) -> Result<()> {
        let command = Command::new("browse/play_stream")
            .player(pid)
            .param("url", url);
        self.send_command(&command).await?;
        Ok(())
    }

    // ========== Queue ==========

    pub async fn get_queue(&mut self, pid: Option<PlayerId>) -> Result<Vec<QueueItem>> {
        let command = Command::new("player/get_queue").player(pid);
        match self.send_command(&command).await? {
            Reply::Payload(value) => Ok(serde_json::from_value(value)?),
            Reply::Mapping(_) => Ok(Vec::new()),
        }
    }

    pub async fn clear_queue(&mut self, pid: Option<PlayerId>) -> Result<()> {
        let command = Command::new("player/clear_queue").player(pid);
        self.send_command(&command).await?;
        Ok(())
    }

    /// Jump to queue entry `qid`
    pub async fn play_queue(&mut self, qid: i64, pid: Option<PlayerId>) -> Result<()> {
        let command = Command::new("player/play_queue")
            .player(pid)
            .param("qid", qid);
        self.send_command(&command).await?;
        Ok(())
    }

    pub async fn play_next(&mut self, pid: Option<PlayerId>) -> Result<()> {
        let command = Command::new("player/play_next").player(pid);
        self.send_command(&command).await?;
        Ok(())
    }

    pub async fn play_previous(&mut self, pid: Option<PlayerId>) -> Result<()> {
        let command = Command::new("player/play_previous").player(pid);
        self.send_command(&command).await?;
        Ok(())
    }

    // ========== Groups & sources ==========

    pub async fn get_groups(&mut self) -> Result<Vec<Group>> {
        match self.send_command(&Command::new("group/get_groups")).await? {
            Reply::Payload(value) => Ok(serde_json::from_value(value)?),
            Reply::Mapping(_) => Ok(Vec::new()),
        }
    }

    pub async fn get_music_sources(&mut self) -> Result<Vec<MusicSource>> {
        let command = Command::new("browse/get_music_sources").param("range", DEFAULT_RANGE);
        self.send_command(&command).await?.into_payload()
    }

    /// Browse the top level of a music source
    ///
    /// Entries vary by source, so they are returned as raw JSON.
    pub async fn browse_source(&mut self, sid: SourceId) -> Result<Vec<Value>> {
        let command = Command::new("browse/browse")
            .param("sid", sid)
            .param("range", DEFAULT_RANGE);
        match self.send_command(&command).await? {
            Reply::Payload(Value::Array(items)) => Ok(items),
            Reply::Payload(other) => Err(HeosError::Protocol(format!(
                "browse payload is not a list: {}",
                other
            ))),
            Reply::Mapping(_) => Ok(Vec::new()),
        }
    }
}
