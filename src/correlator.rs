use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::{HeosError, Result};
use crate::protocol::{Command, Decoded, MessageBuffer, Reply};
use crate::types::PlayerId;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};

/// Matches replies to commands on a connection that carries one request at a time
///
/// Messages for other commands (change events, late replies) are discarded
/// while waiting. `invoke` takes `&mut self`, so two commands can never be in
/// flight on the same connection.
pub struct Correlator<S = TcpStream> {
    connection: Connection<S>,
    buffer: MessageBuffer,
    request_timeout: Duration,
    read_chunk_size: usize,
    max_message_size: usize,
}

impl<S> Correlator<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(connection: Connection<S>, config: &ClientConfig) -> Self {
        Self {
            connection,
            buffer: MessageBuffer::new(),
            request_timeout: config.request_timeout,
            read_chunk_size: config.read_chunk_size,
            max_message_size: config.max_message_size,
        }
    }

    pub fn connection(&self) -> &Connection<S> {
        &self.connection
    }

    pub fn is_open(&self) -> bool {
        self.connection.is_open()
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Send `command` and wait for its reply
    ///
    /// An unset player identifier is filled from `default_pid`. Encoding
    /// errors are reported before anything is written to the socket. The
    /// request timeout covers both the write and the wait for the reply.
    pub async fn invoke(&mut self, command: &Command, default_pid: Option<PlayerId>) -> Result<Reply> {
        let frame = command.encode(default_pid)?;
        let deadline = Instant::now() + self.request_timeout;

        tracing::debug!("Sending: {}", frame.trim_end());
        match timeout_at(deadline, self.connection.send(frame.as_bytes())).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(
                    "Could not send {} within {:?}",
                    command.path(),
                    self.request_timeout
                );
                // The device may have seen part of the frame.
                self.connection.abandon();
                self.buffer.clear();
                return Err(HeosError::Timeout(self.request_timeout));
            }
        }

        match timeout_at(deadline, self.wait_for_reply(command.path())).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    "No reply to {} within {:?}",
                    command.path(),
                    self.request_timeout
                );
                Err(HeosError::Timeout(self.request_timeout))
            }
        }
    }

    async fn wait_for_reply(&mut self, path: &str) -> Result<Reply> {
        loop {
            while let Some(decoded) = self.buffer.next_message() {
                match decoded {
                    Decoded::Invalid(reason) => {
                        tracing::warn!("Ignoring unparsable message: {}", reason);
                    }
                    Decoded::Message(msg) if msg.command() != path => {
                        tracing::debug!("Discarding message for {} while waiting for {}", msg.command(), path);
                    }
                    Decoded::Message(msg) if msg.is_interim() => {
                        tracing::debug!("{} is still being processed", path);
                    }
                    Decoded::Message(msg) => return msg.into_reply(),
                }
            }

            if self.buffer.len() > self.max_message_size {
                self.buffer.clear();
                return Err(HeosError::Protocol(format!(
                    "incomplete message exceeds {} bytes",
                    self.max_message_size
                )));
            }

            let data = self.connection.receive(self.read_chunk_size).await?;
            tracing::debug!("Received: {}", String::from_utf8_lossy(&data).trim_end());
            self.buffer.push(&data);
        }
    }

    /// Close the underlying connection and drop buffered data
    pub async fn close(&mut self) {
        self.connection.close().await;
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    fn correlator(stream: DuplexStream, config: &ClientConfig) -> Correlator<DuplexStream> {
        Correlator::new(Connection::from_stream(stream, "mock"), config)
    }

    /// Read one command line, then write each chunk in order
    fn respond(device: DuplexStream, chunks: Vec<&'static str>) -> tokio::task::JoinHandle<String> {
        tokio::spawn(async move {
            let mut device = BufReader::new(device);
            let mut line = String::new();
            device.read_line(&mut line).await.unwrap();
            for chunk in chunks {
                device.get_mut().write_all(chunk.as_bytes()).await.unwrap();
            }
            // Keep the pipe open until the client is done reading.
            let mut rest = String::new();
            let _ = device.read_line(&mut rest).await;
            line
        })
    }

    #[tokio::test]
    async fn test_discards_event_before_reply() {
        let (client, device) = duplex(4096);
        let mut correlator = correlator(client, &ClientConfig::default());
        let device = respond(
            device,
            vec![
                "{\"heos\":{\"command\":\"event/player_state_changed\",\"result\":\"success\",\"message\":\"pid=1&state=play\"}}\r\n",
                "{\"heos\":{\"command\":\"player/get_volume\",\"result\":\"success\",\"message\":\"pid=1&level=42\"}}\r\n",
            ],
        );

        let cmd = Command::new("player/get_volume").player(None);
        let reply = correlator.invoke(&cmd, Some(1)).await.unwrap();
        assert_eq!(reply.get("level"), Some("42"));
        assert_eq!(reply.get("state"), None);

        correlator.close().await;
        assert_eq!(device.await.unwrap(), "heos://player/get_volume?pid=1\r\n");
    }

    #[tokio::test]
    async fn test_reply_split_across_reads_with_garbage() {
        let (client, device) = duplex(4096);
        let mut correlator = correlator(client, &ClientConfig::default());
        let _device = respond(
            device,
            vec![
                "oops\r\n{\"heos\":{\"command\":\"player/get_mu",
                "te\",\"result\":\"success\",\"message\":\"pid=1&state=on\"}}\r\n",
            ],
        );

        let reply = correlator
            .invoke(&Command::new("player/get_mute").player(Some(1)), None)
            .await
            .unwrap();
        assert_eq!(reply.get("state"), Some("on"));
    }

    #[tokio::test]
    async fn test_skips_interim_acknowledgement() {
        let (client, device) = duplex(4096);
        let mut correlator = correlator(client, &ClientConfig::default());
        let _device = respond(
            device,
            vec![
                "{\"heos\":{\"command\":\"browse/browse\",\"result\":\"success\",\"message\":\"command under process&sid=1\"}}\r\n",
                "{\"heos\":{\"command\":\"browse/browse\",\"result\":\"success\",\"message\":\"sid=1&returned=1&count=1\"},\"payload\":[{\"name\":\"x\"}]}\r\n",
            ],
        );

        let reply = correlator
            .invoke(&Command::new("browse/browse").param("sid", 1), None)
            .await
            .unwrap();
        assert!(reply.payload().is_some());
    }

    #[tokio::test]
    async fn test_failure_reply() {
        let (client, device) = duplex(4096);
        let mut correlator = correlator(client, &ClientConfig::default());
        let _device = respond(
            device,
            vec!["{\"heos\":{\"command\":\"player/set_volume\",\"result\":\"fail\",\"message\":\"eid=9&text=Parameter out of range\"}}"],
        );

        let cmd = Command::new("player/set_volume").player(Some(1)).param("level", 5);
        match correlator.invoke(&cmd, None).await {
            Err(HeosError::CommandFailed { command, message }) => {
                assert_eq!(command, "player/set_volume");
                assert_eq!(message, "eid=9&text=Parameter out of range");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_player_fails_before_sending() {
        let (client, mut device) = duplex(4096);
        let mut correlator = correlator(client, &ClientConfig::default());

        let result = correlator
            .invoke(&Command::new("player/get_volume").player(None), None)
            .await;
        assert!(matches!(result, Err(HeosError::NoPlayer)));

        correlator.close().await;
        let mut sent = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut device, &mut sent).await.unwrap();
        assert!(sent.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_when_device_is_silent() {
        let (client, device) = duplex(4096);
        let config = ClientConfig::default().with_request_timeout(Duration::from_millis(50));
        let mut correlator = correlator(client, &config);
        let _device = respond(device, vec![]);

        let result = correlator
            .invoke(&Command::new("system/heart_beat"), None)
            .await;
        assert!(matches!(result, Err(HeosError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_timeout_when_device_stops_reading() {
        // The pipe holds fewer bytes than one frame and the device never reads.
        let (client, _device) = duplex(8);
        let config = ClientConfig::default().with_request_timeout(Duration::from_millis(100));
        let mut correlator = correlator(client, &config);

        let result = correlator.invoke(&Command::new("system/heart_beat"), None).await;
        assert!(matches!(result, Err(HeosError::Timeout(_))));
        assert!(!correlator.is_open());
    }

    #[tokio::test]
    async fn test_eof_while_waiting() {
        let (client, device) = duplex(4096);
        let mut correlator = correlator(client, &ClientConfig::default());
        let device = tokio::spawn(async move {
            let mut device = BufReader::new(device);
            let mut line = String::new();
            device.read_line(&mut line).await.unwrap();
            // Dropping the device end closes the stream.
        });

        let result = correlator
            .invoke(&Command::new("system/heart_beat"), None)
            .await;
        device.await.unwrap();
        assert!(matches!(result, Err(HeosError::ConnectionClosed)));
        assert!(!correlator.is_open());
    }

    #[tokio::test]
    async fn test_oversized_message_is_protocol_error() {
        let (client, device) = duplex(4096);
        let mut config = ClientConfig::default();
        config.max_message_size = 16;
        let mut correlator = correlator(client, &config);
        let _device = respond(
            device,
            vec!["{\"heos\":{\"command\":\"player/get_players\",\"result\":\"succ"],
        );

        let result = correlator
            .invoke(&Command::new("player/get_players"), None)
            .await;
        assert!(matches!(result, Err(HeosError::Protocol(_))));
    }
}
