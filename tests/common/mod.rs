//! Scripted HEOS device for integration tests
#![allow(dead_code)]

use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;

pub const PLAYER_ID: i64 = -1465850739;
pub const OTHER_PLAYER_ID: i64 = 42;

/// Device end of a connection that answers each command line via a handler
pub struct MockDevice {
    received: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl MockDevice {
    /// Serve `stream`, answering every line with the chunks `handler` returns
    pub fn spawn<S, F>(stream: S, mut handler: F) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        F: FnMut(&str) -> Vec<String> + Send + 'static,
    {
        let received = Arc::new(Mutex::new(Vec::new()));
        let log = received.clone();

        let task = tokio::spawn(async move {
            let mut stream = BufReader::new(stream);
            let mut line = String::new();
            loop {
                line.clear();
                match stream.read_line(&mut line).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
                let command = line.trim_end().to_string();
                log.lock().unwrap().push(command.clone());

                for chunk in handler(&command) {
                    if stream.get_mut().write_all(chunk.as_bytes()).await.is_err() {
                        return;
                    }
                }
            }
        });

        Self { received, task }
    }

    /// Lines received so far
    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    /// Stop answering and close the device end of the stream
    pub fn hang_up(&self) {
        self.task.abort();
    }

    /// Wait for the client to hang up and return every line received
    pub async fn finish(self) -> Vec<String> {
        self.task.await.unwrap();
        self.received.lock().unwrap().clone()
    }
}

/// Command path of a wire line, e.g. `player/get_volume`
pub fn path_of(line: &str) -> &str {
    let line = line.strip_prefix("heos://").unwrap_or(line);
    line.split('?').next().unwrap_or(line)
}

/// Value of a query parameter in a wire line
pub fn param_of<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let (_, query) = line.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}

pub fn success(command: &str, message: &str) -> String {
    frame(json!({
        "heos": { "command": command, "result": "success", "message": message }
    }))
}

pub fn failure(command: &str, message: &str) -> String {
    frame(json!({
        "heos": { "command": command, "result": "fail", "message": message }
    }))
}

pub fn with_payload(command: &str, message: &str, payload: Value) -> String {
    frame(json!({
        "heos": { "command": command, "result": "success", "message": message },
        "payload": payload
    }))
}

pub fn event(command: &str, message: &str) -> String {
    success(&format!("event/{}", command), message)
}

pub fn players_payload() -> Value {
    json!([
        {
            "name": "Living Room",
            "pid": PLAYER_ID,
            "model": "HEOS 7",
            "version": "1.520.200",
            "network": "wired",
            "lineout": 0,
            "serial": "ADAG9170202780"
        },
        {
            "name": "Kitchen",
            "pid": OTHER_PLAYER_ID,
            "model": "HEOS 1",
            "version": "1.520.200",
            "network": "wifi",
            "lineout": 0
        }
    ])
}

/// Answers the common read commands like a single idle device would
pub fn default_handler(line: &str) -> Vec<String> {
    let path = path_of(line);
    let pid = param_of(line, "pid").unwrap_or("");
    match path {
        "player/get_players" => vec![with_payload(path, "", players_payload())],
        "player/get_volume" => vec![success(path, &format!("pid={}&level=42", pid))],
        "player/set_volume" => {
            let level = param_of(line, "level").unwrap_or("0");
            vec![success(path, &format!("pid={}&level={}", pid, level))]
        }
        "player/get_mute" => vec![success(path, &format!("pid={}&state=off", pid))],
        "player/set_mute" => {
            let state = param_of(line, "state").unwrap_or("off");
            vec![success(path, &format!("pid={}&state={}", pid, state))]
        }
        "player/get_play_state" => vec![success(path, &format!("pid={}&state=stop", pid))],
        "player/set_play_state" => {
            let state = param_of(line, "state").unwrap_or("stop");
            vec![success(path, &format!("pid={}&state={}", pid, state))]
        }
        _ => vec![success(path, &format!("pid={}", pid))],
    }
}

fn frame(value: Value) -> String {
    format!("{}\r\n", value)
}
