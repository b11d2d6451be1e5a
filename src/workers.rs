use std::collections::HashSet;

use anyhow::{Context, Result};
use rand::Rng;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpStream,
    sync::mpsc::UnboundedSender,
    task::JoinHandle,
    time::{sleep, Duration},
};
use tracing::{debug, info, warn};

use crate::{
    catalog::EmoteCatalog,
    config::EmoteWallConfig,
    events::{Candidate, EngineEvent},
    protocol::{first_native_emote_id, normalize_channel, parse_line, pong_for, ChatMessage, IrcLine},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Joined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Dial,
    JoinSent,
    Lost,
}

impl ConnectionState {
    pub fn on(self, event: ConnectionEvent) -> Self {
        match (self, event) {
            (_, ConnectionEvent::Lost) => ConnectionState::Disconnected,
            (ConnectionState::Disconnected, ConnectionEvent::Dial) => ConnectionState::Connecting,
            (ConnectionState::Connecting, ConnectionEvent::JoinSent) => ConnectionState::Joined,
            (state, _) => state,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatWorkerConfig {
    pub host: String,
    pub port: u16,
    pub channel: String,
    pub nick: Option<String>,
    pub reconnect_delay: Duration,
    pub ignore_commands: bool,
    pub ignore_users: Vec<String>,
}

impl ChatWorkerConfig {
    /// `None` when chat is disabled or no channel is configured.
    pub fn from_config(config: &EmoteWallConfig) -> Option<Self> {
        let channel = normalize_channel(&config.channel);
        if !config.chat.enabled || channel.is_empty() {
            return None;
        }
        Some(Self {
            host: config.chat.host.clone(),
            port: config.chat.port,
            channel,
            nick: config.chat.nick.clone(),
            reconnect_delay: Duration::from_millis(config.chat.reconnect_delay_ms),
            ignore_commands: config.chat.ignore_commands,
            ignore_users: config.chat.ignore_users.clone(),
        })
    }
}

/// Handle to the background chat connection. Starting or stopping twice is a no-op.
#[derive(Debug, Default)]
pub struct ChatWorker {
    handle: Option<JoinHandle<()>>,
}

impl ChatWorker {
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub fn start(&mut self, config: ChatWorkerConfig, tx: UnboundedSender<EngineEvent>) -> bool {
        if self.is_running() {
            return false;
        }
        self.handle = Some(tokio::spawn(run_chat_loop(config, tx)));
        true
    }

    pub fn stop(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

impl Drop for ChatWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_chat_loop(config: ChatWorkerConfig, tx: UnboundedSender<EngineEvent>) {
    let ignore_users: HashSet<String> = config
        .ignore_users
        .iter()
        .map(|value| value.trim().to_ascii_lowercase())
        .filter(|value| !value.is_empty())
        .collect();
    info!(channel = %config.channel, "starting chat worker");

    let mut state = ConnectionState::Disconnected;
    loop {
        state = state.on(ConnectionEvent::Dial);
        publish_state(&tx, state);
        match TcpStream::connect((config.host.as_str(), config.port)).await {
            Ok(stream) => {
                if let Err(err) =
                    run_chat_session(stream, &config, &ignore_users, &mut state, &tx).await
                {
                    warn!(?err, channel = %config.channel, "chat connection lost");
                } else {
                    warn!(channel = %config.channel, "chat connection closed");
                }
            }
            Err(err) => {
                warn!(?err, channel = %config.channel, "chat connect failed");
            }
        }

        state = state.on(ConnectionEvent::Lost);
        if !publish_state(&tx, state) {
            info!("engine receiver dropped; stopping chat worker");
            return;
        }
        info!(delay_ms = config.reconnect_delay.as_millis() as u64, "reconnecting to chat");
        sleep(config.reconnect_delay).await;
    }
}

async fn run_chat_session<S>(
    stream: S,
    config: &ChatWorkerConfig,
    ignore_users: &HashSet<String>,
    state: &mut ConnectionState,
    tx: &UnboundedSender<EngineEvent>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let nick = config
        .nick
        .clone()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(random_justinfan_nick);
    write_line(&mut write_half, "CAP REQ :twitch.tv/tags twitch.tv/commands").await?;
    write_line(&mut write_half, "PASS oauth:kappa").await?;
    write_line(&mut write_half, &format!("NICK {nick}")).await?;
    write_line(&mut write_half, &format!("JOIN #{}", config.channel)).await?;

    *state = state.on(ConnectionEvent::JoinSent);
    publish_state(tx, *state);
    info!(channel = %config.channel, nick = %nick, "chat joined");

    // Lines are decoded lossily; a stray non-UTF-8 byte must not drop the session.
    let mut reader = BufReader::new(read_half);
    let mut buf = Vec::with_capacity(512);
    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .await
            .context("chat read failed")?;
        if read == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        match parse_line(&line, &config.channel) {
            IrcLine::Ping(token) => {
                write_line(&mut write_half, &pong_for(&token)).await?;
            }
            IrcLine::Privmsg(message) => {
                if config.ignore_commands && message.text.starts_with('!') {
                    continue;
                }
                if ignore_users.contains(&message.login) {
                    continue;
                }
                if tx.send(EngineEvent::Chat(message)).is_err() {
                    debug!("engine receiver dropped; ending chat session");
                    return Ok(());
                }
            }
            IrcLine::Other => {}
        }
    }
    Ok(())
}

fn publish_state(tx: &UnboundedSender<EngineEvent>, state: ConnectionState) -> bool {
    tx.send(EngineEvent::ChatStatus(state)).is_ok()
}

async fn write_line<W>(writer: &mut W, line: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await?;
    Ok(())
}

fn random_justinfan_nick() -> String {
    format!("justinfan{}", rand::thread_rng().gen_range(10_000..100_000))
}

pub fn native_emote_url(id: &str) -> String {
    format!("https://static-cdn.jtvnw.net/emoticons/v2/{id}/default/dark/3.0")
}

/// The single emote a chat line surfaces: the first token known to the
/// catalog, otherwise the first native emote from the `emotes` tag.
pub fn pick_candidate(
    message: &ChatMessage,
    catalog: &EmoteCatalog,
    native_emotes: bool,
) -> Option<Candidate> {
    for token in message.text.split_whitespace() {
        if let Some(url) = catalog.resolve(token) {
            return Some(Candidate::chat(token, url));
        }
    }
    if !native_emotes {
        return None;
    }
    let id = first_native_emote_id(message.tag("emotes")?)?;
    Some(Candidate::chat(format!("twitch_{id}"), native_emote_url(id)))
}
