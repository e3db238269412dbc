//! Push channel client for the `send` and `tail` subcommands.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use pollcast_core::Message;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::protocol::{ClientEvent, ServerEvent};

type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SEND_ACK_TIMEOUT: Duration = Duration::from_secs(5);

async fn connect(url: &str) -> anyhow::Result<ClientStream> {
    let (ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| anyhow::anyhow!("cannot connect to server at {url}: {e}"))?;
    Ok(ws)
}

/// Read the next server event. `None` means the server closed the stream.
async fn next_event(ws: &mut ClientStream) -> anyhow::Result<Option<ServerEvent>> {
    while let Some(frame) = ws.next().await {
        match frame? {
            WsMessage::Text(text) => return Ok(Some(serde_json::from_str(&text)?)),
            WsMessage::Close(_) => return Ok(None),
            _ => continue,
        }
    }
    Ok(None)
}

/// `pollcast send`: post one message and wait for the server to echo it
/// back in a `message-update`.
pub async fn cmd_send(url: &str, text: &str) -> anyhow::Result<()> {
    let mut ws = connect(url).await?;

    // The history length at connect marks where our echo can first appear.
    let baseline = match next_event(&mut ws).await? {
        Some(ServerEvent::InitialMessages(list)) => list.len(),
        Some(other) => anyhow::bail!("expected initial-messages, got {other:?}"),
        None => anyhow::bail!("server closed the connection"),
    };

    let frame = serde_json::to_string(&ClientEvent::NewMessage(text.to_string()))?;
    ws.send(WsMessage::Text(frame)).await?;

    let confirmed = tokio::time::timeout(SEND_ACK_TIMEOUT, await_echo(&mut ws, text, baseline))
        .await
        .map_err(|_| anyhow::anyhow!("no confirmation from server within {SEND_ACK_TIMEOUT:?}"))??;

    println!("{}", format_message(&confirmed));
    let _ = ws.close(None).await;
    Ok(())
}

async fn await_echo(ws: &mut ClientStream, text: &str, baseline: usize) -> anyhow::Result<Message> {
    loop {
        match next_event(ws).await? {
            Some(ServerEvent::MessageUpdate(list)) => {
                if let Some(message) = find_echo(&list, text, baseline) {
                    return Ok(message.clone());
                }
            }
            Some(ServerEvent::Error(reason)) => anyhow::bail!("server rejected message: {reason}"),
            Some(ServerEvent::InitialMessages(_)) => {}
            None => anyhow::bail!("server closed the connection"),
        }
    }
}

/// First message with `text` at or past `baseline`. Entries before the
/// baseline were already in the log when we connected.
pub(crate) fn find_echo<'a>(list: &'a [Message], text: &str, baseline: usize) -> Option<&'a Message> {
    new_entries(list, baseline).iter().find(|m| m.text == text)
}

/// `pollcast tail`: print messages as they arrive until Ctrl-C or the
/// server goes away.
pub async fn cmd_tail(url: &str, json: bool, new_only: bool) -> anyhow::Result<()> {
    let mut ws = connect(url).await?;
    let mut seen = 0usize;

    loop {
        let event = tokio::select! {
            ev = next_event(&mut ws) => ev?,
            _ = tokio::signal::ctrl_c() => {
                let _ = ws.close(None).await;
                return Ok(());
            }
        };

        let list = match event {
            Some(ServerEvent::InitialMessages(list)) => {
                if new_only {
                    seen = list.len();
                    continue;
                }
                list
            }
            Some(ServerEvent::MessageUpdate(list)) => list,
            Some(ServerEvent::Error(reason)) => {
                eprintln!("server error: {reason}");
                continue;
            }
            None => {
                eprintln!("server closed the connection");
                return Ok(());
            }
        };

        for message in new_entries(&list, seen) {
            if json {
                println!("{}", serde_json::to_string(message)?);
            } else {
                println!("{}", format_message(message));
            }
        }
        seen = list.len();
    }
}

/// Entries past the `seen` mark. A list shorter than the mark yields nothing.
pub(crate) fn new_entries(list: &[Message], seen: usize) -> &[Message] {
    list.get(seen..).unwrap_or_default()
}

pub(crate) fn format_message(message: &Message) -> String {
    format!(
        "[{}] {}",
        message.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
        message.text
    )
}
