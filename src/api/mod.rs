//! History service client and the one-shot CLI commands built on it

pub mod client;
mod messages;
mod users;

use anyhow::{Context, Result};
use chrono::Utc;
use std::rc::Rc;
use std::time::Duration;

pub use client::HistoryClient;
pub use messages::{format_line, format_time, read_mark, read_messages_data};
pub use users::list_users_data;

use crate::channel::{frame, ChannelUpdate, Connection};
use crate::config::Config;
use crate::conversation::{Action, ChatSession, ConversationState, EventSink, RecordingSink};

/// How long `send` waits for the channel before giving up.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// List everyone else on the roster (prints to stdout).
pub async fn list_users() -> Result<()> {
    let config = Config::load()?;
    let me = config.require_username()?;
    let client = HistoryClient::from_config(&config)?;
    let users = list_users_data(&client, me).await?;

    println!("\nContacts:");
    println!("{:-<40}", "");
    if users.is_empty() {
        println!("  (nobody else here)");
    }
    for user in &users {
        println!("  {}", user.username);
    }
    Ok(())
}

/// Print the thread with `peer` (prints to stdout).
pub async fn read_messages(peer: &str) -> Result<()> {
    let config = Config::load()?;
    let me = config.require_username()?;
    let client = HistoryClient::from_config(&config)?;
    let msgs = read_messages_data(&client, me, peer).await?;

    if msgs.is_empty() {
        println!("(no messages)");
        return Ok(());
    }
    for msg in &msgs {
        println!("{}", format_line(msg, me));
    }
    Ok(())
}

/// Open the conversation with `to` and send one message.
///
/// Goes through the same session as the interactive client, so opening the
/// thread also acknowledges what `to` sent us. With `dry_run` the frames are
/// printed instead of sent.
pub async fn send_message(to: &str, message: &str, dry_run: bool) -> Result<()> {
    let config = Config::load()?;
    let me = config.require_username()?.to_string();
    let client = HistoryClient::from_config(&config)?;

    if dry_run {
        let sink = Rc::new(RecordingSink::default());
        let mut session = ChatSession::new(ConversationState::new(&me), Rc::clone(&sink));
        open_and_send(&mut session, &client, to, message).await?;
        for event in sink.take() {
            println!("{}", frame::encode(&event)?);
        }
        return Ok(());
    }

    let (conn, mut updates) = Connection::connect(&config.channel_url(), &me);
    wait_connected(&mut updates).await?;

    let mut session = ChatSession::new(ConversationState::new(&me), conn);
    open_and_send(&mut session, &client, to, message).await?;

    session.into_sink().disconnect().await;
    println!("Message sent.");
    Ok(())
}

async fn open_and_send<S: EventSink>(
    session: &mut ChatSession<S>,
    client: &HistoryClient,
    to: &str,
    message: &str,
) -> Result<()> {
    anyhow::ensure!(!message.trim().is_empty(), "Refusing to send an empty message");

    let me = session.state().me().to_string();
    for req in session.dispatch(Action::Open { peer: to.to_string() }) {
        let result = read_messages_data(client, &me, &req.peer).await;
        if let Err(ref e) = result {
            anyhow::bail!("Could not open conversation with {}: {}", to, e);
        }
        session.dispatch(Action::HistoryLoaded {
            token: req.token,
            result,
        });
    }
    session.dispatch(Action::Send {
        text: message.to_string(),
        now: Utc::now(),
    });
    Ok(())
}

async fn wait_connected(
    updates: &mut tokio::sync::mpsc::UnboundedReceiver<ChannelUpdate>,
) -> Result<()> {
    let wait = async {
        loop {
            match updates.recv().await {
                Some(ChannelUpdate::Connected) => return Ok(()),
                Some(ChannelUpdate::Disconnected(e)) if !e.is_retriable() => {
                    return Err(anyhow::Error::new(e))
                }
                Some(ChannelUpdate::Disconnected(e)) => {
                    tracing::info!("Channel not up yet: {}", e);
                }
                Some(ChannelUpdate::Event(_)) => {}
                None => anyhow::bail!("Channel task exited"),
            }
        }
    };
    tokio::time::timeout(CONNECT_TIMEOUT, wait)
        .await
        .context("Timed out connecting to the channel")?
}
