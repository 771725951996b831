//! Thread history endpoint

use chrono::{DateTime, Local, Utc};

use super::client::HistoryClient;
use crate::error::HistoryFetchError;
use crate::models::{Message, MessagePayload};

/// `GET /messages?sender=<me>&receiver=<peer>`: the thread in server order.
///
/// Entries missing `createdAt` or `read` are defaulted the same way live
/// messages are.
pub async fn read_messages_data(
    client: &HistoryClient,
    me: &str,
    peer: &str,
) -> Result<Vec<Message>, HistoryFetchError> {
    let payloads: Vec<MessagePayload> = client
        .get_json("messages", &[("sender", me), ("receiver", peer)])
        .await?;

    let now = Utc::now();
    let mut dropped = 0usize;
    let messages: Vec<Message> = payloads
        .into_iter()
        .filter(|p| {
            let ok = p.validate().is_ok();
            if !ok {
                dropped += 1;
            }
            ok
        })
        .map(|p| p.into_message(now))
        .collect();

    if dropped > 0 {
        tracing::warn!("Skipped {} malformed history entries for {}", dropped, peer);
    }
    Ok(messages)
}

/// `HH:MM` in local time, as shown next to each message.
pub fn format_time(t: DateTime<Utc>) -> String {
    t.with_timezone(&Local).format("%H:%M").to_string()
}

/// Delivery mark for one of our own messages: one tick sent, two ticks read.
pub fn read_mark(read: bool) -> &'static str {
    if read {
        "\u{2714}\u{2714}"
    } else {
        "\u{2714}"
    }
}

/// One printable line for the CLI thread view.
pub fn format_line(msg: &Message, me: &str) -> String {
    let mut line = format!("[{}] {}: {}", format_time(msg.created_at), msg.sender, msg.message);
    if msg.sender == me {
        line.push(' ');
        line.push_str(read_mark(msg.read));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::client::test_support::serve_once;

    #[tokio::test]
    async fn test_history_defaults_and_order() {
        let base = serve_once(
            "200 OK",
            r#"[
                {"sender":"bob","receiver":"alice","message":"hi"},
                {"sender":"","receiver":"alice","message":"broken"},
                {"sender":"alice","receiver":"bob","message":"yo","read":true,
                 "createdAt":"2024-01-01T00:00:00Z"}
            ]"#,
        )
        .await;
        let client = HistoryClient::new(&base).unwrap();
        let msgs = read_messages_data(&client, "alice", "bob").await.unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].message, "hi");
        assert!(!msgs[0].read);
        assert_eq!(msgs[1].message, "yo");
        assert!(msgs[1].read);
    }

    #[test]
    fn test_format_line_marks_own_messages_only() {
        let mut own = Message::outgoing("alice", "bob", "hello", Utc::now());
        assert!(format_line(&own, "alice").ends_with("hello \u{2714}"));
        own.mark_read();
        assert!(format_line(&own, "alice").ends_with("hello \u{2714}\u{2714}"));

        let theirs = Message::outgoing("bob", "alice", "hi", Utc::now());
        assert!(format_line(&theirs, "alice").ends_with("bob: hi"));
    }
}
