use std::fmt::Write as _;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::aggregator::{Conversation, Direction, DisplayMessage};
use crate::api::events::InboxEvent;
use crate::inbox::InboxHandle;
use crate::locale::Locale;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    Send(String),
    /// 1-based position in the conversation list.
    Select(usize),
    Refresh,
    Quit,
}

pub fn parse_input(line: &str) -> Option<ConsoleInput> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let Some(command) = trimmed.strip_prefix('/') else {
        return Some(ConsoleInput::Send(trimmed.to_string()));
    };
    let mut parts = command.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("quit" | "q"), None) => Some(ConsoleInput::Quit),
        (Some("refresh" | "r"), None) => Some(ConsoleInput::Refresh),
        (Some("select" | "s"), Some(n)) => match n.parse::<usize>() {
            Ok(n) if n >= 1 => Some(ConsoleInput::Select(n)),
            _ => None,
        },
        _ => None,
    }
}

pub fn render_conversation_list(
    conversations: &[Conversation],
    selected: Option<&str>,
    locale: &Locale,
) -> String {
    if conversations.is_empty() {
        return locale.no_chats.to_string();
    }
    let mut out = String::new();
    for (i, conv) in conversations.iter().enumerate() {
        let marker = if selected == Some(conv.counterpart_address.as_str()) {
            '>'
        } else {
            ' '
        };
        let _ = writeln!(
            out,
            "{marker} {}. {}  {}  [{}]",
            i + 1,
            conv.display_name,
            conv.last_message_summary,
            conv.last_activity_label
        );
    }
    out
}

pub fn render_thread(display_name: &str, messages: &[DisplayMessage], locale: &Locale) -> String {
    let mut out = format!("== {display_name} ==\n");
    if messages.is_empty() {
        out.push_str(locale.no_messages);
        out.push('\n');
        return out;
    }
    for msg in messages {
        let _ = match msg.direction {
            Direction::Received => writeln!(out, "<- {}  {}", msg.text, msg.formatted_time),
            Direction::Sent => writeln!(
                out,
                "        -> {}  {}{}",
                msg.text,
                msg.formatted_time,
                if msg.pending { " …" } else { "" }
            ),
        };
    }
    out
}

/// What the console has on screen, kept so `/select N` can be resolved.
pub struct ConsoleView {
    locale: &'static Locale,
    conversations: Vec<Conversation>,
    selected: Option<String>,
}

impl ConsoleView {
    pub fn new(locale: &'static Locale) -> Self {
        Self {
            locale,
            conversations: Vec::new(),
            selected: None,
        }
    }

    pub fn key_at(&self, position: usize) -> Option<&str> {
        position
            .checked_sub(1)
            .and_then(|i| self.conversations.get(i))
            .map(|c| c.counterpart_address.as_str())
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Update from an inbox event and return what should be printed.
    pub fn apply(&mut self, event: InboxEvent) -> Option<String> {
        match event {
            InboxEvent::ConversationsUpdated {
                conversations,
                selected,
            } => {
                let thread_gone = self.selected.is_some() && selected.is_none();
                self.conversations = conversations;
                self.selected = selected;
                let mut out = render_conversation_list(
                    &self.conversations,
                    self.selected.as_deref(),
                    self.locale,
                );
                // No ThreadUpdated follows when nothing is selected, so blank
                // the thread that was on screen here.
                if thread_gone {
                    if !out.ends_with('\n') {
                        out.push('\n');
                    }
                    out.push_str(self.locale.no_messages);
                }
                Some(out)
            }
            InboxEvent::ThreadUpdated {
                display_name,
                messages,
                ..
            } => Some(render_thread(&display_name, &messages, self.locale)),
            InboxEvent::SendFailed { reason, .. } => {
                Some(format!("{}: {}", self.locale.send_failed, reason))
            }
            InboxEvent::MessageSent { .. } | InboxEvent::FetchFailed { .. } => None,
        }
    }
}

/// Drive the inbox from stdin until `/quit` or end of input.
pub async fn run_console(
    handle: InboxHandle,
    mut events: mpsc::UnboundedReceiver<InboxEvent>,
    locale: &'static Locale,
) {
    let mut view = ConsoleView::new(locale);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        log::error!("failed to read input: {e}");
                        break;
                    }
                };
                match parse_input(&line) {
                    Some(ConsoleInput::Quit) => break,
                    Some(ConsoleInput::Refresh) => {
                        handle.refresh();
                    }
                    Some(ConsoleInput::Select(n)) => match view.key_at(n) {
                        Some(key) => {
                            handle.select(key);
                        }
                        None => println!("no conversation #{n}"),
                    },
                    Some(ConsoleInput::Send(text)) => {
                        if view.selected().is_none() {
                            println!("{}", locale.select_chat_first);
                        } else {
                            handle.send(None, text);
                        }
                    }
                    None => println!("commands: /select N, /refresh, /quit"),
                }
            }
            Some(event) = events.recv() => {
                if let Some(text) = view.apply(event) {
                    println!("{text}");
                }
            }
        }
    }
    handle.shutdown();
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::locale::{ENGLISH, TURKISH};

    fn conv(key: &str, name: &str, summary: &str) -> Conversation {
        let ts: DateTime<Utc> = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        Conversation {
            counterpart_address: key.to_string(),
            display_name: name.to_string(),
            messages: vec![DisplayMessage {
                text: summary.to_string(),
                direction: Direction::Received,
                formatted_time: "12:00".into(),
                raw_timestamp: ts,
                pending: false,
            }],
            last_message_summary: summary.to_string(),
            last_activity_time: ts,
            last_activity_label: "12:00".into(),
        }
    }

    #[test]
    fn test_parse_input() {
        assert_eq!(parse_input("  "), None);
        assert_eq!(parse_input(" selam "), Some(ConsoleInput::Send("selam".into())));
        assert_eq!(parse_input("/select 2"), Some(ConsoleInput::Select(2)));
        assert_eq!(parse_input("/s 1"), Some(ConsoleInput::Select(1)));
        assert_eq!(parse_input("/select 0"), None);
        assert_eq!(parse_input("/select x"), None);
        assert_eq!(parse_input("/refresh"), Some(ConsoleInput::Refresh));
        assert_eq!(parse_input("/quit"), Some(ConsoleInput::Quit));
        assert_eq!(parse_input("/dance"), None);
    }

    #[test]
    fn test_render_empty_states() {
        assert_eq!(render_conversation_list(&[], None, &TURKISH), "Henüz sohbet yok");
        assert_eq!(
            render_thread("+90 555 111 2233", &[], &ENGLISH),
            "== +90 555 111 2233 ==\nNo messages yet\n"
        );
    }

    #[test]
    fn test_render_list_marks_active() {
        let list = vec![
            conv("905551112233", "+90 555 111 2233", "hi"),
            conv("905559998877", "+90 555 999 8877", "yo"),
        ];
        let out = render_conversation_list(&list, Some("905559998877"), &TURKISH);
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines[0], "  1. +90 555 111 2233  hi  [12:00]");
        assert_eq!(lines[1], "> 2. +90 555 999 8877  yo  [12:00]");
    }

    #[test]
    fn test_view_tracks_list_for_selection() {
        let mut view = ConsoleView::new(&TURKISH);
        assert_eq!(view.key_at(1), None);

        let printed = view.apply(InboxEvent::ConversationsUpdated {
            conversations: vec![conv("905551112233", "+90 555 111 2233", "hi")],
            selected: Some("905551112233".into()),
        });
        assert!(printed.is_some());
        assert_eq!(view.key_at(1), Some("905551112233"));
        assert_eq!(view.key_at(0), None);
        assert_eq!(view.key_at(2), None);
        assert_eq!(view.selected(), Some("905551112233"));

        let printed = view.apply(InboxEvent::SendFailed {
            key: None,
            reason: "HTTP 500".into(),
        });
        assert_eq!(printed.as_deref(), Some("Mesaj gönderilemedi: HTTP 500"));
        assert_eq!(view.apply(InboxEvent::MessageSent { key: "x".into() }), None);
    }

    #[test]
    fn test_view_clears_thread_when_list_empties() {
        let mut view = ConsoleView::new(&ENGLISH);
        view.apply(InboxEvent::ConversationsUpdated {
            conversations: vec![conv("905551112233", "+90 555 111 2233", "hi")],
            selected: Some("905551112233".into()),
        });

        let printed = view.apply(InboxEvent::ConversationsUpdated {
            conversations: Vec::new(),
            selected: None,
        });
        assert_eq!(printed.as_deref(), Some("No chats yet\nNo messages yet"));
        assert_eq!(view.selected(), None);
        assert_eq!(view.key_at(1), None);

        // Already empty: just the list placeholder again.
        let printed = view.apply(InboxEvent::ConversationsUpdated {
            conversations: Vec::new(),
            selected: None,
        });
        assert_eq!(printed.as_deref(), Some("No chats yet"));
    }
}
