//! Inbox session state: the current conversation list, the selection, the
//! refresh ordering guard and messages sent but not yet seen in a snapshot.

use std::fmt;

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::aggregator::{
    self, Conversation, Direction, DisplayMessage, format_relative_time, sort_by_recent_activity,
};
use crate::api::models::MessageRecord;
use crate::error::{InboxError, Result};
use crate::locale::Locale;

/// How far before the local send time the gateway's copy may be stamped.
const SEND_CLOCK_SKEW_SECS: i64 = 60;
/// Optimistic messages the gateway never reports are given up after this.
const PENDING_TTL_SECS: i64 = 10 * 60;

/// Issued when a fetch starts; later tickets always compare greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RefreshTicket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// A newer fetch already landed; the snapshot was ignored.
    Stale,
}

#[derive(Debug, Clone)]
struct PendingSend {
    key: String,
    text: String,
    sent_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct SessionState {
    locale: &'static Locale,
    conversations: Vec<Conversation>,
    selected: Option<String>,
    issued: u64,
    applied: u64,
    pending: Vec<PendingSend>,
}

impl SessionState {
    pub fn new(locale: &'static Locale) -> Self {
        Self {
            locale,
            conversations: Vec::new(),
            selected: None,
            issued: 0,
            applied: 0,
            pending: Vec::new(),
        }
    }

    pub fn locale(&self) -> &'static Locale {
        self.locale
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn conversation(&self, key: &str) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|c| c.counterpart_address == key)
    }

    pub fn selected_conversation(&self) -> Option<&Conversation> {
        self.selected.as_deref().and_then(|key| self.conversation(key))
    }

    pub fn begin_refresh(&mut self) -> RefreshTicket {
        self.issued += 1;
        RefreshTicket(self.issued)
    }

    /// Replaces the conversation list with one rebuilt from `records`.
    ///
    /// Snapshots from fetches older than the last applied one are dropped.
    /// When aggregation fails the previous list stays in place.
    pub fn apply_snapshot<Tz: TimeZone>(
        &mut self,
        ticket: RefreshTicket,
        records: &[MessageRecord],
        now: &DateTime<Tz>,
    ) -> Result<ApplyOutcome>
    where
        Tz::Offset: fmt::Display,
    {
        if ticket.0 <= self.applied {
            log::debug!(
                "discarding snapshot from fetch #{} (already showing #{})",
                ticket.0,
                self.applied
            );
            return Ok(ApplyOutcome::Stale);
        }

        let mut conversations = aggregator::aggregate(records, now, self.locale)?;
        self.reconcile_pending(&mut conversations, now);
        self.conversations = conversations;
        self.applied = ticket.0;
        self.fix_selection();
        log::info!(
            "applied snapshot #{}: {} records, {} conversations",
            ticket.0,
            records.len(),
            self.conversations.len()
        );
        Ok(ApplyOutcome::Applied)
    }

    pub fn select(&mut self, key: &str) -> Result<&Conversation> {
        let index = self
            .conversations
            .iter()
            .position(|c| c.counterpart_address == key)
            .ok_or_else(|| InboxError::UnknownConversation(key.to_string()))?;
        self.selected = Some(key.to_string());
        Ok(&self.conversations[index])
    }

    /// Checks a send before anything goes over the wire. Returns the target
    /// key and the trimmed body.
    pub fn validate_send(&self, key: Option<&str>, body: &str) -> Result<(String, String)> {
        let body = body.trim();
        if body.is_empty() {
            return Err(InboxError::EmptyMessage);
        }
        let key = key
            .or(self.selected.as_deref())
            .ok_or(InboxError::NoActiveConversation)?;
        if self.conversation(key).is_none() {
            return Err(InboxError::UnknownConversation(key.to_string()));
        }
        Ok((key.to_string(), body.to_string()))
    }

    /// Appends a message the gateway accepted but has not reported yet.
    pub fn record_sent<Tz: TimeZone>(
        &mut self,
        key: &str,
        text: &str,
        now: &DateTime<Tz>,
    ) -> Result<()>
    where
        Tz::Offset: fmt::Display,
    {
        let locale = self.locale;
        let conversation = self
            .conversations
            .iter_mut()
            .find(|c| c.counterpart_address == key)
            .ok_or_else(|| InboxError::UnknownConversation(key.to_string()))?;

        let sent_at = now.with_timezone(&Utc);
        insert_pending(conversation, text, sent_at, now, locale);
        self.pending.push(PendingSend {
            key: key.to_string(),
            text: text.to_string(),
            sent_at,
        });
        sort_by_recent_activity(&mut self.conversations);
        Ok(())
    }

    fn reconcile_pending<Tz: TimeZone>(
        &mut self,
        conversations: &mut [Conversation],
        now: &DateTime<Tz>,
    ) where
        Tz::Offset: fmt::Display,
    {
        if self.pending.is_empty() {
            return;
        }
        let now_utc = now.with_timezone(&Utc);
        let mut claimed: Vec<(usize, usize)> = Vec::new();
        let mut unconfirmed: Vec<(usize, PendingSend)> = Vec::new();

        for pending in std::mem::take(&mut self.pending) {
            if now_utc.signed_duration_since(pending.sent_at) > Duration::seconds(PENDING_TTL_SECS) {
                log::warn!(
                    "gateway never reported message to {}, dropping it",
                    pending.key
                );
                continue;
            }
            let Some(ci) = conversations
                .iter()
                .position(|c| c.counterpart_address == pending.key)
            else {
                log::debug!("conversation {} vanished, dropping pending message", pending.key);
                continue;
            };
            let earliest = pending.sent_at - Duration::seconds(SEND_CLOCK_SKEW_SECS);
            let confirmed = conversations[ci].messages.iter().enumerate().position(|(mi, m)| {
                m.direction == Direction::Sent
                    && m.text == pending.text
                    && m.raw_timestamp >= earliest
                    && !claimed.contains(&(ci, mi))
            });
            match confirmed {
                Some(mi) => claimed.push((ci, mi)),
                None => unconfirmed.push((ci, pending)),
            }
        }

        for (ci, pending) in unconfirmed {
            insert_pending(
                &mut conversations[ci],
                &pending.text,
                pending.sent_at,
                now,
                self.locale,
            );
            self.pending.push(pending);
        }
        sort_by_recent_activity(conversations);
    }

    fn fix_selection(&mut self) {
        let still_there = self
            .selected
            .as_deref()
            .is_some_and(|key| self.conversation(key).is_some());
        if still_there {
            return;
        }
        let fallback = self
            .conversations
            .first()
            .map(|c| c.counterpart_address.clone());
        if self.selected.is_some() {
            log::info!(
                "selected conversation is gone, falling back to {:?}",
                fallback
            );
        }
        self.selected = fallback;
    }
}

fn insert_pending<Tz: TimeZone>(
    conversation: &mut Conversation,
    text: &str,
    sent_at: DateTime<Utc>,
    now: &DateTime<Tz>,
    locale: &Locale,
) where
    Tz::Offset: fmt::Display,
{
    let position = conversation
        .messages
        .partition_point(|m| m.raw_timestamp <= sent_at);
    conversation.messages.insert(
        position,
        DisplayMessage {
            text: text.to_string(),
            direction: Direction::Sent,
            formatted_time: format_relative_time(&sent_at, now, locale),
            raw_timestamp: sent_at,
            pending: true,
        },
    );
    conversation.refresh_summary(now, locale);
}
