//! Groups raw message records into per-contact conversations.
//!
//! Everything here is pure: the current time and the label set are passed in,
//! so the same snapshot always aggregates to the same conversation list.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::Serialize;

use crate::api::models::MessageRecord;
use crate::error::Result;
use crate::locale::Locale;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayMessage {
    pub text: String,
    pub direction: Direction,
    pub formatted_time: String,
    pub raw_timestamp: DateTime<Utc>,
    /// Shown optimistically, not yet confirmed by the gateway's snapshot.
    pub pending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conversation {
    pub counterpart_address: String,
    pub display_name: String,
    pub messages: Vec<DisplayMessage>,
    pub last_message_summary: String,
    pub last_activity_time: DateTime<Utc>,
    pub last_activity_label: String,
}

impl Conversation {
    /// Recomputes the summary fields from the last message.
    pub(crate) fn refresh_summary<Tz: TimeZone>(&mut self, now: &DateTime<Tz>, locale: &Locale)
    where
        Tz::Offset: fmt::Display,
    {
        if let Some(last) = self.messages.last() {
            self.last_message_summary = last.text.clone();
            self.last_activity_time = last.raw_timestamp;
            self.last_activity_label = format_relative_time(&last.raw_timestamp, now, locale);
        }
    }
}

/// Builds the conversation list from a full snapshot of records.
///
/// Non-text records and records with an empty body are skipped, as are
/// records with neither `from` nor `to`. A surviving record whose timestamp
/// cannot be read fails the whole pass.
pub fn aggregate<Tz: TimeZone>(
    records: &[MessageRecord],
    now: &DateTime<Tz>,
    locale: &Locale,
) -> Result<Vec<Conversation>>
where
    Tz::Offset: fmt::Display,
{
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(&str, Vec<(DateTime<Utc>, &MessageRecord, &str)>)> = Vec::new();

    for record in records {
        if !record.is_text() {
            continue;
        }
        let Some(body) = record.body() else { continue };
        let Some(key) = record.counterpart() else { continue };
        let timestamp = record.timestamp()?;

        let slot = *index.entry(key).or_insert_with(|| {
            groups.push((key, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push((timestamp, record, body));
    }

    let mut conversations: Vec<Conversation> = groups
        .into_iter()
        .filter_map(|(key, mut members)| {
            members.sort_by_key(|(ts, _, _)| *ts);
            let messages: Vec<DisplayMessage> = members
                .into_iter()
                .map(|(ts, record, body)| DisplayMessage {
                    text: body.to_string(),
                    direction: if record.from.as_deref() == Some(key) {
                        Direction::Received
                    } else {
                        Direction::Sent
                    },
                    formatted_time: format_relative_time(&ts, now, locale),
                    raw_timestamp: ts,
                    pending: false,
                })
                .collect();
            let last = messages.last()?;
            let last_message_summary = last.text.clone();
            let last_activity_time = last.raw_timestamp;
            let last_activity_label = last.formatted_time.clone();
            Some(Conversation {
                counterpart_address: key.to_string(),
                display_name: format_address(Some(key), locale),
                messages,
                last_message_summary,
                last_activity_time,
                last_activity_label,
            })
        })
        .collect();

    sort_by_recent_activity(&mut conversations);
    Ok(conversations)
}

/// Most recent first; equal times keep their current order.
pub fn sort_by_recent_activity(conversations: &mut [Conversation]) {
    conversations.sort_by(|a, b| b.last_activity_time.cmp(&a.last_activity_time));
}

/// Labels an instant relative to `now`, counting calendar days in `now`'s
/// time zone rather than elapsed 24-hour periods.
pub fn format_relative_time<Tz: TimeZone>(
    timestamp: &DateTime<Utc>,
    now: &DateTime<Tz>,
    locale: &Locale,
) -> String
where
    Tz::Offset: fmt::Display,
{
    let local = timestamp.with_timezone(&now.timezone());
    let days = now
        .date_naive()
        .signed_duration_since(local.date_naive())
        .num_days();

    match days {
        0 => local.format("%H:%M").to_string(),
        1 => locale.yesterday.to_string(),
        2..=6 => locale.weekday(local.weekday()).to_string(),
        _ => local.format("%d.%m.%Y").to_string(),
    }
}

/// Renders a 12-digit address as `+CC AAA BBB CCCC`.
pub fn format_address(raw: Option<&str>, locale: &Locale) -> String {
    let Some(raw) = raw else {
        return locale.unknown_address.to_string();
    };
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if digits.len() != 12 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return locale.unknown_address.to_string();
    }
    format!(
        "+{} {} {} {}",
        &digits[0..2],
        &digits[2..5],
        &digits[5..8],
        &digits[8..12]
    )
}
