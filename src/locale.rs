use serde::{Deserialize, Serialize};

/// Which label set the inbox renders with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LocaleKind {
    #[default]
    Tr,
    En,
}

/// User-facing labels. Weekdays are indexed from Sunday.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locale {
    pub yesterday: &'static str,
    pub weekdays: [&'static str; 7],
    pub unknown_address: &'static str,
    pub no_chats: &'static str,
    pub no_messages: &'static str,
    pub select_chat_first: &'static str,
    pub send_failed: &'static str,
}

pub const TURKISH: Locale = Locale {
    yesterday: "Dün",
    weekdays: [
        "Pazar",
        "Pazartesi",
        "Salı",
        "Çarşamba",
        "Perşembe",
        "Cuma",
        "Cumartesi",
    ],
    unknown_address: "Bilinmeyen",
    no_chats: "Henüz sohbet yok",
    no_messages: "Henüz mesaj yok",
    select_chat_first: "Lütfen bir sohbet seçin",
    send_failed: "Mesaj gönderilemedi",
};

pub const ENGLISH: Locale = Locale {
    yesterday: "Yesterday",
    weekdays: [
        "Sunday",
        "Monday",
        "Tuesday",
        "Wednesday",
        "Thursday",
        "Friday",
        "Saturday",
    ],
    unknown_address: "Unknown",
    no_chats: "No chats yet",
    no_messages: "No messages yet",
    select_chat_first: "Please select a chat",
    send_failed: "Message could not be sent",
};

impl Locale {
    pub fn for_kind(kind: LocaleKind) -> &'static Locale {
        match kind {
            LocaleKind::Tr => &TURKISH,
            LocaleKind::En => &ENGLISH,
        }
    }

    pub fn weekday(&self, weekday: chrono::Weekday) -> &'static str {
        self.weekdays[weekday.num_days_from_sunday() as usize]
    }
}

impl Default for Locale {
    fn default() -> Self {
        TURKISH
    }
}
