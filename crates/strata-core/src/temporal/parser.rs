//! Natural-language temporal cues mapped to symbolic query windows.
//!
//! Recognised, in priority order:
//! 1. Explicit dates (`2024-01-15`, `1/15/2024`)
//! 2. Relative numbers (`3 days ago`, `last 2 weeks`, `hace 3 días`, `vor 2 Wochen`, `il y a 5 jours`)
//! 3. Keywords, longest match first (English, Spanish, German, French)
//! 4. The configured default window

use chrono::{DateTime, Duration, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Symbolic look-back window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemporalWindow {
    /// Up to 6 hours.
    Immediate,
    /// Up to 24 hours.
    Recent,
    /// Up to 7 days.
    ShortTerm,
    /// Up to 30 days.
    MediumTerm,
    /// Up to 90 days.
    LongTerm,
    /// Anything older.
    Historical,
}

impl TemporalWindow {
    /// Inclusive upper bound in hours, `None` for unbounded.
    pub fn max_hours(&self) -> Option<f64> {
        match self {
            Self::Immediate => Some(6.0),
            Self::Recent => Some(24.0),
            Self::ShortTerm => Some(168.0),
            Self::MediumTerm => Some(720.0),
            Self::LongTerm => Some(2160.0),
            Self::Historical => None,
        }
    }

    /// Smallest window covering `hours` of look-back.
    pub fn from_hours(hours: f64) -> Self {
        let hours = hours.max(0.0);
        [
            Self::Immediate,
            Self::Recent,
            Self::ShortTerm,
            Self::MediumTerm,
            Self::LongTerm,
        ]
        .into_iter()
        .find(|w| w.max_hours().is_some_and(|max| hours <= max))
        .unwrap_or(Self::Historical)
    }
}

/// Longest look-back a parsed query can ask for, about a century.
pub const MAX_LOOKBACK_HOURS: f64 = 876_000.0;

fn cutoff_for(now: DateTime<Utc>, hours: f64) -> DateTime<Utc> {
    Duration::try_minutes((hours * 60.0) as i64)
        .and_then(|back| now.checked_sub_signed(back))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// How a query's window was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseKind {
    ExplicitDate,
    RelativeNumber,
    Keyword,
    Default,
}

impl ParseKind {
    /// Parse confidence: explicit > relative > keyword > default.
    pub fn confidence(&self) -> f64 {
        match self {
            Self::ExplicitDate => 0.95,
            Self::RelativeNumber => 0.9,
            Self::Keyword => 0.75,
            Self::Default => 0.3,
        }
    }
}

/// Result of parsing temporal cues from a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalQuery {
    pub window: TemporalWindow,
    /// Look-back implied by the cue.
    pub hours_back: f64,
    /// `now - hours_back`.
    pub cutoff: DateTime<Utc>,
    pub confidence: f64,
    pub kind: ParseKind,
    /// Text that produced the match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<String>,
}

// Keyword -> look-back hours. Matched longest first.
const KEYWORDS: &[(&str, f64)] = &[
    // English
    ("right now", 1.0),
    ("just now", 1.0),
    ("now", 1.0),
    ("currently", 6.0),
    ("this morning", 12.0),
    ("tonight", 12.0),
    ("today", 24.0),
    ("last night", 24.0),
    ("yesterday", 48.0),
    ("recently", 72.0),
    ("past few days", 96.0),
    ("this week", 168.0),
    ("last week", 336.0),
    ("this month", 720.0),
    ("last month", 1440.0),
    ("this year", 4380.0),
    ("last year", 8760.0),
    ("years ago", 17520.0),
    ("long ago", 17520.0),
    ("historically", 17520.0),
    // Spanish
    ("ahora", 1.0),
    ("hoy", 24.0),
    ("ayer", 48.0),
    ("recientemente", 72.0),
    ("esta semana", 168.0),
    ("la semana pasada", 336.0),
    ("este mes", 720.0),
    ("el mes pasado", 1440.0),
    ("el año pasado", 8760.0),
    // German
    ("jetzt", 1.0),
    ("heute", 24.0),
    ("gestern", 48.0),
    ("kürzlich", 72.0),
    ("diese woche", 168.0),
    ("letzte woche", 336.0),
    ("diesen monat", 720.0),
    ("letzten monat", 1440.0),
    ("letztes jahr", 8760.0),
    // French
    ("maintenant", 1.0),
    ("aujourd'hui", 24.0),
    ("hier", 48.0),
    ("récemment", 72.0),
    ("cette semaine", 168.0),
    ("la semaine dernière", 336.0),
    ("ce mois", 720.0),
    ("le mois dernier", 1440.0),
    ("l'année dernière", 8760.0),
];

static KEYWORDS_BY_LENGTH: Lazy<Vec<(&'static str, f64)>> = Lazy::new(|| {
    let mut sorted = KEYWORDS.to_vec();
    sorted.sort_by(|a, b| b.0.chars().count().cmp(&a.0.chars().count()));
    sorted
});

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").unwrap());

static US_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").unwrap());

static RELATIVE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // 3 days ago
        Regex::new(r"(?i)\b(\d+)\s*(hours?|hrs?|days?|weeks?|wks?|months?|years?|yrs?)\s+ago\b")
            .unwrap(),
        // last 2 weeks, past 10 days
        Regex::new(r"(?i)\b(?:last|past)\s+(\d+)\s+(hours?|days?|weeks?|months?|years?)\b")
            .unwrap(),
        // hace 3 días
        Regex::new(r"(?i)\bhace\s+(\d+)\s+(horas?|d[ií]as?|semanas?|mes(?:es)?|años?)").unwrap(),
        // vor 2 Wochen
        Regex::new(r"(?i)\bvor\s+(\d+)\s+(stunden?|tag(?:en)?|wochen?|monat(?:en)?|jahr(?:en)?)")
            .unwrap(),
        // il y a 5 jours
        Regex::new(r"(?i)\bil y a\s+(\d+)\s+(heures?|jours?|semaines?|mois|ans?)").unwrap(),
    ]
});

fn unit_hours(unit: &str) -> Option<f64> {
    let unit = unit.to_lowercase();
    let hours = if unit.starts_with('h') && !unit.starts_with("hace") || unit.starts_with("stund") {
        1.0
    } else if unit.starts_with('d') || unit.starts_with("tag") || unit.starts_with("jour") {
        24.0
    } else if unit.starts_with('w') || unit.starts_with("seman") || unit.starts_with("woch") {
        168.0
    } else if unit.starts_with("mo") || unit.starts_with("mes") || unit.starts_with("mois") {
        720.0
    } else if unit.starts_with('y')
        || unit.starts_with("año")
        || unit.starts_with("jahr")
        || unit.starts_with("an")
    {
        8760.0
    } else {
        return None;
    };
    Some(hours)
}

fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    let is_word = |c: char| c.is_alphanumeric() || c == '\'';
    haystack.match_indices(phrase).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + phrase.len()..].chars().next();
        !before.is_some_and(is_word) && !after.is_some_and(is_word)
    })
}

/// Parses temporal cues out of free text.
#[derive(Debug, Clone)]
pub struct TemporalParser {
    default_window: TemporalWindow,
}

impl Default for TemporalParser {
    fn default() -> Self {
        Self::new(TemporalWindow::MediumTerm)
    }
}

impl TemporalParser {
    pub fn new(default_window: TemporalWindow) -> Self {
        Self { default_window }
    }

    /// Parse `text` relative to `now`.
    pub fn parse(&self, text: &str, now: DateTime<Utc>) -> TemporalQuery {
        if let Some((date, matched)) = self.explicit_date(text) {
            let midnight = date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()).unwrap_or(now);
            let hours = (now.signed_duration_since(midnight).num_minutes() as f64 / 60.0).max(0.0);
            return self.build(hours, ParseKind::ExplicitDate, Some(matched), now);
        }

        if let Some((hours, matched)) = self.relative_number(text) {
            return self.build(hours, ParseKind::RelativeNumber, Some(matched), now);
        }

        let lowered = text.to_lowercase();
        for (keyword, hours) in KEYWORDS_BY_LENGTH.iter() {
            if contains_phrase(&lowered, keyword) {
                return self.build(*hours, ParseKind::Keyword, Some(keyword.to_string()), now);
            }
        }

        let hours = self
            .default_window
            .max_hours()
            .unwrap_or(8760.0)
            .min(MAX_LOOKBACK_HOURS);
        TemporalQuery {
            window: self.default_window,
            hours_back: hours,
            cutoff: cutoff_for(now, hours),
            confidence: ParseKind::Default.confidence(),
            kind: ParseKind::Default,
            matched: None,
        }
    }

    fn build(
        &self,
        hours: f64,
        kind: ParseKind,
        matched: Option<String>,
        now: DateTime<Utc>,
    ) -> TemporalQuery {
        let hours = hours.clamp(0.0, MAX_LOOKBACK_HOURS);
        TemporalQuery {
            window: TemporalWindow::from_hours(hours),
            hours_back: hours,
            cutoff: cutoff_for(now, hours),
            confidence: kind.confidence(),
            kind,
            matched,
        }
    }

    fn explicit_date(&self, text: &str) -> Option<(NaiveDate, String)> {
        if let Some(cap) = ISO_DATE.captures(text) {
            if let (Ok(y), Ok(m), Ok(d)) = (
                cap[1].parse::<i32>(),
                cap[2].parse::<u32>(),
                cap[3].parse::<u32>(),
            ) {
                if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
                    return Some((date, cap[0].to_string()));
                }
            }
        }

        if let Some(cap) = US_DATE.captures(text) {
            if let (Ok(m), Ok(d), Ok(y)) = (
                cap[1].parse::<u32>(),
                cap[2].parse::<u32>(),
                cap[3].parse::<i32>(),
            ) {
                if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
                    return Some((date, cap[0].to_string()));
                }
            }
        }

        None
    }

    fn relative_number(&self, text: &str) -> Option<(f64, String)> {
        for pattern in RELATIVE_PATTERNS.iter() {
            if let Some(cap) = pattern.captures(text) {
                let count: f64 = cap[1].parse().ok()?;
                let unit = unit_hours(&cap[2])?;
                return Some((count * unit, cap[0].to_string()));
            }
        }
        None
    }
}
