//! パイプライン全体で共有するドメイン型。
//!
//! Record → LabeledRecord → QuarterKey → TrendRow の順にデータが流れる。
use std::fmt;

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Three-way sentiment class assigned to every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    /// Label used whenever a classification cannot be obtained.
    pub const FALLBACK: Sentiment = Sentiment::Neutral;

    pub const ALL: [Sentiment; 3] = [
        Sentiment::Positive,
        Sentiment::Negative,
        Sentiment::Neutral,
    ];

    /// Parses a label case-insensitively. Unknown spellings return `None`.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "positive" => Some(Self::Positive),
            "negative" => Some(Self::Negative),
            "neutral" => Some(Self::Neutral),
            _ => None,
        }
    }

    /// Like [`Sentiment::parse`] but never leaves a record unlabeled.
    #[must_use]
    pub fn parse_or_fallback(label: &str) -> Self {
        Self::parse(label).unwrap_or(Self::FALLBACK)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "Positive",
            Self::Negative => "Negative",
            Self::Neutral => "Neutral",
        }
    }

    /// Lowercase key used by chart colour and marker maps.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw post as produced by the extraction step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub text: String,
    pub timestamp: Option<NaiveDateTime>,
}

impl Record {
    pub fn new(text: impl Into<String>, timestamp: Option<NaiveDateTime>) -> Self {
        Self {
            text: text.into(),
            timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledRecord {
    pub record: Record,
    pub label: Sentiment,
}

impl LabeledRecord {
    #[must_use]
    pub fn new(record: Record, label: Sentiment) -> Self {
        Self { record, label }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.record.text
    }

    #[must_use]
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        self.record.timestamp
    }
}

/// Calendar quarter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Quarter {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl Quarter {
    pub const ALL: [Quarter; 4] = [Quarter::Q1, Quarter::Q2, Quarter::Q3, Quarter::Q4];

    /// Maps a 1-based month to its quarter. Months outside 1..=12 yield `None`.
    #[must_use]
    pub fn from_month(month: u32) -> Option<Self> {
        match month {
            1..=3 => Some(Self::Q1),
            4..=6 => Some(Self::Q2),
            7..=9 => Some(Self::Q3),
            10..=12 => Some(Self::Q4),
            _ => None,
        }
    }

    #[must_use]
    pub fn of(timestamp: NaiveDateTime) -> Self {
        // chrono guarantees month() is within 1..=12
        Self::from_month(timestamp.month()).unwrap_or(Self::Q4)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Q1 => "Q1",
            Self::Q2 => "Q2",
            Self::Q3 => "Q3",
            Self::Q4 => "Q4",
        }
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Year component of a partition identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PartitionYear {
    Known(i32),
    Unknown,
}

impl fmt::Display for PartitionYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(year) => write!(f, "{year}"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QuarterKey {
    pub year: PartitionYear,
    pub quarter: Quarter,
}

impl QuarterKey {
    #[must_use]
    pub fn new(year: PartitionYear, quarter: Quarter) -> Self {
        Self { year, quarter }
    }

    #[must_use]
    pub fn known(year: i32, quarter: Quarter) -> Self {
        Self::new(PartitionYear::Known(year), quarter)
    }

    /// Storage key, e.g. `2024_Q1`.
    #[must_use]
    pub fn resource_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for QuarterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.year, self.quarter)
    }
}

/// Inclusive range of analysis years.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

impl YearRange {
    /// Returns `None` when `start > end`.
    #[must_use]
    pub fn new(start: i32, end: i32) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// Every quarter in the range, chronologically.
    pub fn quarter_keys(&self) -> impl Iterator<Item = QuarterKey> + use<> {
        (self.start..=self.end)
            .flat_map(|year| Quarter::ALL.into_iter().map(move |q| QuarterKey::known(year, q)))
    }
}

impl fmt::Display for YearRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// One quarter's class percentages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendRow {
    pub quarter_id: String,
    pub positive_pct: f64,
    pub negative_pct: f64,
    pub neutral_pct: f64,
}

impl TrendRow {
    #[must_use]
    pub fn pct(&self, sentiment: Sentiment) -> f64 {
        match sentiment {
            Sentiment::Positive => self.positive_pct,
            Sentiment::Negative => self.negative_pct,
            Sentiment::Neutral => self.neutral_pct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, Quarter::Q1)]
    #[case(2, Quarter::Q1)]
    #[case(3, Quarter::Q1)]
    #[case(4, Quarter::Q2)]
    #[case(5, Quarter::Q2)]
    #[case(6, Quarter::Q2)]
    #[case(7, Quarter::Q3)]
    #[case(8, Quarter::Q3)]
    #[case(9, Quarter::Q3)]
    #[case(10, Quarter::Q4)]
    #[case(11, Quarter::Q4)]
    #[case(12, Quarter::Q4)]
    fn month_maps_to_quarter(#[case] month: u32, #[case] expected: Quarter) {
        assert_eq!(Quarter::from_month(month), Some(expected));
    }

    #[rstest]
    #[case(0)]
    #[case(13)]
    fn invalid_month_has_no_quarter(#[case] month: u32) {
        assert_eq!(Quarter::from_month(month), None);
    }

    #[test]
    fn sentiment_parse_is_case_insensitive() {
        assert_eq!(Sentiment::parse("POSITIVE"), Some(Sentiment::Positive));
        assert_eq!(Sentiment::parse(" negative "), Some(Sentiment::Negative));
        assert_eq!(Sentiment::parse("Neutral"), Some(Sentiment::Neutral));
        assert_eq!(Sentiment::parse("mixed"), None);
        assert_eq!(Sentiment::parse_or_fallback("mixed"), Sentiment::Neutral);
    }

    #[test]
    fn quarter_key_renders_storage_key() {
        assert_eq!(QuarterKey::known(2024, Quarter::Q3).resource_key(), "2024_Q3");
        assert_eq!(
            QuarterKey::new(PartitionYear::Unknown, Quarter::Q1).resource_key(),
            "unknown_Q1"
        );
    }

    #[test]
    fn year_range_walks_quarters_in_order() {
        let range = YearRange::new(2024, 2025).expect("valid range");
        let keys: Vec<String> = range.quarter_keys().map(|k| k.resource_key()).collect();
        assert_eq!(
            keys,
            vec![
                "2024_Q1", "2024_Q2", "2024_Q3", "2024_Q4", "2025_Q1", "2025_Q2", "2025_Q3",
                "2025_Q4"
            ]
        );
        assert!(YearRange::new(2025, 2024).is_none());
    }
}
