//! Data model shared by the adapters, the pipeline, and the output writers.
//!
//! Nothing here outlives a single request: candidates are built per search and
//! responses are rendered and dropped.

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A chapter number with at most one decimal digit ("12", "12.5").
///
/// Stored as tenths so it is exact, totally ordered, and usable as a set key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChapterNumber(u32);

impl ChapterNumber {
    pub const fn from_tenths(tenths: u32) -> Self {
        Self(tenths)
    }

    pub const fn whole(n: u32) -> Self {
        Self(n * 10)
    }

    pub const fn tenths(self) -> u32 {
        self.0
    }

    pub const fn integer_part(self) -> u32 {
        self.0 / 10
    }

    /// Decimal digit after the point (0 for whole chapters).
    pub const fn decimal_digit(self) -> u32 {
        self.0 % 10
    }

    pub const fn is_whole(self) -> bool {
        self.0 % 10 == 0
    }

    /// Parse a chapter number scraped from a site. Accepts more than one decimal
    /// digit and rounds to the nearest tenth ("10.25" -> 10.3).
    pub fn parse_lenient(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit() || c == '.') {
            return None;
        }
        let value: f64 = s.parse().ok()?;
        if !value.is_finite() || value < 0.0 || value > (u32::MAX / 10) as f64 {
            return None;
        }
        Some(Self((value * 10.0).round() as u32))
    }
}

/// Error from [ChapterNumber::from_str]. Carries the rejected input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{0}' is not a chapter number")]
pub struct ParseChapterError(pub String);

impl FromStr for ChapterNumber {
    type Err = ParseChapterError;

    /// Strict form used for user input: digits, optionally followed by one decimal digit.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        let err = || ParseChapterError(t.to_string());
        let (int_part, frac_part) = match t.split_once('.') {
            Some((i, f)) => (i, Some(f)),
            None => (t, None),
        };
        if int_part.is_empty() || !int_part.chars().all(|c| c.is_ascii_digit()) {
            return Err(err());
        }
        let int: u32 = int_part.parse().map_err(|_| err())?;
        let frac = match frac_part {
            None => 0,
            Some(f) if f.len() == 1 && f.chars().all(|c| c.is_ascii_digit()) => {
                f.parse::<u32>().map_err(|_| err())?
            }
            Some(_) => return Err(err()),
        };
        int.checked_mul(10)
            .and_then(|v| v.checked_add(frac))
            .map(Self)
            .ok_or_else(err)
    }
}

impl fmt::Display for ChapterNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_whole() {
            write!(f, "{}", self.integer_part())
        } else {
            write!(f, "{}.{}", self.integer_part(), self.decimal_digit())
        }
    }
}

impl Serialize for ChapterNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_whole() {
            serializer.serialize_u32(self.integer_part())
        } else {
            serializer.serialize_f64(self.0 as f64 / 10.0)
        }
    }
}

/// One search hit: a title and the identifier the adapter needs to find it again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TitleCandidate {
    pub title: String,
    /// Series URL or slug, depending on the site.
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
}

impl TitleCandidate {
    pub fn new(title: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            id: id.into(),
            referer: None,
            latest: None,
            status: None,
            updated: None,
        }
    }
}

/// Page selection. `Low` keeps every other page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quality {
    #[default]
    High,
    Low,
}

impl Quality {
    /// `low` (any case) selects Low; anything else, including an empty value, is High.
    pub fn from_param(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("low") {
            Quality::Low
        } else {
            Quality::High
        }
    }

    /// Keep pages according to quality, preserving each page's original 0-based index.
    pub fn select<T>(self, pages: Vec<T>) -> Vec<(usize, T)> {
        pages
            .into_iter()
            .enumerate()
            .filter(|(i, _)| self == Quality::High || i % 2 == 0)
            .collect()
    }
}

/// Resolved images for one chapter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChapterImages {
    pub chapter: ChapterNumber,
    pub images: Vec<String>,
}

/// Response body for one manga request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MangaResponse {
    pub manga: String,
    pub source: String,
    pub chapters: Vec<ChapterImages>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn chapter_number_parses_whole_and_half() -> Result<(), ParseChapterError> {
        assert_eq!("3".parse::<ChapterNumber>()?, ChapterNumber::whole(3));
        assert_eq!("3.5".parse::<ChapterNumber>()?.tenths(), 35);
        assert_eq!(" 12 ".parse::<ChapterNumber>()?, ChapterNumber::whole(12));
        Ok(())
    }

    #[test]
    fn chapter_number_rejects_garbage() {
        for bad in ["", "abc", "-1", "1.25", "1.", ".5", "1e3", "1.5.2"] {
            assert!(bad.parse::<ChapterNumber>().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn parse_error_names_rejected_input() {
        let err = "1.25".parse::<ChapterNumber>().unwrap_err();
        assert_eq!(err, ParseChapterError("1.25".to_string()));
        assert_eq!(err.to_string(), "'1.25' is not a chapter number");
    }

    #[test]
    fn chapter_number_lenient_rounds_to_tenths() {
        assert_eq!(
            ChapterNumber::parse_lenient("10.25"),
            Some(ChapterNumber::from_tenths(103))
        );
        assert_eq!(ChapterNumber::parse_lenient("007"), Some(ChapterNumber::whole(7)));
        assert_eq!(ChapterNumber::parse_lenient("x1"), None);
    }

    #[test]
    fn chapter_number_display() {
        assert_eq!(ChapterNumber::whole(7).to_string(), "7");
        assert_eq!(ChapterNumber::from_tenths(75).to_string(), "7.5");
    }

    #[test]
    fn low_quality_keeps_even_indices() {
        let picked = Quality::Low.select(vec!["a", "b", "c", "d", "e"]);
        assert_eq!(picked, vec![(0, "a"), (2, "c"), (4, "e")]);
        assert_eq!(Quality::High.select(vec!["a", "b"]).len(), 2);
    }

    #[test]
    fn quality_param_defaults_to_high() {
        assert_eq!(Quality::from_param("low"), Quality::Low);
        assert_eq!(Quality::from_param(" LOW "), Quality::Low);
        assert_eq!(Quality::from_param("high"), Quality::High);
        assert_eq!(Quality::from_param("medium"), Quality::High);
        assert_eq!(Quality::from_param(""), Quality::High);
    }

    #[test]
    fn response_serializes_to_api_shape() -> Result<(), Box<dyn Error>> {
        let response = MangaResponse {
            manga: "One Piece".to_string(),
            source: "1".to_string(),
            chapters: vec![
                ChapterImages {
                    chapter: ChapterNumber::whole(1),
                    images: vec!["http://localhost/images/one_piece/chapter-1/page-001.jpg"
                        .to_string()],
                },
                ChapterImages {
                    chapter: ChapterNumber::from_tenths(15),
                    images: vec![],
                },
            ],
        };
        let value: serde_json::Value = serde_json::to_value(&response)?;
        assert_eq!(value["manga"], "One Piece");
        assert_eq!(value["source"], "1");
        assert_eq!(value["chapters"][0]["chapter"], 1);
        assert_eq!(value["chapters"][1]["chapter"], 1.5);
        assert_eq!(
            value["chapters"][0]["images"][0],
            "http://localhost/images/one_piece/chapter-1/page-001.jpg"
        );
        Ok(())
    }
}
