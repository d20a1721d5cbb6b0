//! Chapter expressions: "3", "1-10", "1,2,5-7".
//!
//! [parse] validates the expression without touching the network; [resolve]
//! turns it into the list of chapters to fetch, clipped to what the site has.

use crate::model::ChapterNumber;
use std::collections::BTreeSet;
use thiserror::Error;

/// Default cap on how many chapters one request may resolve to.
pub const DEFAULT_MAX_WIDTH: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("Invalid chapter range '{input}': {reason}")]
    InvalidRange { input: String, reason: String },
}

/// One comma-separated part of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangePart {
    Single(ChapterNumber),
    Span(ChapterNumber, ChapterNumber),
}

/// A validated chapter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeExpr {
    Single(ChapterNumber),
    /// Inclusive, start <= end.
    Span(ChapterNumber, ChapterNumber),
    /// Comma form. Parts keep their input order; deduplication happens on resolve.
    Set(Vec<RangePart>),
}

/// Limits applied while resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeLimits {
    /// Maximum width of a span in whole chapters, and maximum number of entries
    /// kept from a set. `None` disables the cap.
    pub max_width: Option<u32>,
    /// Step spans by 0.5 instead of 1 when no availability list is known.
    pub fractional: bool,
}

impl Default for RangeLimits {
    fn default() -> Self {
        Self {
            max_width: Some(DEFAULT_MAX_WIDTH),
            fractional: false,
        }
    }
}

fn invalid(input: &str, reason: impl Into<String>) -> RangeError {
    RangeError::InvalidRange {
        input: input.to_string(),
        reason: reason.into(),
    }
}

fn parse_part(input: &str, part: &str) -> Result<RangePart, RangeError> {
    let part = part.trim();
    if part.is_empty() {
        return Err(invalid(input, "empty chapter"));
    }
    match part.split_once('-') {
        None => part
            .parse::<ChapterNumber>()
            .map(RangePart::Single)
            .map_err(|e| invalid(input, e.to_string())),
        Some((from, to)) => {
            let from = from.parse::<ChapterNumber>().map_err(|e| invalid(input, e.to_string()))?;
            let to = to.parse::<ChapterNumber>().map_err(|e| invalid(input, e.to_string()))?;
            if from > to {
                return Err(invalid(
                    input,
                    format!("start ({}) is greater than end ({})", from, to),
                ));
            }
            Ok(RangePart::Span(from, to))
        }
    }
}

/// Parse and validate a chapter expression.
pub fn parse(input: &str) -> Result<RangeExpr, RangeError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(invalid(input, "empty expression"));
    }
    if trimmed.contains(',') {
        let parts = trimmed
            .split(',')
            .map(|p| parse_part(input, p))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(RangeExpr::Set(parts));
    }
    Ok(match parse_part(input, trimmed)? {
        RangePart::Single(n) => RangeExpr::Single(n),
        RangePart::Span(a, b) => RangeExpr::Span(a, b),
    })
}

/// Last chapter allowed in a span starting at `start`: start + (width - 1).
fn width_end(start: ChapterNumber, limits: &RangeLimits) -> Option<ChapterNumber> {
    limits.max_width.filter(|w| *w > 0).map(|w| {
        let span = (w - 1).saturating_mul(10);
        ChapterNumber::from_tenths(start.tenths().saturating_add(span))
    })
}

fn grid(start: ChapterNumber, end: ChapterNumber, fractional: bool) -> Vec<ChapterNumber> {
    let step = if fractional { 5 } else { 10 };
    (start.tenths()..=end.tenths())
        .step_by(step)
        .map(ChapterNumber::from_tenths)
        .collect()
}

fn resolve_span(
    start: ChapterNumber,
    end: ChapterNumber,
    available: Option<&BTreeSet<ChapterNumber>>,
    limits: &RangeLimits,
) -> Vec<ChapterNumber> {
    match available {
        Some(avail) => {
            let (Some(&lo), Some(&hi)) = (avail.first(), avail.last()) else {
                return Vec::new();
            };
            let start = start.max(lo);
            let mut end = end.min(hi);
            if let Some(cap) = width_end(start, limits) {
                end = end.min(cap);
            }
            if start > end {
                return Vec::new();
            }
            avail.range(start..=end).copied().collect()
        }
        None => {
            let end = match width_end(start, limits) {
                Some(cap) => end.min(cap),
                None => end,
            };
            grid(start, end, limits.fractional)
        }
    }
}

/// Resolve an expression into an ascending, duplicate-free chapter list.
///
/// With `available`, spans are clamped to its min/max and the result is the
/// intersection with it. Overlong spans are narrowed to `limits.max_width`
/// chapters from their (clamped) start, never rejected.
pub fn resolve(
    expr: &RangeExpr,
    available: Option<&[ChapterNumber]>,
    limits: &RangeLimits,
) -> Vec<ChapterNumber> {
    let avail: Option<BTreeSet<ChapterNumber>> = available.map(|a| a.iter().copied().collect());
    let avail = avail.as_ref();
    match expr {
        RangeExpr::Single(n) => match avail {
            Some(set) if !set.contains(n) => Vec::new(),
            _ => vec![*n],
        },
        RangeExpr::Span(a, b) => resolve_span(*a, *b, avail, limits),
        RangeExpr::Set(parts) => {
            let mut wanted = BTreeSet::new();
            for part in parts {
                match part {
                    RangePart::Single(n) => {
                        if avail.map_or(true, |set| set.contains(n)) {
                            wanted.insert(*n);
                        }
                    }
                    RangePart::Span(a, b) => {
                        wanted.extend(resolve_span(*a, *b, avail, limits));
                    }
                }
            }
            let keep = limits
                .max_width
                .filter(|w| *w > 0)
                .map_or(usize::MAX, |w| w as usize);
            wanted.into_iter().take(keep).collect()
        }
    }
}

/// Parse then resolve in one step.
pub fn parse_and_resolve(
    input: &str,
    available: Option<&[ChapterNumber]>,
    limits: &RangeLimits,
) -> Result<Vec<ChapterNumber>, RangeError> {
    let expr = parse(input)?;
    Ok(resolve(&expr, available, limits))
}
