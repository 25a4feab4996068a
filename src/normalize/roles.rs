//! Column role inference for header-less activity sheets.
//!
//! Every column gets a score in `[0, 1]` per role and roles are claimed
//! greedily: date, duration, identifier, name, shift. A role whose best
//! score stays under its threshold falls back to the positional layout of
//! the usual 8-column export (`name, identifier, unit, shift, activity,
//! date, minutes, note`), available only when the sheet has at least seven
//! non-empty columns.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::excel::CellValue;

const NAME_SAMPLE: usize = 500;
const CODE_SAMPLE: usize = 800;

const DATE_THRESHOLD: f64 = 0.6;
const DURATION_THRESHOLD: f64 = 0.6;
const IDENTIFIER_THRESHOLD: f64 = 0.45;
const NAME_THRESHOLD: f64 = 0.35;
const SHIFT_THRESHOLD: f64 = 0.25;

const SHIFT_PATTERN: &str = r"^[A-Z]{1,2}\d{1,3}$";
const KNOWN_SHIFT_CODES: &[&str] = &["FER", "RPD", "MAL", "ASS", "RIP", "RIPO", "PER", "P"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Date,
    Duration,
    Identifier,
    Name,
    Shift,
    Unit,
    Activity,
    Note,
}

impl Role {
    /// Column index in the 8-column export layout.
    fn position(self) -> usize {
        match self {
            Role::Name => 0,
            Role::Identifier => 1,
            Role::Unit => 2,
            Role::Shift => 3,
            Role::Activity => 4,
            Role::Date => 5,
            Role::Duration => 6,
            Role::Note => 7,
        }
    }
}

/// Best-scoring column for a scored role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleScore {
    pub role: Role,
    pub column: Option<usize>,
    pub score: f64,
}

/// Role to column mapping; indices refer to the scored columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub date: Option<usize>,
    pub duration: Option<usize>,
    pub identifier: Option<usize>,
    pub name: Option<usize>,
    pub shift: Option<usize>,
    pub unit: Option<usize>,
    pub activity: Option<usize>,
    pub note: Option<usize>,
    /// Scored roles that fell back to the positional layout (or to nothing).
    pub low_confidence: Vec<Role>,
    pub scores: Vec<RoleScore>,
}

impl RoleAssignment {
    pub fn column(&self, role: Role) -> Option<usize> {
        match role {
            Role::Date => self.date,
            Role::Duration => self.duration,
            Role::Identifier => self.identifier,
            Role::Name => self.name,
            Role::Shift => self.shift,
            Role::Unit => self.unit,
            Role::Activity => self.activity,
            Role::Note => self.note,
        }
    }
}

/// Infer roles for a set of non-empty columns.
pub fn infer_roles(columns: &[Vec<CellValue>]) -> RoleAssignment {
    let width = columns.len();
    let positional = |role: Role| -> Option<usize> {
        match role {
            _ if width < 7 => None,
            Role::Note if width < 8 => None,
            r => Some(r.position()),
        }
    };

    let mut out = RoleAssignment {
        unit: positional(Role::Unit),
        activity: positional(Role::Activity),
        note: positional(Role::Note),
        ..Default::default()
    };

    let shift_re = Regex::new(SHIFT_PATTERN).ok();
    let mut claimed: Vec<usize> = Vec::new();

    let steps: [(Role, f64, fn(&[CellValue], Option<&Regex>) -> f64); 5] = [
        (Role::Date, DATE_THRESHOLD, |c, _| date_score(c)),
        (Role::Duration, DURATION_THRESHOLD, |c, _| duration_score(c)),
        (Role::Identifier, IDENTIFIER_THRESHOLD, |c, _| identifier_score(c)),
        (Role::Name, NAME_THRESHOLD, |c, _| name_score(c)),
        (Role::Shift, SHIFT_THRESHOLD, |c, re| shift_score(c, re)),
    ];

    for (role, threshold, score_fn) in steps {
        let penalty = if role == Role::Duration { 0.2 } else { 0.1 };
        let scores: Vec<f64> = columns
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let s = score_fn(col, shift_re.as_ref());
                if claimed.contains(&idx) {
                    s * penalty
                } else {
                    s
                }
            })
            .collect();

        let (best, best_score) = leftmost_max(&scores);
        let chosen = match best {
            Some(idx) if best_score >= threshold => Some(idx),
            _ => {
                out.low_confidence.push(role);
                let fallback = positional(role);
                tracing::debug!(
                    role = ?role,
                    best_score,
                    fallback = ?fallback,
                    "Low-confidence column role, using positional layout"
                );
                fallback
            }
        };

        out.scores.push(RoleScore {
            role,
            column: best,
            score: best_score,
        });
        if let Some(idx) = chosen {
            claimed.push(idx);
        }
        match role {
            Role::Date => out.date = chosen,
            Role::Duration => out.duration = chosen,
            Role::Identifier => out.identifier = chosen,
            Role::Name => out.name = chosen,
            _ => out.shift = chosen,
        }
    }

    out
}

/// Highest score, first column on ties.
fn leftmost_max(scores: &[f64]) -> (Option<usize>, f64) {
    let mut best: Option<usize> = None;
    let mut best_score = 0.0;
    for (idx, &s) in scores.iter().enumerate() {
        if best.is_none() || s > best_score {
            best = Some(idx);
            best_score = s;
        }
    }
    (best, best_score)
}

fn fraction(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

fn sample_texts(column: &[CellValue], limit: usize) -> Vec<String> {
    column.iter().take(limit).map(CellValue::as_text).collect()
}

/// Share of day-first parsable cells times share of years in 2000..=2100.
pub fn date_score(column: &[CellValue]) -> f64 {
    let parsed: Vec<i32> = column
        .iter()
        .filter_map(CellValue::as_datetime)
        .map(|dt| chrono::Datelike::year(&dt))
        .collect();
    if parsed.is_empty() {
        return 0.0;
    }
    let ok = fraction(parsed.len(), column.len());
    let in_range = fraction(
        parsed.iter().filter(|y| (2000..=2100).contains(*y)).count(),
        parsed.len(),
    );
    ok * in_range
}

pub fn duration_score(column: &[CellValue]) -> f64 {
    fraction(
        column.iter().filter(|c| c.as_f64().is_some()).count(),
        column.len(),
    )
}

/// Short alphanumeric codes with at least one digit, mostly unique.
pub fn identifier_score(column: &[CellValue]) -> f64 {
    let sample = sample_texts(column, CODE_SAMPLE);
    if sample.is_empty() {
        return 0.0;
    }
    let n = sample.len();
    let has_digit = fraction(sample.iter().filter(|s| has_digit(s)).count(), n);
    let no_space = 1.0 - fraction(sample.iter().filter(|s| has_space(s)).count(), n);
    let pattern = fraction(sample.iter().filter(|s| is_identifier_like(s)).count(), n);
    let unique = fraction(sample.iter().collect::<HashSet<_>>().len(), n);

    let score = has_digit * 0.35 + no_space * 0.25 + pattern * 0.25 + (unique / 0.9).min(1.0) * 0.15;
    score.clamp(0.0, 1.0)
}

/// Words separated by spaces, no digits, reasonably long.
pub fn name_score(column: &[CellValue]) -> f64 {
    let sample = sample_texts(column, NAME_SAMPLE);
    if sample.is_empty() {
        return 0.0;
    }
    let n = sample.len();
    let has_space = fraction(sample.iter().filter(|s| has_space(s)).count(), n);
    let has_digit = fraction(sample.iter().filter(|s| has_digit(s)).count(), n);
    let avg_len = sample.iter().map(|s| s.chars().count()).sum::<usize>() as f64 / n as f64;

    let score = has_space * 0.6 + (1.0 - has_digit) * 0.3 + (avg_len / 12.0).min(1.0) * 0.1;
    score.clamp(0.0, 1.0)
}

/// Codes like `M78`, `N11` or one of the well-known absence codes.
pub fn shift_score(column: &[CellValue], pattern: Option<&Regex>) -> f64 {
    let sample: Vec<String> = sample_texts(column, CODE_SAMPLE)
        .into_iter()
        .map(|s| s.to_uppercase())
        .collect();
    if sample.is_empty() {
        return 0.0;
    }
    let n = sample.len();
    let matches = pattern
        .map(|re| fraction(sample.iter().filter(|s| re.is_match(s)).count(), n))
        .unwrap_or(0.0);
    let known = fraction(
        sample.iter().filter(|s| KNOWN_SHIFT_CODES.contains(&s.as_str())).count(),
        n,
    );
    let short = fraction(
        sample.iter().filter(|s| (2..=5).contains(&s.chars().count())).count(),
        n,
    );

    let score = matches * 0.6 + known * 0.25 + short * 0.15;
    score.clamp(0.0, 1.0)
}

fn has_digit(s: &str) -> bool {
    s.chars().any(|c| c.is_ascii_digit())
}

fn has_space(s: &str) -> bool {
    s.chars().any(char::is_whitespace)
}

fn is_identifier_like(s: &str) -> bool {
    (3..=10).contains(&s.len()) && s.chars().all(|c| c.is_ascii_alphanumeric()) && has_digit(s)
}
