use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Professional MMA record. Zero draws / no-contests are stored as `None`
/// so that the canonical string form round-trips exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FighterRecord {
    pub wins: u32,
    pub losses: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draws: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_contests: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordParseError {
    #[error("empty record text")]
    Empty,
    #[error("malformed record text: {0:?}")]
    Malformed(String),
}

impl FighterRecord {
    pub fn new(wins: u32, losses: u32, draws: u32, no_contests: u32) -> Self {
        Self {
            wins,
            losses,
            draws: (draws > 0).then_some(draws),
            no_contests: (no_contests > 0).then_some(no_contests),
        }
    }

    pub fn draws(&self) -> u32 {
        self.draws.unwrap_or(0)
    }

    pub fn no_contests(&self) -> u32 {
        self.no_contests.unwrap_or(0)
    }

    /// Saturates at `u32::MAX`; counts come straight from scraped text.
    pub fn total_bouts(&self) -> u32 {
        self.wins
            .saturating_add(self.losses)
            .saturating_add(self.draws())
            .saturating_add(self.no_contests())
    }
}

impl fmt::Display for FighterRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.wins, self.losses, self.draws())?;
        if self.no_contests() > 0 {
            write!(f, " ({} NC)", self.no_contests())?;
        }
        Ok(())
    }
}

impl FromStr for FighterRecord {
    type Err = RecordParseError;

    /// Accepts `W-L`, `W-L-D` and `W-L-D (N NC)`, with hyphens or en-dashes.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if text.is_empty() {
            return Err(RecordParseError::Empty);
        }

        let (counts_part, nc_part) = match text.find('(') {
            Some(idx) => (&text[..idx], Some(&text[idx..])),
            None => (text, None),
        };

        let counts = counts_part
            .trim_start_matches(|c: char| !c.is_ascii_digit())
            .split(|c: char| c == '-' || c == '\u{2013}')
            .map(str::trim)
            .map(|part| part.parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| RecordParseError::Malformed(text.to_string()))?;

        let (wins, losses, draws) = match counts.as_slice() {
            [w, l] => (*w, *l, 0),
            [w, l, d] => (*w, *l, *d),
            _ => return Err(RecordParseError::Malformed(text.to_string())),
        };

        let no_contests = match nc_part {
            Some(part) => parse_no_contests(part)
                .ok_or_else(|| RecordParseError::Malformed(text.to_string()))?,
            None => 0,
        };

        Ok(Self::new(wins, losses, draws, no_contests))
    }
}

fn parse_no_contests(part: &str) -> Option<u32> {
    let inner = part
        .trim()
        .trim_start_matches('(')
        .trim_end_matches(')')
        .trim();
    let lower = inner.to_ascii_lowercase();
    let digits = lower.strip_suffix("nc")?.trim();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_string_round_trips() {
        let records = [
            FighterRecord::new(22, 3, 0, 0),
            FighterRecord::new(27, 1, 0, 1),
            FighterRecord::new(10, 4, 2, 0),
            FighterRecord::new(0, 0, 1, 3),
        ];
        for record in records {
            let text = record.to_string();
            let parsed: FighterRecord = text.parse().unwrap();
            assert_eq!(parsed, record, "round trip through {text:?}");
        }
    }

    #[test]
    fn formats_no_contests_in_parentheses() {
        assert_eq!(FighterRecord::new(27, 1, 0, 1).to_string(), "27-1-0 (1 NC)");
        assert_eq!(FighterRecord::new(5, 2, 0, 0).to_string(), "5-2-0");
    }

    #[test]
    fn parses_en_dash_and_two_part_records() {
        let record: FighterRecord = "22\u{2013}3\u{2013}1".parse().unwrap();
        assert_eq!(record, FighterRecord::new(22, 3, 1, 0));

        let record: FighterRecord = "14-2".parse().unwrap();
        assert_eq!(record.draws, None);
        assert_eq!(record.total_bouts(), 16);
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!("".parse::<FighterRecord>(), Err(RecordParseError::Empty));
        assert!("undefeated".parse::<FighterRecord>().is_err());
        assert!("1-2-3-4".parse::<FighterRecord>().is_err());
        assert!("20-1-0 (NC)".parse::<FighterRecord>().is_err());
    }

    #[test]
    fn oversized_counts_saturate_total() {
        assert_eq!(FighterRecord::new(22, 3, 1, 1).total_bouts(), 27);
        let record: FighterRecord = format!("{}-{}-0", u32::MAX, u32::MAX).parse().unwrap();
        assert_eq!(record.total_bouts(), u32::MAX);
        assert_eq!(FighterRecord::new(u32::MAX, 0, 0, 1).total_bouts(), u32::MAX);
    }
}
