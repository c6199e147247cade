//! Cross-source event reconciliation.

use std::collections::HashMap;

use cagecard_core::{CandidateEvent, CanonicalEvent, IdentityKey, SourceTag};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strsim::jaro_winkler;
use tracing::debug;

pub const DEFAULT_EVENT_SIMILARITY: f64 = 0.80;

/// Two surviving events on the same date whose names look alike. Reported, never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearDuplicate {
    pub date: NaiveDate,
    pub event_a: String,
    pub source_a: SourceTag,
    pub event_b: String,
    pub source_b: SourceTag,
    pub confidence_score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    pub events: Vec<CanonicalEvent>,
    pub candidates: usize,
    pub dropped: usize,
    pub review: Vec<NearDuplicate>,
}

pub struct EventReconciler {
    similarity: f64,
}

impl Default for EventReconciler {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_SIMILARITY)
    }
}

impl EventReconciler {
    pub fn new(similarity: f64) -> Self {
        Self { similarity }
    }

    pub fn normalize_key_fragment(input: &str) -> String {
        input
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn similarity(&self, a: &CandidateEvent, b: &CandidateEvent) -> f64 {
        jaro_winkler(
            &Self::normalize_key_fragment(&a.name),
            &Self::normalize_key_fragment(&b.name),
        )
    }

    /// Merges candidate lists in the order given. The first candidate seen for an
    /// identity key survives; later ones only contribute their source URL.
    pub fn reconcile(&self, lists: Vec<Vec<CandidateEvent>>) -> ReconcileOutcome {
        let mut index: HashMap<IdentityKey, usize> = HashMap::new();
        let mut outcome = ReconcileOutcome::default();

        for candidate in lists.into_iter().flatten() {
            outcome.candidates += 1;
            let key = candidate.identity_key();
            match index.get(&key) {
                Some(&position) => {
                    debug!(
                        event = %candidate.name,
                        source = %candidate.source,
                        kept = %outcome.events[position].candidate.source,
                        "dropping duplicate candidate"
                    );
                    outcome.events[position].absorb(&candidate);
                    outcome.dropped += 1;
                }
                None => {
                    index.insert(key, outcome.events.len());
                    outcome.events.push(CanonicalEvent::from_candidate(candidate));
                }
            }
        }

        outcome.review = self.near_duplicates(&outcome.events);
        outcome
    }

    fn near_duplicates(&self, events: &[CanonicalEvent]) -> Vec<NearDuplicate> {
        let mut review = Vec::new();
        for i in 0..events.len() {
            for j in (i + 1)..events.len() {
                let (a, b) = (&events[i].candidate, &events[j].candidate);
                let (Some(date), Some(other)) = (a.date, b.date) else {
                    continue;
                };
                if date != other {
                    continue;
                }
                let score = self.similarity(a, b);
                if score >= self.similarity {
                    review.push(NearDuplicate {
                        date,
                        event_a: a.name.clone(),
                        source_a: a.source,
                        event_b: b.name.clone(),
                        source_b: b.source,
                        confidence_score: score,
                    });
                }
            }
        }
        review
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn candidate(source: SourceTag, id: &str, name: &str, date: Option<(i32, u32, u32)>) -> CandidateEvent {
        CandidateEvent {
            id: id.to_string(),
            name: name.to_string(),
            date: date.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
            venue: None,
            location: None,
            source,
            url: format!("https://{}/{id}", source.as_str()),
        }
    }

    #[test]
    fn first_seen_candidate_survives_and_absorbs_provenance() {
        let primary = vec![candidate(
            SourceTag::Wikipedia,
            "UFC_300",
            "UFC 300: Pereira vs. Hill",
            Some((2024, 4, 13)),
        )];
        let fallback = vec![
            candidate(SourceTag::UfcStats, "aec2", "  ufc 300: pereira vs. hill ", Some((2024, 4, 13))),
            candidate(SourceTag::UfcStats, "b3df", "UFC 301: Pantoja vs. Erceg", Some((2024, 5, 4))),
        ];

        let outcome = EventReconciler::default().reconcile(vec![primary, fallback]);
        assert_eq!(outcome.candidates, 3);
        assert_eq!(outcome.dropped, 1);
        assert_eq!(outcome.events.len(), 2);

        let survivor = &outcome.events[0];
        assert_eq!(survivor.candidate.source, SourceTag::Wikipedia);
        assert_eq!(survivor.candidate.id, "UFC_300");
        assert_eq!(survivor.source_urls.len(), 2);
        assert_eq!(
            survivor.source_urls.get(&SourceTag::UfcStats).map(String::as_str),
            Some("https://ufcstats/aec2")
        );
    }

    #[test]
    fn reconciled_keys_are_unique() {
        let lists = vec![
            vec![
                candidate(SourceTag::Wikipedia, "a", "UFC 299", Some((2024, 3, 9))),
                candidate(SourceTag::Wikipedia, "b", "UFC 299", Some((2024, 3, 9))),
                candidate(SourceTag::Wikipedia, "c", "UFC Fight Night", None),
            ],
            vec![
                candidate(SourceTag::EspnMma, "d", "ufc fight night", None),
                candidate(SourceTag::EspnMma, "e", "UFC 299", Some((2024, 3, 10))),
            ],
        ];
        let outcome = EventReconciler::default().reconcile(lists);
        let keys: HashSet<_> = outcome.events.iter().map(|e| e.candidate.identity_key()).collect();
        assert_eq!(keys.len(), outcome.events.len());
        assert_eq!(outcome.events.len(), 3);
        assert_eq!(outcome.dropped, 2);
    }

    #[test]
    fn similar_names_on_the_same_date_go_to_review() {
        let lists = vec![vec![
            candidate(SourceTag::Wikipedia, "a", "UFC 300: Pereira vs. Hill", Some((2024, 4, 13))),
            candidate(SourceTag::UfcOfficial, "b", "UFC 300: Pereira vs Hill", Some((2024, 4, 13))),
            candidate(SourceTag::UfcOfficial, "c", "UFC 300: Pereira vs Hill", Some((2024, 4, 14))),
            candidate(SourceTag::EspnMma, "d", "Noche UFC", Some((2024, 4, 13))),
        ]];
        let outcome = EventReconciler::default().reconcile(lists);
        assert_eq!(outcome.events.len(), 4, "review items are never merged");
        assert_eq!(outcome.review.len(), 1);

        let item = &outcome.review[0];
        assert_eq!(item.source_a, SourceTag::Wikipedia);
        assert_eq!(item.source_b, SourceTag::UfcOfficial);
        assert!(item.confidence_score >= DEFAULT_EVENT_SIMILARITY);
    }

    #[test]
    fn empty_input_reconciles_to_nothing() {
        let outcome = EventReconciler::default().reconcile(vec![Vec::new(), Vec::new()]);
        assert!(outcome.events.is_empty());
        assert_eq!(outcome.candidates, 0);
        assert!(outcome.review.is_empty());
    }
}
