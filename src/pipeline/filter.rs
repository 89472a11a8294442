//! Inclusion filter: a fixed chain of independent predicates.
//!
//! The first failing predicate rejects the publisher and no later predicate
//! runs. Seed ids override the region and content-type checks, and the
//! quantitative floor when configured to.

use serde::Serialize;

use super::classify::{Exclusion, KeywordBlocker, RegionHints, classify, heuristic_exclusion};
use super::sources::Blocklist;
use crate::model::{Classification, EntityRecord};

/// Why a publisher did not make it into the ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    Blocklisted,
    RegionMismatch,
    ContentType { label: Classification },
    Heuristic { pattern: Exclusion },
    BelowFloor,
    NoAcceptableVideo,
}

impl Rejection {
    /// Stable stage name used in run reports.
    #[must_use]
    pub fn stage(self) -> &'static str {
        match self {
            Rejection::Blocklisted => "blocklist",
            Rejection::RegionMismatch => "region",
            Rejection::ContentType { .. } => "content_type",
            Rejection::Heuristic { .. } => "heuristic",
            Rejection::BelowFloor => "floor",
            Rejection::NoAcceptableVideo => "no_video",
        }
    }
}

/// Everything a predicate may look at for one publisher.
#[derive(Debug, Clone)]
pub struct Subject<'a> {
    pub entity: &'a EntityRecord,
    /// Name and description, joined.
    pub text: String,
    pub label: Classification,
    pub is_seed: bool,
}

pub trait Predicate: Send + Sync {
    fn name(&self) -> &'static str;

    /// # Errors
    /// Returns the rejection reason when the subject fails this predicate.
    fn check(&self, subject: &Subject<'_>) -> Result<(), Rejection>;
}

pub struct BlocklistPredicate {
    blocklist: Blocklist,
}

impl Predicate for BlocklistPredicate {
    fn name(&self) -> &'static str {
        "blocklist"
    }

    fn check(&self, subject: &Subject<'_>) -> Result<(), Rejection> {
        if self.blocklist.contains(&subject.entity.id) {
            Err(Rejection::Blocklisted)
        } else {
            Ok(())
        }
    }
}

pub struct RegionPredicate {
    target_region: String,
    hints: RegionHints,
}

impl Predicate for RegionPredicate {
    fn name(&self) -> &'static str {
        "region"
    }

    fn check(&self, subject: &Subject<'_>) -> Result<(), Rejection> {
        let declared = subject.entity.region.trim();
        if subject.is_seed
            || declared.eq_ignore_ascii_case(&self.target_region)
            || self.hints.matches(&subject.text)
        {
            Ok(())
        } else {
            Err(Rejection::RegionMismatch)
        }
    }
}

pub struct ContentTypePredicate {
    accepted: Vec<Classification>,
}

impl Predicate for ContentTypePredicate {
    fn name(&self) -> &'static str {
        "content_type"
    }

    fn check(&self, subject: &Subject<'_>) -> Result<(), Rejection> {
        if subject.is_seed || self.accepted.contains(&subject.label) {
            Ok(())
        } else {
            Err(Rejection::ContentType {
                label: subject.label,
            })
        }
    }
}

pub struct HeuristicPredicate {
    keywords: KeywordBlocker,
}

impl Predicate for HeuristicPredicate {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn check(&self, subject: &Subject<'_>) -> Result<(), Rejection> {
        if let Some(pattern) = heuristic_exclusion(&subject.text) {
            return Err(Rejection::Heuristic { pattern });
        }
        if self.keywords.matches(&subject.text) {
            return Err(Rejection::Heuristic {
                pattern: Exclusion::BlockedKeyword,
            });
        }
        Ok(())
    }
}

pub struct FloorPredicate {
    min_subscribers: u64,
    min_total_views: u64,
    bypass_for_seeds: bool,
}

impl Predicate for FloorPredicate {
    fn name(&self) -> &'static str {
        "floor"
    }

    fn check(&self, subject: &Subject<'_>) -> Result<(), Rejection> {
        if subject.is_seed && self.bypass_for_seeds {
            return Ok(());
        }
        let entity = subject.entity;
        if entity.subscribers >= self.min_subscribers && entity.views >= self.min_total_views {
            Ok(())
        } else {
            Err(Rejection::BelowFloor)
        }
    }
}

/// Inputs for the standard predicate chain.
#[derive(Debug, Clone, Default)]
pub struct FilterPolicy {
    pub blocklist: Blocklist,
    pub target_region: String,
    pub region_hints: RegionHints,
    pub accepted_labels: Vec<Classification>,
    pub interview_label: Classification,
    pub blocked_keywords: KeywordBlocker,
    pub min_subscribers: u64,
    pub min_total_views: u64,
    pub floors_bypass_for_seeds: bool,
}

pub struct InclusionFilter {
    interview_label: Classification,
    predicates: Vec<Box<dyn Predicate>>,
}

impl InclusionFilter {
    /// Builds the chain blocklist, region, content type, heuristic, floor.
    #[must_use]
    pub fn new(policy: FilterPolicy) -> Self {
        let predicates: Vec<Box<dyn Predicate>> = vec![
            Box::new(BlocklistPredicate {
                blocklist: policy.blocklist,
            }),
            Box::new(RegionPredicate {
                target_region: policy.target_region,
                hints: policy.region_hints,
            }),
            Box::new(ContentTypePredicate {
                accepted: policy.accepted_labels,
            }),
            Box::new(HeuristicPredicate {
                keywords: policy.blocked_keywords,
            }),
            Box::new(FloorPredicate {
                min_subscribers: policy.min_subscribers,
                min_total_views: policy.min_total_views,
                bypass_for_seeds: policy.floors_bypass_for_seeds,
            }),
        ];
        Self::with_predicates(policy.interview_label, predicates)
    }

    #[must_use]
    pub fn with_predicates(
        interview_label: Classification,
        predicates: Vec<Box<dyn Predicate>>,
    ) -> Self {
        Self {
            interview_label,
            predicates,
        }
    }

    #[must_use]
    pub fn predicate_names(&self) -> Vec<&'static str> {
        self.predicates.iter().map(|predicate| predicate.name()).collect()
    }

    /// Classifies the publisher and runs the chain.
    ///
    /// # Errors
    /// Returns the first predicate's rejection.
    pub fn evaluate(&self, entity: &EntityRecord, is_seed: bool) -> Result<Classification, Rejection> {
        let text = entity.text_blob();
        let subject = Subject {
            label: classify(&text, self.interview_label),
            entity,
            text,
            is_seed,
        };
        for predicate in &self.predicates {
            predicate.check(&subject)?;
        }
        Ok(subject.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::model::CandidateId;

    fn entity(id: &str, name: &str, description: &str, region: &str) -> EntityRecord {
        EntityRecord {
            id: CandidateId::new(id),
            url: format!("https://www.youtube.com/channel/{id}"),
            name: name.to_string(),
            description: description.to_string(),
            region: region.to_string(),
            subscribers: 5_000,
            views: 100_000,
            videos: 40,
            uploads_feed: None,
        }
    }

    fn policy() -> FilterPolicy {
        FilterPolicy {
            blocklist: Blocklist::new([CandidateId::new("UC_blocked")]),
            target_region: "KE".to_string(),
            region_hints: RegionHints::new(&["kenya".to_string(), "nairobi".to_string()])
                .expect("hints"),
            accepted_labels: vec![Classification::Podcast, Classification::Interview],
            interview_label: Classification::Interview,
            blocked_keywords: KeywordBlocker::new(&["prank".to_string()]).expect("keywords"),
            min_subscribers: 1_000,
            min_total_views: 10_000,
            floors_bypass_for_seeds: true,
        }
    }

    #[test]
    fn accepts_regional_podcast() {
        let filter = InclusionFilter::new(policy());
        let verdict = filter.evaluate(&entity("UC_a", "Mic Cheque Podcast", "", "KE"), false);
        assert_eq!(verdict, Ok(Classification::Podcast));
    }

    #[test]
    fn region_hint_accepts_undeclared_region() {
        let filter = InclusionFilter::new(policy());
        let verdict = filter.evaluate(
            &entity("UC_a", "City Conversations", "Stories from Nairobi", ""),
            false,
        );
        assert_eq!(verdict, Ok(Classification::Interview));
    }

    #[test]
    fn rejects_foreign_publisher_without_hints() {
        let filter = InclusionFilter::new(policy());
        let verdict = filter.evaluate(&entity("UC_a", "Daily Podcast", "", "US"), false);
        assert_eq!(verdict, Err(Rejection::RegionMismatch));
    }

    #[test]
    fn seeds_bypass_region_content_and_floor() {
        let filter = InclusionFilter::new(policy());
        let mut seed = entity("UC_seed", "Comedy sketches", "", "US");
        seed.subscribers = 3;
        assert_eq!(filter.evaluate(&seed, true), Ok(Classification::Other));
        assert_eq!(
            filter.evaluate(&seed, false),
            Err(Rejection::RegionMismatch)
        );
    }

    #[test]
    fn seeds_do_not_bypass_blocklist_or_heuristics() {
        let filter = InclusionFilter::new(policy());
        let blocked = entity("UC_blocked", "Kenya Podcast", "", "KE");
        assert_eq!(filter.evaluate(&blocked, true), Err(Rejection::Blocklisted));

        let sports = entity("UC_s", "Derby Day Highlights: 2-1 FT", "podcast", "KE");
        assert_eq!(
            filter.evaluate(&sports, true),
            Err(Rejection::Heuristic {
                pattern: Exclusion::Sports
            })
        );
    }

    #[test]
    fn huge_sports_channel_is_still_excluded() {
        let filter = InclusionFilter::new(policy());
        let mut sports = entity("UC_s", "Derby Day Highlights: 2-1 FT", "Kenyan podcast", "KE");
        sports.subscribers = 50_000_000;
        assert!(matches!(
            filter.evaluate(&sports, false),
            Err(Rejection::Heuristic { .. })
        ));
    }

    #[test]
    fn blocked_keywords_reject_in_heuristic_stage() {
        let filter = InclusionFilter::new(policy());
        let verdict = filter.evaluate(&entity("UC_a", "Prank Podcast KE", "", "KE"), false);
        assert_eq!(
            verdict,
            Err(Rejection::Heuristic {
                pattern: Exclusion::BlockedKeyword
            })
        );
    }

    #[test]
    fn floor_applies_to_non_seeds() {
        let filter = InclusionFilter::new(policy());
        let mut small = entity("UC_a", "Tiny Podcast", "", "KE");
        small.views = 9_999;
        assert_eq!(filter.evaluate(&small, false), Err(Rejection::BelowFloor));

        let strict = InclusionFilter::new(FilterPolicy {
            floors_bypass_for_seeds: false,
            ..policy()
        });
        assert_eq!(strict.evaluate(&small, true), Err(Rejection::BelowFloor));
    }

    #[test]
    fn content_type_rejects_other_label() {
        let filter = InclusionFilter::new(policy());
        let verdict = filter.evaluate(&entity("UC_a", "Kenya Music Videos", "", "KE"), false);
        assert_eq!(
            verdict,
            Err(Rejection::ContentType {
                label: Classification::Other
            })
        );
    }

    struct Counting {
        name: &'static str,
        calls: Arc<AtomicUsize>,
        pass: bool,
    }

    impl Predicate for Counting {
        fn name(&self) -> &'static str {
            self.name
        }

        fn check(&self, _subject: &Subject<'_>) -> Result<(), Rejection> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.pass { Ok(()) } else { Err(Rejection::BelowFloor) }
        }
    }

    #[test]
    fn chain_short_circuits_on_first_failure() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let third = Arc::new(AtomicUsize::new(0));
        let filter = InclusionFilter::with_predicates(
            Classification::Interview,
            vec![
                Box::new(Counting {
                    name: "first",
                    calls: first.clone(),
                    pass: true,
                }),
                Box::new(Counting {
                    name: "second",
                    calls: second.clone(),
                    pass: false,
                }),
                Box::new(Counting {
                    name: "third",
                    calls: third.clone(),
                    pass: true,
                }),
            ],
        );

        assert!(filter.evaluate(&entity("UC_a", "x", "", "KE"), false).is_err());
        assert_eq!(filter.predicate_names(), vec!["first", "second", "third"]);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(third.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn default_chain_order_is_fixed() {
        let filter = InclusionFilter::new(policy());
        assert_eq!(
            filter.predicate_names(),
            vec!["blocklist", "region", "content_type", "heuristic", "floor"]
        );
    }
}
