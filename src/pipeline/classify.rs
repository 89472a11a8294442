//! Literal keyword/regex classification of publisher and video text.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::Classification;

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in pattern compiles")
}

static PODCAST_RX: Lazy<Regex> = Lazy::new(|| compile(r"(?i)podcast"));

static INTERVIEW_RX: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?i)\b(?:interviews?|talk\s+shows?|conversations?|panel|sit-?downs?)\b")
});

static SPORTS_RX: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"(?i)\bhighlights?\b|\bmatch\b|\bgoals?\b|\b(?:game|fixture|derby)\b|\bnba\b|\bepl\b|\bserie a\b|\blaliga\b|\bbundesliga\b|\bufa\b|\bfootball\b|\bsoccer\b|\bbasketball\b",
    )
});

static SENSATIONAL_RX: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"(?i)catch(?:ing)?\s+(?:a\s+)?(?:cheat|spouse)\b|cheaters?\b|phone\s+check\b|loyalty\s+test|exposed\b|drama\b|scandal\b|\bconfront(?:s|ed|ing|ation)?\b",
    )
});

static SHORT_FORM_RX: Lazy<Regex> = Lazy::new(|| compile(r"(?i)#shorts?\b|\bshorts\b"));

static PROMO_MIX_RX: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?i)\bdj\s+mix(?:es)?\b|\bmixtapes?\b|\bdj\s+set\b|\bnon-?stop\s+mix\b|\bmix\s+20\d{2}\b")
});

/// Why the heuristic stage rejected a piece of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exclusion {
    Sports,
    Sensational,
    ShortForm,
    PromotionalMix,
    BlockedKeyword,
}

impl Exclusion {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Exclusion::Sports => "sports",
            Exclusion::Sensational => "sensational",
            Exclusion::ShortForm => "short_form",
            Exclusion::PromotionalMix => "promotional_mix",
            Exclusion::BlockedKeyword => "blocked_keyword",
        }
    }
}

/// Labels free text as podcast, interview or other.
///
/// `interview_label` is what interview-style keywords map to; some
/// deployments fold interviews into `podcast`.
#[must_use]
pub fn classify(text: &str, interview_label: Classification) -> Classification {
    if PODCAST_RX.is_match(text) {
        Classification::Podcast
    } else if INTERVIEW_RX.is_match(text) {
        interview_label
    } else {
        Classification::Other
    }
}

/// First matching built-in exclusion pattern, checked in a fixed order.
#[must_use]
pub fn heuristic_exclusion(text: &str) -> Option<Exclusion> {
    if SPORTS_RX.is_match(text) {
        Some(Exclusion::Sports)
    } else if SENSATIONAL_RX.is_match(text) {
        Some(Exclusion::Sensational)
    } else if SHORT_FORM_RX.is_match(text) {
        Some(Exclusion::ShortForm)
    } else if PROMO_MIX_RX.is_match(text) {
        Some(Exclusion::PromotionalMix)
    } else {
        None
    }
}

/// Case-insensitive literal substring matcher over operator-supplied keywords.
#[derive(Debug, Clone, Default)]
pub struct KeywordBlocker {
    matcher: Option<AhoCorasick>,
}

impl KeywordBlocker {
    /// # Errors
    /// Returns an error if the automaton cannot be built.
    pub fn new(keywords: &[String]) -> Result<Self> {
        let patterns: Vec<String> = keywords
            .iter()
            .map(|keyword| keyword.trim().to_lowercase())
            .filter(|keyword| !keyword.is_empty())
            .collect();
        if patterns.is_empty() {
            return Ok(Self::default());
        }

        let matcher = AhoCorasickBuilder::new()
            .match_kind(MatchKind::LeftmostFirst)
            .build(&patterns)
            .context("failed to build blocked keyword matcher")?;
        Ok(Self {
            matcher: Some(matcher),
        })
    }

    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        self.matcher
            .as_ref()
            .is_some_and(|matcher| matcher.is_match(&text.to_lowercase()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matcher.is_none()
    }
}

/// Word-boundary, case-insensitive match of regional place/demonym hints.
#[derive(Debug, Clone, Default)]
pub struct RegionHints {
    pattern: Option<Regex>,
}

impl RegionHints {
    /// # Errors
    /// Returns an error if the combined pattern cannot be compiled.
    pub fn new(hints: &[String]) -> Result<Self> {
        let alternatives: Vec<String> = hints
            .iter()
            .map(|hint| hint.trim())
            .filter(|hint| !hint.is_empty())
            .map(regex::escape)
            .collect();
        if alternatives.is_empty() {
            return Ok(Self::default());
        }

        let pattern = Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives.join("|")))
            .context("failed to compile region hint pattern")?;
        Ok(Self {
            pattern: Some(pattern),
        })
    }

    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        self.pattern
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("The Mic Cheque Podcast", Classification::Podcast)]
    #[case("PODCASTS from Nairobi", Classification::Podcast)]
    #[case("Long-form interviews with Kenyan leaders", Classification::Interview)]
    #[case("Sunday talk show", Classification::Interview)]
    #[case("A weekly panel on politics", Classification::Interview)]
    #[case("Honest conversation, no filter", Classification::Interview)]
    #[case("Sit-down with the president", Classification::Interview)]
    #[case("Daily comedy skits", Classification::Other)]
    fn classifies_by_keyword(#[case] text: &str, #[case] expected: Classification) {
        assert_eq!(classify(text, Classification::Interview), expected);
    }

    #[test]
    fn podcast_keyword_wins_over_interview_keyword() {
        assert_eq!(
            classify("Podcast interviews", Classification::Interview),
            Classification::Podcast
        );
    }

    #[test]
    fn interview_label_is_configurable() {
        assert_eq!(
            classify("Celebrity interviews", Classification::Podcast),
            Classification::Podcast
        );
    }

    #[rstest]
    #[case("Derby Day Highlights: 2-1 FT", Some(Exclusion::Sports))]
    #[case("All the EPL goals this week", Some(Exclusion::Sports))]
    #[case("Catching a cheater live", Some(Exclusion::Sensational))]
    #[case("Phone check gone wrong", Some(Exclusion::Sensational))]
    #[case("Loyalty test season 2", Some(Exclusion::Sensational))]
    #[case("We confront the landlord", Some(Exclusion::Sensational))]
    #[case("Funny moments #shorts", Some(Exclusion::ShortForm))]
    #[case("Best of YouTube Shorts", Some(Exclusion::ShortForm))]
    #[case("Gengetone DJ mix 2024", Some(Exclusion::PromotionalMix))]
    #[case("Nonstop mix for the weekend", Some(Exclusion::PromotionalMix))]
    #[case("Kenyan podcast about business", None)]
    #[case("Matchmaking and relationships", None)]
    fn heuristic_patterns(#[case] text: &str, #[case] expected: Option<Exclusion>) {
        assert_eq!(heuristic_exclusion(text), expected);
    }

    #[test]
    fn keyword_blocker_is_case_insensitive_substring() {
        let blocker =
            KeywordBlocker::new(&["Prank".to_string(), " ".to_string()]).expect("matcher");
        assert!(blocker.matches("Best PRANKS of 2024"));
        assert!(!blocker.matches("Morning show"));

        let empty = KeywordBlocker::new(&[]).expect("matcher");
        assert!(empty.is_empty());
        assert!(!empty.matches("anything"));
    }

    #[test]
    fn region_hints_use_word_boundaries() {
        let hints =
            RegionHints::new(&["kenya".to_string(), "nairobi".to_string()]).expect("hints");
        assert!(hints.matches("Live from NAIROBI"));
        assert!(hints.matches("Kenya's biggest show"));
        assert!(!hints.matches("Kenyatta avenue"));
        assert!(!RegionHints::default().matches("kenya"));
    }
}
