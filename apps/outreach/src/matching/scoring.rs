//! Match scoring: pluggable scorers that rate one professor against a CV's
//! weighted keyword set.
//!
//! Default: `CombinedTextScorer` (substring test over research area and
//! department). `ProfessorKeywordScorer` uses curated per-professor keyword
//! rows instead. Both produce the same `ScoredMatch` shape.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::cv::keywords::round_half_up;
use crate::models::cv::CvKeywordRow;
use crate::models::matching::ScoredMatch;
use crate::models::UnknownVariant;
use crate::models::professor::{ProfessorKeywordRow, ProfessorRow};

const SCORE_PLACES: i32 = 6;

static TOKEN_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,;\s]+").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    CombinedText,
    ProfessorKeywords,
}

impl FromStr for MatchStrategy {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "combined_text" => Ok(MatchStrategy::CombinedText),
            "professor_keywords" => Ok(MatchStrategy::ProfessorKeywords),
            other => Err(UnknownVariant {
                kind: "MatchStrategy",
                value: other.to_string(),
            }),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// CV side of the comparison
// ────────────────────────────────────────────────────────────────────────────

/// A CV's keywords as `normalized → weight`, duplicates collapsed to their
/// highest weight, kept in first-seen order so matched lists read in rank
/// order.
#[derive(Debug, Clone, Default)]
pub struct CvKeywordSet {
    entries: Vec<(String, f64)>,
}

impl CvKeywordSet {
    pub fn from_rows(rows: &[CvKeywordRow]) -> Self {
        let mut entries: Vec<(String, f64)> = Vec::with_capacity(rows.len());
        let mut index: HashMap<String, usize> = HashMap::new();
        for row in rows {
            match index.get(&row.normalized) {
                Some(&i) => entries[i].1 = entries[i].1.max(row.weight),
                None => {
                    index.insert(row.normalized.clone(), entries.len());
                    entries.push((row.normalized.clone(), row.weight));
                }
            }
        }
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Largest attainable matched weight.
    pub fn total_weight(&self) -> f64 {
        self.entries.iter().map(|(_, w)| w).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(k, w)| (k.as_str(), *w))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

/// Rates one professor against a CV. `None` means "no overlap": nothing is
/// persisted for that pair.
pub trait MatchScorer: Send + Sync {
    fn strategy(&self) -> MatchStrategy;

    /// Whether `score` reads `professor_keywords`; the engine skips loading
    /// them otherwise.
    fn needs_professor_keywords(&self) -> bool {
        false
    }

    fn score(
        &self,
        cv: &CvKeywordSet,
        professor: &ProfessorRow,
        professor_keywords: &[ProfessorKeywordRow],
    ) -> Option<ScoredMatch>;
}

pub fn scorer_for(strategy: MatchStrategy) -> Arc<dyn MatchScorer> {
    match strategy {
        MatchStrategy::CombinedText => Arc::new(CombinedTextScorer),
        MatchStrategy::ProfessorKeywords => Arc::new(ProfessorKeywordScorer),
    }
}

fn build_match(
    professor: &ProfessorRow,
    cv: &CvKeywordSet,
    matched: Vec<&str>,
    matched_weight: f64,
    total_professor_keywords: usize,
) -> Option<ScoredMatch> {
    let max_weight = cv.total_weight();
    if matched.is_empty() || max_weight <= 0.0 {
        return None;
    }
    let score = round_half_up(matched_weight / max_weight, SCORE_PLACES).clamp(0.0, 1.0);
    Some(ScoredMatch {
        professor_id: professor.id,
        score,
        total_cv_keywords: cv.len() as i32,
        total_professor_keywords: total_professor_keywords as i32,
        total_matched_keywords: matched.len() as i32,
        matched_keywords: matched.join(", "),
    })
}

// ────────────────────────────────────────────────────────────────────────────
// CombinedTextScorer (default)
// ────────────────────────────────────────────────────────────────────────────

/// Algorithm:
/// 1. text = lower(research_area) + " " + lower(department); blank → no match
/// 2. a CV keyword matches if it is a literal substring of text
/// 3. score = Σ matched weight / Σ all weights, 6 decimals
///
/// `total_professor_keywords` is an estimate: distinct tokens of the research
/// area split on commas, semicolons and whitespace.
pub struct CombinedTextScorer;

impl MatchScorer for CombinedTextScorer {
    fn strategy(&self) -> MatchStrategy {
        MatchStrategy::CombinedText
    }

    fn score(
        &self,
        cv: &CvKeywordSet,
        professor: &ProfessorRow,
        _professor_keywords: &[ProfessorKeywordRow],
    ) -> Option<ScoredMatch> {
        let research_area = professor.research_area.as_deref().unwrap_or("");
        let department = professor.department.as_deref().unwrap_or("");
        let text = format!(
            "{} {}",
            research_area.to_lowercase(),
            department.to_lowercase()
        );
        if text.trim().is_empty() {
            return None;
        }

        let mut matched = Vec::new();
        let mut matched_weight = 0.0;
        for (keyword, weight) in cv.iter() {
            if text.contains(keyword) {
                matched.push(keyword);
                matched_weight += weight;
            }
        }

        build_match(
            professor,
            cv,
            matched,
            matched_weight,
            estimate_professor_keywords(research_area),
        )
    }
}

fn estimate_professor_keywords(research_area: &str) -> usize {
    TOKEN_SEPARATORS
        .split(&research_area.to_lowercase())
        .filter(|t| !t.is_empty())
        .collect::<HashSet<_>>()
        .len()
}

// ────────────────────────────────────────────────────────────────────────────
// ProfessorKeywordScorer: weighted intersection
// ────────────────────────────────────────────────────────────────────────────

/// score = Σ cvWeight(k)·profWeight(k) over shared keywords / Σ cvWeight(k).
/// Professors without keyword rows never match.
pub struct ProfessorKeywordScorer;

impl MatchScorer for ProfessorKeywordScorer {
    fn strategy(&self) -> MatchStrategy {
        MatchStrategy::ProfessorKeywords
    }

    fn needs_professor_keywords(&self) -> bool {
        true
    }

    fn score(
        &self,
        cv: &CvKeywordSet,
        professor: &ProfessorRow,
        professor_keywords: &[ProfessorKeywordRow],
    ) -> Option<ScoredMatch> {
        let mut weights: HashMap<&str, f64> = HashMap::new();
        for row in professor_keywords
            .iter()
            .filter(|r| r.professor_id == professor.id)
        {
            let w = weights.entry(row.normalized.as_str()).or_insert(0.0);
            *w = w.max(row.weight);
        }

        let mut matched = Vec::new();
        let mut matched_weight = 0.0;
        for (keyword, cv_weight) in cv.iter() {
            if let Some(prof_weight) = weights.get(keyword) {
                matched.push(keyword);
                matched_weight += cv_weight * prof_weight;
            }
        }

        build_match(professor, cv, matched, matched_weight, weights.len())
    }
}
