use std::collections::HashMap;

use crate::models::cv::NewCvKeyword;

pub const MAX_KEYWORDS: usize = 200;

/// Words too generic to say anything about a research profile.
const GENERIC_TERMS: &[&str] = &[
    "study",
    "method",
    "results",
    "approach",
    "paper",
    "data",
    "analysis",
    "experience",
    "project",
    "education",
    "work",
    "using",
    "used",
];

/// Rounds half away from zero to `places` decimals. Inputs here are never
/// negative, so this is half-up.
pub fn round_half_up(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Linear rank weight: the first keyword gets 1.0, the last 0.1.
pub fn rank_weight(index: usize, total: usize) -> f64 {
    let span = total.saturating_sub(1).max(1) as f64;
    round_half_up(1.0 - 0.9 * (index as f64 / span), 4)
}

fn normalize(keyword: &str) -> Option<String> {
    let normalized = keyword.trim().to_lowercase();
    let too_short = normalized.chars().count() < 2;
    let numeric = normalized.chars().all(|c| c.is_ascii_digit());
    if too_short || numeric || GENERIC_TERMS.contains(&normalized.as_str()) {
        return None;
    }
    Some(normalized)
}

/// Normalizes the model's keyphrases into rank-weighted rows: lowercase and
/// trim, drop short, numeric and generic items, keep the first occurrence of
/// each, cap at `MAX_KEYWORDS`. `frequency` counts how often the model
/// repeated a phrase.
pub fn build_keyword_rows(raw: &[String]) -> Vec<NewCvKeyword> {
    let mut order: Vec<(String, String)> = Vec::new();
    let mut frequency: HashMap<String, i32> = HashMap::new();

    for item in raw {
        let Some(normalized) = normalize(item) else {
            continue;
        };
        let count = frequency.entry(normalized.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            order.push((item.trim().to_string(), normalized));
        }
    }
    order.truncate(MAX_KEYWORDS);

    let total = order.len();
    order
        .into_iter()
        .enumerate()
        .map(|(i, (keyword, normalized))| NewCvKeyword {
            frequency: frequency.get(&normalized).copied().unwrap_or(1),
            weight: rank_weight(i, total),
            keyword,
            normalized,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_three_keywords_get_linear_weights() {
        let rows = build_keyword_rows(&strings(&[
            "Transformer",
            "PyTorch",
            "Reinforcement Learning",
        ]));
        let weights: Vec<f64> = rows.iter().map(|r| r.weight).collect();
        assert_eq!(weights, vec![1.0, 0.55, 0.1]);
        assert_eq!(rows[2].normalized, "reinforcement learning");
        assert_eq!(rows[2].keyword, "Reinforcement Learning");
    }

    #[test]
    fn test_single_keyword_weighs_one() {
        let rows = build_keyword_rows(&strings(&["quantum optics"]));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].weight, 1.0);
    }

    #[test]
    fn test_filters_and_dedupes_preserving_first() {
        let rows = build_keyword_rows(&strings(&[
            " NLP ", "x", "2024", "data", "Study", "nlp", "CUDA", "NLP",
        ]));
        let names: Vec<&str> = rows.iter().map(|r| r.normalized.as_str()).collect();
        assert_eq!(names, vec!["nlp", "cuda"]);
        assert_eq!(rows[0].frequency, 3);
        assert_eq!(rows[1].frequency, 1);
    }

    #[test]
    fn test_caps_at_two_hundred_and_stays_non_increasing() {
        let raw: Vec<String> = (0..250).map(|i| format!("topic-{i}")).collect();
        let rows = build_keyword_rows(&raw);
        assert_eq!(rows.len(), MAX_KEYWORDS);
        assert_eq!(rows.first().unwrap().weight, 1.0);
        assert_eq!(rows.last().unwrap().weight, 0.1);
        assert!(rows.windows(2).all(|w| w[0].weight >= w[1].weight));
    }

    #[test]
    fn test_empty_input_yields_no_rows() {
        assert!(build_keyword_rows(&[]).is_empty());
    }

    #[test]
    fn test_round_half_up() {
        assert_eq!(round_half_up(0.6060606, 6), 0.606061);
        assert_eq!(round_half_up(0.55, 4), 0.55);
    }
}
