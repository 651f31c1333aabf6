use serde::{Deserialize, Serialize};

/// Guards the page-diversity ratio against empty or zero-mean page sets.
const DIVERSITY_EPSILON: f32 = 1e-6;

pub const fn clamp_unit(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

/// Converts an index distance to a similarity score, higher is more relevant.
pub fn distance_to_similarity(distance: f32) -> f32 {
    if !distance.is_finite() {
        return 0.0;
    }
    clamp_unit(1.0 - distance)
}

pub fn min_max_normalize(scores: &[f32]) -> Vec<f32> {
    if scores.is_empty() {
        return Vec::new();
    }

    let mut min = f32::MAX;
    let mut max = f32::MIN;

    for s in scores {
        if !s.is_finite() {
            continue;
        }
        if *s < min {
            min = *s;
        }
        if *s > max {
            max = *s;
        }
    }

    if !min.is_finite() || !max.is_finite() {
        return scores.iter().map(|_| 0.0).collect();
    }

    if (max - min).abs() < f32::EPSILON {
        return vec![1.0; scores.len()];
    }

    scores
        .iter()
        .map(|score| {
            if score.is_finite() {
                clamp_unit((score - min) / (max - min))
            } else {
                0.0
            }
        })
        .collect()
}

pub fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}

fn variance(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f32>() / values.len() as f32
}

/// Rewards answers drawn from spread-out pages over a single page.
/// No sources means no diversity signal at all.
pub fn page_diversity(pages: &[u32]) -> f32 {
    if pages.is_empty() {
        return 0.0;
    }
    let pages_f32: Vec<f32> = pages.iter().map(|p| *p as f32).collect();
    let ratio = variance(&pages_f32) / (mean(&pages_f32) + DIVERSITY_EPSILON);
    clamp_unit(1.0 - ratio)
}

/// Weights for the blended confidence estimate. Retrieval relevance dominates,
/// faithfulness catches hallucination, diversity is a weak secondary signal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceWeights {
    pub retrieval: f32,
    pub faithfulness: f32,
    pub diversity: f32,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            retrieval: 0.5,
            faithfulness: 0.3,
            diversity: 0.2,
        }
    }
}

/// Blends the three signals into one bounded score.
pub fn blend_confidence(
    weights: ConfidenceWeights,
    retrieval_scores: &[f32],
    faithfulness: f32,
    source_pages: &[u32],
) -> f32 {
    let retrieval = mean(retrieval_scores);
    let diversity = page_diversity(source_pages);
    clamp_unit(
        weights.retrieval * retrieval
            + weights.faithfulness * faithfulness
            + weights.diversity * diversity,
    )
}
