use serde::Deserialize;

use crate::ocr::geom::{mean, median};

/// How vertical gaps are split into "within paragraph" and "between paragraphs".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GapClustering {
    #[default]
    KMeans,
    Median,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ThresholdSource {
    SingleGap,
    Clusters,
    MeanFallback,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct GapThreshold {
    pub(crate) value: f32,
    pub(crate) source: ThresholdSource,
}

const CLUSTER_SEPARATION: f32 = 1.3;
const MAX_ITERATIONS: usize = 50;

pub(crate) fn estimate_threshold(gaps: &[f32], clustering: GapClustering) -> Option<GapThreshold> {
    match gaps {
        [] => None,
        [only] => Some(GapThreshold {
            value: only * 2.0,
            source: ThresholdSource::SingleGap,
        }),
        _ => {
            let split = match clustering {
                GapClustering::KMeans => kmeans_split(gaps),
                GapClustering::Median => median_split(gaps),
            };
            match split {
                Some((small, large)) if large > small * CLUSTER_SEPARATION => Some(GapThreshold {
                    value: (small + large) / 2.0,
                    source: ThresholdSource::Clusters,
                }),
                _ => mean(gaps).map(|avg| GapThreshold {
                    value: avg * CLUSTER_SEPARATION,
                    source: ThresholdSource::MeanFallback,
                }),
            }
        }
    }
}

/// Two-centroid k-means seeded at the extremes. Returns the cluster means,
/// or `None` when one cluster ends up empty.
fn kmeans_split(gaps: &[f32]) -> Option<(f32, f32)> {
    let mut small = gaps.iter().copied().fold(f32::INFINITY, f32::min);
    let mut large = gaps.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut assignment: Vec<bool> = Vec::new();

    for _ in 0..MAX_ITERATIONS {
        // Equidistant values go to the smaller cluster.
        let next: Vec<bool> = gaps
            .iter()
            .map(|gap| (gap - small).abs() > (gap - large).abs())
            .collect();
        let (small_members, large_members): (Vec<f32>, Vec<f32>) = gaps
            .iter()
            .zip(&next)
            .fold((Vec::new(), Vec::new()), |(mut s, mut l), (gap, is_large)| {
                if *is_large {
                    l.push(*gap);
                } else {
                    s.push(*gap);
                }
                (s, l)
            });
        small = mean(&small_members)?;
        large = mean(&large_members)?;
        if next == assignment {
            break;
        }
        assignment = next;
    }
    Some((small, large))
}

fn median_split(gaps: &[f32]) -> Option<(f32, f32)> {
    let pivot = median(gaps)?;
    let small = gaps.iter().copied().filter(|gap| *gap <= pivot).collect::<Vec<_>>();
    let large = gaps.iter().copied().filter(|gap| *gap > pivot).collect::<Vec<_>>();
    Some((mean(&small)?, mean(&large)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_gap_doubles() {
        let threshold = estimate_threshold(&[12.0], GapClustering::KMeans).expect("threshold");
        assert_eq!(threshold.value, 24.0);
        assert_eq!(threshold.source, ThresholdSource::SingleGap);
    }

    #[test]
    fn separated_clusters_use_midpoint() {
        let threshold =
            estimate_threshold(&[22.0, 58.0], GapClustering::KMeans).expect("threshold");
        assert_eq!(threshold.value, 40.0);
        assert_eq!(threshold.source, ThresholdSource::Clusters);

        let threshold = estimate_threshold(&[20.0, 22.0, 21.0, 60.0, 62.0], GapClustering::KMeans)
            .expect("threshold");
        assert_eq!(threshold.value, (21.0 + 61.0) / 2.0);
    }

    #[test]
    fn uniform_gaps_fall_back_to_mean() {
        let threshold =
            estimate_threshold(&[20.0, 20.0, 20.0], GapClustering::KMeans).expect("threshold");
        assert_eq!(threshold.source, ThresholdSource::MeanFallback);
        assert!((threshold.value - 26.0).abs() < 1e-4);
    }

    #[test]
    fn weak_separation_is_not_trusted() {
        let threshold =
            estimate_threshold(&[20.0, 24.0], GapClustering::KMeans).expect("threshold");
        assert_eq!(threshold.source, ThresholdSource::MeanFallback);
        assert!((threshold.value - 28.6).abs() < 1e-4);
    }

    #[test]
    fn median_strategy_agrees_on_clear_split() {
        let threshold = estimate_threshold(&[10.0, 11.0, 40.0, 42.0], GapClustering::Median)
            .expect("threshold");
        assert_eq!(threshold.source, ThresholdSource::Clusters);
        assert_eq!(threshold.value, (10.5 + 41.0) / 2.0);
    }

    #[test]
    fn no_gaps_no_threshold() {
        assert!(estimate_threshold(&[], GapClustering::Median).is_none());
    }
}
