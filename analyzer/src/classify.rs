// ==============================================================================
// classify.rs - Relationship Classification
// ==============================================================================
// Description: Maps IBS score and IBS2 percentage to a relationship class
// Author: Matt Barham
// Created: 2025-11-12
// Modified: 2025-12-02
// Version: 1.1.0
// ==============================================================================

/// Relationship classes, ordered from closest to most distant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relationship {
    IdenticalTwin,
    ParentChild,
    FullSiblings,
    GrandparentAuntUncle,
    FirstCousins,
    SecondCousins,
    ThirdCousins,
    Unrelated,
}

/// One row of the calibration table: minimum IBS score, minimum IBS2
/// percentage, and the confidence attached to the class.
struct Threshold {
    ibs_score_min: f64,
    ibs2_pct_min: f64,
    relationship: Relationship,
    confidence: f64,
}

/// Calibration table, descending. The first row whose score AND IBS2
/// percentage thresholds are both met wins; the final row always matches.
const THRESHOLDS: &[Threshold] = &[
    Threshold { ibs_score_min: 0.99, ibs2_pct_min: 99.0, relationship: Relationship::IdenticalTwin, confidence: 0.99 },
    Threshold { ibs_score_min: 0.85, ibs2_pct_min: 85.0, relationship: Relationship::ParentChild, confidence: 0.95 },
    Threshold { ibs_score_min: 0.85, ibs2_pct_min: 75.0, relationship: Relationship::FullSiblings, confidence: 0.90 },
    Threshold { ibs_score_min: 0.70, ibs2_pct_min: 65.0, relationship: Relationship::GrandparentAuntUncle, confidence: 0.85 },
    Threshold { ibs_score_min: 0.65, ibs2_pct_min: 60.0, relationship: Relationship::FirstCousins, confidence: 0.80 },
    Threshold { ibs_score_min: 0.60, ibs2_pct_min: 55.0, relationship: Relationship::SecondCousins, confidence: 0.70 },
    Threshold { ibs_score_min: 0.55, ibs2_pct_min: 50.0, relationship: Relationship::ThirdCousins, confidence: 0.60 },
    Threshold { ibs_score_min: 0.0, ibs2_pct_min: 0.0, relationship: Relationship::Unrelated, confidence: 0.50 },
];

impl Relationship {
    /// On-chain label for this class
    pub fn label(&self) -> &'static str {
        match self {
            Relationship::IdenticalTwin => "identical/twin",
            Relationship::ParentChild => "parent-child",
            Relationship::FullSiblings => "full siblings",
            Relationship::GrandparentAuntUncle => "grandparent/aunt/uncle",
            Relationship::FirstCousins => "first cousins",
            Relationship::SecondCousins => "second cousins",
            Relationship::ThirdCousins => "third cousins",
            Relationship::Unrelated => "unrelated",
        }
    }

    /// Static, deterministic guidance strings for this class
    pub fn recommendations(&self) -> Vec<String> {
        let lines: &[&str] = match self {
            Relationship::IdenticalTwin => &[
                "Genotypes are effectively identical; this is the same person or an identical twin",
                "Verify sample provenance before drawing family conclusions",
            ],
            Relationship::ParentChild => &[
                "Very close genetic match consistent with a parent-child relationship",
                "Consider sharing family history and medical information",
            ],
            Relationship::FullSiblings => &[
                "Close genetic match consistent with a full sibling relationship",
                "May share both parents; verify with family records",
            ],
            Relationship::GrandparentAuntUncle => &[
                "Second-degree match: grandparent, aunt/uncle, or half-sibling",
                "Compare known family trees one generation up",
            ],
            Relationship::FirstCousins => &[
                "Genetic match suggests a first cousin relationship",
                "Look for common grandparents",
            ],
            Relationship::SecondCousins => &[
                "Genetic match suggests a second cousin relationship",
                "Look for common great-grandparents",
            ],
            Relationship::ThirdCousins => &[
                "Distant but detectable match consistent with third cousins",
                "Shared ancestry likely lies three generations back",
            ],
            Relationship::Unrelated => &[
                "No significant genetic relationship detected",
                "May still share very distant ancestry",
            ],
        };
        lines.iter().map(|s| s.to_string()).collect()
    }
}

/// Classify a pair from its IBS score and IBS2 percentage
///
/// Returns the relationship class and its calibrated confidence.
pub fn classify(ibs_score: f64, ibs2_pct: f64) -> (Relationship, f64) {
    for row in THRESHOLDS {
        if ibs_score >= row.ibs_score_min && ibs2_pct >= row.ibs2_pct_min {
            return (row.relationship, row.confidence);
        }
    }
    // The table ends with an all-zero row, so this is unreachable for
    // finite inputs; NaN falls through to unrelated.
    (Relationship::Unrelated, 0.50)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_twin_row() {
        let (relationship, confidence) = classify(1.0, 100.0);
        assert_eq!(relationship, Relationship::IdenticalTwin);
        assert_eq!(confidence, 0.99);
        assert_eq!(relationship.label(), "identical/twin");
    }

    #[test]
    fn test_exact_boundaries_are_inclusive() {
        assert_eq!(classify(0.99, 99.0).0, Relationship::IdenticalTwin);
        assert_eq!(classify(0.85, 85.0).0, Relationship::ParentChild);
        assert_eq!(classify(0.85, 75.0).0, Relationship::FullSiblings);
        assert_eq!(classify(0.70, 65.0).0, Relationship::GrandparentAuntUncle);
        assert_eq!(classify(0.65, 60.0).0, Relationship::FirstCousins);
        assert_eq!(classify(0.60, 55.0).0, Relationship::SecondCousins);
        assert_eq!(classify(0.55, 50.0).0, Relationship::ThirdCousins);
    }

    #[test]
    fn test_both_thresholds_required() {
        // High score but low IBS2 percentage drops past the close rows
        let (relationship, _) = classify(0.99, 70.0);
        assert_eq!(relationship, Relationship::GrandparentAuntUncle);

        // High IBS2 percentage alone does not promote a low score
        let (relationship, _) = classify(0.50, 95.0);
        assert_eq!(relationship, Relationship::Unrelated);
    }

    #[test]
    fn test_unrelated_floor() {
        let (relationship, confidence) = classify(0.10, 5.0);
        assert_eq!(relationship, Relationship::Unrelated);
        assert_eq!(confidence, 0.50);
    }

    #[test]
    fn test_recommendations_are_nonempty_and_bounded() {
        for (score, pct) in [(1.0, 100.0), (0.9, 90.0), (0.67, 62.0), (0.1, 1.0)] {
            let (relationship, _) = classify(score, pct);
            let recs = relationship.recommendations();
            assert!(!recs.is_empty() && recs.len() <= 3);
            // Deterministic: repeated calls yield identical output
            assert_eq!(recs, relationship.recommendations());
        }
    }
}
