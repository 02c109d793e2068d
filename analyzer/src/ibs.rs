// ==============================================================================
// ibs.rs - Identity-By-State Counting
// ==============================================================================
// Description: IBS0/1/2 accumulation and score over a common SNP set
// Author: Matt Barham
// Created: 2025-11-11
// Modified: 2025-11-20
// Version: 1.0.0
// ==============================================================================

use crate::genotype::{shared_allele_count, AllelePair};
use crate::models::IbsAnalysis;

/// Running IBS tally over the common SNP set
#[derive(Debug, Clone, Copy, Default)]
pub struct IbsAccumulator {
    ibs0: u64,
    ibs1: u64,
    ibs2: u64,
}

impl IbsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one SNP comparison between two canonical genotype pairs
    ///
    /// - identical genotypes count as IBS2
    /// - exactly one shared allele counts as IBS1
    /// - no shared allele counts as IBS0
    pub fn observe(&mut self, a: AllelePair, b: AllelePair) {
        if a == b {
            self.ibs2 += 1;
        } else if shared_allele_count(a, b) >= 1 {
            self.ibs1 += 1;
        } else {
            self.ibs0 += 1;
        }
    }

    pub fn total(&self) -> u64 {
        self.ibs0 + self.ibs1 + self.ibs2
    }

    /// Finalize into the result model
    ///
    /// The score is (2*ibs2 + ibs1) / (2*total); an empty accumulator
    /// yields a zero score rather than dividing by zero (the analyzer
    /// rejects empty common sets before this point).
    pub fn finish(self) -> IbsAnalysis {
        let total = self.total();
        let ibs_score = if total == 0 {
            0.0
        } else {
            (2 * self.ibs2 + self.ibs1) as f64 / (2 * total) as f64
        };
        IbsAnalysis {
            ibs0: self.ibs0,
            ibs1: self.ibs1,
            ibs2: self.ibs2,
            total_snps: total,
            ibs_score,
        }
    }
}

/// Percentage of compared SNPs that are IBS2
pub fn ibs2_percentage(analysis: &IbsAnalysis) -> f64 {
    if analysis.total_snps == 0 {
        0.0
    } else {
        100.0 * analysis.ibs2 as f64 / analysis.total_snps as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genotype::canonical_pair;

    fn pair(genotype: &str) -> AllelePair {
        canonical_pair(genotype).unwrap()
    }

    #[test]
    fn test_ibs_classes() {
        let mut acc = IbsAccumulator::new();
        acc.observe(pair("AA"), pair("AA")); // ibs2
        acc.observe(pair("AT"), pair("TA")); // ibs2 (canonical equality)
        acc.observe(pair("AA"), pair("AG")); // ibs1
        acc.observe(pair("AG"), pair("GG")); // ibs1
        acc.observe(pair("AA"), pair("GG")); // ibs0

        let analysis = acc.finish();
        assert_eq!(analysis.ibs2, 2);
        assert_eq!(analysis.ibs1, 2);
        assert_eq!(analysis.ibs0, 1);
        assert_eq!(analysis.total_snps, 5);
    }

    #[test]
    fn test_canonicalization_makes_order_irrelevant() {
        // "AT" vs "TA" must contribute exactly like "AT" vs "AT"
        let mut forward = IbsAccumulator::new();
        forward.observe(pair("AT"), pair("AT"));
        let mut reversed = IbsAccumulator::new();
        reversed.observe(pair("AT"), pair("TA"));

        assert_eq!(forward.finish(), reversed.finish());
    }

    #[test]
    fn test_totals_and_score_bounds() {
        let mut acc = IbsAccumulator::new();
        for _ in 0..10 {
            acc.observe(pair("CC"), pair("CC"));
        }
        acc.observe(pair("AA"), pair("TT"));

        let analysis = acc.finish();
        assert_eq!(
            analysis.ibs0 + analysis.ibs1 + analysis.ibs2,
            analysis.total_snps
        );
        assert!(analysis.ibs_score >= 0.0 && analysis.ibs_score <= 1.0);
    }

    #[test]
    fn test_identical_sets_score_one() {
        let mut acc = IbsAccumulator::new();
        for genotype in ["AA", "AT", "GG", "CT"] {
            acc.observe(pair(genotype), pair(genotype));
        }
        let analysis = acc.finish();
        assert_eq!(analysis.ibs_score, 1.0);
        assert_eq!(ibs2_percentage(&analysis), 100.0);
    }

    #[test]
    fn test_het_vs_opposite_hom_is_ibs1() {
        let mut acc = IbsAccumulator::new();
        acc.observe(pair("AG"), pair("AA"));
        acc.observe(pair("AG"), pair("GG"));
        let analysis = acc.finish();
        assert_eq!(analysis.ibs1, 2);
        // score = (0*2 + 2) / 4
        assert_eq!(analysis.ibs_score, 0.5);
    }
}
