// ==============================================================================
// analyzer.rs - Pairwise Kinship Analysis Pipeline
// ==============================================================================
// Description: Drives parse -> intersect -> IBS -> PCA -> classify -> report
// Author: Matt Barham
// Created: 2025-11-12
// Modified: 2025-12-02
// Version: 1.2.0
// ==============================================================================

use thiserror::Error;
use tracing::debug;

use crate::classify::classify;
use crate::genotype::{canonical_pair, AllelePair};
use crate::ibs::{ibs2_percentage, IbsAccumulator};
use crate::models::AnalysisReport;
use crate::parsers::snp::{SnpParseError, SnpParser};
use crate::pca::{encode_pair_matrix, pairwise_distance};

/// Minimum retained records per user
pub const MIN_RECORDS: usize = 100;

/// Minimum common rsID count between the two users
pub const MIN_OVERLAP: usize = 50;

/// Non-retryable analysis failures
///
/// The display strings are submitted on-chain verbatim as the failure
/// reason, so they stay short and human-readable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("insufficient data: {count} < {min}")]
    InsufficientData { count: usize, min: usize },

    #[error("insufficient overlap: {count}")]
    InsufficientOverlap { count: usize },

    #[error("malformed input: no parseable records")]
    MalformedInput,
}

/// Pairwise SNP analyzer
///
/// Deterministic: for a fixed input pair the report is identical across
/// runs (the common SNP set is iterated in sorted rsID order).
#[derive(Debug, Clone, Copy)]
pub struct PairAnalyzer {
    min_records: usize,
    min_overlap: usize,
}

impl Default for PairAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl PairAnalyzer {
    pub fn new() -> Self {
        Self {
            min_records: MIN_RECORDS,
            min_overlap: MIN_OVERLAP,
        }
    }

    /// Run the full analysis over two users' raw SNP data strings
    pub fn analyze(&self, user1_raw: &str, user2_raw: &str) -> Result<AnalysisReport, AnalysisError> {
        let parser = SnpParser::new();
        let user1 = match parser.parse(user1_raw) {
            Ok(dataset) => dataset,
            Err(SnpParseError::Empty) => return Err(AnalysisError::MalformedInput),
        };
        let user2 = match parser.parse(user2_raw) {
            Ok(dataset) => dataset,
            Err(SnpParseError::Empty) => return Err(AnalysisError::MalformedInput),
        };

        if user1.len() < self.min_records {
            return Err(AnalysisError::InsufficientData {
                count: user1.len(),
                min: self.min_records,
            });
        }
        if user2.len() < self.min_records {
            return Err(AnalysisError::InsufficientData {
                count: user2.len(),
                min: self.min_records,
            });
        }

        // Sorted intersection keeps the whole pipeline deterministic
        let mut common: Vec<&String> = user1.rsids().filter(|id| user2.get(id).is_some()).collect();
        common.sort();

        if common.len() < self.min_overlap {
            return Err(AnalysisError::InsufficientOverlap { count: common.len() });
        }

        debug!(
            user1 = user1.len(),
            user2 = user2.len(),
            common = common.len(),
            "aligned SNP datasets"
        );

        let mut aligned: Vec<(AllelePair, AllelePair)> = Vec::with_capacity(common.len());
        let mut ibs = IbsAccumulator::new();
        for rsid in &common {
            // Genotypes were validated at parse time, so both pairs exist
            let (Some(record1), Some(record2)) = (user1.get(rsid), user2.get(rsid)) else {
                continue;
            };
            let (Some(pair1), Some(pair2)) = (
                canonical_pair(&record1.genotype),
                canonical_pair(&record2.genotype),
            ) else {
                continue;
            };
            ibs.observe(pair1, pair2);
            aligned.push((pair1, pair2));
        }

        let ibs_analysis = ibs.finish();
        let ibs2_pct = ibs2_percentage(&ibs_analysis);

        let (v1, v2) = encode_pair_matrix(&aligned);
        let pca_distance = pairwise_distance(&v1, &v2);

        let (relationship, confidence) = classify(ibs_analysis.ibs_score, ibs2_pct);

        Ok(AnalysisReport {
            status: "success".to_string(),
            n_common_snps: ibs_analysis.total_snps,
            ibs_analysis,
            ibs2_percentage: ibs2_pct,
            relationship: relationship.label().to_string(),
            confidence,
            pca_distance,
            recommendations: relationship.recommendations(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a dataset of `count` SNPs with a fixed genotype cycle
    fn dataset(start: usize, count: usize) -> String {
        let genotypes = ["AA", "AT", "GG", "CT", "CC"];
        let mut out = String::from("# generated test data\n");
        for i in 0..count {
            let rsid = start + i;
            out.push_str(&format!(
                "rs{} {} {} {}\n",
                rsid,
                (i % 22) + 1,
                10_000 + i,
                genotypes[i % genotypes.len()]
            ));
        }
        out
    }

    #[test]
    fn test_identical_datasets_are_twins() {
        let data = dataset(1, 1000);
        let report = PairAnalyzer::new().analyze(&data, &data).unwrap();

        assert_eq!(report.n_common_snps, 1000);
        assert_eq!(report.ibs_analysis.ibs2, 1000);
        assert_eq!(report.ibs_analysis.ibs1, 0);
        assert_eq!(report.ibs_analysis.ibs0, 0);
        assert_eq!(report.ibs_analysis.ibs_score, 1.0);
        assert_eq!(report.relationship, "identical/twin");
        assert_eq!(report.confidence, 0.99);
        assert_eq!(report.pca_distance, 0.0);
        assert_eq!(report.status, "success");
    }

    #[test]
    fn test_disjoint_rsids_insufficient_overlap() {
        let user1 = dataset(1, 100);
        let user2 = dataset(200, 100);
        let err = PairAnalyzer::new().analyze(&user1, &user2).unwrap_err();

        assert_eq!(err, AnalysisError::InsufficientOverlap { count: 0 });
        assert_eq!(err.to_string(), "insufficient overlap: 0");
    }

    #[test]
    fn test_too_few_records_insufficient_data() {
        let user1 = dataset(1, 40);
        let user2 = dataset(1, 150);
        let err = PairAnalyzer::new().analyze(&user1, &user2).unwrap_err();

        assert_eq!(err, AnalysisError::InsufficientData { count: 40, min: 100 });
        assert_eq!(err.to_string(), "insufficient data: 40 < 100");
    }

    #[test]
    fn test_unparseable_input_is_malformed() {
        let err = PairAnalyzer::new()
            .analyze("# nothing here\n", &dataset(1, 150))
            .unwrap_err();
        assert_eq!(err, AnalysisError::MalformedInput);
        assert_eq!(err.to_string(), "malformed input: no parseable records");
    }

    #[test]
    fn test_ibs_totals_invariant() {
        // Same rsIDs, shifted genotype cycle so all IBS classes occur
        let genotypes1 = ["AA", "AT", "GG", "CT", "CC"];
        let genotypes2 = ["TT", "AT", "GA", "CT", "GG"];
        let mut user1 = String::new();
        let mut user2 = String::new();
        for i in 0..200 {
            user1.push_str(&format!("rs{} 1 {} {}\n", i, 1000 + i, genotypes1[i % 5]));
            user2.push_str(&format!("rs{} 1 {} {}\n", i, 1000 + i, genotypes2[i % 5]));
        }
        let report = PairAnalyzer::new().analyze(&user1, &user2).unwrap();

        let ibs = &report.ibs_analysis;
        assert_eq!(ibs.ibs0 + ibs.ibs1 + ibs.ibs2, report.n_common_snps);
        assert!(ibs.ibs_score >= 0.0 && ibs.ibs_score <= 1.0);
    }

    #[test]
    fn test_deterministic_output() {
        let user1 = dataset(1, 300);
        let user2 = dataset(100, 300);
        let analyzer = PairAnalyzer::new();
        let a = analyzer.analyze(&user1, &user2).unwrap();
        let b = analyzer.analyze(&user1, &user2).unwrap();

        assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());
    }

    #[test]
    fn test_mixed_field_orders_interoperate() {
        // User1 uses (rsid chrom pos gt), user2 uses (rsid pos chrom gt);
        // the same rsIDs must still intersect and score as identical.
        let mut user1 = String::new();
        let mut user2 = String::new();
        for i in 0..150 {
            user1.push_str(&format!("rs{} {} {} AT\n", i, (i % 22) + 1, 50_000 + i));
            user2.push_str(&format!("rs{} {} {} TA\n", i, 50_000 + i, (i % 22) + 1));
        }
        let report = PairAnalyzer::new().analyze(&user1, &user2).unwrap();

        assert_eq!(report.n_common_snps, 150);
        assert_eq!(report.ibs_analysis.ibs_score, 1.0);
        assert_eq!(report.relationship, "identical/twin");
    }
}
