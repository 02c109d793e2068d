// ==============================================================================
// models.rs - Analysis Result Models
// ==============================================================================
// Description: Data structures for the on-chain analysis result payload
// Author: Matt Barham
// Created: 2025-11-11
// Modified: 2025-12-02
// Version: 1.1.0
// ==============================================================================
// The serialized field order of AnalysisReport is part of the on-chain
// contract surface: downstream parsers rely on it being stable.
// ==============================================================================

use serde::{Deserialize, Serialize};

/// Identity-by-state counts and score over the common SNP set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IbsAnalysis {
    /// SNPs where the two genotypes share no allele
    pub ibs0: u64,
    /// SNPs sharing exactly one allele
    pub ibs1: u64,
    /// SNPs with identical canonical genotypes
    pub ibs2: u64,
    /// Total compared SNPs (ibs0 + ibs1 + ibs2)
    pub total_snps: u64,
    /// (2*ibs2 + ibs1) / (2*total_snps), in [0, 1]
    pub ibs_score: f64,
}

/// Complete pairwise analysis result, serialized verbatim on-chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Always "success"; failures never produce a report
    pub status: String,
    pub n_common_snps: u64,
    pub ibs_analysis: IbsAnalysis,
    pub ibs2_percentage: f64,
    pub relationship: String,
    /// Calibrated confidence in [0, 1]
    pub confidence: f64,
    pub pca_distance: f64,
    pub recommendations: Vec<String>,
}

impl AnalysisReport {
    /// Serialize to the canonical on-chain JSON string (UTF-8, no BOM,
    /// declaration field order)
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Confidence as an integer percentage in [0, 100] for the contract call
    pub fn confidence_percent(&self) -> u64 {
        (self.confidence * 100.0).round() as u64
    }
}
