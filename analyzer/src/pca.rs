// ==============================================================================
// pca.rs - PCA Distance Surrogate
// ==============================================================================
// Description: Centered Euclidean distance between two encoded genotype vectors
// Author: Matt Barham
// Created: 2025-11-12
// Modified: 2025-11-20
// Version: 1.0.0
// ==============================================================================
// With only two samples a principal-component projection reduces to the
// Euclidean distance between the two column-centered rows; the historical
// "pca_distance" name is kept for result compatibility.
// ==============================================================================

use crate::genotype::{encode_against_reference, reference_allele, AllelePair};

/// Encode the aligned genotype pairs of both users into numeric vectors
///
/// For each SNP the reference allele is the lexicographically smallest
/// allele observed across the two users; each genotype then encodes as
/// 0 (homozygous reference), 1 (heterozygous), or 2 (homozygous
/// non-reference).
pub fn encode_pair_matrix(pairs: &[(AllelePair, AllelePair)]) -> (Vec<f64>, Vec<f64>) {
    let mut v1 = Vec::with_capacity(pairs.len());
    let mut v2 = Vec::with_capacity(pairs.len());
    for &(a, b) in pairs {
        let reference = reference_allele(a, b);
        v1.push(f64::from(encode_against_reference(a, reference)));
        v2.push(f64::from(encode_against_reference(b, reference)));
    }
    (v1, v2)
}

/// Euclidean distance between the two rows after centering each column
///
/// Vectors must have equal length.
pub fn pairwise_distance(v1: &[f64], v2: &[f64]) -> f64 {
    debug_assert_eq!(v1.len(), v2.len());
    let mut sum = 0.0;
    for (a, b) in v1.iter().zip(v2.iter()) {
        let mean = (a + b) / 2.0;
        let ca = a - mean;
        let cb = b - mean;
        let d = ca - cb;
        sum += d * d;
    }
    sum.sqrt()
}
