// ==============================================================================
// snp.rs - Raw SNP Genotype Parser
// ==============================================================================
// Description: Parser for whitespace-delimited SNP genotype records
// Author: Matt Barham
// Created: 2025-11-10
// Modified: 2025-12-02
// Version: 1.2.0
// ==============================================================================
// Format: Whitespace-delimited text, one record per line, '#' comments.
// Two column orders exist in the wild and both are accepted:
//   rs548049170    1         69869     TT      (rsid chrom pos genotype)
//   rs548049170    69869     1         TT      (rsid pos chrom genotype)
// The position is whichever of columns 2 and 3 is purely numeric; when both
// are numeric the larger value is the position (chromosomes are small
// ordinals, positions in real exports are not).
// ==============================================================================

use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

/// A single SNP genotype record
#[derive(Debug, Clone, PartialEq)]
pub struct SnpRecord {
    /// SNP identifier, kept as an opaque string (e.g., "rs548049170")
    pub rsid: String,
    /// Canonicalized chromosome token ("1"-"22", "X", "Y", "MT")
    pub chromosome: String,
    /// Base pair position
    pub position: u64,
    /// Two-letter genotype over {A,C,G,T}, upper-cased
    pub genotype: String,
}

/// Parsed dataset for one user, keyed by rsID
///
/// Duplicate rsIDs keep the last record seen. Malformed genotypes are
/// counted, not retained.
#[derive(Debug, Clone, Default)]
pub struct SnpDataset {
    records: HashMap<String, SnpRecord>,
    /// Records dropped because the genotype was not two of {A,C,G,T}
    pub skipped_genotypes: usize,
    /// Lines dropped because they were not parseable as records at all
    pub skipped_lines: usize,
}

impl SnpDataset {
    /// Number of retained records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, rsid: &str) -> Option<&SnpRecord> {
        self.records.get(rsid)
    }

    /// Iterator over retained rsIDs (unordered)
    pub fn rsids(&self) -> impl Iterator<Item = &String> {
        self.records.keys()
    }
}

/// Errors that can occur during SNP data parsing
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SnpParseError {
    #[error("input contains no parseable SNP records")]
    Empty,
}

/// Parser for whitespace-delimited SNP genotype data
#[derive(Debug, Clone, Copy, Default)]
pub struct SnpParser;

impl SnpParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a possibly multi-line SNP data string
    ///
    /// # Arguments
    /// * `input` - Raw genotype data as delivered by the contract
    ///
    /// # Returns
    /// * `Ok(SnpDataset)` - At least one record was retained
    /// * `Err(SnpParseError::Empty)` - No line parsed as a record
    ///
    /// Comment lines (starting with '#') and blank lines are skipped
    /// silently. Lines with fewer than 4 fields, or where neither of
    /// columns 2 and 3 is numeric, count toward `skipped_lines`. Records
    /// whose genotype is not two of {A,C,G,T} (case-insensitive) count
    /// toward `skipped_genotypes`.
    pub fn parse(&self, input: &str) -> Result<SnpDataset, SnpParseError> {
        let mut dataset = SnpDataset::default();

        for line in input.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                dataset.skipped_lines += 1;
                continue;
            }

            let rsid = fields[0].to_string();

            let (position, chromosome) = match Self::resolve_columns(fields[1], fields[2]) {
                Some(resolved) => resolved,
                None => {
                    dataset.skipped_lines += 1;
                    continue;
                }
            };

            let genotype = fields[3].to_ascii_uppercase();
            if !Self::is_valid_genotype(&genotype) {
                dataset.skipped_genotypes += 1;
                continue;
            }

            dataset.records.insert(
                rsid.clone(),
                SnpRecord {
                    rsid,
                    chromosome: Self::canonicalize_chromosome(chromosome),
                    position,
                    genotype,
                },
            );
        }

        if dataset.records.is_empty() {
            return Err(SnpParseError::Empty);
        }

        debug!(
            retained = dataset.records.len(),
            skipped_genotypes = dataset.skipped_genotypes,
            skipped_lines = dataset.skipped_lines,
            "parsed SNP dataset"
        );

        Ok(dataset)
    }

    /// Decide which of columns 2 and 3 is the position
    ///
    /// Returns `(position, chromosome_token)` or `None` when neither
    /// column is numeric.
    fn resolve_columns<'a>(second: &'a str, third: &'a str) -> Option<(u64, &'a str)> {
        let second_num = second.parse::<u64>().ok();
        let third_num = third.parse::<u64>().ok();

        match (second_num, third_num) {
            (Some(pos), None) => Some((pos, third)),
            (None, Some(pos)) => Some((pos, second)),
            // Both numeric: the larger value is the position. A tie falls
            // back to column 2, the analyzer's historical fixed order.
            (Some(a), Some(b)) => {
                if b > a {
                    Some((b, second))
                } else {
                    Some((a, third))
                }
            }
            (None, None) => None,
        }
    }

    /// Genotype must be exactly two of {A,C,G,T} (already upper-cased)
    fn is_valid_genotype(genotype: &str) -> bool {
        genotype.len() == 2 && genotype.chars().all(|c| matches!(c, 'A' | 'C' | 'G' | 'T'))
    }

    /// Canonicalize a chromosome token: strip a "chr" prefix, upper-case
    fn canonicalize_chromosome(token: &str) -> String {
        let stripped = token
            .strip_prefix("chr")
            .or_else(|| token.strip_prefix("CHR"))
            .or_else(|| token.strip_prefix("Chr"))
            .unwrap_or(token);
        stripped.to_ascii_uppercase()
    }
}
