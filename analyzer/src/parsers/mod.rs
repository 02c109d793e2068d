// ==============================================================================
// parsers/mod.rs - SNP data parser modules
// ==============================================================================
// Description: Parsers for raw genotype data delivered as contract strings
// Author: Matt Barham
// Created: 2025-11-10
// Modified: 2025-11-18
// Version: 1.1.0
// ==============================================================================

pub mod snp;

pub use snp::{SnpParser, SnpRecord, SnpDataset, SnpParseError};
