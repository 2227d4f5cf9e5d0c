//! Core domain types shared by every stage of the pipeline.
//!
//! The central type is [`GenomicKey`]: the (chromosome, start, mark) triple
//! that every alignment operation uses for equality and ordering. Interval
//! ends never participate in comparisons, so they are not stored.

use crate::error::RowParseError;
use std::fmt;

/// Whether a row carries a methylation or a hydroxymethylation signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Mark {
    Hydroxy,
    Methyl,
}

impl Mark {
    /// Reads the mark from a BED name field: the first character must be
    /// `m` or `h`.
    pub fn from_name_field(field: &str) -> Result<Self, RowParseError> {
        match field.as_bytes().first() {
            Some(b'm') => Ok(Mark::Methyl),
            Some(b'h') => Ok(Mark::Hydroxy),
            Some(&other) => Err(RowParseError::BadMark(other as char)),
            None => Err(RowParseError::BadMark('\0')),
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mark::Methyl => write!(f, "m"),
            Mark::Hydroxy => write!(f, "h"),
        }
    }
}

/// The sole equality/ordering key for all interval alignment.
///
/// Ordered by (chromosome, start, mark). `Hydroxy` sorts before `Methyl`
/// within one position, matching the lexicographic order of the raw name
/// field that upstream sorting tools use, so pre-sorted inputs stay sorted
/// under this key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenomicKey {
    pub chromosome: u8,
    pub start: u64,
    pub mark: Mark,
}

impl GenomicKey {
    pub fn new(chromosome: u8, start: u64, mark: Mark) -> Self {
        Self {
            chromosome,
            start,
            mark,
        }
    }
}

/// Parses a chromosome label into its numeric form.
///
/// Accepts an optional `chr` prefix in any case, then either a decimal
/// number or one of the special chromosomes `X`, `Y`, `M` (mapped to
/// 23, 24, 25).
pub fn parse_chromosome_label(label: &str) -> Result<u8, RowParseError> {
    let mut trimmed = label.trim();

    if trimmed.len() >= 3 && trimmed[..3].eq_ignore_ascii_case("chr") {
        trimmed = &trimmed[3..];
    }

    if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return trimmed
            .parse::<u8>()
            .map_err(|_| RowParseError::BadChromosome(label.to_string()));
    }

    if trimmed.len() == 1 {
        match trimmed.as_bytes()[0].to_ascii_lowercase() {
            b'x' => return Ok(23),
            b'y' => return Ok(24),
            b'm' => return Ok(25),
            _ => {}
        }
    }

    Err(RowParseError::BadChromosome(label.to_string()))
}

/// Converts a proportion to a percentage rounded to `precision` decimal
/// places.
///
/// The deconvolution output can contain tiny negative values; those (and the
/// signed zero produced by rounding them) are clamped to positive zero so
/// the report never shows `-0`.
pub fn to_percent(proportion: f64, precision: u32) -> f64 {
    let scale = 10f64.powi(precision as i32);
    let percent = (proportion * 100.0 * scale).round() / scale;
    if percent <= 0.0 { 0.0 } else { percent }
}

/// Converts a percentage (0-100, as stored in the input files) to a
/// proportion.
pub fn to_proportion(percent: f64) -> f64 {
    percent * 0.01
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chromosome_label_supports_common_variants() {
        assert_eq!(parse_chromosome_label("chr1").unwrap(), 1);
        assert_eq!(parse_chromosome_label("CHR10").unwrap(), 10);
        assert_eq!(parse_chromosome_label("Chr22").unwrap(), 22);
        assert_eq!(parse_chromosome_label("7").unwrap(), 7);
        assert_eq!(parse_chromosome_label("chrX").unwrap(), 23);
        assert_eq!(parse_chromosome_label("chrY").unwrap(), 24);
        assert_eq!(parse_chromosome_label("chrM").unwrap(), 25);
        assert_eq!(parse_chromosome_label("x").unwrap(), 23);
    }

    #[test]
    fn chromosome_label_rejects_garbage() {
        assert!(parse_chromosome_label("chrQ").is_err());
        assert!(parse_chromosome_label("").is_err());
        assert!(parse_chromosome_label("chr").is_err());
        assert!(parse_chromosome_label("12abc").is_err());
    }

    #[test]
    fn keys_order_by_chromosome_then_start_then_mark() {
        let a = GenomicKey::new(1, 100, Mark::Methyl);
        let b = GenomicKey::new(1, 200, Mark::Hydroxy);
        let c = GenomicKey::new(2, 50, Mark::Hydroxy);
        assert!(a < b);
        assert!(b < c);
        let h = GenomicKey::new(1, 100, Mark::Hydroxy);
        assert!(h < a);
    }

    #[test]
    fn percent_conversion_clamps_negatives_and_signed_zero() {
        assert_eq!(to_percent(-1e-12, 2), 0.0);
        assert!(to_percent(-0.0, 2).is_sign_positive());
        assert_eq!(to_percent(0.305, 2), 30.5);
        assert_eq!(to_percent(1.0, 2), 100.0);
    }

    #[test]
    fn percent_round_trips_with_proportion() {
        let p = 0.4273;
        let round_tripped = to_proportion(to_percent(p, 2));
        assert!((round_tripped - p).abs() < 1e-4);
    }
}
