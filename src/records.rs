//! Per-format record parsers.
//!
//! Each supported file format has one record type implementing
//! [`RecordParse`]: a pure fields-to-struct conversion with no I/O. The
//! ingestion engine in [`crate::reader`] is generic over this trait.

use crate::error::RowParseError;
use crate::types::{self, GenomicKey, Mark};

/// A typed record that can be built from the split fields of one TSV line.
pub trait RecordParse: Sized + Send {
    /// Minimum number of fields a row must carry before parsing is
    /// attempted.
    const MIN_FIELDS: usize;

    fn parse(fields: &[&str]) -> Result<Self, RowParseError>;
}

fn require_fields(fields: &[&str], expected: usize) -> Result<(), RowParseError> {
    if fields.len() < expected {
        return Err(RowParseError::TooFewFields {
            expected,
            found: fields.len(),
        });
    }
    Ok(())
}

fn parse_u64(field: &str) -> Result<u64, RowParseError> {
    field
        .parse::<u64>()
        .map_err(|_| RowParseError::BadNumber(field.to_string()))
}

fn parse_u32(field: &str) -> Result<u32, RowParseError> {
    field
        .parse::<u32>()
        .map_err(|_| RowParseError::BadNumber(field.to_string()))
}

fn parse_f64(field: &str) -> Result<f64, RowParseError> {
    field
        .parse::<f64>()
        .map_err(|_| RowParseError::BadNumber(field.to_string()))
}

/// Shared core of every BED variant: chrom, start, (end ignored), name.
fn parse_key(fields: &[&str]) -> Result<GenomicKey, RowParseError> {
    let chromosome = types::parse_chromosome_label(fields[0])?;
    let start = parse_u64(fields[1])?;
    let mark = Mark::from_name_field(fields[3])?;
    Ok(GenomicKey::new(chromosome, start, mark))
}

/// One allow-list entry (BED4): a CpG site of interest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bed4Record {
    pub key: GenomicKey,
}

impl RecordParse for Bed4Record {
    const MIN_FIELDS: usize = 4;

    fn parse(fields: &[&str]) -> Result<Self, RowParseError> {
        require_fields(fields, Self::MIN_FIELDS)?;
        Ok(Bed4Record {
            key: parse_key(fields)?,
        })
    }
}

/// One reference-panel row (BED4+x): a CpG site plus one methylation
/// percentage per cell type, stored as proportions.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceRow {
    pub key: GenomicKey,
    pub proportions: Vec<f64>,
}

impl RecordParse for ReferenceRow {
    const MIN_FIELDS: usize = 5;

    fn parse(fields: &[&str]) -> Result<Self, RowParseError> {
        require_fields(fields, Self::MIN_FIELDS)?;
        let key = parse_key(fields)?;
        let proportions = fields[4..]
            .iter()
            .map(|f| parse_f64(f).map(types::to_proportion))
            .collect::<Result<Vec<f64>, _>>()?;
        Ok(ReferenceRow { key, proportions })
    }
}

/// One bulk observation from a projected bedMethyl row.
///
/// The reader projects the raw BED9+9 line onto
/// {chrom, start, end, name, read_depth, fraction_modified}; this parser
/// sees only those six fields.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkRow {
    pub key: GenomicKey,
    pub read_depth: u32,
    pub proportion: f64,
}

impl RecordParse for BulkRow {
    const MIN_FIELDS: usize = 6;

    fn parse(fields: &[&str]) -> Result<Self, RowParseError> {
        require_fields(fields, Self::MIN_FIELDS)?;
        let key = parse_key(fields)?;
        let read_depth = parse_u32(fields[4])?;
        let proportion = types::to_proportion(parse_f64(fields[5])?);
        Ok(BulkRow {
            key,
            read_depth,
            proportion,
        })
    }
}

/// One free-text cell-type label. Only used to name output rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellTypeLabel {
    pub name: String,
}

impl RecordParse for CellTypeLabel {
    const MIN_FIELDS: usize = 1;

    fn parse(fields: &[&str]) -> Result<Self, RowParseError> {
        require_fields(fields, Self::MIN_FIELDS)?;
        Ok(CellTypeLabel {
            name: fields[0].to_string(),
        })
    }
}
