//! Row predicates applied during ingestion.
//!
//! Predicates run on the *projected* fields of a bulk bedMethyl row, where
//! column 4 is the read depth. A predicate that cannot evaluate (too few
//! fields, unparsable depth) fails the row like any other parse error.

use crate::error::RowParseError;
use crate::reader::RowPredicate;

/// Field index of the read depth in the projected bulk layout
/// {chrom, start, end, name, read_depth, fraction_modified}.
const READ_DEPTH_FIELD: usize = 4;

fn read_depth(fields: &[&str]) -> Result<u32, RowParseError> {
    let field = fields.get(READ_DEPTH_FIELD).copied().ok_or(
        RowParseError::TooFewFields {
            expected: READ_DEPTH_FIELD + 1,
            found: fields.len(),
        },
    )?;
    field
        .parse::<u32>()
        .map_err(|_| RowParseError::Predicate(format!("unparsable read depth '{field}'")))
}

/// Keeps rows whose read depth is strictly greater than `min_reads`.
pub fn min_read_depth(min_reads: u32) -> RowPredicate {
    Box::new(move |fields| Ok(read_depth(fields)? > min_reads))
}

/// Keeps rows whose read depth is strictly less than `max_reads`.
pub fn max_read_depth(max_reads: u32) -> RowPredicate {
    Box::new(move |fields| Ok(read_depth(fields)? < max_reads))
}

/// ANDs a set of predicates together; `None` when the set is empty.
pub fn all_of(predicates: Vec<RowPredicate>) -> Option<RowPredicate> {
    if predicates.is_empty() {
        return None;
    }
    Some(Box::new(move |fields| {
        for predicate in &predicates {
            if !predicate(fields)? {
                return Ok(false);
            }
        }
        Ok(true)
    }))
}

/// Builds the combined read-depth predicate from the CLI options. A minimum
/// of 0 and an absent maximum both mean "no bound".
pub fn depth_predicate(min_reads: u32, max_reads: Option<u32>) -> Option<RowPredicate> {
    let mut predicates: Vec<RowPredicate> = Vec::new();
    if min_reads > 0 {
        predicates.push(min_read_depth(min_reads));
    }
    if let Some(max_reads) = max_reads {
        predicates.push(max_read_depth(max_reads));
    }
    all_of(predicates)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROW: &[&str] = &["chr1", "100", "101", "m", "25", "80.0"];

    #[test]
    fn min_depth_is_exclusive() {
        assert!(min_read_depth(10)(ROW).unwrap());
        assert!(!min_read_depth(25)(ROW).unwrap());
    }

    #[test]
    fn max_depth_is_exclusive() {
        assert!(max_read_depth(26)(ROW).unwrap());
        assert!(!max_read_depth(25)(ROW).unwrap());
    }

    #[test]
    fn combined_filter_needs_all_predicates() {
        let combined = all_of(vec![min_read_depth(10), max_read_depth(20)]).unwrap();
        assert!(!combined(ROW).unwrap());
        let combined = all_of(vec![min_read_depth(10), max_read_depth(30)]).unwrap();
        assert!(combined(ROW).unwrap());
    }

    #[test]
    fn empty_filter_set_is_none() {
        assert!(all_of(vec![]).is_none());
        assert!(depth_predicate(0, None).is_none());
    }

    #[test]
    fn short_row_is_a_predicate_error() {
        let err = min_read_depth(10)(&["chr1", "100"]).unwrap_err();
        assert!(matches!(err, RowParseError::TooFewFields { .. }));
    }

    #[test]
    fn bad_depth_is_a_predicate_error() {
        let row = ["chr1", "100", "101", "m", "low", "80.0"];
        let err = min_read_depth(10)(&row).unwrap_err();
        assert!(matches!(err, RowParseError::Predicate(_)));
    }
}
