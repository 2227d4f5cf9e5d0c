//! File-level properties of the ingestion engine: thread-count invariance,
//! exact line accounting, and the bedMethyl column projection.

use methyldecon::reader::TsvReader;
use methyldecon::records::{Bed4Record, BulkRow};
use methyldecon::types::Mark;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_temp(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write");
    file
}

/// A modkit-style bedMethyl line: tabs for the first nine columns, spaces
/// for the trailing statistics block. Column 10 is the fraction modified.
fn bedmethyl_line(chromosome: u8, start: u64, mark: char, depth: u32, fraction: f64) -> String {
    format!(
        "chr{chromosome}\t{start}\t{end}\t{mark}\t{depth}\t+\t{start}\t{end}\t255,0,0 {depth} {fraction:.2} 1 2 3 0 0 4\n",
        end = start + 1,
    )
}

#[test]
fn parsed_records_are_identical_for_any_thread_count() {
    let mut contents = String::new();
    for i in 0..1000u64 {
        let mark = if i % 3 == 0 { 'h' } else { 'm' };
        contents.push_str(&format!("chr{}\t{}\t{}\t{}\n", i % 22 + 1, i * 10, i * 10 + 1, mark));
    }
    let file = write_temp(&contents);

    let baseline: Vec<Bed4Record> = TsvReader::new(file.path(), vec![], 1)
        .read()
        .expect("single-threaded read");
    assert_eq!(baseline.len(), 1000);

    for threads in 2..=8 {
        let records: Vec<Bed4Record> = TsvReader::new(file.path(), vec![], threads)
            .read()
            .expect("parallel read");
        assert_eq!(records, baseline, "thread count {threads} changed the result");
    }
}

#[test]
fn every_line_is_parsed_or_skipped_exactly_once() {
    // 200 valid lines with 17 malformed ones interleaved: parsed count must
    // be exactly 200 for every thread count, with no duplicates.
    let mut contents = String::new();
    let mut malformed = 0;
    for i in 0..217u64 {
        if i % 13 == 5 {
            contents.push_str("garbage line with no structure\n");
            malformed += 1;
        } else {
            contents.push_str(&format!("chr1\t{}\t{}\tm\n", i * 100, i * 100 + 1));
        }
    }
    assert_eq!(malformed, 17);
    let file = write_temp(&contents);

    for threads in 1..=6 {
        let records: Vec<Bed4Record> = TsvReader::new(file.path(), vec![], threads)
            .read()
            .expect("read");
        assert_eq!(records.len(), 200);
        let mut starts: Vec<u64> = records.iter().map(|r| r.key.start).collect();
        let before = starts.len();
        starts.dedup();
        assert_eq!(starts.len(), before, "a line was parsed twice");
    }
}

#[test]
fn bedmethyl_projection_extracts_depth_and_fraction() {
    let contents = format!(
        "{}{}",
        bedmethyl_line(1, 100, 'm', 30, 75.0),
        bedmethyl_line(1, 200, 'h', 12, 10.0),
    );
    let file = write_temp(&contents);

    let records: Vec<BulkRow> =
        TsvReader::new(file.path(), vec![0, 1, 2, 3, 4, 10], 2)
            .read()
            .expect("read");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].key.mark, Mark::Methyl);
    assert_eq!(records[0].read_depth, 30);
    assert!((records[0].proportion - 0.75).abs() < 1e-9);
    assert_eq!(records[1].key.mark, Mark::Hydroxy);
    assert!((records[1].proportion - 0.10).abs() < 1e-9);
}

#[test]
fn depth_predicate_runs_on_projected_fields() {
    let contents = format!(
        "{}{}{}",
        bedmethyl_line(1, 100, 'm', 5, 50.0),
        bedmethyl_line(1, 200, 'm', 25, 50.0),
        bedmethyl_line(1, 300, 'm', 80, 50.0),
    );
    let file = write_temp(&contents);

    let reader: TsvReader<BulkRow> = TsvReader::new(file.path(), vec![0, 1, 2, 3, 4, 10], 1);
    let records = reader
        .with_predicate(methyldecon::filters::depth_predicate(10, Some(50)).unwrap())
        .read()
        .expect("read");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key.start, 200);
}

#[test]
fn file_without_trailing_newline_keeps_its_last_line() {
    let file = write_temp("chr1\t100\t101\tm\nchr1\t200\t201\th");
    for threads in 1..=4 {
        let records: Vec<Bed4Record> = TsvReader::new(file.path(), vec![], threads)
            .read()
            .expect("read");
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].key.start, 200);
    }
}
