//! End-to-end orchestration: ingest, align, deconvolve, report.

use crate::align;
use crate::data::{BulkProfile, CpgList, ReferenceMatrix};
use crate::deconvolve::{self, Deconvolver, StopReason};
use crate::error::{AlignmentError, DeconvError};
use crate::filters;
use crate::output;
use crate::qp::SolverStatus;
use crate::reader::TsvReader;
use crate::records::{Bed4Record, BulkRow, CellTypeLabel, ReferenceRow};
use crate::sampler::ProfileSampler;
use std::io::Write;
use std::path::PathBuf;

/// Raw bedMethyl columns retained for the bulk profile: chrom, start, end,
/// name, read depth (score column), fraction modified. The projected
/// 6-field layout is what every downstream index refers to.
const BEDMETHYL_PROJECTION: [usize; 6] = [0, 1, 2, 3, 4, 10];

/// Everything the pipeline needs, resolved from the CLI.
#[derive(Debug)]
pub struct RunConfig {
    pub bedmethyl_file: PathBuf,
    pub cpg_list_file: Option<PathBuf>,
    pub reference_matrix_file: Option<PathBuf>,
    pub cell_type_list_file: Option<PathBuf>,
    pub additional_cell_types: usize,
    pub threads: usize,
    pub out_file: Option<PathBuf>,
    pub max_iterations: usize,
    pub loop_tolerance: f64,
    pub min_read_depth: u32,
    pub max_read_depth: Option<u32>,
}

/// Narrows reference matrix and bulk profile to a shared, ordered set of
/// genomic positions and seeds the unknown reference columns.
///
/// Exposed for integration testing; `run` is the production entry point.
pub fn preprocess<S: ProfileSampler>(
    reference: &mut ReferenceMatrix,
    bulk: &mut BulkProfile,
    cpg_list: &CpgList,
    additional_cell_types: usize,
    sampler: &mut S,
) -> Result<(), DeconvError> {
    if reference.is_empty() {
        if additional_cell_types < 1 {
            return Err(DeconvError::Config(
                "without a reference matrix, --additional-cell-types must be set (> 0)"
                    .to_string(),
            ));
        }
        *reference = ReferenceMatrix::from_bulk(bulk);
    }

    if !cpg_list.is_empty() {
        let reference_indexes =
            align::find_indexes_in_cpg_list(cpg_list.records(), reference.records())?;
        reference.subset(&reference_indexes);
        let bulk_indexes = align::find_indexes_in_cpg_list(cpg_list.records(), bulk.records())?;
        bulk.subset(&bulk_indexes);
    }

    let (reference_indexes, bulk_indexes) =
        align::find_overlapping_indexes(reference.records(), bulk.records());
    if reference_indexes.is_empty() {
        return Err(AlignmentError::NoOverlap {
            left: "reference matrix",
            right: "bulk profile",
        }
        .into());
    }
    reference.subset(&reference_indexes);
    bulk.subset(&bulk_indexes);

    if additional_cell_types > 0 {
        reference.append_unknown_columns(additional_cell_types, sampler);
    }
    Ok(())
}

/// Runs the whole pipeline: three file loads, alignment, deconvolution,
/// report. Fatal taxonomy errors bubble up; recoverable conditions degrade
/// as the deconvolution loop dictates.
pub fn run<S: ProfileSampler>(config: &RunConfig, sampler: &mut S) -> Result<(), DeconvError> {
    let threads = config.threads;

    let cpg_list = match &config.cpg_list_file {
        Some(path) => {
            let records: Vec<Bed4Record> = TsvReader::new(path, vec![], threads).read()?;
            log::info!("loaded {} CpG allow-list entries", records.len());
            CpgList::new(records)
        }
        None => CpgList::default(),
    };

    let mut reference = match &config.reference_matrix_file {
        Some(path) => {
            let records: Vec<ReferenceRow> = TsvReader::new(path, vec![], threads).read()?;
            log::info!("loaded {} reference rows", records.len());
            ReferenceMatrix::new(records)
        }
        None => ReferenceMatrix::default(),
    };

    let mut bulk_reader: TsvReader<BulkRow> = TsvReader::new(
        &config.bedmethyl_file,
        BEDMETHYL_PROJECTION.to_vec(),
        threads,
    );
    if let Some(predicate) = filters::depth_predicate(config.min_read_depth, config.max_read_depth)
    {
        bulk_reader = bulk_reader.with_predicate(predicate);
    }
    let mut bulk = BulkProfile::new(bulk_reader.read()?);
    log::info!("loaded {} bulk observations", bulk.len());

    let num_known = if reference.is_empty() {
        0
    } else {
        reference.num_cell_types()
    };
    preprocess(
        &mut reference,
        &mut bulk,
        &cpg_list,
        config.additional_cell_types,
        sampler,
    )?;
    log::info!(
        "{} CpG sites after alignment, {} cell types ({} unknown)",
        bulk.len(),
        reference.num_cell_types(),
        config.additional_cell_types
    );

    let mut reference_dense = reference.to_matrix()?;
    let bulk_vector = bulk.to_vector();
    let mut deconvolver = Deconvolver::new(reference_dense.ncols(), bulk_vector);

    let (status, reason) = deconvolve::run(
        &mut deconvolver,
        &mut reference_dense,
        config.additional_cell_types,
        config.max_iterations,
        config.loop_tolerance,
    )?;
    match status {
        SolverStatus::Converged => {}
        SolverStatus::Infeasible => {
            log::warn!("QP solver reported infeasibility; proportions are best-effort")
        }
        SolverStatus::NumericalFailure => {
            log::warn!("QP solver hit a numerical failure; proportions are best-effort")
        }
    }
    match reason {
        StopReason::SingleSolve => log::info!("single solve (no unknown cell types)"),
        StopReason::Converged => log::info!("refinement converged"),
        StopReason::IterationLimit => log::info!(
            "refinement stopped at the iteration cap ({})",
            config.max_iterations
        ),
        StopReason::NumericalDegradation => {
            log::info!("refinement stopped early; reporting last good proportions")
        }
    }

    let labels = match &config.cell_type_list_file {
        Some(path) => {
            let records: Vec<CellTypeLabel> = TsvReader::new(path, vec![], threads).read()?;
            records
        }
        None => Vec::new(),
    };
    let labels =
        output::build_label_list(labels, num_known, config.additional_cell_types);
    let report = output::render_report(&labels, deconvolver.proportions());

    match &config.out_file {
        Some(path) => {
            let written = output::write_report(&report, path)?;
            log::info!("proportions written to '{}'", written.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(report.as_bytes())
                .map_err(|source| crate::error::FileWriteError::Io {
                    path: PathBuf::from("<stdout>"),
                    source,
                })?;
        }
    }

    Ok(())
}
