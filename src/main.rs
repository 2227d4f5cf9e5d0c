//! Command-line entry point.
//!
//! Parses and validates the CLI, sizes the global rayon pool, wires up the
//! production sampler, and maps fatal pipeline errors to a non-zero exit.

use clap::Parser;
use methyldecon::pipeline::{self, RunConfig};
use methyldecon::sampler::EmpiricalSampler;
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[clap(
    name = "methyldecon",
    version,
    about = "Hybrid cell-type deconvolution for long-read (ONT) methylation data."
)]
struct Args {
    /// The bedMethyl file (BED9+9, as produced by modkit) for the bulk
    /// long-read dataset.
    bedmethyl: PathBuf,

    /// List of CpG sites (BED4) to restrict the deconvolution to.
    /// Defaults to every site in the bedMethyl file.
    #[clap(short = 'c', long)]
    cpg_list: Option<PathBuf>,

    /// Reference matrix of per-cell-type methylation signals (BED4+x,
    /// where x is the number of cell types).
    #[clap(short = 'r', long)]
    reference_matrix: Option<PathBuf>,

    /// Newline-separated cell-type labels matching the reference matrix
    /// columns. Missing labels get generic `cell_type_N` names.
    #[clap(short = 'l', long)]
    cell_type_list: Option<PathBuf>,

    /// Number of additional, unknown cell types to estimate.
    #[clap(long, default_value_t = 0, value_parser = clap::value_parser!(u32).range(0..=100))]
    additional_cell_types: u32,

    /// Worker threads for file ingestion (0 = all cores; capped at the
    /// hardware concurrency).
    #[clap(short = 't', long, default_value_t = 0)]
    threads: usize,

    /// Write the proportions here instead of stdout. Existing files are
    /// never overwritten; a numbered suffix is used instead.
    #[clap(short = 'o', long)]
    outfile: Option<PathBuf>,

    /// Maximum iterations of the refinement loop. Has no effect without
    /// --additional-cell-types.
    #[clap(long, default_value_t = 5, value_parser = clap::value_parser!(u32).range(1..=100))]
    max_iterations: u32,

    /// Squared-distance convergence threshold for the refinement loop.
    #[clap(long, default_value_t = 1e-8)]
    loop_tolerance: f64,

    /// Skip bulk rows with read depth at or below this value.
    #[clap(long, default_value_t = 0)]
    min_read_depth: u32,

    /// Skip bulk rows with read depth at or above this value.
    #[clap(long)]
    max_read_depth: Option<u32>,
}

/// Resolves the requested worker-thread count: 0 means all cores, and a
/// request beyond the hardware concurrency is clamped to it.
fn effective_threads(requested: usize) -> usize {
    let cores = num_cpus::get();
    if requested == 0 {
        cores
    } else {
        requested.min(cores)
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.loop_tolerance < 0.0 {
        eprintln!("Error: --loop-tolerance must be non-negative");
        process::exit(2);
    }

    let threads = effective_threads(args.threads);
    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
    {
        log::warn!("could not size the thread pool: {e}");
    }

    let config = RunConfig {
        bedmethyl_file: args.bedmethyl,
        cpg_list_file: args.cpg_list,
        reference_matrix_file: args.reference_matrix,
        cell_type_list_file: args.cell_type_list,
        additional_cell_types: args.additional_cell_types as usize,
        threads,
        out_file: args.outfile,
        max_iterations: args.max_iterations as usize,
        loop_tolerance: args.loop_tolerance,
        min_read_depth: args.min_read_depth,
        max_read_depth: args.max_read_depth,
    };

    let mut sampler = EmpiricalSampler::new(rand::thread_rng());
    if let Err(e) = pipeline::run(&config, &mut sampler) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::effective_threads;

    #[test]
    fn thread_count_is_clamped_to_hardware_concurrency() {
        let cores = num_cpus::get();
        assert_eq!(effective_threads(0), cores);
        assert_eq!(effective_threads(1), 1);
        assert_eq!(effective_threads(usize::MAX), cores);
    }
}
