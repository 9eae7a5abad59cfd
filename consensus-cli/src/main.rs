//! Command-line front-end for the constraint consensus feasibility solver.

mod mps;
mod report;
mod scaling;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use consensus_core::violation::assess_point;
use consensus_core::{IncumbentOrder, SolveStatus, SolverSettings};

use report::RunSummary;

#[derive(Parser)]
#[command(name = "consensus")]
#[command(about = "Constraint consensus feasibility solver for MPS models")]
struct Cli {
    /// Chatty progress output (round banners, incumbent updates).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a single MPS model (.mps or .mps.gz)
    Solve {
        /// Path to the MPS file
        path: PathBuf,

        #[command(flatten)]
        opts: SolveOpts,

        /// Print the final point
        #[arg(long)]
        print_point: bool,

        /// Write a one-entry JSON summary here
        #[arg(long)]
        summary: Option<PathBuf>,
    },
    /// Solve every MPS model in a directory and write a JSON summary
    Batch {
        /// Directory of MPS files
        dir: PathBuf,

        #[command(flatten)]
        opts: SolveOpts,

        /// Summary output path
        #[arg(long, default_value = "consensus-summary.json")]
        summary: PathBuf,
    },
    /// Parse a model and print its statistics
    Info {
        /// Path to the MPS file
        path: PathBuf,
    },
}

#[derive(Args)]
struct SolveOpts {
    /// Maximum sample-box rounds
    #[arg(long)]
    max_boxes: Option<usize>,

    /// Maximum consensus iterations per trajectory
    #[arg(long)]
    max_itns: Option<usize>,

    /// Swarm size (default: logical CPU count)
    #[arg(long)]
    swarm_pts: Option<usize>,

    /// Incumbent replacement policy
    #[arg(long, value_enum, default_value = "sfd")]
    order: OrderArg,

    /// Disable linear/quadratic projection inside trajectories
    #[arg(long)]
    no_projection: bool,

    /// Disable the geometric post-swarm search
    #[arg(long)]
    no_search: bool,

    /// Equilibrate the model before solving
    #[arg(long)]
    scale: bool,

    /// RNG seed for reproducible sampling
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OrderArg {
    /// Smallest sum of feasibility distances wins
    Sfd,
    /// Fewest violated constraints wins
    Ninf,
}

impl SolveOpts {
    fn settings(&self) -> SolverSettings {
        let mut s = SolverSettings::default();
        if let Some(b) = self.max_boxes {
            s.max_boxes = b;
        }
        if let Some(i) = self.max_itns {
            s.max_itns = i;
        }
        if let Some(k) = self.swarm_pts {
            s.max_swarm_pts = k;
        }
        s.incumbent_order = match self.order {
            OrderArg::Sfd => IncumbentOrder::Sfd,
            OrderArg::Ninf => IncumbentOrder::Ninf,
        };
        s.use_projection = !self.no_projection;
        s.swarm_search = !self.no_search;
        if self.seed.is_some() {
            s.seed = self.seed;
        }
        s
    }
}

fn main() {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        if cli.verbose { "info" } else { "warn" },
    ))
    .init();

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {:#}", e);
            std::process::exit(2);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Solve {
            path,
            opts,
            print_point,
            summary,
        } => {
            let settings = opts.settings();
            let (run_summary, code, x) = solve_one(&path, &settings, opts.scale)?;
            if print_point {
                println!("x = {:?}", x);
            }
            if let Some(out) = summary {
                report::write_summaries(&out, std::slice::from_ref(&run_summary))?;
                println!("Summary written to {:?}", out);
            }
            Ok(code)
        }

        Commands::Batch { dir, opts, summary } => {
            let settings = opts.settings();
            let mut paths: Vec<PathBuf> = std::fs::read_dir(&dir)
                .with_context(|| format!("failed to read directory {:?}", dir))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| is_mps_file(p))
                .collect();
            paths.sort();

            let mut summaries = Vec::with_capacity(paths.len());
            for (i, path) in paths.iter().enumerate() {
                println!(
                    "----- model {} of {}: {:?} -----",
                    i + 1,
                    paths.len(),
                    path
                );
                match solve_one(path, &settings, opts.scale) {
                    Ok((s, _, _)) => summaries.push(s),
                    Err(e) => {
                        // A bad file must not sink the whole batch.
                        log::warn!("skipping {:?}: {:#}", path, e);
                    }
                }
            }
            report::write_summaries(&summary, &summaries)?;
            println!(
                "Finished {} of {} models; summary written to {:?}",
                summaries.len(),
                paths.len(),
                summary
            );
            Ok(0)
        }

        Commands::Info { path } => {
            let settings = SolverSettings::default();
            let problem = mps::parse_mps(&path, settings.plinfy)?;
            let name = problem.name.clone();
            let model = problem
                .into_model(settings.featol)
                .with_context(|| format!("invalid model in {:?}", path))?;
            report::print_statistics(&name, &model.statistics(settings.featol));
            Ok(0)
        }
    }
}

fn is_mps_file(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    name.ends_with(".mps") || name.ends_with(".mps.gz")
}

fn solve_one(
    path: &Path,
    settings: &SolverSettings,
    scale: bool,
) -> Result<(RunSummary, i32, Vec<f64>)> {
    let read_start = Instant::now();
    let mut problem = mps::parse_mps(path, settings.plinfy)?;
    let name = problem.name.clone();

    let equilibration = if scale {
        Some(scaling::equilibrate(&mut problem, settings.plinfy, 10))
    } else {
        None
    };

    let model = problem
        .into_model(settings.featol)
        .with_context(|| format!("invalid model in {:?}", path))?;
    let read_time = read_start.elapsed().as_secs_f64();

    report::print_statistics(&name, &model.statistics(settings.featol));

    let calc_start = Instant::now();
    let result = consensus_core::solve(&model, settings);
    let calc_time = calc_start.elapsed().as_secs_f64();

    report::print_solve_summary(&result, read_time, calc_time);

    // The solver worked in scaled coordinates; undo before reporting.
    let x = match &equilibration {
        Some(eq) => eq.unscale_point(&result.x),
        None => result.x.clone(),
    };
    if scale {
        // Sanity-check the unscaled point against the unscaled model when
        // possible; a scaled solve reports its own diagnostics above.
        log::info!("solution unscaled from equilibrated coordinates");
    } else if result.status == SolveStatus::Feasible {
        let check = assess_point(&model, &x, settings)
            .map(|a| a.ninf)
            .unwrap_or(usize::MAX);
        if check > 0 {
            log::warn!(
                "feasible point fails the classical LHS-RHS check on {} constraints",
                check
            );
        }
    }

    let summary = RunSummary::from_report(&name, &result, read_time, calc_time);
    let code = match result.status {
        SolveStatus::Feasible => 0,
        SolveStatus::BudgetExhausted => 1,
    };
    Ok((summary, code, x))
}
