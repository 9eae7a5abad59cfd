//! Statistics printing and run summaries.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use consensus_core::model::ModelStats;
use consensus_core::SolveReport;
use serde::{Deserialize, Serialize};

/// Print the model statistics block.
pub fn print_statistics(name: &str, st: &ModelStats) {
    println!("\nMODEL STATISTICS: {}", name);
    println!("  {} rows", st.n_rows);
    println!(
        "    {} G, {} L, {} E, {} R, {} free",
        st.g_rows, st.l_rows, st.e_rows, st.r_rows, st.free_rows
    );
    println!("  {} columns ({} integer)", st.n_cols, st.integer_cols);
    println!("  {} nonzero elements", st.n_elements);
    println!(
        "    {:.2} average per row, {} maximum in a row",
        st.avg_els_per_row, st.max_els_in_row
    );
    println!(
        "    {:.2} average per column, {} maximum in a column",
        st.avg_els_per_col, st.max_els_in_col
    );
    println!("  {} binding row bounds", st.binding_constraints);
    println!("  {} binding variable bounds", st.binding_bounds);
}

/// Print the solve diagnostics the way the batch summary records them.
pub fn print_solve_summary(report: &SolveReport, read_time_s: f64, calc_time_s: f64) {
    println!();
    println!("Status: {}", report.status);
    match report.status {
        consensus_core::SolveStatus::Feasible => {
            println!("Feasible point found.");
        }
        consensus_core::SolveStatus::BudgetExhausted => {
            println!(
                "No feasible point found. Incumbent SFD: {:.6e} NINF: {}",
                report.sfd, report.ninf
            );
        }
    }
    if let Some(src) = report.final_source {
        println!("Final point generated by {}", src);
    }
    println!("Rounds: {}", report.stats.rounds);
    println!("Trajectories: {}", report.stats.cc_runs);
    println!("Read time (s): {:.3}", read_time_s);
    println!("Calculation time (s): {:.3}", calc_time_s);

    println!(
        "Total incumbent updates: {}",
        report.stats.total_updates
    );
    println!("Incumbent updates by source: {:?}", report.stats.updates_by_source);
    println!(
        "Average fractional improvements: {:?}",
        report
            .stats
            .avg_frac_by_source
            .iter()
            .map(|f| (f * 1e4).round() / 1e4)
            .collect::<Vec<_>>()
    );

    let p = &report.stats.projection;
    println!(
        "Linear projection succeeds {} of {} tries (avg. frac. improvement {:.4})",
        p.lin_succeeds,
        p.lin_succeeds + p.lin_fails,
        p.avg_lin_improvement()
    );
    println!(
        "Quadratic projection succeeds {} of {} tries (avg. frac. improvement {:.4})",
        p.quad_succeeds,
        p.quad_succeeds + p.quad_fails,
        p.avg_quad_improvement()
    );
}

/// One solved model's record in a batch summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Model name.
    pub model: String,
    /// Outcome status.
    pub status: String,
    /// NINF at the final point.
    pub ninf: u64,
    /// SFD at the final point.
    pub sfd: f64,
    /// Rounds commenced.
    pub rounds: usize,
    /// Who produced the final point.
    pub final_source: Option<String>,
    /// Model read time, seconds.
    pub read_time_s: f64,
    /// Solve time, seconds.
    pub calc_time_s: f64,
    /// Linear projection successes.
    pub lin_proj_succeeds: u64,
    /// Linear projection attempts.
    pub lin_proj_tries: u64,
    /// Mean fractional improvement of successful linear projections.
    pub lin_proj_avg_improvement: f64,
    /// Quadratic projection successes.
    pub quad_proj_succeeds: u64,
    /// Quadratic projection attempts.
    pub quad_proj_tries: u64,
    /// Mean fractional improvement of successful quadratic projections.
    pub quad_proj_avg_improvement: f64,
    /// Incumbent replacements.
    pub incumbent_updates: u64,
    /// Improvements per source slot.
    pub updates_by_source: Vec<u64>,
    /// Mean fractional improvement per source slot.
    pub avg_frac_by_source: Vec<f64>,
}

impl RunSummary {
    /// Build a summary record from a solve report.
    pub fn from_report(
        model: &str,
        report: &SolveReport,
        read_time_s: f64,
        calc_time_s: f64,
    ) -> Self {
        let p = &report.stats.projection;
        RunSummary {
            model: model.to_string(),
            status: report.status.to_string(),
            ninf: report.ninf as u64,
            sfd: report.sfd,
            rounds: report.stats.rounds,
            final_source: report.final_source.map(|s| s.to_string()),
            read_time_s,
            calc_time_s,
            lin_proj_succeeds: p.lin_succeeds,
            lin_proj_tries: p.lin_succeeds + p.lin_fails,
            lin_proj_avg_improvement: p.avg_lin_improvement(),
            quad_proj_succeeds: p.quad_succeeds,
            quad_proj_tries: p.quad_succeeds + p.quad_fails,
            quad_proj_avg_improvement: p.avg_quad_improvement(),
            incumbent_updates: report.stats.total_updates,
            updates_by_source: report.stats.updates_by_source.clone(),
            avg_frac_by_source: report.stats.avg_frac_by_source.clone(),
        }
    }
}

/// Write a batch of run summaries as pretty JSON.
pub fn write_summaries<P: AsRef<Path>>(path: P, summaries: &[RunSummary]) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("failed to create summary file {:?}", path))?;
    serde_json::to_writer_pretty(BufWriter::new(file), summaries)
        .with_context(|| format!("failed to write summary file {:?}", path))?;
    Ok(())
}
