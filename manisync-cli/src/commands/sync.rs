//! The `sync` command: one synchronization run with a progress bar.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use manisync::{CompletionQueue, RunReport, RunStatus, Synchronizer};
use tracing::{debug, warn};

use super::load_config;
use crate::cli::SyncArgs;
use crate::error::CliError;

/// Host loop tick: how often the completion queue is drained.
const TICK: Duration = Duration::from_millis(50);

const BAR_TEMPLATE: &str =
    "{spinner:.blue} [{elapsed_precise}] {wide_bar:.cyan/blue} {pos}/{len} files {msg}";

/// Run a synchronization to completion.
pub fn run(args: SyncArgs) -> Result<(), CliError> {
    let config = load_config()?;

    let mut pool_config = config.pool;
    if let Some(workers) = args.workers {
        pool_config = pool_config.with_workers(usize::from(workers));
    }
    if let Some(identity) = args.identity {
        pool_config = pool_config.with_identity(identity);
    }
    let output = args.output.unwrap_or(config.output_dir);
    debug!(?pool_config, output = %output.display(), "Effective settings");

    let sync = Arc::new(Synchronizer::from_config(&pool_config)?);

    // First Ctrl+C aborts the run; the drain loop then reports and exits.
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let sync = Arc::clone(&sync);
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || {
            if !interrupted.swap(true, Ordering::SeqCst) {
                warn!("Interrupted, aborting run");
                sync.force_shutdown();
            }
        })
        .map_err(|e| CliError::Signal(e.to_string()))?;
    }

    println!(
        "Synchronizing {} into {}",
        style(&args.url).cyan(),
        style(output.display()).cyan()
    );

    let bar = progress_bar();
    let mut queue = CompletionQueue::new();
    let finished: Arc<OnceLock<RunReport>> = Arc::new(OnceLock::new());

    let notify = queue.handle();
    let slot = Arc::clone(&finished);
    let done_bar = bar.clone();
    let handle = sync.start_run(args.url, output, move |report| {
        notify.execute(move || {
            done_bar.finish_and_clear();
            let _ = slot.set(report);
        });
    })?;

    let report = loop {
        queue.drain();
        if let Some(report) = finished.get() {
            break report.clone();
        }

        // Counters are atomics; sampled directly on this thread.
        let progress = handle.progress();
        bar.set_length(progress.total as u64);
        bar.set_position(progress.completed as u64);
        if progress.failed > 0 {
            bar.set_message(format!("({} failed)", progress.failed));
        }
        thread::sleep(TICK);
    };

    sync.shutdown();
    print_summary(&report);

    if interrupted.load(Ordering::SeqCst) {
        return Err(CliError::Interrupted);
    }
    match report.status {
        RunStatus::Completed => Ok(()),
        _ => Err(CliError::RunFailed(
            report.error.unwrap_or_else(|| "unknown error".to_string()),
        )),
    }
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    if let Ok(bar_style) = ProgressStyle::with_template(BAR_TEMPLATE) {
        bar.set_style(bar_style.progress_chars("=> "));
    }
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn print_summary(report: &RunReport) {
    let status = match report.status {
        RunStatus::Completed if report.failed == 0 => style("Completed").green().bold(),
        RunStatus::Completed => style("Completed with failures").yellow().bold(),
        _ => style("Failed").red().bold(),
    };

    println!(
        "{}: {}/{} entries in {:.1}s",
        status,
        report.completed,
        report.total,
        report.elapsed.as_secs_f64()
    );
    if report.failed > 0 {
        println!("  {} entries failed (see log for details)", report.failed);
    }
    if let Some(error) = &report.error {
        println!("  {}", style(error).red());
    }
}
