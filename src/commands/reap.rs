//! Stale claim recovery.

use clap::Args;

use crate::output::{self, OutputFormat};
use jobhub_core::config::AppConfig;
use jobhub_core::error::AppError;
use jobhub_core::types::now_ms;

/// Arguments for the reap command
#[derive(Debug, Args)]
pub struct ReapArgs {
    /// Requeue jobs that have been processing for longer than this
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub older_than_minutes: u64,
}

/// Execute the reaper once
pub async fn execute(args: &ReapArgs, config: &AppConfig, format: OutputFormat) -> Result<(), AppError> {
    let claimed_before = claim_cutoff(now_ms(), args.older_than_minutes)?;

    let queue = super::create_queue(config, true).await?;
    let result = queue.requeue_stale(claimed_before).await;
    super::close_queue(queue).await;
    let report = result?;

    match format {
        OutputFormat::Json => output::print_item(&report, format),
        OutputFormat::Table => {
            if report.total() == 0 {
                output::print_success("No stale jobs found.");
            } else {
                for job_id in &report.requeued {
                    output::print_kv("requeued", job_id);
                }
                for job_id in &report.abandoned {
                    output::print_kv("abandoned", job_id);
                }
                output::print_success(&format!(
                    "Recovered {} stale jobs ({} requeued, {} abandoned)",
                    report.total(),
                    report.requeued.len(),
                    report.abandoned.len()
                ));
            }
        }
    }

    Ok(())
}

/// Claim time before which a processing job counts as stale.
fn claim_cutoff(now_ms: i64, older_than_minutes: u64) -> Result<i64, AppError> {
    i64::try_from(older_than_minutes)
        .ok()
        .and_then(|minutes| minutes.checked_mul(60_000))
        .and_then(|age_ms| now_ms.checked_sub(age_ms))
        .ok_or_else(|| {
            AppError::validation(format!("--older-than-minutes is too large: {older_than_minutes}"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_cutoff() {
        assert_eq!(claim_cutoff(1_000_000, 10).unwrap(), 400_000);
        assert!(claim_cutoff(1_000_000, u64::MAX).is_err());
        assert!(claim_cutoff(1_000_000, i64::MAX as u64).is_err());
    }
}
