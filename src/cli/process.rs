//! Process command implementation

use anyhow::{bail, Result};

use crate::error::Error;
use crate::processor::{Phase, PhasedProcessor, RunOutcome};

pub fn parse_phase(name: &str) -> Result<Phase> {
    match name {
        "config" | "zone-config" => Ok(Phase::ZoneConfig),
        "schedule" => Ok(Phase::Schedule),
        "zone-data" => Ok(Phase::ZoneData),
        "media" => Ok(Phase::Media),
        other => {
            bail!("unknown phase '{other}' (expected config, schedule, zone-data or media)")
        }
    }
}

pub async fn run(
    processor: &PhasedProcessor,
    batch: Option<usize>,
    only: Option<Phase>,
) -> Result<()> {
    let outcome = match (batch, only) {
        (Some(limit), _) => processor.run_batch(Some(limit)).await,
        (None, Some(phase)) => processor.run_phase(phase).await,
        (None, None) => processor.run_all().await,
    };

    match outcome {
        RunOutcome::AlreadyRunning => {
            println!("A processing run is already in progress; nothing started.");
        }
        RunOutcome::Completed(counts) => {
            println!("✅ Processing complete: {} items", counts.total());
            if counts.batch > 0 {
                println!("   batch:       {}", counts.batch);
            } else {
                println!("   zone-config: {}", counts.zone_config);
                println!("   schedule:    {}", counts.schedule);
                println!("   zone-data:   {}", counts.zone_data);
                println!("   media:       {}", counts.media);
            }
        }
        RunOutcome::Halted {
            phase,
            counts,
            reason,
        } => {
            println!(
                "🛑 Run halted during the {phase} phase after {} items.",
                counts.total()
            );
            match &reason {
                Error::RateLimited { retry_after_secs } => {
                    println!(
                        "   The extraction service is rate-limited; retry in ~{retry_after_secs}s."
                    );
                }
                Error::Auth(msg) => {
                    println!("   Authentication failed: {msg}");
                    println!("   Check the API key before running again.");
                }
                other => println!("   Cause: {other}"),
            }
            println!("   Unprocessed records are untouched; rerun 'process' to resume.");
            bail!("processing halted in the {phase} phase: {reason}");
        }
    }

    Ok(())
}
