//! Stats command implementation

use anyhow::Result;

use crate::capture::{CaptureStore, MediaRecord, MessageRecord, StoreStats};
use crate::zones::ZoneRegistry;

pub fn run(
    messages: &CaptureStore<MessageRecord>,
    media: &CaptureStore<MediaRecord>,
    registry: &ZoneRegistry,
) -> Result<()> {
    print_store("Messages", &messages.stats());
    println!();
    print_store("Media", &media.stats());
    println!();

    let active = registry.list_active();
    if active.is_empty() {
        println!("Zones: none configured");
    } else {
        println!("Zones:");
        for zone in active {
            let since = zone
                .configured_at
                .map(|t| t.format(" (since %Y-%m-%d)").to_string())
                .unwrap_or_default();
            println!("   {} → {}{}", zone.slot, zone.name, since);
        }
    }

    let validation = registry.validate();
    for warning in &validation.warnings {
        println!("⚠️  {warning}");
    }

    Ok(())
}

fn print_store(label: &str, stats: &StoreStats) {
    println!(
        "{}: {} total, {} pending, {} processed",
        label, stats.total, stats.pending, stats.processed
    );
    if stats.by_code.is_empty() {
        return;
    }

    println!("{:<8} {:<8} {:<10} {}", "Code", "Total", "Pending", "Processed");
    println!("{}", "-".repeat(40));
    for (code, counts) in &stats.by_code {
        println!(
            "{:<8} {:<8} {:<10} {}",
            code, counts.total, counts.pending, counts.processed
        );
    }

    if !stats.by_contact.is_empty() {
        println!("By contact:");
        for (contact, counts) in &stats.by_contact {
            println!("   {:<20} {} ({} pending)", contact, counts.total, counts.pending);
        }
    }
}
