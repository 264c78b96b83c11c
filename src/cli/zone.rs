//! Zone command implementation

use anyhow::Result;

use crate::zones::{ZoneRegistry, ZONE_SLOTS};

pub fn show(registry: &ZoneRegistry) -> Result<()> {
    let config = registry.load();
    for slot in 1..=ZONE_SLOTS {
        match config.slot(slot) {
            Some(zone) if zone.active => {
                let name = zone.name.as_deref().unwrap_or("?");
                let since = zone
                    .configured_at
                    .map(|t| t.format(" since %Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!("Zone {slot}: {name}{since}");
            }
            _ => println!("Zone {slot}: (not configured)"),
        }
    }

    let validation = registry.validate();
    for warning in &validation.warnings {
        println!("⚠️  {warning}");
    }
    for error in &validation.errors {
        println!("❌ {error}");
    }
    Ok(())
}

pub fn set(registry: &ZoneRegistry, slot: u8, name: &str) -> Result<()> {
    registry.set_zone(slot, name)?;
    // set_zone uppercases; report what was stored
    if let Some(zone) = registry.get_zone(slot) {
        println!(
            "✅ Zone {slot} configured: {}",
            zone.name.as_deref().unwrap_or("?")
        );
    }
    Ok(())
}

pub fn reset(registry: &ZoneRegistry) -> Result<()> {
    registry.reset_all()?;
    println!("✅ All zones reset");
    Ok(())
}
