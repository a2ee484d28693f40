use std::path::Path;

use super::load_config;

pub fn run(explicit: Option<&Path>, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(explicit)?;
    let catalogue = config.catalogue()?;

    if json {
        println!("{}", serde_json::to_string_pretty(catalogue.zones())?);
        return Ok(());
    }

    for zone in catalogue.zones() {
        let ranges: Vec<String> = zone.ranges.iter().map(ToString::to_string).collect();
        let max = zone
            .max_duration
            .map_or_else(|| "-".to_string(), |m| format!("{m}m"));
        println!(
            "{:<6} {:<12} energy={:?} min={}m max={} buffer={}m interruption={:?}",
            zone.zone_type.as_str(),
            ranges.join(","),
            zone.energy,
            zone.min_duration,
            max,
            zone.buffer,
            zone.interruption,
        );
    }
    Ok(())
}
