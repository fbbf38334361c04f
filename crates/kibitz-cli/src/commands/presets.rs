use super::{json_pretty, EXIT_SUCCESS};
use kibitz_core::{list_presets, EngineConfig};
use kibitz_runtime::available_cores;
use serde::Serialize;

#[derive(Serialize)]
struct PresetRow {
    name: &'static str,
    description: &'static str,
    /// Values on this host; absent for parameterized presets.
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<EngineConfig>,
}

pub fn run(json_output: bool) -> Result<u8, String> {
    let cores = available_cores();
    let rows: Vec<PresetRow> = list_presets()
        .iter()
        .map(|preset| PresetRow {
            name: preset.name,
            description: preset.description,
            config: EngineConfig::preset(preset.name, cores),
        })
        .collect();

    if json_output {
        println!("{}", json_pretty(&rows)?);
        return Ok(EXIT_SUCCESS);
    }

    println!("{:<12} {:>4} {:>6} {:>7} {:>5}  DESCRIPTION", "PRESET", "PV", "HASH", "THREADS", "DEPTH");
    for row in &rows {
        match &row.config {
            Some(config) => {
                let depth = match config.max_depth() {
                    0 => "-".to_owned(),
                    d => d.to_string(),
                };
                println!(
                    "{:<12} {:>4} {:>6} {:>7} {:>5}  {}",
                    row.name,
                    config.multi_pv(),
                    config.hash_mb(),
                    config.threads(),
                    depth,
                    row.description
                );
            }
            None => println!("{:<12} {:>4} {:>6} {:>7} {:>5}  {}", row.name, "", "", "", "", row.description),
        }
    }
    Ok(EXIT_SUCCESS)
}
