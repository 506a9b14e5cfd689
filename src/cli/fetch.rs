//! One-shot acquisition command.

use console::style;

use crate::config::Settings;
use crate::pipeline::Pipeline;

/// Resolve one source and write its records to stdout as JSON.
pub async fn cmd_fetch(settings: &Settings, source_id: &str, pretty: bool) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_settings(settings)?;
    let records = pipeline.resolve(source_id).await?;

    let json = if pretty {
        serde_json::to_string_pretty(&*records)?
    } else {
        serde_json::to_string(&*records)?
    };
    println!("{}", json);

    eprintln!(
        "{} {} records from {}",
        style("✓").green(),
        records.len(),
        source_id
    );
    Ok(())
}
