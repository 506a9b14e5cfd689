//! Source listing command.

use console::style;

use crate::config::Settings;

/// List configured sources.
pub fn cmd_sources(settings: &Settings) -> anyhow::Result<()> {
    if settings.sources.is_empty() {
        println!("{} No sources configured.", style("!").yellow());
        return Ok(());
    }

    println!("\n{}", style("Sources").bold());
    println!("{}", "-".repeat(72));
    println!("{:<12} {:<16} {:<18} Base URL", "ID", "Name", "Strategy");
    println!("{}", "-".repeat(72));

    for source in &settings.sources {
        println!(
            "{:<12} {:<16} {:<18} {}",
            source.id,
            truncate(source.display_name(), 15),
            source.strategy.kind(),
            source.base_url
        );
    }

    Ok(())
}

/// Truncate to `max` characters, marking the cut with an ellipsis.
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("Nikora", 15), "Nikora");
        assert_eq!(truncate("ნიკორა სუპერმარკეტი", 6), "ნიკორ…");
    }
}
