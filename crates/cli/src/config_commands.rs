use {
    anyhow::Result,
    clap::Subcommand,
    fixgate_config::{FixgateConfig, validate},
};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the effective config and report problems.
    Check,
    /// Print the effective config as TOML.
    Show,
}

pub fn handle_config(action: ConfigAction, config: &FixgateConfig) -> Result<()> {
    match action {
        ConfigAction::Check => check(config),
        ConfigAction::Show => show(config),
    }
}

fn check(config: &FixgateConfig) -> Result<()> {
    let issues = validate(config);
    if issues.is_empty() {
        println!(
            "config ok: {} librar{} registered",
            config.libraries.len(),
            if config.libraries.len() == 1 { "y" } else { "ies" }
        );
        return Ok(());
    }
    for issue in &issues {
        eprintln!("  - {issue}");
    }
    anyhow::bail!("{} config issue(s) found", issues.len())
}

fn show(config: &FixgateConfig) -> Result<()> {
    let rendered =
        toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("serialize config: {e}"))?;
    print!("{rendered}");
    Ok(())
}
