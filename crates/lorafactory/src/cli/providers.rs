//! The `lorafactory providers` command.

use clap::Args;
use lorafactory_core::{Capability, Config, ImageProvider, ProviderFactory};
use serde::Serialize;

/// Arguments for the `providers` command.
#[derive(Args, Debug)]
pub struct ProvidersArgs {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct ProviderRow {
    id: String,
    name: String,
    active: bool,
    authenticated: bool,
    capabilities: Vec<Capability>,
}

impl ProviderRow {
    fn new(provider: &dyn ImageProvider, active_id: &str) -> Self {
        Self {
            id: provider.id().to_string(),
            name: provider.name().to_string(),
            active: provider.id() == active_id,
            authenticated: provider.is_authenticated(),
            capabilities: provider.capabilities().to_vec(),
        }
    }
}

/// Execute the providers command.
pub async fn execute(args: ProvidersArgs, config: Config) -> anyhow::Result<()> {
    let registry = ProviderFactory::build_registry(&config)?;
    let active = registry.active();
    let rows: Vec<ProviderRow> = registry
        .get_all()
        .iter()
        .map(|p| ProviderRow::new(p.as_ref(), active.id()))
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for row in &rows {
        let marker = if row.active { "*" } else { " " };
        let auth = if row.authenticated { "key set" } else { "no key" };
        let capabilities: Vec<String> = row.capabilities.iter().map(|c| c.to_string()).collect();
        println!(
            "{marker} {:<12} {:<20} {:<8} {}",
            row.id,
            row.name,
            auth,
            capabilities.join(", ")
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_mark_active_provider() {
        let mut config = Config::default();
        config.providers.default = Some("kie".to_string());
        let registry = ProviderFactory::build_registry(&config).unwrap();
        let active = registry.active();
        let rows: Vec<ProviderRow> = registry
            .get_all()
            .iter()
            .map(|p| ProviderRow::new(p.as_ref(), active.id()))
            .collect();

        let active_rows: Vec<&str> = rows
            .iter()
            .filter(|r| r.active)
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(active_rows, ["kie"]);
        let openrouter = rows.iter().find(|r| r.id == "openrouter").unwrap();
        assert!(openrouter
            .capabilities
            .contains(&Capability::GenerateTextPrompts));
    }
}
