use std::sync::Arc;

use laddertrack_core::HealthRegistry;
use laddertrack_warehouse::Warehouse;
use serde_json::json;

use crate::cli::HealthArgs;
use crate::error::CliError;

use super::{selected_providers, CommandOutput};

pub async fn run(args: &HealthArgs, warehouse: Warehouse) -> Result<CommandOutput, CliError> {
    let providers = selected_providers(args.provider.as_deref())?;

    let scores = tokio::task::spawn_blocking(move || {
        let registry = HealthRegistry::new(Arc::new(warehouse));
        for provider in providers {
            registry.monitor(provider);
        }
        registry.snapshot()
    })
    .await
    .map_err(|error| CliError::Command(error.to_string()))?;

    let rows: Vec<_> = scores
        .into_iter()
        .map(|(provider, score)| {
            json!({
                "provider": provider,
                "requests": score.requests,
                "errors": score.errors,
                "error_rate": score.error_rate,
                "health": score.health,
                "state": score.state().as_str(),
            })
        })
        .collect();

    Ok(CommandOutput::new(
        rows.into(),
        vec!["provider", "state", "health", "error_rate", "requests", "errors"],
    ))
}
