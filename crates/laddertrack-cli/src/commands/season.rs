use std::sync::Arc;
use std::time::Duration;

use laddertrack_core::{
    BattleNetSeasonSource, HealthRegistry, ProviderClient, ProviderId, Region, SeasonResolution,
    SeasonResolver,
};
use laddertrack_warehouse::Warehouse;
use serde_json::json;

use crate::cli::SeasonArgs;
use crate::error::CliError;

use super::CommandOutput;

pub async fn run(args: &SeasonArgs, warehouse: Warehouse) -> Result<CommandOutput, CliError> {
    let region: Region = args.region.parse()?;
    let warehouse = Arc::new(warehouse);

    let registry = Arc::new(HealthRegistry::new(warehouse.clone()));
    let client = ProviderClient::from_env(ProviderId::Battlenet, &registry)?;
    let source = BattleNetSeasonSource::new(Arc::new(client)).with_store(warehouse.clone());
    let resolver = SeasonResolver::new(Arc::new(source), warehouse)
    .with_fetch_deadline(Duration::from_millis(args.deadline_ms));

    let resolution = resolver.resolve(region, args.season).await;

    // Persist this run's outcome so `laddertrack health` reflects it.
    tokio::task::spawn_blocking(move || registry.update_all())
        .await
        .map_err(|error| CliError::Command(error.to_string()))?;

    let resolution = resolution?;
    if !resolution.is_fresh() {
        tracing::info!(%region, requested = args.season, "serving locally stored season");
    }
    Ok(CommandOutput::new(
        season_row(&resolution),
        vec!["source", "region", "battlenet_id", "year", "number", "start", "end"],
    ))
}

fn season_row(resolution: &SeasonResolution) -> serde_json::Value {
    let season = resolution.season();
    json!({
        "source": if resolution.is_fresh() { "fresh" } else { "stale" },
        "region": season.region,
        "battlenet_id": season.battlenet_id,
        "year": season.year,
        "number": season.number,
        "start": season.start.to_string(),
        "end": season.end.to_string(),
    })
}
