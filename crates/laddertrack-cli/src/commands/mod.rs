mod health;
mod providers;
mod season;
mod vars;

use laddertrack_core::ProviderId;
use laddertrack_warehouse::{Warehouse, WarehouseConfig};
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// Command result: JSON data plus the columns shown in table output.
pub struct CommandOutput {
    pub data: Value,
    pub columns: Vec<&'static str>,
}

impl CommandOutput {
    pub fn new(data: Value, columns: Vec<&'static str>) -> Self {
        Self { data, columns }
    }
}

pub async fn run(cli: &Cli) -> Result<CommandOutput, CliError> {
    match &cli.command {
        Command::Providers(args) => providers::run(args),
        Command::Health(args) => health::run(args, open_warehouse(cli)?).await,
        Command::Season(args) => season::run(args, open_warehouse(cli)?).await,
        Command::Vars(args) => vars::run(args, &open_warehouse(cli)?),
    }
}

fn open_warehouse(cli: &Cli) -> Result<Warehouse, CliError> {
    let config = match &cli.home {
        Some(home) => WarehouseConfig::at(home),
        None => WarehouseConfig::default(),
    };
    let warehouse = Warehouse::open(config)?;
    tracing::debug!(db_path = %warehouse.db_path().display(), "opened warehouse");
    Ok(warehouse)
}

/// Every provider, or just the one named on the command line.
fn selected_providers(provider: Option<&str>) -> Result<Vec<ProviderId>, CliError> {
    match provider {
        Some(name) => Ok(vec![name.parse()?]),
        None => Ok(ProviderId::ALL.to_vec()),
    }
}
