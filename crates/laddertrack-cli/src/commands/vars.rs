use laddertrack_warehouse::Warehouse;
use serde_json::json;

use crate::cli::VarsArgs;
use crate::error::CliError;

use super::CommandOutput;

pub fn run(args: &VarsArgs, warehouse: &Warehouse) -> Result<CommandOutput, CliError> {
    let rows: Vec<_> = warehouse
        .vars_with_prefix(&args.prefix)?
        .into_iter()
        .map(|var| json!({ "key": var.key, "value": var.value }))
        .collect();

    Ok(CommandOutput::new(rows.into(), vec!["key", "value"]))
}

#[cfg(test)]
mod tests {
    use laddertrack_warehouse::WarehouseConfig;

    use super::*;

    #[test]
    fn prefix_filters_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let warehouse = Warehouse::open(WarehouseConfig::at(dir.path())).expect("warehouse");
        warehouse.set_var("twitch_health", "100").expect("set");
        warehouse.set_var("discord_health", "50").expect("set");

        let output = run(
            &VarsArgs {
                prefix: String::from("twitch_"),
            },
            &warehouse,
        )
        .expect("vars");

        assert_eq!(output.data, json!([{ "key": "twitch_health", "value": "100" }]));
    }
}
