use laddertrack_core::ProviderConfig;
use serde_json::json;

use crate::cli::ProvidersArgs;
use crate::error::CliError;

use super::{selected_providers, CommandOutput};

pub fn run(args: &ProvidersArgs) -> Result<CommandOutput, CliError> {
    let mut rows = Vec::new();
    for provider in selected_providers(args.provider.as_deref())? {
        let config = ProviderConfig::from_env(provider)?;
        rows.push(json!({
            "provider": provider,
            "base_url": config.base_url,
            "request_timeout_ms": config.request_timeout_ms,
            "max_attempts": config.max_attempts,
            "max_batch_size": config.max_batch_size,
            "batch_concurrency": config.batch_concurrency,
            "rate_limit": config.rate_limit,
            "token": config.token_from_env().is_some(),
        }));
    }

    Ok(CommandOutput::new(
        rows.into(),
        vec![
            "provider",
            "base_url",
            "request_timeout_ms",
            "max_attempts",
            "max_batch_size",
            "batch_concurrency",
            "token",
        ],
    ))
}
