use clap::Subcommand;
use serde_json::json;
use std::sync::Arc;

use sous_core::{ApiClient, ApiRequest, Config, RefreshCoordinator, RefreshPath};

use super::{print_json, token_store, CliResult};

#[derive(Subcommand)]
pub enum ApiAction {
    /// GET a path relative to api.base_url
    Get { path: String },
}

pub fn run(action: ApiAction) -> CliResult {
    let config = Config::load_or_default();
    let http = reqwest::Client::new();
    let refresher = RefreshCoordinator::new(RefreshPath::web(http.clone(), &config.api)?, token_store()?);
    let client = ApiClient::new(http, &config.api, Arc::new(refresher))?;

    let runtime = tokio::runtime::Runtime::new()?;
    let request = match action {
        ApiAction::Get { path } => ApiRequest::get(path),
    };
    let response = runtime.block_on(client.send(request))?;

    print_json(&json!({
        "status": response.status.as_u16(),
        "body": response.body,
    }))?;
    if !response.is_success() {
        return Err(format!("request failed with status {}", response.status).into());
    }
    Ok(())
}
