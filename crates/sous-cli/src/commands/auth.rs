use clap::Subcommand;
use serde_json::json;

use sous_core::SessionTokens;

use super::{print_json, token_store, CliResult};

#[derive(Subcommand)]
pub enum AuthAction {
    /// Store session tokens obtained from the login flow
    Login {
        #[arg(long)]
        access: String,
        #[arg(long)]
        refresh: Option<String>,
    },
    /// Show whether a session is stored
    Status,
    /// Forget stored tokens
    Logout,
}

pub fn run(action: AuthAction) -> CliResult {
    let tokens = token_store()?;
    match action {
        AuthAction::Login { access, refresh } => {
            if access.is_empty() {
                return Err("access token must not be empty".into());
            }
            tokens.save(&SessionTokens {
                access_token: access,
                refresh_token: refresh,
            })?;
            println!("ok");
        }
        AuthAction::Status => {
            let session = tokens.load()?;
            print_json(&json!({
                "signedIn": session.is_some(),
                "hasRefreshToken": session.is_some_and(|s| s.refresh_token.is_some()),
            }))?;
        }
        AuthAction::Logout => {
            tokens.clear()?;
            println!("ok");
        }
    }
    Ok(())
}
