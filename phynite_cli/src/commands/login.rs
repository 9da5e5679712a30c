//! Login command - store the admin token and server URL

use crate::{client::ServerClient, config::Config};
use anyhow::Result;
use console::style;
use phynite_common::Settings;

pub async fn run(token: String, server: Option<String>) -> Result<()> {
    use cliclack::{intro, outro};

    intro(style(" phynite login ").on_cyan().black().to_string())?;

    let mut config = Config::load()?;
    if let Some(server) = server {
        config.server_url = server;
    }
    config.admin_token = Some(token.trim().to_string());

    // Verify before saving so a typo does not overwrite a working token
    let spinner = cliclack::spinner();
    spinner.start(format!("Checking token against {}...", config.base_url()));
    let client = ServerClient::admin(&config)?;
    match client.get::<Settings>("/v1/admin/settings").await {
        Ok(settings) => {
            spinner.stop("Token accepted");
            cliclack::log::info(format!(
                "Environment: {}",
                style(settings.environment.as_str()).cyan()
            ))?;
        }
        Err(e) => {
            spinner.stop("Token rejected");
            cliclack::outro_cancel("Login failed, credentials not saved")?;
            return Err(e);
        }
    }

    config.save()?;
    outro(format!("Saved credentials for {}", style(config.base_url()).green()))?;
    Ok(())
}
