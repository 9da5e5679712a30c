//! Existence checks through the public signup routes

use crate::{client::ServerClient, config::Config};
use anyhow::Result;
use console::style;
use phynite_common::{CheckEmailRequest, CheckWebsiteRequest, ExistenceResponse, SessionResponse};

pub enum Target {
    Email(String),
    Website(String),
}

pub async fn run(target: Target) -> Result<()> {
    let config = Config::load()?;
    let client = ServerClient::public(&config);

    let session: SessionResponse = client.get("/v1/signup/session").await?;

    let (label, value, result): (&str, String, ExistenceResponse) = match target {
        Target::Email(email) => {
            let result = client
                .post_with_session(
                    "/v1/signup/check-email",
                    &session.token,
                    &CheckEmailRequest { email: email.clone() },
                )
                .await?;
            ("Email", email, result)
        }
        Target::Website(website) => {
            let result = client
                .post_with_session(
                    "/v1/signup/check-website",
                    &session.token,
                    &CheckWebsiteRequest { website: website.clone() },
                )
                .await?;
            ("Website", website, result)
        }
    };

    let verdict = if result.exists {
        style("already registered").yellow()
    } else {
        style("available").green()
    };
    println!("{} {}: {}", label, style(value).bold(), verdict);
    if !result.message.is_empty() {
        println!("  {}", style(result.message).dim());
    }
    Ok(())
}
