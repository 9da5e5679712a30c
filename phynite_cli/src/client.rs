//! HTTP client for the signup server

use crate::config::Config;
use anyhow::{Context, Result};
use phynite_common::{constants::SESSION_TOKEN_HEADER, ErrorBody};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};

pub struct ServerClient {
    http: Client,
    base_url: String,
    admin_token: Option<String>,
}

impl ServerClient {
    /// Client for admin routes; requires a stored token
    pub fn admin(config: &Config) -> Result<Self> {
        let token = config.require_auth()?.to_string();
        Ok(Self {
            http: Client::new(),
            base_url: config.base_url().to_string(),
            admin_token: Some(token),
        })
    }

    /// Client for public routes
    pub fn public(config: &Config) -> Self {
        Self {
            http: Client::new(),
            base_url: config.base_url().to_string(),
            admin_token: None,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{}", self.base_url, path));
        match &self.admin_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        decode(self.request(Method::GET, path).send().await?).await
    }

    pub async fn put<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        decode(self.request(Method::PUT, path).json(body).send().await?).await
    }

    pub async fn post<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        decode(self.request(Method::POST, path).send().await?).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        decode(self.request(Method::DELETE, path).send().await?).await
    }

    /// POST a JSON body with a form-session token attached
    pub async fn post_with_session<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        session: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .request(Method::POST, path)
            .header(SESSION_TOKEN_HEADER, session)
            .json(body)
            .send()
            .await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();

    if !status.is_success() {
        anyhow::bail!("{}", describe_error(status.as_u16(), &text));
    }

    serde_json::from_str(&text).context("Failed to parse server response")
}

/// Human-readable message for an error response
pub fn describe_error(status: u16, body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(error) => {
            let mut message = format!("{} ({})", error.message, error.code);
            if let Some(fields) = error.errors {
                for (field, detail) in fields {
                    message.push_str(&format!("\n  {}: {}", field, detail));
                }
            }
            message
        }
        Err(_) => format!("Server returned {}: {}", status, body),
    }
}
