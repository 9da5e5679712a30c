//! Upstream connectivity, product list and cleanup commands

use crate::{client::ServerClient, config::Config};
use anyhow::Result;
use console::style;
use phynite_common::{CleanupResponse, TestConnectionResponse};
use serde_json::Value;

/// Run the upstream connectivity test
pub async fn test_connection() -> Result<()> {
    let config = Config::load()?;
    let client = ServerClient::admin(&config)?;

    let spinner = cliclack::spinner();
    spinner.start("Testing upstream connection...");
    let result: TestConnectionResponse = client.get("/v1/signup/test-connection").await?;

    if result.success {
        spinner.stop(style(&result.message).green().to_string());
        if let Some(data) = result.data {
            cliclack::note("Upstream response", serde_json::to_string_pretty(&data)?)?;
        }
    } else {
        spinner.stop(style(&result.message).red().to_string());
        anyhow::bail!("Connection test failed");
    }
    Ok(())
}

/// List subscription products
pub async fn products(refresh: bool) -> Result<()> {
    let config = Config::load()?;

    if refresh {
        let admin = ServerClient::admin(&config)?;
        let cleared: CleanupResponse = admin.delete("/v1/admin/products-cache").await?;
        tracing::debug!(removed = cleared.removed, "Product cache cleared");
    }

    let client = ServerClient::public(&config);
    let products: Value = client.get("/v1/signup/get-products").await?;

    let lines = product_lines(&products);
    if lines.is_empty() {
        println!("No products available.");
        return Ok(());
    }

    println!("{:<12} {:<20} {:>12}", "ID", "NAME", "PRICE");
    println!("{}", "-".repeat(46));
    for line in lines {
        println!("{}", line);
    }
    Ok(())
}

/// Purge stale and expired rate-limit records
pub async fn cleanup() -> Result<()> {
    let config = Config::load()?;
    let client = ServerClient::admin(&config)?;
    let result: CleanupResponse = client.post("/v1/admin/rate-limits/cleanup").await?;
    cliclack::log::success(format!("Removed {} rate limit records", style(result.removed).green()))?;
    Ok(())
}

/// One row per product; accepts either a list or an id-keyed map
fn product_lines(products: &Value) -> Vec<String> {
    let items: Vec<(String, &Value)> = match products {
        Value::Array(items) => items
            .iter()
            .map(|p| (p["id"].as_str().unwrap_or("-").to_string(), p))
            .collect(),
        Value::Object(map) => map.iter().map(|(id, p)| (id.clone(), p)).collect(),
        _ => Vec::new(),
    };

    items
        .into_iter()
        .map(|(id, product)| {
            let name = product["name"].as_str().unwrap_or("-");
            let price = match (product["price"].as_u64(), product["currency"].as_str()) {
                (Some(cents), Some(currency)) => {
                    format!("{}.{:02} {}", cents / 100, cents % 100, currency.to_uppercase())
                }
                (Some(cents), None) => format!("{}.{:02}", cents / 100, cents % 100),
                _ => "-".to_string(),
            };
            format!("{:<12} {:<20} {:>12}", id, name, price)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_product_lines_from_map() {
        let products = json!({
            "monthly": { "name": "Monthly", "price": 1900, "currency": "usd" },
        });
        let lines = product_lines(&products);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("monthly"));
        assert!(lines[0].ends_with("19.00 USD"));
    }

    #[test]
    fn test_product_lines_from_list() {
        let products = json!([{ "id": "yearly", "name": "Yearly" }]);
        let lines = product_lines(&products);
        assert!(lines[0].contains("Yearly"));
        assert!(lines[0].trim_end().ends_with('-'));
    }
}
