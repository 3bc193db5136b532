//! Order routing walkthrough.
//!
//! Registers a handful of order handlers, then drives every dispatch surface:
//! a single dispatch, a regional fan-out, and deferred dispatch collected
//! through the result channel.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package orders-demo -- --order-id 42 --regions east,west,north
//! COURIER_LOGGING__LEVEL=debug cargo run --package orders-demo
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use courier::prelude::*;
use serde::Deserialize;
use serde_json::json;

#[derive(Parser, Debug)]
#[command(about = "Route a sample order through Courier")]
struct Cli {
    /// Configuration file (default: search for courier.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Configuration profile
    #[arg(long)]
    profile: Option<String>,

    /// Order to create
    #[arg(long, default_value_t = 42)]
    order_id: u64,

    /// Regions to fan the order out to
    #[arg(long, value_delimiter = ',', default_value = "east,west")]
    regions: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Order {
    order_id: u64,
    #[serde(default)]
    region: Vec<String>,
}

// ============================================================================
// Handlers
// ============================================================================

async fn create_order(Body(order): Body<Order>, sender: Option<Sender>) -> ActionResponse {
    let by = sender.map_or_else(|| "anonymous".to_string(), |s| s.user_name);
    info!(order_id = order.order_id, by = %by, "Order created");
    ActionResponse::success_with(json!({ "orderId": order.order_id, "regions": order.region }))
}

async fn audit_order(Body(order): Body<Order>) {
    debug!(order_id = order.order_id, "Order audited");
}

async fn reserve_east(Body(order): Body<Order>) -> ActionResponse {
    tokio::time::sleep(Duration::from_millis(80)).await;
    ActionResponse::success_with(json!({ "warehouse": "east-1", "orderId": order.order_id }))
}

async fn reserve_west(Body(order): Body<Order>) -> Result<ActionResponse, String> {
    tokio::time::sleep(Duration::from_millis(10)).await;
    if order.order_id % 2 == 0 {
        Ok(ActionResponse::success_with(json!({ "warehouse": "west-3" })))
    } else {
        Err(format!("west warehouse rejects odd order {}", order.order_id))
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder = CourierRuntime::builder();
    if let Some(path) = &cli.config {
        builder = builder.config_file(path);
    }
    if let Some(profile) = &cli.profile {
        builder = builder.profile(profile);
    }
    let runtime = builder.build()?;

    runtime.register("orders", "created", create_order)?;
    runtime.register("orders", "created", audit_order)?;
    runtime.register("orders", "orders.east", reserve_east)?;
    runtime.register("orders", "orders.west", reserve_west)?;

    let message = Message::new(json!({ "orderId": cli.order_id, "region": cli.regions }))
        .with_request_type("order.create")
        .with_user(1, "alice");

    // Single dispatch: both handlers on orders/created run, the last success wins.
    let response = runtime.process("orders", "created", message.clone()).await;
    info!(status = %response.status, data = ?response.data, "orders/created");

    // Fan-out: one response per region, in the order the regions were given.
    let deriver = BodyFieldDeriver::new("region").with_prefix("orders");
    let responses = runtime.process_group("orders", message.clone(), &deriver).await?;
    for (region, response) in cli.regions.iter().zip(&responses) {
        info!(
            region = %region,
            status = %response.status,
            code = response.code().unwrap_or("-"),
            "Reservation"
        );
    }

    // Deferred: tokens now, results from the channel later.
    let tokens = runtime.process_group_async("orders", message, &deriver)?;
    for token in &tokens {
        let response = runtime.collect(token).await?;
        info!(token = %token, status = %response.status, "Deferred reservation");
    }

    info!(stats = %runtime.stats(), "Done");
    Ok(())
}
