//! Example: check whether a payment has reached finality.
//!
//! Run with:
//! ```bash
//! cargo run --example verify_payment -- <payment-id>
//! ```
//!
//! Environment variables (a `.env` file is honoured):
//! - OPENGATEWAY_RPC_URL: Blockchain RPC endpoint
//! - OPENGATEWAY_ADDRESS: Gateway contract address
//! - OPENGATEWAY_CONFIRMATIONS: Fixed confirmation depth (optional)

use anyhow::Context;
use opengateway_rs::client::{GatewayClient, GatewayClientConfig};
use opengateway_rs::types::{ConfirmationStatus, PaymentId};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let payment_id: PaymentId = std::env::args()
        .nth(1)
        .context("missing <payment-id>")?
        .parse()?;

    let client = GatewayClient::connect(GatewayClientConfig::from_env()?).await?;

    match client.confirmation_status(payment_id).await? {
        ConfirmationStatus::Pending => {
            println!("{}: not processed (unknown or pending)", payment_id)
        }
        ConfirmationStatus::Confirming {
            confirmations,
            required,
        } => println!("{}: {}/{} confirmations", payment_id, confirmations, required),
        ConfirmationStatus::Final {
            confirmations,
            required,
        } => println!(
            "{}: final ({} confirmations, {} required)",
            payment_id, confirmations, required
        ),
    }

    Ok(())
}
