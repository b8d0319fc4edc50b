//! Example: create a payment and, if a signer is configured, submit it.
//!
//! Run with:
//! ```bash
//! cargo run --example create_payment -- <amount> <token|native> <payer> [metadata]
//! ```
//!
//! Environment variables (a `.env` file is honoured):
//! - OPENGATEWAY_RPC_URL: Blockchain RPC endpoint
//! - OPENGATEWAY_ADDRESS: Gateway contract address
//! - OPENGATEWAY_NAMESPACE: Namespace salt for payment ids (optional)
//! - OPENGATEWAY_SIGNER_KEY: Private key used to submit (optional)

use anyhow::Context;
use opengateway_rs::client::{GatewayClient, GatewayClientConfig};
use opengateway_rs::types::PrePaymentParams;
use opengateway_rs::utils::encode_payment_request;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let amount = args.next().context("missing <amount>")?;
    let token = args.next().context("missing <token|native>")?;
    let payer = args.next().context("missing <payer>")?;
    let metadata = args.next().unwrap_or_default();

    let config = GatewayClientConfig::from_env()?;
    let can_submit = config.signer_key.is_some();
    let client = GatewayClient::connect(config).await?;

    let params = client.create_payment(PrePaymentParams::parse(&amount, &token, &payer, metadata)?);

    println!("Payment id: {}", params.payment_id());
    println!("Request:    {}", encode_payment_request(&params)?);

    if can_submit {
        let receipt = client.submit_payment(&params).await?;
        println!("Submitted:  {:?}", receipt);
    } else {
        println!("No signer configured; hand the request to the payer to submit.");
    }

    Ok(())
}
