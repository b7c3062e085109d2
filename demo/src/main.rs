//! Checkout demo binary
//!
//! Pays a charge against in-memory collaborators: the first signature prompt
//! is declined, the retry goes through, the batch is polled until included,
//! and a final submit opens the receipt.
//!
//! Configuration is read from `CHECKOUT_*` environment variables.

use charge_checkout::{CheckoutEnvironment, CheckoutParams, Orchestrator};
use charge_checkout_core::config::CheckoutConfig;
use charge_checkout_core::environment::{LinkOpener, OpenLinkRequest};
use charge_checkout_core::error::CollaboratorError;
use charge_checkout_testing::fixtures;
use charge_checkout_testing::mocks::{
    MockBatchSubmitter, MockContractResolver, MockReceiptWatcher, MockSubmissionStatusPoller,
    MockWalletConnector, WALLET_REJECTION_TEXT,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Prints links instead of opening a browser
struct PrintingLinkOpener;

impl LinkOpener for PrintingLinkOpener {
    fn open(&self, request: &OpenLinkRequest) {
        println!(
            "    [open {} target={} features={}]",
            request.url, request.target, request.features
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "charge_checkout=debug,charge_checkout_runtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CheckoutConfig::from_env();
    config.validate()?;
    tracing::info!(?config, "Loaded checkout configuration");

    println!("=== Charge Checkout Demo ===\n");

    let environment = CheckoutEnvironment::new(
        Arc::new(MockWalletConnector::connecting(fixtures::payer())),
        Arc::new(MockContractResolver::resolving(fixtures::payable())),
        Arc::new(
            MockBatchSubmitter::accepting(fixtures::submission_id())
                .then(Err(CollaboratorError::user_rejected(WALLET_REJECTION_TEXT))),
        ),
        Arc::new(MockSubmissionStatusPoller::included_after(
            2,
            fixtures::transaction_hash(),
        )),
        Arc::new(MockReceiptWatcher::confirming_at(19_000_000)),
        Arc::new(PrintingLinkOpener),
    )
    .with_config(config.clone());

    let orchestrator = Orchestrator::new(
        CheckoutParams::new(fixtures::chain_id(), fixtures::charge_id()).with_observer(|status| {
            match serde_json::to_string(status) {
                Ok(json) => println!("    status → {json}"),
                Err(error) => tracing::error!(%error, "Could not serialize status"),
            }
        }),
        environment,
    );

    println!("\n>>> submit() (signature will be declined)");
    orchestrator.submit().await.wait().await;
    if let Some(message) = orchestrator.error_message().await {
        println!("    message: {message}");
    }

    println!("\n>>> submit() again");
    let wait = config.poll_interval * 10 + Duration::from_secs(5);
    orchestrator.submit().await.wait_with_timeout(wait).await?;

    println!("\n>>> submit() from success");
    orchestrator.submit().await.wait().await;

    orchestrator.shutdown().await?;

    println!("\n=== Final status: {} ===", orchestrator.status());
    Ok(())
}
