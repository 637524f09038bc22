//! agrimarket-watch entry point.
//!
//! Connects to the auction hub with a stored or seeded session, joins the
//! auctions listed in `AGRIMARKET_WATCH_AUCTIONS` and logs every event
//! until Ctrl-C.

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use agrimarket_client::domain::AuctionId;
use agrimarket_client::{ClientConfig, MarketClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = ClientConfig::from_env()?;
    tracing::info!(api = %config.api_base_url, hub = %config.hub_url, "starting agrimarket-watch");

    let client = MarketClient::from_config(config)?;

    // Seed the session
    if let (Ok(access), Ok(refresh)) = (
        std::env::var("AGRIMARKET_ACCESS_TOKEN"),
        std::env::var("AGRIMARKET_REFRESH_TOKEN"),
    ) {
        client
            .tokens()
            .store()
            .set_session(&access, &refresh)
            .await
            .context("storing seeded session")?;
    }

    let auctions = watched_auctions()?;

    // Log events
    let registry = client.registry();
    let _bids = registry.on_bid_placed(|bid| {
        tracing::info!(auction_id = %bid.auction_id, amount = bid.amount, bidder = ?bid.bidder_name, "bid placed");
    });
    let _buyouts = registry.on_buy_now_executed(|buy| {
        tracing::info!(auction_id = %buy.auction_id, price = buy.price, "buy-now executed");
    });
    let _notices = registry.on_system_notice(|notice| {
        tracing::info!(title = ?notice.title, message = %notice.message, "system notice");
    });
    let _notifications = registry.on_notification(|record| {
        tracing::info!(id = %record.id, title = %record.title, "notification");
    });
    let _states = registry.on_connection_state(|state| {
        tracing::info!(?state, "hub state");
    });

    if let Err(e) = client.notifications().refresh().await {
        tracing::warn!(error = %e, "could not load notifications");
    }

    client.hub().connect().await.context("connecting to hub")?;
    for auction in auctions {
        client.hub().join(auction).await;
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    client.hub().disconnect().await;

    Ok(())
}

fn watched_auctions() -> anyhow::Result<Vec<AuctionId>> {
    let Ok(raw) = std::env::var("AGRIMARKET_WATCH_AUCTIONS") else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<AuctionId>()
                .with_context(|| format!("invalid auction id {s}"))
        })
        .collect()
}
