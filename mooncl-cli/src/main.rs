//! Command-line host for the Mooncl contracts and listing API.
//!
//! # Usage
//!
//! ```bash
//! # Current mint fee on the default chain
//! mooncl fee
//!
//! # Publish an opinion (needs MOONCL_PRIVATE_KEY)
//! mooncl mint "Rust is a systems language"
//!
//! # Dry-run a purchase at the listed price
//! mooncl buy 7 --simulate
//!
//! # Browse the ranking
//! RUST_LOG=debug mooncl ranking --sort-by recent --offset 6
//! ```
//!
//! # Environment Variables
//!
//! Everything read by `AppConfig::from_env`, plus:
//!
//! - `MOONCL_PRIVATE_KEY` - Hex private key used to sign transactions
//! - `RUST_LOG` - Log level filter (default: `info`)
//!
//! A `.env` file in the working directory is loaded first.

use std::error::Error;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use mooncl::actions::{BuyAction, BuyArgs, MintAction, MintArgs};
use mooncl::amount::{self, NativeAmount};
use mooncl::chain::{ChainId, ChainRegistry};
use mooncl::config::AppConfig;
use mooncl::flow::{BuyFlow, BuyRequest, FlowAction, FlowState, PublishDraft, PublishFlow};
use mooncl::gateway::GatewayConfig;
use mooncl::listing::{ListingView, RankingQuery, SortBy};
use mooncl::wallet::WalletSession;
use mooncl_evm::{NetworkInfo, RpcLedger, network};
use mooncl_http::NftApiClient;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Publish and trade opinion NFTs.
#[derive(Debug, Parser)]
#[command(name = "mooncl", version, about, long_about = None)]
struct Cli {
    /// Chain to use (overrides `MOONCL_CHAIN_ID`)
    #[arg(long, global = true)]
    chain_id: Option<ChainId>,

    /// JSON-RPC endpoint (overrides `MOONCL_RPC_URL` and the chain's public endpoint)
    #[arg(long, global = true)]
    rpc_url: Option<Url>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the current mint fee
    Fee,

    /// Publish text as an opinion NFT
    Mint {
        /// Text to publish
        content: String,
        /// Pay this many native units instead of the current fee
        #[arg(long)]
        value: Option<String>,
        /// Dry-run only and print the token id that would be minted
        #[arg(long)]
        simulate: bool,
    },

    /// Buy a listing
    Buy {
        /// Listing id, decimal or 0x-hex
        listing_id: String,
        /// Price in native units (default: the listing's price from the API)
        #[arg(long)]
        price: Option<String>,
        /// Dry-run only
        #[arg(long)]
        simulate: bool,
    },

    /// Show one page of the ranking
    Ranking {
        /// Order: `price` or `recent`
        #[arg(long, default_value = "price", value_parser = parse_sort)]
        sort_by: SortBy,
        /// Page size
        #[arg(long)]
        limit: Option<u32>,
        /// Items to skip
        #[arg(long)]
        offset: Option<u32>,
    },

    /// Show one listing
    Detail {
        /// Token id
        token_id: u64,
    },

    /// List the configured deployments
    Networks,

    /// Show the resolved configuration
    Config,
}

fn parse_sort(value: &str) -> Result<SortBy, String> {
    match value {
        "price" => Ok(SortBy::Price),
        "recent" => Ok(SortBy::Recent),
        other => Err(format!("expected `price` or `recent`, got `{other}`")),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

/// Resolved settings shared by every command.
struct Context {
    config: AppConfig,
    registry: Arc<ChainRegistry>,
    chain_id: ChainId,
    network: Option<&'static NetworkInfo>,
}

impl Context {
    fn new(cli: &Cli) -> Result<Self, Box<dyn Error>> {
        let mut config = AppConfig::from_env()?;
        if let Some(chain_id) = cli.chain_id {
            config.chain_id = chain_id;
        }
        if let Some(rpc_url) = &cli.rpc_url {
            config.rpc_url = Some(rpc_url.clone());
        }
        let registry = Arc::new(config.registry());
        let chain_id = config.chain_id;
        if !registry.is_supported(chain_id) {
            tracing::warn!(chain = chain_id, "Chain has no registered deployments; using the default addresses");
        }
        Ok(Self {
            registry,
            chain_id,
            network: network(chain_id),
            config,
        })
    }

    fn symbol(&self) -> &'static str {
        self.network.map_or("ETH", |info| info.native_symbol)
    }

    fn gateway_config(&self) -> GatewayConfig {
        self.config.gateway_config()
    }

    fn api(&self) -> NftApiClient {
        NftApiClient::from_config(&self.config)
    }

    /// Connects to the node, signing with `MOONCL_PRIVATE_KEY` when it is set.
    async fn ledger(&self) -> Result<Arc<RpcLedger>, Box<dyn Error>> {
        let rpc_url = match (&self.config.rpc_url, self.network) {
            (Some(url), _) => url.clone(),
            (None, Some(info)) => info.rpc_url()?,
            (None, None) => {
                return Err(format!("No RPC endpoint known for chain {}; pass --rpc-url", self.chain_id).into());
            }
        };
        tracing::debug!(%rpc_url, chain = self.chain_id, "Connecting");
        let mut ledger = match std::env::var("MOONCL_PRIVATE_KEY") {
            Ok(key) if !key.trim().is_empty() => RpcLedger::from_private_key(rpc_url, &key)?,
            _ => RpcLedger::read_only(rpc_url),
        };
        if let Some(interval) = self.config.receipt_poll_interval {
            ledger = ledger.with_poll_interval(interval);
        }
        let node_chain = ledger.refresh_chain().await?;
        if node_chain != self.chain_id {
            return Err(format!(
                "RPC endpoint serves chain {node_chain}, expected chain {}",
                self.chain_id
            )
            .into());
        }
        Ok(Arc::new(ledger))
    }

    fn explorer_link(&self, hash: impl std::fmt::Display) -> String {
        self.network
            .map_or_else(|| hash.to_string(), |info| info.tx_url(&hash))
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let ctx = Context::new(&cli)?;
    tracing::debug!(chain = ctx.chain_id, network = ?ctx.network.map(|info| info.name), "Loaded configuration");

    match cli.command {
        Command::Fee => fee(&ctx).await,
        Command::Mint {
            content,
            value,
            simulate,
        } => mint(&ctx, content, value.as_deref(), simulate).await,
        Command::Buy {
            listing_id,
            price,
            simulate,
        } => buy(&ctx, listing_id, price, simulate).await,
        Command::Ranking {
            sort_by,
            limit,
            offset,
        } => ranking(&ctx, sort_by, limit, offset).await,
        Command::Detail { token_id } => detail(&ctx, token_id).await,
        Command::Networks => {
            networks(&ctx);
            Ok(())
        }
        Command::Config => {
            show_config(&ctx);
            Ok(())
        }
    }
}

async fn fee(ctx: &Context) -> Result<(), Box<dyn Error>> {
    let ledger = ctx.ledger().await?;
    let action = MintAction::for_chain(ledger, &ctx.registry, Some(ctx.chain_id), ctx.gateway_config());
    let fee = action.mint_fee(Some(ctx.chain_id)).await?;
    tracing::info!(
        fee = %NativeAmount { amount: fee, symbol: ctx.symbol() },
        wei = %fee,
        contract = %action.gateway().address(),
        "Current mint fee"
    );
    Ok(())
}

async fn mint(
    ctx: &Context,
    content: String,
    value: Option<&str>,
    simulate: bool,
) -> Result<(), Box<dyn Error>> {
    let ledger = ctx.ledger().await?;
    let action = MintAction::for_chain(
        Arc::clone(&ledger),
        &ctx.registry,
        Some(ctx.chain_id),
        ctx.gateway_config(),
    );

    let explicit_value = value.map(amount::parse_native).transpose()?;
    if simulate || explicit_value.is_some() {
        let draft = action.validate(&PublishDraft::new(content))?;
        let mut args = MintArgs::new(draft.content).on_chain(Some(ctx.chain_id));
        if let Some(value) = explicit_value {
            args = args.with_value(value);
        }
        if simulate {
            let token_id = action.simulate_mint(args).await?;
            tracing::info!(%token_id, "Mint would succeed");
            return Ok(());
        }
        let hash = action.mint(args).await?;
        tracing::info!(tx = %ctx.explorer_link(hash), "Mint submitted");
        let record = action.tracker().wait_settled().await;
        if record.is_success() {
            tracing::info!(block = ?record.receipt.and_then(|r| r.block_number), "Mint confirmed");
            return Ok(());
        }
        return Err(record
            .error
            .map_or_else(|| "Mint did not settle".to_owned(), |e| e.to_string())
            .into());
    }

    let mut flow = PublishFlow::new(action, Arc::clone(&ledger), Arc::clone(&ctx.registry));
    let hash = flow.submit(PublishDraft::new(content)).await?;
    tracing::info!(tx = %ctx.explorer_link(hash), "Mint submitted, waiting for confirmation");
    match flow.settle().await {
        FlowState::Result => {
            if let Some(outcome) = flow.outcome() {
                tracing::info!(score = outcome.score, content = %outcome.content, "Opinion published");
            }
            Ok(())
        }
        _ => Err(flow
            .error_message()
            .unwrap_or_else(|| "Mint did not settle".to_owned())
            .into()),
    }
}

async fn buy(
    ctx: &Context,
    listing_id: String,
    price: Option<String>,
    simulate: bool,
) -> Result<(), Box<dyn Error>> {
    let request = if let Some(price) = price {
        BuyRequest::new(listing_id, price.as_str())
    } else {
        let token_id: u64 = listing_id
            .trim()
            .parse()
            .map_err(|_| format!("Listing id {listing_id:?} needs --price unless it is a decimal token id"))?;
        let detail = ctx.api().detail(token_id).await?;
        tracing::info!(token_id, price = detail.evaluate_price, "Using the listed price");
        BuyRequest::from_detail(&detail)
    };

    let ledger = ctx.ledger().await?;
    let action = BuyAction::for_chain(
        Arc::clone(&ledger),
        &ctx.registry,
        Some(ctx.chain_id),
        ctx.gateway_config(),
    );

    if simulate {
        let args = BuyArgs::new(request.listing_id, request.price).on_chain(Some(ctx.chain_id));
        action.simulate_buy(&args).await?;
        tracing::info!("Purchase would succeed");
        return Ok(());
    }

    if !ledger.is_connected() {
        return Err("MOONCL_PRIVATE_KEY is required to buy".into());
    }
    let mut flow = BuyFlow::new(action, ledger, Arc::clone(&ctx.registry));
    let hash = flow.submit(request).await?;
    tracing::info!(tx = %ctx.explorer_link(hash), "Purchase submitted, waiting for confirmation");
    match flow.settle().await {
        FlowState::Result => {
            if let Some(outcome) = flow.outcome() {
                tracing::info!(
                    listing = %outcome.listing_id,
                    paid = %NativeAmount { amount: outcome.paid, symbol: ctx.symbol() },
                    "Listing purchased"
                );
            }
            Ok(())
        }
        _ => Err(flow
            .error_message()
            .unwrap_or_else(|| "Purchase did not settle".to_owned())
            .into()),
    }
}

async fn ranking(
    ctx: &Context,
    sort_by: SortBy,
    limit: Option<u32>,
    offset: Option<u32>,
) -> Result<(), Box<dyn Error>> {
    let query = RankingQuery {
        sort_by: Some(sort_by),
        limit,
        offset,
    };
    let items = ctx.api().ranking(query).await?;
    if items.is_empty() {
        tracing::info!("No listings");
    }
    for item in &items {
        let view = ListingView::from(item);
        tracing::info!(id = %view.id, price = view.price, owner = %view.owner, "{}", view.title);
    }
    Ok(())
}

async fn detail(ctx: &Context, token_id: u64) -> Result<(), Box<dyn Error>> {
    let detail = ctx.api().detail(token_id).await?;
    let view = ListingView::from(&detail);
    tracing::info!(
        id = %view.id,
        price = view.price,
        owner = %view.owner,
        created_at = %detail.created_at,
        "{}",
        view.title
    );
    Ok(())
}

fn show_config(ctx: &Context) {
    let config = &ctx.config;
    tracing::info!(
        chain = ctx.chain_id,
        network = ctx.network.map_or("unknown", |info| info.name),
        rpc_url = ?config.rpc_url.as_ref().map(Url::as_str),
        api_base = ?config.api_base.as_ref().map(Url::as_str),
        api_network = ?config.api_network,
        walletconnect_project_id = ?config.walletconnect_project_id,
        confirmation_timeout = ?config.confirmation_timeout,
        receipt_poll_interval = ?config.receipt_poll_interval,
        signer = std::env::var("MOONCL_PRIVATE_KEY").is_ok_and(|key| !key.trim().is_empty()),
        "Configuration"
    );
}

fn networks(ctx: &Context) {
    for chain_id in ctx.registry.chains() {
        let addresses = ctx.registry.resolve_addresses(Some(chain_id));
        let name = network(chain_id).map_or("unknown", |info| info.name);
        tracing::info!(
            chain = chain_id,
            nft = %addresses.nft,
            launchpad = %addresses.launchpad,
            active = chain_id == ctx.chain_id,
            "{name}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_buy_with_global_chain() {
        let cli = Cli::try_parse_from(["mooncl", "buy", "0x1f", "--price", "0.5", "--chain-id", "42220"]).unwrap();
        assert_eq!(cli.chain_id, Some(42220));
        let Command::Buy { listing_id, price, simulate } = cli.command else {
            panic!("expected buy");
        };
        assert_eq!(listing_id, "0x1f");
        assert_eq!(price.as_deref(), Some("0.5"));
        assert!(!simulate);
    }

    #[test]
    fn test_parse_config_command() {
        let cli = Cli::try_parse_from(["mooncl", "config", "--rpc-url", "http://localhost:8545"]).unwrap();
        assert!(matches!(cli.command, Command::Config));
        assert_eq!(cli.rpc_url.unwrap().as_str(), "http://localhost:8545/");
    }

    #[test]
    fn test_sort_parser() {
        assert_eq!(parse_sort("recent"), Ok(SortBy::Recent));
        assert!(parse_sort("cheap").is_err());
        assert!(Cli::try_parse_from(["mooncl", "ranking", "--sort-by", "cheap"]).is_err());
    }

    #[test]
    fn test_explicit_value_is_parsed_in_native_units() {
        assert_eq!(
            amount::parse_native("0.001").unwrap(),
            U256::from(1_000_000_000_000_000u64)
        );
    }
}
