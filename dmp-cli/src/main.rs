//! Command line client for the dmp marketplace.
//!
//! # Usage
//!
//! ```bash
//! # Store the credential pair obtained at sign-in
//! dmp login --access "$ACCESS" --refresh "$REFRESH"
//!
//! # Browse, fill the cart, pay
//! dmp feed
//! dmp add 42
//! dmp buy 42
//! dmp rate 42 9
//!
//! # Keep the session fresh until Ctrl-C
//! RUST_LOG=debug dmp keep-alive
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to TOML configuration file (default: `dmp.toml`)
//! - `DMP_AUTH_API_URL` / `DMP_CORE_API_URL` - Override the API base URLs
//! - `RUST_LOG` - Log level filter (default: `info`)

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use dmp::backend::TokenExchange;
use dmp::cart::{Cart, CartEntry};
use dmp::feed::Feed;
use dmp::keeper::SessionKeeper;
use dmp::model::{CredentialPair, Product, ProductId};
use dmp::profile::Profile;
use dmp::session::{FileSessionStore, SessionStore};
use dmp::wallet::WalletProvider;
use dmp_cli::config::{ClientConfig, WalletConfig};
use dmp_evm::EvmWallet;
use dmp_http::MarketClient;

#[cfg(feature = "telemetry")]
use tracing_subscriber::EnvFilter;

/// Client for the dmp digital goods marketplace.
#[derive(Debug, Parser)]
#[command(name = "dmp", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Store the credential pair obtained at sign-in.
    Login {
        /// Access token.
        #[arg(long, env = "DMP_ACCESS_TOKEN")]
        access: String,
        /// Refresh token.
        #[arg(long, env = "DMP_REFRESH_TOKEN")]
        refresh: String,
    },
    /// Forget the stored credential pair.
    Logout,
    /// List products on sale.
    Feed,
    /// Add a feed product to the cart.
    Add {
        /// Product id.
        id: ProductId,
    },
    /// Show the cart.
    Cart,
    /// Remove an unpaid product from the cart.
    Remove {
        /// Product id.
        id: ProductId,
    },
    /// Pay for a cart product with the configured wallet.
    Buy {
        /// Product id.
        id: ProductId,
    },
    /// Confirm delivery of a purchased product.
    Deliver {
        /// Product id.
        id: ProductId,
    },
    /// Rate a purchased product from 1 to 10.
    Rate {
        /// Product id.
        id: ProductId,
        /// Rating from 1 to 10.
        rating: u8,
    },
    /// Show the profile, wallet and own products.
    Profile,
    /// Link a wallet address to the account.
    SetWallet {
        /// Wallet address.
        address: String,
    },
    /// Put an own product on sale or take it off.
    Toggle {
        /// Product id.
        id: ProductId,
    },
    /// Refresh the session periodically until interrupted.
    KeepAlive,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    #[cfg(feature = "telemetry")]
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        report(e.as_ref());
        std::process::exit(1);
    }
}

#[allow(clippy::print_stderr)]
fn report(err: &dyn std::error::Error) {
    #[cfg(feature = "telemetry")]
    tracing::error!("Command failed: {err}");
    #[cfg(not(feature = "telemetry"))]
    eprintln!("error: {err}");
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = ClientConfig::load()?;
    #[cfg(feature = "telemetry")]
    tracing::debug!(
        auth_api_url = %config.auth_api_url,
        core_api_url = %config.core_api_url,
        session_file = %config.session_file.display(),
        wallet = config.wallet.is_some(),
        "Loaded configuration"
    );

    let session: Arc<dyn SessionStore> = Arc::new(FileSessionStore::open(&config.session_file)?);
    let mut client = MarketClient::try_new(&config.auth_api_url, &config.core_api_url)?;
    if let Some(timeout) = config.request_timeout() {
        client = client.with_timeout(timeout);
    }
    let client = Arc::new(client);

    let keeper = SessionKeeper::new(Arc::clone(&client) as Arc<dyn TokenExchange>, Arc::clone(&session))
        .with_period(config.refresh_interval());

    match cli.command {
        Command::Login { access, refresh } => {
            session.set(&CredentialPair::new(access, refresh))?;
            print_line("credentials stored");
        }
        Command::Logout => {
            session.clear()?;
            print_line("credentials cleared");
        }
        Command::KeepAlive => {
            let handle = keeper.spawn();
            tokio::signal::ctrl_c().await?;
            #[cfg(feature = "telemetry")]
            tracing::info!("Received Ctrl-C, shutting down...");
            handle.shutdown().await;
        }
        command => {
            // Long running commands (waiting for a payment receipt) must not
            // outlive the access token.
            let _keeper = keeper.spawn();
            let wallet = config.wallet.as_ref().and_then(build_wallet);
            run_view_command(command, client, session, wallet).await?;
        }
    }
    Ok(())
}

async fn run_view_command(
    command: Command,
    client: Arc<MarketClient>,
    session: Arc<dyn SessionStore>,
    wallet: Option<Arc<dyn WalletProvider>>,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Feed => {
            let mut feed = Feed::new(client, session);
            feed.load().await?;
            if feed.products().is_empty() {
                print_line("nothing on sale");
            }
            for product in feed.products() {
                print_line(&product_line(product));
            }
        }
        Command::Add { id } => {
            let mut feed = Feed::new(client, session);
            feed.load().await?;
            feed.add_to_cart(id).await?;
            print_line(&format!("product {id} added to cart"));
        }
        Command::Cart => {
            let mut cart = Cart::new(client, session, wallet);
            cart.load().await?;
            print_cart(&cart);
        }
        Command::Remove { id } => {
            let mut cart = Cart::new(client, session, wallet);
            cart.load().await?;
            cart.remove(id).await?;
            print_line(&format!("product {id} removed from cart"));
        }
        Command::Buy { id } => {
            let mut cart = Cart::new(client, session, wallet);
            cart.load().await?;
            let receipt = cart.pay(id).await?;
            print_line(&format!("payment confirmed in transaction {receipt}"));
        }
        Command::Deliver { id } => {
            let mut cart = Cart::new(client, session, wallet);
            cart.load().await?;
            cart.deliver(id).await?;
            print_line(&format!("product {id} delivered"));
        }
        Command::Rate { id, rating } => {
            let mut cart = Cart::new(client, session, wallet);
            cart.load().await?;
            cart.rate(id, rating).await?;
            print_line(&format!("product {id} rated {rating}"));
        }
        Command::Profile => {
            let mut profile = Profile::new(client, session);
            profile.load().await?;
            print_profile(&profile);
        }
        Command::SetWallet { address } => {
            let mut profile = Profile::new(client, session);
            let result = profile.update_wallet(&address).await;
            if let Some(message) = profile.wallet_message() {
                print_line(message);
            }
            result?;
        }
        Command::Toggle { id } => {
            let mut profile = Profile::new(client, session);
            profile.load().await?;
            profile.toggle_listing(id).await?;
            print_line(&format!("listing of product {id} switched"));
        }
        Command::Login { .. } | Command::Logout | Command::KeepAlive => {}
    }
    Ok(())
}

/// Builds the payment wallet, or `None` when it is not usable.
fn build_wallet(config: &WalletConfig) -> Option<Arc<dyn WalletProvider>> {
    let key = config.private_key.trim();
    if key.is_empty() || key.starts_with('$') {
        #[cfg(feature = "telemetry")]
        tracing::warn!("Wallet private_key not resolved (missing env var?), paying disabled");
        return None;
    }
    match EvmWallet::from_private_key(&config.rpc_url, key) {
        Ok(wallet) => {
            let wallet = match config.receipt_timeout_secs {
                Some(secs) => wallet.with_receipt_timeout(Duration::from_secs(secs)),
                None => wallet,
            };
            #[cfg(feature = "telemetry")]
            tracing::debug!(account = %wallet.account(), "Wallet ready");
            Some(Arc::new(wallet))
        }
        #[allow(unused_variables)]
        Err(e) => {
            #[cfg(feature = "telemetry")]
            tracing::warn!(error = %e, "Invalid wallet configuration, paying disabled");
            None
        }
    }
}

fn product_line(product: &Product) -> String {
    format!(
        "#{:<6} {:<32} {:>16}  {} ({} from {} ratings)  {}",
        product.id,
        product.title,
        product.price.to_string(),
        product.seller.name,
        product.seller.rating_display(),
        product.seller.rating_count,
        product.publish_date(),
    )
}

fn entry_line(entry: &CartEntry) -> String {
    let actions = entry
        .actions()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("{}  [{actions}]", product_line(&entry.product))
}

fn print_cart(cart: &Cart) {
    if cart.is_empty() {
        print_line("cart is empty");
        return;
    }
    print_line("To buy:");
    for entry in cart.to_buy() {
        print_line(&entry_line(entry));
    }
    print_line("Bought:");
    for entry in cart.bought() {
        print_line(&entry_line(entry));
    }
}

fn print_profile(profile: &Profile) {
    if let Some(user) = profile.user() {
        print_line(&format!(
            "{} (rating {} from {} ratings)",
            user.user_name,
            user.rating_display(),
            user.count_rating
        ));
    }
    print_line(&format!("wallet: {}", profile.wallet().unwrap_or("-")));
    if let Some(balance) = profile.balance() {
        print_line(&format!("balance: {} ETH", balance.display()));
    }
    let sections: [(&str, Vec<&Product>); 3] = [
        ("On sale:", profile.on_sale().collect()),
        ("Not on sale:", profile.not_on_sale().collect()),
        ("Sold:", profile.sold().collect()),
    ];
    for (title, products) in sections {
        print_line(title);
        for product in products {
            print_line(&product_line(product));
        }
    }
}

#[allow(clippy::print_stdout)]
fn print_line(line: &str) {
    println!("{line}");
}
