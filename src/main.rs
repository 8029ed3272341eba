//! Rebalancer: single-asset portfolio rebalancing assistant.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores the portfolio from disk (or starts fresh), and runs one
//! subcommand. `watch` keeps polling the price feed and prints a fresh
//! recommendation on every tick until Ctrl+C.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use rebalancer::config::AppConfig;
use rebalancer::data::{self, PriceSupplier};
use rebalancer::engine::portfolio::PortfolioState;
use rebalancer::engine::watcher::{PriceTick, PriceWatcher};
use rebalancer::storage;
use rebalancer::strategy::AllocationEngine;
use rebalancer::types::{parse_amount, Action, CycleKind, RebalanceError};

const BANNER: &str = r#"
 ____      _           _
|  _ \ ___| |__   __ _| | __ _ _ __   ___ ___ _ __
| |_) / _ \ '_ \ / _` | |/ _` | '_ \ / __/ _ \ '__|
|  _ <  __/ |_) | (_| | | (_| | | | | (_|  __/ |
|_| \_\___|_.__/ \__,_|_|\__,_|_| |_|\___\___|_|

  Price-tiered allocation assistant
  v0.1.0
"#;

#[derive(Parser)]
#[command(
    name = "rebalancer",
    about = "Tells you how much of the volatile asset to buy or sell at the current price"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// State file. Overrides `storage.state_path` from the config.
    #[arg(long, global = true)]
    state: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show holdings, the current price and the recommendation.
    Status {
        /// Use this price instead of fetching one.
        #[arg(long)]
        price: Option<String>,
    },
    /// Poll the price feed and print a recommendation on every tick.
    Watch {
        /// Poll interval in seconds. Defaults to `price_feed.poll_interval_secs`.
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Enter the quantities currently held.
    Set {
        /// Volatile asset quantity, e.g. 0.5
        volatile: String,
        /// Stable asset quantity, e.g. 2500
        stable: String,
    },
    /// Record the opening deposit (first cycle).
    Deposit {
        #[arg(long)]
        price: Option<String>,
    },
    /// Record a buy of the volatile asset.
    Buy {
        #[arg(long)]
        price: Option<String>,
    },
    /// Record a sell of the volatile asset.
    Sell {
        #[arg(long)]
        price: Option<String>,
    },
    /// List recorded cycles.
    History,
    /// Print the allocation tier table.
    Rules {
        /// Highlight the tier for this price.
        #[arg(long)]
        price: Option<String>,
    },
    /// Clear the cycle history and the entered quantities.
    Reset {
        /// Actually reset (without this flag, only shows what would be cleared).
        #[arg(long, default_value_t = false)]
        confirm: bool,
    },
    /// Write the portfolio to a JSON file for use on another machine.
    Export {
        /// Output file. Defaults to portfolio-YYYY-MM-DD.json.
        path: Option<PathBuf>,
    },
    /// Replace the portfolio with a previously exported file.
    Import {
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();

    let config_path = cli.config.to_string_lossy().to_string();
    let cfg = AppConfig::load(&config_path)?;

    init_logging();

    let engine = AllocationEngine::new(cfg.asset.rule_table()?);
    let state_path = cli.state.clone().unwrap_or_else(|| cfg.storage.state_path.clone());

    info!(
        symbol = %cfg.asset.symbol,
        tiers = engine.rules().len(),
        state_path = %state_path,
        "Rebalancer starting up"
    );

    // -- Restore or create state -----------------------------------------

    let mut state = match storage::load_state(Some(&state_path))? {
        Some(s) => s,
        None => PortfolioState::new(),
    };

    let app = App { cfg: &cfg, engine: &engine, state_path: &state_path };

    match cli.command {
        Commands::Status { price } => app.status(&state, price.as_deref()).await?,
        Commands::Watch { interval } => app.watch(&state, interval).await?,
        Commands::Set { volatile, stable } => {
            state.enter_quantities(volatile, stable)?;
            app.save(&state)?;
            println!(
                "Holdings set: {} {} / {} {}",
                state.volatile_qty_text(),
                cfg.asset.symbol,
                state.stable_qty_text(),
                cfg.asset.stable_symbol
            );
        }
        Commands::Deposit { price } => {
            app.record(&mut state, CycleKind::Deposit, price.as_deref()).await?
        }
        Commands::Buy { price } => app.record(&mut state, CycleKind::Buy, price.as_deref()).await?,
        Commands::Sell { price } => {
            app.record(&mut state, CycleKind::Sell, price.as_deref()).await?
        }
        Commands::History => app.history(&state),
        Commands::Rules { price } => app.rules(price.as_deref())?,
        Commands::Reset { confirm } => {
            if !confirm {
                println!(
                    "Would clear {} cycle(s) and the entered holdings. Re-run with --confirm.",
                    state.ledger().len()
                );
                return Ok(());
            }
            state.reset();
            storage::delete_state(Some(&state_path))?;
            info!("Portfolio reset");
            println!("Portfolio reset.");
        }
        Commands::Export { path } => {
            let path = path.unwrap_or_else(|| {
                PathBuf::from(storage::default_export_file_name(chrono::Local::now().date_naive()))
            });
            storage::export_state(&state, &path)?;
            println!("Exported {} cycle(s) to {}", state.ledger().len(), path.display());
        }
        Commands::Import { path } => match storage::import_state(&path) {
            Ok(imported) => {
                state = imported;
                app.save(&state)?;
                println!(
                    "Imported {} cycle(s) from {}",
                    state.ledger().len(),
                    path.display()
                );
            }
            Err(e) => bail!("Import failed, current portfolio kept: {e}"),
        },
    }

    Ok(())
}

/// Everything a subcommand needs besides the mutable portfolio.
struct App<'a> {
    cfg: &'a AppConfig,
    engine: &'a AllocationEngine,
    state_path: &'a str,
}

impl App<'_> {
    fn save(&self, state: &PortfolioState) -> Result<()> {
        storage::save_state(state, Some(self.state_path))
    }

    fn supplier(&self) -> Result<Arc<dyn PriceSupplier>> {
        data::build_supplier(self.cfg)
    }

    /// `--price` when given, otherwise one fetch from the supplier chain.
    async fn price(&self, overridden: Option<&str>) -> Result<Decimal> {
        if let Some(text) = overridden {
            let price = parse_amount(text, "price")?;
            if price <= Decimal::ZERO {
                bail!("price must be positive, got {price}");
            }
            return Ok(price);
        }
        let supplier = self.supplier()?;
        let price = supplier
            .current_price(&self.cfg.asset.symbol)
            .await
            .context("No price available")?;
        Ok(price)
    }

    async fn status(&self, state: &PortfolioState, price: Option<&str>) -> Result<()> {
        let price = self.price(price).await?;
        self.print_holdings(state);
        println!("Price: ${price:.2}");
        self.print_recommendation(state, price);
        Ok(())
    }

    async fn watch(&self, state: &PortfolioState, interval: Option<u64>) -> Result<()> {
        println!("{BANNER}");
        self.print_holdings(state);

        let every = Duration::from_secs(interval.unwrap_or(self.cfg.price_feed.poll_interval_secs));
        let watcher = PriceWatcher::start(self.supplier()?, self.cfg.asset.symbol.clone(), every)?;
        let mut ticks = watcher.subscribe();

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                changed = ticks.changed() => {
                    if changed.is_err() {
                        warn!("Price watcher ended unexpectedly");
                        break;
                    }
                    let tick = ticks.borrow_and_update().clone();
                    match tick {
                        PriceTick::Pending => {}
                        PriceTick::Live { price, at } => {
                            println!("[{}] price ${price:.2}", at.format("%H:%M:%S"));
                            self.print_recommendation(state, price);
                        }
                        PriceTick::Unavailable { reason, at } => {
                            println!("[{}] price unavailable: {reason}", at.format("%H:%M:%S"));
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received.");
                    break;
                }
            }
        }

        if watcher.latest().is_pending() {
            println!("Stopped before any price was received.");
        }
        watcher.stop().await;
        Ok(())
    }

    async fn record(
        &self,
        state: &mut PortfolioState,
        kind: CycleKind,
        price: Option<&str>,
    ) -> Result<()> {
        let price = self.price(price).await?;
        let snapshot = state.snapshot(price)?;
        let record = match kind {
            CycleKind::Deposit => state.record_deposit(&snapshot)?,
            movement => state.record_movement(&snapshot, movement)?,
        };
        self.save(state)?;
        println!("{record}");
        Ok(())
    }

    fn history(&self, state: &PortfolioState) {
        let ledger = state.ledger();
        if ledger.is_empty() {
            println!("No cycles recorded yet.");
            return;
        }
        for record in ledger.snapshot() {
            println!("{record}");
        }
        println!(
            "{} cycle(s), cumulative profit ${:.0}",
            ledger.len(),
            ledger.cumulative_profit()
        );
    }

    fn rules(&self, price: Option<&str>) -> Result<()> {
        let active = match price {
            Some(text) => Some(self.engine.rule_for(parse_amount(text, "price")?)),
            None => None,
        };
        for rule in self.engine.rules().as_slice() {
            let marker = if active == Some(rule) { ">" } else { " " };
            println!("{marker} {rule}");
        }
        Ok(())
    }

    fn print_holdings(&self, state: &PortfolioState) {
        let asset = &self.cfg.asset;
        println!(
            "Holdings: {} {} / {} {}",
            display_or_dash(state.volatile_qty_text()),
            asset.symbol,
            display_or_dash(state.stable_qty_text()),
            asset.stable_symbol
        );
    }

    fn print_recommendation(&self, state: &PortfolioState, price: Decimal) {
        let decimals = self.cfg.asset.display_decimals as usize;
        match state.recommend(self.engine, price) {
            Ok((_, result)) => {
                println!("Tier: {}", self.engine.rule_for(price));
                println!("{result}");
                match result.action {
                    Action::Buy => println!(
                        "  -> buy {:.decimals$} {} for ${:.2}",
                        result.trade_amount_base, self.cfg.asset.symbol, result.trade_amount_quote
                    ),
                    Action::Sell => println!(
                        "  -> sell {:.decimals$} {} for ${:.2}",
                        result.trade_amount_base, self.cfg.asset.symbol, result.trade_amount_quote
                    ),
                    Action::Hold => println!("  -> balanced, nothing to do"),
                }
            }
            Err(RebalanceError::NoData) => println!("No recommendation: portfolio is empty."),
            Err(e) => {
                error!(error = %e, "Cannot evaluate portfolio");
                println!("No recommendation: {e}");
            }
        }
    }
}

fn display_or_dash(text: &str) -> &str {
    if text.trim().is_empty() {
        "-"
    } else {
        text
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("rebalancer=info"));

    let json_logging = std::env::var("REBALANCER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
