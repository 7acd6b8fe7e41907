use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use oraclebot::api::{
    BridgeClient, BrowserOptions, Credentials, OllamaEmbedder, OpenAIClient, WebDriverClient,
};
use oraclebot::config::{EmbeddingProvider, Settings};
use oraclebot::execution::{BrowserTrader, CandleFeed, OrderSettings, OrderTrader};
use oraclebot::oracle::DecisionOracle;
use oraclebot::{CycleOutcome, Engine, Timeframe, TradingContext};
use tokio::sync::watch;
use tracing::Instrument;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "oraclebot",
    version,
    about = "Candle-gated trading driven by a language-model oracle"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Make one decision and place a bracketed order through the terminal
    Once {
        /// Symbol to trade (defaults to SYMBOL)
        #[arg(long)]
        symbol: Option<String>,

        #[arg(long, default_value = "M15")]
        timeframe: Timeframe,
    },
    /// Follow the web trading page and click buy/sell once per new candle
    Watch {
        #[arg(long, default_value = "M1")]
        timeframe: Timeframe,

        /// Run the browser without a window
        #[arg(long, default_value_t = false)]
        headless: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let settings = Settings::load().context("Failed to load settings")?;

    if settings.openai_api_key.is_empty() {
        tracing::warn!("OPENAI_API_KEY is not set, every decision will be hold");
    }

    match cli.command {
        Commands::Once { symbol, timeframe } => run_once(&settings, symbol, timeframe).await,
        Commands::Watch {
            timeframe,
            headless,
        } => run_watch(&settings, timeframe, headless).await,
    }
}

fn setup_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("oraclebot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn credentials(settings: &Settings) -> Option<Credentials> {
    match (&settings.mt5_account, &settings.mt5_password, &settings.mt5_server) {
        (Some(account), Some(password), Some(server)) => Some(Credentials {
            account: *account,
            password: password.clone(),
            server: server.clone(),
        }),
        _ => None,
    }
}

fn build_oracle(settings: &Settings) -> anyhow::Result<DecisionOracle> {
    let mut client = OpenAIClient::new(
        settings.openai_api_key.clone(),
        settings.oracle_model.clone(),
        settings.oracle_max_tokens,
        settings.http_timeout(),
    )
    .context("Failed to build oracle client")?
    .with_base_url(settings.openai_base_url.clone());
    if let (EmbeddingProvider::Openai, Some(model)) =
        (settings.embedding_provider, &settings.embedding_model)
    {
        client = client.with_embedding_model(model.clone());
    }
    let client = Arc::new(client);
    let oracle = DecisionOracle::new(client.clone());

    Ok(match settings.embedding_provider {
        EmbeddingProvider::None => oracle,
        EmbeddingProvider::Openai => oracle.with_embedder(client),
        EmbeddingProvider::Ollama => {
            let mut embedder = OllamaEmbedder::new(settings.ollama_url.clone(), settings.http_timeout())
                .context("Failed to build embedding client")?;
            if let Some(model) = &settings.embedding_model {
                embedder = embedder.with_model(model.clone());
            }
            oracle.with_embedder(Arc::new(embedder))
        }
    })
}

// ============================================================================
// Single shot: one decision, one order
// ============================================================================

async fn run_once(settings: &Settings, symbol: Option<String>, timeframe: Timeframe) -> anyhow::Result<()> {
    let symbol = symbol.unwrap_or_else(|| settings.symbol.clone());
    let bridge = Arc::new(
        BridgeClient::new(settings.bridge_url.clone(), settings.http_timeout())
            .context("Failed to build terminal client")?,
    );

    if let Err(e) = bridge.connect(credentials(settings).as_ref()).await {
        release_terminal(&bridge).await;
        return Err(e).context("Failed to connect to trading terminal");
    }

    let result = decide_once(settings, bridge.clone(), symbol, timeframe).await;

    release_terminal(&bridge).await;
    result
}

async fn decide_once(
    settings: &Settings,
    bridge: Arc<BridgeClient>,
    symbol: String,
    timeframe: Timeframe,
) -> anyhow::Result<()> {
    let trader = OrderTrader::new(bridge.clone(), bridge.clone(), OrderSettings::from(settings));
    let engine = Engine::new(
        CandleFeed::new(bridge),
        build_oracle(settings)?,
        Arc::new(trader),
        timeframe,
        settings.window_size,
    );
    let mut context = TradingContext::new(Some(symbol.clone()));
    let mut shutdown = stop_on_ctrl_c("⚠️  Received Ctrl+C, nothing is sent unless an order is already under way");

    let span = tracing::info_span!("cycle", id = %uuid::Uuid::new_v4());
    let outcome = engine
        .run_cycle_until(&mut context, &mut shutdown)
        .instrument(span)
        .await
        .with_context(|| format!("Decision cycle for {} failed", symbol))?;

    let Some(outcome) = outcome else {
        tracing::info!("👋 Stopped before any order was sent");
        return Ok(());
    };

    match outcome {
        CycleOutcome::Executed { decision, report } => {
            tracing::info!(prediction = %serde_json::to_string(&decision.prediction)?, "Prediction");
            if !report.accepted {
                bail!("Order for {} rejected: {}", symbol, report.detail);
            }
        }
        CycleOutcome::Skipped { decision, reason } => {
            tracing::info!(prediction = %serde_json::to_string(&decision.prediction)?, "Prediction");
            tracing::info!("No trade: {}", reason);
        }
        CycleOutcome::NoSymbol => bail!("No symbol to trade"),
    }

    Ok(())
}

// ============================================================================
// Continuous: follow the web page, click on new candles
// ============================================================================

async fn run_watch(settings: &Settings, timeframe: Timeframe, headless: bool) -> anyhow::Result<()> {
    let bridge = Arc::new(
        BridgeClient::new(settings.bridge_url.clone(), settings.http_timeout())
            .context("Failed to build terminal client")?,
    );
    let driver = WebDriverClient::new(settings.webdriver_url.clone(), settings.http_timeout())
        .context("Failed to build WebDriver client")?;
    if let Err(e) = bridge.connect(credentials(settings).as_ref()).await {
        release_terminal(&bridge).await;
        return Err(e).context("Failed to connect to trading terminal");
    }

    let options = BrowserOptions {
        profile_dir: settings.browser_profile_dir.clone(),
        headless,
    };
    let session = match driver.new_session(&options).await {
        Ok(session) => session,
        Err(e) => {
            release_terminal(&bridge).await;
            return Err(e).context("Failed to start browser session");
        }
    };
    let trader = Arc::new(BrowserTrader::new(session, settings.ui_wait()));

    let result = watch_page(settings, bridge.clone(), trader.clone(), timeframe).await;

    if let Err(e) = trader.session().close().await {
        tracing::warn!("Failed to close browser session: {}", e);
    }
    release_terminal(&bridge).await;
    result
}

async fn watch_page(
    settings: &Settings,
    bridge: Arc<BridgeClient>,
    trader: Arc<BrowserTrader>,
    timeframe: Timeframe,
) -> anyhow::Result<()> {
    trader
        .session()
        .navigate(&settings.trading_page_url)
        .await
        .context("Failed to open trading page")?;

    let engine = Engine::new(
        CandleFeed::new(bridge),
        build_oracle(settings)?,
        trader,
        timeframe,
        settings.window_size,
    )
    .with_poll_period(settings.poll_period());

    let shutdown = stop_on_ctrl_c("⚠️  Received Ctrl+C, stopping before the next submission...");

    tracing::info!("Press Ctrl+C to stop...");
    let mut context = TradingContext::new(None);
    engine.run_loop(&mut context, shutdown).await?;

    tracing::info!("👋 oraclebot stopped");
    Ok(())
}

/// Flag that flips to true on the first Ctrl+C
fn stop_on_ctrl_c(message: &'static str) -> watch::Receiver<bool> {
    let (stop, shutdown) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("{}", message);
            let _ = stop.send(true);
        }
    });
    shutdown
}

async fn release_terminal(bridge: &BridgeClient) {
    if let Err(e) = bridge.shutdown().await {
        tracing::warn!("Failed to shut down terminal session: {}", e);
    }
}
