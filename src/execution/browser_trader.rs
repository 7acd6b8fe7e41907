use super::{ExecutionReport, TradeExecutor, TradeIntent};
use crate::api::{Locator, WebDriverSession};
use crate::models::TradeSide;
use crate::Result;
use async_trait::async_trait;
use std::time::Duration;

const ACTIVE_ASSET: &str =
    "#js-assets-favorites-slider .assets-favorites-item.assets-favorites-item--active";
const ASSET_LABEL: &str = ".assets-favorites-item__label";
const BUY_BUTTON: &str = r#"//*[@id="put-call-buttons-chart-1"]/div/div[2]/div[2]/div[1]/a"#;
const SELL_BUTTON: &str = r#"//*[@id="put-call-buttons-chart-1"]/div/div[2]/div[2]/div[2]/a"#;

const POLL: Duration = Duration::from_millis(250);

/// Clicks the buy/sell controls of a web trading page
pub struct BrowserTrader {
    session: WebDriverSession,
    wait: Duration,
}

impl BrowserTrader {
    pub fn new(session: WebDriverSession, wait: Duration) -> Self {
        Self { session, wait }
    }

    pub fn session(&self) -> &WebDriverSession {
        &self.session
    }

    fn button(side: TradeSide) -> Locator {
        match side {
            TradeSide::Buy => Locator::XPath(BUY_BUTTON.to_string()),
            TradeSide::Sell => Locator::XPath(SELL_BUTTON.to_string()),
        }
    }

    async fn click(&self, side: TradeSide) -> Result<()> {
        let button = self
            .session
            .wait_for_clickable(&Self::button(side), self.wait, POLL)
            .await?;
        self.session.click(&button).await
    }
}

/// `EUR/USD` style label to a terminal symbol
fn symbol_from_label(label: &str) -> Option<String> {
    let symbol: String = label.trim().chars().filter(|c| *c != '/').collect();
    (!symbol.is_empty()).then_some(symbol)
}

#[async_trait]
impl TradeExecutor for BrowserTrader {
    async fn place(&self, intent: &TradeIntent) -> Result<ExecutionReport> {
        match self.click(intent.side).await {
            Ok(()) => {
                tracing::info!(side = %intent.side, symbol = %intent.symbol, "✅ Clicked {} button", intent.side);
                Ok(ExecutionReport {
                    side: intent.side,
                    accepted: true,
                    detail: format!("{} button clicked", intent.side),
                    order: None,
                })
            }
            Err(e) => {
                tracing::error!(side = %intent.side, error = %e, "❌ Could not click {} button", intent.side);
                Ok(ExecutionReport {
                    side: intent.side,
                    accepted: false,
                    detail: e.to_string(),
                    order: None,
                })
            }
        }
    }

    async fn active_symbol(&self) -> Result<Option<String>> {
        let active_item = Locator::Css(ACTIVE_ASSET.to_string());
        let Some(active) = self.session.wait_for(&active_item, self.wait, POLL).await? else {
            return Ok(None);
        };
        let Some(label) = self
            .session
            .find_child(&active, &Locator::Css(ASSET_LABEL.to_string()))
            .await?
        else {
            return Ok(None);
        };

        Ok(symbol_from_label(&self.session.text(&label).await?))
    }
}
