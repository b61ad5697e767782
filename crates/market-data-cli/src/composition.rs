use std::sync::Arc;

use analysis_core::MarketDataProvider;
use anyhow::{bail, Context as _, Result};
use columnar_store::ColumnarStore;
use indicator_framework::{IndicatorEvaluator, IndicatorRegistry};
use market_data_facade::MarketDataFacade;
use polygon_client::PolygonClient;
use replay_queue::ReplayQueueCoordinator;
use session_coordinator::SessionCoordinator;
use session_state::SessionState;
use time_service::{TimeMode, TimeService};

use crate::config::{DataApi, EngineConfig};

/// Everything a command needs, wired once per invocation the way the
/// composition root in spec §9's REDESIGN FLAGS describes: no global
/// singletons, every service constructed here and handed out by `Arc`.
pub struct Context {
    pub config: EngineConfig,
    pub store: Arc<ColumnarStore>,
    pub time: Arc<TimeService>,
    pub facade: Arc<MarketDataFacade>,
    pub state: Arc<SessionState>,
    pub replay: Arc<ReplayQueueCoordinator>,
    pub indicators: Arc<IndicatorEvaluator>,
}

impl Context {
    pub fn build(config: EngineConfig, mode: TimeMode) -> Result<Self> {
        let store = Arc::new(ColumnarStore::new(config.storage_dir.clone(), config.exchange_group.clone()));

        let live_timezone = config
            .market_hours
            .first()
            .map(|h| h.timezone)
            .unwrap_or(chrono_tz::UTC);

        let time = Arc::new(TimeService::new(
            mode,
            live_timezone,
            config.market_hours.clone(),
            config.holidays.clone(),
            config.exchange_group.clone(),
            config.asset_class.clone(),
            config.backtest.start_date,
        ));

        let provider = build_provider(&config, mode)?;

        let facade = Arc::new(
            MarketDataFacade::new(store.clone(), time.clone(), provider, &config.exchange_group, &config.asset_class)
                .context("constructing market data facade")?,
        );

        let state = Arc::new(SessionState::new(config.session.max_bars_per_interval));
        let replay = Arc::new(ReplayQueueCoordinator::new());
        let indicators = Arc::new(IndicatorEvaluator::new(IndicatorRegistry::with_defaults()));

        Ok(Self { config, store, time, facade, state, replay, indicators })
    }

    pub fn build_coordinator(&self) -> Result<SessionCoordinator> {
        let session_config = self.config.build_session_config().context("parsing session configuration")?;
        let live_indicators = self.config.live_indicators();
        SessionCoordinator::new(
            self.facade.clone(),
            self.time.clone(),
            self.state.clone(),
            self.replay.clone(),
            self.indicators.clone(),
            session_config,
            live_indicators,
        )
        .context("constructing session coordinator")
    }
}

/// Builds the configured provider, validating connectivity on selection
/// (spec §6: "must validate connectivity on select") via a throwaway
/// blocking runtime — the same bridging pattern the facade itself uses for
/// its provider calls.
fn build_provider(config: &EngineConfig, mode: TimeMode) -> Result<Option<Arc<dyn MarketDataProvider>>> {
    match config.data_api {
        DataApi::None => Ok(None),
        DataApi::Polygon => {
            let api_key = std::env::var(&config.api_key_env)
                .with_context(|| format!("reading API key from ${}", config.api_key_env))?;
            let client = PolygonClient::new(api_key);

            if mode == TimeMode::Live {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .context("starting a runtime for the provider connectivity check")?;
                if let Err(e) = runtime.block_on(client.check_connectivity()) {
                    bail!("polygon connectivity check failed: {e}");
                }
            }

            Ok(Some(Arc::new(client) as Arc<dyn MarketDataProvider>))
        }
    }
}
