pub mod websocket;

use analysis_core::{AnalysisError, Bar, IntervalLabel, IntervalUnit, MarketDataProvider, Quote, Tick};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const BASE_URL: &str = "https://api.polygon.io";

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests,
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }

            let wait_until = ts.front().unwrap().checked_add(self.window).unwrap();
            let sleep_dur = wait_until.duration_since(now) + Duration::from_millis(50);
            drop(ts);
            tracing::debug!("rate limiter: waiting {:.1}s for a Polygon API slot", sleep_dur.as_secs_f64());
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

/// `MarketDataProvider` backed by Polygon.io's REST aggregates/trades/quotes
/// endpoints. Constructed once per process and shared behind an `Arc` by
/// `market-data-facade`.
#[derive(Clone)]
pub struct PolygonClient {
    api_key: String,
    client: Client,
    rate_limiter: RateLimiter,
}

impl PolygonClient {
    pub fn new(api_key: String) -> Self {
        // Default 500 req/min for the Starter plan. Free-tier users should
        // set POLYGON_RATE_LIMIT=5.
        let rate_limit: usize = std::env::var("POLYGON_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(500);

        let client = Client::builder()
            .timeout(Duration::from_secs(90))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key,
            client,
            rate_limiter: RateLimiter::new(rate_limit, Duration::from_secs(60)),
        }
    }

    /// Send a request with rate limiting and automatic 429 retry.
    async fn send_request(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, AnalysisError> {
        let request = builder.build().map_err(|e| AnalysisError::Provider(e.to_string()))?;

        for attempt in 0..3u32 {
            self.rate_limiter.acquire().await;
            let req_clone = request
                .try_clone()
                .ok_or_else(|| AnalysisError::Provider("cannot clone request for retry".to_string()))?;
            let response = self
                .client
                .execute(req_clone)
                .await
                .map_err(|e| AnalysisError::Provider(e.to_string()))?;

            if response.status().as_u16() != 429 {
                return Ok(response);
            }

            let wait_secs = 15u64;
            tracing::warn!("Polygon 429 rate limited, waiting {}s before retry {}/3", wait_secs, attempt + 1);
            tokio::time::sleep(Duration::from_secs(wait_secs)).await;
        }

        Err(AnalysisError::Provider("rate limited by Polygon after 3 retries".to_string()))
    }

    /// Maps an `IntervalLabel` to Polygon's `(multiplier, timespan)` pair.
    /// Polygon has no native second-bar aggregate; 1s is requested as the
    /// finest minute aggregate and the caller is expected to have already
    /// routed tick data through `fetch_ticks` instead.
    fn timespan_for(interval: IntervalLabel) -> (u32, &'static str) {
        match interval.unit {
            IntervalUnit::Second => (1, "minute"),
            IntervalUnit::Minute => (interval.n, "minute"),
            IntervalUnit::Day => (interval.n, "day"),
            IntervalUnit::Week => (interval.n, "week"),
        }
    }

    async fn get_aggregates(
        &self,
        symbol: &str,
        interval: IntervalLabel,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Bar>, AnalysisError> {
        let (multiplier, timespan) = Self::timespan_for(interval);
        let url = format!(
            "{}/v2/aggs/ticker/{}/range/{}/{}/{}/{}",
            BASE_URL,
            symbol,
            multiplier,
            timespan,
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        );

        let response = self
            .send_request(self.client.get(&url).query(&[("apiKey", &self.api_key), ("adjusted", &"true".to_string())]))
            .await?;

        if !response.status().is_success() {
            return Err(AnalysisError::Provider(format!(
                "aggregates HTTP {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        let agg_response: AggregateResponse = response.json().await.map_err(|e| AnalysisError::Provider(e.to_string()))?;

        Ok(agg_response
            .results
            .into_iter()
            .map(|r| Bar {
                symbol: symbol.to_string(),
                timestamp: DateTime::from_timestamp_millis(r.t).unwrap_or_else(Utc::now),
                interval,
                open: r.o,
                high: r.h,
                low: r.l,
                close: r.c,
                volume: r.v,
            })
            .collect())
    }

    async fn get_trades(&self, symbol: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Tick>, AnalysisError> {
        let url = format!("{}/v3/trades/{}", BASE_URL, symbol);
        let response = self
            .send_request(self.client.get(&url).query(&[
                ("apiKey", self.api_key.as_str()),
                ("timestamp.gte", &from.to_rfc3339()),
                ("timestamp.lte", &to.to_rfc3339()),
                ("limit", &"50000".to_string()),
            ]))
            .await?;

        if !response.status().is_success() {
            return Err(AnalysisError::Provider(format!(
                "trades HTTP {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        let trades_response: TradesResponse = response.json().await.map_err(|e| AnalysisError::Provider(e.to_string()))?;

        Ok(trades_response
            .results
            .into_iter()
            .map(|r| Tick {
                symbol: symbol.to_string(),
                timestamp: DateTime::from_timestamp_nanos(r.participant_timestamp),
                price: r.price,
                size: r.size,
            })
            .collect())
    }

    async fn get_quotes(&self, symbol: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Quote>, AnalysisError> {
        let url = format!("{}/v3/quotes/{}", BASE_URL, symbol);
        let response = self
            .send_request(self.client.get(&url).query(&[
                ("apiKey", self.api_key.as_str()),
                ("timestamp.gte", &from.to_rfc3339()),
                ("timestamp.lte", &to.to_rfc3339()),
                ("limit", &"50000".to_string()),
            ]))
            .await?;

        if !response.status().is_success() {
            return Err(AnalysisError::Provider(format!(
                "quotes HTTP {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        let quotes_response: QuotesResponse = response.json().await.map_err(|e| AnalysisError::Provider(e.to_string()))?;

        Ok(quotes_response
            .results
            .into_iter()
            .map(|r| Quote {
                symbol: symbol.to_string(),
                timestamp: DateTime::from_timestamp_nanos(r.participant_timestamp),
                bid_price: r.bid_price,
                ask_price: r.ask_price,
                bid_size: r.bid_size,
                ask_size: r.ask_size,
                exchange: r.ask_exchange.map(|e| e.to_string()).unwrap_or_default(),
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl MarketDataProvider for PolygonClient {
    fn name(&self) -> &str {
        "polygon"
    }

    async fn check_connectivity(&self) -> Result<(), AnalysisError> {
        let url = format!("{}/v1/marketstatus/now", BASE_URL);
        let response = self
            .send_request(self.client.get(&url).query(&[("apiKey", &self.api_key)]))
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(AnalysisError::Provider(format!("connectivity check failed: HTTP {}", response.status())))
        }
    }

    async fn fetch_bars(
        &self,
        symbol: &str,
        interval: IntervalLabel,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, AnalysisError> {
        self.get_aggregates(symbol, interval, start, end).await
    }

    async fn fetch_latest_bar(&self, symbol: &str, interval: IntervalLabel) -> Result<Option<Bar>, AnalysisError> {
        let now = Utc::now();
        let from = now - chrono::Duration::days(5);
        let bars = self.get_aggregates(symbol, interval, from, now).await?;
        Ok(bars.into_iter().last())
    }

    async fn fetch_ticks(&self, symbol: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Tick>, AnalysisError> {
        self.get_trades(symbol, start, end).await
    }

    async fn fetch_quotes(&self, symbol: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Quote>, AnalysisError> {
        self.get_quotes(symbol, start, end).await
    }
}

#[derive(Debug, Deserialize)]
struct AggregateResponse {
    #[serde(default)]
    results: Vec<AggregateResult>,
}

#[derive(Debug, Deserialize)]
struct AggregateResult {
    t: i64, // timestamp, millis
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
}

#[derive(Debug, Deserialize)]
struct TradesResponse {
    #[serde(default)]
    results: Vec<TradeResult>,
}

#[derive(Debug, Deserialize)]
struct TradeResult {
    participant_timestamp: i64, // nanos
    price: f64,
    size: f64,
}

#[derive(Debug, Deserialize)]
struct QuotesResponse {
    #[serde(default)]
    results: Vec<QuoteResult>,
}

#[derive(Debug, Deserialize)]
struct QuoteResult {
    participant_timestamp: i64, // nanos
    bid_price: f64,
    ask_price: f64,
    bid_size: f64,
    ask_size: f64,
    #[serde(default)]
    ask_exchange: Option<i32>,
}
