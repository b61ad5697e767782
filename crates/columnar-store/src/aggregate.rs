use std::collections::BTreeMap;

use analysis_core::{AnalysisError, Bar, IntervalLabel, IntervalUnit, Quote, Tick};
use chrono::{DateTime, TimeZone, Utc};

fn floor_to_second(ts: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_opt(ts.timestamp(), 0).single().expect("timestamp() is always in range")
}

/// Folds trade ticks into 1-second OHLCV bars: `open`/`close` from the first
/// and last tick in the second, `high`/`low` from the price extremes, and
/// `volume` as the summed tick size. Ticks must already be sorted by
/// timestamp within each symbol; callers that merge multiple sources should
/// sort first.
pub fn aggregate_ticks_to_1s(ticks: &[Tick]) -> Result<Vec<Bar>, AnalysisError> {
    let mut buckets: BTreeMap<(String, DateTime<Utc>), Vec<&Tick>> = BTreeMap::new();
    for tick in ticks {
        tick.validate()?;
        let key = (tick.symbol.clone(), floor_to_second(tick.timestamp));
        buckets.entry(key).or_default().push(tick);
    }

    let interval = IntervalLabel::new(1, IntervalUnit::Second);
    let mut bars: Vec<Bar> = buckets
        .into_iter()
        .map(|((symbol, bucket_start), group)| {
            let open = group.first().unwrap().price;
            let close = group.last().unwrap().price;
            let high = group.iter().map(|t| t.price).fold(f64::NEG_INFINITY, f64::max);
            let low = group.iter().map(|t| t.price).fold(f64::INFINITY, f64::min);
            let volume = group.iter().map(|t| t.size).sum();
            Bar { symbol, timestamp: bucket_start, interval, open, high, low, close, volume }
        })
        .collect();
    bars.sort_by(|a, b| (a.symbol.as_str(), a.timestamp).cmp(&(b.symbol.as_str(), b.timestamp)));
    Ok(bars)
}

/// Downsamples quotes to one-per-second, per symbol, by keeping the
/// tightest quote observed in each second: the one with the smallest
/// non-negative spread, ties broken by earliest timestamp. The kept quote's
/// timestamp is then normalized to the bucket start, mirroring
/// `aggregate_ticks_to_1s`'s bucket-aligned output.
pub fn aggregate_quotes_by_second(quotes: &[Quote]) -> Result<Vec<Quote>, AnalysisError> {
    let mut buckets: BTreeMap<(String, DateTime<Utc>), Quote> = BTreeMap::new();
    for quote in quotes {
        if !quote.is_valid() {
            return Err(AnalysisError::InvalidData(format!(
                "{} quote at {} is invalid (bid={}, ask={})",
                quote.symbol, quote.timestamp, quote.bid_price, quote.ask_price
            )));
        }
        let key = (quote.symbol.clone(), floor_to_second(quote.timestamp));
        buckets
            .entry(key.clone())
            .and_modify(|existing| {
                let tighter = quote.spread() < existing.spread()
                    || (quote.spread() == existing.spread() && quote.timestamp < existing.timestamp);
                if tighter {
                    *existing = quote.clone();
                }
            })
            .or_insert_with(|| quote.clone());
    }
    let mut out: Vec<Quote> = buckets
        .into_iter()
        .map(|((_, bucket_start), mut quote)| {
            quote.timestamp = bucket_start;
            quote
        })
        .collect();
    out.sort_by(|a, b| (a.symbol.as_str(), a.timestamp).cmp(&(b.symbol.as_str(), b.timestamp)));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(symbol: &str, secs: i64, price: f64, size: f64) -> Tick {
        Tick {
            symbol: symbol.into(),
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            price,
            size,
        }
    }

    #[test]
    fn aggregates_ticks_within_a_second() {
        let ticks = vec![
            tick("AAPL", 1_700_000_000, 100.0, 10.0),
            tick("AAPL", 1_700_000_000, 101.0, 5.0),
            tick("AAPL", 1_700_000_000, 99.5, 2.0),
            tick("AAPL", 1_700_000_001, 102.0, 1.0),
        ];
        let bars = aggregate_ticks_to_1s(&ticks).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].open, 100.0);
        assert_eq!(bars[0].close, 99.5);
        assert_eq!(bars[0].high, 101.0);
        assert_eq!(bars[0].low, 99.5);
        assert_eq!(bars[0].volume, 17.0);
        assert_eq!(bars[1].open, 102.0);
    }

    fn quote(symbol: &str, secs: i64, bid: f64, ask: f64) -> Quote {
        Quote {
            symbol: symbol.into(),
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            bid_price: bid,
            ask_price: ask,
            bid_size: 1.0,
            ask_size: 1.0,
            exchange: "Q".into(),
        }
    }

    #[test]
    fn keeps_the_tightest_spread_and_normalizes_to_bucket_start() {
        let quotes = vec![
            quote("AAPL", 1_700_000_000, 100.0, 100.50),
            quote("AAPL", 1_700_000_000, 100.10, 100.20),
            quote("AAPL", 1_700_000_001, 101.0, 101.05),
        ];
        let out = aggregate_quotes_by_second(&quotes).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].bid_price, 100.10, "the tighter 0.10-wide quote should win over the 0.50-wide one");
        assert_eq!(out[0].timestamp, Utc.timestamp_opt(1_700_000_000, 0).unwrap(), "output timestamp is the bucket start");
        assert_eq!(out[1].bid_price, 101.0);
    }

    #[test]
    fn ties_on_spread_break_by_earliest_timestamp() {
        let quotes = vec![
            quote("AAPL", 1_700_000_000, 100.0, 100.10),
            Quote { timestamp: Utc.timestamp_opt(1_700_000_000, 500_000_000).unwrap(), ..quote("AAPL", 1_700_000_000, 100.05, 100.15) },
        ];
        let out = aggregate_quotes_by_second(&quotes).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].bid_price, 100.0, "equal spreads tie-break to the earlier-arriving quote");
    }
}
