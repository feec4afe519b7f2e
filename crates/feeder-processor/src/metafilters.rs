//! Stage 2 metafilters: one scalar price per quote asset.

use feeder_models::{
    average, group_by_quote_asset, latest_timestamp, median, minimum, values, FilterPoint, Pair,
};
use tracing::warn;

/// Cross-market aggregation variants. Selection is by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetafilterType {
    #[default]
    Median,
    Average,
    Minimum,
}

impl MetafilterType {
    pub fn from_env() -> Self {
        let raw = feeder_config::env_or("METAFILTER_TYPE", "Median");
        match raw.as_str() {
            "Median" => Self::Median,
            "Average" => Self::Average,
            "Minimum" => Self::Minimum,
            other => {
                warn!(metafilter = other, "Unknown metafilter type, using Median");
                Self::Median
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Median => "median",
            Self::Average => "average",
            Self::Minimum => "minimum",
        }
    }

    fn aggregate(&self, xs: &[f64]) -> Option<f64> {
        match self {
            Self::Median => median(xs),
            Self::Average => average(xs),
            Self::Minimum => minimum(xs),
        }
    }
}

/// Collapse the points of each quote asset into a single point.
///
/// The output point keeps the base token of an arbitrary member
/// (conventionally USD), the group's latest timestamp, and the
/// metafilter's name.
pub fn apply(metafilter: MetafilterType, points: Vec<FilterPoint>) -> Vec<FilterPoint> {
    let mut aggregated = Vec::new();
    for (asset, members) in group_by_quote_asset(points) {
        // Grouping derives from at least one survivor, so the aggregate
        // exists; guard anyway rather than panic on an empty group.
        let Some(value) = metafilter.aggregate(&values(&members)) else {
            continue;
        };
        let time = latest_timestamp(&members);
        let first = &members[0];
        aggregated.push(FilterPoint {
            pair: Pair::new(asset, first.pair.base_token.clone()),
            source_type: first.source_type,
            source: String::new(),
            value,
            name: metafilter.name().to_string(),
            time,
        });
    }
    aggregated
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use feeder_models::{Asset, SourceType};

    fn point(symbol: &str, value: f64, secs: i64) -> FilterPoint {
        FilterPoint {
            pair: Pair::new(
                Asset {
                    symbol: symbol.to_string(),
                    address: format!("0x{symbol}"),
                    blockchain: "Ethereum".to_string(),
                    ..Default::default()
                },
                Asset::fiat_usd(),
            ),
            source_type: SourceType::Cex,
            source: "Binance".to_string(),
            value,
            name: "lastprice".to_string(),
            time: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[test]
    fn test_median_across_markets() {
        let points = vec![point("ETH", 2000.0, 100), point("ETH", 2010.0, 101)];
        let aggregated = apply(MetafilterType::Median, points);
        assert_eq!(aggregated.len(), 1);
        assert_eq!(aggregated[0].value, 2005.0);
        assert_eq!(aggregated[0].name, "median");
        assert_eq!(aggregated[0].pair.quote_token.symbol, "ETH");
        assert!(aggregated[0].pair.base_token.is_fiat_usd());
        // Latest member timestamp wins.
        assert_eq!(aggregated[0].time.timestamp(), 101);
    }

    #[test]
    fn test_one_point_per_asset() {
        let points = vec![
            point("BTC", 50000.0, 100),
            point("ETH", 2000.0, 100),
            point("BTC", 50100.0, 100),
        ];
        let aggregated = apply(MetafilterType::Median, points);
        assert_eq!(aggregated.len(), 2);
        let mut symbols: Vec<&str> = aggregated
            .iter()
            .map(|p| p.pair.quote_token.symbol.as_str())
            .collect();
        symbols.sort_unstable();
        assert_eq!(symbols, vec!["BTC", "ETH"]);
    }

    #[test]
    fn test_minimum_variant() {
        let points = vec![point("ETH", 2000.0, 100), point("ETH", 2010.0, 101)];
        let aggregated = apply(MetafilterType::Minimum, points);
        assert_eq!(aggregated[0].value, 2000.0);
        assert_eq!(aggregated[0].name, "minimum");
    }

    #[test]
    fn test_empty_input() {
        assert!(apply(MetafilterType::Median, Vec::new()).is_empty());
    }
}
