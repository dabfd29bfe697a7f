//! Wire formats for the excluded collaborators.
//!
//! Ingress records are comma-separated lines tagged by a leading keyword;
//! unparsable records are dropped with a warning by callers. Egress helpers
//! render trades, risk metrics, and alerts in the same line-oriented shape.

use super::{MarketDataError, OptionQuote, Tick};
use crate::orderbook::Trade;
use crate::risk::{PortfolioGreeks, RiskLimit, RiskMetrics, StressTestResult};
use crate::utils::now_millis;

/// A parsed ingress record.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    MarketData(Tick),
    Indicators(IndicatorRecord),
    Options(OptionQuote),
}

/// Pre-computed indicator snapshot delivered by the market-data collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorRecord {
    pub symbol: String,
    pub sma_20: f64,
    pub sma_50: f64,
    pub rsi: f64,
    pub bollinger_upper: f64,
    pub bollinger_lower: f64,
    pub macd: f64,
    pub macd_signal: f64,
}

fn field<'a>(parts: &'a [&str], index: usize, line: &str) -> Result<&'a str, MarketDataError> {
    parts.get(index).copied().ok_or_else(|| {
        MarketDataError::InvalidFormat(format!("missing field {index} in '{line}'"))
    })
}

fn numeric(parts: &[&str], index: usize, line: &str) -> Result<f64, MarketDataError> {
    let raw = field(parts, index, line)?;
    raw.trim().parse::<f64>().map_err(|_| {
        MarketDataError::InvalidFormat(format!("non-numeric field '{raw}' in '{line}'"))
    })
}

/// Parse one ingress line. Unknown tags and malformed records are errors; the
/// caller decides whether to warn-and-drop.
pub fn parse_line(line: &str) -> Result<FeedMessage, MarketDataError> {
    let parts: Vec<&str> = line.trim().split(',').collect();
    match parts.first().copied() {
        Some("MARKET_DATA") => {
            // MARKET_DATA,<symbol>,<price>,<volume>,<high>,<low>,<change_pct>
            let symbol = field(&parts, 1, line)?.trim();
            if symbol.is_empty() {
                return Err(MarketDataError::InvalidFormat(format!(
                    "empty symbol in '{line}'"
                )));
            }
            let price = numeric(&parts, 2, line)?;
            let volume = numeric(&parts, 3, line)?;
            let high = numeric(&parts, 4, line)?;
            let low = numeric(&parts, 5, line)?;
            let change_pct = numeric(&parts, 6, line)?;
            let mut tick = Tick::new(symbol, price, volume, now_millis()).with_range(high, low);
            tick.change_pct = change_pct;
            Ok(FeedMessage::MarketData(tick))
        }
        Some("TECHNICAL_INDICATORS") => {
            // TECHNICAL_INDICATORS,<symbol>,<sma20>,<sma50>,<rsi>,<bb_up>,<bb_lo>,<macd>,<macd_signal>
            Ok(FeedMessage::Indicators(IndicatorRecord {
                symbol: field(&parts, 1, line)?.trim().to_string(),
                sma_20: numeric(&parts, 2, line)?,
                sma_50: numeric(&parts, 3, line)?,
                rsi: numeric(&parts, 4, line)?,
                bollinger_upper: numeric(&parts, 5, line)?,
                bollinger_lower: numeric(&parts, 6, line)?,
                macd: numeric(&parts, 7, line)?,
                macd_signal: numeric(&parts, 8, line)?,
            }))
        }
        Some("OPTIONS_DATA") => {
            // OPTIONS_DATA,<underlying>,<strike>,<expiration>,<type>,<price>,<iv>,<delta>
            let kind = field(&parts, 4, line)?.trim().to_uppercase();
            let is_call = match kind.as_str() {
                "CALL" | "C" => true,
                "PUT" | "P" => false,
                other => {
                    return Err(MarketDataError::InvalidFormat(format!(
                        "unknown option type '{other}' in '{line}'"
                    )))
                }
            };
            Ok(FeedMessage::Options(OptionQuote {
                underlying: field(&parts, 1, line)?.trim().to_string(),
                strike: numeric(&parts, 2, line)?,
                expiration: field(&parts, 3, line)?.trim().to_string(),
                is_call,
                price: numeric(&parts, 5, line)?,
                implied_vol: numeric(&parts, 6, line)?,
                delta: numeric(&parts, 7, line)?,
            }))
        }
        Some(tag) => Err(MarketDataError::InvalidFormat(format!(
            "unknown record tag '{tag}'"
        ))),
        None => Err(MarketDataError::InvalidFormat("empty line".into())),
    }
}

/// `TRADE,<price>,<qty>,<buy_id>,<sell_id>`
pub fn format_trade(trade: &Trade) -> String {
    format!(
        "TRADE,{:.4},{:.4},{},{}",
        trade.price,
        trade.quantity,
        trade.buy_order_id.as_u64(),
        trade.sell_order_id.as_u64()
    )
}

/// `RISK_METRICS,<nav>,<var95>,<var99>,<leverage>,<vol>,<sharpe>,<beta>`
pub fn format_risk_metrics(metrics: &RiskMetrics) -> String {
    format!(
        "RISK_METRICS,{:.2},{:.6},{:.6},{:.4},{:.6},{:.4},{:.4}",
        metrics.portfolio_value,
        metrics.var_1day_95,
        metrics.var_1day_99,
        metrics.leverage,
        metrics.volatility,
        metrics.sharpe_ratio,
        metrics.beta
    )
}

/// `PORTFOLIO_GREEKS,<delta>,<gamma>,<theta>,<vega>`
pub fn format_portfolio_greeks(greeks: &PortfolioGreeks) -> String {
    format!(
        "PORTFOLIO_GREEKS,{:.6},{:.6},{:.6},{:.6}",
        greeks.delta, greeks.gamma, greeks.theta, greeks.vega
    )
}

/// `STRESS_TEST_RESULT,<scenario>,<pnl>,<return>,<worst_symbol>,<worst_loss>`
pub fn format_stress_result(result: &StressTestResult) -> String {
    format!(
        "STRESS_TEST_RESULT,{},{:.2},{:.6},{},{:.2}",
        result.scenario_name,
        result.portfolio_pnl,
        result.portfolio_return,
        result.worst_position_symbol,
        result.worst_position_loss
    )
}

/// `RISK_ALERT,<text>`
pub fn format_risk_alert(text: &str) -> String {
    format!("RISK_ALERT,{text}")
}

/// `RISK_LIMIT_BREACH,<type>,<current>,<limit>,<util%>,<desc>`
pub fn format_limit_breach(limit: &RiskLimit) -> String {
    format!(
        "RISK_LIMIT_BREACH,{},{:.6},{:.6},{:.1},{}",
        limit.kind,
        limit.current_value,
        limit.limit_value,
        limit.utilization_pct,
        limit.description
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::OrderId;
    use approx::assert_relative_eq;

    #[test]
    fn parses_market_data_record() {
        let msg = parse_line("MARKET_DATA,AAPL,150.25,120000,151.00,149.10,0.8").unwrap();
        match msg {
            FeedMessage::MarketData(tick) => {
                assert_eq!(tick.symbol, "AAPL");
                assert_relative_eq!(tick.price, 150.25);
                assert_relative_eq!(tick.volume, 120000.0);
                assert_relative_eq!(tick.high, 151.0);
                assert_relative_eq!(tick.low, 149.1);
                assert_relative_eq!(tick.change_pct, 0.8);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn parses_indicator_record() {
        let msg =
            parse_line("TECHNICAL_INDICATORS,TSLA,250.1,248.3,62.5,260.0,240.0,1.2,0.8").unwrap();
        match msg {
            FeedMessage::Indicators(rec) => {
                assert_eq!(rec.symbol, "TSLA");
                assert_relative_eq!(rec.rsi, 62.5);
                assert_relative_eq!(rec.macd_signal, 0.8);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn parses_options_record() {
        let msg = parse_line("OPTIONS_DATA,AAPL,150,2024-03-15,CALL,5.25,0.22,0.55").unwrap();
        match msg {
            FeedMessage::Options(q) => {
                assert_eq!(q.underlying, "AAPL");
                assert!(q.is_call);
                assert_relative_eq!(q.implied_vol, 0.22);
            }
            other => panic!("unexpected message {other:?}"),
        }
        let put = parse_line("OPTIONS_DATA,AAPL,150,2024-03-15,PUT,5.25,0.22,-0.45").unwrap();
        assert!(matches!(put, FeedMessage::Options(q) if !q.is_call));
    }

    #[test]
    fn malformed_records_are_errors() {
        assert!(parse_line("").is_err());
        assert!(parse_line("BOGUS,AAPL,1,2").is_err());
        assert!(parse_line("MARKET_DATA,AAPL,abc,1,2,3,4").is_err());
        assert!(parse_line("MARKET_DATA,AAPL,150.0").is_err());
        assert!(parse_line("OPTIONS_DATA,AAPL,150,2024-03-15,SWAP,1,2,3").is_err());
    }

    #[test]
    fn risk_egress_formats() {
        let metrics = RiskMetrics {
            portfolio_value: 1_000_000.0,
            gross_exposure: 1_500_000.0,
            net_exposure: 900_000.0,
            leverage: 1.5,
            var_1day_95: 0.012,
            var_1day_99: 0.0185,
            cvar_1day_95: 0.016,
            expected_shortfall: 0.016,
            volatility: 0.18,
            sharpe_ratio: 0.33,
            beta: 1.0,
            max_drawdown: 0.02,
            timestamp: 0,
        };
        assert_eq!(
            format_risk_metrics(&metrics),
            "RISK_METRICS,1000000.00,0.012000,0.018500,1.5000,0.180000,0.3300,1.0000"
        );

        let greeks = PortfolioGreeks {
            delta: 120.5,
            gamma: 1.25,
            theta: -4.2,
            vega: 18.0,
        };
        assert_eq!(
            format_portfolio_greeks(&greeks),
            "PORTFOLIO_GREEKS,120.500000,1.250000,-4.200000,18.000000"
        );

        let mut limit = crate::risk::RiskLimit::new(
            crate::risk::LimitKind::Concentration,
            0.10,
            "Maximum single position concentration",
        );
        limit.observe(0.25);
        let line = format_limit_breach(&limit);
        assert!(line.starts_with("RISK_LIMIT_BREACH,CONCENTRATION,0.250000,0.100000,250.0,"));

        assert_eq!(format_risk_alert("VaR breach"), "RISK_ALERT,VaR breach");
    }

    #[test]
    fn trade_egress_format() {
        let trade = Trade {
            id: 1,
            symbol: "AAPL".into(),
            buy_order_id: OrderId(7),
            sell_order_id: OrderId(9),
            price: 150.0,
            quantity: 100.0,
            timestamp: 0,
        };
        assert_eq!(format_trade(&trade), "TRADE,150.0000,100.0000,7,9");
    }
}
