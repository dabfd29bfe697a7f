//! Plain-text backtest reports.
//!
//! Two layouts: a per-strategy performance report and a fixed-width
//! comparison table across strategies.

use super::BacktestResult;
use chrono::{DateTime, Utc};
use std::fmt::Write;

fn render_date(epoch_millis: u64) -> String {
    DateTime::<Utc>::from_timestamp_millis(epoch_millis as i64)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "n/a".to_string())
}

/// Full performance layout for one backtest run.
pub fn performance_report(result: &BacktestResult) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "=== BACKTEST PERFORMANCE REPORT ===");
    let _ = writeln!(out, "Strategy: {}", result.strategy_name);
    let _ = writeln!(
        out,
        "Period: {} to {}",
        render_date(result.start_time),
        render_date(result.end_time)
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "=== PERFORMANCE METRICS ===");
    let _ = writeln!(out, "Starting Capital: ${:.2}", result.starting_capital);
    let _ = writeln!(out, "Ending Capital: ${:.2}", result.ending_capital);
    let _ = writeln!(out, "Total Return: {:.2}%", result.total_return * 100.0);
    let _ = writeln!(
        out,
        "Annualized Return: {:.2}%",
        result.annualized_return * 100.0
    );
    let _ = writeln!(out, "Volatility: {:.2}%", result.volatility * 100.0);
    let _ = writeln!(out, "Sharpe Ratio: {:.3}", result.sharpe_ratio);
    let _ = writeln!(out, "Sortino Ratio: {:.3}", result.sortino_ratio);
    let _ = writeln!(out, "Max Drawdown: {:.2}%", result.max_drawdown * 100.0);
    let _ = writeln!(out, "VaR (95%): {:.2}%", result.var_95 * 100.0);
    let _ = writeln!(out, "CVaR (95%): {:.2}%", result.cvar_95 * 100.0);
    let _ = writeln!(out);

    let _ = writeln!(out, "=== TRADING STATISTICS ===");
    let _ = writeln!(out, "Total Trades: {}", result.total_trades);
    let _ = writeln!(out, "Winning Trades: {}", result.winning_trades);
    let _ = writeln!(out, "Losing Trades: {}", result.losing_trades);
    let _ = writeln!(out, "Win Rate: {:.1}%", result.win_rate * 100.0);
    let _ = writeln!(out, "Average Win: ${:.2}", result.avg_win);
    let _ = writeln!(out, "Average Loss: ${:.2}", result.avg_loss);
    let _ = writeln!(out, "Profit Factor: {:.3}", result.profit_factor);

    out
}

/// Fixed-width comparison table across runs.
pub fn comparison_report(results: &[BacktestResult]) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "=== STRATEGY COMPARISON REPORT ===");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{:<20}{:<15}{:<15}{:<15}{:<15}{:<15}",
        "Strategy", "Total Return", "Sharpe", "Max DD", "Win Rate", "Trades"
    );
    let _ = writeln!(out, "{}", "-".repeat(95));

    for result in results {
        let _ = writeln!(
            out,
            "{:<20}{:<15}{:<15}{:<15}{:<15}{:<15}",
            result.strategy_name,
            format!("{:.2}%", result.total_return * 100.0),
            format!("{:.3}", result.sharpe_ratio),
            format!("{:.2}%", result.max_drawdown * 100.0),
            format!("{:.1}%", result.win_rate * 100.0),
            result.total_trades
        );
    }

    out
}
