use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::business_logic::reversal::{ReversalSignal, SignalType};
use crate::business_logic::swings::{SwingKind, SwingPoint};
use crate::errors::AppError;
use crate::models::candle::Candle;

/// Swing points listed in a signal message
const RECENT_SWINGS: usize = 5;

/// Delivers a rendered message. Failures are reported, never retried.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_text(&self, text: &str) -> Result<(), AppError>;
}

#[derive(Debug, Serialize)]
struct TextMessage<'a> {
    msg_type: &'static str,
    content: TextContent<'a>,
}

#[derive(Debug, Serialize)]
struct TextContent<'a> {
    text: &'a str,
}

/// Feishu (Lark) custom-bot webhook
#[derive(Clone)]
pub struct FeishuNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl FeishuNotifier {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
        {
            Ok(client) => client,
            Err(err) => {
                tracing::warn!(
                    "Failed to build webhook client with timeout, using defaults: {}",
                    err
                );
                reqwest::Client::new()
            }
        };
        Self {
            client,
            webhook_url: webhook_url.into(),
        }
    }
}

#[async_trait]
impl Notifier for FeishuNotifier {
    async fn send_text(&self, text: &str) -> Result<(), AppError> {
        let payload = TextMessage {
            msg_type: "text",
            content: TextContent { text },
        };

        let body = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| AppError::Delivery(err.to_string()))?
            .json::<serde_json::Value>()
            .await
            .map_err(|err| AppError::Delivery(err.to_string()))?;

        check_feishu_response(&body)?;
        tracing::info!("Feishu notification delivered");
        Ok(())
    }
}

/// Used when no webhook is configured: the message only goes to the log.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_text(&self, text: &str) -> Result<(), AppError> {
        tracing::warn!("No webhook configured, notification logged only:\n{}", text);
        Ok(())
    }
}

/// Feishu answers 200 even on rejection; success is `StatusCode == 0` or `code == 0`.
fn check_feishu_response(body: &serde_json::Value) -> Result<(), AppError> {
    let ok = [body.get("StatusCode"), body.get("code")]
        .into_iter()
        .flatten()
        .any(|code| code.as_i64() == Some(0));

    if ok {
        Ok(())
    } else {
        Err(AppError::Delivery(format!("webhook rejected message: {body}")))
    }
}

pub fn trading_advice(signal_type: SignalType, confidence: f64) -> &'static str {
    match (signal_type, confidence) {
        (SignalType::Bullish, c) if c >= 0.7 => "Consider buying: strong bullish reversal",
        (SignalType::Bullish, c) if c >= 0.5 => "Lean bullish: wait for follow-through before buying",
        (SignalType::Bearish, c) if c >= 0.7 => "Consider selling or tightening stops: strong bearish reversal",
        (SignalType::Bearish, c) if c >= 0.5 => "Lean bearish: wait for follow-through before selling",
        _ => "Stay on the sidelines: weak signal, wait for confirmation",
    }
}

pub fn format_timestamp(timestamp_ms: u64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms as i64)
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

fn format_price(price: f64) -> String {
    format!("{:.2}", price)
}

/// Detection context rendered below the signal itself
#[derive(Debug, Clone, Copy)]
pub struct SignalContext<'a> {
    pub swings: &'a [SwingPoint],
    pub candles: &'a [Candle],
    pub window_hours: u64,
}

pub fn render_signal(symbol: &str, signal: &ReversalSignal, context: &SignalContext<'_>) -> String {
    let pattern = &signal.triggering_pattern;
    let (title, arrow) = match signal.signal_type {
        SignalType::Bullish => ("Bullish reversal", "↗"),
        SignalType::Bearish => ("Bearish reversal", "↘"),
    };

    let mut lines = vec![
        format!("[{title} {arrow}] {symbol} N-pattern reversal"),
        String::new(),
        format!(
            "Pattern: {} -> {}",
            String::from(signal.from_pattern_kind),
            String::from(signal.to_pattern_kind)
        ),
        format!("Confidence: {:.1}%", signal.confidence * 100.0),
        format!("Trigger price: ${}", format_price(pattern.end_price())),
        format!(
            "Pattern range: ${} - ${}",
            format_price(pattern.low_price()),
            format_price(pattern.high_price())
        ),
        format!("Move: {:+.2}%", signal.magnitude * 100.0),
        format!("Time: {}", format_timestamp(signal.timestamp)),
        String::new(),
        format!(
            "Advice: {}",
            trading_advice(signal.signal_type, signal.confidence)
        ),
        String::new(),
        "Recent swing points:".to_string(),
    ];
    lines.extend(format_swing_points(context.swings));
    lines.push(String::new());
    lines.push("Candles:".to_string());
    lines.extend(format_candle_summary(context.candles, context.window_hours));
    lines.push(String::new());
    lines.push(format!("Analysis window: {}h", context.window_hours));
    lines.push(format!("Candles used: {}", context.candles.len()));

    lines.join("\n")
}

fn format_swing_points(swings: &[SwingPoint]) -> Vec<String> {
    if swings.is_empty() {
        return vec!["  none".to_string()];
    }

    swings[swings.len().saturating_sub(RECENT_SWINGS)..]
        .iter()
        .map(|point| {
            let marker = match point.kind {
                SwingKind::High => "HIGH",
                SwingKind::Low => "LOW ",
            };
            format!(
                "  {marker} ${} ({})",
                format_price(point.price),
                format_timestamp(point.timestamp)
            )
        })
        .collect()
}

fn format_candle_summary(candles: &[Candle], window_hours: u64) -> Vec<String> {
    let Some(latest) = candles.last() else {
        return vec!["  none".to_string()];
    };
    let high = candles.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    let low = candles.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);

    vec![
        format!(
            "  Latest: O {} H {} L {} C {}",
            format_price(latest.open),
            format_price(latest.high),
            format_price(latest.low),
            format_price(latest.close)
        ),
        format!("  {window_hours}h high: ${}", format_price(high)),
        format!("  {window_hours}h low: ${}", format_price(low)),
        format!("  {window_hours}h range: ${}", format_price(high - low)),
    ]
}

pub fn render_test_message(symbol: &str, candle_count: usize, latest_close: Option<f64>) -> String {
    let price = latest_close
        .map(|p| format!("${}", format_price(p)))
        .unwrap_or_else(|| "n/a".to_string());
    format!(
        "[goldscreener] connectivity check\n{symbol}: {candle_count} candles fetched, last close {price}\nSent at {}",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    )
}
