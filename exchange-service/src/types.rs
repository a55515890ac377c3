//! Request/response DTOs for the HTTP surface. Monetary fields cross this
//! boundary as `Decimal`; the core only ever sees integer minor units.

use chrono::{DateTime, Utc};
use exchange_core::domain::{OrderSide, OrderStatus, OrderType, SharedOrder, Trade};
use exchange_core::ids::{OrderId, TradeId, WebhookId};
use exchange_core::money::minor_to_decimal;
use exchange_core::service::{
    BalanceResponse, BookPriceLevel, BookResponse, PriceResponse, QuotePriceLevel, QuoteResponse,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize)]
pub struct HoldingInputDto {
    pub symbol: String,
    pub quantity: i64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RegisterBrokerRequestDto {
    pub broker_id: String,
    pub initial_cash: Decimal,
    #[serde(default)]
    pub initial_holdings: Vec<HoldingInputDto>,
}

#[derive(Clone, Debug, Serialize)]
pub struct BrokerResponseDto {
    pub broker_id: String,
    pub cash_balance: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct HoldingBalanceDto {
    pub quantity: i64,
    pub reserved_quantity: i64,
    pub available_quantity: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct BalanceResponseDto {
    pub broker_id: String,
    pub cash_balance: Decimal,
    pub reserved_cash: Decimal,
    pub available_cash: Decimal,
    pub holdings: std::collections::BTreeMap<String, HoldingBalanceDto>,
    pub updated_at: DateTime<Utc>,
}

impl From<BalanceResponse> for BalanceResponseDto {
    fn from(resp: BalanceResponse) -> Self {
        Self {
            broker_id: resp.broker_id,
            cash_balance: minor_to_decimal(resp.cash_balance),
            reserved_cash: minor_to_decimal(resp.reserved_cash),
            available_cash: minor_to_decimal(resp.available_cash),
            holdings: resp
                .holdings
                .into_iter()
                .map(|(symbol, h)| {
                    (
                        symbol,
                        HoldingBalanceDto {
                            quantity: h.symbol_quantity,
                            reserved_quantity: h.reserved_quantity,
                            available_quantity: h.available_quantity,
                        },
                    )
                })
                .collect(),
            updated_at: resp.updated_at,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct SubmitOrderRequestDto {
    pub order_type: OrderType,
    pub broker_id: String,
    pub document_number: String,
    pub side: OrderSide,
    pub symbol: String,
    pub price: Option<Decimal>,
    pub quantity: i64,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct TradeDto {
    pub trade_id: TradeId,
    pub order_id: OrderId,
    pub price: Decimal,
    pub quantity: i64,
    pub executed_at: DateTime<Utc>,
}

impl From<&Trade> for TradeDto {
    fn from(t: &Trade) -> Self {
        Self {
            trade_id: t.trade_id,
            order_id: t.order_id,
            price: minor_to_decimal(t.price),
            quantity: t.quantity,
            executed_at: t.executed_at,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct OrderResponseDto {
    pub order_id: OrderId,
    pub order_type: OrderType,
    pub broker_id: String,
    pub document_number: String,
    pub side: OrderSide,
    pub symbol: String,
    pub price: Decimal,
    pub quantity: i64,
    pub filled_quantity: i64,
    pub remaining_quantity: i64,
    pub cancelled_quantity: i64,
    pub status: OrderStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
    pub average_price: Option<Decimal>,
    pub trades: Vec<TradeDto>,
}

/// Copies a snapshot of `order` out from behind its lock for serialization.
pub fn order_to_dto(order: &SharedOrder) -> OrderResponseDto {
    let guard = order.lock().expect("order lock poisoned");
    OrderResponseDto {
        order_id: guard.order_id,
        order_type: guard.order_type,
        broker_id: guard.broker_id.clone(),
        document_number: guard.document_number.clone(),
        side: guard.side,
        symbol: guard.symbol.clone(),
        price: minor_to_decimal(guard.price),
        quantity: guard.quantity,
        filled_quantity: guard.filled_quantity,
        remaining_quantity: guard.remaining_quantity,
        cancelled_quantity: guard.cancelled_quantity,
        status: guard.status,
        expires_at: guard.expires_at,
        created_at: guard.created_at,
        cancelled_at: guard.cancelled_at,
        expired_at: guard.expired_at,
        average_price: guard.average_price().map(minor_to_decimal),
        trades: guard.trades.iter().map(TradeDto::from).collect(),
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<OrderStatus>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Clone, Debug, Serialize)]
pub struct OrderListResponseDto {
    pub orders: Vec<OrderResponseDto>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct PriceResponseDto {
    pub symbol: String,
    pub current_price: Option<Decimal>,
    pub window: String,
    pub trades_in_window: usize,
    pub last_trade_at: Option<DateTime<Utc>>,
}

impl From<PriceResponse> for PriceResponseDto {
    fn from(resp: PriceResponse) -> Self {
        Self {
            symbol: resp.symbol,
            current_price: resp.current_price.map(minor_to_decimal),
            window: resp.window,
            trades_in_window: resp.trades_in_window,
            last_trade_at: resp.last_trade_at,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct BookQuery {
    pub depth: Option<usize>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PriceLevelDto {
    pub price: Decimal,
    pub total_quantity: i64,
    pub order_count: usize,
}

impl From<BookPriceLevel> for PriceLevelDto {
    fn from(pl: BookPriceLevel) -> Self {
        Self {
            price: minor_to_decimal(pl.price),
            total_quantity: pl.total_quantity,
            order_count: pl.order_count,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct BookResponseDto {
    pub symbol: String,
    pub bids: Vec<PriceLevelDto>,
    pub asks: Vec<PriceLevelDto>,
    pub spread: Option<Decimal>,
    pub snapshot_at: DateTime<Utc>,
}

impl From<BookResponse> for BookResponseDto {
    fn from(resp: BookResponse) -> Self {
        Self {
            symbol: resp.symbol,
            bids: resp.bids.into_iter().map(PriceLevelDto::from).collect(),
            asks: resp.asks.into_iter().map(PriceLevelDto::from).collect(),
            spread: resp.spread.map(minor_to_decimal),
            snapshot_at: resp.snapshot_at,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct QuoteQuery {
    pub side: OrderSide,
    pub quantity: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct QuotePriceLevelDto {
    pub price: Decimal,
    pub quantity: i64,
}

impl From<QuotePriceLevel> for QuotePriceLevelDto {
    fn from(pl: QuotePriceLevel) -> Self {
        Self {
            price: minor_to_decimal(pl.price),
            quantity: pl.quantity,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct QuoteResponseDto {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity_requested: i64,
    pub quantity_available: i64,
    pub fully_fillable: bool,
    pub estimated_avg_price: Option<Decimal>,
    pub estimated_total: Option<Decimal>,
    pub price_levels: Vec<QuotePriceLevelDto>,
    pub quoted_at: DateTime<Utc>,
}

impl From<QuoteResponse> for QuoteResponseDto {
    fn from(resp: QuoteResponse) -> Self {
        Self {
            symbol: resp.symbol,
            side: resp.side,
            quantity_requested: resp.quantity_requested,
            quantity_available: resp.quantity_available,
            fully_fillable: resp.fully_fillable,
            estimated_avg_price: resp.estimated_avg_price.map(minor_to_decimal),
            estimated_total: resp.estimated_total.map(minor_to_decimal),
            price_levels: resp.price_levels.into_iter().map(QuotePriceLevelDto::from).collect(),
            quoted_at: resp.quoted_at,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct UpsertWebhookRequestDto {
    pub url: String,
    pub events: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct WebhookResponseDto {
    pub webhook_id: WebhookId,
    pub broker_id: String,
    pub event: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<exchange_core::domain::Webhook> for WebhookResponseDto {
    fn from(w: exchange_core::domain::Webhook) -> Self {
        Self {
            webhook_id: w.webhook_id,
            broker_id: w.broker_id,
            event: w.event,
            url: w.url,
            created_at: w.created_at,
            updated_at: w.updated_at,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct UpsertWebhookResponseDto {
    pub webhooks: Vec<WebhookResponseDto>,
    pub created: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct WebhookListResponseDto {
    pub webhooks: Vec<WebhookResponseDto>,
}

#[derive(Clone, Debug, Serialize)]
pub struct HealthResponseDto {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}
