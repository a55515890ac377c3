//! Exchange service: REST API over the `exchange-core` matching engine.
//!
//! Owns process lifecycle (startup, `SIGINT`/`SIGTERM`-triggered graceful
//! drain), environment-driven configuration, and structured logging. The
//! correctness-critical matching, book, expiry, and dispatch logic all
//! live in `exchange-core`; this binary only validates requests into the
//! shapes it consumes and serializes its responses back to JSON.

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use exchange_core::domain::OrderStatus;
use exchange_core::ids::{OrderId, WebhookId};
use exchange_core::service::{
    broker::RegisterBrokerRequest as CoreRegisterBrokerRequest, broker::HoldingInput,
    order::SubmitOrderRequest as CoreSubmitOrderRequest, webhook::UpsertWebhookRequest as CoreUpsertWebhookRequest,
};
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

mod config;
mod error;
mod state;
mod types;

use config::Settings;
use error::AppError;
use state::AppState;
use types::*;

#[tokio::main]
async fn main() {
    let settings = Settings::load().expect("failed to load configuration");
    init_tracing(&settings.log_level);

    let state = AppState::new(&settings);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    state.start_expiry(shutdown_rx);

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/brokers", post(register_broker))
        .route("/brokers/:broker_id/balance", get(get_balance))
        .route("/brokers/:broker_id/orders", get(list_orders))
        .route("/brokers/:broker_id/webhooks", post(upsert_webhooks).get(list_webhooks))
        .route("/orders", post(submit_order))
        .route("/orders/:order_id", get(get_order).delete(cancel_order))
        .route("/webhooks/:webhook_id", delete(delete_webhook))
        .route("/stocks/:symbol/price", get(get_price))
        .route("/stocks/:symbol/book", get(get_book))
        .route("/stocks/:symbol/quote", get(get_quote))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", settings.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.expect("bind listener");

    info!(%addr, "exchange-service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown_signal(shutdown_tx, settings.shutdown_timeout()))
        .await
        .expect("server error");
}

fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Waits for `SIGINT` or `SIGTERM`, then signals the expiry tick to stop
/// and gives outstanding requests up to `shutdown_timeout` to drain before
/// `axum::serve` returns.
async fn wait_for_shutdown_signal(shutdown_tx: watch::Sender<bool>, shutdown_timeout: Duration) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received, draining");
    let _ = shutdown_tx.send(true);
    tokio::time::sleep(shutdown_timeout).await;
}

async fn health_check() -> impl IntoResponse {
    Json(HealthResponseDto {
        status: "healthy",
        service: "exchange-service",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn register_broker(
    State(state): State<AppState>,
    Json(req): Json<RegisterBrokerRequestDto>,
) -> Result<impl IntoResponse, AppError> {
    let broker = state.broker_service.register(CoreRegisterBrokerRequest {
        broker_id: req.broker_id,
        initial_cash: req.initial_cash,
        initial_holdings: req
            .initial_holdings
            .into_iter()
            .map(|h| HoldingInput {
                symbol: h.symbol,
                quantity: h.quantity,
            })
            .collect(),
    })?;

    let (cash_balance, created_at) = {
        let guard = broker.lock();
        (guard.cash_balance, broker.created_at)
    };

    Ok((
        StatusCode::CREATED,
        Json(BrokerResponseDto {
            broker_id: broker.broker_id.clone(),
            cash_balance: exchange_core::money::minor_to_decimal(cash_balance),
            created_at,
        }),
    ))
}

async fn get_balance(
    State(state): State<AppState>,
    Path(broker_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let balance = state.broker_service.get_balance(&broker_id)?;
    Ok(Json(BalanceResponseDto::from(balance)))
}

async fn submit_order(
    State(state): State<AppState>,
    Json(req): Json<SubmitOrderRequestDto>,
) -> Result<impl IntoResponse, AppError> {
    let order = state
        .order_service
        .submit_order(CoreSubmitOrderRequest {
            order_type: req.order_type,
            broker_id: req.broker_id,
            document_number: req.document_number,
            side: req.side,
            symbol: req.symbol,
            price: req.price,
            quantity: req.quantity,
            expires_at: req.expires_at,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(order_to_dto(&order))))
}

async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let order_id: OrderId = order_id
        .parse()
        .map_err(|_| AppError::BadRequest("order_id must be a valid UUID".to_string()))?;
    let order = state.order_service.get_order(order_id)?;
    Ok(Json(order_to_dto(&order)))
}

async fn cancel_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let order_id: OrderId = order_id
        .parse()
        .map_err(|_| AppError::BadRequest("order_id must be a valid UUID".to_string()))?;
    let order = state.order_service.cancel_order(order_id).await?;
    Ok(Json(order_to_dto(&order)))
}

async fn list_orders(
    State(state): State<AppState>,
    Path(broker_id): Path<String>,
    Query(query): Query<OrderListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 200);
    let status: Option<OrderStatus> = query.status;

    let (orders, total) = state.order_service.list_orders(&broker_id, status, page, limit)?;

    Ok(Json(OrderListResponseDto {
        orders: orders.iter().map(order_to_dto).collect(),
        total,
        page,
        limit,
    }))
}

async fn get_price(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let price = state.stock_service.get_price(&symbol)?;
    Ok(Json(PriceResponseDto::from(price)))
}

async fn get_book(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(query): Query<BookQuery>,
) -> Result<impl IntoResponse, AppError> {
    let depth = query.depth.unwrap_or(10);
    let book = state.stock_service.get_book(&symbol, depth)?;
    Ok(Json(BookResponseDto::from(book)))
}

async fn get_quote(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(query): Query<QuoteQuery>,
) -> Result<impl IntoResponse, AppError> {
    let quote = state.stock_service.get_quote(&symbol, query.side, query.quantity)?;
    Ok(Json(QuoteResponseDto::from(quote)))
}

async fn upsert_webhooks(
    State(state): State<AppState>,
    Path(broker_id): Path<String>,
    Json(req): Json<UpsertWebhookRequestDto>,
) -> Result<impl IntoResponse, AppError> {
    let (webhooks, created) = state.webhook_service.upsert(CoreUpsertWebhookRequest {
        broker_id,
        url: req.url,
        events: req.events,
    })?;

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((
        status,
        Json(UpsertWebhookResponseDto {
            webhooks: webhooks.into_iter().map(WebhookResponseDto::from).collect(),
            created,
        }),
    ))
}

async fn list_webhooks(
    State(state): State<AppState>,
    Path(broker_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let webhooks = state.webhook_service.list(&broker_id)?;
    Ok(Json(WebhookListResponseDto {
        webhooks: webhooks.into_iter().map(WebhookResponseDto::from).collect(),
    }))
}

async fn delete_webhook(
    State(state): State<AppState>,
    Path(webhook_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let webhook_id: WebhookId = webhook_id
        .parse()
        .map_err(|_| AppError::BadRequest("webhook_id must be a valid UUID".to_string()))?;
    state.webhook_service.delete(webhook_id)?;
    Ok(StatusCode::NO_CONTENT)
}
