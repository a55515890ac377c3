//! Command-line client for `exchange-service`'s HTTP API: manual order
//! submission, balance/book/quote lookups, and webhook management for
//! scripting against a running exchange.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "exchange-cli")]
#[command(about = "Command line client for exchange-service")]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    server: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Registers a broker with initial cash and (optionally) holdings.
    RegisterBroker {
        #[arg(long)]
        broker_id: String,
        #[arg(long)]
        cash: Decimal,
        /// Repeatable `SYMBOL:QTY` pair, e.g. `--holding AAPL:10`.
        #[arg(long = "holding", value_parser = parse_holding)]
        holdings: Vec<(String, i64)>,
    },
    /// Shows a broker's cash and holdings.
    Balance {
        #[arg(long)]
        broker_id: String,
    },
    /// Submits a limit or market order.
    Submit {
        #[arg(long)]
        broker_id: String,
        #[arg(long)]
        document_number: String,
        #[arg(long, value_parser = parse_order_type)]
        order_type: OrderType,
        #[arg(long, value_parser = parse_side)]
        side: Side,
        #[arg(long)]
        symbol: String,
        /// Required for limit orders, omitted for market orders.
        #[arg(long)]
        price: Option<Decimal>,
        #[arg(long)]
        quantity: i64,
        /// Limit orders only: seconds from now until the order expires.
        #[arg(long)]
        expires_in_secs: Option<i64>,
    },
    /// Fetches a single order by id.
    Order {
        #[arg(long)]
        order_id: String,
    },
    /// Cancels a resting order.
    Cancel {
        #[arg(long)]
        order_id: String,
    },
    /// Lists a broker's orders, optionally filtered by status.
    Orders {
        #[arg(long)]
        broker_id: String,
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value = "1")]
        page: usize,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Reports the VWAP reference price for a symbol.
    Price {
        #[arg(long)]
        symbol: String,
    },
    /// Reports a depth-limited aggregated book snapshot.
    Book {
        #[arg(long)]
        symbol: String,
        #[arg(long, default_value = "10")]
        depth: usize,
    },
    /// Simulates a market order without placing it.
    Quote {
        #[arg(long)]
        symbol: String,
        #[arg(long, value_parser = parse_side)]
        side: Side,
        #[arg(long)]
        quantity: i64,
    },
    /// Subscribes a broker's webhook url to one or more events.
    Subscribe {
        #[arg(long)]
        broker_id: String,
        #[arg(long)]
        url: String,
        /// Repeatable, e.g. `--event trade.executed --event order.expired`.
        #[arg(long = "event")]
        events: Vec<String>,
    },
    /// Lists a broker's webhook subscriptions.
    Webhooks {
        #[arg(long)]
        broker_id: String,
    },
    /// Deletes a webhook subscription by id.
    Unsubscribe {
        #[arg(long)]
        webhook_id: String,
    },
    /// Checks the service's liveness.
    Health,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Side {
    Bid,
    Ask,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum OrderType {
    Limit,
    Market,
}

fn parse_side(s: &str) -> Result<Side, String> {
    match s.to_lowercase().as_str() {
        "bid" | "buy" => Ok(Side::Bid),
        "ask" | "sell" => Ok(Side::Ask),
        _ => Err(format!("invalid side: {s}. Use 'bid' or 'ask'")),
    }
}

fn parse_order_type(s: &str) -> Result<OrderType, String> {
    match s.to_lowercase().as_str() {
        "limit" => Ok(OrderType::Limit),
        "market" => Ok(OrderType::Market),
        _ => Err(format!("invalid order type: {s}. Use 'limit' or 'market'")),
    }
}

fn parse_holding(s: &str) -> Result<(String, i64), String> {
    let (symbol, qty) = s
        .split_once(':')
        .ok_or_else(|| format!("expected SYMBOL:QTY, got {s:?}"))?;
    let qty: i64 = qty
        .parse()
        .map_err(|_| format!("invalid quantity in holding {s:?}"))?;
    Ok((symbol.to_string(), qty))
}

#[derive(Serialize)]
struct HoldingInputDto {
    symbol: String,
    quantity: i64,
}

#[derive(Serialize)]
struct RegisterBrokerRequestDto {
    broker_id: String,
    initial_cash: Decimal,
    initial_holdings: Vec<HoldingInputDto>,
}

#[derive(Serialize)]
struct SubmitOrderRequestDto {
    order_type: OrderType,
    broker_id: String,
    document_number: String,
    side: Side,
    symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    price: Option<Decimal>,
    quantity: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct UpsertWebhookRequestDto {
    url: String,
    events: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::RegisterBroker { broker_id, cash, holdings } => {
            let body = RegisterBrokerRequestDto {
                broker_id,
                initial_cash: cash,
                initial_holdings: holdings
                    .into_iter()
                    .map(|(symbol, quantity)| HoldingInputDto { symbol, quantity })
                    .collect(),
            };
            post(&client, &format!("{}/brokers", cli.server), &body).await?;
        }

        Commands::Balance { broker_id } => {
            get(&client, &format!("{}/brokers/{broker_id}/balance", cli.server)).await?;
        }

        Commands::Submit {
            broker_id,
            document_number,
            order_type,
            side,
            symbol,
            price,
            quantity,
            expires_in_secs,
        } => {
            let expires_at = expires_in_secs.map(|secs| Utc::now() + chrono::Duration::seconds(secs));
            let body = SubmitOrderRequestDto {
                order_type,
                broker_id,
                document_number,
                side,
                symbol,
                price,
                quantity,
                expires_at,
            };
            post(&client, &format!("{}/orders", cli.server), &body).await?;
        }

        Commands::Order { order_id } => {
            get(&client, &format!("{}/orders/{order_id}", cli.server)).await?;
        }

        Commands::Cancel { order_id } => {
            delete(&client, &format!("{}/orders/{order_id}", cli.server)).await?;
        }

        Commands::Orders { broker_id, status, page, limit } => {
            let mut url = format!("{}/brokers/{broker_id}/orders?page={page}&limit={limit}", cli.server);
            if let Some(status) = status {
                url.push_str(&format!("&status={status}"));
            }
            get(&client, &url).await?;
        }

        Commands::Price { symbol } => {
            get(&client, &format!("{}/stocks/{symbol}/price", cli.server)).await?;
        }

        Commands::Book { symbol, depth } => {
            get(&client, &format!("{}/stocks/{symbol}/book?depth={depth}", cli.server)).await?;
        }

        Commands::Quote { symbol, side, quantity } => {
            let side_str = match side {
                Side::Bid => "bid",
                Side::Ask => "ask",
            };
            get(
                &client,
                &format!("{}/stocks/{symbol}/quote?side={side_str}&quantity={quantity}", cli.server),
            )
            .await?;
        }

        Commands::Subscribe { broker_id, url, events } => {
            let body = UpsertWebhookRequestDto { url, events };
            post(&client, &format!("{}/brokers/{broker_id}/webhooks", cli.server), &body).await?;
        }

        Commands::Webhooks { broker_id } => {
            get(&client, &format!("{}/brokers/{broker_id}/webhooks", cli.server)).await?;
        }

        Commands::Unsubscribe { webhook_id } => {
            delete(&client, &format!("{}/webhooks/{webhook_id}", cli.server)).await?;
        }

        Commands::Health => {
            get(&client, &format!("{}/health", cli.server)).await?;
        }
    }

    Ok(())
}

async fn get(client: &reqwest::Client, url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let response = client.get(url).send().await?;
    print_response(response).await
}

async fn post(
    client: &reqwest::Client,
    url: &str,
    body: &impl Serialize,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = client.post(url).json(body).send().await?;
    print_response(response).await
}

async fn delete(client: &reqwest::Client, url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let response = client.delete(url).send().await?;
    print_response(response).await
}

/// Pretty-prints a response body as JSON if one is present, otherwise just
/// the status line; non-2xx responses are reported the same way since the
/// service always returns a JSON error body.
async fn print_response(response: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = response.status();
    let text = response.text().await?;
    if text.is_empty() {
        println!("{status}");
        return Ok(());
    }
    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Err(_) => println!("{status}: {text}"),
    }
    Ok(())
}
