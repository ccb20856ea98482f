use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use strata_core::prelude::{
    AssetBalance, BalanceFrame, Bar, BookFrame, Event, FundingFrame, KlineFrame, MarkPriceFrame, MarketSide,
    OrderUpdateFrame, PositionFrame, TickerFrame, TradeFrame, VenueName,
};
use strata_okx::{
    OkxWsAccount, OkxWsBookSnapshot, OkxWsEnvelope, OkxWsFundingRate, OkxWsMarkPrice, OkxWsOrder, OkxWsPosition,
    OkxWsTicker, OkxWsTrade, bar_param_to_interval,
};

use super::ParseError;

const VENUE: VenueName = VenueName::Okx;

pub fn parse(text: &str, timestamp_ns: u64) -> Result<Vec<Event>, ParseError> {
    let envelope: OkxWsEnvelope = serde_json::from_str(text).map_err(|e| ParseError::Json(e.to_string()))?;

    // Control replies: subscribe acks, login acks, errors.
    if let Some(event) = &envelope.event {
        match event.as_str() {
            "error" => warn!(target: "ingestor::okx", "venue error: {}", text),
            "login" => debug!(target: "ingestor::okx", "login ack: {}", text),
            other => debug!(target: "ingestor::okx", "{} ack", other),
        }
        return Ok(vec![]);
    }

    let arg = envelope.arg.ok_or_else(|| ParseError::Missing("arg".to_string()))?;
    let data = envelope
        .data
        .and_then(|d| if let Value::Array(rows) = d { Some(rows) } else { None })
        .ok_or_else(|| ParseError::Missing("data".to_string()))?;

    match arg.channel.as_str() {
        "trades" => parse_rows::<OkxWsTrade>(&data, |trade| {
            let side = if trade.side == "sell" { MarketSide::Sell } else { MarketSide::Buy };
            Event::TradeUpdate(Arc::new(TradeFrame {
                venue: VENUE,
                symbol: trade.inst_id.clone(),
                timestamp_ms: trade.ts,
                timestamp_ns,
                price: trade.px,
                quantity: trade.sz,
                side,
                trade_id: trade.trade_id.clone(),
            }))
        }),
        "tickers" => parse_rows::<OkxWsTicker>(&data, |ticker| {
            Event::TickerUpdate(Arc::new(TickerFrame {
                venue: VENUE,
                symbol: ticker.inst_id.clone(),
                timestamp_ms: ticker.ts,
                timestamp_ns,
                last: ticker.last,
                bid: ticker.bid_px,
                bid_quantity: ticker.bid_sz,
                ask: ticker.ask_px,
                ask_quantity: ticker.ask_sz,
            }))
        }),
        "books5" | "books" => {
            let symbol = arg.inst_id.clone().ok_or_else(|| ParseError::Missing("instId".to_string()))?;
            parse_rows::<OkxWsBookSnapshot>(&data, |book| {
                Event::BookUpdate(Arc::new(BookFrame {
                    venue: VENUE,
                    symbol: symbol.clone(),
                    timestamp_ms: book.ts,
                    timestamp_ns,
                    bids: OkxWsBookSnapshot::levels(&book.bids),
                    asks: OkxWsBookSnapshot::levels(&book.asks),
                }))
            })
        }
        "funding-rate" => parse_rows::<OkxWsFundingRate>(&data, |funding| {
            Event::FundingUpdate(Arc::new(FundingFrame {
                venue: VENUE,
                symbol: funding.inst_id.clone(),
                timestamp_ms: funding.ts,
                timestamp_ns,
                funding_rate: funding.funding_rate,
                next_funding_time_ms: funding.next_funding_time,
            }))
        }),
        "mark-price" => parse_rows::<OkxWsMarkPrice>(&data, |mark| {
            Event::MarkPriceUpdate(Arc::new(MarkPriceFrame {
                venue: VENUE,
                symbol: mark.inst_id.clone(),
                timestamp_ms: mark.ts,
                timestamp_ns,
                mark_price: mark.mark_px,
            }))
        }),
        "orders" => parse_rows::<OkxWsOrder>(&data, |order| {
            let side = match order.side.as_deref() {
                Some("sell") => Some(MarketSide::Sell),
                Some("buy") => Some(MarketSide::Buy),
                _ => None,
            };
            let client_order_id = (!order.cl_ord_id.is_empty()).then(|| order.cl_ord_id.clone());
            Event::OrderUpdate(Arc::new(OrderUpdateFrame {
                venue: VENUE,
                symbol: order.inst_id.clone(),
                timestamp_ms: order.u_time,
                timestamp_ns,
                exchange_order_id: order.ord_id.clone(),
                client_order_id,
                status: order.state.clone(),
                side,
                price: order.px,
                quantity: order.sz,
                filled_quantity: order.acc_fill_sz,
            }))
        }),
        "account" => parse_rows::<OkxWsAccount>(&data, |account| {
            let balances = account
                .details
                .iter()
                .map(|detail| AssetBalance {
                    asset: detail.ccy.clone(),
                    total: detail.cash_bal,
                    available: detail.avail_bal,
                })
                .collect();
            Event::BalanceUpdate(Arc::new(BalanceFrame {
                venue: VENUE,
                timestamp_ms: account.u_time,
                timestamp_ns,
                balances,
            }))
        }),
        "positions" => parse_rows::<OkxWsPosition>(&data, |position| {
            Event::PositionUpdate(Arc::new(PositionFrame {
                venue: VENUE,
                symbol: position.inst_id.clone(),
                timestamp_ms: position.u_time,
                timestamp_ns,
                position_side: position.pos_side.clone().unwrap_or_else(|| "net".to_string()),
                quantity: position.pos,
                entry_price: position.avg_px,
                unrealized_pnl: position.upl,
            }))
        }),
        channel if channel.starts_with("candle") => {
            let symbol = arg.inst_id.clone().ok_or_else(|| ParseError::Missing("instId".to_string()))?;
            parse_candles(channel, &symbol, &data, timestamp_ns)
        }
        other => Err(ParseError::Unsupported(other.to_string())),
    }
}

fn parse_rows<T: serde::de::DeserializeOwned>(
    rows: &[Value],
    mut convert: impl FnMut(&T) -> Event,
) -> Result<Vec<Event>, ParseError> {
    let mut events = Vec::with_capacity(rows.len());
    for row in rows {
        let typed: T = serde_json::from_value(row.clone()).map_err(|e| ParseError::Json(e.to_string()))?;
        events.push(convert(&typed));
    }
    Ok(events)
}

/// Candle rows stay positional: `[ts, o, h, l, c, vol, ..., confirm]`.
fn parse_candles(channel: &str, symbol: &str, rows: &[Value], ns: u64) -> Result<Vec<Event>, ParseError> {
    let interval = bar_param_to_interval(channel.trim_start_matches("candle"))
        .ok_or_else(|| ParseError::Unsupported(channel.to_string()))?;

    let mut events = Vec::with_capacity(rows.len());
    for row in rows {
        let cells = row
            .as_array()
            .ok_or_else(|| ParseError::Missing("candle row".to_string()))?;
        if cells.len() < 6 {
            return Err(ParseError::Missing("candle cells".to_string()));
        }
        let cell = |i: usize| -> Result<f64, ParseError> {
            cells[i]
                .as_str()
                .ok_or_else(|| ParseError::Missing(format!("candle cell {}", i)))?
                .parse::<f64>()
                .map_err(|e| ParseError::Json(format!("candle cell {}: {}", i, e)))
        };
        let timestamp_ms = cells[0]
            .as_str()
            .ok_or_else(|| ParseError::Missing("candle ts".to_string()))?
            .parse::<i64>()
            .map_err(|e| ParseError::Json(format!("candle ts: {}", e)))?;
        // The confirm flag is the last cell: "1" marks a closed bar.
        let closed = cells.last().and_then(|c| c.as_str()) == Some("1");

        let bar = Bar::new(timestamp_ms, cell(1)?, cell(2)?, cell(3)?, cell(4)?, cell(5)?);
        let frame = Arc::new(KlineFrame {
            venue: VENUE,
            symbol: symbol.to_string(),
            interval,
            timestamp_ms,
            timestamp_ns: ns,
            bar,
            closed,
        });
        events.push(if closed {
            Event::KlineClosed(frame)
        } else {
            Event::KlineUpdate(frame)
        });
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::prelude::{EventType, Interval};

    #[test]
    fn test_parse_trade() {
        let json = r#"{"arg":{"channel":"trades","instId":"BTC-USDT-SWAP"},"data":[{"instId":"BTC-USDT-SWAP","tradeId":"1216801608","px":"93630","sz":"2.1","side":"buy","ts":"1735689659701","count":"1"}]}"#;
        let events = parse(json, 42).unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::TradeUpdate(t) => {
                assert_eq!(t.symbol, "BTC-USDT-SWAP");
                assert_eq!(t.price, 93630.0);
                assert_eq!(t.side, MarketSide::Buy);
                assert_eq!(t.timestamp_ns, 42);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_closed_candle() {
        let json = r#"{"arg":{"channel":"candle1m","instId":"BTC-USDT-SWAP"},"data":[["1735689600000","93630.1","93700","93500","93650.5","2100.5","196.7","18421000","1"]]}"#;
        let events = parse(json, 0).unwrap();
        match &events[0] {
            Event::KlineClosed(k) => {
                assert_eq!(k.interval, Interval::M1);
                assert!(k.closed);
                assert_eq!(k.bar.timestamp_ms, 1_735_689_600_000);
                assert_eq!(k.bar.close, 93650.5);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_unconfirmed_candle_is_update() {
        let json = r#"{"arg":{"channel":"candle1m","instId":"BTC-USDT-SWAP"},"data":[["1735689600000","93630.1","93700","93500","93650.5","2100.5","196.7","18421000","0"]]}"#;
        let events = parse(json, 0).unwrap();
        assert_eq!(events[0].event_type(), EventType::KlineUpdate);
    }

    #[test]
    fn test_subscribe_ack_yields_nothing() {
        let json = r#"{"event":"subscribe","arg":{"channel":"trades","instId":"BTC-USDT-SWAP"}}"#;
        assert!(parse(json, 0).unwrap().is_empty());
    }

    #[test]
    fn test_parse_order_update() {
        let json = r#"{"arg":{"channel":"orders","instType":"SWAP"},"data":[{"instId":"BTC-USDT-SWAP","ordId":"312269865356374016","clOrdId":"abc1","state":"filled","side":"buy","px":"93000","sz":"1","accFillSz":"1","uTime":"1735689659701"}]}"#;
        let events = parse(json, 0).unwrap();
        match &events[0] {
            Event::OrderUpdate(o) => {
                assert_eq!(o.status, "filled");
                assert_eq!(o.client_order_id.as_deref(), Some("abc1"));
                assert_eq!(o.filled_quantity, 1.0);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_books5() {
        let json = r#"{"arg":{"channel":"books5","instId":"BTC-USDT-SWAP"},"data":[{"asks":[["93650.5","5","0","2"],["93651","1","0","1"]],"bids":[["93650","3","0","1"]],"ts":"1735689659701"}]}"#;
        let events = parse(json, 0).unwrap();
        match &events[0] {
            Event::BookUpdate(b) => {
                assert_eq!(b.asks.len(), 2);
                assert_eq!(b.bids[0], [93650.0, 3.0]);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_account_snapshot() {
        let json = r#"{"arg":{"channel":"account"},"data":[{"details":[{"ccy":"USDT","cashBal":"10000.5","availBal":"9000.1"}],"uTime":"1735689659701"}]}"#;
        let events = parse(json, 0).unwrap();
        match &events[0] {
            Event::BalanceUpdate(b) => {
                assert_eq!(b.balances[0].asset, "USDT");
                assert_eq!(b.balances[0].total, 10000.5);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_bad_json_is_an_error_not_a_panic() {
        assert!(parse("{not json", 0).is_err());
        assert!(parse(r#"{"arg":{"channel":"trades"},"data":[{}]}"#, 0).is_err());
    }
}
