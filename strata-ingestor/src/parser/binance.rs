use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use strata_binance::{
    BinanceAccountUpdate, BinanceAggTrade, BinanceBookTicker, BinanceContinuousKline, BinanceDepthUpdate,
    BinanceMarkPrice, BinanceOrderTradeUpdate, BinanceWsEnvelope,
};
use strata_core::prelude::{
    AssetBalance, BalanceFrame, Bar, BookFrame, Event, FundingFrame, Interval, KlineFrame, MarkPriceFrame, MarketSide,
    OrderUpdateFrame, PositionFrame, TickerFrame, TradeFrame, VenueName,
};

use super::ParseError;

const VENUE: VenueName = VenueName::Binance;

pub fn parse(text: &str, timestamp_ns: u64) -> Result<Vec<Event>, ParseError> {
    let raw: Value = serde_json::from_str(text).map_err(|e| ParseError::Json(e.to_string()))?;
    let envelope: BinanceWsEnvelope =
        serde_json::from_value(raw.clone()).map_err(|e| ParseError::Json(e.to_string()))?;
    let payload = envelope.payload(raw);

    // SUBSCRIBE acks look like {"result":null,"id":1}.
    let Some(event_type) = payload.get("e").and_then(|e| e.as_str()) else {
        debug!(target: "ingestor::binance", "control reply: {}", text);
        return Ok(vec![]);
    };

    match event_type {
        "aggTrade" => {
            let trade: BinanceAggTrade = typed(&payload)?;
            Ok(vec![Event::TradeUpdate(Arc::new(TradeFrame {
                venue: VENUE,
                symbol: trade.symbol.clone(),
                timestamp_ms: trade.trade_time,
                timestamp_ns,
                price: trade.price,
                quantity: trade.quantity,
                side: if trade.buyer_is_maker { MarketSide::Sell } else { MarketSide::Buy },
                trade_id: trade.agg_trade_id.to_string(),
            }))])
        }
        "bookTicker" => {
            let ticker: BinanceBookTicker = typed(&payload)?;
            let timestamp_ms = ticker
                .event_time
                .or(ticker.transaction_time)
                .ok_or_else(|| ParseError::Missing("E".to_string()))?;
            Ok(vec![Event::TickerUpdate(Arc::new(TickerFrame {
                venue: VENUE,
                symbol: ticker.symbol.clone(),
                timestamp_ms,
                timestamp_ns,
                last: (ticker.bid_price + ticker.ask_price) / 2.0,
                bid: ticker.bid_price,
                bid_quantity: ticker.bid_quantity,
                ask: ticker.ask_price,
                ask_quantity: ticker.ask_quantity,
            }))])
        }
        "depthUpdate" => {
            let depth: BinanceDepthUpdate = typed(&payload)?;
            Ok(vec![Event::BookUpdate(Arc::new(BookFrame {
                venue: VENUE,
                symbol: depth.symbol.clone(),
                timestamp_ms: depth.event_time,
                timestamp_ns,
                bids: BinanceDepthUpdate::levels(&depth.bids),
                asks: BinanceDepthUpdate::levels(&depth.asks),
            }))])
        }
        "continuous_kline" => {
            let update: BinanceContinuousKline = typed(&payload)?;
            let interval = Interval::from_str(&update.kline.interval)
                .map_err(|_| ParseError::Unsupported(format!("interval {}", update.kline.interval)))?;
            let bar = Bar::new(
                update.kline.open_time,
                update.kline.open,
                update.kline.high,
                update.kline.low,
                update.kline.close,
                update.kline.volume,
            );
            let frame = Arc::new(KlineFrame {
                venue: VENUE,
                symbol: update.pair.clone(),
                interval,
                timestamp_ms: update.event_time,
                timestamp_ns,
                bar,
                closed: update.kline.closed,
            });
            Ok(vec![if update.kline.closed {
                Event::KlineClosed(frame)
            } else {
                Event::KlineUpdate(frame)
            }])
        }
        // Mark price pushes carry the funding rate too; both frames come
        // out when the rate is present.
        "markPriceUpdate" => {
            let mark: BinanceMarkPrice = typed(&payload)?;
            let mut events = vec![Event::MarkPriceUpdate(Arc::new(MarkPriceFrame {
                venue: VENUE,
                symbol: mark.symbol.clone(),
                timestamp_ms: mark.event_time,
                timestamp_ns,
                mark_price: mark.mark_price,
            }))];
            if let Some(funding_rate) = mark.funding_rate {
                events.push(Event::FundingUpdate(Arc::new(FundingFrame {
                    venue: VENUE,
                    symbol: mark.symbol,
                    timestamp_ms: mark.event_time,
                    timestamp_ns,
                    funding_rate,
                    next_funding_time_ms: mark.next_funding_time,
                })));
            }
            Ok(events)
        }
        "ORDER_TRADE_UPDATE" => {
            let update: BinanceOrderTradeUpdate = typed(&payload)?;
            let order = update.order;
            let side = match order.side.as_deref() {
                Some("SELL") => Some(MarketSide::Sell),
                Some("BUY") => Some(MarketSide::Buy),
                _ => None,
            };
            let client_order_id = (!order.client_order_id.is_empty()).then(|| order.client_order_id.clone());
            Ok(vec![Event::OrderUpdate(Arc::new(OrderUpdateFrame {
                venue: VENUE,
                symbol: order.symbol,
                timestamp_ms: update.event_time,
                timestamp_ns,
                exchange_order_id: order.order_id.to_string(),
                client_order_id,
                status: order.status,
                side,
                price: order.price,
                quantity: order.quantity,
                filled_quantity: order.filled_quantity,
            }))])
        }
        "ACCOUNT_UPDATE" => {
            let update: BinanceAccountUpdate = typed(&payload)?;
            let mut events = Vec::new();
            if !update.account.balances.is_empty() {
                let balances = update
                    .account
                    .balances
                    .iter()
                    .map(|balance| AssetBalance {
                        asset: balance.asset.clone(),
                        total: balance.wallet_balance,
                        available: balance.cross_wallet,
                    })
                    .collect();
                events.push(Event::BalanceUpdate(Arc::new(BalanceFrame {
                    venue: VENUE,
                    timestamp_ms: update.event_time,
                    timestamp_ns,
                    balances,
                })));
            }
            for position in &update.account.positions {
                events.push(Event::PositionUpdate(Arc::new(PositionFrame {
                    venue: VENUE,
                    symbol: position.symbol.clone(),
                    timestamp_ms: update.event_time,
                    timestamp_ns,
                    position_side: position.position_side.clone().unwrap_or_else(|| "BOTH".to_string()),
                    quantity: position.position_amount,
                    entry_price: position.entry_price,
                    unrealized_pnl: position.unrealized_pnl,
                })));
            }
            Ok(events)
        }
        "listenKeyExpired" => Ok(vec![]),
        other => Err(ParseError::Unsupported(other.to_string())),
    }
}

fn typed<T: serde::de::DeserializeOwned>(payload: &Value) -> Result<T, ParseError> {
    serde_json::from_value(payload.clone()).map_err(|e| ParseError::Json(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::prelude::EventType;

    #[test]
    fn test_parse_agg_trade_combined() {
        let json = r#"{"stream":"btcusdt@aggTrade","data":{"e":"aggTrade","E":1735689659701,"s":"BTCUSDT","a":26129,"p":"93630.10","q":"0.5","f":100,"l":105,"T":1735689659690,"m":true}}"#;
        let events = parse(json, 7).unwrap();
        match &events[0] {
            Event::TradeUpdate(t) => {
                assert_eq!(t.symbol, "BTCUSDT");
                assert_eq!(t.side, MarketSide::Sell);
                assert_eq!(t.timestamp_ms, 1_735_689_659_690);
                assert_eq!(t.timestamp_ns, 7);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_closed_continuous_kline() {
        let json = r#"{"stream":"btcusdt_perpetual@continuousKline_1m","data":{"e":"continuous_kline","E":1735689660002,"ps":"BTCUSDT","ct":"PERPETUAL","k":{"t":1735689600000,"T":1735689659999,"i":"1m","o":"93630.10","h":"93700.00","l":"93500.00","c":"93650.50","v":"2100.500","x":true}}}"#;
        let events = parse(json, 0).unwrap();
        match &events[0] {
            Event::KlineClosed(k) => {
                assert_eq!(k.symbol, "BTCUSDT");
                assert_eq!(k.interval, Interval::M1);
                assert_eq!(k.bar.timestamp_ms, 1_735_689_600_000);
                assert!(k.closed);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_open_kline_is_update() {
        let json = r#"{"e":"continuous_kline","E":1735689630002,"ps":"BTCUSDT","k":{"t":1735689600000,"i":"1m","o":"1","h":"2","l":"0.5","c":"1.5","v":"9","x":false}}"#;
        let events = parse(json, 0).unwrap();
        assert_eq!(events[0].event_type(), EventType::KlineUpdate);
    }

    #[test]
    fn test_parse_mark_price_emits_funding_too() {
        let json = r#"{"e":"markPriceUpdate","E":1735689659701,"s":"BTCUSDT","p":"93640.00","i":"93642.11","P":"93645.00","r":"0.00010000","T":1735718400000}"#;
        let events = parse(json, 0).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type(), EventType::MarkPriceUpdate);
        match &events[1] {
            Event::FundingUpdate(f) => {
                assert_eq!(f.funding_rate, 0.0001);
                assert_eq!(f.next_funding_time_ms, Some(1_735_718_400_000));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_order_trade_update() {
        let json = r#"{"e":"ORDER_TRADE_UPDATE","E":1735689659701,"T":1735689659690,"o":{"s":"BTCUSDT","c":"x1","S":"BUY","o":"LIMIT","q":"0.5","p":"93000","ap":"0","X":"NEW","i":123456,"z":"0"}}"#;
        let events = parse(json, 0).unwrap();
        match &events[0] {
            Event::OrderUpdate(o) => {
                assert_eq!(o.exchange_order_id, "123456");
                assert_eq!(o.status, "NEW");
                assert_eq!(o.side, Some(MarketSide::Buy));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_account_update() {
        let json = r#"{"e":"ACCOUNT_UPDATE","E":1735689659701,"T":1735689659690,"a":{"m":"ORDER","B":[{"a":"USDT","wb":"10000.5","cw":"9000.1"}],"P":[{"s":"BTCUSDT","pa":"0.5","ep":"93000","up":"325.25","ps":"LONG"}]}}"#;
        let events = parse(json, 0).unwrap();
        assert_eq!(events.len(), 2);
        match (&events[0], &events[1]) {
            (Event::BalanceUpdate(b), Event::PositionUpdate(p)) => {
                assert_eq!(b.balances[0].asset, "USDT");
                assert_eq!(b.balances[0].total, 10000.5);
                assert_eq!(p.quantity, 0.5);
                assert_eq!(p.position_side, "LONG");
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[test]
    fn test_subscribe_ack_yields_nothing() {
        assert!(parse(r#"{"result":null,"id":1}"#, 0).unwrap().is_empty());
    }
}
