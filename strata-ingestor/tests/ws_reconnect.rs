use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use strata_core::prelude::{
    ChannelPubSub, CoreCtx, MarketChannel, SessionRole, StatCounters, StrategyBus,
};
use strata_ingestor::{OkxSessionDriver, WsSession, WsSessionConfig};

const SYMBOLS: [&str; 3] = ["BTC-USDT-SWAP", "ETH-USDT-SWAP", "SOL-USDT-SWAP"];

fn subscribed_symbols(frame: &str) -> Vec<String> {
    let value: serde_json::Value = serde_json::from_str(frame).expect("subscribe frame is json");
    assert_eq!(value["op"], "subscribe");
    value["args"]
        .as_array()
        .expect("args array")
        .iter()
        .map(|arg| arg["instId"].as_str().expect("instId").to_string())
        .collect()
}

/// Force a disconnect mid-session and verify the client re-issues the
/// full subscription set on the fresh connection before traffic resumes.
#[test_log::test(tokio::test)]
async fn resubscribes_full_set_after_forced_disconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (frames_tx, mut frames_rx) = tokio::sync::mpsc::unbounded_channel::<String>();

    // A venue stand-in: the first connection is dropped right after the
    // subscribe frame arrives; the second stays up and pushes one trade.
    tokio::spawn(async move {
        for round in 0..2 {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            let subscribe = loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => break text.to_string(),
                    Some(Ok(_)) => continue,
                    other => panic!("expected subscribe frame, got {:?}", other),
                }
            };
            frames_tx.send(subscribe).unwrap();

            if round == 0 {
                let _ = ws.close(None).await;
            } else {
                let push = r#"{"arg":{"channel":"trades","instId":"BTC-USDT-SWAP"},"data":[{"instId":"BTC-USDT-SWAP","tradeId":"99","px":"93630","sz":"1","side":"buy","ts":"1735689659701","count":"1"}]}"#;
                ws.send(Message::text(push)).await.unwrap();
                while let Some(Ok(_)) = ws.next().await {}
            }
        }
    });

    let driver = Arc::new(OkxSessionDriver::new(
        SessionRole::PublicMarket,
        &format!("ws://{}", addr),
        None,
    ));
    for symbol in SYMBOLS {
        driver.subscriptions.insert(MarketChannel::Trades, symbol, None);
    }

    let (raw_tx, raw_rx) = kanal::unbounded_async::<String>();
    let (_cmd_tx, cmd_rx) = kanal::bounded_async(16);
    let config = WsSessionConfig {
        ping_interval: Duration::from_secs(10),
        stale_timeout: Duration::from_secs(30),
    };
    let session = WsSession::new(driver, config, raw_tx, cmd_rx);

    let pubsub = ChannelPubSub::new();
    let bus = StrategyBus::new("redis://127.0.0.1:1/0", "test").unwrap();
    let ctx = Arc::new(CoreCtx::new(pubsub, bus, StatCounters::new()));
    let shutdown = CancellationToken::new();
    let session_task = tokio::spawn(session.run(ctx, shutdown.clone()));

    // First connection subscribes everything.
    let first = tokio::time::timeout(Duration::from_secs(5), frames_rx.recv())
        .await
        .expect("first subscribe frame")
        .unwrap();
    let mut first_symbols = subscribed_symbols(&first);
    first_symbols.sort();
    assert_eq!(first_symbols, SYMBOLS.map(String::from).to_vec());

    // After the forced close the session redials and replays the same set.
    let second = tokio::time::timeout(Duration::from_secs(10), frames_rx.recv())
        .await
        .expect("resubscribe frame after reconnect")
        .unwrap();
    let mut second_symbols = subscribed_symbols(&second);
    second_symbols.sort();
    assert_eq!(second_symbols, first_symbols);

    // The restored session delivers market traffic again.
    let raw = tokio::time::timeout(Duration::from_secs(5), raw_rx.recv())
        .await
        .expect("market frame after restore")
        .unwrap();
    assert!(raw.contains("\"tradeId\":\"99\""));

    shutdown.cancel();
    let _ = session_task.await;
}
