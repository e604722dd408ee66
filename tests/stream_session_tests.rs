use binance_link::core::kernel::{SessionState, StreamEndpoints, StreamHandlers};
use binance_link::exchanges::binance::{BinanceStreams, TickerEvent, UserDataEvent};
use binance_link::{ExchangeError, StreamSettings};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

/// Local stream server: reports the request path, sends `frames`, then
/// keeps the connection open until the client goes away
async fn serve(frames: Vec<String>) -> (BinanceStreams, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (path_tx, path_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut path = None;
        let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            path = Some(request.uri().to_string());
            Ok(response)
        };
        let mut ws = accept_hdr_async(stream, callback).await.unwrap();
        let _ = path_tx.send(path.unwrap_or_default());
        for frame in frames {
            ws.send(Message::Text(frame)).await.unwrap();
        }
        while ws.next().await.is_some() {}
    });

    let endpoints = StreamEndpoints::new(
        format!("ws://{}/ws", addr),
        format!("ws://{}/stream?streams=", addr),
    );
    let settings = StreamSettings {
        keepalive_enabled: true,
        keepalive_interval: Duration::from_secs(30),
    };
    (BinanceStreams::new(endpoints, settings), path_rx)
}

fn collecting<T: Send + 'static>() -> (
    StreamHandlers<T>,
    mpsc::UnboundedReceiver<T>,
    mpsc::UnboundedReceiver<ExchangeError>,
) {
    let (event_tx, events) = mpsc::unbounded_channel();
    let (error_tx, errors) = mpsc::unbounded_channel();
    let handlers = StreamHandlers::new(
        move |event| {
            let _ = event_tx.send(event);
        },
        move |error| {
            let _ = error_tx.send(error);
        },
    );
    (handlers, events, errors)
}

#[cfg(test)]
mod stream_session_tests {
    use super::*;

    #[tokio::test]
    async fn test_combined_ticker_demultiplexes_symbol() {
        let (streams, path) = serve(vec![
            r#"{"stream":"btcusdt@ticker","data":{"e":"24hrTicker","c":"50000"}}"#.to_string(),
            r#"{"stream":"ethusdt@ticker","data":{"e":"24hrTicker","s":"XXX","c":"3000"}}"#
                .to_string(),
        ])
        .await;

        let (handlers, mut events, mut errors) = collecting::<TickerEvent>();
        let handle = streams
            .combined_ticker(&["BTCUSDT", "ETHUSDT"], handlers)
            .unwrap()
            .start();

        assert_eq!(
            path.await.unwrap(),
            "/stream?streams=btcusdt@ticker/ethusdt@ticker"
        );

        let first = timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.symbol, "BTCUSDT");
        assert_eq!(first.last_price, "50000");

        let second = timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.symbol, "ETHUSDT");

        assert!(errors.try_recv().is_err());
        timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_one_malformed_frame_one_error() {
        let (streams, _path) = serve(vec![
            r#"{"stream":"btcusdt@ticker","data":"#.to_string(),
            r#"{"stream":"btcusdt@ticker","data":{"c":"50001"}}"#.to_string(),
        ])
        .await;

        let (handlers, mut events, mut errors) = collecting::<TickerEvent>();
        let handle = streams
            .combined_ticker(&["BTCUSDT"], handlers)
            .unwrap()
            .start();

        let event = timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.last_price, "50001");
        assert_eq!(handle.state(), SessionState::Open);

        assert!(matches!(
            errors.try_recv(),
            Ok(ExchangeError::DeserializationError(_))
        ));
        assert!(errors.try_recv().is_err());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_session_reaches_closed() {
        let (streams, _path) = serve(Vec::new()).await;
        let (handlers, _events, _errors) = collecting::<TickerEvent>();
        let mut handle = streams.ticker("BTCUSDT", handlers).start();

        timeout(
            Duration::from_secs(5),
            handle.wait_for_state(|state| state == SessionState::Open),
        )
        .await
        .unwrap();

        let token = handle.done_token();
        token.cancel();
        let state = timeout(
            Duration::from_secs(5),
            handle.wait_for_state(SessionState::is_terminal),
        )
        .await
        .unwrap();
        assert_eq!(state, SessionState::Closed);

        // the read loop task ends, nothing is left running
        timeout(Duration::from_secs(5), handle.join())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_user_data_skips_trade_lite_frames() {
        let (streams, path) = serve(vec![
            r#"{"e":"TRADE_LITE","E":1,"s":"BTCUSDT","p":"1.0"}"#.to_string(),
            r#"{"e":"ACCOUNT_UPDATE","E":2,"T":2,"a":{"m":"ORDER","B":[{"a":"USDT","wb":"100","cw":"100","bc":"0"}],"P":[]}}"#
                .to_string(),
        ])
        .await;

        let (handlers, mut events, mut errors) = collecting::<UserDataEvent>();
        let handle = streams.user_data("my-listen-key", handlers).start();
        assert_eq!(path.await.unwrap(), "/ws/my-listen-key");

        let event = timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event_type(), "ACCOUNT_UPDATE");
        match event {
            UserDataEvent::Futures(event) => {
                assert_eq!(event.account_update.unwrap().balances[0].asset, "USDT");
            }
            other => panic!("Expected futures event, got {:?}", other),
        }
        assert!(errors.try_recv().is_err());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_user_data_decodes_spot_frames() {
        let (streams, _path) = serve(vec![
            r#"{"e":"executionReport","E":1499405658658,"s":"ETHBTC","c":"mUvoqJxFIILMdfAW5iGSOW","S":"BUY","o":"LIMIT","f":"GTC","q":"1.00000000","p":"0.10264410","P":"0.00000000","x":"NEW","X":"NEW","r":"NONE","i":4293153,"l":"0.00000000","z":"0.00000000","L":"0.00000000","n":"0","N":null,"T":1499405658657,"t":-1,"m":false}"#
                .to_string(),
            r#"{"e":"balanceUpdate","E":1573200697110,"a":"BTC","d":"100.00000000","T":1573200697068}"#
                .to_string(),
        ])
        .await;

        let (handlers, mut events, mut errors) = collecting::<UserDataEvent>();
        let handle = streams.user_data("spot-key", handlers).start();

        let first = timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        match first {
            UserDataEvent::ExecutionReport(report) => {
                assert_eq!(report.order_type, "LIMIT");
                assert_eq!(report.order_id, 4_293_153);
            }
            other => panic!("Expected execution report, got {:?}", other),
        }

        let second = timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        match second {
            UserDataEvent::BalanceUpdate(update) => assert_eq!(update.asset, "BTC"),
            other => panic!("Expected balance update, got {:?}", other),
        }
        assert!(errors.try_recv().is_err());

        handle.shutdown().await.unwrap();
    }
}
