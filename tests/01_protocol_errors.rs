mod support;

use tokio_tungstenite::{connect_async, tungstenite::Error as WsError};

use wsgate::close_codes::{CLOSE_PROTOCOL_ERROR, CLOSE_TOO_LARGE};

#[tokio::test]
async fn malformed_frame_closes_with_protocol_error() {
    let gw = support::start().await;
    let mut client = gw.connect().await;
    gw.wait_for_connections(1).await;

    support::send_text(&mut client, "{not json").await;

    // the close frame is the very first thing the client sees
    let (code, reason) = support::next_close(&mut client).await;
    assert_eq!(code, CLOSE_PROTOCOL_ERROR);
    assert!(
        reason.starts_with("Received a malformed frame: invalid JSON"),
        "reason was {reason:?}"
    );

    gw.wait_for_connections(0).await;
    gw.gateway.close().await.unwrap();
}

#[tokio::test]
async fn wrong_version_is_malformed_too() {
    let gw = support::start().await;
    let mut client = gw.connect().await;

    support::send_text(&mut client, r#"{"jsonrpc":"1.0","id":1,"method":"ping"}"#).await;

    let (code, _reason) = support::next_close(&mut client).await;
    assert_eq!(code, CLOSE_PROTOCOL_ERROR);

    gw.gateway.close().await.unwrap();
}

#[tokio::test]
async fn other_paths_are_refused_at_handshake() {
    let gw = support::start().await;
    let url = format!("ws://{}/rpc", gw.gateway.local_addr());

    match connect_async(url).await {
        Err(WsError::Http(response)) => assert_eq!(response.status(), 404),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("handshake should have been refused"),
    }

    assert_eq!(gw.connection_count().await, 0);
    gw.gateway.close().await.unwrap();
}

#[tokio::test]
async fn oversized_frames_end_the_connection() {
    let mut options = support::local_options();
    options.max_payload_length = 64;

    let gw = support::start_with(options).await;
    let mut client = gw.connect().await;
    gw.wait_for_connections(1).await;

    let padding = "x".repeat(256);
    let body = format!(r#"{{"jsonrpc":"2.0","id":1,"method":"echo","params":"{padding}"}}"#);
    support::send_text(&mut client, &body).await;

    // no data frame, only the end of the socket
    match support::next_message(&mut client).await {
        None => {}
        Some(tokio_tungstenite::tungstenite::Message::Close(frame)) => {
            if let Some(frame) = frame {
                assert_eq!(u16::from(frame.code), CLOSE_TOO_LARGE);
            }
        }
        Some(other) => panic!("expected the socket to end, got {other:?}"),
    }

    gw.wait_for_connections(0).await;
    gw.gateway.close().await.unwrap();
}
