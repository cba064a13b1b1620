use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use shared::ServerEvent;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

// Manual probe: join a room, move, chat, ask for status and print every frame
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:8080/ws".to_string());
    let room = std::env::args().nth(2).unwrap_or_else(|| "lobby".to_string());

    println!("Connecting to {}", url);
    let (stream, response) = connect_async(url.as_str()).await?;
    println!("Upgraded with status {}", response.status());
    let (mut sink, mut source) = stream.split();

    let script = [
        json!({"event": "joinRoom", "data": {"room": room}}),
        json!({"event": "playerMove", "data": {"x": 500.0, "y": 420.0}}),
        json!({"event": "chatMessage", "data": {"text": "hello from test_client"}}),
        json!({"event": "getRoomStatus"}),
    ];

    for frame in script {
        println!("-> {}", frame);
        sink.send(Message::Text(frame.to_string().into())).await?;
        sleep(Duration::from_millis(100)).await;
    }

    // Print whatever arrives until the server goes quiet
    while let Ok(Some(message)) = timeout(Duration::from_secs(2), source.next()).await {
        match message? {
            Message::Text(text) => match ServerEvent::decode(text.as_str()) {
                Ok(event) => println!("<- {}: {:?}", event.name(), event),
                Err(e) => println!("<- undecodable ({}): {}", e, text.as_str()),
            },
            Message::Ping(_) => println!("<- ping"),
            Message::Close(frame) => {
                println!("<- close {:?}", frame);
                break;
            }
            other => println!("<- {:?}", other),
        }
    }

    sink.send(Message::Text(json!({"event": "leaveRoom"}).to_string().into()))
        .await?;
    sink.close().await?;
    println!("Disconnected");
    Ok(())
}
