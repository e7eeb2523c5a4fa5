use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::engine::engine::{DisplayState, TimerEngine};

#[derive(Debug, Deserialize, Clone)]
pub struct CommandMessage {
    pub command: String, // "start" | "pause" | "reset" | "skip" | "settings" | "status"
    #[serde(default)]
    pub work: Option<u64>, // minutes, settings only
    #[serde(default)]
    pub short: Option<u64>,
    #[serde(default)]
    pub long: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub success: bool,
    pub message: Option<String>,
    pub display: DisplayState,
}

pub async fn start_control_server(
    addr: SocketAddr,
    engine: Arc<Mutex<TimerEngine>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(&addr).await?;
    println!("Control server listening on: {}", addr);

    while let Ok((stream, peer_addr)) = listener.accept().await {
        println!("New control connection from: {}", peer_addr);
        let engine = Arc::clone(&engine);
        tokio::spawn(handle_connection(stream, peer_addr, engine));
    }

    Ok(())
}

async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    engine: Arc<Mutex<TimerEngine>>,
) {
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed with {}: {}", peer_addr, e);
            return;
        }
    };

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let response = match serde_json::from_str::<CommandMessage>(&text) {
                    Ok(command) => match engine.lock() {
                        Ok(mut engine) => {
                            let (success, message) = apply_command(&mut engine, &command);
                            CommandResponse {
                                success,
                                message: Some(message),
                                display: engine.current_display(),
                            }
                        }
                        Err(_) => return,
                    },
                    Err(e) => {
                        eprintln!("Failed to parse command from {}: {}", peer_addr, e);
                        match engine.lock() {
                            Ok(engine) => CommandResponse {
                                success: false,
                                message: Some(format!("Parse error: {}", e)),
                                display: engine.current_display(),
                            },
                            Err(_) => return,
                        }
                    }
                };

                if let Ok(response_json) = serde_json::to_string(&response) {
                    if let Err(e) = ws_sender.send(Message::Text(response_json)).await {
                        eprintln!("Failed to send control response: {}", e);
                        break;
                    }
                }
            }
            Ok(Message::Close(_)) => {
                println!("Control connection closed by {}", peer_addr);
                break;
            }
            Ok(Message::Ping(data)) => {
                if let Err(e) = ws_sender.send(Message::Pong(data)).await {
                    eprintln!("Failed to send pong: {}", e);
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => {
                eprintln!("WebSocket error from {}: {}", peer_addr, e);
                break;
            }
        }
    }

    println!("Control connection with {} terminated", peer_addr);
}

/// Apply one command under the engine lock. Invalid settings are dropped
/// without touching the engine; only an unknown command verb is an error.
fn apply_command(engine: &mut TimerEngine, command: &CommandMessage) -> (bool, String) {
    match command.command.as_str() {
        "start" => {
            engine.start();
            (true, "Timer started".to_string())
        }
        "pause" => {
            engine.pause();
            (true, "Timer paused".to_string())
        }
        "reset" => {
            engine.reset();
            (true, "Timer reset".to_string())
        }
        "skip" => {
            engine.skip();
            (true, "Phase skipped".to_string())
        }
        "status" => (true, "OK".to_string()),
        "settings" => match (command.work, command.short, command.long) {
            (Some(work), Some(short), Some(long)) => {
                if engine.update_settings(work, short, long) {
                    (true, "Settings updated".to_string())
                } else {
                    (true, "Settings ignored".to_string())
                }
            }
            _ => (true, "Settings ignored".to_string()),
        },
        other => (false, format!("Unknown command: {}", other)),
    }
}
