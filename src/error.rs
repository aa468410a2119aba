use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("empty message payload")]
    Empty,
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("tile map dimensions {width}x{height} out of range")]
    TileMapDimensions { width: i32, height: i32 },
    #[error("tile map header {width}x{height} does not match its {rows} rows")]
    TileMapShape { width: i32, height: i32, rows: usize },
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("websocket failure: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("server closed the connection")]
    Closed,
}
