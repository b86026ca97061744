//! A ready-to-run Rebus server with one room.
//!
//! ```text
//! REBUS_BIND=0.0.0.0:8080 REBUS_PUZZLES=puzzles.json cargo run -p party-server
//! ```
//!
//! `REBUS_PUZZLES` points at a JSON array of `{"image": ..., "answer": ...}`
//! objects. Without it a small built-in set is used. The room code and host
//! key are printed on startup; open the host display with both, then have
//! players join with the code.

use rebus::prelude::*;

const DEFAULT_BIND: &str = "127.0.0.1:8080";

fn builtin_puzzles() -> Vec<PuzzleSource> {
    vec![
        PuzzleSource::new("/img/eiffel.png", "Eiffel Tower"),
        PuzzleSource::new("/img/golden-gate.png", "Golden Gate Bridge"),
        PuzzleSource::new("/img/big-ben.png", "Big Ben"),
        PuzzleSource::new("/img/liberty.png", "Statue of Liberty"),
    ]
}

fn load_puzzles() -> Result<Vec<PuzzleSource>, Box<dyn std::error::Error>> {
    match std::env::var("REBUS_PUZZLES") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path)?;
            let puzzles: Vec<PuzzleSource> = serde_json::from_str(&raw)?;
            tracing::info!(%path, count = puzzles.len(), "loaded puzzles");
            Ok(puzzles)
        }
        Err(_) => Ok(builtin_puzzles()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rebus::init_tracing();

    let bind = std::env::var("REBUS_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let puzzles = load_puzzles()?;

    let server = RebusServer::builder().bind(&bind).build().await?;
    let registry = server.registry();

    let room = registry.create_room().await;
    registry.load_puzzles(&room.code, puzzles).await?;
    tracing::info!(
        addr = %server.local_addr()?,
        room = %room.code,
        host_key = %room.host_key,
        "room ready"
    );

    server.run().await?;
    Ok(())
}
