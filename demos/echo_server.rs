//! Echo Server Example
//!
//! Upgrades WebSocket requests on 127.0.0.1:8080 and echoes every byte
//! received on each connection back to the client.

use upsock::prelude::*;
use upsock::server::init_logging;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_logging()?;

    let config = ServerBuilder::new().bind("127.0.0.1:8080")?.build()?;
    let listener = Listener::with_config(&config);
    tokio::spawn(UpgradeHost::new(config, listener.clone()).serve());

    println!("Echo server listening on ws://127.0.0.1:8080");

    loop {
        let mut conn = listener.accept().await?;
        tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            loop {
                match conn.read(&mut buf).await {
                    Ok(n) => {
                        if let Err(err) = conn.write(&buf[..n]).await {
                            eprintln!("write failed: {err}");
                            break;
                        }
                    }
                    Err(err) => {
                        if let Some(payload) = err.close_payload() {
                            println!("peer closed ({} byte reason)", payload.len());
                        } else {
                            eprintln!("read failed: {err}");
                        }
                        break;
                    }
                }
            }
        });
    }
}
