//! Serve command - keep the query service resident
//!
//! The RPC transport is mounted by the embedding distribution; this
//! command opens the store read-only, exposes a line-oriented liveness
//! endpoint on the given port, and parks until ctrl-c. Each connection
//! receives one JSON status line and is closed.

use std::path::Path;
use std::sync::Arc;

use console::style;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

use opcat_registry::{Registry, StoreRegistry};
use opcat_store::Store;

use crate::commands::runtime;
use crate::error::Result;

pub fn run(database: &Path, port: u16) -> Result<()> {
    let store = Arc::new(Store::open_read_only(database)?);
    let registry = StoreRegistry::new(store);

    runtime()?.block_on(async move {
        let status = registry.health_check().await;
        println!(
            "{} serving catalog {} ({})",
            style("→").blue(),
            database.display(),
            status
        );

        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (mut socket, _) = accepted?;
                    let status = registry.health_check().await;
                    let line = format!("{{\"status\":\"{status}\"}}\n");
                    // each reply runs on its own task; a slow peer never
                    // blocks the accept loop
                    tokio::spawn(async move {
                        let _ = socket.write_all(line.as_bytes()).await;
                    });
                }
                _ = tokio::signal::ctrl_c() => {
                    println!("{} shutting down", style("→").blue());
                    break;
                }
            }
        }
        Ok(())
    })
}
