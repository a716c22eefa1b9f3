//! The four background workers (§4.4-4.7), each a `tokio::spawn`'d loop
//! that polls `engine.running()` between bounded-work passes.

mod crawler;
mod fetcher;
mod health_checker;
mod pusher;

pub use crawler::crawler_pass;
pub use fetcher::fetcher_pass;
pub use health_checker::health_checker_pass;
pub use pusher::pusher_pass;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::engine::AtlasEngine;

/// Idle backoff when a worker's pass found no work to do.
pub const IDLE_SLEEP: Duration = Duration::from_millis(500);

/// Spawns all four workers against `engine`, returning their join handles.
/// Callers stop the fleet by calling `engine.stop()`.
pub fn spawn_all(engine: Arc<AtlasEngine>) -> Vec<JoinHandle<()>> {
    vec![
        tokio::spawn(run_loop(engine.clone(), "peer crawler", crawler_pass)),
        tokio::spawn(run_loop(engine.clone(), "health checker", health_checker_pass)),
        tokio::spawn(run_loop(engine.clone(), "zonefile fetcher", fetcher_pass)),
        tokio::spawn(run_loop(engine, "zonefile pusher", pusher_pass)),
    ]
}

async fn run_loop<F, Fut>(engine: Arc<AtlasEngine>, name: &'static str, pass: F)
where
    F: Fn(Arc<AtlasEngine>) -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    while engine.running() {
        let did_work = pass(engine.clone()).await;
        if !did_work {
            tracing::debug!(worker = name, "idle pass, backing off");
            tokio::time::sleep(IDLE_SLEEP).await;
        }
    }
    tracing::debug!(worker = name, "worker stopped");
}
