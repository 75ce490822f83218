//! Cooperative task spawning, mirroring `common::executor::{spawn, Timer}` in
//! the teacher: engines never call `tokio::spawn` directly, they go through a
//! `FutureSpawner` so a single-threaded or deterministic executor can be
//! substituted in tests.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

pub trait FutureSpawner: Send + Sync {
    fn spawn(&self, fut: Pin<Box<dyn Future<Output = ()> + Send + 'static>>);
}

/// The production spawner, backed by the ambient tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSpawner;

impl FutureSpawner for TokioSpawner {
    fn spawn(&self, fut: Pin<Box<dyn Future<Output = ()> + Send + 'static>>) {
        tokio::spawn(fut);
    }
}

/// Sleeps for `duration`, the async equivalent of the teacher's `Timer`.
pub async fn sleep(duration: Duration) { tokio::time::sleep(duration).await; }
