use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::FutureExt;
use tokio::task::JoinHandle;

use super::zone::InteractionZone;

/// A future that is polled inside a zone.
///
/// Every poll re-enters the zone, so the zone stays current across `.await`
/// points even when the executor moves the task to another thread.
pub struct ZonedFuture<F> {
    inner: Pin<Box<F>>,
    zone: InteractionZone,
}

impl<F> ZonedFuture<F> {
    pub fn new(inner: F, zone: InteractionZone) -> Self {
        Self {
            inner: Box::pin(inner),
            zone,
        }
    }

    pub fn zone(&self) -> &InteractionZone {
        &self.zone
    }
}

impl<F: Future> Future for ZonedFuture<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let inner = &mut this.inner;
        this.zone.execute(|| inner.poll_unpin(cx))
    }
}

pub trait ZoneFutureExt: Future + Sized {
    /// Binds this future to `zone`.
    fn in_zone(self, zone: &InteractionZone) -> ZonedFuture<Self> {
        ZonedFuture::new(self, zone.clone())
    }

    /// Binds this future to the zone that is current right now.
    fn in_current_zone(self) -> ZonedFuture<Self> {
        ZonedFuture::new(self, InteractionZone::current())
    }
}

impl<F: Future> ZoneFutureExt for F {}

/// Spawns `future` on the tokio runtime, bound to the current zone.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(future.in_current_zone())
}

impl InteractionZone {
    /// Spawns `future` on the tokio runtime, bound to this zone.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        tokio::spawn(future.in_zone(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ZoneOptions;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn zone_survives_await_points() {
        let zone = InteractionZone::root().create("async", ZoneOptions::default());
        let z = zone.clone();

        let handle = zone.spawn(async move {
            let before = InteractionZone::current();
            tokio::time::sleep(Duration::from_millis(5)).await;
            tokio::task::yield_now().await;
            let after = InteractionZone::current();
            before.ptr_eq(&z) && after.ptr_eq(&z)
        });

        assert!(handle.await.unwrap());
        assert!(InteractionZone::current().ptr_eq(&InteractionZone::root()));
    }

    #[tokio::test]
    async fn spawn_binds_to_spawning_zone() {
        let zone = InteractionZone::root().create("spawner", ZoneOptions::default());
        let handle = zone.execute(|| spawn(async { InteractionZone::current() }));
        assert!(handle.await.unwrap().ptr_eq(&zone));
    }

    #[test]
    fn in_current_zone_captures_at_creation() {
        let zone = InteractionZone::root().create("captured", ZoneOptions::default());
        let fut = zone.execute(|| async { InteractionZone::current() }.in_current_zone());
        let seen = futures::executor::block_on(fut);
        assert!(seen.ptr_eq(&zone));
    }
}
