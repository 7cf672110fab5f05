use std::sync::Arc;
use std::time::Duration;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use super::generator::generate_packet;
use super::PacketSink;

/// One start/stop cycle of the tick loop
struct Run {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Run {
    /// A run is over once its token fires, even if the task has not exited yet
    fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && !self.handle.is_finished()
    }
}

/// Periodic producer that synthesizes a packet on every tick and hands it to
/// a [`PacketSink`].
pub struct PacketSniffer {
    sink: Arc<dyn PacketSink>,
    interval: Duration,
    run: Mutex<Option<Run>>,
}

impl PacketSniffer {
    pub fn new(sink: Arc<dyn PacketSink>, interval: Duration) -> Self {
        Self {
            sink,
            interval: interval.max(Duration::from_millis(1)),
            run: Mutex::new(None),
        }
    }

    /// Start the tick loop on the current tokio runtime. No-op when already
    /// running. The loop ends on [`stop`](Self::stop) or when `cancel` fires.
    pub fn start(&self, cancel: &CancellationToken) -> Result<()> {
        let mut run = self.run.lock();

        if run.as_ref().is_some_and(Run::is_active) {
            tracing::debug!("Packet sniffer already running");
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current()
            .context("Packet sniffer must be started inside a tokio runtime")?;

        let run_cancel = cancel.child_token();
        let handle = runtime.spawn(tick_loop(
            Arc::clone(&self.sink),
            self.interval,
            run_cancel.clone(),
        ));

        *run = Some(Run {
            cancel: run_cancel,
            handle,
        });

        tracing::info!("Packet sniffer started (interval: {:?})", self.interval);
        Ok(())
    }

    /// Stop the tick loop and wait for it to exit. No-op when idle.
    pub async fn stop(&self) -> Result<()> {
        let run = self.run.lock().take();
        let Some(run) = run else {
            return Ok(());
        };

        run.cancel.cancel();
        run.handle
            .await
            .context("Packet sniffer task failed")?;

        tracing::info!("Packet sniffer stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.run.lock().as_ref().is_some_and(Run::is_active)
    }
}

async fn tick_loop(sink: Arc<dyn PacketSink>, period: Duration, cancel: CancellationToken) {
    // First tick one period after start, not immediately
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut rng = StdRng::from_entropy();

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                tracing::debug!("Packet sniffer loop cancelled");
                break;
            }
            _ = ticker.tick() => {
                let packet = generate_packet(&mut rng);
                let id = packet.id.clone();
                match sink.store(packet) {
                    Ok(()) => tracing::trace!("Stored packet {}", id),
                    Err(e) => tracing::warn!("Failed to store packet {}: {}", id, e),
                }
            }
        }
    }
}
