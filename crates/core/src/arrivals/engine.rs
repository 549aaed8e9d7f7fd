//! The task that drives a [`SyncCycle`] against an arrivals source.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use dondeviene_transit::{ArrivalSnapshot, ArrivalSource, StopCode};
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::board::ArrivalBoard;
use super::cycle::SyncCycle;
use crate::config::SyncConfig;

type PendingFetch =
    Pin<Box<dyn Future<Output = (u64, dondeviene_transit::Result<ArrivalSnapshot>)> + Send>>;

enum SyncCommand {
    Pause,
    Resume,
}

/// Live arrivals for one stop, refreshed on a fixed cadence.
///
/// The board only changes at cycle boundaries, so a countdown driven by
/// [`progress`](Self::progress) and the data always reset together.
/// Dropping the handle stops the clock and cancels any fetch in flight.
pub struct LiveArrivalSync {
    stop: StopCode,
    commands: mpsc::UnboundedSender<SyncCommand>,
    board: watch::Receiver<ArrivalBoard>,
    progress: watch::Receiver<f64>,
    task: JoinHandle<()>,
}

impl LiveArrivalSync {
    pub fn spawn(source: Arc<dyn ArrivalSource>, stop: StopCode, config: &SyncConfig) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let (board_tx, board) = watch::channel(ArrivalBoard::empty(stop.clone()));
        let (progress_tx, progress) = watch::channel(0.0);

        info!(%stop, interval_ms = config.interval_ms, "Starting live arrivals");
        let engine = Engine {
            source,
            stop: stop.clone(),
            frame: config.frame(),
            cycle: SyncCycle::new(config.interval(), config.fetch_at),
            board: board_tx,
            progress: progress_tx,
        };
        let task = tokio::spawn(engine.run(receiver));

        Self {
            stop,
            commands,
            board,
            progress,
            task,
        }
    }

    pub fn stop_code(&self) -> &StopCode {
        &self.stop
    }

    /// Freeze the cycle; no fetches start and nothing is applied.
    pub fn pause(&self) {
        let _ = self.commands.send(SyncCommand::Pause);
    }

    /// Continue from where the cycle was frozen.
    pub fn resume(&self) {
        let _ = self.commands.send(SyncCommand::Resume);
    }

    pub fn board(&self) -> ArrivalBoard {
        self.board.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ArrivalBoard> {
        self.board.clone()
    }

    /// Countdown position in the current cycle, `0.0..=1.0`
    pub fn progress(&self) -> f64 {
        *self.progress.borrow()
    }
}

impl Drop for LiveArrivalSync {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Engine {
    source: Arc<dyn ArrivalSource>,
    stop: StopCode,
    frame: Duration,
    cycle: SyncCycle<ArrivalSnapshot>,
    board: watch::Sender<ArrivalBoard>,
    progress: watch::Sender<f64>,
}

impl Engine {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<SyncCommand>) {
        let mut frames = tokio::time::interval(self.frame);
        frames.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_frame = frames.tick().await;
        let mut fetches: FuturesUnordered<PendingFetch> = FuturesUnordered::new();

        loop {
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(SyncCommand::Pause) => {
                        debug!(stop = %self.stop, "Live arrivals paused");
                        self.cycle.pause();
                    }
                    Some(SyncCommand::Resume) => {
                        debug!(stop = %self.stop, "Live arrivals resumed");
                        self.cycle.resume();
                    }
                    None => break,
                },
                Some((cycle, result)) = fetches.next(), if !fetches.is_empty() => {
                    self.store(cycle, result);
                }
                now = frames.tick() => {
                    let delta = now.saturating_duration_since(last_frame);
                    last_frame = now;
                    self.on_frame(delta, &mut fetches);
                }
            }
        }
        debug!(stop = %self.stop, "Live arrivals stopped");
    }

    fn on_frame(&mut self, delta: Duration, fetches: &mut FuturesUnordered<PendingFetch>) {
        let outcome = self.cycle.tick(delta);

        if let Some(cycle) = outcome.fetch {
            debug!(stop = %self.stop, cycle, "Fetching arrivals");
            let request = self.source.arrivals(&self.stop);
            fetches.push(Box::pin(async move { (cycle, request.await) }));
        }

        if let Some(snapshot) = outcome.apply {
            // Anything still in flight belongs to a finished cycle
            fetches.clear();
            self.apply(snapshot);
        }

        self.progress.send_replace(self.cycle.progress());
    }

    fn store(&mut self, cycle: u64, result: dondeviene_transit::Result<ArrivalSnapshot>) {
        match result {
            Ok(snapshot) => {
                if !self.cycle.store(cycle, snapshot) {
                    debug!(stop = %self.stop, cycle, "Discarding arrivals for a finished cycle");
                }
            }
            Err(error) => {
                warn!(stop = %self.stop, cycle, %error, "Arrival fetch failed");
            }
        }
    }

    fn apply(&mut self, snapshot: Option<ArrivalSnapshot>) {
        self.board.send_modify(|board| {
            *board = board.next(snapshot.as_ref());
        });

        let board = self.board.borrow();
        if board.fetch_failed {
            warn!(
                stop = %self.stop,
                cycle = board.cycle,
                "No fresh arrivals this cycle, keeping last list"
            );
        } else {
            debug!(
                stop = %self.stop,
                cycle = board.cycle,
                vehicles = board.entities.len(),
                "Applied arrivals"
            );
        }
    }
}
