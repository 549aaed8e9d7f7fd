//! Permission request, passive permission check, bounded retry and
//! time-boxed watch.
//!
//! The actor task is the only owner of the sensor and of every pending
//! timer. All of them live inside [`Phase`], so replacing the phase is what
//! cancels them: a new request, `stop`, or dropping the handle can never be
//! followed by a stale callback.

use std::pin::Pin;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Sleep, Timeout};
use tracing::{debug, info, warn};

use super::{
    FixFuture, FixStream, LocationState, PermissionFuture, PermissionState, PositionError,
    PositionFix, PositionOptions, PositionSensor, SensorPermission,
};
use crate::config::GeolocationConfig;

type FixResult = Result<PositionFix, PositionError>;

const COMMAND_BUFFER: usize = 8;

// ============================================================================
// Handle
// ============================================================================

/// Handle to the geolocation actor.
///
/// Dropping the handle stops the actor and cancels any request or watch
/// still in flight. Must be created inside a tokio runtime.
pub struct GeolocationAcquisition {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<LocationState>,
    task: JoinHandle<()>,
}

impl GeolocationAcquisition {
    /// Start the actor. `None` means the device has no position capability.
    pub fn spawn(sensor: Option<Arc<dyn PositionSensor>>, config: GeolocationConfig) -> Self {
        let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
        let (state_tx, state) = watch::channel(LocationState::default());

        let actor = Actor {
            sensor,
            options: PositionOptions::from(&config),
            config,
            phase: Phase::Idle,
            position: None,
            error: None,
            retries: 0,
            state: state_tx,
        };
        let task = tokio::spawn(actor.run(receiver));

        Self {
            commands,
            state,
            task,
        }
    }

    /// Ask for permission and resolve with the first fix.
    ///
    /// Transient failures are retried before they surface here. A later
    /// call (or `stop`) supersedes this one, which then resolves with
    /// [`PositionError::Cancelled`].
    pub async fn request_permission(&self) -> FixResult {
        let (responder, response) = oneshot::channel();
        if self
            .commands
            .send(Command::RequestPermission(responder))
            .await
            .is_err()
        {
            return Err(PositionError::Cancelled);
        }
        response.await.unwrap_or(Err(PositionError::Cancelled))
    }

    /// Find out whether permission is already settled, without prompting.
    ///
    /// Starts a watch straight away when it is granted; a `prompt` answer
    /// leaves the machine idle and a refusal moves it to denied. While a
    /// request is prompting or a session is granted this only reports the
    /// current state.
    pub async fn check_permission(&self) -> PermissionState {
        let (reply, answer) = oneshot::channel();
        if self.commands.send(Command::CheckPermission(reply)).await.is_err() {
            return self.state().permission;
        }
        match answer.await {
            Ok(permission) => permission,
            Err(_) => self.state().permission,
        }
    }

    /// Cancel the in-flight request or the running watch.
    pub async fn stop(&self) {
        let _ = self.commands.send(Command::Stop).await;
    }

    /// Start another time-boxed watch. Returns false unless permission is
    /// granted.
    pub async fn rearm_watch(&self) -> bool {
        let (reply, answer) = oneshot::channel();
        if self.commands.send(Command::RearmWatch(reply)).await.is_err() {
            return false;
        }
        answer.await.unwrap_or(false)
    }

    pub fn state(&self) -> LocationState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LocationState> {
        self.state.clone()
    }
}

impl Drop for GeolocationAcquisition {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ============================================================================
// Actor
// ============================================================================

enum Command {
    RequestPermission(oneshot::Sender<FixResult>),
    CheckPermission(oneshot::Sender<PermissionState>),
    Stop,
    RearmWatch(oneshot::Sender<bool>),
}

enum Phase {
    Idle,
    Checking {
        query: Pin<Box<Timeout<PermissionFuture>>>,
        responder: Option<oneshot::Sender<PermissionState>>,
    },
    Prompting {
        retries: u32,
        step: Attempt,
        responder: Option<oneshot::Sender<FixResult>>,
    },
    Granted {
        watch: Option<WatchSession>,
    },
    Denied,
    Unsupported,
}

enum Attempt {
    Requesting(Pin<Box<Timeout<FixFuture>>>),
    Backoff(Pin<Box<Sleep>>),
    /// Retries used up; waiting for a new request
    Exhausted,
}

struct WatchSession {
    updates: FixStream,
    expires: Pin<Box<Sleep>>,
}

enum Event {
    Permission(SensorPermission),
    Attempt(FixResult),
    BackoffElapsed,
    WatchUpdate(Option<FixResult>),
    WatchExpired,
}

enum Step {
    Command(Option<Command>),
    Event(Event),
}

struct Actor {
    sensor: Option<Arc<dyn PositionSensor>>,
    options: PositionOptions,
    config: GeolocationConfig,
    phase: Phase,
    position: Option<PositionFix>,
    error: Option<PositionError>,
    retries: u32,
    state: watch::Sender<LocationState>,
}

impl Actor {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            let step = tokio::select! {
                biased;
                command = commands.recv() => Step::Command(command),
                event = next_event(&mut self.phase) => Step::Event(event),
            };

            match step {
                Step::Command(Some(command)) => self.handle_command(command),
                Step::Command(None) => break,
                Step::Event(event) => self.handle_event(event),
            }
            self.publish();
        }
        debug!("Geolocation actor stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::RequestPermission(responder) => self.start_request(responder),
            Command::CheckPermission(reply) => self.start_check(reply),
            Command::Stop => {
                if matches!(self.phase, Phase::Checking { .. } | Phase::Prompting { .. }) {
                    debug!("Position request cancelled");
                    self.phase = Phase::Idle;
                } else if let Phase::Granted { watch } = &mut self.phase {
                    if watch.take().is_some() {
                        debug!("Position watch stopped");
                    }
                }
            }
            Command::RearmWatch(reply) => {
                let session = match (&self.phase, &self.sensor) {
                    (Phase::Granted { .. }, Some(sensor)) => Some(self.start_watch(sensor.as_ref())),
                    _ => None,
                };
                let rearmed = session.is_some();
                if let (Phase::Granted { watch }, Some(session)) = (&mut self.phase, session) {
                    *watch = Some(session);
                }
                let _ = reply.send(rearmed);
            }
        }
    }

    fn start_request(&mut self, responder: oneshot::Sender<FixResult>) {
        // Dropping the old phase cancels its request, backoff or watch
        self.phase = Phase::Idle;
        self.error = None;
        self.retries = 0;

        let Some(sensor) = self.sensor.clone() else {
            info!("No position capability on this device");
            self.phase = Phase::Unsupported;
            self.error = Some(PositionError::CapabilityUnavailable);
            let _ = responder.send(Err(PositionError::CapabilityUnavailable));
            return;
        };

        debug!(high_accuracy = self.options.high_accuracy, "Requesting position");
        self.phase = Phase::Prompting {
            retries: 0,
            step: Attempt::Requesting(self.request(sensor.as_ref())),
            responder: Some(responder),
        };
    }

    fn start_check(&mut self, reply: oneshot::Sender<PermissionState>) {
        if matches!(self.phase, Phase::Prompting { .. } | Phase::Granted { .. }) {
            let _ = reply.send(self.permission().0);
            return;
        }

        let Some(sensor) = self.sensor.clone() else {
            info!("No position capability on this device");
            self.phase = Phase::Unsupported;
            let _ = reply.send(PermissionState::Unsupported);
            return;
        };

        debug!("Checking location permission");
        self.phase = Phase::Checking {
            query: Box::pin(tokio::time::timeout(
                self.options.timeout,
                sensor.permission_status(),
            )),
            responder: Some(reply),
        };
    }

    fn finish_check(&mut self, status: SensorPermission) {
        let Phase::Checking { responder, .. } = &mut self.phase else {
            return;
        };
        let responder = responder.take();

        info!(%status, "Location permission checked");
        self.phase = match status {
            SensorPermission::Granted => Phase::Granted {
                watch: self
                    .sensor
                    .as_deref()
                    .map(|sensor| self.start_watch(sensor)),
            },
            SensorPermission::Denied => Phase::Denied,
            SensorPermission::Prompt => Phase::Idle,
        };

        if let Some(responder) = responder {
            let _ = responder.send(self.permission().0);
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Permission(status) => self.finish_check(status),
            Event::Attempt(outcome) => self.finish_attempt(outcome),
            Event::BackoffElapsed => {
                let request = self.sensor.clone().map(|sensor| self.request(sensor.as_ref()));
                if let (Phase::Prompting { step, .. }, Some(request)) = (&mut self.phase, request) {
                    *step = Attempt::Requesting(request);
                }
            }
            Event::WatchUpdate(Some(Ok(fix))) => {
                self.position = Some(fix);
                self.error = None;
            }
            Event::WatchUpdate(Some(Err(error))) => {
                debug!(%error, "Position watch reported an error");
                self.error = Some(error);
                match error {
                    PositionError::PermissionDenied => self.phase = Phase::Denied,
                    PositionError::CapabilityUnavailable => self.phase = Phase::Unsupported,
                    _ => {}
                }
            }
            Event::WatchUpdate(None) => {
                debug!("Position watch ended");
                self.clear_watch();
            }
            Event::WatchExpired => {
                debug!(
                    duration_ms = self.config.watch_duration_ms,
                    "Position watch expired"
                );
                self.clear_watch();
            }
        }
    }

    fn finish_attempt(&mut self, outcome: FixResult) {
        let Phase::Prompting {
            retries,
            step,
            responder,
        } = &mut self.phase
        else {
            return;
        };

        match outcome {
            Ok(fix) => {
                info!(retries = *retries, "Location permission granted");
                let responder = responder.take();
                let watch = self
                    .sensor
                    .as_deref()
                    .map(|sensor| self.start_watch(sensor));
                self.phase = Phase::Granted { watch };
                self.position = Some(fix);
                self.error = None;
                if let Some(responder) = responder {
                    let _ = responder.send(Ok(fix));
                }
            }
            Err(error) if error.is_transient() && *retries < self.config.max_retries => {
                *retries += 1;
                self.retries = *retries;
                debug!(%error, retry = *retries, "Position attempt failed, retrying");
                *step = Attempt::Backoff(Box::pin(tokio::time::sleep(self.config.retry_delay())));
            }
            Err(error) => {
                let responder = responder.take();
                match error {
                    PositionError::PermissionDenied => {
                        info!("Location permission denied");
                        self.phase = Phase::Denied;
                    }
                    PositionError::CapabilityUnavailable => {
                        info!("Position sensor reported no capability");
                        self.phase = Phase::Unsupported;
                    }
                    _ => {
                        warn!(%error, retries = *retries, "Giving up on position request");
                        *step = Attempt::Exhausted;
                    }
                }
                self.error = Some(error);
                if let Some(responder) = responder {
                    let _ = responder.send(Err(error));
                }
            }
        }
    }

    fn request(&self, sensor: &dyn PositionSensor) -> Pin<Box<Timeout<FixFuture>>> {
        Box::pin(tokio::time::timeout(
            self.options.timeout,
            sensor.request_once(&self.options),
        ))
    }

    fn start_watch(&self, sensor: &dyn PositionSensor) -> WatchSession {
        debug!(duration_ms = self.config.watch_duration_ms, "Starting position watch");
        WatchSession {
            updates: sensor.watch(&self.options),
            expires: Box::pin(tokio::time::sleep(self.config.watch_duration())),
        }
    }

    fn clear_watch(&mut self) {
        if let Phase::Granted { watch } = &mut self.phase {
            *watch = None;
        }
    }

    /// Published permission and whether a watch is live
    fn permission(&self) -> (PermissionState, bool) {
        match &self.phase {
            Phase::Idle => (PermissionState::Idle, false),
            Phase::Checking { .. } => (PermissionState::Checking, false),
            Phase::Prompting { .. } => (PermissionState::Prompting, false),
            Phase::Granted { watch } => (PermissionState::Granted, watch.is_some()),
            Phase::Denied => (PermissionState::Denied, false),
            Phase::Unsupported => (PermissionState::Unsupported, false),
        }
    }

    fn publish(&self) {
        let (permission, watching) = self.permission();

        let next = LocationState {
            permission,
            position: self.position,
            error: self.error,
            retries: self.retries,
            watching,
        };
        self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

/// Wait for whatever the current phase is waiting on.
///
/// Only borrows the pending futures, so dropping this future (when a
/// command wins the race) loses nothing.
async fn next_event(phase: &mut Phase) -> Event {
    match phase {
        Phase::Checking { query, .. } => {
            // A platform that never answers is treated as undecided
            let status = query.as_mut().await;
            Event::Permission(status.unwrap_or(SensorPermission::Prompt))
        }
        Phase::Prompting {
            step: Attempt::Requesting(request),
            ..
        } => {
            let outcome = request.as_mut().await;
            Event::Attempt(outcome.unwrap_or(Err(PositionError::Timeout)))
        }
        Phase::Prompting {
            step: Attempt::Backoff(delay),
            ..
        } => {
            delay.as_mut().await;
            Event::BackoffElapsed
        }
        Phase::Granted {
            watch: Some(session),
        } => {
            tokio::select! {
                update = session.updates.next() => Event::WatchUpdate(update),
                _ = session.expires.as_mut() => Event::WatchExpired,
            }
        }
        _ => std::future::pending().await,
    }
}
