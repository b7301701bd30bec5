//! One blood pressure measurement transaction.
//!
//! ```text
//! Idle -> Subscribed -> CommandSent -> Accumulating -> Complete -> Settling -> Done
//!              \              \              \
//!               +--------------+--------------+--> Canceled
//! ```
//!
//! The outcome is fixed by a single-assignment [`Settlement`]: the first of
//! "complete frame", "cancel", "deadline" or "link lost" wins and every later
//! attempt is a no-op. Each session owns a fresh settlement, so a late frame
//! from an earlier session can never resolve a newer one.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::oneshot;

use crate::core::bluetooth::adapter::BleAdapter;
use crate::core::bluetooth::commands::{CommandSender, FeatureCommand, FeatureCommandSender};
use crate::core::bluetooth::constants::{DEFAULT_SESSION_TIMEOUT_SECS, DEFAULT_SETTLE_DELAY_MS};
use crate::core::bluetooth::error::{BpError, BpResult};
use crate::core::bluetooth::notification::NotificationSubscriber;
use crate::core::bluetooth::types::CharacteristicHandle;
use crate::core::reading::{FrameKind, Reading};

/// Where a session is in its lifecycle. Ordered so progress only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionPhase {
    Idle,
    Subscribed,
    CommandSent,
    Accumulating,
    Complete,
    Settling,
    Done,
    Canceled,
    Error,
}

/// How a session that did not fail ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed(Reading),
    Canceled,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionTiming {
    /// Grace interval between the final frame and reporting
    pub settle_delay: Duration,
    /// Bound on the whole session
    pub deadline: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
            deadline: Duration::from_secs(DEFAULT_SESSION_TIMEOUT_SECS),
        }
    }
}

/// Single-assignment slot. The first `settle` delivers its value; later calls do nothing.
pub struct Settlement<T> {
    slot: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> Settlement<T> {
    /// A fresh slot and the receiver that observes whichever value wins.
    pub fn channel() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                slot: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// Returns true if this call fixed the outcome.
    pub fn settle(&self, value: T) -> bool {
        let sender = match self.slot.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }

    pub fn is_settled(&self) -> bool {
        match self.slot.lock() {
            Ok(slot) => slot.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }
}

enum SessionSignal {
    Complete(Reading),
    Cancel(oneshot::Sender<BpResult<()>>),
    Deadline,
    LinkLost,
}

/// Handle for observing and canceling a session from outside its task.
#[derive(Clone)]
pub struct SessionControl {
    settlement: Arc<Settlement<SessionSignal>>,
    phase: Arc<Mutex<SessionPhase>>,
}

impl SessionControl {
    pub fn phase(&self) -> SessionPhase {
        match self.phase.lock() {
            Ok(phase) => *phase,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn is_settled(&self) -> bool {
        self.settlement.is_settled()
    }

    /// Asks the session to stop. The session writes the cancel command, then
    /// unsubscribes, whatever the write outcome; a failed write is returned here.
    /// Returns `Ok(false)` when the outcome was already fixed (for example the
    /// reading completed first), in which case nothing is written.
    pub async fn cancel(&self) -> BpResult<bool> {
        let (reply, written) = oneshot::channel();
        if !self.settlement.settle(SessionSignal::Cancel(reply)) {
            info!("No reading in progress to cancel");
            return Ok(false);
        }
        match written.await {
            Ok(result) => result.map(|()| true),
            Err(_) => Ok(false),
        }
    }

    fn advance(&self, to: SessionPhase) {
        self.update(|phase| {
            if *phase < to {
                *phase = to;
            }
        });
    }

    fn set(&self, to: SessionPhase) {
        self.update(|phase| *phase = to);
    }

    fn update(&self, f: impl FnOnce(&mut SessionPhase)) {
        let mut phase = match self.phase.lock() {
            Ok(phase) => phase,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = *phase;
        f(&mut phase);
        if before != *phase {
            debug!("Session phase: {:?} -> {:?}", before, *phase);
        }
    }
}

/// A session whose control handle exists before the device is ready.
/// Lets a caller claim (and cancel) the session while connecting.
pub struct PendingSession {
    control: SessionControl,
    signals: oneshot::Receiver<SessionSignal>,
}

impl PendingSession {
    pub fn new() -> Self {
        let (settlement, signals) = Settlement::channel();
        Self {
            control: SessionControl {
                settlement: Arc::new(settlement),
                phase: Arc::new(Mutex::new(SessionPhase::Idle)),
            },
            signals,
        }
    }

    pub fn control(&self) -> SessionControl {
        self.control.clone()
    }

    /// Answers a cancel that arrived before the session started, without
    /// touching the cuff. Returns true when the session is already over.
    pub fn acknowledge_early_cancel(&mut self) -> bool {
        if !self.control.is_settled() {
            return false;
        }
        match self.signals.try_recv() {
            Ok(SessionSignal::Cancel(reply)) => {
                info!("Reading canceled before it started");
                self.control.set(SessionPhase::Canceled);
                let _ = reply.send(Ok(()));
                true
            }
            Ok(_) => {
                self.control.set(SessionPhase::Error);
                true
            }
            // Settled but not yet delivered: `run` will pick the signal up.
            Err(_) => false,
        }
    }

    pub fn start<A: BleAdapter>(
        self,
        adapter: Arc<A>,
        measurement: CharacteristicHandle<A>,
        feature: CharacteristicHandle<A>,
        timing: SessionTiming,
    ) -> ReadingSession<A> {
        ReadingSession {
            subscriber: NotificationSubscriber::new(adapter.clone()),
            commands: FeatureCommandSender::new(adapter, feature),
            measurement,
            timing,
            control: self.control,
            signals: self.signals,
        }
    }
}

impl Default for PendingSession {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ReadingSession<A: BleAdapter> {
    subscriber: NotificationSubscriber<A>,
    commands: FeatureCommandSender<A>,
    measurement: CharacteristicHandle<A>,
    timing: SessionTiming,
    control: SessionControl,
    signals: oneshot::Receiver<SessionSignal>,
}

enum Wake {
    Signal(Option<SessionSignal>),
    Deadline,
    LinkLost,
    StreamClosed,
}

impl<A: BleAdapter> ReadingSession<A> {
    pub fn new(
        adapter: Arc<A>,
        measurement: CharacteristicHandle<A>,
        feature: CharacteristicHandle<A>,
        timing: SessionTiming,
    ) -> Self {
        PendingSession::new().start(adapter, measurement, feature, timing)
    }

    pub fn control(&self) -> SessionControl {
        self.control.clone()
    }

    /// Runs the transaction to its end. The subscription is released on every path.
    pub async fn run(self) -> BpResult<SessionOutcome> {
        let Self {
            subscriber,
            commands,
            measurement,
            timing,
            control,
            mut signals,
        } = self;
        info!("Starting blood pressure reading");

        let frame_control = control.clone();
        let mut accumulator = Reading::default();
        let subscribed = subscriber
            .subscribe(&measurement, move |frame| {
                if frame_control.is_settled() {
                    debug!("Dropping {}-byte frame after the reading settled", frame.len());
                    return;
                }
                match accumulator.apply_frame(frame) {
                    FrameKind::Complete => {
                        if frame_control
                            .settlement
                            .settle(SessionSignal::Complete(accumulator))
                        {
                            frame_control.advance(SessionPhase::Complete);
                            info!("Reading complete: {}", accumulator);
                        }
                    }
                    FrameKind::Partial => {
                        frame_control.advance(SessionPhase::Accumulating);
                        debug!("Cuff pressure: {} mmHg", accumulator.systolic);
                    }
                    FrameKind::Ignored => debug!("Ignoring {}-byte frame", frame.len()),
                }
            })
            .await;
        let mut subscription = match subscribed {
            Ok(subscription) => subscription,
            Err(e) => {
                error!("Failed to subscribe to measurements: {}", e);
                control.set(SessionPhase::Error);
                return Err(e);
            }
        };
        control.advance(SessionPhase::Subscribed);

        // A cancel that arrived while subscribing skips the start command.
        if !control.is_settled() {
            if let Err(e) = commands.send_command(FeatureCommand::StartReading).await {
                error!("Failed to start reading: {}", e);
                if let Some(hint) = e.hint() {
                    warn!("{}", hint);
                }
                control.set(SessionPhase::Error);
                subscriber.unsubscribe(&mut subscription).await;
                return Err(e);
            }
            control.advance(SessionPhase::CommandSent);
        }

        let link = measurement.link().clone();
        let stream_closed = subscription.closed();
        let wake = tokio::select! {
            signal = &mut signals => Wake::Signal(signal.ok()),
            _ = tokio::time::sleep(timing.deadline) => Wake::Deadline,
            _ = link.cancelled() => Wake::LinkLost,
            _ = stream_closed.cancelled() => Wake::StreamClosed,
        };
        let signal = match wake {
            Wake::Signal(signal) => signal,
            Wake::Deadline => {
                control.settlement.settle(SessionSignal::Deadline);
                signals.await.ok()
            }
            Wake::LinkLost => {
                control.settlement.settle(SessionSignal::LinkLost);
                signals.await.ok()
            }
            Wake::StreamClosed => {
                warn!("Measurement notifications stopped before the reading completed");
                control.settlement.settle(SessionSignal::LinkLost);
                signals.await.ok()
            }
        };

        match signal {
            Some(SessionSignal::Complete(reading)) => {
                control.advance(SessionPhase::Settling);
                info!(
                    "Waiting {} ms for the cuff to finish its cycle",
                    timing.settle_delay.as_millis()
                );
                tokio::time::sleep(timing.settle_delay).await;
                subscriber.unsubscribe(&mut subscription).await;
                control.advance(SessionPhase::Done);
                Ok(SessionOutcome::Completed(reading))
            }
            Some(SessionSignal::Cancel(reply)) => {
                info!("Canceling blood pressure reading");
                let written = commands.send_command(FeatureCommand::CancelReading).await;
                subscriber.unsubscribe(&mut subscription).await;
                control.set(SessionPhase::Canceled);
                if let Err(e) = &written {
                    warn!("Cancel command failed: {}", e);
                }
                let _ = reply.send(written);
                Ok(SessionOutcome::Canceled)
            }
            Some(SessionSignal::Deadline) => {
                error!(
                    "No complete reading within {} s, stopping the cuff",
                    timing.deadline.as_secs()
                );
                if let Err(e) = commands.send_command(FeatureCommand::CancelReading).await {
                    warn!("Failed to stop the cuff after timeout: {}", e);
                }
                subscriber.unsubscribe(&mut subscription).await;
                control.set(SessionPhase::Error);
                Err(BpError::SessionTimedOut(timing.deadline.as_secs()))
            }
            Some(SessionSignal::LinkLost) | None => {
                error!("Connection lost during reading");
                subscriber.unsubscribe(&mut subscription).await;
                control.set(SessionPhase::Error);
                Err(BpError::NotConnected)
            }
        }
    }
}
