//! Consensus timers.
//!
//! Two timers drive the Herder: the **trigger** timer paces nominations
//! so consecutive triggers are at least the expected ledger timespan
//! apart, and the **bump** timer advances the ballot counter when a
//! quorum was heard but the slot did not externalize in time.
//!
//! The manager runs as a background task fed by a command channel. At
//! most one timer of each kind exists at any moment: scheduling replaces
//! the previous deadline, cancelling clears it. Commands and expirations
//! are processed by the same task, so a cancelled timer never fires.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, trace};

use drover_common::SlotIndex;
use drover_fba::Ballot;

/// Commands sent to the timer task.
enum TimerCommand {
    ScheduleTrigger { duration: Duration },
    ScheduleBump {
        slot: SlotIndex,
        ballot: Ballot,
        duration: Duration,
    },
    CancelTrigger,
    CancelBump,
    Shutdown,
}

/// Receives timer expirations.
pub trait TimerCallback: Send + Sync + 'static {
    /// The trigger timer fired: nominate for the next slot.
    fn on_trigger(&self);

    /// The bump timer fired: the ballot for `slot` timed out.
    fn on_ballot_expiry(&self, slot: SlotIndex, ballot: Ballot);
}

/// Handle for commanding the timer task.
#[derive(Clone)]
pub struct TimerHandle {
    sender: mpsc::Sender<TimerCommand>,
}

impl TimerHandle {
    /// Arm (or re-arm) the trigger timer.
    pub fn schedule_trigger(&self, duration: Duration) -> bool {
        self.sender
            .try_send(TimerCommand::ScheduleTrigger { duration })
            .is_ok()
    }

    /// Arm (or re-arm) the bump timer for a ballot.
    pub fn schedule_bump(&self, slot: SlotIndex, ballot: Ballot, duration: Duration) -> bool {
        self.sender
            .try_send(TimerCommand::ScheduleBump {
                slot,
                ballot,
                duration,
            })
            .is_ok()
    }

    /// Cancel the trigger timer.
    pub fn cancel_trigger(&self) -> bool {
        self.sender.try_send(TimerCommand::CancelTrigger).is_ok()
    }

    /// Cancel the bump timer.
    pub fn cancel_bump(&self) -> bool {
        self.sender.try_send(TimerCommand::CancelBump).is_ok()
    }

    /// Stop the timer task.
    pub async fn shutdown(&self) {
        let _ = self.sender.send(TimerCommand::Shutdown).await;
    }
}

struct ActiveBump {
    expires_at: Instant,
    slot: SlotIndex,
    ballot: Ballot,
}

/// The timer task. Create with [`TimerManager::new`], then spawn
/// [`TimerManager::run`].
pub struct TimerManager<C: TimerCallback> {
    callback: Arc<C>,
    receiver: mpsc::Receiver<TimerCommand>,
    trigger: Option<Instant>,
    bump: Option<ActiveBump>,
}

impl<C: TimerCallback> TimerManager<C> {
    /// Create a timer manager and the handle that commands it.
    pub fn new(callback: Arc<C>) -> (TimerHandle, Self) {
        let (sender, receiver) = mpsc::channel(64);
        let handle = TimerHandle { sender };
        let manager = Self {
            callback,
            receiver,
            trigger: None,
            bump: None,
        };
        (handle, manager)
    }

    /// Run until shut down, firing callbacks as deadlines pass.
    pub async fn run(mut self) {
        info!("timer manager started");

        loop {
            let next_deadline = self.next_deadline();

            tokio::select! {
                cmd = self.receiver.recv() => {
                    match cmd {
                        Some(TimerCommand::ScheduleTrigger { duration }) => {
                            trace!(duration_ms = duration.as_millis() as u64, "arming trigger timer");
                            self.trigger = Some(Instant::now() + duration);
                        }
                        Some(TimerCommand::ScheduleBump { slot, ballot, duration }) => {
                            trace!(slot, counter = ballot.counter,
                                   duration_ms = duration.as_millis() as u64, "arming bump timer");
                            self.bump = Some(ActiveBump {
                                expires_at: Instant::now() + duration,
                                slot,
                                ballot,
                            });
                        }
                        Some(TimerCommand::CancelTrigger) => {
                            self.trigger = None;
                        }
                        Some(TimerCommand::CancelBump) => {
                            self.bump = None;
                        }
                        Some(TimerCommand::Shutdown) | None => {
                            info!("timer manager shutting down");
                            break;
                        }
                    }
                }

                _ = Self::sleep_until_or_forever(next_deadline) => {
                    self.fire_expired();
                }
            }
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        match (self.trigger, self.bump.as_ref().map(|b| b.expires_at)) {
            (Some(t), Some(b)) => Some(t.min(b)),
            (Some(t), None) => Some(t),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }

    async fn sleep_until_or_forever(deadline: Option<Instant>) {
        match deadline {
            Some(when) => {
                let now = Instant::now();
                if when > now {
                    sleep(when - now).await;
                }
            }
            None => std::future::pending::<()>().await,
        }
    }

    fn fire_expired(&mut self) {
        let now = Instant::now();

        if self.trigger.is_some_and(|t| t <= now) {
            self.trigger = None;
            debug!("trigger timer fired");
            self.callback.on_trigger();
        }

        if self.bump.as_ref().is_some_and(|b| b.expires_at <= now) {
            if let Some(bump) = self.bump.take() {
                debug!(slot = bump.slot, counter = bump.ballot.counter, "bump timer fired");
                self.callback.on_ballot_expiry(bump.slot, bump.ballot);
            }
        }
    }
}
