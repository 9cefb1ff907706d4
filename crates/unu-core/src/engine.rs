//! Lock, unlock and auxiliary commands.
//!
//! Command sequences run in the caller's task and talk to the manager only
//! through requests, so telemetry keeps flowing while a sequence sleeps. One
//! lock/unlock sequence may run at a time per manager; a second one is
//! rejected with [`Error::CommandInProgress`].
//!
//! Every suspension point observes the connection's cancellation token, so a
//! link loss, a disconnect or [`ScooterHandle::abort`] ends the sequence with
//! [`Error::Cancelled`].

use std::time::Duration;

use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use unu_types::{CharacteristicRole, LockState, ScooterState};

use crate::commands::{BLINKER_BOTH, BLINKER_OFF, Command};
use crate::error::{Error, Result};
use crate::events::ScooterEvent;
use crate::manager::{Request, ScooterHandle};

const WAKE_FAILED: &str = "Could not wake scooter to standby.";
const RESTART_FAILED: &str = "The scooter did not acknowledge our wake-up request.";
const LOCK_FAILED: &str =
    "The handlebar wasn't in a lockable position.\nThe scooter is off but still unlocked.";

impl ScooterHandle {
    /// Lock the scooter, waking it first if needed, and verify the handlebar.
    ///
    /// # Errors
    ///
    /// - [`Error::CommandInProgress`] if another sequence is running
    /// - [`Error::NotConnected`] without a connection
    /// - [`Error::WakeTimeout`] if the scooter does not reach standby
    /// - [`Error::LockVerificationFailed`] if the handlebar stays unlocked
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn lock(&self) -> Result<()> {
        let _guard = self
            .sequence
            .try_lock()
            .map_err(|_| Error::CommandInProgress)?;
        let session = self.session().await?;
        self.run_state_command(Command::Lock, &session).await
    }

    /// Unlock the scooter, waking it first if needed.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn unlock(&self) -> Result<()> {
        let _guard = self
            .sequence
            .try_lock()
            .map_err(|_| Error::CommandInProgress)?;
        let session = self.session().await?;
        self.run_state_command(Command::Unlock, &session).await
    }

    /// Unlock, wait for the scooter to settle into standby, then lock.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn restart_and_lock(&self) -> Result<()> {
        let _guard = self
            .sequence
            .try_lock()
            .map_err(|_| Error::CommandInProgress)?;
        let session = self.session().await?;

        self.run_state_command(Command::Unlock, &session).await?;

        if let Err(e) = self.wait_for_standby(&session).await {
            if matches!(e, Error::WakeTimeout) {
                warn!("No standby after unlock");
                self.set_status("Could not wake scooter.")?;
                self.emit(ScooterEvent::WakeFailed {
                    message: RESTART_FAILED.to_string(),
                })?;
            }
            return Err(e);
        }

        self.run_state_command(Command::Lock, &session).await
    }

    /// Open the seat box.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn open_seat(&self) -> Result<()> {
        self.send_command(&Command::OpenSeat).await
    }

    /// Set the blinkers, e.g. `"left"`, `"right"`, `"both"` or `"off"`.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn send_blinker(&self, state: &str) -> Result<()> {
        self.send_command(&Command::Blinker(state.to_string())).await
    }

    /// Flip the hazard lights and return whether they are now on.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn toggle_hazards(&self) -> Result<bool> {
        let on = !self.snapshot().hazards_on;
        let state = if on { BLINKER_BOTH } else { BLINKER_OFF };
        self.send_command(&Command::Blinker(state.to_string()))
            .await?;
        self.send(Request::SetHazards(on))?;
        Ok(on)
    }

    /// Request a read of a resolved characteristic. The value arrives in the
    /// snapshot.
    pub async fn read(&self, role: CharacteristicRole) -> Result<()> {
        self.call(|reply| Request::Read { role, reply }).await?
    }

    async fn send_command(&self, command: &Command) -> Result<()> {
        info!("Sending {}", command);
        self.write(command.role(), command.payload()).await
    }

    async fn write(&self, role: CharacteristicRole, payload: Vec<u8>) -> Result<()> {
        self.call(|reply| Request::Write {
            role,
            payload,
            reply,
        })
        .await?
    }

    async fn session(&self) -> Result<CancellationToken> {
        self.call(|reply| Request::Session { reply }).await?
    }

    async fn is_resolved(&self, role: CharacteristicRole) -> Result<bool> {
        self.call(|reply| Request::Resolved { role, reply }).await
    }

    async fn pause(duration: Duration, session: &CancellationToken) -> Result<()> {
        tokio::select! {
            _ = session.cancelled() => Err(Error::Cancelled),
            _ = sleep(duration) => Ok(()),
        }
    }

    fn check(session: &CancellationToken) -> Result<()> {
        if session.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Wake, send `command`, then read back the handlebar state.
    async fn run_state_command(&self, command: Command, session: &CancellationToken) -> Result<()> {
        let locking = matches!(command, Command::Lock);

        self.ensure_awake(session).await?;
        Self::check(session)?;

        self.set_status(if locking { "Locking..." } else { "Unlocking..." })?;
        self.send_command(&command).await?;

        Self::pause(self.timings.verify_delay, session).await?;
        if let Err(e) = self.read(CharacteristicRole::HandlebarLock).await {
            warn!("Handlebar read after {} failed: {}", command, e);
        }
        Self::pause(self.timings.settle_delay, session).await?;

        if locking && self.snapshot().lock_state == LockState::Unlocked {
            warn!("Handlebar still unlocked after lock");
            self.emit(ScooterEvent::LockVerificationFailed {
                message: LOCK_FAILED.to_string(),
            })?;
            return Err(Error::LockVerificationFailed {
                message: LOCK_FAILED.to_string(),
            });
        }
        debug!("{} complete", command);
        Ok(())
    }

    /// Bring the scooter to standby unless it is already awake.
    async fn ensure_awake(&self, session: &CancellationToken) -> Result<()> {
        let state = self.snapshot().scooter_state;
        if state.is_awake() {
            debug!("Scooter already awake ({})", state);
            return Ok(());
        }
        if !self.is_resolved(CharacteristicRole::HibernationWake).await? {
            debug!("No hibernation wake characteristic, skipping wake");
            return Ok(());
        }

        info!("Waking scooter from {}", state);
        self.set_status("Waking scooter...")?;
        self.send_command(&Command::WakeUp).await?;

        match self.wait_for_standby(session).await {
            Err(Error::WakeTimeout) => {
                warn!("Scooter did not reach standby");
                self.set_status("Could not wake scooter.")?;
                self.emit(ScooterEvent::WakeFailed {
                    message: WAKE_FAILED.to_string(),
                })?;
                Err(Error::WakeTimeout)
            }
            other => other,
        }
    }

    /// Poll the scooter state until standby or the wake timeout.
    async fn wait_for_standby(&self, session: &CancellationToken) -> Result<()> {
        let deadline = Instant::now() + self.timings.wake_timeout;
        loop {
            Self::check(session)?;
            if self.snapshot().scooter_state == ScooterState::Standby {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::WakeTimeout);
            }
            if let Err(e) = self.read(CharacteristicRole::ScooterState).await {
                debug!("State poll failed: {}", e);
            }
            Self::pause(self.timings.wake_poll_interval, session).await?;
        }
    }
}
