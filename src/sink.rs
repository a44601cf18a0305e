use std::fmt::{Display, Formatter};
use std::sync::Arc;

use num_enum::IntoPrimitive;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::a2dp::{A2dpSession, SessionCommand, SessionError};
use crate::controller::{Address, BluetoothController, InvalidAddress};

/// Externally observable state of the assigned audio sink.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum SinkStatus {
    #[default]
    Unassigned,
    Disconnected,
    Idle,
    Configured,
    Open,
    Streaming,
}

impl Display for SinkStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SinkStatus::Unassigned => "unassigned",
            SinkStatus::Disconnected => "disconnected",
            SinkStatus::Idle => "idle",
            SinkStatus::Configured => "configured",
            SinkStatus::Open => "open",
            SinkStatus::Streaming => "streaming",
        })
    }
}

/// Publishes a status transition, once per change.
pub(crate) fn publish(status: &watch::Sender<SinkStatus>, new: SinkStatus) {
    status.send_if_modified(|current| {
        if *current == new {
            return false;
        }
        info!("Audio sink status: {}", new);
        *current = new;
        true
    });
}

#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// Callsign of the Bluetooth controller collaborator.
    pub controller: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            controller: "BluetoothControl".to_string(),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum AssignError {
    #[error("an audio sink device is already assigned")]
    AlreadyConnected,
    #[error("the device is not known to the controller")]
    UnknownKey,
    #[error("the bluetooth controller is unavailable")]
    Unavailable,
    #[error("not a valid device address")]
    BadArgument,
    #[error("failed to attach to the device")]
    General,
}

impl From<InvalidAddress> for AssignError {
    fn from(_: InvalidAddress) -> Self {
        Self::BadArgument
    }
}

/// Numeric result codes surfaced on the JSON-RPC control surface.
#[derive(Debug, Copy, Clone, Eq, PartialEq, IntoPrimitive)]
#[repr(u32)]
pub enum ReturnCode {
    Ok = 0,
    General = 1,
    Unavailable = 2,
    AlreadyConnected = 3,
    UnknownKey = 4,
    BadArgument = 5,
}

impl From<Result<(), AssignError>> for ReturnCode {
    fn from(value: Result<(), AssignError>) -> Self {
        match value {
            Ok(()) => ReturnCode::Ok,
            Err(AssignError::AlreadyConnected) => ReturnCode::AlreadyConnected,
            Err(AssignError::UnknownKey) => ReturnCode::UnknownKey,
            Err(AssignError::Unavailable) => ReturnCode::Unavailable,
            Err(AssignError::BadArgument) => ReturnCode::BadArgument,
            Err(AssignError::General) => ReturnCode::General,
        }
    }
}

/// Maps a single assigned device address to one A2DP session.
pub struct SinkManager {
    config: Config,
    controller: Option<Arc<dyn BluetoothController>>,
    session: Mutex<Option<(Address, A2dpSession)>>,
    status: Arc<watch::Sender<SinkStatus>>,
}

impl SinkManager {

    pub fn new(config: Config, controller: Option<Arc<dyn BluetoothController>>) -> Self {
        let (status, _) = watch::channel(SinkStatus::Unassigned);
        Self {
            config,
            controller,
            session: Mutex::new(None),
            status: Arc::new(status),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Creates the session for `address`. At most one device can be
    /// assigned; call [`SinkManager::revoke`] first to switch devices.
    pub fn assign(&self, address: Address) -> Result<(), AssignError> {
        let mut slot = self.session.lock();
        if slot.is_some() {
            return Err(AssignError::AlreadyConnected);
        }
        let controller = self.controller.as_ref().ok_or(AssignError::Unavailable)?;
        let device = controller.device(address).ok_or(AssignError::UnknownKey)?;
        let session = A2dpSession::attach(device, self.status.clone()).map_err(|err| {
            warn!("Failed to attach to {}: {}", address, err);
            AssignError::General
        })?;
        info!("Assigned audio sink device {}", address);
        *slot = Some((address, session));
        Ok(())
    }

    /// Parses and assigns a BD_ADDR string from the control surface.
    pub fn assign_str(&self, device: &str) -> Result<(), AssignError> {
        self.assign(device.parse()?)
    }

    /// Destroys the current session, if any. Idempotent.
    pub async fn revoke(&self) {
        let session = self.session.lock().take();
        if let Some((address, session)) = session {
            info!("Revoking audio sink device {}", address);
            session.detach().await;
        }
        publish(&self.status, SinkStatus::Unassigned);
    }

    /// The assigned device, if any.
    pub fn device(&self) -> Option<Address> {
        self.session.lock().as_ref().map(|(address, _)| *address)
    }

    pub fn status(&self) -> SinkStatus {
        match self.session.lock().is_some() {
            true => *self.status.borrow(),
            false => SinkStatus::Unassigned,
        }
    }

    /// Status stream for `statechange` notifications.
    pub fn subscribe(&self) -> watch::Receiver<SinkStatus> {
        self.status.subscribe()
    }

    /// Starts the negotiated stream (open -> streaming).
    pub async fn start(&self) -> Result<(), SessionError> {
        self.dispatch(SessionCommand::Start).await
    }

    /// Suspends the negotiated stream (streaming -> open).
    pub async fn suspend(&self) -> Result<(), SessionError> {
        self.dispatch(SessionCommand::Suspend).await
    }

    async fn dispatch(&self, command: SessionCommand) -> Result<(), SessionError> {
        let pending = {
            let slot = self.session.lock();
            let (_, session) = slot.as_ref().ok_or(SessionError::NoStream)?;
            session.dispatch(command)?
        };
        pending.await.map_err(|_| SessionError::Closed)?
    }

}
