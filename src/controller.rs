use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

use futures_lite::future::Boxed;
use num_enum::{FromPrimitive, IntoPrimitive};
use tokio::sync::mpsc::UnboundedSender;

use crate::l2cap::{ConnectError, L2capSocket};

/// 6-byte Bluetooth device address (BD_ADDR).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Address(pub [u8; 6]);

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}", a, b, c, d, e, g)
    }
}

impl Debug for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[error("not a valid bluetooth address")]
pub struct InvalidAddress;

impl FromStr for Address {
    type Err = InvalidAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or(InvalidAddress)?;
            *byte = u8::from_str_radix(part, 16).map_err(|_| InvalidAddress)?;
        }
        match parts.next() {
            None => Ok(Self(bytes)),
            Some(_) => Err(InvalidAddress)
        }
    }
}

/// Address-type discriminator as reported by the controller.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum AddressType {
    #[default]
    BrEdr = 0x00,
    LePublic = 0x01,
    LeRandom = 0x02,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DeviceEvent {
    Updated
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum CallbackError {
    #[error("the device callback slot is already occupied")]
    SlotOccupied,
}

/// Handle to a remote device, owned by the Bluetooth controller.
///
/// The callback slot is single-occupancy: whoever registered it must
/// unregister before another observer can take it.
pub trait Device: Send + Sync {
    fn local_address(&self) -> Address;
    fn remote_address(&self) -> Address;
    fn address_type(&self) -> AddressType;
    fn is_connected(&self) -> bool;
    fn is_bonded(&self) -> bool;
    fn register_callback(&self, events: UnboundedSender<DeviceEvent>) -> Result<(), CallbackError>;
    fn unregister_callback(&self);
    /// Open an L2CAP channel to the remote device on the given PSM.
    fn open_l2cap(&self, psm: u16) -> Boxed<Result<L2capSocket, ConnectError>>;
}

/// The external Bluetooth controller collaborator.
pub trait BluetoothController: Send + Sync {
    fn device(&self, address: Address) -> Option<Arc<dyn Device>>;
}
