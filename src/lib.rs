pub mod a2dp;
pub mod avdtp;
pub mod controller;
pub mod l2cap;
pub mod sdp;
pub mod sink;
pub mod utils;

#[cfg(test)]
mod testing;

pub use controller::{Address, AddressType, BluetoothController, Device, DeviceEvent};
pub use sink::{AssignError, Config, ReturnCode, SinkManager, SinkStatus};
