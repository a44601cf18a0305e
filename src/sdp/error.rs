use instructor::{Exstruct, Instruct};
use thiserror::Error;

use crate::l2cap::{ConnectError, Disconnected};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum Error {
    #[error("the sdp channel has been disconnected")]
    Disconnected,
    #[error("the transaction did not complete in time")]
    Timeout,
    #[error("invalid continuation state")]
    InvalidContinuationState,
    #[error("unexpected data type")]
    UnexpectedDataType,
    #[error("malformed packet content")]
    MalformedPacketContent,
    #[error("unexpected packet length")]
    UnexpectedPacketLength,
    #[error("response carries an unknown transaction id")]
    UnexpectedTransactionId,
    #[error("the server rejected the request: {0}")]
    ErrorResponse(SdpErrorCode),
    #[error("failed to open the sdp channel: {0}")]
    Connect(ConnectError),
}

impl From<instructor::Error> for Error {
    fn from(value: instructor::Error) -> Self {
        use instructor::Error::*;
        match value {
            TooShort => Self::UnexpectedPacketLength,
            TooLong => Self::UnexpectedPacketLength,
            InvalidValue => Self::MalformedPacketContent,
            UnexpectedLength => Self::UnexpectedPacketLength
        }
    }
}

impl From<Disconnected> for Error {
    fn from(_: Disconnected) -> Self {
        Self::Disconnected
    }
}

impl From<ConnectError> for Error {
    fn from(value: ConnectError) -> Self {
        Self::Connect(value)
    }
}

// ([Vol 3] Part B, Section 4.4.1).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Instruct, Exstruct, Error)]
#[repr(u16)]
#[instructor(endian = "big")]
pub enum SdpErrorCode {
    #[error("invalid/unsupported SDP version")]
    InvalidSdpVersion = 0x0001,
    #[error("invalid service record handle")]
    InvalidServiceRecordHandle = 0x0002,
    #[error("invalid request syntax")]
    InvalidRequestSyntax = 0x0003,
    #[error("invalid PDU size")]
    InvalidPduSize = 0x0004,
    #[error("invalid continuation state")]
    InvalidContinuationState = 0x0005,
    #[error("insufficient resources to satisfy request")]
    InsufficientResources = 0x0006,
}
