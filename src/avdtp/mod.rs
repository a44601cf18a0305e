pub mod capabilities;
mod error;
pub(crate) mod packets;

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use instructor::{Buffer, BufferMut};
use tracing::{debug, trace, warn};

use crate::avdtp::capabilities::Capability;
use crate::avdtp::packets::{MessageType, SeidField, SignalChannelExt, SignalMessage, SignalMessageAssembler};
use crate::controller::Device;
use crate::ensure;
use crate::l2cap::{L2capSocket, OPEN_TIMEOUT};

pub use error::{Error, ErrorCode};
pub use packets::{AudioCodec, MediaType, ServiceCategory, SignalIdentifier, StreamEndpoint, StreamEndpointType, MAX_SIGNAL_SIZE};

/// Response deadline for a single signalling transaction.
pub const SIGNALLING_TIMEOUT: Duration = Duration::from_secs(2);

/// States of the negotiated stream endpoint ([AVDTP] Section 6.5).
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub enum StreamState {
    #[default]
    Idle,
    Configured,
    Open,
    Streaming,
}

/// AVDTP signalling client (the INT role).
///
/// Transactions are strictly serialized: every operation takes `&mut self`
/// and completes or times out before the next one starts, so at most one
/// transaction label is outstanding at any time.
pub struct AvdtpClient {
    socket: L2capSocket,
    assembler: SignalMessageAssembler,
    next_label: u8,
    state: StreamState,
    seid: Option<u8>,
}

impl AvdtpClient {

    /// Opens the signalling channel on the peer-advertised PSM.
    pub async fn connect(device: &dyn Device, psm: u16) -> Result<Self, Error> {
        let socket = tokio::time::timeout(OPEN_TIMEOUT, device.open_l2cap(psm))
            .await
            .map_err(|_| Error::Timeout)??;
        debug!("AVDTP signalling channel to {} is operational", device.remote_address());
        Ok(Self {
            socket,
            assembler: SignalMessageAssembler::default(),
            next_label: 0,
            state: StreamState::Idle,
            seid: None,
        })
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn seid(&self) -> Option<u8> {
        self.seid
    }

    /// ([AVDTP] Section 8.6).
    pub async fn discover(&mut self) -> Result<Vec<StreamEndpoint>, Error> {
        let mut response = self.request(SignalIdentifier::Discover, Bytes::new()).await?;
        let endpoints: Vec<StreamEndpoint> = response.read_be()?;
        debug!("Discovered {} stream endpoint(s)", endpoints.len());
        for endpoint in &endpoints {
            trace!("  seid 0x{:02x}: {:?} {:?}{}", endpoint.seid, endpoint.media_type, endpoint.tsep,
                if endpoint.in_use { " (in use)" } else { "" });
        }
        Ok(endpoints)
    }

    /// ([AVDTP] Section 8.7).
    pub async fn get_capabilities(&mut self, seid: u8) -> Result<Vec<Capability>, Error> {
        let mut response = self.request(SignalIdentifier::GetCapabilities, seid_payload(seid)).await?;
        Ok(response.read()?)
    }

    /// Configures the remote endpoint `acp_seid` from the local endpoint
    /// `int_seid` ([AVDTP] Section 8.9). Idle -> Configured.
    pub async fn set_configuration(&mut self, acp_seid: u8, int_seid: u8, capabilities: &[Capability]) -> Result<(), Error> {
        ensure!(self.state == StreamState::Idle, Error::BadState);
        let mut payload = BytesMut::new();
        payload.write_be(&SeidField { seid: acp_seid });
        payload.write_be(&SeidField { seid: int_seid });
        for capability in capabilities {
            payload.write_be(capability);
        }
        self.request(SignalIdentifier::SetConfiguration, payload.freeze()).await?;
        self.seid = Some(acp_seid);
        self.state = StreamState::Configured;
        Ok(())
    }

    /// ([AVDTP] Section 8.10).
    pub async fn get_configuration(&mut self, seid: u8) -> Result<Vec<Capability>, Error> {
        ensure!(self.state != StreamState::Idle, Error::BadState);
        let mut response = self.request(SignalIdentifier::GetConfiguration, seid_payload(seid)).await?;
        Ok(response.read()?)
    }

    /// ([AVDTP] Section 8.12). Configured -> Open.
    pub async fn open(&mut self, seid: u8) -> Result<(), Error> {
        ensure!(self.state == StreamState::Configured, Error::BadState);
        self.request(SignalIdentifier::Open, seid_payload(seid)).await?;
        self.state = StreamState::Open;
        Ok(())
    }

    /// ([AVDTP] Section 8.13). Open -> Streaming.
    pub async fn start(&mut self, seid: u8) -> Result<(), Error> {
        ensure!(self.state == StreamState::Open, Error::BadState);
        self.request(SignalIdentifier::Start, seid_payload(seid)).await?;
        self.state = StreamState::Streaming;
        Ok(())
    }

    /// ([AVDTP] Section 8.15). Streaming -> Open.
    pub async fn suspend(&mut self, seid: u8) -> Result<(), Error> {
        ensure!(self.state == StreamState::Streaming, Error::BadState);
        self.request(SignalIdentifier::Suspend, seid_payload(seid)).await?;
        self.state = StreamState::Open;
        Ok(())
    }

    /// ([AVDTP] Section 8.14). Open/Streaming -> Configured.
    pub async fn close(&mut self, seid: u8) -> Result<(), Error> {
        ensure!(matches!(self.state, StreamState::Open | StreamState::Streaming), Error::BadState);
        self.request(SignalIdentifier::Close, seid_payload(seid)).await?;
        self.state = StreamState::Configured;
        Ok(())
    }

    /// Escape hatch from every non-idle state ([AVDTP] Section 8.16).
    pub async fn abort(&mut self, seid: u8) -> Result<(), Error> {
        ensure!(self.state != StreamState::Idle, Error::BadState);
        self.request(SignalIdentifier::Abort, seid_payload(seid)).await?;
        self.state = StreamState::Idle;
        self.seid = None;
        Ok(())
    }

    fn allocate_label(&mut self) -> u8 {
        let label = self.next_label;
        self.next_label = (self.next_label + 1) % 16;
        label
    }

    async fn request(&mut self, signal: SignalIdentifier, payload: Bytes) -> Result<Bytes, Error> {
        let label = self.allocate_label();
        trace!("Sending {:?} (label {})", signal, label);
        self.socket.send_signal(SignalMessage {
            transaction_label: label,
            message_type: MessageType::Command,
            signal_identifier: signal,
            data: payload,
        })?;
        tokio::time::timeout(SIGNALLING_TIMEOUT, self.wait_for_response(label, signal))
            .await
            .map_err(|_| Error::Timeout)?
    }

    async fn wait_for_response(&mut self, label: u8, signal: SignalIdentifier) -> Result<Bytes, Error> {
        loop {
            let packet = self.socket.recv().await.ok_or(Error::Disconnected)?;
            let Some(message) = self.assembler.process_msg(packet)? else {
                continue;
            };
            if message.message_type == MessageType::Command {
                // Not acting as an acceptor; turn peer commands away.
                warn!("Rejecting unexpected {:?} command from the peer", message.signal_identifier);
                let reject = SignalMessage {
                    transaction_label: message.transaction_label,
                    message_type: MessageType::GeneralReject,
                    signal_identifier: message.signal_identifier,
                    data: Bytes::new(),
                };
                self.socket.send_signal(reject)?;
                continue;
            }
            if message.transaction_label != label || message.signal_identifier != signal {
                warn!("Discarding stale response: {:?} (label {})", message.signal_identifier, message.transaction_label);
                continue;
            }
            let mut data = message.data;
            return match message.message_type {
                MessageType::ResponseAccept => Ok(data),
                MessageType::GeneralReject => Err(Error::NotSupported(signal)),
                MessageType::ResponseReject => {
                    // SetConfiguration rejections name the offending category
                    // ([AVDTP] Section 8.9.3).
                    let category = matches!(signal, SignalIdentifier::SetConfiguration | SignalIdentifier::Reconfigure)
                        .then(|| data.read_be::<ServiceCategory>())
                        .transpose()?;
                    let code: ErrorCode = data.read_be()?;
                    Err(Error::Rejected { category, code })
                },
                MessageType::Command => unreachable!(),
            };
        }
    }

}

fn seid_payload(seid: u8) -> Bytes {
    let mut payload = BytesMut::new();
    payload.write_be(&SeidField { seid });
    payload.freeze()
}
