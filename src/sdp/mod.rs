mod data_element;
mod error;
pub mod ids;
mod service;

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use instructor::{Buffer, BufferMut, Exstruct, Instruct};
use tracing::{debug, trace};

use crate::controller::Device;
use crate::ensure;
use crate::l2cap::{L2capSocket, OPEN_TIMEOUT, SDP_PSM};

pub use data_element::{DataElement, Uuid};
pub use error::{Error, SdpErrorCode};
pub use service::{ProfileDescriptor, ProtocolDescriptor, Service};

// ([Vol 3] Part B, Section 4.2).
#[derive(Debug, Exstruct, Instruct)]
#[instructor(endian = "big")]
struct SdpHeader {
    pdu: PduId,
    transaction_id: u16,
    parameter_length: u16,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Exstruct, Instruct)]
#[repr(u8)]
enum PduId {
    ErrorResponse = 0x01,
    SearchRequest = 0x02,
    SearchResponse = 0x03,
    AttributeRequest = 0x04,
    AttributeResponse = 0x05,
    SearchAttributeRequest = 0x06,
    SearchAttributeResponse = 0x07,
}

// ([Vol 3] Part B, Section 4.3).
const MAX_CONTINUATION_STATE: usize = 16;
const MAX_ATTRIBUTE_BYTE_COUNT: u16 = 0x0400;
const FULL_ATTRIBUTE_RANGE: u32 = 0x0000_FFFF;

/// SDP client speaking ServiceSearchAttribute transactions over an L2CAP
/// channel to the well-known SDP PSM.
pub struct SdpClient {
    socket: L2capSocket,
    next_transaction_id: u16,
}

impl SdpClient {

    pub async fn connect(device: &dyn Device) -> Result<Self, Error> {
        let socket = tokio::time::timeout(OPEN_TIMEOUT, device.open_l2cap(SDP_PSM))
            .await
            .map_err(|_| Error::Timeout)??;
        debug!("SDP channel to {} is operational", device.remote_address());
        Ok(Self {
            socket,
            next_transaction_id: 0,
        })
    }

    /// Retrieves every service record matching `profile`, reassembling
    /// continuation-state fragments into a single attribute-list buffer.
    ///
    /// Records supporting one of `classes` are sorted to the front, keeping
    /// the server's order otherwise.
    pub async fn discover(&mut self, timeout: Duration, profile: Uuid, classes: &[Uuid]) -> Result<Vec<Service>, Error> {
        let mut services = tokio::time::timeout(timeout, self.service_search_attributes(&[profile]))
            .await
            .map_err(|_| Error::Timeout)??;
        services.sort_by_key(|service| !classes.iter().any(|class| service.is_class_supported(*class)));
        debug!("Discovered {} service(s)", services.len());
        for service in &services {
            service.dump();
        }
        Ok(services)
    }

    async fn service_search_attributes(&mut self, pattern: &[Uuid]) -> Result<Vec<Service>, Error> {
        let mut attribute_lists = BytesMut::new();
        let mut continuation = Bytes::new();
        loop {
            let transaction_id = self.allocate_transaction_id();
            self.send_request(transaction_id, pattern, &continuation)?;
            let response = self.socket.recv().await.ok_or(Error::Disconnected)?;
            continuation = process_response(transaction_id, response, &mut attribute_lists)?;
            if continuation.is_empty() {
                break;
            }
            trace!("Continuing service search ({} bytes so far)", attribute_lists.len());
        }

        let mut attribute_lists = attribute_lists.freeze();
        let element: DataElement = attribute_lists.read()?;
        attribute_lists.finish()?;
        element
            .as_sequence()?
            .iter()
            .map(Service::parse)
            .collect()
    }

    fn allocate_transaction_id(&mut self) -> u16 {
        let id = self.next_transaction_id;
        self.next_transaction_id = self.next_transaction_id.wrapping_add(1);
        id
    }

    fn send_request(&self, transaction_id: u16, pattern: &[Uuid], continuation: &Bytes) -> Result<(), Error> {
        let mut parameters = BytesMut::new();
        parameters.write(&DataElement::from_iter(pattern.iter().copied()));
        parameters.write_be(&MAX_ATTRIBUTE_BYTE_COUNT);
        parameters.write(&DataElement::from_iter([DataElement::U32(FULL_ATTRIBUTE_RANGE)]));
        parameters.write_be(&u8::try_from(continuation.len()).expect("continuation state too large"));
        parameters.extend_from_slice(continuation);

        let mut packet = BytesMut::new();
        packet.write(&SdpHeader {
            pdu: PduId::SearchAttributeRequest,
            transaction_id,
            parameter_length: u16::try_from(parameters.len()).expect("request too large"),
        });
        packet.extend_from_slice(&parameters);
        self.socket.send(packet.freeze())?;
        Ok(())
    }

}

fn process_response(transaction_id: u16, mut packet: Bytes, attribute_lists: &mut BytesMut) -> Result<Bytes, Error> {
    let header: SdpHeader = packet.read()?;
    ensure!(header.transaction_id == transaction_id, Error::UnexpectedTransactionId);
    ensure!(packet.remaining() == header.parameter_length as usize, Error::UnexpectedPacketLength);
    match header.pdu {
        PduId::ErrorResponse => {
            let code: SdpErrorCode = packet.read()?;
            Err(Error::ErrorResponse(code))
        },
        PduId::SearchAttributeResponse => {
            let byte_count: u16 = packet.read_be()?;
            ensure!(byte_count as usize <= packet.remaining(), Error::UnexpectedPacketLength);
            attribute_lists.extend_from_slice(&packet.split_to(byte_count as usize));
            let continuation_length: u8 = packet.read_be()?;
            ensure!(continuation_length as usize <= MAX_CONTINUATION_STATE, Error::InvalidContinuationState);
            ensure!(packet.remaining() == continuation_length as usize, Error::UnexpectedPacketLength);
            Ok(packet)
        },
        _ => Err(Error::MalformedPacketContent)
    }
}
