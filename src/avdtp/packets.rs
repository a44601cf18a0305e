use bytes::{Bytes, BytesMut};
use instructor::{Buffer, BufferMut, Error, Exstruct, Instruct};
use num_enum::{FromPrimitive, IntoPrimitive};
use tracing::warn;

use crate::ensure;
use crate::l2cap::{Disconnected, L2capSocket};

/// Reassembled signalling messages larger than this are rejected.
pub const MAX_SIGNAL_SIZE: usize = 512;

// ([AVDTP] Section 8.4.2).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Exstruct, Instruct)]
#[repr(u8)]
enum PacketType {
    Single = 0b00,
    Start = 0b01,
    Continue = 0b10,
    End = 0b11,
}

// ([AVDTP] Section 8.4.3).
#[derive(Default, Debug, Copy, Clone, Eq, PartialEq, Exstruct, Instruct)]
#[repr(u8)]
pub enum MessageType {
    #[default]
    Command = 0b00,
    GeneralReject = 0b01,
    ResponseAccept = 0b10,
    ResponseReject = 0b11,
}

// ([AVDTP] Section 8.5).
#[derive(Default, Debug, Copy, Clone, Eq, PartialEq, Exstruct, Instruct)]
#[repr(u8)]
pub enum SignalIdentifier {
    #[default]
    Discover = 0x01,
    GetCapabilities = 0x02,
    SetConfiguration = 0x03,
    GetConfiguration = 0x04,
    Reconfigure = 0x05,
    Open = 0x06,
    Start = 0x07,
    Close = 0x08,
    Suspend = 0x09,
    Abort = 0x0a,
    SecurityControl = 0x0b,
    GetAllCapabilities = 0x0c,
    DelayReport = 0x0d,
}

// ([AVDTP] Section 8.4).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Exstruct, Instruct)]
struct SignalHeader {
    #[instructor(bitfield(u8))]
    #[instructor(bits(4..8))]
    transaction_label: u8,
    #[instructor(bits(2..4))]
    packet_type: PacketType,
    #[instructor(bits(0..2))]
    message_type: MessageType,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Exstruct, Instruct)]
struct SignalIdentifierField {
    #[instructor(bitfield(u8))]
    #[instructor(bits(0..6))]
    signal_identifier: SignalIdentifier,
}

/// ACP/INT SEID request field ([AVDTP] Section 8.20.1).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Exstruct, Instruct)]
pub struct SeidField {
    #[instructor(bitfield(u8))]
    #[instructor(bits(2..8))]
    pub seid: u8,
}

// ([AVDTP] Section 8.20.3).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Exstruct, Instruct)]
#[repr(u8)]
pub enum MediaType {
    Audio = 0x00,
    Video = 0x01,
    Multimedia = 0x02,
}

// ([AVDTP] Section 8.20.2).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Exstruct, Instruct)]
#[repr(u8)]
pub enum StreamEndpointType {
    Source = 0x00,
    Sink = 0x01,
}

// ([AVDTP] Section 8.21.1).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Exstruct, Instruct)]
#[repr(u8)]
pub enum ServiceCategory {
    MediaTransport = 0x01,
    Reporting = 0x02,
    Recovery = 0x03,
    ContentProtection = 0x04,
    HeaderCompression = 0x05,
    Multiplexing = 0x06,
    MediaCodec = 0x07,
    DelayReporting = 0x08,
}

/// Audio codec identifiers ([A2DP] Section 4.2.1). Only SBC is negotiated.
#[derive(Debug, Copy, Clone, Eq, PartialEq, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum AudioCodec {
    Sbc = 0x00,
    Mpeg12Audio = 0x01,
    Mpeg24Aac = 0x02,
    Atrac = 0x03,
    #[num_enum(default)]
    NonA2dp = 0xFF,
}

/// Entry of a Discover response ([AVDTP] Section 8.6.2).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Exstruct, Instruct)]
pub struct StreamEndpoint {
    #[instructor(bitfield(u8))]
    #[instructor(bits(2..8))]
    pub seid: u8,
    #[instructor(bits(1..2))]
    pub in_use: bool,
    #[instructor(bitfield(u8))]
    #[instructor(bits(4..8))]
    pub media_type: MediaType,
    #[instructor(bits(3..4))]
    pub tsep: StreamEndpointType,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SignalMessage {
    pub transaction_label: u8,
    pub message_type: MessageType,
    pub signal_identifier: SignalIdentifier,
    pub data: Bytes,
}

#[derive(Default)]
pub struct SignalMessageAssembler {
    transaction_label: u8,
    message: BytesMut,
    message_type: MessageType,
    signal_identifier: SignalIdentifier,
    number_of_signaling_packets: u8,
    packet_count: u8,
}

impl SignalMessageAssembler {

    fn reset(&mut self) {
        self.transaction_label = 0;
        self.message.clear();
        self.message_type = MessageType::Command;
        self.signal_identifier = SignalIdentifier::Discover;
        self.number_of_signaling_packets = 0;
        self.packet_count = 0;
    }

    fn extend(&mut self, chunk: &[u8]) -> Result<(), Error> {
        if self.message.len() + chunk.len() > MAX_SIGNAL_SIZE {
            warn!("Reassembled signalling message exceeds {} bytes", MAX_SIGNAL_SIZE);
            self.reset();
            return Err(Error::TooLong);
        }
        self.message.extend_from_slice(chunk);
        Ok(())
    }

    pub fn process_msg(&mut self, mut data: Bytes) -> Result<Option<SignalMessage>, Error> {
        let SignalHeader { transaction_label, packet_type, message_type } = data.read_be()?;

        match packet_type {
            PacketType::Single | PacketType::Start if self.packet_count > 0 => {
                warn!("Clearing incomplete message");
                self.reset();
            }
            PacketType::Continue | PacketType::End => {
                ensure!(self.packet_count > 0, Error::InvalidValue);
                ensure!(self.transaction_label == transaction_label, Error::InvalidValue);
                ensure!(self.message_type == message_type, Error::InvalidValue);
            }
            _ => {}
        }
        match packet_type {
            PacketType::Single => {
                let signal_identifier = data.read_be::<SignalIdentifierField>()?.signal_identifier;
                Ok(Some(SignalMessage {
                    transaction_label,
                    message_type,
                    signal_identifier,
                    data
                }))
            },
            PacketType::Start => {
                self.transaction_label = transaction_label;
                self.message_type = message_type;
                self.number_of_signaling_packets = data.read_be()?;
                self.signal_identifier = data.read_be::<SignalIdentifierField>()?.signal_identifier;
                self.packet_count = 1;
                self.extend(&data)?;
                Ok(None)
            },
            PacketType::Continue => {
                self.packet_count += 1;
                match self.packet_count < self.number_of_signaling_packets {
                    true => {
                        self.extend(&data)?;
                        Ok(None)
                    },
                    false => {
                        warn!("Exceeded number of signaling packets (got: {}, expected: {})", self.packet_count, self.number_of_signaling_packets);
                        self.reset();
                        Err(Error::InvalidValue)
                    }
                }
            }
            PacketType::End => {
                self.packet_count += 1;
                match self.packet_count == self.number_of_signaling_packets {
                    true => {
                        self.extend(&data)?;
                        let message = SignalMessage {
                            transaction_label: self.transaction_label,
                            message_type: self.message_type,
                            signal_identifier: self.signal_identifier,
                            data: self.message.split().freeze()
                        };
                        self.reset();
                        Ok(Some(message))
                    },
                    false => {
                        warn!("Insufficient number of signaling packets (got: {}, expected: {})", self.packet_count, self.number_of_signaling_packets);
                        self.reset();
                        Err(Error::InvalidValue)
                    }
                }
            }
        }
    }

}

pub trait SignalChannelExt {
    fn send_signal(&self, message: SignalMessage) -> Result<(), Disconnected>;
}

impl SignalChannelExt for L2capSocket {
    fn send_signal(&self, SignalMessage { transaction_label, message_type, signal_identifier, data }: SignalMessage) -> Result<(), Disconnected> {
        let mut buffer = BytesMut::new();
        if data.len() + 2 <= self.remote_mtu() as usize {
            buffer.write_be(&SignalHeader {
                transaction_label,
                packet_type: PacketType::Single,
                message_type,
            });
            buffer.write_be(&SignalIdentifierField { signal_identifier });
            buffer.extend_from_slice(&data);
            return self.send(buffer.split().freeze());
        }
        // Start packets carry three header bytes, continue/end packets one.
        let chunk_size = self.remote_mtu().saturating_sub(3).max(1) as usize;
        let number_of_signaling_packets = data.len().div_ceil(chunk_size);
        let mut packet_type = PacketType::Start;
        for (i, chunk) in data.chunks(chunk_size).enumerate() {
            buffer.write_be(&SignalHeader {
                transaction_label,
                packet_type,
                message_type,
            });
            if matches!(packet_type, PacketType::Start) {
                buffer.write_be(&u8::try_from(number_of_signaling_packets).expect("payload too large"));
                buffer.write_be(&SignalIdentifierField { signal_identifier });
            }
            buffer.extend_from_slice(chunk);
            self.send(buffer.split().freeze())?;
            packet_type = match i + 2 < number_of_signaling_packets {
                true => PacketType::Continue,
                false => PacketType::End
            };
        }
        Ok(())
    }
}
