//! Shared fakes for the protocol and session tests: an in-memory controller
//! and device, plus scripted SDP and AVDTP peers speaking real wire bytes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_lite::future::Boxed;
use instructor::BufferMut;
use parking_lot::Mutex;
use tokio::spawn;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::a2dp::sbc::SbcMediaCodecInformation;
use crate::avdtp::capabilities::{Capability, MediaCodecCapability};
use crate::avdtp::packets::{
    MessageType, SeidField, SignalChannelExt, SignalMessage, SignalMessageAssembler, StreamEndpoint,
};
use crate::avdtp::{ErrorCode, MediaType, ServiceCategory, SignalIdentifier, StreamEndpointType};
use crate::controller::{Address, AddressType, BluetoothController, CallbackError, Device, DeviceEvent};
use crate::l2cap::{ConnectError, L2capSocket};
use crate::sdp::ids::attributes::*;
use crate::sdp::ids::{protocols, service_classes};
use crate::sdp::{DataElement, SdpErrorCode};
use crate::sink::SinkStatus;
use crate::utils::MutexCell;

pub(crate) type Listener = Box<dyn Fn(L2capSocket) + Send + Sync>;

#[derive(Default)]
pub(crate) struct FakeController {
    devices: Mutex<HashMap<Address, Arc<FakeDevice>>>,
}

impl FakeController {
    pub fn add(&self, address: Address, device: Arc<FakeDevice>) {
        self.devices.lock().insert(address, device);
    }
}

impl BluetoothController for FakeController {
    fn device(&self, address: Address) -> Option<Arc<dyn Device>> {
        let device = self.devices.lock().get(&address)?.clone();
        Some(device)
    }
}

pub(crate) struct FakeDevice {
    local: Address,
    remote: Address,
    connected: AtomicBool,
    bonded: AtomicBool,
    callback: MutexCell<Option<UnboundedSender<DeviceEvent>>>,
    listeners: Mutex<HashMap<u16, Listener>>,
    opens: Mutex<HashMap<u16, usize>>,
}

impl FakeDevice {

    pub fn new() -> Self {
        Self {
            local: Address([0x00, 0x1A, 0x7D, 0xDA, 0x71, 0x13]),
            remote: Address([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]),
            connected: AtomicBool::new(false),
            bonded: AtomicBool::new(true),
            callback: MutexCell::new(None),
            listeners: Mutex::new(HashMap::new()),
            opens: Mutex::new(HashMap::new()),
        }
    }

    pub fn connected() -> Self {
        let device = Self::new();
        device.connected.store(true, Ordering::SeqCst);
        device
    }

    pub fn listen(&self, psm: u16, listener: Listener) {
        self.listeners.lock().insert(psm, listener);
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn fire_updated(&self) {
        if let Some(callback) = self.callback.take() {
            let _ = callback.send(DeviceEvent::Updated);
            self.callback.set(Some(callback));
        }
    }

    pub fn has_callback(&self) -> bool {
        let callback = self.callback.take();
        let occupied = callback.is_some();
        self.callback.set(callback);
        occupied
    }

    /// How many times a channel was opened on `psm`.
    pub fn open_count(&self, psm: u16) -> usize {
        self.opens.lock().get(&psm).copied().unwrap_or(0)
    }

}

impl Device for FakeDevice {
    fn local_address(&self) -> Address {
        self.local
    }

    fn remote_address(&self) -> Address {
        self.remote
    }

    fn address_type(&self) -> AddressType {
        AddressType::BrEdr
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_bonded(&self) -> bool {
        self.bonded.load(Ordering::SeqCst)
    }

    fn register_callback(&self, events: UnboundedSender<DeviceEvent>) -> Result<(), CallbackError> {
        match self.callback.replace(Some(events)) {
            None => Ok(()),
            Some(previous) => {
                self.callback.set(Some(previous));
                Err(CallbackError::SlotOccupied)
            }
        }
    }

    fn unregister_callback(&self) {
        self.callback.set(None);
    }

    fn open_l2cap(&self, psm: u16) -> Boxed<Result<L2capSocket, ConnectError>> {
        let result = match self.is_connected() {
            false => Err(ConnectError::NoTransport),
            true => match self.listeners.lock().get(&psm) {
                Some(listener) => {
                    *self.opens.lock().entry(psm).or_default() += 1;
                    let (local, remote) = L2capSocket::pair();
                    listener(remote);
                    Ok(local)
                },
                None => Err(ConnectError::Refused),
            }
        };
        Box::pin(async move { result })
    }
}

pub(crate) fn sink_service_record(psm: u16, features: u16) -> DataElement {
    DataElement::Sequence(vec![
        DataElement::U16(SERVICE_RECORD_HANDLE_ID), DataElement::U32(0x0001_0001),
        DataElement::U16(SERVICE_CLASS_ID_LIST_ID), DataElement::from_iter([service_classes::AUDIO_SINK]),
        DataElement::U16(PROTOCOL_DESCRIPTOR_LIST_ID), DataElement::from_iter([
            DataElement::from((protocols::L2CAP, psm)),
            DataElement::from((protocols::AVDTP, 0x0103u16)),
        ]),
        DataElement::U16(BLUETOOTH_PROFILE_DESCRIPTOR_LIST_ID), DataElement::from_iter([
            DataElement::from((service_classes::ADVANCED_AUDIO_DISTRIBUTION, 0x0103u16)),
        ]),
        DataElement::U16(0x0311), DataElement::U16(features),
    ])
}

pub(crate) fn source_service_record() -> DataElement {
    DataElement::Sequence(vec![
        DataElement::U16(SERVICE_RECORD_HANDLE_ID), DataElement::U32(0x0001_0002),
        DataElement::U16(SERVICE_CLASS_ID_LIST_ID), DataElement::from_iter([service_classes::AUDIO_SOURCE]),
        DataElement::U16(PROTOCOL_DESCRIPTOR_LIST_ID), DataElement::from_iter([
            DataElement::from((protocols::L2CAP, 0x0019u16)),
            DataElement::from((protocols::AVDTP, 0x0103u16)),
        ]),
        DataElement::U16(BLUETOOTH_PROFILE_DESCRIPTOR_LIST_ID), DataElement::from_iter([
            DataElement::from((service_classes::ADVANCED_AUDIO_DISTRIBUTION, 0x0103u16)),
        ]),
    ])
}

/// Scripted ServiceSearchAttribute responder. Splits its attribute lists
/// over `fragments` responses chained by continuation states.
#[derive(Clone)]
pub(crate) struct SdpServer {
    attribute_lists: Bytes,
    fragments: usize,
    oversized_continuation: bool,
    reject: Option<SdpErrorCode>,
    silent: bool,
    requests: Arc<AtomicUsize>,
}

impl SdpServer {

    pub fn new(records: Vec<DataElement>, fragments: usize) -> Self {
        let mut buffer = BytesMut::new();
        buffer.write(&DataElement::Sequence(records));
        Self {
            attribute_lists: buffer.freeze(),
            fragments,
            oversized_continuation: false,
            reject: None,
            silent: false,
            requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn rejecting(code: SdpErrorCode) -> Self {
        let mut server = Self::new(Vec::new(), 1);
        server.reject = Some(code);
        server
    }

    pub fn silent() -> Self {
        let mut server = Self::new(Vec::new(), 1);
        server.silent = true;
        server
    }

    pub fn with_oversized_continuation(mut self) -> Self {
        self.oversized_continuation = true;
        self
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn listener(&self) -> Listener {
        let server = self.clone();
        Box::new(move |socket| {
            spawn(server.clone().serve(socket));
        })
    }

    async fn serve(self, mut socket: L2capSocket) {
        let chunk_size = self.attribute_lists.len().div_ceil(self.fragments).max(1);
        let chunks: Vec<&[u8]> = match self.attribute_lists.is_empty() {
            true => vec![&[]],
            false => self.attribute_lists.chunks(chunk_size).collect(),
        };
        let mut index = 0;
        while let Some(request) = socket.recv().await {
            self.requests.fetch_add(1, Ordering::SeqCst);
            if self.silent {
                continue;
            }
            let transaction_id = u16::from_be_bytes([request[1], request[2]]);
            if let Some(code) = self.reject {
                let mut packet = BytesMut::new();
                packet.write_be(&0x01u8); // ErrorResponse
                packet.write_be(&transaction_id);
                packet.write_be(&2u16);
                packet.write_be(&code);
                let _ = socket.send(packet.freeze());
                continue;
            }

            let chunk = chunks[index.min(chunks.len() - 1)];
            let continuation: Vec<u8> = match () {
                _ if self.oversized_continuation => vec![0; 17],
                _ if index + 1 < chunks.len() => vec![index as u8 + 1],
                _ => Vec::new(),
            };
            index += 1;

            let mut body = BytesMut::new();
            body.write_be(&u16::try_from(chunk.len()).unwrap());
            body.extend_from_slice(chunk);
            body.write_be(&u8::try_from(continuation.len()).unwrap());
            body.extend_from_slice(&continuation);

            let mut packet = BytesMut::new();
            packet.write_be(&0x07u8); // SearchAttributeResponse
            packet.write_be(&transaction_id);
            packet.write_be(&u16::try_from(body.len()).unwrap());
            packet.extend_from_slice(&body);
            if socket.send(packet.freeze()).is_err() {
                break;
            }
        }
    }

}

pub(crate) fn sbc_sink_endpoint(seid: u8) -> (StreamEndpoint, Vec<Capability>) {
    (
        StreamEndpoint {
            seid,
            in_use: false,
            media_type: MediaType::Audio,
            tsep: StreamEndpointType::Sink,
        },
        vec![
            Capability::MediaTransport,
            Capability::MediaCodec(MediaCodecCapability::Sbc(SbcMediaCodecInformation::default())),
        ],
    )
}

/// Scripted AVDTP acceptor: answers the signalling commands of one stream
/// negotiation and records every command it sees.
#[derive(Clone)]
pub(crate) struct Acceptor {
    endpoints: Vec<(StreamEndpoint, Vec<Capability>)>,
    reject: Option<(SignalIdentifier, ErrorCode)>,
    drop_on: Option<SignalIdentifier>,
    on_drop: Option<Arc<dyn Fn() + Send + Sync>>,
    signals: Arc<Mutex<Vec<SignalIdentifier>>>,
}

impl Acceptor {

    pub fn new(endpoints: Vec<(StreamEndpoint, Vec<Capability>)>) -> Self {
        Self {
            endpoints,
            reject: None,
            drop_on: None,
            on_drop: None,
            signals: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn rejecting(mut self, signal: SignalIdentifier, code: ErrorCode) -> Self {
        self.reject = Some((signal, code));
        self
    }

    pub fn dropping_on(mut self, signal: SignalIdentifier) -> Self {
        self.drop_on = Some(signal);
        self
    }

    pub fn on_drop(mut self, hook: Arc<dyn Fn() + Send + Sync>) -> Self {
        self.on_drop = Some(hook);
        self
    }

    pub fn signals(&self) -> Vec<SignalIdentifier> {
        self.signals.lock().clone()
    }

    pub fn listener(&self) -> Listener {
        let acceptor = self.clone();
        Box::new(move |socket| {
            spawn(acceptor.clone().serve(socket));
        })
    }

    async fn serve(self, mut socket: L2capSocket) {
        let mut assembler = SignalMessageAssembler::default();
        let mut configured: Vec<Capability> = Vec::new();
        while let Some(packet) = socket.recv().await {
            let Ok(Some(message)) = assembler.process_msg(packet) else {
                continue;
            };
            if message.message_type != MessageType::Command {
                continue;
            }
            let signal = message.signal_identifier;
            self.signals.lock().push(signal);

            if self.drop_on == Some(signal) {
                if let Some(hook) = &self.on_drop {
                    hook();
                }
                return;
            }
            if let Some((_, code)) = self.reject.filter(|(rejected, _)| *rejected == signal) {
                let mut data = BytesMut::new();
                if matches!(signal, SignalIdentifier::SetConfiguration | SignalIdentifier::Reconfigure) {
                    data.write_be(&ServiceCategory::MediaCodec);
                }
                data.write_be(&code);
                let _ = socket.send_signal(SignalMessage {
                    transaction_label: message.transaction_label,
                    message_type: MessageType::ResponseReject,
                    signal_identifier: signal,
                    data: data.freeze(),
                });
                continue;
            }

            let mut request = message.data;
            let mut data = BytesMut::new();
            let mut accept = true;
            match signal {
                SignalIdentifier::Discover => {
                    for (endpoint, _) in &self.endpoints {
                        data.write_be(endpoint);
                    }
                },
                SignalIdentifier::GetCapabilities | SignalIdentifier::GetAllCapabilities => {
                    use instructor::Buffer;
                    let seid = request.read_be::<SeidField>().map(|field| field.seid).unwrap_or(0);
                    match self.endpoints.iter().find(|(endpoint, _)| endpoint.seid == seid) {
                        Some((_, capabilities)) => {
                            for capability in capabilities {
                                data.write_be(capability);
                            }
                        },
                        None => {
                            accept = false;
                            data.write_be(&ErrorCode::BadAcpSeid);
                        }
                    }
                },
                SignalIdentifier::SetConfiguration => {
                    use instructor::Buffer;
                    let _acp = request.read_be::<SeidField>();
                    let _int = request.read_be::<SeidField>();
                    configured = request.read().unwrap_or_default();
                },
                SignalIdentifier::GetConfiguration => {
                    for capability in &configured {
                        data.write_be(capability);
                    }
                },
                SignalIdentifier::Open
                | SignalIdentifier::Start
                | SignalIdentifier::Suspend
                | SignalIdentifier::Close
                | SignalIdentifier::Abort => {},
                _ => {
                    let _ = socket.send_signal(SignalMessage {
                        transaction_label: message.transaction_label,
                        message_type: MessageType::GeneralReject,
                        signal_identifier: signal,
                        data: Bytes::new(),
                    });
                    continue;
                }
            }
            let _ = socket.send_signal(SignalMessage {
                transaction_label: message.transaction_label,
                message_type: match accept {
                    true => MessageType::ResponseAccept,
                    false => MessageType::ResponseReject,
                },
                signal_identifier: signal,
                data: data.freeze(),
            });
        }
    }

}

/// Collects every status transition into a log.
pub(crate) fn record_status(mut receiver: watch::Receiver<SinkStatus>) -> (Arc<Mutex<Vec<SinkStatus>>>, JoinHandle<()>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let handle = spawn({
        let log = log.clone();
        async move {
            while receiver.changed().await.is_ok() {
                log.lock().push(*receiver.borrow_and_update());
            }
        }
    });
    (log, handle)
}

/// Waits until the observed status reaches `expected`.
pub(crate) async fn wait_for_status(receiver: &mut watch::Receiver<SinkStatus>, expected: SinkStatus) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if *receiver.borrow_and_update() == expected {
                return;
            }
            receiver.changed().await.expect("status channel closed");
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for status {}", expected));
}

/// Lets the in-flight session work drain on the current-thread runtime.
pub(crate) async fn settle() {
    for _ in 0..100 {
        tokio::task::yield_now().await;
    }
}
