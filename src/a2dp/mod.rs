pub mod sbc;
pub mod sdp;

use std::sync::Arc;
use std::time::Duration;

use futures_lite::future::Boxed;
use futures_lite::FutureExt;
use num_enum::{FromPrimitive, IntoPrimitive};
use thiserror::Error;
use tokio::select;
use tokio::spawn;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::a2dp::sbc::SbcMediaCodecInformation;
use crate::a2dp::sdp::{AudioService, Role};
use crate::avdtp::capabilities::{Capability, MediaCodecCapability};
use crate::avdtp::{AvdtpClient, MediaType, ServiceCategory, StreamEndpointType, StreamState};
use crate::controller::{Device, DeviceEvent};
use crate::l2cap::COMMUNICATION_TIMEOUT;
use crate::sdp::ids::service_classes::{ADVANCED_AUDIO_DISTRIBUTION, AUDIO_SINK};
use crate::sdp::SdpClient;
use crate::sink::{publish, SinkStatus};
use crate::utils::OptionFuture;
use crate::{avdtp, sdp as sdp_client};

/// SEID of the local source endpoint offered in SetConfiguration.
const LOCAL_SEID: u8 = 0x01;

/// Service discovery moves whole records; give it a generous deadline.
pub const SDP_DISCOVERY_TIMEOUT: Duration = COMMUNICATION_TIMEOUT.saturating_mul(20);

#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum SessionError {
    #[error("the device callback slot is already occupied")]
    DeviceInUse,
    #[error("no usable sbc configuration for the discovered endpoints")]
    NoSuitableEndpoint,
    #[error("no stream has been negotiated")]
    NoStream,
    #[error("the session has been shut down")]
    Closed,
    #[error(transparent)]
    Sdp(#[from] sdp_client::Error),
    #[error(transparent)]
    Avdtp(#[from] avdtp::Error),
}

/// Content protection schemes ([Assigned Numbers] Section 6.2), carried
/// little endian in the CONTENT_PROTECTION capability.
#[derive(Debug, Copy, Clone, Eq, PartialEq, FromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum ContentProtectionType {
    Dtcp = 0x0001,
    ScmsT = 0x0002,
    #[num_enum(default)]
    Unknown = 0xFFFF,
}

/// One discovered SBC-capable sink endpoint and its negotiation state.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SbcEndpoint {
    pub seid: u8,
    pub supported: SbcMediaCodecInformation,
    pub actual: Option<SbcMediaCodecInformation>,
    pub content_protection: Option<u16>,
}

impl SbcEndpoint {

    /// `None` unless the capabilities advertise an SBC media codec.
    fn from_capabilities(seid: u8, capabilities: &[Capability]) -> Option<SbcEndpoint> {
        let supported = find_sbc_information(capabilities)?;
        Some(SbcEndpoint {
            seid,
            supported,
            actual: None,
            content_protection: find_content_protection(capabilities),
        })
    }

    pub fn content_protection_type(&self) -> Option<ContentProtectionType> {
        self.content_protection.map(ContentProtectionType::from)
    }

    /// The capability set offered in SetConfiguration: media transport, the
    /// peer's content protection echoed back, and the SBC configuration.
    fn configuration(&self, offer: SbcMediaCodecInformation) -> Vec<Capability> {
        let mut capabilities = vec![Capability::MediaTransport];
        if let Some(scheme) = self.content_protection {
            capabilities.push(Capability::Generic(ServiceCategory::ContentProtection, scheme.to_le_bytes().to_vec()));
        }
        capabilities.push(Capability::MediaCodec(MediaCodecCapability::Sbc(offer)));
        capabilities
    }

}

fn find_sbc_information(capabilities: &[Capability]) -> Option<SbcMediaCodecInformation> {
    capabilities.iter().find_map(|capability| match capability {
        Capability::MediaCodec(MediaCodecCapability::Sbc(information)) => Some(*information),
        _ => None
    })
}

fn find_content_protection(capabilities: &[Capability]) -> Option<u16> {
    capabilities.iter().find_map(|capability| match capability {
        Capability::Generic(ServiceCategory::ContentProtection, data) => match data.as_slice() {
            [lo, hi, ..] => Some(u16::from_le_bytes([*lo, *hi])),
            _ => None
        },
        _ => None
    })
}

pub(crate) enum SessionCommand {
    Start,
    Suspend,
}

type Reply = oneshot::Sender<Result<(), SessionError>>;

/// Per-device A2DP session.
///
/// Owns the device handle and runs an actor task that reacts to controller
/// updates: SDP discovery on connect, AVDTP negotiation once the peer is
/// known to be an audio sink, teardown on disconnect.
pub struct A2dpSession {
    commands: UnboundedSender<(SessionCommand, Reply)>,
    task: JoinHandle<()>,
}

impl A2dpSession {

    /// Registers the device callback and spawns the session task.
    ///
    /// Fails without side effects if the callback slot is occupied.
    pub fn attach(device: Arc<dyn Device>, status: Arc<watch::Sender<SinkStatus>>) -> Result<Self, SessionError> {
        let (updates_tx, updates) = unbounded_channel();
        device.register_callback(updates_tx).map_err(|_| SessionError::DeviceInUse)?;
        let (commands_tx, commands) = unbounded_channel();
        publish(&status, SinkStatus::Disconnected);
        let state = SessionState {
            device,
            status,
            audio_service: None,
            endpoints: Vec::new(),
            stream: None,
            connected: false,
        };
        Ok(Self {
            commands: commands_tx,
            task: spawn(state.run(updates, commands)),
        })
    }

    /// Starts the negotiated stream (open -> streaming).
    pub async fn start(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Start).await
    }

    /// Suspends the negotiated stream (streaming -> open).
    pub async fn suspend(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Suspend).await
    }

    async fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.dispatch(command)?.await.map_err(|_| SessionError::Closed)?
    }

    /// Queues a command without waiting for its completion; the returned
    /// receiver resolves once the session task has processed it.
    pub(crate) fn dispatch(&self, command: SessionCommand) -> Result<oneshot::Receiver<Result<(), SessionError>>, SessionError> {
        let (reply, result) = oneshot::channel();
        self.commands.send((command, reply)).map_err(|_| SessionError::Closed)?;
        Ok(result)
    }

    /// Graceful teardown: aborts any active stream, closes both protocol
    /// channels, unregisters the device callback and releases the device.
    pub async fn detach(self) {
        drop(self.commands);
        let _ = self.task.await;
    }

}

struct SessionState {
    device: Arc<dyn Device>,
    status: Arc<watch::Sender<SinkStatus>>,
    audio_service: Option<AudioService>,
    endpoints: Vec<SbcEndpoint>,
    stream: Option<AvdtpClient>,
    connected: bool,
}

enum NegotiationOutcome {
    Established {
        service: AudioService,
        endpoints: Vec<SbcEndpoint>,
        stream: AvdtpClient,
    },
    NotEstablished {
        service: Option<AudioService>,
    },
}

type Negotiation = Boxed<Result<NegotiationOutcome, SessionError>>;

impl SessionState {

    async fn run(mut self, mut updates: UnboundedReceiver<DeviceEvent>, mut commands: UnboundedReceiver<(SessionCommand, Reply)>) {
        let mut negotiation: OptionFuture<Negotiation> = OptionFuture::never();
        // The device may have connected before the callback was registered.
        self.device_updated(&mut negotiation);
        loop {
            select! {
                event = updates.recv() => match event {
                    Some(DeviceEvent::Updated) => self.device_updated(&mut negotiation),
                    None => break,
                },
                command = commands.recv() => match command {
                    Some((command, reply)) => {
                        let result = self.handle_command(command).await;
                        let _ = reply.send(result);
                    },
                    None => break,
                },
                outcome = &mut negotiation => self.negotiation_complete(outcome),
            }
        }
        self.shutdown().await;
    }

    fn device_updated(&mut self, negotiation: &mut OptionFuture<Negotiation>) {
        if !self.device.is_bonded() {
            return;
        }
        if self.device.is_connected() {
            if !self.connected {
                self.connected = true;
                trace!("Device {} connected", self.device.remote_address());
                publish(&self.status, SinkStatus::Idle);
            }
            // Every update while connected retries the acquisition, unless a
            // stream is already negotiated or a negotiation is in flight.
            if self.stream.is_none() && !negotiation.is_set() {
                negotiation.set(negotiate(self.device.clone(), self.status.clone(), self.audio_service).boxed());
            }
        } else {
            if !self.connected {
                return;
            }
            self.connected = false;
            debug!("Device {} disconnected", self.device.remote_address());
            // Cancelling the negotiation future closes any channel it holds.
            negotiation.clear();
            self.stream = None;
            self.endpoints.clear();
            self.audio_service = None;
            publish(&self.status, SinkStatus::Disconnected);
        }
    }

    fn negotiation_complete(&mut self, outcome: Result<NegotiationOutcome, SessionError>) {
        match outcome {
            Ok(NegotiationOutcome::Established { service, endpoints, stream }) => {
                self.audio_service = Some(service);
                self.endpoints = endpoints;
                self.stream = Some(stream);
                // Published only once the stream is in place, so stream
                // control is available the moment observers see "open".
                publish(&self.status, SinkStatus::Open);
            },
            Ok(NegotiationOutcome::NotEstablished { service }) => {
                self.audio_service = service;
            },
            Err(err) => {
                warn!("Audio sink negotiation failed: {}", err);
            }
        }
    }

    async fn handle_command(&mut self, command: SessionCommand) -> Result<(), SessionError> {
        let stream = self.stream.as_mut().ok_or(SessionError::NoStream)?;
        let seid = stream.seid().ok_or(SessionError::NoStream)?;
        match command {
            SessionCommand::Start => {
                if let Some(endpoint) = self.endpoints.iter().find(|endpoint| endpoint.seid == seid) {
                    trace!("Starting stream endpoint 0x{:02x} with {:?}", seid, endpoint.actual);
                }
                stream.start(seid).await?
            },
            SessionCommand::Suspend => stream.suspend(seid).await?,
        }
        publish(&self.status, stream.state().into());
        Ok(())
    }

    async fn shutdown(mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let (StreamState::Configured | StreamState::Open | StreamState::Streaming, Some(seid)) = (stream.state(), stream.seid()) {
                // Best effort; the peer may already be gone.
                if let Err(err) = stream.abort(seid).await {
                    debug!("Failed to abort stream during shutdown: {}", err);
                }
            }
        }
        // The callback slot must be free before the device handle goes away.
        self.device.unregister_callback();
        trace!("A2DP session for {} ended", self.device.remote_address());
    }

}

/// The acquisition chain: SDP discovery (unless the role is already known),
/// then AVDTP discovery, SBC configuration and Open on the first qualifying
/// endpoint.
async fn negotiate(
    device: Arc<dyn Device>,
    status: Arc<watch::Sender<SinkStatus>>,
    known: Option<AudioService>,
) -> Result<NegotiationOutcome, SessionError> {
    let service = match known {
        Some(service) => service,
        None => {
            trace!("Unknown device connected, attempt audio sink discovery");
            match discover_audio_service(&*device).await? {
                Some(service) => service,
                None => {
                    info!("Not an A2DP device");
                    return Ok(NegotiationOutcome::NotEstablished { service: None });
                }
            }
        }
    };

    if service.role() != Role::Sink {
        info!("Connected device does not feature an audio sink");
        return Ok(NegotiationOutcome::NotEstablished { service: Some(service) });
    }

    info!(
        "Audio sink service available! A2DP v{}.{}, AVDTP v{}.{}, L2CAP PSM: {}, features: {:?}",
        service.profile_version() >> 8, service.profile_version() & 0xFF,
        service.transport_version() >> 8, service.transport_version() & 0xFF,
        service.psm(), service.features()
    );

    // The audio service survives a failed transport phase; the next device
    // update retries AVDTP directly.
    match establish_stream(&*device, &status, &service).await {
        Ok(Some((stream, endpoints))) => Ok(NegotiationOutcome::Established { service, endpoints, stream }),
        Ok(None) => Ok(NegotiationOutcome::NotEstablished { service: Some(service) }),
        Err(err) => {
            warn!("Failed to establish an audio stream: {}", err);
            // Nothing is configured anymore; a transport loss additionally
            // surfaces as a disconnect update right after.
            publish(&status, SinkStatus::Idle);
            Ok(NegotiationOutcome::NotEstablished { service: Some(service) })
        }
    }
}

/// AVDTP discovery, SBC configuration and Open on the first qualifying
/// endpoint. `Ok(None)` when the peer advertises no usable SBC sink.
async fn establish_stream(
    device: &dyn Device,
    status: &watch::Sender<SinkStatus>,
    service: &AudioService,
) -> Result<Option<(AvdtpClient, Vec<SbcEndpoint>)>, SessionError> {
    let mut stream = AvdtpClient::connect(device, service.psm()).await?;
    let mut endpoints = Vec::new();
    for endpoint in stream.discover().await? {
        if endpoint.media_type != MediaType::Audio || endpoint.tsep != StreamEndpointType::Sink {
            continue;
        }
        let capabilities = stream.get_capabilities(endpoint.seid).await?;
        if let Some(endpoint) = SbcEndpoint::from_capabilities(endpoint.seid, &capabilities) {
            info!("SBC audio sink stream endpoint available! SEID: 0x{:02x}", endpoint.seid);
            endpoints.push(endpoint);
        }
    }

    // First qualifying endpoint in discovery order wins.
    let Some(endpoint) = endpoints.first_mut() else {
        info!("No SBC audio sink stream endpoints available");
        return Ok(None);
    };
    let offer = endpoint.supported.negotiate().ok_or(SessionError::NoSuitableEndpoint)?;

    stream.set_configuration(endpoint.seid, LOCAL_SEID, &endpoint.configuration(offer)).await?;
    let configured = stream.get_configuration(endpoint.seid).await?;
    endpoint.actual = find_sbc_information(&configured).or(Some(offer));
    if let Some(scheme) = find_content_protection(&configured) {
        endpoint.content_protection = Some(scheme);
    }
    trace!("SBC configuration supported: {:?}", endpoint.supported);
    trace!("SBC configuration actual:    {:?}", endpoint.actual);
    publish(status, SinkStatus::Configured);

    stream.open(endpoint.seid).await?;
    debug!("Stream endpoint 0x{:02x} is open", endpoint.seid);
    Ok(Some((stream, endpoints)))
}

async fn discover_audio_service(device: &dyn Device) -> Result<Option<AudioService>, SessionError> {
    let mut sdp = SdpClient::connect(device).await?;
    let services = sdp.discover(SDP_DISCOVERY_TIMEOUT, ADVANCED_AUDIO_DISTRIBUTION, &[AUDIO_SINK]).await?;
    // Done with SDP; AVDTP gets its own channel.
    drop(sdp);
    Ok(services.first().map(AudioService::new))
}

impl From<StreamState> for SinkStatus {
    fn from(value: StreamState) -> Self {
        match value {
            StreamState::Idle => SinkStatus::Idle,
            StreamState::Configured => SinkStatus::Configured,
            StreamState::Open => SinkStatus::Open,
            StreamState::Streaming => SinkStatus::Streaming,
        }
    }
}
