use bitflags::bitflags;

use crate::sdp::ids::protocols::{AVDTP, L2CAP};
use crate::sdp::ids::service_classes::{ADVANCED_AUDIO_DISTRIBUTION, AUDIO_SINK, AUDIO_SOURCE};
use crate::sdp::{DataElement, Service};

/// Service-specific SupportedFeatures attribute ([A2DP] Section 5.3).
pub const SUPPORTED_FEATURES_ID: u16 = 0x0311;

#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub enum Role {
    #[default]
    Unknown,
    Source,
    Sink,
    Neither,
}

bitflags! {
    /// ([A2DP] Section 5.3). Sink features live in the low nibble; source
    /// features are reported in the same bits on the wire and shifted into
    /// the high nibble here.
    #[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
    pub struct Features: u16 {
        const HEADPHONE = 1 << 0;
        const SPEAKER = 1 << 1;
        const RECORDER = 1 << 2;
        const AMPLIFIER = 1 << 3;
        const PLAYER = 1 << 4;
        const MICROPHONE = 1 << 5;
        const TUNER = 1 << 6;
        const MIXER = 1 << 7;
    }
}

/// The A2DP facts distilled from one SDP service record.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct AudioService {
    psm: u16,
    avdtp_version: u16,
    a2dp_version: u16,
    features: Features,
    role: Role,
}

impl AudioService {

    /// A record only qualifies as source/sink once the full
    /// A2DP-over-AVDTP-over-L2CAP chain is present and versioned.
    pub fn new(service: &Service) -> AudioService {
        let mut audio = AudioService {
            role: Role::Neither,
            ..AudioService::default()
        };

        if let Some(profile) = service.profile(ADVANCED_AUDIO_DISTRIBUTION) {
            audio.a2dp_version = profile.version;
        }
        if let Some(l2cap) = service.protocol(L2CAP) {
            audio.psm = first_u16(&l2cap.parameters).unwrap_or(0);
        }
        if let Some(avdtp) = service.protocol(AVDTP) {
            audio.avdtp_version = first_u16(&avdtp.parameters).unwrap_or(0);
        }

        if audio.a2dp_version != 0 && audio.avdtp_version != 0 && audio.psm != 0 {
            if service.is_class_supported(AUDIO_SINK) {
                audio.role = Role::Sink;
            } else if service.is_class_supported(AUDIO_SOURCE) {
                audio.role = Role::Source;
            }
        }

        if let Some(features) = service.attribute(SUPPORTED_FEATURES_ID).and_then(|value| value.as_u16().ok()) {
            let features = match service.is_class_supported(AUDIO_SOURCE) {
                true => features << 4,
                false => features
            };
            audio.features = Features::from_bits_truncate(features);
        }

        audio
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn psm(&self) -> u16 {
        self.psm
    }

    pub fn transport_version(&self) -> u16 {
        self.avdtp_version
    }

    pub fn profile_version(&self) -> u16 {
        self.a2dp_version
    }

    pub fn features(&self) -> Features {
        self.features
    }

}

fn first_u16(parameters: &[DataElement]) -> Option<u16> {
    parameters.first().and_then(|value| value.as_u16().ok())
}
