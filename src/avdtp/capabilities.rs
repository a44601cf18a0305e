use instructor::{BigEndian, Buffer, BufferMut, ByteSize, Error, Exstruct, Instruct};
use instructor::utils::Limit;
use tracing::trace;

use crate::a2dp::sbc::SbcMediaCodecInformation;
use crate::avdtp::packets::{AudioCodec, MediaType, ServiceCategory};
use crate::ensure;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    MediaTransport,
    MediaCodec(MediaCodecCapability),
    Generic(ServiceCategory, Vec<u8>),
}

impl Capability {
    pub fn category(&self) -> ServiceCategory {
        match self {
            Capability::MediaTransport => ServiceCategory::MediaTransport,
            Capability::MediaCodec(_) => ServiceCategory::MediaCodec,
            Capability::Generic(category, _) => *category
        }
    }
}

/// Media type + codec identifier prefix of a MEDIA_CODEC capability
/// ([AVDTP] Section 8.21.5).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MediaCodecId {
    pub media_type: MediaType,
    pub codec: u8,
}

impl MediaCodecId {
    pub fn audio_codec(self) -> Option<AudioCodec> {
        matches!(self.media_type, MediaType::Audio).then(|| AudioCodec::from(self.codec))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaCodecCapability {
    Sbc(SbcMediaCodecInformation),
    Generic(MediaCodecId, Vec<u8>)
}

impl From<SbcMediaCodecInformation> for MediaCodecCapability {
    fn from(value: SbcMediaCodecInformation) -> Self {
        Self::Sbc(value)
    }
}

impl Exstruct<BigEndian> for Capability {
    #[inline]
    fn read_from_buffer<B: Buffer>(buffer: &mut B) -> Result<Self, Error> {
        let category: ServiceCategory = buffer.read_be()?;
        let length: u8 = buffer.read_be()?;
        let mut buffer = Limit::new(buffer, length as usize);
        let capability = match category {
            ServiceCategory::MediaTransport => Self::MediaTransport,
            ServiceCategory::MediaCodec => Self::MediaCodec(buffer.read_be()?),
            other => Self::Generic(other, read_remaining(&mut buffer)?)
        };
        buffer.finish()?;
        Ok(capability)
    }
}

impl Instruct<BigEndian> for Capability {

    #[inline]
    fn write_to_buffer<B: BufferMut>(&self, buffer: &mut B) {
        let (category, size) = match self {
            Capability::MediaTransport => (ServiceCategory::MediaTransport, 0),
            Capability::MediaCodec(codec) => (ServiceCategory::MediaCodec, codec.byte_size()),
            Capability::Generic(category, info) => (*category, info.len())
        };
        buffer.write_be(&category);
        buffer.write_be(&u8::try_from(size).expect("capability too large"));
        match self {
            Capability::MediaTransport => {}
            Capability::MediaCodec(codec) => buffer.write_be(codec),
            Capability::Generic(_, info) => buffer.extend_from_slice(info)
        }
    }
}

impl Exstruct<BigEndian> for MediaCodecId {
    #[inline]
    fn read_from_buffer<B: Buffer>(buffer: &mut B) -> Result<Self, Error> {
        let media_type = buffer.read_be::<MediaTypeRaw>()?.0;
        let codec: u8 = buffer.read_be()?;
        Ok(Self { media_type, codec })
    }
}

impl Instruct<BigEndian> for MediaCodecId {
    #[inline]
    fn write_to_buffer<B: BufferMut>(&self, buffer: &mut B) {
        buffer.write_be(&(MediaTypeRaw(self.media_type), self.codec));
    }
}

impl Exstruct<BigEndian> for MediaCodecCapability {
    #[inline]
    fn read_from_buffer<B: Buffer>(buffer: &mut B) -> Result<Self, Error> {
        let id: MediaCodecId = buffer.read_be()?;
        match id.audio_codec() {
            Some(AudioCodec::Sbc) => {
                let information: SbcMediaCodecInformation = buffer.read_be()?;
                ensure!(information.has_valid_bitpool_range(), Error::InvalidValue);
                let trailing = read_remaining(buffer)?;
                if !trailing.is_empty() {
                    trace!("Ignoring {} trailing byte(s) of SBC codec information", trailing.len());
                }
                Ok(Self::Sbc(information))
            },
            _ => Ok(Self::Generic(id, read_remaining(buffer)?))
        }
    }
}

impl Instruct<BigEndian> for MediaCodecCapability {

    #[inline]
    fn write_to_buffer<B: BufferMut>(&self, buffer: &mut B) {
        match self {
            MediaCodecCapability::Sbc(information) => {
                buffer.write_be(&MediaCodecId { media_type: MediaType::Audio, codec: AudioCodec::Sbc.into() });
                buffer.write_be(information);
            }
            MediaCodecCapability::Generic(id, information) => {
                buffer.write_be(id);
                buffer.extend_from_slice(information);
            }
        }
    }
}

impl ByteSize for MediaCodecCapability {
    fn byte_size(&self) -> usize {
        2 + match self {
            MediaCodecCapability::Sbc(information) => information.byte_size(),
            MediaCodecCapability::Generic(_, information) => information.len()
        }
    }
}

#[derive(Clone, Copy, Instruct, Exstruct)]
struct MediaTypeRaw (
    #[instructor(bitfield(u8))]
    #[instructor(bits(4..8))]
    MediaType
);

fn read_remaining<B: Buffer>(buffer: &mut B) -> Result<Vec<u8>, Error> {
    let mut data = vec![0; buffer.remaining()];
    buffer.try_copy_to_slice(&mut data)?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use bytes::{Buf, Bytes, BytesMut};
    use instructor::{Buffer, BufferMut};

    use super::*;
    use crate::a2dp::sbc::SbcMediaCodecInformation;
    use crate::avdtp::packets::MediaType;

    #[test]
    fn roundtrips_capability_list() {
        let packet_bytes: &[u8] = &[0x01, 0x00, 0x07, 0x06, 0x00, 0x00, 0xff, 0xff, 0x02, 0x35];
        let capabilities = vec![
            Capability::MediaTransport,
            Capability::MediaCodec(MediaCodecCapability::Sbc(SbcMediaCodecInformation::default()))
        ];
        let mut buffer = BytesMut::new();
        buffer.write(&capabilities);
        assert_eq!(buffer.chunk(), packet_bytes);
        let parsed: Vec<Capability> = buffer.read().unwrap();
        assert_eq!(parsed, capabilities);
    }

    #[test]
    fn roundtrips_content_protection() {
        let capability = Capability::Generic(ServiceCategory::ContentProtection, vec![0x02, 0x00]);
        let mut buffer = BytesMut::new();
        buffer.write_be(&capability);
        assert_eq!(buffer.chunk(), &[0x04, 0x02, 0x02, 0x00]);
        let parsed: Capability = buffer.freeze().read_be().unwrap();
        assert_eq!(parsed, capability);
    }

    #[test]
    fn unknown_codec_stays_raw() {
        let mut data = Bytes::from_static(&[0x07, 0x04, 0x00, 0xff, 0xca, 0xfe]);
        let capability: Capability = data.read_be().unwrap();
        let Capability::MediaCodec(MediaCodecCapability::Generic(id, information)) = capability else {
            panic!("expected a generic media codec");
        };
        assert_eq!(id.media_type, MediaType::Audio);
        assert_eq!(id.audio_codec(), Some(AudioCodec::NonA2dp));
        assert_eq!(information, vec![0xca, 0xfe]);
    }

    #[test]
    fn rejects_invalid_bitpool_range() {
        // min 60 > max 10
        let mut data = Bytes::from_static(&[0x07, 0x06, 0x00, 0x00, 0xff, 0xff, 0x3c, 0x0a]);
        assert!(data.read_be::<Capability>().is_err());
        // max above 250
        let mut data = Bytes::from_static(&[0x07, 0x06, 0x00, 0x00, 0xff, 0xff, 0x02, 0xfb]);
        assert!(data.read_be::<Capability>().is_err());
        // min below 2
        let mut data = Bytes::from_static(&[0x07, 0x06, 0x00, 0x00, 0xff, 0xff, 0x01, 0x35]);
        assert!(data.read_be::<Capability>().is_err());
    }

    #[test]
    fn tolerates_trailing_codec_bytes() {
        let mut data = Bytes::from_static(&[0x07, 0x08, 0x00, 0x00, 0xff, 0xff, 0x02, 0x35, 0x00, 0x00]);
        let capability: Capability = data.read_be().unwrap();
        assert_eq!(
            capability,
            Capability::MediaCodec(MediaCodecCapability::Sbc(SbcMediaCodecInformation::default()))
        );
    }
}
