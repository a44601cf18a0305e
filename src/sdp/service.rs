use std::collections::BTreeMap;
use std::fmt::Debug;

use tracing::trace;

use crate::sdp::data_element::{DataElement, Uuid};
use crate::sdp::error::Error;
use crate::sdp::ids::attributes::*;

/// Profile descriptor: profile UUID plus a major.minor version word.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ProfileDescriptor {
    pub profile: Uuid,
    pub version: u16,
}

/// Protocol descriptor: protocol UUID plus protocol-specific parameters
/// (e.g. the PSM for L2CAP, the version for AVDTP).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ProtocolDescriptor {
    pub protocol: Uuid,
    pub parameters: Vec<DataElement>,
}

/// One service record decoded from a ServiceSearchAttribute response.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Service {
    handle: u32,
    classes: Vec<Uuid>,
    profiles: Vec<ProfileDescriptor>,
    protocols: Vec<ProtocolDescriptor>,
    attributes: BTreeMap<u16, DataElement>,
}

impl Service {

    /// Decodes a single attribute list: a flat sequence of
    /// (attribute id, attribute value) pairs ([Vol 3] Part B, Section 4.7.2).
    pub fn parse(element: &DataElement) -> Result<Self, Error> {
        let mut service = Service::default();
        let mut pairs = element.as_sequence()?.chunks_exact(2);
        for pair in pairs.by_ref() {
            let id = pair[0].as_u16()?;
            let value = &pair[1];
            match id {
                SERVICE_RECORD_HANDLE_ID => service.handle = value.as_u32()?,
                SERVICE_CLASS_ID_LIST_ID => {
                    service.classes = value
                        .as_sequence()?
                        .iter()
                        .map(DataElement::as_uuid)
                        .collect::<Result<_, _>>()?;
                },
                PROTOCOL_DESCRIPTOR_LIST_ID => {
                    service.protocols = value
                        .as_sequence()?
                        .iter()
                        .map(parse_protocol)
                        .collect::<Result<_, _>>()?;
                },
                BLUETOOTH_PROFILE_DESCRIPTOR_LIST_ID => {
                    service.profiles = value
                        .as_sequence()?
                        .iter()
                        .map(parse_profile)
                        .collect::<Result<_, _>>()?;
                },
                _ => {}
            }
            service.attributes.insert(id, value.clone());
        }
        match pairs.remainder().is_empty() {
            true => Ok(service),
            false => Err(Error::MalformedPacketContent)
        }
    }

    pub fn handle(&self) -> u32 {
        self.handle
    }

    pub fn classes(&self) -> &[Uuid] {
        &self.classes
    }

    pub fn profiles(&self) -> &[ProfileDescriptor] {
        &self.profiles
    }

    pub fn protocols(&self) -> &[ProtocolDescriptor] {
        &self.protocols
    }

    pub fn attributes(&self) -> &BTreeMap<u16, DataElement> {
        &self.attributes
    }

    pub fn is_class_supported(&self, class: Uuid) -> bool {
        self.classes.contains(&class)
    }

    pub fn profile(&self, profile: Uuid) -> Option<&ProfileDescriptor> {
        self.profiles.iter().find(|p| p.profile == profile)
    }

    pub fn protocol(&self, protocol: Uuid) -> Option<&ProtocolDescriptor> {
        self.protocols.iter().find(|p| p.protocol == protocol)
    }

    pub fn attribute(&self, id: u16) -> Option<&DataElement> {
        self.attributes.get(&id)
    }

    pub fn dump(&self) {
        trace!("Service 0x{:08x}", self.handle);
        for class in &self.classes {
            trace!("  class: {}", class);
        }
        for ProfileDescriptor { profile, version } in &self.profiles {
            trace!("  profile: {} v{}.{}", profile, version >> 8, version & 0xFF);
        }
        for ProtocolDescriptor { protocol, parameters } in &self.protocols {
            trace!("  protocol: {} {:?}", protocol, parameters);
        }
        for (id, value) in &self.attributes {
            trace!("  attribute 0x{:04x} '{}': {:?}", id, name(*id).unwrap_or("<service specific>"), value);
        }
    }

}

fn parse_protocol(element: &DataElement) -> Result<ProtocolDescriptor, Error> {
    let (protocol, parameters) = element
        .as_sequence()?
        .split_first()
        .ok_or(Error::MalformedPacketContent)?;
    Ok(ProtocolDescriptor {
        protocol: protocol.as_uuid()?,
        parameters: parameters.to_vec(),
    })
}

fn parse_profile(element: &DataElement) -> Result<ProfileDescriptor, Error> {
    match element.as_sequence()? {
        [profile, version] => Ok(ProfileDescriptor {
            profile: profile.as_uuid()?,
            version: version.as_u16()?,
        }),
        _ => Err(Error::MalformedPacketContent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdp::ids::{protocols, service_classes};

    fn sink_record() -> DataElement {
        DataElement::Sequence(vec![
            DataElement::U16(SERVICE_RECORD_HANDLE_ID), DataElement::U32(0x0001_0001),
            DataElement::U16(SERVICE_CLASS_ID_LIST_ID), DataElement::from_iter([service_classes::AUDIO_SINK]),
            DataElement::U16(PROTOCOL_DESCRIPTOR_LIST_ID), DataElement::from_iter([
                DataElement::from((protocols::L2CAP, 0x0019u16)),
                DataElement::from((protocols::AVDTP, 0x0103u16)),
            ]),
            DataElement::U16(BLUETOOTH_PROFILE_DESCRIPTOR_LIST_ID), DataElement::from_iter([
                DataElement::from((service_classes::ADVANCED_AUDIO_DISTRIBUTION, 0x0103u16)),
            ]),
            DataElement::U16(0x0311), DataElement::U16(0x0002),
        ])
    }

    #[test]
    fn parses_sink_record() {
        let service = Service::parse(&sink_record()).unwrap();
        assert_eq!(service.handle(), 0x0001_0001);
        assert!(service.is_class_supported(service_classes::AUDIO_SINK));
        assert!(!service.is_class_supported(service_classes::AUDIO_SOURCE));
        assert_eq!(service.profile(service_classes::ADVANCED_AUDIO_DISTRIBUTION).unwrap().version, 0x0103);
        let l2cap = service.protocol(protocols::L2CAP).unwrap();
        assert_eq!(l2cap.parameters, vec![DataElement::U16(0x0019)]);
        assert_eq!(service.attribute(0x0311), Some(&DataElement::U16(0x0002)));
    }

    #[test]
    fn rejects_dangling_attribute_id() {
        let record = DataElement::Sequence(vec![DataElement::U16(SERVICE_RECORD_HANDLE_ID)]);
        assert_eq!(Service::parse(&record), Err(Error::MalformedPacketContent));
    }

    #[test]
    fn rejects_malformed_profile_descriptor() {
        let record = DataElement::Sequence(vec![
            DataElement::U16(BLUETOOTH_PROFILE_DESCRIPTOR_LIST_ID),
            DataElement::from_iter([DataElement::from_iter([service_classes::ADVANCED_AUDIO_DISTRIBUTION])]),
        ]);
        assert_eq!(Service::parse(&record), Err(Error::MalformedPacketContent));
    }
}
