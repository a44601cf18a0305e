pub mod attributes {
    // ([Vol 3] Part B, Section 5.1).
    pub const SERVICE_RECORD_HANDLE_ID: u16 = 0x0000;
    pub const SERVICE_CLASS_ID_LIST_ID: u16 = 0x0001;
    pub const SERVICE_RECORD_STATE_ID: u16 = 0x0002;
    pub const SERVICE_ID_ID: u16 = 0x0003;
    pub const PROTOCOL_DESCRIPTOR_LIST_ID: u16 = 0x0004;
    pub const BROWSE_GROUP_LIST_ID: u16 = 0x0005;
    pub const LANGUAGE_BASE_ID_LIST_ID: u16 = 0x0006;
    pub const SERVICE_INFO_TIME_TO_LIVE_ID: u16 = 0x0007;
    pub const SERVICE_AVAILABILITY_ID: u16 = 0x0008;
    pub const BLUETOOTH_PROFILE_DESCRIPTOR_LIST_ID: u16 = 0x0009;
    pub const ADDITIONAL_PROTOCOL_DESCRIPTOR_LIST_ID: u16 = 0x000D;

    pub fn name(id: u16) -> Option<&'static str> {
        match id {
            SERVICE_RECORD_HANDLE_ID => Some("ServiceRecordHandle"),
            SERVICE_CLASS_ID_LIST_ID => Some("ServiceClassIDList"),
            SERVICE_RECORD_STATE_ID => Some("ServiceRecordState"),
            SERVICE_ID_ID => Some("ServiceID"),
            PROTOCOL_DESCRIPTOR_LIST_ID => Some("ProtocolDescriptorList"),
            BROWSE_GROUP_LIST_ID => Some("BrowseGroupList"),
            LANGUAGE_BASE_ID_LIST_ID => Some("LanguageBaseAttributeIDList"),
            SERVICE_INFO_TIME_TO_LIVE_ID => Some("ServiceInfoTimeToLive"),
            SERVICE_AVAILABILITY_ID => Some("ServiceAvailability"),
            BLUETOOTH_PROFILE_DESCRIPTOR_LIST_ID => Some("BluetoothProfileDescriptorList"),
            ADDITIONAL_PROTOCOL_DESCRIPTOR_LIST_ID => Some("AdditionalProtocolDescriptorLists"),
            _ => None
        }
    }
}

// ([Assigned Numbers] Section 3.1).
pub mod protocols {
    use crate::sdp::Uuid;

    pub const SDP: Uuid = Uuid::from_u16(0x0001);
    pub const RFCOMM: Uuid = Uuid::from_u16(0x0003);
    pub const ATT: Uuid = Uuid::from_u16(0x0007);
    pub const OBEX: Uuid = Uuid::from_u16(0x0008);
    pub const BNEP: Uuid = Uuid::from_u16(0x000f);
    pub const HID_PROTOCOL: Uuid = Uuid::from_u16(0x0011);
    pub const AVCTP: Uuid = Uuid::from_u16(0x0017);
    pub const AVDTP: Uuid = Uuid::from_u16(0x0019);
    pub const L2CAP: Uuid = Uuid::from_u16(0x0100);
}

// ([Assigned Numbers] Section 3.3).
pub mod service_classes {
    use crate::sdp::Uuid;

    pub const AUDIO_SOURCE: Uuid = Uuid::from_u16(0x110A);
    pub const AUDIO_SINK: Uuid = Uuid::from_u16(0x110B);
    pub const REMOTE_CONTROL_TARGET: Uuid = Uuid::from_u16(0x110C);
    pub const ADVANCED_AUDIO_DISTRIBUTION: Uuid = Uuid::from_u16(0x110D);
    pub const REMOTE_CONTROL: Uuid = Uuid::from_u16(0x110E);
}

// ([Assigned Numbers] Section 3.2).
pub mod browse_groups {
    use crate::sdp::Uuid;

    pub const PUBLIC_BROWSE_ROOT: Uuid = Uuid::from_u16(0x1002);
}
