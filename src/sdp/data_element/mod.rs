mod uuid;

use bytes::BytesMut;
use instructor::{BigEndian, Buffer, BufferMut, Error as InstructorError, Exstruct, Instruct};
use instructor::utils::Limit;
use crate::ensure;

pub use uuid::Uuid;
use crate::sdp::error::Error;

// ([Vol 3] Part B, Section 3.2).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Exstruct)]
#[repr(u8)]
enum DataType {
    Nil = 0x00,
    UInt = 0x01,
    SInt = 0x02,
    Uuid = 0x03,
    Text = 0x04,
    Bool = 0x05,
    Sequence = 0x06,
    Alternative = 0x07,
    Url = 0x08,
}

impl DataType {

    fn valid_size_indices(self) -> &'static [u8] {
        match self {
            DataType::Nil => &[0],
            DataType::UInt => &[0, 1, 2, 3, 4],
            DataType::SInt => &[0, 1, 2, 3, 4],
            DataType::Uuid => &[1, 2, 4],
            DataType::Text => &[5, 6, 7],
            DataType::Bool => &[0],
            DataType::Sequence => &[5, 6, 7],
            DataType::Alternative => &[5, 6, 7],
            DataType::Url => &[5, 6, 7],
        }
    }

}

// ([Vol 3] Part B, Section 3.4).
#[derive(Debug, Exstruct)]
#[instructor(endian = "big")]
struct DataElementHeader {
    #[instructor(bitfield(u8))]
    #[instructor(bits(3..8))]
    data_type: DataType,
    #[instructor(bits(0..3))]
    size_index: u8
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct FullDataElementHeader {
    data_type: DataType,
    length: usize,
}

// ([Vol 3] Part B, Section 3.3).
impl Exstruct<BigEndian> for FullDataElementHeader {
    fn read_from_buffer<B: Buffer>(buffer: &mut B) -> Result<Self, InstructorError> {
        let DataElementHeader { data_type, size_index } = buffer.read()?;
        ensure!(data_type.valid_size_indices().contains(&size_index), InstructorError::InvalidValue);
        let length = match size_index {
            0 if data_type == DataType::Nil => 0,
            0 => 1,
            1 => 2,
            2 => 4,
            3 => 8,
            4 => 16,
            5 => buffer.read_be::<u8>()? as usize,
            6 => buffer.read_be::<u16>()? as usize,
            7 => buffer.read_be::<u32>()? as usize,
            _ => return Err(InstructorError::InvalidValue)
        };
        ensure!(length <= buffer.remaining(), InstructorError::TooShort);
        Ok(Self {
            data_type,
            length,
        })
    }
}

fn write_header<B: BufferMut>(buffer: &mut B, data_type: DataType, size_index: u8) {
    buffer.write_be(&(((data_type as u8) << 3) | size_index));
}

// Variable-length contents carry an 8/16/32-bit length prefix (size indices 5..7).
fn write_var_header<B: BufferMut>(buffer: &mut B, data_type: DataType, length: usize) {
    if let Ok(length) = u8::try_from(length) {
        write_header(buffer, data_type, 5);
        buffer.write_be(&length);
    } else if let Ok(length) = u16::try_from(length) {
        write_header(buffer, data_type, 6);
        buffer.write_be(&length);
    } else {
        write_header(buffer, data_type, 7);
        buffer.write_be(&u32::try_from(length).expect("data element too large"));
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum DataElement {
    Nil,
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    U128(u128),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    I128(i128),
    Uuid(Uuid),
    Text(String),
    Bool(bool),
    Sequence(Vec<DataElement>),
    Alternative(Vec<DataElement>),
    Url(String),
}

impl DataElement {

    pub fn as_sequence(&self) -> Result<&[DataElement], Error> {
        match self {
            DataElement::Sequence(sequence) => Ok(sequence),
            _ => Err(Error::UnexpectedDataType)
        }
    }

    pub fn as_uuid(&self) -> Result<Uuid, Error> {
        match self {
            DataElement::Uuid(uuid) => Ok(*uuid),
            _ => Err(Error::UnexpectedDataType)
        }
    }

    pub fn as_u32(&self) -> Result<u32, Error> {
        match self {
            DataElement::U32(value) => Ok(*value),
            _ => Err(Error::UnexpectedDataType)
        }
    }

    pub fn as_u16(&self) -> Result<u16, Error> {
        match self {
            DataElement::U16(value) => Ok(*value),
            _ => Err(Error::UnexpectedDataType)
        }
    }

    pub fn as_u8(&self) -> Result<u8, Error> {
        match self {
            DataElement::U8(value) => Ok(*value),
            _ => Err(Error::UnexpectedDataType)
        }
    }

}

impl Exstruct<BigEndian> for DataElement {
    fn read_from_buffer<B: Buffer>(buffer: &mut B) -> Result<Self, InstructorError> {
        let FullDataElementHeader { data_type, length } = buffer.read()?;

        fn read_string<B: Buffer>(buffer: &mut B, length: usize) -> Result<String, InstructorError> {
            let mut text = vec![0u8; length];
            buffer.try_copy_to_slice(&mut text)?;
            String::from_utf8(text).map_err(|_| InstructorError::InvalidValue)
        }

        fn read_list<B: Buffer>(buffer: &mut B, length: usize) -> Result<Vec<DataElement>, InstructorError> {
            let mut buffer = Limit::new(buffer, length);
            let mut elements = Vec::new();
            while buffer.remaining() > 0 {
                elements.push(buffer.read()?);
            }
            buffer.finish()?;
            Ok(elements)
        }

        match (data_type, length) {
            (DataType::Nil, 0) => Ok(Self::Nil),
            (DataType::UInt, 1) => Ok(Self::U8(buffer.read_be()?)),
            (DataType::UInt, 2) => Ok(Self::U16(buffer.read_be()?)),
            (DataType::UInt, 4) => Ok(Self::U32(buffer.read_be()?)),
            (DataType::UInt, 8) => Ok(Self::U64(buffer.read_be()?)),
            (DataType::UInt, 16) => Ok(Self::U128(buffer.read_be()?)),
            (DataType::SInt, 1) => Ok(Self::I8(buffer.read_be()?)),
            (DataType::SInt, 2) => Ok(Self::I16(buffer.read_be()?)),
            (DataType::SInt, 4) => Ok(Self::I32(buffer.read_be()?)),
            (DataType::SInt, 8) => Ok(Self::I64(buffer.read_be()?)),
            (DataType::SInt, 16) => Ok(Self::I128(buffer.read_be()?)),
            (DataType::Uuid, 2) => Ok(Self::Uuid(Uuid::from(buffer.read_be::<u16>()?))),
            (DataType::Uuid, 4) => Ok(Self::Uuid(Uuid::from(buffer.read_be::<u32>()?))),
            (DataType::Uuid, 16) => Ok(Self::Uuid(Uuid::from(buffer.read_be::<u128>()?))),
            (DataType::Text, n) => Ok(Self::Text(read_string(buffer, n)?)),
            (DataType::Bool, 1) => Ok(Self::Bool(buffer.read_be::<u8>()? != 0)),
            (DataType::Sequence, n) => Ok(Self::Sequence(read_list(buffer, n)?)),
            (DataType::Alternative, n) => Ok(Self::Alternative(read_list(buffer, n)?)),
            (DataType::Url, n) => Ok(Self::Url(read_string(buffer, n)?)),
            _ => Err(InstructorError::InvalidValue)
        }
    }
}

impl Instruct<BigEndian> for DataElement {
    fn write_to_buffer<B: BufferMut>(&self, buffer: &mut B) {
        match self {
            DataElement::Nil => write_header(buffer, DataType::Nil, 0),
            DataElement::U8(value) => {
                write_header(buffer, DataType::UInt, 0);
                buffer.write_be(value);
            },
            DataElement::U16(value) => {
                write_header(buffer, DataType::UInt, 1);
                buffer.write_be(value);
            },
            DataElement::U32(value) => {
                write_header(buffer, DataType::UInt, 2);
                buffer.write_be(value);
            },
            DataElement::U64(value) => {
                write_header(buffer, DataType::UInt, 3);
                buffer.write_be(value);
            },
            DataElement::U128(value) => {
                write_header(buffer, DataType::UInt, 4);
                buffer.write_be(value);
            },
            DataElement::I8(value) => {
                write_header(buffer, DataType::SInt, 0);
                buffer.write_be(value);
            },
            DataElement::I16(value) => {
                write_header(buffer, DataType::SInt, 1);
                buffer.write_be(value);
            },
            DataElement::I32(value) => {
                write_header(buffer, DataType::SInt, 2);
                buffer.write_be(value);
            },
            DataElement::I64(value) => {
                write_header(buffer, DataType::SInt, 3);
                buffer.write_be(value);
            },
            DataElement::I128(value) => {
                write_header(buffer, DataType::SInt, 4);
                buffer.write_be(value);
            },
            // Emitted in the shortest of the 16/32/128-bit forms.
            DataElement::Uuid(uuid) => match (uuid.as_u16(), uuid.as_u32()) {
                (Some(short), _) => {
                    write_header(buffer, DataType::Uuid, 1);
                    buffer.write_be(&short);
                },
                (None, Some(short)) => {
                    write_header(buffer, DataType::Uuid, 2);
                    buffer.write_be(&short);
                },
                (None, None) => {
                    write_header(buffer, DataType::Uuid, 4);
                    buffer.write_be(&uuid.as_u128());
                },
            },
            DataElement::Text(text) => {
                write_var_header(buffer, DataType::Text, text.len());
                buffer.extend_from_slice(text.as_bytes());
            },
            DataElement::Bool(value) => {
                write_header(buffer, DataType::Bool, 0);
                buffer.write_be(&u8::from(*value));
            },
            DataElement::Sequence(elements) => {
                let mut content = BytesMut::new();
                content.write(elements);
                write_var_header(buffer, DataType::Sequence, content.len());
                buffer.extend_from_slice(&content);
            },
            DataElement::Alternative(elements) => {
                let mut content = BytesMut::new();
                content.write(elements);
                write_var_header(buffer, DataType::Alternative, content.len());
                buffer.extend_from_slice(&content);
            },
            DataElement::Url(url) => {
                write_var_header(buffer, DataType::Url, url.len());
                buffer.extend_from_slice(url.as_bytes());
            },
        }
    }
}

impl From<u8> for DataElement {
    fn from(value: u8) -> Self {
        Self::U8(value)
    }
}

impl From<u16> for DataElement {
    fn from(value: u16) -> Self {
        Self::U16(value)
    }
}

impl From<u32> for DataElement {
    fn from(value: u32) -> Self {
        Self::U32(value)
    }
}

impl From<bool> for DataElement {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Uuid> for DataElement {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<&str> for DataElement {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl<A: Into<DataElement>, B: Into<DataElement>> From<(A, B)> for DataElement {
    fn from((a, b): (A, B)) -> Self {
        Self::Sequence(vec![a.into(), b.into()])
    }
}

impl<T: Into<DataElement>> FromIterator<T> for DataElement {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::Sequence(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use bytes::{Buf, Bytes, BytesMut};
    use instructor::{Buffer, BufferMut};
    use super::*;

    fn roundtrip(element: &DataElement) -> DataElement {
        let mut buffer = BytesMut::new();
        buffer.write(element);
        let mut buffer = buffer.freeze();
        let parsed: DataElement = buffer.read().unwrap();
        buffer.finish().unwrap();
        parsed
    }

    #[test]
    fn roundtrip_scalars() {
        for element in [
            DataElement::Nil,
            DataElement::U8(0x42),
            DataElement::U16(0x0019),
            DataElement::U32(0x00010001),
            DataElement::U64(u64::MAX),
            DataElement::U128(u128::MAX / 3),
            DataElement::I8(-1),
            DataElement::I16(-300),
            DataElement::I32(i32::MIN),
            DataElement::Bool(true),
            DataElement::Text("AdvancedAudioDistribution".to_string()),
            DataElement::Url("https://www.bluetooth.com/".to_string()),
        ] {
            assert_eq!(roundtrip(&element), element);
        }
    }

    #[test]
    fn roundtrip_tree() {
        let tree = DataElement::Sequence(vec![
            DataElement::Sequence(vec![
                DataElement::U16(0x0000),
                DataElement::U32(0x00010001),
                DataElement::Uuid(Uuid::from_u16(0x110B)),
            ]),
            DataElement::Alternative(vec![
                DataElement::Nil,
                DataElement::Text("speaker".to_string()),
            ]),
        ]);
        assert_eq!(roundtrip(&tree), tree);
    }

    #[test]
    fn uuids_canonicalize_to_short_forms() {
        // A 128-bit element holding a base-derived UUID re-encodes as 16-bit.
        let mut buffer = BytesMut::new();
        buffer.write_be(&0x1Cu8);
        buffer.write_be(&Uuid::from_u16(0x110D).as_u128());
        let element: DataElement = buffer.freeze().read().unwrap();
        assert_eq!(element, DataElement::Uuid(Uuid::from_u16(0x110D)));

        let mut reencoded = BytesMut::new();
        reencoded.write(&element);
        assert_eq!(reencoded.chunk(), &[0x19, 0x11, 0x0D]);
    }

    #[test]
    fn sixteen_bit_length_prefix() {
        let text = "x".repeat(300);
        let element = DataElement::Text(text.clone());
        let mut buffer = BytesMut::new();
        buffer.write(&element);
        assert_eq!(buffer.chunk()[0], 0x26);
        assert_eq!(&buffer.chunk()[1..3], &300u16.to_be_bytes());
        assert_eq!(roundtrip(&element), element);
    }

    #[test]
    fn rejects_invalid_size_index() {
        // A UUID cannot use size index 0.
        let mut data = Bytes::from_static(&[0x18, 0x11]);
        assert!(matches!(data.read::<DataElement>(), Err(InstructorError::InvalidValue)));
        // Truncated sequence content.
        let mut data = Bytes::from_static(&[0x35, 0x05, 0x19, 0x11]);
        assert!(matches!(data.read::<DataElement>(), Err(InstructorError::TooShort)));
    }

    #[test]
    fn parses_search_pattern() {
        let mut data = Bytes::from_static(&[0x35, 0x03, 0x19, 0x12, 0x00]);
        let pattern: DataElement = data.read().unwrap();
        data.finish().unwrap();
        assert_eq!(pattern.as_sequence().unwrap(), &[DataElement::Uuid(Uuid::from_u16(0x1200))]);
    }
}
