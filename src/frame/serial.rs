use super::*;
use crate::error::PacketError;

pub const CHECKSUM_SIZE: usize = 8;
pub const UNRELIABLE_HEADER_SIZE: usize = CHECKSUM_SIZE + 1;
pub const RELIABLE_HEADER_SIZE: usize = CHECKSUM_SIZE + 1 + 1 + 4;
pub const MIN_HEADER_SIZE: usize = UNRELIABLE_HEADER_SIZE;

const CHANNEL_RELIABLE: u8 = 0x00;
const CHANNEL_UNRELIABLE: u8 = 0x01;

const KIND_MASK: u8 = 0x0F;
const KIND_DATA: u8 = 0x00;
const KIND_HELLO: u8 = 0x01;
const KIND_GOODBYE: u8 = 0x02;
const KIND_ACK: u8 = 0x03;
const MORE_FRAGMENTS_BIT: u8 = 0x80;

pub struct Reader<'a> {
    bytes: &'a [u8],
    bytes_read: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            bytes_read: 0,
        }
    }

    pub fn bytes_read(&self) -> usize {
        self.bytes_read
    }

    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let end = self.bytes_read.checked_add(N)?;
        let array = self.bytes.get(self.bytes_read..end)?.try_into().ok()?;
        self.bytes_read = end;
        Some(array)
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|b| b[0])
    }

    pub fn read_u32(&mut self) -> Option<u32> {
        self.take::<4>().map(u32::from_be_bytes)
    }

    pub fn read_u64(&mut self) -> Option<u64> {
        self.take::<8>().map(u64::from_be_bytes)
    }

    /// Consumes and returns all remaining bytes.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = &self.bytes[self.bytes_read.min(self.bytes.len())..];
        self.bytes_read = self.bytes.len();
        rest
    }
}

pub struct Writer<'a> {
    bytes: &'a mut [u8],
    bytes_written: usize,
}

impl<'a> Writer<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self {
            bytes,
            bytes_written: 0,
        }
    }

    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    pub fn write_slice(&mut self, data: &[u8]) {
        let end = self.bytes_written + data.len();
        self.bytes[self.bytes_written..end].copy_from_slice(data);
        self.bytes_written = end;
    }

    pub fn write_u8(&mut self, value: u8) {
        self.write_slice(&[value]);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_slice(&value.to_be_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.write_slice(&value.to_be_bytes());
    }
}

/// Returns the header size used by packets with the given header.
pub fn header_size(header: &PacketHeader) -> usize {
    match header {
        PacketHeader::Unreliable => UNRELIABLE_HEADER_SIZE,
        PacketHeader::Reliable(_) => RELIABLE_HEADER_SIZE,
    }
}

fn encode_kind(kind: ReliableKind) -> u8 {
    match kind {
        ReliableKind::Data { more: false } => KIND_DATA,
        ReliableKind::Data { more: true } => KIND_DATA | MORE_FRAGMENTS_BIT,
        ReliableKind::Hello => KIND_HELLO,
        ReliableKind::Goodbye => KIND_GOODBYE,
        ReliableKind::Ack => KIND_ACK,
    }
}

fn decode_kind(byte: u8) -> Result<ReliableKind, PacketError> {
    let more = byte & MORE_FRAGMENTS_BIT != 0;

    match (byte & !MORE_FRAGMENTS_BIT, more) {
        (KIND_DATA, more) => Ok(ReliableKind::Data { more }),
        (KIND_HELLO, false) => Ok(ReliableKind::Hello),
        (KIND_GOODBYE, false) => Ok(ReliableKind::Goodbye),
        (KIND_ACK, false) => Ok(ReliableKind::Ack),
        _ => Err(PacketError::UnknownKind(byte & KIND_MASK)),
    }
}

/// Writes header and payload into `buffer` and returns the number of bytes written. The checksum
/// field is zeroed; see [`checksum::seal`].
///
/// Panics if `buffer` cannot hold the packet.
pub fn encode(header: &PacketHeader, payload: &[u8], buffer: &mut [u8]) -> usize {
    debug_assert!(buffer.len() >= header_size(header) + payload.len());

    let mut writer = Writer::new(buffer);

    writer.write_u64(0);

    match header {
        PacketHeader::Unreliable => {
            writer.write_u8(CHANNEL_UNRELIABLE);
        }
        PacketHeader::Reliable(header) => {
            debug_assert!(
                payload.is_empty() || matches!(header.kind, ReliableKind::Data { .. }),
                "control packets carry no payload"
            );

            writer.write_u8(CHANNEL_RELIABLE);
            writer.write_u8(encode_kind(header.kind));
            writer.write_u32(header.sequence);
        }
    }

    writer.write_slice(payload);

    writer.bytes_written()
}

/// Parses a packet, returning it along with the number of bytes consumed. The checksum is not
/// verified here.
pub fn decode(bytes: &[u8]) -> Result<(Packet<'_>, usize), PacketError> {
    let truncated = |min| PacketError::Truncated {
        len: bytes.len(),
        min,
    };

    let mut reader = Reader::new(bytes);

    reader
        .read_u64()
        .ok_or_else(|| truncated(MIN_HEADER_SIZE))?;
    let channel = reader.read_u8().ok_or_else(|| truncated(MIN_HEADER_SIZE))?;

    let header = match channel {
        CHANNEL_UNRELIABLE => PacketHeader::Unreliable,
        CHANNEL_RELIABLE => {
            let kind_byte = reader
                .read_u8()
                .ok_or_else(|| truncated(RELIABLE_HEADER_SIZE))?;
            let sequence = reader
                .read_u32()
                .ok_or_else(|| truncated(RELIABLE_HEADER_SIZE))?;
            let kind = decode_kind(kind_byte)?;

            PacketHeader::Reliable(ReliableHeader { kind, sequence })
        }
        other => return Err(PacketError::UnknownChannel(other)),
    };

    let payload = reader.read_rest();

    if let PacketHeader::Reliable(ReliableHeader { kind, .. }) = &header {
        if !matches!(kind, ReliableKind::Data { .. }) && !payload.is_empty() {
            return Err(PacketError::UnexpectedPayload(payload.len()));
        }
    }

    Ok((Packet { header, payload }, reader.bytes_read()))
}

/// Returns true if `bytes` is an intact reliable Hello, the only packet which may open a
/// connection.
pub fn is_hello(bytes: &[u8]) -> bool {
    if checksum::verify(bytes).is_err() {
        return false;
    }

    matches!(
        decode(bytes),
        Ok((
            Packet {
                header: PacketHeader::Reliable(ReliableHeader {
                    kind: ReliableKind::Hello,
                    ..
                }),
                ..
            },
            _
        ))
    )
}
