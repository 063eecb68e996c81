use crc::{Crc, CRC_64_ECMA_182};

use super::serial::CHECKSUM_SIZE;
use crate::error::PacketError;

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

/// Computes the checksum of the bytes which follow a packet's checksum field.
pub fn compute(bytes: &[u8]) -> u64 {
    CRC64.checksum(bytes)
}

/// Writes the checksum of `packet[CHECKSUM_SIZE..]` into the first `CHECKSUM_SIZE` bytes.
pub fn seal(packet: &mut [u8]) {
    let (head, tail) = packet.split_at_mut(CHECKSUM_SIZE);
    head.copy_from_slice(&compute(tail).to_be_bytes());
}

pub fn verify(packet: &[u8]) -> Result<(), PacketError> {
    if packet.len() < CHECKSUM_SIZE {
        return Err(PacketError::Truncated {
            len: packet.len(),
            min: CHECKSUM_SIZE,
        });
    }

    let (head, tail) = packet.split_at(CHECKSUM_SIZE);

    let mut received = [0; CHECKSUM_SIZE];
    received.copy_from_slice(head);
    let received = u64::from_be_bytes(received);
    let computed = compute(tail);

    if received == computed {
        Ok(())
    } else {
        Err(PacketError::Corrupt { received, computed })
    }
}
