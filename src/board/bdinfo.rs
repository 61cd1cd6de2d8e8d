//! The factory board-information record stored in the `bdinfo` partition.
//!
//! A small fixed-size record written at manufacturing time: hardware revision, serial number,
//! product name, and the base MAC address, protected by a CRC-32 over everything after the
//! checksum field.

use anyhow::ensure;
use bytes::{Buf, BufMut, BytesMut};
use crc::{Crc, CRC_32_ISO_HDLC};

pub const RECORD_SIZE: usize = 42;

const RECORD_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Offset of the first checksummed byte (everything after `reserved` and `crc32`)
const CRC_REGION: usize = 6;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BoardRecord {
    pub hdr_version: u16,
    pub hw_version: u16,
    pub factory_date: u16,
    pub serial: [u8; 8],
    pub product: [u8; 16],
    pub mac: [u8; 6],
}

impl BoardRecord {
    /// Parse a record, verifying its checksum.
    pub fn decode(bytes: &[u8]) -> anyhow::Result<Self> {
        ensure!(bytes.len() >= RECORD_SIZE, "bdinfo record truncated");

        let mut buf = &bytes[..RECORD_SIZE];
        let _reserved = buf.get_u16();
        let crc32 = buf.get_u32();
        ensure!(
            crc32 == RECORD_CRC.checksum(&bytes[CRC_REGION..RECORD_SIZE]),
            "bdinfo checksum mismatch",
        );

        let hdr_version = buf.get_u16();
        let hw_version = buf.get_u16();
        let factory_date = buf.get_u16();
        let mut serial = [0u8; 8];
        buf.copy_to_slice(&mut serial);
        let mut product = [0u8; 16];
        buf.copy_to_slice(&mut product);
        let mut mac = [0u8; 6];
        buf.copy_to_slice(&mut mac);

        Ok(BoardRecord {
            hdr_version,
            hw_version,
            factory_date,
            serial,
            product,
            mac,
        })
    }

    /// Serialize the record with a freshly computed checksum.
    pub fn encode(&self) -> BytesMut {
        let mut payload = BytesMut::with_capacity(RECORD_SIZE - CRC_REGION);
        payload.put_u16(self.hdr_version);
        payload.put_u16(self.hw_version);
        payload.put_u16(self.factory_date);
        payload.put_slice(&self.serial);
        payload.put_slice(&self.product);
        payload.put_slice(&self.mac);

        let mut bytes = BytesMut::with_capacity(RECORD_SIZE);
        bytes.put_u16(0); // reserved
        bytes.put_u32(RECORD_CRC.checksum(&payload));
        bytes.put_slice(&payload);
        bytes
    }
}

#[cfg(test)]
fn sample_record() -> BoardRecord {
    BoardRecord {
        hdr_version: 1,
        hw_version: 0x0200,
        factory_date: 0x2e51,
        serial: *b"A1B2C3D4",
        product: *b"router-ac3200\0\0\0",
        mac: [0x00, 0x90, 0x4c, 0x12, 0x34, 0x56],
    }
}

#[test]
fn test_record_round_trip() -> anyhow::Result<()> {
    let record = sample_record();
    let bytes = record.encode();
    assert_eq!(bytes.len(), RECORD_SIZE);

    let decoded = BoardRecord::decode(&bytes)?;
    assert_eq!(decoded, record);

    // Trailing partition bytes beyond the record are ignored
    let mut padded = bytes.to_vec();
    padded.resize(256, 0xFF);
    assert_eq!(BoardRecord::decode(&padded)?, record);

    Ok(())
}

#[test]
fn test_record_rejects_corruption() {
    let mut bytes = sample_record().encode().to_vec();

    bytes[20] ^= 0x01;
    assert!(BoardRecord::decode(&bytes).is_err());

    assert!(BoardRecord::decode(&bytes[..10]).is_err());
}
