//! PSSH box handling.
//!
//! The KMS hands out Widevine and PlayReady boxes ready to use; FairPlay has no
//! PSSH of its own, so the packager receives an empty placeholder box carrying
//! the FairPlay system id.
use byteorder::{BigEndian, ByteOrder};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Known DRM system IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemId {
    Widevine,
    PlayReady,
    /// FairPlay as registered with DASH-IF, used in CPIX documents.
    FairPlay,
    /// FairPlay as written into PSSH boxes by Shaka Packager.
    FairPlayPackager,
}

impl SystemId {
    pub fn to_uuid(self) -> Uuid {
        match self {
            SystemId::Widevine => Uuid::from_u128(0xedef8ba979d64acea3c827dcd51d21ed),
            SystemId::PlayReady => Uuid::from_u128(0x9a04f07998404286ab92e65be0885f95),
            SystemId::FairPlay => Uuid::from_u128(0x94ce86fb07ff4f43adb893d2fa968ca2),
            SystemId::FairPlayPackager => Uuid::from_u128(0x29701fe43cc74a348c5bae90c7439a47),
        }
    }

    /// Match a system id read from a document or box.
    pub fn from_uuid(uuid: &Uuid) -> Option<Self> {
        [
            SystemId::Widevine,
            SystemId::PlayReady,
            SystemId::FairPlay,
            SystemId::FairPlayPackager,
        ]
        .into_iter()
        .find(|id| id.to_uuid() == *uuid)
    }
}

/// A parsed or constructed PSSH box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pssh {
    pub version: u8,
    pub flags: u32,
    pub system_id: Uuid,
    pub key_ids: Vec<Uuid>,
    pub init_data: Vec<u8>,
}

impl Pssh {
    /// Create a box. Version 1 is chosen when key ids are given.
    pub fn new(system_id: Uuid, key_ids: Vec<Uuid>, init_data: Vec<u8>) -> Self {
        Self {
            version: if key_ids.is_empty() { 0 } else { 1 },
            flags: 0,
            system_id,
            key_ids,
            init_data,
        }
    }

    /// The empty FairPlay box handed to the packager.
    pub fn fairplay_placeholder() -> Self {
        Self::new(SystemId::FairPlayPackager.to_uuid(), Vec::new(), Vec::new())
    }

    /// Parse a full PSSH box.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < 8 {
            return Err(Error::InvalidPssh("Data too short".to_string()));
        }

        let mut offset = 0;
        let size = BigEndian::read_u32(&data[offset..offset + 4]) as usize;
        offset += 4;
        if &data[offset..offset + 4] != b"pssh" {
            return Err(Error::InvalidPssh("Not a PSSH box".to_string()));
        }
        offset += 4;

        if size == 1 {
            return Err(Error::InvalidPssh("64-bit box sizes are not supported".to_string()));
        }
        if size > data.len() {
            return Err(Error::InvalidPssh("PSSH size exceeds data length".to_string()));
        }
        if data.len() < offset + 4 + 16 {
            return Err(Error::InvalidPssh("PSSH header incomplete".to_string()));
        }

        let version = data[offset];
        let flags = BigEndian::read_u32(&data[offset..offset + 4]) & 0x00FF_FFFF;
        offset += 4;

        let system_id = Uuid::from_slice(&data[offset..offset + 16])?;
        offset += 16;

        let mut key_ids = Vec::new();
        if version == 1 {
            if data.len() < offset + 4 {
                return Err(Error::InvalidPssh("Missing KID count".to_string()));
            }
            let kid_count = BigEndian::read_u32(&data[offset..offset + 4]) as usize;
            offset += 4;
            if data.len() < offset + kid_count * 16 {
                return Err(Error::InvalidPssh("Missing KIDs".to_string()));
            }
            for chunk in data[offset..offset + kid_count * 16].chunks_exact(16) {
                key_ids.push(Uuid::from_slice(chunk)?);
            }
            offset += kid_count * 16;
        }

        if data.len() < offset + 4 {
            return Err(Error::InvalidPssh("Missing init data length".to_string()));
        }
        let data_size = BigEndian::read_u32(&data[offset..offset + 4]) as usize;
        offset += 4;
        if data.len() < offset + data_size {
            return Err(Error::InvalidPssh("Missing init data".to_string()));
        }

        Ok(Self {
            version,
            flags,
            system_id,
            key_ids,
            init_data: data[offset..offset + data_size].to_vec(),
        })
    }

    /// Serialize as a full PSSH box.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&((u32::from(self.version) << 24) | (self.flags & 0x00FF_FFFF)).to_be_bytes());
        body.extend_from_slice(self.system_id.as_bytes());

        if self.version == 1 {
            body.extend_from_slice(&(self.key_ids.len() as u32).to_be_bytes());
            for kid in self.key_ids.iter() {
                body.extend_from_slice(kid.as_bytes());
            }
        }

        body.extend_from_slice(&(self.init_data.len() as u32).to_be_bytes());
        body.extend_from_slice(&self.init_data);

        let mut out = Vec::with_capacity(body.len() + 8);
        out.extend_from_slice(&((body.len() + 8) as u32).to_be_bytes());
        out.extend_from_slice(b"pssh");
        out.extend_from_slice(&body);
        out
    }

    /// Upper-case hex of the serialized box.
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.to_bytes())
    }
}
