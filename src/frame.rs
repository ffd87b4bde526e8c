/*
 * netio - request/response networking with timeout/cancellation support
 * This is free and unencumbered software released into the public domain.
 */
use crate::NetError;

/// Size of the length header preceding every stream payload.
pub const HEADER_SIZE: usize = 4;

/// The length-prefixed envelope used on stream transports
///
/// Wire format: 4-byte big-endian unsigned payload length, followed by the
/// raw payload bytes. No magic number and no checksum; the stream transport
/// is assumed reliable. A zero length is a valid, empty message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    payload: Vec<u8>,
}

impl Frame {
    pub fn new(payload: Vec<u8>) -> Result<Self, NetError> {
        if payload.len() > u32::MAX as usize {
            return Err(NetError::TooBig);
        }
        Ok(Self { payload })
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Header and payload as one contiguous buffer, ready for a single
    /// write.
    pub fn into_bytes(self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        bytes.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        bytes.extend(self.payload);
        bytes
    }

    /// Payload length announced by a received header.
    pub fn payload_len(header: &[u8; HEADER_SIZE]) -> usize {
        u32::from_be_bytes(*header) as usize
    }
}
