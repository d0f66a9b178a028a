//! # MQTT Packet Structures and Serialization
//!
//! This module defines the MQTT 3.1.1 packets the telemetry publisher speaks
//! (`CONNECT`, `CONNACK`, `PUBLISH`, `DISCONNECT`) and the traits for encoding
//! and decoding them to and from a byte buffer.
//!
//! Every packet starts with a fixed header byte (packet type in the high nibble,
//! flags in the low nibble) followed by the remaining length as a variable-byte
//! integer.

use crate::error::ProtocolError;
use crate::util::{
    self, read_utf8_string, write_binary, write_bytes, write_utf8_string,
};

/// Fixed header byte of a `CONNECT` packet.
pub const CONNECT: u8 = 0x10;
/// Fixed header byte of a `CONNACK` packet.
pub const CONNACK: u8 = 0x20;
/// Fixed header byte of a `PUBLISH` packet before QoS and retain flags are applied.
pub const PUBLISH: u8 = 0x30;
/// Fixed header byte of a `DISCONNECT` packet.
pub const DISCONNECT: u8 = 0xE0;

/// Protocol name carried in the `CONNECT` variable header.
pub const PROTOCOL_NAME: &str = "MQTT";
/// Protocol level 4 is MQTT 3.1.1.
pub const PROTOCOL_LEVEL: u8 = 4;

const FLAG_CLEAN_SESSION: u8 = 0x02;
const FLAG_PASSWORD: u8 = 0x40;
const FLAG_USERNAME: u8 = 0x80;

/// Room reserved ahead of the body for the remaining-length field.
const MAX_LEN_BYTES: usize = 4;

/// Represents the Quality of Service (QoS) levels for MQTT messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum QoS {
    /// Fire and forget.
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QoS {
    type Error = ProtocolError;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        match val {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(ProtocolError::MalformedPacket),
        }
    }
}

/// A trait for packets that can be encoded into a byte buffer.
pub trait EncodePacket {
    /// Encodes the whole packet, fixed header included, and returns its length.
    fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError>;
}

/// A trait for packets that can be decoded from a byte buffer.
pub trait DecodePacket<'a>: Sized {
    fn decode(buf: &'a [u8]) -> Result<Self, ProtocolError>;
}

/// An enumeration of the MQTT control packets this crate understands.
#[derive(Debug, PartialEq)]
pub enum MqttPacket<'a> {
    Connect(Connect<'a>),
    ConnAck(ConnAck),
    Publish(Publish<'a>),
    Disconnect(Disconnect),
}

/// Decodes a raw byte buffer into a specific `MqttPacket`.
pub fn decode(buf: &[u8]) -> Result<Option<MqttPacket<'_>>, ProtocolError> {
    if buf.is_empty() {
        return Ok(None);
    }

    let packet_type = buf[0] >> 4;
    let packet = match packet_type {
        1 => MqttPacket::Connect(Connect::decode(buf)?),
        2 => MqttPacket::ConnAck(ConnAck::decode(buf)?),
        3 => MqttPacket::Publish(Publish::decode(buf)?),
        14 => MqttPacket::Disconnect(Disconnect::decode(buf)?),
        _ => return Err(ProtocolError::InvalidPacketType(packet_type)),
    };

    Ok(Some(packet))
}

/// Writes the fixed header in front of a body that was encoded after a
/// reserved gap, then closes the gap. Returns the total packet length.
fn finish_packet(
    buf: &mut [u8],
    header: u8,
    content_start: usize,
    cursor: usize,
) -> Result<usize, ProtocolError> {
    let remaining_len = cursor - content_start;
    buf[0] = header;
    let len_bytes = util::write_variable_byte_integer(&mut buf[1..content_start], remaining_len)?;
    let header_len = 1 + len_bytes;
    buf.copy_within(content_start..cursor, header_len);
    Ok(header_len + remaining_len)
}

/// Checks the fixed header type and returns `(cursor after header, end of packet)`.
fn read_fixed_header(buf: &[u8], expected_type: u8) -> Result<(usize, usize), ProtocolError> {
    let first = *buf.first().ok_or(ProtocolError::MalformedPacket)?;
    if first >> 4 != expected_type {
        return Err(ProtocolError::InvalidPacketType(first >> 4));
    }
    let mut cursor = 1;
    let remaining_len = util::read_variable_byte_integer(&mut cursor, buf)?;
    let end = cursor + remaining_len;
    if end > buf.len() {
        return Err(ProtocolError::MalformedPacket);
    }
    Ok((cursor, end))
}

/// Username and optional password sent with `CONNECT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Credentials<'a> {
    pub username: &'a str,
    pub password: Option<&'a str>,
}

impl<'a> Credentials<'a> {
    pub const fn new(username: &'a str, password: &'a str) -> Self {
        Self {
            username,
            password: Some(password),
        }
    }

    pub const fn username_only(username: &'a str) -> Self {
        Self {
            username,
            password: None,
        }
    }
}

// --- CONNECT Packet ---
#[derive(Debug, Clone, PartialEq)]
pub struct Connect<'a> {
    pub clean_session: bool,
    pub keep_alive: u16,
    pub client_id: &'a str,
    pub credentials: Option<Credentials<'a>>,
}

impl<'a> Connect<'a> {
    pub fn new(client_id: &'a str, keep_alive: u16, clean_session: bool) -> Self {
        Self {
            client_id,
            keep_alive,
            clean_session,
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials<'a>>) -> Self {
        self.credentials = credentials;
        self
    }

    /// The connect flags byte: clean session in bit 1, password in bit 6,
    /// username in bit 7.
    pub fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.clean_session {
            flags |= FLAG_CLEAN_SESSION;
        }
        if let Some(credentials) = &self.credentials {
            flags |= FLAG_USERNAME;
            if credentials.password.is_some() {
                flags |= FLAG_PASSWORD;
            }
        }
        flags
    }
}

impl<'a> EncodePacket for Connect<'a> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        let content_start = 1 + MAX_LEN_BYTES;
        if buf.len() < content_start {
            return Err(ProtocolError::BufferTooSmall);
        }
        let mut cursor = content_start;

        // Variable header: protocol name, level, flags, keep-alive.
        cursor += write_utf8_string(&mut buf[cursor..], PROTOCOL_NAME)?;
        cursor += write_bytes(&mut buf[cursor..], &[PROTOCOL_LEVEL, self.flags()])?;
        cursor += write_bytes(&mut buf[cursor..], &self.keep_alive.to_be_bytes())?;

        // Payload: client id, then username/password when present.
        cursor += write_utf8_string(&mut buf[cursor..], self.client_id)?;
        if let Some(credentials) = &self.credentials {
            cursor += write_utf8_string(&mut buf[cursor..], credentials.username)?;
            if let Some(password) = credentials.password {
                cursor += write_binary(&mut buf[cursor..], password.as_bytes())?;
            }
        }

        finish_packet(buf, CONNECT, content_start, cursor)
    }
}

impl<'a> DecodePacket<'a> for Connect<'a> {
    fn decode(buf: &'a [u8]) -> Result<Self, ProtocolError> {
        let (mut cursor, end) = read_fixed_header(buf, CONNECT >> 4)?;
        let buf = &buf[..end];

        if read_utf8_string(&mut cursor, buf)? != PROTOCOL_NAME {
            return Err(ProtocolError::MalformedPacket);
        }
        let header = buf
            .get(cursor..cursor + 4)
            .ok_or(ProtocolError::MalformedPacket)?;
        if header[0] != PROTOCOL_LEVEL {
            return Err(ProtocolError::MalformedPacket);
        }
        let flags = header[1];
        let keep_alive = u16::from_be_bytes([header[2], header[3]]);
        cursor += 4;

        let client_id = read_utf8_string(&mut cursor, buf)?;
        let credentials = if flags & FLAG_USERNAME != 0 {
            let username = read_utf8_string(&mut cursor, buf)?;
            let password = if flags & FLAG_PASSWORD != 0 {
                Some(read_utf8_string(&mut cursor, buf)?)
            } else {
                None
            };
            Some(Credentials { username, password })
        } else {
            None
        };

        Ok(Self {
            clean_session: flags & FLAG_CLEAN_SESSION != 0,
            keep_alive,
            client_id,
            credentials,
        })
    }
}

// --- CONNACK Packet ---

/// Length of a complete MQTT 3.1.1 `CONNACK`.
pub const CONNACK_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnAck {
    pub session_present: bool,
    pub return_code: u8,
}

impl<'a> DecodePacket<'a> for ConnAck {
    /// Validates the 4-byte acknowledgment: control byte `0x20`, remaining
    /// length 2. The return code is reported as-is; judging it is up to the
    /// caller.
    fn decode(buf: &'a [u8]) -> Result<Self, ProtocolError> {
        if buf.len() < CONNACK_LEN {
            return Err(ProtocolError::MalformedPacket);
        }
        if buf[0] != CONNACK || buf[1] != 2 {
            return Err(ProtocolError::InvalidResponse);
        }
        Ok(Self {
            session_present: (buf[2] & 0x01) != 0,
            return_code: buf[3],
        })
    }
}

// --- PUBLISH Packet ---
#[derive(Debug, Clone, PartialEq)]
pub struct Publish<'a> {
    pub topic: &'a str,
    pub qos: QoS,
    pub retain: bool,
    pub payload: &'a [u8],
    pub packet_id: Option<u16>,
}

impl<'a> Publish<'a> {
    /// The fixed header byte: packet type, QoS in bits 1-2, retain in bit 0.
    pub fn header(&self) -> u8 {
        PUBLISH | ((self.qos as u8) << 1) | self.retain as u8
    }

    /// `2 + len(topic) + (2 if qos > 0) + len(payload)`.
    pub fn remaining_length(&self) -> usize {
        let packet_id_len = if self.qos != QoS::AtMostOnce { 2 } else { 0 };
        2 + self.topic.len() + packet_id_len + self.payload.len()
    }
}

impl<'a> DecodePacket<'a> for Publish<'a> {
    fn decode(buf: &'a [u8]) -> Result<Self, ProtocolError> {
        let (mut cursor, end) = read_fixed_header(buf, PUBLISH >> 4)?;
        let flags = buf[0] & 0x0F;
        let qos = QoS::try_from((flags >> 1) & 0x03)?;
        let retain = flags & 0x01 != 0;
        let buf = &buf[..end];

        let topic = read_utf8_string(&mut cursor, buf)?;

        let packet_id = if qos != QoS::AtMostOnce {
            let id = buf
                .get(cursor..cursor + 2)
                .ok_or(ProtocolError::MalformedPacket)?;
            cursor += 2;
            Some(u16::from_be_bytes([id[0], id[1]]))
        } else {
            None
        };

        Ok(Publish {
            topic,
            qos,
            retain,
            payload: &buf[cursor..],
            packet_id,
        })
    }
}

impl<'a> EncodePacket for Publish<'a> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        let content_start = 1 + MAX_LEN_BYTES;
        if buf.len() < content_start {
            return Err(ProtocolError::BufferTooSmall);
        }
        let mut cursor = content_start;

        cursor += write_utf8_string(&mut buf[cursor..], self.topic)?;

        // Packet ID (only for QoS > 0)
        if self.qos != QoS::AtMostOnce {
            let id = self.packet_id.ok_or(ProtocolError::MalformedPacket)?;
            cursor += write_bytes(&mut buf[cursor..], &id.to_be_bytes())?;
        }

        cursor += write_bytes(&mut buf[cursor..], self.payload)?;

        finish_packet(buf, self.header(), content_start, cursor)
    }
}

// --- DISCONNECT Packet ---
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnect;

impl<'a> DecodePacket<'a> for Disconnect {
    fn decode(buf: &'a [u8]) -> Result<Self, ProtocolError> {
        match buf {
            [DISCONNECT, 0x00, ..] => Ok(Disconnect),
            _ => Err(ProtocolError::MalformedPacket),
        }
    }
}

impl EncodePacket for Disconnect {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        write_bytes(buf, &[DISCONNECT, 0x00])
    }
}
