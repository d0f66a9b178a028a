//! # Error Types
//!
//! Errors raised by the MQTT publisher, from transport failures to protocol
//! violations and broker rejections. Sensor-side errors live next to the
//! health monitor in [`crate::sensor`].

/// The primary error enum for the MQTT client.
///
/// It is generic over the transport error type `E`, allowing it to wrap
/// specific errors from the underlying network transport (e.g., TCP, UART).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MqttError<E> {
    /// An error occurred in the underlying transport layer.
    Transport(E),
    /// A protocol-level error occurred, indicating a violation of the MQTT specification.
    Protocol(ProtocolError),
    /// The broker answered CONNECT with a non-zero return code.
    ConnectionRejected(ConnectReasonCode),
    /// The client is not currently connected to the broker.
    NotConnected,
}

impl<E> MqttError<E> {
    /// Returns `true` for errors that must abort startup.
    ///
    /// A malformed CONNACK or a broker rejection will not go away by retrying
    /// with the same configuration.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MqttError::Protocol(_) | MqttError::ConnectionRejected(_)
        )
    }

    /// Short description for log lines, independent of the transport error type.
    pub fn kind(&self) -> &'static str {
        match self {
            MqttError::Transport(_) => "transport error",
            MqttError::Protocol(_) => "protocol error",
            MqttError::ConnectionRejected(_) => "connection rejected",
            MqttError::NotConnected => "not connected",
        }
    }
}

/// Packet encoding and decoding report `ProtocolError`; the client lifts it
/// into `MqttError` with `?`.
impl<E> From<ProtocolError> for MqttError<E> {
    fn from(err: ProtocolError) -> Self {
        MqttError::Protocol(err)
    }
}

/// Represents the return codes of a connection refusal (`CONNACK`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectReasonCode {
    /// The connection was accepted.
    Success,
    /// The broker does not support the requested MQTT protocol version.
    UnacceptableProtocolVersion,
    /// The client identifier is not valid.
    IdentifierRejected,
    /// The broker is unavailable.
    ServerUnavailable,
    /// The username or password is not valid.
    BadUserNameOrPassword,
    /// The client is not authorized to connect.
    NotAuthorized,
    /// A code outside the MQTT 3.1.1 table.
    Other(u8),
}

impl ConnectReasonCode {
    /// The raw return code as sent on the wire.
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::UnacceptableProtocolVersion => 1,
            Self::IdentifierRejected => 2,
            Self::ServerUnavailable => 3,
            Self::BadUserNameOrPassword => 4,
            Self::NotAuthorized => 5,
            Self::Other(val) => val,
        }
    }
}

impl From<u8> for ConnectReasonCode {
    fn from(val: u8) -> Self {
        match val {
            0 => Self::Success,
            1 => Self::UnacceptableProtocolVersion,
            2 => Self::IdentifierRejected,
            3 => Self::ServerUnavailable,
            4 => Self::BadUserNameOrPassword,
            5 => Self::NotAuthorized,
            _ => Self::Other(val),
        }
    }
}

/// Enumerates specific MQTT protocol errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// An invalid packet type was received.
    InvalidPacketType(u8),
    /// The server sent an invalid or unexpected response.
    InvalidResponse,
    /// The connection was closed by the broker.
    ConnectionClosed,
    /// A packet was received that was not correctly formed.
    MalformedPacket,
    /// The packet does not fit in the client's buffer.
    BufferTooSmall,
    /// A string or payload exceeds what the wire format can describe.
    PayloadTooLarge,
    /// A string was not valid UTF-8.
    InvalidUtf8String,
}
