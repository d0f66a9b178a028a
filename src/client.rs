//! # MQTT Publisher Client
//!
//! A deliberately small MQTT 3.1.1 client: it connects, publishes, and
//! disconnects. There is no subscribe or receive path and no acknowledgment
//! handling beyond `CONNACK`.
//!
//! For QoS 1 and 2 publishes a packet identifier is assigned and transmitted,
//! but the client does not wait for `PUBACK`/`PUBREC`; `publish` returns as
//! soon as the bytes are handed to the transport.

use crate::error::{ConnectReasonCode, MqttError, ProtocolError};
use crate::packet::{
    CONNACK_LEN, ConnAck, Connect, Credentials, DecodePacket, Disconnect, EncodePacket, Publish,
    QoS,
};
use crate::transport::MqttTransport;

/// Default MQTT broker port.
pub const DEFAULT_PORT: u16 = 1883;

/// Connection settings for [`MqttClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MqttOptions<'a> {
    pub client_id: &'a str,
    pub host: &'a str,
    pub port: u16,
    pub credentials: Option<Credentials<'a>>,
    /// Keep-alive interval in seconds. Zero disables the broker-side check.
    pub keep_alive: u16,
    pub clean_session: bool,
}

impl<'a> MqttOptions<'a> {
    /// Options with the defaults of a plain broker: port 1883, no
    /// credentials, keep-alive disabled, clean session.
    pub const fn new(client_id: &'a str, host: &'a str) -> Self {
        Self {
            client_id,
            host,
            port: DEFAULT_PORT,
            credentials: None,
            keep_alive: 0,
            clean_session: true,
        }
    }

    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub const fn with_credentials(mut self, credentials: Credentials<'a>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub const fn with_keep_alive(mut self, keep_alive: u16) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub const fn with_clean_session(mut self, clean_session: bool) -> Self {
        self.clean_session = clean_session;
        self
    }
}

/// A connection to one broker, generic over the transport and the size of
/// the outgoing packet buffer.
pub struct MqttClient<'a, T, const BUF_SIZE: usize> {
    transport: T,
    options: MqttOptions<'a>,
    buffer: [u8; BUF_SIZE],
    last_packet_id: u16,
    connected: bool,
}

impl<'a, T, const BUF_SIZE: usize> MqttClient<'a, T, BUF_SIZE>
where
    T: MqttTransport,
{
    pub fn new(transport: T, options: MqttOptions<'a>) -> Self {
        Self {
            transport,
            options,
            buffer: [0; BUF_SIZE],
            last_packet_id: 0,
            connected: false,
        }
    }

    pub fn options(&self) -> &MqttOptions<'a> {
        &self.options
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// The packet id most recently assigned to a QoS > 0 publish (0 before the first).
    pub fn last_packet_id(&self) -> u16 {
        self.last_packet_id
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Opens the transport, sends `CONNECT`, and validates the 4-byte `CONNACK`.
    ///
    /// # Errors
    ///
    /// - [`MqttError::Protocol`] if the acknowledgment is malformed.
    /// - [`MqttError::ConnectionRejected`] if the broker returns a non-zero code.
    /// - [`MqttError::Transport`] for I/O failures.
    pub async fn connect(&mut self) -> Result<(), MqttError<T::Error>> {
        self.connected = false;
        info!(
            "mqtt: connecting to {}:{} as {}",
            self.options.host, self.options.port, self.options.client_id
        );
        self.transport
            .open(self.options.host, self.options.port)
            .await
            .map_err(MqttError::Transport)?;

        match self.handshake().await {
            Ok(()) => {
                self.connected = true;
                info!("mqtt: connected");
                Ok(())
            }
            Err(e) => {
                // The stream is useless after a failed handshake; the close
                // error, if any, is less interesting than the handshake one.
                let _ = self.transport.close().await;
                Err(e)
            }
        }
    }

    async fn handshake(&mut self) -> Result<(), MqttError<T::Error>> {
        let packet = Connect::new(
            self.options.client_id,
            self.options.keep_alive,
            self.options.clean_session,
        )
        .with_credentials(self.options.credentials);
        let len = packet.encode(&mut self.buffer)?;
        self.send_buffer(len).await?;

        let mut response = [0u8; CONNACK_LEN];
        self.recv_exact(&mut response).await?;

        let connack = ConnAck::decode(&response).inspect_err(|_| {
            error!("mqtt: malformed CONNACK {:?}", response);
        })?;
        if connack.return_code != 0 {
            let code = ConnectReasonCode::from(connack.return_code);
            error!("mqtt: connection rejected, code {}", connack.return_code);
            return Err(MqttError::ConnectionRejected(code));
        }
        Ok(())
    }

    /// Publishes `payload` on `topic`.
    ///
    /// For QoS > 0 the next packet id is consumed and returned once the
    /// packet has been sent; no acknowledgment is awaited. A transport failure marks the client as
    /// disconnected so the owner can reconnect.
    pub async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<Option<u16>, MqttError<T::Error>> {
        if !self.connected {
            return Err(MqttError::NotConnected);
        }

        // The counter only advances once the packet has left.
        let packet_id = match qos {
            QoS::AtMostOnce => None,
            QoS::AtLeastOnce | QoS::ExactlyOnce => Some(self.last_packet_id.wrapping_add(1)),
        };
        let packet = Publish {
            topic,
            qos,
            retain,
            payload,
            packet_id,
        };
        let len = packet.encode(&mut self.buffer)?;

        debug!(
            "mqtt: publish topic={} len={} qos={:?} retain={}",
            topic,
            payload.len(),
            qos,
            retain
        );
        if let Err(e) = self.send_buffer(len).await {
            self.connected = false;
            return Err(e);
        }
        if let Some(id) = packet_id {
            self.last_packet_id = id;
        }
        Ok(packet_id)
    }

    /// Sends `DISCONNECT` and closes the transport.
    pub async fn disconnect(&mut self) -> Result<(), MqttError<T::Error>> {
        if !self.connected {
            return Err(MqttError::NotConnected);
        }
        self.connected = false;

        let len = Disconnect.encode(&mut self.buffer)?;
        let sent = self.send_buffer(len).await;
        let closed = self.transport.close().await.map_err(MqttError::Transport);
        info!("mqtt: disconnected");
        sent.and(closed)
    }

    async fn send_buffer(&mut self, len: usize) -> Result<(), MqttError<T::Error>> {
        self.transport
            .send(&self.buffer[..len])
            .await
            .map_err(MqttError::Transport)
    }

    /// Reads exactly `buf.len()` bytes, looping over short reads.
    async fn recv_exact(&mut self, buf: &mut [u8]) -> Result<(), MqttError<T::Error>> {
        let mut total_read = 0;
        while total_read < buf.len() {
            match self.transport.recv(&mut buf[total_read..]).await {
                Ok(0) => return Err(ProtocolError::ConnectionClosed.into()),
                Ok(n) => total_read += n,
                Err(e) => return Err(MqttError::Transport(e)),
            }
        }
        Ok(())
    }
}
