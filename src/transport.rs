//! # MQTT Transport Abstraction
//!
//! This module defines the `MqttTransport` trait, which abstracts the underlying
//! communication channel (like TCP, UART, etc.), allowing the MQTT client to be
//! hardware and network-stack agnostic. Anything that offers a reliable, ordered
//! byte stream to `(host, port)` will do; tests substitute an in-memory fake.
//!
//! With the Rust 2024 Edition, this trait uses native `async fn`, removing the
//! need for the `#[async_trait]` macro.

use embassy_net::dns::DnsQueryType;
use embassy_net::tcp::{ConnectError, Error as TcpError, TcpSocket};
use embassy_net::{IpAddress, Ipv4Address, Stack};
use embassy_time::{Duration, Timer};
use embedded_io_async::Write;

/// A trait representing a transport for MQTT packets.
#[allow(async_fn_in_trait)]
pub trait MqttTransport {
    /// The error type returned by the transport.
    type Error: core::fmt::Debug;

    /// Opens the byte stream to the broker.
    async fn open(&mut self, host: &str, port: u16) -> Result<(), Self::Error>;

    /// Sends a buffer of data over the transport.
    async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error>;

    /// Receives data from the transport into a buffer.
    ///
    /// Returns the number of bytes read. Zero means the peer closed the stream.
    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Closes the byte stream. The transport may be opened again afterwards.
    async fn close(&mut self) -> Result<(), Self::Error>;
}

/// Errors reported by [`TcpTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpTransportError {
    /// The broker host is neither an IPv4 literal nor a name that resolves.
    Resolve,
    /// The TCP handshake failed.
    Connect(ConnectError),
    /// Reading or writing the socket failed.
    Io(TcpError),
    /// The peer closed the connection.
    ConnectionClosed,
    /// No data arrived within the read timeout.
    Timeout,
}

/// TCP transport implementation using `embassy-net`.
///
/// The broker host may be an IPv4 literal or a name, which is resolved
/// through the stack's DNS client on every `open`.
pub struct TcpTransport<'a> {
    stack: Stack<'a>,
    socket: TcpSocket<'a>,
    timeout: Duration,
}

/// Parses a dotted IPv4 literal.
fn parse_literal(host: &str) -> Option<IpAddress> {
    host.parse::<Ipv4Address>().ok().map(IpAddress::Ipv4)
}

impl<'a> TcpTransport<'a> {
    /// Creates a new `TcpTransport` with the given stack, socket, and read timeout.
    pub fn new(stack: Stack<'a>, socket: TcpSocket<'a>, timeout: Duration) -> Self {
        Self {
            stack,
            socket,
            timeout,
        }
    }

    async fn resolve(&self, host: &str) -> Result<IpAddress, TcpTransportError> {
        if let Some(address) = parse_literal(host) {
            return Ok(address);
        }
        debug!("tcp: resolving {}", host);
        let addresses = self
            .stack
            .dns_query(host, DnsQueryType::A)
            .await
            .map_err(|_| {
                warn!("tcp: dns query for {} failed", host);
                TcpTransportError::Resolve
            })?;
        addresses.first().copied().ok_or(TcpTransportError::Resolve)
    }

    /// A helper function to perform a read with a timeout.
    async fn read_with_timeout(&mut self, buf: &mut [u8]) -> Result<usize, TcpTransportError> {
        // Use `select` to race the read operation against a timer.
        let read_fut = self.socket.read(buf);
        let timer = Timer::after(self.timeout);

        match futures::future::select(core::pin::pin!(read_fut), core::pin::pin!(timer)).await {
            futures::future::Either::Left((Ok(n), _)) => {
                trace!("tcp: read {} bytes", n);
                if n == 0 {
                    warn!("tcp: connection closed by peer");
                    Err(TcpTransportError::ConnectionClosed)
                } else {
                    Ok(n)
                }
            }
            futures::future::Either::Left((Err(e), _)) => {
                warn!("tcp: read failed");
                Err(TcpTransportError::Io(e))
            }
            futures::future::Either::Right(((), _)) => {
                warn!("tcp: read timed out");
                Err(TcpTransportError::Timeout)
            }
        }
    }
}

impl<'a> MqttTransport for TcpTransport<'a> {
    type Error = TcpTransportError;

    async fn open(&mut self, host: &str, port: u16) -> Result<(), Self::Error> {
        let address = self.resolve(host).await?;

        // A socket left over from a previous session must be back in the
        // closed state before it can connect again.
        self.socket.abort();

        debug!("tcp: connecting to {}:{}", host, port);
        self.socket
            .connect((address, port))
            .await
            .map_err(TcpTransportError::Connect)
    }

    async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        trace!("tcp: write {} bytes", buf.len());

        self.socket
            .write_all(buf)
            .await
            .map_err(TcpTransportError::Io)?;

        // Flush to ensure data is actually sent to the network
        self.socket.flush().await.map_err(TcpTransportError::Io)
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.read_with_timeout(buf).await
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        self.socket.close();
        self.socket.flush().await.map_err(TcpTransportError::Io)
    }
}
