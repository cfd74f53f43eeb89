//! UDP stand-in for the LoRa modem
//!
//! Each datagram carries exactly one radio packet, so a node and a gateway
//! on two hosts (or two terminals) talk the same protocol as over the air.

use electrometer::error::TransportError;
use electrometer::radio::{check_payload_size, MAX_RADIO_PAYLOAD};
use electrometer::{LoraBand, RadioMetrics, RadioTransport, Result};
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

/// Radio transport over a UDP socket
#[derive(Debug)]
pub struct UdpRadio {
    socket: UdpSocket,
    peer: SocketAddr,
    band: LoraBand,
    metrics: RadioMetrics,
}

impl UdpRadio {
    /// Bind `bind` and send packets to `peer`
    pub fn open(bind: SocketAddr, peer: SocketAddr, band: LoraBand) -> Result<Self> {
        let socket = UdpSocket::bind(bind).map_err(TransportError::from)?;
        tracing::info!(
            "radio {} ({} Hz) on {}, peer {}",
            band,
            band.frequency_hz(),
            bind,
            peer
        );
        Ok(Self {
            socket,
            peer,
            band,
            metrics: RadioMetrics::default(),
        })
    }

    /// Local socket address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr().map_err(TransportError::from)?)
    }

    /// Configured band
    pub fn band(&self) -> LoraBand {
        self.band
    }
}

impl RadioTransport for UdpRadio {
    fn send(&mut self, payload: &[u8]) -> Result<()> {
        check_payload_size(payload)?;
        let sent = self
            .socket
            .send_to(payload, self.peer)
            .map_err(TransportError::from)?;
        self.metrics.bytes_sent += sent as u64;
        self.metrics.packets_sent += 1;
        tracing::debug!("tx {} bytes to {}", sent, self.peer);
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        // A zero read timeout is rejected by the socket
        let timeout = timeout.max(Duration::from_millis(1));
        self.socket
            .set_read_timeout(Some(timeout))
            .map_err(TransportError::from)?;

        let mut buf = [0u8; MAX_RADIO_PAYLOAD + 1];
        match self.socket.recv_from(&mut buf) {
            Ok((len, from)) => {
                if len > MAX_RADIO_PAYLOAD {
                    tracing::warn!("dropping oversized datagram from {}", from);
                    return Ok(None);
                }
                self.metrics.bytes_received += len as u64;
                self.metrics.packets_received += 1;
                tracing::debug!("rx {} bytes from {}", len, from);
                Ok(Some(buf[..len].to_vec()))
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(None),
            Err(e) => Err(TransportError::from(e).into()),
        }
    }

    fn is_available(&self) -> bool {
        true
    }

    fn metrics(&self) -> RadioMetrics {
        self.metrics.clone()
    }
}
