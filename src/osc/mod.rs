//! OSC transport over UDP
//!
//! Thin wrapper around a UDP socket speaking OSC, one message per
//! datagram. The consoles this crate talks to never use bundles, but
//! inbound bundles are flattened anyway so a well-behaved peer can't
//! confuse us.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use log::warn;
use rosc::{OscMessage, OscPacket, OscType};
use tokio::net::UdpSocket;

/// A UDP socket that encodes and decodes OSC packets.
///
/// Cloning is cheap and clones share the underlying socket, so one clone
/// can sit in a receive loop while another sends requests.
#[derive(Clone)]
pub struct OscSocket {
    socket: Arc<UdpSocket>,
}

impl OscSocket {
    /// Bind on the given local port (0 for an OS-assigned one) with
    /// broadcast enabled.
    pub async fn bind(port: u16) -> Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port))
            .await
            .with_context(|| format!("failed to bind OSC socket on port {}", port))?;
        socket
            .set_broadcast(true)
            .context("failed to enable broadcast on OSC socket")?;

        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    /// Local address the socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Send a single OSC message to `dest`.
    pub async fn send(&self, dest: SocketAddr, addr: &str, args: Vec<OscType>) -> Result<()> {
        let packet = OscPacket::Message(OscMessage {
            addr: addr.to_string(),
            args,
        });
        let bytes = rosc::encoder::encode(&packet)
            .map_err(|e| anyhow!("failed to encode OSC message: {}", e))?;
        self.socket
            .send_to(&bytes, dest)
            .await
            .with_context(|| format!("failed to send OSC message to {}", dest))?;
        Ok(())
    }

    /// Receive the next datagram and decode it into messages.
    ///
    /// Malformed packets are logged and skipped; a stray datagram on the
    /// port must not kill a running exchange.
    pub async fn recv(&self) -> Result<(SocketAddr, Vec<OscMessage>)> {
        let mut buf = [0u8; rosc::decoder::MTU];
        loop {
            let (len, peer) = self
                .socket
                .recv_from(&mut buf)
                .await
                .context("OSC socket receive failed")?;

            match rosc::decoder::decode_udp(&buf[..len]) {
                Ok((_, packet)) => return Ok((peer, flatten(packet))),
                Err(e) => warn!("dropping malformed OSC packet from {}: {}", peer, e),
            }
        }
    }
}

/// Bundles can nest packets recursively; flatten them to plain messages.
fn flatten(packet: OscPacket) -> Vec<OscMessage> {
    match packet {
        OscPacket::Message(msg) => vec![msg],
        OscPacket::Bundle(bundle) => bundle
            .content
            .into_iter()
            .flat_map(flatten)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosc::{OscBundle, OscTime};

    #[tokio::test]
    async fn test_loopback_round_trip() {
        let receiver = OscSocket::bind(0).await.unwrap();
        let sender = OscSocket::bind(0).await.unwrap();
        let dest = {
            let mut addr = receiver.local_addr().unwrap();
            addr.set_ip("127.0.0.1".parse().unwrap());
            addr
        };

        sender
            .send(dest, "/ch/01/mix/fader", vec![OscType::Float(0.5)])
            .await
            .unwrap();

        let (_, messages) = receiver.recv().await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].addr, "/ch/01/mix/fader");
        assert_eq!(messages[0].args, vec![OscType::Float(0.5)]);
    }

    #[test]
    fn test_flatten_nested_bundles() {
        let msg = |addr: &str| {
            OscPacket::Message(OscMessage {
                addr: addr.to_string(),
                args: vec![],
            })
        };
        let time = OscTime {
            seconds: 0,
            fractional: 1,
        };
        let packet = OscPacket::Bundle(OscBundle {
            timetag: time,
            content: vec![
                msg("/a"),
                OscPacket::Bundle(OscBundle {
                    timetag: time,
                    content: vec![msg("/b"), msg("/c")],
                }),
            ],
        });

        let flat = flatten(packet);
        let addrs: Vec<&str> = flat.iter().map(|m| m.addr.as_str()).collect();
        assert_eq!(addrs, ["/a", "/b", "/c"]);
    }
}
