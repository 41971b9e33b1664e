//! Console session with single-slot request/reply exchanges

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use log::{debug, warn};
use rosc::{OscMessage, OscType};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::osc::OscSocket;

/// Default OSC port of X Air / M Air consoles.
pub const XAIR_PORT: u16 = 10024;

/// Identity a console reports in reply to `/info`.
#[derive(Debug, Clone)]
pub struct MixerInfo {
    pub name: String,
    pub model: String,
    pub revision: String,
    pub firmware: String,
    /// Address the reply came from; where to send everything else.
    pub addr: SocketAddr,
}

/// One single-use reply slot per request kind. The dispatcher takes the
/// sender exactly once per exchange; the waiter arms a fresh one for the
/// next exchange.
#[derive(Default)]
struct ReplySlots {
    info: Mutex<Option<oneshot::Sender<MixerInfo>>>,
    fader_float: Mutex<Option<oneshot::Sender<f32>>>,
    fader_db: Mutex<Option<oneshot::Sender<String>>>,
}

/// A bound OSC endpoint talking to one console channel.
///
/// A background task receives datagrams and routes replies into the
/// matching slot. Each request kind holds its own exchange lock, so two
/// in-flight queries of the same kind can never interleave; every wait
/// is bounded and a timeout means "no answer", never a hang.
pub struct MixerSession {
    socket: OscSocket,
    mixer_port: u16,
    channel: u32,
    /// `/ch/NN/mix/fader`: set/query target and reply address.
    fader_path: String,
    /// `ch/NN/mix/fader`: argument for `/node` queries.
    node_arg: String,
    settle: Duration,
    reply_timeout: Duration,
    slots: Arc<ReplySlots>,
    info_lock: AsyncMutex<()>,
    fader_float_lock: AsyncMutex<()>,
    fader_db_lock: AsyncMutex<()>,
    dispatch: JoinHandle<()>,
}

impl MixerSession {
    /// Bind a local OSC endpoint for the given console channel and start
    /// the receive dispatcher.
    pub async fn bind(
        channel: u32,
        mixer_port: u16,
        settle: Duration,
        reply_timeout: Duration,
    ) -> Result<Self> {
        let socket = OscSocket::bind(0).await?;
        let fader_path = format!("/ch/{:02}/mix/fader", channel);
        let node_arg = format!("ch/{:02}/mix/fader", channel);
        let slots = Arc::new(ReplySlots::default());

        let dispatch = tokio::spawn(dispatch_loop(
            socket.clone(),
            fader_path.clone(),
            Arc::clone(&slots),
        ));

        Ok(Self {
            socket,
            mixer_port,
            channel,
            fader_path,
            node_arg,
            settle,
            reply_timeout,
            slots,
            info_lock: AsyncMutex::new(()),
            fader_float_lock: AsyncMutex::new(()),
            fader_db_lock: AsyncMutex::new(()),
            dispatch,
        })
    }

    /// Console channel this session tests.
    pub fn channel(&self) -> u32 {
        self.channel
    }

    /// OSC path of the channel's fader.
    pub fn fader_path(&self) -> &str {
        &self.fader_path
    }

    /// Broadcast `/info` and wait for the first console to answer.
    pub async fn discover(&self) -> Result<Option<MixerInfo>> {
        let broadcast = SocketAddr::from((Ipv4Addr::BROADCAST, self.mixer_port));
        self.exchange(
            &self.info_lock,
            &self.slots.info,
            self.socket.send(broadcast, "/info", vec![OscType::Nil]),
        )
        .await
    }

    /// Set the channel fader by float level, then give the console a
    /// moment to settle so it isn't overrun by requests.
    pub async fn set_fader_float(&self, mixer: SocketAddr, level: f32) -> Result<()> {
        self.socket
            .send(mixer, &self.fader_path, vec![OscType::Float(level)])
            .await?;
        tokio::time::sleep(self.settle).await;
        Ok(())
    }

    /// Query the channel fader's float level; `None` if the console
    /// doesn't answer in time.
    pub async fn query_fader_float(&self, mixer: SocketAddr) -> Result<Option<f32>> {
        self.exchange(
            &self.fader_float_lock,
            &self.slots.fader_float,
            self.socket.send(mixer, &self.fader_path, vec![]),
        )
        .await
    }

    /// Set the channel fader by dB string, e.g. `"-10.4"` or `"+2.0"`.
    pub async fn set_fader_db(&self, mixer: SocketAddr, db: &str) -> Result<()> {
        self.socket
            .send(mixer, &self.fader_path, vec![OscType::String(db.to_string())])
            .await?;
        tokio::time::sleep(self.settle).await;
        Ok(())
    }

    /// Query the console's node dB string for the channel fader; `None`
    /// if the console doesn't answer in time.
    pub async fn query_fader_db(&self, mixer: SocketAddr) -> Result<Option<String>> {
        self.exchange(
            &self.fader_db_lock,
            &self.slots.fader_db,
            self.socket
                .send(mixer, "/node", vec![OscType::String(self.node_arg.clone())]),
        )
        .await
    }

    /// Run one request/reply exchange: arm the slot, send, wait bounded.
    async fn exchange<T, F>(
        &self,
        guard: &AsyncMutex<()>,
        slot: &Mutex<Option<oneshot::Sender<T>>>,
        send: F,
    ) -> Result<Option<T>>
    where
        F: Future<Output = Result<()>>,
    {
        let _guard = guard.lock().await;

        let (tx, rx) = oneshot::channel();
        *slot.lock().unwrap() = Some(tx);
        send.await?;

        match timeout(self.reply_timeout, rx).await {
            Ok(Ok(value)) => Ok(Some(value)),
            _ => {
                // Disarm so a late reply can't complete a future exchange.
                slot.lock().unwrap().take();
                Ok(None)
            }
        }
    }
}

impl Drop for MixerSession {
    fn drop(&mut self) {
        self.dispatch.abort();
    }
}

async fn dispatch_loop(socket: OscSocket, fader_path: String, slots: Arc<ReplySlots>) {
    loop {
        match socket.recv().await {
            Ok((peer, messages)) => {
                for msg in messages {
                    dispatch(&fader_path, &slots, peer, msg);
                }
            }
            Err(e) => {
                warn!("console receive loop stopped: {}", e);
                return;
            }
        }
    }
}

fn dispatch(fader_path: &str, slots: &ReplySlots, peer: SocketAddr, msg: OscMessage) {
    if msg.addr == "/info" {
        // Reply carries revision, name, model, firmware as strings.
        let mut strings = msg.args.into_iter().filter_map(|arg| match arg {
            OscType::String(s) => Some(s),
            _ => None,
        });
        let fields = (strings.next(), strings.next(), strings.next(), strings.next());
        if let (Some(revision), Some(name), Some(model), Some(firmware)) = fields {
            complete(
                &slots.info,
                MixerInfo {
                    name,
                    model,
                    revision,
                    firmware,
                    addr: peer,
                },
            );
        } else {
            warn!("ignoring short /info reply from {}", peer);
        }
    } else if msg.addr == fader_path {
        if let Some(OscType::Float(value)) = msg.args.first() {
            complete(&slots.fader_float, *value);
        }
    } else if msg.addr == "node" || msg.addr == "/node" {
        // Node replies are single strings like "/ch/12/mix/fader -10.0".
        if let Some(OscType::String(line)) = msg.args.first() {
            if let Some(rest) = line.trim().strip_prefix(fader_path) {
                let db = rest.trim();
                if !db.is_empty() {
                    complete(&slots.fader_db, db.to_string());
                }
            }
        }
    } else {
        debug!("ignoring OSC message on {}", msg.addr);
    }
}

/// Complete the pending exchange, if one is armed.
fn complete<T>(slot: &Mutex<Option<oneshot::Sender<T>>>, value: T) {
    if let Some(tx) = slot.lock().unwrap().take() {
        // The waiter may have timed out already; that's its loss.
        let _ = tx.send(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosc::OscPacket;
    use tokio::net::UdpSocket;

    /// Minimal console stand-in: answers float queries with a fixed
    /// level and node queries with a fixed dB line.
    async fn spawn_responder(channel: u32) -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let fader_path = format!("/ch/{:02}/mix/fader", channel);

        tokio::spawn(async move {
            let mut buf = [0u8; rosc::decoder::MTU];
            loop {
                let (len, peer) = match socket.recv_from(&mut buf).await {
                    Ok(v) => v,
                    Err(_) => return,
                };
                let packet = match rosc::decoder::decode_udp(&buf[..len]) {
                    Ok((_, packet)) => packet,
                    Err(_) => continue,
                };
                let msg = match packet {
                    OscPacket::Message(msg) => msg,
                    OscPacket::Bundle(_) => continue,
                };

                let reply = if msg.addr == fader_path && msg.args.is_empty() {
                    Some(OscMessage {
                        addr: fader_path.clone(),
                        args: vec![OscType::Float(0.75)],
                    })
                } else if msg.addr == "/node" {
                    Some(OscMessage {
                        addr: "node".to_string(),
                        args: vec![OscType::String(format!("{} -10.0\n", fader_path))],
                    })
                } else {
                    None
                };

                if let Some(reply) = reply {
                    let bytes = rosc::encoder::encode(&OscPacket::Message(reply)).unwrap();
                    let _ = socket.send_to(&bytes, peer).await;
                }
            }
        });

        addr
    }

    async fn test_session() -> MixerSession {
        MixerSession::bind(12, XAIR_PORT, Duration::ZERO, Duration::from_secs(1))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_query_fader_float() {
        let console = spawn_responder(12).await;
        let session = test_session().await;

        let value = session.query_fader_float(console).await.unwrap();
        assert_eq!(value, Some(0.75));
    }

    #[tokio::test]
    async fn test_query_fader_db_strips_the_path() {
        let console = spawn_responder(12).await;
        let session = test_session().await;

        let db = session.query_fader_db(console).await.unwrap();
        assert_eq!(db.as_deref(), Some("-10.0"));
    }

    #[tokio::test]
    async fn test_timeout_means_no_answer() {
        // A bound socket that never replies.
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = silent.local_addr().unwrap();

        let session = MixerSession::bind(12, XAIR_PORT, Duration::ZERO, Duration::from_millis(50))
            .await
            .unwrap();

        assert_eq!(session.query_fader_float(addr).await.unwrap(), None);
        assert_eq!(session.query_fader_db(addr).await.unwrap(), None);

        drop(silent);
    }

    #[tokio::test]
    async fn test_fader_path_formatting() {
        let session = test_session().await;
        assert_eq!(session.fader_path(), "/ch/12/mix/fader");
        assert_eq!(session.channel(), 12);

        let single_digit = MixerSession::bind(3, XAIR_PORT, Duration::ZERO, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(single_digit.fader_path(), "/ch/03/mix/fader");
    }
}
