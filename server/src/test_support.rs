//! Helpers shared by the unit tests: fake connections and outbound capture.

use crate::network::{ConnectionHandle, Outbound};
use shared::Envelope;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::sync::mpsc::UnboundedReceiver;

/// A loopback connection handle whose writer queue the test holds.
pub fn connection(port: u16) -> (ConnectionHandle, UnboundedReceiver<Outbound>) {
    ConnectionHandle::new(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port))
}

/// Decodes every frame queued so far, skipping close requests.
pub fn drain(rx: &mut UnboundedReceiver<Outbound>) -> Vec<Envelope> {
    let mut envelopes = Vec::new();
    while let Ok(message) = rx.try_recv() {
        if let Outbound::Frame(bytes) = message {
            envelopes.push(Envelope::from_slice(&bytes).expect("server sent a malformed line"));
        }
    }
    envelopes
}
