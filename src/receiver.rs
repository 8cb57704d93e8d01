use std::sync::Arc;

use crate::config::Network;
use crate::constants::RECV_BUF_LEN;
use crate::correlation::{CorrelationKey, CorrelationTable};
use crate::error::{Error, ProbeError, Result};
use crate::packet::{decode_inbound, strip_ip_header, InboundMessage};
use crate::socket::{is_transient, IcmpSocket};

/// Reads everything arriving on the socket and completes matching requests.
pub(super) struct Listener {
    socket: Arc<IcmpSocket>,
    table: Arc<CorrelationTable>,
    network: Network,
}

impl Listener {
    pub(super) fn new(
        socket: Arc<IcmpSocket>,
        table: Arc<CorrelationTable>,
        network: Network,
    ) -> Self {
        Self {
            socket,
            table,
            network,
        }
    }

    /// Runs until the socket fails with a non-transient error.
    pub(super) async fn listen(&mut self) -> Result<()> {
        let mut buf = [0; RECV_BUF_LEN];
        loop {
            match self.socket.recv(&mut buf).await {
                Ok(read_bytes) => {
                    match_reply(&self.table, self.network, &buf[..read_bytes]).await;
                }
                Err(err) if is_transient(&err) => {
                    log::debug!("transient read error on {} socket: {}", self.network, err);
                }
                Err(err) => return Err(Error::Receive(err)),
            }
        }
    }
}

/// Completes the request a received message answers, returns whether one was waiting.
///
/// Malformed and unrelated messages are dropped without a trace.
pub(super) async fn match_reply(table: &CorrelationTable, network: Network, bytes: &[u8]) -> bool {
    let message = strip_ip_header(bytes, network);
    match decode_inbound(message, network) {
        Ok(InboundMessage::EchoReply {
            identifier,
            sequence,
        }) => {
            table
                .complete(&CorrelationKey::new(identifier, sequence), None)
                .await
        }
        Ok(InboundMessage::Unreachable {
            identifier,
            sequence,
            code,
        }) => {
            table
                .complete(
                    &CorrelationKey::new(identifier, sequence),
                    Some(ProbeError::DestinationUnreachable { code }),
                )
                .await
        }
        Ok(InboundMessage::Ignored) | Err(_) => false,
    }
}
