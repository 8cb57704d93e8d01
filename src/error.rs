use std::io;

use thiserror::Error as ThisError;

use crate::{config::Network, constants::MAX_ENDPOINTS};

/// Errors that prevent a [`crate::Pinger`] from being built or keep it from running.
#[derive(ThisError, Debug)]
pub enum Error {
    #[error("illegal network {0:?}, expected \"ip4:icmp\" or \"ip6:ipv6-icmp\"")]
    IllegalNetwork(String),
    #[error("{0} endpoints configured, at most {max} are supported", max = MAX_ENDPOINTS)]
    TooManyEndpoints(usize),
    #[error("invalid bind address {0:?}")]
    InvalidBindAddress(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("failed to set up ICMP socket, reason: {0}")]
    Socket(#[source] io::Error),
    #[error("failed to read from ICMP socket, reason: {0}")]
    Receive(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Cause attached to a failed probe attempt.
#[derive(ThisError, Debug)]
#[non_exhaustive]
pub enum ProbeError {
    #[error("failed to resolve endpoint, reason: {0}")]
    Resolve(#[source] io::Error),
    #[error("endpoint {endpoint} has no {network} address")]
    NoAddress { endpoint: String, network: Network },
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("failed to send request, reason: {0}")]
    Write(#[source] io::Error),
    #[error("destination unreachable (code {code})")]
    DestinationUnreachable { code: u8 },
}

#[derive(ThisError, Debug, Clone, Copy, PartialEq, Eq)]
#[error("failed to encode echo request, buffer of {0} bytes is too small")]
pub struct EncodeError(pub usize);

#[derive(ThisError, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecodeError {
    #[error("truncated ICMP message")]
    TruncatedMessage,
    #[error("truncated embedded IP header")]
    TruncatedHeader,
    #[error("embedded message is not an echo request")]
    UnexpectedEmbedded,
}
