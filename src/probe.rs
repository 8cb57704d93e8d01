use std::{net::IpAddr, time::Duration};

use crate::config::Network;
use crate::constants::MAX_ENDPOINTS;
use crate::error::{Error, ProbeError, Result};

/// A configured probe target and the requester identifier it owns.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Endpoint {
    pub address: String,
    pub identifier: u16,
}

impl Endpoint {
    /// Assigns identifiers by list position.
    ///
    /// # Errors
    /// Returns [`Error::TooManyEndpoints`] if the list outgrows the identifier space.
    pub fn from_list(addresses: &[String]) -> Result<Vec<Endpoint>> {
        if addresses.len() > MAX_ENDPOINTS {
            return Err(Error::TooManyEndpoints(addresses.len()));
        }
        addresses
            .iter()
            .enumerate()
            .map(|(position, address)| -> Result<Endpoint> {
                let identifier = u16::try_from(position)
                    .map_err(|_| Error::TooManyEndpoints(addresses.len()))?;
                Ok(Endpoint {
                    address: address.clone(),
                    identifier,
                })
            })
            .collect()
    }
}

/// Terminal result of one probe attempt.
#[derive(Debug)]
pub enum Outcome {
    Succeeded {
        endpoint: String,
        round_trip_time: Duration,
        identifier: u16,
    },
    TimedOut {
        endpoint: String,
        identifier: u16,
    },
    Failed {
        endpoint: String,
        cause: ProbeError,
    },
}

impl Outcome {
    pub fn endpoint(&self) -> &str {
        match self {
            Outcome::Succeeded { endpoint, .. }
            | Outcome::TimedOut { endpoint, .. }
            | Outcome::Failed { endpoint, .. } => endpoint,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded { .. })
    }
}

/// Resolves an endpoint to an address of the configured family.
pub(crate) async fn resolve(
    endpoint: &str,
    network: Network,
) -> std::result::Result<IpAddr, ProbeError> {
    let in_family = |address: &IpAddr| match network {
        Network::Ipv4 => address.is_ipv4(),
        Network::Ipv6 => address.is_ipv6(),
    };
    let no_address = || ProbeError::NoAddress {
        endpoint: endpoint.into(),
        network,
    };

    if let Ok(address) = endpoint.parse::<IpAddr>() {
        return if in_family(&address) {
            Ok(address)
        } else {
            Err(no_address())
        };
    }

    tokio::net::lookup_host((endpoint, 0))
        .await
        .map_err(ProbeError::Resolve)?
        .map(|socket_address| socket_address.ip())
        .find(in_family)
        .ok_or_else(no_address)
}
