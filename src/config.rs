use std::{fmt, str::FromStr, time::Duration};

use socket2::{Domain, Protocol};

use crate::constants::{MAX_ENDPOINTS, PROTOCOL_ICMP, PROTOCOL_ICMPV6};
use crate::error::{Error, Result};

/// Network family the engine sends and receives on.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub enum Network {
    #[default]
    Ipv4,
    Ipv6,
}

impl Network {
    pub const IPV4_LITERAL: &'static str = "ip4:icmp";
    pub const IPV6_LITERAL: &'static str = "ip6:ipv6-icmp";

    /// IANA protocol number of the family's ICMP flavour.
    pub fn protocol_number(self) -> u8 {
        match self {
            Network::Ipv4 => PROTOCOL_ICMP,
            Network::Ipv6 => PROTOCOL_ICMPV6,
        }
    }

    pub(crate) fn domain(self) -> Domain {
        match self {
            Network::Ipv4 => Domain::IPV4,
            Network::Ipv6 => Domain::IPV6,
        }
    }

    pub(crate) fn protocol(self) -> Protocol {
        match self {
            Network::Ipv4 => Protocol::ICMPV4,
            Network::Ipv6 => Protocol::ICMPV6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Network::Ipv4 => Self::IPV4_LITERAL,
            Network::Ipv6 => Self::IPV6_LITERAL,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            Self::IPV4_LITERAL | "ipv4" => Ok(Network::Ipv4),
            Self::IPV6_LITERAL | "ipv6" => Ok(Network::Ipv6),
            other => Err(Error::IllegalNetwork(other.into())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PingerConfig {
    pub network: Network,
    /// Local address to bind the socket to, empty for the wildcard address.
    pub bind_address: String,
    /// Ordered endpoint list, the position of an endpoint is its requester identifier.
    pub endpoints: Vec<String>,
    pub timeout: Duration,
    pub interval: Duration,
    /// Upper bound on concurrently running probes, unbounded when `None`.
    pub max_in_flight: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct PingerConfigBuilder {
    network: Network,
    bind_address: String,
    endpoints: Vec<String>,
    timeout: Duration,
    interval: Duration,
    max_in_flight: Option<usize>,
}

impl Default for PingerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PingerConfigBuilder {
    pub fn new() -> Self {
        Self {
            network: Network::default(),
            bind_address: String::new(),
            endpoints: Vec::new(),
            timeout: Duration::from_secs(1),
            interval: Duration::from_secs(1),
            max_in_flight: None,
        }
    }

    pub fn with_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    pub fn with_bind_address(mut self, address: &str) -> Self {
        self.bind_address = address.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoints.push(endpoint.into());
        self
    }

    pub fn with_endpoints<I, S>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.endpoints.extend(endpoints.into_iter().map(Into::into));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_in_flight(mut self, limit: usize) -> Self {
        self.max_in_flight = Some(limit);
        self
    }

    /// # Errors
    /// Returns an error if more endpoints are configured than there are
    /// requester identifiers, or if timeout, interval or concurrency cap is zero.
    pub fn build(self) -> Result<PingerConfig> {
        if self.endpoints.len() > MAX_ENDPOINTS {
            return Err(Error::TooManyEndpoints(self.endpoints.len()));
        }
        if self.timeout.is_zero() {
            return Err(Error::InvalidConfig("timeout must be positive"));
        }
        if self.interval.is_zero() {
            return Err(Error::InvalidConfig("interval must be positive"));
        }
        if self.max_in_flight == Some(0) {
            return Err(Error::InvalidConfig("max_in_flight must be positive"));
        }
        Ok(PingerConfig {
            network: self.network,
            bind_address: self.bind_address,
            endpoints: self.endpoints,
            timeout: self.timeout,
            interval: self.interval,
            max_in_flight: self.max_in_flight,
        })
    }
}
