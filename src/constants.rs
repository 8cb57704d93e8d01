pub(crate) const PROTOCOL_ICMP: u8 = 1;
pub(crate) const PROTOCOL_ICMPV6: u8 = 58;

pub(crate) const ICMPV6_ECHO_REQUEST: u8 = 128;

/// Type, code, checksum, identifier and sequence number, no payload.
pub(crate) const ECHO_PACK_LEN: usize = 8;
/// Bytes between the ICMP header and the embedded original datagram of an error message.
pub(crate) const ICMP_ERROR_UNUSED_LEN: usize = 4;
pub(crate) const IPV4_MIN_HEADER_LEN: usize = 20;
pub(crate) const IPV6_HEADER_LEN: usize = 40;

pub(crate) const RECV_BUF_LEN: usize = 1500;

/// One identifier per endpoint, so the endpoint set is bounded by the identifier space.
pub(crate) const MAX_ENDPOINTS: usize = u16::MAX as usize + 1;
