//! ICMP echo wire format for both network families.
//!
//! Echo messages share one layout on IPv4 and IPv6 (type, code, checksum,
//! identifier, sequence number), so the IPv4 echo packet views from `pnet`
//! are used for both and only the type field and checksum differ.

use pnet::packet::{
    icmp::{
        echo_reply::EchoReplyPacket,
        echo_request::{EchoRequestPacket, IcmpCodes, MutableEchoRequestPacket},
        IcmpPacket, IcmpType, IcmpTypes,
    },
    icmpv6::{Icmpv6Packet, Icmpv6Types},
    ipv4::Ipv4Packet,
    ipv6::Ipv6Packet,
    Packet,
};

use crate::config::Network;
use crate::constants::{
    ECHO_PACK_LEN, ICMPV6_ECHO_REQUEST, ICMP_ERROR_UNUSED_LEN, IPV4_MIN_HEADER_LEN,
    IPV6_HEADER_LEN,
};
use crate::error::{DecodeError, EncodeError};

/// A decoded inbound ICMP message, reduced to what correlation needs.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum InboundMessage {
    EchoReply {
        identifier: u16,
        sequence: u16,
    },
    /// Destination unreachable, carrying the echo fields of the request that bounced.
    Unreachable {
        identifier: u16,
        sequence: u16,
        code: u8,
    },
    Ignored,
}

/// Builds an echo request with an empty payload.
///
/// IPv4 requests get their checksum here. For ICMPv6 the checksum covers a
/// pseudo header only the kernel knows, so it is left zero for the kernel to fill.
pub fn encode_echo_request(
    identifier: u16,
    sequence: u16,
    network: Network,
) -> Result<Vec<u8>, EncodeError> {
    let mut buf = vec![0; ECHO_PACK_LEN];
    let mut echo = MutableEchoRequestPacket::new(&mut buf).ok_or(EncodeError(ECHO_PACK_LEN))?;
    match network {
        Network::Ipv4 => echo.set_icmp_type(IcmpTypes::EchoRequest),
        Network::Ipv6 => echo.set_icmp_type(IcmpType::new(ICMPV6_ECHO_REQUEST)),
    }
    echo.set_icmp_code(IcmpCodes::NoCode);
    echo.set_identifier(identifier);
    echo.set_sequence_number(sequence);
    if network == Network::Ipv4 {
        let checksum = pnet::util::checksum(echo.packet(), 1);
        echo.set_checksum(checksum);
    }
    Ok(buf)
}

/// Removes the IPv4 header raw IPv4 sockets put in front of every received message.
///
/// Input that does not look like an IPv4 datagram is returned unchanged.
pub fn strip_ip_header(bytes: &[u8], network: Network) -> &[u8] {
    if network == Network::Ipv6 {
        return bytes;
    }
    match Ipv4Packet::new(bytes) {
        Some(header) if header.get_version() == 4 => {
            let header_len = usize::from(header.get_header_length()) * 4;
            if (IPV4_MIN_HEADER_LEN..=bytes.len()).contains(&header_len) {
                &bytes[header_len..]
            } else {
                bytes
            }
        }
        _ => bytes,
    }
}

/// Parses a received ICMP message.
///
/// Messages other than echo replies and destination unreachable errors decode
/// to [`InboundMessage::Ignored`].
pub fn decode_inbound(bytes: &[u8], network: Network) -> Result<InboundMessage, DecodeError> {
    match network {
        Network::Ipv4 => decode_icmpv4(bytes),
        Network::Ipv6 => decode_icmpv6(bytes),
    }
}

fn decode_icmpv4(bytes: &[u8]) -> Result<InboundMessage, DecodeError> {
    let icmp = IcmpPacket::new(bytes).ok_or(DecodeError::TruncatedMessage)?;
    match icmp.get_icmp_type() {
        IcmpTypes::EchoReply => echo_reply(bytes),
        IcmpTypes::DestinationUnreachable => {
            let original = error_body(icmp.payload())?;
            let header = Ipv4Packet::new(original).ok_or(DecodeError::TruncatedHeader)?;
            let header_len = usize::from(header.get_header_length()) * 4;
            if header_len < IPV4_MIN_HEADER_LEN || header_len > original.len() {
                return Err(DecodeError::TruncatedHeader);
            }
            let embedded = &original[header_len..];
            let embedded_icmp = IcmpPacket::new(embedded).ok_or(DecodeError::TruncatedMessage)?;
            if embedded_icmp.get_icmp_type() != IcmpTypes::EchoRequest {
                return Err(DecodeError::UnexpectedEmbedded);
            }
            unreachable(embedded, icmp.get_icmp_code().0)
        }
        _ => Ok(InboundMessage::Ignored),
    }
}

fn decode_icmpv6(bytes: &[u8]) -> Result<InboundMessage, DecodeError> {
    let icmp = Icmpv6Packet::new(bytes).ok_or(DecodeError::TruncatedMessage)?;
    match icmp.get_icmpv6_type() {
        Icmpv6Types::EchoReply => echo_reply(bytes),
        Icmpv6Types::DestinationUnreachable => {
            let original = error_body(icmp.payload())?;
            Ipv6Packet::new(original).ok_or(DecodeError::TruncatedHeader)?;
            let embedded = &original[IPV6_HEADER_LEN..];
            let embedded_icmp =
                Icmpv6Packet::new(embedded).ok_or(DecodeError::TruncatedMessage)?;
            if embedded_icmp.get_icmpv6_type() != Icmpv6Types::EchoRequest {
                return Err(DecodeError::UnexpectedEmbedded);
            }
            unreachable(embedded, icmp.get_icmpv6_code().0)
        }
        _ => Ok(InboundMessage::Ignored),
    }
}

fn echo_reply(bytes: &[u8]) -> Result<InboundMessage, DecodeError> {
    let reply = EchoReplyPacket::new(bytes).ok_or(DecodeError::TruncatedMessage)?;
    Ok(InboundMessage::EchoReply {
        identifier: reply.get_identifier(),
        sequence: reply.get_sequence_number(),
    })
}

fn unreachable(embedded: &[u8], code: u8) -> Result<InboundMessage, DecodeError> {
    let request = EchoRequestPacket::new(embedded).ok_or(DecodeError::TruncatedMessage)?;
    Ok(InboundMessage::Unreachable {
        identifier: request.get_identifier(),
        sequence: request.get_sequence_number(),
        code,
    })
}

// Skips the unused word between the error header and the original datagram.
fn error_body(payload: &[u8]) -> Result<&[u8], DecodeError> {
    payload
        .get(ICMP_ERROR_UNUSED_LEN..)
        .ok_or(DecodeError::TruncatedMessage)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn as_reply(request: &[u8], network: Network) -> Vec<u8> {
        let mut reply = request.to_vec();
        reply[0] = match network {
            Network::Ipv4 => 0,
            Network::Ipv6 => 129,
        };
        reply
    }

    fn ipv4_header(header_len: usize, payload_len: usize) -> Vec<u8> {
        let mut header = vec![0; header_len];
        header[0] = 0x40 | (header_len / 4) as u8;
        let total = (header_len + payload_len) as u16;
        header[2..4].copy_from_slice(&total.to_be_bytes());
        header[8] = 64;
        header[9] = 1;
        header[12..16].copy_from_slice(&[192, 0, 2, 10]);
        header[16..20].copy_from_slice(&[192, 0, 2, 1]);
        header
    }

    fn ipv6_header(payload_len: usize) -> Vec<u8> {
        let mut header = vec![0; IPV6_HEADER_LEN];
        header[0] = 0x60;
        header[4..6].copy_from_slice(&(payload_len as u16).to_be_bytes());
        header[6] = 58;
        header[7] = 64;
        header
    }

    fn unreachable_v4(code: u8, original_header_len: usize, request: &[u8]) -> Vec<u8> {
        let mut message = vec![3, code, 0, 0, 0, 0, 0, 0];
        message.extend(ipv4_header(original_header_len, request.len()));
        message.extend_from_slice(request);
        message
    }

    #[test]
    fn test_encode_ipv4_echo_request() {
        let bytes = encode_echo_request(7, 513, Network::Ipv4).unwrap();
        assert_eq!(bytes.len(), ECHO_PACK_LEN);
        assert_eq!(bytes[0], 8);
        assert_eq!(bytes[1], 0);
        assert_eq!(&bytes[4..6], &7u16.to_be_bytes());
        assert_eq!(&bytes[6..8], &513u16.to_be_bytes());
        // The checksum over a message including its own checksum folds to zero.
        assert_eq!(pnet::util::checksum(&bytes, 5), 0);
    }

    #[test]
    fn test_encode_ipv6_echo_request() {
        let bytes = encode_echo_request(1, 2, Network::Ipv6).unwrap();
        assert_eq!(bytes[0], ICMPV6_ECHO_REQUEST);
        assert_eq!(bytes[1], 0);
        assert_eq!(&bytes[2..4], &[0, 0]);
    }

    #[test]
    fn test_reply_matches_request() {
        for network in [Network::Ipv4, Network::Ipv6] {
            let request = encode_echo_request(42, 65535, network).unwrap();
            let reply = as_reply(&request, network);
            assert_eq!(
                decode_inbound(&reply, network).unwrap(),
                InboundMessage::EchoReply {
                    identifier: 42,
                    sequence: 65535
                }
            );
        }
    }

    #[test]
    fn test_request_is_ignored() {
        let request = encode_echo_request(3, 4, Network::Ipv4).unwrap();
        assert_eq!(
            decode_inbound(&request, Network::Ipv4).unwrap(),
            InboundMessage::Ignored
        );
    }

    #[test]
    fn test_truncated_reply() {
        let request = encode_echo_request(3, 4, Network::Ipv4).unwrap();
        let reply = as_reply(&request, Network::Ipv4);
        assert_eq!(
            decode_inbound(&reply[..6], Network::Ipv4),
            Err(DecodeError::TruncatedMessage)
        );
        assert_eq!(
            decode_inbound(&[], Network::Ipv6),
            Err(DecodeError::TruncatedMessage)
        );
    }

    #[test]
    fn test_unreachable_ipv4_with_options() {
        let request = encode_echo_request(9, 100, Network::Ipv4).unwrap();
        for header_len in [20, 24, 60] {
            let message = unreachable_v4(1, header_len, &request);
            assert_eq!(
                decode_inbound(&message, Network::Ipv4).unwrap(),
                InboundMessage::Unreachable {
                    identifier: 9,
                    sequence: 100,
                    code: 1
                }
            );
        }
    }

    #[test]
    fn test_unreachable_ipv4_bad_header_length() {
        let request = encode_echo_request(9, 100, Network::Ipv4).unwrap();
        let mut message = unreachable_v4(1, 20, &request);
        // Claims a 60 byte header while only 28 bytes follow.
        message[8] = 0x4f;
        assert_eq!(
            decode_inbound(&message, Network::Ipv4),
            Err(DecodeError::TruncatedHeader)
        );
        message[8] = 0x41;
        assert_eq!(
            decode_inbound(&message, Network::Ipv4),
            Err(DecodeError::TruncatedHeader)
        );
    }

    #[test]
    fn test_unreachable_ipv4_embedded_non_echo() {
        let mut request = encode_echo_request(9, 100, Network::Ipv4).unwrap();
        request[0] = 13;
        let message = unreachable_v4(3, 20, &request);
        assert_eq!(
            decode_inbound(&message, Network::Ipv4),
            Err(DecodeError::UnexpectedEmbedded)
        );
    }

    #[test]
    fn test_unreachable_ipv6() {
        let request = encode_echo_request(5, 6, Network::Ipv6).unwrap();
        let mut message = vec![1, 4, 0, 0, 0, 0, 0, 0];
        message.extend(ipv6_header(request.len()));
        message.extend_from_slice(&request);
        assert_eq!(
            decode_inbound(&message, Network::Ipv6).unwrap(),
            InboundMessage::Unreachable {
                identifier: 5,
                sequence: 6,
                code: 4
            }
        );

        message.truncate(8 + IPV6_HEADER_LEN - 1);
        assert_eq!(
            decode_inbound(&message, Network::Ipv6),
            Err(DecodeError::TruncatedHeader)
        );
    }

    #[test]
    fn test_strip_ip_header() {
        let request = encode_echo_request(1, 1, Network::Ipv4).unwrap();
        let reply = as_reply(&request, Network::Ipv4);
        let mut datagram = ipv4_header(24, reply.len());
        datagram.extend_from_slice(&reply);
        assert_eq!(strip_ip_header(&datagram, Network::Ipv4), &reply[..]);
        assert_eq!(strip_ip_header(&reply, Network::Ipv4), &reply[..]);
        assert_eq!(strip_ip_header(&datagram, Network::Ipv6), &datagram[..]);
    }
}
