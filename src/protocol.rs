//! Inner frame codec.
//!
//! Both endpoints exchange a small header frame inside the encrypted
//! channel:
//!
//! ```text
//! u16  signature = 0x504B
//! u8   command   (reply frames overlay this byte with an error code)
//! u8   atype     in {1 IPv4, 3 DOMAIN, 4 IPv6}
//! u8   alen      (domain byte length; written 0 otherwise)
//! N    address   (4, alen or 16 bytes)
//! u16  port
//! [payload]      (UDP relay frames only)
//! ```
//!
//! Everything is big-endian. Domain names are IDNA-encoded on the wire
//! and IDNA-decoded on parse. The signature gates acceptance: a frame
//! that does not start with it is rejected before any side effect.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::{Buf, BufMut};
use thiserror::Error;

/// Two-byte constant gating frame acceptance.
pub const SIGNATURE: u16 = 0x504B;

/// Commands carried by request frames.
pub const CMD_CONNECT: u8 = 1;
pub const CMD_BIND: u8 = 2;
pub const CMD_UDP_ASSOCIATE: u8 = 3;

/// Address family tags.
pub const ATYP_IPV4: u8 = 1;
pub const ATYP_DOMAIN: u8 = 3;
pub const ATYP_IPV6: u8 = 4;

/// Error codes carried in the command slot of reply frames.
pub const ERR_NONE: u8 = 0x00;
pub const ERR_HOST_UNREACHABLE: u8 = 0x04;

/// Largest possible header: fixed fields plus a 255-byte domain.
pub const MAX_HEADER_LEN: usize = 7 + 255;

/// Frame decode/encode failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// More bytes are needed before the frame can be judged.
    #[error("frame truncated")]
    Truncated,
    /// Fatal: the signature gate failed.
    #[error("bad frame signature {0:#06x}")]
    BadSignature(u16),
    /// Fatal: unknown address family tag.
    #[error("unsupported address type {0}")]
    BadAddressType(u8),
    /// The domain bytes are not a valid IDNA name.
    #[error("invalid domain name")]
    BadDomain,
    /// The IDNA-encoded domain does not fit the one-byte length field.
    #[error("domain name too long ({0} bytes)")]
    DomainTooLong(usize),
}

/// A target address as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddr {
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Domain(String),
}

impl TargetAddr {
    /// Wire tag for this address family.
    pub fn atyp(&self) -> u8 {
        match self {
            TargetAddr::Ipv4(_) => ATYP_IPV4,
            TargetAddr::Domain(_) => ATYP_DOMAIN,
            TargetAddr::Ipv6(_) => ATYP_IPV6,
        }
    }
}

impl From<IpAddr> for TargetAddr {
    fn from(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(ip) => TargetAddr::Ipv4(ip),
            IpAddr::V6(ip) => TargetAddr::Ipv6(ip),
        }
    }
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAddr::Ipv4(ip) => ip.fmt(f),
            TargetAddr::Ipv6(ip) => ip.fmt(f),
            TargetAddr::Domain(host) => host.fmt(f),
        }
    }
}

/// A parsed request frame.
///
/// Reply frames share the wire shape, with the error code in
/// `command`; they parse with [`decode_request`] as well.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub command: u8,
    pub addr: TargetAddr,
    pub port: u16,
    /// Header length in bytes; datagram payload starts here.
    pub consumed: usize,
}

/// Decode one frame header from the front of `data`.
///
/// Extra bytes past the header are left for the caller (`consumed`
/// marks the boundary). [`FrameError::Truncated`] means the prefix is
/// consistent so far and more bytes may complete it; every other error
/// is fatal to the session.
pub fn decode_request(data: &[u8]) -> Result<Request, FrameError> {
    if data.len() < 5 {
        return Err(FrameError::Truncated);
    }
    let mut buf = data;
    let signature = buf.get_u16();
    let command = buf.get_u8();
    let atyp = buf.get_u8();
    let alen = buf.get_u8() as usize;

    if signature != SIGNATURE {
        return Err(FrameError::BadSignature(signature));
    }

    let (addr, addr_len) = match atyp {
        ATYP_IPV4 => {
            if buf.remaining() < 4 {
                return Err(FrameError::Truncated);
            }
            let mut octets = [0u8; 4];
            buf.copy_to_slice(&mut octets);
            (TargetAddr::Ipv4(octets.into()), 4)
        }
        ATYP_DOMAIN => {
            if buf.remaining() < alen {
                return Err(FrameError::Truncated);
            }
            let ascii =
                std::str::from_utf8(&buf[..alen]).map_err(|_| FrameError::BadDomain)?;
            let (host, uts46) = idna::domain_to_unicode(ascii);
            uts46.map_err(|_| FrameError::BadDomain)?;
            buf.advance(alen);
            (TargetAddr::Domain(host), alen)
        }
        ATYP_IPV6 => {
            if buf.remaining() < 16 {
                return Err(FrameError::Truncated);
            }
            let mut octets = [0u8; 16];
            buf.copy_to_slice(&mut octets);
            (TargetAddr::Ipv6(octets.into()), 16)
        }
        other => return Err(FrameError::BadAddressType(other)),
    };

    if buf.remaining() < 2 {
        return Err(FrameError::Truncated);
    }
    let port = buf.get_u16();

    Ok(Request {
        command,
        addr,
        port,
        consumed: 5 + addr_len + 2,
    })
}

/// Encode a request frame.
pub fn encode_request(
    command: u8,
    addr: &TargetAddr,
    port: u16,
) -> Result<Vec<u8>, FrameError> {
    let mut buf = Vec::with_capacity(MAX_HEADER_LEN);
    buf.put_u16(SIGNATURE);
    buf.put_u8(command);
    match addr {
        TargetAddr::Ipv4(ip) => {
            buf.put_u8(ATYP_IPV4);
            buf.put_u8(0);
            buf.extend_from_slice(&ip.octets());
        }
        TargetAddr::Domain(host) => {
            let ascii = idna::domain_to_ascii(host).map_err(|_| FrameError::BadDomain)?;
            if ascii.len() > 255 {
                return Err(FrameError::DomainTooLong(ascii.len()));
            }
            buf.put_u8(ATYP_DOMAIN);
            buf.put_u8(ascii.len() as u8);
            buf.extend_from_slice(ascii.as_bytes());
        }
        TargetAddr::Ipv6(ip) => {
            buf.put_u8(ATYP_IPV6);
            buf.put_u8(0);
            buf.extend_from_slice(&ip.octets());
        }
    }
    buf.put_u16(port);
    Ok(buf)
}

/// Encode a reply frame.
///
/// Fixed wire rule: the error code overlays the command byte. The
/// address is always IP-form (the dialed peer or the bound relay
/// socket), so this cannot fail.
pub fn encode_reply(err: u8, bind: SocketAddr) -> Vec<u8> {
    let mut buf = Vec::with_capacity(23);
    buf.put_u16(SIGNATURE);
    buf.put_u8(err);
    match bind.ip() {
        IpAddr::V4(ip) => {
            buf.put_u8(ATYP_IPV4);
            buf.put_u8(0);
            buf.extend_from_slice(&ip.octets());
        }
        IpAddr::V6(ip) => {
            buf.put_u8(ATYP_IPV6);
            buf.put_u8(0);
            buf.extend_from_slice(&ip.octets());
        }
    }
    buf.put_u16(bind.port());
    buf
}

/// The reply sent when the target cannot be reached: err=0x04 with an
/// all-zero IPv4 address.
pub fn unreachable_reply() -> Vec<u8> {
    encode_reply(ERR_HOST_UNREACHABLE, SocketAddr::from(([0, 0, 0, 0], 0)))
}

/// Encode a remote-to-client datagram envelope: a reply-shaped header
/// naming the datagram's source, with the payload appended.
pub fn encode_datagram(src: SocketAddr, payload: &[u8]) -> Vec<u8> {
    let mut buf = encode_reply(ERR_NONE, src);
    buf.extend_from_slice(payload);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv4_request_round_trip() {
        let addr = TargetAddr::Ipv4("127.0.0.1".parse().unwrap());
        let frame = encode_request(CMD_CONNECT, &addr, 80).unwrap();
        assert_eq!(&frame[..2], &[0x50, 0x4B]);
        assert_eq!(frame.len(), 11);

        let req = decode_request(&frame).unwrap();
        assert_eq!(req.command, CMD_CONNECT);
        assert_eq!(req.addr, addr);
        assert_eq!(req.port, 80);
        assert_eq!(req.consumed, frame.len());
    }

    #[test]
    fn domain_request_round_trip() {
        let addr = TargetAddr::Domain("example.com".into());
        let frame = encode_request(CMD_CONNECT, &addr, 80).unwrap();
        assert_eq!(frame[3], ATYP_DOMAIN);
        assert_eq!(frame[4], 11);
        assert_eq!(&frame[5..16], b"example.com");

        let req = decode_request(&frame).unwrap();
        assert_eq!(req.addr, addr);
        assert_eq!(req.consumed, frame.len());
    }

    #[test]
    fn unicode_domain_is_idna_encoded_on_the_wire() {
        let addr = TargetAddr::Domain("bücher.example".into());
        let frame = encode_request(CMD_CONNECT, &addr, 443).unwrap();
        let alen = frame[4] as usize;
        assert_eq!(&frame[5..5 + alen], b"xn--bcher-kva.example");

        let req = decode_request(&frame).unwrap();
        assert_eq!(req.addr, TargetAddr::Domain("bücher.example".into()));
    }

    #[test]
    fn ipv6_request_round_trip() {
        let addr = TargetAddr::Ipv6("2001:db8::1".parse().unwrap());
        let frame = encode_request(CMD_UDP_ASSOCIATE, &addr, 53).unwrap();
        assert_eq!(frame.len(), 5 + 16 + 2);

        let req = decode_request(&frame).unwrap();
        assert_eq!(req.command, CMD_UDP_ASSOCIATE);
        assert_eq!(req.addr, addr);
        assert_eq!(req.port, 53);
    }

    #[test]
    fn signature_gate_rejects() {
        let addr = TargetAddr::Ipv4("10.0.0.1".parse().unwrap());
        let mut frame = encode_request(CMD_CONNECT, &addr, 80).unwrap();
        frame[0] = 0xDE;
        frame[1] = 0xAD;
        assert_eq!(
            decode_request(&frame),
            Err(FrameError::BadSignature(0xDEAD))
        );
    }

    #[test]
    fn unknown_atype_rejects() {
        let frame = [0x50, 0x4B, CMD_CONNECT, 0x02, 0, 1, 2, 3, 4, 0, 80];
        assert_eq!(decode_request(&frame), Err(FrameError::BadAddressType(2)));
    }

    #[test]
    fn short_input_is_truncated_not_fatal() {
        let addr = TargetAddr::Domain("example.com".into());
        let frame = encode_request(CMD_CONNECT, &addr, 80).unwrap();
        for len in 0..frame.len() {
            assert_eq!(decode_request(&frame[..len]), Err(FrameError::Truncated));
        }
    }

    #[test]
    fn reply_overlays_command_with_error_code() {
        let reply = encode_reply(ERR_HOST_UNREACHABLE, "0.0.0.0:0".parse().unwrap());
        assert_eq!(reply.len(), 11);
        assert_eq!(reply[2], ERR_HOST_UNREACHABLE);
        assert_eq!(reply[4], 0);

        let parsed = decode_request(&reply).unwrap();
        assert_eq!(parsed.command, ERR_HOST_UNREACHABLE);
        assert_eq!(parsed.addr, TargetAddr::Ipv4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(parsed.port, 0);
    }

    #[test]
    fn reply_carries_peer_address() {
        let reply = encode_reply(ERR_NONE, "192.0.2.7:8080".parse().unwrap());
        let parsed = decode_request(&reply).unwrap();
        assert_eq!(parsed.command, ERR_NONE);
        assert_eq!(parsed.addr, TargetAddr::Ipv4("192.0.2.7".parse().unwrap()));
        assert_eq!(parsed.port, 8080);
    }

    #[test]
    fn datagram_envelope_keeps_payload_after_header() {
        let src: SocketAddr = "8.8.8.8:53".parse().unwrap();
        let envelope = encode_datagram(src, b"dns answer");

        let parsed = decode_request(&envelope).unwrap();
        assert_eq!(parsed.command, ERR_NONE);
        assert_eq!(parsed.addr, TargetAddr::Ipv4("8.8.8.8".parse().unwrap()));
        assert_eq!(parsed.port, 53);
        assert_eq!(&envelope[parsed.consumed..], b"dns answer");
    }

    #[test]
    fn trailing_payload_does_not_confuse_decode() {
        let addr = TargetAddr::Ipv4("127.0.0.1".parse().unwrap());
        let mut frame = encode_request(0, &addr, 9999).unwrap();
        let header_len = frame.len();
        frame.extend_from_slice(&[0xAA; 300]);

        let req = decode_request(&frame).unwrap();
        assert_eq!(req.consumed, header_len);
        assert_eq!(req.port, 9999);
    }

    #[test]
    fn oversized_domain_is_refused() {
        let addr = TargetAddr::Domain(format!("{}.example", "a".repeat(300)));
        assert!(matches!(
            encode_request(CMD_CONNECT, &addr, 80),
            Err(FrameError::DomainTooLong(_))
        ));
    }
}
