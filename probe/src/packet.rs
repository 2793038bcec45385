use std::net::Ipv4Addr;

use thiserror::Error;

/// An echo request is the 8-byte ICMP header plus the f64 send timestamp
/// carried as the only payload.
pub const ECHO_REQUEST_LEN: usize = 16;

/// Replies shorter than this cannot hold the fixed IPv4 + echo layout the
/// parser reads; only this many leading bytes are ever interpreted.
pub const MIN_REPLY_LEN: usize = 60;

const ECHO_REQUEST_TYPE: u8 = 8;
const ECHO_REQUEST_CODE: u8 = 0;

#[derive(Debug, Error)]
#[error("reply datagram too short: {0} bytes")]
pub struct MalformedPacket(pub usize);

/// One's-complement checksum over the ICMP header, summed as
/// little-endian word pairs with a trailing odd byte added as-is. The
/// first fold can leave one more carry, hence the second. The result is
/// returned in network byte order.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut words = data.chunks_exact(2);
    for word in words.by_ref() {
        sum += u32::from(u16::from_le_bytes([word[0], word[1]]));
    }
    if let Some(&last) = words.remainder().first() {
        sum += u32::from(last);
    }

    sum = (sum >> 16) + (sum & 0xffff);
    sum += sum >> 16;
    (!(sum as u16)).to_be()
}

/// Build an echo request for `sequence`. The identifier is freshly
/// randomized for every packet; replies are correlated by sequence number
/// alone.
pub fn build_echo_request(sequence: u16, timestamp: f64) -> [u8; ECHO_REQUEST_LEN] {
    let identifier: u16 = rand::random();

    let mut packet = [0u8; ECHO_REQUEST_LEN];
    packet[0] = ECHO_REQUEST_TYPE;
    packet[1] = ECHO_REQUEST_CODE;
    // bytes 2..4 hold the checksum and stay zero while it is computed
    packet[4..6].copy_from_slice(&identifier.to_be_bytes());
    packet[6..8].copy_from_slice(&sequence.to_be_bytes());
    packet[8..16].copy_from_slice(&timestamp.to_be_bytes());

    let sum = checksum(&packet);
    packet[2..4].copy_from_slice(&sum.to_be_bytes());
    packet
}

/// Parsed view of a received datagram: the IPv4 header followed by the
/// ICMP echo reply. Lives only long enough to correlate against the
/// outstanding request.
#[derive(Debug, Clone, PartialEq)]
pub struct EchoReply {
    pub version: u8,
    pub header_len: u8,
    pub total_len: u16,
    pub identification: u16,
    pub flags: u8,
    pub fragment_offset: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub header_checksum: u16,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub icmp_type: u8,
    pub icmp_code: u8,
    pub icmp_checksum: u16,
    pub identifier: u16,
    pub sequence: u16,
    pub timestamp: f64,
}

impl EchoReply {
    /// Positional parse of the first `MIN_REPLY_LEN` bytes of a datagram.
    pub fn parse(datagram: &[u8]) -> Result<EchoReply, MalformedPacket> {
        if datagram.len() < MIN_REPLY_LEN {
            return Err(MalformedPacket(datagram.len()));
        }
        let d = &datagram[..MIN_REPLY_LEN];
        let flags_fragment = be16(d, 6);

        Ok(EchoReply {
            version: d[0] >> 4,
            header_len: d[0] & 0x0f,
            total_len: be16(d, 2),
            identification: be16(d, 4),
            flags: (flags_fragment >> 13) as u8,
            fragment_offset: flags_fragment & 0x1fff,
            ttl: d[8],
            protocol: d[9],
            header_checksum: be16(d, 10),
            source: Ipv4Addr::new(d[12], d[13], d[14], d[15]),
            destination: Ipv4Addr::new(d[16], d[17], d[18], d[19]),
            icmp_type: d[20],
            icmp_code: d[21],
            icmp_checksum: be16(d, 22),
            identifier: be16(d, 24),
            sequence: be16(d, 26),
            timestamp: f64::from_be_bytes([
                d[28], d[29], d[30], d[31], d[32], d[33], d[34], d[35],
            ]),
        })
    }
}

fn be16(d: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([d[at], d[at + 1]])
}

#[cfg(test)]
mod test {
    use super::*;

    // Same word sum as checksum(), folded but not complemented: a header
    // carrying a valid checksum must sum to all ones.
    fn ones_complement_sum(data: &[u8]) -> u16 {
        let mut sum: u32 = 0;
        let mut words = data.chunks_exact(2);
        for word in words.by_ref() {
            sum += u32::from(u16::from_le_bytes([word[0], word[1]]));
        }
        if let Some(&last) = words.remainder().first() {
            sum += u32::from(last);
        }
        sum = (sum >> 16) + (sum & 0xffff);
        sum += sum >> 16;
        sum as u16
    }

    fn sample_reply() -> Vec<u8> {
        let mut d = vec![0u8; MIN_REPLY_LEN];
        d[0] = 0x45;
        d[2..4].copy_from_slice(&84u16.to_be_bytes());
        d[4..6].copy_from_slice(&0x3344u16.to_be_bytes());
        d[6..8].copy_from_slice(&0x4000u16.to_be_bytes());
        d[8] = 57;
        d[9] = 1;
        d[10..12].copy_from_slice(&0xbeefu16.to_be_bytes());
        d[12..16].copy_from_slice(&[203, 0, 113, 9]);
        d[16..20].copy_from_slice(&[192, 0, 2, 1]);
        d[22..24].copy_from_slice(&0x1234u16.to_be_bytes());
        d[24..26].copy_from_slice(&0xabcdu16.to_be_bytes());
        d[26..28].copy_from_slice(&5u16.to_be_bytes());
        d[28..36].copy_from_slice(&1_700_000_000.5f64.to_be_bytes());
        d
    }

    #[test]
    fn checksum_known_values() {
        // words 0x0008, 0x0000, 0x0201, 0x0403 -> 0x060c -> !0x060c
        assert_eq!(checksum(&[8, 0, 0, 0, 1, 2, 3, 4]), 0xf9f3u16.to_be());
        // odd length: the trailing byte is added unshifted
        assert_eq!(checksum(&[0x01]), 0xfffeu16.to_be());
        assert_eq!(checksum(&[8, 0, 0, 0, 0x01]), 0xfff6u16.to_be());
    }

    #[test]
    fn finished_header_sums_to_all_ones() {
        for sequence in [0u16, 1, 7, 19, u16::MAX] {
            let packet = build_echo_request(sequence, 1_700_000_000.25);
            assert_eq!(ones_complement_sum(&packet), 0xffff);
        }
    }

    #[test]
    fn echo_request_layout() {
        let packet = build_echo_request(7, 1234.5);
        assert_eq!(packet.len(), ECHO_REQUEST_LEN);
        assert_eq!(packet[0], 8);
        assert_eq!(packet[1], 0);
        assert_ne!(&packet[2..4], &[0, 0]);
        assert_eq!(u16::from_be_bytes([packet[6], packet[7]]), 7);
        let timestamp = f64::from_be_bytes([
            packet[8], packet[9], packet[10], packet[11], packet[12], packet[13], packet[14],
            packet[15],
        ]);
        assert_eq!(timestamp, 1234.5);
    }

    #[test]
    fn identifier_is_fresh_per_packet() {
        let ids: Vec<u16> = (0..8)
            .map(|_| {
                let packet = build_echo_request(0, 0.0);
                u16::from_be_bytes([packet[4], packet[5]])
            })
            .collect();
        assert!(ids.iter().any(|id| *id != ids[0]));
    }

    #[test]
    fn parse_rejects_short_datagrams() {
        assert!(EchoReply::parse(&[]).is_err());
        let err = EchoReply::parse(&vec![0u8; MIN_REPLY_LEN - 1]).unwrap_err();
        assert_eq!(err.0, MIN_REPLY_LEN - 1);
    }

    #[test]
    fn parse_reply_fields() {
        let reply = EchoReply::parse(&sample_reply()).unwrap();
        assert_eq!(reply.version, 4);
        assert_eq!(reply.header_len, 5);
        assert_eq!(reply.total_len, 84);
        assert_eq!(reply.identification, 0x3344);
        assert_eq!(reply.flags, 0b010);
        assert_eq!(reply.fragment_offset, 0);
        assert_eq!(reply.ttl, 57);
        assert_eq!(reply.protocol, 1);
        assert_eq!(reply.header_checksum, 0xbeef);
        assert_eq!(reply.source, Ipv4Addr::new(203, 0, 113, 9));
        assert_eq!(reply.destination, Ipv4Addr::new(192, 0, 2, 1));
        assert_eq!(reply.icmp_type, 0);
        assert_eq!(reply.icmp_code, 0);
        assert_eq!(reply.icmp_checksum, 0x1234);
        assert_eq!(reply.identifier, 0xabcd);
        assert_eq!(reply.sequence, 5);
        assert_eq!(reply.timestamp, 1_700_000_000.5);
    }

    #[test]
    fn parse_ignores_bytes_past_the_window() {
        let mut long = sample_reply();
        long.extend_from_slice(&[0xff; 40]);
        assert_eq!(
            EchoReply::parse(&long).unwrap(),
            EchoReply::parse(&sample_reply()).unwrap()
        );
    }
}
