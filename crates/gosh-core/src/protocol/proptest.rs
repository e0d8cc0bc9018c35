//! Property-based tests for packet encoding.
//!
//! These tests use proptest to verify:
//! - Encode/decode roundtrip for arbitrary packets
//! - Stream reads recover every packet written back to back
//! - Decoding never panics on arbitrary input

#![cfg(test)]

use proptest::prelude::*;

use crate::protocol::{Packet, read_packet, read_raw, write_packet};

// =============================================================================
// Arbitrary Generators
// =============================================================================

fn arb_text() -> impl Strategy<Value = String> {
    "[^\r\n]{0,120}"
}

fn arb_packet() -> impl Strategy<Value = Packet> {
    prop_oneof![
        arb_text().prop_map(Packet::UsernameRequest),
        arb_text().prop_map(Packet::PasswordRequest),
        "[A-Z_][A-Z0-9_]{0,31}".prop_map(Packet::EnvRequest),
        any::<usize>().prop_map(Packet::KeyChallenge),
        any::<bool>().prop_map(Packet::Done),
        Just(Packet::Timeout),
        Just(Packet::MaxTriesExceeded),
    ]
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(future)
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn roundtrip_arbitrary_packet(packet in arb_packet()) {
        let encoded = packet.encode().unwrap();
        let line = std::str::from_utf8(&encoded).unwrap();
        prop_assert_eq!(Packet::decode(line).unwrap(), packet);
    }

    #[test]
    fn only_key_challenge_lacks_terminator(packet in arb_packet()) {
        let encoded = packet.encode().unwrap();
        let terminated = encoded.last() == Some(&b'\n');
        prop_assert_eq!(terminated, !matches!(packet, Packet::KeyChallenge(_)));
        prop_assert_eq!(encoded.iter().filter(|&&b| b == b'\n').count(), usize::from(terminated));
    }

    #[test]
    fn stream_recovers_packet_sequence(packets in prop::collection::vec(arb_packet(), 1..8)) {
        let decoded = block_on(async {
            let mut wire = Vec::new();
            for packet in &packets {
                write_packet(&mut wire, packet).await.unwrap();
                if let Packet::KeyChallenge(_) = packet {
                    // Stand-in ciphertext that looks like a packet.
                    wire.extend_from_slice(b"?D1:");
                }
            }

            let mut reader = wire.as_slice();
            let mut out = Vec::new();
            for packet in &packets {
                let read = read_packet(&mut reader).await.unwrap();
                if let Packet::KeyChallenge(_) = packet {
                    read_raw(&mut reader, 4).await.unwrap();
                }
                out.push(read);
            }
            out
        });
        prop_assert_eq!(decoded, packets);
    }

    #[test]
    fn decode_never_panics(line in ".{0,256}") {
        let _ = Packet::decode(&line);
    }

    #[test]
    fn text_with_newline_never_encodes(prefix in "[a-z]{0,10}", suffix in "[a-z]{0,10}") {
        let packet = Packet::UsernameRequest(format!("{}\n{}", prefix, suffix));
        prop_assert!(packet.encode().is_err());
    }
}
