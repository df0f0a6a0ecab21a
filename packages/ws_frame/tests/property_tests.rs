use proptest::prelude::*;

use ws_frame::{Frame, FrameDecoder, Opcode, decode, encode};

fn arb_opcode() -> impl Strategy<Value = Opcode> {
    prop_oneof![
        Just(Opcode::Text),
        Just(Opcode::Binary),
        Just(Opcode::Close),
        Just(Opcode::Ping),
        Just(Opcode::Pong),
    ]
}

fn arb_frame() -> impl Strategy<Value = Frame> {
    (
        arb_opcode(),
        prop::collection::vec(any::<u8>(), 0..70_000),
        any::<Option<[u8; 4]>>(),
    )
        .prop_map(|(opcode, mut payload, mask)| {
            if opcode.is_control() {
                payload.truncate(125);
            }
            Frame {
                fin: true,
                rsv1: false,
                opcode,
                mask,
                payload,
            }
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn decode_inverts_encode(frame in arb_frame()) {
        let bytes = encode(&frame).unwrap();
        prop_assert_eq!(bytes.len(), frame.encoded_len());
        prop_assert_eq!(decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn streaming_decoder_agrees_with_one_shot(frame in arb_frame(), chunk in 1usize..4096) {
        let bytes = encode(&frame).unwrap();
        let mut decoder = FrameDecoder::new(usize::MAX);
        let mut decoded = None;
        for piece in bytes.chunks(chunk) {
            decoder.extend(piece);
            if let Some(f) = decoder.next_frame().unwrap() {
                decoded = Some(f);
            }
        }
        prop_assert_eq!(decoded, Some(frame));
    }
}

#[test]
fn round_trip_at_length_boundaries() {
    let opcodes = [
        Opcode::Text,
        Opcode::Binary,
        Opcode::Close,
        Opcode::Ping,
        Opcode::Pong,
    ];
    for opcode in opcodes {
        for len in [0usize, 125, 126, 65535, 65536] {
            if opcode.is_control() && len > 125 {
                continue;
            }
            for mask in [None, Some([0xde, 0xad, 0xbe, 0xef])] {
                let frame = Frame {
                    fin: true,
                    rsv1: false,
                    opcode,
                    mask,
                    payload: vec![0x5a; len],
                };
                let bytes = encode(&frame).unwrap();
                assert_eq!(decode(&bytes).unwrap(), frame, "{opcode:?} len={len}");
            }
        }
    }
}
