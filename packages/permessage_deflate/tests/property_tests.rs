use proptest::prelude::*;

use permessage_deflate::{
    Compressed, CompressionContext, DeflateConfig, DeflateParams, Negotiator, Role, fallback,
};

fn arb_params() -> impl Strategy<Value = DeflateParams> {
    (8u8..=15, 8u8..=15, any::<bool>(), any::<bool>()).prop_map(
        |(server_bits, client_bits, server_nct, client_nct)| DeflateParams {
            server_max_window_bits: server_bits,
            client_max_window_bits: client_bits,
            server_no_context_takeover: server_nct,
            client_no_context_takeover: client_nct,
        },
    )
}

/// Mix of compressible text and raw bytes.
fn arb_payload() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 1024..8192),
        ("[a-e ]{16}", 64usize..512).prop_map(|(word, n)| word.repeat(n).into_bytes()),
    ]
}

fn non_adaptive() -> DeflateConfig {
    DeflateConfig {
        adaptive: false,
        ..Default::default()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn decompress_inverts_compress(
        params in arb_params(),
        messages in prop::collection::vec(arb_payload(), 1..4),
    ) {
        let mut server = CompressionContext::new(params, non_adaptive(), Role::Server);
        let mut client = CompressionContext::new(params, non_adaptive(), Role::Client);
        for payload in &messages {
            let compressed = server.compress(payload);
            prop_assert!(compressed.is_compressed());
            prop_assert_eq!(&client.decompress(compressed.as_bytes()).unwrap(), payload);
        }
    }

    #[test]
    fn short_payloads_pass_through(payload in prop::collection::vec(any::<u8>(), 0..1024)) {
        let mut server =
            CompressionContext::new(DeflateParams::default(), DeflateConfig::default(), Role::Server);
        prop_assert_eq!(server.compress(&payload), Compressed::Skipped(&payload[..]));
    }

    #[test]
    fn fresh_context_output_is_plain_raw_deflate(payload in arb_payload()) {
        let params = DeflateParams {
            server_no_context_takeover: true,
            ..Default::default()
        };
        let mut server = CompressionContext::new(params, non_adaptive(), Role::Server);
        let compressed = server.compress(&payload).into_vec();
        prop_assert_eq!(fallback::inflate(&compressed, 1 << 20).unwrap(), payload);
    }

    #[test]
    fn negotiated_header_renegotiates_to_itself(params in arb_params()) {
        let header = params.to_header();
        let negotiator = Negotiator::new(DeflateConfig::default());
        let again = negotiator.negotiate(&header).unwrap();
        prop_assert_eq!(again, params);
        prop_assert_eq!(again.to_header(), header);
    }
}
