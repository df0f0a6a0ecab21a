//! Cheap "is this worth deflating" heuristics.

/// Bytes inspected when scoring a payload.
const SAMPLE_LEN: usize = 4096;

const LARGE_PAYLOAD: usize = 64 * 1024;
const HUGE_PAYLOAD: usize = 1024 * 1024;

/// Estimated compression benefit in `[0.0, 1.0]`.
///
/// Order-0 Shannon entropy of a leading sample, normalised by the highest
/// entropy the sample could have. `1.0` is a single repeated byte, `0.0` is
/// uniformly distributed noise.
pub fn estimated_benefit(payload: &[u8]) -> f64 {
    let sample = &payload[..payload.len().min(SAMPLE_LEN)];
    if sample.len() < 2 {
        return 0.0;
    }

    let mut counts = [0u32; 256];
    for &b in sample {
        counts[b as usize] += 1;
    }

    let len = sample.len() as f64;
    let entropy: f64 = counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / len;
            -p * p.log2()
        })
        .sum();
    let max_entropy = len.min(256.0).log2();

    (1.0 - entropy / max_entropy).clamp(0.0, 1.0)
}

/// Trade ratio for speed on large payloads.
pub fn select_level(configured: u32, payload_len: usize) -> u32 {
    let level = configured.min(9);
    match payload_len {
        n if n >= HUGE_PAYLOAD => level.min(1),
        n if n >= LARGE_PAYLOAD => level.min(3),
        _ => level,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_byte_is_maximally_compressible() {
        assert_eq!(estimated_benefit(&[b'a'; 1000]), 1.0);
    }

    #[test]
    fn uniform_bytes_score_zero() {
        let noise: Vec<u8> = (0..=255u8).cycle().take(8192).collect();
        assert!(estimated_benefit(&noise) < 0.01);
    }

    #[test]
    fn text_lands_in_between() {
        let json = br#"{"type":"chat","user":"alice","body":"hello there, how are you?"}"#;
        let score = estimated_benefit(json);
        assert!(score > 0.1 && score < 0.9, "score {score}");
    }

    #[test]
    fn tiny_inputs() {
        assert_eq!(estimated_benefit(b""), 0.0);
        assert_eq!(estimated_benefit(b"x"), 0.0);
    }

    #[test]
    fn levels_drop_for_large_payloads() {
        assert_eq!(select_level(6, 1000), 6);
        assert_eq!(select_level(6, 100 * 1024), 3);
        assert_eq!(select_level(6, 2 * 1024 * 1024), 1);
        assert_eq!(select_level(2, 100 * 1024), 2);
        assert_eq!(select_level(12, 10), 9);
    }
}
