use serde::{Deserialize, Serialize};

/// Extension token in `Sec-WebSocket-Extensions`.
pub const EXTENSION_NAME: &str = "permessage-deflate";

pub const MIN_WINDOW_BITS: u8 = 8;
pub const MAX_WINDOW_BITS: u8 = 15;
pub const DEFAULT_WINDOW_BITS: u8 = MAX_WINDOW_BITS;

/// Parameters both peers agreed on for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeflateParams {
    pub server_max_window_bits: u8,
    pub client_max_window_bits: u8,
    pub server_no_context_takeover: bool,
    pub client_no_context_takeover: bool,
}

impl Default for DeflateParams {
    fn default() -> Self {
        Self {
            server_max_window_bits: DEFAULT_WINDOW_BITS,
            client_max_window_bits: DEFAULT_WINDOW_BITS,
            server_no_context_takeover: false,
            client_no_context_takeover: false,
        }
    }
}

impl DeflateParams {
    /// Render the response header value. Parameters at their default
    /// (`15`, `false`) are omitted.
    pub fn to_header(&self) -> String {
        let mut header = String::from(EXTENSION_NAME);
        if self.server_no_context_takeover {
            header.push_str("; server_no_context_takeover");
        }
        if self.client_no_context_takeover {
            header.push_str("; client_no_context_takeover");
        }
        if self.server_max_window_bits != DEFAULT_WINDOW_BITS {
            header.push_str(&format!(
                "; server_max_window_bits={}",
                self.server_max_window_bits
            ));
        }
        if self.client_max_window_bits != DEFAULT_WINDOW_BITS {
            header.push_str(&format!(
                "; client_max_window_bits={}",
                self.client_max_window_bits
            ));
        }
        header
    }
}

pub(crate) fn window_bits_in_range(bits: u8) -> bool {
    (MIN_WINDOW_BITS..=MAX_WINDOW_BITS).contains(&bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_render_bare_token() {
        assert_eq!(DeflateParams::default().to_header(), "permessage-deflate");
    }

    #[test]
    fn non_default_params_rendered_in_order() {
        let params = DeflateParams {
            server_max_window_bits: 10,
            client_max_window_bits: 12,
            server_no_context_takeover: true,
            client_no_context_takeover: true,
        };
        assert_eq!(
            params.to_header(),
            "permessage-deflate; server_no_context_takeover; client_no_context_takeover; \
             server_max_window_bits=10; client_max_window_bits=12"
        );
    }

    #[test]
    fn window_range() {
        assert!(!window_bits_in_range(7));
        assert!(window_bits_in_range(8));
        assert!(window_bits_in_range(15));
        assert!(!window_bits_in_range(16));
    }
}
