use tracing::debug;

use crate::config::DeflateConfig;
use crate::error::NegotiationError;
use crate::params::{
    DEFAULT_WINDOW_BITS, DeflateParams, EXTENSION_NAME, MAX_WINDOW_BITS, MIN_WINDOW_BITS,
};

/// One `permessage-deflate` offer as the client sent it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct Offer {
    server_max_window_bits: Option<u32>,
    /// `Some(None)`: the parameter was sent without a value.
    client_max_window_bits: Option<Option<u32>>,
    server_no_context_takeover: bool,
    client_no_context_takeover: bool,
}

/// Intersects client offers with local configuration.
#[derive(Debug, Clone)]
pub struct Negotiator {
    config: DeflateConfig,
}

impl Negotiator {
    pub fn new(config: DeflateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DeflateConfig {
        &self.config
    }

    /// Negotiate against a `Sec-WebSocket-Extensions` value.
    ///
    /// `None` means the extension stays off for this connection: no offer,
    /// compression disabled locally, or an offer that could not be parsed.
    pub fn negotiate(&self, header: &str) -> Option<DeflateParams> {
        match self.try_negotiate(header) {
            Ok(params) => params,
            Err(e) => {
                debug!(error = %e, header, "declining permessage-deflate");
                None
            }
        }
    }

    /// Like [`negotiate`](Self::negotiate) but reports why an offer was declined.
    ///
    /// Offers are tried in order; the first acceptable one wins. If none is
    /// acceptable, the first parse error is returned.
    pub fn try_negotiate(&self, header: &str) -> Result<Option<DeflateParams>, NegotiationError> {
        if !self.config.enabled {
            return Ok(None);
        }

        let mut first_error = None;
        for extension in header.split(',') {
            let mut parts = extension.split(';');
            let name = parts.next().unwrap_or_default().trim();
            if name.is_empty() {
                first_error.get_or_insert(NegotiationError::Malformed(extension.trim().to_string()));
                continue;
            }
            if !name.eq_ignore_ascii_case(EXTENSION_NAME) {
                continue;
            }
            match parse_offer(parts) {
                Ok(offer) => return Ok(Some(self.accept(&offer))),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    fn accept(&self, offer: &Offer) -> DeflateParams {
        let local_server = clamp_bits(self.config.server_max_window_bits);
        let local_client = clamp_bits(self.config.client_max_window_bits);

        let server_max_window_bits = match offer.server_max_window_bits {
            Some(bits) if in_range(bits) => local_server.min(bits as u8),
            _ => local_server,
        };
        let client_max_window_bits = match offer.client_max_window_bits {
            // The client never said it can honour a smaller window.
            None => DEFAULT_WINDOW_BITS,
            Some(Some(bits)) if in_range(bits) => local_client.min(bits as u8),
            Some(_) => local_client,
        };

        DeflateParams {
            server_max_window_bits,
            client_max_window_bits,
            server_no_context_takeover: offer.server_no_context_takeover
                || self.config.server_no_context_takeover,
            client_no_context_takeover: offer.client_no_context_takeover
                || self.config.client_no_context_takeover,
        }
    }
}

fn in_range(bits: u32) -> bool {
    (MIN_WINDOW_BITS as u32..=MAX_WINDOW_BITS as u32).contains(&bits)
}

fn clamp_bits(bits: u8) -> u8 {
    bits.clamp(MIN_WINDOW_BITS, MAX_WINDOW_BITS)
}

fn parse_offer<'a>(params: impl Iterator<Item = &'a str>) -> Result<Offer, NegotiationError> {
    let mut offer = Offer::default();
    let mut seen: Vec<String> = Vec::new();

    for raw in params {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(NegotiationError::Malformed("empty parameter".to_string()));
        }
        let (name, value) = match raw.split_once('=') {
            Some((name, value)) => (name.trim().to_ascii_lowercase(), Some(unquote(value.trim()))),
            None => (raw.to_ascii_lowercase(), None),
        };
        if seen.contains(&name) {
            return Err(NegotiationError::DuplicateParameter(name));
        }

        match name.as_str() {
            "server_no_context_takeover" | "client_no_context_takeover" => {
                if let Some(value) = value {
                    return Err(NegotiationError::InvalidValue {
                        param: name,
                        value: value.to_string(),
                    });
                }
                if name == "server_no_context_takeover" {
                    offer.server_no_context_takeover = true;
                } else {
                    offer.client_no_context_takeover = true;
                }
            }
            "server_max_window_bits" => {
                let value = value.ok_or_else(|| NegotiationError::InvalidValue {
                    param: name.clone(),
                    value: String::new(),
                })?;
                offer.server_max_window_bits = Some(parse_bits(&name, value)?);
            }
            "client_max_window_bits" => {
                offer.client_max_window_bits = Some(match value {
                    Some(value) => Some(parse_bits(&name, value)?),
                    None => None,
                });
            }
            _ => return Err(NegotiationError::UnknownParameter(name)),
        }
        seen.push(name);
    }

    Ok(offer)
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn parse_bits(param: &str, value: &str) -> Result<u32, NegotiationError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(NegotiationError::InvalidValue {
            param: param.to_string(),
            value: value.to_string(),
        });
    }
    value.parse().map_err(|_| NegotiationError::InvalidValue {
        param: param.to_string(),
        value: value.to_string(),
    })
}
