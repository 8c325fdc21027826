//! The remote-gateway handshake: the key-value preamble exchanged once, right
//! after TLS is established, over a TCP connection between two gateways (or
//! between a gateway and a directly-connecting client/server application).
//! Wire format: a 4-byte big-endian length prefix, then that many bytes of
//! `key SP value LF` lines.

use byteorder::{BigEndian, ByteOrder};
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("handshake frame shorter than its declared length")]
    Truncated,
    #[error("handshake line missing a key/value separator: {0:?}")]
    MalformedLine(String),
    #[error("missing required handshake key {0:?}")]
    MissingKey(&'static str),
}

/// One parsed handshake: the gateway's self-reported name, plus whichever of
/// `device`/`client`/`server` the peer included to identify its role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Handshake {
    pub gateway: String,
    pub device: Option<String>,
    pub client: Option<String>,
    pub server: Option<String>,
}

impl Handshake {
    pub fn for_gateway(gateway: impl Into<String>) -> Self {
        Handshake {
            gateway: gateway.into(),
            ..Default::default()
        }
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut lines = format!("gateway {}\n", self.gateway);
        if let Some(d) = &self.device {
            lines.push_str(&format!("device {}\n", d));
        }
        if let Some(c) = &self.client {
            lines.push_str(&format!("client {}\n", c));
        }
        if let Some(s) = &self.server {
            lines.push_str(&format!("server {}\n", s));
        }
        let body = lines.into_bytes();
        let mut out = Vec::with_capacity(4 + body.len());
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(&body);
        out
    }

    /// Parses a handshake frame *not including* the length prefix (the
    /// caller reads that many bytes off the socket first).
    pub fn parse(body: &[u8]) -> Result<Self, HandshakeError> {
        let text = String::from_utf8_lossy(body);
        let mut fields: BTreeMap<&str, &str> = BTreeMap::new();
        for line in text.lines() {
            if line.is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once(' ')
                .ok_or_else(|| HandshakeError::MalformedLine(line.to_string()))?;
            fields.insert(key, value);
        }
        let gateway = fields
            .get("gateway")
            .ok_or(HandshakeError::MissingKey("gateway"))?
            .to_string();
        Ok(Handshake {
            gateway,
            device: fields.get("device").map(|s| s.to_string()),
            client: fields.get("client").map(|s| s.to_string()),
            server: fields.get("server").map(|s| s.to_string()),
        })
    }

    /// Reads the 4-byte length prefix from the front of `buf`, returning the
    /// body length it declares.
    pub fn frame_len(buf: &[u8; 4]) -> u32 {
        BigEndian::read_u32(buf)
    }

    /// Splits a full `[len(4) | body]` buffer and parses it in one step.
    /// `Truncated` means the caller read fewer bytes than the prefix
    /// declared and should keep reading before retrying.
    pub fn parse_framed(buf: &[u8]) -> Result<Self, HandshakeError> {
        if buf.len() < 4 {
            return Err(HandshakeError::Truncated);
        }
        let declared = BigEndian::read_u32(&buf[0..4]) as usize;
        let body = buf.get(4..4 + declared).ok_or(HandshakeError::Truncated)?;
        Self::parse(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_gateway_only() {
        let h = Handshake::for_gateway("beetle-1");
        let framed = h.pack();
        let declared = Handshake::frame_len(&framed[0..4].try_into().unwrap());
        let body = &framed[4..];
        assert_eq!(declared as usize, body.len());
        let parsed = Handshake::parse(body).unwrap();
        assert_eq!(parsed, h);
    }

    #[test]
    fn round_trips_with_device_key() {
        let mut h = Handshake::for_gateway("beetle-2");
        h.device = Some("7".to_string());
        let framed = h.pack();
        let parsed = Handshake::parse(&framed[4..]).unwrap();
        assert_eq!(parsed.device.as_deref(), Some("7"));
    }

    #[test]
    fn missing_gateway_key_is_rejected() {
        assert!(matches!(
            Handshake::parse(b"device 1\n"),
            Err(HandshakeError::MissingKey("gateway"))
        ));
    }

    #[test]
    fn parse_framed_reports_truncation() {
        let h = Handshake::for_gateway("beetle-3");
        let framed = h.pack();
        assert!(matches!(
            Handshake::parse_framed(&framed[..framed.len() - 1]),
            Err(HandshakeError::Truncated)
        ));
        assert_eq!(Handshake::parse_framed(&framed).unwrap(), h);
    }

    #[test]
    fn malformed_line_is_rejected() {
        assert!(matches!(
            Handshake::parse(b"gateway\n"),
            Err(HandshakeError::MalformedLine(_))
        ));
    }
}
