//! Cookie daemon wire format
//!
//! One request per packet on a `SOCK_SEQPACKET` socket, so no length prefix
//! is needed. Every field is NUL-terminated:
//!
//! ```text
//! GET\0<scheme>\0<host>\0<path>\0
//! PUT\0<scheme>\0<domain>\0<path>\0<name>=<value>\0
//! ```
//!
//! The reply is one packet holding the cookie header (possibly empty)
//! followed by a NUL. A `PUT` is acknowledged with a lone NUL.

use crate::error::ProtocolError;

/// Largest packet either side reads in one go
pub const MAX_PACKET_SIZE: usize = 8192;

/// A request sent to the cookie daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieRequest {
    Get {
        scheme: String,
        host: String,
        path: String,
    },
    Put {
        scheme: String,
        domain: String,
        path: String,
        /// `name=value`
        cookie: String,
    },
}

impl CookieRequest {
    pub fn get(scheme: &str, host: &str, path: &str) -> Self {
        CookieRequest::Get {
            scheme: scheme.to_string(),
            host: host.to_string(),
            path: path.to_string(),
        }
    }

    pub fn put(scheme: &str, domain: &str, path: &str, cookie: &str) -> Self {
        CookieRequest::Put {
            scheme: scheme.to_string(),
            domain: domain.to_string(),
            path: path.to_string(),
            cookie: cookie.to_string(),
        }
    }

    pub fn command(&self) -> &'static str {
        match self {
            CookieRequest::Get { .. } => "GET",
            CookieRequest::Put { .. } => "PUT",
        }
    }

    /// Encode as one packet
    pub fn encode(&self) -> Vec<u8> {
        let fields: Vec<&str> = match self {
            CookieRequest::Get { scheme, host, path } => {
                vec!["GET", scheme.as_str(), host.as_str(), path.as_str()]
            }
            CookieRequest::Put {
                scheme,
                domain,
                path,
                cookie,
            } => vec!["PUT", scheme.as_str(), domain.as_str(), path.as_str(), cookie.as_str()],
        };

        let mut packet = Vec::with_capacity(fields.iter().map(|f| f.len() + 1).sum());
        for field in fields {
            packet.extend_from_slice(field.as_bytes());
            packet.push(0);
        }
        packet
    }

    /// Decode one packet. The final NUL may be missing.
    pub fn decode(packet: &[u8]) -> Result<Self, ProtocolError> {
        let body = packet.strip_suffix(&[0]).unwrap_or(packet);
        let fields: Vec<String> = body
            .split(|&b| b == 0)
            .map(|field| String::from_utf8_lossy(field).into_owned())
            .collect();

        match fields.as_slice() {
            [command, scheme, host, path] if command == "GET" => Ok(CookieRequest::Get {
                scheme: scheme.clone(),
                host: host.clone(),
                path: path.clone(),
            }),
            [command, scheme, domain, path, cookie] if command == "PUT" => {
                Ok(CookieRequest::Put {
                    scheme: scheme.clone(),
                    domain: domain.clone(),
                    path: path.clone(),
                    cookie: cookie.clone(),
                })
            }
            [command, ..] if command != "GET" && command != "PUT" => Err(
                ProtocolError::Malformed(format!("unknown cookie command {:?}", command)),
            ),
            _ => Err(ProtocolError::Malformed(format!(
                "partial cookie request ({} fields)",
                fields.len()
            ))),
        }
    }
}

/// Encode a reply packet
pub fn encode_reply(body: &str) -> Vec<u8> {
    let mut packet = Vec::with_capacity(body.len() + 1);
    packet.extend_from_slice(body.as_bytes());
    packet.push(0);
    packet
}

/// Decode a reply packet: everything up to the first NUL
pub fn decode_reply(packet: &[u8]) -> String {
    let end = packet.iter().position(|&b| b == 0).unwrap_or(packet.len());
    String::from_utf8_lossy(&packet[..end]).into_owned()
}
