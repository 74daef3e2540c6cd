//! Frame tags and the CONNECT payload

use crate::codec::CodecError;

/// Tag octet carried by every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Opens a data-bearing stream toward a `proto/address` target.
    Connect,
    /// Opens the heartbeat stream.
    KeepAlive,
    /// A reserved tag this implementation does not understand.
    Unknown(u8),
}

impl MessageType {
    pub fn as_u8(self) -> u8 {
        match self {
            MessageType::Connect => 1,
            MessageType::KeepAlive => 2,
            MessageType::Unknown(tag) => tag,
        }
    }
}

impl From<u8> for MessageType {
    fn from(tag: u8) -> Self {
        match tag {
            1 => MessageType::Connect,
            2 => MessageType::KeepAlive,
            other => MessageType::Unknown(other),
        }
    }
}

/// Parsed payload of a `Connect` frame.
///
/// The proto is a transport name (`tcp`, `udp`, `tcp4`, ...), optionally
/// carrying a dialer prefix as `"<prefix>::<proto>"`. The address is a
/// `host:port` resolvable by the receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    pub proto: String,
    pub address: String,
}

impl ConnectTarget {
    /// Splits on the first `/` only, so the proto may contain `::`.
    /// Both fields must be non-empty.
    pub fn parse(payload: &[u8]) -> Result<Self, CodecError> {
        let text = std::str::from_utf8(payload)
            .map_err(|_| CodecError::BadConnectTarget(String::from_utf8_lossy(payload).into_owned()))?;
        let (proto, address) = text
            .split_once('/')
            .ok_or_else(|| CodecError::BadConnectTarget(text.to_string()))?;
        if proto.is_empty() || address.is_empty() {
            return Err(CodecError::BadConnectTarget(text.to_string()));
        }
        Ok(Self {
            proto: proto.to_string(),
            address: address.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_round_trip() {
        assert_eq!(MessageType::from(1), MessageType::Connect);
        assert_eq!(MessageType::from(2), MessageType::KeepAlive);
        assert_eq!(MessageType::from(9), MessageType::Unknown(9));

        assert_eq!(MessageType::Connect.as_u8(), 1);
        assert_eq!(MessageType::KeepAlive.as_u8(), 2);
        assert_eq!(MessageType::Unknown(200).as_u8(), 200);
    }

    #[test]
    fn test_connect_target_parse() {
        let target = ConnectTarget::parse(b"tcp/example.test:80").unwrap();
        assert_eq!(target.proto, "tcp");
        assert_eq!(target.address, "example.test:80");
    }

    #[test]
    fn test_connect_target_prefixed_proto() {
        let target = ConnectTarget::parse(b"gateway::tcp/10.0.0.5:443").unwrap();
        assert_eq!(target.proto, "gateway::tcp");
        assert_eq!(target.address, "10.0.0.5:443");
    }

    #[test]
    fn test_connect_target_splits_on_first_slash() {
        let target = ConnectTarget::parse(b"unix//var/run/app.sock").unwrap();
        assert_eq!(target.proto, "unix");
        assert_eq!(target.address, "/var/run/app.sock");
    }

    #[test]
    fn test_connect_target_rejects_missing_slash() {
        assert!(ConnectTarget::parse(b"xy").is_err());
    }

    #[test]
    fn test_connect_target_rejects_empty_fields() {
        assert!(ConnectTarget::parse(b"/example.test:80").is_err());
        assert!(ConnectTarget::parse(b"tcp/").is_err());
        assert!(ConnectTarget::parse(b"").is_err());
    }
}
