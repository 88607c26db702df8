//! Wire format of inter-node requests and replies.
//!
//! ```text
//! request: <messageType>|<correlationId or ->|<replyChannel or ->|<field>...
//! reply:   <correlationId>|<body>
//! notice:  cleanup:<key>
//! ```
//!
//! `|` separates fields, so no field may contain it. Trade ids, player ids,
//! node ids and store keys never do.

use std::fmt;

use thiserror::Error;

/// Field separator on the wire.
pub const SEPARATOR: char = '|';

/// Placeholder for an absent correlation id or reply channel.
const ABSENT: &str = "-";

const CLEANUP_PREFIX: &str = "cleanup:";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("unknown message type: {0}")]
    UnknownKind(String),

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("field contains the reserved separator: {0}")]
    ReservedSeparator(String),

    #[error("malformed message: {0}")]
    Malformed(String),
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Inter-node request types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    TradeRequest,
    TradeAccept,
    TradeDeny,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::TradeRequest => "trade_request",
            MessageKind::TradeAccept => "trade_accept",
            MessageKind::TradeDeny => "trade_deny",
        }
    }

    pub fn parse(s: &str) -> Result<Self, EnvelopeError> {
        match s {
            "trade_request" => Ok(MessageKind::TradeRequest),
            "trade_accept" => Ok(MessageKind::TradeAccept),
            "trade_deny" => Ok(MessageKind::TradeDeny),
            other => Err(EnvelopeError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where and under which id the sender expects its reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correlation {
    pub id: String,
    pub reply_to: String,
}

/// A decoded inter-node request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub kind: MessageKind,
    /// `None` for fire-and-forget requests that expect no reply.
    pub correlation: Option<Correlation>,
    pub fields: Vec<String>,
}

impl Envelope {
    pub fn new(kind: MessageKind, fields: Vec<String>) -> Self {
        Self {
            kind,
            correlation: None,
            fields,
        }
    }

    pub fn with_correlation(mut self, id: impl Into<String>, reply_to: impl Into<String>) -> Self {
        self.correlation = Some(Correlation {
            id: id.into(),
            reply_to: reply_to.into(),
        });
        self
    }

    /// Returns field `index`, or `MissingField(name)` if the sender left it out.
    pub fn field(&self, index: usize, name: &'static str) -> Result<&str, EnvelopeError> {
        self.fields
            .get(index)
            .map(String::as_str)
            .ok_or(EnvelopeError::MissingField(name))
    }

    pub fn encode(&self) -> Result<String, EnvelopeError> {
        let (id, reply_to) = match &self.correlation {
            Some(c) => (c.id.as_str(), c.reply_to.as_str()),
            None => (ABSENT, ABSENT),
        };
        let mut parts = Vec::with_capacity(3 + self.fields.len());
        parts.push(self.kind.as_str());
        parts.push(id);
        parts.push(reply_to);
        parts.extend(self.fields.iter().map(String::as_str));

        if let Some(bad) = parts.iter().skip(1).find(|p| p.contains(SEPARATOR)) {
            return Err(EnvelopeError::ReservedSeparator((*bad).to_string()));
        }
        Ok(parts.join("|"))
    }

    pub fn decode(raw: &str) -> Result<Self, EnvelopeError> {
        let mut parts = raw.split(SEPARATOR);
        let kind = MessageKind::parse(parts.next().unwrap_or_default())?;
        let id = parts
            .next()
            .ok_or(EnvelopeError::MissingField("correlationId"))?;
        let reply_to = parts
            .next()
            .ok_or(EnvelopeError::MissingField("replyChannel"))?;

        let correlation = match (id, reply_to) {
            (ABSENT, ABSENT) => None,
            (ABSENT, _) | (_, ABSENT) => {
                return Err(EnvelopeError::Malformed(
                    "correlation id and reply channel must be given together".into(),
                ))
            }
            (id, reply_to) => Some(Correlation {
                id: id.to_string(),
                reply_to: reply_to.to_string(),
            }),
        };

        Ok(Self {
            kind,
            correlation,
            fields: parts.map(str::to_string).collect(),
        })
    }
}

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

/// Body of a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ack,
    Rejected,
    Failed,
    /// Accept succeeded; the counterpart asset waits at `data_key`.
    Complete { data_key: String },
    /// Anything this node version does not understand.
    Other(String),
}

impl Reply {
    pub fn encode(&self) -> String {
        match self {
            Reply::Ack => "ACK".to_string(),
            Reply::Rejected => "REJECTED".to_string(),
            Reply::Failed => "FAILED".to_string(),
            Reply::Complete { data_key } => format!("COMPLETE|{}", data_key),
            Reply::Other(body) => body.clone(),
        }
    }

    pub fn decode(body: &str) -> Self {
        match body {
            "ACK" => Reply::Ack,
            "REJECTED" => Reply::Rejected,
            "FAILED" => Reply::Failed,
            other => match other.strip_prefix("COMPLETE|") {
                Some(key) if !key.is_empty() => Reply::Complete {
                    data_key: key.to_string(),
                },
                _ => Reply::Other(other.to_string()),
            },
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// `<correlationId>|<body>`
pub fn encode_reply(correlation_id: &str, reply: &Reply) -> String {
    format!("{}|{}", correlation_id, reply.encode())
}

/// Splits a raw reply into its correlation id and body.
pub fn decode_reply(raw: &str) -> Result<(&str, Reply), EnvelopeError> {
    let (id, body) = raw
        .split_once(SEPARATOR)
        .ok_or_else(|| EnvelopeError::Malformed(format!("reply without body: {}", raw)))?;
    Ok((id, Reply::decode(body)))
}

// ---------------------------------------------------------------------------
// Cleanup notices
// ---------------------------------------------------------------------------

/// `cleanup:<key>`, broadcast to ask every node to drop an orphaned key.
pub fn cleanup_notice(key: &str) -> String {
    format!("{}{}", CLEANUP_PREFIX, key)
}

/// Returns the key named by a cleanup notice.
pub fn parse_cleanup(raw: &str) -> Option<&str> {
    raw.strip_prefix(CLEANUP_PREFIX).filter(|key| !key.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_correlated_request() {
        let envelope = Envelope::new(
            MessageKind::TradeRequest,
            vec!["trade:t1".into(), "t1".into()],
        )
        .with_correlation("c1", "reply:n1:c1");

        let raw = envelope.encode().unwrap();
        assert_eq!(raw, "trade_request|c1|reply:n1:c1|trade:t1|t1");
        assert_eq!(Envelope::decode(&raw).unwrap(), envelope);
    }

    #[test]
    fn uncorrelated_request_uses_placeholders() {
        let envelope = Envelope::new(MessageKind::TradeDeny, vec!["t1".into(), "p2".into()]);
        let raw = envelope.encode().unwrap();
        assert_eq!(raw, "trade_deny|-|-|t1|p2");
        assert!(Envelope::decode(&raw).unwrap().correlation.is_none());
    }

    #[test]
    fn rejects_separator_inside_field() {
        let envelope = Envelope::new(MessageKind::TradeDeny, vec!["a|b".into()]);
        assert!(matches!(
            envelope.encode(),
            Err(EnvelopeError::ReservedSeparator(_))
        ));
    }

    #[test]
    fn decode_rejects_unknown_and_truncated() {
        assert!(matches!(
            Envelope::decode("trade_teleport|-|-|x"),
            Err(EnvelopeError::UnknownKind(_))
        ));
        assert!(matches!(
            Envelope::decode("trade_deny|c1"),
            Err(EnvelopeError::MissingField("replyChannel"))
        ));
        assert!(matches!(
            Envelope::decode("trade_deny|c1|-|t1"),
            Err(EnvelopeError::Malformed(_))
        ));
    }

    #[test]
    fn missing_field_is_named() {
        let envelope = Envelope::new(MessageKind::TradeAccept, vec!["k".into()]);
        assert_eq!(envelope.field(0, "dataKey").unwrap(), "k");
        assert_eq!(
            envelope.field(1, "tradeId"),
            Err(EnvelopeError::MissingField("tradeId"))
        );
    }

    #[test]
    fn reply_bodies() {
        assert_eq!(encode_reply("c1", &Reply::Ack), "c1|ACK");
        assert_eq!(
            decode_reply("c1|COMPLETE|tradedata:t1:requester").unwrap(),
            (
                "c1",
                Reply::Complete {
                    data_key: "tradedata:t1:requester".into()
                }
            )
        );
        assert_eq!(decode_reply("c1|REJECTED").unwrap().1, Reply::Rejected);
        assert_eq!(
            decode_reply("c1|WHATEVER").unwrap().1,
            Reply::Other("WHATEVER".into())
        );
        assert!(decode_reply("no-body").is_err());
    }

    #[test]
    fn cleanup_notices() {
        let notice = cleanup_notice("tradedata:t1:target");
        assert_eq!(notice, "cleanup:tradedata:t1:target");
        assert_eq!(parse_cleanup(&notice), Some("tradedata:t1:target"));
        assert_eq!(parse_cleanup("trade_completed|t1"), None);
        assert_eq!(parse_cleanup("cleanup:"), None);
    }
}
