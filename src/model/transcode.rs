use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Separator between exchange and queue in the wire form of a [`ReplyAddress`].
pub const REPLY_ADDRESS_SEPARATOR: char = '|';

/// Request published to the transcoder exchange.
///
/// The transcoder converts `source_file_url` to FLAC, PUTs it to
/// `destination_file_url`, then publishes any message to
/// `respond_to.exchange` with routing key `respond_to.queue`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TranscodeRequest {
    pub source_file_url: String,
    pub destination_file_url: String,
    pub respond_to: ReplyAddress,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplyAddressError {
    #[error("reply address component '{0}' is empty")]
    Empty(&'static str),
    #[error("reply address {component} '{value}' contains the separator '|'")]
    ContainsSeparator {
        component: &'static str,
        value: String,
    },
    #[error("malformed reply address '{0}'")]
    Malformed(String),
}

/// Where the completion for one in-flight transcode must be published.
///
/// Structured internally; serialized as `"<exchange>|<queue>"` because that is
/// the token the transcoder echoes back. Neither component may contain the
/// separator, so the wire form always splits back into the same pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ReplyAddress {
    exchange: String,
    queue: String,
}

impl ReplyAddress {
    pub fn new(
        exchange: impl Into<String>,
        queue: impl Into<String>,
    ) -> Result<Self, ReplyAddressError> {
        let exchange = exchange.into();
        let queue = queue.into();
        check_component("exchange", &exchange)?;
        check_component("queue", &queue)?;
        Ok(Self { exchange, queue })
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Queue name, which is also the routing key the reply must carry.
    pub fn queue(&self) -> &str {
        &self.queue
    }
}

fn check_component(component: &'static str, value: &str) -> Result<(), ReplyAddressError> {
    if value.is_empty() {
        return Err(ReplyAddressError::Empty(component));
    }
    if value.contains(REPLY_ADDRESS_SEPARATOR) {
        return Err(ReplyAddressError::ContainsSeparator {
            component,
            value: value.to_string(),
        });
    }
    Ok(())
}

impl fmt::Display for ReplyAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.exchange, REPLY_ADDRESS_SEPARATOR, self.queue)
    }
}

impl FromStr for ReplyAddress {
    type Err = ReplyAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (exchange, queue) = s
            .split_once(REPLY_ADDRESS_SEPARATOR)
            .ok_or_else(|| ReplyAddressError::Malformed(s.to_string()))?;
        Self::new(exchange, queue)
    }
}

impl From<ReplyAddress> for String {
    fn from(address: ReplyAddress) -> Self {
        address.to_string()
    }
}

impl TryFrom<String> for ReplyAddress {
    type Error = ReplyAddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
