/**
 * RESPONSE DECODER - Turns whatever a host sent back into a response tree
 *
 * ROLE : Never fails. Transport failures, empty payloads and garbage all
 * become a fixed sentinel tree carrying one `errorResponse` message, so the
 * error aggregator treats every outcome through the same path.
 */

use crate::codec::{unwrap_response_root, DecodeError, WireCodec};
use crate::transport::TransportError;
use crate::tree::Tree;

pub const ERROR_RESPONSE: &str = "errorResponse";
pub const EMPTY_RESPONSE_MESSAGE: &str = "INTERNAL ERROR: Response returned was null or empty";
pub const PARSE_FAILURE_MESSAGE: &str = "INTERNAL ERROR: Failed to parse response";

/// `{errorResponse: [message]}`, the already-unwrapped form of a sentinel.
pub fn sentinel(message: &str) -> Tree {
    Tree::map([(ERROR_RESPONSE, Tree::array(vec![Tree::str(message)]))])
}

pub fn empty_response() -> Tree {
    sentinel(EMPTY_RESPONSE_MESSAGE)
}

pub fn parse_failure() -> Tree {
    sentinel(PARSE_FAILURE_MESSAGE)
}

/// Why a host outcome produced no usable tree.
#[derive(Debug, thiserror::Error)]
pub enum Undecodable {
    #[error("empty response")]
    Empty,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("undecodable response: {0}")]
    Malformed(#[from] DecodeError),
}

impl Undecodable {
    /// The sentinel tree standing in for the missing response.
    pub fn sentinel(&self) -> Tree {
        match self {
            Undecodable::Empty | Undecodable::Transport(_) => empty_response(),
            Undecodable::Malformed(_) => parse_failure(),
        }
    }
}

/// Decodes one host outcome into the body found under `monitorResponse`.
pub fn try_decode(codec: &dyn WireCodec, outcome: Result<Vec<u8>, TransportError>) -> Result<Tree, Undecodable> {
    let bytes = outcome?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(Undecodable::Empty);
    }
    Ok(codec.decode(&bytes).and_then(unwrap_response_root)?)
}

/// Same as [`try_decode`] with failures replaced by their sentinel.
pub fn decode_response(codec: &dyn WireCodec, outcome: Result<Vec<u8>, TransportError>) -> Tree {
    try_decode(codec, outcome).unwrap_or_else(|e| e.sentinel())
}
