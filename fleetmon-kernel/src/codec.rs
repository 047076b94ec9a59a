use crate::tree::Tree;
use serde_json::Value;

/// Root key wrapping every request sent to an agent.
pub const REQUEST_ROOT: &str = "monitorRequest";
/// Root key wrapping every response returned by an agent.
pub const RESPONSE_ROOT: &str = "monitorResponse";

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("payload has no `{0}` root object")]
    MissingRoot(&'static str),
}

/// Byte-level encoding of trees. Only the logical tree shape is part of the
/// agent protocol; the grammar belongs to the implementation.
pub trait WireCodec: Send + Sync {
    fn encode(&self, tree: &Tree) -> Vec<u8>;
    fn decode(&self, bytes: &[u8]) -> Result<Tree, DecodeError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl WireCodec for JsonCodec {
    fn encode(&self, tree: &Tree) -> Vec<u8> {
        // a Value only has string keys, serializing it cannot fail
        serde_json::to_vec(&Value::from(tree)).unwrap_or_default()
    }

    fn decode(&self, bytes: &[u8]) -> Result<Tree, DecodeError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Ok(Tree::from(value))
    }
}

/// Strips the `monitorResponse` root of a decoded payload.
pub fn unwrap_response_root(tree: Tree) -> Result<Tree, DecodeError> {
    match tree {
        Tree::Map(mut root) => match root.remove(RESPONSE_ROOT) {
            Some(body @ Tree::Map(_)) => Ok(body),
            _ => Err(DecodeError::MissingRoot(RESPONSE_ROOT)),
        },
        _ => Err(DecodeError::MissingRoot(RESPONSE_ROOT)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_then_decode() {
        let codec = JsonCodec;
        let tree = Tree::map([(REQUEST_ROOT, Tree::map([("queryWotaskd", Tree::str("HOST"))]))]);
        let bytes = codec.encode(&tree);
        assert_eq!(codec.decode(&bytes).unwrap(), tree);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(matches!(JsonCodec.decode(b"<xml>not json"), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_unwrap_response_root() {
        let wrapped = Tree::map([(RESPONSE_ROOT, Tree::map([("errorResponse", Tree::array(vec![]))]))]);
        let body = unwrap_response_root(wrapped).unwrap();
        assert!(body.get("errorResponse").is_some());

        let unrooted = Tree::map([("queryWotaskdResponse", Tree::empty_map())]);
        assert!(matches!(unwrap_response_root(unrooted), Err(DecodeError::MissingRoot(_))));
        assert!(unwrap_response_root(Tree::str("x")).is_err());
    }
}
