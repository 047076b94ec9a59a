/**
 * ERROR AGGREGATOR - Flattens every kind of failure into plain strings
 *
 * ROLE : Walks the responses of one broadcast and pulls out
 *   - the top-level `errorResponse` array (transport, decode or agent-global errors)
 *   - the per-item `errorMessage` fields of the operation-specific sub-tree
 * and merges them, in order and without duplicates, into the caller's sink.
 *
 * A missing sub-key means "no errors from that host", never a failure.
 */

use crate::decoder::ERROR_RESPONSE;
use crate::envelope::{EntityKind, Envelope, QueryKind};
use crate::tree::Tree;
use serde::Serialize;

pub const ERROR_MESSAGE: &str = "errorMessage";

/// Destination of aggregated errors, owned by the caller (operator session,
/// HTTP request, poll cycle...). Written, never read back.
pub trait ErrorSink: Send {
    /// Appends every message not already present, keeping order.
    fn add_errors(&mut self, errors: &[String]);
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ErrorLog {
    errors: Vec<String>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn into_errors(self) -> Vec<String> {
        self.errors
    }
}

impl ErrorSink for ErrorLog {
    fn add_errors(&mut self, errors: &[String]) {
        for error in errors {
            if !self.errors.contains(error) {
                self.errors.push(error.clone());
            }
        }
    }
}

fn push_message(node: &Tree, out: &mut Vec<String>) {
    if let Some(message) = node.get(ERROR_MESSAGE).and_then(Tree::to_message) {
        out.push(message);
    }
}

/// Reads `errorMessage` from each element of an array node, or from the node
/// itself when an agent answered a single map.
fn push_item_messages(node: &Tree, out: &mut Vec<String>) {
    match node {
        Tree::Array(items) => items.iter().for_each(|item| push_message(item, out)),
        Tree::Map(_) => push_message(node, out),
        Tree::Scalar(_) => {}
    }
}

/// Entries of the top-level `errorResponse` array.
pub fn global_errors(response: &Tree) -> Vec<String> {
    match response.get(ERROR_RESPONSE) {
        Some(Tree::Array(items)) => items.iter().filter_map(Tree::to_message).collect(),
        Some(scalar) => scalar.to_message().into_iter().collect(),
        None => Vec::new(),
    }
}

/// Per-item errors of an add / remove / configure answer, only for the
/// entity kinds that were part of the request.
pub fn update_errors(answer: &Tree, operation_key: &str, kinds: &[EntityKind]) -> Vec<String> {
    let mut out = Vec::new();
    let Some(node) = answer.get(operation_key) else {
        return out;
    };
    for kind in kinds {
        if let Some(entity) = node.get(kind.key()) {
            push_item_messages(entity, &mut out);
        }
    }
    out
}

/// Overwrite and clear answer with a single `errorMessage` node.
pub fn scalar_update_errors(answer: &Tree, operation_key: &str) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(node) = answer.get(operation_key) {
        push_message(node, &mut out);
    }
    out
}

/// Command answers are a flat array; slot 0 echoes the command and is skipped.
pub fn command_errors(answer: &Tree) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(items) = answer.as_array() {
        items.iter().skip(1).for_each(|item| push_message(item, &mut out));
    }
    out
}

pub fn query_errors(answer: &Tree, kind: QueryKind) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(node) = answer.get(kind.response_key()) {
        push_item_messages(node, &mut out);
    }
    out
}

/// Every error carried by the responses to `envelope`, host by host. The
/// operation answer is read under [`Envelope::response_key`].
pub fn collect_errors(envelope: &Envelope, responses: &[Tree]) -> Vec<String> {
    let mut out = Vec::new();
    for response in responses {
        out.extend(global_errors(response));
        let Some(answer) = response.get(envelope.response_key()) else {
            continue;
        };
        match envelope {
            Envelope::Update { kind, targets } => {
                out.extend(update_errors(answer, kind.operation().key(), &targets.kinds()))
            }
            Envelope::Overwrite { .. } | Envelope::Clear => {
                out.extend(scalar_update_errors(answer, envelope.operation().key()))
            }
            Envelope::Command { .. } => out.extend(command_errors(answer)),
            Envelope::Query(kind) => out.extend(query_errors(answer, *kind)),
        }
    }
    out
}

/// Collects and merges into `sink`. Returns how many strings were extracted.
pub fn aggregate(envelope: &Envelope, responses: &[Tree], sink: &mut dyn ErrorSink) -> usize {
    let errors = collect_errors(envelope, responses);
    if !errors.is_empty() {
        tracing::debug!(operation = envelope.operation().key(), ?errors, "agent errors");
        sink.add_errors(&errors);
    }
    errors.len()
}
