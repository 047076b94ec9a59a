/*!
Builders for agent responses, always wrapped under `monitorResponse`.
*/

use chrono::Utc;
use serde_json::{json, Value};

fn wrap(body: Value) -> Value {
    json!({ "monitorResponse": body })
}

fn items(errors: &[Option<&str>]) -> Vec<Value> {
    errors
        .iter()
        .map(|e| match e {
            Some(message) => json!({ "errorMessage": message }),
            None => json!({}),
        })
        .collect()
}

/// `{errorResponse: [..]}` with no operation payload.
pub fn global_errors(messages: &[&str]) -> Value {
    wrap(json!({ "errorResponse": messages }))
}

/// Update answer for one entity array (`hostArray`, `instanceArray`...),
/// one element per entry of `errors`.
pub fn update(kind: &str, entity_key: &str, errors: &[Option<&str>]) -> Value {
    wrap(json!({ "updateWotaskdResponse": { kind: { entity_key: items(errors) } } }))
}

/// Overwrite / clear answer.
pub fn scalar_update(kind: &str, error: Option<&str>) -> Value {
    let node = match error {
        Some(message) => json!({ "errorMessage": message }),
        None => json!({}),
    };
    wrap(json!({ "updateWotaskdResponse": { kind: node } }))
}

/// Command answer: echo slot then one element per instance.
pub fn command(name: &str, errors: &[Option<&str>]) -> Value {
    let mut array = vec![json!(name)];
    array.extend(items(errors));
    wrap(json!({ "commandWotaskdResponse": array }))
}

pub fn instance_record(host: &str, port: u16, state: &str) -> Value {
    json!({
        "host": host,
        "port": port,
        "runningState": state,
        "refusingNewSessions": false,
        "statistics": { "transactions": 0, "activeSessions": 0 },
        "deaths": [],
    })
}

/// Same record with one death at the current time.
pub fn crashed_record(host: &str, port: u16) -> Value {
    let mut record = instance_record(host, port, "CRASHING");
    record["deaths"] = json!([Utc::now().to_rfc3339()]);
    record
}

pub fn instances(records: Vec<Value>) -> Value {
    wrap(json!({ "queryWotaskdResponse": { "instanceResponse": records } }))
}

pub fn host_status(statistics: Value) -> Value {
    wrap(json!({ "queryWotaskdResponse": { "hostResponse": statistics } }))
}

pub fn applications(counts: &[(&str, u32)]) -> Value {
    let records: Vec<Value> = counts
        .iter()
        .map(|(name, running)| json!({ "name": name, "runningInstances": running }))
        .collect();
    wrap(json!({ "queryWotaskdResponse": { "applicationResponse": records } }))
}
