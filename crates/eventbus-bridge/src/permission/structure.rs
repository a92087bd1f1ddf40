//! Structural subset match of a message body against a rule's `match`.

use serde_json::Value;

/// Whether `body` satisfies the partial document `predicate`.
///
/// - no predicate (or JSON `null`) matches anything
/// - no body matches anything; listen checks on `register` carry no body
/// - otherwise the body must be an object holding every predicate field with
///   an equal value, nested objects compared the same way
pub fn structure_matches(predicate: Option<&Value>, body: Option<&Value>) -> bool {
    let predicate = match predicate {
        None | Some(Value::Null) => return true,
        Some(Value::Object(predicate)) => predicate,
        // Rejected at configuration time
        Some(_) => return false,
    };

    let Some(body) = body else {
        return true;
    };

    match body {
        Value::Object(body) => predicate.iter().all(|(field, expected)| {
            body.get(field)
                .is_some_and(|actual| field_matches(expected, actual))
        }),
        _ => false,
    }
}

fn field_matches(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Object(expected), Value::Object(actual)) => expected
            .iter()
            .all(|(field, value)| actual.get(field).is_some_and(|a| field_matches(value, a))),
        (Value::Object(_), _) => false,
        (expected, actual) => expected == actual,
    }
}
