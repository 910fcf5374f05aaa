/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! JSON values whose numbers need every bit of their precision to survive storage.

use rand_core::{OsRng, RngCore};
use serde_json::{json, Value};

/// `n` finite floats: a few known hard cases followed by floats with uniformly random bit patterns.
pub(crate) fn full_precision_floats(n: usize) -> Vec<f64> {
    let mut floats = vec![
        f64::from_bits(0x305f050c368dcc74),
        0.1 + 0.2,
        f64::MIN_POSITIVE,
        f64::MAX,
        -f64::EPSILON,
        5e-324,
    ];
    while floats.len() < n {
        let float = f64::from_bits(OsRng.next_u64());
        if float.is_finite() {
            floats.push(float);
        }
    }
    floats.truncate(n);
    floats
}

/// A nested object in the shape of an exchange balance report, carrying `floats` at several depths.
pub(crate) fn balance_report(floats: &[f64]) -> Value {
    let exchanges: serde_json::Map<String, Value> = floats
        .chunks(4)
        .enumerate()
        .map(|(i, chunk)| {
            (
                format!("exchange_{i}"),
                json!({
                    "usdc": chunk[0],
                    "assets": chunk.iter().map(|amount| json!({"amount": amount})).collect::<Vec<_>>(),
                    "limits": [u64::MAX, i64::MIN, chunk.len()],
                }),
            )
        })
        .collect();
    Value::Object(exchanges)
}

/// Every float in `value`, in the order they appear.
pub(crate) fn floats_in(value: &Value) -> Vec<f64> {
    match value {
        Value::Number(number) if number.is_f64() => number.as_f64().into_iter().collect(),
        Value::Array(values) => values.iter().flat_map(floats_in).collect(),
        Value::Object(entries) => entries.values().flat_map(floats_in).collect(),
        _ => Vec::new(),
    }
}
