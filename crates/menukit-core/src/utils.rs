use std::{future::Future, time::Duration};

use serde_json::Value;

use crate::{errors::Error, Result};

/// Run `fut` with an upper bound on its duration.
///
/// On expiry the future is dropped (cancelled at its current await point) and
/// `on_timeout` builds the error to return.
pub async fn bounded<T, F>(limit: Duration, fut: F, on_timeout: impl FnOnce() -> Error) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_elapsed) => Err(on_timeout()),
    }
}

/// Combine the previous loader arguments with a partial override.
///
/// Object + object is a shallow merge (override keys win). Any other shape
/// means the override replaces the previous value entirely.
pub fn merge_args(previous: Option<Value>, partial: Option<Value>) -> Value {
    match (previous, partial) {
        (Some(Value::Object(mut prev)), Some(Value::Object(over))) => {
            for (k, v) in over {
                prev.insert(k, v);
            }
            Value::Object(prev)
        }
        (_, Some(over)) => over,
        (Some(prev), None) => prev,
        (None, None) => Value::Null,
    }
}
