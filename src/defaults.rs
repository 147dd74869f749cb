//! Server-side defaulting and semantic spec comparison
//!
//! The API server fills in defaults on every write, so a live object never
//! looks exactly like the template it was created from. Comparing against the
//! defaulted template, and ignoring the difference between "absent" and
//! "empty", keeps the reconciler from rewriting objects that already match.
//!
//! The server omits `false` booleans (e.g. `clusterScope`) when it stores an
//! object, so `false` compares equal to absent. Numeric zero does not: every
//! integer field that the server omits when zero is filled in by the
//! defaulting routines below, and the remaining ones (`lendablePercent`,
//! `borrowingLimitPercent`, `nominalConcurrencyShares`) distinguish zero from
//! unset.

use k8s_openapi::api::flowcontrol::v1::{
    ExemptPriorityLevelConfiguration, FlowSchemaSpec, LimitedPriorityLevelConfiguration,
    PriorityLevelConfigurationSpec, QueuingConfiguration,
};
use serde::Serialize;
use serde_json::Value;

use crate::Error;

/// Matching precedence assigned when a FlowSchema leaves it unset or zero
pub const DEFAULT_MATCHING_PRECEDENCE: i32 = 1000;

/// Nominal concurrency shares of a limited priority level when unset
pub const DEFAULT_NOMINAL_CONCURRENCY_SHARES: i32 = 30;

/// Queue count of a queuing priority level when unset or zero
pub const DEFAULT_QUEUES: i32 = 64;

/// Hand size of a queuing priority level when unset or zero
pub const DEFAULT_HAND_SIZE: i32 = 8;

/// Queue length limit of a queuing priority level when unset or zero
pub const DEFAULT_QUEUE_LENGTH_LIMIT: i32 = 50;

/// Apply FlowSchema spec defaults in place
pub fn default_flow_schema_spec(spec: &mut FlowSchemaSpec) {
    default_if_zero(&mut spec.matching_precedence, DEFAULT_MATCHING_PRECEDENCE);
}

/// Apply PriorityLevelConfiguration spec defaults in place
pub fn default_priority_level_spec(spec: &mut PriorityLevelConfigurationSpec) {
    if let Some(exempt) = spec.exempt.as_mut() {
        default_exempt(exempt);
    }
    if let Some(limited) = spec.limited.as_mut() {
        default_limited(limited);
    }
}

fn default_exempt(exempt: &mut ExemptPriorityLevelConfiguration) {
    exempt.nominal_concurrency_shares.get_or_insert(0);
    exempt.lendable_percent.get_or_insert(0);
}

fn default_limited(limited: &mut LimitedPriorityLevelConfiguration) {
    limited
        .nominal_concurrency_shares
        .get_or_insert(DEFAULT_NOMINAL_CONCURRENCY_SHARES);
    limited.lendable_percent.get_or_insert(0);

    if let Some(queuing) = limited
        .limit_response
        .as_mut()
        .and_then(|response| response.queuing.as_mut())
    {
        default_queuing(queuing);
    }
}

fn default_queuing(queuing: &mut QueuingConfiguration) {
    default_if_zero(&mut queuing.queues, DEFAULT_QUEUES);
    default_if_zero(&mut queuing.hand_size, DEFAULT_HAND_SIZE);
    default_if_zero(&mut queuing.queue_length_limit, DEFAULT_QUEUE_LENGTH_LIMIT);
}

/// Non-pointer integer fields treat zero the same as unset
fn default_if_zero(field: &mut Option<i32>, default: i32) {
    if matches!(field, None | Some(0)) {
        *field = Some(default);
    }
}

/// Compare two values by content rather than representation
///
/// Both sides are serialized to JSON and normalized: object keys are
/// compared as maps, and `null`, `false`, `""`, `[]` and `{}` are all
/// treated as absent. List order is significant.
pub fn semantically_equal<A, B>(a: &A, b: &B) -> Result<bool, Error>
where
    A: Serialize + ?Sized,
    B: Serialize + ?Sized,
{
    let a = serde_json::to_value(a).map_err(|e| Error::serialization(e.to_string()))?;
    let b = serde_json::to_value(b).map_err(|e| Error::serialization(e.to_string()))?;
    Ok(normalize(a) == normalize(b))
}

fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key, normalize(value)))
                .filter(|(_, value)| !is_empty(value))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
        other => other,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
