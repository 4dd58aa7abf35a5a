// Invocation router - normalizes raw trigger payloads into commands.
//
// The pipeline is invoked three ways: a store change event (one per write),
// a manual single-record re-check, and a manual bulk sweep. The trigger is a
// dynamically-shaped JSON object, so the shape is resolved exactly once here
// into tagged `ModerationCommand`s instead of being inspected ad hoc
// downstream.

use super::models::ModerationCommand;
use serde::Deserialize;
use thiserror::Error;

/// Expected `eventSource` value on change-event triggers.
const STREAM_EVENT_SOURCE: &str = "store-stream";

#[derive(Debug, Error)]
pub enum RouteError {
    /// Malformed or unrecognized invocation payload. Fatal: no records are
    /// processed and no partial result exists.
    #[error("invalid trigger: {0}")]
    InvalidTrigger(String),
}

/// The two top-level payload families: change events from the store stream,
/// and manual invocations carrying a `mode`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTrigger {
    ChangeEvent {
        #[serde(rename = "eventSource")]
        event_source: String,
        records: Vec<RawChange>,
    },
    Manual {
        mode: String,
        #[serde(rename = "recordId")]
        record_id: Option<String>,
        #[serde(rename = "continuationToken")]
        continuation_token: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct RawChange {
    id: String,
    #[serde(rename = "changeType")]
    change_type: String,
}

/// Classify a raw trigger into the commands it implies.
///
/// Change events yield one `SingleEvent` per INSERT/MODIFY record, in the
/// order received. Deletions carry nothing left to moderate and are skipped.
pub fn route(trigger: &serde_json::Value) -> Result<Vec<ModerationCommand>, RouteError> {
    let raw: RawTrigger = serde_json::from_value(trigger.clone())
        .map_err(|e| RouteError::InvalidTrigger(format!("unrecognized payload shape: {e}")))?;

    match raw {
        RawTrigger::ChangeEvent {
            event_source,
            records,
        } => {
            if event_source != STREAM_EVENT_SOURCE {
                return Err(RouteError::InvalidTrigger(format!(
                    "unknown event source '{event_source}'"
                )));
            }

            let mut commands = Vec::new();
            for change in records {
                if change.id.is_empty() {
                    return Err(RouteError::InvalidTrigger(
                        "change record with empty id".to_string(),
                    ));
                }
                match change.change_type.as_str() {
                    "INSERT" | "MODIFY" => commands.push(ModerationCommand::SingleEvent {
                        record_id: change.id,
                    }),
                    other => {
                        tracing::debug!(
                            record_id = %change.id,
                            change_type = other,
                            "skipping change type with nothing to moderate"
                        );
                    }
                }
            }

            if commands.is_empty() {
                return Err(RouteError::InvalidTrigger(
                    "change event carried no moderatable records".to_string(),
                ));
            }
            Ok(commands)
        }
        RawTrigger::Manual {
            mode,
            record_id,
            continuation_token,
        } => match mode.as_str() {
            "single" => match record_id {
                Some(id) if !id.is_empty() => {
                    Ok(vec![ModerationCommand::SingleLookup { record_id: id }])
                }
                _ => Err(RouteError::InvalidTrigger(
                    "mode 'single' requires a non-empty recordId".to_string(),
                )),
            },
            "sweep" => Ok(vec![ModerationCommand::BulkSweep { continuation_token }]),
            other => Err(RouteError::InvalidTrigger(format!("unknown mode '{other}'"))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn change_event_yields_one_command_per_record_in_order() {
        let trigger = json!({
            "eventSource": "store-stream",
            "records": [
                { "id": "a", "changeType": "INSERT" },
                { "id": "b", "changeType": "MODIFY" },
                { "id": "c", "changeType": "INSERT" },
            ]
        });
        let commands = route(&trigger).unwrap();
        assert_eq!(
            commands,
            vec![
                ModerationCommand::SingleEvent { record_id: "a".into() },
                ModerationCommand::SingleEvent { record_id: "b".into() },
                ModerationCommand::SingleEvent { record_id: "c".into() },
            ]
        );
    }

    #[test]
    fn change_event_skips_deletions() {
        let trigger = json!({
            "eventSource": "store-stream",
            "records": [
                { "id": "a", "changeType": "INSERT" },
                { "id": "b", "changeType": "REMOVE" },
            ]
        });
        let commands = route(&trigger).unwrap();
        assert_eq!(
            commands,
            vec![ModerationCommand::SingleEvent { record_id: "a".into() }]
        );
    }

    #[test]
    fn change_event_with_only_deletions_is_invalid() {
        let trigger = json!({
            "eventSource": "store-stream",
            "records": [{ "id": "b", "changeType": "REMOVE" }]
        });
        assert!(route(&trigger).is_err());
    }

    #[test]
    fn unknown_event_source_is_invalid() {
        let trigger = json!({
            "eventSource": "somewhere-else",
            "records": [{ "id": "a", "changeType": "INSERT" }]
        });
        assert!(route(&trigger).is_err());
    }

    #[test]
    fn single_mode_yields_one_lookup() {
        let trigger = json!({ "mode": "single", "recordId": "rec-7" });
        let commands = route(&trigger).unwrap();
        assert_eq!(
            commands,
            vec![ModerationCommand::SingleLookup { record_id: "rec-7".into() }]
        );
    }

    #[test]
    fn single_mode_without_record_id_is_invalid() {
        assert!(route(&json!({ "mode": "single" })).is_err());
        assert!(route(&json!({ "mode": "single", "recordId": "" })).is_err());
    }

    #[test]
    fn sweep_mode_yields_bulk_sweep() {
        let commands = route(&json!({ "mode": "sweep" })).unwrap();
        assert_eq!(
            commands,
            vec![ModerationCommand::BulkSweep { continuation_token: None }]
        );

        let commands = route(&json!({ "mode": "sweep", "continuationToken": "abc" })).unwrap();
        assert_eq!(
            commands,
            vec![ModerationCommand::BulkSweep {
                continuation_token: Some("abc".into())
            }]
        );
    }

    #[test]
    fn garbage_payloads_are_invalid() {
        for trigger in [
            json!({}),
            json!({ "mode": "dance" }),
            json!({ "eventSource": "store-stream" }),
            json!({ "records": [] }),
            json!("just a string"),
            json!(42),
        ] {
            assert!(route(&trigger).is_err(), "accepted: {trigger}");
        }
    }
}
