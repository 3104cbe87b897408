use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::IngestOutcome;

/// Response body for `POST /send-message`.
///
/// Each backend step is reported on its own; `errors` names the failed
/// steps. The request counts as accepted when `appended` is true.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendMessageResponse {
    pub message_id: Uuid,
    pub persisted: bool,
    pub cached: bool,
    pub appended: bool,
    pub errors: Vec<StepError>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepError {
    pub step: String,
    pub error: String,
}

impl From<&IngestOutcome> for SendMessageResponse {
    fn from(outcome: &IngestOutcome) -> Self {
        Self {
            message_id: outcome.record.message_id,
            persisted: outcome.is_persisted(),
            cached: outcome.is_cached(),
            appended: outcome.is_durable(),
            errors: outcome
                .errors()
                .into_iter()
                .map(|(step, e)| StepError {
                    step: step.to_string(),
                    error: e.to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
    pub connections: usize,
}
