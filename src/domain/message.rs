//! Request/response envelope carried through the dispatch core.
//!
//! A [`Message`] is created by the caller, mutated by the dispatcher and the
//! worker that serves it, and handed back to the caller through the
//! [`ResponseCorrelator`](crate::queue::ResponseCorrelator).

use serde::{Deserialize, Serialize};

use super::TypeId;

/// Outcome code recorded in a message's system response.
///
/// The numeric codes are part of the external contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Outcome {
    /// Request served.
    #[default]
    Success = 0,
    /// Infrastructure failure (worker fault, exhausted pool, store error).
    SystemError = 1,
    /// The request itself is not acceptable.
    RequestError = 2,
    /// Unknown request type or missing factory.
    RegistrationError = 3,
}

impl Outcome {
    /// Returns the numeric outcome code.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Returns `true` for [`Outcome::Success`].
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Caller-facing and internal identifiers of one request.
///
/// `internal_id` is the correlation key used by the response correlator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    /// Identifier supplied by the external client.
    pub external_id: String,
    /// Process-local correlation id (`0` means "not yet assigned").
    pub internal_id: u64,
}

/// Outcome plus human-readable detail.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemResponse {
    /// Outcome code.
    pub outcome: Outcome,
    /// Detail text (empty on success).
    pub text: String,
}

/// A typed compute request and, once served, its response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Request type; resolved to a worker group by the processor directory.
    pub type_id: TypeId,
    /// External and internal identifiers.
    pub sequence: Sequence,
    /// Request payload, opaque to the dispatch core.
    pub request: serde_json::Value,
    /// Response payload written by the worker.
    pub response: serde_json::Value,
    /// Outcome of serving the request.
    pub system_response: SystemResponse,
}

impl Message {
    /// Creates an unsequenced message carrying `request`.
    #[must_use]
    pub fn new(type_id: TypeId, request: serde_json::Value) -> Self {
        Self {
            type_id,
            sequence: Sequence::default(),
            request,
            response: serde_json::Value::Null,
            system_response: SystemResponse::default(),
        }
    }

    /// Sets the external client id, returning the updated message.
    #[must_use]
    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.sequence.external_id = external_id.into();
        self
    }

    /// Sets the internal correlation id, returning the updated message.
    #[must_use]
    pub fn with_internal_id(mut self, internal_id: u64) -> Self {
        self.sequence.internal_id = internal_id;
        self
    }

    /// Returns the request type.
    #[must_use]
    pub const fn msg_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the correlation key (`sequence.internal_id`).
    #[must_use]
    pub const fn correlation_id(&self) -> u64 {
        self.sequence.internal_id
    }

    /// Returns the sequence.
    #[must_use]
    pub const fn sequence(&self) -> &Sequence {
        &self.sequence
    }

    /// Replaces the sequence.
    pub fn set_sequence(&mut self, sequence: Sequence) {
        self.sequence = sequence;
    }

    /// Returns the system response.
    #[must_use]
    pub const fn system_response(&self) -> &SystemResponse {
        &self.system_response
    }

    /// Replaces the system response.
    pub fn set_system_response(&mut self, system_response: SystemResponse) {
        self.system_response = system_response;
    }

    /// Records a failed outcome with detail text.
    pub fn fail(&mut self, outcome: Outcome, text: impl Into<String>) {
        self.system_response = SystemResponse {
            outcome,
            text: text.into(),
        };
    }

    /// Returns the recorded outcome.
    #[must_use]
    pub const fn outcome(&self) -> Outcome {
        self.system_response.outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_codes_are_stable() {
        assert_eq!(Outcome::Success.code(), 0);
        assert_eq!(Outcome::SystemError.code(), 1);
        assert_eq!(Outcome::RequestError.code(), 2);
        assert_eq!(Outcome::RegistrationError.code(), 3);
    }

    #[test]
    fn new_message_defaults_to_success_and_unsequenced() {
        let msg = Message::new(TypeId::new(3), serde_json::json!({"strike": 100.0}));
        assert_eq!(msg.correlation_id(), 0);
        assert!(msg.outcome().is_success());
        assert!(msg.response.is_null());
    }

    #[test]
    fn fail_records_outcome_and_text() {
        let mut msg = Message::new(TypeId::new(3), serde_json::Value::Null).with_internal_id(9);
        msg.fail(Outcome::RegistrationError, "no processor");
        assert_eq!(msg.outcome(), Outcome::RegistrationError);
        assert_eq!(msg.system_response().text, "no processor");
        assert_eq!(msg.correlation_id(), 9);
    }

    #[test]
    fn outcome_serializes_snake_case() {
        let json = serde_json::to_string(&Outcome::SystemError).ok();
        assert_eq!(json.as_deref(), Some("\"system_error\""));
    }
}
