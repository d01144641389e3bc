//! Tests for response normalization.

use super::*;
use serde_json::json;
use std::time::Duration;

fn query_error(request_id: &str, code: &str, message: &str) -> RawResponse {
    RawResponse::new(
        400,
        json!({
            "Error": { "Type": "Sender", "Code": code, "Message": message },
            "RequestId": request_id
        }),
    )
}

mod classification {
    use super::*;

    #[test]
    fn test_success_carries_payload_and_request_id() {
        let normalizer = ResponseNormalizer::new();
        let raw = RawResponse::ok(json!({ "QueueUrls": [] })).with_request_id("req-1");

        let normalized = normalizer.normalize(Ok(raw));

        assert!(normalized.is_success());
        assert_eq!(normalized.request_id(), "req-1");
        assert_eq!(normalized.payload(), Some(&json!({ "QueueUrls": [] })));
        assert!(normalized.error().is_none());
    }

    #[test]
    fn test_query_error_envelope() {
        let normalizer = ResponseNormalizer::new();

        let normalized = normalizer.normalize(Ok(query_error(
            "req-err",
            "AWS.SimpleQueueService.NonExistentQueue",
            "The specified queue does not exist.",
        )));

        assert!(!normalized.is_success());
        assert!(normalized.payload().is_none());
        let error = normalized.error().unwrap();
        assert_eq!(error.request_id, "req-err");
        assert_eq!(error.code, "AWS.SimpleQueueService.NonExistentQueue");
        assert_eq!(error.message, "The specified queue does not exist.");
    }

    #[test]
    fn test_wrapped_query_error_envelope() {
        let normalizer = ResponseNormalizer::new();
        let raw = RawResponse::new(
            403,
            json!({
                "ErrorResponse": {
                    "Error": { "Code": "SignatureDoesNotMatch", "Message": "bad signature" },
                    "RequestId": "req-wrapped"
                }
            }),
        );

        let normalized = normalizer.normalize(Ok(raw));

        let error = normalized.error().unwrap();
        assert_eq!(error.request_id, "req-wrapped");
        assert_eq!(error.code, "SignatureDoesNotMatch");
    }

    #[test]
    fn test_json_protocol_error_envelope() {
        let normalizer = ResponseNormalizer::new();
        let raw = RawResponse::new(
            400,
            json!({
                "__type": "com.amazonaws.sqs#QueueDoesNotExist",
                "message": "The specified queue does not exist."
            }),
        )
        .with_request_id("req-json");

        let normalized = normalizer.normalize(Ok(raw));

        let error = normalized.error().unwrap();
        assert_eq!(error.request_id, "req-json");
        assert_eq!(error.code, "QueueDoesNotExist");
        assert_eq!(error.message, "The specified queue does not exist.");
    }

    #[test]
    fn test_missing_error_fields_fall_back_to_unknown() {
        let normalizer = ResponseNormalizer::new();

        let normalized = normalizer.normalize(Ok(RawResponse::new(500, json!({}))));

        let error = normalized.error().unwrap();
        assert_eq!(error.request_id, "");
        assert_eq!(error.code, "Unknown");
        assert_eq!(error.message, "Unknown error");
    }

    #[test]
    fn test_request_id_from_response_metadata() {
        let normalizer = ResponseNormalizer::new();
        let raw = RawResponse::ok(json!({
            "ResponseMetadata": { "RequestId": "req-meta" }
        }));

        let normalized = normalizer.normalize(Ok(raw));
        assert_eq!(normalized.request_id(), "req-meta");
    }

    #[test]
    fn test_transport_failure_is_normalized() {
        let normalizer = ResponseNormalizer::new();

        let normalized = normalizer.normalize(Err(TransportError::Timeout {
            duration: Duration::from_secs(30),
        }));

        assert!(!normalized.is_success());
        let error = normalized.error().unwrap();
        assert_eq!(error.request_id, "");
        assert_eq!(error.code, "RequestTimeout");
    }
}

mod recorded_state {
    use super::*;

    #[test]
    fn test_initial_state_is_empty() {
        let normalizer = ResponseNormalizer::new();
        assert_eq!(normalizer.last_request_id(), "");
        assert_eq!(normalizer.last_error(), None);
    }

    #[test]
    fn test_failure_is_recorded_then_cleared_by_success() {
        let normalizer = ResponseNormalizer::new();

        normalizer.normalize(Ok(query_error("req-1", "InvalidParameterValue", "bad")));
        assert_eq!(normalizer.last_request_id(), "req-1");
        let error = normalizer.last_error().unwrap();
        assert_eq!(error.code, "InvalidParameterValue");

        normalizer.normalize(Ok(RawResponse::ok(json!({})).with_request_id("req-2")));
        assert_eq!(normalizer.last_request_id(), "req-2");
        assert_eq!(normalizer.last_error(), None);
    }

    #[test]
    fn test_later_failure_replaces_earlier_failure() {
        let normalizer = ResponseNormalizer::new();

        normalizer.normalize(Ok(query_error("req-1", "First", "first failure")));
        normalizer.normalize(Ok(query_error("req-2", "Second", "second failure")));

        let error = normalizer.last_error().unwrap();
        assert_eq!(error.request_id, "req-2");
        assert_eq!(error.code, "Second");
    }

    #[test]
    fn test_request_id_overwritten_even_when_absent() {
        let normalizer = ResponseNormalizer::new();

        normalizer.normalize(Ok(RawResponse::ok(json!({})).with_request_id("req-1")));
        normalizer.normalize(Err(TransportError::ConnectionFailed {
            message: "refused".to_string(),
        }));

        assert_eq!(normalizer.last_request_id(), "");
    }

    #[test]
    fn test_error_display_concatenates_fields() {
        let error = OperationError {
            request_id: "req-9".to_string(),
            code: "AccessDenied".to_string(),
            message: "not allowed".to_string(),
        };
        assert_eq!(error.to_string(), "req-9 AccessDenied not allowed");
    }
}

mod payload_helpers {
    use super::*;

    #[test]
    fn test_result_node_unwraps_query_result() {
        let wrapped = json!({ "CreateQueueResult": { "QueueUrl": "u" } });
        assert_eq!(
            result_node(&wrapped, "CreateQueueResult"),
            &json!({ "QueueUrl": "u" })
        );

        let flat = json!({ "QueueUrl": "u" });
        assert_eq!(result_node(&flat, "CreateQueueResult"), &flat);
    }

    #[test]
    fn test_one_or_many() {
        let many = json!(["a", "b"]);
        let one = json!("a");
        assert_eq!(one_or_many(Some(&many)).len(), 2);
        assert_eq!(one_or_many(Some(&one)), vec![&json!("a")]);
        assert!(one_or_many(None).is_empty());
        assert!(one_or_many(Some(&Value::Null)).is_empty());
    }
}

mod logging {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};
    use tracing::field::{Field, Visit};
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    #[derive(Debug, Clone)]
    struct Captured {
        level: Level,
        fields: BTreeMap<String, String>,
    }

    #[derive(Clone, Default)]
    struct CaptureLayer {
        events: Arc<Mutex<Vec<Captured>>>,
    }

    struct FieldRecorder<'a>(&'a mut BTreeMap<String, String>);

    impl Visit for FieldRecorder<'_> {
        fn record_str(&mut self, field: &Field, value: &str) {
            self.0.insert(field.name().to_string(), value.to_string());
        }

        fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
            self.0
                .insert(field.name().to_string(), format!("{:?}", value));
        }
    }

    impl<S: Subscriber> Layer<S> for CaptureLayer {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut fields = BTreeMap::new();
            event.record(&mut FieldRecorder(&mut fields));
            self.events.lock().unwrap().push(Captured {
                level: *event.metadata().level(),
                fields,
            });
        }
    }

    fn capture(outcome: TransportResult) -> Vec<Captured> {
        let layer = CaptureLayer::default();
        let events = layer.events.clone();
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            ResponseNormalizer::new().normalize(outcome);
        });

        let captured = events.lock().unwrap().clone();
        captured
    }

    #[test]
    fn test_failure_is_logged_at_error_level_on_sqs_channel() {
        let events = capture(Ok(query_error("req-err", "Code", "Message")));

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.level, Level::ERROR);
        assert_eq!(event.fields["channel"], "sqs");
        assert_eq!(event.fields["request_id"], "req-err");
        assert_eq!(event.fields["code"], "Code");
        assert_eq!(event.fields["message"], "req-err Code Message");
    }

    #[test]
    fn test_transport_failure_is_logged_with_empty_request_id() {
        let events = capture(Err(TransportError::Timeout {
            duration: Duration::from_secs(5),
        }));

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, Level::ERROR);
        assert_eq!(events[0].fields["channel"], "sqs");
        assert_eq!(events[0].fields["request_id"], "");
    }

    #[test]
    fn test_success_logs_no_error() {
        let events = capture(Ok(RawResponse::ok(json!({})).with_request_id("req-ok")));

        assert!(events.iter().all(|e| e.level != Level::ERROR));
    }
}
