//! Tests for the protocol module
//!
//! These tests verify envelope normalization, the introspection snapshot
//! format, and the error types.

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::protocol::introspection;
    use serde_json::json;
    use std::error::Error as _;

    #[test]
    fn test_undefined_result_becomes_generic_success() {
        let envelope = Envelope::from_procedure_result("foo", None);
        assert_eq!(
            envelope.to_value(),
            json!({"success": true, "code": "SUCCESS", "message": "Success"})
        );
    }

    #[test]
    fn test_raw_result_is_wrapped_under_procedure_name() {
        let envelope = Envelope::from_procedure_result("sayHello", Some(json!("Hello world")));
        assert_eq!(
            envelope.to_value(),
            json!({"success": true, "code": "SUCCESS", "message": "Success", "sayHello": "Hello world"})
        );
    }

    #[test]
    fn test_falsy_values_are_wrapped() {
        for value in [json!(null), json!(0), json!(false), json!(""), json!([])] {
            let envelope = Envelope::from_procedure_result("p", Some(value.clone()));
            assert!(envelope.success);
            assert_eq!(envelope.get("p"), Some(&value));
        }
    }

    #[test]
    fn test_object_without_boolean_success_is_wrapped() {
        let raw = json!({"success": "yes", "value": 1});
        let envelope = Envelope::from_procedure_result("p", Some(raw.clone()));
        assert_eq!(envelope.code, codes::SUCCESS);
        assert_eq!(envelope.get("p"), Some(&raw));
    }

    #[test]
    fn test_envelope_passes_through_unchanged() {
        let raw = json!({"success": false, "code": "GATE_NOT_FOUND", "message": "Gate 3 was not found", "gate": null});
        let envelope = Envelope::from_procedure_result("getGate", Some(raw.clone()));
        assert_eq!(envelope.to_value(), raw);

        // Normalizing twice changes nothing
        let again = Envelope::from_procedure_result("getGate", Some(envelope.to_value()));
        assert_eq!(again, envelope);
    }

    #[test]
    fn test_passthrough_fills_missing_code_and_message() {
        let envelope = Envelope::from_procedure_result("p", Some(json!({"success": true})));
        assert!(envelope.success);
        assert_eq!(envelope.code, "");
        assert_eq!(envelope.message, "");
    }

    #[test]
    fn test_passthrough_keeps_non_string_code_and_message() {
        let returned = json!({
            "success": false,
            "code": 42,
            "message": {"text": "not here"},
            "detail": null
        });
        let envelope = Envelope::from_procedure_result("p", Some(returned.clone()));
        assert!(!envelope.success);
        assert_eq!(envelope.code, "");
        assert_eq!(envelope.get("code"), Some(&json!(42)));
        assert_eq!(envelope.to_value(), returned);
        assert_eq!(serde_json::to_value(&envelope).unwrap(), returned);
    }

    #[test]
    fn test_envelope_deserialize_requires_success() {
        assert!(serde_json::from_value::<Envelope>(json!({"code": "X"})).is_err());
        assert!(serde_json::from_value::<Envelope>(json!([1, 2])).is_err());
    }

    #[test]
    fn test_envelope_serde_flattens_extra_fields() {
        let envelope: Envelope = serde_json::from_value(json!({
            "success": true,
            "code": "SUCCESS",
            "message": "Success",
            "sayHello": "Hello world"
        }))
        .unwrap();
        assert_eq!(envelope.get("sayHello"), Some(&json!("Hello world")));
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            envelope.to_value()
        );
    }

    #[test]
    fn test_envelope_equality_ignores_attached_error() {
        let plain = Envelope::failure("X", "failed");
        let with_error = plain
            .clone()
            .with_error(std::sync::Arc::new(CallError::new("boom")));
        assert_eq!(plain, with_error);
        assert!(with_error.error().is_some());
        assert!(!serde_json::to_string(&with_error).unwrap().contains("boom"));
    }

    #[test]
    fn test_snapshot_encodes_procedures_as_string() {
        let procedures = json!({"foo": "function", "bar": "function"});
        let envelope = introspection::snapshot(procedures.as_object().unwrap());
        assert!(envelope.success);
        assert_eq!(envelope.code, codes::ALLSERVER_INTROSPECTION);
        assert_eq!(envelope.message, "Introspection as JSON string");

        let encoded = envelope.get("procedures").unwrap().as_str().unwrap();
        let decoded: serde_json::Value = serde_json::from_str(encoded).unwrap();
        assert_eq!(decoded, procedures);
    }

    #[test]
    fn test_parse_procedures_rejects_malformed_payloads() {
        let bad_json = Envelope::ok().with("procedures", json!("{not json"));
        assert!(introspection::parse_procedures(&bad_json).is_none());

        let not_object = Envelope::ok().with("procedures", json!("42"));
        assert!(introspection::parse_procedures(&not_object).is_none());

        let missing = Envelope::ok();
        assert!(introspection::parse_procedures(&missing).is_none());
    }

    #[test]
    fn test_procedure_names_flatten_namespaces() {
        let procedures = json!({
            "foo": "function",
            "admin": {"reset": "function", "deep": {"purge": "function"}},
            "weird": 5
        });
        let mut names = introspection::procedure_names(procedures.as_object().unwrap());
        names.sort();
        assert_eq!(names, vec!["admin.deep.purge", "admin.reset", "foo"]);
    }

    #[test]
    fn test_call_error_builders() {
        let err = CallError::coded("MY_CODE", "went wrong")
            .with_status(418)
            .no_net_to_server();
        assert_eq!(err.code(), Some("MY_CODE"));
        assert_eq!(err.message(), "went wrong");
        assert_eq!(err.status(), Some(418));
        assert!(err.is_no_net_to_server());
        assert_eq!(err.to_string(), "went wrong");

        let assertion = CallError::assertion("must be positive");
        assert_eq!(assertion.code(), Some(codes::ERR_ASSERTION));
    }

    #[test]
    fn test_call_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = CallError::from(io);
        assert_eq!(err.source().map(|e| e.to_string()), Some("refused".to_string()));
        assert_eq!(err.to_string(), "refused");
        assert!(err.code().is_none());

        assert!(CallError::new("plain").source().is_none());
    }

    #[test]
    fn test_allserver_error_display() {
        let err = AllserverError::UnsupportedScheme("ftp://host".into());
        assert_eq!(err.to_string(), "Schema not supported: ftp://host");

        let err: AllserverError = CallError::new("boom").into();
        assert_eq!(err.to_string(), "boom");
    }
}
