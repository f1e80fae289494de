#[cfg(test)]
mod tests {
    use crate::{
        codes, Allserver, AllserverBuilder, AllserverError, CallError, Envelope, Introspection,
        Logger, MemoryTransport, Procedures,
    };
    use allserver_client::{AllserverClient, ClientFactory};
    use allserver_common::protocol::introspection;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn greeter() -> Procedures {
        Procedures::new()
            .procedure("sayHello", |arg, _ctx| {
                Box::pin(async move {
                    let name = arg["name"].as_str().unwrap_or("world").to_string();
                    Ok(Some(json!(format!("Hello {}", name))))
                })
            })
            .procedure("nothing", |_arg, _ctx| Box::pin(async { Ok(None) }))
            .procedure("gate", |_arg, _ctx| {
                Box::pin(async {
                    Ok(Some(json!({
                        "success": false,
                        "code": "GATE_NOT_FOUND",
                        "message": "No such gate",
                        "gate": null
                    })))
                })
            })
            .procedure("fail", |_arg, _ctx| Box::pin(async { Err(CallError::new("bad")) }))
            .procedure("assert", |_arg, _ctx| {
                Box::pin(async { Err(CallError::assertion("name is required")) })
            })
            .procedure("callNumber", |_arg, ctx| {
                Box::pin(async move { Ok(Some(json!(ctx.call_number))) })
            })
            .procedure("echoArg", |arg, _ctx| Box::pin(async move { Ok(Some(arg)) }))
            .procedure("traceId", |_arg, ctx| {
                Box::pin(async move { Ok(Some(json!(ctx.trace_id.clone()))) })
            })
            .namespace(
                "admin",
                Procedures::new().procedure("reset", |_arg, _ctx| {
                    Box::pin(async { Ok(Some(json!("reset done"))) })
                }),
            )
    }

    async fn start(builder: AllserverBuilder) -> (Arc<Allserver>, AllserverClient) {
        let server = builder.transport(MemoryTransport::new()).build().unwrap();
        let client = server.start().await.unwrap().into_client().unwrap();
        (server, client)
    }

    #[derive(Clone, Default)]
    struct RecordingLogger {
        codes: Arc<Mutex<Vec<String>>>,
    }

    impl Logger for RecordingLogger {
        fn error(&self, code: &str, _error: &CallError) {
            self.codes.lock().push(code.to_string());
        }
    }

    // ============================================================================
    // Result normalization
    // ============================================================================

    #[tokio::test]
    async fn test_value_is_wrapped_under_procedure_name() {
        let (_, client) = start(Allserver::builder().procedures(greeter())).await;

        let result = client.call("sayHello", json!({"name": "Ann"})).await.unwrap();
        assert_eq!(
            result.to_value(),
            json!({"success": true, "code": "SUCCESS", "message": "Success", "sayHello": "Hello Ann"})
        );
    }

    #[tokio::test]
    async fn test_nothing_returned_is_plain_success() {
        let (_, client) = start(Allserver::builder().procedures(greeter())).await;

        let result = client.call("nothing", Value::Null).await.unwrap();
        assert_eq!(
            result.to_value(),
            json!({"success": true, "code": "SUCCESS", "message": "Success"})
        );
    }

    #[tokio::test]
    async fn test_envelope_passes_through() {
        let (_, client) = start(Allserver::builder().procedures(greeter())).await;

        let result = client.call("gate", Value::Null).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.code, "GATE_NOT_FOUND");
        assert_eq!(result.get("gate"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_argument_is_stamped() {
        let (_, client) = start(Allserver::builder().procedures(greeter())).await;

        let result = client.call("echoArg", json!({"a": 1})).await.unwrap();
        let echoed = result.get("echoArg").unwrap();
        assert_eq!(echoed["a"], 1);
        assert_eq!(echoed["_"]["procedureName"], "echoArg");
    }

    // ============================================================================
    // Dispatch
    // ============================================================================

    #[tokio::test]
    async fn test_call_numbers_start_at_zero() {
        let (server, client) = start(Allserver::builder().procedures(greeter())).await;

        for expected in 0..3 {
            let result = client.call("callNumber", Value::Null).await.unwrap();
            assert_eq!(result.get("callNumber"), Some(&json!(expected)));
        }
        assert_eq!(server.calls_count(), 3);
    }

    #[tokio::test]
    async fn test_procedure_not_found() {
        let (_, client) = start(Allserver::builder().procedures(greeter())).await;

        let result = client.call("nope", Value::Null).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.code, codes::ALLSERVER_PROCEDURE_NOT_FOUND);
        assert_eq!(result.message, "Procedure 'nope' not found");
    }

    #[tokio::test]
    async fn test_namespaces_are_callable_by_dotted_name() {
        let (_, client) = start(Allserver::builder().procedures(greeter())).await;

        let result = client.call("admin.reset", Value::Null).await.unwrap();
        assert_eq!(result.get("admin.reset"), Some(&json!("reset done")));

        let result = client.call("admin", Value::Null).await.unwrap();
        assert_eq!(result.code, codes::ALLSERVER_PROCEDURE_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_procedure_error_is_enveloped_and_logged() {
        let logger = RecordingLogger::default();
        let (_, client) =
            start(Allserver::builder().procedures(greeter()).logger(logger.clone())).await;

        let result = client.call("fail", Value::Null).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.code, codes::ALLSERVER_PROCEDURE_ERROR);
        assert_eq!(result.message, "'bad' error in 'fail' procedure");

        let result = client.call("assert", Value::Null).await.unwrap();
        assert_eq!(result.code, codes::ERR_ASSERTION);

        assert_eq!(
            *logger.codes.lock(),
            vec![codes::ALLSERVER_PROCEDURE_ERROR.to_string(), codes::ERR_ASSERTION.to_string()]
        );
    }

    #[test]
    fn test_build_rejects_dotted_names() {
        let procedures =
            Procedures::new().procedure("a.b", |_arg, _ctx| Box::pin(async { Ok(None) }));
        match Allserver::builder().procedures(procedures).build() {
            Err(AllserverError::InvalidProcedures(_)) => {}
            other => panic!("Expected InvalidProcedures, got {:?}", other),
        }
    }

    // ============================================================================
    // Middleware
    // ============================================================================

    #[tokio::test]
    async fn test_before_result_short_circuits() {
        let third_runs = Arc::new(AtomicUsize::new(0));
        let after_runs = Arc::new(AtomicUsize::new(0));
        let (third, after) = (third_runs.clone(), after_runs.clone());

        let builder = Allserver::builder()
            .procedures(greeter())
            .before(|_ctx| Box::pin(async { Ok(None) }))
            .before(|_ctx| Box::pin(async { Ok(Some(Envelope::success("M2", "from m2"))) }))
            .before(move |_ctx| {
                third.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Ok(None) })
            })
            .after(move |_ctx| {
                after.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Ok(None) })
            });
        let (_, client) = start(builder).await;

        let result = client.call("sayHello", Value::Null).await.unwrap();
        assert_eq!(result.code, "M2");
        assert!(result.get("sayHello").is_none());
        assert_eq!(third_runs.load(Ordering::SeqCst), 0);
        assert_eq!(after_runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_before_error_still_runs_after() {
        let after_runs = Arc::new(AtomicUsize::new(0));
        let after = after_runs.clone();

        let builder = Allserver::builder()
            .procedures(greeter())
            .before(|_ctx| Box::pin(async { Err(CallError::new("boom")) }))
            .after(move |ctx| {
                after.fetch_add(1, Ordering::SeqCst);
                assert!(ctx.error.is_some());
                Box::pin(async { Ok(None) })
            });
        let (_, client) = start(builder).await;

        let result = client.call("sayHello", Value::Null).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.code, codes::ALLSERVER_MIDDLEWARE_ERROR);
        assert_eq!(result.message, "'boom' error in 'before' middleware");
        assert_eq!(after_runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_after_result_overwrites() {
        let builder = Allserver::builder().procedures(greeter()).after(|ctx| {
            Box::pin(async move {
                let previous = ctx.result.as_ref().map(|r| r.code.clone()).unwrap_or_default();
                Ok(Some(Envelope::success("AFTER", previous)))
            })
        });
        let (_, client) = start(builder).await;

        let result = client.call("nope", Value::Null).await.unwrap();
        assert!(result.success);
        assert_eq!(result.code, "AFTER");
        assert_eq!(result.message, codes::ALLSERVER_PROCEDURE_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_after_error_with_code() {
        let builder = Allserver::builder()
            .procedures(greeter())
            .after(|_ctx| Box::pin(async { Err(CallError::coded("AUDIT_FAILED", "no audit")) }));
        let (_, client) = start(builder).await;

        let result = client.call("sayHello", Value::Null).await.unwrap();
        assert_eq!(result.code, "AUDIT_FAILED");
        assert_eq!(result.message, "'no audit' error in 'after' middleware");
    }

    #[tokio::test]
    async fn test_middleware_shares_context_with_procedure() {
        let builder = Allserver::builder().procedures(greeter()).before(|ctx| {
            ctx.trace_id = Some(format!("trace-{}", ctx.call_number));
            Box::pin(async { Ok(None) })
        });
        let (_, client) = start(builder).await;

        let result = client.call("traceId", Value::Null).await.unwrap();
        assert_eq!(result.get("traceId"), Some(&json!("trace-0")));
    }

    #[tokio::test]
    async fn test_cloned_builder_appends_middleware() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let (first, second) = (order.clone(), order.clone());

        let defaults = Allserver::builder().procedures(greeter()).before(move |_ctx| {
            first.lock().push("defaults");
            Box::pin(async { Ok(None) })
        });
        let derived = defaults.clone().before(move |_ctx| {
            second.lock().push("derived");
            Box::pin(async { Ok(None) })
        });

        let (_, client) = start(derived).await;
        client.call("nothing", Value::Null).await.unwrap();
        assert_eq!(*order.lock(), vec!["defaults", "derived"]);

        order.lock().clear();
        let (_, client) = start(defaults).await;
        client.call("nothing", Value::Null).await.unwrap();
        assert_eq!(*order.lock(), vec!["defaults"]);
    }

    // ============================================================================
    // Introspection
    // ============================================================================

    #[tokio::test]
    async fn test_introspection_snapshot() {
        let (_, client) = start(Allserver::builder().procedures(greeter())).await;

        let result = client.introspect().await.unwrap();
        assert!(result.success);
        assert_eq!(result.code, codes::ALLSERVER_INTROSPECTION);
        assert_eq!(result.message, "Introspection as JSON string");

        let procedures = introspection::parse_procedures(&result).unwrap();
        assert_eq!(procedures["sayHello"], "function");
        assert_eq!(procedures["admin"], json!({"reset": "function"}));
    }

    #[tokio::test]
    async fn test_introspection_can_be_disabled_at_runtime() {
        let (server, client) = start(Allserver::builder().procedures(greeter())).await;
        assert!(client.introspect().await.unwrap().success);

        server.set_introspection(false);
        let result = client.introspect().await.unwrap();
        assert!(!result.success);
        assert_eq!(result.code, codes::ALLSERVER_CLIENT_INTROSPECTION_FAILED);

        // Procedures keep working
        assert!(client.call("sayHello", Value::Null).await.unwrap().success);
    }

    #[tokio::test]
    async fn test_introspection_predicate() {
        let builder = Allserver::builder()
            .procedures(greeter())
            .introspection(Introspection::predicate(|ctx| ctx.call_number == 0));
        let (_, client) = start(builder).await;

        assert!(client.introspect().await.unwrap().success);
        assert!(!client.introspect().await.unwrap().success);
    }

    #[tokio::test]
    async fn test_client_resolves_through_introspection() {
        let (server, client) = start(Allserver::builder().procedures(greeter())).await;

        let result = client
            .resolve_and_call("sayHello", json!({"name": "Bob"}))
            .await
            .unwrap();
        assert_eq!(result.get("sayHello"), Some(&json!("Hello Bob")));

        let result = client.resolve_and_call("admin.reset", Value::Null).await.unwrap();
        assert!(result.success);

        let result = client.resolve_and_call("missing", Value::Null).await.unwrap();
        assert_eq!(result.code, codes::ALLSERVER_CLIENT_PROCEDURE_NOT_FOUND);

        // One introspection plus two procedure calls
        assert_eq!(server.calls_count(), 3);
    }

    #[tokio::test]
    async fn test_servers_sharing_a_factory_keep_separate_snapshots() {
        let factory = ClientFactory::new();
        let single = |name: &'static str| {
            Procedures::new().procedure(name, |_arg, _ctx| {
                Box::pin(async { Ok(Some(json!("done"))) })
            })
        };

        let mut clients = Vec::new();
        for name in ["first", "second"] {
            let server = Allserver::builder()
                .procedures(single(name))
                .transport(MemoryTransport::with_factory(factory.clone()))
                .build()
                .unwrap();
            clients.push(server.start().await.unwrap().into_client().unwrap());
        }
        assert_ne!(clients[0].uri(), clients[1].uri());

        let result = clients[0].resolve_and_call("first", Value::Null).await.unwrap();
        assert!(result.success);
        let result = clients[1].resolve_and_call("second", Value::Null).await.unwrap();
        assert!(result.success);
        assert_eq!(result.get("second"), Some(&json!("done")));

        assert!(factory.cache().contains(clients[0].uri()));
        assert!(factory.cache().contains(clients[1].uri()));
    }
}
