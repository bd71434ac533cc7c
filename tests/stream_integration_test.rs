//! 流消费集成测试：追踪累加、产物落盘、中断后的部分结果

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use hive::core::HiveError;
    use hive::remote::{
        ArtifactKey, ArtifactSink, FsSink, MemorySink, MockControlPlane, PreviewHook, RemoteError,
    };
    use hive::stream::{
        ActivityKind, FileArtifact, FileUseCase, FunctionInvocation, InvocationParameter,
        InvocationSession, InvocationTarget, ReturnControl, ReturnControlHandler,
        ReturnControlResult, RoutingDecision, SessionState, StepKind, StreamConsumer, StreamEvent,
        StreamOptions, TracePayload, MAX_RETURN_CONTROL_ROUNDS,
    };
    use serde_json::{json, Value};
    use tempfile::TempDir;

    const FORECASTER_ALIAS: &str = "arn:hive:agent-alias/FORECAST/AL2";

    fn target() -> InvocationTarget {
        let mut names = HashMap::new();
        names.insert("FORECAST/AL2".to_string(), "energy_forecaster".to_string());
        InvocationTarget {
            agent_id: "SUP".to_string(),
            alias_id: "AL1".to_string(),
            collaborator_names: names,
        }
    }

    fn trace(value: Value) -> Result<StreamEvent, RemoteError> {
        let payload: TracePayload = serde_json::from_value(value).unwrap();
        Ok(StreamEvent::trace(payload))
    }

    fn usage(input: u64, output: u64) -> Value {
        json!({"metadata": {"usage": {"inputTokens": input, "outputTokens": output}}})
    }

    fn png(name: &str) -> FileArtifact {
        FileArtifact {
            name: name.to_string(),
            mime_type: "image/png".to_string(),
            bytes: vec![0x89, b'P', b'N', b'G'],
        }
    }

    fn forecast_request(invocation_id: &str) -> ReturnControl {
        ReturnControl {
            invocation_id: invocation_id.to_string(),
            invocation_inputs: vec![FunctionInvocation {
                action_group: "forecast_actions".to_string(),
                function: "get_forecasted_consumption".to_string(),
                parameters: vec![InvocationParameter {
                    name: "customer_id".to_string(),
                    param_type: Some("integer".to_string()),
                    value: "1".to_string(),
                }],
            }],
        }
    }

    #[derive(Default)]
    struct LocalForecast {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReturnControlHandler for LocalForecast {
        async fn call(&self, invocation: &FunctionInvocation) -> Result<String, HiveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let customer = invocation.parameter("customer_id").unwrap_or("?");
            Ok(format!("customer {}: 320 kWh", customer))
        }
    }

    #[derive(Default)]
    struct CountingPreview {
        shown: AtomicUsize,
    }

    impl PreviewHook for CountingPreview {
        fn preview(&self, _artifact: &FileArtifact) {
            self.shown.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_failure_trace_does_not_truncate_answer() {
        let control = MockControlPlane::new();
        control.script_events(vec![
            Ok(StreamEvent::answer("The forecast")),
            trace(json!({"trace": {"failureTrace": {"failureReason": "tool timed out"}}})),
            Ok(StreamEvent::answer("The forecast for May is 320 kWh.")),
        ]);
        let consumer = StreamConsumer::new(
            Arc::new(control.clone()),
            Arc::new(MemorySink::new()),
            StreamOptions::default(),
        );
        let mut session = InvocationSession::new("session-1");

        let outcome = consumer
            .invoke(&target(), "May forecast?", &mut session)
            .await
            .unwrap();

        assert_eq!(outcome.answer, "The forecast for May is 320 kWh.");
        assert_eq!(outcome.telemetry.failures, vec!["tool timed out".to_string()]);
        assert_eq!(session.turns().len(), 1);
    }

    #[tokio::test]
    async fn test_full_telemetry_with_artifact_on_disk() {
        let dir = TempDir::new().unwrap();
        let control = MockControlPlane::new();
        control.script_events(vec![
            trace(json!({"trace": {"routingClassifierTrace": {
                "modelInvocationInput": {"text": "classify"}
            }}})),
            trace(json!({"trace": {"routingClassifierTrace": {"modelInvocationOutput": {
                "metadata": {"usage": {"inputTokens": 200, "outputTokens": 3}},
                "rawResponse": {"content": "<a>energy_forecaster</a>"}
            }}}})),
            trace(json!({
                "callerChain": [
                    {"agentAliasArn": "arn:hive:agent-alias/SUP/AL1"},
                    {"agentAliasArn": FORECASTER_ALIAS}
                ],
                "trace": {"orchestrationTrace": {"modelInvocationOutput": usage(120, 12)}}
            })),
            trace(json!({
                "callerChain": [
                    {"agentAliasArn": "arn:hive:agent-alias/SUP/AL1"},
                    {"agentAliasArn": FORECASTER_ALIAS}
                ],
                "trace": {"orchestrationTrace": {"observation": {
                    "actionGroupInvocationOutput": {"text": "{\"may\": 320}"}
                }}}
            })),
            Ok(StreamEvent::FileArtifact(png("forecast.png"))),
            Ok(StreamEvent::answer("May: 320 kWh.")),
        ]);
        let consumer = StreamConsumer::new(
            Arc::new(control.clone()),
            Arc::new(FsSink::new(dir.path())),
            StreamOptions::default(),
        );
        let mut session = InvocationSession::new("session-2");

        let outcome = consumer
            .invoke(&target(), "Chart my usage", &mut session)
            .await
            .unwrap();
        let telemetry = &outcome.telemetry;

        assert_eq!(telemetry.llm_calls, 2);
        assert_eq!(telemetry.input_tokens, 320);
        assert_eq!(telemetry.output_tokens, 15);
        assert_eq!(
            telemetry.routing,
            vec![RoutingDecision::Collaborator("energy_forecaster".to_string())]
        );
        assert_eq!(telemetry.steps[0].kind, StepKind::Routing);
        assert_eq!(telemetry.steps[1].kind, StepKind::Orchestration);
        assert_eq!(telemetry.steps[1].label.to_string(), "1.1");
        assert_eq!(telemetry.steps[1].sub_agent.as_deref(), Some("energy_forecaster"));
        assert_eq!(telemetry.activities[0].kind, ActivityKind::ToolOutput);

        assert_eq!(telemetry.artifacts.len(), 1);
        let written = std::fs::read(dir.path().join("session-2").join("forecast.png")).unwrap();
        assert_eq!(written, png("forecast.png").bytes);
    }

    #[tokio::test]
    async fn test_preview_only_for_images() {
        let control = MockControlPlane::new();
        control.script_events(vec![
            Ok(StreamEvent::FileArtifact(png("chart.png"))),
            Ok(StreamEvent::FileArtifact(FileArtifact {
                name: "data.csv".to_string(),
                mime_type: "text/csv".to_string(),
                bytes: b"month,kwh\nmay,320\n".to_vec(),
            })),
            Ok(StreamEvent::answer("Done.")),
        ]);
        let sink = Arc::new(MemorySink::new());
        let preview = Arc::new(CountingPreview::default());
        let consumer = StreamConsumer::new(
            Arc::new(control.clone()),
            sink.clone(),
            StreamOptions::default(),
        )
        .with_preview(preview.clone());
        let mut session = InvocationSession::new("session-3");

        let outcome = consumer
            .invoke(&target(), "Export", &mut session)
            .await
            .unwrap();

        assert_eq!(sink.len(), 2);
        assert_eq!(outcome.telemetry.artifacts.len(), 2);
        assert_eq!(preview.shown.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_interrupted_stream_keeps_partial_telemetry() {
        let control = MockControlPlane::new();
        control.script_events(vec![
            trace(json!({"trace": {"orchestrationTrace": {"modelInvocationOutput": usage(90, 9)}}})),
            Ok(StreamEvent::answer("Consumption is trending")),
            Err(RemoteError::Transport("connection reset by peer".to_string())),
        ]);
        let consumer = StreamConsumer::new(
            Arc::new(control.clone()),
            Arc::new(MemorySink::new()),
            StreamOptions::default(),
        );
        let mut session = InvocationSession::new("session-4");

        let err = consumer
            .invoke(&target(), "Trend?", &mut session)
            .await
            .unwrap_err();

        match err {
            HiveError::StreamInterrupted { reason, partial } => {
                assert!(reason.contains("connection reset"));
                assert_eq!(partial.answer, "Consumption is trending");
                assert_eq!(partial.telemetry.llm_calls, 1);
                assert_eq!(partial.telemetry.input_tokens, 90);
            }
            other => panic!("Expected StreamInterrupted, got {:?}", other),
        }
        assert!(session.turns().is_empty());
    }

    #[tokio::test]
    async fn test_session_carries_turns_across_invocations() {
        let control = MockControlPlane::new();
        let consumer = StreamConsumer::new(
            Arc::new(control.clone()),
            Arc::new(MemorySink::new()),
            StreamOptions::default(),
        );
        let mut session = InvocationSession::new("session-5");

        control.script_events(vec![Ok(StreamEvent::answer("320 kWh."))]);
        consumer.invoke(&target(), "May?", &mut session).await.unwrap();
        control.script_events(vec![Ok(StreamEvent::answer("290 kWh."))]);
        consumer.invoke(&target(), "June?", &mut session).await.unwrap();

        assert_eq!(session.turns().len(), 2);
        assert_eq!(session.last_answer(), Some("290 kWh."));
    }

    #[tokio::test]
    async fn test_session_file_sent_with_invocation() {
        let control = MockControlPlane::new();
        control.script_events(vec![Ok(StreamEvent::answer("Average is 305 kWh."))]);
        let sink = Arc::new(MemorySink::new());
        let key = ArtifactKey::new("session-6", "usage.csv");
        sink.put(&key, b"month,kwh\napr,290\nmay,320\n").await.unwrap();
        let consumer = StreamConsumer::new(
            Arc::new(control.clone()),
            sink.clone(),
            StreamOptions::default(),
        );
        let mut session = InvocationSession::new("session-6");

        let mut state = SessionState::new();
        state
            .attach_from_sink(sink.as_ref(), &key, FileUseCase::CodeInterpreter)
            .await
            .unwrap();
        let outcome = consumer
            .invoke_with_state(&target(), "Average my usage", state, &mut session)
            .await
            .unwrap();
        assert_eq!(outcome.answer, "Average is 305 kWh.");

        let sent = control.invocations();
        let state = sent[0].session_state.as_ref().unwrap();
        assert_eq!(state.files.len(), 1);
        assert_eq!(state.files[0].name, "usage.csv");
        assert_eq!(state.files[0].media_type, "text/csv");
        assert_eq!(state.files[0].use_case, FileUseCase::CodeInterpreter);

        consumer.invoke(&target(), "Thanks", &mut session).await.unwrap();
        assert!(control.invocations()[1].session_state.is_none());
    }

    #[tokio::test]
    async fn test_return_control_left_to_caller() {
        let control = MockControlPlane::new();
        control.script_events(vec![Ok(StreamEvent::ReturnControl(forecast_request("inv-1")))]);
        let consumer = StreamConsumer::new(
            Arc::new(control.clone()),
            Arc::new(MemorySink::new()),
            StreamOptions::default(),
        );
        let mut session = InvocationSession::new("session-7");

        let outcome = consumer
            .invoke(&target(), "Forecast for customer 1?", &mut session)
            .await
            .unwrap();
        let pending = outcome.return_control.unwrap();
        assert_eq!(pending.invocation_id, "inv-1");
        assert!(session.turns().is_empty());

        control.script_events(vec![Ok(StreamEvent::answer("Customer 1 will use 320 kWh."))]);
        let results = vec![ReturnControlResult::for_invocation(
            &pending.invocation_inputs[0],
            "320",
        )];
        let outcome = consumer
            .return_control(&target(), &pending, results, &mut session)
            .await
            .unwrap();
        assert_eq!(outcome.answer, "Customer 1 will use 320 kWh.");
        assert!(outcome.return_control.is_none());

        let sent = control.invocations();
        assert_eq!(sent[1].input_text, "");
        let state = sent[1].session_state.as_ref().unwrap();
        assert_eq!(state.invocation_id.as_deref(), Some("inv-1"));
        assert_eq!(state.return_control_results[0].function, "get_forecasted_consumption");
        assert_eq!(state.return_control_results[0].body, "320");
    }

    #[tokio::test]
    async fn test_invoke_with_tools_runs_handler_until_answer() {
        let control = MockControlPlane::new();
        control.script_events(vec![Ok(StreamEvent::ReturnControl(forecast_request("inv-1")))]);
        control.script_events(vec![Ok(StreamEvent::answer("Customer 1 will use 320 kWh."))]);
        let consumer = StreamConsumer::new(
            Arc::new(control.clone()),
            Arc::new(MemorySink::new()),
            StreamOptions::default(),
        );
        let handler = LocalForecast::default();
        let mut session = InvocationSession::new("session-8");

        let outcome = consumer
            .invoke_with_tools(
                &target(),
                "Forecast for customer 1?",
                SessionState::new(),
                &handler,
                &mut session,
            )
            .await
            .unwrap();

        assert_eq!(outcome.answer, "Customer 1 will use 320 kWh.");
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        let sent = control.invocations();
        assert_eq!(sent.len(), 2);
        let returned = sent[1].session_state.as_ref().unwrap();
        assert_eq!(returned.return_control_results[0].body, "customer 1: 320 kWh");
        assert_eq!(session.turns().len(), 1);
        assert_eq!(session.turns()[0].input, "Forecast for customer 1?");
    }

    #[tokio::test]
    async fn test_invoke_with_tools_stops_after_round_limit() {
        let control = MockControlPlane::new();
        for round in 0..=MAX_RETURN_CONTROL_ROUNDS {
            control.script_events(vec![Ok(StreamEvent::ReturnControl(forecast_request(&format!(
                "inv-{}",
                round
            ))))]);
        }
        let consumer = StreamConsumer::new(
            Arc::new(control.clone()),
            Arc::new(MemorySink::new()),
            StreamOptions::default(),
        );
        let handler = LocalForecast::default();
        let mut session = InvocationSession::new("session-9");

        let outcome = consumer
            .invoke_with_tools(&target(), "Loop?", SessionState::new(), &handler, &mut session)
            .await
            .unwrap();

        assert_eq!(handler.calls.load(Ordering::SeqCst), MAX_RETURN_CONTROL_ROUNDS);
        assert!(outcome.return_control.is_some());
        assert_eq!(control.invocations().len(), MAX_RETURN_CONTROL_ROUNDS + 1);
        assert!(session.turns().is_empty());
    }
}
