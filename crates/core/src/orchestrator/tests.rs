use std::sync::{Arc, Mutex};
use std::time::Duration;

use barry_model::{
    BackendKind, ErrorKind, ModelMessage, ToolCallRequest, ToolDeclaration,
    ToolDescriptor,
};
use barry_test_model::{PresetEvent, PresetResponse, TestModelBackend};
use barry_test_worker::FakeWorker;
use barry_tool_session::{ToolSession, WorkerConfigBuilder};
use serde_json::json;
use tokio::time::timeout;

use crate::{
    OrchestratorBuilder, RetryPolicy, TOOL_ROUND_LIMIT_REPLY, TranscriptSource,
};

async fn connected_session(worker: FakeWorker) -> ToolSession {
    let config =
        WorkerConfigBuilder::with_source_root(env!("CARGO_MANIFEST_DIR"))
            .build()
            .unwrap();
    let mut session = ToolSession::new(config, worker);
    session.connect().await.unwrap();
    session
}

fn fat_call(id: &str) -> ToolCallRequest {
    ToolCallRequest::from_value(
        id,
        "query_skus_by_fat",
        json!({ "fat_value": 30, "operator": ">", "n": 10 }),
    )
}

#[tokio::test]
async fn test_simple_message() {
    let session = connected_session(FakeWorker::default()).await;
    let mut backend = TestModelBackend::default();
    backend.add_response(PresetResponse::with_events([
        PresetEvent::MessageDelta("Hi, ".to_owned()),
        PresetEvent::MessageDelta("what can I do for you?".to_owned()),
    ]));

    let mut orchestrator = OrchestratorBuilder::with_backend(backend.clone())
        .build(&session)
        .unwrap();
    let reply = orchestrator.send_message("Hello").await.unwrap();
    assert_eq!(reply, "Hi, what can I do for you?");

    let conversation = orchestrator.conversation();
    assert_eq!(conversation.len(), 2);
    assert_eq!(
        conversation.items()[1].msg(),
        &ModelMessage::Assistant(reply.clone())
    );
    assert_eq!(conversation.items()[1].transcript(), reply);
}

#[tokio::test]
async fn test_system_prompt() {
    let session = connected_session(FakeWorker::default()).await;
    let mut backend = TestModelBackend::default();
    backend.add_response(PresetResponse::text("Sure."));

    let mut orchestrator = OrchestratorBuilder::with_backend(backend.clone())
        .with_system_prompt("You answer questions about SKUs.")
        .build(&session)
        .unwrap();
    assert_eq!(orchestrator.conversation().len(), 1);
    orchestrator.send_message("Help me").await.unwrap();

    let requests = backend.requests();
    assert_eq!(
        requests[0].messages,
        [
            ModelMessage::System("You answer questions about SKUs.".to_owned()),
            ModelMessage::User("Help me".to_owned()),
        ]
    );
    assert_eq!(orchestrator.conversation().len(), 3);
}

#[tokio::test]
async fn test_declarations() {
    let session = connected_session(FakeWorker::default()).await;

    let backend = TestModelBackend::new(BackendKind::Gemini);
    OrchestratorBuilder::with_backend(backend.clone())
        .build(&session)
        .unwrap();
    let declarations = backend.declarations();
    assert_eq!(declarations.len(), session.tools().len());
    assert!(matches!(declarations[0], ToolDeclaration::Gemini(_)));
    assert_eq!(declarations[0].name(), "query_skus_by_fat");
    assert_eq!(
        declarations[1].required(),
        ["chocolate_type", "moulding_type"]
    );

    let backend = TestModelBackend::new(BackendKind::Ollama);
    OrchestratorBuilder::with_backend(backend.clone())
        .build(&session)
        .unwrap();
    let declarations = backend.declarations();
    assert_eq!(declarations.len(), 2);
    assert!(matches!(declarations[1], ToolDeclaration::Ollama(_)));
}

#[tokio::test]
async fn test_translation_error() {
    let odd_tool = ToolDescriptor::from_input_schema(
        "reset_cache",
        "Resets the cache",
        json!({
            "type": "object",
            "properties": { "token": { "type": "null" } }
        }),
    );
    let worker = FakeWorker::default().with_extra_tool(odd_tool);
    let session = connected_session(worker).await;

    let backend = TestModelBackend::default();
    let err = OrchestratorBuilder::with_backend(backend.clone())
        .build(&session)
        .err()
        .unwrap();
    assert_eq!(err.tool, "reset_cache");
    assert_eq!(err.parameter, "token");
    assert!(backend.declarations().is_empty());
}

#[tokio::test]
async fn test_tool_call() {
    let worker = FakeWorker::default();
    let session = connected_session(worker.clone()).await;
    let mut backend = TestModelBackend::default();
    backend.add_response(PresetResponse::tool_calls([fat_call("call:0")]));
    backend.add_response(PresetResponse::text("Three SKUs are above 30g."));

    let mut orchestrator = OrchestratorBuilder::with_backend(backend.clone())
        .build(&session)
        .unwrap();
    let reply = orchestrator
        .send_message("Which SKUs have more than 30g of fat?")
        .await
        .unwrap();
    assert_eq!(reply, "Three SKUs are above 30g.");

    let calls = worker.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].name, "query_skus_by_fat");
    assert_eq!(calls[0].arguments, fat_call("call:0").arguments);

    // The tool result goes back to the model right after the call.
    let requests = backend.requests();
    assert_eq!(requests.len(), 2);
    let messages = &requests[1].messages;
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1], ModelMessage::ToolCall(fat_call("call:0")));
    let ModelMessage::Tool(result) = &messages[2] else {
        panic!("expected a tool message, got {:?}", messages[2]);
    };
    assert_eq!(result.id, "call:0");
    assert_eq!(result.name, "query_skus_by_fat");
    assert!(result.content.starts_with(
        "Here is the data from the query_skus_by_fat function:\n\n\
         📊 Found 3 SKU(s) where Fat > 30g:"
    ));
    assert!(
        result
            .content
            .ends_with("\n\nPlease format this nicely for the user.")
    );

    assert_eq!(orchestrator.conversation().len(), 4);
}

#[tokio::test]
async fn test_tool_failures() {
    let worker = FakeWorker::default().with_broken_tool("query_skus_by_fat");
    let session = connected_session(worker).await;
    let mut backend = TestModelBackend::default();
    backend.add_response(PresetResponse::tool_calls([
        fat_call("call:0"),
        ToolCallRequest::from_value(
            "call:1",
            "query_chocolate_products",
            json!({ "n": 5 }),
        ),
    ]));
    backend.add_response(PresetResponse::text("Sorry, something is off."));

    let mut orchestrator = OrchestratorBuilder::with_backend(backend.clone())
        .build(&session)
        .unwrap();
    orchestrator.send_message("Anything fatty?").await.unwrap();

    let requests = backend.requests();
    let results: Vec<_> = requests[1]
        .messages
        .iter()
        .filter_map(|msg| match msg {
            ModelMessage::Tool(result) => Some(result.content.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(results.len(), 2);
    assert!(results[0].contains("Error: connection closed by the worker"));
    assert!(results[1].contains("Error: Missing required argument(s)"));
}

#[tokio::test]
async fn test_disconnected_session() {
    let config =
        WorkerConfigBuilder::with_source_root(env!("CARGO_MANIFEST_DIR"))
            .build()
            .unwrap();
    let session = ToolSession::new(config, FakeWorker::default());
    let mut backend = TestModelBackend::default();
    backend.add_response(PresetResponse::tool_calls([fat_call("call:0")]));
    backend.add_response(PresetResponse::text("I can't reach the data."));

    let mut orchestrator = OrchestratorBuilder::with_backend(backend.clone())
        .build(&session)
        .unwrap();
    assert!(backend.declarations().is_empty());
    orchestrator.send_message("Anything fatty?").await.unwrap();

    let requests = backend.requests();
    let Some(ModelMessage::Tool(result)) = requests[1].messages.last() else {
        panic!("expected a tool message");
    };
    assert!(
        result
            .content
            .starts_with("Error calling function query_skus_by_fat: ")
    );
}

#[tokio::test]
async fn test_tool_round_limit() {
    let worker = FakeWorker::default();
    let session = connected_session(worker.clone()).await;
    let mut backend = TestModelBackend::default();
    for i in 0..3 {
        backend.add_response(PresetResponse::tool_calls([fat_call(&format!(
            "call:{i}"
        ))]));
    }

    let mut orchestrator = OrchestratorBuilder::with_backend(backend.clone())
        .with_max_tool_rounds(2)
        .build(&session)
        .unwrap();
    let reply = orchestrator.send_message("Loop forever").await.unwrap();
    assert_eq!(reply, TOOL_ROUND_LIMIT_REPLY);
    assert_eq!(worker.calls().len(), 2);
    assert_eq!(backend.remaining(), 0);

    // User, two rounds of call and result, then the fallback reply.
    let conversation = orchestrator.conversation();
    assert_eq!(conversation.len(), 6);
    assert_eq!(
        conversation.messages().last(),
        Some(&ModelMessage::Assistant(TOOL_ROUND_LIMIT_REPLY.to_owned()))
    );
}

#[tokio::test]
async fn test_rollback_on_error() {
    let session = connected_session(FakeWorker::default()).await;
    let mut backend = TestModelBackend::default();
    backend.add_response(PresetResponse::text("Hello!"));
    backend.add_response(PresetResponse::tool_calls([fat_call("call:0")]));

    let mut orchestrator = OrchestratorBuilder::with_backend(backend.clone())
        .build(&session)
        .unwrap();
    orchestrator.send_message("Hi").await.unwrap();
    assert_eq!(orchestrator.conversation().len(), 2);

    // The script runs out after the tool call.
    let err = orchestrator.send_message("Fat SKUs?").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Other);
    assert_eq!(orchestrator.conversation().len(), 2);

    backend.add_response(PresetResponse::text("Here they are."));
    let reply = orchestrator.send_message("Fat SKUs?").await.unwrap();
    assert_eq!(reply, "Here they are.");
    let last_request = backend.requests().pop().unwrap();
    assert_eq!(
        last_request.messages,
        [
            ModelMessage::User("Hi".to_owned()),
            ModelMessage::Assistant("Hello!".to_owned()),
            ModelMessage::User("Fat SKUs?".to_owned()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_retry_rate_limited() {
    let session = connected_session(FakeWorker::default()).await;
    let mut backend = TestModelBackend::default();
    backend.add_response(PresetResponse::text("Finally.").with_failures(2));

    let mut orchestrator = OrchestratorBuilder::with_backend(backend.clone())
        .build(&session)
        .unwrap();
    let reply = orchestrator.send_message("Hi").await.unwrap();
    assert_eq!(reply, "Finally.");
    assert_eq!(backend.requests().len(), 3);

    backend.add_response(PresetResponse::text("Never.").with_failures(0));
    let mut orchestrator = OrchestratorBuilder::with_backend(backend.clone())
        .with_retry_policy(RetryPolicy::never())
        .build(&session)
        .unwrap();
    let err = orchestrator.send_message("Hi").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
    assert!(orchestrator.conversation().is_empty());
}

#[tokio::test]
async fn test_transcripts() {
    let session = connected_session(FakeWorker::default()).await;
    let mut backend = TestModelBackend::default();
    backend.add_response(PresetResponse::tool_calls([
        ToolCallRequest::from_value(
            "call:0",
            "query_skus_by_fat",
            json!({ "fat_value": 30 }),
        ),
    ]));
    backend.add_response(PresetResponse::with_events([
        PresetEvent::MessageDelta("Found ".to_owned()),
        PresetEvent::MessageDelta("three.".to_owned()),
    ]));

    let transcripts = Arc::new(Mutex::new(vec![]));
    let mut orchestrator = OrchestratorBuilder::with_backend(backend)
        .on_transcript({
            let transcripts = Arc::clone(&transcripts);
            move |transcript, source| {
                transcripts
                    .lock()
                    .unwrap()
                    .push((transcript.to_owned(), source));
            }
        })
        .build(&session)
        .unwrap();
    orchestrator.send_message("Fat SKUs?").await.unwrap();

    let transcripts = transcripts.lock().unwrap();
    let sources: Vec<_> = transcripts.iter().map(|(_, s)| *s).collect();
    assert_eq!(
        sources,
        [
            TranscriptSource::ToolCall,
            TranscriptSource::ToolResult,
            TranscriptSource::Assistant,
            TranscriptSource::Assistant,
        ]
    );
    assert_eq!(transcripts[0].0, r#"query_skus_by_fat({"fat_value":30})"#);
    assert!(transcripts[1].0.contains("📊 Found 3 SKU(s)"));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_turn() {
    let worker = FakeWorker::default();
    let session = connected_session(worker.clone()).await;
    let mut backend = TestModelBackend::default();
    backend.set_delay(Duration::from_secs(5));
    backend.add_response(PresetResponse::tool_calls([fat_call("call:0")]));
    backend.add_response(PresetResponse::text("Done."));

    let mut orchestrator = OrchestratorBuilder::with_backend(backend.clone())
        .with_system_prompt("Be brief.")
        .build(&session)
        .unwrap();

    // The first response takes 10 seconds, the deadline hits during the
    // second one.
    let result = timeout(
        Duration::from_secs(12),
        orchestrator.send_message("Fat SKUs?"),
    )
    .await;
    assert!(result.is_err());
    assert_eq!(worker.calls().len(), 1);
    assert_eq!(orchestrator.conversation().len(), 1);
}
