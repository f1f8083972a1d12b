use std::time::Duration;

use barry_model::ToolDescriptor;
use barry_test_worker::FakeWorker;
use barry_tool_session::{
    ErrorKind, SessionState, ToolSession, WorkerConfig, WorkerConfigBuilder,
};
use serde_json::{Map, Value, json};

fn config() -> WorkerConfig {
    WorkerConfigBuilder::with_source_root(env!("CARGO_MANIFEST_DIR"))
        .with_handshake_timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

fn args(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
async fn test_discovers_tools() {
    let worker = FakeWorker::default();
    let mut session = ToolSession::new(config(), worker.clone());
    session.connect().await.unwrap();

    let names: Vec<_> = session.tools().iter().map(|t| t.name()).collect();
    assert_eq!(names, ["query_skus_by_fat", "query_chocolate_products"]);
    assert_eq!(worker.launches(), 1);

    session.disconnect().await;
    assert_eq!(worker.shutdowns(), 1);
}

#[tokio::test]
async fn test_duplicated_tools_are_dropped() {
    let duplicate = ToolDescriptor::from_input_schema(
        "query_skus_by_fat",
        "A shadowing tool",
        json!({ "type": "object" }),
    );
    let worker = FakeWorker::default().with_extra_tool(duplicate);
    let mut session = ToolSession::new(config(), worker);
    session.connect().await.unwrap();

    assert_eq!(session.tools().len(), 2);
    let tool = session.tool("query_skus_by_fat").unwrap();
    assert_eq!(tool.required(), ["fat_value"]);
    session.disconnect().await;
}

#[tokio::test]
async fn test_invoke_passes_arguments_through() {
    let worker = FakeWorker::default();
    let mut session = ToolSession::new(config(), worker.clone());
    session.connect().await.unwrap();

    let arguments = args(json!({ "fat_value": 30, "operator": ">", "n": 10 }));
    let text = session
        .invoke("query_skus_by_fat", arguments.clone())
        .await
        .unwrap();
    assert!(text.starts_with("📊 Found 3 SKU(s) where Fat > 30g:"));

    let calls = worker.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].name, "query_skus_by_fat");
    assert_eq!(calls[0].arguments, arguments);
    session.disconnect().await;
}

#[tokio::test]
async fn test_invoke_renders_failures() {
    let worker = FakeWorker::default()
        .with_broken_tool("query_skus_by_fat")
        .with_failing_tool("query_chocolate_products");
    let mut session = ToolSession::new(config(), worker.clone());
    session.connect().await.unwrap();

    let text = session
        .invoke("query_skus_by_fat", args(json!({ "fat_value": 1 })))
        .await
        .unwrap();
    assert_eq!(text, "Error: connection closed by the worker");

    let text = session
        .invoke(
            "query_chocolate_products",
            args(json!({ "chocolate_type": "Dark", "moulding_type": "bars" })),
        )
        .await
        .unwrap();
    assert_eq!(text, "Error: dataset not loaded");

    // Rejected before reaching the worker.
    let text = session
        .invoke("query_chocolate_products", args(json!({ "n": 2 })))
        .await
        .unwrap();
    assert!(text.starts_with("Error: Missing required argument(s)"));
    assert!(text.contains("chocolate_type, moulding_type"));
    assert_eq!(worker.calls().len(), 2);
    session.disconnect().await;
}

#[tokio::test]
async fn test_not_connected() {
    let worker = FakeWorker::default();
    let mut session = ToolSession::new(config(), worker.clone());
    let err = session
        .invoke("query_skus_by_fat", args(json!({ "fat_value": 1 })))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotConnected);

    session.connect().await.unwrap();
    session.disconnect().await;
    let err = session
        .invoke("query_skus_by_fat", args(json!({ "fat_value": 1 })))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotConnected);
    assert!(worker.calls().is_empty());
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let worker = FakeWorker::default();
    let mut session = ToolSession::new(config(), worker.clone());
    session.disconnect().await;
    assert_eq!(session.state(), SessionState::Disconnected);

    session.connect().await.unwrap();
    session.disconnect().await;
    session.disconnect().await;
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(worker.shutdowns(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_handshake_timeout() {
    let root = env!("CARGO_MANIFEST_DIR");
    let config = WorkerConfigBuilder::with_source_root(root)
        .with_handshake_timeout(Duration::from_secs(1))
        .build()
        .unwrap();
    let worker =
        FakeWorker::default().with_handshake_delay(Duration::from_secs(5));
    let mut session = ToolSession::new(config, worker);

    let err = session.connect().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionTimeout);
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(session.tools().is_empty());
}

#[tokio::test]
async fn test_connect_failures() {
    let worker = FakeWorker::default().with_launch_error("no such file");
    let mut session = ToolSession::new(config(), worker);
    let err = session.connect().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert_eq!(err.reason(), "no such file");

    let worker = FakeWorker::default().with_list_error("bad frame");
    let mut session = ToolSession::new(config(), worker.clone());
    let err = session.connect().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert_eq!(session.state(), SessionState::Disconnected);
    // The half-open connection is released.
    assert_eq!(worker.shutdowns(), 1);
}

#[tokio::test]
async fn test_scoped() {
    let worker = FakeWorker::default();
    let text = ToolSession::scoped(config(), worker.clone(), async |session| {
        assert!(session.is_connected());
        session
            .invoke(
                "query_chocolate_products",
                args(json!({
                    "chocolate_type": "Dark",
                    "moulding_type": "callets",
                    "n": 5
                })),
            )
            .await
            .unwrap()
    })
    .await
    .unwrap();

    assert_eq!(
        text,
        "🔍 No Dark chocolate products found with moulding type 'callets'"
    );
    assert_eq!(worker.launches(), 1);
    assert_eq!(worker.shutdowns(), 1);

    let worker = FakeWorker::default().with_launch_error("boom");
    let result =
        ToolSession::scoped(config(), worker.clone(), async |_| ()).await;
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Protocol);
    assert_eq!(worker.shutdowns(), 0);
}
