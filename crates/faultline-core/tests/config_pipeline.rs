//! Pipelines assembled from JSON configuration.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use faultline_core::{
    async_operation, handle, BuildError, Context, Fault, PolicyConfig, TimeoutRejected,
};

const RETRY_AROUND_TIMEOUT: &str = r#"{
    "retry":   { "kind": "constant", "retries": 2, "wait_ms": 100 },
    "timeout": { "timeout_ms": 50, "strategy": "preemptive" }
}"#;

#[tokio::test(start_paused = true)]
async fn configured_pipeline_retries_timed_out_attempts() {
    common::init_tracing();
    let config = PolicyConfig::from_json(RETRY_AROUND_TIMEOUT).unwrap();
    let pipeline = config
        .build_async_pipeline::<u32>(handle::<TimeoutRejected>())
        .unwrap();

    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let op = async_operation(move |_ctx: Context| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<u32, Fault>(7)
        }
    });

    let started = tokio::time::Instant::now();
    let err = pipeline
        .invoke_async(Context::new().with_operation_key("balance"), op)
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // three 50ms attempts and two 100ms waits
    assert!(started.elapsed() >= Duration::from_millis(350));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn configured_timeout_alone_passes_fast_calls() {
    let config = PolicyConfig::from_json(r#"{ "timeout": { "timeout_ms": 5000 } }"#).unwrap();
    let pipeline = config
        .build_async_pipeline::<&'static str>(handle::<TimeoutRejected>())
        .unwrap();

    let op = async_operation(|_ctx: Context| async { Ok::<_, Fault>("ok") });
    assert_eq!(pipeline.invoke_async(Context::new(), op).await.unwrap(), "ok");
}

#[test]
fn blocking_pipeline_from_the_same_config() {
    let config = PolicyConfig::from_json(RETRY_AROUND_TIMEOUT).unwrap();
    let pipeline = config
        .build_pipeline::<u32>(handle::<TimeoutRejected>())
        .unwrap();

    let mut calls = 0;
    let value = pipeline
        .invoke(&Context::new(), &mut |_: &Context| {
            calls += 1;
            Ok(calls * 10)
        })
        .unwrap();
    assert_eq!(value, 10);
    assert_eq!(calls, 1);
}

#[test]
fn malformed_config_is_a_build_error() {
    let err = PolicyConfig::from_json(r#"{ "retry": { "kind": "sometimes" } }"#).unwrap_err();
    assert!(matches!(err, BuildError::Config(_)));
    assert!(err.to_string().starts_with("invalid policy config"));
}
