//! Integration tests for counsel-core infrastructure

use std::time::Duration;
use tokio::time::sleep;
use counsel_core::{
    config_error, input_error, retry_async, with_timeout, CancelToken, ConversationMode,
    CounselError, CounselSettings, ErrorContext, RateLimiter, RetryConfig,
};

#[tokio::test]
async fn test_error_handling() {
    let error = input_error!("Query must not be empty", "user_query", "test_component");

    match &error {
        CounselError::Input {
            message,
            field,
            context,
        } => {
            assert_eq!(message, "Query must not be empty");
            assert_eq!(field.as_deref(), Some("user_query"));
            assert_eq!(context.component, "test_component");
            assert!(!context.error_id.is_empty());
        }
        _ => panic!("Expected Input error"),
    }

    // Logging an error should not panic
    error.log();

    let timeout_error = CounselError::Timeout {
        operation: "llm_generate".to_string(),
        duration_ms: 10_000,
        context: ErrorContext::new("test"),
    };
    assert!(timeout_error.is_recoverable());
    assert!(timeout_error.retry_delay_ms().is_some());

    let config_error = config_error!("Invalid config", "test");
    assert!(!config_error.is_recoverable());
    assert!(config_error.retry_delay_ms().is_none());
}

#[tokio::test]
async fn test_retry_mechanism() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let attempt_count = Arc::new(AtomicUsize::new(0));

    let operation = {
        let attempt_count = Arc::clone(&attempt_count);
        move || {
            let count = attempt_count.fetch_add(1, Ordering::SeqCst) + 1;
            let fut = async move {
                if count < 3 {
                    Err(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "Temporary failure",
                    ))
                } else {
                    Ok("Success")
                }
            };
            Box::pin(fut) as futures::future::BoxFuture<'static, Result<&'static str, std::io::Error>>
        }
    };

    let config = RetryConfig {
        max_attempts: 5,
        initial_delay_ms: 10,
        max_delay_ms: 100,
        backoff_multiplier: 2.0,
        jitter: false,
    };

    let result = retry_async(operation, config, "test_operation").await;
    assert_eq!(result.unwrap(), "Success");
    assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_timeout_mechanism() {
    let quick_operation = async {
        sleep(Duration::from_millis(10)).await;
        "Success"
    };

    let result = with_timeout(quick_operation, 100, "quick_test").await;
    assert_eq!(result.unwrap(), "Success");

    let slow_operation = async {
        sleep(Duration::from_millis(200)).await;
        "Should not reach here"
    };

    let result = with_timeout(slow_operation, 50, "slow_test").await;
    match result.unwrap_err() {
        CounselError::Timeout {
            operation,
            duration_ms,
            ..
        } => {
            assert_eq!(operation, "slow_test");
            assert_eq!(duration_ms, 50);
        }
        _ => panic!("Expected Timeout error"),
    }
}

#[tokio::test]
async fn test_cancel_token_propagates() {
    let token = CancelToken::new();
    assert!(token.check("stage_1").is_ok());

    let clone = token.clone();
    clone.cancel();

    assert!(token.is_cancelled());
    match token.check("stage_3").unwrap_err() {
        CounselError::Cancelled { operation, .. } => assert_eq!(operation, "stage_3"),
        _ => panic!("Expected Cancelled error"),
    }
}

#[tokio::test]
async fn test_rate_limiter_enforces_interval() {
    let limiter = RateLimiter::new(1, 50);

    let start = tokio::time::Instant::now();
    {
        let _guard = limiter.acquire().await.unwrap();
    }
    {
        let _guard = limiter.acquire().await.unwrap();
    }
    assert!(start.elapsed() >= Duration::from_millis(50));
}

#[tokio::test]
async fn test_config_validation() {
    let mut settings = CounselSettings::default();
    assert!(settings.validate().is_ok());

    // Fixed six-stage pipeline: other counts must be rejected at load
    settings.research.stage_count = 5;
    match settings.validate().unwrap_err() {
        CounselError::Config { message, .. } => assert!(message.contains("stage_count")),
        _ => panic!("Expected Config error"),
    }
    settings.research.stage_count = 6;

    settings.research.min_confidence_fallback = 1.5;
    assert!(settings.validate().is_err());
    settings.research.min_confidence_fallback = 0.1;

    settings.ai_question_generation.top_p = -0.1;
    assert!(settings.validate().is_err());
    settings.ai_question_generation.top_p = 0.9;

    settings
        .dynamic_personalization
        .conversation_modes
        .quick
        .min_questions = 9;
    assert!(settings.validate().is_err());
}

#[tokio::test]
async fn test_config_round_trip_and_unknown_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.toml");

    let settings = CounselSettings::default();
    settings.save_to_file(&path).unwrap();
    let loaded = CounselSettings::from_file(&path).unwrap();
    assert_eq!(loaded.research.max_gaps_per_stage, 10);
    assert_eq!(loaded.mode_config(ConversationMode::Deep).max_questions, 12);

    // Unknown keys are ignored
    let with_extra = format!(
        "{}\n[experimental]\nshiny = true\n",
        std::fs::read_to_string(&path).unwrap()
    );
    std::fs::write(&path, with_extra).unwrap();
    assert!(CounselSettings::from_file(&path).is_ok());
}
