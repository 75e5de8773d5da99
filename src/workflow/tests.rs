use super::*;
use crate::credentials::{MemoryCredentialStore, MockCredentialStore};
use crate::dispatch::MockPhotoDispatcher;
use crate::generation::MockImageGenerator;

fn artifact(encoded: &str) -> GeneratedArtifact {
    GeneratedArtifact {
        encoded: encoded.to_string(),
    }
}

fn source_image() -> SourceImage {
    SourceImage {
        encoded: "data:image/jpeg;base64,/9j/".to_string(),
        display_name: "cat.jpg".to_string(),
        mime_type: "image/jpeg".to_string(),
    }
}

/// Dispatcher that must never be reached
fn idle_dispatcher() -> MockPhotoDispatcher {
    let mut dispatcher = MockPhotoDispatcher::new();
    dispatcher.expect_send_photo().never();
    dispatcher
}

async fn controller(
    generator: Option<MockImageGenerator>,
    dispatcher: MockPhotoDispatcher,
) -> WorkflowController {
    let generator = generator.map(|g| Arc::new(g) as Arc<dyn ImageGenerator>);
    let result = WorkflowController::new(
        generator,
        Arc::new(dispatcher),
        Arc::new(MemoryCredentialStore::new()),
    )
    .await;
    match result {
        Ok(c) => c,
        Err(e) => panic!("controller construction failed: {e}"),
    }
}

#[tokio::test]
async fn test_empty_prompt_fails_validation_without_network() {
    let mut generator = MockImageGenerator::new();
    generator.expect_generate().never();
    generator.expect_edit().never();
    let wf = controller(Some(generator), idle_dispatcher()).await;

    for prompt in ["", "   "] {
        wf.set_prompt(prompt).await;
        let result = wf.on_generate().await;
        assert!(matches!(result, Err(WorkflowError::Validation(PROMPT_REQUIRED))));

        let snap = wf.snapshot().await;
        assert_eq!(snap.phase, Phase::Idle);
        assert!(snap.artifact.is_none());
    }
}

#[tokio::test]
async fn test_generate_without_source_uses_text_path() {
    let mut generator = MockImageGenerator::new();
    generator
        .expect_generate()
        .withf(|prompt| prompt == "a red fox")
        .times(1)
        .returning(|_| Ok(artifact("data:image/png;base64,QQ==")));
    generator.expect_edit().never();
    let wf = controller(Some(generator), idle_dispatcher()).await;

    wf.set_prompt("a red fox").await;
    assert!(wf.on_generate().await.is_ok());

    let snap = wf.snapshot().await;
    assert_eq!(snap.phase, Phase::Idle);
    assert_eq!(snap.artifact, Some(artifact("data:image/png;base64,QQ==")));
    assert_eq!(snap.status, None);
}

#[tokio::test]
async fn test_generate_with_source_uses_edit_path() {
    let mut generator = MockImageGenerator::new();
    generator.expect_generate().never();
    generator
        .expect_edit()
        .withf(|prompt, encoded, mime| {
            prompt == "add a hat" && encoded == "data:image/jpeg;base64,/9j/" && mime == "image/jpeg"
        })
        .times(1)
        .returning(|_, _, _| Ok(artifact("data:image/png;base64,QQ==")));
    let wf = controller(Some(generator), idle_dispatcher()).await;

    assert!(wf.set_source_image(source_image()).await.is_ok());
    wf.set_prompt("add a hat").await;
    assert!(wf.on_generate().await.is_ok());

    let snap = wf.snapshot().await;
    assert!(snap.is_edit_mode());
    assert!(snap.artifact.is_some());
}

#[tokio::test]
async fn test_missing_generation_key_reports_failure() {
    let wf = controller(None, idle_dispatcher()).await;
    assert_eq!(wf.configuration_warning(), Some(MISSING_API_KEY_MESSAGE));

    wf.set_prompt("cat").await;
    let result = wf.on_generate().await;
    assert!(matches!(
        result,
        Err(WorkflowError::Generation(GenerationError::MissingCredential))
    ));

    let snap = wf.snapshot().await;
    assert!(snap.artifact.is_none());
    assert_eq!(snap.phase, Phase::Idle);
    match snap.status {
        Some(OperationStatus::Failure(msg)) => {
            assert!(msg.starts_with("Google AI API Key is not configured"));
        }
        other => panic!("unexpected status: {other:?}"),
    }

    // The configuration warning survives status dismissal
    wf.dismiss_status().await;
    assert_eq!(
        wf.snapshot().await.configuration_warning,
        Some(MISSING_API_KEY_MESSAGE)
    );
}

#[tokio::test]
async fn test_generation_failure_clears_previous_artifact() {
    let mut generator = MockImageGenerator::new();
    let mut calls = 0;
    generator.expect_generate().times(2).returning(move |_| {
        calls += 1;
        if calls == 1 {
            Ok(artifact("data:image/png;base64,QQ=="))
        } else {
            Err(GenerationError::Service("quota exceeded".to_string()))
        }
    });
    let wf = controller(Some(generator), idle_dispatcher()).await;

    wf.set_prompt("first").await;
    assert!(wf.on_generate().await.is_ok());
    assert!(wf.snapshot().await.artifact.is_some());

    wf.set_prompt("second").await;
    assert!(wf.on_generate().await.is_err());

    let snap = wf.snapshot().await;
    assert!(snap.artifact.is_none());
    assert_eq!(
        snap.status,
        Some(OperationStatus::Failure(
            "Image generation failed: quota exceeded".to_string()
        ))
    );
}

#[tokio::test]
async fn test_send_without_artifact_is_validation_error() {
    let wf = controller(Some(MockImageGenerator::new()), idle_dispatcher()).await;

    let result = wf.on_send().await;
    assert!(matches!(result, Err(WorkflowError::Validation(NOTHING_TO_SEND))));
}

#[tokio::test]
async fn test_send_with_empty_credentials_reveals_entry() {
    let mut generator = MockImageGenerator::new();
    generator
        .expect_generate()
        .returning(|_| Ok(artifact("data:image/png;base64,QQ==")));
    let wf = controller(Some(generator), idle_dispatcher()).await;

    wf.set_prompt("fox").await;
    assert!(wf.on_generate().await.is_ok());
    assert!(wf.set_bot_token("123:abc").await.is_ok());

    let result = wf.on_send().await;
    assert!(matches!(result, Err(WorkflowError::Validation(CREDENTIALS_REQUIRED))));
    assert!(wf.snapshot().await.reveal_credentials);
    assert!(wf.take_credentials_reveal().await);
    assert!(!wf.take_credentials_reveal().await);
}

#[tokio::test]
async fn test_send_success_uses_generation_prompt_as_caption() {
    let mut generator = MockImageGenerator::new();
    generator
        .expect_generate()
        .returning(|_| Ok(artifact("data:image/png;base64,QQ==")));

    let mut dispatcher = MockPhotoDispatcher::new();
    dispatcher
        .expect_send_photo()
        .withf(|token, chat, art, caption| {
            token == "123:abc"
                && chat == "-100"
                && art.encoded == "data:image/png;base64,QQ=="
                && caption == "a red fox"
        })
        .times(1)
        .returning(|_, _, _, _| Ok(()));

    let wf = controller(Some(generator), dispatcher).await;
    assert!(wf.set_bot_token("123:abc").await.is_ok());
    assert!(wf.set_chat_id("-100").await.is_ok());

    wf.set_prompt("a red fox").await;
    assert!(wf.on_generate().await.is_ok());
    wf.set_prompt("edited after generation").await;
    assert!(wf.on_send().await.is_ok());

    let snap = wf.snapshot().await;
    assert_eq!(snap.phase, Phase::Idle);
    assert_eq!(
        snap.status,
        Some(OperationStatus::Success(SEND_SUCCESS_MESSAGE.to_string()))
    );
    // Sending does not consume the artifact
    assert!(snap.artifact.is_some());
}

#[tokio::test]
async fn test_send_failure_carries_service_description() {
    let mut generator = MockImageGenerator::new();
    generator
        .expect_generate()
        .returning(|_| Ok(artifact("data:image/png;base64,QQ==")));

    let mut dispatcher = MockPhotoDispatcher::new();
    dispatcher
        .expect_send_photo()
        .returning(|_, _, _, _| Err(DispatchError::Service("chat not found".to_string())));

    let wf = controller(Some(generator), dispatcher).await;
    assert!(wf.set_bot_token("123:abc").await.is_ok());
    assert!(wf.set_chat_id("nope").await.is_ok());
    wf.set_prompt("fox").await;
    assert!(wf.on_generate().await.is_ok());

    assert!(wf.on_send().await.is_err());
    assert_eq!(
        wf.snapshot().await.status,
        Some(OperationStatus::Failure(
            "Failed to send image to Telegram: chat not found".to_string()
        ))
    );
}

#[tokio::test]
async fn test_dismiss_status_is_idempotent() {
    let wf = controller(None, idle_dispatcher()).await;
    wf.set_prompt("cat").await;
    let _ = wf.on_generate().await;
    assert!(wf.snapshot().await.status.is_some());

    wf.dismiss_status().await;
    let first = wf.snapshot().await;
    wf.dismiss_status().await;
    let second = wf.snapshot().await;

    assert_eq!(first.status, None);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_new_source_clears_artifact() {
    let mut generator = MockImageGenerator::new();
    generator
        .expect_generate()
        .returning(|_| Ok(artifact("data:image/png;base64,QQ==")));
    let wf = controller(Some(generator), idle_dispatcher()).await;

    wf.set_prompt("fox").await;
    assert!(wf.on_generate().await.is_ok());
    assert!(wf.snapshot().await.artifact.is_some());

    assert!(wf.set_source_image(source_image()).await.is_ok());
    let snap = wf.snapshot().await;
    assert!(snap.artifact.is_none());
    assert_eq!(snap.phase, Phase::Idle);
}

#[tokio::test]
async fn test_clearing_source_clears_artifact() {
    let mut generator = MockImageGenerator::new();
    generator
        .expect_edit()
        .returning(|_, _, _| Ok(artifact("data:image/png;base64,QQ==")));
    let wf = controller(Some(generator), idle_dispatcher()).await;

    assert!(wf.set_source_image(source_image()).await.is_ok());
    wf.set_prompt("hat").await;
    assert!(wf.on_generate().await.is_ok());

    assert!(wf.clear_source_image().await.is_ok());
    let snap = wf.snapshot().await;
    assert!(snap.source.is_none());
    assert!(snap.artifact.is_none());
}

#[tokio::test]
async fn test_unreadable_source_is_reported() {
    let wf = controller(Some(MockImageGenerator::new()), idle_dispatcher()).await;

    let result = wf
        .load_source_image(Path::new("/no/such/image.png"), None)
        .await;
    assert!(matches!(result, Err(WorkflowError::Transcode(_))));

    let snap = wf.snapshot().await;
    assert!(snap.source.is_none());
    assert!(snap.status.is_some_and(|s| s.is_failure()));
}

#[tokio::test]
async fn test_credentials_are_written_through_and_reloaded() {
    let store = Arc::new(MemoryCredentialStore::new());
    let first = WorkflowController::new(None, Arc::new(idle_dispatcher()), store.clone()).await;
    let Ok(first) = first else {
        panic!("controller construction failed");
    };
    assert!(first.set_bot_token("123:abc").await.is_ok());
    assert!(first.set_chat_id("42").await.is_ok());

    let second = WorkflowController::new(None, Arc::new(idle_dispatcher()), store).await;
    let Ok(second) = second else {
        panic!("controller construction failed");
    };
    let creds = second.snapshot().await.credentials;
    assert_eq!(creds.bot_token, "123:abc");
    assert_eq!(creds.chat_id, "42");
}

#[tokio::test]
async fn test_credential_write_failure_is_surfaced() {
    let mut store = MockCredentialStore::new();
    store.expect_get().returning(|_| Ok(None));
    store
        .expect_set()
        .returning(|_, _| Err(std::io::Error::other("disk full").into()));

    let wf = WorkflowController::new(None, Arc::new(idle_dispatcher()), Arc::new(store)).await;
    let Ok(wf) = wf else {
        panic!("controller construction failed");
    };

    assert!(matches!(
        wf.set_chat_id("42").await,
        Err(WorkflowError::Storage(_))
    ));
    // The in-memory value still reflects what the user typed
    assert_eq!(wf.snapshot().await.credentials.chat_id, "42");
}

#[tokio::test]
async fn test_second_generate_while_in_flight_is_rejected() {
    use std::time::Duration;

    struct SlowGenerator;

    #[async_trait::async_trait]
    impl ImageGenerator for SlowGenerator {
        async fn generate(&self, _prompt: &str) -> Result<GeneratedArtifact, GenerationError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(GeneratedArtifact {
                encoded: "data:image/png;base64,QQ==".to_string(),
            })
        }

        async fn edit(
            &self,
            _prompt: &str,
            _source_encoded: &str,
            _source_mime: &str,
        ) -> Result<GeneratedArtifact, GenerationError> {
            Err(GenerationError::Service("unused".to_string()))
        }
    }

    let wf = Arc::new(
        match WorkflowController::new(
            Some(Arc::new(SlowGenerator) as Arc<dyn ImageGenerator>),
            Arc::new(idle_dispatcher()),
            Arc::new(MemoryCredentialStore::new()),
        )
        .await
        {
            Ok(c) => c,
            Err(e) => panic!("controller construction failed: {e}"),
        },
    );
    wf.set_prompt("fox").await;

    let first = tokio::spawn({
        let wf = Arc::clone(&wf);
        async move { wf.on_generate().await }
    });

    // Let the first request reach the generator
    while wf.snapshot().await.phase != Phase::Generating {
        tokio::task::yield_now().await;
    }

    assert!(matches!(
        wf.on_generate().await,
        Err(WorkflowError::AlreadyInProgress(Phase::Generating))
    ));
    assert!(matches!(
        wf.on_send().await,
        Err(WorkflowError::AlreadyInProgress(Phase::Generating))
    ));
    assert!(matches!(
        wf.set_source_image(source_image()).await,
        Err(WorkflowError::AlreadyInProgress(_))
    ));

    let joined = first.await;
    assert!(matches!(joined, Ok(Ok(()))));
    assert!(wf.snapshot().await.artifact.is_some());
}

/// Generator whose requests never complete
struct StalledGenerator;

#[async_trait::async_trait]
impl ImageGenerator for StalledGenerator {
    async fn generate(&self, _prompt: &str) -> Result<GeneratedArtifact, GenerationError> {
        std::future::pending().await
    }

    async fn edit(
        &self,
        _prompt: &str,
        _source_encoded: &str,
        _source_mime: &str,
    ) -> Result<GeneratedArtifact, GenerationError> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_abandoned_generate_returns_to_idle() {
    use std::time::Duration;

    let wf = match WorkflowController::new(
        Some(Arc::new(StalledGenerator) as Arc<dyn ImageGenerator>),
        Arc::new(idle_dispatcher()),
        Arc::new(MemoryCredentialStore::new()),
    )
    .await
    {
        Ok(c) => c,
        Err(e) => panic!("controller construction failed: {e}"),
    };
    wf.set_prompt("fox").await;
    assert!(wf.set_source_image(source_image()).await.is_ok());

    let timed_out = tokio::time::timeout(Duration::from_millis(50), wf.on_generate()).await;
    assert!(timed_out.is_err());

    let snap = wf.snapshot().await;
    assert_eq!(snap.phase, Phase::Idle);
    assert!(snap.artifact.is_none());
    assert!(wf.clear_source_image().await.is_ok());

    // A fresh request is accepted again; it stalls too, so only its start is observed
    let retried = tokio::time::timeout(Duration::from_millis(50), wf.on_generate()).await;
    assert!(retried.is_err());
    assert_eq!(wf.snapshot().await.phase, Phase::Idle);
}

#[tokio::test]
async fn test_abandoned_send_returns_to_idle() {
    use std::time::Duration;

    struct StalledDispatcher;

    #[async_trait::async_trait]
    impl PhotoDispatcher for StalledDispatcher {
        async fn send_photo(
            &self,
            _bot_token: &str,
            _chat_id: &str,
            _artifact: &GeneratedArtifact,
            _caption: &str,
        ) -> Result<(), DispatchError> {
            std::future::pending().await
        }
    }

    let mut generator = MockImageGenerator::new();
    generator
        .expect_generate()
        .returning(|_| Ok(artifact("data:image/png;base64,QQ==")));
    let wf = match WorkflowController::new(
        Some(Arc::new(generator) as Arc<dyn ImageGenerator>),
        Arc::new(StalledDispatcher),
        Arc::new(MemoryCredentialStore::new()),
    )
    .await
    {
        Ok(c) => c,
        Err(e) => panic!("controller construction failed: {e}"),
    };
    wf.set_prompt("fox").await;
    assert!(wf.set_bot_token("123:abc").await.is_ok());
    assert!(wf.set_chat_id("42").await.is_ok());
    assert!(wf.on_generate().await.is_ok());

    let timed_out = tokio::time::timeout(Duration::from_millis(50), wf.on_send()).await;
    assert!(timed_out.is_err());

    let snap = wf.snapshot().await;
    assert_eq!(snap.phase, Phase::Idle);
    assert!(snap.artifact.is_some());
    assert!(wf.on_generate().await.is_ok());
}
