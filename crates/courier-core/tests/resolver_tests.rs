mod common;

use common::*;
use serde_json::json;

use courier_core::domain::repository::{FormRepository, ValidationRecordRepository};
use courier_core::{
    CoreError, EngineCommand, ExecutionStatus, ExecutionStore, FetchedMedia, FormDecision,
    FormInstance, FormInstanceId, FormStatus, ResolveOutcome, ResumeInput, StepStatus,
    ValidatorKind, WebhookOutcome,
};

fn jpeg() -> FetchedMedia {
    FetchedMedia {
        bytes: vec![0xFF, 0xD8, 0xFF],
        mime_type: "image/jpeg".to_string(),
    }
}

#[tokio::test]
async fn test_resolver_uses_flagged_step_not_header_hint() {
    let mut harness = Harness::new();
    // Header says step 0, but step 2 is the one actually waiting
    let execution = harness
        .seed_waiting(
            ExecutionStatus::Waiting,
            2,
            0,
            ValidatorKind::Number {
                min: Some(1.0),
                max: Some(100.0),
            },
        )
        .await;

    let ack = harness.service.handle(TOKEN, &text_payload("wamid.1", "42")).await;
    assert_eq!(
        ack.outcome,
        WebhookOutcome::ExecutionResumed {
            execution_id: execution.id.clone()
        }
    );

    let records = harness.records.list_for_execution(&execution.id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].step_index, 2);
    assert!(records[0].is_valid);
    assert_eq!(records[0].validator_kind, "number");

    let stored = harness.executions.find_by_id(&execution.id).await.unwrap().unwrap();
    assert!(!stored.is_waiting);
    assert_eq!(stored.status, ExecutionStatus::Running);
    assert!(stored.waiting_for_user.is_none());

    // The step keeps its flag for the engine to transition
    let step = harness.executions.find_step(&execution.id, 2).await.unwrap().unwrap();
    assert!(step.is_waiting);

    match harness.engine_commands().as_slice() {
        [EngineCommand::Resume {
            input: ResumeInput::Reply { processed_data, .. },
            ..
        }] => assert_eq!(processed_data, &Some(json!(42.0))),
        other => panic!("expected one reply resume, got {:?}", other),
    }
}

#[tokio::test]
async fn test_invalid_reply_keeps_waiting_and_prompts() {
    let mut harness = Harness::new();
    let execution = harness
        .seed_waiting(
            ExecutionStatus::Waiting,
            0,
            0,
            ValidatorKind::Number {
                min: None,
                max: None,
            },
        )
        .await;

    let ack = harness
        .service
        .handle(TOKEN, &text_payload("wamid.2", "forty-two"))
        .await;
    assert!(ack.success);
    assert_eq!(
        ack.outcome,
        WebhookOutcome::AwaitingValidInput {
            execution_id: execution.id.clone()
        }
    );

    let stored = harness.executions.find_by_id(&execution.id).await.unwrap().unwrap();
    assert!(stored.is_waiting);
    assert_eq!(stored.status, ExecutionStatus::Waiting);

    let records = harness.records.list_for_execution(&execution.id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(!records[0].is_valid);
    assert_eq!(records[0].raw_input, "forty-two");

    assert_eq!(harness.sender.texts(), vec!["Please reply with a number."]);
    assert!(harness.engine_commands().is_empty());
}

#[tokio::test]
async fn test_qr_decode_failure_records_attempt_and_keeps_waiting() {
    let mut media = MockMedia::new();
    media
        .expect_fetch()
        .withf(|_, media_id| media_id == "media-9")
        .times(1)
        .returning(|_, _| Ok(jpeg()));
    let mut qr = MockQr::new();
    qr.expect_decode().times(1).returning(|_| Ok(None));

    let mut harness = Harness::with_capabilities(media, qr);
    let execution = harness
        .seed_waiting(ExecutionStatus::WaitingForQRCode, 1, 1, ValidatorKind::default())
        .await;

    let ack = harness
        .service
        .handle(TOKEN, &image_payload("wamid.3", "media-9", Some("my badge")))
        .await;
    assert_eq!(
        ack.outcome,
        WebhookOutcome::AwaitingValidInput {
            execution_id: execution.id.clone()
        }
    );

    let stored = harness.executions.find_by_id(&execution.id).await.unwrap().unwrap();
    assert!(stored.is_waiting);
    assert_eq!(stored.status, ExecutionStatus::WaitingForQRCode);

    let step = harness.executions.find_step(&execution.id, 1).await.unwrap().unwrap();
    assert!(step.is_waiting);
    assert_eq!(step.status, StepStatus::Waiting);

    let records = harness.records.list_for_execution(&execution.id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(!records[0].is_valid);
    assert_eq!(records[0].raw_input, "my badge");
    assert_eq!(records[0].media_ref.as_deref(), Some("media-9"));
    assert_eq!(records[0].validator_kind, "qr_code");
    assert_eq!(records[0].processed_data, Some(json!({ "caption": "my badge" })));

    assert_eq!(
        harness.sender.texts(),
        vec![harness.service.config().qr_error_prompt.clone()]
    );
    assert!(harness.engine_commands().is_empty());
}

#[tokio::test]
async fn test_qr_decoder_error_counts_as_failed_decode() {
    let mut media = MockMedia::new();
    media.expect_fetch().returning(|_, _| Ok(jpeg()));
    let mut qr = MockQr::new();
    qr.expect_decode()
        .returning(|_| Err(CoreError::ExternalDependency("decoder down".to_string())));

    let harness = Harness::with_capabilities(media, qr);
    let execution = harness
        .seed_waiting(ExecutionStatus::WaitingForQRCode, 0, 0, ValidatorKind::default())
        .await;

    let ack = harness
        .service
        .handle(TOKEN, &image_payload("wamid.4", "media-1", None))
        .await;
    assert!(ack.success);

    let records = harness.records.list_for_execution(&execution.id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(!records[0].is_valid);
    assert_eq!(records[0].raw_input, "");
}

#[tokio::test]
async fn test_qr_success_completes_step_and_resumes() {
    let mut media = MockMedia::new();
    media.expect_fetch().times(1).returning(|_, _| Ok(jpeg()));
    let mut qr = MockQr::new();
    qr.expect_decode()
        .withf(|bytes| bytes == [0xFF, 0xD8, 0xFF])
        .times(1)
        .returning(|_| Ok(Some("BADGE-42".to_string())));

    let mut harness = Harness::with_capabilities(media, qr);
    let execution = harness
        .seed_waiting(ExecutionStatus::WaitingForQRCode, 1, 1, ValidatorKind::default())
        .await;

    let ack = harness
        .service
        .handle(TOKEN, &image_payload("wamid.5", "media-2", Some("entrance")))
        .await;
    assert_eq!(
        ack.outcome,
        WebhookOutcome::ExecutionResumed {
            execution_id: execution.id.clone()
        }
    );

    let step = harness.executions.find_step(&execution.id, 1).await.unwrap().unwrap();
    assert!(!step.is_waiting);
    assert_eq!(step.status, StepStatus::Completed);
    assert_eq!(step.output, Some(json!({ "qr_value": "BADGE-42" })));

    let stored = harness.executions.find_by_id(&execution.id).await.unwrap().unwrap();
    assert!(!stored.is_waiting);

    let records = harness.records.list_for_execution(&execution.id).await.unwrap();
    assert!(records[0].is_valid);
    assert_eq!(records[0].processed_data.as_ref().unwrap()["caption"], "entrance");

    match harness.engine_commands().as_slice() {
        [EngineCommand::Resume {
            input: ResumeInput::QrCode { value, .. },
            ..
        }] => assert_eq!(value, "BADGE-42"),
        other => panic!("expected one QR resume, got {:?}", other),
    }
    assert!(harness.sender.sent().is_empty());
}

#[tokio::test]
async fn test_qr_resume_failure_restores_waiting_step() {
    let mut media = MockMedia::new();
    media.expect_fetch().returning(|_, _| Ok(jpeg()));
    let mut qr = MockQr::new();
    qr.expect_decode()
        .returning(|_| Ok(Some("BADGE-42".to_string())));

    let mut harness = Harness::with_capabilities(media, qr);
    drop(std::mem::replace(&mut harness.engine_rx, tokio::sync::mpsc::channel(1).1));
    let execution = harness
        .seed_waiting(ExecutionStatus::WaitingForQRCode, 1, 1, ValidatorKind::default())
        .await;

    let ack = harness
        .service
        .handle(TOKEN, &image_payload("wamid.5b", "media-2", None))
        .await;
    assert!(!ack.success);
    assert!(matches!(ack.outcome, WebhookOutcome::Failed { .. }));

    let step = harness.executions.find_step(&execution.id, 1).await.unwrap().unwrap();
    assert!(step.is_waiting);
    assert_eq!(step.status, StepStatus::Waiting);
    assert_eq!(step.output, None);

    let stored = harness.executions.find_by_id(&execution.id).await.unwrap().unwrap();
    assert!(stored.is_waiting);
    assert_eq!(stored.status, ExecutionStatus::WaitingForQRCode);
}

#[tokio::test]
async fn test_qr_wait_without_image_reprompts_without_record() {
    let harness = Harness::new();
    let execution = harness
        .seed_waiting(ExecutionStatus::WaitingForQRCode, 0, 0, ValidatorKind::default())
        .await;

    let ack = harness
        .service
        .handle(TOKEN, &text_payload("wamid.6", "here it is"))
        .await;
    assert_eq!(
        ack.outcome,
        WebhookOutcome::AwaitingValidInput {
            execution_id: execution.id.clone()
        }
    );
    assert!(harness
        .records
        .list_for_execution(&execution.id)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(harness.sender.texts().len(), 1);
}

#[tokio::test]
async fn test_qr_media_fetch_failure_reprompts_without_record() {
    let mut media = MockMedia::new();
    media
        .expect_fetch()
        .returning(|_, _| Err(CoreError::ExternalDependency("404".to_string())));
    let mut qr = MockQr::new();
    qr.expect_decode().never();

    let harness = Harness::with_capabilities(media, qr);
    let execution = harness
        .seed_waiting(ExecutionStatus::WaitingForQRCode, 0, 0, ValidatorKind::default())
        .await;

    let ack = harness
        .service
        .handle(TOKEN, &image_payload("wamid.7", "media-x", None))
        .await;
    assert!(ack.success);
    assert!(harness
        .records
        .list_for_execution(&execution.id)
        .await
        .unwrap()
        .is_empty());
    let stored = harness.executions.find_by_id(&execution.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ExecutionStatus::WaitingForQRCode);
}

#[tokio::test]
async fn test_message_during_form_approval_gets_pending_notice() {
    let mut harness = Harness::new();
    let execution = harness
        .seed_waiting(
            ExecutionStatus::WaitingForFormApproval,
            0,
            0,
            ValidatorKind::default(),
        )
        .await;

    let ack = harness.service.handle(TOKEN, &text_payload("wamid.8", "any news?")).await;
    assert_eq!(
        ack.outcome,
        WebhookOutcome::ApprovalPending {
            execution_id: execution.id.clone()
        }
    );
    assert_eq!(
        harness.sender.texts(),
        vec![harness.service.config().approval_pending_message.clone()]
    );
    assert!(harness.engine_commands().is_empty());
}

#[tokio::test]
async fn test_form_decision_stamps_variable_and_resumes() {
    let mut harness = Harness::new();
    let execution = harness
        .seed_waiting(
            ExecutionStatus::WaitingForFormApproval,
            3,
            3,
            ValidatorKind::default(),
        )
        .await;
    harness
        .forms
        .save(&FormInstance {
            id: FormInstanceId("form-1".to_string()),
            execution_id: execution.id.clone(),
            status: FormStatus::Pending,
            decision_variable: None,
            decided_by: None,
            comment: None,
            decided_at: None,
        })
        .await
        .unwrap();

    let outcome = harness
        .service
        .decide_form(&FormDecision {
            form_instance_id: FormInstanceId("form-1".to_string()),
            status: FormStatus::Approved,
            decided_by: Some("reviewer@acme".to_string()),
            comment: Some("looks good".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ResolveOutcome::Resumed {
            execution_id: execution.id.clone()
        }
    );

    let form = harness
        .forms
        .find_by_id(&FormInstanceId("form-1".to_string()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(form.status, FormStatus::Approved);
    assert_eq!(form.decided_by.as_deref(), Some("reviewer@acme"));
    assert!(form.decided_at.is_some());

    let stored = harness.executions.find_by_id(&execution.id).await.unwrap().unwrap();
    assert!(!stored.is_waiting);
    assert_eq!(stored.variables.get("approval_status"), Some(&json!("approved")));

    match harness.engine_commands().as_slice() {
        [EngineCommand::Resume {
            input: ResumeInput::FormDecision { status, .. },
            ..
        }] => assert_eq!(*status, FormStatus::Approved),
        other => panic!("expected one form resume, got {:?}", other),
    }

    // A second decision finds nothing waiting
    let again = harness
        .service
        .decide_form(&FormDecision {
            form_instance_id: FormInstanceId("form-1".to_string()),
            status: FormStatus::Rejected,
            decided_by: None,
            comment: None,
        })
        .await;
    assert!(matches!(again, Err(CoreError::InvalidState(_))));
}

#[tokio::test]
async fn test_form_decision_uses_custom_variable() {
    let harness = Harness::new();
    let execution = harness
        .seed_waiting(
            ExecutionStatus::WaitingForFormApproval,
            0,
            0,
            ValidatorKind::default(),
        )
        .await;
    harness
        .forms
        .save(&FormInstance {
            id: FormInstanceId("form-2".to_string()),
            execution_id: execution.id.clone(),
            status: FormStatus::Pending,
            decision_variable: Some("manager_verdict".to_string()),
            decided_by: None,
            comment: None,
            decided_at: None,
        })
        .await
        .unwrap();

    harness
        .service
        .decide_form(&FormDecision {
            form_instance_id: FormInstanceId("form-2".to_string()),
            status: FormStatus::Rejected,
            decided_by: None,
            comment: None,
        })
        .await
        .unwrap();

    let stored = harness.executions.find_by_id(&execution.id).await.unwrap().unwrap();
    assert_eq!(stored.variables.get("manager_verdict"), Some(&json!("rejected")));
    assert!(!stored.variables.contains_key("approval_status"));
}

#[tokio::test]
async fn test_form_decision_resume_failure_leaves_form_pending() {
    let mut harness = Harness::new();
    drop(std::mem::replace(&mut harness.engine_rx, tokio::sync::mpsc::channel(1).1));
    let execution = harness
        .seed_waiting(
            ExecutionStatus::WaitingForFormApproval,
            0,
            0,
            ValidatorKind::default(),
        )
        .await;
    harness
        .forms
        .save(&FormInstance {
            id: FormInstanceId("form-3".to_string()),
            execution_id: execution.id.clone(),
            status: FormStatus::Pending,
            decision_variable: None,
            decided_by: None,
            comment: None,
            decided_at: None,
        })
        .await
        .unwrap();

    let result = harness
        .service
        .decide_form(&FormDecision {
            form_instance_id: FormInstanceId("form-3".to_string()),
            status: FormStatus::Approved,
            decided_by: None,
            comment: None,
        })
        .await;
    assert!(result.unwrap_err().is_downstream());

    let form = harness
        .forms
        .find_by_id(&FormInstanceId("form-3".to_string()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(form.status, FormStatus::Pending);
    assert!(form.decided_at.is_none());

    let stored = harness.executions.find_by_id(&execution.id).await.unwrap().unwrap();
    assert!(stored.is_waiting);
    assert_eq!(stored.status, ExecutionStatus::WaitingForFormApproval);
    assert!(!stored.variables.contains_key("approval_status"));
}

#[tokio::test]
async fn test_form_decision_errors() {
    let harness = Harness::new();

    let missing = harness
        .service
        .decide_form(&FormDecision {
            form_instance_id: FormInstanceId("nope".to_string()),
            status: FormStatus::Approved,
            decided_by: None,
            comment: None,
        })
        .await;
    assert!(matches!(missing, Err(CoreError::FormInstanceNotFound(_))));

    let pending = harness
        .service
        .decide_form(&FormDecision {
            form_instance_id: FormInstanceId("nope".to_string()),
            status: FormStatus::Pending,
            decided_by: None,
            comment: None,
        })
        .await;
    assert!(matches!(pending, Err(CoreError::Validation(_))));
}
