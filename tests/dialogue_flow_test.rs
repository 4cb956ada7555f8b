//! 对话流程集成测试：用脚本化补全服务驱动完整会话

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use duet::completion::{
        CompletionError, CompletionErrorKind, ImagePayload, ModelProfile, ScriptedCompletionService,
    };
    use duet::core::{
        DialogueError, DialoguePhase, DiscussionMode, RecoveryEngine, RetryPolicy, Session,
        SessionProgress, SessionStatus,
    };
    use duet::dialogue::{
        DialogueEvent, DialogueSettings, Observers, PromptSet, StepExecutor, StepId,
        TurnOrchestrator, TurnPurpose,
    };
    use duet::notepad::NotepadDocument;
    use duet::persona::{Persona, Speaker};
    use tokio::sync::{mpsc, watch};
    use tokio_util::sync::CancellationToken;

    fn settings() -> DialogueSettings {
        DialogueSettings {
            logical_model: ModelProfile::new("logic-model"),
            creative_model: ModelProfile::new("muse-model"),
            prompts: PromptSet::default(),
        }
    }

    fn orchestrator(service: &Arc<ScriptedCompletionService>, retries: u32) -> TurnOrchestrator {
        let executor = StepExecutor::new(
            service.clone(),
            RecoveryEngine::new(RetryPolicy::new(retries, Duration::ZERO)),
        );
        TurnOrchestrator::new(executor, settings())
    }

    fn session(mode: DiscussionMode) -> Session {
        Session::new("Hello", None, mode, NotepadDocument::default())
    }

    fn scripted(replies: &[&str]) -> ScriptedCompletionService {
        replies
            .iter()
            .fold(ScriptedCompletionService::new(), |s, r| s.reply(*r))
    }

    fn speakers(session: &Session) -> Vec<Speaker> {
        session.transcript.iter().map(|t| t.speaker).collect()
    }

    #[tokio::test]
    async fn test_fixed_one_turn_sequence() {
        let service = Arc::new(scripted(&[
            "opening",
            "challenge",
            "answer",
            "见记事本 <np-replace-all>final answer</np-replace-all>",
        ]));
        let (progress_tx, progress_rx) = watch::channel(SessionProgress::default());
        let (ev_tx, mut ev_rx) = mpsc::unbounded_channel();
        let mut s = session(DiscussionMode::fixed(1));

        orchestrator(&service, 2)
            .run(
                &mut s,
                &CancellationToken::new(),
                Observers {
                    events: Some(&ev_tx),
                    progress: Some(&progress_tx),
                },
            )
            .await
            .unwrap();

        assert_eq!(
            speakers(&s),
            vec![
                Speaker::Logical,
                Speaker::Creative,
                Speaker::Logical,
                Speaker::Synthesizer
            ]
        );
        assert_eq!(s.transcript[0].purpose, TurnPurpose::ToPartner);
        assert_eq!(s.transcript[3].purpose, TurnPurpose::FinalAnswer);
        assert_eq!(s.status, SessionStatus::Done);
        assert_eq!(s.notepad.content(), "final answer");
        assert_eq!(s.notepad.last_updated_by(), Some(Speaker::Synthesizer));

        let progress = progress_rx.borrow().clone();
        assert_eq!(progress.phase, DialoguePhase::Done);
        assert_eq!(progress.last_completed_turns, 1);
        assert!(!progress.discussion_active);
        assert!(progress.last_session_duration_ms.is_some());

        let mut phases = Vec::new();
        while let Ok(ev) = ev_rx.try_recv() {
            if let DialogueEvent::Phase { phase } = ev {
                phases.push(phase);
            }
        }
        assert_eq!(
            phases,
            vec![
                DialoguePhase::InitialStatement,
                DialoguePhase::DiscussionTurn {
                    turn: 0,
                    speaker: Persona::Creative
                },
                DialoguePhase::DiscussionTurn {
                    turn: 0,
                    speaker: Persona::Logical
                },
                DialoguePhase::Synthesizing,
                DialoguePhase::Done,
            ]
        );

        let models: Vec<String> = service.requests().into_iter().map(|r| r.model).collect();
        assert_eq!(
            models,
            vec!["logic-model", "muse-model", "logic-model", "logic-model"]
        );
    }

    #[tokio::test]
    async fn test_fixed_turns_produce_n_rounds() {
        for n in 1..=4usize {
            let replies: Vec<String> = (0..2 * n + 2).map(|i| format!("reply {i}")).collect();
            let refs: Vec<&str> = replies.iter().map(String::as_str).collect();
            let service = Arc::new(scripted(&refs));
            let mut s = session(DiscussionMode::fixed(n));
            orchestrator(&service, 0)
                .run(&mut s, &CancellationToken::new(), Observers::default())
                .await
                .unwrap();

            let creative = s
                .transcript
                .iter()
                .filter(|t| t.speaker == Speaker::Creative)
                .count();
            let logical_replies = s
                .transcript
                .iter()
                .filter(|t| t.speaker == Speaker::Logical && t.purpose == TurnPurpose::ReplyToPartner)
                .count();
            assert_eq!(creative, n);
            assert_eq!(logical_replies, n);
            assert_eq!(service.remaining(), 0);
        }
    }

    #[tokio::test]
    async fn test_ai_driven_mutual_agreement_ends_after_turn_zero() {
        let service = Arc::new(scripted(&[
            "你好！ <DISCUSSION_COMPLETE>",
            "同意 <DISCUSSION_COMPLETE>",
            "<np-replace-all>你好</np-replace-all>",
        ]));
        let mut s = session(DiscussionMode::AiDriven);
        orchestrator(&service, 0)
            .run(&mut s, &CancellationToken::new(), Observers::default())
            .await
            .unwrap();

        assert_eq!(
            speakers(&s),
            vec![Speaker::Logical, Speaker::Creative, Speaker::Synthesizer]
        );
        assert!(s.transcript[0].signaled_termination);
        assert_eq!(s.transcript[0].text, "你好！");
        assert!(s
            .advisories
            .contains(&"Cognito 已建议结束讨论。等待 Muse 的回应。".to_string()));
        assert!(s
            .advisories
            .contains(&"双方AI (Cognito 和 Muse) 已同意结束讨论。".to_string()));

        let requests = service.requests();
        assert!(requests[1].prompt.contains("Cognito ended its message with"));
        assert!(requests[0].prompt.contains("<DISCUSSION_COMPLETE>"));
    }

    #[tokio::test]
    async fn test_ai_driven_non_adjacent_signals_do_not_end() {
        let service = Arc::new(scripted(&[
            "open <DISCUSSION_COMPLETE>",
            "no",
            "still going",
            "maybe done <DISCUSSION_COMPLETE>",
            "done <DISCUSSION_COMPLETE>",
            "<np-replace-all>x</np-replace-all>",
        ]));
        let mut s = session(DiscussionMode::AiDriven);
        orchestrator(&service, 0)
            .run(&mut s, &CancellationToken::new(), Observers::default())
            .await
            .unwrap();

        assert_eq!(s.transcript.len(), 6);
        assert_eq!(s.completed_rounds(), 2);
        assert_eq!(s.final_answer().map(|t| t.speaker), Some(Speaker::Synthesizer));
        // 单方信号只提示对方
        assert!(!service.requests()[2].prompt.contains("ended its message with"));
        assert!(service.requests()[4].prompt.contains("Muse ended its message with"));
    }

    #[tokio::test]
    async fn test_exhausted_creative_turn_resumes_into_logical() {
        let service = Arc::new(
            scripted(&["init", "c0", "l0"])
                .fail(CompletionError::other("503 unavailable"))
                .reply("c1")
                .reply("l1")
                .reply("<np-replace-all>done</np-replace-all>"),
        );
        let orch = orchestrator(&service, 0);
        let mut s = session(DiscussionMode::fixed(2));

        let err = orch
            .run(&mut s, &CancellationToken::new(), Observers::default())
            .await
            .unwrap_err();
        let DialogueError::Exhausted {
            step, checkpoint, ..
        } = err
        else {
            panic!("expected exhausted error");
        };
        assert_eq!(step, StepId::CreativeReply { turn: 1 });
        assert_eq!(checkpoint.turn_index, 1);
        assert_eq!(checkpoint.transcript.len(), 3);
        assert_eq!(s.status, SessionStatus::AwaitingManualRetry);
        let pending = s.pending_checkpoint.clone().unwrap();
        assert_eq!(pending.prompt, service.requests()[3].prompt);

        orch.resume(&mut s, &CancellationToken::new(), Observers::default())
            .await
            .unwrap();
        let requests = service.requests();
        assert_eq!(requests[4].prompt, pending.prompt);
        assert_eq!(requests[4].model, "muse-model");
        assert_eq!(requests[5].model, "logic-model");
        assert!(requests[5].prompt.contains("Muse: c1"));
        assert_eq!(s.status, SessionStatus::Done);
        assert!(s.pending_checkpoint.is_none());
        assert_eq!(
            s.transcript.iter().map(|t| t.text.as_str()).collect::<Vec<_>>(),
            vec!["init", "c0", "l0", "c1", "l1", "(AI 修改了记事本 (1 项操作))"]
        );
        assert!(s.advisories.iter().any(|a| a.contains("手动重试成功")));
    }

    #[tokio::test]
    async fn test_resume_from_creative_turn_two_matches_clean_run() {
        let replies: Vec<String> = (0..10).map(|i| format!("r{i} <np-append>line {i}</np-append>")).collect();
        let refs: Vec<&str> = replies.iter().map(String::as_str).collect();

        let clean = Arc::new(scripted(&refs));
        let mut clean_session = session(DiscussionMode::fixed(4));
        orchestrator(&clean, 0)
            .run(&mut clean_session, &CancellationToken::new(), Observers::default())
            .await
            .unwrap();

        // 第 5 次调用（Creative 第 2 轮）失败
        let flaky = ScriptedCompletionService::new();
        for (i, r) in refs.iter().enumerate() {
            if i == 5 {
                flaky.push(Err(CompletionError::other("timeout")));
            }
            flaky.push(Ok(r.to_string()));
        }
        let flaky = Arc::new(flaky);
        let orch = orchestrator(&flaky, 0);
        let mut s = session(DiscussionMode::fixed(4));
        assert!(orch
            .run(&mut s, &CancellationToken::new(), Observers::default())
            .await
            .is_err());
        assert_eq!(
            s.pending_checkpoint.as_ref().map(|c| c.step),
            Some(StepId::CreativeReply { turn: 2 })
        );

        let (ev_tx, mut ev_rx) = mpsc::unbounded_channel();
        orch.resume(
            &mut s,
            &CancellationToken::new(),
            Observers {
                events: Some(&ev_tx),
                progress: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(s.transcript, clean_session.transcript);
        assert_eq!(s.notepad.content(), clean_session.notepad.content());

        let mut flaky_prompts: Vec<String> =
            flaky.requests().into_iter().map(|r| r.prompt).collect();
        flaky_prompts.remove(5);
        let clean_prompts: Vec<String> = clean.requests().into_iter().map(|r| r.prompt).collect();
        assert_eq!(flaky_prompts, clean_prompts);

        let mut turns = Vec::new();
        while let Ok(ev) = ev_rx.try_recv() {
            if let DialogueEvent::Phase {
                phase: DialoguePhase::DiscussionTurn { turn, speaker },
            } = ev
            {
                turns.push((turn, speaker));
            }
        }
        assert_eq!(
            turns,
            vec![
                (2, Persona::Creative),
                (2, Persona::Logical),
                (3, Persona::Creative),
                (3, Persona::Logical),
            ]
        );
    }

    #[tokio::test]
    async fn test_ai_driven_resume_agrees_with_stored_partner_signal() {
        let service = Arc::new(
            scripted(&["done already <DISCUSSION_COMPLETE>"])
                .fail(CompletionError::other("503"))
                .reply("agreed <DISCUSSION_COMPLETE>")
                .reply("<np-replace-all>answer</np-replace-all>"),
        );
        let orch = orchestrator(&service, 0);
        let mut s = session(DiscussionMode::AiDriven);

        let err = orch
            .run(&mut s, &CancellationToken::new(), Observers::default())
            .await
            .unwrap_err();
        let DialogueError::Exhausted { checkpoint, .. } = err else {
            panic!("expected exhausted error");
        };
        assert_eq!(checkpoint.step, StepId::CreativeReply { turn: 0 });
        assert!(checkpoint.partner_signaled_termination);
        assert_eq!(checkpoint.mode, DiscussionMode::AiDriven);

        orch.resume(&mut s, &CancellationToken::new(), Observers::default())
            .await
            .unwrap();
        assert_eq!(
            speakers(&s),
            vec![Speaker::Logical, Speaker::Creative, Speaker::Synthesizer]
        );
        assert_eq!(s.status, SessionStatus::Done);
        assert_eq!(s.notepad.content(), "answer");
        assert_eq!(service.remaining(), 0);
        assert!(s
            .advisories
            .contains(&"双方AI (Cognito 和 Muse) 已同意结束讨论。".to_string()));
    }

    #[tokio::test]
    async fn test_failed_manual_retry_creates_fresh_checkpoint() {
        let service = Arc::new(
            scripted(&["init"])
                .fail(CompletionError::other("first"))
                .fail(CompletionError::other("second")),
        );
        let orch = orchestrator(&service, 0);
        let mut s = session(DiscussionMode::fixed(1));
        assert!(orch
            .run(&mut s, &CancellationToken::new(), Observers::default())
            .await
            .is_err());
        let first = s.pending_checkpoint.clone().unwrap();

        let err = orch
            .resume(&mut s, &CancellationToken::new(), Observers::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("second"));
        let second = s.pending_checkpoint.clone().unwrap();
        assert_eq!(second.step, first.step);
        assert_eq!(second.prompt, first.prompt);
        assert!(second.error_message.contains("second"));
        assert_eq!(s.status, SessionStatus::AwaitingManualRetry);
    }

    #[tokio::test]
    async fn test_credential_error_is_fatal_without_checkpoint() {
        let service = Arc::new(ScriptedCompletionService::new().fail(CompletionError::new(
            CompletionErrorKind::CredentialMissing,
            "API key is not set",
        )));
        let (progress_tx, progress_rx) = watch::channel(SessionProgress::default());
        let mut s = session(DiscussionMode::fixed(1));
        let err = orchestrator(&service, 2)
            .run(
                &mut s,
                &CancellationToken::new(),
                Observers {
                    events: None,
                    progress: Some(&progress_tx),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "API key is not set");
        assert_eq!(service.call_count(), 1);
        assert!(s.pending_checkpoint.is_none());
        assert_eq!(
            s.status,
            SessionStatus::Failed("API key is not set".to_string())
        );
        assert_eq!(progress_rx.borrow().phase, DialoguePhase::Failed);
    }

    #[tokio::test]
    async fn test_cancel_during_call_discards_result() {
        let token = CancellationToken::new();
        let service = Arc::new(
            scripted(&["init", "<np-replace-all>wiped</np-replace-all> c0"])
                .cancel_during_call(1, token.clone()),
        );
        let (progress_tx, progress_rx) = watch::channel(SessionProgress::default());
        let mut s = session(DiscussionMode::fixed(1));
        let err = orchestrator(&service, 0)
            .run(
                &mut s,
                &token,
                Observers {
                    events: None,
                    progress: Some(&progress_tx),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DialogueError::Cancelled));
        assert_eq!(s.transcript.len(), 1);
        assert_eq!(s.notepad.history_len(), 1);
        assert_eq!(s.status, SessionStatus::Cancelled);
        assert!(s.pending_checkpoint.is_none());
        assert_eq!(progress_rx.borrow().phase, DialoguePhase::Cancelled);
        assert_eq!(progress_rx.borrow().last_completed_turns, 0);
    }

    #[tokio::test]
    async fn test_notepad_errors_do_not_stop_the_session() {
        let service = Arc::new(scripted(&[
            "opening <np-delete line=\"99\"/><np-insert line=\"abc\">x</np-insert><np-append>kept</np-append>",
            "c0",
            "l0",
            "final",
        ]));
        let mut s = session(DiscussionMode::fixed(1));
        orchestrator(&service, 0)
            .run(&mut s, &CancellationToken::new(), Observers::default())
            .await
            .unwrap();
        assert_eq!(s.status, SessionStatus::Done);
        assert_eq!(s.advisories.len(), 2);
        assert!(s.notepad.content().ends_with("kept"));
        assert_eq!(s.transcript[0].text, "opening <np-insert line=\"abc\">x</np-insert>");
    }

    #[tokio::test]
    async fn test_image_and_system_instruction_forwarding() {
        let service = Arc::new(scripted(&["a", "b", "c", "d"]));
        let executor = StepExecutor::new(
            service.clone(),
            RecoveryEngine::new(RetryPolicy::new(0, Duration::ZERO)),
        );
        let orch = TurnOrchestrator::new(
            executor,
            DialogueSettings {
                logical_model: ModelProfile::new("logic-model"),
                creative_model: ModelProfile::new("gemma").without_system_instruction(),
                prompts: PromptSet::default(),
            },
        );
        let image = ImagePayload {
            mime_type: "image/png".into(),
            base64_data: "iVBORw0KGgo=".into(),
        };
        let mut s = Session::new(
            "这张图是什么？",
            Some(image.clone()),
            DiscussionMode::fixed(1),
            NotepadDocument::default(),
        );
        orch.run(&mut s, &CancellationToken::new(), Observers::default())
            .await
            .unwrap();

        let requests = service.requests();
        assert!(requests.iter().all(|r| r.image.as_ref() == Some(&image)));
        assert!(requests[0].system_instruction.is_some());
        assert!(requests[1].system_instruction.is_none());
        assert!(requests[0].prompt.contains("attached an image"));
    }
}
