//! Duet 命令行入口
//!
//! 用法：`duet [--config <path>] <问题>`。未接入具体模型后端时使用 Mock 补全服务跑通完整流程。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use duet::completion::MockCompletionService;
use duet::config::{load_config, AppConfig};
use duet::core::{spawn_controller, Command, DialoguePhase, SessionController};
use duet::dialogue::DialogueEvent;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    duet::observability::init();

    let mut config_path = None;
    let mut words = Vec::new();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            let path = args.next().context("--config requires a path")?;
            config_path = Some(PathBuf::from(path));
        } else {
            words.push(arg);
        }
    }
    let query = words.join(" ");
    if query.trim().is_empty() {
        bail!("usage: duet [--config <path>] <query>");
    }

    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    tracing::warn!("No completion backend configured, using Mock completion service");

    let (ev_tx, mut ev_rx) = mpsc::unbounded_channel();
    let controller =
        SessionController::from_config(&cfg, Arc::new(MockCompletionService)).with_events(ev_tx);
    let (cmd_tx, progress_rx, join) = spawn_controller(controller);

    let cancel_tx = cmd_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(Command::Cancel);
        }
    });

    cmd_tx
        .send(Command::Submit { query, image: None })
        .context("controller stopped before the session started")?;

    let mut notepad = None;
    while let Some(ev) = ev_rx.recv().await {
        match ev {
            DialogueEvent::Phase { phase } if phase.is_terminal() => break,
            DialogueEvent::Turn { record } => println!("{}\n", record.log_line()),
            DialogueEvent::NotepadUpdated { content, .. } => notepad = Some(content),
            DialogueEvent::Retry {
                step,
                speaker,
                attempt,
                max_retries,
                message,
            } => println!("[{speaker} - {step}] 调用失败，重试 ({attempt}/{max_retries})... {message}"),
            DialogueEvent::Advisory { text }
            | DialogueEvent::StepFailed { text, .. }
            | DialogueEvent::Error { text } => println!("[system] {text}"),
            _ => {}
        }
    }

    let progress = progress_rx.borrow().clone();
    if let Some(content) = notepad {
        println!("---- notepad ----\n{content}\n-----------------");
    }
    match progress.phase {
        DialoguePhase::Done => println!(
            "done in {} ms, {} turn(s)",
            progress.last_session_duration_ms.unwrap_or_default(),
            progress.last_completed_turns
        ),
        phase => println!("session ended: {phase:?}"),
    }

    let _ = cmd_tx.send(Command::Quit);
    join.await.context("controller task panicked")?;
    Ok(())
}
