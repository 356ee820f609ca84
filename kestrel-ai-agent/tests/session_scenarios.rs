//! End-to-end query handling through a session, with scripted backends.

mod support;

use anyhow::Result;
use kestrel_ai_agent::{AgentError, Role, Router, Session};
use kestrel_ai_context::{PassageChunk, TextSplitter};
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use support::{Harness, HangingModel, TrackedSource};

fn roles(session: &Session) -> Vec<Role> {
    session.history().iter().map(|turn| turn.role).collect()
}

#[tokio::test]
async fn test_ingest_without_attachment_is_an_error() -> Result<()> {
    let harness = Harness::new(&["update_docs"]).await?;
    let mut session = Session::new(harness.router.clone());

    let err = session.query("please store this runbook").await.unwrap_err();
    assert!(matches!(err, AgentError::MissingAttachment));

    assert_eq!(roles(&session), vec![Role::User]);
    assert_eq!(session.history()[0].text, "please store this runbook");
    assert_eq!(harness.stored_points().await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_ingest_attached_file() -> Result<()> {
    let harness = Harness::new(&["update_docs", "update_docs"]).await?;
    let mut session = Session::new(harness.router.clone());

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("notes.txt");
    let mut file = std::fs::File::create(&path)?;
    write!(file, "alpha beta gamma")?;
    drop(file);

    session.add_file(&path)?;
    assert_eq!(session.pending_name(), Some("notes.txt"));

    let response = session.query("add these notes to the docs").await?;
    assert_eq!(response, "Docs updated successfully: notes.txt");
    assert!(harness.stored_points().await? >= 1);
    assert_eq!(session.pending_name(), None);

    // The attachment was consumed by the first request
    let err = session.query("add them again").await.unwrap_err();
    assert!(matches!(err, AgentError::MissingAttachment));

    assert_eq!(
        roles(&session),
        vec![Role::System, Role::User, Role::Assistant, Role::User]
    );
    assert!(session.history()[0].text.ends_with("notes.txt ready for next query"));
    Ok(())
}

#[tokio::test]
async fn test_answer_is_grounded_in_retrieved_passages() -> Result<()> {
    let harness = Harness::new(&["query_monitor", "db-1 is nearly full."]).await?;
    harness
        .router
        .retriever()
        .knowledge()
        .upsert(&[
            PassageChunk::new("db-1 disk usage is at 91 percent"),
            PassageChunk::new("web-2 request latency p99 is 480ms"),
        ])
        .await?;
    let stored_before = harness.stored_points().await?;

    let mut session = Session::new(harness.router.clone());
    let response = session.query("which host is low on disk?").await?;
    assert_eq!(response, "db-1 is nearly full.");

    let prompts = harness.model.prompts();
    assert_eq!(prompts.len(), 2);
    let answer_prompt = &prompts[1];
    assert!(answer_prompt.contains("db-1 disk usage is at 91 percent"));
    assert!(answer_prompt.contains("web-2 request latency p99 is 480ms"));
    assert!(answer_prompt.contains("which host is low on disk?"));

    assert_eq!(harness.stored_points().await?, stored_before);
    assert_eq!(roles(&session), vec![Role::User, Role::Assistant]);
    Ok(())
}

#[tokio::test]
async fn test_unknown_label_gets_fallback_message() -> Result<()> {
    let harness = Harness::new(&["weather"]).await?;
    let mut session = Session::new(harness.router.clone());

    let response = session.query("will it rain tomorrow?").await?;
    assert_eq!(response, "Unknown query type: weather");
    assert_eq!(harness.model.calls(), 1);
    assert_eq!(harness.embedder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(roles(&session), vec![Role::User, Role::Assistant]);
    Ok(())
}

#[tokio::test]
async fn test_attaching_replaces_and_releases_previous() -> Result<()> {
    let harness = Harness::new(&[]).await?;
    let mut session = Session::new(harness.router.clone());

    let (first, first_releases) = TrackedSource::new("a.txt", "first document");
    let (second, second_releases) = TrackedSource::new("b.txt", "second document");

    session.attach(first, "a.txt");
    assert_eq!(first_releases.load(Ordering::SeqCst), 0);

    session.attach(second, "b.txt");
    assert_eq!(first_releases.load(Ordering::SeqCst), 1);
    assert_eq!(second_releases.load(Ordering::SeqCst), 0);
    assert_eq!(session.pending_name(), Some("b.txt"));

    session.release_attachment();
    assert_eq!(first_releases.load(Ordering::SeqCst), 1);
    assert_eq!(second_releases.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_failed_query_still_releases_attachment() -> Result<()> {
    // The script has no classification answer, so the backend call fails
    let harness = Harness::new(&[]).await?;
    let mut session = Session::new(harness.router.clone());

    let (source, releases) = TrackedSource::new("report.txt", "cpu at 99 percent");
    session.attach(source, "report.txt");

    let err = session.query("store this report").await.unwrap_err();
    assert!(matches!(err, AgentError::Classification(_)));
    assert_eq!(releases.load(Ordering::SeqCst), 1);
    assert_eq!(session.pending_name(), None);
    assert_eq!(roles(&session), vec![Role::System, Role::User]);
    Ok(())
}

#[tokio::test]
async fn test_missing_file_is_a_load_error() -> Result<()> {
    let harness = Harness::new(&[]).await?;
    let mut session = Session::new(harness.router.clone());

    let err = session.add_file("/definitely/not/here.txt").unwrap_err();
    assert!(matches!(err, AgentError::Load(_)));
    assert!(session.history().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_cancelled_query_releases_attachment() -> Result<()> {
    let harness = Harness::new(&[]).await?;
    let model = Arc::new(HangingModel::default());
    let router = Router::new(
        model.clone(),
        harness.router.retriever().clone(),
        TextSplitter::with_defaults(500, 50)?,
    )?;
    let mut session = Session::new(Arc::new(router));

    let (source, releases) = TrackedSource::new("report.txt", "cpu at 99 percent");
    session.attach(source, "report.txt");

    let outcome =
        tokio::time::timeout(Duration::from_millis(50), session.query("how busy is web-2?")).await;
    assert!(outcome.is_err(), "query should still be waiting on the model");

    // The in-flight completion was dropped, not left running
    assert_eq!(model.started.load(Ordering::SeqCst), 1);
    assert_eq!(model.abandoned.load(Ordering::SeqCst), 1);

    assert_eq!(releases.load(Ordering::SeqCst), 1);
    assert_eq!(session.pending_name(), None);
    assert_eq!(roles(&session), vec![Role::System, Role::User]);

    // The session stays usable and a new attachment is released normally
    let (next, next_releases) = TrackedSource::new("next.txt", "disk at 40 percent");
    session.attach(next, "next.txt");
    session.release_attachment();
    assert_eq!(next_releases.load(Ordering::SeqCst), 1);
    assert_eq!(releases.load(Ordering::SeqCst), 1);
    Ok(())
}
