//! Persistence gateway scenarios against a real directory.

use cadence_core::config::HistoryConfig;
use cadence_core::error::RecoverableLoadError;
use cadence_core::history::HistoryStore;
use cadence_core::plan::{Plan, Step, StepStatus};
use cadence_core::session::{Checkpoint, CheckpointRepository, SessionContext, Turn, META_INTENT};
use cadence_infrastructure::TomlCheckpointRepository;
use tempfile::TempDir;

#[tokio::test]
async fn test_save_three_turns_with_epic_and_load_into_fresh_instance() {
    let temp_dir = TempDir::new().unwrap();

    let mut history = HistoryStore::new(HistoryConfig::default());
    history.append(Turn::user("plan the release").with_metadata(META_INTENT, "new_request"));
    history.append(Turn::assistant("Here is the plan."));
    history.append(Turn::user("yes"));

    let context = SessionContext {
        current_epic_ref: Some("E5".to_string()),
        ..SessionContext::default()
    };
    let checkpoint = Checkpoint::new(
        history.turns().to_vec(),
        context.clone(),
        history.memory_usage(),
    );

    // Save
    let writer = TomlCheckpointRepository::new(temp_dir.path().to_path_buf(), "default");
    writer.save(&checkpoint).await.expect("Should save checkpoint");

    // Load through a separate instance
    let reader = TomlCheckpointRepository::new(temp_dir.path().to_path_buf(), "default");
    let loaded = reader.load().await.expect("Should load checkpoint");

    assert_eq!(loaded.history.len(), 3);
    assert_eq!(loaded.history, checkpoint.history);
    assert_eq!(
        loaded.session_context.current_epic_ref.as_deref(),
        Some("E5")
    );
    assert_eq!(loaded.session_context, context);
    assert_eq!(loaded.memory_stats, checkpoint.memory_stats);
    assert_eq!(loaded, checkpoint);
}

#[tokio::test]
async fn test_pending_plan_and_preferences_survive_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let repo = TomlCheckpointRepository::new(temp_dir.path().to_path_buf(), "default");

    let mut running = Step::new("deploy").with_parameter("env", "staging");
    running.transition(StepStatus::Running).unwrap();
    let plan = Plan::new(
        "build then deploy",
        vec![Step::new("build"), running],
        "Split into two steps.",
    );

    let mut context = SessionContext::default();
    context.current_story_ref = Some("S-12".to_string());
    context.set_pending(plan);
    context
        .preferences
        .insert("tone".to_string(), "brief".to_string());

    let mut history = HistoryStore::new(HistoryConfig::default());
    history.append(Turn::system("Always confirm before deploying."));
    history.append(Turn::user("build then deploy"));
    let checkpoint = Checkpoint::new(history.turns().to_vec(), context, history.memory_usage());

    repo.save(&checkpoint).await.unwrap();
    let loaded = repo.load().await.unwrap();

    assert_eq!(loaded, checkpoint);
    let steps = &loaded
        .session_context
        .pending_operation
        .as_ref()
        .expect("Should keep pending plan")
        .steps;
    assert_eq!(steps[1].status(), StepStatus::Running);
    assert_eq!(steps[1].parameters.get("env").map(String::as_str), Some("staging"));
}

#[tokio::test]
async fn test_later_save_replaces_earlier_checkpoint() {
    let temp_dir = TempDir::new().unwrap();
    let repo = TomlCheckpointRepository::new(temp_dir.path().to_path_buf(), "default");

    let mut history = HistoryStore::new(HistoryConfig::default());
    history.append(Turn::user("one"));
    let first = Checkpoint::new(
        history.turns().to_vec(),
        SessionContext::default(),
        history.memory_usage(),
    );
    repo.save(&first).await.unwrap();

    history.append(Turn::user("two"));
    let second = Checkpoint::new(
        history.turns().to_vec(),
        SessionContext::default(),
        history.memory_usage(),
    );
    repo.save(&second).await.unwrap();

    let loaded = repo.load().await.unwrap();
    assert_eq!(loaded.history.len(), 2);
    assert_eq!(loaded.history[1].content, "two");
}

#[tokio::test]
async fn test_version_1_0_0_file_is_migrated_on_load() {
    let temp_dir = TempDir::new().unwrap();
    let repo = TomlCheckpointRepository::new(temp_dir.path().to_path_buf(), "legacy");
    std::fs::write(
        repo.checkpoint_path(),
        r#"
version = "1.0.0"
saved_at = "2026-03-01T12:00:00+00:00"
current_story_ref = "S-3"

[[history]]
role = "user"
content = "ship it"
timestamp = "2026-03-01T11:59:00+00:00"

[memory_stats]
turn_count = 1
max_turns = 100
usage_percent = 1.0
approx_bytes = 128
near_limit = false
size_warning = false
"#,
    )
    .unwrap();

    let loaded = repo.load().await.expect("Should migrate legacy checkpoint");

    assert_eq!(loaded.history[0].content, "ship it");
    assert_eq!(loaded.session_context.current_story_ref.as_deref(), Some("S-3"));
    assert!(loaded.session_context.preferences.is_empty());
}

#[tokio::test]
async fn test_truncated_file_degrades_to_malformed() {
    let temp_dir = TempDir::new().unwrap();
    let repo = TomlCheckpointRepository::new(temp_dir.path().to_path_buf(), "default");

    let mut history = HistoryStore::new(HistoryConfig::default());
    history.append(Turn::user("hello there"));
    let checkpoint = Checkpoint::new(
        history.turns().to_vec(),
        SessionContext::default(),
        history.memory_usage(),
    );
    repo.save(&checkpoint).await.unwrap();

    let full = std::fs::read_to_string(repo.checkpoint_path()).unwrap();
    std::fs::write(repo.checkpoint_path(), &full[..full.len() / 2]).unwrap();

    assert!(matches!(
        repo.load().await,
        Err(RecoverableLoadError::Malformed { .. })
    ));
}
