mod common;

use common::{Harness, Recorder};
use marlbench_abstraction::ActionSupport;
use marlbench_core::loggers::{read_scalar_csv, JsonSummary};
use marlbench_core::{ConfigError, ExperimentConfig, ExperimentError, LoggerKind};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_incompatible_action_space_builds_nothing() {
    let temp = TempDir::new().unwrap();
    let harness = Harness::new(true, true);
    let task = common::ScriptedTask { support: ActionSupport::discrete_only(), ..harness.task() };

    let result = harness.builder_for(task, common::small_config(temp.path())).build().await;

    let Err(ExperimentError::Config(ConfigError::IncompatibleActionSpace { algorithm, task })) = result else {
        panic!("expected an incompatible action space error");
    };
    assert_eq!(algorithm, "linear");
    assert_eq!(task, "balance");
    assert_eq!(Recorder::count(&harness.recorder.envs_built), 0);
}

#[tokio::test]
async fn test_invalid_interval_builds_nothing() {
    let temp = TempDir::new().unwrap();
    let harness = Harness::new(true, true);
    let config = ExperimentConfig { evaluation_interval: 150, ..common::small_config(temp.path()) };

    let result = harness.builder(config).build().await;

    assert!(matches!(
        result,
        Err(ExperimentError::Config(ConfigError::EvaluationIntervalNotMultiple { interval: 150, frames_per_batch: 100 }))
    ));
    assert_eq!(Recorder::count(&harness.recorder.envs_built), 0);
}

#[tokio::test]
async fn test_invalid_group_map_is_reported() {
    let temp = TempDir::new().unwrap();
    let harness = Harness::new(true, true);
    let groups = vec![
        ("alpha".to_string(), vec!["agent_0".to_string()]),
        ("beta".to_string(), vec!["agent_0".to_string()]),
    ];
    let task = common::ScriptedTask { groups, ..harness.task() };

    let result = harness.builder_for(task, common::small_config(temp.path())).build().await;
    assert!(matches!(result, Err(ExperimentError::InvalidGroupMap(_))));
}

#[tokio::test]
async fn test_configured_loggers_write_into_experiment_folder() {
    let temp = TempDir::new().unwrap();
    let harness = Harness::new(true, true);
    let config = ExperimentConfig {
        loggers: vec![LoggerKind::Csv, LoggerKind::Console],
        create_json: true,
        ..common::small_config(temp.path())
    };
    let mut experiment = harness.builder(config).build().await.unwrap();
    let layout = experiment.layout().clone();
    assert!(layout.name().starts_with("linear_balance_mlp_"));
    assert!(layout.folder().is_dir());

    experiment.run_until(CancellationToken::new()).await.unwrap();

    let frames = read_scalar_csv(&layout.scalars_dir().join("counters_total_frames.csv")).unwrap();
    assert_eq!(frames, vec![(0, 100.0), (1, 200.0), (2, 300.0), (3, 400.0), (4, 500.0)]);

    // Every step pays 1 per agent and episodes last five steps.
    let returns = read_scalar_csv(&layout.scalars_dir().join("collection_alpha_episode_reward_mean.csv")).unwrap();
    assert_eq!(returns.len(), 5);
    assert!(returns.iter().all(|(_, r)| (*r - common::EPISODE_LEN as f64).abs() < 1e-9));
    assert!(layout.scalars_dir().join("train_beta_loss_objective.csv").exists());
    assert!(layout.scalars_dir().join("eval_reward_episode_reward_mean.csv").exists());

    let summary: JsonSummary = serde_json::from_slice(&std::fs::read(layout.json_path()).unwrap()).unwrap();
    assert_eq!(summary.algorithm, "linear");
    assert_eq!(summary.environment, "scripted");
    assert_eq!(summary.seed, 3);
    assert_eq!(summary.evaluations.len(), 5);
    assert_eq!(summary.evaluations[0].returns["alpha"].len(), 2);

    // The configured sinks come first, so their mean return is the one recorded.
    assert!((experiment.counters().mean_return - common::EPISODE_LEN as f64).abs() < 1e-9);
}

#[tokio::test]
async fn test_evaluation_skipped_without_any_sink() {
    let temp = TempDir::new().unwrap();
    let harness = Harness::new(true, true);
    let algorithm = common::LinearAlgorithmConfig {
        on_policy: true,
        support: ActionSupport::both(),
        recorder: std::sync::Arc::clone(&harness.recorder),
        fail_forward_for: None,
    };
    let mut experiment = marlbench_core::ExperimentBuilder::new(
        std::sync::Arc::new(harness.task()),
        std::sync::Arc::new(algorithm),
        std::sync::Arc::new(common::MlpModel),
        common::small_config(temp.path()),
    )
    .build()
    .await
    .unwrap();

    experiment.run_until(CancellationToken::new()).await.unwrap();

    assert_eq!(experiment.counters().total_frames, 500);
    let selections = harness.recorder.selections.lock().unwrap();
    assert!(!selections.contains(&marlbench_abstraction::ActionSelection::Mode));
}
