//! The experiment: setup, the collect/train/evaluate loop, checkpointing and shutdown.

use crate::checkpoint::{Counters, ExperimentCheckpoint, FsCheckpointStorage};
use crate::collector::SyncCollector;
use crate::config::{ExperimentConfig, ExperimentPlan};
use crate::env::{is_vectorized, make_training_env};
use crate::error::{ExperimentError, RestoreError, Result};
use crate::evaluation::Evaluator;
use crate::layout::ExperimentLayout;
use crate::lifecycle::{transition, ExperimentState, RunOutcome, ShutdownGuard};
use crate::loggers::{MultiLogger, RunInfo};
use crate::negotiate::resolve_action_mode;
use crate::resolve::resolve_specs;
use crate::training::GroupTrainer;
use marlbench_abstraction::{
    ActionMode, Algorithm, AlgorithmConfig, AlgorithmContext, Batch, Callback, CheckpointStorage, EnvRequest,
    Environment, ExperimentLogger, GroupMap, ModelConfig, PolicyWeights, ScalarMap, Task,
};
use marlbench_training::GradClip;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Assembles an [`Experiment`] from its collaborators.
pub struct ExperimentBuilder {
    task: Arc<dyn Task>,
    algorithm: Arc<dyn AlgorithmConfig>,
    model: Arc<dyn ModelConfig>,
    critic_model: Option<Arc<dyn ModelConfig>>,
    config: ExperimentConfig,
    seed: u64,
    logger: Option<Box<dyn ExperimentLogger>>,
    callbacks: Vec<Box<dyn Callback>>,
    storage: Option<Arc<dyn CheckpointStorage>>,
}

impl ExperimentBuilder {
    pub fn new(
        task: Arc<dyn Task>,
        algorithm: Arc<dyn AlgorithmConfig>,
        model: Arc<dyn ModelConfig>,
        config: ExperimentConfig,
    ) -> Self {
        Self {
            task,
            algorithm,
            model,
            critic_model: None,
            config,
            seed: 0,
            logger: None,
            callbacks: Vec::new(),
            storage: None,
        }
    }

    /// Critic architecture. Defaults to the policy model.
    #[must_use]
    pub fn critic_model(mut self, model: Arc<dyn ModelConfig>) -> Self {
        self.critic_model = Some(model);
        self
    }

    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// An extra metric sink, fed alongside the configured loggers.
    #[must_use]
    pub fn logger(mut self, logger: Box<dyn ExperimentLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    #[must_use]
    pub fn callback(mut self, callback: Box<dyn Callback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    /// Where checkpoints are written and read. Defaults to the local filesystem.
    #[must_use]
    pub fn storage(mut self, storage: Arc<dyn CheckpointStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Validates the configuration and sets every component up, restoring from
    /// a checkpoint when one is configured.
    ///
    /// Nothing is constructed if validation or action-mode negotiation fails.
    pub async fn build(self) -> Result<Experiment> {
        let Self { task, algorithm, model, critic_model, config, seed, logger, mut callbacks, storage } = self;

        let on_policy = algorithm.on_policy();
        config.validate(on_policy)?;
        let action_mode = resolve_action_mode(
            task.action_support(),
            algorithm.action_support(),
            config.prefer_continuous_actions,
            task.name(),
            algorithm.name(),
        )?;
        let plan = ExperimentPlan::new(&config, on_policy);
        if plan.minibatches_per_step == 0 {
            warn!(
                train_batch_size = plan.train_batch_size,
                train_minibatch_size = plan.train_minibatch_size,
                "Minibatch size exceeds the train batch size; no optimizer pass will run"
            );
        }
        info!(
            algorithm = %algorithm.name(),
            task = %task.name(),
            action_mode = %action_mode,
            on_policy,
            max_frames = plan.max_frames,
            max_iterations = plan.max_iterations,
            "Setting up experiment"
        );

        let eval_request = EnvRequest {
            num_envs: config.evaluation_episodes,
            action_mode,
            seed,
            device: config.sampling_device.clone(),
        };
        let eval_env = task.make_env(&eval_request)?;
        let (group_map, spec) = resolve_specs(&*task, &*eval_env)?;
        let max_steps = task.max_steps(&*eval_env);
        let render = config.render && task.supports_rendering(&*eval_env);

        let train_request = EnvRequest { num_envs: plan.n_envs_per_worker, ..eval_request };
        let train_env = make_training_env(&*task, &train_request, is_vectorized(&*eval_env))?;

        let critic_model = critic_model.unwrap_or_else(|| Arc::clone(&model));
        let mut built = algorithm.build(AlgorithmContext {
            spec,
            group_map: group_map.clone(),
            action_mode,
            seed,
            settings: plan.training_settings(&config),
            model: Arc::clone(&model),
            critic_model: Arc::clone(&critic_model),
        })?;
        let trainers = group_map
            .groups()
            .map(|group| GroupTrainer::build(&mut *built, group, &config))
            .collect::<Result<Vec<_>>>()?;

        let policy = built.policy_for_collection()?;
        let collector =
            SyncCollector::new(train_env, policy, plan.frames_per_batch, plan.max_frames, plan.init_random_frames);
        if on_policy && collector.frames_per_batch() > plan.replay_buffer_memory_size {
            warn!(
                collected = collector.frames_per_batch(),
                buffer_capacity = plan.replay_buffer_memory_size,
                "On-policy buffer holds fewer frames than each rounded-up batch; the oldest frames of every batch are dropped"
            );
        }

        let layout = match &config.restore_file {
            Some(file) => ExperimentLayout::for_restore(file)?,
            None => ExperimentLayout::fresh(config.save_folder.as_deref(), algorithm.name(), task.name(), model.name())?,
        };
        if !config.loggers.is_empty() || config.create_json || config.checkpoint_interval > 0 {
            layout.ensure_folder()?;
        }

        let logger_active = config.has_logging_sink() || logger.is_some();
        let info = RunInfo {
            algorithm: algorithm.name().to_string(),
            task: task.name().to_string(),
            environment: task.env_name().to_string(),
            model: model.name().to_string(),
            seed,
        };
        let mut logger = MultiLogger::from_config(&config, &layout, &group_map, &info, logger)?;
        logger.log_hparams(&json!({
            "experiment": serde_json::to_value(&config)?,
            "plan": serde_json::to_value(&plan)?,
            "algorithm_name": algorithm.name(),
            "algorithm": algorithm.config(),
            "task_name": task.name(),
            "task": task.config(),
            "environment_name": task.env_name(),
            "model_name": model.name(),
            "model": model.config(),
            "critic_model_name": critic_model.name(),
            "critic_model": critic_model.config(),
            "action_mode": action_mode,
            "on_policy": on_policy,
            "seed": seed,
        }))?;

        for callback in &mut callbacks {
            callback.on_setup()?;
        }

        let evaluator =
            Evaluator::new(config.evaluation_episodes, max_steps, config.evaluation_deterministic_actions, render);
        let clip = GradClip::from_config(config.clip_grad_norm, config.clip_grad_val);
        let storage = storage.unwrap_or_else(|| Arc::new(FsCheckpointStorage));

        let mut experiment = Experiment {
            config,
            plan,
            task,
            action_mode,
            group_map,
            algorithm: built,
            trainers,
            collector,
            eval_env,
            evaluator,
            logger,
            logger_active,
            callbacks,
            storage,
            layout,
            clip,
            counters: Counters::default(),
            state: ExperimentState::Idle,
            shutdown: ShutdownGuard::new(),
        };

        if let Some(file) = experiment.config.restore_file.clone() {
            if let Err(err) = experiment.restore(&file) {
                if let Err(close_err) = experiment.close().await {
                    warn!(error = %close_err, "Failed to release resources after a failed restore");
                }
                return Err(err);
            }
        }
        debug!(folder = %experiment.layout.folder().display(), "Experiment ready");
        Ok(experiment)
    }
}

/// A configured run of one algorithm on one task.
pub struct Experiment {
    config: ExperimentConfig,
    plan: ExperimentPlan,
    task: Arc<dyn Task>,
    action_mode: ActionMode,
    group_map: GroupMap,
    algorithm: Box<dyn Algorithm>,
    trainers: Vec<GroupTrainer>,
    collector: SyncCollector,
    eval_env: Box<dyn Environment>,
    evaluator: Evaluator,
    logger: MultiLogger,
    logger_active: bool,
    callbacks: Vec<Box<dyn Callback>>,
    storage: Arc<dyn CheckpointStorage>,
    layout: ExperimentLayout,
    clip: GradClip,
    counters: Counters,
    state: ExperimentState,
    shutdown: ShutdownGuard,
}

impl Experiment {
    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn state(&self) -> ExperimentState {
        self.state
    }

    pub fn layout(&self) -> &ExperimentLayout {
        &self.layout
    }

    pub fn group_map(&self) -> &GroupMap {
        &self.group_map
    }

    pub fn plan(&self) -> &ExperimentPlan {
        &self.plan
    }

    pub fn action_mode(&self) -> ActionMode {
        self.action_mode
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn trainers(&self) -> &[GroupTrainer] {
        &self.trainers
    }

    /// Runs until a ceiling is reached or Ctrl-C is pressed.
    pub async fn run(&mut self) -> Result<RunOutcome> {
        let token = CancellationToken::new();
        let on_signal = token.clone();
        let handler = tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                on_signal.cancel();
            }
        });
        let outcome = self.run_until(token).await;
        handler.abort();
        outcome
    }

    /// Runs until a ceiling is reached or `token` is cancelled.
    ///
    /// Every exit goes through [`close`](Self::close). Errors are returned as
    /// raised, after shutdown.
    pub async fn run_until(&mut self, token: CancellationToken) -> Result<RunOutcome> {
        transition(&mut self.state, ExperimentState::Collecting)?;
        match self.run_loop(&token).await {
            Ok(RunOutcome::Completed) => {
                transition(&mut self.state, ExperimentState::Draining)?;
                info!(
                    total_frames = self.counters.total_frames,
                    iterations = self.counters.n_iters_performed,
                    "Experiment finished"
                );
                self.close().await?;
                Ok(RunOutcome::Completed)
            }
            Ok(RunOutcome::Interrupted) => {
                info!(total_frames = self.counters.total_frames, "Experiment was closed gracefully");
                self.close().await?;
                Ok(RunOutcome::Interrupted)
            }
            Err(err) => {
                error!(error = %err, "Experiment failed and is closing gracefully");
                if let Err(close_err) = self.close().await {
                    warn!(error = %close_err, "Shutdown after failure also failed");
                }
                Err(err)
            }
        }
    }

    async fn run_loop(&mut self, token: &CancellationToken) -> Result<RunOutcome> {
        while self.counters.n_iters_performed < self.plan.max_iterations {
            if token.is_cancelled() {
                return Ok(RunOutcome::Interrupted);
            }
            let iteration_start = Instant::now();

            let next = tokio::select! {
                () = token.cancelled() => return Ok(RunOutcome::Interrupted),
                next = self.collector.next_batch() => next?,
            };
            let Some(batch) = next else {
                break;
            };
            let collection_time = iteration_start.elapsed().as_secs_f64();
            if token.is_cancelled() {
                return Ok(RunOutcome::Interrupted);
            }

            let training_time = self.iterate(&batch)?;
            let iteration_time = iteration_start.elapsed().as_secs_f64();
            self.counters.total_time += iteration_time;
            self.log_iteration_scalars(batch.numel() as u64, collection_time, training_time, iteration_time)?;

            // Cancellation during training abandons the iteration before it is counted.
            if token.is_cancelled() {
                return Ok(RunOutcome::Interrupted);
            }
            if self.evaluation_due() {
                self.evaluate().await?;
            }

            self.counters.n_iters_performed += 1;
            self.logger.commit()?;

            if self.checkpoint_due() {
                self.checkpoint()?;
            }
        }
        Ok(RunOutcome::Completed)
    }

    /// Logs the collected batch, trains every group on it and pushes the new
    /// weights to the collector. Returns the training time in seconds.
    fn iterate(&mut self, batch: &Batch) -> Result<f64> {
        let step = self.counters.n_iters_performed;
        let current_frames = batch.numel();
        self.counters.total_frames += current_frames as u64;
        self.counters.mean_return = self.logger.log_collection(
            batch,
            self.counters.total_frames,
            self.task.name(),
            &self.group_map,
            step,
        )?;
        for callback in &mut self.callbacks {
            callback.on_batch_collected(batch)?;
        }

        let training_start = Instant::now();
        let passes = self.plan.optimizer_passes();
        for trainer in &mut self.trainers {
            trainer.ingest(&*self.algorithm, batch, &self.group_map)?;
            let records = trainer.train(&*self.algorithm, self.clip, passes, &mut self.callbacks)?;
            self.logger.log_training(trainer.group(), &records, step)?;
            for callback in &mut self.callbacks {
                callback.on_train_end(&records, trainer.group())?;
            }
            if let Some(exploration) = self.collector.policy_mut().exploration_mut(trainer.group()) {
                exploration.step(current_frames);
            }
        }

        let weights: PolicyWeights =
            self.trainers.iter().map(|t| (t.group().to_string(), t.loss().policy_weights())).collect();
        self.collector.update_policy_weights(&weights)?;
        Ok(training_start.elapsed().as_secs_f64())
    }

    fn log_iteration_scalars(
        &mut self,
        current_frames: u64,
        collection_time: f64,
        training_time: f64,
        iteration_time: f64,
    ) -> Result<()> {
        let scalars = ScalarMap::from([
            ("timers/collection_time".to_string(), collection_time),
            ("timers/training_time".to_string(), training_time),
            ("timers/iteration_time".to_string(), iteration_time),
            ("timers/total_time".to_string(), self.counters.total_time),
            ("counters/current_frames".to_string(), current_frames as f64),
            ("counters/total_frames".to_string(), self.counters.total_frames as f64),
            ("counters/iter".to_string(), self.counters.n_iters_performed as f64),
        ]);
        self.logger.log_scalars(&scalars, self.counters.n_iters_performed)?;
        Ok(())
    }

    fn evaluation_due(&self) -> bool {
        self.config.evaluation
            && self.logger_active
            && self.counters.total_frames.checked_rem(self.config.evaluation_interval) == Some(0)
    }

    fn checkpoint_due(&self) -> bool {
        self.config.checkpoint_interval > 0 && self.counters.total_frames % self.config.checkpoint_interval == 0
    }

    async fn evaluate(&mut self) -> Result<()> {
        let step = self.counters.n_iters_performed;
        let start = Instant::now();
        let (rollouts, frames) = self.evaluator.evaluate(&mut *self.eval_env, self.collector.policy_mut()).await?;
        let elapsed = start.elapsed().as_secs_f64();

        self.logger.log_scalars(&ScalarMap::from([("timers/evaluation_time".to_string(), elapsed)]), step)?;
        self.logger.log_evaluation(&rollouts, &frames, step, self.counters.total_frames)?;
        for callback in &mut self.callbacks {
            callback.on_evaluation_end(&rollouts)?;
        }
        debug!(rollouts = rollouts.len(), frames = frames.len(), elapsed, "Evaluation finished");
        Ok(())
    }

    /// Snapshots counters, collector, losses and buffers.
    pub fn checkpoint_state(&self) -> Result<ExperimentCheckpoint> {
        let mut losses = std::collections::BTreeMap::new();
        let mut buffers = std::collections::BTreeMap::new();
        for trainer in &self.trainers {
            losses.insert(trainer.group().to_string(), trainer.loss().state_dict()?);
            buffers.insert(trainer.group().to_string(), trainer.buffer().state_dict()?);
        }
        Ok(ExperimentCheckpoint { state: self.counters, collector: self.collector.state_dict()?, losses, buffers })
    }

    fn checkpoint(&mut self) -> Result<()> {
        let path = self.layout.checkpoint_path(self.counters.total_frames);
        let bytes = self.checkpoint_state()?.to_bytes()?;
        self.storage.write(&bytes, &path)?;
        info!(path = %path.display(), total_frames = self.counters.total_frames, "Saved checkpoint");
        Ok(())
    }

    fn restore(&mut self, file: &std::path::Path) -> Result<()> {
        let checkpoint = ExperimentCheckpoint::read(&*self.storage, file)?;
        checkpoint.check_groups(&self.group_map)?;
        let ExperimentCheckpoint { state, collector, mut losses, mut buffers } = checkpoint;

        for trainer in &mut self.trainers {
            let group = trainer.group().to_string();
            let loss = losses
                .remove(&group)
                .ok_or_else(|| RestoreError::MissingGroupState { group: group.clone(), kind: "loss" })?;
            trainer
                .loss_mut()
                .load_state_dict(loss)
                .map_err(|source| RestoreError::ComponentLoad { component: format!("loss '{}'", group), source })?;
            let buffer = buffers
                .remove(&group)
                .ok_or_else(|| RestoreError::MissingGroupState { group: group.clone(), kind: "buffer" })?;
            trainer.buffer_mut().load_state_dict(buffer).map_err(|source| RestoreError::ComponentLoad {
                component: format!("buffer '{}'", group),
                source,
            })?;
        }
        self.collector.load_state_dict(collector).map_err(|err| match err {
            ExperimentError::Collaborator(source) => {
                ExperimentError::from(RestoreError::ComponentLoad { component: "collector".to_string(), source })
            }
            ExperimentError::Json(err) => ExperimentError::from(RestoreError::Corrupt {
                path: file.to_path_buf(),
                reason: format!("collector state: {}", err),
            }),
            other => other,
        })?;

        self.counters = state;
        info!(
            path = %file.display(),
            total_frames = state.total_frames,
            iterations = state.n_iters_performed,
            "Restored experiment from checkpoint"
        );
        Ok(())
    }

    /// Releases the collector, the evaluation environment and the loggers.
    ///
    /// Only the first call does anything.
    pub async fn close(&mut self) -> Result<()> {
        if !self.shutdown.try_begin() {
            debug!("Experiment already closed");
            return Ok(());
        }
        let collector = self.collector.shutdown().await;
        let eval_env = self.eval_env.close().await.map_err(ExperimentError::from);
        let logger = self.logger.finish().map_err(ExperimentError::from);
        transition(&mut self.state, ExperimentState::Closed)?;
        debug!(folder = %self.layout.folder().display(), "Experiment closed");
        collector.and(eval_env).and(logger)
    }
}

impl Drop for Experiment {
    fn drop(&mut self) {
        if !self.shutdown.has_fired() {
            warn!("Experiment dropped without being closed");
        }
    }
}
