//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use marlbench_abstraction::{
    ActionSelection, ActionSupport, Algorithm, AlgorithmConfig, AlgorithmContext, Batch, Callback,
    CheckpointStorage, CollaboratorError, EnvRequest, Environment, ExperimentLogger, ExplorationAnneal, FieldKey,
    FieldSpec, GroupMap, LossComputer, LossValues, ModelConfig, ParameterStore, Policy, PolicyWeights, RenderFrame,
    ReplayBuffer, Result, ScalarMap, Spec, SpecDomain, Task, TargetUpdater, Tensor, TrainingRecord,
    TrainingSettings,
};
use marlbench_core::{ExperimentBuilder, ExperimentConfig, FsCheckpointStorage};
use marlbench_training::{EpsilonAnneal, TransitionBuffer};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const EPISODE_LEN: usize = 5;

/// Counters shared by every scripted collaborator of one experiment.
#[derive(Default)]
pub struct Recorder {
    pub envs_built: AtomicUsize,
    pub resets: AtomicUsize,
    pub steps: AtomicUsize,
    pub closes: AtomicUsize,
    pub forwards: AtomicUsize,
    pub weight_loads: AtomicUsize,
    pub selections: Mutex<Vec<ActionSelection>>,
    pub loaded_w: Mutex<BTreeMap<String, f32>>,
    pub annealed_frames: Mutex<BTreeMap<String, usize>>,
    /// Keys of every training sample, per group.
    pub seen_keys: Mutex<BTreeMap<String, BTreeSet<String>>>,
    pub callback_events: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

fn two_groups() -> Vec<(String, Vec<String>)> {
    vec![
        ("alpha".to_string(), vec!["alpha_0".to_string(), "alpha_1".to_string()]),
        ("beta".to_string(), vec!["beta_0".to_string()]),
    ]
}

/// A task whose episodes last [`EPISODE_LEN`] steps and pay a reward of 1 per agent per step.
pub struct ScriptedTask {
    pub vectorized: bool,
    pub support: ActionSupport,
    pub groups: Vec<(String, Vec<String>)>,
    pub recorder: Arc<Recorder>,
    /// Fail the step after this many steps across all environments.
    pub fail_after_steps: Option<usize>,
}

impl ScriptedTask {
    pub fn new(vectorized: bool, recorder: Arc<Recorder>) -> Self {
        Self { vectorized, support: ActionSupport::both(), groups: two_groups(), recorder, fail_after_steps: None }
    }
}

impl Task for ScriptedTask {
    fn name(&self) -> &str {
        "balance"
    }

    fn env_name(&self) -> &str {
        "scripted"
    }

    fn action_support(&self) -> ActionSupport {
        self.support
    }

    fn make_env(&self, request: &EnvRequest) -> Result<Box<dyn Environment>> {
        self.recorder.envs_built.fetch_add(1, Ordering::SeqCst);
        let batch = self.vectorized.then_some(request.num_envs);
        let rows = batch.unwrap_or(1);
        Ok(Box::new(ScriptedEnv {
            groups: self.groups.iter().map(|(g, a)| (g.clone(), a.len())).collect(),
            batch,
            t: vec![0; rows],
            recorder: Arc::clone(&self.recorder),
            fail_after_steps: self.fail_after_steps,
            closed: false,
        }))
    }

    fn group_map(&self, _env: &dyn Environment) -> Result<GroupMap> {
        GroupMap::new(self.groups.clone())
    }

    fn observation_spec(&self, _env: &dyn Environment) -> Result<Spec> {
        Ok(self
            .groups
            .iter()
            .map(|(g, a)| {
                let spec = FieldSpec::new(vec![a.len(), 2], SpecDomain::Continuous { low: 0.0, high: 10.0 });
                (FieldKey::from([g.as_str(), "observation"]), spec)
            })
            .collect())
    }

    fn action_spec(&self, _env: &dyn Environment) -> Result<Spec> {
        Ok(self
            .groups
            .iter()
            .map(|(g, a)| {
                let spec = FieldSpec::new(vec![a.len(), 1], SpecDomain::Continuous { low: -1.0, high: 1.0 });
                (FieldKey::from([g.as_str(), "action"]), spec)
            })
            .collect())
    }

    fn max_steps(&self, _env: &dyn Environment) -> usize {
        EPISODE_LEN * 2
    }

    fn supports_rendering(&self, _env: &dyn Environment) -> bool {
        true
    }
}

pub struct ScriptedEnv {
    groups: Vec<(String, usize)>,
    batch: Option<usize>,
    t: Vec<usize>,
    recorder: Arc<Recorder>,
    fail_after_steps: Option<usize>,
    closed: bool,
}

impl ScriptedEnv {
    fn lead(&self) -> Vec<usize> {
        self.batch.map_or_else(Vec::new, |n| vec![n])
    }

    fn per_env(&self, inner: &[usize], value: impl Fn(usize) -> f32) -> Tensor {
        let mut shape = self.lead();
        shape.extend_from_slice(inner);
        let chunk: usize = inner.iter().product();
        let data = (0..self.t.len()).flat_map(|i| std::iter::repeat(value(i)).take(chunk)).collect();
        Tensor::from_vec(shape, data).expect("scripted shapes are consistent")
    }

    fn observation(&self, prefix: Option<&str>) -> Result<Batch> {
        let mut batch = Batch::new(self.lead());
        for (group, agents) in &self.groups {
            let key = match prefix {
                Some(p) => FieldKey::from([p, group.as_str(), "observation"]),
                None => FieldKey::from([group.as_str(), "observation"]),
            };
            batch.insert(key, self.per_env(&[*agents, 2], |i| self.t[i] as f32))?;
        }
        Ok(batch)
    }
}

#[async_trait]
impl Environment for ScriptedEnv {
    fn batch_size(&self) -> Vec<usize> {
        self.lead()
    }

    async fn reset(&mut self, mask: Option<&[bool]>) -> Result<Batch> {
        self.recorder.resets.fetch_add(1, Ordering::SeqCst);
        for (i, t) in self.t.iter_mut().enumerate() {
            if mask.is_none_or(|m| m.get(i).copied().unwrap_or(false)) {
                *t = 0;
            }
        }
        self.observation(None)
    }

    async fn step(&mut self, input: Batch) -> Result<Batch> {
        let taken = self.recorder.steps.fetch_add(1, Ordering::SeqCst);
        if self.fail_after_steps.is_some_and(|limit| taken >= limit) {
            return Err(CollaboratorError::Environment("scripted failure".to_string()));
        }
        for (group, _) in &self.groups {
            input.require(&FieldKey::from([group.as_str(), "action"]))?;
        }
        for t in &mut self.t {
            *t += 1;
        }

        let mut out = input;
        for (key, value) in self.observation(Some("next"))?.iter() {
            out.insert(key.clone(), value.clone())?;
        }
        for (group, agents) in &self.groups {
            out.insert(FieldKey::from(["next", group.as_str(), "reward"]), self.per_env(&[*agents, 1], |_| 1.0))?;
            out.insert(FieldKey::from(["next", group.as_str(), "info", "energy"]), self.per_env(&[1], |_| 0.5))?;
        }
        out.insert("next/info/step", self.per_env(&[1], |i| self.t[i] as f32))?;
        out.insert("next/done", self.per_env(&[1], |i| if self.t[i] >= EPISODE_LEN { 1.0 } else { 0.0 }))?;
        Ok(out)
    }

    async fn render(&mut self) -> Result<Option<RenderFrame>> {
        Ok(Some(RenderFrame { width: 1, height: 1, rgb: vec![0, 0, 0] }))
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.recorder.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Records every frame count it is annealed by.
struct RecorderAnneal {
    group: String,
    inner: EpsilonAnneal,
    recorder: Arc<Recorder>,
}

impl ExplorationAnneal for RecorderAnneal {
    fn step(&mut self, frames: usize) {
        self.inner.step(frames);
        if let Ok(mut seen) = self.recorder.annealed_frames.lock() {
            *seen.entry(self.group.clone()).or_default() += frames;
        }
    }

    fn value(&self) -> f64 {
        self.inner.value()
    }
}

pub struct ScriptedPolicy {
    groups: Vec<String>,
    exploration: BTreeMap<String, RecorderAnneal>,
    recorder: Arc<Recorder>,
}

impl Policy for ScriptedPolicy {
    fn act(&mut self, batch: &mut Batch, selection: ActionSelection) -> Result<()> {
        if let Ok(mut selections) = self.recorder.selections.lock() {
            selections.push(selection);
        }
        for group in &self.groups {
            let obs = batch.require(&FieldKey::from([group.as_str(), "observation"]))?;
            let mut shape = obs.shape().to_vec();
            shape.pop();
            shape.push(1);
            batch.insert(FieldKey::from([group.as_str(), "action"]), Tensor::zeros(shape))?;
        }
        Ok(())
    }

    fn load_weights(&mut self, weights: &PolicyWeights) -> Result<()> {
        self.recorder.weight_loads.fetch_add(1, Ordering::SeqCst);
        let mut loaded = self.recorder.loaded_w.lock().map_err(|e| CollaboratorError::Policy(e.to_string()))?;
        for (group, store) in weights {
            if let Some(w) = store.get("w") {
                loaded.insert(group.clone(), w.value[0]);
            }
        }
        Ok(())
    }

    fn exploration_mut(&mut self, group: &str) -> Option<&mut dyn ExplorationAnneal> {
        self.exploration.get_mut(group).map(|e| e as &mut dyn ExplorationAnneal)
    }
}

/// Minimizes `(w - 1)^2` for a single scalar `w`.
pub struct LinearLoss {
    group: String,
    params: ParameterStore,
    recorder: Arc<Recorder>,
    fails: bool,
}

impl LossComputer for LinearLoss {
    fn forward(&mut self, sample: &Batch) -> Result<LossValues> {
        self.recorder.forwards.fetch_add(1, Ordering::SeqCst);
        if self.fails {
            return Err(CollaboratorError::Loss(format!("scripted failure in group {}", self.group)));
        }
        sample.require(&FieldKey::from(["next", self.group.as_str(), "reward"]))?;
        if let Ok(mut seen) = self.recorder.seen_keys.lock() {
            seen.entry(self.group.clone()).or_default().extend(sample.keys().map(ToString::to_string));
        }
        let w = f64::from(self.w());
        Ok(LossValues::from([("loss_objective".to_string(), (w - 1.0).powi(2)), ("w".to_string(), w)]))
    }

    fn backward(&mut self, term: &str) -> Result<()> {
        if term != "loss_objective" {
            return Err(CollaboratorError::Loss(format!("unknown term {}", term)));
        }
        let grad = 2.0 * (self.w() - 1.0);
        if let Some(w) = self.params.get_mut("w") {
            w.accumulate_grad(&[grad]);
        }
        Ok(())
    }

    fn parameters(&self) -> &ParameterStore {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut ParameterStore {
        &mut self.params
    }
}

impl LinearLoss {
    fn w(&self) -> f32 {
        self.params.get("w").map_or(0.0, |p| p.value[0])
    }
}

pub struct LinearAlgorithm {
    groups: GroupMap,
    seed: u64,
    settings: TrainingSettings,
    recorder: Arc<Recorder>,
    fail_forward_for: Option<String>,
}

impl Algorithm for LinearAlgorithm {
    fn replay_buffer_for(&mut self, _group: &str) -> Result<Box<dyn ReplayBuffer>> {
        let s = &self.settings;
        Ok(if s.on_policy {
            Box::new(TransitionBuffer::on_policy(s.replay_capacity, s.train_minibatch_size, self.seed))
        } else {
            Box::new(TransitionBuffer::off_policy(s.replay_capacity, s.train_minibatch_size, self.seed))
        })
    }

    fn loss_and_target_updater_for(
        &mut self,
        group: &str,
    ) -> Result<(Box<dyn LossComputer>, Option<Box<dyn TargetUpdater>>)> {
        let mut params = ParameterStore::new();
        params.insert("w", vec![0.0]);
        let loss = LinearLoss {
            group: group.to_string(),
            params,
            recorder: Arc::clone(&self.recorder),
            fails: self.fail_forward_for.as_deref() == Some(group),
        };
        Ok((Box::new(loss), None))
    }

    fn trainable_parameters_for(&self, _group: &str, _loss: &dyn LossComputer) -> BTreeMap<String, Vec<String>> {
        BTreeMap::from([("loss_objective".to_string(), vec!["w".to_string()])])
    }

    fn policy_for_collection(&mut self) -> Result<Box<dyn Policy>> {
        let s = &self.settings;
        let exploration = self
            .groups
            .groups()
            .map(|g| {
                let anneal = RecorderAnneal {
                    group: g.to_string(),
                    inner: EpsilonAnneal::new(s.exploration_eps_init, s.exploration_eps_end, s.exploration_anneal_frames),
                    recorder: Arc::clone(&self.recorder),
                };
                (g.to_string(), anneal)
            })
            .collect();
        Ok(Box::new(ScriptedPolicy {
            groups: self.groups.groups().map(str::to_string).collect(),
            exploration,
            recorder: Arc::clone(&self.recorder),
        }))
    }
}

pub struct LinearAlgorithmConfig {
    pub on_policy: bool,
    pub support: ActionSupport,
    pub recorder: Arc<Recorder>,
    /// Group whose loss fails on every forward pass.
    pub fail_forward_for: Option<String>,
}

impl AlgorithmConfig for LinearAlgorithmConfig {
    fn name(&self) -> &str {
        "linear"
    }

    fn on_policy(&self) -> bool {
        self.on_policy
    }

    fn action_support(&self) -> ActionSupport {
        self.support
    }

    fn build(&self, context: AlgorithmContext) -> Result<Box<dyn Algorithm>> {
        Ok(Box::new(LinearAlgorithm {
            groups: context.group_map,
            seed: context.seed,
            settings: context.settings,
            recorder: Arc::clone(&self.recorder),
            fail_forward_for: self.fail_forward_for.clone(),
        }))
    }
}

pub struct MlpModel;

impl ModelConfig for MlpModel {
    fn name(&self) -> &str {
        "mlp"
    }
}

/// What a [`RecordingLogger`] received.
#[derive(Debug, Default)]
pub struct LogRecord {
    pub hparams: usize,
    pub collections: Vec<(u64, u64)>,
    pub trainings: Vec<(String, u64, Vec<TrainingRecord>)>,
    /// `(step, total_frames, rollouts, frames)`
    pub evaluations: Vec<(u64, u64, usize, usize)>,
    pub scalars: Vec<(u64, ScalarMap)>,
    pub commits: usize,
    pub finishes: usize,
}

pub struct RecordingLogger(pub Arc<Mutex<LogRecord>>);

impl RecordingLogger {
    fn record(&self) -> Result<std::sync::MutexGuard<'_, LogRecord>> {
        self.0.lock().map_err(|e| CollaboratorError::Logger(e.to_string()))
    }
}

impl ExperimentLogger for RecordingLogger {
    fn log_hparams(&mut self, _hparams: &serde_json::Value) -> Result<()> {
        self.record()?.hparams += 1;
        Ok(())
    }

    fn log_scalars(&mut self, scalars: &ScalarMap, step: u64) -> Result<()> {
        self.record()?.scalars.push((step, scalars.clone()));
        Ok(())
    }

    fn log_collection(
        &mut self,
        _batch: &Batch,
        total_frames: u64,
        _task: &str,
        _groups: &GroupMap,
        step: u64,
    ) -> Result<f64> {
        self.record()?.collections.push((step, total_frames));
        Ok(1.5)
    }

    fn log_training(&mut self, group: &str, records: &[TrainingRecord], step: u64) -> Result<()> {
        self.record()?.trainings.push((group.to_string(), step, records.to_vec()));
        Ok(())
    }

    fn log_evaluation(&mut self, rollouts: &[Batch], frames: &[RenderFrame], step: u64, total_frames: u64) -> Result<()> {
        self.record()?.evaluations.push((step, total_frames, rollouts.len(), frames.len()));
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.record()?.commits += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.record()?.finishes += 1;
        Ok(())
    }
}

/// Filesystem storage that remembers every path it wrote.
#[derive(Default)]
pub struct CountingStorage {
    pub writes: Mutex<Vec<PathBuf>>,
}

impl CheckpointStorage for CountingStorage {
    fn write(&self, blob: &[u8], path: &Path) -> Result<()> {
        FsCheckpointStorage.write(blob, path)?;
        if let Ok(mut writes) = self.writes.lock() {
            writes.push(path.to_path_buf());
        }
        Ok(())
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        FsCheckpointStorage.read(path)
    }
}

pub struct RecorderCallback(pub Arc<Recorder>);

impl RecorderCallback {
    fn push(&self, event: &str) {
        if let Ok(mut events) = self.0.callback_events.lock() {
            events.push(event.to_string());
        }
    }
}

impl Callback for RecorderCallback {
    fn on_setup(&mut self) -> Result<()> {
        self.push("setup");
        Ok(())
    }

    fn on_batch_collected(&mut self, _batch: &Batch) -> Result<()> {
        self.push("batch");
        Ok(())
    }

    fn on_train_step(&mut self, _sample: &Batch, _group: &str) -> Result<Option<LossValues>> {
        Ok(Some(LossValues::from([("callback_extra".to_string(), 1.0)])))
    }

    fn on_train_end(&mut self, _records: &[TrainingRecord], group: &str) -> Result<()> {
        self.push(&format!("train_end:{}", group));
        Ok(())
    }

    fn on_evaluation_end(&mut self, _rollouts: &[Batch]) -> Result<()> {
        self.push("evaluation");
        Ok(())
    }
}

/// On-policy, 100 frames per batch from 10 envs, five iterations, evaluation every batch.
pub fn small_config(save_folder: &Path) -> ExperimentConfig {
    ExperimentConfig {
        on_policy_collected_frames_per_batch: 100,
        on_policy_n_envs_per_worker: 10,
        on_policy_minibatch_size: 50,
        on_policy_n_minibatch_iters: 2,
        off_policy_collected_frames_per_batch: 100,
        off_policy_n_envs_per_worker: 10,
        off_policy_train_batch_size: 32,
        off_policy_n_optimizer_steps: 3,
        off_policy_memory_size: 1000,
        max_n_iters: Some(5),
        max_n_frames: None,
        evaluation: true,
        evaluation_interval: 100,
        evaluation_episodes: 2,
        checkpoint_interval: 0,
        loggers: Vec::new(),
        create_json: false,
        lr: 0.01,
        save_folder: Some(save_folder.to_path_buf()),
        ..ExperimentConfig::default()
    }
}

/// Everything needed to build and inspect one scripted experiment.
pub struct Harness {
    pub recorder: Arc<Recorder>,
    pub log: Arc<Mutex<LogRecord>>,
    pub storage: Arc<CountingStorage>,
    pub vectorized: bool,
    pub on_policy: bool,
    pub fail_forward_for: Option<String>,
}

impl Harness {
    pub fn new(vectorized: bool, on_policy: bool) -> Self {
        Self {
            recorder: Arc::new(Recorder::default()),
            log: Arc::new(Mutex::new(LogRecord::default())),
            storage: Arc::new(CountingStorage::default()),
            vectorized,
            on_policy,
            fail_forward_for: None,
        }
    }

    pub fn task(&self) -> ScriptedTask {
        ScriptedTask::new(self.vectorized, Arc::clone(&self.recorder))
    }

    pub fn builder(&self, config: ExperimentConfig) -> ExperimentBuilder {
        self.builder_for(self.task(), config)
    }

    pub fn builder_for(&self, task: ScriptedTask, config: ExperimentConfig) -> ExperimentBuilder {
        let algorithm = LinearAlgorithmConfig {
            on_policy: self.on_policy,
            support: ActionSupport::continuous_only(),
            recorder: Arc::clone(&self.recorder),
            fail_forward_for: self.fail_forward_for.clone(),
        };
        ExperimentBuilder::new(Arc::new(task), Arc::new(algorithm), Arc::new(MlpModel), config)
            .seed(3)
            .logger(Box::new(RecordingLogger(Arc::clone(&self.log))))
            .storage(Arc::clone(&self.storage) as Arc<dyn CheckpointStorage>)
            .callback(Box::new(RecorderCallback(Arc::clone(&self.recorder))))
    }

    pub fn log(&self) -> std::sync::MutexGuard<'_, LogRecord> {
        self.log.lock().unwrap()
    }

    pub fn checkpoint_writes(&self) -> Vec<PathBuf> {
        self.storage.writes.lock().unwrap().clone()
    }
}
