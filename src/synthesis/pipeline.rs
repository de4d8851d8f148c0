//! The generate -> validate -> persist pipeline.
//!
//! For every difficulty tier the pipeline walks seed pairs with a sliding
//! window until the tier holds the requested number of accepted tasks or the
//! seeds run out. Tiers run concurrently and share one [`SeenTaskSet`]. Each
//! seed pair is processed as:
//!
//! 1. generate a candidate from the two seeds,
//! 2. reserve its normalized text (duplicates stop here, before any sandbox),
//! 3. validate setup and initial failure,
//! 4. validate solvability with `k` concurrent attempts,
//! 5. persist the task and its rollouts.
//!
//! A rejected candidate releases its reservation and persists nothing. Once
//! the task line is written its text stays reserved, even if writing its
//! rollouts fails. Failures of one pair or one tier are logged and counted;
//! only an unreadable task log stops a run.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::future::join_all;

use super::config::SynthesisConfig;
use super::dedup::SeenTaskSet;
use super::store::{SynthesisStore, TaskRecord};
use super::synthesizer::TaskSynthesizer;
use super::task::ShellTask;
use super::validator::TaskValidator;
use crate::dataset::ScenarioDataset;
use crate::error::PipelineError;
use crate::llm::LlmProvider;
use crate::metrics;
use crate::sandbox::SandboxService;

/// Tiers used when none are configured and the seed corpus has none.
pub const FALLBACK_DIFFICULTIES: [u32; 4] = [1, 2, 3, 4];

/// What happened to one seed pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairOutcome {
    Saved { task_id: String },
    GenerationFailed,
    Duplicate,
    SetupInvalid,
    BelowThreshold { successes: usize },
    /// Writing to the store failed. `task_id` is set when the task line was
    /// written and only its rollouts were lost.
    PersistFailed { task_id: Option<String> },
}

impl PairOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PairOutcome::Saved { .. } => "saved",
            PairOutcome::GenerationFailed => "generation_failed",
            PairOutcome::Duplicate => "duplicate",
            PairOutcome::SetupInvalid => "setup_invalid",
            PairOutcome::BelowThreshold { .. } => "below_threshold",
            PairOutcome::PersistFailed { .. } => "persist_failed",
        }
    }
}

/// Progress of one difficulty tier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierReport {
    pub difficulty: u32,
    pub target: usize,
    /// Tasks of this tier persisted by earlier runs.
    pub existing: usize,
    /// Tasks accepted in this run.
    pub accepted: usize,
    pub pairs_processed: usize,
    /// Outcome tallies keyed by [`PairOutcome::as_str`].
    pub outcomes: BTreeMap<&'static str, usize>,
    /// Set when the tier's seeds could not be loaded.
    pub seed_error: Option<String>,
}

impl TierReport {
    fn new(difficulty: u32, target: usize, existing: usize) -> Self {
        Self {
            difficulty,
            target,
            existing,
            ..Self::default()
        }
    }

    pub fn total(&self) -> usize {
        self.existing + self.accepted
    }

    fn record(&mut self, outcome: &PairOutcome) {
        self.pairs_processed += 1;
        if matches!(
            outcome,
            PairOutcome::Saved { .. } | PairOutcome::PersistFailed { task_id: Some(_) }
        ) {
            self.accepted += 1;
        }
        *self.outcomes.entry(outcome.as_str()).or_insert(0) += 1;
    }
}

/// Summary of a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub tiers: Vec<TierReport>,
}

impl PipelineReport {
    pub fn accepted(&self) -> usize {
        self.tiers.iter().map(|t| t.accepted).sum()
    }

    pub fn tier(&self, difficulty: u32) -> Option<&TierReport> {
        self.tiers.iter().find(|t| t.difficulty == difficulty)
    }
}

/// Coordinates synthesis, validation and persistence.
pub struct SynthesisPipeline {
    synthesizer: TaskSynthesizer,
    validator: TaskValidator,
    store: SynthesisStore,
    seen: SeenTaskSet,
    config: SynthesisConfig,
}

impl SynthesisPipeline {
    pub fn new(
        sandbox: Arc<dyn SandboxService>,
        llm: Arc<dyn LlmProvider>,
        config: SynthesisConfig,
    ) -> Self {
        Self {
            synthesizer: TaskSynthesizer::new(Arc::clone(&llm), &config),
            validator: TaskValidator::new(sandbox, llm, &config),
            store: SynthesisStore::new(&config.out_dir),
            seen: SeenTaskSet::new(),
            config,
        }
    }

    pub fn seen(&self) -> &SeenTaskSet {
        &self.seen
    }

    pub fn store(&self) -> &SynthesisStore {
        &self.store
    }

    /// Fill every configured tier from the seed corpus.
    pub async fn run(&self, dataset: &ScenarioDataset) -> Result<PipelineReport, PipelineError> {
        let existing = self.store.load_tasks().await?;
        let mut counts: HashMap<u32, usize> = HashMap::new();
        for record in &existing {
            *counts.entry(record.difficulty_level).or_insert(0) += 1;
        }
        self.seen.seed(existing.iter().map(|r| r.task.as_str()));
        tracing::info!(existing = existing.len(), seen = self.seen.len(), "Loaded existing tasks");

        let difficulties = self.difficulties(dataset).await;
        let tiers = difficulties
            .iter()
            .map(|&d| self.run_tier(dataset, d, counts.get(&d).copied().unwrap_or(0)));

        Ok(PipelineReport {
            tiers: join_all(tiers).await,
        })
    }

    async fn difficulties(&self, dataset: &ScenarioDataset) -> Vec<u32> {
        if let Some(difficulties) = &self.config.difficulties {
            return difficulties.clone();
        }
        match dataset.difficulties(&self.config.seed_split).await {
            Ok(found) if !found.is_empty() => found,
            Ok(_) => FALLBACK_DIFFICULTIES.to_vec(),
            Err(e) => {
                tracing::warn!(error = %e, "Could not discover difficulty tiers; using defaults");
                FALLBACK_DIFFICULTIES.to_vec()
            }
        }
    }

    async fn run_tier(
        &self,
        dataset: &ScenarioDataset,
        difficulty: u32,
        existing: usize,
    ) -> TierReport {
        let target = self.config.tasks_per_difficulty;
        let mut report = TierReport::new(difficulty, target, existing);
        if existing >= target {
            tracing::info!(difficulty = difficulty, have = existing, target = target, "Tier already complete, skipping");
            return report;
        }

        let seeds = match dataset.seed_tasks(&self.config.seed_split, difficulty).await {
            Ok(seeds) => seeds,
            Err(e) => {
                tracing::warn!(difficulty = difficulty, error = %e, "Could not load seed tasks, skipping tier");
                report.seed_error = Some(e.to_string());
                return report;
            }
        };
        tracing::info!(difficulty = difficulty, have = existing, target = target, seeds = seeds.len(), "Filling tier");

        let step = self.config.seed_step.max(1);
        let mut offset = 0;
        while report.total() < target {
            let (Some(seed_a), Some(seed_b)) = (seeds.get(offset), seeds.get(offset + 1)) else {
                tracing::info!(difficulty = difficulty, offset = offset, "No more seed pairs");
                break;
            };
            let outcome = self.process_seed_pair(seed_a, seed_b, difficulty).await;
            metrics::record_candidate(outcome.as_str());
            report.record(&outcome);
            offset += step;
        }

        report
    }

    /// Turn one seed pair into at most one persisted task.
    pub async fn process_seed_pair(
        &self,
        seed_a: &ShellTask,
        seed_b: &ShellTask,
        difficulty: u32,
    ) -> PairOutcome {
        let candidate = match self.synthesizer.generate(seed_a, seed_b, difficulty).await {
            Ok(candidate) => candidate,
            Err(e) => {
                tracing::warn!(difficulty = difficulty, error = %e, "Generation error");
                return PairOutcome::GenerationFailed;
            }
        };

        let Some(reservation) = self.seen.reserve(&candidate.task) else {
            tracing::info!(difficulty = difficulty, "Duplicate task text, skipping");
            return PairOutcome::Duplicate;
        };

        if !self.validator.validate_setup(&candidate).await {
            tracing::info!(difficulty = difficulty, "Setup invalid, skipping");
            return PairOutcome::SetupInvalid;
        }

        let k = self.config.k;
        let threshold = self.config.threshold;
        let result = self.validator.validate_solvability(&candidate, k, threshold).await;
        if !result.passed {
            tracing::info!(
                difficulty = difficulty,
                successes = result.successes,
                k = k,
                "Did not pass success threshold, skipping"
            );
            return PairOutcome::BelowThreshold {
                successes: result.successes,
            };
        }

        let record = TaskRecord::new(&candidate, k, threshold);
        if let Err(e) = self.store.save_task(&record).await {
            tracing::error!(task_id = %record.id, difficulty = difficulty, error = %e, "Failed to save task");
            return PairOutcome::PersistFailed { task_id: None };
        }
        reservation.commit();

        let rollouts = match self
            .store
            .save_rollouts(&record, &result.attempts, self.config.save_all_rollouts)
            .await
        {
            Ok(rollouts) => rollouts,
            Err(e) => {
                tracing::error!(task_id = %record.id, difficulty = difficulty, error = %e, "Failed to save rollouts");
                return PairOutcome::PersistFailed {
                    task_id: Some(record.id),
                };
            }
        };

        tracing::info!(
            task_id = %record.id,
            difficulty = difficulty,
            successes = result.successes,
            rollouts = rollouts,
            "Saved task"
        );
        PairOutcome::Saved { task_id: record.id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{Choice, GenerationRequest, GenerationResponse, Message, Usage};
    use crate::sandbox::ExecOutcome;
    use crate::test_support::MockSandbox;
    use async_trait::async_trait;
    use std::collections::{HashSet, VecDeque};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Answers generation prompts from a queue of task texts and solver
    /// prompts with a fixed command.
    struct RoutingLlm {
        tasks: Mutex<VecDeque<String>>,
        solver_command: String,
        generations: AtomicUsize,
    }

    impl RoutingLlm {
        fn new(tasks: &[&str], solver_command: &str) -> Self {
            Self {
                tasks: Mutex::new(tasks.iter().map(|t| t.to_string()).collect()),
                solver_command: solver_command.to_string(),
                generations: AtomicUsize::new(0),
            }
        }

        fn generations(&self) -> usize {
            self.generations.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmProvider for RoutingLlm {
        async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
            let prompt = &request.messages[0].content;
            let content = if prompt.contains("shell task generator") {
                self.generations.fetch_add(1, Ordering::SeqCst);
                let mut tasks = self.tasks.lock().expect("lock poisoned");
                let task = if tasks.len() > 1 {
                    tasks.pop_front()
                } else {
                    tasks.front().cloned()
                }
                .unwrap_or_default();
                format!(
                    "#Task Description#: {}\n#Setup Commands#: mkdir -p /w\n#Success Condition#: test -f /w/done",
                    task
                )
            } else {
                format!("#Reasoning#: finish it\n#Command#: {}", self.solver_command)
            };
            Ok(GenerationResponse {
                id: "mock-id".to_string(),
                model: "mock-model".to_string(),
                choices: vec![Choice {
                    index: 0,
                    message: Message::assistant(content),
                    finish_reason: Some("stop".to_string()),
                }],
                usage: Usage::default(),
            })
        }
    }

    /// `test -f /w/done` passes once a session in that sandbox ran `touch /w/done`.
    fn work_sandbox() -> MockSandbox {
        let done = Mutex::new(HashSet::<String>::new());
        MockSandbox::new().with_exec(move |call| {
            let mut done = done.lock().expect("lock poisoned");
            if call.standalone {
                let code = if done.contains(&call.sandbox_id) { 0 } else { 1 };
                return Ok(ExecOutcome::new("", code, false));
            }
            if call.command.contains("touch /w/done") {
                done.insert(call.sandbox_id.clone());
            }
            Ok(ExecOutcome::new("", 0, call.command.contains("exit 0")))
        })
    }

    fn write_seeds(dir: &Path, tiers: &[u32]) {
        let rows: Vec<String> = tiers
            .iter()
            .enumerate()
            .map(|(i, d)| {
                format!(
                    r#"{{"task_id":"s{i}","task":"Seed {i}","setup_commands":["mkdir /s{i}"],"success_condition":"test -f /s{i}/x","difficulty_level":{d}}}"#
                )
            })
            .collect();
        std::fs::write(dir.join("train.jsonl"), rows.join("\n")).expect("write seeds");
    }

    fn config(out: &Path) -> SynthesisConfig {
        SynthesisConfig::default()
            .with_out_dir(out)
            .with_k(2)
            .with_threshold(0.5)
            .with_tasks_per_difficulty(1)
            .with_difficulties(vec![1])
    }

    #[tokio::test]
    async fn test_accepted_task_is_persisted() {
        let dir = TempDir::new().expect("tempdir");
        write_seeds(dir.path(), &[1, 1]);
        let sandbox = Arc::new(work_sandbox());
        let llm = Arc::new(RoutingLlm::new(&["Write a marker"], "touch /w/done && exit 0"));
        let pipeline = SynthesisPipeline::new(sandbox.clone(), llm, config(dir.path()));

        let report = pipeline
            .run(&ScenarioDataset::new(dir.path()))
            .await
            .expect("run");

        assert_eq!(report.accepted(), 1);
        let tier = report.tier(1).expect("tier 1");
        assert_eq!(tier.outcomes.get("saved"), Some(&1));

        let tasks = pipeline.store().load_tasks().await.expect("tasks");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].task, "Write a marker");
        assert_eq!(tasks[0].setup_commands, vec!["mkdir -p /w".to_string()]);
        assert_eq!(tasks[0].k, 2);

        let rollouts = pipeline.store().load_rollouts().await.expect("rollouts");
        assert_eq!(rollouts.len(), 2);
        assert!(rollouts.iter().all(|r| r.solved && r.task_id == tasks[0].id));

        // one setup check plus k solve attempts
        assert_eq!(sandbox.created().len(), 3);
        assert!(pipeline.seen().contains("write a marker"));
    }

    #[tokio::test]
    async fn test_duplicate_skipped_before_any_sandbox() {
        let dir = TempDir::new().expect("tempdir");
        write_seeds(dir.path(), &[1, 1, 1, 1]);
        let sandbox = Arc::new(work_sandbox());
        let llm = Arc::new(RoutingLlm::new(&["Same task", "same  TASK"], "touch /w/done && exit 0"));
        let pipeline = SynthesisPipeline::new(
            sandbox.clone(),
            llm.clone(),
            config(dir.path()).with_tasks_per_difficulty(2),
        );

        let report = pipeline
            .run(&ScenarioDataset::new(dir.path()))
            .await
            .expect("run");

        let tier = report.tier(1).expect("tier 1");
        assert_eq!(tier.accepted, 1);
        assert_eq!(tier.outcomes.get("duplicate"), Some(&1));
        assert_eq!(tier.pairs_processed, 2);
        assert_eq!(llm.generations(), 2);
        assert_eq!(sandbox.created().len(), 3);
    }

    #[tokio::test]
    async fn test_unsolvable_candidate_persists_nothing() {
        let dir = TempDir::new().expect("tempdir");
        write_seeds(dir.path(), &[1, 1, 1]);
        let sandbox = Arc::new(work_sandbox());
        let llm = Arc::new(RoutingLlm::new(&["Impossible"], "exit 0"));
        let pipeline = SynthesisPipeline::new(
            sandbox,
            llm.clone(),
            config(dir.path()).with_seed_step(1),
        );

        let report = pipeline
            .run(&ScenarioDataset::new(dir.path()))
            .await
            .expect("run");

        let tier = report.tier(1).expect("tier 1");
        assert_eq!(tier.accepted, 0);
        // window advances by one over three seeds: two pairs
        assert_eq!(tier.outcomes.get("below_threshold"), Some(&2));
        assert_eq!(llm.generations(), 2);
        assert!(pipeline.store().load_tasks().await.expect("tasks").is_empty());
        assert!(!pipeline.seen().contains("impossible"));
    }

    #[tokio::test]
    async fn test_invalid_setup_is_rejected() {
        let dir = TempDir::new().expect("tempdir");
        write_seeds(dir.path(), &[1, 1]);
        let sandbox = Arc::new(work_sandbox().failing_start());
        let llm = Arc::new(RoutingLlm::new(&["Broken setup"], "exit 0"));
        let pipeline = SynthesisPipeline::new(sandbox.clone(), llm, config(dir.path()));

        let report = pipeline
            .run(&ScenarioDataset::new(dir.path()))
            .await
            .expect("run");

        assert_eq!(report.tier(1).expect("tier").outcomes.get("setup_invalid"), Some(&1));
        assert_eq!(sandbox.created().len(), 1);
        assert!(!pipeline.seen().contains("broken setup"));
    }

    #[tokio::test]
    async fn test_resume_skips_complete_tiers_and_seeds_seen_set() {
        let dir = TempDir::new().expect("tempdir");
        write_seeds(dir.path(), &[1, 1, 2, 2]);
        let store = SynthesisStore::new(dir.path());
        let earlier = ShellTask {
            task: "Already Done".to_string(),
            setup_commands: "true".to_string(),
            success_condition: "false".to_string(),
            difficulty_level: 1,
        };
        store
            .save(&TaskRecord::new(&earlier, 2, 0.5), &[], false)
            .await
            .expect("save");

        let sandbox = Arc::new(work_sandbox());
        let llm = Arc::new(RoutingLlm::new(&["already   done"], "touch /w/done && exit 0"));
        let pipeline = SynthesisPipeline::new(
            sandbox.clone(),
            llm.clone(),
            config(dir.path()).with_difficulties(vec![1, 2]),
        );

        let report = pipeline
            .run(&ScenarioDataset::new(dir.path()))
            .await
            .expect("run");

        let tier1 = report.tier(1).expect("tier 1");
        assert_eq!(tier1.existing, 1);
        assert_eq!(tier1.pairs_processed, 0);

        let tier2 = report.tier(2).expect("tier 2");
        assert_eq!(tier2.outcomes.get("duplicate"), Some(&1));
        assert_eq!(llm.generations(), 1);
        assert!(sandbox.created().is_empty());
    }

    #[tokio::test]
    async fn test_difficulties_discovered_from_seeds() {
        let dir = TempDir::new().expect("tempdir");
        write_seeds(dir.path(), &[3, 3, 1]);
        let sandbox = Arc::new(work_sandbox());
        let llm = Arc::new(RoutingLlm::new(&["A", "B"], "touch /w/done && exit 0"));
        let mut cfg = config(dir.path());
        cfg.difficulties = None;
        let pipeline = SynthesisPipeline::new(sandbox, llm, cfg);

        let report = pipeline
            .run(&ScenarioDataset::new(dir.path()))
            .await
            .expect("run");

        let tiers: Vec<u32> = report.tiers.iter().map(|t| t.difficulty).collect();
        assert_eq!(tiers, vec![1, 3]);
        // tier 1 has a single seed and no pair
        assert_eq!(report.tier(1).expect("tier 1").pairs_processed, 0);
        assert_eq!(report.tier(3).expect("tier 3").accepted, 1);
    }

    #[tokio::test]
    async fn test_generation_failure_advances_window() {
        let dir = TempDir::new().expect("tempdir");
        write_seeds(dir.path(), &[1, 1]);
        let sandbox = Arc::new(work_sandbox());
        let llm = Arc::new(crate::test_support::ScriptedLlm::always("no structure"));
        let pipeline = SynthesisPipeline::new(sandbox.clone(), llm.clone(), config(dir.path()));

        let report = pipeline
            .run(&ScenarioDataset::new(dir.path()))
            .await
            .expect("run");

        assert_eq!(
            report.tier(1).expect("tier").outcomes.get("generation_failed"),
            Some(&1)
        );
        assert_eq!(llm.calls(), 3);
        assert!(sandbox.created().is_empty());
    }

    #[tokio::test]
    async fn test_rollout_write_failure_stays_local_to_pair() {
        let dir = TempDir::new().expect("tempdir");
        write_seeds(dir.path(), &[1, 1, 2, 2]);
        // a directory where the rollout log should be makes every append fail
        std::fs::create_dir(dir.path().join(crate::synthesis::store::ROLLOUTS_FILE)).expect("mkdir");
        let sandbox = Arc::new(work_sandbox());
        let llm = Arc::new(RoutingLlm::new(&["Task one", "Task two"], "touch /w/done && exit 0"));
        let pipeline = SynthesisPipeline::new(
            sandbox,
            llm,
            config(dir.path()).with_difficulties(vec![1, 2]),
        );

        let report = pipeline
            .run(&ScenarioDataset::new(dir.path()))
            .await
            .expect("run");

        assert_eq!(report.tiers.len(), 2);
        for tier in &report.tiers {
            assert_eq!(tier.pairs_processed, 1);
            assert_eq!(tier.outcomes.get("persist_failed"), Some(&1));
            assert_eq!(tier.accepted, 1);
        }

        let tasks = pipeline.store().load_tasks().await.expect("tasks");
        assert_eq!(tasks.len(), 2);
        assert!(pipeline.seen().contains("task one"));
        assert!(pipeline.seen().contains("task two"));
    }

    #[tokio::test]
    async fn test_missing_seed_split_ends_tier_not_run() {
        let dir = TempDir::new().expect("tempdir");
        let sandbox = Arc::new(work_sandbox());
        let llm = Arc::new(RoutingLlm::new(&["Unused"], "exit 0"));
        let pipeline = SynthesisPipeline::new(
            sandbox.clone(),
            llm.clone(),
            config(dir.path()).with_difficulties(vec![1, 2]),
        );

        let report = pipeline
            .run(&ScenarioDataset::new(dir.path()))
            .await
            .expect("run");

        assert_eq!(report.tiers.len(), 2);
        assert!(report.tiers.iter().all(|t| t.seed_error.is_some() && t.pairs_processed == 0));
        assert_eq!(llm.generations(), 0);
        assert!(sandbox.created().is_empty());
    }
}
