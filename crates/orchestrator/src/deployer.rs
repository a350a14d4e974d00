//! The deployment pipeline.
//!
//! A run walks `ResolveSourceDir -> Archive -> Transfer -> RemoteExecute`
//! and always finishes with `Cleanup`, which removes the local archive no
//! matter where the pipeline stopped. Each long-running stage is bounded by
//! its timeout and by the deployer's cancellation token.

use chrono::Utc;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use dockship_core::{ArchiveArtifact, DeployPhase, DeploymentTarget, RemoteCommandScript};
use transport::{
    Archiver, RemoteExecutor, RemoteOutput, ScpTransporter, SshExecutor, TarArchiver, Transporter,
};

use crate::config::DeployConfig;
use crate::error::{DeployError, Result};
use crate::report::{DeployReport, StageTiming};
use crate::resources::{ArchiveGuard, SourceLock};
use crate::state_machine::PhaseTracker;

/// Archive stem used when the source directory has no usable name.
const FALLBACK_ARCHIVE_STEM: &str = "archive";

/// Everything a run will touch, resolved before anything is written.
#[derive(Debug, Clone)]
pub struct DeployPlan {
    pub source_dir: PathBuf,
    pub archive_path: PathBuf,
    pub lock_path: PathBuf,
    pub script: RemoteCommandScript,
}

pub struct Deployer {
    config: DeployConfig,
    archiver: Arc<dyn Archiver>,
    transporter: Arc<dyn Transporter>,
    executor: Arc<dyn RemoteExecutor>,
    cancel: CancellationToken,
}

impl Deployer {
    pub fn new(config: DeployConfig) -> Self {
        let transporter = ScpTransporter::new().with_port(config.ssh_port);
        let executor = SshExecutor::new().with_port(config.ssh_port);

        Self {
            config,
            archiver: Arc::new(TarArchiver::new()),
            transporter: Arc::new(transporter),
            executor: Arc::new(executor),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_archiver(mut self, archiver: Arc<dyn Archiver>) -> Self {
        self.archiver = archiver;
        self
    }

    pub fn with_transporter(mut self, transporter: Arc<dyn Transporter>) -> Self {
        self.transporter = transporter;
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn RemoteExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Cancelling this token aborts the running stage and skips the rest.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    /// Resolve paths and render the remote script without side effects.
    pub fn plan(&self, target: &DeploymentTarget) -> Result<DeployPlan> {
        let source_dir = self.resolve_source_dir()?;

        let stem = source_dir
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(FALLBACK_ARCHIVE_STEM);
        let archive_name = format!("{}.tar", stem);

        let staging_dir = match &self.config.staging_dir {
            Some(dir) => dir.clone(),
            None => source_dir
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| source_dir.clone()),
        };

        let script = RemoteCommandScript::container_lifecycle(
            target,
            &archive_name,
            &self.config.container,
        )
        .with_policy(self.config.failure_policy);

        Ok(DeployPlan {
            archive_path: staging_dir.join(&archive_name),
            lock_path: staging_dir.join(format!("{}.lock", archive_name)),
            source_dir,
            script,
        })
    }

    fn resolve_source_dir(&self) -> Result<PathBuf> {
        let path = &self.config.source_dir;
        match std::fs::canonicalize(path) {
            Ok(dir) if dir.is_dir() => Ok(dir),
            _ => Err(DeployError::DirectoryNotFound(path.clone())),
        }
    }

    pub async fn deploy(&self, target: &DeploymentTarget) -> Result<DeployReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("deploy", %run_id, target = %target);
        self.run(run_id, target).instrument(span).await
    }

    async fn run(&self, run_id: Uuid, target: &DeploymentTarget) -> Result<DeployReport> {
        let started_at = Utc::now();
        let mut tracker = PhaseTracker::new();
        let mut stages = Vec::new();

        info!(source = %self.config.source_dir.display(), "Starting deployment");

        tracker.advance(DeployPhase::ResolveSourceDir)?;
        let plan = match self.plan(target) {
            Ok(plan) => plan,
            Err(e) => return self.abort(&mut tracker, e),
        };
        debug!(
            source = %plan.source_dir.display(),
            archive = %plan.archive_path.display(),
            "Deployment planned"
        );

        tracker.advance(DeployPhase::Archive)?;
        // Only a lock this run created may be removed during cleanup.
        let mut lock = match SourceLock::acquire(&plan.lock_path) {
            Ok(lock) => lock,
            Err(e) => return self.abort(&mut tracker, e),
        };
        let mut guard = ArchiveGuard::new(&plan.archive_path);

        let outcome = self
            .pipeline(target, &plan, &mut tracker, &mut stages)
            .await;
        let cleanup = self
            .cleanup(&mut tracker, &mut guard, &mut lock, &mut stages)
            .await;

        if let Err(e) = cleanup {
            warn!(error = %e, "Cleanup failed");
        }

        match outcome {
            Ok((artifact, output)) => {
                tracker.advance(DeployPhase::Succeeded)?;

                let report = DeployReport {
                    run_id,
                    target: target.to_string(),
                    source_dir: plan.source_dir,
                    archive_bytes: artifact.size_bytes,
                    steps: output.steps_started,
                    stages,
                    started_at,
                    finished_at: Utc::now(),
                };

                info!(duration_ms = report.duration_ms(), "Deployment succeeded");
                Ok(report)
            }
            Err(e) => self.failed(&mut tracker, e),
        }
    }

    async fn pipeline(
        &self,
        target: &DeploymentTarget,
        plan: &DeployPlan,
        tracker: &mut PhaseTracker,
        stages: &mut Vec<StageTiming>,
    ) -> Result<(ArchiveArtifact, RemoteOutput)> {
        let token = self.cancel.child_token();
        let artifact = self
            .run_stage(
                DeployPhase::Archive,
                &token,
                stages,
                self.archiver.create_archive(
                    &plan.source_dir,
                    &self.config.exclude,
                    &plan.archive_path,
                    &token,
                ),
            )
            .await?;
        info!(
            archiver = self.archiver.name(),
            bytes = artifact.size_bytes,
            "Archive created"
        );

        tracker.advance(DeployPhase::Transfer)?;
        let token = self.cancel.child_token();
        self.run_stage(
            DeployPhase::Transfer,
            &token,
            stages,
            self.transporter.send(&artifact, target, &token),
        )
        .await?;
        info!(transporter = self.transporter.name(), "Archive transferred");

        tracker.advance(DeployPhase::RemoteExecute)?;
        let token = self.cancel.child_token();
        let output = self
            .run_stage(
                DeployPhase::RemoteExecute,
                &token,
                stages,
                self.executor.run(target, &plan.script, &token),
            )
            .await?;

        let expected = plan.script.steps().len();
        if output.steps_started.len() < expected {
            warn!(
                started = output.steps_started.len(),
                expected, "Remote session reported fewer steps than scripted"
            );
        }
        info!(
            executor = self.executor.name(),
            steps = output.steps_started.len(),
            "Remote script finished"
        );

        Ok((artifact, output))
    }

    /// Drive `work` to completion unless the stage times out or the run is
    /// cancelled. In both cases `token` is cancelled and `work` is awaited
    /// so the component can stop its child process before we move on.
    async fn run_stage<T, F>(
        &self,
        stage: DeployPhase,
        token: &CancellationToken,
        stages: &mut Vec<StageTiming>,
        work: F,
    ) -> Result<T>
    where
        F: Future<Output = transport::Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(DeployError::Cancelled { stage });
        }

        let limit = self
            .config
            .timeouts
            .for_phase(stage)
            .unwrap_or(Duration::MAX);
        let started = Instant::now();
        info!(stage = %stage, "Stage started");

        tokio::pin!(work);
        let result = tokio::select! {
            result = &mut work => result.map_err(|e| DeployError::from_transport(stage, e)),
            _ = tokio::time::sleep(limit) => {
                warn!(stage = %stage, ?limit, "Stage timed out, stopping it");
                token.cancel();
                let _ = work.await;
                Err(DeployError::Timeout { stage, after: limit })
            }
            _ = self.cancel.cancelled() => {
                warn!(stage = %stage, "Deployment cancelled");
                token.cancel();
                let _ = work.await;
                Err(DeployError::Cancelled { stage })
            }
        };

        let elapsed = started.elapsed();
        if result.is_ok() {
            debug!(stage = %stage, duration_ms = elapsed.as_millis() as u64, "Stage completed");
            stages.push(StageTiming::new(stage, elapsed));
        }
        result
    }

    async fn cleanup(
        &self,
        tracker: &mut PhaseTracker,
        guard: &mut ArchiveGuard,
        lock: &mut SourceLock,
        stages: &mut Vec<StageTiming>,
    ) -> Result<()> {
        tracker.advance(DeployPhase::Cleanup)?;
        let started = Instant::now();

        let removed = guard.release().await;
        let unlocked = lock.release();

        match &removed {
            Ok(true) => debug!(path = %guard.path().display(), "Local archive removed"),
            Ok(false) => debug!("No local archive to remove"),
            Err(e) => warn!(error = %e, "Failed to remove local archive"),
        }

        stages.push(StageTiming::new(DeployPhase::Cleanup, started.elapsed()));
        removed.map(|_| ()).and(unlocked)
    }

    /// Fail before any local file was created.
    fn abort<T>(&self, tracker: &mut PhaseTracker, err: DeployError) -> Result<T> {
        tracker.advance(DeployPhase::Cleanup)?;
        self.failed(tracker, err)
    }

    fn failed<T>(&self, tracker: &mut PhaseTracker, err: DeployError) -> Result<T> {
        tracker.advance(DeployPhase::Failed)?;
        error!(stage = %err.stage(), error = %err, "Deployment failed");
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dockship_core::{FailurePolicy, StepKind};
    use std::collections::BTreeSet;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use transport::TransportError;

    use crate::config::StageTimeouts;

    struct FakeArchiver {
        fail: bool,
    }

    #[async_trait]
    impl Archiver for FakeArchiver {
        fn name(&self) -> &'static str {
            "fake-tar"
        }

        async fn create_archive(
            &self,
            source_dir: &Path,
            _exclude: &BTreeSet<String>,
            archive_path: &Path,
            _cancel: &CancellationToken,
        ) -> transport::Result<ArchiveArtifact> {
            if !source_dir.is_dir() {
                return Err(TransportError::DirectoryNotFound(source_dir.to_path_buf()));
            }
            std::fs::write(archive_path, b"archive")?;
            if self.fail {
                return Err(TransportError::ArchiveFailed("disk full".to_string()));
            }
            Ok(ArchiveArtifact::new(archive_path).created(7))
        }
    }

    #[derive(Default)]
    struct FakeTransporter {
        fail: bool,
        hang: bool,
        sent: Mutex<Vec<(PathBuf, bool)>>,
    }

    #[async_trait]
    impl Transporter for FakeTransporter {
        fn name(&self) -> &'static str {
            "fake-scp"
        }

        async fn send(
            &self,
            artifact: &ArchiveArtifact,
            _target: &DeploymentTarget,
            cancel: &CancellationToken,
        ) -> transport::Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((artifact.path().to_path_buf(), artifact.path().exists()));

            if self.hang {
                cancel.cancelled().await;
                return Err(TransportError::Cancelled("scp".to_string()));
            }
            if self.fail {
                return Err(TransportError::TransferFailed {
                    exit_code: Some(1),
                    stderr: "Connection refused".to_string(),
                });
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeExecutor {
        fail_at: Option<StepKind>,
        scripts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RemoteExecutor for FakeExecutor {
        fn name(&self) -> &'static str {
            "fake-ssh"
        }

        async fn run(
            &self,
            _target: &DeploymentTarget,
            script: &RemoteCommandScript,
            _cancel: &CancellationToken,
        ) -> transport::Result<RemoteOutput> {
            self.scripts.lock().unwrap().push(script.render());

            let mut steps_started = Vec::new();
            for step in script.steps() {
                steps_started.push(step.kind);
                if Some(step.kind) == self.fail_at {
                    return Err(TransportError::RemoteExecFailed {
                        exit_code: Some(1),
                        step: Some(step.kind),
                        stderr: "build failed".to_string(),
                    });
                }
            }

            Ok(RemoteOutput { steps_started })
        }
    }

    struct Fixture {
        _dir: TempDir,
        root: PathBuf,
        source: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let root = std::fs::canonicalize(dir.path()).unwrap();
            let source = root.join("server");
            std::fs::create_dir_all(source.join("venv")).unwrap();
            std::fs::write(source.join("app.py"), "print('hi')").unwrap();
            Self {
                _dir: dir,
                root,
                source,
            }
        }

        fn archive(&self) -> PathBuf {
            self.root.join("server.tar")
        }

        fn lock(&self) -> PathBuf {
            self.root.join("server.tar.lock")
        }
    }

    fn target() -> DeploymentTarget {
        DeploymentTarget::new("deploy", "example.com", "/srv/app").unwrap()
    }

    fn deployer(
        config: DeployConfig,
        archiver: FakeArchiver,
        transporter: &Arc<FakeTransporter>,
        executor: &Arc<FakeExecutor>,
    ) -> Deployer {
        Deployer::new(config)
            .with_archiver(Arc::new(archiver))
            .with_transporter(transporter.clone())
            .with_executor(executor.clone())
    }

    #[tokio::test]
    async fn test_deploy_success() {
        let fx = Fixture::new();
        let transporter = Arc::new(FakeTransporter::default());
        let executor = Arc::new(FakeExecutor::default());
        let cwd = std::env::current_dir().unwrap();

        let report = deployer(
            DeployConfig::new(&fx.source),
            FakeArchiver { fail: false },
            &transporter,
            &executor,
        )
        .deploy(&target())
        .await
        .unwrap();

        assert_eq!(report.steps, StepKind::ALL.to_vec());
        assert_eq!(report.archive_bytes, 7);
        assert_eq!(report.target, "deploy@example.com:/srv/app");
        let phases: Vec<DeployPhase> = report.stages.iter().map(|s| s.phase).collect();
        assert_eq!(
            phases,
            vec![
                DeployPhase::Archive,
                DeployPhase::Transfer,
                DeployPhase::RemoteExecute,
                DeployPhase::Cleanup
            ]
        );

        let sent = transporter.sent.lock().unwrap().clone();
        assert_eq!(sent, vec![(fx.archive(), true)]);

        let scripts = executor.scripts.lock().unwrap().clone();
        assert_eq!(scripts.len(), 1);
        assert!(scripts[0].starts_with("set -e\n"));
        assert!(scripts[0].contains("tar -xf server.tar"));

        assert!(!fx.archive().exists());
        assert!(!fx.lock().exists());
        assert_eq!(std::env::current_dir().unwrap(), cwd);
    }

    #[tokio::test]
    async fn test_missing_source_dir() {
        let fx = Fixture::new();
        let transporter = Arc::new(FakeTransporter::default());
        let executor = Arc::new(FakeExecutor::default());

        let result = deployer(
            DeployConfig::new(fx.root.join("missing")),
            FakeArchiver { fail: false },
            &transporter,
            &executor,
        )
        .deploy(&target())
        .await;

        assert!(matches!(result, Err(DeployError::DirectoryNotFound(_))));
        assert!(transporter.sent.lock().unwrap().is_empty());
        assert!(!fx.root.join("missing.tar").exists());
        assert!(!fx.root.join("missing.tar.lock").exists());
    }

    #[tokio::test]
    async fn test_archive_failure_removes_partial_file() {
        let fx = Fixture::new();
        let transporter = Arc::new(FakeTransporter::default());
        let executor = Arc::new(FakeExecutor::default());

        let result = deployer(
            DeployConfig::new(&fx.source),
            FakeArchiver { fail: true },
            &transporter,
            &executor,
        )
        .deploy(&target())
        .await;

        assert!(matches!(result, Err(DeployError::ArchiveFailed(_))));
        assert!(transporter.sent.lock().unwrap().is_empty());
        assert!(!fx.archive().exists());
        assert!(!fx.lock().exists());
    }

    #[tokio::test]
    async fn test_transfer_failure_skips_remote() {
        let fx = Fixture::new();
        let transporter = Arc::new(FakeTransporter {
            fail: true,
            ..Default::default()
        });
        let executor = Arc::new(FakeExecutor::default());

        let result = deployer(
            DeployConfig::new(&fx.source),
            FakeArchiver { fail: false },
            &transporter,
            &executor,
        )
        .deploy(&target())
        .await;

        match result {
            Err(DeployError::TransferFailed { exit_code, reason }) => {
                assert_eq!(exit_code, Some(1));
                assert_eq!(reason, "Connection refused");
            }
            other => panic!("expected TransferFailed, got {:?}", other),
        }
        assert!(executor.scripts.lock().unwrap().is_empty());
        assert!(!fx.archive().exists());
    }

    #[tokio::test]
    async fn test_remote_failure_names_step() {
        let fx = Fixture::new();
        let transporter = Arc::new(FakeTransporter::default());
        let executor = Arc::new(FakeExecutor {
            fail_at: Some(StepKind::BuildImage),
            ..Default::default()
        });

        let result = deployer(
            DeployConfig::new(&fx.source),
            FakeArchiver { fail: false },
            &transporter,
            &executor,
        )
        .deploy(&target())
        .await;

        let err = result.unwrap_err();
        assert!(matches!(
            err,
            DeployError::RemoteExecFailed {
                step: Some(StepKind::BuildImage),
                exit_code: Some(1),
                ..
            }
        ));
        assert_eq!(err.stage(), DeployPhase::RemoteExecute);
        assert!(!fx.archive().exists());
        assert!(!fx.lock().exists());
    }

    #[tokio::test]
    async fn test_stage_timeout() {
        let fx = Fixture::new();
        let transporter = Arc::new(FakeTransporter {
            hang: true,
            ..Default::default()
        });
        let executor = Arc::new(FakeExecutor::default());
        let config = DeployConfig::new(&fx.source)
            .with_timeouts(StageTimeouts::uniform(Duration::from_millis(100)));

        let result = deployer(config, FakeArchiver { fail: false }, &transporter, &executor)
            .deploy(&target())
            .await;

        assert!(matches!(
            result,
            Err(DeployError::Timeout {
                stage: DeployPhase::Transfer,
                ..
            })
        ));
        assert!(executor.scripts.lock().unwrap().is_empty());
        assert!(!fx.archive().exists());
    }

    #[tokio::test]
    async fn test_external_cancellation() {
        let fx = Fixture::new();
        let transporter = Arc::new(FakeTransporter {
            hang: true,
            ..Default::default()
        });
        let executor = Arc::new(FakeExecutor::default());
        let deployer = deployer(
            DeployConfig::new(&fx.source),
            FakeArchiver { fail: false },
            &transporter,
            &executor,
        );

        let token = deployer.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });

        let result = deployer.deploy(&target()).await;

        assert!(matches!(
            result,
            Err(DeployError::Cancelled {
                stage: DeployPhase::Transfer
            })
        ));
        assert!(!fx.archive().exists());
        assert!(!fx.lock().exists());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let fx = Fixture::new();
        let transporter = Arc::new(FakeTransporter::default());
        let executor = Arc::new(FakeExecutor::default());
        let token = CancellationToken::new();
        token.cancel();

        let result = deployer(
            DeployConfig::new(&fx.source),
            FakeArchiver { fail: false },
            &transporter,
            &executor,
        )
        .with_cancellation(token)
        .deploy(&target())
        .await;

        assert!(matches!(
            result,
            Err(DeployError::Cancelled {
                stage: DeployPhase::Archive
            })
        ));
        assert!(!fx.archive().exists());
    }

    #[tokio::test]
    async fn test_concurrent_run_is_rejected() {
        let fx = Fixture::new();
        std::fs::write(fx.lock(), "4242\n").unwrap();
        let transporter = Arc::new(FakeTransporter::default());
        let executor = Arc::new(FakeExecutor::default());

        let result = deployer(
            DeployConfig::new(&fx.source),
            FakeArchiver { fail: false },
            &transporter,
            &executor,
        )
        .deploy(&target())
        .await;

        assert!(matches!(result, Err(DeployError::AlreadyRunning { .. })));
        assert!(fx.lock().exists());
        assert!(!fx.archive().exists());
        assert!(transporter.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_plan_paths() {
        let fx = Fixture::new();
        let plan = Deployer::new(DeployConfig::new(&fx.source))
            .plan(&target())
            .unwrap();

        assert_eq!(plan.source_dir, fx.source);
        assert_eq!(plan.archive_path, fx.archive());
        assert_eq!(plan.lock_path, fx.lock());
        assert_eq!(plan.script.steps().len(), 9);
        assert_eq!(plan.script.policy(), FailurePolicy::Strict);
    }

    #[test]
    fn test_plan_with_staging_dir_and_lenient_policy() {
        let fx = Fixture::new();
        let staging = fx.root.join("staging");
        let config = DeployConfig::new(&fx.source)
            .with_staging_dir(&staging)
            .with_failure_policy(FailurePolicy::Lenient);

        let plan = Deployer::new(config).plan(&target()).unwrap();

        assert_eq!(plan.archive_path, staging.join("server.tar"));
        assert!(!plan.script.render().starts_with("set -e"));
    }
}
