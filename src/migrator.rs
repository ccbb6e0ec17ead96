//! Migrator - the workflow orchestrator
//!
//! Composes the manifest loader, dependency resolver, pattern resolver, lock
//! manager, content processor and repository around one database connection
//! to implement the find-pending, execute, rollback-validation and status
//! workflows.
//!
//! A migrator session is a small state machine: uninitialized ->
//! `initialize()` -> workflow calls -> `close()`. Workflow methods called
//! outside that window fail with [`MigrateError::NotInitialized`].

use crate::checksum;
use crate::config::ConnectionSettings;
use crate::content::{ContentProcessor, ScopeContext};
use crate::error::MigrateError;
use crate::executor::{HttpSurrealExecutor, SurrealExecutor};
use crate::file::{self, Direction, MigrationScript};
use crate::graph::DependencyGraph;
use crate::lock::LockManager;
use crate::manifest::{self, Manifest};
use crate::pattern::PatternResolver;
use crate::record::{ExecutionStatus, MigrationRecord};
use crate::repository::MigrationRepository;
use crate::status::{
    ExecutionReport, FileOutcome, FileResult, ModuleStatus, RollbackValidation, StatusReport,
};
use chrono::Utc;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;

/// Which way a batch mutates the database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Migrate,
    Rollback,
}

impl Operation {
    /// The script direction this operation executes
    #[must_use]
    pub fn direction(&self) -> Direction {
        match self {
            Operation::Migrate => Direction::Up,
            Operation::Rollback => Direction::Down,
        }
    }
}

/// Engine configuration surface consumed from the CLI or host
#[derive(Debug, Clone)]
pub struct MigratorOptions {
    /// Connection overrides; unset values fall back to file/env settings
    pub connection: ConnectionSettings,
    /// Migrations root directory
    pub migrations_dir: PathBuf,
    /// Override for the history table schema definition
    pub schema_path: Option<PathBuf>,
    /// Explicit manifest path; candidates under the root are probed otherwise
    pub config_path: Option<PathBuf>,
    /// Bypass applicability, lock and rollback-safety gates
    pub force: bool,
    /// Perform every read, suppress every write
    pub dry_run: bool,
}

impl Default for MigratorOptions {
    fn default() -> Self {
        Self {
            connection: ConnectionSettings::default(),
            migrations_dir: PathBuf::from("migrations"),
            schema_path: None,
            config_path: None,
            force: false,
            dry_run: false,
        }
    }
}

struct Session {
    executor: Box<dyn SurrealExecutor>,
    manifest: Manifest,
    graph: DependencyGraph,
    patterns: PatternResolver,
    locks: LockManager,
    repository: MigrationRepository,
    processor: ContentProcessor,
    scope: ScopeContext,
    applied_by: String,
}

/// The migration engine session
pub struct Migrator {
    options: MigratorOptions,
    session: Option<Session>,
}

impl Migrator {
    #[must_use]
    pub fn new(options: MigratorOptions) -> Self {
        Self {
            options,
            session: None,
        }
    }

    /// Resolve configuration, connect, and build the engine components
    ///
    /// Explicit connection values fall back to `config/basalt.toml` and
    /// `BASALT_*` environment variables; resolution fails with one aggregated
    /// error if anything is still missing.
    pub fn initialize(&mut self) -> Result<(), MigrateError> {
        let resolved = ConnectionSettings::load()?.resolve(&self.options.connection)?;
        let executor = HttpSurrealExecutor::connect(
            &resolved.url,
            &resolved.username,
            &resolved.password,
            &resolved.namespace,
            &resolved.database,
        )?;
        self.initialize_with_executor(Box::new(executor), &resolved.username)
    }

    /// Initialize around an existing executor
    ///
    /// The seam tests and embedding hosts use to supply their own transport.
    /// `applied_by` is stamped on every execution record.
    pub fn initialize_with_executor(
        &mut self,
        executor: Box<dyn SurrealExecutor>,
        applied_by: &str,
    ) -> Result<(), MigrateError> {
        let repository = MigrationRepository::new(self.options.schema_path.as_deref())?;
        repository.initialize(executor.as_ref())?;

        let root = &self.options.migrations_dir;
        let manifest =
            match manifest::load_manifest(root, self.options.config_path.as_deref())? {
                Some(manifest) => {
                    debug!("loaded manifest with {} module(s)", manifest.modules.len());
                    manifest
                }
                None => {
                    let discovered = file::discover_modules(root)?;
                    info!(
                        "no manifest found; auto-discovered {} module(s) under {}",
                        discovered.len(),
                        root.display()
                    );
                    manifest::synthesize_manifest(&discovered)
                }
            };

        let graph = DependencyGraph::from_manifest(&manifest);
        let patterns = PatternResolver::new(graph.modules().to_vec(), root);
        let locks = LockManager::from_manifest(&manifest);
        let scope = ScopeContext::from_settings(&manifest.settings);

        self.session = Some(Session {
            executor,
            manifest,
            graph,
            patterns,
            locks,
            repository,
            processor: ContentProcessor::from_env(),
            scope,
            applied_by: applied_by.to_string(),
        });
        Ok(())
    }

    /// Release the connection and clear session state
    ///
    /// Safe to call whether or not `initialize` ever succeeded.
    pub fn close(&mut self) -> Result<(), MigrateError> {
        if let Some(session) = self.session.take() {
            session.executor.close()?;
        }
        Ok(())
    }

    /// The manifest active in this session
    pub fn manifest(&self) -> Result<&Manifest, MigrateError> {
        Ok(&self.session()?.manifest)
    }

    /// Find migrations currently applicable in `direction`
    ///
    /// Targets are user patterns; omitted targets mean every module. Files
    /// pass through the repository's applicability gate unless force is set,
    /// in which case every file of the requested direction is included.
    pub fn find_pending(
        &self,
        targets: Option<&[String]>,
        direction: Direction,
    ) -> Result<Vec<MigrationScript>, MigrateError> {
        let session = self.session()?;
        let target_ids = self.resolve_targets(targets)?;
        let order = match direction {
            Direction::Up => session.graph.execution_order(target_ids.as_deref())?,
            Direction::Down => session.graph.rollback_order(target_ids.as_deref())?,
        };

        // The closure supplies relative order; a down listing covers the
        // targeted modules themselves, not their dependencies
        let order = match direction {
            Direction::Up => order,
            Direction::Down => Self::retain_targets(order, target_ids.as_deref()),
        };

        let mut pending = Vec::new();
        for module in &order {
            let mut scripts =
                file::discover_scripts(&self.options.migrations_dir, module, direction)?;
            if direction == Direction::Down {
                scripts.reverse();
            }
            for script in scripts {
                if self.options.force {
                    pending.push(script);
                    continue;
                }
                let verdict = session.repository.can_apply_migration(
                    session.executor.as_ref(),
                    script.number,
                    &script.name,
                    direction,
                )?;
                if verdict.allowed {
                    pending.push(script);
                } else {
                    debug!(
                        "skipping {}/{}: {}",
                        module, script.filename, verdict.reason
                    );
                }
            }
        }
        Ok(pending)
    }

    /// Execute a migrate or rollback batch
    ///
    /// Files run strictly in dependency order. Each file is re-gated through
    /// the repository just before execution (unless forced), every attempt is
    /// recorded whatever its outcome, and a failure halts the rest of the
    /// batch unless force is set. Dry runs perform all reads and suppress all
    /// writes while reporting the same summary shape.
    pub fn execute(
        &self,
        targets: Option<&[String]>,
        operation: Operation,
        file_patterns: Option<&[String]>,
    ) -> Result<ExecutionReport, MigrateError> {
        let session = self.session()?;
        let direction = operation.direction();

        let mut report = ExecutionReport {
            dry_run: self.options.dry_run,
            ..Default::default()
        };

        let mut scripts = match operation {
            Operation::Migrate => self.find_pending(targets, Direction::Up)?,
            Operation::Rollback => self.rollback_batch(targets, &mut report)?,
        };

        if let Some(patterns) = file_patterns {
            scripts = self.filter_by_patterns(scripts, patterns, operation, targets)?;
        }

        for script in scripts {
            if !self.options.force {
                let verdict = session.repository.can_apply_migration(
                    session.executor.as_ref(),
                    script.number,
                    &script.name,
                    direction,
                )?;
                if !verdict.allowed {
                    report.skipped += 1;
                    report.results.push(FileResult {
                        module: script.module.clone(),
                        filename: script.filename.clone(),
                        outcome: FileOutcome::Skipped {
                            reason: verdict.reason,
                        },
                    });
                    continue;
                }
            }

            let raw = script.read_content()?;
            let content = session.processor.process(&raw, &session.scope)?;
            let digest = checksum::content_checksum(&content);

            if self.options.dry_run {
                info!(
                    "dry run: would execute {}/{}",
                    script.module, script.filename
                );
                report.processed += 1;
                report.results.push(FileResult {
                    module: script.module.clone(),
                    filename: script.filename.clone(),
                    outcome: FileOutcome::Succeeded { duration_ms: 0 },
                });
                continue;
            }

            let start = Instant::now();
            let outcome = session.executor.query(&content, &[]);
            let duration_ms = start.elapsed().as_millis() as u64;

            let record = MigrationRecord {
                module: script.module.clone(),
                number: script.number,
                name: script.name.clone(),
                direction,
                filename: script.filename.clone(),
                path: script.path.display().to_string(),
                content,
                checksum: Some(digest),
                status: match outcome {
                    Ok(_) => ExecutionStatus::Success,
                    Err(_) => ExecutionStatus::Fail,
                },
                applied_by: session.applied_by.clone(),
                applied_at: Utc::now(),
                execution_time_ms: Some(duration_ms),
            };
            // A failed write here aborts the workflow: an unrecorded attempt
            // would corrupt the derived state
            session
                .repository
                .add_migration(session.executor.as_ref(), &record)?;

            match outcome {
                Ok(_) => {
                    info!(
                        "{} {}/{} in {}ms",
                        match operation {
                            Operation::Migrate => "applied",
                            Operation::Rollback => "rolled back",
                        },
                        script.module,
                        script.filename,
                        duration_ms
                    );
                    report.processed += 1;
                    report.results.push(FileResult {
                        module: script.module.clone(),
                        filename: script.filename.clone(),
                        outcome: FileOutcome::Succeeded { duration_ms },
                    });
                }
                Err(e) => {
                    warn!(
                        "{}/{} failed: {}",
                        script.module, script.filename, e
                    );
                    report.results.push(FileResult {
                        module: script.module.clone(),
                        filename: script.filename.clone(),
                        outcome: FileOutcome::Failed {
                            error: e.to_string(),
                        },
                    });
                    if !self.options.force {
                        break;
                    }
                }
            }
        }

        Ok(report)
    }

    /// Check whether the targeted modules can be rolled back safely
    ///
    /// A dependent blocks only when it has at least one live migration and is
    /// not itself part of the rollback target set; a module with nothing
    /// applied cannot be broken. Every live migration must also have its
    /// paired down-script on disk. With force, a negative verdict becomes an
    /// override with a warning instead of a rejection.
    pub fn validate_rollback(
        &self,
        targets: Option<&[String]>,
    ) -> Result<RollbackValidation, MigrateError> {
        let session = self.session()?;
        let target_ids = self.resolve_targets(targets)?;
        let order = Self::retain_targets(
            session.graph.rollback_order(target_ids.as_deref())?,
            target_ids.as_deref(),
        );

        let counts = session
            .repository
            .module_status_counts(session.executor.as_ref(), session.graph.modules())?;

        let mut validation = RollbackValidation {
            can_rollback: true,
            ..Default::default()
        };

        for module in &order {
            let check = session.graph.validate_rollback(module, Some(&order));
            for dependent in check.blocked_by {
                let live = counts.get(&dependent).map(|c| c.applied).unwrap_or(0);
                if live == 0 {
                    continue;
                }
                validation.warnings.push(format!(
                    "module '{}' is blocked: dependent module '{}' has {} applied migration(s)",
                    module, dependent, live
                ));
                if !validation.blocking_modules.contains(&dependent) {
                    validation.blocking_modules.push(dependent);
                }
                validation.can_rollback = false;
            }

            let live = session
                .repository
                .find_last_migrations(session.executor.as_ref(), std::slice::from_ref(module))?;
            for record in live {
                if self.find_down_script(module, record.number, &record.name)?.is_none() {
                    validation.warnings.push(format!(
                        "module '{}': no rollback script on disk for {:04}_{}",
                        module, record.number, record.name
                    ));
                    validation.can_rollback = false;
                }
            }
        }

        if self.options.force && !validation.can_rollback {
            validation.can_rollback = true;
            validation.forced = true;
            validation
                .warnings
                .push("rollback safety checks overridden by force".to_string());
        }

        Ok(validation)
    }

    /// Per-module applied/pending counts plus dependency context
    pub fn status(&self, targets: Option<&[String]>) -> Result<StatusReport, MigrateError> {
        let session = self.session()?;
        let target_ids = self.resolve_targets(targets)?;
        let order = session.graph.execution_order(target_ids.as_deref())?;

        let counts = session
            .repository
            .module_status_counts(session.executor.as_ref(), &order)?;

        let mut report = StatusReport::default();
        for module in &order {
            let on_disk =
                file::discover_scripts(&self.options.migrations_dir, module, Direction::Up)?
                    .len();
            let module_counts = counts.get(module).cloned().unwrap_or_default();
            let pending = on_disk.saturating_sub(module_counts.applied);

            report.total_applied += module_counts.applied;
            report.total_pending += pending;
            report.modules.push(ModuleStatus {
                module: module.clone(),
                applied: module_counts.applied,
                pending,
                last_applied_at: module_counts.last_applied_at,
                dependencies: session.graph.dependencies(module).to_vec(),
                dependents: session.graph.dependents(module).to_vec(),
                locked: session.locks.is_locked(module),
            });
        }
        Ok(report)
    }

    /// Wipe the persisted migration history
    pub fn reset_history(&self) -> Result<(), MigrateError> {
        let session = self.session()?;
        if self.options.dry_run {
            info!("dry run: would wipe migration history");
            return Ok(());
        }
        session.repository.reset(session.executor.as_ref())
    }

    fn session(&self) -> Result<&Session, MigrateError> {
        self.session.as_ref().ok_or(MigrateError::NotInitialized)
    }

    fn retain_targets(order: Vec<String>, targets: Option<&[String]>) -> Vec<String> {
        match targets {
            None => order,
            Some(targets) => {
                let targeted: HashSet<&str> = targets.iter().map(String::as_str).collect();
                order
                    .into_iter()
                    .filter(|m| targeted.contains(m.as_str()))
                    .collect()
            }
        }
    }

    fn resolve_targets(
        &self,
        targets: Option<&[String]>,
    ) -> Result<Option<Vec<String>>, MigrateError> {
        let session = self.session()?;
        match targets {
            None => Ok(None),
            Some(patterns) if patterns.is_empty() => Ok(None),
            Some(patterns) => Ok(Some(session.patterns.resolve_modules(patterns)?)),
        }
    }

    /// Build the rollback work set: live migrations in reverse dependency
    /// order, paired with their down-scripts, minus locked modules
    fn rollback_batch(
        &self,
        targets: Option<&[String]>,
        report: &mut ExecutionReport,
    ) -> Result<Vec<MigrationScript>, MigrateError> {
        let session = self.session()?;
        let target_ids = self.resolve_targets(targets)?;
        // Graph-derived relative order, filtered to the targeted modules:
        // rolling back a module never drags its dependencies along
        let mut order = Self::retain_targets(
            session.graph.rollback_order(target_ids.as_deref())?,
            target_ids.as_deref(),
        );

        if !self.options.force {
            let partition = session.locks.validate_rollback_lock(&order);
            for (module, reason) in &partition.blocked {
                warn!("excluding locked module '{}' from rollback: {}", module, reason);
            }
            order = partition.allowed;
        }

        let live = session
            .repository
            .find_last_migrations(session.executor.as_ref(), &order)?;

        let mut batch = Vec::new();
        for module in &order {
            let mut records: Vec<&MigrationRecord> =
                live.iter().filter(|r| &r.module == module).collect();
            records.sort_by(|a, b| b.number.cmp(&a.number));
            for record in records {
                match self.find_down_script(module, record.number, &record.name)? {
                    Some(script) => batch.push(script),
                    None => {
                        warn!(
                            "no rollback script for {}/{:04}_{}; skipping",
                            module, record.number, record.name
                        );
                        report.skipped += 1;
                        report.results.push(FileResult {
                            module: module.clone(),
                            filename: format!("{:04}_{}_down.surql", record.number, record.name),
                            outcome: FileOutcome::Skipped {
                                reason: "rollback script not found on disk".to_string(),
                            },
                        });
                    }
                }
            }
        }
        Ok(batch)
    }

    fn find_down_script(
        &self,
        module: &str,
        number: u32,
        name: &str,
    ) -> Result<Option<MigrationScript>, MigrateError> {
        let scripts =
            file::discover_scripts(&self.options.migrations_dir, module, Direction::Down)?;
        Ok(scripts
            .into_iter()
            .find(|s| s.number == number && s.name == name))
    }

    /// Narrow an execution batch by filename patterns
    fn filter_by_patterns(
        &self,
        scripts: Vec<MigrationScript>,
        patterns: &[String],
        operation: Operation,
        targets: Option<&[String]>,
    ) -> Result<Vec<MigrationScript>, MigrateError> {
        let session = self.session()?;
        let scope: Vec<String> = {
            let mut seen = HashSet::new();
            scripts
                .iter()
                .map(|s| s.module.clone())
                .filter(|m| seen.insert(m.clone()))
                .collect()
        };

        let matched = match operation {
            Operation::Migrate => {
                session
                    .patterns
                    .resolve_files(patterns, &scope, Direction::Up)?
            }
            Operation::Rollback => {
                let target_ids = self
                    .resolve_targets(targets)?
                    .unwrap_or_else(|| session.graph.modules().to_vec());
                let (matched, warnings) = session.patterns.resolve_rollback_files(
                    patterns,
                    &scope,
                    &session.graph,
                    &target_ids,
                )?;
                for warning in warnings {
                    warn!("{}", warning);
                }
                matched
            }
        };

        let keep: HashSet<&PathBuf> = matched.iter().map(|s| &s.path).collect();
        Ok(scripts
            .into_iter()
            .filter(|s| keep.contains(&s.path))
            .collect())
    }
}
