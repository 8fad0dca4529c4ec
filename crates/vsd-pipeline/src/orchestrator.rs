//! Stage sequencing for one board.
//!
//! A [`BoardRun`] holds the board's lock for its whole lifetime. Each stage
//! hashes its declared inputs, skips itself when the stage cache says nothing
//! changed, and otherwise runs and records the new digest on success.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use vsd_codegen::platform::resc_template;
use vsd_codegen::{
    generate_app, generate_board, prepare_platform_files, AppArtifacts, BuildArtifacts,
    GenerationError, TemplateSource,
};
use vsd_graph::ValidatedGraph;

use crate::cache::StageCache;
use crate::digest::{ContentHash, InputDigest};
use crate::error::{OrchestrationError, Result};
use crate::lock::WorkspaceLock;
use crate::process::{
    interrupted_by_sigint, run_captured, run_supervised, Invocation, OutputMode,
    ProcessEnd, Supervision,
};
use crate::report::PipelineReport;
use crate::stage::{Stage, StageOutcome, StageResult};
use crate::tool::{ToolCommand, Toolchain};
use crate::workspace::Workspace;

/// Files BUILD keeps from the build directory, relative to it.
const KEPT_BUILD_FILES: [&str; 3] = ["zephyr/zephyr.dts", "zephyr/zephyr.elf", "zephyr/.config"];

/// Drives the external tools for boards in one workspace.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    workspace: Workspace,
    resources_dir: PathBuf,
    zephyr_base: PathBuf,
    tools: Toolchain,
    /// Extra environment for every tool.
    env: BTreeMap<String, String>,
    output: OutputMode,
    grace: Duration,
    /// Raised to stop BUILD or SIMULATE early.
    stop: Option<Arc<AtomicBool>>,
}

impl Orchestrator {
    pub fn new(workspace: Workspace, resources_dir: impl Into<PathBuf>, zephyr_base: impl Into<PathBuf>) -> Self {
        let zephyr_base = zephyr_base.into();
        let env = BTreeMap::from([("ZEPHYR_BASE".to_string(), zephyr_base.display().to_string())]);
        Self {
            workspace,
            resources_dir: resources_dir.into(),
            zephyr_base,
            tools: Toolchain::default(),
            env,
            output: OutputMode::Log,
            grace: Supervision::default().grace,
            stop: None,
        }
    }

    pub fn with_tools(mut self, tools: Toolchain) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Where the simulator's console output goes.
    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Interrupt a running build or simulation when `stop` is raised.
    pub fn with_stop(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn tools(&self) -> &Toolchain {
        &self.tools
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Lock `board` and start a run at `stage`.
    pub fn begin(&self, board: &str, stage: Stage) -> Result<BoardRun<'_>> {
        let lock = WorkspaceLock::acquire(&self.workspace.locks_dir(), board, stage)?;
        Ok(BoardRun {
            orchestrator: self,
            board: board.to_string(),
            lock,
            cache: StageCache::new(self.workspace.stages_dir(board)),
            results: Vec::new(),
            started: Instant::now(),
        })
    }

    /// Run the requested stages in order, stopping at the first failure.
    pub fn run(&self, request: &PipelineRequest<'_>) -> Result<PipelineReport> {
        tracing::info!(
            board = %request.board,
            first = %request.first,
            last = %request.last,
            "pipeline starting"
        );
        let mut run = self.begin(&request.board, request.first)?;

        for stage in Stage::range(request.first, request.last) {
            match stage {
                Stage::PrepareBoard => {
                    let graph = request.graph.ok_or(OrchestrationError::MissingGraph { stage })?;
                    run.prepare_board(graph)?;
                    if let Some(template) = &request.template {
                        run.generate_app(graph, template)?;
                    }
                }
                Stage::Build => {
                    let app = request.app_dir().ok_or(OrchestrationError::MissingArtifact {
                        stage,
                        path: PathBuf::from("<application>"),
                    })?;
                    let template = request
                        .template
                        .as_ref()
                        .map(|t| t.template_dir.display().to_string());
                    run.build(app, template.as_deref())?;
                }
                Stage::PrepareSimulatorFiles => {
                    run.prepare_simulator_files(request.templates_dir.as_deref())?;
                }
                Stage::Simulate => {
                    run.simulate(request.timeout)?;
                }
            }
        }

        let report = run.finish();
        tracing::info!(board = %report.board, duration_ms = report.duration_ms, "pipeline finished");
        Ok(report)
    }
}

/// What to run for one board.
#[derive(Debug, Clone)]
pub struct PipelineRequest<'a> {
    pub board: String,
    pub first: Stage,
    pub last: Stage,
    /// Needed when PREPARE_BOARD runs.
    pub graph: Option<&'a ValidatedGraph<'a>>,
    /// Application to instantiate after the board is prepared.
    pub template: Option<TemplateSource>,
    /// Application to build; defaults to the template output.
    pub app: Option<PathBuf>,
    /// Directory holding a custom `run.resc`.
    pub templates_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

impl<'a> PipelineRequest<'a> {
    pub fn new(board: impl Into<String>, first: Stage, last: Stage) -> Self {
        Self {
            board: board.into(),
            first,
            last,
            graph: None,
            template: None,
            app: None,
            templates_dir: None,
            timeout: None,
        }
    }

    pub fn single(board: impl Into<String>, stage: Stage) -> Self {
        Self::new(board, stage, stage)
    }

    pub fn with_graph(mut self, graph: &'a ValidatedGraph<'a>) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn with_template(mut self, template: TemplateSource) -> Self {
        self.template = Some(template);
        self
    }

    pub fn with_app(mut self, app: impl Into<PathBuf>) -> Self {
        self.app = Some(app.into());
        self
    }

    pub fn with_templates_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.templates_dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn app_dir(&self) -> Option<&Path> {
        self.app
            .as_deref()
            .or_else(|| self.template.as_ref().map(|t| t.output_dir.as_path()))
    }
}

/// A locked run over one board. Stages may be invoked individually; each one
/// checks that the previous stage's outputs exist.
pub struct BoardRun<'o> {
    orchestrator: &'o Orchestrator,
    board: String,
    lock: WorkspaceLock,
    cache: StageCache,
    results: Vec<StageResult>,
    started: Instant,
}

impl BoardRun<'_> {
    pub fn board(&self) -> &str {
        &self.board
    }

    pub fn results(&self) -> &[StageResult] {
        &self.results
    }

    fn workspace(&self) -> &Workspace {
        &self.orchestrator.workspace
    }

    fn enter(&mut self, stage: Stage) -> Result<()> {
        self.lock.set_stage(stage)?;
        tracing::info!(board = %self.board, stage = %stage, "stage starting");
        Ok(())
    }

    fn record(&mut self, result: StageResult) -> &StageResult {
        tracing::info!(
            board = %self.board,
            stage = %result.stage,
            outcome = %result.outcome,
            duration_ms = result.duration_ms,
            "stage finished"
        );
        self.results.push(result);
        &self.results[self.results.len() - 1]
    }

    /// Either record a cache hit or invalidate the entry ahead of a re-run.
    fn check_cache(&mut self, stage: Stage, digest: &ContentHash, outputs: &[PathBuf]) -> Result<bool> {
        if self.cache.lookup(stage, digest, outputs) {
            self.record(StageResult::cached(stage, outputs.to_vec()));
            return Ok(true);
        }
        self.cache.invalidate(stage)?;
        Ok(false)
    }

    fn invocation<'v>(
        &'v self,
        name: &'v str,
        tool: &'v ToolCommand,
        vars: &'v BTreeMap<&'v str, String>,
        stage: Stage,
    ) -> Invocation<'v> {
        let orch = self.orchestrator;
        Invocation {
            name,
            tool,
            vars,
            cwd: orch.workspace.root(),
            env: &orch.env,
            stage: Some(stage),
        }
    }

    /// PREPARE_BOARD: generate `boards/<board>/`.
    pub fn prepare_board(&mut self, graph: &ValidatedGraph<'_>) -> Result<&StageResult> {
        let stage = Stage::PrepareBoard;
        self.enter(stage)?;
        let generation = |source: GenerationError| OrchestrationError::Generation { stage, source };
        let orch = self.orchestrator;
        let target = orch
            .workspace
            .board_target(&self.board, &orch.resources_dir, &orch.zephyr_base);
        let soc = vsd_codegen::board::soc_name(graph).map_err(generation)?;

        let mut digest = InputDigest::new(stage);
        digest
            .text("graph", &serde_json::to_string(graph.graph())?)
            .text("catalog", &serde_json::to_string(graph.catalog())?)
            .text("board", &self.board)
            .dir("soc_resources", &target.soc_dir(&soc))?;
        let digest = digest.finish();
        let outputs = vec![target.board_dir()];
        if self.check_cache(stage, &digest, &outputs)? {
            return Ok(&self.results[self.results.len() - 1]);
        }

        let started = Instant::now();
        let dir = generate_board(graph, &target).map_err(generation)?;
        self.cache.store(stage, &digest)?;
        Ok(self.record(StageResult {
            stage,
            outcome: StageOutcome::Executed,
            exit_code: None,
            log: None,
            artifacts: vec![dir],
            duration_ms: elapsed_ms(started),
        }))
    }

    /// Instantiate an application template. Not a stage of its own: the
    /// result feeds the BUILD digest.
    pub fn generate_app(&mut self, graph: &ValidatedGraph<'_>, source: &TemplateSource) -> Result<AppArtifacts> {
        generate_app(graph, source).map_err(|source| OrchestrationError::Generation {
            stage: Stage::PrepareBoard,
            source,
        })
    }

    /// BUILD: run west and keep the outputs in `builds/<board>/`.
    pub fn build(&mut self, app: &Path, template: Option<&str>) -> Result<&StageResult> {
        let stage = Stage::Build;
        self.enter(stage)?;
        let ws = self.workspace().clone();
        let board_dir = ws.board_dir(&self.board);
        for input in [board_dir.as_path(), app] {
            if !input.is_dir() {
                return Err(OrchestrationError::MissingArtifact {
                    stage,
                    path: input.to_path_buf(),
                });
            }
        }
        let app = fs::canonicalize(app).map_err(OrchestrationError::io(app))?;

        let mut digest = InputDigest::new(stage);
        digest
            .dir("board_dir", &board_dir)?
            .dir("app", &app)?
            .text("board", &self.board)
            .text("template", template.unwrap_or(""));
        let digest = digest.finish();
        let builds = ws.builds_dir(&self.board);
        let kept = BuildArtifacts::in_dir(&builds);
        let outputs = vec![kept.elf.clone(), kept.dts.clone()];
        if self.check_cache(stage, &digest, &outputs)? {
            return Ok(&self.results[self.results.len() - 1]);
        }

        let started = Instant::now();
        let orch = self.orchestrator;
        let build_dir = ws.build_dir(&self.board);
        if build_dir.exists() {
            fs::remove_dir_all(&build_dir).map_err(OrchestrationError::io(&build_dir))?;
        }
        fs::create_dir_all(&build_dir).map_err(OrchestrationError::io(&build_dir))?;

        let vars = BTreeMap::from([
            ("board", self.board.clone()),
            ("build_dir", build_dir.display().to_string()),
            ("app", app.display().to_string()),
            ("board_root", ws.root().display().to_string()),
            ("zephyr_base", orch.zephyr_base.display().to_string()),
        ]);
        let log = self.cache.log_path(stage);
        let tools = &orch.tools;
        let supervision = Supervision {
            grace: orch.grace,
            stop: orch.stop.clone(),
            ..Default::default()
        };
        let end = run_supervised(
            &self.invocation("west", &tools.west, &vars, stage),
            &log,
            OutputMode::Log,
            supervision,
        )?;
        let ProcessEnd::Exited(status) = end else {
            tracing::warn!(board = %self.board, "build stopped");
            return Err(OrchestrationError::Stopped { stage });
        };
        keep_build_outputs(&build_dir, &builds, &log)?;

        if !status.success() {
            tracing::error!(board = %self.board, log = %log.display(), "build failed");
            return Err(OrchestrationError::BuildFailed {
                stage,
                status: status.code(),
                log,
            });
        }
        for output in &outputs {
            if !output.exists() {
                return Err(OrchestrationError::MissingArtifact {
                    stage,
                    path: output.clone(),
                });
            }
        }

        self.cache.store(stage, &digest)?;
        Ok(self.record(StageResult {
            stage,
            outcome: StageOutcome::Executed,
            exit_code: status.code(),
            log: Some(log),
            artifacts: outputs,
            duration_ms: elapsed_ms(started),
        }))
    }

    /// PREPARE_SIMULATOR_FILES: `<board>.resc` and `<board>.repl` next to the
    /// kept build outputs.
    pub fn prepare_simulator_files(&mut self, templates_dir: Option<&Path>) -> Result<&StageResult> {
        let stage = Stage::PrepareSimulatorFiles;
        self.enter(stage)?;
        let generation = |source: GenerationError| OrchestrationError::Generation { stage, source };
        let builds = self.workspace().builds_dir(&self.board);
        let built = BuildArtifacts::in_dir(&builds);
        for input in [&built.dts, &built.elf] {
            if !input.is_file() {
                return Err(OrchestrationError::MissingArtifact {
                    stage,
                    path: input.clone(),
                });
            }
        }
        let resc = resc_template(templates_dir).map_err(generation)?;

        let mut digest = InputDigest::new(stage);
        digest
            .file("dts", &built.dts)?
            .file("elf", &built.elf)?
            .text("resc_template", &resc)
            .text("board", &self.board);
        let digest = digest.finish();
        let outputs = vec![
            builds.join(format!("{}.resc", self.board)),
            builds.join(format!("{}.repl", self.board)),
        ];
        if self.check_cache(stage, &digest, &outputs)? {
            return Ok(&self.results[self.results.len() - 1]);
        }

        let started = Instant::now();
        let log = self.cache.log_path(stage);
        let orch = self.orchestrator;
        let tools = &orch.tools;
        // Tool failures are kept aside so they surface as themselves rather
        // than as a generic platform description error.
        let tool_failure: RefCell<Option<OrchestrationError>> = RefCell::new(None);
        let translator = |dts: &Path| -> vsd_codegen::Result<String> {
            let vars = BTreeMap::from([("dts", dts.display().to_string()), ("board", self.board.clone())]);
            let inv = self.invocation("translator", &tools.translator, &vars, stage);
            match run_captured(&inv, &log) {
                Ok((status, repl)) if status.success() => Ok(repl),
                Ok((status, _)) => Err(GenerationError::PlatformDescription(format!(
                    "{} exited with {status}; see {}",
                    tools.translator.program,
                    log.display()
                ))),
                Err(e) => {
                    let detail = e.to_string();
                    *tool_failure.borrow_mut() = Some(e);
                    Err(GenerationError::PlatformDescription(detail))
                }
            }
        };
        let files = prepare_platform_files(&self.board, &builds, templates_dir, &translator)
            .map_err(|source| tool_failure.borrow_mut().take().unwrap_or_else(|| generation(source)))?;

        self.cache.store(stage, &digest)?;
        Ok(self.record(StageResult {
            stage,
            outcome: StageOutcome::Executed,
            exit_code: None,
            log: Some(log),
            artifacts: vec![files.resc, files.repl],
            duration_ms: elapsed_ms(started),
        }))
    }

    /// SIMULATE: run the simulator, optionally bounded by `timeout`.
    pub fn simulate(&mut self, timeout: Option<Duration>) -> Result<&StageResult> {
        let stage = Stage::Simulate;
        self.enter(stage)?;
        let builds = self.workspace().builds_dir(&self.board);
        let built = BuildArtifacts::in_dir(&builds);
        let resc = builds.join(format!("{}.resc", self.board));
        let repl = builds.join(format!("{}.repl", self.board));
        for input in [&resc, &repl, &built.elf] {
            if !input.is_file() {
                return Err(OrchestrationError::MissingArtifact {
                    stage,
                    path: input.clone(),
                });
            }
        }

        let started = Instant::now();
        let orch = self.orchestrator;
        let vars = BTreeMap::from([
            ("board", self.board.clone()),
            ("resc", resc.display().to_string()),
            ("repl", repl.display().to_string()),
            ("elf", built.elf.display().to_string()),
        ]);
        let output = orch.output;
        let log = (output == OutputMode::Log).then(|| self.cache.log_path(stage));
        let supervision = Supervision {
            timeout,
            grace: orch.grace,
            stop: orch.stop.clone(),
        };
        let tools = &orch.tools;
        let end = run_supervised(
            &self.invocation("simulator", &tools.simulator, &vars, stage),
            &self.cache.log_path(stage),
            output,
            supervision,
        )?;

        let failed = |detail: String| OrchestrationError::SimulationFailed {
            detail,
            log: log.clone(),
        };
        let (outcome, exit_code) = match end {
            ProcessEnd::Exited(status) if status.success() => (StageOutcome::Executed, status.code()),
            ProcessEnd::Exited(status) => return Err(failed(format!("simulator exited with {status}"))),
            ProcessEnd::Interrupted(status) if interrupted_by_sigint(&status) || status.success() => {
                (StageOutcome::TimedOut, status.code())
            }
            ProcessEnd::Interrupted(status) => {
                return Err(failed(format!("simulator exited with {status} after SIGINT")))
            }
            ProcessEnd::Killed => return Err(failed("simulator ignored SIGINT and was killed".into())),
        };

        Ok(self.record(StageResult {
            stage,
            outcome,
            exit_code,
            log,
            artifacts: Vec::new(),
            duration_ms: elapsed_ms(started),
        }))
    }

    /// Release the lock and summarize.
    pub fn finish(self) -> PipelineReport {
        PipelineReport {
            board: self.board,
            duration_ms: elapsed_ms(self.started),
            stages: self.results,
            cache: self.cache.statistics(),
        }
    }
}

/// Copy the files worth keeping out of the west build directory. Stale copies
/// from an earlier build are removed first; `.stages/` is left alone.
fn keep_build_outputs(build_dir: &Path, builds: &Path, log: &Path) -> Result<()> {
    let zephyr = builds.join("zephyr");
    if zephyr.exists() {
        fs::remove_dir_all(&zephyr).map_err(OrchestrationError::io(&zephyr))?;
    }
    for relative in KEPT_BUILD_FILES {
        let src = build_dir.join(relative);
        if !src.is_file() {
            continue;
        }
        let dst = builds.join(relative);
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).map_err(OrchestrationError::io(parent))?;
        }
        fs::copy(&src, &dst).map_err(OrchestrationError::io(&dst))?;
    }
    if log.is_file() {
        let dst = builds.join("build.log");
        fs::copy(log, &dst).map_err(OrchestrationError::io(&dst))?;
    }
    Ok(())
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}
