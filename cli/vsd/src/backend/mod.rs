//! Backend for the diagram editor.
//!
//! `vsd run` connects to the editor server's TCP port and answers its calls:
//! the catalog for the node palette, builds and simulations of the graph being
//! edited, saving and importing graphs. Builds and simulations run on their
//! own thread so `dataflow_stop` can interrupt them.

pub mod wire;

use std::fs;
use std::net::{Shutdown, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};
use vsd_codegen::TemplateSource;
use vsd_graph::{board_name_from, GraphDocument, GraphInstance, UNTITLED_BOARD};
use vsd_pipeline::{OutputMode, PipelineRequest, Stage};
use vsd_spec::EffectiveCatalog;

use crate::config::VsdConfig;
use wire::Incoming;

/// Editor terminal receiving build reports and errors.
pub const LOG_TERMINAL: &str = "backend-logs";

const CONNECT_RETRY: Duration = Duration::from_millis(200);

/// Application compiled for the graph being edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Application {
    /// Instantiated into `generated/<board>` before every build.
    Template(PathBuf),
    /// Built as it is.
    Sources(PathBuf),
}

impl Application {
    pub fn path(&self) -> &Path {
        match self {
            Application::Template(dir) | Application::Sources(dir) => dir,
        }
    }
}

/// A long-running call, named after the method that starts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Job {
    Build,
    Run,
}

impl Job {
    fn from_method(method: &str) -> Option<Self> {
        match method {
            "custom_build" => Some(Job::Build),
            "dataflow_run" => Some(Job::Run),
            _ => None,
        }
    }

    fn method(self) -> &'static str {
        match self {
            Job::Build => "custom_build",
            Job::Run => "dataflow_run",
        }
    }
}

/// Writing half of the connection, shared with job threads.
#[derive(Clone)]
struct Peer {
    stream: Arc<Mutex<TcpStream>>,
    next_id: Arc<AtomicU64>,
}

impl Peer {
    fn send(&self, message: &Value) -> Result<()> {
        let payload = serde_json::to_vec(message)?;
        let mut stream = self
            .stream
            .lock()
            .map_err(|_| anyhow!("editor connection writer poisoned"))?;
        wire::write_frame(&mut *stream, &payload).context("failed to write to the editor")
    }

    /// Send a request whose response is not awaited.
    fn request(&self, method: &str, params: Value) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = self.send(&wire::request(id, method, params)) {
            tracing::warn!(method, error = %e, "request to the editor failed");
        }
    }

    fn terminal_write(&self, text: &str) {
        let message = text.replace('\n', "\r\n");
        self.request("terminal_write", json!({"name": LOG_TERMINAL, "message": message}));
    }
}

pub struct Backend {
    config: VsdConfig,
    catalog: EffectiveCatalog,
    application: Application,
    busy: AtomicBool,
    stop_build: Arc<AtomicBool>,
    stop_run: Arc<AtomicBool>,
}

impl Backend {
    pub fn new(config: VsdConfig, catalog: EffectiveCatalog, application: Application) -> Self {
        Self {
            config,
            catalog,
            application,
            busy: AtomicBool::new(false),
            stop_build: Arc::new(AtomicBool::new(false)),
            stop_run: Arc::new(AtomicBool::new(false)),
        }
    }

    fn stop_flag(&self, job: Job) -> &Arc<AtomicBool> {
        match job {
            Job::Build => &self.stop_build,
            Job::Run => &self.stop_run,
        }
    }

    /// Answer calls until the editor closes the connection. Running jobs are
    /// stopped and joined before returning.
    pub fn serve(self: &Arc<Self>, stream: TcpStream) -> Result<()> {
        let mut reader = stream.try_clone().context("failed to clone the editor connection")?;
        let peer = Peer {
            stream: Arc::new(Mutex::new(stream)),
            next_id: Arc::new(AtomicU64::new(1)),
        };
        let mut jobs = Vec::new();
        let result = self.session(&mut reader, &peer, &mut jobs);

        self.stop_build.store(true, Ordering::SeqCst);
        self.stop_run.store(true, Ordering::SeqCst);
        for job in jobs {
            if job.join().is_err() {
                tracing::error!("editor job panicked");
            }
        }
        tracing::info!("editor connection closed");
        result
    }

    fn session(self: &Arc<Self>, reader: &mut TcpStream, peer: &Peer, jobs: &mut Vec<JoinHandle<()>>) -> Result<()> {
        while let Some(frame) = wire::read_frame(reader).context("failed to read from the editor")? {
            let message = match Incoming::parse(&frame) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring malformed message from the editor");
                    continue;
                }
            };
            match message {
                Incoming::Request { id, method, params } => match Job::from_method(&method) {
                    Some(job) => match self.start(job, id, params, peer) {
                        Ok(handle) => jobs.push(handle),
                        Err(reply) => peer.send(&reply)?,
                    },
                    None => {
                        let reply = match self.handle(&method, params) {
                            Ok(result) => wire::response(id, result),
                            Err((code, message)) => wire::error_response(id, code, &message),
                        };
                        peer.send(&reply)?;
                    }
                },
                Incoming::Notification { method, params } => {
                    if let Err((_, detail)) = self.handle(&method, params) {
                        tracing::debug!(method, detail, "notification not handled");
                    }
                }
                Incoming::Response { id } => tracing::trace!(%id, "editor answered"),
            }
            jobs.retain(|job| !job.is_finished());
        }
        Ok(())
    }

    /// Calls answered immediately. Errors are JSON-RPC error codes.
    fn handle(&self, method: &str, params: Value) -> std::result::Result<Value, (i64, String)> {
        match method {
            "specification_get" => serde_json::to_value(self.catalog.composed())
                .map(wire::ok)
                .map_err(|e| (wire::INTERNAL_ERROR, e.to_string())),
            "app_capabilities_get" => Ok(json!({
                "stoppable_methods": [Job::Run.method(), Job::Build.method()],
            })),
            "dataflow_export" => {
                let dataflow = param(&params, "dataflow")?;
                Ok(self.save(dataflow))
            }
            "dataflow_import" => Ok(import(&params)),
            "dataflow_stop" => {
                let method = param(&params, "method")?.as_str().unwrap_or_default();
                match Job::from_method(method) {
                    Some(job) => self.stop_flag(job).store(true, Ordering::SeqCst),
                    None => tracing::warn!(method, "stop requested for an unknown method"),
                }
                Ok(wire::ok("Stopped."))
            }
            // Stage caching decides what to rebuild, so edits need no bookkeeping.
            "nodes_on_change" | "properties_on_change" | "connections_on_change" | "graph_on_change"
            | "metadata_on_change" | "position_on_change" => {
                tracing::trace!(method, "graph edited");
                Ok(Value::Null)
            }
            "terminal_read" => {
                tracing::debug!("terminal input is not forwarded to the simulator");
                Ok(Value::Null)
            }
            _ => Err((wire::METHOD_NOT_FOUND, format!("unknown method '{method}'"))),
        }
    }

    /// Run `job` on its own thread; the response is sent when it ends. A
    /// rejected call comes back as the reply to send instead.
    fn start(
        self: &Arc<Self>,
        job: Job,
        id: Value,
        params: Value,
        peer: &Peer,
    ) -> std::result::Result<JoinHandle<()>, Value> {
        let dataflow = match param(&params, "dataflow") {
            Ok(dataflow) => dataflow.clone(),
            Err((code, message)) => return Err(wire::error_response(id, code, &message)),
        };
        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(wire::response(id, wire::failed("Another build or simulation is running.")));
        }
        self.stop_flag(job).store(false, Ordering::SeqCst);

        let backend = Arc::clone(self);
        let peer = peer.clone();
        Ok(thread::spawn(move || {
            peer.request("progress_change", json!({"method": job.method(), "progress": -1}));
            let result = backend.execute(job, &dataflow, &peer);
            backend.busy.store(false, Ordering::SeqCst);
            let reply = match result {
                Ok(message) => wire::ok(message),
                Err(e) => {
                    tracing::error!(method = job.method(), "{e:#}");
                    peer.terminal_write(&format!("ERROR: {e:#}\n"));
                    wire::failed(match job {
                        Job::Build => "Build failed.",
                        Job::Run => "Simulation failed.",
                    })
                }
            };
            if let Err(e) = peer.send(&wire::response(id, reply)) {
                tracing::warn!(method = job.method(), error = %e, "could not deliver the result");
            }
        }))
    }

    /// Prepare, build and generate simulator files for the dataflow's graph,
    /// then simulate it for [`Job::Run`]. Unchanged stages are cached.
    fn execute(&self, job: Job, dataflow: &Value, peer: &Peer) -> Result<&'static str> {
        let document: GraphDocument =
            serde_json::from_value(dataflow.clone()).context("dataflow is not a graph document")?;
        let graph = GraphInstance::from_document(&document)?;
        let validated = vsd_graph::validate(&graph, &self.catalog).context("graph does not match the specification")?;
        let board = validated.board_name();

        let last = match job {
            Job::Build => Stage::PrepareSimulatorFiles,
            Job::Run => Stage::Simulate,
        };
        let mut request = PipelineRequest::new(&board, Stage::PrepareBoard, last).with_graph(&validated);
        request = match &self.application {
            Application::Template(dir) => request.with_template(TemplateSource {
                template_dir: dir.clone(),
                output_dir: self.config.workspace.generated_dir().join(&board),
                force: true,
            }),
            Application::Sources(dir) => request.with_app(dir.clone()),
        };
        let orchestrator = self
            .config
            .orchestrator(true, OutputMode::Log)?
            .with_stop(Arc::clone(self.stop_flag(job)));
        let report = orchestrator.run(&request)?;
        peer.terminal_write(&report.to_string());

        Ok(match job {
            Job::Build => "Build succeeded.",
            Job::Run => "Simulation finished.",
        })
    }

    /// Write the dataflow to `save/<graph name>.json`.
    fn save(&self, dataflow: &Value) -> Value {
        let name = serde_json::from_value::<GraphDocument>(dataflow.clone())
            .ok()
            .and_then(|doc| doc.main_graph().ok().and_then(|g| g.name.clone()))
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| UNTITLED_BOARD.to_string());
        let dest = self
            .config
            .workspace
            .root()
            .join("save")
            .join(format!("{}.json", board_name_from(&name)));
        let written = dest
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|()| fs::write(&dest, dataflow.to_string()));
        match written {
            Ok(()) => wire::ok(format!("Graphs saved in {}", dest.display())),
            Err(e) => {
                tracing::error!(path = %dest.display(), error = %e, "failed to save graph");
                wire::failed(format!("Could not save {}: {e}", dest.display()))
            }
        }
    }
}

/// Imported dataflows already use the editor's format and are returned as is.
fn import(params: &Value) -> Value {
    if params.get("base64").and_then(Value::as_bool).unwrap_or(false) {
        return wire::failed("base64-encoded imports are not supported");
    }
    let Some(text) = params.get("external_application_dataflow").and_then(Value::as_str) else {
        return wire::failed("missing 'external_application_dataflow'");
    };
    match serde_json::from_str::<Value>(text) {
        Ok(dataflow) => wire::ok(dataflow),
        Err(e) => wire::failed(format!("imported dataflow is not JSON: {e}")),
    }
}

fn param<'p>(params: &'p Value, name: &str) -> std::result::Result<&'p Value, (i64, String)> {
    params
        .get(name)
        .ok_or_else(|| (wire::INVALID_PARAMS, format!("missing parameter '{name}'")))
}

/// Connect to the editor server, retrying until it listens or `give_up` is
/// raised.
pub fn connect(host: &str, port: u16, give_up: &AtomicBool) -> Option<TcpStream> {
    loop {
        match TcpStream::connect((host, port)) {
            Ok(stream) => return Some(stream),
            Err(e) => tracing::trace!(host, port, error = %e, "editor server not accepting yet"),
        }
        if give_up.load(Ordering::SeqCst) {
            return None;
        }
        thread::sleep(CONNECT_RETRY);
    }
}

/// Unblock a session whose editor is gone.
pub fn disconnect(stream: &TcpStream) {
    if let Err(e) = stream.shutdown(Shutdown::Both) {
        tracing::trace!(error = %e, "editor connection already closed");
    }
}
