//! `vsd run`: start the diagram editor server and act as its backend until
//! it closes.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{anyhow, bail, Context, Result};
use vsd_pipeline::process::{interrupted_by_sigint, run_supervised, Invocation};
use vsd_pipeline::{OutputMode, ProcessEnd, Supervision};
use vsd_spec::compose_files;

use crate::backend::{self, Application, Backend};
use crate::config::VsdConfig;

/// Template used when neither `--app` nor `--app-template` is given.
pub const DEFAULT_TEMPLATE: &str = "demo/templates/blinky-temperature";

pub struct EditorOptions {
    pub application: Application,
    pub host: String,
    pub port: u16,
    pub backend_host: String,
    pub backend_port: u16,
    pub spec_mods: Vec<PathBuf>,
}

impl EditorOptions {
    fn vars(&self, config: &VsdConfig) -> Result<BTreeMap<&'static str, String>> {
        let path = self.application.path();
        let application = std::fs::canonicalize(path)
            .with_context(|| format!("application {} not found", path.display()))?;
        let editor_dir = config.workspace.root().join(".pipeline_manager");
        Ok(BTreeMap::from([
            ("application", application.display().to_string()),
            ("frontend_dir", editor_dir.join("frontend").display().to_string()),
            ("editor_workspace", editor_dir.join("workspace").display().to_string()),
            ("host", self.host.clone()),
            ("port", self.port.to_string()),
            ("backend_host", self.backend_host.clone()),
            ("backend_port", self.backend_port.to_string()),
        ]))
    }

    /// The application with its path made absolute, so builds do not depend
    /// on the working directory.
    fn resolved_application(&self, vars: &BTreeMap<&'static str, String>) -> Application {
        let path = PathBuf::from(&vars["application"]);
        match self.application {
            Application::Template(_) => Application::Template(path),
            Application::Sources(_) => Application::Sources(path),
        }
    }
}

pub fn run(config: &VsdConfig, options: &EditorOptions) -> Result<()> {
    let vars = options.vars(config)?;
    let catalog_path = config.catalog_path();
    let catalog = compose_files(&catalog_path, &options.spec_mods)
        .with_context(|| format!("failed to compose specification {}", catalog_path.display()))?;
    let backend = Arc::new(Backend::new(config.clone(), catalog, options.resolved_application(&vars)));

    let orchestrator = config.orchestrator(false, OutputMode::Inherit)?;
    let invocation = Invocation {
        name: "editor",
        tool: &config.tools.editor,
        vars: &vars,
        cwd: config.workspace.root(),
        env: orchestrator.env(),
        stage: None,
    };
    tracing::info!(
        url = %format!("http://{}:{}", options.host, options.port),
        application = %vars["application"],
        "starting diagram editor"
    );

    let log = config.workspace.root().join(".pipeline_manager/editor.log");
    let editor_done = AtomicBool::new(false);
    let connection = Mutex::new(None);
    let end = thread::scope(|scope| {
        let editor = scope.spawn(|| {
            let end = run_supervised(&invocation, &log, OutputMode::Inherit, Supervision::default());
            editor_done.store(true, Ordering::SeqCst);
            if let Ok(Some(stream)) = connection.lock().as_deref() {
                backend::disconnect(stream);
            }
            end
        });

        match backend::connect(&options.backend_host, options.backend_port, &editor_done) {
            Some(stream) => {
                if let (Ok(clone), Ok(mut slot)) = (stream.try_clone(), connection.lock()) {
                    *slot = Some(clone);
                }
                // The editor may have ended before the clone was stored.
                if editor_done.load(Ordering::SeqCst) {
                    backend::disconnect(&stream);
                }
                tracing::info!(port = options.backend_port, "connected to the diagram editor");
                if let Err(e) = backend.serve(stream) {
                    tracing::warn!("editor connection lost: {e:#}");
                }
            }
            None => tracing::warn!("diagram editor never accepted the backend connection"),
        }
        editor.join().map_err(|_| anyhow!("editor supervisor panicked"))
    })??;

    match end {
        ProcessEnd::Exited(status) | ProcessEnd::Interrupted(status)
            if status.success() || interrupted_by_sigint(&status) =>
        {
            tracing::info!("diagram editor closed");
            Ok(())
        }
        ProcessEnd::Exited(status) | ProcessEnd::Interrupted(status) => {
            bail!("diagram editor exited with {status}")
        }
        ProcessEnd::Killed => bail!("diagram editor was killed"),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::net::TcpListener;

    use super::*;

    fn workspace() -> (tempfile::TempDir, VsdConfig) {
        let dir = tempfile::tempdir().unwrap();
        let resources = dir.path().join(crate::config::RESOURCES_DIR);
        fs::create_dir_all(&resources).unwrap();
        fs::write(
            resources.join(crate::config::CATALOG_FILE),
            r#"{"nodes": [{"name": "stm32f746", "category": "SoC/stm32"}]}"#,
        )
        .unwrap();
        let config = VsdConfig::resolve_with(Some(dir.path()), |_| None).unwrap();
        (dir, config)
    }

    /// A port nothing listens on.
    fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    fn options(application: Application) -> EditorOptions {
        EditorOptions {
            application,
            host: "127.0.0.1".into(),
            port: 9000,
            backend_host: "127.0.0.1".into(),
            backend_port: closed_port(),
            spec_mods: Vec::new(),
        }
    }

    #[test]
    fn editor_variables() {
        let (dir, config) = workspace();
        let options = EditorOptions {
            host: "0.0.0.0".into(),
            port: 9100,
            backend_port: 5100,
            ..options(Application::Template(dir.path().to_path_buf()))
        };
        let vars = options.vars(&config).unwrap();
        assert_eq!(vars["port"], "9100");
        assert!(vars["frontend_dir"].ends_with(".pipeline_manager/frontend"));
        assert!(matches!(options.resolved_application(&vars), Application::Template(p) if p.is_absolute()));

        let args = config.tools.editor.render_args(&vars).unwrap();
        assert!(args.windows(2).any(|w| w == ["--tcp-server-port", "5100"]));
        assert!(!args.iter().any(|a| a.contains('{')));
    }

    #[test]
    fn missing_application() {
        let (dir, config) = workspace();
        let options = options(Application::Sources(dir.path().join("nope")));
        assert!(options.vars(&config).is_err());
    }

    #[test]
    fn editor_exit_status_is_reported() {
        let (dir, mut config) = workspace();
        config.tools.editor = vsd_pipeline::ToolCommand::new("sh", ["-c", "exit 4"]);
        let err = run(&config, &options(Application::Sources(dir.path().to_path_buf()))).unwrap_err();
        assert!(err.to_string().contains("exited with"));
    }

    #[test]
    fn backend_session_ends_with_the_editor() {
        let (dir, mut config) = workspace();
        // Stands in for the editor server: accepts the backend, asks for the
        // catalog, then exits.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let call = backend::wire::request(1, "specification_get", serde_json::json!({}));
            backend::wire::write_frame(&mut stream, call.to_string().as_bytes()).unwrap();
            let frame = backend::wire::read_frame(&mut stream).unwrap().unwrap();
            serde_json::from_slice::<serde_json::Value>(&frame).unwrap()
        });
        config.tools.editor = vsd_pipeline::ToolCommand::new("sh", ["-c", "sleep 1"]);
        let options = EditorOptions {
            backend_port: port,
            ..options(Application::Sources(dir.path().to_path_buf()))
        };

        run(&config, &options).unwrap();
        let reply = server.join().unwrap();
        assert_eq!(reply["result"]["content"]["nodes"][0]["name"], "stm32f746");
    }
}
