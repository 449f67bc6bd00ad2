//! Development Support for BOX Compiler
//!
//! Rebuild-on-save for a development server: a filesystem watcher feeds
//! `.box` changes through a [`RebuildGate`], each finished build gets the
//! reload client injected into its `index.html`, and connected browsers are
//! told to reload through a [`ReloadHub`]. Serving HTTP is left to the host.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{BuildConfig, MinifyLevel};
use crate::error::BoxResult;
use crate::finalize::{write_artifacts, PassThrough};
use crate::parse::COMPONENT_EXTENSION;
use crate::pipeline::Pipeline;

/// Path the reload client subscribes to.
pub const RELOAD_ENDPOINT: &str = "/__box_hmr";
/// Server-sent event telling a client to reload.
pub const RELOAD_MESSAGE: &[u8] = b"data: reload\n\n";

const POLL_INTERVAL: Duration = Duration::from_millis(50);

// ═══════════════════════════════════════════════════════════════════════════════
// REBUILD GATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Prevents overlapping builds without losing the last change.
///
/// A change arriving while a build runs marks the gate dirty; when the build
/// finishes, exactly one follow-up build runs no matter how many changes
/// arrived in between.
#[derive(Debug, Default)]
pub struct RebuildGate {
    building: bool,
    dirty: bool,
}

impl RebuildGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a change. Returns `true` when the caller should start a build now.
    pub fn request(&mut self) -> bool {
        if self.building {
            self.dirty = true;
            false
        } else {
            self.building = true;
            true
        }
    }

    /// Mark the running build finished. Returns `true` when a follow-up build
    /// must run; the gate then stays in the building state.
    pub fn finish(&mut self) -> bool {
        if self.dirty {
            self.dirty = false;
            true
        } else {
            self.building = false;
            false
        }
    }

    pub fn is_building(&self) -> bool {
        self.building
    }

    /// Run `build` for one change, plus one coalesced rerun for every batch of
    /// changes `pending` reports while it was running.
    pub fn run(&mut self, mut build: impl FnMut(), mut pending: impl FnMut() -> bool) {
        if !self.request() {
            return;
        }
        loop {
            build();
            if pending() {
                self.request();
            }
            if !self.finish() {
                break;
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RELOAD HUB
// ═══════════════════════════════════════════════════════════════════════════════

/// Long-lived client connections waiting for reload signals.
#[derive(Debug)]
pub struct ReloadHub<S: Write> {
    clients: Vec<S>,
}

impl<S: Write> Default for ReloadHub<S> {
    fn default() -> Self {
        Self { clients: Vec::new() }
    }
}

impl<S: Write> ReloadHub<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, client: S) {
        self.clients.push(client);
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Send a reload to every client. Clients whose write fails are dropped.
    /// Returns the number of clients reached.
    pub fn broadcast(&mut self) -> usize {
        self.clients.retain_mut(|client| {
            client
                .write_all(RELOAD_MESSAGE)
                .and_then(|_| client.flush())
                .is_ok()
        });
        tracing::debug!(clients = self.clients.len(), "reload broadcast");
        self.clients.len()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RELOAD CLIENT
// ═══════════════════════════════════════════════════════════════════════════════

fn reload_script(endpoint: &str) -> String {
    format!(
        r#"<script>
// BOX reload client
(function() {{
  const source = new EventSource('{endpoint}');
  source.onmessage = function(event) {{
    if (event.data === 'reload') {{
      location.reload();
    }}
  }};
  source.onerror = function() {{
    setTimeout(() => location.reload(), 1000);
  }};
}})();
</script>"#,
        endpoint = endpoint
    )
}

/// Insert the reload client before the last `</body>`, or append it when the
/// document has none.
pub fn inject_reload_client(html: &str, endpoint: &str) -> String {
    let script = reload_script(endpoint);
    match html.to_ascii_lowercase().rfind("</body>") {
        Some(at) => format!("{}{}\n{}", &html[..at], script, &html[at..]),
        None => format!("{}\n{}", html, script),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// WATCH LOOP
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Started { src_dir: PathBuf },
    FileChanged { path: PathBuf },
    BuildComplete { components: usize, routes: usize, warnings: usize },
    BuildFailed { message: String },
    Shutdown,
}

fn is_component_path(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == COMPONENT_EXTENSION)
}

/// One dev build: compile, inject the reload client into the page, and write.
/// Dev output is never minified.
fn dev_build(pipeline: &Pipeline) -> BoxResult<WatchEvent> {
    let mut outcome = pipeline.build()?;
    outcome.artifacts.markup = inject_reload_client(&outcome.artifacts.markup, RELOAD_ENDPOINT);

    write_artifacts(
        &outcome.artifacts,
        &pipeline.config().out_dir,
        MinifyLevel::None,
        &PassThrough,
    )?;

    Ok(WatchEvent::BuildComplete {
        components: outcome.stats.components,
        routes: outcome.stats.routes,
        warnings: outcome.stats.warnings,
    })
}

fn report_build(pipeline: &Pipeline, on_event: &impl Fn(WatchEvent)) {
    match dev_build(pipeline) {
        Ok(event) => on_event(event),
        Err(e) => {
            tracing::error!("build failed: {}", e);
            on_event(WatchEvent::BuildFailed {
                message: e.to_string(),
            });
        }
    }
}

/// Pass changed paths to the loop. Watcher errors are logged and dropped.
fn forward_event(res: Result<Event, notify::Error>, tx: &Sender<PathBuf>) -> usize {
    match res {
        Ok(event) => event
            .paths
            .into_iter()
            .filter(|path| tx.send(path.clone()).is_ok())
            .count(),
        Err(e) => {
            tracing::warn!("watch error: {}", e);
            0
        }
    }
}

/// Drain queued watcher paths, reporting component changes. Returns whether
/// any of them was a component.
fn drain_changes(rx: &Receiver<PathBuf>, on_event: &impl Fn(WatchEvent)) -> bool {
    let mut changed = false;
    while let Ok(path) = rx.try_recv() {
        if is_component_path(&path) {
            on_event(WatchEvent::FileChanged { path });
            changed = true;
        }
    }
    changed
}

/// Build once, then rebuild on every `.box` change under `src_dir` until
/// `running` is cleared. Build failures are reported, not returned.
///
/// The host owns the HTTP side: it serves `out_dir`, registers reload clients
/// on [`RELOAD_ENDPOINT`] with a [`ReloadHub`], and calls
/// [`ReloadHub::broadcast`] when `on_event` receives
/// [`WatchEvent::BuildComplete`].
pub fn watch(
    config: BuildConfig,
    running: Arc<AtomicBool>,
    on_event: impl Fn(WatchEvent),
) -> BoxResult<()> {
    let pipeline = Pipeline::new(config);
    let src_dir = pipeline.config().src_dir.clone();

    on_event(WatchEvent::Started {
        src_dir: src_dir.clone(),
    });
    report_build(&pipeline, &on_event);

    let (tx, rx) = channel();
    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| {
            forward_event(res, &tx);
        },
        Config::default(),
    )?;
    watcher.watch(&src_dir, RecursiveMode::Recursive)?;

    let mut gate = RebuildGate::new();
    while running.load(Ordering::SeqCst) {
        let Ok(path) = rx.recv_timeout(POLL_INTERVAL) else {
            continue;
        };
        if !is_component_path(&path) {
            continue;
        }
        on_event(WatchEvent::FileChanged { path });
        // Coalesce the rest of the burst into this build
        drain_changes(&rx, &on_event);

        gate.run(
            || report_build(&pipeline, &on_event),
            || drain_changes(&rx, &on_event),
        );
    }

    on_event(WatchEvent::Shutdown);
    Ok(())
}
