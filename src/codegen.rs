//! Codegen Module for BOX Compiler
//!
//! Renders the four build artifacts from a finished component graph and route
//! list: `index.html`, `style.css`, `app.js` and `server.js`.
//!
//! Every generator is a pure function of its inputs. Options such as the
//! document title and server port are passed in explicitly.

use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;

use crate::config::GenerateOptions;
use crate::discovery::EndpointRoute;
use crate::graph::{ComponentGraph, ScopedComponent};
use crate::parse::HttpMethod;
use crate::scope::find_placeholders;
use crate::validate::{Diagnostic, DIAG_INCLUDE_RECURSION, DIAG_UNRESOLVED_INCLUDE};

// ═══════════════════════════════════════════════════════════════════════════════
// ARTIFACTS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ArtifactKind {
    Markup,
    Stylesheet,
    ScriptBundle,
    ServerModule,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::Markup,
        ArtifactKind::Stylesheet,
        ArtifactKind::ScriptBundle,
        ArtifactKind::ServerModule,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            ArtifactKind::Markup => "index.html",
            ArtifactKind::Stylesheet => "style.css",
            ArtifactKind::ScriptBundle => "app.js",
            ArtifactKind::ServerModule => "server.js",
        }
    }
}

/// The four generated outputs of one build, held in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildArtifacts {
    pub markup: String,
    pub stylesheet: String,
    pub script_bundle: String,
    pub server_module: String,
}

impl BuildArtifacts {
    pub fn get(&self, kind: ArtifactKind) -> &str {
        match kind {
            ArtifactKind::Markup => &self.markup,
            ArtifactKind::Stylesheet => &self.stylesheet,
            ArtifactKind::ScriptBundle => &self.script_bundle,
            ArtifactKind::ServerModule => &self.server_module,
        }
    }

    /// Artifacts in a fixed order, paired with their kind.
    pub fn iter(&self) -> impl Iterator<Item = (ArtifactKind, &str)> + '_ {
        ArtifactKind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Indent every non-empty line by `spaces`.
fn indent(code: &str, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    code.lines()
        .map(|line| {
            if line.trim().is_empty() {
                String::new()
            } else {
                format!("{}{}", pad, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// A JavaScript string literal for `value`.
fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{}\"", value))
}

/// Visible stand-in for an include that could not be rendered.
pub fn missing_marker(reference: &str) -> String {
    let escaped = escape_html(reference);
    format!(
        "<span class=\"box-missing\" data-box-missing=\"{}\">Missing component: {}</span>",
        escaped, escaped
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// MARKUP
// ═══════════════════════════════════════════════════════════════════════════════

/// Substitute placeholders in `component`'s template, recursing into included
/// templates. `stack` holds the components currently being expanded.
fn expand_template(
    graph: &ComponentGraph,
    component: &ScopedComponent,
    stack: &mut Vec<PathBuf>,
    diagnostics: &mut Vec<Diagnostic>,
) -> String {
    let template = &component.template;
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for (range, literal) in find_placeholders(template) {
        out.push_str(&template[last..range.start]);
        last = range.end;

        let Some(target) = graph.resolve_include(component, literal) else {
            diagnostics.push(
                Diagnostic::warning(
                    DIAG_UNRESOLVED_INCLUDE,
                    &format!("Include not found: {}", literal),
                    &component.filename,
                )
                .with_context(literal)
                .emit(),
            );
            out.push_str(&missing_marker(literal));
            continue;
        };

        if stack.contains(&target.path) {
            diagnostics.push(
                Diagnostic::warning(
                    DIAG_INCLUDE_RECURSION,
                    &format!("Recursive include of {}", target.filename),
                    &component.filename,
                )
                .with_context(literal)
                .emit(),
            );
            out.push_str(&missing_marker(literal));
            continue;
        }

        stack.push(target.path.clone());
        out.push_str(&expand_template(graph, target, stack, diagnostics));
        stack.pop();
    }

    out.push_str(&template[last..]);
    out
}

/// `index.html`: the entry template with every include expanded, in the HTML shell.
pub fn generate_markup(graph: &ComponentGraph, options: &GenerateOptions) -> (String, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();

    let body = match graph.entry() {
        Some(entry) => {
            let mut stack = vec![entry.path.clone()];
            expand_template(graph, entry, &mut stack, &mut diagnostics)
        }
        None => String::new(),
    };

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>{title}</title>
  <link rel="stylesheet" href="style.css">
</head>
<body>
{body}
  <script src="app.js"></script>
</body>
</html>
"#,
        title = escape_html(&options.title),
        body = body
    );

    (html, diagnostics)
}

// ═══════════════════════════════════════════════════════════════════════════════
// STYLESHEET
// ═══════════════════════════════════════════════════════════════════════════════

const STYLESHEET_PREAMBLE: &str = "/* BOX Framework - Compiled Styles */

/* Reset & Base */
*, *::before, *::after { box-sizing: border-box; }
body { margin: 0; font-family: system-ui, -apple-system, sans-serif; }

";

/// `style.css`: reset preamble, then each component's scoped styles.
pub fn generate_stylesheet(graph: &ComponentGraph) -> String {
    let mut css = String::from(STYLESHEET_PREAMBLE);

    for component in graph.components() {
        if component.style.is_empty() {
            continue;
        }
        css.push_str(&format!("/* {} */\n", component.filename));
        css.push_str(&component.style);
        css.push_str("\n\n");
    }

    css
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCRIPT BUNDLE
// ═══════════════════════════════════════════════════════════════════════════════

/// Client runtime shared by every component script.
pub const RUNTIME_PREAMBLE: &str = r#"/**
 * BOX Runtime
 * Reactive state, events and API access for compiled components
 */
const Box = (function() {
  const listeners = {};

  const state = new Proxy({}, {
    set(target, key, value) {
      const oldValue = target[key];
      target[key] = value;

      document.querySelectorAll(`[box-bind="${key}"]`).forEach(el => {
        if (el.tagName === 'INPUT' || el.tagName === 'TEXTAREA' || el.tagName === 'SELECT') {
          el.value = value;
        } else {
          el.innerText = value;
        }
      });

      const updateListeners = listeners[`${key}:update`];
      if (updateListeners) {
        updateListeners.slice().forEach(fn => fn(value, oldValue));
      }

      return true;
    },

    get(target, key) {
      return target[key];
    }
  });

  function on(event, callback) {
    if (!listeners[event]) {
      listeners[event] = [];
    }
    listeners[event].push(callback);

    return () => {
      listeners[event] = listeners[event].filter(fn => fn !== callback);
    };
  }

  function emit(event, data) {
    if (listeners[event]) {
      listeners[event].slice().forEach(fn => fn(data));
    }
  }

  async function api(endpoint, options = {}) {
    const method = (options.method || 'GET').toUpperCase();
    const config = {
      method,
      headers: {
        'Content-Type': 'application/json',
        ...options.headers
      }
    };

    if (options.body !== undefined && method !== 'GET') {
      config.body = JSON.stringify(options.body);
    }

    try {
      const response = await fetch(`/api/${endpoint}`, config);
      return await response.json();
    } catch (error) {
      console.error('Box API Error:', error);
      throw error;
    }
  }

  let bindingsReady = false;
  function initBindings() {
    if (bindingsReady) return;
    bindingsReady = true;

    document.querySelectorAll('[box-bind]').forEach(el => {
      const key = el.getAttribute('box-bind');
      const eventName = el.tagName === 'SELECT' ? 'change' : 'input';
      if (el.tagName === 'INPUT' || el.tagName === 'TEXTAREA' || el.tagName === 'SELECT') {
        el.addEventListener(eventName, (e) => {
          state[key] = e.target.value;
        });
      }
    });
  }

  if (document.readyState === 'loading') {
    document.addEventListener('DOMContentLoaded', initBindings);
  } else {
    initBindings();
  }

  return { state, on, emit, api };
})();"#;

/// `app.js`: runtime preamble, then each component's scoped script.
pub fn generate_script_bundle(graph: &ComponentGraph) -> String {
    let mut js = String::from(RUNTIME_PREAMBLE);
    js.push_str("\n\n/* === Compiled Components === */\n");

    for component in graph.components() {
        if component.script.is_empty() {
            continue;
        }
        js.push('\n');
        js.push_str(&component.script);
        js.push('\n');
    }

    js
}

// ═══════════════════════════════════════════════════════════════════════════════
// SERVER MODULE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Serialize)]
struct RouteListing<'r> {
    method: HttpMethod,
    path: &'r str,
    auth: bool,
    handler: &'r str,
}

const SERVER_PRELUDE: &str = r#"/**
 * BOX Server - generated API and static file server
 * Run with: node server.js
 */

const http = require('http');
const fs = require('fs');
const path = require('path');

const ROOT = __dirname;

const MIME_TYPES = {
  '.html': 'text/html',
  '.css': 'text/css',
  '.js': 'application/javascript',
  '.json': 'application/json',
  '.png': 'image/png',
  '.jpg': 'image/jpeg',
  '.jpeg': 'image/jpeg',
  '.gif': 'image/gif',
  '.svg': 'image/svg+xml',
  '.ico': 'image/x-icon',
  '.woff': 'font/woff',
  '.woff2': 'font/woff2'
};
"#;

const SERVER_RUNTIME: &str = r#"
function parseBody(req) {
  return new Promise((resolve, reject) => {
    let body = '';
    req.on('data', chunk => body += chunk.toString());
    req.on('end', () => {
      try {
        resolve(body ? JSON.parse(body) : {});
      } catch (e) {
        resolve({});
      }
    });
    req.on('error', reject);
  });
}

function parseQuery(url) {
  const queryString = url.split('?')[1] || '';
  const query = {};
  for (const [key, value] of new URLSearchParams(queryString)) {
    query[key] = value;
  }
  return query;
}

function sendJson(res, status, payload) {
  res.writeHead(status, { 'Content-Type': 'application/json' });
  res.end(JSON.stringify(payload));
}

function insideRoot(filePath) {
  return filePath === ROOT || filePath.startsWith(ROOT + path.sep);
}

function serveIndex(res) {
  fs.readFile(path.join(ROOT, 'index.html'), (err, data) => {
    if (err) {
      res.writeHead(404);
      res.end('Not Found');
      return;
    }
    res.writeHead(200, { 'Content-Type': 'text/html' });
    res.end(data);
  });
}

async function handleApi(req, res, url, method) {
  const handler = apiHandlers[`${method}:${url}`];
  if (!handler) {
    sendJson(res, 404, { error: 'Not Found' });
    return;
  }

  try {
    const body = await parseBody(req);
    const query = parseQuery(req.url);
    const ctx = { body, query, headers: req.headers, method };
    const result = await handler(req, res, ctx);
    if (res.writableEnded) return;

    const status = (result && result.status) || 200;
    const payload = result && result.data !== undefined ? result.data : result;
    sendJson(res, status, payload === undefined ? null : payload);
  } catch (error) {
    console.error('API Error:', error);
    sendJson(res, 500, { error: 'Internal Server Error' });
  }
}

function handleStatic(res, url) {
  let relative;
  try {
    relative = decodeURIComponent(url === '/' ? '/index.html' : url);
  } catch (e) {
    res.writeHead(400);
    res.end('Bad Request');
    return;
  }

  const filePath = path.resolve(ROOT, '.' + relative);
  if (!insideRoot(filePath)) {
    res.writeHead(403);
    res.end('Forbidden');
    return;
  }

  fs.readFile(filePath, (err, data) => {
    if (err) {
      serveIndex(res);
      return;
    }
    const mimeType = MIME_TYPES[path.extname(filePath).toLowerCase()] || 'application/octet-stream';
    res.writeHead(200, { 'Content-Type': mimeType });
    res.end(data);
  });
}

async function handleRequest(req, res) {
  const url = req.url.split('?')[0];
  const method = req.method;

  if (url.startsWith('/api/')) {
    await handleApi(req, res, url, method);
    return;
  }

  handleStatic(res, url);
}

const server = http.createServer(handleRequest);

server.listen(PORT, () => {
  console.log(`BOX server running at http://localhost:${PORT}`);
  if (ROUTES.length === 0) {
    console.log('  API routes: (none)');
  }
  for (const route of ROUTES) {
    console.log(`  ${route.method.padEnd(6)} ${route.path}${route.auth ? ' (auth)' : ''}`);
  }
});
"#;

/// `server.js`: dispatch table, route listing and static/SPA responder.
pub fn generate_server_module(routes: &[EndpointRoute], options: &GenerateOptions) -> String {
    let mut js = String::from(SERVER_PRELUDE);

    // One dispatch entry per key; the first route wins
    let mut seen = HashSet::new();
    let routes: Vec<&EndpointRoute> = routes.iter().filter(|r| seen.insert(r.key())).collect();

    js.push_str(&format!(
        "\nconst PORT = process.env.PORT || {};\n",
        options.port
    ));

    let listing: Vec<RouteListing> = routes
        .iter()
        .map(|route| RouteListing {
            method: route.method,
            path: &route.path,
            auth: route.auth,
            handler: &route.source_filename,
        })
        .collect();
    let listing_json = serde_json::to_string_pretty(&listing).unwrap_or_else(|_| "[]".to_string());
    js.push_str(&format!("\nconst ROUTES = {};\n", listing_json));

    let handlers = routes
        .iter()
        .map(|route| {
            format!(
                "  {}: async (req, res, ctx) => {{\n{}\n  }}",
                js_string(&route.key()),
                indent(&route.handler_body, 4)
            )
        })
        .collect::<Vec<_>>()
        .join(",\n\n");

    if handlers.is_empty() {
        js.push_str("\nconst apiHandlers = {};\n");
    } else {
        js.push_str(&format!("\nconst apiHandlers = {{\n{}\n}};\n", handlers));
    }

    js.push_str(SERVER_RUNTIME);
    js
}

// ═══════════════════════════════════════════════════════════════════════════════
// ALL ARTIFACTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Render all four artifacts. Diagnostics come from markup assembly.
pub fn generate_artifacts(
    graph: &ComponentGraph,
    routes: &[EndpointRoute],
    options: &GenerateOptions,
) -> (BuildArtifacts, Vec<Diagnostic>) {
    let (markup, diagnostics) = generate_markup(graph, options);
    let artifacts = BuildArtifacts {
        markup,
        stylesheet: generate_stylesheet(graph),
        script_bundle: generate_script_bundle(graph),
        server_module: generate_server_module(routes, options),
    };
    (artifacts, diagnostics)
}
