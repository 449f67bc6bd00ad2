//! Discovery Module for BOX Compiler
//!
//! Scans the source tree for endpoint files (`api+*.box`) and turns each into
//! a route: URL path, HTTP method, auth flag and the handler body that the
//! server module inlines.

use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{BoxError, BoxResult};
use crate::handler::extract_handler_body;
use crate::parse::{parse_with_diagnostics, HttpMethod, COMPONENT_EXTENSION, ENDPOINT_PREFIX};
use crate::validate::{Diagnostic, DIAG_DUPLICATE_ROUTE, DIAG_READ_FAILED};

pub const API_PREFIX: &str = "/api/";

// ═══════════════════════════════════════════════════════════════════════════════
// ROUTE TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// Path and method implied by an endpoint filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteSpec {
    pub path: String,
    pub method: HttpMethod,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointRoute {
    pub path: String,
    pub method: HttpMethod,
    pub auth: bool,
    pub handler_body: String,
    pub source_filename: String,
}

impl EndpointRoute {
    /// Dispatch key used by the server module, e.g. `GET:/api/users`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.method, self.path)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FILENAME ROUTING
// ═══════════════════════════════════════════════════════════════════════════════

/// The slug of an endpoint filename: prefix and extension removed.
pub fn route_slug(filename: &str) -> &str {
    let name = filename.strip_prefix(ENDPOINT_PREFIX).unwrap_or(filename);
    name.strip_suffix(".box").unwrap_or(name)
}

/// Route for an endpoint filename without inline config.
///
/// `api+post-users.box` → `POST /api/users`, `api+users-id.box` → `GET /api/users/id`.
pub fn extract_api_route(filename: &str) -> RouteSpec {
    let mut slug = route_slug(filename);
    let mut method = HttpMethod::Get;

    for candidate in HttpMethod::ALL {
        let prefix_len = candidate.as_str().len() + 1;
        let matches = slug
            .get(..prefix_len)
            .is_some_and(|head| {
                head.ends_with('-')
                    && head[..prefix_len - 1].eq_ignore_ascii_case(candidate.as_str())
            });
        if matches {
            method = candidate;
            slug = &slug[prefix_len..];
            break;
        }
    }

    RouteSpec {
        path: format!("{}{}", API_PREFIX, slug.replace('-', "/")),
        method,
    }
}

fn is_endpoint_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.starts_with(ENDPOINT_PREFIX)
        && path
            .extension()
            .is_some_and(|ext| ext == COMPONENT_EXTENSION)
}

/// Every endpoint file under `dir`, sorted by file name within each directory.
pub fn find_endpoint_files(dir: &Path) -> BoxResult<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|source| BoxError::Walk {
            root: dir.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file() && is_endpoint_file(entry.path()) {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROUTE DISCOVERY
// ═══════════════════════════════════════════════════════════════════════════════

/// Build the route for one endpoint file's text.
pub fn route_from_source(source: &str, filename: &str) -> (EndpointRoute, Vec<Diagnostic>) {
    let (parsed, mut diagnostics) = parse_with_diagnostics(source, filename);
    let from_name = extract_api_route(filename);

    let (path, method) = match &parsed.config {
        Some(config) => (
            format!("{}{}", API_PREFIX, route_slug(filename)),
            config.method.unwrap_or(from_name.method),
        ),
        None => (from_name.path, from_name.method),
    };

    let (handler_body, warning) = extract_handler_body(&parsed.script, filename);
    diagnostics.extend(warning);

    let route = EndpointRoute {
        path,
        method,
        auth: parsed.config.and_then(|c| c.auth).unwrap_or(false),
        handler_body,
        source_filename: filename.to_string(),
    };

    (route, diagnostics)
}

/// Discover every endpoint route under `src_dir`. Each `METHOD:PATH` is served
/// by the first file that claims it in walk order.
pub fn discover_routes(src_dir: &Path) -> BoxResult<(Vec<EndpointRoute>, Vec<Diagnostic>)> {
    if !src_dir.is_dir() {
        return Err(BoxError::SourceDirNotFound {
            path: src_dir.to_path_buf(),
        });
    }

    let mut routes = Vec::new();
    let mut diagnostics = Vec::new();
    let mut claimed: HashMap<String, PathBuf> = HashMap::new();

    for path in find_endpoint_files(src_dir)? {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let source = match fs::read_to_string(&path) {
            Ok(source) => source,
            Err(e) => {
                diagnostics.push(
                    Diagnostic::warning(
                        DIAG_READ_FAILED,
                        &format!("Could not read endpoint {}", filename),
                        &path.display().to_string(),
                    )
                    .with_context(e.to_string())
                    .emit(),
                );
                continue;
            }
        };

        let (route, route_diagnostics) = route_from_source(&source, &filename);
        diagnostics.extend(route_diagnostics);

        let key = route.key();
        let relative = path.strip_prefix(src_dir).unwrap_or(&path).to_path_buf();
        if let Some(first) = claimed.get(&key) {
            diagnostics.push(
                Diagnostic::warning(
                    DIAG_DUPLICATE_ROUTE,
                    &format!(
                        "{} is defined by both {} and {}",
                        key,
                        first.display(),
                        relative.display()
                    ),
                    &path.display().to_string(),
                )
                .with_hint("Rename one endpoint or set its method in BOX_CONFIG")
                .emit(),
            );
            continue;
        }

        tracing::debug!(method = %route.method, path = %route.path, file = %filename, "discovered route");
        claimed.insert(key, relative);
        routes.push(route);
    }

    Ok((routes, diagnostics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_extract_api_route_default_get() {
        let route = extract_api_route("api+users.box");
        assert_eq!(route.path, "/api/users");
        assert_eq!(route.method, HttpMethod::Get);
    }

    #[test]
    fn test_extract_api_route_method_prefix() {
        let route = extract_api_route("api+post-users.box");
        assert_eq!(route.path, "/api/users");
        assert_eq!(route.method, HttpMethod::Post);

        let route = extract_api_route("api+DELETE-users-id.box");
        assert_eq!(route.path, "/api/users/id");
        assert_eq!(route.method, HttpMethod::Delete);
    }

    #[test]
    fn test_extract_api_route_nested_segments() {
        let route = extract_api_route("api+users-id-posts.box");
        assert_eq!(route.path, "/api/users/id/posts");
        assert_eq!(route.method, HttpMethod::Get);
    }

    #[test]
    fn test_method_word_without_dash_is_slug() {
        let route = extract_api_route("api+posts.box");
        assert_eq!(route.path, "/api/posts");
        assert_eq!(route.method, HttpMethod::Get);
    }

    #[test]
    fn test_config_keeps_raw_slug() {
        let source = "/* BOX_CONFIG: { \"method\": \"PUT\", \"auth\": true } */\nexport default async (req, res) => {\n  return { ok: true };\n};";
        let (route, diags) = route_from_source(source, "api+post-user-settings.box");
        assert!(diags.is_empty());
        assert_eq!(route.path, "/api/post-user-settings");
        assert_eq!(route.method, HttpMethod::Put);
        assert!(route.auth);
        assert_eq!(route.handler_body, "return { ok: true };");
        assert_eq!(route.key(), "PUT:/api/post-user-settings");
    }

    #[test]
    fn test_config_without_method_uses_filename_method() {
        let source = "/* BOX_CONFIG: { \"auth\": false } */\nexport default async () => ({});";
        let (route, _) = route_from_source(source, "api+delete-item.box");
        assert_eq!(route.method, HttpMethod::Delete);
        assert_eq!(route.path, "/api/delete-item");
        assert!(!route.auth);
    }

    #[test]
    fn test_discover_routes_walks_sorted() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("nested")).unwrap();
        fs::write(
            tmp.path().join("api+users.box"),
            "export default async (req, res) => {\n  return { users: [] };\n};",
        )
        .unwrap();
        fs::write(
            tmp.path().join("nested/api+post-users.box"),
            "export default async (req, res) => {\n  return { created: true };\n};",
        )
        .unwrap();
        fs::write(tmp.path().join("header.box"), "<template></template>").unwrap();
        fs::write(tmp.path().join("api+notes.txt"), "not an endpoint").unwrap();

        let (routes, diags) = discover_routes(tmp.path()).unwrap();
        assert!(diags.is_empty());
        let keys: Vec<String> = routes.iter().map(EndpointRoute::key).collect();
        assert_eq!(keys, vec!["GET:/api/users", "POST:/api/users"]);
        assert_eq!(routes[1].source_filename, "api+post-users.box");
    }

    #[test]
    fn test_duplicate_route_keeps_first_and_warns() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("v2")).unwrap();
        fs::write(
            tmp.path().join("api+get-users.box"),
            "export default async (req) => {\n  return { from: 'prefixed' };\n};",
        )
        .unwrap();
        fs::write(
            tmp.path().join("api+users.box"),
            "export default async (req) => {\n  return { from: 'plain' };\n};",
        )
        .unwrap();
        fs::write(
            tmp.path().join("v2/api+users.box"),
            "export default async (req) => {\n  return { from: 'nested' };\n};",
        )
        .unwrap();

        let (routes, diags) = discover_routes(tmp.path()).unwrap();

        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].source_filename, "api+get-users.box");
        assert!(routes[0].handler_body.contains("prefixed"));

        assert_eq!(diags.len(), 2);
        assert!(diags.iter().all(|d| d.code == DIAG_DUPLICATE_ROUTE));
        assert!(diags[0].message.contains("GET:/api/users"));
        assert!(diags[0].message.contains("api+get-users.box"));
        assert!(diags[0].message.contains("and api+users.box"));
        assert!(diags[1].message.contains("v2"));
    }

    #[test]
    fn test_discover_routes_missing_dir() {
        let tmp = TempDir::new().unwrap();
        let err = discover_routes(&tmp.path().join("missing")).unwrap_err();
        assert!(matches!(err, BoxError::SourceDirNotFound { .. }));
    }
}
