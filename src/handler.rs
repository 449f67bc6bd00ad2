//! Handler Extraction for BOX Endpoints
//!
//! Endpoint files export a single async request handler. The server module
//! inlines each handler body into a dispatcher with the fixed signature
//! `async (req, res, ctx)`, so the body is lifted out of its function and the
//! handler's own parameter names are rewritten to the dispatcher's. A handler
//! whose declarations would capture a rewritten name is called as-is instead.

use lazy_static::lazy_static;
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    BindingIdentifier, BindingPattern, ExportDefaultDeclarationKind, FormalParameters, FunctionBody,
    IdentifierReference, ObjectProperty, Statement,
};
use oxc_ast_visit::Visit;
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType, Span};
use regex::Regex;
use std::collections::{HashMap, HashSet};

use crate::parse::find_config_comment;
use crate::validate::{Diagnostic, DIAG_HANDLER_SHAPE};

/// Parameter names of the generated dispatcher, in order.
pub const DISPATCH_PARAMS: [&str; 3] = ["req", "res", "ctx"];

lazy_static! {
    static ref EXPORT_DEFAULT_RE: Regex = Regex::new(r"export\s+default\s+").unwrap();
    static ref CONTEXT_RE: Regex = Regex::new(r"\bcontext\b").unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// REFERENCE RENAMING
// ═══════════════════════════════════════════════════════════════════════════════

/// Collects span replacements for references to renamed parameters.
struct ParamRenamer<'m> {
    renames: &'m HashMap<String, &'static str>,
    replacements: Vec<(u32, u32, String)>,
}

impl<'a, 'm> Visit<'a> for ParamRenamer<'m> {
    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        if let Some(new_name) = self.renames.get(ident.name.as_str()) {
            self.replacements
                .push((ident.span.start, ident.span.end, new_name.to_string()));
        }
    }

    fn visit_object_property(&mut self, prop: &ObjectProperty<'a>) {
        // `{ request }` must keep its key: `{ request: req }`
        if prop.shorthand {
            if let oxc_ast::ast::Expression::Identifier(ident) = &prop.value {
                if let Some(new_name) = self.renames.get(ident.name.as_str()) {
                    self.replacements.push((
                        prop.span.start,
                        prop.span.end,
                        format!("{}: {}", ident.name, new_name),
                    ));
                    return;
                }
            }
        }
        oxc_ast_visit::walk::walk_object_property(self, prop);
    }
}

fn span_text(source: &str, span: Span) -> &str {
    &source[span.start as usize..span.end as usize]
}

/// Apply replacements that fall inside `range` and return the rewritten slice.
fn rewrite_range(source: &str, range: Span, mut replacements: Vec<(u32, u32, String)>) -> String {
    replacements.retain(|(start, end, _)| *start >= range.start && *end <= range.end);
    replacements.sort_by(|a, b| b.0.cmp(&a.0));

    let mut result = span_text(source, range).to_string();
    for (start, end, replacement) in replacements {
        let start = (start - range.start) as usize;
        let end = (end - range.start) as usize;
        result.replace_range(start..end, &replacement);
    }
    result
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARAMETERS
// ═══════════════════════════════════════════════════════════════════════════════

/// How the handler's positional parameters map onto the dispatcher's.
#[derive(Default)]
struct ParamBinding {
    /// Plain identifiers renamed to a dispatcher name
    renames: HashMap<String, &'static str>,
    /// Plain identifiers that already carry their dispatcher name
    kept: HashSet<&'static str>,
    /// Statements rebinding patterns and defaulted parameters
    prologue: Vec<String>,
}

/// Map positional parameters onto the dispatcher's names. Plain identifiers
/// become renames; patterns and defaulted parameters become a prologue that
/// rebinds them from the dispatcher argument.
fn bind_params(source: &str, params: &FormalParameters<'_>) -> ParamBinding {
    let mut binding = ParamBinding::default();

    for (param, target) in params.items.iter().zip(DISPATCH_PARAMS) {
        let pattern_text = span_text(source, param.pattern.span()).trim();
        let param_text = span_text(source, param.span).trim();

        if param_text != pattern_text {
            // Carries a default value
            binding
                .prologue
                .push(format!("const [{}] = [{}];", param_text, target));
            continue;
        }

        match &param.pattern {
            BindingPattern::BindingIdentifier(id) if id.name.as_str() == target => {
                binding.kept.insert(target);
            }
            BindingPattern::BindingIdentifier(id) => {
                binding.renames.insert(id.name.to_string(), target);
            }
            _ => binding
                .prologue
                .push(format!("const {} = {};", pattern_text, target)),
        }
    }

    binding
}

/// Every name declared inside the visited nodes.
#[derive(Default)]
struct DeclaredNames(HashSet<String>);

impl<'a> Visit<'a> for DeclaredNames {
    fn visit_binding_identifier(&mut self, ident: &BindingIdentifier<'a>) {
        self.0.insert(ident.name.to_string());
    }
}

/// Renaming by name is exact only when nothing in the handler redeclares a
/// renamed parameter or a dispatcher name the handler does not already own.
fn can_rename(
    source: &str,
    params: &FormalParameters<'_>,
    body: &FunctionBody<'_>,
    binding: &ParamBinding,
) -> bool {
    if params.rest.is_some() || params.items.len() > DISPATCH_PARAMS.len() {
        return false;
    }

    let mut declared = DeclaredNames::default();
    declared.visit_function_body(body);
    for param in &params.items {
        let plain = matches!(param.pattern, BindingPattern::BindingIdentifier(_))
            && span_text(source, param.span).trim()
                == span_text(source, param.pattern.span()).trim();
        if !plain {
            declared.visit_formal_parameter(param);
        }
    }

    !declared.0.iter().any(|name| {
        binding.renames.contains_key(name)
            || DISPATCH_PARAMS
                .iter()
                .any(|target| *target == name.as_str() && !binding.kept.contains(target))
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXTRACTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Strip the braces of a block body and trim it.
fn block_inner(source: &str, span: Span) -> Span {
    let text = span_text(source, span);
    if text.starts_with('{') && text.ends_with('}') && text.len() >= 2 {
        Span::new(span.start + 1, span.end - 1)
    } else {
        span
    }
}

/// Call the handler unchanged with the dispatcher's arguments.
fn render_delegation(handler_text: &str) -> String {
    let handler_text = handler_text.trim();
    let callee = if handler_text.starts_with("async") {
        handler_text.to_string()
    } else {
        format!("async {}", handler_text)
    };
    format!("return ({})({});", callee, DISPATCH_PARAMS.join(", "))
}

fn render_body(
    source: &str,
    handler: Span,
    params: &FormalParameters<'_>,
    body: &FunctionBody<'_>,
    concise: bool,
) -> String {
    let binding = bind_params(source, params);
    if !can_rename(source, params, body, &binding) {
        tracing::debug!("handler shadows its parameters, delegating instead of inlining");
        return render_delegation(span_text(source, handler));
    }

    let mut renamer = ParamRenamer {
        renames: &binding.renames,
        replacements: Vec::new(),
    };
    renamer.visit_function_body(body);

    let (range, is_expression) = match body.statements.first() {
        Some(Statement::ExpressionStatement(stmt)) if concise => (stmt.expression.span(), true),
        _ => (block_inner(source, body.span), false),
    };

    let rewritten = rewrite_range(source, range, renamer.replacements);
    let rewritten = rewritten.trim();

    let mut lines = binding.prologue;
    if is_expression {
        lines.push(format!("return {};", rewritten));
    } else if !rewritten.is_empty() {
        lines.push(rewritten.to_string());
    }
    lines.join("\n")
}

/// Lift the body out of an `export default async` handler. Returns `None`
/// when the module does not parse or exports something else.
fn extract_structured(source: &str) -> Option<String> {
    let allocator = Allocator::default();
    let source_type = SourceType::default().with_module(true);
    let ret = Parser::new(&allocator, source, source_type).parse();
    if !ret.errors.is_empty() {
        return None;
    }

    for stmt in &ret.program.body {
        let Statement::ExportDefaultDeclaration(decl) = stmt else {
            continue;
        };

        return match &decl.declaration {
            ExportDefaultDeclarationKind::ArrowFunctionExpression(arrow) if arrow.r#async => Some(
                render_body(source, arrow.span, &arrow.params, &arrow.body, arrow.expression),
            ),
            ExportDefaultDeclarationKind::FunctionDeclaration(func) if func.r#async => {
                let body = func.body.as_ref()?;
                Some(render_body(source, func.span, &func.params, body, false))
            }
            _ => None,
        };
    }

    None
}

/// Best-effort body for handlers of any other shape.
fn extract_fallback(source: &str) -> String {
    let stripped = EXPORT_DEFAULT_RE.replace(source, "");
    CONTEXT_RE.replace_all(stripped.trim(), "ctx").into_owned()
}

/// Handler body ready to inline into the dispatcher, plus any warning.
pub fn extract_handler_body(script: &str, filename: &str) -> (String, Option<Diagnostic>) {
    let source = match find_config_comment(script) {
        Some((range, _)) => {
            let mut stripped = String::with_capacity(script.len());
            stripped.push_str(&script[..range.start]);
            stripped.push_str(&script[range.end..]);
            stripped
        }
        None => script.to_string(),
    };

    if let Some(body) = extract_structured(&source) {
        return (body, None);
    }

    let diagnostic = Diagnostic::warning(
        DIAG_HANDLER_SHAPE,
        "Handler is not an `export default async` arrow or function",
        filename,
    )
    .with_hint("Use `export default async (req, res, ctx) => { ... }`")
    .emit();

    (extract_fallback(&source), Some(diagnostic))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(script: &str) -> String {
        let (body, diag) = extract_handler_body(script, "api+test.box");
        assert!(diag.is_none(), "unexpected warning for {script}");
        body
    }

    #[test]
    fn test_async_arrow_block_body() {
        let script = "/* BOX_CONFIG: { \"method\": \"GET\" } */\nexport default async (req, res) => {\n  return { status: 200, data: [] };\n};\n";
        assert_eq!(body(script), "return { status: 200, data: [] };");
    }

    #[test]
    fn test_context_renamed_to_ctx() {
        let script = "export default async (req, res, context) => {\n  return { user: context.user };\n};";
        assert_eq!(body(script), "return { user: ctx.user };");
    }

    #[test]
    fn test_positional_names_mapped() {
        let script = "export default async function handle(request, response) {\n  const q = request.query;\n  return { q, shorthand: { request } };\n}";
        let out = body(script);
        assert!(out.contains("const q = req.query;"));
        assert!(out.contains("{ request: req }"));
        assert!(!out.contains("handle"));
    }

    #[test]
    fn test_concise_arrow_becomes_return() {
        let script = "export default async (req) => ({ ok: req.body.ok });";
        assert_eq!(body(script), "return ({ ok: req.body.ok });");
    }

    #[test]
    fn test_destructured_param_prologue() {
        let script = "export default async ({ body }, res) => {\n  return body;\n};";
        assert_eq!(body(script), "const { body } = req;\nreturn body;");
    }

    #[test]
    fn test_member_property_names_untouched() {
        let script = "export default async (r) => {\n  return { r: r.r };\n};";
        assert_eq!(body(script), "return { r: req.r };");
    }

    #[test]
    fn test_shadowed_parameter_is_not_rewritten() {
        let script = "export default async (request, res) => {\n  const pick = (request) => request.id;\n  return { id: pick(request) };\n};";
        let out = body(script);
        assert!(out.contains("const pick = (request) => request.id;"));
        assert!(!out.contains("req.id"));
        assert!(out.starts_with("return (async (request, res) => {"));
        assert!(out.ends_with("})(req, res, ctx);"));
    }

    #[test]
    fn test_local_named_like_dispatcher_param() {
        let script = "export default async (request, response) => {\n  const req = request.body;\n  return { req };\n};";
        let out = body(script);
        assert!(out.contains("const req = request.body;"));
        assert!(!out.contains("const req = req.body;"));
        assert!(out.ends_with("(req, res, ctx);"));
    }

    #[test]
    fn test_shadowing_function_declaration_delegates() {
        let script = "export default async function handle(request) {\n  try { return { ok: request.ok }; } catch (request) { return { error: String(request) }; }\n}";
        let out = body(script);
        assert!(out.starts_with("return (async function handle(request) {"));
        assert!(out.contains("catch (request)"));
        assert!(out.ends_with("})(req, res, ctx);"));
    }

    #[test]
    fn test_nested_shadow_of_kept_name_still_inlines() {
        let script = "export default async (req) => {\n  const ids = req.body.map((req) => req.id);\n  return { ids };\n};";
        assert_eq!(
            body(script),
            "const ids = req.body.map((req) => req.id);\n  return { ids };"
        );
    }

    #[test]
    fn test_sync_handler_falls_back_with_warning() {
        let script = "export default (req, res, context) => context.user;";
        let (out, diag) = extract_handler_body(script, "api+sync.box");
        assert_eq!(out, "(req, res, ctx) => ctx.user;");
        let diag = diag.unwrap();
        assert_eq!(diag.code, DIAG_HANDLER_SHAPE);
        assert_eq!(diag.file, "api+sync.box");
    }

    #[test]
    fn test_unparseable_module_falls_back() {
        let (out, diag) = extract_handler_body("export default async (req => {", "api+broken.box");
        assert!(diag.is_some());
        assert_eq!(out, "async (req => {");
    }
}
