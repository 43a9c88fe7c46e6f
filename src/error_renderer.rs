//! Error rendering using ariadne
//!
//! Renders a [`CompileError`] against the source text of the unit that
//! failed, with the offending node underlined.

use crate::{CompileError, Severity};
use ariadne::{ColorGenerator, Label, Report, ReportKind, Source};
use std::io::Write;

const SOURCE_ID: &str = "<unit>";

/// Render an error with formatting to stderr
///
/// # Example
/// ```no_run
/// use kindle::{Bump, Compiler, CompilerOptions, render_error};
/// use kindle::tree::TreeBuilder;
///
/// let arena = Bump::new();
/// let t = TreeBuilder::new(&arena);
/// let script = t.alloc(t.script(vec![t.component("output")]));
///
/// let compiler = Compiler::new(CompilerOptions::default());
/// if let Err(e) = compiler.compile_unit("app.template", script) {
///     render_error(&e, "<bx:output>");
/// }
/// ```
pub fn render_error(error: &CompileError, source: &str) {
    render_error_to_writer(error, source, &mut std::io::stderr(), true).ok();
}

/// Render an error to a specific writer
pub fn render_error_to(error: &CompileError, source: &str, writer: &mut dyn Write) -> std::io::Result<()> {
    render_error_to_writer(error, source, writer, true)
}

/// Render an error to a String (useful for logs, web UIs, etc.)
pub fn render_error_to_string(error: &CompileError, source: &str) -> String {
    let mut buf = Vec::new();
    render_error_to_writer(error, source, &mut buf, true).ok();
    String::from_utf8_lossy(&buf).to_string()
}

/// Render an error to a String without color codes (useful for tests)
pub fn render_error_to_string_no_color(error: &CompileError, source: &str) -> String {
    let mut buf = Vec::new();
    render_error_to_writer(error, source, &mut buf, false).ok();
    String::from_utf8_lossy(&buf).to_string()
}

/// Wrap an error in a `miette` report carrying the source text.
pub fn to_report(error: CompileError, source: &str) -> miette::Report {
    miette::Report::new(error).with_source_code(source.to_string())
}

fn render_error_to_writer(
    error: &CompileError,
    source: &str,
    writer: &mut dyn Write,
    use_color: bool,
) -> std::io::Result<()> {
    let diag = error.to_diagnostic();
    let mut colors = ColorGenerator::new();
    colors.next(); // Skip the first color.

    let kind = match diag.severity {
        Severity::Error => ReportKind::Error,
        Severity::Warning => ReportKind::Warning,
        Severity::Info => ReportKind::Advice,
    };

    let mut report = Report::build(kind, (SOURCE_ID, diag.span.0.clone()))
        .with_message(&diag.message)
        .with_config(ariadne::Config::default().with_color(use_color));

    if let Some(code) = &diag.code {
        report = report.with_code(code);
    }

    // Routine-level errors have no node to point at.
    if error.span().is_some() {
        let color = colors.next();
        report = report.with_label(
            Label::new((SOURCE_ID, diag.span.0.clone()))
                .with_message(&diag.message)
                .with_color(color),
        );
    }

    for help_msg in &diag.help {
        report = report.with_help(help_msg);
    }

    report.finish().write((SOURCE_ID, Source::from(source)), &mut *writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{Span, TreeBuilder};
    use crate::{Bump, Compiler, CompilerOptions, UnitCache};
    use std::sync::Arc;

    fn compiler() -> Compiler {
        Compiler::with_cache(CompilerOptions::default(), Arc::new(UnitCache::new()))
    }

    #[test]
    fn test_render_unsupported_construct() {
        let source = "x = 1;\n<bx:output>";
        let arena = Bump::new();
        let t = TreeBuilder::new(&arena);
        let script = t.alloc(t.script(vec![
            t.expr_stmt(t.assign(t.ident("x"), t.int(1))),
            t.at(t.component("output"), Span::new(7, 18)),
        ]));

        let error = compiler().compile_unit("render.unsupported", script).unwrap_err();
        let output = render_error_to_string_no_color(&error, source);

        assert!(output.contains("Error"));
        assert!(output.contains("kindle::unsupported"));
        assert!(output.contains("<bx:output>"));
    }

    #[test]
    fn test_render_error_without_span() {
        let error = CompileError::Unsplittable {
            routine: "_invoke".into(),
            size: 70_000,
            limit: 55_000,
        };
        let output = render_error_to_string_no_color(&error, "");

        assert!(output.contains("kindle::unsplittable"));
        assert!(output.contains("break the code into smaller functions"));
    }

    #[test]
    fn test_report_keeps_diagnostic_code() {
        let error = CompileError::Unsplittable {
            routine: "_invoke".into(),
            size: 70_000,
            limit: 55_000,
        };
        let report = to_report(error, "");
        let code = report.code().map(|code| code.to_string());
        assert_eq!(code.as_deref(), Some("kindle::unsplittable"));
    }
}
