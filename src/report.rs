//! Diagnostic rendering: turns an evaluation, lex, or parse failure
//! plus the module it happened in into a caret diagnostic.

use crate::evaluator::EvalError;
use crate::importer::{ImportError, Module};
use crate::lexer::{LexError, Span};
use crate::parser::ParseError;

const MAX_TRACE_FRAMES: usize = 4;

pub fn render_eval_error(err: &EvalError, module: &dyn Module) -> String {
    let id = module.identity();
    let source = module.source().unwrap_or_default();
    let mut out = format!("{id}: {}", err.error);

    let Some(primary) = err.span() else {
        return out;
    };

    let (line_no, column_no, line_text) = line_context(&source, primary.start);
    out.push_str(&format!(
        "\n  --> line {line_no}, column {column_no}\n  {line_text}\n  {}^",
        " ".repeat(column_no.saturating_sub(1))
    ));

    // Outer frames of the span trace, innermost first, deduplicated by
    // source line.
    let mut seen_lines = vec![line_no];
    let mut shown = 0usize;
    for span in err.trace.iter().skip(1) {
        let (line_no, column_no, _) = line_context(&source, span.start);
        if seen_lines.contains(&line_no) {
            continue;
        }
        if shown >= MAX_TRACE_FRAMES {
            out.push_str("\n  via ...");
            break;
        }
        seen_lines.push(line_no);
        shown += 1;
        out.push_str(&format!("\n  via line {line_no}, column {column_no}"));
    }

    out
}

pub fn render_lex_errors(errors: &[LexError], module: &dyn Module) -> String {
    let id = module.identity();
    let source = module.source().unwrap_or_default();
    errors
        .iter()
        .map(|err| render_span_message(&id, &source, err.span, &err.message))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn render_parse_errors(errors: &[ParseError], module: &dyn Module) -> String {
    let id = module.identity();
    let source = module.source().unwrap_or_default();
    errors
        .iter()
        .map(|err| render_span_message(&id, &source, err.span, &err.message))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn render_import_error(err: &ImportError, module: &dyn Module) -> String {
    match err {
        ImportError::Source { .. } => err.to_string(),
        ImportError::Lex { errors, .. } => render_lex_errors(errors, module),
        ImportError::Parse { errors, .. } => render_parse_errors(errors, module),
        ImportError::Eval { error, .. } => render_eval_error(error, module),
    }
}

fn render_span_message(id: &str, source: &str, span: Span, message: &str) -> String {
    let (line_no, column_no, line_text) = line_context(source, span.start);
    format!(
        "{id}: {message}\n  --> line {line_no}, column {column_no}\n  {line_text}\n  {}^",
        " ".repeat(column_no.saturating_sub(1))
    )
}

fn line_context(source: &str, byte_offset: usize) -> (usize, usize, String) {
    let bounded = clamp_to_char_boundary(source, byte_offset.min(source.len()));
    let mut line_no = 1usize;
    let mut line_start = 0usize;

    for segment in source.split_inclusive('\n') {
        let line_end = line_start + segment.len();
        if bounded < line_end {
            let text = segment.trim_end_matches(['\n', '\r']).to_string();
            let column = source[line_start..bounded].chars().count() + 1;
            return (line_no, column, text);
        }
        line_no += 1;
        line_start = line_end;
    }

    if source.is_empty() {
        return (1, 1, String::new());
    }

    let line = source.lines().last().unwrap_or_default().to_string();
    let column = line.chars().count() + 1;
    (line_no, column, line)
}

fn clamp_to_char_boundary(source: &str, mut idx: usize) -> usize {
    while idx > 0 && !source.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
