//! Diagnostic collection for member-existence and assignment checks.

use lunar_syntax::{NodeId, Span};
use rustc_hash::FxHashSet;
use serde::Serialize;
use std::cell::RefCell;

/// Zero-based position in a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    /// 0-based line
    pub line: u32,
    /// 0-based column
    pub column: u32,
}

/// Half-open source range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Range {
    /// Start position
    pub start: Position,
    /// End position
    pub end: Position,
}

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Broken code
    Error,
    /// Suspect but not fatal
    Warning,
}

/// A single reported finding.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    /// Affected source range, 0-based lines and columns
    pub range: Range,
    /// Human-readable message
    pub message: String,
    /// Severity level
    pub severity: Severity,
    /// Byte offset of the range start, for renderers that want spans
    #[serde(skip)]
    pub start_offset: usize,
    /// Byte offset of the range end
    #[serde(skip)]
    pub end_offset: usize,
}

/// Collects diagnostics during abstract evaluation.
///
/// Each AST node reports at most once: re-evaluation of a shared function
/// body must not duplicate findings, so nodes are remembered by id.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    items: RefCell<Vec<Diagnostic>>,
    reported: RefCell<FxHashSet<NodeId>>,
}

impl DiagnosticSink {
    /// New empty sink.
    pub fn new() -> DiagnosticSink {
        DiagnosticSink::default()
    }

    /// Whether `node` has already been reported.
    pub fn is_reported(&self, node: NodeId) -> bool {
        self.reported.borrow().contains(&node)
    }

    /// Report a finding against `node`, ignoring repeats.
    pub fn report(&self, node: NodeId, span: Span, message: impl Into<String>) {
        if !self.reported.borrow_mut().insert(node) {
            return;
        }
        self.items.borrow_mut().push(Diagnostic {
            range: Range {
                start: Position {
                    line: span.start_line.saturating_sub(1),
                    column: span.start_column,
                },
                end: Position {
                    line: span.end_line.saturating_sub(1),
                    column: span.end_column,
                },
            },
            message: message.into(),
            severity: Severity::Warning,
            start_offset: span.start,
            end_offset: span.end,
        });
    }

    /// Number of findings so far.
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    /// Whether the sink is empty.
    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// Drain the collected diagnostics.
    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.items.borrow_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> Span {
        Span {
            start: 0,
            end: 3,
            start_line: 1,
            start_column: 0,
            end_line: 1,
            end_column: 3,
        }
    }

    #[test]
    fn test_report_once_per_node() {
        let sink = DiagnosticSink::new();
        sink.report(NodeId(1), span(), "missing member");
        sink.report(NodeId(1), span(), "missing member");
        sink.report(NodeId(2), span(), "bad assignment");
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn test_lines_are_zero_based() {
        let sink = DiagnosticSink::new();
        sink.report(NodeId(1), span(), "x");
        let items = sink.take();
        assert_eq!(items[0].range.start.line, 0);
        assert!(sink.is_empty());
    }
}
