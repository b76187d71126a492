//! `lunar check` — type-check files and report lints.

use std::path::{Path, PathBuf};

use anyhow::Context;
use codespan_reporting::diagnostic::{Diagnostic as CsDiagnostic, Label, Severity as CsSeverity};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::StandardStream;
use lunar_infer::{Analyzer, Diagnostic, Severity};

use crate::output::{resolve_color_choice, StyledOutput};

struct FileReport {
    path: PathBuf,
    source: String,
    diagnostics: Vec<Diagnostic>,
}

pub fn execute(root: &Path, files: Vec<PathBuf>, format: &str) -> anyhow::Result<()> {
    if files.is_empty() {
        anyhow::bail!("no input files");
    }

    let analyzer = Analyzer::new(root);
    let mut reports: Vec<FileReport> = Vec::new();
    let mut parse_errors = 0usize;

    for path in &files {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        match analyzer.check_source(path, &source) {
            Ok(diagnostics) => {
                if !diagnostics.is_empty() {
                    reports.push(FileReport {
                        path: path.clone(),
                        source,
                        diagnostics,
                    });
                }
            }
            Err(e) => {
                eprintln!("{}: {}", path.display(), e);
                parse_errors += 1;
            }
        }
    }

    let total: usize = reports.iter().map(|r| r.diagnostics.len()).sum();

    match format {
        "json" => emit_json(&reports)?,
        _ => {
            emit_pretty(&reports)?;
            let mut out = StyledOutput::new(resolve_color_choice());
            if total == 0 && parse_errors == 0 {
                out.success(&format!("{} file(s) checked, no issues.", files.len()));
            } else {
                out.warn(&format!(
                    "{} file(s) checked, {} lint(s), {} parse error(s).",
                    files.len(),
                    total,
                    parse_errors
                ));
            }
        }
    }

    if total > 0 || parse_errors > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn emit_pretty(reports: &[FileReport]) -> anyhow::Result<()> {
    let writer = StandardStream::stderr(resolve_color_choice());
    let config = term::Config::default();

    for report in reports {
        let mut files = SimpleFiles::new();
        let file_id = files.add(report.path.display().to_string(), report.source.clone());

        for d in &report.diagnostics {
            let severity = match d.severity {
                Severity::Error => CsSeverity::Error,
                Severity::Warning => CsSeverity::Warning,
            };
            let diag = CsDiagnostic::new(severity)
                .with_message(&d.message)
                .with_labels(vec![Label::primary(file_id, d.start_offset..d.end_offset)]);
            term::emit(&mut writer.lock(), &config, &files, &diag)?;
        }
    }
    Ok(())
}

fn emit_json(reports: &[FileReport]) -> anyhow::Result<()> {
    #[derive(serde::Serialize)]
    struct FileEntry<'a> {
        file: String,
        diagnostics: &'a [Diagnostic],
    }

    let entries: Vec<FileEntry> = reports
        .iter()
        .map(|r| FileEntry {
            file: r.path.display().to_string(),
            diagnostics: &r.diagnostics,
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}
