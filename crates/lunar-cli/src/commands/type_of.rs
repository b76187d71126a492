//! `lunar type` — print the inferred type of a symbol or expression.

use std::path::Path;

use lunar_infer::Analyzer;

use crate::output::{resolve_color_choice, StyledOutput};

pub fn execute(root: &Path, file: &Path, expr: &str, doc: bool) -> anyhow::Result<()> {
    let analyzer = Analyzer::new(root);
    let mut out = StyledOutput::new(resolve_color_choice());

    if doc {
        match analyzer.documentation_for(file, expr) {
            Some(text) => out.plain(&text),
            None => {
                out.error(&format!("no documentation for `{}`", expr));
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    // Bare identifiers hit the scope directly; anything else is
    // evaluated as an expression in the file's top-level scope.
    let is_ident = expr
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !expr.is_empty();
    let ty = if is_ident {
        analyzer.type_of_symbol(file, expr)
    } else {
        analyzer.type_of_expr(file, expr)
    };

    match ty {
        Some(t) => out.plain(t.name()),
        None => {
            out.error(&format!("cannot infer a type for `{}`", expr));
            std::process::exit(1);
        }
    }
    Ok(())
}
