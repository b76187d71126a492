//! `lunar modules` — list resolvable module names under a directory.

use std::path::{Path, PathBuf};

use lunar_infer::Analyzer;

use crate::output::{resolve_color_choice, StyledOutput};

pub fn execute(root: &Path, dir: Option<PathBuf>) -> anyhow::Result<()> {
    let analyzer = Analyzer::new(root);
    let dir = dir.unwrap_or_else(|| root.to_path_buf());

    let names = analyzer.module_names(&dir);
    let mut out = StyledOutput::new(resolve_color_choice());
    if names.is_empty() {
        out.warn(&format!("no modules under {}", dir.display()));
        return Ok(());
    }
    for name in names {
        out.plain(&name);
    }
    Ok(())
}
