//! Drives `codebase.init`: walks a codebase, skipping well-known
//! non-source directories, and reports per-language file counts. Semantic
//! analysis (extracting functions/classes into chunks) is out of scope —
//! ingestion beyond whole-file chunks is left to the caller via `rag.ingest`.

use std::collections::BTreeMap;
use std::path::Path;

use walkdir::WalkDir;

const SKIP_DIRS: &[&str] = &[
    ".git",
    ".svn",
    ".hg",
    "node_modules",
    "vendor",
    "venv",
    ".venv",
    "env",
    "__pycache__",
    ".pytest_cache",
    ".mypy_cache",
    "target",
    "build",
    "dist",
    "out",
    ".idea",
    ".vscode",
    "coverage",
    ".coverage",
];

const SKIP_FILES: &[&str] = &[".gitignore", ".dockerignore", "package-lock.json", "yarn.lock", "Cargo.lock"];

const LANGUAGE_EXTENSIONS: &[(&str, &[&str])] = &[
    ("python", &["py"]),
    ("rust", &["rs"]),
    ("javascript", &["js", "jsx", "mjs"]),
    ("typescript", &["ts", "tsx"]),
    ("go", &["go"]),
    ("java", &["java"]),
    ("csharp", &["cs"]),
    ("cpp", &["cpp", "cc", "cxx", "hpp", "h"]),
    ("c", &["c", "h"]),
    ("ruby", &["rb"]),
    ("php", &["php"]),
    ("swift", &["swift"]),
    ("kotlin", &["kt", "kts"]),
    ("scala", &["scala"]),
    ("shell", &["sh", "bash"]),
    ("sql", &["sql"]),
    ("yaml", &["yaml", "yml"]),
    ("json", &["json"]),
    ("markdown", &["md"]),
    ("toml", &["toml"]),
];

fn language_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    LANGUAGE_EXTENSIONS.iter().find(|(_, exts)| exts.contains(&ext.as_str())).map(|(lang, _)| *lang)
}

/// A source file discovered during a scan.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub relative_path: String,
    pub language: &'static str,
    pub content: String,
}

/// Summary returned by `codebase.init`: total files found and a per-language
/// breakdown.
#[derive(Debug, Clone, Default)]
pub struct ScanStats {
    pub total_files: usize,
    pub by_language: BTreeMap<String, usize>,
}

/// Walks `root`, skipping [`SKIP_DIRS`]/[`SKIP_FILES`] and anything that
/// isn't a recognized source extension. Files over 500KB or under 10 bytes
/// are skipped as unlikely to carry useful signal.
pub fn scan(root: &Path) -> (Vec<ScannedFile>, ScanStats) {
    let mut files = Vec::new();
    let mut stats = ScanStats::default();

    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        if entry.file_type().is_dir() {
            let name = entry.file_name().to_string_lossy();
            return !SKIP_DIRS.contains(&name.as_ref());
        }
        true
    });

    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else { continue };
        if SKIP_FILES.contains(&file_name) {
            continue;
        }
        let Some(language) = language_for(path) else { continue };
        let Ok(content) = std::fs::read_to_string(path) else { continue };
        if content.len() > 500_000 || content.len() < 10 {
            continue;
        }
        let relative_path = path.strip_prefix(root).unwrap_or(path).to_string_lossy().to_string();

        *stats.by_language.entry(language.to_string()).or_insert(0) += 1;
        stats.total_files += 1;
        files.push(ScannedFile { relative_path, language, content });
    }

    (files, stats)
}
