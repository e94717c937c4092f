use crate::PreprocessError;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::Lines;

const MAX_INCLUDE_DEPTH: usize = 16;

trait SourceOutput {
    fn push_line(&mut self, str: &str);
    fn mark_line(&mut self, line_no: usize, comment: &str) {
        if cfg!(feature = "line_directives") {
            self.push_line(&format!("#line {} \"{}\"", line_no, comment))
        }
    }
}

impl SourceOutput for String {
    fn push_line(&mut self, str: &str) {
        self.push_str(str);
        self.push('\n');
    }
}

pub(crate) fn read_file(path: impl AsRef<Path>) -> Result<String, PreprocessError> {
    let path = path.as_ref();
    let mut source = String::new();
    File::open(path)
        .and_then(|mut f| f.read_to_string(&mut source))
        .map_err(|e| PreprocessError::IOError(path.to_path_buf(), e))?;
    Ok(source)
}

/// Inline every `#include "file"` of `source`, marking file boundaries with `#line`.
///
/// Includes are resolved relative to the directory of `path` first, then against each lookup
/// directory in order.
pub(crate) fn expand_includes(
    source: &str,
    file_name: &str,
    path: Option<&Path>,
    lookup_directories: &[PathBuf],
) -> Result<String, PreprocessError> {
    let mut output = String::new();
    output.mark_line(1, file_name);
    preprocess(
        source.lines(),
        file_name,
        path,
        lookup_directories,
        &mut output,
        0,
    )?;
    Ok(output)
}

fn resolve_include(
    include_file: &str,
    parent: Option<&Path>,
    lookup_directories: &[PathBuf],
) -> Option<PathBuf> {
    parent
        .and_then(Path::parent)
        .map(|dir| dir.join(include_file))
        .filter(|p| p.is_file())
        .or_else(|| {
            lookup_directories
                .iter()
                .map(|dir| dir.join(include_file))
                .find(|p| p.is_file())
        })
}

fn preprocess(
    lines: Lines,
    file_name: &str,
    path: Option<&Path>,
    lookup_directories: &[PathBuf],
    output: &mut String,
    depth: usize,
) -> Result<(), PreprocessError> {
    if depth > MAX_INCLUDE_DEPTH {
        return Err(PreprocessError::IncludeDepthExceeded(MAX_INCLUDE_DEPTH));
    }

    for (line_no, line) in lines.enumerate() {
        let trimmed = line.trim_start();
        if let Some(include) = trimmed.strip_prefix("#include ") {
            let include_file = include.trim().trim_matches('"');
            if include_file.is_empty() {
                return Err(PreprocessError::UnexpectedEol(line_no + 1));
            }

            let include_path = resolve_include(include_file, path, lookup_directories)
                .ok_or_else(|| PreprocessError::ShaderNotFound(include_file.to_string()))?;

            let source = read_file(&include_path)?;
            let include_name = include_path
                .file_name()
                .and_then(|f| f.to_str())
                .unwrap_or("");
            output.mark_line(1, include_name);
            preprocess(
                source.lines(),
                include_name,
                Some(&include_path),
                lookup_directories,
                output,
                depth + 1,
            )?;
            output.mark_line(line_no + 2, file_name);
            continue;
        }

        output.push_line(line)
    }
    Ok(())
}
