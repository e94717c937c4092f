use crate::include::read_file;
use crate::PreprocessError;
use shadermix_common::map::FastHashMap;
use shadermix_common::SourceHash;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The file extension of mixin shader sources.
pub const SHADER_EXTENSION: &str = "mxsl";

/// The raw text of one shader class, as found by a [`ShaderSourceManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSourceFile {
    /// The class name the source was requested under.
    pub name: String,
    /// The path the source was read from, or `None` for virtual sources.
    pub path: Option<PathBuf>,
    /// The unprocessed source text.
    pub source: String,
    /// The hash of the unprocessed source text.
    pub hash: SourceHash,
}

impl ShaderSourceFile {
    /// The display name used for `#line` markers and diagnostics.
    pub fn file_name(&self) -> String {
        self.path
            .as_deref()
            .and_then(Path::file_name)
            .and_then(|f| f.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}.{SHADER_EXTENSION}", self.name))
    }
}

/// Locates shader class sources by name.
///
/// Sources are resolved in order from virtual (in-memory) sources, explicit URL to path mappings,
/// then `<Name>.mxsl` in each lookup directory. Loaded sources are cached until evicted by
/// [`ShaderSourceManager::delete_obsolete_cache`].
#[derive(Debug, Default)]
pub struct ShaderSourceManager {
    lookup_directories: Vec<PathBuf>,
    url_to_file_path: FastHashMap<String, PathBuf>,
    virtual_sources: FastHashMap<String, String>,
    cache: FastHashMap<String, Arc<ShaderSourceFile>>,
}

impl ShaderSourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source manager searching the given directories.
    pub fn with_lookup_directories(directories: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        let mut manager = Self::new();
        for directory in directories {
            manager.add_lookup_directory(directory);
        }
        manager
    }

    pub fn add_lookup_directory(&mut self, directory: impl Into<PathBuf>) {
        let directory = directory.into();
        if !self.lookup_directories.contains(&directory) {
            self.lookup_directories.push(directory);
        }
    }

    pub fn lookup_directories(&self) -> &[PathBuf] {
        &self.lookup_directories
    }

    /// Map a class name to an explicit file path.
    pub fn add_url_mapping(&mut self, class_name: impl Into<String>, path: impl Into<PathBuf>) {
        self.url_to_file_path.insert(class_name.into(), path.into());
    }

    /// Register an in-memory source for a class.
    ///
    /// Virtual sources take precedence over files. A cached copy of a previous source for the
    /// same name is kept until [`ShaderSourceManager::delete_obsolete_cache`] is called.
    pub fn add_virtual_source(&mut self, class_name: impl Into<String>, source: impl Into<String>) {
        self.virtual_sources.insert(class_name.into(), source.into());
    }

    /// Find the path a class would be loaded from.
    pub fn find_file_path(&self, class_name: &str) -> Option<PathBuf> {
        if let Some(path) = self.url_to_file_path.get(class_name) {
            return Some(path.clone());
        }

        let file_name = format!("{class_name}.{SHADER_EXTENSION}");
        self.lookup_directories
            .iter()
            .map(|dir| dir.join(&file_name))
            .find(|path| path.is_file())
    }

    pub fn class_exists(&self, class_name: &str) -> bool {
        self.cache.contains_key(class_name)
            || self.virtual_sources.contains_key(class_name)
            || self.find_file_path(class_name).is_some()
    }

    /// Load the source of a class, reading through the cache.
    pub fn load_shader_source(
        &mut self,
        class_name: &str,
    ) -> Result<Arc<ShaderSourceFile>, PreprocessError> {
        if let Some(cached) = self.cache.get(class_name) {
            log::trace!("source cache hit for {class_name}");
            return Ok(Arc::clone(cached));
        }

        let file = if let Some(source) = self.virtual_sources.get(class_name) {
            ShaderSourceFile {
                name: class_name.to_string(),
                path: None,
                hash: SourceHash::of(source),
                source: source.clone(),
            }
        } else {
            let path = self
                .find_file_path(class_name)
                .ok_or_else(|| PreprocessError::ShaderNotFound(class_name.to_string()))?;
            let source = read_file(&path)?;
            ShaderSourceFile {
                name: class_name.to_string(),
                path: Some(path),
                hash: SourceHash::of(&source),
                source,
            }
        };

        log::trace!("loaded source for {class_name} ({:?})", file.hash);
        let file = Arc::new(file);
        self.cache
            .insert(class_name.to_string(), Arc::clone(&file));
        Ok(file)
    }

    /// Evict the cached text of the given classes so the next load reads them again.
    pub fn delete_obsolete_cache<'a>(&mut self, class_names: impl IntoIterator<Item = &'a str>) {
        for name in class_names {
            self.cache.remove(name);
        }
    }
}

#[cfg(test)]
mod test {
    use crate::ShaderSourceManager;

    #[test]
    fn virtual_source_wins_over_files() {
        let mut manager = ShaderSourceManager::with_lookup_directories(["../test/shaders"]);
        assert!(manager.class_exists("PointLight"));
        manager.add_virtual_source("PointLight", "shader PointLight {}");
        let file = manager.load_shader_source("PointLight").unwrap();
        assert!(file.path.is_none());
        assert_eq!("PointLight.mxsl", file.file_name());
    }

    #[test]
    fn cache_survives_until_deleted() {
        let mut manager = ShaderSourceManager::new();
        manager.add_virtual_source("A", "shader A {}");
        let first = manager.load_shader_source("A").unwrap();

        manager.add_virtual_source("A", "shader A { float x; }");
        assert_eq!(first.hash, manager.load_shader_source("A").unwrap().hash);

        manager.delete_obsolete_cache(["A"]);
        assert_ne!(first.hash, manager.load_shader_source("A").unwrap().hash);
    }

    #[test]
    fn missing_class() {
        let mut manager = ShaderSourceManager::with_lookup_directories(["../test/shaders"]);
        assert!(!manager.class_exists("DoesNotExist"));
        assert!(manager.load_shader_source("DoesNotExist").is_err());
    }
}
