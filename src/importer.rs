//! Module loading.
//!
//! A module is a named unit of source text with a canonical identity.
//! Importing is idempotent: a module id that has been seen before is a
//! no-op, and ids are marked *before* evaluation so import cycles
//! terminate. Modules evaluate in the importing evaluator, so their
//! top-level declarations land in its root environment.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::evaluator::{EvalError, Evaluator};
use crate::lexer::{tokenize, LexError};
use crate::parser::{ParseError, Parser};
use crate::value::RuntimeError;

pub const SOURCE_EXTENSION: &str = "rime";

pub trait Module {
    /// Canonical identity, the key for import deduplication.
    fn identity(&self) -> String;

    fn source(&self) -> io::Result<String>;

    /// Directory that relative imports inside this module resolve
    /// against, when the module has one.
    fn enclosing_dir(&self) -> Option<PathBuf> {
        None
    }
}

/// A module backed by a file on disk; its identity is the canonical path.
#[derive(Debug, Clone)]
pub struct FileModule {
    path: PathBuf,
}

impl FileModule {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let path = std::fs::canonicalize(&path).unwrap_or(path);
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Module for FileModule {
    fn identity(&self) -> String {
        self.path.display().to_string()
    }

    fn source(&self) -> io::Result<String> {
        std::fs::read_to_string(&self.path)
    }

    fn enclosing_dir(&self) -> Option<PathBuf> {
        self.path.parent().map(Path::to_path_buf)
    }
}

/// A module held in memory, named for diagnostics. Used by the REPL.
#[derive(Debug, Clone)]
pub struct MemoryModule {
    name: String,
    source: String,
}

impl MemoryModule {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }
}

impl Module for MemoryModule {
    fn identity(&self) -> String {
        self.name.clone()
    }

    fn source(&self) -> io::Result<String> {
        Ok(self.source.clone())
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to read module '{id}': {source}")]
    Source {
        id: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to lex module '{id}'")]
    Lex { id: String, errors: Vec<LexError> },
    #[error("failed to parse module '{id}'")]
    Parse { id: String, errors: Vec<ParseError> },
    #[error("error evaluating module '{id}'")]
    Eval { id: String, error: EvalError },
}

/// Tracks which module identities have been imported and resolves
/// module names to files.
#[derive(Debug)]
pub struct Importer {
    imported: HashSet<String>,
    base_dir: PathBuf,
    search_paths: Vec<PathBuf>,
}

impl Importer {
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            imported: HashSet::new(),
            base_dir,
            search_paths: Vec::new(),
        }
    }

    pub fn add_search_path(&mut self, dir: PathBuf) {
        self.search_paths.push(dir);
    }

    pub fn is_imported(&self, id: &str) -> bool {
        self.imported.contains(id)
    }

    fn mark(&mut self, id: String) {
        self.imported.insert(id);
    }

    /// Resolves a module name to a file. Names without an extension get
    /// the `.rime` suffix; relative names are tried against the base
    /// directory and then each search path.
    pub fn resolve(&self, name: &str) -> Result<FileModule, RuntimeError> {
        let raw = PathBuf::from(name);
        let candidate = if raw.extension().is_some() {
            raw
        } else {
            raw.with_extension(SOURCE_EXTENSION)
        };

        let mut searched = Vec::new();
        let roots = std::iter::once(&self.base_dir).chain(self.search_paths.iter());
        for root in roots {
            let resolved = if candidate.is_absolute() {
                candidate.clone()
            } else {
                root.join(&candidate)
            };

            if resolved.exists() {
                return Ok(FileModule::new(resolved));
            }
            searched.push(resolved.display().to_string());
        }

        searched.dedup();
        Err(RuntimeError::ModuleNotFound {
            module: name.to_string(),
            searched: searched.join(", "),
        })
    }

    fn swap_base_dir(&mut self, dir: PathBuf) -> PathBuf {
        std::mem::replace(&mut self.base_dir, dir)
    }
}

impl Evaluator {
    /// Imports a module: no-op when its identity was seen before,
    /// otherwise lex + parse, mark imported, and evaluate the root in
    /// this evaluator. Marking precedes evaluation so cyclic imports
    /// terminate.
    pub fn import(&mut self, module: &dyn Module) -> Result<(), ImportError> {
        let id = module.identity();
        if self.importer.is_imported(&id) {
            debug!(module = %id, "module already imported, skipping");
            return Ok(());
        }

        debug!(module = %id, "importing module");
        let source = module.source().map_err(|err| ImportError::Source {
            id: id.clone(),
            source: err,
        })?;

        let tokens = tokenize(&source).map_err(|errors| ImportError::Lex {
            id: id.clone(),
            errors,
        })?;
        let program = Parser::new(tokens)
            .parse_program()
            .map_err(|errors| ImportError::Parse {
                id: id.clone(),
                errors,
            })?;

        self.importer.mark(id.clone());

        // Relative imports inside the module resolve against its own
        // directory.
        let saved_base = module
            .enclosing_dir()
            .map(|dir| self.importer.swap_base_dir(dir));
        let result = self.evaluate(&program);
        if let Some(previous) = saved_base {
            self.importer.swap_base_dir(previous);
        }

        result.map_err(|error| ImportError::Eval { id, error })?;
        Ok(())
    }
}
