//! orionc-resolve - module loading, caching, and import-cycle detection.
//!
//! Grounded in `spec.md` §3 ("Modules") and §4.7 ("Module resolver"); there
//! is no dedicated resolver crate in the donor (`faxc` compiles one file at
//! a time with no module system), so this crate's shape follows the
//! `HashMap`-backed cache idiom `orionc-util`'s symbol interner already
//! establishes in this workspace rather than any one donor file.
//!
//! The cache key is a content digest ([`orionc_util::content_digest`]), not
//! a file modification time — `spec.md` §9 flags mtime as unreliable under
//! atomic file replacement, and this project's resolution keeps the cache
//! best-effort rather than authoritative per the original contract ("if the
//! source file is newer than a cached form, it re-parses").

use orionc_par::{Import, Item, Program};
use orionc_sem::{collect_imports, module_name};
use orionc_util::diagnostic::DiagnosticBuilder;
use orionc_util::{content_digest, DiagnosticCode, FxHashMap, FxHashSet, Handler, Span};
use std::path::{Path, PathBuf};

/// Export visibility tag, per `spec.md` §3's `{private, internal, public}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    Private,
    Internal,
    Public,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExportedSymbol {
    pub name: String,
    pub visibility: Visibility,
}

/// One `import` declaration, generalized over the three surface forms the
/// parser distinguishes (`Import::Whole/Aliased/Selective`).
#[derive(Clone, Debug, PartialEq)]
pub struct ImportSpec {
    pub module: String,
    pub alias: Option<String>,
    pub symbols: Option<Vec<(String, Option<String>)>>,
}

impl From<&Import> for ImportSpec {
    fn from(import: &Import) -> Self {
        match import {
            Import::Whole { name } => ImportSpec {
                module: name.clone(),
                alias: None,
                symbols: None,
            },
            Import::Aliased { name, alias } => ImportSpec {
                module: name.clone(),
                alias: Some(alias.clone()),
                symbols: None,
            },
            Import::Selective { name, symbols } => ImportSpec {
                module: name.clone(),
                alias: None,
                symbols: Some(symbols.clone()),
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loading,
    Loaded,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

#[derive(Clone, Debug)]
pub struct Module {
    pub name: String,
    pub path: PathBuf,
    pub exports: Vec<ExportedSymbol>,
    pub imports: Vec<ImportSpec>,
    pub dependencies: Vec<String>,
    pub ast: Option<Program>,
    pub state: LoadState,
    pub version: Option<Version>,
    pub metadata: FxHashMap<String, String>,
}

impl Module {
    fn empty(name: &str, state: LoadState) -> Self {
        Module {
            name: name.to_string(),
            path: PathBuf::new(),
            exports: Vec::new(),
            imports: Vec::new(),
            dependencies: Vec::new(),
            ast: None,
            state,
            version: None,
            metadata: FxHashMap::default(),
        }
    }
}

/// One (content-digest, parsed module) cache slot keyed by resolved path.
struct CacheEntry {
    digest: u64,
    module_name: String,
}

/// The resolver's process-wide state: every module loaded so far, the
/// content-digest cache, and the set of modules currently mid-load (the
/// cycle detector — `spec.md`'s invariant that a `loading` module must
/// never be re-entered).
pub struct ModuleTable {
    modules: FxHashMap<String, Module>,
    cache: FxHashMap<PathBuf, CacheEntry>,
    loading: FxHashSet<String>,
}

impl ModuleTable {
    pub fn new() -> Self {
        ModuleTable {
            modules: FxHashMap::default(),
            cache: FxHashMap::default(),
            loading: FxHashSet::default(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    /// Resolve `name` to a source file under one of `search_paths`, trying
    /// `<dir>/<name>.l` in order (per `spec.md` §6: module sources use the
    /// `.l` extension).
    fn resolve_path(name: &str, search_paths: &[PathBuf]) -> Option<PathBuf> {
        for dir in search_paths {
            let candidate = dir.join(format!("{name}.l"));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }

    /// Load `name`, recursively loading its declared imports. Returns the
    /// resulting [`Module`] in every case — even on a cycle or I/O failure —
    /// so callers can proceed with shallow linking per `spec.md` §4.7/§7.
    pub fn load(&mut self, name: &str, search_paths: &[PathBuf], handler: &Handler) -> Module {
        if let Some(existing) = self.modules.get(name) {
            if existing.state == LoadState::Loaded {
                if let Some(path) = Self::resolve_path(name, search_paths) {
                    if let Ok(bytes) = std::fs::read(&path) {
                        let digest = content_digest(&bytes);
                        if self.cache.get(&path).map(|e| e.digest) == Some(digest) {
                            return existing.clone();
                        }
                    }
                } else {
                    return existing.clone();
                }
            }
        }

        if self.loading.contains(name) {
            DiagnosticBuilder::error(format!("circular import involving module '{name}'"))
                .code(DiagnosticCode::E_MODULE_CIRCULAR_DEPENDENCY)
                .span(Span::DUMMY)
                .emit(handler);
            return self
                .modules
                .get(name)
                .cloned()
                .unwrap_or_else(|| Module::empty(name, LoadState::Loading));
        }

        let Some(path) = Self::resolve_path(name, search_paths) else {
            DiagnosticBuilder::error(format!(
                "module '{name}' not found in any of {} search path(s)",
                search_paths.len()
            ))
            .code(DiagnosticCode::E_MODULE_IO)
            .span(Span::DUMMY)
            .emit(handler);
            let m = Module::empty(name, LoadState::Unloaded);
            self.modules.insert(name.to_string(), m.clone());
            return m;
        };

        let Ok(source) = std::fs::read_to_string(&path) else {
            DiagnosticBuilder::error(format!("I/O failure reading module file '{}'", path.display()))
                .code(DiagnosticCode::E_MODULE_IO)
                .span(Span::DUMMY)
                .emit(handler);
            let m = Module::empty(name, LoadState::Unloaded);
            self.modules.insert(name.to_string(), m.clone());
            return m;
        };
        let digest = content_digest(source.as_bytes());

        self.loading.insert(name.to_string());

        let program = orionc_par::parse(&source, handler);
        let resolved_name = module_name(&program).unwrap_or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(name)
                .to_string()
        });
        let imports: Vec<ImportSpec> = collect_import_specs(&program);
        let dependencies: Vec<String> = collect_imports(&program);
        let exports = collect_exports(&program);

        for dep in &dependencies {
            self.load(dep, search_paths, handler);
        }

        self.loading.remove(name);

        let module = Module {
            name: resolved_name.clone(),
            path: path.clone(),
            exports,
            imports,
            dependencies,
            ast: Some(program),
            state: LoadState::Loaded,
            version: None,
            metadata: FxHashMap::default(),
        };

        self.cache.insert(
            path,
            CacheEntry {
                digest,
                module_name: resolved_name.clone(),
            },
        );
        self.modules.insert(resolved_name, module.clone());
        if resolved_name_differs(name, &module.name) {
            self.modules.insert(name.to_string(), module.clone());
        }
        module
    }
}

fn resolved_name_differs(requested: &str, resolved: &str) -> bool {
    requested != resolved
}

impl Default for ModuleTable {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_import_specs(program: &Program) -> Vec<ImportSpec> {
    program
        .items
        .iter()
        .filter_map(|item| match item {
            Item::Import(import) => Some(ImportSpec::from(import)),
            _ => None,
        })
        .collect()
}

/// A top-level `FuncDef` marked `exported` is `Public`; every other
/// top-level binding (classes, free variables) is `Private` by default —
/// the grammar in `spec.md` §4.2 only attaches an export marker to
/// functions, so there is no surface form yet for exporting a class or
/// module-level variable, and `Internal` is reserved for a future `export
/// internal` form rather than ever produced today.
fn collect_exports(program: &Program) -> Vec<ExportedSymbol> {
    program
        .items
        .iter()
        .filter_map(|item| match item {
            Item::FuncDef(f) if f.exported => Some(ExportedSymbol {
                name: f.name.clone(),
                visibility: Visibility::Public,
            }),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use orionc_util::Handler;
    use std::io::Write;

    fn write_module(dir: &Path, name: &str, contents: &str) {
        let mut f = std::fs::File::create(dir.join(format!("{name}.l"))).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn loads_a_simple_module() {
        let dir = tempfile::tempdir().unwrap();
        write_module(dir.path(), "math_lib", "module math_lib\nexport func add(a, b) { return a + b; }\n");
        let handler = Handler::new();
        let mut table = ModuleTable::new();
        let m = table.load("math_lib", &[dir.path().to_path_buf()], &handler);
        assert_eq!(m.state, LoadState::Loaded);
        assert_eq!(m.name, "math_lib");
        assert_eq!(m.exports.len(), 1);
        assert_eq!(m.exports[0].name, "add");
        assert!(!handler.has_errors());
    }

    #[test]
    fn missing_module_reports_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let handler = Handler::new();
        let mut table = ModuleTable::new();
        let m = table.load("nope", &[dir.path().to_path_buf()], &handler);
        assert_eq!(m.state, LoadState::Unloaded);
        assert!(handler.has_errors());
    }

    #[test]
    fn circular_import_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        write_module(dir.path(), "a", "module a\nimport b\n");
        write_module(dir.path(), "b", "module b\nimport a\n");
        let handler = Handler::new();
        let mut table = ModuleTable::new();
        let m = table.load("a", &[dir.path().to_path_buf()], &handler);
        assert_eq!(m.state, LoadState::Loaded);
        assert!(handler.has_errors());
    }

    #[test]
    fn cache_hit_skips_reparse_when_digest_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        write_module(dir.path(), "m", "module m\n");
        let handler = Handler::new();
        let mut table = ModuleTable::new();
        let first = table.load("m", &[dir.path().to_path_buf()], &handler);
        let second = table.load("m", &[dir.path().to_path_buf()], &handler);
        assert_eq!(first.name, second.name);
        assert_eq!(first.state, LoadState::Loaded);
        assert_eq!(second.state, LoadState::Loaded);
    }
}
