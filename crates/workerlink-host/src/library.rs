//! A loaded worker library and its resolved entry points

use crate::callbacks;
use crate::description::{validate_semver, WorkerDescription};
use crate::error::{HostError, Result};
use crate::loader::library_path_from_env;
use abi_stable::library::RawLibrary;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Once;
use tracing::debug;
use workerlink_abi::abi::{
    symbols, EndingProcessFn, GetParametersFn, GetParametersSizeFn, GetStringFn, InitFn,
    InitProcessFn, ProcessFn, ProcessFrameFn,
};
use workerlink_abi::marshal::borrow_c_str;
use workerlink_abi::{ParameterDescriptor, ParameterKind, RawParameterDescriptor};

/// Which lifecycle a worker implements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerKind {
    /// Exports `process`
    Generic,
    /// Exports `init_process`, `process_frame` and `ending_process`
    Media,
}

/// Entry points of a worker
#[derive(Clone, Copy)]
pub struct WorkerSymbols {
    pub get_name: GetStringFn,
    pub get_short_description: GetStringFn,
    pub get_description: GetStringFn,
    pub get_version: GetStringFn,
    pub get_parameters_size: GetParametersSizeFn,
    pub get_parameters: GetParametersFn,
    pub init: Option<InitFn>,
    pub init_process: Option<InitProcessFn>,
    pub process_frame: Option<ProcessFrameFn>,
    pub ending_process: Option<EndingProcessFn>,
    pub process: Option<ProcessFn>,
}

impl fmt::Debug for WorkerSymbols {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerSymbols")
            .field("init", &self.init.is_some())
            .field("init_process", &self.init_process.is_some())
            .field("process_frame", &self.process_frame.is_some())
            .field("ending_process", &self.ending_process.is_some())
            .field("process", &self.process.is_some())
            .finish()
    }
}

impl WorkerSymbols {
    /// Look up every symbol in `library`.
    ///
    /// # Safety
    ///
    /// The library's exports must have the signatures declared in `workerlink_abi::abi`.
    pub unsafe fn resolve(library: &RawLibrary, path: &Path) -> Result<Self> {
        unsafe fn required<T: Copy>(library: &RawLibrary, path: &Path, name: &str) -> Result<T> {
            optional(library, name).ok_or_else(|| HostError::MissingSymbol {
                path: path.to_path_buf(),
                symbol: name.to_string(),
            })
        }

        unsafe fn optional<T: Copy>(library: &RawLibrary, name: &str) -> Option<T> {
            let symbol = format!("{}\0", name);
            library.get::<T>(symbol.as_bytes()).ok().map(|s| *s)
        }

        Ok(Self {
            get_name: required(library, path, symbols::GET_NAME)?,
            get_short_description: required(library, path, symbols::GET_SHORT_DESCRIPTION)?,
            get_description: required(library, path, symbols::GET_DESCRIPTION)?,
            get_version: required(library, path, symbols::GET_VERSION)?,
            get_parameters_size: required(library, path, symbols::GET_PARAMETERS_SIZE)?,
            get_parameters: required(library, path, symbols::GET_PARAMETERS)?,
            init: optional(library, symbols::INIT),
            init_process: optional(library, symbols::INIT_PROCESS),
            process_frame: optional(library, symbols::PROCESS_FRAME),
            ending_process: optional(library, symbols::ENDING_PROCESS),
            process: optional(library, symbols::PROCESS),
        })
    }

    /// Classify the symbol set. A library exporting `init_process` must export the
    /// rest of the media lifecycle; any other library must export `process`.
    pub fn kind(&self, path: &Path) -> Result<WorkerKind> {
        let missing = |symbol: &str| HostError::MissingSymbol {
            path: path.to_path_buf(),
            symbol: symbol.to_string(),
        };
        if self.init_process.is_some() {
            if self.process_frame.is_none() {
                return Err(missing(symbols::PROCESS_FRAME));
            }
            if self.ending_process.is_none() {
                return Err(missing(symbols::ENDING_PROCESS));
            }
            return Ok(WorkerKind::Media);
        }
        if self.process.is_some() {
            Ok(WorkerKind::Generic)
        } else {
            Err(missing(symbols::PROCESS))
        }
    }
}

/// A worker ready to run jobs
pub struct WorkerLibrary {
    path: PathBuf,
    symbols: WorkerSymbols,
    kind: WorkerKind,
    initialized: Once,
    // Dropped last so the resolved function pointers never dangle
    _library: Option<RawLibrary>,
}

impl WorkerLibrary {
    /// Load the dynamic library at `path`
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading worker from: {}", path.display());
        let library = RawLibrary::load_at(path).map_err(|e| HostError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        // SAFETY: a workerlink library exports the declared signatures
        let symbols = unsafe { WorkerSymbols::resolve(&library, path)? };
        let kind = symbols.kind(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            symbols,
            kind,
            initialized: Once::new(),
            _library: Some(library),
        })
    }

    /// Load the library named by `WORKER_LIBRARY_FILE`, or the default library name
    pub fn from_env() -> Result<Self> {
        Self::load(&library_path_from_env())
    }

    /// Wrap entry points that are already linked into the process
    pub fn from_symbols(symbols: WorkerSymbols) -> Result<Self> {
        let path = PathBuf::from("<linked>");
        let kind = symbols.kind(&path)?;
        Ok(Self {
            path,
            symbols,
            kind,
            initialized: Once::new(),
            _library: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> WorkerKind {
        self.kind
    }

    pub fn is_media(&self) -> bool {
        self.kind == WorkerKind::Media
    }

    pub fn is_generic(&self) -> bool {
        self.kind == WorkerKind::Generic
    }

    pub(crate) fn symbols(&self) -> &WorkerSymbols {
        &self.symbols
    }

    fn read_string(getter: GetStringFn) -> String {
        // SAFETY: descriptor getters return module-static strings or null
        unsafe { borrow_c_str(getter()) }
            .map(|s| s.into_owned())
            .unwrap_or_default()
    }

    pub fn name(&self) -> String {
        Self::read_string(self.symbols.get_name)
    }

    pub fn short_description(&self) -> String {
        Self::read_string(self.symbols.get_short_description)
    }

    pub fn description(&self) -> String {
        Self::read_string(self.symbols.get_description)
    }

    pub fn version(&self) -> String {
        Self::read_string(self.symbols.get_version)
    }

    /// Read the declared parameter table
    pub fn parameters(&self) -> Result<Vec<ParameterDescriptor>> {
        let invalid = |message: String| HostError::InvalidDescriptor {
            worker: self.name(),
            message,
        };

        // SAFETY: the buffer holds exactly `size` slots, as the contract requires
        let raw = unsafe {
            let size = (self.symbols.get_parameters_size)() as usize;
            let mut buffer = vec![RawParameterDescriptor::empty(); size];
            (self.symbols.get_parameters)(buffer.as_mut_ptr());
            buffer
        };

        let mut parameters = Vec::with_capacity(raw.len());
        for (position, entry) in raw.iter().enumerate() {
            // SAFETY: descriptor strings live in module-static storage
            let identifier = unsafe { borrow_c_str(entry.identifier) }
                .map(|s| s.into_owned())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| invalid(format!("parameter {} has no identifier", position)))?;
            let label = unsafe { borrow_c_str(entry.label) }
                .map(|s| s.into_owned())
                .unwrap_or_default();

            if entry.kind_size == 0 || entry.kind.is_null() {
                return Err(invalid(format!("parameter '{}' declares no kind", identifier)));
            }
            let mut kinds = Vec::with_capacity(entry.kind_size);
            for i in 0..entry.kind_size {
                let kind = unsafe { borrow_c_str(*entry.kind.add(i)) }.unwrap_or_default();
                let kind: ParameterKind = kind
                    .parse()
                    .map_err(|e: workerlink_abi::AbiError| invalid(format!("parameter '{}': {}", identifier, e)))?;
                kinds.push(kind);
            }

            if parameters
                .iter()
                .any(|p: &ParameterDescriptor| p.identifier == identifier)
            {
                return Err(invalid(format!("parameter '{}' declared twice", identifier)));
            }
            parameters.push(ParameterDescriptor {
                identifier,
                label,
                kinds,
                required: entry.required != 0,
            });
        }
        Ok(parameters)
    }

    /// Identity and parameters, with the version checked against SemVer
    pub fn describe(&self) -> Result<WorkerDescription> {
        let name = self.name();
        if name.is_empty() {
            return Err(HostError::InvalidDescriptor {
                worker: self.path.display().to_string(),
                message: "worker exports no name".to_string(),
            });
        }
        let version = self.version();
        validate_semver(&version).map_err(|message| HostError::InvalidVersion {
            worker: name.clone(),
            version: version.clone(),
            message,
        })?;
        Ok(WorkerDescription {
            name,
            short_description: self.short_description(),
            description: self.description(),
            version,
            kind: self.kind,
            parameters: self.parameters()?,
        })
    }

    /// Call the worker's `init` once per loaded library
    pub fn ensure_initialized(&self) {
        self.initialized.call_once(|| {
            if let Some(init) = self.symbols.init {
                debug!("Initializing worker {}", self.path.display());
                // SAFETY: `init` only receives the host logger
                unsafe { init(callbacks::logger) };
            }
        });
    }
}

impl fmt::Debug for WorkerLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerLibrary")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("symbols", &self.symbols)
            .finish()
    }
}
