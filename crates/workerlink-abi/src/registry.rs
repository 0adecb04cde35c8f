//! Immutable descriptor table published by a worker library

use crate::abi::RawParameterDescriptor;
use crate::error::AbiError;
use crate::marshal::to_c_string;
use crate::parameter::ParameterDescriptor;
use std::collections::HashSet;
use std::ffi::CString;
use std::os::raw::{c_char, c_uint};

/// Static identity of a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerManifest {
    pub name: String,
    pub short_description: String,
    pub description: String,
    pub version: String,
    pub parameters: Vec<ParameterDescriptor>,
}

impl WorkerManifest {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            short_description: String::new(),
            description: String::new(),
            version: version.into(),
            parameters: Vec::new(),
        }
    }

    pub fn short_description(mut self, value: impl Into<String>) -> Self {
        self.short_description = value.into();
        self
    }

    pub fn description(mut self, value: impl Into<String>) -> Self {
        self.description = value.into();
        self
    }

    pub fn parameter(mut self, parameter: ParameterDescriptor) -> Self {
        self.parameters.push(parameter);
        self
    }
}

struct ParameterEntry {
    _identifier: CString,
    _label: CString,
    _kinds: Vec<CString>,
    _kind_ptrs: Vec<*const c_char>,
}

/// C-compatible view of a [`WorkerManifest`], built once and never mutated.
///
/// Every pointer handed out points into heap buffers owned by this value, so the
/// registry must live as long as the library is loaded (the export macros keep
/// it in a `static`).
pub struct DescriptorRegistry {
    manifest: WorkerManifest,
    name: CString,
    short_description: CString,
    description: CString,
    version: CString,
    _entries: Vec<ParameterEntry>,
    raw: Vec<RawParameterDescriptor>,
}

// SAFETY: the raw pointers reference buffers owned by `self` that are never
// written after construction.
unsafe impl Send for DescriptorRegistry {}
unsafe impl Sync for DescriptorRegistry {}

impl DescriptorRegistry {
    pub fn new(manifest: WorkerManifest) -> Result<Self, AbiError> {
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(manifest.parameters.len());
        let mut raw = Vec::with_capacity(manifest.parameters.len());

        for parameter in &manifest.parameters {
            parameter.validate()?;
            if !seen.insert(parameter.identifier.as_str()) {
                return Err(AbiError::InvalidParameter {
                    identifier: parameter.identifier.clone(),
                    reason: "declared more than once".to_string(),
                });
            }

            let identifier = to_c_string(&parameter.identifier)?;
            let label = to_c_string(&parameter.label)?;
            let kinds = parameter
                .kinds
                .iter()
                .map(|kind| to_c_string(kind.as_str()))
                .collect::<Result<Vec<_>, _>>()?;
            let kind_ptrs: Vec<*const c_char> = kinds.iter().map(|k| k.as_ptr()).collect();

            raw.push(RawParameterDescriptor {
                identifier: identifier.as_ptr(),
                label: label.as_ptr(),
                kind_size: kind_ptrs.len(),
                kind: kind_ptrs.as_ptr(),
                required: parameter.required as i32,
            });
            entries.push(ParameterEntry {
                _identifier: identifier,
                _label: label,
                _kinds: kinds,
                _kind_ptrs: kind_ptrs,
            });
        }

        Ok(Self {
            name: to_c_string(&manifest.name)?,
            short_description: to_c_string(&manifest.short_description)?,
            description: to_c_string(&manifest.description)?,
            version: to_c_string(&manifest.version)?,
            manifest,
            _entries: entries,
            raw,
        })
    }

    pub fn manifest(&self) -> &WorkerManifest {
        &self.manifest
    }

    pub fn name(&self) -> *const c_char {
        self.name.as_ptr()
    }

    pub fn short_description(&self) -> *const c_char {
        self.short_description.as_ptr()
    }

    pub fn description(&self) -> *const c_char {
        self.description.as_ptr()
    }

    pub fn version(&self) -> *const c_char {
        self.version.as_ptr()
    }

    pub fn parameters_size(&self) -> c_uint {
        self.raw.len() as c_uint
    }

    /// Copy the descriptor table into a caller-provided buffer.
    ///
    /// # Safety
    ///
    /// `buffer` must be valid for `parameters_size()` writes. A null buffer is ignored.
    pub unsafe fn write_parameters(&self, buffer: *mut RawParameterDescriptor) {
        if buffer.is_null() {
            return;
        }
        std::ptr::copy_nonoverlapping(self.raw.as_ptr(), buffer, self.raw.len());
    }
}

impl std::fmt::Debug for DescriptorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorRegistry")
            .field("manifest", &self.manifest)
            .finish()
    }
}
