//! Stream descriptors and filter chains negotiated during `init_process`
//!
//! The builder callbacks handed to a worker operate on a [`StreamGraph`]
//! installed in a thread-local slot by [`GraphScope`]. Outside of a scope the
//! callbacks return null handles.

use crate::error::{HostError, Result};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::convert::TryFrom;
use std::os::raw::{c_char, c_uint};
use tracing::{error, warn};
use workerlink_abi::marshal::borrow_c_str;
use workerlink_abi::{FilterHandle, StreamDescriptorHandle, StreamKind};

/// A filter node: libavfilter-style name, optional instance label and ordered options
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Filter {
    pub name: String,
    pub label: Option<String>,
    pub parameters: Vec<(String, String)>,
}

impl Filter {
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Render as a filter graph element, e.g. `aformat@aformat_filter=sample_rates=16000:sample_fmts=s32`
    pub fn to_filter_spec(&self) -> String {
        let mut spec = self.name.clone();
        if let Some(label) = &self.label {
            spec.push('@');
            spec.push_str(label);
        }
        if !self.parameters.is_empty() {
            spec.push('=');
            let options: Vec<String> = self
                .parameters
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            spec.push_str(&options.join(":"));
        }
        spec
    }
}

/// An output stream the worker asked for
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamDescriptor {
    pub index: u32,
    pub kind: StreamKind,
    pub filters: Vec<Filter>,
}

impl StreamDescriptor {
    pub fn filter_chain(&self) -> String {
        self.filters
            .iter()
            .map(Filter::to_filter_spec)
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Debug)]
struct FilterNode {
    filter: Filter,
    attached: bool,
}

/// Objects created by one `init_process` call
#[derive(Debug)]
pub struct StreamGraph {
    nb_streams: usize,
    next_handle: u64,
    descriptors: BTreeMap<u64, StreamDescriptor>,
    filters: BTreeMap<u64, FilterNode>,
    violations: Vec<String>,
}

impl StreamGraph {
    pub fn new(nb_streams: usize) -> Self {
        Self {
            nb_streams,
            next_handle: 1,
            descriptors: BTreeMap::new(),
            filters: BTreeMap::new(),
            violations: Vec::new(),
        }
    }

    fn allocate(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn violation(&mut self, message: String) {
        error!("Stream graph violation: {}", message);
        self.violations.push(message);
    }

    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    pub fn new_stream_descriptor(&mut self, index: c_uint, kind: c_uint) -> StreamDescriptorHandle {
        if index as usize >= self.nb_streams {
            self.violation(format!(
                "stream index {} out of range for {} streams",
                index, self.nb_streams
            ));
            return StreamDescriptorHandle::NULL;
        }
        let kind = match StreamKind::try_from(kind) {
            Ok(kind) => kind,
            Err(e) => {
                self.violation(format!("stream {}: {}", index, e));
                return StreamDescriptorHandle::NULL;
            }
        };
        if self.descriptors.values().any(|d| d.index == index) {
            self.violation(format!("stream {} requested twice", index));
            return StreamDescriptorHandle::NULL;
        }

        let handle = self.allocate();
        self.descriptors.insert(
            handle,
            StreamDescriptor {
                index,
                kind,
                filters: Vec::new(),
            },
        );
        StreamDescriptorHandle::from_raw(handle)
    }

    pub fn new_filter(&mut self, name: &str, label: Option<&str>) -> FilterHandle {
        if name.is_empty() {
            self.violation("filter created without a name".to_string());
            return FilterHandle::NULL;
        }
        let handle = self.allocate();
        self.filters.insert(
            handle,
            FilterNode {
                filter: Filter {
                    name: name.to_string(),
                    label: label.filter(|l| !l.is_empty()).map(str::to_string),
                    parameters: Vec::new(),
                },
                attached: false,
            },
        );
        FilterHandle::from_raw(handle)
    }

    pub fn add_filter_parameter(&mut self, filter: FilterHandle, key: &str, value: &str) {
        let outcome = match self.filters.get_mut(&filter.as_raw()) {
            None => Err(format!("parameter '{}' added to unknown {}", key, filter)),
            Some(node) if node.attached => Err(format!(
                "parameter '{}' added to filter '{}' after attachment",
                key, node.filter.name
            )),
            Some(node) => {
                node.filter
                    .parameters
                    .push((key.to_string(), value.to_string()));
                Ok(())
            }
        };
        if let Err(message) = outcome {
            self.violation(message);
        }
    }

    pub fn add_descriptor_filter(&mut self, descriptor: StreamDescriptorHandle, filter: FilterHandle) {
        if !self.descriptors.contains_key(&descriptor.as_raw()) {
            self.violation(format!("filter attached to unknown {}", descriptor));
            return;
        }
        let node = match self.filters.get_mut(&filter.as_raw()) {
            None => {
                self.violation(format!("unknown {} attached", filter));
                return;
            }
            Some(node) if node.attached => {
                let message = format!("filter '{}' attached twice", node.filter.name);
                self.violation(message);
                return;
            }
            Some(node) => node,
        };
        node.attached = true;
        let attached = node.filter.clone();
        if let Some(target) = self.descriptors.get_mut(&descriptor.as_raw()) {
            target.filters.push(attached);
        }
    }

    /// Match the handles returned by the worker against what it created.
    ///
    /// `reported` is the count the worker wrote, which may exceed `returned.len()`
    /// when it claimed more streams than the source has.
    pub fn resolve(
        mut self,
        returned: &[StreamDescriptorHandle],
        reported: usize,
    ) -> Result<Vec<StreamDescriptor>> {
        if reported > self.nb_streams {
            self.violation(format!(
                "{} descriptors returned for {} streams",
                reported, self.nb_streams
            ));
        }

        let mut seen = HashSet::new();
        let mut resolved = Vec::with_capacity(returned.len());
        for handle in returned {
            if !seen.insert(handle.as_raw()) {
                self.violation(format!("{} returned twice", handle));
                continue;
            }
            match self.descriptors.get(&handle.as_raw()) {
                Some(descriptor) => resolved.push(descriptor.clone()),
                None => self.violation(format!("unknown {} returned", handle)),
            }
        }

        for node in self.filters.values().filter(|n| !n.attached) {
            warn!("Filter '{}' was created but never attached", node.filter.name);
        }
        for (handle, descriptor) in &self.descriptors {
            if !seen.contains(handle) {
                warn!(
                    "Descriptor for stream {} was created but not returned",
                    descriptor.index
                );
            }
        }

        if !self.violations.is_empty() {
            return Err(HostError::ContractViolation {
                violations: self.violations,
            });
        }
        Ok(resolved)
    }
}

thread_local! {
    static ACTIVE_GRAPH: RefCell<Option<StreamGraph>> = const { RefCell::new(None) };
}

/// Installs a [`StreamGraph`] for the current thread until finished or dropped
#[derive(Debug)]
pub struct GraphScope {
    finished: bool,
}

impl GraphScope {
    pub fn enter(nb_streams: usize) -> Result<Self> {
        ACTIVE_GRAPH.with(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.is_some() {
                return Err(HostError::InvalidJob(
                    "a stream graph is already being built on this thread".to_string(),
                ));
            }
            *slot = Some(StreamGraph::new(nb_streams));
            Ok(Self { finished: false })
        })
    }

    /// Remove the graph from the thread and hand it back
    pub fn finish(mut self) -> StreamGraph {
        self.finished = true;
        ACTIVE_GRAPH
            .with(|slot| slot.borrow_mut().take())
            .unwrap_or_else(|| StreamGraph::new(0))
    }
}

impl Drop for GraphScope {
    fn drop(&mut self) {
        if !self.finished {
            ACTIVE_GRAPH.with(|slot| slot.borrow_mut().take());
        }
    }
}

fn with_active_graph<T>(operation: &str, fallback: T, f: impl FnOnce(&mut StreamGraph) -> T) -> T {
    ACTIVE_GRAPH.with(|slot| match slot.try_borrow_mut() {
        Ok(mut slot) => match slot.as_mut() {
            Some(graph) => f(graph),
            None => {
                error!("{} called outside of init_process", operation);
                fallback
            }
        },
        Err(_) => {
            error!("{} called re-entrantly", operation);
            fallback
        }
    })
}

pub extern "C" fn new_stream_descriptor(index: c_uint, kind: c_uint) -> StreamDescriptorHandle {
    with_active_graph("new_stream_descriptor", StreamDescriptorHandle::NULL, |graph| {
        graph.new_stream_descriptor(index, kind)
    })
}

pub extern "C" fn new_filter(name: *const c_char, label: *const c_char) -> FilterHandle {
    // SAFETY: the worker passes NUL-terminated strings it keeps alive for the call
    let (name, label) = unsafe { (borrow_c_str(name), borrow_c_str(label)) };
    with_active_graph("new_filter", FilterHandle::NULL, |graph| {
        graph.new_filter(name.as_deref().unwrap_or(""), label.as_deref())
    })
}

pub extern "C" fn add_filter_parameter(filter: FilterHandle, key: *const c_char, value: *const c_char) {
    // SAFETY: as for `new_filter`
    let (key, value) = unsafe { (borrow_c_str(key), borrow_c_str(value)) };
    with_active_graph("add_filter_parameter", (), |graph| match key {
        Some(key) if !key.is_empty() => {
            graph.add_filter_parameter(filter, &key, value.as_deref().unwrap_or(""))
        }
        _ => graph.violation(format!("parameter without a key added to {}", filter)),
    })
}

pub extern "C" fn add_descriptor_filter(descriptor: StreamDescriptorHandle, filter: FilterHandle) {
    with_active_graph("add_descriptor_filter", (), |graph| {
        graph.add_descriptor_filter(descriptor, filter)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aformat() -> Filter {
        Filter {
            name: "aformat".to_string(),
            label: Some("aformat_filter".to_string()),
            parameters: vec![
                ("sample_rates".to_string(), "16000".to_string()),
                ("sample_fmts".to_string(), "s32".to_string()),
                ("channel_layouts".to_string(), "mono".to_string()),
            ],
        }
    }

    #[test]
    fn test_filter_spec_rendering() {
        assert_eq!(
            "aformat@aformat_filter=sample_rates=16000:sample_fmts=s32:channel_layouts=mono",
            aformat().to_filter_spec()
        );
        let bare = Filter {
            name: "anull".to_string(),
            label: None,
            parameters: Vec::new(),
        };
        assert_eq!("anull", bare.to_filter_spec());

        let descriptor = StreamDescriptor {
            index: 1,
            kind: StreamKind::Audio,
            filters: vec![bare, aformat()],
        };
        assert!(descriptor.filter_chain().starts_with("anull,aformat@"));
    }

    #[test]
    fn test_parameters_keep_call_order() {
        let mut graph = StreamGraph::new(2);
        let descriptor = graph.new_stream_descriptor(1, StreamKind::Audio.as_raw());
        let filter = graph.new_filter("aformat", Some("aformat_filter"));
        graph.add_filter_parameter(filter, "sample_rates", "16000");
        graph.add_filter_parameter(filter, "sample_fmts", "s32");
        graph.add_filter_parameter(filter, "channel_layouts", "mono");
        graph.add_descriptor_filter(descriptor, filter);

        let resolved = graph.resolve(&[descriptor], 1).unwrap();
        assert_eq!(1, resolved.len());
        assert_eq!(vec![aformat()], resolved[0].filters);
    }

    #[test]
    fn test_unparametrized_filter_has_no_parameters() {
        let mut graph = StreamGraph::new(1);
        let descriptor = graph.new_stream_descriptor(0, StreamKind::Video.as_raw());
        let filter = graph.new_filter("null", None);
        graph.add_descriptor_filter(descriptor, filter);
        let resolved = graph.resolve(&[descriptor], 1).unwrap();
        assert!(resolved[0].filters[0].parameters.is_empty());
    }

    #[test]
    fn test_violations() {
        let mut graph = StreamGraph::new(2);
        assert!(graph.new_stream_descriptor(2, 0).is_null());
        assert!(graph.new_stream_descriptor(0, 99).is_null());
        let descriptor = graph.new_stream_descriptor(0, 0);
        assert!(graph.new_stream_descriptor(0, 0).is_null());

        let filter = graph.new_filter("scale", None);
        graph.add_descriptor_filter(descriptor, filter);
        graph.add_filter_parameter(filter, "w", "640");
        graph.add_descriptor_filter(descriptor, filter);
        assert_eq!(5, graph.violations().len());

        let err = graph.resolve(&[descriptor], 1).unwrap_err();
        assert!(matches!(err, HostError::ContractViolation { .. }));
    }

    #[test]
    fn test_resolve_rejects_unknown_and_excess_handles() {
        let mut graph = StreamGraph::new(1);
        let descriptor = graph.new_stream_descriptor(0, 1);
        let err = graph
            .resolve(&[descriptor, StreamDescriptorHandle::from_raw(99)], 2)
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("2 descriptors returned for 1 streams"));
        assert!(message.contains("unknown"));
    }

    #[test]
    fn test_callbacks_outside_scope_return_null() {
        assert!(new_stream_descriptor(0, 0).is_null());
        assert!(new_filter(c"aformat".as_ptr(), std::ptr::null()).is_null());
    }

    #[test]
    fn test_scope_routes_callbacks() {
        let scope = GraphScope::enter(1).unwrap();
        assert!(GraphScope::enter(1).is_err());

        let descriptor = new_stream_descriptor(0, StreamKind::Audio.as_raw());
        let filter = new_filter(c"aformat".as_ptr(), c"".as_ptr());
        add_filter_parameter(filter, c"sample_rates".as_ptr(), c"16000".as_ptr());
        add_descriptor_filter(descriptor, filter);

        let graph = scope.finish();
        let resolved = graph.resolve(&[descriptor], 1).unwrap();
        assert_eq!(None, resolved[0].filters[0].label);
        assert_eq!(Some("16000"), resolved[0].filters[0].parameter("sample_rates"));

        assert!(new_stream_descriptor(0, 0).is_null());
    }

    #[test]
    fn test_dropped_scope_clears_graph() {
        {
            let _scope = GraphScope::enter(1).unwrap();
        }
        let scope = GraphScope::enter(3).unwrap();
        drop(scope);
    }
}
