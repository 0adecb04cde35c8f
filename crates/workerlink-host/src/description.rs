//! What a loaded worker says about itself

use crate::library::WorkerKind;
use schemars::schema::{InstanceType, RootSchema, Schema, SchemaObject, SingleOrVec};
use semver::Version;
use serde::Serialize;
use serde_json::Value;
use workerlink_abi::{ParameterDescriptor, ParameterKind};

const JSON_SCHEMA_DRAFT_07: &str = "http://json-schema.org/draft-07/schema#";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerDescription {
    pub name: String,
    pub short_description: String,
    pub description: String,
    pub version: String,
    pub kind: WorkerKind,
    pub parameters: Vec<ParameterDescriptor>,
}

fn instance_type(kind: ParameterKind) -> InstanceType {
    match kind {
        ParameterKind::String | ParameterKind::Credential => InstanceType::String,
        ParameterKind::ArrayOfStrings | ParameterKind::Requirements => InstanceType::Array,
        ParameterKind::Boolean => InstanceType::Boolean,
        ParameterKind::Integer => InstanceType::Integer,
    }
}

fn parameter_schema(parameter: &ParameterDescriptor) -> SchemaObject {
    let mut types: Vec<InstanceType> = Vec::new();
    for kind in &parameter.kinds {
        let instance = instance_type(*kind);
        if !types.contains(&instance) {
            types.push(instance);
        }
    }
    if !parameter.required {
        types.push(InstanceType::Null);
    }
    let is_array = types.contains(&InstanceType::Array);

    let mut object = SchemaObject {
        instance_type: Some(match types.len() {
            1 => SingleOrVec::Single(Box::new(types[0])),
            _ => SingleOrVec::Vec(types),
        }),
        ..Default::default()
    };
    object.metadata().title = Some(parameter.label.clone());
    if is_array {
        let items = SchemaObject {
            instance_type: Some(InstanceType::String.into()),
            ..Default::default()
        };
        object.array().items = Some(Schema::Object(items).into());
    }
    object
}

impl WorkerDescription {
    /// Draft-07 JSON Schema describing the accepted job parameters.
    ///
    /// Optional parameters also accept `null`.
    pub fn parameters_root_schema(&self) -> RootSchema {
        let mut schema = SchemaObject {
            instance_type: Some(InstanceType::Object.into()),
            ..Default::default()
        };
        schema.metadata().title = Some(self.name.clone());

        let validation = schema.object();
        for parameter in &self.parameters {
            validation.properties.insert(
                parameter.identifier.clone(),
                Schema::Object(parameter_schema(parameter)),
            );
            if parameter.required {
                validation.required.insert(parameter.identifier.clone());
            }
        }

        RootSchema {
            meta_schema: Some(JSON_SCHEMA_DRAFT_07.to_string()),
            schema,
            definitions: Default::default(),
        }
    }

    /// [`WorkerDescription::parameters_root_schema`] as a JSON value
    pub fn parameters_schema(&self) -> Value {
        serde_json::to_value(self.parameters_root_schema()).unwrap_or(Value::Null)
    }
}

/// Parse `version` as SemVer 2.0
pub fn validate_semver(version: &str) -> Result<Version, String> {
    Version::parse(version).map_err(|e| e.to_string())
}
