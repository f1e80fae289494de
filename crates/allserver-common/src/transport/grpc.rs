//! gRPC schema handling and JSON codec.
//!
//! Allserver does not generate code from `.proto` files. Schemas are compiled
//! at runtime with `protox`, inspected with `prost-reflect`, and requests and
//! responses travel through tonic as `serde_json::Value`s transcoded by
//! [`JsonCodec`].
//!
//! Every RPC response message must start with the envelope fields:
//!
//! ```text
//! bool success = 1;
//! string code = 2;
//! string message = 3;
//! ```
//!
//! and a server schema must declare the `Allserver` service with its
//! `introspect` method (see [`MANDATORY_PROTO`]).

use std::path::Path;

use prost::Message;
use prost_reflect::{
    DescriptorPool, DeserializeOptions, DynamicMessage, Kind, MessageDescriptor, MethodDescriptor,
    SerializeOptions,
};
use serde_json::Value;
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::Status;

use crate::protocol::error::{AllserverError, Result};

/// Name of the mandatory introspection service.
pub const ALLSERVER_SERVICE: &str = "Allserver";

/// Name of the mandatory introspection method.
pub const INTROSPECT_METHOD: &str = "introspect";

/// The introspection declarations every server schema must contain.
///
/// Clients use this schema alone for their first call, then rebuild their
/// method table from the `proto` field of the introspection reply.
pub const MANDATORY_PROTO: &str = r#"syntax = "proto3";

service Allserver {
  rpc introspect (IntrospectRequest) returns (IntrospectResponse) {}
}

message IntrospectRequest {}

message IntrospectResponse {
  bool success = 1;
  string code = 2;
  string message = 3;
  string procedures = 4;
  string proto = 5;
}
"#;

/// A compiled `.proto` schema together with its source text.
#[derive(Debug, Clone)]
pub struct ProtoSchema {
    pool: DescriptorPool,
    source: String,
}

impl ProtoSchema {
    /// Compiles a `.proto` file from disk.
    ///
    /// Imports are resolved relative to the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            AllserverError::ProtoSchema(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let file_name = path.file_name().ok_or_else(|| {
            AllserverError::ProtoSchema(format!("Not a .proto file: {}", path.display()))
        })?;
        let include = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        let descriptors = protox::compile([file_name], [include])
            .map_err(|e| AllserverError::ProtoSchema(e.to_string()))?;
        let pool = DescriptorPool::from_file_descriptor_set(descriptors)
            .map_err(|e| AllserverError::ProtoSchema(e.to_string()))?;

        Ok(Self { pool, source })
    }

    /// Compiles `.proto` source text.
    ///
    /// The compiler only reads files, so the source is written to a temporary
    /// file first.
    pub fn from_source(source: &str) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("allserver.proto");
        std::fs::write(&path, source)?;
        Self::load(&path)
    }

    /// The schema declaring only the introspection service.
    pub fn mandatory() -> Result<Self> {
        Self::from_source(MANDATORY_PROTO)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }

    /// Validates a server schema.
    ///
    /// Checks that the `Allserver.introspect` declaration exists and that every
    /// method's response message starts with the envelope fields.
    pub fn validate(&self) -> Result<()> {
        let has_introspection = self
            .pool
            .services()
            .filter(|s| s.name() == ALLSERVER_SERVICE)
            .any(|s| s.methods().any(|m| m.name() == INTROSPECT_METHOD));
        if !has_introspection {
            return Err(AllserverError::ProtoSchema(
                "Server .proto file is missing Allserver mandatory introspection declarations"
                    .into(),
            ));
        }

        for service in self.pool.services() {
            for method in service.methods() {
                check_envelope_fields(&method)?;
            }
        }
        Ok(())
    }

    /// Finds a method by its gRPC request path (`/package.Service/method`).
    ///
    /// The service segment may be either the fully qualified or the short
    /// service name.
    pub fn method_by_path(&self, path: &str) -> Option<MethodDescriptor> {
        let (service_name, method_name) = path.trim_start_matches('/').split_once('/')?;
        self.pool
            .services()
            .filter(|s| s.full_name() == service_name || s.name() == service_name)
            .find_map(|s| s.methods().find(|m| m.name() == method_name))
    }

    /// Finds a procedure method by name, ignoring the introspection service.
    pub fn procedure_method(&self, name: &str) -> Option<MethodDescriptor> {
        self.pool
            .services()
            .filter(|s| s.name() != ALLSERVER_SERVICE)
            .find_map(|s| s.methods().find(|m| m.name() == name))
    }

    /// The introspection method.
    pub fn introspect_method(&self) -> Option<MethodDescriptor> {
        self.pool
            .services()
            .filter(|s| s.name() == ALLSERVER_SERVICE)
            .find_map(|s| s.methods().find(|m| m.name() == INTROSPECT_METHOD))
    }
}

/// The HTTP/2 path of a method: `/package.Service/method`.
pub fn method_path(method: &MethodDescriptor) -> String {
    format!("/{}/{}", method.parent_service().full_name(), method.name())
}

fn check_envelope_fields(method: &MethodDescriptor) -> Result<()> {
    let output = method.output();
    let expected = [
        (1, "success", "bool success = 1"),
        (2, "code", "string code = 2"),
        (3, "message", "string message = 3"),
    ];

    for (number, name, declaration) in expected {
        let ok = output
            .get_field(number)
            .map(|field| {
                let kind_ok = match number {
                    1 => matches!(field.kind(), Kind::Bool),
                    _ => matches!(field.kind(), Kind::String),
                };
                field.name() == name && kind_ok && !field.is_list()
            })
            .unwrap_or(false);

        if !ok {
            return Err(AllserverError::ProtoSchema(format!(
                "Method {} must return \"{}\"",
                method.name(),
                declaration
            )));
        }
    }
    Ok(())
}

/// tonic codec moving `serde_json::Value`s over protobuf.
///
/// Encoding deserializes the JSON into a [`DynamicMessage`] of the outbound
/// type, ignoring fields the message does not declare. Decoding serializes the
/// inbound message back to JSON with proto field names and default values
/// included.
#[derive(Debug, Clone)]
pub struct JsonCodec {
    encode: MessageDescriptor,
    decode: MessageDescriptor,
}

impl JsonCodec {
    /// Codec for serving `method`: decodes its input, encodes its output.
    pub fn for_server(method: &MethodDescriptor) -> Self {
        Self {
            encode: method.output(),
            decode: method.input(),
        }
    }

    /// Codec for calling `method`: encodes its input, decodes its output.
    pub fn for_client(method: &MethodDescriptor) -> Self {
        Self {
            encode: method.input(),
            decode: method.output(),
        }
    }
}

impl Codec for JsonCodec {
    type Encode = Value;
    type Decode = Value;
    type Encoder = JsonEncoder;
    type Decoder = JsonDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        JsonEncoder(self.encode.clone())
    }

    fn decoder(&mut self) -> Self::Decoder {
        JsonDecoder(self.decode.clone())
    }
}

#[derive(Debug, Clone)]
pub struct JsonEncoder(MessageDescriptor);

impl Encoder for JsonEncoder {
    type Item = Value;
    type Error = Status;

    fn encode(&mut self, item: Value, dst: &mut EncodeBuf<'_>) -> std::result::Result<(), Status> {
        let message = json_to_message(&self.0, item)?;
        message
            .encode(dst)
            .map_err(|e| Status::internal(format!("Failed to encode {}: {}", self.0.full_name(), e)))
    }
}

#[derive(Debug, Clone)]
pub struct JsonDecoder(MessageDescriptor);

impl Decoder for JsonDecoder {
    type Item = Value;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> std::result::Result<Option<Value>, Status> {
        let message = DynamicMessage::decode(self.0.clone(), src)
            .map_err(|e| Status::internal(format!("Failed to decode {}: {}", self.0.full_name(), e)))?;
        message_to_json(&message).map(Some)
    }
}

/// Converts a JSON value into a message of type `descriptor`.
pub fn json_to_message(
    descriptor: &MessageDescriptor,
    value: Value,
) -> std::result::Result<DynamicMessage, Status> {
    let options = DeserializeOptions::new().deny_unknown_fields(false);
    DynamicMessage::deserialize_with_options(descriptor.clone(), value, &options).map_err(|e| {
        Status::invalid_argument(format!(
            "Value does not match {}: {}",
            descriptor.full_name(),
            e
        ))
    })
}

/// Converts a message into JSON using proto field names.
pub fn message_to_json(message: &DynamicMessage) -> std::result::Result<Value, Status> {
    let options = SerializeOptions::new()
        .skip_default_fields(false)
        .use_proto_field_name(true);
    message
        .serialize_with_options(serde_json::value::Serializer, &options)
        .map_err(|e| Status::internal(e.to_string()))
}
