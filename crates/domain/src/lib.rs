//! falbridge domain types.
//!
//! Pure data and rules shared by the bridge: the host's workflow graph, the
//! named-input and media-loader node kinds, the remote payload, and node
//! schemas. Nothing here performs I/O.

pub mod error;
pub mod image;
pub mod media;
pub mod named_input;
pub mod node_schema;
pub mod payload;
pub mod workflow;

pub use error::{NodeRef, WorkflowError};
pub use image::{ImageBatch, ImageBatchError, RgbImage};
pub use media::MediaKind;
pub use named_input::{collect_named_inputs, NamedInput, NamedInputKind};
pub use node_schema::{
    AppliedLora, InputSpec, InputType, ModelHandle, NodeError, NodeInputs, NodeOutput,
    NodeSchema, NodeValue, ValueType,
};
pub use payload::{ExtraData, InputOrigin, Payload, UploadedFile, DRY_RUN_FILE_URL};
pub use workflow::{InputKey, InputLink, NodeSpec, WorkflowGraph};
