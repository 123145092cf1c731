//! Scalar value nodes. Their `name` makes them parameters of the remote workflow.

use std::sync::Arc;

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;

use falbridge_domain::{
    InputSpec, InputType, NodeError, NodeInputs, NodeOutput, NodeSchema, NodeValue, ValueType,
};

use super::{ExecutionContext, NodeHandler, NodeRegistry};

const CATEGORY: &str = "fal";
const SHORT_ID_LEN: usize = 8;

/// Eight random characters from `[a-z0-9]`, used in default parameter names.
pub fn random_short_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .map(|b| char::from(b).to_ascii_lowercase())
        .take(SHORT_ID_LEN)
        .collect()
}

fn name_input(prefix: &str) -> InputSpec {
    InputSpec::required(
        "name",
        InputType::string(format!("{prefix}_{}", random_short_id())),
    )
}

fn schema(kind: &str, display_name: &str, value: InputSpec, output: ValueType, prefix: &str) -> NodeSchema {
    NodeSchema {
        kind: kind.to_string(),
        display_name: display_name.to_string(),
        category: CATEGORY.to_string(),
        inputs: vec![name_input(prefix), value],
        outputs: vec![output],
        output_node: false,
    }
}

/// Emits the value of one input unchanged.
struct ValueNode {
    field: &'static str,
    output: ValueType,
}

#[async_trait]
impl NodeHandler for ValueNode {
    async fn run(
        &self,
        inputs: NodeInputs,
        _context: &ExecutionContext,
    ) -> Result<NodeOutput, NodeError> {
        let value = match self.output {
            ValueType::Int => NodeValue::Int(inputs.int(self.field)?),
            ValueType::Float => NodeValue::Float(inputs.float(self.field)?),
            ValueType::Boolean => NodeValue::Boolean(inputs.boolean(self.field)?),
            // Combo options are filled in by the host UI, so the value may be absent.
            ValueType::Combo if !inputs.contains(self.field) => NodeValue::String(String::new()),
            _ => NodeValue::String(inputs.string(self.field)?.to_string()),
        };
        Ok(NodeOutput::single(value))
    }
}

pub fn register(registry: &mut NodeRegistry) {
    let integer = InputType::Int {
        default: 0,
        min: Some(-(1 << 31)),
        max: Some((1 << 31) - 1),
        step: Some(1),
    };
    let float = InputType::Float {
        default: 0.0,
        min: Some(-2_147_483_648.0),
        max: Some(2_147_483_648.0),
        step: Some(0.1),
    };

    let nodes = [
        (
            schema(
                "IntegerInput_fal",
                "Integer Input (fal)",
                InputSpec::required("number", integer),
                ValueType::Int,
                "int",
            ),
            "number",
        ),
        (
            schema(
                "FloatInput_fal",
                "Float Input (fal)",
                InputSpec::required("number", float),
                ValueType::Float,
                "float",
            ),
            "number",
        ),
        (
            schema(
                "BooleanInput_fal",
                "Boolean Input (fal)",
                InputSpec::required("value", InputType::Boolean { default: false }),
                ValueType::Boolean,
                "bool",
            ),
            "value",
        ),
        (
            schema(
                "StringInput_fal",
                "String Input (fal)",
                InputSpec::required("value", InputType::string("")),
                ValueType::String,
                "str",
            ),
            "value",
        ),
        (
            schema(
                "ComboInput_fal",
                "Combo Input (fal)",
                InputSpec::optional("value", InputType::combo(&[], None)),
                ValueType::Combo,
                "combo",
            ),
            "value",
        ),
    ];

    for (schema, field) in nodes {
        let output = schema.outputs[0];
        registry.register(schema, Arc::new(ValueNode { field, output }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> NodeRegistry {
        let mut registry = NodeRegistry::new();
        register(&mut registry);
        registry
    }

    #[test]
    fn short_ids_are_lowercase_alphanumeric() {
        let id = random_short_id();
        assert_eq!(id.len(), 8);
        assert!(id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn default_names_carry_kind_prefix() {
        let registry = registry();
        let schema = &registry.get("FloatInput_fal").expect("registered").schema;
        match &schema.inputs[0].input_type {
            InputType::String { default, .. } => {
                assert!(default.starts_with("float_"));
                assert_eq!(default.len(), "float_".len() + 8);
            }
            other => panic!("unexpected name input {other:?}"),
        }
        assert_eq!(schema.display_name, "Float Input (fal)");
    }

    #[tokio::test]
    async fn emits_given_value() {
        let output = registry()
            .invoke(
                "IntegerInput_fal",
                NodeInputs::new().with("number", NodeValue::Int(42)),
                &ExecutionContext::default(),
            )
            .await
            .expect("runs");
        assert_eq!(output.values, vec![NodeValue::Int(42)]);
    }

    #[tokio::test]
    async fn absent_values_use_defaults() {
        let registry = registry();
        let ctx = ExecutionContext::default();

        let boolean = registry
            .invoke("BooleanInput_fal", NodeInputs::new(), &ctx)
            .await
            .expect("runs");
        assert_eq!(boolean.values, vec![NodeValue::Boolean(false)]);

        let combo = registry
            .invoke("ComboInput_fal", NodeInputs::new(), &ctx)
            .await
            .expect("runs");
        assert_eq!(combo.values, vec![NodeValue::String(String::new())]);
    }

    #[tokio::test]
    async fn wrong_value_type_is_reported() {
        let result = registry()
            .invoke(
                "StringInput_fal",
                NodeInputs::new().with("value", NodeValue::Int(1)),
                &ExecutionContext::default(),
            )
            .await;
        assert!(matches!(result, Err(NodeError::TypeMismatch { .. })));
    }
}
