//! Variable-declaration document for the declarative engine.
//!
//! Each top-level field of a resource message other than `api_version`,
//! `kind` and `status` becomes one `variable` block whose type expression
//! mirrors the field's schema.

use crate::catalog::ResourceKind;
use crate::descriptor::{
    is_metadata_message, is_opaque_message, FieldDescriptor, FieldKind, SchemaError, SchemaSet,
};
use crate::tfvars::quote;
use std::fmt::Write;

/// Top-level fields never exposed as engine variables.
pub const SKIPPED_TOP_LEVEL: &[&str] = &["api_version", "kind", "status"];

const DEFAULT_DESCRIPTIONS: &[(&str, &str)] = &[
    ("metadata", "Metadata for the resource, including name and labels"),
    ("spec", "Specification for Deployment Component"),
];

pub fn variables_document(kind: &ResourceKind, schema: &SchemaSet) -> Result<String, SchemaError> {
    let message_name = kind.message_name();
    let message = schema.message(message_name)?;
    let mut blocks = Vec::new();
    for field in &message.fields {
        if SKIPPED_TOP_LEVEL.contains(&field.name.as_str()) {
            continue;
        }
        let mut walker = Walker {
            schema,
            expanding: vec![message_name.to_owned()],
        };
        let type_expr = walker.type_expr(field, message_name, 1)?;
        let description = field
            .description
            .clone()
            .or_else(|| {
                DEFAULT_DESCRIPTIONS
                    .iter()
                    .find(|(name, _)| *name == field.name)
                    .map(|(_, d)| (*d).to_owned())
            })
            .unwrap_or_else(|| format!("Description for {}", field.name));
        blocks.push(format!(
            "variable \"{}\" {{\n  description = {}\n  type = {}\n}}",
            field.name,
            quote(&description),
            type_expr
        ));
    }
    let mut doc = blocks.join("\n\n");
    doc.push('\n');
    Ok(doc)
}

struct Walker<'a> {
    schema: &'a SchemaSet,
    /// Messages on the current expansion path.
    expanding: Vec<String>,
}

impl Walker<'_> {
    fn type_expr(
        &mut self,
        field: &FieldDescriptor,
        owner: &str,
        depth: usize,
    ) -> Result<String, SchemaError> {
        let element = match field.element_kind() {
            FieldKind::String | FieldKind::Bytes | FieldKind::Enum => "string".to_owned(),
            FieldKind::Bool => "bool".to_owned(),
            FieldKind::Int32
            | FieldKind::Int64
            | FieldKind::Uint32
            | FieldKind::Uint64
            | FieldKind::Float
            | FieldKind::Double => "number".to_owned(),
            FieldKind::Message => {
                let type_name = field.require_type_name(owner)?;
                if is_opaque_message(type_name) {
                    "string".to_owned()
                } else if self.expanding.iter().any(|m| m == type_name) {
                    tracing::debug!("{owner}.{} refers back to {type_name}", field.name);
                    "string".to_owned()
                } else {
                    self.object_expr(type_name, depth)?
                }
            }
            kind @ (FieldKind::Map | FieldKind::Group) => {
                return Err(SchemaError::UnsupportedFieldKind {
                    message: owner.to_owned(),
                    field: field.name.clone(),
                    kind: kind.as_str().to_owned(),
                })
            }
        };
        Ok(if field.kind == FieldKind::Map {
            format!("map({element})")
        } else if field.repeated {
            format!("list({element})")
        } else {
            element
        })
    }

    fn object_expr(&mut self, message_name: &str, depth: usize) -> Result<String, SchemaError> {
        let message = self.schema.message(message_name)?;
        let hide_version = is_metadata_message(message_name);
        let fields: Vec<&FieldDescriptor> = message
            .fields
            .iter()
            .filter(|f| !(hide_version && f.name == "version"))
            .collect();
        if fields.is_empty() {
            return Ok("object({})".to_owned());
        }

        self.expanding.push(message_name.to_owned());
        let indent = "  ".repeat(depth + 1);
        let mut out = String::from("object({\n");
        for (i, field) in fields.iter().enumerate() {
            if let Some(description) = &field.description {
                if i > 0 {
                    out.push('\n');
                }
                for line in description.lines() {
                    let _ = writeln!(out, "{indent}# {}", line.trim_end());
                }
            }
            let expr = self.type_expr(field, message_name, depth + 1)?;
            let _ = writeln!(out, "{indent}{} = {expr}", field.name);
        }
        let _ = write!(out, "{}}})", "  ".repeat(depth));
        self.expanding.pop();
        Ok(out)
    }
}
