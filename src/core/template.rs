//! Pipeline template instantiation
//!
//! A pipeline record may reference a template through
//! `use_template`/`args`. Resolution substitutes the arguments into
//! every string leaf of the template tree, injects the caller's name,
//! and repeats while the result still references a template. A
//! resolution stack bounds the recursion: revisiting a template name
//! is a cycle and fails instead of looping.

use serde_yaml::{Mapping, Value};
use std::collections::HashMap;

use crate::core::config::record_name;
use crate::core::{EngineError, SubstContext};

/// Resolves raw pipeline records against a set of templates
pub struct TemplateResolver<'a> {
    templates: &'a [Value],
}

impl<'a> TemplateResolver<'a> {
    pub fn new(templates: &'a [Value]) -> Self {
        Self { templates }
    }

    fn find(&self, name: &str) -> Result<&'a Value, EngineError> {
        self.templates
            .iter()
            .find(|t| t.get("name").and_then(Value::as_str) == Some(name))
            .ok_or_else(|| EngineError::TemplateNotFound(name.to_string()))
    }

    /// Substitute `args` into every string leaf and inject `new_name`
    pub fn instantiate(
        &self,
        template: &Value,
        args: &HashMap<String, String>,
        new_name: &str,
    ) -> Result<Value, EngineError> {
        let ctx = SubstContext::with_base(args.clone());
        let mut record = subst_value(template, &ctx)?;
        if let Value::Mapping(map) = &mut record {
            map.insert(
                Value::String("name".into()),
                Value::String(new_name.into()),
            );
        }
        Ok(record)
    }

    /// Resolve a pipeline record into a fully concrete one
    pub fn resolve(&self, record: &Value) -> Result<Value, EngineError> {
        let mut current = record.clone();
        let mut stack: Vec<String> = Vec::new();

        while let Some(template_name) = current
            .get("use_template")
            .and_then(Value::as_str)
            .map(String::from)
        {
            if stack.contains(&template_name) {
                stack.push(template_name);
                return Err(EngineError::Resolution(format!(
                    "template cycle: {}",
                    stack.join(" -> ")
                )));
            }
            stack.push(template_name.clone());

            let name = record_name(&current, "pipeline")?.to_string();
            let args = extract_args(&current)?;
            let template = self.find(&template_name)?;

            // The instantiated body only carries use_template if the
            // template itself chains to another one, so the loop
            // terminates once a concrete body is reached
            current = self.instantiate(template, &args, &name)?;
        }

        Ok(current)
    }
}

fn extract_args(record: &Value) -> Result<HashMap<String, String>, EngineError> {
    let mut args = HashMap::new();
    match record.get("args") {
        None => {}
        Some(Value::Mapping(map)) => {
            for (key, value) in map {
                let (Some(key), Some(value)) = (key.as_str(), value.as_str()) else {
                    return Err(EngineError::Resolution(
                        "template args must map strings to strings".into(),
                    ));
                };
                args.insert(key.to_string(), value.to_string());
            }
        }
        Some(_) => {
            return Err(EngineError::Resolution(
                "template args must be a mapping".into(),
            ))
        }
    }
    Ok(args)
}

/// Walk a YAML tree, rendering string leaves and preserving structure
fn subst_value(value: &Value, ctx: &SubstContext) -> Result<Value, EngineError> {
    match value {
        Value::String(s) => Ok(Value::String(ctx.render(s)?)),
        Value::Sequence(items) => items
            .iter()
            .map(|item| subst_value(item, ctx))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Sequence),
        Value::Mapping(map) => {
            let mut out = Mapping::new();
            for (key, item) in map {
                out.insert(key.clone(), subst_value(item, ctx)?);
            }
            Ok(Value::Mapping(out))
        }
        other => Ok(other.clone()),
    }
}
