//! Layered substitution context and `{key}` template rendering
//!
//! Rendering walks the template once: `{key}` is replaced by the
//! innermost layer that defines `key`, `{{` and `}}` produce literal
//! braces. A key defined in no layer is a hard error, never silently
//! left in place.

use crate::core::EngineError;
use std::collections::HashMap;

/// Stack of substitution maps, outermost first
#[derive(Debug, Clone, Default)]
pub struct SubstContext {
    layers: Vec<HashMap<String, String>>,
}

impl SubstContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context with a single base layer
    pub fn with_base(base: HashMap<String, String>) -> Self {
        Self { layers: vec![base] }
    }

    /// Push a layer that shadows everything pushed before it
    pub fn push(&mut self, layer: HashMap<String, String>) {
        self.layers.push(layer);
    }

    /// Clone-and-push, for handing a narrowed context to a callee
    pub fn pushed(&self, layer: HashMap<String, String>) -> Self {
        let mut next = self.clone();
        next.push(layer);
        next
    }

    /// Look a key up, innermost layer first
    pub fn get(&self, key: &str) -> Option<&str> {
        self.layers
            .iter()
            .rev()
            .find_map(|layer| layer.get(key).map(String::as_str))
    }

    /// Collapse the layers into a single map (innermost wins)
    pub fn flatten(&self) -> HashMap<String, String> {
        let mut merged = HashMap::new();
        for layer in &self.layers {
            for (k, v) in layer {
                merged.insert(k.clone(), v.clone());
            }
        }
        merged
    }

    /// Render a template, resolving every `{key}` placeholder
    pub fn render(&self, template: &str) -> Result<String, EngineError> {
        let mut out = String::with_capacity(template.len());
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    if chars.peek() == Some(&'{') {
                        chars.next();
                        out.push('{');
                        continue;
                    }
                    let mut key = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) => key.push(c),
                            None => {
                                return Err(EngineError::Resolution(format!(
                                    "unterminated placeholder '{{{}' in \"{}\"",
                                    key, template
                                )))
                            }
                        }
                    }
                    match self.get(&key) {
                        Some(value) => out.push_str(value),
                        None => return Err(EngineError::MissingKey(key)),
                    }
                }
                '}' => {
                    if chars.peek() == Some(&'}') {
                        chars.next();
                    }
                    out.push('}');
                }
                c => out.push(c),
            }
        }

        Ok(out)
    }

    /// Render each line of a script body independently, so one bad line
    /// reports the offending line rather than the whole script
    pub fn render_lines(&self, body: &str) -> Result<String, EngineError> {
        let mut rendered = Vec::new();
        for line in body.lines() {
            rendered.push(self.render(line)?);
        }
        Ok(rendered.join("\n"))
    }
}
