use mlua::{Lua, LuaSerdeExt};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TemplateError};
use crate::module::ModuleRegistry;
use crate::sandbox::{create_sandbox, is_lua_identifier};

#[derive(Debug, Clone)]
enum Segment {
    Key(String),
    Index(usize),
}

impl Segment {
    fn key(&self) -> String {
        match self {
            Segment::Key(k) => k.clone(),
            Segment::Index(i) => i.to_string(),
        }
    }
}

#[derive(Debug, Default, PartialEq)]
struct Expression<'a> {
    state: bool,
    temporary: bool,
    body: &'a str,
}

/// True if the whole string is an unescaped `(( ... ))` expression
pub(super) fn is_expression(s: &str) -> bool {
    parse_expression(s).is_some()
}

fn parse_expression(s: &str) -> Option<Expression<'_>> {
    let trimmed = s.trim();
    if !trimmed.starts_with("((") || !trimmed.ends_with("))") || trimmed.len() < 4 {
        return None;
    }
    if trimmed.starts_with("((!") {
        return None;
    }
    let mut expr = Expression {
        body: trimmed[2..trimmed.len() - 2].trim(),
        ..Default::default()
    };
    loop {
        if let Some(rest) = expr.body.strip_prefix("&state") {
            expr.state = true;
            expr.body = rest.trim_start();
        } else if let Some(rest) = expr.body.strip_prefix("&temporary") {
            expr.temporary = true;
            expr.body = rest.trim_start();
        } else {
            return Some(expr);
        }
    }
}

/// Walks a template tree and evaluates its expressions
pub(super) struct Evaluator<'a> {
    name: &'a str,
    lua: Lua,
    prior: Option<&'a Value>,
    determined: Map<String, Value>,
    cancel: &'a CancellationToken,
}

impl<'a> Evaluator<'a> {
    pub(super) fn new(
        name: &'a str,
        binding: &Map<String, Value>,
        prior: Option<&'a Value>,
        modules: &ModuleRegistry,
        cancel: &'a CancellationToken,
    ) -> Result<Self> {
        let lua = create_sandbox()?;
        modules.register_all(&lua)?;

        let globals = lua.globals();
        for (key, value) in binding {
            if is_lua_identifier(key) {
                globals.set(key.as_str(), lua.to_value(value)?)?;
            }
        }
        if let Some(state) = prior {
            globals.set("state", lua.to_value(state)?)?;
        }
        drop(globals);

        Ok(Self {
            name,
            lua,
            prior,
            determined: Map::new(),
            cancel,
        })
    }

    /// Evaluates the template, returning the output and the determined state
    pub(super) fn run(&mut self, template: Value) -> Result<(Value, Option<Value>)> {
        let mut path = Vec::new();
        let result = self.process(template, &mut path)?.unwrap_or(Value::Null);
        let determined = std::mem::take(&mut self.determined);
        let determined = if determined.is_empty() {
            None
        } else {
            Some(Value::Object(determined))
        };
        Ok((result, determined))
    }

    /// Returns `None` for nodes that are removed from the output
    fn process(&mut self, node: Value, path: &mut Vec<Segment>) -> Result<Option<Value>> {
        match node {
            Value::Object(map) => {
                let mut out = Map::new();
                for (key, value) in map {
                    path.push(Segment::Key(key.clone()));
                    let processed = self.process(value, path)?;
                    path.pop();
                    if let Some(value) = processed {
                        out.insert(key, value);
                    }
                }
                Ok(Some(Value::Object(out)))
            }
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (index, value) in items.into_iter().enumerate() {
                    path.push(Segment::Index(index));
                    let processed = self.process(value, path)?;
                    path.pop();
                    if let Some(value) = processed {
                        out.push(value);
                    }
                }
                Ok(Some(Value::Array(out)))
            }
            Value::String(s) => self.process_string(s, path),
            other => Ok(Some(other)),
        }
    }

    fn process_string(&mut self, s: String, path: &[Segment]) -> Result<Option<Value>> {
        let Some(expr) = parse_expression(&s) else {
            if let Some(rest) = s.trim().strip_prefix("((!") {
                return Ok(Some(Value::String(format!("(({}", rest))));
            }
            return Ok(Some(Value::String(s)));
        };

        let kept = if expr.state { self.prior_at(path) } else { None };
        let value = match kept {
            Some(value) => value,
            None => self.evaluate(expr.body)?,
        };
        if expr.state {
            self.record_state(path, value.clone());
        }
        if expr.temporary {
            return Ok(None);
        }
        Ok(Some(value))
    }

    fn evaluate(&self, body: &str) -> Result<Value> {
        if self.cancel.is_cancelled() {
            return Err(TemplateError::Cancelled);
        }
        if body.is_empty() {
            return Ok(Value::Null);
        }
        let to_error = |e: mlua::Error| TemplateError::Expression {
            name: self.name.to_string(),
            expression: body.to_string(),
            message: e.to_string(),
        };
        let value: mlua::Value = self
            .lua
            .load(format!("return {}", body))
            .set_name(format!("template {}", self.name))
            .eval()
            .map_err(to_error)?;
        self.lua.from_value(value).map_err(to_error)
    }

    fn prior_at(&self, path: &[Segment]) -> Option<Value> {
        let mut current = self.prior?;
        for segment in path {
            current = match (segment, current) {
                (Segment::Index(i), Value::Array(items)) => items.get(*i)?,
                (segment, Value::Object(map)) => map.get(&segment.key())?,
                _ => return None,
            };
        }
        match current {
            Value::Null => None,
            value => Some(value.clone()),
        }
    }

    fn record_state(&mut self, path: &[Segment], value: Value) {
        let Some((last, parents)) = path.split_last() else {
            // state marker on the document root
            if let Value::Object(map) = value {
                self.determined.extend(map);
            }
            return;
        };
        let mut current = &mut self.determined;
        for segment in parents {
            let entry = current
                .entry(segment.key())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            current = match entry {
                Value::Object(map) => map,
                _ => return,
            };
        }
        current.insert(last.key(), value);
    }
}
