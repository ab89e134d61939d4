//! Helper functions available to structured-text templates

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use handlebars::{
    Context, Handlebars, Helper, HelperDef, RenderContext, RenderError, RenderErrorReason,
    ScopedJson, handlebars_helper,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use terrace_core::domain::blueprint::Blueprint;

use super::template_source;
use crate::blob::BlobResolver;
use crate::lookup;

/// Maximum number of nested includes of the same file
pub const RECURSION_MAX_NUMS: usize = 100;

handlebars_helper!(upper: |s: str| s.to_uppercase());
handlebars_helper!(lower: |s: str| s.to_lowercase());
handlebars_helper!(trim: |s: str| s.trim().to_string());
handlebars_helper!(to_json: |v: Json| serde_json::to_string(v).unwrap_or_default());
handlebars_helper!(to_yaml: |v: Json| {
    serde_yaml::to_string(v).unwrap_or_default().trim_end().to_string()
});
handlebars_helper!(indent: |n: u64, s: str| {
    let pad = " ".repeat(n as usize);
    s.lines().map(|l| format!("{}{}", pad, l)).collect::<Vec<_>>().join("\n")
});
handlebars_helper!(default_value: |fallback: Json, v: Json| {
    if is_empty(v) { fallback.clone() } else { v.clone() }
});
handlebars_helper!(b64enc: |s: str| STANDARD.encode(s));

fn is_empty(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

fn render_err(message: impl Into<String>) -> RenderError {
    RenderErrorReason::Other(message.into()).into()
}

/// Splits `helper cd key value ...` into the descriptor and its selector
fn descriptor_and_selector(h: &Helper<'_>) -> Result<(Value, Vec<(String, String)>), RenderError> {
    let cd = h
        .param(0)
        .map(|p| p.value().clone())
        .ok_or_else(|| render_err(format!("{}: missing component descriptor", h.name())))?;
    let args = h
        .params()
        .iter()
        .skip(1)
        .map(|p| match p.value() {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>();
    let selector = lookup::selector_pairs(&args).map_err(|e| render_err(e.to_string()))?;
    Ok((cd, selector))
}

/// Integer arithmetic helper that fails on overflow
pub struct Checked {
    name: &'static str,
    op: fn(i64, i64) -> Option<i64>,
}

pub const ADD: Checked = Checked {
    name: "add",
    op: i64::checked_add,
};

pub const SUB: Checked = Checked {
    name: "sub",
    op: i64::checked_sub,
};

impl HelperDef for Checked {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let operand = |idx: usize| {
            h.param(idx)
                .and_then(|p| p.value().as_i64())
                .ok_or_else(|| render_err(format!("{}: parameter {} must be an integer", self.name, idx)))
        };
        let (a, b) = (operand(0)?, operand(1)?);
        let result = (self.op)(a, b)
            .ok_or_else(|| render_err(format!("{}: integer overflow on {} and {}", self.name, a, b)))?;
        Ok(ScopedJson::Derived(Value::from(result)))
    }
}

pub struct B64Dec;

impl HelperDef for B64Dec {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let encoded = h.param(0).and_then(|p| p.value().as_str()).unwrap_or("");
        let decoded = STANDARD
            .decode(encoded)
            .map_err(|e| render_err(format!("b64dec: {}", e)))?;
        let text = String::from_utf8(decoded).map_err(|e| render_err(format!("b64dec: {}", e)))?;
        Ok(ScopedJson::Derived(Value::String(text)))
    }
}

pub struct GetResource;

impl HelperDef for GetResource {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let (cd, selector) = descriptor_and_selector(h)?;
        let resource = lookup::get_resource(&cd, &selector).map_err(|e| render_err(e.to_string()))?;
        Ok(ScopedJson::Derived(resource))
    }
}

pub struct GetComponent {
    pub cd_list: Option<Value>,
}

impl HelperDef for GetComponent {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let (cd, selector) = descriptor_and_selector(h)?;
        let component = lookup::get_component(&cd, self.cd_list.as_ref(), &selector)
            .map_err(|e| render_err(e.to_string()))?;
        Ok(ScopedJson::Derived(component))
    }
}

pub struct GetResourceContent {
    pub blobs: Option<Arc<dyn BlobResolver>>,
}

impl HelperDef for GetResourceContent {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let (cd, selector) = descriptor_and_selector(h)?;
        let data = lookup::get_resource_content(&cd, &selector, self.blobs.as_deref())
            .map_err(|e| render_err(e.to_string()))?;
        Ok(ScopedJson::Derived(Value::String(
            String::from_utf8_lossy(&data).into_owned(),
        )))
    }
}

/// Bookkeeping of the `include` helper for one render
#[derive(Debug, Default)]
pub struct IncludeState {
    included: Mutex<HashMap<String, usize>>,
    exceeded: Mutex<Option<String>>,
}

impl IncludeState {
    /// Name of the include that hit the recursion bound, if any
    pub fn exceeded(&self) -> Option<String> {
        self.exceeded.lock().ok().and_then(|e| e.clone())
    }

    fn enter(&self, name: &str) -> Result<(), RenderError> {
        let mut included = self
            .included
            .lock()
            .map_err(|e| render_err(format!("include: {}", e)))?;
        let count = included.entry(name.to_string()).or_insert(0);
        if *count > RECURSION_MAX_NUMS {
            if let Ok(mut exceeded) = self.exceeded.lock() {
                exceeded.get_or_insert_with(|| name.to_string());
            }
            return Err(render_err(format!(
                "rendering template has a nested reference name: {}",
                name
            )));
        }
        *count += 1;
        Ok(())
    }

    fn leave(&self, name: &str) {
        if let Ok(mut included) = self.included.lock() {
            if let Some(count) = included.get_mut(name) {
                *count = count.saturating_sub(1);
            }
        }
    }
}

/// `include "file" binding` renders another template file of the blueprint
pub struct Include {
    pub blueprint: Arc<Blueprint>,
    pub state: Arc<IncludeState>,
    pub cancel: CancellationToken,
}

impl HelperDef for Include {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        if self.cancel.is_cancelled() {
            return Err(render_err("template execution cancelled"));
        }
        let name = h
            .param(0)
            .and_then(|p| p.value().as_str())
            .ok_or_else(|| render_err("include: expected a file name"))?
            .to_string();
        let binding = h
            .param(1)
            .map(|p| p.value().clone())
            .unwrap_or_else(|| ctx.data().clone());

        self.state.enter(&name)?;
        let rendered = self
            .blueprint
            .read_file(&name)
            .map_err(|e| render_err(format!("unable to read include file {:?}: {}", name, e)))
            .and_then(|data| {
                template_source(&name, &data).map_err(|e| render_err(e.to_string()))
            })
            .and_then(|source| r.render_template(&source, &binding));
        self.state.leave(&name);

        Ok(ScopedJson::Derived(Value::String(rendered?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> Handlebars<'static> {
        let mut hb = Handlebars::new();
        hb.register_escape_fn(handlebars::no_escape);
        hb.register_helper("upper", Box::new(upper));
        hb.register_helper("indent", Box::new(indent));
        hb.register_helper("default", Box::new(default_value));
        hb.register_helper("add", Box::new(ADD));
        hb.register_helper("sub", Box::new(SUB));
        hb.register_helper("b64enc", Box::new(b64enc));
        hb.register_helper("b64dec", Box::new(B64Dec));
        hb.register_helper("toJson", Box::new(to_json));
        hb
    }

    #[test]
    fn test_string_helpers() {
        let hb = registry();
        let out = hb
            .render_template("{{upper name}}|{{indent 2 text}}", &json!({"name": "app", "text": "a\nb"}))
            .unwrap();
        assert_eq!(out, "APP|  a\n  b");
    }

    #[test]
    fn test_default_helper() {
        let hb = registry();
        let out = hb
            .render_template("{{default \"x\" missing}}-{{default \"x\" set}}", &json!({"set": "y"}))
            .unwrap();
        assert_eq!(out, "x-y");
    }

    #[test]
    fn test_base64_round_trip_and_json() {
        let hb = registry();
        let out = hb
            .render_template("{{b64dec (b64enc \"hello\")}} {{toJson obj}} {{add 1 2}}", &json!({"obj": {"a": [1]}}))
            .unwrap();
        assert_eq!(out, r#"hello {"a":[1]} 3"#);
    }

    #[test]
    fn test_arithmetic_overflow_is_an_error() {
        let hb = registry();
        assert_eq!(hb.render_template("{{sub 5 7}}", &json!({})).unwrap(), "-2");

        let err = hb
            .render_template("{{add 9223372036854775807 1}}", &json!({}))
            .unwrap_err();
        assert!(err.to_string().contains("integer overflow"));
        assert!(hb.render_template("{{sub n 1}}", &json!({"n": i64::MIN})).is_err());
        assert!(hb.render_template("{{add \"a\" 1}}", &json!({})).is_err());
    }

    #[test]
    fn test_include_state_bound() {
        let state = IncludeState::default();
        for _ in 0..=RECURSION_MAX_NUMS {
            state.enter("loop.tpl").unwrap();
        }
        assert!(state.enter("loop.tpl").is_err());
        assert_eq!(state.exceeded().as_deref(), Some("loop.tpl"));
    }
}
