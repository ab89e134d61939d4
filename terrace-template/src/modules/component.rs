//! Component descriptor lookups for expressions
//!
//! Registers `get_resource(cd, key, value, ...)`, `get_component(...)` and
//! `get_resource_content(...)` as globals, and the same functions under the
//! `component` table.

use mlua::prelude::*;
use mlua::Variadic;
use serde_json::Value;
use std::sync::Arc;

use crate::blob::BlobResolver;
use crate::lookup;
use crate::module::TemplateModule;

pub struct ComponentModule {
    cd_list: Arc<Option<Value>>,
    blobs: Option<Arc<dyn BlobResolver>>,
}

impl ComponentModule {
    /// # Arguments
    /// * `cd_list` - Generic form of the component descriptor list, if any
    /// * `blobs` - Resolver used by `get_resource_content`
    pub fn new(cd_list: Option<Value>, blobs: Option<Arc<dyn BlobResolver>>) -> Self {
        Self {
            cd_list: Arc::new(cd_list),
            blobs,
        }
    }
}

fn lookup_args(lua: &Lua, cd: LuaValue, args: Variadic<String>) -> LuaResult<(Value, Vec<(String, String)>)> {
    let cd: Value = lua.from_value(cd)?;
    let args: Vec<String> = args.into_iter().collect();
    let selector = lookup::selector_pairs(&args).map_err(LuaError::external)?;
    Ok((cd, selector))
}

impl TemplateModule for ComponentModule {
    fn id(&self) -> &'static str {
        "component"
    }

    fn register(&self, lua: &Lua) -> LuaResult<()> {
        let table = lua.create_table()?;

        let get_resource = lua.create_function(|lua, (cd, args): (LuaValue, Variadic<String>)| {
            let (cd, selector) = lookup_args(lua, cd, args)?;
            let resource = lookup::get_resource(&cd, &selector).map_err(LuaError::external)?;
            lua.to_value(&resource)
        })?;

        let cd_list = self.cd_list.clone();
        let get_component =
            lua.create_function(move |lua, (cd, args): (LuaValue, Variadic<String>)| {
                let (cd, selector) = lookup_args(lua, cd, args)?;
                let component = lookup::get_component(&cd, (*cd_list).as_ref(), &selector)
                    .map_err(LuaError::external)?;
                lua.to_value(&component)
            })?;

        let blobs = self.blobs.clone();
        let get_resource_content =
            lua.create_function(move |lua, (cd, args): (LuaValue, Variadic<String>)| {
                let (cd, selector) = lookup_args(lua, cd, args)?;
                let data = lookup::get_resource_content(&cd, &selector, blobs.as_deref())
                    .map_err(LuaError::external)?;
                lua.create_string(data)
            })?;

        table.set("get_resource", get_resource.clone())?;
        table.set("get_component", get_component.clone())?;
        table.set("get_resource_content", get_resource_content.clone())?;

        let globals = lua.globals();
        globals.set("get_resource", get_resource)?;
        globals.set("get_component", get_component)?;
        globals.set("get_resource_content", get_resource_content)?;
        globals.set(self.id(), table)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::create_sandbox;
    use serde_json::json;

    #[test]
    fn test_component_lookups() {
        let lua = create_sandbox().unwrap();
        let list = json!({"components": [
            {"component": {"name": "example.com/db", "version": "2.0.0", "resources": []}}
        ]});
        ComponentModule::new(Some(list), None).register(&lua).unwrap();

        let cd = json!({"component": {
            "name": "example.com/app",
            "version": "1.0.0",
            "resources": [{"name": "chart", "type": "helm", "access": {}}],
            "componentReferences": [
                {"name": "db", "componentName": "example.com/db", "version": "2.0.0"}
            ]
        }});
        lua.globals().set("cd", lua.to_value(&cd).unwrap()).unwrap();

        let kind: String = lua
            .load(r#"return get_resource(cd, "name", "chart").type"#)
            .eval()
            .unwrap();
        assert_eq!(kind, "helm");

        let version: String = lua
            .load(r#"return component.get_component(cd, "name", "db").component.version"#)
            .eval()
            .unwrap();
        assert_eq!(version, "2.0.0");

        assert!(lua.load(r#"return get_resource(cd, "name")"#).exec().is_err());
        assert!(
            lua.load(r#"return get_resource_content(cd, "name", "chart")"#)
                .exec()
                .is_err()
        );
    }
}
