//! Encoding helpers: `json`, `yaml` and `base64`

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use mlua::prelude::*;

use crate::module::TemplateModule;

/// `json.encode(value)` / `json.decode(text)`
pub struct JsonModule;

impl TemplateModule for JsonModule {
    fn id(&self) -> &'static str {
        "json"
    }

    fn register(&self, lua: &Lua) -> LuaResult<()> {
        let table = lua.create_table()?;

        table.set(
            "encode",
            lua.create_function(|lua, value: LuaValue| {
                let value: serde_json::Value = lua.from_value(value)?;
                serde_json::to_string(&value).map_err(LuaError::external)
            })?,
        )?;

        table.set(
            "decode",
            lua.create_function(|lua, text: String| {
                let value: serde_json::Value =
                    serde_json::from_str(&text).map_err(LuaError::external)?;
                lua.to_value(&value)
            })?,
        )?;

        lua.globals().set(self.id(), table)?;
        Ok(())
    }
}

/// `yaml.encode(value)` / `yaml.decode(text)`
pub struct YamlModule;

impl TemplateModule for YamlModule {
    fn id(&self) -> &'static str {
        "yaml"
    }

    fn register(&self, lua: &Lua) -> LuaResult<()> {
        let table = lua.create_table()?;

        table.set(
            "encode",
            lua.create_function(|lua, value: LuaValue| {
                let value: serde_json::Value = lua.from_value(value)?;
                serde_yaml::to_string(&value).map_err(LuaError::external)
            })?,
        )?;

        table.set(
            "decode",
            lua.create_function(|lua, text: String| {
                let value: serde_json::Value =
                    serde_yaml::from_str(&text).map_err(LuaError::external)?;
                lua.to_value(&value)
            })?,
        )?;

        lua.globals().set(self.id(), table)?;
        Ok(())
    }
}

/// `base64.encode(text)` / `base64.decode(text)`
pub struct Base64Module;

impl TemplateModule for Base64Module {
    fn id(&self) -> &'static str {
        "base64"
    }

    fn register(&self, lua: &Lua) -> LuaResult<()> {
        let table = lua.create_table()?;

        table.set(
            "encode",
            lua.create_function(|_, text: LuaString| Ok(STANDARD.encode(&*text.as_bytes())))?,
        )?;

        table.set(
            "decode",
            lua.create_function(|lua, text: String| {
                let data = STANDARD.decode(text).map_err(LuaError::external)?;
                lua.create_string(data)
            })?,
        )?;

        lua.globals().set(self.id(), table)?;
        Ok(())
    }
}
