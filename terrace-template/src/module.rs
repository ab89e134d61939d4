use mlua::prelude::*;

/// A Lua helper module available to `(( ... ))` expressions.
///
/// # Example
///
/// ```rust
/// use terrace_template::TemplateModule;
/// use mlua::prelude::*;
///
/// struct StringsModule;
///
/// impl TemplateModule for StringsModule {
///     fn id(&self) -> &'static str {
///         "strings"
///     }
///
///     fn register(&self, lua: &Lua) -> LuaResult<()> {
///         let table = lua.create_table()?;
///         table.set("upper", lua.create_function(|_, s: String| Ok(s.to_uppercase()))?)?;
///         lua.globals().set(self.id(), table)?;
///         Ok(())
///     }
/// }
/// ```
pub trait TemplateModule: Send + Sync {
    /// Name of the global table the module registers, e.g. `json`
    fn id(&self) -> &'static str;

    /// Registers the module's functions into the Lua context.
    ///
    /// # Errors
    /// Returns `LuaError` if registration fails
    fn register(&self, lua: &Lua) -> LuaResult<()>;
}

/// Helper modules loaded into every expression sandbox
///
/// Modules are registered in order; a module replaces an earlier one with
/// the same id.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: Vec<Box<dyn TemplateModule>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<M: TemplateModule + 'static>(&mut self, module: M) {
        let id = module.id();
        self.modules.retain(|m| m.id() != id);
        self.modules.push(Box::new(module));
    }

    pub fn get(&self, id: &str) -> Option<&dyn TemplateModule> {
        self.modules
            .iter()
            .find(|m| m.id() == id)
            .map(|m| m.as_ref())
    }

    /// Registers all modules into a Lua context
    ///
    /// # Errors
    /// Returns the first error encountered during registration
    pub fn register_all(&self, lua: &Lua) -> LuaResult<()> {
        for module in &self.modules {
            module.register(lua)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ConstModule(i64);

    impl TemplateModule for ConstModule {
        fn id(&self) -> &'static str {
            "consts"
        }

        fn register(&self, lua: &Lua) -> LuaResult<()> {
            let table = lua.create_table()?;
            table.set("value", self.0)?;
            lua.globals().set(self.id(), table)?;
            Ok(())
        }
    }

    #[test]
    fn test_later_module_replaces_earlier() {
        let mut registry = ModuleRegistry::new();
        registry.register(ConstModule(1));
        registry.register(ConstModule(42));
        assert!(registry.get("consts").is_some());
        assert!(registry.get("nonexistent").is_none());

        let lua = Lua::new();
        registry.register_all(&lua).unwrap();
        let value: i64 = lua.load("return consts.value").eval().unwrap();
        assert_eq!(value, 42);
    }
}
