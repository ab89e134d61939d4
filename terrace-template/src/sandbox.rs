//! Lua sandbox for declarative-merge expressions
//!
//! Expressions only compute values. The sandbox has no I/O, no access to the
//! host environment and cannot load code from outside the template.

use mlua::{Lua, LuaOptions, Result as LuaResult, StdLib};

/// Create a restricted Lua sandbox
///
/// This sandbox includes only basic Lua functionality (tables, strings, math,
/// utf8) and does NOT include any I/O capabilities or the ability to load
/// external code. Helper modules are registered by the caller.
///
/// # Example
/// ```no_run
/// use terrace_template::sandbox::create_sandbox;
///
/// let lua = create_sandbox()?;
/// let replicas: i64 = lua.load("return 2 * 3").eval()?;
/// assert_eq!(replicas, 6);
/// # Ok::<(), mlua::Error>(())
/// ```
pub fn create_sandbox() -> LuaResult<Lua> {
    // Only allow: TABLE, STRING, MATH, UTF8
    // Explicitly exclude: IO, OS, PACKAGE, DEBUG, COROUTINE
    let lua = unsafe {
        Lua::unsafe_new_with(
            StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8,
            LuaOptions::default(),
        )
    };

    // Remove globals that load or run code
    lua.globals().set("require", mlua::Nil)?;
    lua.globals().set("dofile", mlua::Nil)?;
    lua.globals().set("loadfile", mlua::Nil)?;
    lua.globals().set("load", mlua::Nil)?;

    Ok(lua)
}

/// True if `name` can be bound as a Lua global
pub fn is_lua_identifier(name: &str) -> bool {
    const KEYWORDS: &[&str] = &[
        "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "goto", "if",
        "in", "local", "nil", "not", "or", "repeat", "return", "then", "true", "until", "while",
    ];
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    valid_start
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !KEYWORDS.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_basic_lua() {
        let lua = create_sandbox().unwrap();

        let result: i32 = lua
            .load(
                r#"
                local t = {a = 1, b = 2}
                return t.a + t.b
            "#,
            )
            .eval()
            .unwrap();
        assert_eq!(result, 3);

        let result: String = lua.load(r#"return string.upper("hello")"#).eval().unwrap();
        assert_eq!(result, "HELLO");

        let result: f64 = lua.load(r#"return math.sqrt(16)"#).eval().unwrap();
        assert_eq!(result, 4.0);
    }

    #[test]
    fn test_sandbox_no_io() {
        let lua = create_sandbox().unwrap();

        let has_io: bool = lua.load(r#"return io ~= nil"#).eval().unwrap();
        assert!(!has_io);

        let has_os: bool = lua.load(r#"return os ~= nil"#).eval().unwrap();
        assert!(!has_os);
    }

    #[test]
    fn test_sandbox_no_code_loading() {
        let lua = create_sandbox().unwrap();

        let result: LuaResult<()> = lua.load(r#"require("os")"#).exec();
        assert!(result.is_err());

        let result: LuaResult<()> = lua.load(r#"load("return 1")()"#).exec();
        assert!(result.is_err());
    }

    #[test]
    fn test_lua_identifiers() {
        assert!(is_lua_identifier("imports"));
        assert!(is_lua_identifier("_x1"));
        assert!(!is_lua_identifier("1x"));
        assert!(!is_lua_identifier("my-value"));
        assert!(!is_lua_identifier("end"));
        assert!(!is_lua_identifier(""));
    }
}
