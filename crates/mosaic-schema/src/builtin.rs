use crate::fragment::PriorityBounds;
use crate::module::{parse_module_str, Module, ModuleError};
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BuiltinModule {
    pub name: &'static str,
    pub description: &'static str,
    pub source: &'static str,
}

impl BuiltinModule {
    pub fn load(&self, bounds: &PriorityBounds) -> Result<Module, ModuleError> {
        parse_module_str(self.source, self.name, bounds)
    }
}

pub const BUILTIN_MODULES: &[BuiltinModule] = &[
    BuiltinModule {
        name: "media",
        description: "Media tooling: ffmpeg with the Rust toolchain enabled",
        source: r#"module_version = 1
name = "media"

[[fragment]]
id = "packages"
set = ["ffmpeg"]

[[fragment]]
id = "languages.rust.enable"
enable = true
"#,
    },
    BuiltinModule {
        name: "rust",
        description: "Rust toolchain packages, installed when languages.rust.enable is set",
        source: r#"module_version = 1
name = "rust"

[[fragment]]
id = "languages.rust.enable"
enable = false
priority = 1000

[[fragment]]
id = "languages.rust.channel"
scalar = "stable"
priority = 1000

[[fragment]]
id = "packages"
when = "languages.rust.enable"
set = ["cargo", "clippy", "rustc", "rustfmt"]
"#,
    },
    BuiltinModule {
        name: "shell",
        description: "Fallback interactive shell and editor environment",
        source: r#"module_version = 1
name = "shell"

[[fragment]]
id = "shell"
scalar = "bash"
priority = 1000

[[fragment]]
id = "env"
mapping = { EDITOR = "vi", PAGER = "less" }
priority = 1000
"#,
    },
    BuiltinModule {
        name: "minimal",
        description: "Contributes nothing",
        source: r#"module_version = 1
name = "minimal"
"#,
    },
];

pub fn get_builtin(name: &str) -> Option<&'static BuiltinModule> {
    BUILTIN_MODULES.iter().find(|m| m.name == name)
}

pub fn list_builtins() -> &'static [BuiltinModule] {
    BUILTIN_MODULES
}
