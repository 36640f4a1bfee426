//! Language profiles for compilation and execution

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

/// Languages the worker can judge, with their protocol codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    C,
    Cpp,
    Java,
    Go,
}

impl Language {
    pub const ALL: [Language; 4] = [Language::C, Language::Cpp, Language::Java, Language::Go];

    /// Name used for `[languages.<name>]` config sections
    pub fn name(self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Java => "java",
            Language::Go => "go",
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Language::C),
            1 => Some(Language::Cpp),
            2 => Some(Language::Java),
            3 => Some(Language::Go),
            _ => None,
        }
    }

    fn builtin_profile(self) -> LanguageProfile {
        match self {
            Language::C => LanguageProfile::new(
                "main.c",
                &["gcc", "-g", "-Wall", "-o", "main", "main.c"],
                &["./main"],
            ),
            Language::Cpp => LanguageProfile::new(
                "main.cpp",
                &["g++", "-g", "-Wall", "-o", "main", "main.cpp"],
                &["./main"],
            ),
            Language::Java => {
                LanguageProfile::new("Main.java", &["javac", "Main.java"], &["java", "Main"])
            }
            Language::Go => LanguageProfile::new(
                "main.go",
                &["go", "build", "-o", "main", "main.go"],
                &["./main"],
            ),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// How to build and run a submission in one language
#[derive(Debug, Clone, PartialEq)]
pub struct LanguageProfile {
    /// Name of the source file (e.g., "main.cpp")
    pub source_file: String,
    /// Compile command, program first
    pub compile_command: Vec<String>,
    /// Run command, program first
    pub run_command: Vec<String>,
}

impl LanguageProfile {
    pub fn new(source_file: &str, compile_command: &[&str], run_command: &[&str]) -> Self {
        Self {
            source_file: source_file.to_string(),
            compile_command: compile_command.iter().map(|s| s.to_string()).collect(),
            run_command: run_command.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Raw TOML override for a language; unset fields keep the built-in value
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawLanguageConfig {
    pub source_file: Option<String>,
    pub compile_command: Option<String>,
    pub run_command: Option<String>,
}

/// Lookup table from language to profile
#[derive(Debug, Clone)]
pub struct LanguageTable {
    profiles: HashMap<Language, LanguageProfile>,
}

impl LanguageTable {
    /// Build the table from the built-in profiles plus config overrides
    pub fn with_overrides(overrides: &HashMap<String, RawLanguageConfig>) -> anyhow::Result<Self> {
        for name in overrides.keys() {
            if !Language::ALL.iter().any(|lang| lang.name() == name.to_lowercase()) {
                anyhow::bail!("Unknown language in config: {}", name);
            }
        }

        let mut table = Self::default();
        for (name, raw) in overrides {
            let Some(profile) = Language::ALL
                .iter()
                .find(|lang| lang.name() == name.to_lowercase())
                .and_then(|lang| table.profiles.get_mut(lang))
            else {
                continue;
            };

            if let Some(source_file) = &raw.source_file {
                profile.source_file = source_file.clone();
            }
            if let Some(cmd) = &raw.compile_command {
                profile.compile_command = into_command(cmd);
            }
            if let Some(cmd) = &raw.run_command {
                profile.run_command = into_command(cmd);
            }
            if profile.compile_command.is_empty() || profile.run_command.is_empty() {
                anyhow::bail!("Empty command for language {}", name);
            }
        }

        Ok(table)
    }

    pub fn profile(&self, language: Language) -> Option<&LanguageProfile> {
        self.profiles.get(&language)
    }
}

impl Default for LanguageTable {
    fn default() -> Self {
        let profiles = Language::ALL
            .iter()
            .map(|&lang| (lang, lang.builtin_profile()))
            .collect();
        Self { profiles }
    }
}

fn into_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_codes() {
        assert_eq!(Language::from_code(0), Some(Language::C));
        assert_eq!(Language::from_code(3), Some(Language::Go));
        assert_eq!(Language::from_code(7), None);
    }

    #[test]
    fn test_builtin_profiles() {
        let table = LanguageTable::default();
        let java = table.profile(Language::Java).unwrap();
        assert_eq!(java.source_file, "Main.java");
        assert_eq!(java.run_command, vec!["java", "Main"]);

        let cpp = table.profile(Language::Cpp).unwrap();
        assert_eq!(cpp.compile_command[0], "g++");
        assert_eq!(cpp.run_command, vec!["./main"]);
    }

    #[test]
    fn test_overrides_from_toml() {
        let content = r#"
[cpp]
compile_command = "g++ -O2 -std=c++17 -o main main.cpp"

[GO]
run_command = "./main --fast"
"#;
        let raw: HashMap<String, RawLanguageConfig> = toml::from_str(content).unwrap();
        let table = LanguageTable::with_overrides(&raw).unwrap();

        let cpp = table.profile(Language::Cpp).unwrap();
        assert_eq!(cpp.compile_command[1], "-O2");
        assert_eq!(cpp.source_file, "main.cpp");
        assert_eq!(
            table.profile(Language::Go).unwrap().run_command,
            vec!["./main", "--fast"]
        );
    }

    #[test]
    fn test_no_overrides_keeps_builtin_table() {
        let table = LanguageTable::with_overrides(&HashMap::new()).unwrap();
        let builtin = LanguageTable::default();
        for lang in Language::ALL {
            assert_eq!(table.profile(lang), builtin.profile(lang));
        }
    }

    #[test]
    fn test_empty_command_override_rejected() {
        let raw = HashMap::from([(
            "java".to_string(),
            RawLanguageConfig {
                run_command: Some("  ".to_string()),
                ..RawLanguageConfig::default()
            },
        )]);
        assert!(LanguageTable::with_overrides(&raw).is_err());
    }

    #[test]
    fn test_unknown_override_rejected() {
        let mut raw = HashMap::new();
        raw.insert("cobol".to_string(), RawLanguageConfig::default());
        assert!(LanguageTable::with_overrides(&raw).is_err());
    }
}
