//! YAML templates for object creation (VM sizing, placement, guest ids).
//!
//! A template is `<dir>/<name>.yaml`. A template may name another in an
//! `extends` key; the parent is loaded first and the child is merged over it.

use crate::config::{merge, VsphereConfig};
use crate::error::{VsphereError, VsphereResult};

use log::debug;
use serde::de::DeserializeOwned;
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_TEMPLATE: &str = "default";
const EXTENDS: &str = "extends";

#[derive(Debug, Clone)]
pub struct TemplateLoader {
    dir: PathBuf,
}

impl TemplateLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `template_dir` from the config, else `~/.sorng/templates`.
    pub fn from_config(config: &VsphereConfig) -> VsphereResult<Self> {
        match &config.template_dir {
            Some(dir) => Ok(Self::new(dir)),
            None => dirs::home_dir()
                .map(|h| Self::new(h.join(".sorng").join("templates")))
                .ok_or_else(|| VsphereError::config("No template_dir set and no home directory")),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load `name` (or `default`) with its `extends` chain resolved.
    pub fn load(&self, name: Option<&str>) -> VsphereResult<Value> {
        let name = name.unwrap_or(DEFAULT_TEMPLATE);
        let mut chain: Vec<String> = Vec::new();
        let mut layers = Vec::new();
        let mut next = Some(name.to_string());

        while let Some(current) = next.take() {
            if chain.contains(&current) {
                chain.push(current);
                return Err(VsphereError::config(format!(
                    "Template inheritance cycle: {}",
                    chain.join(" -> ")
                )));
            }
            let mut layer = self.read(&current)?;
            next = match layer.as_mapping_mut().and_then(|m| m.remove(EXTENDS)) {
                Some(Value::String(parent)) => Some(parent),
                Some(Value::Null) | None => None,
                Some(other) => {
                    return Err(VsphereError::config(format!(
                        "Template '{current}': 'extends' must name a template, got {other:?}"
                    )))
                }
            };
            if let Some(parent) = &next {
                debug!("template '{current}' extends '{parent}'");
            }
            chain.push(current);
            layers.push(layer);
        }

        let mut merged = Value::Mapping(Default::default());
        for layer in layers.into_iter().rev() {
            merge(&mut merged, layer);
        }
        Ok(merged)
    }

    /// [`load`](Self::load) and deserialize into `T`.
    pub fn load_as<T: DeserializeOwned>(&self, name: Option<&str>) -> VsphereResult<T> {
        let value = self.load(name)?;
        serde_yaml::from_value(value).map_err(|e| {
            VsphereError::config(format!("Template '{}': {e}", name.unwrap_or(DEFAULT_TEMPLATE)))
        })
    }

    /// Names of every template in the directory, sorted.
    pub fn list(&self) -> VsphereResult<Vec<String>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names: Vec<String> = fs::read_dir(&self.dir)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "yaml"))
            .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }

    fn read(&self, name: &str) -> VsphereResult<Value> {
        let path = self.dir.join(format!("{name}.yaml"));
        if !path.is_file() {
            return Err(VsphereError::not_found(format!(
                "Template '{name}' not found in {}",
                self.dir.display()
            )));
        }
        let text = fs::read_to_string(&path)?;
        let value: Value = serde_yaml::from_str(&text)
            .map_err(|e| VsphereError::config(format!("{}: {e}", path.display())))?;
        match value {
            Value::Mapping(_) => Ok(value),
            Value::Null => Ok(Value::Mapping(Default::default())),
            _ => Err(VsphereError::config(format!(
                "{}: expected a mapping at the top level",
                path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VsphereErrorKind;
    use serde::Deserialize;
    use tempfile::TempDir;

    fn templates(files: &[(&str, &str)]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, text) in files {
            fs::write(dir.path().join(format!("{name}.yaml")), text).unwrap();
        }
        dir
    }

    #[test]
    fn default_template_when_unnamed() {
        let dir = templates(&[("default", "memory_mb: 1024\nnum_cpus: 1\n")]);
        let loader = TemplateLoader::new(dir.path());
        let t = loader.load(None).unwrap();
        assert_eq!(t["memory_mb"].as_i64(), Some(1024));
    }

    #[test]
    fn child_overrides_parent_through_extends() {
        let dir = templates(&[
            ("default", "memory_mb: 512\nnum_cpus: 1\ndisk:\n  size_kb: 8388608\n  thin: true\n"),
            ("web", "extends: default\nmemory_mb: 2048\ndisk:\n  size_kb: 20971520\n"),
            ("web-large", "extends: web\nnum_cpus: 4\n"),
        ]);
        let t = TemplateLoader::new(dir.path()).load(Some("web-large")).unwrap();

        assert_eq!(t["num_cpus"].as_i64(), Some(4));
        assert_eq!(t["memory_mb"].as_i64(), Some(2048));
        assert_eq!(t["disk"]["size_kb"].as_i64(), Some(20971520));
        assert_eq!(t["disk"]["thin"].as_bool(), Some(true));
        assert!(t.get("extends").is_none());
    }

    #[test]
    fn typed_template() {
        #[derive(Deserialize)]
        struct VmTemplate {
            guest_id: String,
            memory_mb: i64,
            datastore: Option<String>,
        }
        let dir = templates(&[
            ("default", "guest_id: otherGuest\nmemory_mb: 512\n"),
            ("linux", "extends: default\nguest_id: rhel9_64Guest\n"),
        ]);
        let t: VmTemplate = TemplateLoader::new(dir.path()).load_as(Some("linux")).unwrap();
        assert_eq!(t.guest_id, "rhel9_64Guest");
        assert_eq!(t.memory_mb, 512);
        assert!(t.datastore.is_none());
    }

    #[test]
    fn missing_template_is_not_found() {
        let dir = templates(&[("child", "extends: ghost\n")]);
        let loader = TemplateLoader::new(dir.path());
        assert!(loader.load(Some("nope")).unwrap_err().is_not_found());
        let err = loader.load(Some("child")).unwrap_err();
        assert!(err.is_not_found());
        assert!(err.message.contains("ghost"));
    }

    #[test]
    fn extends_cycle_is_config_error() {
        let dir = templates(&[("a", "extends: b\n"), ("b", "extends: a\n")]);
        let err = TemplateLoader::new(dir.path()).load(Some("a")).unwrap_err();
        assert_eq!(err.kind, VsphereErrorKind::ConfigError);
        assert!(err.message.contains("a -> b -> a"));
    }

    #[test]
    fn lists_yaml_files_sorted() {
        let dir = templates(&[("web", "{}"), ("default", "{}"), ("db", "{}")]);
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        let loader = TemplateLoader::new(dir.path());
        assert_eq!(loader.list().unwrap(), ["db", "default", "web"]);
        assert!(TemplateLoader::new(dir.path().join("absent")).list().unwrap().is_empty());
    }

    #[test]
    fn configured_directory_is_used() {
        let config = VsphereConfig {
            template_dir: Some(PathBuf::from("/srv/templates")),
            ..VsphereConfig::default()
        };
        let loader = TemplateLoader::from_config(&config).unwrap();
        assert_eq!(loader.dir(), Path::new("/srv/templates"));
    }
}
