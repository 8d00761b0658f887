//! # External Tool Resolver
//!
//! Finds the encoder binaries the pipeline shells out to:
//! - an explicit override per tool (`FFMPEG_PATH`, `CWEBP_PATH`, ...)
//! - a bundled tools directory (`TOOLS_DIR`, flat or `<os>/` layout)
//! - the system `PATH`

use crate::error::OptimizeError;
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const FFMPEG: &str = "ffmpeg";
pub const CWEBP: &str = "cwebp";

/// Tool path resolver for system and bundled installs
#[derive(Debug, Clone, Default)]
pub struct ToolResolver {
    tools_dir: Option<PathBuf>,
}

impl ToolResolver {
    /// Resolver configured from the environment
    pub fn from_env() -> Self {
        Self {
            tools_dir: env::var_os("TOOLS_DIR").map(PathBuf::from),
        }
    }

    pub fn with_tools_dir(tools_dir: impl Into<PathBuf>) -> Self {
        Self {
            tools_dir: Some(tools_dir.into()),
        }
    }

    /// Environment variable that overrides a tool's location, e.g. `FFMPEG_PATH`
    pub fn override_var(tool_name: &str) -> String {
        format!("{}_PATH", tool_name.to_ascii_uppercase().replace('-', "_"))
    }

    /// Resolve the path to a specific tool
    pub fn resolve(&self, tool_name: &str) -> Option<PathBuf> {
        if let Some(path) = env::var_os(Self::override_var(tool_name)).map(PathBuf::from) {
            if path.is_file() {
                debug!("Using {} from {}: {:?}", tool_name, Self::override_var(tool_name), path);
                return Some(path);
            }
            debug!("Ignoring {} override, not a file: {:?}", tool_name, path);
        }

        if let Some(ref tools_dir) = self.tools_dir {
            if let Some(path) = Self::bundled_tool_path(tools_dir, tool_name) {
                debug!("Using bundled tool: {} -> {:?}", tool_name, path);
                return Some(path);
            }
        }

        match which::which(tool_name) {
            Ok(path) => {
                debug!("Using system tool: {} -> {:?}", tool_name, path);
                Some(path)
            }
            Err(_) => None,
        }
    }

    /// Resolve or fail with `MissingDependency`
    pub fn require(&self, tool_name: &str, purpose: &str) -> Result<PathBuf, OptimizeError> {
        self.resolve(tool_name).ok_or_else(|| {
            OptimizeError::MissingDependency(format!(
                "{} is required for {} (install it, or set {} / TOOLS_DIR)",
                tool_name,
                purpose,
                Self::override_var(tool_name)
            ))
        })
    }

    fn bundled_tool_path(tools_dir: &Path, tool_name: &str) -> Option<PathBuf> {
        let file_name = format!("{}{}", tool_name, env::consts::EXE_SUFFIX);
        [
            tools_dir.join(&file_name),
            tools_dir.join(env::consts::OS).join(&file_name),
            tools_dir.join(env::consts::OS).join(tool_name).join(&file_name),
        ]
        .into_iter()
        .find(|path| path.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_override_var_name() {
        assert_eq!(ToolResolver::override_var("ffmpeg"), "FFMPEG_PATH");
        assert_eq!(ToolResolver::override_var("some-tool"), "SOME_TOOL_PATH");
    }

    #[test]
    fn test_bundled_tool_is_found() {
        let temp_dir = TempDir::new().unwrap();
        let name = "portfolio-test-encoder";
        let nested = temp_dir.path().join(env::consts::OS);
        std::fs::create_dir_all(&nested).unwrap();
        let binary = nested.join(format!("{}{}", name, env::consts::EXE_SUFFIX));
        std::fs::write(&binary, b"#!/bin/sh\n").unwrap();

        let resolver = ToolResolver::with_tools_dir(temp_dir.path());
        assert_eq!(resolver.resolve(name), Some(binary));
    }

    #[test]
    fn test_unknown_tool_is_missing_dependency() {
        let resolver = ToolResolver::default();
        let err = resolver
            .require("definitely-not-an-installed-encoder", "testing")
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("definitely-not-an-installed-encoder"));
    }
}
