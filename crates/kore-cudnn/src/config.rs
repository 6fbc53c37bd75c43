//! Where to look for the cuDNN shared library.

use std::ffi::OsString;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Environment variable holding a PATH-style list of directories searched first.
pub const CUDNN_DIR_ENV: &str = "KORE_CUDNN_DIR";

/// Environment variable naming an explicit library file (name or full path).
pub const CUDNN_LIB_ENV: &str = "KORE_CUDNN_LIB";

/// Library search configuration.
///
/// Every name is first tried inside each of `search_dirs`, then bare so the
/// platform loader can resolve it through its own search path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Directories searched before the system loader path.
    pub search_dirs: Vec<PathBuf>,

    /// Library file names, most preferred first.
    pub lib_names: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            search_dirs: Vec::new(),
            lib_names: default_lib_names(),
        }
    }
}

fn default_lib_names() -> Vec<String> {
    let names: &[&str] = if cfg!(target_os = "windows") {
        &["cudnn64_9.dll", "cudnn64_8.dll", "cudnn64_7.dll"]
    } else if cfg!(target_os = "macos") {
        &["libcudnn.dylib"]
    } else {
        &["libcudnn.so", "libcudnn.so.9", "libcudnn.so.8", "libcudnn.so.7"]
    };
    names.iter().map(|s| s.to_string()).collect()
}

impl LoaderConfig {
    /// Defaults overridden by `KORE_CUDNN_DIR` / `KORE_CUDNN_LIB`.
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var_os(CUDNN_DIR_ENV),
            std::env::var(CUDNN_LIB_ENV).ok(),
        )
    }

    fn from_vars(dirs: Option<OsString>, lib: Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(dirs) = dirs {
            config.search_dirs = std::env::split_paths(&dirs)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
        }
        if let Some(lib) = lib.filter(|l| !l.is_empty()) {
            config.lib_names.retain(|n| *n != lib);
            config.lib_names.insert(0, lib);
        }
        config
    }

    /// Prepend a directory to the search list.
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dirs.insert(0, dir.into());
        self
    }

    /// Ordered, de-duplicated list of paths handed to the loader.
    pub fn candidates(&self) -> Vec<PathBuf> {
        let mut out: Vec<PathBuf> = Vec::new();
        let in_dirs = self
            .search_dirs
            .iter()
            .flat_map(|dir| self.lib_names.iter().map(move |name| dir.join(name)));
        let bare = self.lib_names.iter().map(PathBuf::from);
        for path in in_dirs.chain(bare) {
            if !out.contains(&path) {
                out.push(path);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_names() {
        let config = LoaderConfig::default();
        assert!(config.search_dirs.is_empty());
        assert!(!config.lib_names.is_empty());
        #[cfg(target_os = "linux")]
        assert_eq!(config.lib_names[0], "libcudnn.so");
    }

    #[test]
    fn test_candidates_order() {
        let config = LoaderConfig {
            search_dirs: vec![
                PathBuf::from("/opt/cudnn/lib"),
                PathBuf::from("/usr/local/cuda/lib64"),
            ],
            lib_names: vec!["libcudnn.so".into(), "libcudnn.so.8".into()],
        };
        let c = config.candidates();
        assert_eq!(
            c,
            vec![
                PathBuf::from("/opt/cudnn/lib/libcudnn.so"),
                PathBuf::from("/opt/cudnn/lib/libcudnn.so.8"),
                PathBuf::from("/usr/local/cuda/lib64/libcudnn.so"),
                PathBuf::from("/usr/local/cuda/lib64/libcudnn.so.8"),
                PathBuf::from("libcudnn.so"),
                PathBuf::from("libcudnn.so.8"),
            ]
        );
    }

    #[test]
    fn test_candidates_dedup_absolute_name() {
        let config = LoaderConfig {
            search_dirs: vec![PathBuf::from("/a"), PathBuf::from("/b")],
            lib_names: vec!["/x/libcudnn.so".into()],
        };
        // Joining an absolute name replaces the directory.
        assert_eq!(config.candidates(), vec![PathBuf::from("/x/libcudnn.so")]);
    }

    #[test]
    fn test_from_vars() {
        let dirs = std::env::join_paths(["/opt/cudnn", "/usr/lib/cudnn"]).unwrap();
        let config = LoaderConfig::from_vars(Some(dirs), Some("libcudnn.so.8".into()));
        assert_eq!(
            config.search_dirs,
            vec![PathBuf::from("/opt/cudnn"), PathBuf::from("/usr/lib/cudnn")]
        );
        assert_eq!(config.lib_names[0], "libcudnn.so.8");
        assert_eq!(
            config.lib_names.iter().filter(|n| *n == "libcudnn.so.8").count(),
            1
        );
    }

    #[test]
    fn test_from_vars_empty() {
        let config = LoaderConfig::from_vars(None, Some(String::new()));
        assert_eq!(config, LoaderConfig::default());
    }

    #[test]
    fn test_with_dir() {
        let config = LoaderConfig::default().with_dir("/first");
        assert_eq!(config.search_dirs, vec![PathBuf::from("/first")]);
        assert!(config.candidates()[0].starts_with("/first"));
    }

    #[test]
    fn test_serde_defaults() {
        let config: LoaderConfig =
            serde_json::from_str(r#"{"search_dirs": ["/opt/cudnn"]}"#).unwrap();
        assert_eq!(config.search_dirs, vec![PathBuf::from("/opt/cudnn")]);
        assert_eq!(config.lib_names, LoaderConfig::default().lib_names);

        let json = serde_json::to_string(&config).unwrap();
        let back: LoaderConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
