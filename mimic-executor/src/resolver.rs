//! Integration `uri` → handler module resolution.
//!
//! Functions live in `<functions-dir>/<name>/` next to a `function.json`
//! descriptor:
//!
//! ```json
//! { "handler": "index.handler", "timeout": 6, "memorySize": 128 }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::SandboxError;

/// Descriptor file looked up in each function directory.
pub const DESCRIPTOR_FILE: &str = "function.json";

const DEFAULT_MEMORY_MB: u32 = 128;

/// A handler ready to be invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct ResolvedHandler {
    /// Module file to load.
    pub path: PathBuf,
    /// Export to call.
    pub function_name: String,
    /// Descriptor timeout, if it declares one.
    pub timeout: Option<Duration>,
    pub memory_size: u32,
}

impl ResolvedHandler {
    /// A handler with no declared timeout and the default memory size.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, function_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            function_name: function_name.into(),
            timeout: None,
            memory_size: DEFAULT_MEMORY_MB,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_memory_size(mut self, memory_size: u32) -> Self {
        self.memory_size = memory_size;
        self
    }
}

/// Maps an integration `uri` to a handler.
pub trait HandlerResolver: Send + Sync {
    /// # Errors
    /// Returns [`SandboxError::HandlerNotFound`] for unknown functions and
    /// [`SandboxError::InvalidDescriptor`] for unusable descriptors.
    fn resolve(&self, uri: &str) -> Result<ResolvedHandler, SandboxError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Descriptor {
    handler: String,
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(default)]
    memory_size: Option<u32>,
}

/// Resolves handlers from descriptor files under a functions directory.
#[derive(Debug, Clone)]
pub struct DescriptorResolver {
    functions_dir: PathBuf,
}

impl DescriptorResolver {
    #[must_use]
    pub fn new(functions_dir: impl Into<PathBuf>) -> Self {
        Self {
            functions_dir: functions_dir.into(),
        }
    }

    fn function_dir(&self, name: &str) -> Result<PathBuf, SandboxError> {
        // Names come from the API document; keep them inside the directory.
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(SandboxError::HandlerNotFound { name: name.to_owned() });
        }
        Ok(self.functions_dir.join(name))
    }
}

impl HandlerResolver for DescriptorResolver {
    fn resolve(&self, uri: &str) -> Result<ResolvedHandler, SandboxError> {
        let name = function_name_from_uri(uri);
        let dir = self.function_dir(name)?;
        let descriptor_path = dir.join(DESCRIPTOR_FILE);

        let text = match std::fs::read_to_string(&descriptor_path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SandboxError::HandlerNotFound { name: name.to_owned() });
            }
            Err(e) => return Err(SandboxError::Io(e)),
        };
        let descriptor: Descriptor = serde_json::from_str(&text).map_err(|e| SandboxError::InvalidDescriptor {
            path: descriptor_path.clone(),
            reason: e.to_string(),
        })?;

        let Some((module, export)) = descriptor.handler.rsplit_once('.') else {
            return Err(SandboxError::InvalidDescriptor {
                path: descriptor_path,
                reason: format!("handler '{}' is not of the form file.export", descriptor.handler),
            });
        };
        if module.is_empty() || export.is_empty() {
            return Err(SandboxError::InvalidDescriptor {
                path: descriptor_path,
                reason: format!("handler '{}' is not of the form file.export", descriptor.handler),
            });
        }

        let path = module_path(&dir, module);
        tracing::debug!(function = name, module = %path.display(), export, "handler resolved");

        let mut resolved = ResolvedHandler::new(path, export);
        if let Some(seconds) = descriptor.timeout {
            resolved = resolved.with_timeout(Duration::from_secs(seconds));
        }
        if let Some(memory_size) = descriptor.memory_size {
            resolved = resolved.with_memory_size(memory_size);
        }
        Ok(resolved)
    }
}

/// Function name from a Lambda-style invocation ARN or a bare name.
///
/// `arn:...:function:getItem/invocations` and `getItem` both yield `getItem`.
#[must_use]
pub fn function_name_from_uri(uri: &str) -> &str {
    let tail = match uri.rfind(":function:") {
        Some(at) => &uri[at + ":function:".len()..],
        None => uri,
    };
    let tail = tail.split('/').next().unwrap_or(tail);
    // Qualified ARNs end with `:alias` or `:version`.
    tail.split(':').next().unwrap_or(tail)
}

/// `dir/module.js` if it exists, otherwise `dir/module` as given.
fn module_path(dir: &Path, module: &str) -> PathBuf {
    let with_ext = dir.join(format!("{module}.js"));
    if with_ext.is_file() {
        with_ext
    } else {
        dir.join(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("mimic-resolver-{tag}-{}", uuid::Uuid::new_v4()));
        if let Err(e) = std::fs::create_dir_all(&dir) {
            panic!("create {}: {e}", dir.display());
        }
        dir
    }

    fn write(path: &Path, contents: &str) {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                panic!("create {}: {e}", parent.display());
            }
        }
        if let Err(e) = std::fs::write(path, contents) {
            panic!("write {}: {e}", path.display());
        }
    }

    #[test]
    fn function_name_from_arn_and_bare_name() {
        let arn = "arn:aws:apigateway:local:lambda:path/2015-03-31/functions/arn:aws:lambda:local:000000000000:function:getItem/invocations";
        assert_eq!(function_name_from_uri(arn), "getItem");
        assert_eq!(function_name_from_uri("arn:aws:lambda:local:0:function:getItem:live/invocations"), "getItem");
        assert_eq!(function_name_from_uri("createItem"), "createItem");
    }

    #[test]
    fn resolves_descriptor() {
        let root = scratch_dir("ok");
        write(&root.join("getItem/function.json"), r#"{"handler":"src/index.get","timeout":3,"memorySize":256}"#);
        write(&root.join("getItem/src/index.js"), "exports.get = async () => ({});\n");

        let resolved = match DescriptorResolver::new(&root).resolve("getItem") {
            Ok(r) => r,
            Err(e) => panic!("resolve failed: {e}"),
        };
        assert_eq!(resolved.path, root.join("getItem/src/index.js"));
        assert_eq!(resolved.function_name, "get");
        assert_eq!(resolved.timeout, Some(Duration::from_secs(3)));
        assert_eq!(resolved.memory_size, 256);
        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn missing_descriptor_is_handler_not_found() {
        let root = scratch_dir("missing");
        assert!(matches!(
            DescriptorResolver::new(&root).resolve("nope"),
            Err(SandboxError::HandlerNotFound { .. })
        ));
        assert!(matches!(
            DescriptorResolver::new(&root).resolve(".."),
            Err(SandboxError::HandlerNotFound { .. })
        ));
        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn malformed_handler_is_invalid_descriptor() {
        let root = scratch_dir("bad");
        write(&root.join("f/function.json"), r#"{"handler":"index"}"#);
        write(&root.join("g/function.json"), "not json");
        let resolver = DescriptorResolver::new(&root);
        assert!(matches!(resolver.resolve("f"), Err(SandboxError::InvalidDescriptor { .. })));
        assert!(matches!(resolver.resolve("g"), Err(SandboxError::InvalidDescriptor { .. })));
        let _ = std::fs::remove_dir_all(root);
    }
}
