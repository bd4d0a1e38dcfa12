//! Content loading: component schemas declared once at startup.

use std::path::Path;

use kernel_component::ComponentRegistry;
use kernel_effects::declare_effect_types;
use tracing::info;

use crate::error::TurnError;

/// Build a registry holding the effect types plus every schema in the JSON
/// array `source`.
///
/// # Errors
///
/// Any declaration error; content mistakes are fatal.
pub fn registry_from_str(source: &str) -> Result<ComponentRegistry, TurnError> {
    let mut registry = ComponentRegistry::new();
    declare_effect_types(&mut registry)?;
    registry.declare_json(source)?;
    Ok(registry)
}

/// Read `path` and build a registry from it.
///
/// # Errors
///
/// [`TurnError::Content`] if the file cannot be read, otherwise as
/// [`registry_from_str`].
pub fn load_registry(path: &Path) -> Result<ComponentRegistry, TurnError> {
    let source = std::fs::read_to_string(path).map_err(|source| TurnError::Content {
        path: path.to_path_buf(),
        source,
    })?;
    let registry = registry_from_str(&source)?;
    info!(path = %path.display(), types = registry.len(), "content loaded");
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use kernel_effects::{Duration, Expiration};

    use super::*;

    #[test]
    fn test_effect_types_always_declared() {
        let registry = registry_from_str("[]").unwrap();
        assert!(registry.contains(Expiration::TYPE_NAME));
        assert!(registry.contains(Duration::TYPE_NAME));
    }

    #[test]
    fn test_content_cannot_redeclare_effect_types() {
        let result = registry_from_str(r#"[{ "name": "Expiration" }]"#);
        assert!(matches!(result, Err(TurnError::Component(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = load_registry(Path::new("does/not/exist.json"));
        assert!(matches!(result, Err(TurnError::Content { .. })));
    }

    #[test]
    fn test_bundled_content_loads() {
        let registry = registry_from_str(include_str!("../content/components.json")).unwrap();
        assert!(registry.is_unique("health").unwrap());
        assert!(registry.is_tag("hasted").unwrap());
        assert!(registry.is_transient("fov").unwrap());
    }
}
