// Locating the rendering unit module
//
// The loader script is embedded with a `data-base` attribute pointing at the
// extension's asset root; the rendering unit module lives next to it.

use tracing::{info, warn};
use url::Url;

use crate::config::MicConfig;

/// File name the loader script is served under
pub const LOADER_SCRIPT_NAME: &str = "/injected.js";

/// The bits of a `<script>` element the engine cares about
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptTag {
    pub src: Option<String>,
    pub data_base: Option<String>,
}

impl ScriptTag {
    pub fn new(src: impl Into<String>, data_base: Option<&str>) -> Self {
        Self {
            src: Some(src.into()),
            data_base: data_base.map(str::to_string),
        }
    }
}

/// Base path from the first script whose `src` ends with the loader name.
/// Empty string when the attribute is missing, like an unset dataset entry.
pub fn resolve_asset_base<'a>(scripts: impl IntoIterator<Item = &'a ScriptTag>) -> String {
    scripts
        .into_iter()
        .find(|s| s.src.as_deref().is_some_and(|src| src.ends_with(LOADER_SCRIPT_NAME)))
        .and_then(|s| s.data_base.clone())
        .unwrap_or_default()
}

/// Module specifier for the rendering unit.
///
/// An absolute base is joined properly; anything else falls back to plain
/// concatenation so a page-relative base still works.
pub fn module_specifier(base: Option<&str>, module: &str) -> String {
    let base = base.unwrap_or_default();
    if base.is_empty() {
        return module.to_string();
    }
    match Url::parse(base) {
        Ok(url) => match url.join(module) {
            Ok(joined) => joined.to_string(),
            Err(e) => {
                warn!("Cannot join module {} onto {}: {}", module, base, e);
                format!("{}{}", base, module)
            }
        },
        Err(_) => format!("{}{}", base, module),
    }
}

impl MicConfig {
    /// Take the asset base from the page's loader script, if it carries one
    pub fn with_loader_scripts<'a>(mut self, scripts: impl IntoIterator<Item = &'a ScriptTag>) -> Self {
        let base = resolve_asset_base(scripts);
        if !base.is_empty() {
            info!("Asset base from loader script: {}", base);
            self.asset_base_url = Some(base);
        }
        self
    }
}
