//! Artifact layout inside one task folder.
//!
//! Naming convention, per step number N and optional target alias A
//! (the alias qualifier is used only when a run drives multiple targets):
//! page `stepN[_A].{xml|html}` + `stepN[_A].yaml`, screenshot
//! `step_N[_A].{png,jpg}`, record `stepN.json`, prompt `stepN_prompt.md`,
//! plus `task.json` and `summary.json` at the folder root.

use std::path::{Path, PathBuf};

use perceiver_source::jpeg_derivative;
use serde_json::Value;
use tokio::fs;
use tracing::debug;
use uiscout_core_types::Platform;

use crate::error::RunError;

pub struct ArtifactStore {
    folder: PathBuf,
    qualify: bool,
}

impl ArtifactStore {
    /// `qualify` turns on the alias suffix; pass true when >1 target.
    pub fn new(folder: impl Into<PathBuf>, qualify: bool) -> Self {
        Self {
            folder: folder.into(),
            qualify,
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    fn suffix(&self, alias: &str) -> String {
        if self.qualify {
            format!("_{alias}")
        } else {
            String::new()
        }
    }

    pub async fn write_page(
        &self,
        step: u32,
        alias: &str,
        platform: Platform,
        source: &str,
    ) -> Result<(), RunError> {
        let ext = if platform == Platform::Web { "html" } else { "xml" };
        let name = format!("step{step}{}.{ext}", self.suffix(alias));
        fs::write(self.folder.join(name), source).await?;
        Ok(())
    }

    pub async fn write_outline(
        &self,
        step: u32,
        alias: &str,
        outline: &str,
    ) -> Result<(), RunError> {
        let name = format!("step{step}{}.yaml", self.suffix(alias));
        fs::write(self.folder.join(name), outline).await?;
        Ok(())
    }

    /// Write the PNG plus its best-effort JPEG derivative. An empty capture
    /// writes nothing.
    pub async fn write_screenshot(
        &self,
        step: u32,
        alias: &str,
        png: &[u8],
    ) -> Result<(), RunError> {
        if png.is_empty() {
            debug!(step, "no screenshot captured");
            return Ok(());
        }
        let suffix = self.suffix(alias);
        fs::write(self.folder.join(format!("step_{step}{suffix}.png")), png).await?;
        if let Some(jpeg) = jpeg_derivative(png) {
            fs::write(self.folder.join(format!("step_{step}{suffix}.jpg")), jpeg).await?;
        }
        Ok(())
    }

    pub async fn write_prompt(&self, step: u32, prompt: &str) -> Result<(), RunError> {
        fs::write(self.folder.join(format!("step{step}_prompt.md")), prompt).await?;
        Ok(())
    }

    pub async fn write_record(&self, step: u32, record: &Value) -> Result<(), RunError> {
        let body = serde_json::to_vec_pretty(record)?;
        fs::write(self.folder.join(format!("step{step}.json")), body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn alias_qualifier_only_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let plain = ArtifactStore::new(dir.path(), false);
        plain
            .write_page(1, "phone", Platform::Android, "<hierarchy/>")
            .await
            .unwrap();
        assert!(dir.path().join("step1.xml").exists());

        let qualified = ArtifactStore::new(dir.path(), true);
        qualified
            .write_page(1, "phone", Platform::Web, "<html/>")
            .await
            .unwrap();
        qualified.write_record(1, &json!({"action": "finish"})).await.unwrap();
        assert!(dir.path().join("step1_phone.html").exists());
        // Records are never alias-qualified: one record per step number.
        assert!(dir.path().join("step1.json").exists());
    }
}
