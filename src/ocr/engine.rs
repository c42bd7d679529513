use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

use super::parse::{parse_output, ParsedOutput};
use crate::automation::config::OcrConfig;

/// Text recognized from one composite image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recognition {
    /// Complete recognizer output
    pub text: String,
    pub parsed: ParsedOutput,
}

/// Turns a saved composite image into text.
pub trait OcrEngine {
    fn recognize(&self, image_path: &Path) -> Result<Recognition>;
}

/// Runs an external recognizer executable on the image path.
///
/// The recognizer prints its result to stdout (stderr is folded in); a
/// non-zero exit is an error carrying its output.
pub struct ExternalOcr {
    executable: PathBuf,
    args: Vec<String>,
}

impl ExternalOcr {
    pub fn new(executable: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            executable: executable.into(),
            args,
        }
    }

    /// Resolves a relative executable against the executable directory first.
    pub fn from_config(config: &OcrConfig) -> Self {
        let configured = PathBuf::from(&config.executable);
        let beside_exe = crate::paths::get_exe_dir().join(&configured);
        let executable = if configured.is_relative() && beside_exe.exists() {
            beside_exe
        } else {
            configured
        };
        Self::new(executable, config.args.clone())
    }
}

impl OcrEngine for ExternalOcr {
    fn recognize(&self, image_path: &Path) -> Result<Recognition> {
        let output = Command::new(&self.executable)
            .args(&self.args)
            .arg(image_path)
            .output()
            .with_context(|| format!("Failed to run recognizer {}", self.executable.display()))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(anyhow!("Recognizer failed ({}): {}", output.status, text.trim()));
        }

        let parsed = parse_output(&text);
        Ok(Recognition { text, parsed })
    }
}
