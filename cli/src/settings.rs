use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Timeout applied to every control transfer.
    pub timeout_ms: u64,

    /// LANGID used for string lookups, instead of the device's first language.
    pub language: Option<u16>,

    /// Whether `show` reads string descriptors.
    pub show_strings: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeout_ms: 1000,
            language: None,
            show_strings: true,
        }
    }
}

impl Settings {
    pub fn read(path: &Path) -> Result<Settings> {
        match File::open(path) {
            Ok(reader) => serde_json::from_reader(reader).context(format!(
                "Could not parse settings file at {}",
                path.to_string_lossy()
            )),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(Settings::default()),
            Err(error) => Err(error).context(format!(
                "Could not open settings file for reading at {}",
                path.to_string_lossy()
            )),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let path = Path::new("/nonexistent/usbdetective/settings.json");
        let settings = Settings::read(path).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.timeout(), Duration::from_secs(1));
    }

    #[test]
    fn partial_settings_keep_defaults() {
        let settings: Settings = serde_json::from_str(r#"{ "language": 1031 }"#).unwrap();
        assert_eq!(settings.language, Some(0x0407));
        assert_eq!(settings.timeout_ms, 1000);
        assert!(settings.show_strings);
    }

    #[test]
    fn malformed_settings_name_the_file() {
        let path = std::env::temp_dir().join(format!(
            "usbdetective-settings-{}.json",
            std::process::id()
        ));
        std::fs::write(&path, "{ \"timeout_ms\": ").unwrap();

        let error = Settings::read(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(error.to_string().contains("Could not parse settings file"));
    }
}
