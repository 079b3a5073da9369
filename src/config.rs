use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Command names for every external tool the pipeline may invoke.
///
/// Values are whatever the shell would resolve: bare names on `PATH` or
/// absolute paths. A tool that is not installed becomes a recorded failure
/// at run time, never a crash.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ToolCommands {
    /// Forensic imaging (disk-image jobs).
    pub imaging: String,
    /// Filesystem detection over the raw image.
    pub detection: String,
    /// Forensic file listing (body-file output).
    pub listing: String,
    /// Whole-volume archive extraction for optical filesystems.
    pub bulk_copy: String,
    /// HFS-family volume extraction.
    pub hfs_extract: String,
    /// Generic forensic recovery of allocated files.
    pub recover: String,
    pub malware_scan: String,
    /// Directory-structure documentation.
    pub doc_tree: String,
    pub sensitive_scan: String,
    /// File format identification (CSV output).
    pub format_id: String,
    pub dvd_rip: String,
    pub audio_rip: String,
    pub audio_normalize: String,
}

impl Default for ToolCommands {
    fn default() -> Self {
        Self {
            imaging: "ddrescue".to_owned(),
            detection: "disktype".to_owned(),
            listing: "fls".to_owned(),
            bulk_copy: "7z".to_owned(),
            hfs_extract: "unhfs".to_owned(),
            recover: "tsk_recover".to_owned(),
            malware_scan: "clamscan".to_owned(),
            doc_tree: "tree".to_owned(),
            sensitive_scan: "bulk_extractor".to_owned(),
            format_id: "sf".to_owned(),
            dvd_rip: "makemkvcon".to_owned(),
            audio_rip: "cdparanoia".to_owned(),
            audio_normalize: "ffmpeg".to_owned(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Organization name recorded as the executing agent in every exported
    /// provenance document.
    pub organization: String,

    /// Where per-item working folders are created.
    pub work_root: PathBuf,

    /// Path of the item registry document.
    pub registry: PathBuf,

    pub tools: ToolCommands,

    /// Time limit for quick tools (detection, listing, documentation).
    pub tool_timeout_secs: u64,

    /// Time limit for imaging, ripping, extraction, and scanning.
    pub long_tool_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .map(|dir| dir.join("ingot"))
            .unwrap_or_else(|| PathBuf::from("ingot-data"));

        Self {
            organization: "Digital Preservation Unit".to_owned(),
            work_root: data_dir.join("units"),
            registry: data_dir.join("registry.json"),
            tools: ToolCommands::default(),
            tool_timeout_secs: 900,
            long_tool_timeout_secs: 7200,
        }
    }
}

impl Settings {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn long_tool_timeout(&self) -> Duration {
        Duration::from_secs(self.long_tool_timeout_secs)
    }
}

pub fn settings_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("ingot"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("config.json")
}

/// Load the operator's settings, falling back to defaults when the file is
/// missing or unreadable.
pub fn load_settings() -> Settings {
    read_settings(&settings_path())
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    write_settings(&settings_path(), settings)
}

fn read_settings(path: &std::path::Path) -> Settings {
    if path.exists()
        && let Ok(content) = std::fs::read_to_string(path)
    {
        match serde_json::from_str::<Settings>(&content) {
            Ok(settings) => return settings,
            Err(e) => {
                tracing::warn!("Ignoring unparseable settings at {}: {e}", path.display());
            }
        }
    }

    Settings::default()
}

fn write_settings(path: &std::path::Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_carry_documented_tools() {
        let settings = Settings::default();
        assert_eq!(settings.tools.imaging, "ddrescue");
        assert_eq!(settings.tools.format_id, "sf");
        assert_eq!(settings.tools.audio_normalize, "ffmpeg");
        assert!(settings.long_tool_timeout() > settings.tool_timeout());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let settings = Settings {
            organization: "Test Archive".to_owned(),
            tools: ToolCommands {
                imaging: "/opt/forensics/bin/ddrescue".to_owned(),
                ..ToolCommands::default()
            },
            tool_timeout_secs: 60,
            ..Settings::default()
        };

        write_settings(&path, &settings).unwrap();
        assert_eq!(read_settings(&path), settings);
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = read_settings(&dir.path().join("absent.json"));
        assert_eq!(loaded, Settings::default());
    }

    #[test]
    fn test_unknown_and_missing_fields_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "organization": "Partial Archive", "future_option": true }"#,
        )
        .unwrap();

        let loaded = read_settings(&path);
        assert_eq!(loaded.organization, "Partial Archive");
        assert_eq!(loaded.tools, ToolCommands::default());
    }
}
