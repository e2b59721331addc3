//! Stock device ID → HomeKit model resolution.
//!
//! Stock firmware polls `/update` with two headers:
//!
//! - `X-MGOS-FW-Version` — the running firmware version, or `-` when the device
//!   doesn't know it.
//! - `X-MGOS-Device-ID` — `"<device-id> <descriptor>"`, e.g.
//!   `"SHSW-25#ABC123 192.168.1.5"`.
//!
//! The leading part of the device ID up to the first `-` is the model prefix
//! (`SHSW` above, or the whole token when there is no dash). The prefix is
//! looked up in a [`StockModelMap`] loaded once at startup. When the prefix
//! isn't listed, the device ID with its `#<mac>` suffix removed (`SHSW-25`) is
//! tried as well, so tables may key on either form:
//!
//! ```yaml
//! models:
//!   SHSW-1: Shelly1
//!   SHSW-25: Shelly25
//!   SHBTN-2: x        # known, but no HomeKit build exists
//! ```
//!
//! The reserved value [`UNSUPPORTED_MODEL`] marks a prefix as explicitly
//! unsupported, which is reported differently from a prefix that is not listed.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

/// Firmware version value sent by devices that don't report one.
pub const NO_FIRMWARE_VERSION: &str = "-";

/// Table value marking a prefix as known but unsupported.
pub const UNSUPPORTED_MODEL: &str = "x";

/// Why a device could not be mapped to a HomeKit model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("device did not send model information")]
    NoFirmwareInfo,
    #[error("unsupported device ID {0:?}")]
    MalformedDeviceId(String),
    #[error("device model {0:?} is not yet supported")]
    UnsupportedModel(String),
    #[error("unknown device model {0:?}")]
    UnknownModel(String),
}

/// Errors loading the model map file.
#[derive(Debug, Error)]
pub enum ModelMapError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
}

/// Immutable prefix → model table. Shared read-only across all requests.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StockModelMap {
    #[serde(default)]
    models: HashMap<String, String>,
}

impl StockModelMap {
    pub fn new(models: HashMap<String, String>) -> Self {
        Self { models }
    }

    /// Load from a YAML or JSON document. Files ending in `.json` go through
    /// `serde_json`; everything else is parsed as YAML (which also accepts
    /// most JSON).
    pub fn load(path: &Path) -> Result<Self, ModelMapError> {
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| ModelMapError::Read {
            path: display.clone(),
            source,
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            serde_json::from_str(&content).map_err(|source| ModelMapError::Json {
                path: display,
                source,
            })
        } else {
            Self::from_yaml(&content).map_err(|source| ModelMapError::Yaml {
                path: display,
                source,
            })
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        // An empty document deserializes to unit, not to a struct.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Number of mapped prefixes, including unsupported ones.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Map the `X-MGOS-FW-Version` / `X-MGOS-Device-ID` pair to a HomeKit model.
    ///
    /// Unknown prefixes are also reported with `warn!` so operators can extend
    /// the table.
    pub fn resolve(&self, fw_version: &str, device_id: &str) -> Result<&str, ResolveError> {
        if fw_version == NO_FIRMWARE_VERSION {
            return Err(ResolveError::NoFirmwareInfo);
        }

        let mut parts = device_id.split(' ');
        let (Some(dev_id), Some(_descriptor), None) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(ResolveError::MalformedDeviceId(device_id.to_string()));
        };

        let prefix = dev_id.split('-').next().unwrap_or(dev_id);
        let designation = dev_id.split('#').next().unwrap_or(dev_id);
        let (key, entry) = match self.models.get(prefix) {
            Some(model) => (prefix, Some(model)),
            None => (designation, self.models.get(designation)),
        };
        match entry.map(String::as_str) {
            Some(UNSUPPORTED_MODEL) => Err(ResolveError::UnsupportedModel(key.to_string())),
            Some(model) if !model.is_empty() => Ok(model),
            _ => {
                warn!("unknown model: {fw_version} {device_id}");
                Err(ResolveError::UnknownModel(prefix.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> StockModelMap {
        StockModelMap::from_yaml(
            "models:\n  SHSW: Shelly1\n  SHSW-25: ShellyHT\n  SHBTN: x\n  SHEMPTY: \"\"\n",
        )
        .unwrap()
    }

    #[test]
    fn test_resolve_known_prefix() {
        let map = table();
        assert_eq!(map.resolve("1.9.2", "SHSW-1#A1B2C3 1").unwrap(), "Shelly1");
        assert_eq!(map.resolve("1.9.2", "SHSW 192.168.1.5").unwrap(), "Shelly1");
    }

    #[test]
    fn test_resolve_prefix_stops_at_first_dash() {
        // "SHSW-25" is a key, but the prefix of "SHSW-25#ABC" is "SHSW".
        let map = table();
        assert_eq!(map.resolve("1.2.3", "SHSW-25#ABC x").unwrap(), "Shelly1");
    }

    #[test]
    fn test_resolve_falls_back_to_designation() {
        let map = StockModelMap::new(HashMap::from([
            ("SHSW-25".to_string(), "ShellyHT".to_string()),
            ("SHPLG-S".to_string(), UNSUPPORTED_MODEL.to_string()),
        ]));
        assert_eq!(
            map.resolve("1.2.3", "SHSW-25#ABC 192.168.1.5").unwrap(),
            "ShellyHT"
        );
        assert_eq!(
            map.resolve("1.2.3", "SHPLG-S#ABC 192.168.1.5"),
            Err(ResolveError::UnsupportedModel("SHPLG-S".to_string()))
        );
        // The MAC suffix is never part of a key.
        assert_eq!(
            map.resolve("1.2.3", "SHSW-1#ABC 192.168.1.5"),
            Err(ResolveError::UnknownModel("SHSW".to_string()))
        );
    }

    #[test]
    fn test_resolve_no_firmware_info() {
        let map = table();
        assert_eq!(
            map.resolve("-", "SHSW-1#A1B2C3 1"),
            Err(ResolveError::NoFirmwareInfo)
        );
        assert_eq!(map.resolve("-", "garbage"), Err(ResolveError::NoFirmwareInfo));
    }

    #[test]
    fn test_resolve_malformed_device_id() {
        let map = table();
        for id in ["SHSW-1#A1B2C3", "SHSW-1#A1B2C3 1 2", "", "a  b"] {
            assert_eq!(
                map.resolve("1.0", id),
                Err(ResolveError::MalformedDeviceId(id.to_string())),
                "device id {id:?}"
            );
        }
    }

    #[test]
    fn test_resolve_unsupported_is_not_unknown() {
        let map = table();
        assert_eq!(
            map.resolve("1.0", "SHBTN-2#FFEE 1"),
            Err(ResolveError::UnsupportedModel("SHBTN".to_string()))
        );
    }

    #[test]
    fn test_resolve_unknown_and_empty_value() {
        let map = table();
        assert_eq!(
            map.resolve("1.0", "SHPLG-S#1234 1"),
            Err(ResolveError::UnknownModel("SHPLG".to_string()))
        );
        assert_eq!(
            map.resolve("1.0", "SHEMPTY-1#1234 1"),
            Err(ResolveError::UnknownModel("SHEMPTY".to_string()))
        );
    }

    #[test]
    fn test_prefix_is_case_sensitive() {
        let map = table();
        assert!(matches!(
            map.resolve("1.0", "shsw-1#abc 1"),
            Err(ResolveError::UnknownModel(_))
        ));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ResolveError::UnsupportedModel("SHBTN".into()).to_string(),
            "device model \"SHBTN\" is not yet supported"
        );
        assert_eq!(
            ResolveError::MalformedDeviceId("abc".into()).to_string(),
            "unsupported device ID \"abc\""
        );
    }

    #[test]
    fn test_load_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();

        let yaml = dir.path().join("map.yaml");
        std::fs::write(&yaml, "models:\n  SHSW: Shelly1\n").unwrap();
        let map = StockModelMap::load(&yaml).unwrap();
        assert_eq!(map.len(), 1);

        let json = dir.path().join("map.json");
        std::fs::write(&json, r#"{"models": {"SHSW": "Shelly1", "SHBTN": "x"}}"#).unwrap();
        let map = StockModelMap::load(&json).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.resolve("1", "SHSW-1#A 1").unwrap(), "Shelly1");
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            StockModelMap::load(&dir.path().join("missing.yaml")),
            Err(ModelMapError::Read { .. })
        ));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{not json").unwrap();
        assert!(matches!(
            StockModelMap::load(&bad),
            Err(ModelMapError::Json { .. })
        ));
    }
}
