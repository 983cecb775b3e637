//! Topology document parsing and serialization.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::sanity::SanityError;
use crate::config::schema::ConfigData;
use crate::config::validation::RuleError;

const DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse document: {0}")]
    Parse(#[from] quick_xml::DeError),

    #[error("could not serialize document: {0}")]
    Serialize(String),

    #[error(transparent)]
    Validation(#[from] RuleError),

    #[error(transparent)]
    Sanity(#[from] SanityError),

    #[error("could not parse settings: {0}")]
    Settings(#[from] toml::de::Error),

    #[error("no valid configuration found")]
    NoValidConfig,
}

/// Parse a topology document.
pub fn parse_document(content: &str) -> Result<ConfigData, ConfigError> {
    Ok(quick_xml::de::from_str(content)?)
}

/// Serialize a tree as an indented document with an XML declaration.
pub fn to_document(data: &ConfigData) -> Result<String, ConfigError> {
    let mut body = String::new();
    let mut serializer = quick_xml::se::Serializer::new(&mut body);
    serializer.indent(' ', 2);
    data.serialize(serializer)
        .map_err(|e| ConfigError::Serialize(e.to_string()))?;
    Ok(format!("{DECLARATION}\n{body}\n"))
}

/// Read and parse the document at `path`.
pub fn read_document(path: &Path) -> Result<ConfigData, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_document(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<config name="lab">
  <server name="s1">
    <ipv4><port>8080</port></ipv4>
    <backingstore>
      <host><ipv4><address>10.1.0.2</address><port>7000</port></ipv4></host>
    </backingstore>
    <network name="net1">
      <type>production</type>
      <ipv4><address>10.0.0.1</address><subnet>255.255.255.0</subnet></ipv4>
      <gateway><ipv4><address>10.0.0.254</address></ipv4></gateway>
      <host name="h1">
        <ipv4><address>10.0.0.5</address><mac>aa:bb:cc:dd:ee:ff</mac></ipv4>
        <utsname>h1.example.com</utsname>
      </host>
    </network>
  </server>
  <backingstore name="bs1">
    <host><ipv4><port>7000</port></ipv4></host>
    <type>btrfs</type>
  </backingstore>
</config>
"#;

    #[test]
    fn parses_full_document() {
        let data = parse_document(DOCUMENT).unwrap();

        assert_eq!(data.name, "lab");
        let server = &data.servers[0];
        assert_eq!(server.ipv4.port, "8080");
        assert_eq!(server.backing_store.as_ref().unwrap().endpoint(), "10.1.0.2:7000");

        let network = &server.networks[0];
        assert_eq!(network.kind, "production");
        assert_eq!(network.gateway.ipv4.address, "10.0.0.254");
        assert_eq!(network.hosts[0].utsname, "h1.example.com");
        assert_eq!(network.hosts[0].ipv4.mac, "aa:bb:cc:dd:ee:ff");

        assert_eq!(data.backing_stores[0].kind, "btrfs");
        assert_eq!(data.backing_stores[0].host.ipv4.port, "7000");
    }

    #[test]
    fn serialization_round_trips() {
        let data = parse_document(DOCUMENT).unwrap();
        let document = to_document(&data).unwrap();

        assert!(document.starts_with(DECLARATION));
        assert!(document.contains("\n  <server name=\"s1\">"));
        assert_eq!(parse_document(&document).unwrap(), data);
    }

    #[test]
    fn empty_root_is_accepted() {
        let data = parse_document(r#"<config name="empty"/>"#).unwrap();
        assert!(data.servers.is_empty());
        assert!(data.backing_stores.is_empty());
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(parse_document("<config><server"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = read_document(Path::new("/nonexistent/fleetd/config")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/fleetd/config"));
    }
}
