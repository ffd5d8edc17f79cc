//! URL parsing for storage backends.
//!
//! Extracts backend configuration from the URL forms accepted for source and
//! destination roots: S3 (`s3://`, `s3a://`, path/virtual-hosted https URLs,
//! explicit `s3::http://host:port/bucket` endpoints) and the local filesystem.

use object_store::path::Path;
use regex::{Captures, Regex};
use std::sync::LazyLock;

use crate::error::{InvalidUrlSnafu, StorageError};

use super::{LocalConfig, S3Config};

const S3_PATH: &str =
    r"^https://s3\.(?P<region>[\w\-]+)\.amazonaws\.com/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.*))?$";
const S3_VIRTUAL: &str =
    r"^https://(?P<bucket>[a-z0-9\-\.]+)\.s3\.(?P<region>[\w\-]+)\.amazonaws\.com(/(?P<key>.*))?$";
const S3_URL: &str = r"^[sS]3[aAnN]?://(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.*))?$";
const S3_ENDPOINT_URL: &str = r"^[sS]3[aA]?::(?P<protocol>https?)://(?P<endpoint>[^:/]+):(?P<port>\d+)/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.*))?$";

const FILE_URI: &str = r"^file://(?P<path>.*)$";
const FILE_URL: &str = r"^file:(?P<path>.*)$";
const FILE_PATH: &str = r"^(?P<path>/.*)$";

static S3_MATCHERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [S3_PATH, S3_VIRTUAL, S3_ENDPOINT_URL, S3_URL]
        .into_iter()
        .map(|pattern| Regex::new(pattern).expect("S3 URL pattern must compile"))
        .collect()
});

static LOCAL_MATCHERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [FILE_URI, FILE_URL, FILE_PATH]
        .into_iter()
        .map(|pattern| Regex::new(pattern).expect("file URL pattern must compile"))
        .collect()
});

/// Backend configuration enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    S3(S3Config),
    Local(LocalConfig),
}

fn first_match<'u>(matchers: &[Regex], url: &'u str) -> Option<Captures<'u>> {
    matchers.iter().find_map(|r| r.captures(url))
}

/// Turn a captured key into an optional object store path.
///
/// Trailing slashes (`s3://bucket/prefix/`) and empty keys map to the
/// same thing as no slash at all.
fn key_from(matches: &Captures) -> Option<Path> {
    matches
        .name("key")
        .map(|m| m.as_str().trim_matches('/'))
        .filter(|key| !key.is_empty())
        .map(Path::from)
}

impl BackendConfig {
    /// Parse a URL into a backend configuration.
    pub fn parse_url(url: &str) -> Result<Self, StorageError> {
        if let Some(matches) = first_match(&S3_MATCHERS, url) {
            return Ok(Self::parse_s3(&matches));
        }
        if let Some(matches) = first_match(&LOCAL_MATCHERS, url) {
            return Ok(Self::parse_local(&matches));
        }

        InvalidUrlSnafu {
            url: url.to_string(),
        }
        .fail()
    }

    fn parse_s3(matches: &Captures) -> Self {
        let bucket = matches["bucket"].to_string();
        let region = matches.name("region").map(|m| m.as_str().to_string());

        let endpoint = matches.name("endpoint").map(|endpoint| {
            let port = matches
                .name("port")
                .and_then(|p| p.as_str().parse::<u16>().ok())
                .unwrap_or(443);
            let protocol = matches
                .name("protocol")
                .map(|p| p.as_str())
                .unwrap_or("https");
            format!("{protocol}://{}:{port}", endpoint.as_str())
        });

        BackendConfig::S3(S3Config {
            endpoint,
            region,
            bucket,
            key: key_from(matches),
        })
    }

    fn parse_local(matches: &Captures) -> Self {
        let path = &matches["path"];
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        let path = match path.trim_end_matches('/') {
            "" => "/".to_string(),
            trimmed => trimmed.to_string(),
        };

        BackendConfig::Local(LocalConfig { path, key: None })
    }

    pub(crate) fn key(&self) -> Option<&Path> {
        match self {
            BackendConfig::S3(s3) => s3.key.as_ref(),
            BackendConfig::Local(local) => local.key.as_ref(),
        }
    }

    /// Same backend and bucket/root, different key prefix.
    pub(crate) fn with_key(&self, key: Option<Path>) -> Self {
        match self {
            BackendConfig::S3(s3) => BackendConfig::S3(S3Config { key, ..s3.clone() }),
            BackendConfig::Local(local) => BackendConfig::Local(LocalConfig {
                key,
                ..local.clone()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s3_url_parsing() {
        let config = BackendConfig::parse_url("s3://udacity-dend/song_data").unwrap();
        match config {
            BackendConfig::S3(s3) => {
                assert_eq!(s3.bucket, "udacity-dend");
                assert_eq!(s3.key, Some(Path::from("song_data")));
                assert_eq!(s3.region, None);
            }
            _ => panic!("Expected S3 config"),
        }
    }

    #[test]
    fn test_s3a_url_with_trailing_slash() {
        let config = BackendConfig::parse_url("s3a://udacity-dend/").unwrap();
        match config {
            BackendConfig::S3(s3) => {
                assert_eq!(s3.bucket, "udacity-dend");
                assert_eq!(s3.key, None);
            }
            _ => panic!("Expected S3 config"),
        }
    }

    #[test]
    fn test_s3_path_style_url() {
        let config =
            BackendConfig::parse_url("https://s3.us-west-2.amazonaws.com/mybucket/warehouse")
                .unwrap();
        match config {
            BackendConfig::S3(s3) => {
                assert_eq!(s3.bucket, "mybucket");
                assert_eq!(s3.region, Some("us-west-2".to_string()));
                assert_eq!(s3.key, Some(Path::from("warehouse")));
            }
            _ => panic!("Expected S3 config"),
        }
    }

    #[test]
    fn test_s3_virtual_hosted_url() {
        let config =
            BackendConfig::parse_url("https://mybucket.s3.eu-west-1.amazonaws.com/a/b").unwrap();
        match config {
            BackendConfig::S3(s3) => {
                assert_eq!(s3.bucket, "mybucket");
                assert_eq!(s3.region, Some("eu-west-1".to_string()));
                assert_eq!(s3.key, Some(Path::from("a/b")));
            }
            _ => panic!("Expected S3 config"),
        }
    }

    #[test]
    fn test_s3_endpoint_url() {
        let config =
            BackendConfig::parse_url("s3::http://localhost:9000/mybucket/warehouse").unwrap();
        match config {
            BackendConfig::S3(s3) => {
                assert_eq!(s3.bucket, "mybucket");
                assert_eq!(s3.endpoint, Some("http://localhost:9000".to_string()));
                assert_eq!(s3.key, Some(Path::from("warehouse")));
            }
            _ => panic!("Expected S3 config"),
        }
    }

    #[test]
    fn test_local_path() {
        let config = BackendConfig::parse_url("/data/input/").unwrap();
        assert_eq!(
            config,
            BackendConfig::Local(LocalConfig {
                path: "/data/input".to_string(),
                key: None,
            })
        );
    }

    #[test]
    fn test_local_file_uri() {
        let config = BackendConfig::parse_url("file:///data/input").unwrap();
        match config {
            BackendConfig::Local(local) => assert_eq!(local.path, "/data/input"),
            _ => panic!("Expected Local config"),
        }
    }

    #[test]
    fn test_local_file_url() {
        let config = BackendConfig::parse_url("file:/data/input").unwrap();
        match config {
            BackendConfig::Local(local) => assert_eq!(local.path, "/data/input"),
            _ => panic!("Expected Local config"),
        }
    }

    #[test]
    fn test_with_key_keeps_bucket() {
        let config = BackendConfig::parse_url("s3://bucket/out").unwrap();
        let child = config.with_key(Some(Path::from("out/songs")));
        match child {
            BackendConfig::S3(s3) => {
                assert_eq!(s3.bucket, "bucket");
                assert_eq!(s3.key, Some(Path::from("out/songs")));
            }
            _ => panic!("Expected S3 config"),
        }
    }

    #[test]
    fn test_invalid_url() {
        assert!(BackendConfig::parse_url("relative/path").is_err());
        assert!(BackendConfig::parse_url("gs://bucket/path").is_err());
    }
}
