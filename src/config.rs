use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "snapgram", about = "Headless client for the Snapgram social app")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Backend endpoint, e.g. https://cloud.appwrite.io/v1
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Backend project id
    #[arg(long)]
    pub project: Option<String>,

    /// Path to data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<crate::cli::Command>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub feed: FeedConfig,
    pub preview: PreviewConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct BackendConfig {
    pub endpoint: String,
    pub project_id: String,
    pub database_id: String,
    pub users_collection: String,
    pub posts_collection: String,
    pub saves_collection: String,
    pub bucket_id: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct FeedConfig {
    /// Page size of the infinite feed
    pub page_size: u32,
    /// How many posts the home view shows
    pub recent_limit: u32,
    /// How many profiles the people view shows
    pub users_limit: u32,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PreviewConfig {
    pub width: u32,
    pub height: u32,
    pub gravity: String,
    pub quality: u8,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://cloud.appwrite.io/v1".to_string(),
            project_id: String::new(),
            database_id: "snapgram".to_string(),
            users_collection: "users".to_string(),
            posts_collection: "posts".to_string(),
            saves_collection: "saves".to_string(),
            bucket_id: "media".to_string(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: 9,
            recent_limit: 20,
            users_limit: 10,
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            width: 2000,
            height: 2000,
            gravity: "top".to_string(),
            quality: 100,
        }
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli);
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        // CLI overrides
        if let Some(ref endpoint) = cli.endpoint {
            config.backend.endpoint = endpoint.clone();
        }
        if let Some(ref project) = cli.project {
            config.backend.project_id = project.clone();
        }

        Ok(config)
    }

    pub fn data_dir(cli: &Cli) -> PathBuf {
        cli.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .expect("Could not determine home directory")
                .join(".snapgram")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli_with(data_dir: Option<PathBuf>) -> Cli {
        Cli {
            config: None,
            endpoint: None,
            project: None,
            data_dir,
            command: None,
        }
    }

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.backend.endpoint, "https://cloud.appwrite.io/v1");
        assert_eq!(config.backend.users_collection, "users");
        assert_eq!(config.backend.posts_collection, "posts");
        assert_eq!(config.backend.saves_collection, "saves");
        assert_eq!(config.feed.page_size, 9);
        assert_eq!(config.feed.recent_limit, 20);
        assert_eq!(config.preview.width, 2000);
        assert_eq!(config.preview.gravity, "top");
    }

    #[test]
    fn data_dir_uses_cli_override() {
        let cli = cli_with(Some(PathBuf::from("/tmp/test-snapgram")));
        assert_eq!(Config::data_dir(&cli), PathBuf::from("/tmp/test-snapgram"));
    }

    #[test]
    fn data_dir_defaults_to_home_dot_snapgram() {
        let cli = cli_with(None);
        assert!(Config::data_dir(&cli).ends_with(".snapgram"));
    }

    #[test]
    fn load_with_no_config_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let cli = cli_with(Some(tmp.path().to_path_buf()));
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.backend.endpoint, "https://cloud.appwrite.io/v1");
        assert_eq!(config.feed.page_size, 9);
    }

    #[test]
    fn load_reads_toml_file() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
[backend]
endpoint = "https://appwrite.local/v1"
project_id = "snap-dev"

[feed]
page_size = 12
"#,
        )
        .unwrap();

        let cli = Cli {
            config: Some(config_path),
            endpoint: None,
            project: None,
            data_dir: Some(tmp.path().to_path_buf()),
            command: None,
        };
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.backend.endpoint, "https://appwrite.local/v1");
        assert_eq!(config.backend.project_id, "snap-dev");
        assert_eq!(config.feed.page_size, 12);
        // untouched sections keep their defaults
        assert_eq!(config.feed.recent_limit, 20);
    }

    #[test]
    fn cli_overrides_beat_toml_values() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
[backend]
endpoint = "https://appwrite.local/v1"
project_id = "snap-dev"
"#,
        )
        .unwrap();

        let cli = Cli {
            config: Some(config_path),
            endpoint: Some("https://other.local/v1".to_string()),
            project: Some("snap-prod".to_string()),
            data_dir: Some(tmp.path().to_path_buf()),
            command: None,
        };
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.backend.endpoint, "https://other.local/v1");
        assert_eq!(config.backend.project_id, "snap-prod");
    }
}
