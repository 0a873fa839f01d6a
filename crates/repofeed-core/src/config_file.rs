use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub source: Option<SourceConfig>,
    pub paging: Option<PagingConfig>,
    pub store: Option<StoreConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    pub base_url: Option<String>,
    pub user: Option<String>,
    pub token: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PagingConfig {
    pub per_page: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: Option<String>,
    pub key: Option<String>,
}

/// Platform config directory path: `<config_dir>/repofeed/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("repofeed").join("config.toml"))
}

/// Load config by cascading CWD `.repofeed.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(&PathBuf::from(".repofeed.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &PathBuf) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    ConfigFile {
        source: Some(SourceConfig {
            base_url: overlay
                .source
                .as_ref()
                .and_then(|s| s.base_url.clone())
                .or_else(|| base.source.as_ref().and_then(|s| s.base_url.clone())),
            user: overlay
                .source
                .as_ref()
                .and_then(|s| s.user.clone())
                .or_else(|| base.source.as_ref().and_then(|s| s.user.clone())),
            token: overlay
                .source
                .as_ref()
                .and_then(|s| s.token.clone())
                .or_else(|| base.source.as_ref().and_then(|s| s.token.clone())),
            user_agent: overlay
                .source
                .as_ref()
                .and_then(|s| s.user_agent.clone())
                .or_else(|| base.source.as_ref().and_then(|s| s.user_agent.clone())),
        }),
        paging: Some(PagingConfig {
            per_page: overlay
                .paging
                .as_ref()
                .and_then(|p| p.per_page)
                .or_else(|| base.paging.as_ref().and_then(|p| p.per_page)),
        }),
        store: Some(StoreConfig {
            path: overlay
                .store
                .as_ref()
                .and_then(|s| s.path.clone())
                .or_else(|| base.store.as_ref().and_then(|s| s.path.clone())),
            key: overlay
                .store
                .as_ref()
                .and_then(|s| s.key.clone())
                .or_else(|| base.store.as_ref().and_then(|s| s.key.clone())),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_config() {
        let cfg: ConfigFile = toml::from_str(
            r#"
            [source]
            user = "facebook"
        "#,
        )
        .unwrap();
        assert_eq!(cfg.source.unwrap().user.as_deref(), Some("facebook"));
        assert!(cfg.paging.is_none());
        assert!(cfg.store.is_none());
    }

    #[test]
    fn overlay_wins_where_set() {
        let base: ConfigFile = toml::from_str(
            r#"
            [source]
            user = "facebook"
            token = "base-token"

            [paging]
            per_page = 10
        "#,
        )
        .unwrap();
        let overlay: ConfigFile = toml::from_str(
            r#"
            [source]
            user = "torvalds"
        "#,
        )
        .unwrap();

        let merged = merge(base, overlay);
        let source = merged.source.unwrap();
        assert_eq!(source.user.as_deref(), Some("torvalds"));
        // Base values survive where the overlay is silent.
        assert_eq!(source.token.as_deref(), Some("base-token"));
        assert_eq!(merged.paging.unwrap().per_page, Some(10));
    }

    #[test]
    fn missing_file_is_none() {
        assert!(load_from_path(&PathBuf::from("/definitely/not/here.toml")).is_none());
    }
}
