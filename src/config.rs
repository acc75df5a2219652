use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::cli::ImportArgs;

/// Settings for an `import` run. Loaded from defaults, then an optional YAML
/// file, then `SHELFIMPORT_*` environment variables, then CLI flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImportConfig {
    /// Publishers whose catalog is curated by hand; their books are never
    /// imported.
    pub excluded_publishers: BTreeSet<String>,
    /// Tag stored in `books.source`.
    pub source: String,
    pub page_timeout_secs: u64,
    pub cover_timeout_secs: u64,
    pub user_agent: String,
    pub extractor: ExtractorConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractorConfig {
    pub bin: Option<String>,
    pub args: Vec<String>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            excluded_publishers: Self::default_excluded_publishers(),
            source: Self::default_source(),
            page_timeout_secs: 30,
            cover_timeout_secs: 10,
            user_agent: Self::default_user_agent(),
            extractor: ExtractorConfig::default(),
        }
    }
}

impl ImportConfig {
    pub fn default_excluded_publishers() -> BTreeSet<String> {
        [
            "بیدگل",
            "کرگدن",
            "پارسه",
            "افق",
            "تاش",
            "اطراف",
            "آریاناقلم",
            "آریانا قلم",
            "دف",
            "کارنامه",
            "نی",
        ]
        .into_iter()
        .map(str::to_owned)
        .collect()
    }

    pub fn default_source() -> String {
        "30book".to_owned()
    }

    pub fn default_user_agent() -> String {
        format!("shelfimport/{}", env!("CARGO_PKG_VERSION"))
    }

    pub fn from_yaml_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config: {}", path.display()))?;
        serde_yaml::from_str(&raw).with_context(|| format!("parse config: {}", path.display()))
    }

    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    fn apply_env_from(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(source) = var("SHELFIMPORT_SOURCE").filter(|v| !v.trim().is_empty()) {
            self.source = source;
        }
        if let Some(user_agent) = var("SHELFIMPORT_USER_AGENT").filter(|v| !v.trim().is_empty()) {
            self.user_agent = user_agent;
        }
        if let Some(bin) = var("SHELFIMPORT_EXTRACTOR_BIN").filter(|v| !v.trim().is_empty()) {
            self.extractor.bin = Some(bin);
        }
    }

    fn apply_args(&mut self, args: &ImportArgs) {
        if args.no_default_exclusions {
            let defaults = Self::default_excluded_publishers();
            self.excluded_publishers.retain(|name| !defaults.contains(name));
        }
        self.excluded_publishers
            .extend(args.exclude_publisher.iter().cloned());
        if let Some(source) = args.source.as_ref() {
            self.source = source.clone();
        }
        if let Some(secs) = args.page_timeout_secs {
            self.page_timeout_secs = secs;
        }
        if let Some(secs) = args.cover_timeout_secs {
            self.cover_timeout_secs = secs;
        }
        if let Some(bin) = args.extractor_bin.as_ref() {
            self.extractor.bin = Some(bin.clone());
            self.extractor.args = args.extractor_arg.clone();
        } else if !args.extractor_arg.is_empty() {
            self.extractor.args = args.extractor_arg.clone();
        }
    }

    pub fn from_args(args: &ImportArgs) -> anyhow::Result<Self> {
        let mut config = match args.config.as_deref() {
            Some(path) => Self::from_yaml_file(Path::new(path))?,
            None => Self::default(),
        };
        config.apply_env();
        config.apply_args(args);

        if config.source.trim().is_empty() {
            anyhow::bail!("source tag must not be empty");
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ImportArgs {
        ImportArgs {
            db: "catalog.sqlite3".to_owned(),
            urls: Some("urls.txt".to_owned()),
            records: None,
            config: None,
            exclude_publisher: Vec::new(),
            no_default_exclusions: false,
            source: None,
            extractor_bin: None,
            extractor_arg: Vec::new(),
            page_timeout_secs: None,
            cover_timeout_secs: None,
            report: None,
        }
    }

    #[test]
    fn yaml_overrides_only_named_fields() -> anyhow::Result<()> {
        let config: ImportConfig = serde_yaml::from_str(
            "excluded_publishers: [Acme]\ncover_timeout_secs: 3\nextractor:\n  bin: ./extract\n",
        )?;
        assert_eq!(
            config.excluded_publishers,
            BTreeSet::from(["Acme".to_owned()])
        );
        assert_eq!(config.cover_timeout_secs, 3);
        assert_eq!(config.source, "30book");
        assert_eq!(config.extractor.bin.as_deref(), Some("./extract"));
        Ok(())
    }

    #[test]
    fn yaml_rejects_unknown_fields() {
        let err = serde_yaml::from_str::<ImportConfig>("excluded: [Acme]\n");
        assert!(err.is_err());
    }

    #[test]
    fn env_overrides_defaults() {
        let mut config = ImportConfig::default();
        config.apply_env_from(|key| match key {
            "SHELFIMPORT_SOURCE" => Some("mirror".to_owned()),
            "SHELFIMPORT_USER_AGENT" => Some("  ".to_owned()),
            _ => None,
        });
        assert_eq!(config.source, "mirror");
        assert_eq!(config.user_agent, ImportConfig::default_user_agent());
    }

    #[test]
    fn cli_flags_replace_default_exclusions() {
        let mut config = ImportConfig::default();
        let mut args = args();
        args.no_default_exclusions = true;
        args.exclude_publisher = vec!["Acme".to_owned()];
        args.source = Some("mirror".to_owned());

        config.apply_args(&args);

        assert_eq!(
            config.excluded_publishers,
            BTreeSet::from(["Acme".to_owned()])
        );
        assert_eq!(config.source, "mirror");
    }
}
