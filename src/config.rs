//! Run configuration.
//!
//! Configuration is a TOML file whose sections are all optional. It is loaded
//! once at startup and handed to the session; nothing reads it afterwards.
//! Secrets never live in the file: it names the environment variables that
//! hold them. Those variables may also come from a `.env` file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::git;
use crate::github::DEFAULT_API_BASE;
use crate::window::SelectionPolicy;

/// File looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "relnotes.toml";

/// Env file read from the working directory when present.
pub const ENV_FILE: &str = ".env";

/// The complete run configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub history: HistoryConfig,
    pub model: ModelConfig,
    pub selection: SelectionPolicy,
    pub session: SessionConfig,
}

/// Where history is read from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HistoryConfig {
    pub provider: Provider,

    /// `owner/name` of the GitHub repository (overridden by `GITHUB_REPO`)
    pub repo: Option<String>,

    /// Branch to read; the repository default (GitHub) or `HEAD` (git) when unset
    pub branch: Option<String>,

    /// Commit to start from instead of the branch head
    pub start: Option<String>,

    /// Environment variable holding the GitHub token
    pub token_env: String,

    pub api_base: String,

    /// Maximum pages of 100 fetched per GitHub listing
    pub max_pages: u32,

    /// Path inside the local repository (git provider)
    pub path: PathBuf,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            provider: Provider::GitHub,
            repo: None,
            branch: None,
            start: None,
            token_env: "GITHUB_API_TOKEN".to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            max_pages: 10,
            path: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    GitHub,
    Git,
}

/// Which language model writes the changelog.
///
/// Every backend speaks the OpenAI chat-completions protocol; they differ
/// only in endpoint, default model and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    pub backend: Backend,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key_env: Option<String>,
    pub temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Ollama,
            model: None,
            base_url: None,
            api_key_env: None,
            temperature: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Ollama,
    OpenRouter,
    Groq,
    OpenAi,
    Custom,
}

impl Backend {
    fn default_base_url(self) -> Option<&'static str> {
        match self {
            Self::Ollama => Some("http://localhost:11434/v1"),
            Self::OpenRouter => Some("https://openrouter.ai/api/v1"),
            Self::Groq => Some("https://api.groq.com/openai/v1"),
            Self::OpenAi => Some("https://api.openai.com/v1"),
            Self::Custom => None,
        }
    }

    fn default_model(self) -> Option<&'static str> {
        match self {
            Self::Ollama => Some("gpt-oss:120b-cloud"),
            Self::OpenRouter => Some("x-ai/grok-4-fast:free"),
            Self::Groq => Some("llama-3.1-8b-instant"),
            Self::OpenAi => Some("gpt-4o-mini"),
            Self::Custom => None,
        }
    }

    fn default_api_key_env(self) -> Option<&'static str> {
        match self {
            Self::Ollama | Self::Custom => None,
            Self::OpenRouter => Some("OPENROUTER_API_KEY"),
            Self::Groq => Some("GROQ_API_KEY"),
            Self::OpenAi => Some("OPENAI_API_KEY"),
        }
    }
}

/// A model endpoint with everything resolved.
#[derive(Clone, PartialEq)]
pub struct ModelSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
}

// Custom Debug to avoid exposing the API key
impl std::fmt::Debug for ModelSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSettings")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("has_api_key", &self.api_key.is_some())
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl ModelConfig {
    /// Fill in backend defaults and read the API key through `env`.
    pub fn resolve(
        &self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<ModelSettings, ConfigError> {
        let base_url = self
            .base_url
            .clone()
            .or_else(|| self.backend.default_base_url().map(str::to_string))
            .ok_or(ConfigError::MissingModelSetting("base_url"))?;
        let model = self
            .model
            .clone()
            .or_else(|| self.backend.default_model().map(str::to_string))
            .ok_or(ConfigError::MissingModelSetting("model"))?;

        let key_var = self
            .api_key_env
            .as_deref()
            .or(self.backend.default_api_key_env());
        let api_key = match key_var {
            Some(var) => Some(env(var).ok_or_else(|| ConfigError::MissingEnv(var.to_string()))?),
            None => None,
        };

        Ok(ModelSettings {
            base_url,
            model,
            api_key,
            temperature: self.temperature,
        })
    }
}

/// Limits and presentation of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Maximum model calls plus tool calls before the run is abandoned
    pub max_steps: usize,

    /// Language the changelog is written in
    pub language: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_steps: 25,
            language: "English".to_string(),
        }
    }
}

impl Config {
    /// Parse a configuration from TOML content.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load `path`, or [`DEFAULT_CONFIG_FILE`] if present, or the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Path::new(DEFAULT_CONFIG_FILE),
            None => return Ok(Self::default()),
        };

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(Self::from_toml(&content)?)
    }
}

/// Environment variables, with an env file filling in what the process lacks.
#[derive(Default)]
pub struct Environment {
    file: HashMap<String, String>,
}

impl Environment {
    /// Read `path` if it exists; a missing file contributes nothing.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let file = dotenvy::from_path_iter(path)
            .and_then(|vars| vars.collect::<Result<HashMap<_, _>, _>>())
            .map_err(|source| ConfigError::EnvFile {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Self { file })
    }

    /// Look up `key`; the process environment wins over the file.
    pub fn get(&self, key: &str) -> Option<String> {
        self.lookup(key, |key| std::env::var(key).ok())
    }

    fn lookup(&self, key: &str, process: impl Fn(&str) -> Option<String>) -> Option<String> {
        process(key).or_else(|| self.file.get(key).cloned())
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),

    #[error("failed to read env file '{path}'")]
    EnvFile {
        path: String,
        #[source]
        source: dotenvy::Error,
    },

    #[error("no GitHub repository configured (set GITHUB_REPO or history.repo)")]
    MissingRepo,

    #[error("'{0}' is not an owner/name repository")]
    InvalidRepo(String),

    #[error("model.{0} must be set for this backend")]
    MissingModelSetting(&'static str),

    #[error("environment variable {0} is not set")]
    MissingEnv(String),

    #[error("cannot open local repository")]
    Git(#[source] git::Error),
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::window::Untagged;

    fn env_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.history.provider, Provider::GitHub);
        assert_eq!(config.history.token_env, "GITHUB_API_TOKEN");
        assert_eq!(config.model.backend, Backend::Ollama);
        assert_eq!(config.selection, SelectionPolicy::strict());
        assert_eq!(config.session.max_steps, 25);
    }

    #[test]
    fn parses_all_sections() {
        let config = Config::from_toml(
            r#"
            [history]
            provider = "git"
            branch = "release"
            path = "/tmp/repo"

            [model]
            backend = "openrouter"
            model = "deepseek/deepseek-chat-v3.1:free"

            [selection]
            untagged = "newest-commit"
            same_minor = false

            [session]
            max_steps = 4
            language = "Russian"
            "#,
        )
        .unwrap();

        assert_eq!(config.history.provider, Provider::Git);
        assert_eq!(config.history.branch.as_deref(), Some("release"));
        assert_eq!(config.model.backend, Backend::OpenRouter);
        assert_eq!(config.selection.untagged, Untagged::NewestCommit);
        assert!(!config.selection.same_minor);
        assert_eq!(config.session.max_steps, 4);
        assert_eq!(config.session.language, "Russian");
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(Config::from_toml("[model]\nbakend = \"groq\"").is_err());
    }

    #[test]
    fn backend_defaults_fill_in() {
        let settings = ModelConfig::default().resolve(env_from(&[])).unwrap();
        assert_eq!(settings.base_url, "http://localhost:11434/v1");
        assert_eq!(settings.model, "gpt-oss:120b-cloud");
        assert_eq!(settings.api_key, None);

        let groq = ModelConfig {
            backend: Backend::Groq,
            ..ModelConfig::default()
        };
        let settings = groq.resolve(env_from(&[("GROQ_API_KEY", "gsk")])).unwrap();
        assert_eq!(settings.base_url, "https://api.groq.com/openai/v1");
        assert_eq!(settings.api_key.as_deref(), Some("gsk"));
    }

    #[test]
    fn missing_api_key_is_an_error() {
        let openai = ModelConfig {
            backend: Backend::OpenAi,
            ..ModelConfig::default()
        };
        let err = openai.resolve(env_from(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv(var) if var == "OPENAI_API_KEY"));
    }

    #[test]
    fn custom_backend_needs_endpoint_and_model() {
        let custom = ModelConfig {
            backend: Backend::Custom,
            ..ModelConfig::default()
        };
        assert!(matches!(
            custom.resolve(env_from(&[])),
            Err(ConfigError::MissingModelSetting("base_url"))
        ));

        let custom = ModelConfig {
            base_url: Some("http://llm.internal/v1".into()),
            model: Some("local".into()),
            api_key_env: Some("LLM_KEY".into()),
            ..custom
        };
        let settings = custom.resolve(env_from(&[("LLM_KEY", "k")])).unwrap();
        assert_eq!(settings.model, "local");
        assert_eq!(settings.api_key.as_deref(), Some("k"));
    }

    #[test]
    fn load_reads_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relnotes.toml");
        std::fs::write(&path, "[history]\nrepo = \"octocat/hello-world\"\n").unwrap();

        let config = Config::load(Some(path.as_path())).unwrap();
        assert_eq!(config.history.repo.as_deref(), Some("octocat/hello-world"));

        let missing = Config::load(Some(dir.path().join("nope.toml").as_path()));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn env_file_fills_in_missing_variables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(
            &path,
            "# credentials\nGITHUB_REPO=octo/app\nGITHUB_API_TOKEN=\"from-file\"\n",
        )
        .unwrap();

        let environment = Environment::load(&path).unwrap();
        let process = env_from(&[("GITHUB_API_TOKEN", "from-process")]);

        assert_eq!(
            environment.lookup("GITHUB_REPO", &process).as_deref(),
            Some("octo/app")
        );
        assert_eq!(
            environment.lookup("GITHUB_API_TOKEN", &process).as_deref(),
            Some("from-process")
        );
        assert_eq!(environment.lookup("GROQ_API_KEY", &process), None);
    }

    #[test]
    fn missing_env_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let environment = Environment::load(&dir.path().join(".env")).unwrap();
        assert_eq!(environment.lookup("GITHUB_REPO", env_from(&[])), None);
    }

    #[test]
    fn malformed_env_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "GITHUB_REPO=octo/app\nBAD LINE\n").unwrap();

        let err = Environment::load(&path).err().unwrap();
        assert!(matches!(err, ConfigError::EnvFile { .. }));
    }
}
