use std::str::FromStr;
use std::time;

use envconfig::Envconfig;

pub const DEFAULT_BASE_URL: &str = "https://api.bridgee.ai/";
pub const DEFAULT_CONNECT_TIMEOUT: time::Duration = time::Duration::from_millis(500);
pub const DEFAULT_READ_TIMEOUT: time::Duration = time::Duration::from_millis(1500);
pub const DEFAULT_USER_AGENT: &str = "attribution-sdk";

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "MATCH_BASE_URL", default = "https://api.bridgee.ai/")]
    pub base_url: String,

    #[envconfig(default = "500")]
    pub connect_timeout: EnvMsDuration,

    #[envconfig(default = "1500")]
    pub read_timeout: EnvMsDuration,

    #[envconfig(default = "attribution-sdk")]
    pub user_agent: String,

    pub tenant_id: NonEmptyString,

    pub tenant_key: NonEmptyString,

    #[envconfig(default = "true")]
    pub dry_run: bool,
}

impl Config {
    /// The subset of the configuration used to build a `MatchClient`.
    pub fn match_client(&self) -> MatchClientConfig {
        MatchClientConfig {
            base_url: self.base_url.clone(),
            connect_timeout: self.connect_timeout.0,
            read_timeout: self.read_timeout.0,
            user_agent: self.user_agent.clone(),
        }
    }
}

/// Settings for the match service connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchClientConfig {
    /// Base URL; requests go to `<base_url>/match`.
    pub base_url: String,
    /// Upper bound on establishing the TCP/TLS connection.
    pub connect_timeout: time::Duration,
    /// Upper bound on each read of the response, independent of the connect phase.
    pub read_timeout: time::Duration,
    pub user_agent: String,
}

impl Default for MatchClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

impl MatchClientConfig {
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        base_url.clone_into(&mut self.base_url);
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

#[derive(Debug, Clone)]
pub struct NonEmptyString(pub String);

impl NonEmptyString {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct StringIsEmptyError;

impl FromStr for NonEmptyString {
    type Err = StringIsEmptyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            Err(StringIsEmptyError)
        } else {
            Ok(NonEmptyString(s.to_owned()))
        }
    }
}
