use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub onboarding: OnboardingConfig,
    pub auth: AuthConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let onboarding = OnboardingConfig {
            username_min_len: read_number("ONBOARDING_USERNAME_MIN", 3)?,
            username_max_len: read_number("ONBOARDING_USERNAME_MAX", 30)?,
            username_debounce_ms: read_number("ONBOARDING_USERNAME_DEBOUNCE_MS", 400)?,
        };
        if onboarding.username_min_len == 0
            || onboarding.username_min_len > onboarding.username_max_len
        {
            return Err(ConfigError::InvalidUsernameBounds {
                min: onboarding.username_min_len,
                max: onboarding.username_max_len,
            });
        }

        let auth = match env::var("APP_AUTH_TOKENS") {
            Ok(raw) => AuthConfig::parse(&raw)?,
            Err(_) => AuthConfig::default(),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            onboarding,
            auth,
        })
    }
}

fn read_number<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key, value: raw }),
        Err(_) => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Username rules and client pacing for the profile stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnboardingConfig {
    pub username_min_len: usize,
    pub username_max_len: usize,
    pub username_debounce_ms: u64,
}

impl Default for OnboardingConfig {
    fn default() -> Self {
        Self {
            username_min_len: 3,
            username_max_len: 30,
            username_debounce_ms: 400,
        }
    }
}

/// Bearer tokens accepted by the development authentication adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthConfig {
    pub static_tokens: Vec<StaticToken>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticToken {
    pub token: String,
    pub subject_id: String,
    pub admin: bool,
}

impl AuthConfig {
    /// Parse `token=subject[:admin]` entries separated by commas.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut static_tokens = Vec::new();
        for entry in raw.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
            let (token, rest) = entry
                .split_once('=')
                .ok_or_else(|| ConfigError::InvalidAuthToken(entry.to_string()))?;
            let (subject_id, admin) = match rest.split_once(':') {
                Some((subject, "admin")) => (subject, true),
                Some(_) => return Err(ConfigError::InvalidAuthToken(entry.to_string())),
                None => (rest, false),
            };
            if token.trim().is_empty() || subject_id.trim().is_empty() {
                return Err(ConfigError::InvalidAuthToken(entry.to_string()));
            }
            static_tokens.push(StaticToken {
                token: token.trim().to_string(),
                subject_id: subject_id.trim().to_string(),
                admin,
            });
        }
        Ok(Self { static_tokens })
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str, value: String },
    InvalidUsernameBounds { min: usize, max: usize },
    InvalidAuthToken(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key, value } => {
                write!(f, "{key} must be a non-negative integer (found '{value}')")
            }
            ConfigError::InvalidUsernameBounds { min, max } => write!(
                f,
                "username length bounds must satisfy 0 < min <= max (found {min}..={max})"
            ),
            ConfigError::InvalidAuthToken(entry) => write!(
                f,
                "APP_AUTH_TOKENS entry '{entry}' must look like token=subject or token=subject:admin"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
