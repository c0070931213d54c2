//! Functions configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `GCP_PROJECT_ID` - Google Cloud project (falls back to `GOOGLE_CLOUD_PROJECT`)
//! - `STRIPE_SECRET_KEY` - Stripe secret API key
//!
//! ## Optional
//! - `FUNCTIONS_HOST` - Bind address (default: 0.0.0.0)
//! - `PORT` - Listen port (default: 8080)
//! - `FIRESTORE_DATABASE` - Firestore database ID (default: `(default)`)
//! - `STORAGE_BUCKET` - Cloud Storage bucket (default: `{project}.appspot.com`)
//! - `FIRESTORE_EMULATOR_HOST` - `host:port` of a Firestore emulator
//! - `STORAGE_EMULATOR_HOST` - `host:port` of a Cloud Storage emulator
//! - `GOOGLE_ACCESS_TOKEN` - Static OAuth token (default: metadata server)
//! - `STRIPE_API_BASE` - Stripe API base URL (default: <https://api.stripe.com/v1>)
//! - `DEFAULT_AVATAR_URL` - Avatar for accounts created without a photo
//! - `DEFAULT_DISPLAY_NAME` - Name for accounts created without one (default: `new user`)
//! - `AWAIT_BULK_DELETES` - Wait for item image deletion before responding (default: true)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use secrecy::SecretString;
use thiserror::Error;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_FIRESTORE_DATABASE: &str = "(default)";
const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com/v1";
pub const DEFAULT_DISPLAY_NAME: &str = "new user";
pub const DEFAULT_AVATAR_URL: &str = "https://firebasestorage.googleapis.com/v0/b/shareapp-rrd.appspot.com/o/profile_pics%2Fnew_user.png?alt=media&token=60762aec-fa4f-42cd-9d4b-656bd92aeb6d";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "insert",
    "put-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Functions service configuration.
#[derive(Debug, Clone)]
pub struct FunctionsConfig {
    /// IP address to bind the trigger server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Firestore and Cloud Storage settings
    pub google: GoogleConfig,
    /// Stripe API settings
    pub stripe: StripeConfig,
    /// Values used for accounts created without a photo or name
    pub profile_defaults: ProfileDefaults,
    /// Whether trigger responses wait for bulk image deletion
    pub await_bulk_deletes: bool,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "staging", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
}

/// Google Cloud settings shared by the Firestore and Cloud Storage clients.
///
/// Implements `Debug` manually to redact the access token.
#[derive(Clone)]
pub struct GoogleConfig {
    /// Project ID
    pub project_id: String,
    /// Firestore database ID
    pub database: String,
    /// Bucket holding profile and item images
    pub bucket: String,
    /// Firestore emulator `host:port`
    pub firestore_emulator_host: Option<String>,
    /// Cloud Storage emulator `host:port`
    pub storage_emulator_host: Option<String>,
    /// Static OAuth access token; the metadata server is used when unset
    pub access_token: Option<SecretString>,
}

impl std::fmt::Debug for GoogleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleConfig")
            .field("project_id", &self.project_id)
            .field("database", &self.database)
            .field("bucket", &self.bucket)
            .field("firestore_emulator_host", &self.firestore_emulator_host)
            .field("storage_emulator_host", &self.storage_emulator_host)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Stripe API configuration.
///
/// Implements `Debug` manually to redact the secret key.
#[derive(Clone)]
pub struct StripeConfig {
    /// Secret API key (`sk_live_...` / `sk_test_...`)
    pub secret_key: SecretString,
    /// API base URL without trailing slash
    pub api_base: String,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// Fallback values for user profiles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileDefaults {
    pub avatar_url: String,
    pub display_name: String,
}

impl Default for ProfileDefaults {
    fn default() -> Self {
        Self {
            avatar_url: DEFAULT_AVATAR_URL.to_string(),
            display_name: DEFAULT_DISPLAY_NAME.to_string(),
        }
    }
}

/// Reads one variable; `std::env::var` in production, a map in tests.
type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

impl FunctionsConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the Stripe key fails validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(&|key: &str| std::env::var(key).ok())
    }

    fn from_lookup(env: Lookup<'_>) -> Result<Self, ConfigError> {
        let host = get_env_or_default(env, "FUNCTIONS_HOST", "0.0.0.0")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("FUNCTIONS_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default(env, "PORT", "8080")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("PORT".to_string(), e.to_string()))?;

        let google = GoogleConfig::from_lookup(env)?;
        let stripe = StripeConfig::from_lookup(env)?;
        let profile_defaults = ProfileDefaults {
            avatar_url: get_env_or_default(env, "DEFAULT_AVATAR_URL", DEFAULT_AVATAR_URL),
            display_name: get_env_or_default(env, "DEFAULT_DISPLAY_NAME", DEFAULT_DISPLAY_NAME),
        };
        let await_bulk_deletes = parse_bool(
            "AWAIT_BULK_DELETES",
            &get_env_or_default(env, "AWAIT_BULK_DELETES", "true"),
        )?;

        let sentry_dsn = env("SENTRY_DSN");
        let sentry_environment = env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.1);

        Ok(Self {
            host,
            port,
            google,
            stripe,
            profile_defaults,
            await_bulk_deletes,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl GoogleConfig {
    fn from_lookup(env: Lookup<'_>) -> Result<Self, ConfigError> {
        let project_id = env("GCP_PROJECT_ID")
            .or_else(|| env("GOOGLE_CLOUD_PROJECT"))
            .ok_or_else(|| ConfigError::MissingEnvVar("GCP_PROJECT_ID".to_string()))?;
        let bucket =
            env("STORAGE_BUCKET").unwrap_or_else(|| format!("{project_id}.appspot.com"));

        Ok(Self {
            database: get_env_or_default(env, "FIRESTORE_DATABASE", DEFAULT_FIRESTORE_DATABASE),
            bucket,
            firestore_emulator_host: env("FIRESTORE_EMULATOR_HOST"),
            storage_emulator_host: env("STORAGE_EMULATOR_HOST"),
            access_token: env("GOOGLE_ACCESS_TOKEN").map(SecretString::from),
            project_id,
        })
    }
}

impl StripeConfig {
    fn from_lookup(env: Lookup<'_>) -> Result<Self, ConfigError> {
        let secret_key = get_required_env(env, "STRIPE_SECRET_KEY")?;
        validate_secret_strength(&secret_key, "STRIPE_SECRET_KEY")?;

        let api_base = get_env_or_default(env, "STRIPE_API_BASE", DEFAULT_STRIPE_API_BASE)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            secret_key: SecretString::from(secret_key),
            api_base,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(env: Lookup<'_>, key: &str) -> Result<String, ConfigError> {
    env(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an environment variable with a default value.
fn get_env_or_default(env: Lookup<'_>, key: &str, default: &str) -> String {
    env(key).unwrap_or_else(|| default.to_string())
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("expected a boolean, got '{other}'"),
        )),
    }
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    const STRIPE_KEY: &str = "sk_test_51Hq8ZkLm3Nv7Qw2Rt9Yp4Xc6Bd1Fg0Jh";

    fn load(vars: &[(&str, &str)]) -> Result<FunctionsConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        FunctionsConfig::from_lookup(&|key: &str| map.get(key).cloned())
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config = load(&[
            ("GCP_PROJECT_ID", "shareapp-rrd"),
            ("STRIPE_SECRET_KEY", STRIPE_KEY),
        ])
        .unwrap();

        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:8080");
        assert_eq!(config.google.database, "(default)");
        assert_eq!(config.google.bucket, "shareapp-rrd.appspot.com");
        assert!(config.google.access_token.is_none());
        assert_eq!(config.stripe.api_base, "https://api.stripe.com/v1");
        assert_eq!(config.stripe.secret_key.expose_secret(), STRIPE_KEY);
        assert_eq!(config.profile_defaults, ProfileDefaults::default());
        assert!(config.await_bulk_deletes);
    }

    #[test]
    fn test_project_falls_back_to_google_cloud_project() {
        let config = load(&[
            ("GOOGLE_CLOUD_PROJECT", "fallback-project"),
            ("STRIPE_SECRET_KEY", STRIPE_KEY),
            ("STORAGE_BUCKET", "images-bucket"),
        ])
        .unwrap();
        assert_eq!(config.google.project_id, "fallback-project");
        assert_eq!(config.google.bucket, "images-bucket");
    }

    #[test]
    fn test_missing_project() {
        let err = load(&[("STRIPE_SECRET_KEY", STRIPE_KEY)]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref v) if v == "GCP_PROJECT_ID"));
    }

    #[test]
    fn test_missing_stripe_key() {
        let err = load(&[("GCP_PROJECT_ID", "p")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref v) if v == "STRIPE_SECRET_KEY"));
    }

    #[test]
    fn test_placeholder_stripe_key_rejected() {
        let err = load(&[
            ("GCP_PROJECT_ID", "p"),
            ("STRIPE_SECRET_KEY", "sk_test_your-key-here"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_invalid_port() {
        let err = load(&[
            ("GCP_PROJECT_ID", "p"),
            ("STRIPE_SECRET_KEY", STRIPE_KEY),
            ("PORT", "eighty"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(ref v, _) if v == "PORT"));
    }

    #[test]
    fn test_await_bulk_deletes_flag() {
        let config = load(&[
            ("GCP_PROJECT_ID", "p"),
            ("STRIPE_SECRET_KEY", STRIPE_KEY),
            ("AWAIT_BULK_DELETES", "false"),
        ])
        .unwrap();
        assert!(!config.await_bulk_deletes);

        let err = load(&[
            ("GCP_PROJECT_ID", "p"),
            ("STRIPE_SECRET_KEY", STRIPE_KEY),
            ("AWAIT_BULK_DELETES", "sometimes"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(_, _)));
    }

    #[test]
    fn test_stripe_api_base_trailing_slash() {
        let config = load(&[
            ("GCP_PROJECT_ID", "p"),
            ("STRIPE_SECRET_KEY", STRIPE_KEY),
            ("STRIPE_API_BASE", "http://localhost:12111/v1/"),
        ])
        .unwrap();
        assert_eq!(config.stripe.api_base, "http://localhost:12111/v1");
    }

    #[test]
    fn test_shannon_entropy() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("ab") - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_low_entropy_secret_rejected() {
        let result = validate_secret_strength("sk_aaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = load(&[
            ("GCP_PROJECT_ID", "p"),
            ("STRIPE_SECRET_KEY", STRIPE_KEY),
            ("GOOGLE_ACCESS_TOKEN", "ya29.super-secret-token"),
        ])
        .unwrap();

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(debug_output.contains("api.stripe.com"));
        assert!(!debug_output.contains(STRIPE_KEY));
        assert!(!debug_output.contains("super-secret-token"));
    }
}
