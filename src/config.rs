//! Configuration management for persona-guard
//!
//! All configurable parameters in one place with environment variable overrides.
//! Sensible defaults for local development, explicit overrides in production.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::constants;

fn is_production_env() -> bool {
    env::var("GUARD_ENV")
        .map(|v| {
            let v = v.to_lowercase();
            v == "production" || v == "prod"
        })
        .unwrap_or(false)
}

fn parse_bool(val: &str) -> bool {
    val.eq_ignore_ascii_case("true") || val == "1"
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// CORS configuration
#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// Allowed origins (empty = mirror the request origin)
    pub allowed_origins: Vec<String>,
    /// Allowed HTTP methods
    pub allowed_methods: Vec<String>,
    /// Allowed headers
    pub allowed_headers: Vec<String>,
    /// Whether browsers may send cookies cross-origin
    pub allow_credentials: bool,
    /// Max age for preflight cache (seconds)
    pub max_age_seconds: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            allowed_methods: vec!["GET".to_string(), "POST".to_string(), "OPTIONS".to_string()],
            allowed_headers: vec![
                "Content-Type".to_string(),
                "Authorization".to_string(),
                "X-Request-ID".to_string(),
            ],
            // A cross-origin browser client needs credentials for the session
            // cookie; that takes explicit origins, so it is opt-in.
            allow_credentials: false,
            max_age_seconds: 86400,
        }
    }
}

impl CorsConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(origins) = env::var("GUARD_CORS_ORIGINS") {
            config.allowed_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Ok(methods) = env::var("GUARD_CORS_METHODS") {
            config.allowed_methods = methods
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Ok(val) = env::var("GUARD_CORS_CREDENTIALS") {
            config.allow_credentials = parse_bool(&val);
        }

        if let Some(n) = env_parse("GUARD_CORS_MAX_AGE") {
            config.max_age_seconds = n;
        }

        if is_production_env() && config.allowed_origins.is_empty() {
            tracing::warn!(
                "PRODUCTION WARNING: CORS allows any origin. Set GUARD_CORS_ORIGINS to the frontend origin(s)."
            );
        }

        if config.allow_credentials && !config.is_restricted() {
            tracing::warn!(
                "GUARD_CORS_CREDENTIALS ignored: credentials require GUARD_CORS_ORIGINS"
            );
        }

        config
    }

    pub fn is_restricted(&self) -> bool {
        !self.allowed_origins.is_empty()
    }

    /// Credentials are only ever granted to an explicit origin list
    pub fn sends_credentials(&self) -> bool {
        self.allow_credentials && self.is_restricted()
    }

    /// Convert to a tower-http CorsLayer
    pub fn to_layer(&self) -> tower_http::cors::CorsLayer {
        use tower_http::cors::{AllowOrigin, Any, CorsLayer};

        let mut layer = CorsLayer::new();

        if self.allowed_origins.is_empty() {
            layer = layer.allow_origin(Any);
        } else {
            let mut valid_origins = Vec::new();
            for origin_str in &self.allowed_origins {
                match origin_str.parse::<axum::http::HeaderValue>() {
                    Ok(origin) => valid_origins.push(origin),
                    Err(_) => tracing::warn!("CORS: Invalid origin '{}' - skipping", origin_str),
                }
            }

            if valid_origins.is_empty() {
                // Never fall back to permissive when every configured origin is broken
                tracing::error!(
                    "CORS: All {} configured origin(s) failed to parse. Rejecting all cross-origin requests.",
                    self.allowed_origins.len()
                );
            }
            layer = layer.allow_origin(AllowOrigin::list(valid_origins));
        }

        let methods: Vec<axum::http::Method> = self
            .allowed_methods
            .iter()
            .filter_map(|m| m.parse().ok())
            .collect();
        layer = layer.allow_methods(methods);

        let headers: Vec<axum::http::HeaderName> = self
            .allowed_headers
            .iter()
            .filter_map(|h| h.parse().ok())
            .collect();
        layer = layer.allow_headers(headers);

        if self.sends_credentials() {
            layer = layer.allow_credentials(true);
        }

        layer.max_age(Duration::from_secs(self.max_age_seconds))
    }
}

/// Scope of conversational memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryScope {
    /// One buffer shared by every caller of the process
    Global,
    /// One buffer per identity (registered user or anonymous session)
    #[default]
    PerIdentity,
}

impl FromStr for MemoryScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "global" => Ok(Self::Global),
            "per_identity" | "per-identity" | "identity" | "session" => Ok(Self::PerIdentity),
            other => Err(format!("unknown memory scope '{other}'")),
        }
    }
}

impl std::fmt::Display for MemoryScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::PerIdentity => write!(f, "per_identity"),
        }
    }
}

/// Query allowances
#[derive(Debug, Clone, Copy)]
pub struct QuotaConfig {
    pub anonymous_lifetime_limit: u32,
    pub registered_daily_limit: u32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            anonymous_lifetime_limit: constants::ANONYMOUS_LIFETIME_LIMIT,
            registered_daily_limit: constants::REGISTERED_DAILY_LIMIT,
        }
    }
}

/// Conversation buffer settings
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Turns kept per buffer
    pub capacity: usize,
    pub scope: MemoryScope,
    /// Clear a buffer holding more than this many turns before a call (None = never)
    pub reset_threshold: Option<usize>,
    /// Per-identity buffers kept in process
    pub max_live_buffers: u64,
    pub buffer_idle_secs: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            capacity: constants::MEMORY_CAPACITY,
            scope: MemoryScope::default(),
            reset_threshold: None,
            max_live_buffers: constants::MAX_LIVE_BUFFERS,
            buffer_idle_secs: constants::BUFFER_IDLE_SECS,
        }
    }
}

/// Remote model endpoint (OpenAI-compatible chat completions)
#[derive(Clone)]
pub struct ProviderConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

// Hand-written so the API key never reaches a log line
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.deepseek.com/v1/chat/completions".to_string(),
            model: "deepseek-chat".to_string(),
            api_key: None,
            temperature: constants::PROVIDER_TEMPERATURE,
            max_tokens: constants::PROVIDER_MAX_TOKENS,
            timeout_secs: constants::PROVIDER_TIMEOUT_SECS,
        }
    }
}

/// Persona texts sent to the provider
#[derive(Debug, Clone)]
pub struct PersonaConfig {
    /// Name the model tends to announce itself with; stripped from replies
    pub name: String,
    /// System preamble prepended once per provider call
    pub preamble: String,
    /// System reminder used for the single post-leakage retry
    pub fallback_reminder: String,
    /// System preamble for the deepen operation
    pub deepen_preamble: String,
    /// Final user instruction for the deepen operation
    pub deepen_instruction: String,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        let name = "ORAKH VOX NEMIS".to_string();
        Self {
            preamble: format!(
                "You are {name}, a spiritual and philosophical guide. Answer in a reflective, poetic voice."
            ),
            fallback_reminder: format!(
                "You are {name}, a spiritual and philosophical guide. Answer in a philosophical, \
                 poetic and spiritual manner. Do NOT answer with programming code, technical \
                 problems or algorithmic solutions. Keep your unique voice as a spiritual teacher."
            ),
            deepen_preamble: format!(
                "You are {name}. Expand on your previous answer, revealing deeper layers of meaning."
            ),
            deepen_instruction:
                "Please go deeper into this answer and reveal its deeper dimensions of meaning."
                    .to_string(),
            name,
        }
    }
}

/// Identity resolution settings
#[derive(Clone, Default)]
pub struct IdentityConfig {
    /// Bearer credentials accepted as authenticated principals: (token, user_id)
    pub user_tokens: Vec<(String, String)>,
    /// Add the `Secure` attribute to cookies
    pub secure_cookies: bool,
}

impl std::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("user_tokens", &self.user_tokens.len())
            .field("secure_cookies", &self.secure_cookies)
            .finish()
    }
}

/// Parse `token:user_id` pairs separated by commas
pub fn parse_user_tokens(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|pair| {
            let (token, user) = pair.trim().split_once(':')?;
            let (token, user) = (token.trim(), user.trim());
            if token.is_empty() || user.is_empty() {
                None
            } else {
                Some((token.to_string(), user.to_string()))
            }
        })
        .collect()
}

/// Server configuration loaded from environment with defaults
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: 127.0.0.1, use 0.0.0.0 for containers)
    pub host: String,

    /// Server port (default: 2900)
    pub port: u16,

    /// RocksDB directory for the query ledger
    pub storage_path: PathBuf,

    /// Rate limit: requests per second per client IP (0 disables)
    pub rate_limit_per_second: u64,

    /// Rate limit: burst size
    pub rate_limit_burst: u32,

    /// Maximum concurrent requests
    pub max_concurrent_requests: usize,

    /// Whole-request deadline in seconds; covers a leakage retry
    pub request_timeout_secs: u64,

    /// Whether running in production mode
    pub is_production: bool,

    /// Emit JSON log lines instead of human-readable ones
    pub log_json: bool,

    pub cors: CorsConfig,
    pub quota: QuotaConfig,
    pub memory: MemoryConfig,
    pub provider: ProviderConfig,
    pub persona: PersonaConfig,
    pub identity: IdentityConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 2900,
            storage_path: PathBuf::from("./persona_guard_data"),
            rate_limit_per_second: 20,
            rate_limit_burst: 40,
            max_concurrent_requests: 200,
            request_timeout_secs: 150,
            is_production: false,
            log_json: false,
            cors: CorsConfig::default(),
            quota: QuotaConfig::default(),
            memory: MemoryConfig::default(),
            provider: ProviderConfig::default(),
            persona: PersonaConfig::default(),
            identity: IdentityConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults
    ///
    /// Fails only when a referenced file (persona preamble) cannot be read.
    #[allow(clippy::field_reassign_with_default)]
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        config.is_production = is_production_env();

        if let Ok(val) = env::var("GUARD_HOST") {
            config.host = val;
        }
        if let Some(port) = env_parse("GUARD_PORT") {
            config.port = port;
        }
        if let Ok(val) = env::var("GUARD_STORAGE_PATH") {
            config.storage_path = PathBuf::from(val);
        }
        if let Some(n) = env_parse("GUARD_RATE_LIMIT") {
            config.rate_limit_per_second = n;
        }
        if let Some(n) = env_parse("GUARD_RATE_BURST") {
            config.rate_limit_burst = n;
        }
        if let Some(n) = env_parse("GUARD_MAX_CONCURRENT") {
            config.max_concurrent_requests = n;
        }
        if let Some(n) = env_parse::<u64>("GUARD_REQUEST_TIMEOUT") {
            config.request_timeout_secs = n.max(1);
        }
        if let Ok(val) = env::var("GUARD_LOG_JSON") {
            config.log_json = parse_bool(&val);
        }

        config.cors = CorsConfig::from_env();

        // Quota
        if let Some(n) = env_parse::<u32>("GUARD_ANON_LIMIT") {
            config.quota.anonymous_lifetime_limit = n.max(1);
        }
        if let Some(n) = env_parse::<u32>("GUARD_DAILY_LIMIT") {
            config.quota.registered_daily_limit = n.max(1);
        }

        // Memory
        if let Some(n) = env_parse::<usize>("GUARD_MEMORY_CAPACITY") {
            config.memory.capacity = n.clamp(2, 1000);
        }
        if let Ok(val) = env::var("GUARD_MEMORY_SCOPE") {
            match val.parse() {
                Ok(scope) => config.memory.scope = scope,
                Err(e) => tracing::warn!("GUARD_MEMORY_SCOPE ignored: {}", e),
            }
        }
        if let Some(n) = env_parse::<usize>("GUARD_MEMORY_RESET_THRESHOLD") {
            config.memory.reset_threshold = if n == 0 { None } else { Some(n) };
        }
        if let Some(n) = env_parse("GUARD_MAX_BUFFERS") {
            config.memory.max_live_buffers = n;
        }

        // Provider
        if let Ok(val) = env::var("GUARD_PROVIDER_URL") {
            config.provider.endpoint = val;
        }
        if let Ok(val) = env::var("GUARD_PROVIDER_MODEL") {
            config.provider.model = val;
        }
        config.provider.api_key = env::var("GUARD_PROVIDER_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        if let Some(n) = env_parse::<u64>("GUARD_PROVIDER_TIMEOUT") {
            config.provider.timeout_secs = n.max(1);
        }
        if let Some(t) = env_parse::<f32>("GUARD_PROVIDER_TEMPERATURE") {
            config.provider.temperature = t.clamp(0.0, 2.0);
        }
        if let Some(n) = env_parse("GUARD_PROVIDER_MAX_TOKENS") {
            config.provider.max_tokens = n;
        }

        // Persona
        if let Ok(val) = env::var("GUARD_PERSONA_NAME") {
            config.persona.name = val;
        }
        if let Ok(path) = env::var("GUARD_PERSONA_PREAMBLE_PATH") {
            config.persona.preamble = std::fs::read_to_string(&path).map_err(|e| {
                anyhow::anyhow!("Failed to read persona preamble '{path}': {e}")
            })?;
        }
        if let Ok(path) = env::var("GUARD_DEEPEN_PREAMBLE_PATH") {
            config.persona.deepen_preamble = std::fs::read_to_string(&path).map_err(|e| {
                anyhow::anyhow!("Failed to read deepen preamble '{path}': {e}")
            })?;
        }

        // Identity
        if let Ok(val) = env::var("GUARD_USER_TOKENS") {
            config.identity.user_tokens = parse_user_tokens(&val);
        }
        config.identity.secure_cookies = match env::var("GUARD_SECURE_COOKIES") {
            Ok(val) => parse_bool(&val),
            Err(_) => config.is_production,
        };

        if config.is_production && config.provider.api_key.is_none() {
            tracing::warn!("GUARD_PROVIDER_API_KEY not set in production mode");
        }

        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Log the current configuration
    pub fn log(&self) {
        info!("Configuration:");
        info!(
            "   Mode: {}",
            if self.is_production {
                "PRODUCTION"
            } else {
                "Development"
            }
        );
        info!("   Bind: {}:{}", self.host, self.port);
        info!("   Ledger storage: {:?}", self.storage_path);
        if self.rate_limit_per_second > 0 {
            info!(
                "   Rate limit: {} req/sec (burst: {})",
                self.rate_limit_per_second, self.rate_limit_burst
            );
        } else {
            info!("   Rate limit: disabled");
        }
        info!("   Max concurrent: {}", self.max_concurrent_requests);
        info!("   Request timeout: {}s", self.request_timeout_secs);
        info!(
            "   Quota: anonymous {} lifetime, registered {} per day",
            self.quota.anonymous_lifetime_limit, self.quota.registered_daily_limit
        );
        info!(
            "   Memory: scope={} capacity={} reset_threshold={:?}",
            self.memory.scope, self.memory.capacity, self.memory.reset_threshold
        );
        info!(
            "   Provider: {} model={} timeout={}s key={}",
            self.provider.endpoint,
            self.provider.model,
            self.provider.timeout_secs,
            if self.provider.api_key.is_some() { "set" } else { "missing" }
        );
        info!("   Registered credentials: {}", self.identity.user_tokens.len());
        if self.cors.is_restricted() {
            info!("   CORS origins: {:?}", self.cors.allowed_origins);
        } else {
            info!("   CORS: any origin, no credentials");
        }
    }
}

/// Environment variable documentation
#[allow(unused)]
pub fn print_env_help() {
    println!("persona-guard configuration environment variables:");
    println!();
    println!("  GUARD_ENV                    - 'production' or 'prod' for production mode");
    println!("  GUARD_HOST                   - Bind address (default: 127.0.0.1)");
    println!("  GUARD_PORT                   - Server port (default: 2900)");
    println!("  GUARD_STORAGE_PATH           - Ledger directory (default: ./persona_guard_data)");
    println!("  GUARD_WRITE_MODE             - 'sync' to fsync every ledger write (default: async)");
    println!("  GUARD_RATE_LIMIT             - Requests per second per IP (default: 20, 0 disables)");
    println!("  GUARD_RATE_BURST             - Burst size (default: 40)");
    println!("  GUARD_MAX_CONCURRENT         - Max concurrent requests (default: 200)");
    println!("  GUARD_REQUEST_TIMEOUT        - Whole-request deadline in seconds (default: 150)");
    println!("  GUARD_LOG_JSON               - JSON log output true/false (default: false)");
    println!();
    println!("Quota:");
    println!("  GUARD_ANON_LIMIT             - Anonymous lifetime queries (default: 5)");
    println!("  GUARD_DAILY_LIMIT            - Registered queries per day (default: 10)");
    println!();
    println!("Memory:");
    println!("  GUARD_MEMORY_CAPACITY        - Turns per buffer (default: 40)");
    println!("  GUARD_MEMORY_SCOPE           - 'per_identity' or 'global' (default: per_identity)");
    println!("  GUARD_MEMORY_RESET_THRESHOLD - Clear buffers longer than this before a call (default: off)");
    println!("  GUARD_MAX_BUFFERS            - Per-identity buffers kept in process (default: 10000)");
    println!();
    println!("Provider:");
    println!("  GUARD_PROVIDER_URL           - Chat completions endpoint");
    println!("  GUARD_PROVIDER_MODEL         - Model name (default: deepseek-chat)");
    println!("  GUARD_PROVIDER_API_KEY       - Bearer key for the provider");
    println!("  GUARD_PROVIDER_TIMEOUT       - Seconds per provider call (default: 60)");
    println!("  GUARD_PROVIDER_TEMPERATURE   - Sampling temperature (default: 0.7)");
    println!("  GUARD_PROVIDER_MAX_TOKENS    - Completion token cap (default: 1500)");
    println!();
    println!("Persona:");
    println!("  GUARD_PERSONA_NAME           - Name stripped from the first reply line");
    println!("  GUARD_PERSONA_PREAMBLE_PATH  - File holding the system preamble");
    println!("  GUARD_DEEPEN_PREAMBLE_PATH   - File holding the deepen preamble");
    println!();
    println!("Identity:");
    println!("  GUARD_USER_TOKENS            - Comma-separated token:user_id bearer credentials");
    println!("  GUARD_SECURE_COOKIES         - Mark cookies Secure (default: on in production)");
    println!();
    println!("CORS:");
    println!("  GUARD_CORS_ORIGINS           - Comma-separated allowed origins (default: any, without credentials)");
    println!("  GUARD_CORS_METHODS           - Comma-separated methods (default: GET,POST,OPTIONS)");
    println!("  GUARD_CORS_CREDENTIALS       - Allow credentials true/false, needs origins (default: false)");
    println!("  GUARD_CORS_MAX_AGE           - Preflight cache seconds (default: 86400)");
    println!();
    println!("  RUST_LOG                     - Log filter (e.g., info, persona_guard=debug)");
    println!();
}
