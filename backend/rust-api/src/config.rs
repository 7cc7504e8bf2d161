use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
}

impl SmtpConfig {
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub mongo_database: String,
    /// Rate limit counters live in Redis when set, in process memory otherwise.
    pub redis_uri: Option<String>,
    pub jwt_secret: String,
    pub jwt_expire_minutes: i64,
    pub mfa_code_expire_minutes: i64,
    pub frontend_url: String,
    pub cors_origins: Vec<String>,
    pub smtp: SmtpConfig,
    pub email_send_disabled: bool,
    pub openai_api_key: Option<String>,
    /// Lower-cased addresses that become admins on registration.
    pub admin_emails: Vec<String>,
    pub max_failed_attempts: u32,
    pub lockout_minutes: i64,
    pub bcrypt_cost: u32,
    pub rate_limit_enabled: bool,
    pub metrics_auth: String,
    pub bind_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mongo_uri: "mongodb://localhost:27017".to_string(),
            mongo_database: "nihongo".to_string(),
            redis_uri: None,
            jwt_secret: "dev-secret-only-for-local-testing-000000".to_string(),
            jwt_expire_minutes: 60 * 24,
            mfa_code_expire_minutes: 10,
            frontend_url: "http://localhost:3000".to_string(),
            cors_origins: vec!["http://localhost:3000".to_string()],
            smtp: SmtpConfig {
                host: String::new(),
                port: 587,
                user: String::new(),
                password: String::new(),
                from_email: "noreply@nihongowow.com".to_string(),
                from_name: "NihongoWOW".to_string(),
            },
            email_send_disabled: false,
            openai_api_key: None,
            admin_emails: Vec::new(),
            max_failed_attempts: 10,
            lockout_minutes: 15,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            rate_limit_enabled: true,
            metrics_auth: "admin:changeme".to_string(),
            bind_addr: "0.0.0.0:8000".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        // Determine environment (defaults to dev)
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", app_env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let defaults = Config::default();

        let lookup = |key: &str, var: &str| -> Option<String> {
            settings
                .get_string(key)
                .ok()
                .or_else(|| env::var(var).ok())
                .filter(|value| !value.trim().is_empty())
        };
        let lookup_parsed = |key: &str, var: &str| -> Option<i64> {
            lookup(key, var).and_then(|value| value.trim().parse::<i64>().ok())
        };
        let lookup_flag = |key: &str, var: &str| -> Option<bool> {
            lookup(key, var).map(|value| {
                let value = value.trim();
                value == "1" || value.eq_ignore_ascii_case("true")
            })
        };

        let jwt_secret = match lookup("auth.jwt_secret", "JWT_SECRET") {
            Some(secret) => secret,
            None if app_env == "prod" => {
                return Err(config::ConfigError::Message(
                    "JWT_SECRET must be set in production".to_string(),
                ))
            }
            None => {
                eprintln!("WARNING: Using default JWT_SECRET (dev mode only!)");
                defaults.jwt_secret.clone()
            }
        };
        if app_env == "prod" && jwt_secret.len() < 32 {
            return Err(config::ConfigError::Message(
                "JWT_SECRET must be at least 32 characters long".to_string(),
            ));
        }

        let split_list = |raw: String| -> Vec<String> {
            raw.split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect()
        };

        Ok(Config {
            mongo_uri: lookup("database.mongo_uri", "MONGO_URI").unwrap_or(defaults.mongo_uri),
            mongo_database: lookup("database.mongo_database", "MONGO_DATABASE")
                .unwrap_or(defaults.mongo_database),
            redis_uri: lookup("redis.uri", "REDIS_URI"),
            jwt_secret,
            jwt_expire_minutes: lookup_parsed("auth.jwt_expire_minutes", "JWT_EXPIRE_MINUTES")
                .unwrap_or(defaults.jwt_expire_minutes),
            mfa_code_expire_minutes: lookup_parsed(
                "auth.mfa_code_expire_minutes",
                "MFA_CODE_EXPIRE_MINUTES",
            )
            .unwrap_or(defaults.mfa_code_expire_minutes),
            frontend_url: lookup("frontend.url", "FRONTEND_URL").unwrap_or(defaults.frontend_url),
            cors_origins: lookup("frontend.cors_origins", "CORS_ORIGINS")
                .map(split_list)
                .unwrap_or(defaults.cors_origins),
            smtp: SmtpConfig {
                host: lookup("smtp.host", "SMTP_HOST").unwrap_or_default(),
                port: lookup_parsed("smtp.port", "SMTP_PORT")
                    .and_then(|port| u16::try_from(port).ok())
                    .unwrap_or(defaults.smtp.port),
                user: lookup("smtp.user", "SMTP_USER").unwrap_or_default(),
                password: lookup("smtp.password", "SMTP_PASSWORD").unwrap_or_default(),
                from_email: lookup("smtp.from_email", "SMTP_FROM_EMAIL")
                    .unwrap_or(defaults.smtp.from_email),
                from_name: lookup("smtp.from_name", "SMTP_FROM_NAME")
                    .unwrap_or(defaults.smtp.from_name),
            },
            email_send_disabled: lookup_flag("smtp.send_disabled", "EMAIL_SEND_DISABLED")
                .unwrap_or(defaults.email_send_disabled),
            openai_api_key: lookup("openai.api_key", "OPENAI_API_KEY"),
            admin_emails: lookup("auth.admin_emails", "ADMIN_EMAILS")
                .map(|raw| {
                    split_list(raw)
                        .into_iter()
                        .map(|email| email.to_lowercase())
                        .collect()
                })
                .unwrap_or_default(),
            max_failed_attempts: lookup_parsed("auth.max_failed_attempts", "MAX_FAILED_ATTEMPTS")
                .and_then(|value| u32::try_from(value).ok())
                .unwrap_or(defaults.max_failed_attempts),
            lockout_minutes: lookup_parsed("auth.lockout_minutes", "LOCKOUT_MINUTES")
                .unwrap_or(defaults.lockout_minutes),
            bcrypt_cost: lookup_parsed("auth.bcrypt_cost", "BCRYPT_COST")
                .and_then(|cost| u32::try_from(cost).ok())
                .unwrap_or(defaults.bcrypt_cost),
            rate_limit_enabled: lookup_flag("rate_limit.disabled", "RATE_LIMIT_DISABLED")
                .map(|disabled| !disabled)
                .unwrap_or(defaults.rate_limit_enabled),
            metrics_auth: lookup("metrics.auth", "METRICS_AUTH").unwrap_or(defaults.metrics_auth),
            bind_addr: lookup("server.bind_addr", "BIND_ADDR").unwrap_or(defaults.bind_addr),
        })
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        self.admin_emails.iter().any(|admin| *admin == email)
    }

    pub fn ai_enabled(&self) -> bool {
        self.openai_api_key.is_some()
    }
}
