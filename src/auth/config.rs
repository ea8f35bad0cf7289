use secrecy::SecretString;

const DEFAULT_ACCESS_TOKEN_TTL_MINUTES: i64 = 15;
const DEFAULT_REFRESH_TOKEN_TTL_MINUTES: i64 = 32312;
const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 20;

/// Immutable process-wide auth configuration, built once at startup.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    secret_key: SecretString,
    access_token_ttl_minutes: i64,
    refresh_token_ttl_minutes: i64,
    rate_limit_per_minute: u32,
}

impl AuthConfig {
    #[must_use]
    pub fn new(secret_key: SecretString) -> Self {
        Self {
            secret_key,
            access_token_ttl_minutes: DEFAULT_ACCESS_TOKEN_TTL_MINUTES,
            refresh_token_ttl_minutes: DEFAULT_REFRESH_TOKEN_TTL_MINUTES,
            rate_limit_per_minute: DEFAULT_RATE_LIMIT_PER_MINUTE,
        }
    }

    #[must_use]
    pub fn with_access_token_ttl_minutes(mut self, minutes: i64) -> Self {
        self.access_token_ttl_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_refresh_token_ttl_minutes(mut self, minutes: i64) -> Self {
        self.refresh_token_ttl_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_rate_limit_per_minute(mut self, limit: u32) -> Self {
        self.rate_limit_per_minute = limit;
        self
    }

    #[must_use]
    pub fn secret_key(&self) -> &SecretString {
        &self.secret_key
    }

    #[must_use]
    pub fn access_token_ttl_minutes(&self) -> i64 {
        self.access_token_ttl_minutes
    }

    #[must_use]
    pub fn refresh_token_ttl_minutes(&self) -> i64 {
        self.refresh_token_ttl_minutes
    }

    #[must_use]
    pub fn rate_limit_per_minute(&self) -> u32 {
        self.rate_limit_per_minute
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_token_lifetimes() {
        let config = AuthConfig::new(SecretString::from("k".to_string()));
        assert_eq!(config.access_token_ttl_minutes(), 15);
        assert_eq!(config.refresh_token_ttl_minutes(), 32312);
        assert_eq!(config.rate_limit_per_minute(), 20);
    }

    #[test]
    fn builders_override_defaults() {
        let config = AuthConfig::new(SecretString::from("k".to_string()))
            .with_access_token_ttl_minutes(5)
            .with_refresh_token_ttl_minutes(60)
            .with_rate_limit_per_minute(3);
        assert_eq!(config.access_token_ttl_minutes(), 5);
        assert_eq!(config.refresh_token_ttl_minutes(), 60);
        assert_eq!(config.rate_limit_per_minute(), 3);
    }
}
