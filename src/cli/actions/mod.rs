pub mod server;

use secrecy::SecretString;

#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: String,
        secret_key: SecretString,
        access_token_ttl_minutes: i64,
        refresh_token_ttl_minutes: i64,
        rate_limit_per_minute: u32,
    },
}
