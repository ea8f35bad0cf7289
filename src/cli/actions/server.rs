use crate::{api, auth::AuthConfig, cli::actions::Action};
use anyhow::Result;
use url::Url;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            secret_key,
            access_token_ttl_minutes,
            refresh_token_ttl_minutes,
            rate_limit_per_minute,
        } => {
            // Fail early on malformed connection strings.
            let dsn = Url::parse(&dsn)?;

            let config = AuthConfig::new(secret_key)
                .with_access_token_ttl_minutes(access_token_ttl_minutes)
                .with_refresh_token_ttl_minutes(refresh_token_ttl_minutes)
                .with_rate_limit_per_minute(rate_limit_per_minute);

            api::new(port, dsn.to_string(), config).await?;
        }
    }

    Ok(())
}
