use crate::api;
use crate::auth::AuthConfig;
use anyhow::Result;
use secrecy::SecretString;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: SecretString,
    pub cache_url: String,
    pub config: AuthConfig,
}

/// Handle the server action
pub async fn execute(args: Args) -> Result<()> {
    api::new(args.port, &args.dsn, &args.cache_url, args.config).await?;

    Ok(())
}
