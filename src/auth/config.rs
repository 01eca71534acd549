use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "ACCESS_TOKEN_SECRET")]
    pub access_token_secret: String,
    #[envconfig(from = "ACCESS_TOKEN_TTL_SECS", default = "86400")]
    pub access_token_ttl_secs: i64,

    #[envconfig(from = "REFRESH_TOKEN_SECRET")]
    pub refresh_token_secret: String,
    #[envconfig(from = "REFRESH_TOKEN_TTL_SECS", default = "864000")]
    pub refresh_token_ttl_secs: i64,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("access_token_secret", &"<redacted>")
            .field("access_token_ttl_secs", &self.access_token_ttl_secs)
            .field("refresh_token_secret", &"<redacted>")
            .field("refresh_token_ttl_secs", &self.refresh_token_ttl_secs)
            .finish()
    }
}
