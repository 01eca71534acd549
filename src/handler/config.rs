use envconfig::Envconfig;

#[derive(Envconfig, Debug, Clone)]
pub struct Config {
    #[envconfig(from = "BASE_URL", default = "http://localhost:8080")]
    pub base_url: String,
    #[envconfig(from = "BIND_ADDRESS", default = "0.0.0.0")]
    pub bind_address: String,
    #[envconfig(from = "PORT", default = "8080")]
    pub port: u16,
    #[envconfig(from = "COOKIE_SECURE", default = "true")]
    pub cookie_secure: bool,
}
