pub mod logger;
pub mod storage;

use crate::{
    auth,
    config::{logger::LoggerConfig, storage::StorageConfig},
    handler, postgres,
};
use envconfig::Envconfig;

#[derive(Envconfig, Debug)]
pub struct Config {
    #[envconfig(nested)]
    pub handler: handler::config::Config,
    #[envconfig(nested)]
    pub auth: auth::config::Config,
    #[envconfig(nested)]
    pub storage: StorageConfig,
    #[envconfig(nested)]
    pub postgres: postgres::config::Config,
    #[envconfig(nested)]
    pub logger: LoggerConfig,
}

pub fn load() -> Result<Config, envconfig::Error> {
    Config::init_from_env()
}
