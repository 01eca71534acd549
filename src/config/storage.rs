use envconfig::Envconfig;
use strum::{Display, EnumString};

#[derive(EnumString, Display, Debug, Clone, Copy, PartialEq, Eq)]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Envconfig, Debug, Clone)]
pub struct StorageConfig {
    #[envconfig(from = "STORAGE_BACKEND", default = "postgres")]
    pub backend: StorageBackend,
}
