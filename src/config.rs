use std::env;

use thiserror::Error;

pub const DB_URL_KEY: &str = "BISO_DB_URL";
pub const ADMIN_KEY_KEY: &str = "BISO_ADMIN_KEY";
pub const BIND_ADDR_KEY: &str = "BISO_BIND_ADDR";
pub const MAX_CONNECTIONS_KEY: &str = "BISO_DB_MAX_CONNECTIONS";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_MAX_CONNECTIONS: u32 = 4;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Key {0} not found in environment")]
    Missing(&'static str),
    #[error("Invalid value for {key}: [{value}]")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Storage {
    Postgres(String),
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub storage: Storage,
    pub admin_key: String,
    pub bind_addr: String,
    pub max_connections: u32,
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        Config::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
        where F: Fn(&str) -> Option<String>
    {
        let value = |key: &str| lookup(key)
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty());

        let storage = match value(DB_URL_KEY) {
            Some(url) => Storage::Postgres(url),
            None => {
                warn!("{} not set, votes are kept in memory only", DB_URL_KEY);
                Storage::Memory
            }
        };

        let admin_key = value(ADMIN_KEY_KEY).ok_or(ConfigError::Missing(ADMIN_KEY_KEY))?;

        let bind_addr = value(BIND_ADDR_KEY).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_owned());

        let max_connections = match value(MAX_CONNECTIONS_KEY) {
            Some(raw) => match raw.parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => return Err(ConfigError::Invalid { key: MAX_CONNECTIONS_KEY, value: raw }),
            },
            None => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Config {
            storage,
            admin_key,
            bind_addr,
            max_connections,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars.iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_to_memory_store() {
        let config = config(&[(ADMIN_KEY_KEY, "secret")]).unwrap();
        assert_eq!(Storage::Memory, config.storage);
        assert_eq!("secret", config.admin_key);
        assert_eq!(DEFAULT_BIND_ADDR, config.bind_addr);
        assert_eq!(4, config.max_connections);
    }

    #[test]
    fn reads_every_key() {
        let config = config(&[
            (DB_URL_KEY, "postgres://localhost/biso"),
            (ADMIN_KEY_KEY, "secret"),
            (BIND_ADDR_KEY, "127.0.0.1:9000"),
            (MAX_CONNECTIONS_KEY, "10"),
        ]).unwrap();
        assert_eq!(Storage::Postgres("postgres://localhost/biso".to_owned()), config.storage);
        assert_eq!("127.0.0.1:9000", config.bind_addr);
        assert_eq!(10, config.max_connections);
    }

    #[test]
    fn admin_key_is_required() {
        assert_eq!(Err(ConfigError::Missing(ADMIN_KEY_KEY)), config(&[]));
        assert_eq!(Err(ConfigError::Missing(ADMIN_KEY_KEY)), config(&[(ADMIN_KEY_KEY, "  ")]));
    }

    #[test]
    fn rejects_bad_pool_size() {
        for raw in &["zero", "0", "-1"] {
            match config(&[(ADMIN_KEY_KEY, "secret"), (MAX_CONNECTIONS_KEY, raw)]) {
                Err(ConfigError::Invalid { key, value }) => {
                    assert_eq!(MAX_CONNECTIONS_KEY, key);
                    assert_eq!(*raw, value);
                }
                other => panic!("Expected Invalid {:?}", other),
            }
        }
    }
}
