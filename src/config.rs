use std::{env, path::PathBuf};

pub const DEFAULT_PORT: u16 = 4443;
pub const DEFAULT_DATA_FILE: &str = "data.json";
pub const DEFAULT_ADMIN_PASSWORD: &str = "jefecito";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub data_path: PathBuf,
    pub admin_password: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let port = lookup("PORT")
            .and_then(|value| value.trim().parse::<u16>().ok())
            .filter(|port| *port > 0)
            .unwrap_or(DEFAULT_PORT);

        let data_path = lookup("DATA_FILE_PATH")
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_FILE));

        let admin_password = lookup("ADMIN_PASSWORD")
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_ADMIN_PASSWORD.to_string());

        Self {
            port,
            data_path,
            admin_password,
        }
    }

    pub fn uses_default_password(&self) -> bool {
        self.admin_password == DEFAULT_ADMIN_PASSWORD
    }
}
