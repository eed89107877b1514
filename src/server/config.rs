use super::RequestsLoggingLevel;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub host: String,
    pub port: u16,
    /// Static player UI served at `/` when set
    pub frontend_dir_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            requests_logging_level: RequestsLoggingLevel::Path,
            host: crate::config::DEFAULT_HOST.to_string(),
            port: crate::config::DEFAULT_PORT,
            frontend_dir_path: None,
        }
    }
}
