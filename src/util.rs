use reqwest::RequestBuilder;

/// Sentinel username selecting bearer-token authentication: the configured
/// password is then sent as the bearer token instead of basic credentials.
pub const BEARER_TOKEN_USER: &str = "_bearer";

/// Applies the configured credentials to an outgoing request.
pub fn apply_auth(request: RequestBuilder, username: Option<&str>, password: Option<&str>) -> RequestBuilder {
    match username {
        Some(user) if user == BEARER_TOKEN_USER => request.bearer_auth(password.unwrap_or_default()),
        Some(user) => request.basic_auth(user, password),
        None => request,
    }
}

const AGENT_CONFIG: &str = "AGENT_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "./agent.json";

pub fn get_config_path() -> String {
    let path_from_env = std::env::var(AGENT_CONFIG);
    path_from_env.unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

const AGENT_SYNC_URL: &str = "AGENT_SYNC_URL";

pub fn get_sync_url() -> Option<String> {
    let url_from_env = std::env::var(AGENT_SYNC_URL);
    url_from_env.ok()
}
