//! Client settings gathered from flags and environment

use clap::Args;
use std::time::Duration;

/// Connection and staging settings shared by every command.
#[derive(Debug, Clone, Args)]
pub struct ClientSettings {
    /// Base URL of the Launchpad API.
    #[arg(long, env = "LAUNCHPAD_API_URL", default_value = "http://127.0.0.1:8030", global = true)]
    pub api_url: String,

    /// Base URL for WebSocket calls; derived from the API URL when unset.
    #[arg(long, env = "LAUNCHPAD_WS_URL", global = true)]
    pub ws_url: Option<String>,

    /// Organization the application belongs to.
    #[arg(long, short = 'o', env = "LAUNCHPAD_ORG", default_value = "workspace", global = true)]
    pub org: String,

    /// Seconds to wait for staging to finish.
    #[arg(long, env = "LAUNCHPAD_STAGING_TIMEOUT", default_value_t = 600, global = true)]
    pub staging_timeout: u64,

    /// Namespace the staging pipeline runs in.
    #[arg(
        long,
        env = "LAUNCHPAD_STAGING_NAMESPACE",
        default_value = "launchpad-staging",
        global = true
    )]
    pub staging_namespace: String,
}

impl ClientSettings {
    /// WebSocket base URL, `ws(s)://` for an `http(s)://` API URL.
    #[must_use]
    pub fn ws_base(&self) -> String {
        if let Some(url) = &self.ws_url {
            return url.clone();
        }
        if let Some(rest) = self.api_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.api_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.api_url.clone()
        }
    }

    #[must_use]
    pub fn staging_timeout(&self) -> Duration {
        Duration::from_secs(self.staging_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        settings: ClientSettings,
    }

    #[test]
    fn ws_url_follows_api_scheme() {
        let cli = TestCli::parse_from(["launchpad", "--api-url", "https://api.example.com"]);
        assert_eq!(cli.settings.ws_base(), "wss://api.example.com");

        let cli = TestCli::parse_from(["launchpad", "--api-url", "http://10.0.0.1:8030"]);
        assert_eq!(cli.settings.ws_base(), "ws://10.0.0.1:8030");
    }

    #[test]
    fn explicit_ws_url_wins() {
        let cli = TestCli::parse_from([
            "launchpad",
            "--api-url",
            "https://api.example.com",
            "--ws-url",
            "wss://logs.example.com",
        ]);
        assert_eq!(cli.settings.ws_base(), "wss://logs.example.com");
        assert_eq!(cli.settings.staging_timeout(), Duration::from_secs(600));
    }
}
