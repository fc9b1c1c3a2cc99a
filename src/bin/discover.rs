//! Run a discovery against a real server, and print what was found
//!
//! `DAVLINK_BASE` is the account URL or e-mail address, `DAVLINK_TOKEN` an optional bearer token.

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use davlink::config::AccountInfo;
use davlink::auth::{AccountStore, AuthenticatingPipeline, Credentials, OAuthConfig, SessionRegistry};
use davlink::dns::HickoryResolver;
use davlink::http::ReqwestTransport;
use davlink::utils::print_configuration;
use davlink::{Result, ServiceDiscoveryEngine, Settings};

const ACCOUNT: &str = "demo";

/// Credentials that come from the environment, and are never persisted
struct EnvAccountStore {
    token: Option<String>,
}

#[async_trait]
impl AccountStore for EnvAccountStore {
    async fn credentials(&self, _account: &str) -> Result<Credentials> {
        Ok(Credentials::new(self.token.clone(), None))
    }
    async fn set_credentials(&self, account: &str, _credentials: Credentials) -> Result<()> {
        log::info!("Not persisting the new credentials of {}", account);
        Ok(())
    }
    async fn accounts(&self) -> Result<Vec<String>> {
        Ok(vec![ACCOUNT.to_string()])
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let account = match std::env::var("DAVLINK_BASE") {
        Ok(base) => AccountInfo { id: ACCOUNT.to_string(), base },
        Err(_) => {
            eprintln!("Please set DAVLINK_BASE to an account URL or e-mail address");
            std::process::exit(1);
        },
    };

    if let Err(err) = run(&account).await {
        eprintln!("Discovery failed: {}", err);
        std::process::exit(1);
    }
}

async fn run(account: &AccountInfo) -> Result<()> {
    let settings = Settings::default();
    let store = Arc::new(EnvAccountStore { token: std::env::var("DAVLINK_TOKEN").ok() });
    let oauth = OAuthConfig {
        issuer: Url::parse(&std::env::var("DAVLINK_ISSUER").unwrap_or_else(|_| "https://localhost/".to_string()))?,
        client_id: "davlink-demo".to_string(),
    };

    let registry = SessionRegistry::new();
    let transport = Arc::new(ReqwestTransport::new(&settings.user_agent)?);
    let pipeline = AuthenticatingPipeline::new(&registry, &account.id, transport, store, oauth)
        .with_unauthorized_callback(Arc::new(|account: &str| eprintln!("{} is not authorized, check DAVLINK_TOKEN", account)));

    let engine = ServiceDiscoveryEngine::new(Arc::new(pipeline), Arc::new(HickoryResolver::from_system_conf()?), account.base.as_str());
    let config = engine.find_initial_configuration_with_timeout(settings.discovery_timeout()).await?;

    print_configuration(&config);
    println!("\n{}", config.logs);
    Ok(())
}
