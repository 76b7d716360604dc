use std::time::Duration;

use surrealdb::engine::any::Any;
use surrealdb::Surreal;

/// SurrealDB connection options
#[derive(Clone, Debug)]
pub struct SurrealOpts {
    pub surreal_endpoint: String,
    pub surreal_username: String,
    pub surreal_password: String,
}

impl SurrealOpts {
    /// Embedded engines (`mem://`) have no users to sign in as.
    fn is_embedded(&self) -> bool {
        self.surreal_endpoint.starts_with("mem://")
    }
}

/// Default number of connection retry attempts
const DEFAULT_RETRY_ATTEMPTS: u32 = 5;
/// Default delay between retry attempts in seconds
const DEFAULT_RETRY_DELAY_SECS: u64 = 2;

pub async fn surreal_connect(opts: &SurrealOpts, ns: &str, db: &str) -> anyhow::Result<Surreal<Any>> {
    surreal_connect_with_retries(opts, ns, db, DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY_SECS)
        .await
}

/// Connect to SurrealDB, retrying up to `max_retries` times.
///
/// `http(s)://` endpoints are rewritten to `ws(s)://`.
pub async fn surreal_connect_with_retries(
    opts: &SurrealOpts,
    ns: &str,
    db: &str,
    max_retries: u32,
    retry_delay_secs: u64,
) -> anyhow::Result<Surreal<Any>> {
    let endpoint = opts
        .surreal_endpoint
        .replace("http://", "ws://")
        .replace("https://", "wss://");

    tracing::debug!("Connecting to SurrealDB at {endpoint} (namespace: {ns}, database: {db})");

    let mut last_error = anyhow::anyhow!("no connection attempt made");
    for attempt in 1..=max_retries.max(1) {
        match try_connect(&endpoint, opts, ns, db).await {
            Ok(surreal) => {
                if attempt > 1 {
                    tracing::info!("Connected to SurrealDB after {attempt} attempts");
                }
                return Ok(surreal);
            }
            Err(e) => {
                if attempt < max_retries {
                    tracing::warn!(
                        "Failed to connect to SurrealDB at '{endpoint}' (attempt {attempt}/{max_retries}): {e}. Retrying in {retry_delay_secs}s..."
                    );
                    tokio::time::sleep(Duration::from_secs(retry_delay_secs)).await;
                }
                last_error = e;
            }
        }
    }

    Err(last_error.context(format!(
        "Failed to connect to SurrealDB at '{endpoint}' after {max_retries} attempts"
    )))
}

async fn try_connect(
    endpoint: &str,
    opts: &SurrealOpts,
    ns: &str,
    db: &str,
) -> anyhow::Result<Surreal<Any>> {
    let surreal = surrealdb::engine::any::connect(endpoint)
        .await
        .map_err(|e| anyhow::anyhow!("SurrealDB connection to '{endpoint}' failed: {e}"))?;

    if !opts.is_embedded() {
        let username = &opts.surreal_username;
        surreal
            .signin(surrealdb::opt::auth::Root {
                username,
                password: &opts.surreal_password,
            })
            .await
            .map_err(|e| {
                anyhow::anyhow!("SurrealDB authentication failed (user: '{username}'): {e}")
            })?;
    }

    surreal.use_ns(ns).use_db(db).await.map_err(|e| {
        anyhow::anyhow!("SurrealDB failed to select namespace '{ns}' / database '{db}': {e}")
    })?;

    Ok(surreal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_embedded_skips_signin() {
        let opts = SurrealOpts {
            surreal_endpoint: "mem://".to_string(),
            surreal_username: "root".to_string(),
            surreal_password: "root".to_string(),
        };
        let surreal = surreal_connect_with_retries(&opts, "test", "test", 1, 0)
            .await
            .unwrap();
        surreal.query("RETURN 1").await.unwrap().check().unwrap();
    }
}
