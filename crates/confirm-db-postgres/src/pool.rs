//! Connection pool for the confirmation store. Sessions run in UTC.

use std::time::Duration;

use sqlx_core::pool::PoolOptions;
use sqlx_postgres::{PgConnectOptions, PgPool, Postgres};
use tracing::{debug, info, instrument};

use crate::config::PostgresConfig;
use crate::error::Result;

pub type PgPoolOptions = PoolOptions<Postgres>;

/// Parses the configured URL and applies the session settings the store
/// relies on.
pub(crate) fn connect_options(config: &PostgresConfig) -> Result<PgConnectOptions> {
    let options = config
        .url
        .parse::<PgConnectOptions>()?
        .application_name(&config.application_name)
        .options([("timezone", "UTC")]);
    Ok(options)
}

/// Idle connections kept open: the configured value, else a quarter of the
/// pool, never zero and never above the pool size.
pub(crate) fn min_idle(config: &PostgresConfig) -> u32 {
    let max = config.pool_size.max(1);
    config.min_connections.unwrap_or(max / 4).clamp(1, max)
}

#[instrument(skip(config))]
pub async fn create_pool(config: &PostgresConfig) -> Result<PgPool> {
    let connect = connect_options(config)?;
    info!(
        host = connect.get_host(),
        port = connect.get_port(),
        database = connect.get_database().unwrap_or_default(),
        pool_size = config.pool_size,
        "Opening confirmation store"
    );

    let mut options = PgPoolOptions::new()
        .max_connections(config.pool_size.max(1))
        .min_connections(min_idle(config))
        .acquire_timeout(Duration::from_millis(config.connect_timeout_ms));
    if let Some(idle_timeout) = config.idle_timeout_ms {
        options = options.idle_timeout(Duration::from_millis(idle_timeout));
    }

    let pool = options.connect_with(connect).await?;
    debug!("Confirmation store pool ready");
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_floor_follows_pool_size() {
        let mut config = PostgresConfig::default().with_pool_size(20);
        assert_eq!(min_idle(&config), 5);

        config.pool_size = 2;
        assert_eq!(min_idle(&config), 1);

        config.min_connections = Some(50);
        assert_eq!(min_idle(&config), 2);

        config.pool_size = 0;
        config.min_connections = None;
        assert_eq!(min_idle(&config), 1);
    }

    #[test]
    fn connect_options_keep_url_target() {
        let config = PostgresConfig::new("postgres://confirm:hunter2@db:6543/confirmations");
        let options = connect_options(&config).unwrap();
        assert_eq!(options.get_host(), "db");
        assert_eq!(options.get_port(), 6543);
        assert_eq!(options.get_database(), Some("confirmations"));
        assert_eq!(options.get_username(), "confirm");
    }

    #[test]
    fn malformed_url_is_rejected() {
        let config = PostgresConfig::new("not a url");
        assert!(connect_options(&config).is_err());
    }
}
