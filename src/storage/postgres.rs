//! A [`Store`] backed by Postgres via `sqlx`.

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, QueryBuilder, Row};

use crate::config::DatabaseConfig;
use crate::errors::GeoError;
use crate::model::Geolocation;

use super::{Store, GEOLOCATION_TABLE};

/// Postgres' `unique_violation` error code.
/// https://www.postgresql.org/docs/current/errcodes-appendix.html
const UNIQUE_VIOLATION: &str = "23505";

/// A [`Store`] implementation over a pooled Postgres connection.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Open a connection pool sized per `cfg`. Created once, at Supervisor
    /// init, and shared by every reader of the store.
    pub async fn connect(cfg: &DatabaseConfig) -> Result<Self, GeoError> {
        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_open_conns)
            .min_connections(cfg.max_idle_conns)
            .max_lifetime(cfg.max_lifetime())
            .connect(&cfg.dsn)
            .await
            .map_err(|err| GeoError::Setup(format!("connecting to database: {}", err)))?;

        Ok(PostgresStore { pool })
    }

    /// Construct directly from an already-open pool, e.g. one shared with
    /// another component.
    pub fn from_pool(pool: PgPool) -> Self {
        PostgresStore { pool }
    }

    /// The underlying pool, so the Supervisor can register its own
    /// resource-release hook for it.
    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }

    fn row_to_geolocation(row: PgRow) -> Geolocation {
        Geolocation {
            ip_address: row.get("ip_address"),
            country_code: row.get("country_code"),
            country: row.get("country"),
            city: row.get("city"),
            latitude: row.get("latitude"),
            longitude: row.get("longitude"),
            mystery_value: row.get("mystery_value"),
        }
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn insert_batch(&self, records: &[Geolocation]) -> Result<(), GeoError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut query = QueryBuilder::new(format!(
            "insert into {} (ip_address, country_code, country, city, latitude, longitude, mystery_value) ",
            GEOLOCATION_TABLE
        ));

        query.push_values(records, |mut row, record| {
            row.push_bind(&record.ip_address)
                .push_bind(&record.country_code)
                .push_bind(&record.country)
                .push_bind(&record.city)
                .push_bind(record.latitude)
                .push_bind(record.longitude)
                .push_bind(record.mystery_value);
        });

        query.build().execute(&self.pool).await.map_err(map_insert_error)?;

        Ok(())
    }

    async fn find_by_ip(&self, ip: &str) -> Result<Geolocation, GeoError> {
        let row = sqlx::query(&format!(
            "select ip_address, country_code, country, city, latitude, longitude, mystery_value \
             from {} where ip_address = $1",
            GEOLOCATION_TABLE
        ))
        .bind(ip)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| GeoError::StoreFailure(err.to_string()))?;

        row.map(PostgresStore::row_to_geolocation).ok_or(GeoError::NotFound)
    }
}

/// Map a batch-insert failure to the domain taxonomy: a unique violation
/// becomes [`GeoError::AlreadyExists`], everything else is passed through
/// as [`GeoError::StoreFailure`] with the driver's own message.
fn map_insert_error(err: sqlx::Error) -> GeoError {
    if is_unique_violation(&err) {
        GeoError::AlreadyExists
    } else {
        GeoError::StoreFailure(err.to_string())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err.as_database_error() {
        Some(db_err) => db_err.code().as_deref() == Some(UNIQUE_VIOLATION),
        None => false,
    }
}
