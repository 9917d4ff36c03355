use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use duckdb::{Connection, params};

use crate::error::NavigatorResult;
use crate::geo::{ZipCentroid, ZipCentroidIndex};
use crate::model::{ProcedurePrice, Provider, Rating};

const SCHEMA_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS providers (
      provider_id TEXT PRIMARY KEY,
      name TEXT NOT NULL,
      city TEXT,
      state TEXT,
      zip TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS drg_prices (
      provider_id TEXT NOT NULL,
      ms_drg_code TEXT NOT NULL,
      ms_drg_description TEXT NOT NULL,
      total_discharges INTEGER,
      avg_covered_charges DECIMAL(12, 2),
      avg_total_payments DECIMAL(12, 2),
      avg_medicare_payments DECIMAL(12, 2),
      PRIMARY KEY (provider_id, ms_drg_code)
    );
    CREATE TABLE IF NOT EXISTS ratings (
      provider_id TEXT PRIMARY KEY,
      rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 10)
    );
    CREATE TABLE IF NOT EXISTS zip_centroids (
      zip5 TEXT PRIMARY KEY,
      lat DOUBLE NOT NULL,
      lon DOUBLE NOT NULL
    );
"#;

/// Shared handle to the DuckDB database.
///
/// Every caller gets its own connection from [`Store::acquire`]; the lock is
/// held only while cloning the root connection.
#[derive(Clone)]
pub struct Store {
    root: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("open duckdb at {}", path.display()))?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> NavigatorResult<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            root: Arc::new(Mutex::new(conn)),
        }
    }

    /// A fresh connection to the same database, released when dropped.
    pub fn acquire(&self) -> NavigatorResult<Connection> {
        let root = self.root.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(root.try_clone()?)
    }

    pub fn ensure_schema(&self) -> NavigatorResult<()> {
        self.acquire()?.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    pub fn ping(&self) -> NavigatorResult<()> {
        let conn = self.acquire()?;
        conn.query_row("SELECT 1", [], |row| row.get::<usize, i32>(0))?;
        Ok(())
    }

    pub fn load_zip_index(&self) -> NavigatorResult<ZipCentroidIndex> {
        let conn = self.acquire()?;
        let mut stmt = conn.prepare("SELECT zip5, lat, lon FROM zip_centroids")?;
        let rows = stmt.query_map([], |row| {
            Ok(ZipCentroid {
                zip5: row.get(0)?,
                lat: row.get(1)?,
                lon: row.get(2)?,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(ZipCentroidIndex::from_centroids(out))
    }

    /// Removes a provider together with its prices and rating.
    pub fn delete_provider(&self, provider_id: &str) -> NavigatorResult<bool> {
        let mut conn = self.acquire()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM ratings WHERE provider_id = ?", [provider_id])?;
        tx.execute("DELETE FROM drg_prices WHERE provider_id = ?", [provider_id])?;
        let removed = tx.execute("DELETE FROM providers WHERE provider_id = ?", [provider_id])?;
        tx.commit()?;
        Ok(removed > 0)
    }

    pub fn counts(&self) -> NavigatorResult<StoreCounts> {
        let conn = self.acquire()?;
        let count = |table: &str| -> NavigatorResult<u64> {
            // table names are fixed below
            let v: i64 =
                conn.query_row(&format!("SELECT COUNT(*)::BIGINT FROM {table}"), [], |row| {
                    row.get(0)
                })?;
            Ok(v.max(0) as u64)
        };
        Ok(StoreCounts {
            providers: count("providers")?,
            prices: count("drg_prices")?,
            ratings: count("ratings")?,
            zip_centroids: count("zip_centroids")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct StoreCounts {
    pub providers: u64,
    pub prices: u64,
    pub ratings: u64,
    pub zip_centroids: u64,
}

// Writers take a plain connection so the loader can run them inside one
// transaction (`duckdb::Transaction` derefs to `Connection`).

pub fn upsert_provider(conn: &Connection, p: &Provider) -> NavigatorResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO providers (provider_id, name, city, state, zip) VALUES (?, ?, ?, ?, ?)",
        params![p.provider_id, p.name, p.city, p.state, p.zip],
    )?;
    Ok(())
}

pub fn upsert_price(conn: &Connection, p: &ProcedurePrice) -> NavigatorResult<()> {
    conn.execute(
        r#"
        INSERT OR REPLACE INTO drg_prices (
          provider_id, ms_drg_code, ms_drg_description, total_discharges,
          avg_covered_charges, avg_total_payments, avg_medicare_payments
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
    "#,
        params![
            p.provider_id,
            p.ms_drg_code,
            p.ms_drg_description,
            p.total_discharges,
            p.avg_covered_charges,
            p.avg_total_payments,
            p.avg_medicare_payments
        ],
    )?;
    Ok(())
}

pub fn upsert_rating(conn: &Connection, provider_id: &str, rating: Rating) -> NavigatorResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO ratings (provider_id, rating) VALUES (?, ?)",
        params![provider_id, rating.get() as i32],
    )?;
    Ok(())
}

/// Makes `zip_centroids` hold exactly `centroids`.
///
/// Upserts first and prunes afterwards: DuckDB rejects re-inserting a key that
/// was deleted earlier in the same transaction.
pub fn replace_zip_centroids(conn: &Connection, centroids: &[ZipCentroid]) -> NavigatorResult<()> {
    conn.execute_batch("CREATE OR REPLACE TEMP TABLE incoming_zips (zip5 TEXT)")?;
    {
        let mut upsert = conn
            .prepare("INSERT OR REPLACE INTO zip_centroids (zip5, lat, lon) VALUES (?, ?, ?)")?;
        let mut seen = conn.prepare("INSERT INTO incoming_zips (zip5) VALUES (?)")?;
        for c in centroids {
            upsert.execute(params![c.zip5, c.lat, c.lon])?;
            seen.execute([&c.zip5])?;
        }
    }
    conn.execute(
        "DELETE FROM zip_centroids WHERE zip5 NOT IN (SELECT zip5 FROM incoming_zips)",
        [],
    )?;
    conn.execute_batch("DROP TABLE incoming_zips")?;
    Ok(())
}
