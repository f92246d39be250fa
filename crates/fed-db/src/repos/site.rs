//! Site repository. Sites are created on first observation by name.

use fed_core::entities::Site;
use fed_core::ids::PREFIX_SITE;

use crate::error::DatabaseError;
use crate::service::FedService;

fn row_to_site(row: &libsql::Row) -> Result<Site, DatabaseError> {
    Ok(Site {
        id: row.get::<String>(0)?,
        site_name: row.get::<String>(1)?,
    })
}

impl FedService {
    pub async fn find_site_by_name(&self, site_name: &str) -> Result<Option<Site>, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                "SELECT id, site_name FROM sites WHERE site_name = ?1",
                [site_name],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_site(&row)?)),
            None => Ok(None),
        }
    }

    /// Return the site called `site_name`, creating it if unseen.
    ///
    /// Safe under concurrent calls for the same name: the unique constraint
    /// on `site_name` lets exactly one insert win and everyone reads it back.
    pub async fn find_or_create_site(&self, site_name: &str) -> Result<Site, DatabaseError> {
        if let Some(site) = self.find_site_by_name(site_name).await? {
            return Ok(site);
        }

        let id = self.db().generate_id(PREFIX_SITE).await?;
        let inserted = self
            .db()
            .conn()
            .execute(
                "INSERT INTO sites (id, site_name) VALUES (?1, ?2) ON CONFLICT(site_name) DO NOTHING",
                libsql::params![id.as_str(), site_name],
            )
            .await?;
        if inserted > 0 {
            tracing::info!(site_id = %id, site_name, "registered new site");
        }

        self.find_site_by_name(site_name)
            .await?
            .ok_or(DatabaseError::NoResult)
    }

    pub async fn list_sites(&self) -> Result<Vec<Site>, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query("SELECT id, site_name FROM sites ORDER BY site_name", ())
            .await?;
        let mut sites = Vec::new();
        while let Some(row) = rows.next().await? {
            sites.push(row_to_site(&row)?);
        }
        Ok(sites)
    }
}
