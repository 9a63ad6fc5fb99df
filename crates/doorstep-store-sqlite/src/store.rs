//! [`SqliteStore`] — the SQLite implementation of [`CampaignStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use doorstep_core::{
  address::Address,
  building::Building,
  link::{Link, NewLink},
  stats::{BuildingStats, VisitStatus},
  store::CampaignStore,
};

use crate::{
  Error, Result,
  encode::{
    RawAddress, RawBuilding, RawLink, RawStats, decode_uuid,
    encode_building_tier, encode_dt, encode_footprint, encode_method,
    encode_source_tier, encode_status, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Row mappers ─────────────────────────────────────────────────────────────

const ADDRESS_COLS: &str = "address_id, campaign_id, lon, lat, formatted, \
                            house_number, street_name, source_tier, \
                            building_id, external_id";

const BUILDING_COLS: &str = "building_id, campaign_id, footprint, height_m, \
                             area_sq_m, external_id, tier";

const LINK_COLS: &str = "link_id, campaign_id, address_id, building_id, \
                         method, confidence, is_primary, created_at";

const STATS_COLS: &str = "entity_id, campaign_id, scans_total, scans_today, \
                          last_scan_at, status";

fn address_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawAddress> {
  Ok(RawAddress {
    address_id:   row.get(0)?,
    campaign_id:  row.get(1)?,
    lon:          row.get(2)?,
    lat:          row.get(3)?,
    formatted:    row.get(4)?,
    house_number: row.get(5)?,
    street_name:  row.get(6)?,
    source_tier:  row.get(7)?,
    building_id:  row.get(8)?,
    external_id:  row.get(9)?,
  })
}

fn building_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawBuilding> {
  Ok(RawBuilding {
    building_id: row.get(0)?,
    campaign_id: row.get(1)?,
    footprint:   row.get(2)?,
    height_m:    row.get(3)?,
    area_sq_m:   row.get(4)?,
    external_id: row.get(5)?,
    tier:        row.get(6)?,
  })
}

fn link_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawLink> {
  Ok(RawLink {
    link_id:     row.get(0)?,
    campaign_id: row.get(1)?,
    address_id:  row.get(2)?,
    building_id: row.get(3)?,
    method:      row.get(4)?,
    confidence:  row.get(5)?,
    is_primary:  row.get(6)?,
    created_at:  row.get(7)?,
  })
}

fn stats_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawStats> {
  Ok(RawStats {
    entity_id:    row.get(0)?,
    campaign_id:  row.get(1)?,
    scans_total:  row.get(2)?,
    scans_today:  row.get(3)?,
    last_scan_at: row.get(4)?,
    status:       row.get(5)?,
  })
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Doorstep campaign store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn stats_row_for(&self, entity_id: Uuid) -> Result<Option<BuildingStats>> {
    let id_str = encode_uuid(entity_id);

    let raw: Option<RawStats> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {STATS_COLS} FROM building_stats WHERE entity_id = ?1"),
              rusqlite::params![id_str],
              stats_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawStats::into_stats).transpose()
  }
}

// ─── CampaignStore impl ──────────────────────────────────────────────────────

impl CampaignStore for SqliteStore {
  type Error = Error;

  // ── Addresses ─────────────────────────────────────────────────────────────

  async fn insert_address(&self, address: Address) -> Result<()> {
    let id_str          = encode_uuid(address.address_id);
    let campaign_str    = encode_uuid(address.campaign_id);
    let tier_str        = encode_source_tier(address.source_tier).to_owned();
    let building_id_str = address.building_id.map(encode_uuid);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO addresses (
             address_id, campaign_id, lon, lat, formatted,
             house_number, street_name, source_tier, building_id, external_id
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          rusqlite::params![
            id_str,
            campaign_str,
            address.lon,
            address.lat,
            address.formatted,
            address.house_number,
            address.street_name,
            tier_str,
            building_id_str,
            address.external_id,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_address(&self, id: Uuid) -> Result<Option<Address>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawAddress> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {ADDRESS_COLS} FROM addresses WHERE address_id = ?1"),
              rusqlite::params![id_str],
              address_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawAddress::into_address).transpose()
  }

  async fn list_addresses(&self, campaign_id: Uuid) -> Result<Vec<Address>> {
    let campaign_str = encode_uuid(campaign_id);

    let raws: Vec<RawAddress> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ADDRESS_COLS} FROM addresses
           WHERE campaign_id = ?1 ORDER BY rowid"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![campaign_str], address_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAddress::into_address).collect()
  }

  async fn address_by_external_id(
    &self,
    campaign_id: Uuid,
    external_id: &str,
  ) -> Result<Option<Address>> {
    let campaign_str = encode_uuid(campaign_id);
    let ext          = external_id.to_owned();

    let raw: Option<RawAddress> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {ADDRESS_COLS} FROM addresses
                 WHERE campaign_id = ?1
                   AND external_id IS NOT NULL
                   AND LOWER(external_id) = LOWER(?2)
                 LIMIT 1"
              ),
              rusqlite::params![campaign_str, ext],
              address_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawAddress::into_address).transpose()
  }

  async fn address_by_text(
    &self,
    campaign_id: Uuid,
    text: &str,
  ) -> Result<Option<Address>> {
    let campaign_str = encode_uuid(campaign_id);
    let pattern      = format!("%{}%", text.trim());

    let raw: Option<RawAddress> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {ADDRESS_COLS} FROM addresses
                 WHERE campaign_id = ?1 AND formatted LIKE ?2
                 ORDER BY LENGTH(formatted) LIMIT 1"
              ),
              rusqlite::params![campaign_str, pattern],
              address_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawAddress::into_address).transpose()
  }

  async fn set_address_fallback(&self, address_id: Uuid) -> Result<()> {
    let id_str = encode_uuid(address_id);

    let updated = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE addresses SET source_tier = 'fallback', building_id = NULL
           WHERE address_id = ?1",
          rusqlite::params![id_str],
        )?)
      })
      .await?;

    if updated == 0 {
      return Err(Error::AddressNotFound(address_id));
    }
    Ok(())
  }

  // ── Buildings ─────────────────────────────────────────────────────────────

  async fn insert_building(&self, building: Building) -> Result<()> {
    let id_str        = encode_uuid(building.building_id);
    let campaign_str  = encode_uuid(building.campaign_id);
    let footprint_str = building
      .footprint
      .as_ref()
      .map(encode_footprint)
      .transpose()?;
    let tier_str      = encode_building_tier(building.tier).to_owned();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO buildings (
             building_id, campaign_id, footprint, height_m,
             area_sq_m, external_id, tier
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            id_str,
            campaign_str,
            footprint_str,
            building.height_m,
            building.area_sq_m,
            building.external_id,
            tier_str,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_building(&self, id: Uuid) -> Result<Option<Building>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawBuilding> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {BUILDING_COLS} FROM buildings WHERE building_id = ?1"),
              rusqlite::params![id_str],
              building_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawBuilding::into_building).transpose()
  }

  async fn list_buildings(&self, campaign_id: Uuid) -> Result<Vec<Building>> {
    let campaign_str = encode_uuid(campaign_id);

    let raws: Vec<RawBuilding> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {BUILDING_COLS} FROM buildings
           WHERE campaign_id = ?1 ORDER BY rowid"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![campaign_str], building_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawBuilding::into_building).collect()
  }

  // ── Links — primary tier ──────────────────────────────────────────────────

  async fn upsert_link(&self, link: NewLink) -> Result<Link> {
    let stored = Link {
      link_id:     Uuid::new_v4(),
      campaign_id: link.campaign_id,
      address_id:  link.address_id,
      building_id: link.building_id,
      method:      link.method,
      confidence:  link.confidence.clamp(0.0, 1.0),
      is_primary:  link.is_primary,
      created_at:  Utc::now(),
    };

    let link_id_str     = encode_uuid(stored.link_id);
    let campaign_str    = encode_uuid(stored.campaign_id);
    let address_id_str  = encode_uuid(stored.address_id);
    let building_id_str = encode_uuid(stored.building_id);
    let method_str      = encode_method(stored.method).to_owned();
    let confidence      = stored.confidence;
    let is_primary      = stored.is_primary;
    let created_at_str  = encode_dt(stored.created_at);

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if is_primary {
          // Demote any prior primary link for this address, then mirror the
          // new association onto the address row.
          tx.execute(
            "UPDATE links SET is_primary = 0
             WHERE campaign_id = ?1 AND address_id = ?2 AND is_primary = 1",
            rusqlite::params![campaign_str, address_id_str],
          )?;
          tx.execute(
            "UPDATE addresses SET building_id = ?1 WHERE address_id = ?2",
            rusqlite::params![building_id_str, address_id_str],
          )?;
        }
        tx.execute(
          "INSERT INTO links (
             link_id, campaign_id, address_id, building_id,
             method, confidence, is_primary, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            link_id_str,
            campaign_str,
            address_id_str,
            building_id_str,
            method_str,
            confidence,
            is_primary,
            created_at_str,
          ],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(stored)
  }

  async fn primary_link_for_address(
    &self,
    campaign_id: Uuid,
    address_id: Uuid,
  ) -> Result<Option<Link>> {
    let campaign_str = encode_uuid(campaign_id);
    let address_str  = encode_uuid(address_id);

    let raw: Option<RawLink> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {LINK_COLS} FROM links
                 WHERE campaign_id = ?1 AND address_id = ?2 AND is_primary = 1"
              ),
              rusqlite::params![campaign_str, address_str],
              link_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawLink::into_link).transpose()
  }

  async fn links_for_building(
    &self,
    campaign_id: Uuid,
    building_id: Uuid,
  ) -> Result<Vec<Link>> {
    let campaign_str = encode_uuid(campaign_id);
    let building_str = encode_uuid(building_id);

    let raws: Vec<RawLink> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {LINK_COLS} FROM links
           WHERE campaign_id = ?1 AND building_id = ?2"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![campaign_str, building_str], link_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawLink::into_link).collect()
  }

  // ── Links — secondary tier ────────────────────────────────────────────────

  async fn add_secondary_link(
    &self,
    campaign_id: Uuid,
    building_id: Uuid,
    address_id: Uuid,
  ) -> Result<()> {
    let campaign_str = encode_uuid(campaign_id);
    let building_str = encode_uuid(building_id);
    let address_str  = encode_uuid(address_id);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR IGNORE INTO building_addresses
             (campaign_id, building_id, address_id)
           VALUES (?1, ?2, ?3)",
          rusqlite::params![campaign_str, building_str, address_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn secondary_addresses_for_building(
    &self,
    campaign_id: Uuid,
    building_id: Uuid,
  ) -> Result<Vec<Uuid>> {
    let campaign_str = encode_uuid(campaign_id);
    let building_str = encode_uuid(building_id);

    let ids: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT address_id FROM building_addresses
           WHERE campaign_id = ?1 AND building_id = ?2",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![campaign_str, building_str], |row| {
            row.get(0)
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    ids.iter().map(|s| decode_uuid(s)).collect()
  }

  // ── Stats ─────────────────────────────────────────────────────────────────

  async fn stats_for_entity(&self, entity_id: Uuid) -> Result<Option<BuildingStats>> {
    self.stats_row_for(entity_id).await
  }

  async fn stats_for_campaign(&self, campaign_id: Uuid) -> Result<Vec<BuildingStats>> {
    let campaign_str = encode_uuid(campaign_id);

    let raws: Vec<RawStats> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {STATS_COLS} FROM building_stats
           WHERE campaign_id = ?1 ORDER BY rowid"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![campaign_str], stats_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawStats::into_stats).collect()
  }

  async fn record_scan(
    &self,
    campaign_id: Uuid,
    entity_id: Uuid,
  ) -> Result<BuildingStats> {
    let campaign_str = encode_uuid(campaign_id);
    let entity_str   = encode_uuid(entity_id);
    let now_str      = encode_dt(Utc::now());

    let raw: RawStats = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO building_stats (entity_id, campaign_id)
           VALUES (?1, ?2)
           ON CONFLICT(entity_id) DO NOTHING",
          rusqlite::params![entity_str, campaign_str],
        )?;
        // Counters only ever go up.
        tx.execute(
          "UPDATE building_stats
           SET scans_total = scans_total + 1,
               scans_today = scans_today + 1,
               last_scan_at = ?2
           WHERE entity_id = ?1",
          rusqlite::params![entity_str, now_str],
        )?;
        let row = tx.query_row(
          &format!("SELECT {STATS_COLS} FROM building_stats WHERE entity_id = ?1"),
          rusqlite::params![entity_str],
          stats_row,
        )?;
        tx.commit()?;
        Ok(row)
      })
      .await?;

    raw.into_stats()
  }

  async fn set_visit_status(
    &self,
    campaign_id: Uuid,
    entity_id: Uuid,
    status: VisitStatus,
  ) -> Result<BuildingStats> {
    let campaign_str = encode_uuid(campaign_id);
    let entity_str   = encode_uuid(entity_id);
    let status_str   = encode_status(status).to_owned();

    let raw: RawStats = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO building_stats (entity_id, campaign_id, status)
           VALUES (?1, ?2, ?3)
           ON CONFLICT(entity_id) DO UPDATE SET status = excluded.status",
          rusqlite::params![entity_str, campaign_str, status_str],
        )?;
        let row = tx.query_row(
          &format!("SELECT {STATS_COLS} FROM building_stats WHERE entity_id = ?1"),
          rusqlite::params![entity_str],
          stats_row,
        )?;
        tx.commit()?;
        Ok(row)
      })
      .await?;

    raw.into_stats()
  }
}
