//! SQL schema for the Doorstep SQLite store.
//!
//! Executed at every connection startup; each statement is `IF NOT EXISTS`,
//! so re-running against an existing database is a no-op. `PRAGMA
//! user_version` records the schema revision for future migrations to gate
//! on.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS addresses (
    address_id   TEXT PRIMARY KEY,
    campaign_id  TEXT NOT NULL,
    lon          REAL NOT NULL,
    lat          REAL NOT NULL,
    formatted    TEXT NOT NULL,
    house_number TEXT,
    street_name  TEXT,
    source_tier  TEXT NOT NULL,  -- 'primary_source' | 'secondary_source' | 'fallback'
    building_id  TEXT,           -- mirrors the primary link, when one exists
    external_id  TEXT
);

CREATE TABLE IF NOT EXISTS buildings (
    building_id TEXT PRIMARY KEY,
    campaign_id TEXT NOT NULL,
    footprint   TEXT,            -- GeoJSON geometry; NULL for point-only entities
    height_m    REAL,
    area_sq_m   REAL NOT NULL DEFAULT 0,
    external_id TEXT,
    tier        TEXT NOT NULL    -- 'primary' | 'secondary' | 'none'
);

-- Primary link tier: direct foreign-key-style association rows.
CREATE TABLE IF NOT EXISTS links (
    link_id     TEXT PRIMARY KEY,
    campaign_id TEXT NOT NULL,
    address_id  TEXT NOT NULL REFERENCES addresses(address_id),
    building_id TEXT NOT NULL REFERENCES buildings(building_id),
    method      TEXT NOT NULL,   -- 'contains' | 'nearby' | 'largest'
    confidence  REAL NOT NULL,
    is_primary  INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL
);

-- At most one primary link per (campaign, address); upsert_link demotes the
-- prior primary inside the same transaction before inserting a new one.
CREATE UNIQUE INDEX IF NOT EXISTS links_primary_idx
    ON links(campaign_id, address_id) WHERE is_primary = 1;

-- Secondary link tier: the explicit join table written by the joined-table
-- ingestion path. Queried independently of the primary tier.
CREATE TABLE IF NOT EXISTS building_addresses (
    campaign_id TEXT NOT NULL,
    building_id TEXT NOT NULL REFERENCES buildings(building_id),
    address_id  TEXT NOT NULL REFERENCES addresses(address_id),
    PRIMARY KEY (campaign_id, building_id, address_id)
);

CREATE TABLE IF NOT EXISTS building_stats (
    entity_id    TEXT PRIMARY KEY,
    campaign_id  TEXT NOT NULL,
    scans_total  INTEGER NOT NULL DEFAULT 0,
    scans_today  INTEGER NOT NULL DEFAULT 0,
    last_scan_at TEXT,
    status       TEXT NOT NULL DEFAULT 'not_visited'
);

CREATE INDEX IF NOT EXISTS addresses_campaign_idx ON addresses(campaign_id);
CREATE INDEX IF NOT EXISTS buildings_campaign_idx ON buildings(campaign_id);
CREATE INDEX IF NOT EXISTS links_address_idx      ON links(address_id);
CREATE INDEX IF NOT EXISTS links_building_idx     ON links(building_id);
CREATE INDEX IF NOT EXISTS stats_campaign_idx     ON building_stats(campaign_id);

PRAGMA user_version = 1;
";
