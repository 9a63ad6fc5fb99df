//! The `CampaignStore` trait.
//!
//! The trait is implemented by storage backends (e.g.
//! `doorstep-store-sqlite`). Higher layers (`doorstep-resolve`,
//! `doorstep-sync`, `doorstep-server`) depend on this abstraction, not on
//! any concrete backend.
//!
//! Two physical link tiers exist and are queried independently: primary link
//! rows (direct foreign-key-style association, mirrored onto
//! `Address::building_id`) and an explicit secondary join table. A campaign
//! may mix buildings populated by either ingestion path, so the resolution
//! chain must consult both.

use std::future::Future;

use uuid::Uuid;

use crate::{
  address::Address,
  building::Building,
  link::{Link, NewLink},
  stats::{BuildingStats, VisitStatus},
};

/// Abstraction over a Doorstep campaign store backend.
///
/// Address, building, and link rows are written once by ingestion and are
/// immutable afterwards, except for the primary-link flag (repaired by
/// re-running the matcher) and the fallback downgrade on addresses. Stats
/// rows are mutated continuously by scan and visit events.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait CampaignStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Addresses ─────────────────────────────────────────────────────────

  /// Persist an address row. Ids are caller-supplied (ingestion owns them).
  fn insert_address(
    &self,
    address: Address,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Retrieve an address by UUID. Returns `None` if not found.
  fn get_address(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Address>, Self::Error>> + Send + '_;

  /// All addresses in a campaign, in insertion order.
  fn list_addresses(
    &self,
    campaign_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Address>, Self::Error>> + Send + '_;

  /// Look up an address by its external parcel identifier,
  /// case-insensitively (providers disagree on id casing across tiers).
  fn address_by_external_id<'a>(
    &'a self,
    campaign_id: Uuid,
    external_id: &'a str,
  ) -> impl Future<Output = Result<Option<Address>, Self::Error>> + Send + 'a;

  /// Fuzzy lookup against stored formatted-address strings. Last resort of
  /// the resolution chain.
  fn address_by_text<'a>(
    &'a self,
    campaign_id: Uuid,
    text: &'a str,
  ) -> impl Future<Output = Result<Option<Address>, Self::Error>> + Send + 'a;

  /// Downgrade an address to the point-only `fallback` tier. Called by the
  /// linker when no footprint matched even after the radius retry.
  fn set_address_fallback(
    &self,
    address_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Buildings ─────────────────────────────────────────────────────────

  fn insert_building(
    &self,
    building: Building,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_building(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Building>, Self::Error>> + Send + '_;

  /// All buildings in a campaign, in insertion order.
  fn list_buildings(
    &self,
    campaign_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Building>, Self::Error>> + Send + '_;

  // ── Links — primary tier ──────────────────────────────────────────────

  /// Persist a link. When `is_primary` is set, any prior primary link for
  /// the same (campaign, address) is demoted in the same transaction, and
  /// the address's `building_id` is updated to match.
  fn upsert_link(
    &self,
    link: NewLink,
  ) -> impl Future<Output = Result<Link, Self::Error>> + Send + '_;

  /// The primary link for an address, if one exists.
  fn primary_link_for_address(
    &self,
    campaign_id: Uuid,
    address_id: Uuid,
  ) -> impl Future<Output = Result<Option<Link>, Self::Error>> + Send + '_;

  /// All links touching a building, primary or not (multi-unit fan-out).
  fn links_for_building(
    &self,
    campaign_id: Uuid,
    building_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Link>, Self::Error>> + Send + '_;

  // ── Links — secondary tier (explicit join table) ──────────────────────

  fn add_secondary_link(
    &self,
    campaign_id: Uuid,
    building_id: Uuid,
    address_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Address ids joined to a building through the secondary tier.
  fn secondary_addresses_for_building(
    &self,
    campaign_id: Uuid,
    building_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send + '_;

  // ── Stats ─────────────────────────────────────────────────────────────

  /// Live counters for one entity (building id, or address id for
  /// point-only records). Returns `None` if the entity was never touched.
  fn stats_for_entity(
    &self,
    entity_id: Uuid,
  ) -> impl Future<Output = Result<Option<BuildingStats>, Self::Error>> + Send + '_;

  /// All stats rows in a campaign; the polling fallback diffs this.
  fn stats_for_campaign(
    &self,
    campaign_id: Uuid,
  ) -> impl Future<Output = Result<Vec<BuildingStats>, Self::Error>> + Send + '_;

  /// Record one QR scan: increments `scans_total` and `scans_today`, sets
  /// `last_scan_at`. `scans_total` never decreases.
  fn record_scan(
    &self,
    campaign_id: Uuid,
    entity_id: Uuid,
  ) -> impl Future<Output = Result<BuildingStats, Self::Error>> + Send + '_;

  /// Set the visit status for an entity, creating the stats row if needed.
  fn set_visit_status(
    &self,
    campaign_id: Uuid,
    entity_id: Uuid,
    status: VisitStatus,
  ) -> impl Future<Output = Result<BuildingStats, Self::Error>> + Send + '_;
}
