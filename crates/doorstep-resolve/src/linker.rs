//! Campaign-wide linking pass: run the spatial matcher over every address
//! and persist the outcome.

use uuid::Uuid;

use doorstep_core::{link::NewLink, store::CampaignStore};
use doorstep_geo::match_building;

use crate::{Error, Result};

/// Outcome counts from one linking pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkSummary {
  /// Addresses that received a primary link.
  pub linked:   usize,
  /// Addresses downgraded to the point-only fallback tier.
  pub fallback: usize,
}

/// Match every address in `campaign_id` against the campaign's building
/// footprints.
///
/// Matches are persisted as primary links (demoting any prior primary for
/// the address); misses downgrade the address to the fallback tier. Safe to
/// re-run — the matcher repairs links rather than duplicating them.
pub async fn link_campaign<S>(
  store: &S,
  campaign_id: Uuid,
  search_radius_m: f64,
) -> Result<LinkSummary>
where
  S: CampaignStore,
{
  let buildings = store
    .list_buildings(campaign_id)
    .await
    .map_err(Error::store)?;
  let addresses = store
    .list_addresses(campaign_id)
    .await
    .map_err(Error::store)?;

  let mut summary = LinkSummary::default();

  for address in addresses {
    match match_building(address.point(), &buildings, search_radius_m) {
      Some(matched) => {
        store
          .upsert_link(NewLink {
            campaign_id,
            address_id: address.address_id,
            building_id: matched.building_id,
            method: matched.method,
            confidence: matched.confidence,
            is_primary: true,
          })
          .await
          .map_err(Error::store)?;
        summary.linked += 1;
      },
      None => {
        store
          .set_address_fallback(address.address_id)
          .await
          .map_err(Error::store)?;
        summary.fallback += 1;
      },
    }
  }

  tracing::info!(
    %campaign_id,
    linked = summary.linked,
    fallback = summary.fallback,
    "linking pass complete"
  );
  Ok(summary)
}
