//! Live visit/scan counters and the shared status-color priority.
//!
//! The color derivation here is the single source of truth for both the
//! server's GeoJSON output and the client-side feature-state applier. The
//! two layers must never disagree on the priority order, or the map and the
//! backend's filtered views drift apart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Visit status ────────────────────────────────────────────────────────────

/// The recorded visit outcome for a building (or point-only address).
///
/// `Delivered`, `NoAnswer`, `DoNotKnock`, and `FutureSeller` are refinements
/// that all fall into the `visited` bucket for color purposes.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum VisitStatus {
  #[default]
  NotVisited,
  Visited,
  Hot,
  Delivered,
  NoAnswer,
  DoNotKnock,
  FutureSeller,
}

impl VisitStatus {
  /// Whether this status counts as "visited" for color derivation.
  pub fn in_visited_bucket(self) -> bool {
    matches!(
      self,
      Self::Visited
        | Self::Delivered
        | Self::NoAnswer
        | Self::DoNotKnock
        | Self::FutureSeller
    )
  }
}

// ─── Status color ────────────────────────────────────────────────────────────

/// Render color for a map feature, in strict priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusColor {
  /// Priority 1: the QR code on the flyer was scanned.
  Purple,
  /// Priority 2: marked hot.
  Blue,
  /// Priority 3: any status in the visited bucket.
  Green,
  /// Priority 4: untouched.
  Red,
}

impl StatusColor {
  /// Derive the color from a QR flag and a visit status.
  ///
  /// QR-scanned always wins, regardless of status. The same function runs at
  /// the data-source layer and the render layer.
  pub fn derive(qr_scanned: bool, status: VisitStatus) -> Self {
    if qr_scanned {
      Self::Purple
    } else if status == VisitStatus::Hot {
      Self::Blue
    } else if status.in_visited_bucket() {
      Self::Green
    } else {
      Self::Red
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Purple => "purple",
      Self::Blue => "blue",
      Self::Green => "green",
      Self::Red => "red",
    }
  }
}

// ─── BuildingStats ───────────────────────────────────────────────────────────

/// Live counters keyed by building id, or by address id when the entity has
/// no polygon. `scans_total` is monotonically non-decreasing for the lifetime
/// of a campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingStats {
  pub entity_id:    Uuid,
  pub campaign_id:  Uuid,
  pub scans_total:  u64,
  pub scans_today:  u64,
  pub last_scan_at: Option<DateTime<Utc>>,
  pub status:       VisitStatus,
}

impl BuildingStats {
  /// Derived flag: any scan ever recorded.
  pub fn qr_scanned(&self) -> bool { self.scans_total > 0 }

  pub fn status_color(&self) -> StatusColor {
    StatusColor::derive(self.qr_scanned(), self.status)
  }

  /// A zeroed row for an entity that has never been scanned or visited.
  pub fn untouched(campaign_id: Uuid, entity_id: Uuid) -> Self {
    Self {
      entity_id,
      campaign_id,
      scans_total: 0,
      scans_today: 0,
      last_scan_at: None,
      status: VisitStatus::NotVisited,
    }
  }
}

// ─── StatsUpdate ─────────────────────────────────────────────────────────────

/// The tuple delivered on the per-campaign subscription channel, and emitted
/// by the polling fallback through the same callback interface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatsUpdate {
  pub building_id: Uuid,
  pub status:      VisitStatus,
  pub scans_total: u64,
  pub qr_scanned:  bool,
}

impl StatsUpdate {
  pub fn status_color(&self) -> StatusColor {
    StatusColor::derive(self.qr_scanned || self.scans_total > 0, self.status)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn qr_scanned_always_wins() {
    // All 2×2×2 combinations of (qr, hot, visited): purple whenever qr.
    for status in [
      VisitStatus::NotVisited,
      VisitStatus::Visited,
      VisitStatus::Hot,
      VisitStatus::Delivered,
    ] {
      assert_eq!(StatusColor::derive(true, status), StatusColor::Purple);
    }
  }

  #[test]
  fn hot_beats_visited_bucket() {
    assert_eq!(
      StatusColor::derive(false, VisitStatus::Hot),
      StatusColor::Blue
    );
  }

  #[test]
  fn visited_bucket_includes_refinements() {
    for status in [
      VisitStatus::Visited,
      VisitStatus::Delivered,
      VisitStatus::NoAnswer,
      VisitStatus::DoNotKnock,
      VisitStatus::FutureSeller,
    ] {
      assert_eq!(StatusColor::derive(false, status), StatusColor::Green);
    }
  }

  #[test]
  fn untouched_is_red() {
    assert_eq!(
      StatusColor::derive(false, VisitStatus::NotVisited),
      StatusColor::Red
    );
  }

  #[test]
  fn stats_derive_qr_from_scans() {
    let mut stats = BuildingStats::untouched(Uuid::new_v4(), Uuid::new_v4());
    assert!(!stats.qr_scanned());
    assert_eq!(stats.status_color(), StatusColor::Red);

    stats.scans_total = 1;
    stats.status = VisitStatus::Hot;
    assert!(stats.qr_scanned());
    // Scan beats hot.
    assert_eq!(stats.status_color(), StatusColor::Purple);
  }
}
