use geo::MultiPolygon;

use crate::GuidewayID;

/// A region where two guideway corridors overlap and the first guideway's
/// median passes through. Built in batch per guideway; immutable afterwards
/// except for the ordering fields assigned right after the batch is sorted.
#[derive(Clone, Debug)]
pub struct ConflictZone {
    /// The guideway the zone was evaluated from. Distances and ordering are
    /// along its median, so membership is asymmetric between the two slots.
    pub guideway1: GuidewayID,
    pub guideway2: GuidewayID,
    /// Severity digit 1-4; lower means more yielding per traffic control
    /// rules.
    pub severity: u8,
    /// The severity digit plus both guideways' mode letters, in evaluation
    /// order: "3vp" is an unsignalized vehicle/pedestrian conflict.
    pub code: String,
    /// The overlap of the two corridor footprints.
    pub region: MultiPolygon<f64>,
    /// Normalized position (0..1) along guideway1's median of its first
    /// contact with the region. The sole sort key among a guideway's zones.
    pub distance: f64,
    /// Both guideways' cut histories at build time. Used only to re-match the
    /// zone to a guideway later; never mutated.
    pub cut_history1: Vec<String>,
    pub cut_history2: Vec<String>,
    /// 0-based rank among guideway1's zones, ascending by distance.
    pub sequence: usize,
    /// "{guideway1}_{guideway2}_{sequence}".
    pub id: String,
}

impl ConflictZone {
    pub fn involves(&self, id: GuidewayID) -> bool {
        self.guideway1 == id || self.guideway2 == id
    }

    pub(crate) fn compose_id(&self) -> String {
        format!("{}_{}_{}", self.guideway1.0, self.guideway2.0, self.sequence)
    }
}
