use std::sync::Arc;
use uuid::Uuid;
use crate::{
    domain::{Member, PointDiscrepancy},
    error::Result,
    repository::PointsStore,
};

/// Administrative surface over the points capability. Normal point flow is
/// the treasury's settle/approve/refund paths; this exists for the season
/// boundary.
pub struct PointsService {
    points: Arc<dyn PointsStore>,
}

impl PointsService {
    pub fn new(points: Arc<dyn PointsStore>) -> Self {
        Self { points }
    }

    /// Season-boundary override: balance straight to zero, no ledger
    /// reasoning involved.
    pub async fn reset_points(&self, member_id: Uuid, reset_by: Uuid) -> Result<Member> {
        let member = self.points.reset(member_id).await?;

        tracing::warn!(
            "Administrative points reset for member {} by {} (ledger bypassed)",
            member_id,
            reset_by
        );

        Ok(member)
    }

    pub async fn list_discrepancies(&self, member_id: Uuid) -> Result<Vec<PointDiscrepancy>> {
        self.points.list_discrepancies(member_id).await
    }
}
