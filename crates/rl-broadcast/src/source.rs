use async_trait::async_trait;
use rl_schemas::ReportWithAnalysis;

/// Read side of the report store, as seen by the change detector.
#[async_trait]
pub trait ReportSource: Send + Sync {
    /// Highest report seq currently stored (visible or not). `0` when empty.
    async fn latest_seq(&self) -> anyhow::Result<i64>;

    /// Reports with `seq > after_seq` that pass the visibility rules,
    /// ascending by seq, at most `limit` rows. Each row carries at least
    /// one analysis.
    async fn visible_since(
        &self,
        after_seq: i64,
        limit: i64,
    ) -> anyhow::Result<Vec<ReportWithAnalysis>>;
}

/// Kilometres per degree of latitude used for radius searches.
pub const KM_PER_DEGREE: f64 = 111.0;

/// Latitude/longitude rectangle, bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl GeoBox {
    /// Square of `radius_km` around a point. Longitude is not scaled by
    /// latitude, so the box widens towards the poles.
    pub fn around(latitude: f64, longitude: f64, radius_km: f64) -> Self {
        let delta = radius_km / KM_PER_DEGREE;
        Self {
            min_lat: latitude - delta,
            max_lat: latitude + delta,
            min_lng: longitude - delta,
            max_lng: longitude + delta,
        }
    }

    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&latitude) && (self.min_lng..=self.max_lng).contains(&longitude)
    }
}

/// Filter for an on-demand read. Visibility rules always apply on top.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportQuery {
    /// Reports with a valid analysis of this classification.
    Latest { classification: String },
    /// Reports whose public id matches, with a valid analysis of this classification.
    ByReporter { reporter_id: String, classification: String },
    /// Reports inside the box with a valid analysis of this classification.
    Near { area: GeoBox, classification: String },
    /// Reports with a valid analysis whose brand normalizes to `brand_key`.
    ByBrand { brand_key: String },
}

/// Public read endpoints over the report store.
#[async_trait]
pub trait ReportReader: Send + Sync {
    /// The newest `limit` visible reports matching `query`, returned
    /// ascending by seq.
    async fn find_visible(&self, query: &ReportQuery, limit: i64) -> anyhow::Result<Vec<ReportWithAnalysis>>;

    /// One report, `None` when absent or not visible.
    async fn visible_by_seq(&self, seq: i64) -> anyhow::Result<Option<ReportWithAnalysis>>;

    /// Stored image bytes of a visible report, `None` when absent, hidden
    /// or without an image.
    async fn visible_image(&self, seq: i64) -> anyhow::Result<Option<Vec<u8>>>;
}

/// Durable `last_processed_seq` per service name.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self, service_name: &str) -> anyhow::Result<Option<i64>>;

    /// Upsert. Callers treat failure as non-fatal.
    async fn store(&self, service_name: &str, seq: i64) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geo_box_spans_radius_in_degrees() {
        let b = GeoBox::around(47.0, 8.0, 111.0);
        assert_eq!(b.min_lat, 46.0);
        assert_eq!(b.max_lat, 48.0);
        assert!(b.contains(47.5, 8.9));
        assert!(b.contains(46.0, 7.0));
        assert!(!b.contains(48.1, 8.0));
        assert!(!b.contains(47.0, 9.01));
    }
}
