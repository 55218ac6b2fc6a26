//! # Screening pipeline
//!
//! Produces the prediction batch of one run: close-pair search over a catalog, risk
//! scoring, and object names attached for readability. The batch is ordered by
//! decreasing risk and is ready to be persisted with
//! [`ArtifactStore::write_predictions`](crate::storage::ArtifactStore::write_predictions).
use ahash::AHashMap;

use crate::{
    close_pairs::{find_close_pairs, FinderDiagnostics, WindowParams},
    conjunction::PredictedConjunction,
    constants::CatalogId,
    elements::OrbitalElementSet,
    propagator::Propagator,
    risk::RiskScorer,
    spatial_index::SpatialIndex,
};

/// Window and risk model of a screening run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScreeningParams {
    pub window: WindowParams,
    pub scorer: RiskScorer,
}

#[derive(Debug, Clone, Default)]
pub struct ScreeningOutcome {
    /// Scored predictions, highest risk first.
    pub predictions: Vec<PredictedConjunction>,
    pub diagnostics: FinderDiagnostics,
}

pub fn screen(
    elements: &[OrbitalElementSet],
    params: &ScreeningParams,
    propagator: &dyn Propagator,
    index: &dyn SpatialIndex,
) -> ScreeningOutcome {
    let found = find_close_pairs(elements, &params.window, propagator, index);

    let names: AHashMap<CatalogId, &str> = elements
        .iter()
        .map(|set| (set.norad_id, set.name.as_str()))
        .collect();
    let name_of = |id: Option<CatalogId>| {
        id.and_then(|id| names.get(&id))
            .map(|name| name.to_string())
    };

    let named = found
        .conjunctions
        .into_iter()
        .map(|mut record| {
            record.name_a = name_of(record.norad_id_a);
            record.name_b = name_of(record.norad_id_b);
            record
        })
        .collect();

    ScreeningOutcome {
        predictions: params.scorer.apply(named),
        diagnostics: found.diagnostics,
    }
}

#[cfg(test)]
mod screening_test {
    use super::*;
    use crate::{
        conjunctor_errors::ConjunctorError, propagator::Position, spatial_index::KdTree,
    };
    use chrono::{DateTime, TimeZone, Utc};
    use nalgebra::Vector3;

    /// Static objects on the x axis.
    struct Fixed;

    impl Propagator for Fixed {
        fn position_at(
            &self,
            elements: &OrbitalElementSet,
            _: DateTime<Utc>,
        ) -> Result<Position, ConjunctorError> {
            Ok(Position::new(Vector3::new(elements.norad_id as f64, 0.0, 0.0)))
        }
    }

    fn object(norad_id: CatalogId, name: &str) -> OrbitalElementSet {
        OrbitalElementSet {
            norad_id,
            name: name.into(),
            line1: String::new(),
            line2: String::new(),
        }
    }

    #[test]
    fn test_screen_names_scores_and_orders() {
        let catalog = vec![object(10, "A"), object(40, "B"), object(12, "C")];
        let params = ScreeningParams {
            window: WindowParams::builder()
                .start(Utc.with_ymd_and_hms(2025, 11, 8, 0, 0, 0).unwrap())
                .radius_km(50.0)
                .build()
                .unwrap(),
            scorer: RiskScorer::new(20.0).unwrap(),
        };

        let out = screen(&catalog, &params, &Fixed, &KdTree);
        assert_eq!(out.predictions.len(), 3);

        let first = &out.predictions[0];
        assert_eq!((first.norad_id_a, first.norad_id_b), (Some(10), Some(12)));
        assert_eq!(first.name_a.as_deref(), Some("A"));
        assert_eq!(first.name_b.as_deref(), Some("C"));
        assert_eq!(first.risk_class, Some(1));

        let risks: Vec<f64> = out.predictions.iter().filter_map(|p| p.risk_score).collect();
        assert!(risks.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(out.diagnostics.steps, 12);
    }
}
