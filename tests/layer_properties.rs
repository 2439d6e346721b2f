use cno_kde::{
    config::{KdeSettings, ScaleSettings},
    constants::{PixelCoord, LAYER_COUNT},
    pipeline::SampleAnalyzer,
    DensityPolicy,
};
use proptest::prelude::*;

const SIDE: usize = 40;

fn analyzer(policy: DensityPolicy) -> SampleAnalyzer {
    let kde = KdeSettings {
        bandwidth_candidates: 3,
        ..KdeSettings::default()
    };
    SampleAnalyzer::new(&kde, policy, &ScaleSettings::default())
}

fn points() -> impl Strategy<Value = Vec<PixelCoord>> {
    prop::collection::vec((0..SIDE as i64, 0..SIDE as i64), 5..16)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_layers_are_nested(centers in points()) {
        let analysis = analyzer(DensityPolicy::HardMembership)
            .analyze(&centers, SIDE, SIDE)
            .unwrap();
        let layers = analysis.layers.layers().unwrap();

        prop_assert_eq!(layers[0].pixel_area, SIDE * SIDE);
        prop_assert!(layers[LAYER_COUNT - 1].pixel_area >= 1);
        prop_assert_eq!(layers[0].object_count, centers.len() as f64);
        for pair in layers.windows(2) {
            prop_assert!(pair[1].threshold > pair[0].threshold);
            prop_assert!(pair[1].pixel_area <= pair[0].pixel_area);
            prop_assert!(pair[1].object_count <= pair[0].object_count);
        }
    }

    #[test]
    fn prop_probability_mass_of_first_band_is_n(centers in points()) {
        let analysis = analyzer(DensityPolicy::ProbabilityMass)
            .analyze(&centers, SIDE, SIDE)
            .unwrap();
        let layers = analysis.layers.layers().unwrap();

        prop_assert!((layers[0].object_count - centers.len() as f64).abs() < 1e-9);
        prop_assert!(layers.iter().all(|l| l.density.is_finite() && l.density >= 0.0));
    }
}
