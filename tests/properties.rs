use proptest::prelude::*;

use floodrisk::correlation::CorrelationMatrix;
use floodrisk::damage::{DamageFunction, DamageModel};
use floodrisk::metrics::{LossStatistics, spatial_concentration};
use floodrisk::portfolio::{FloodEvent, Property};
use floodrisk::types::{BuildingType, GeoPoint, METRES_PER_DEGREE, PropertyId};
use floodrisk::{FloodRiskModel, ModelConfig};

fn point() -> impl Strategy<Value = GeoPoint> {
    (51.3f64..51.7, -0.4f64..0.1).prop_map(|(lat, lon)| GeoPoint::new(lat, lon))
}

fn building_type() -> impl Strategy<Value = BuildingType> {
    prop_oneof![
        Just(BuildingType::Residential),
        Just(BuildingType::Commercial),
        Just(BuildingType::Industrial),
        "[a-z]{1,8}".prop_map(BuildingType::Other),
    ]
}

fn property() -> impl Strategy<Value = Property> {
    (point(), 1.0e4f64..2.0e6, 0.0f64..1.5, building_type()).prop_map(|(p, v, f, bt)| {
        Property::new("P", p.lat, p.lon, v).with_floor_height(f).with_building_type(bt)
    })
}

fn portfolio(max: usize) -> impl Strategy<Value = Vec<Property>> {
    prop::collection::vec(property(), 1..max).prop_map(|mut ps| {
        for (i, p) in ps.iter_mut().enumerate() {
            p.id = PropertyId(format!("P{i}"));
        }
        ps
    })
}

fn radial_model(properties: Vec<Property>, config: ModelConfig) -> FloodRiskModel {
    FloodRiskModel::new(properties, FloodEvent::single(51.5, -0.15, 3_000.0, 2.0), Vec::new(), config).unwrap()
}

proptest! {
    #[test]
    fn correlation_is_symmetric_with_unit_diagonal(
        pts in prop::collection::vec(point(), 1..30),
        base in 0.01f64..=1.0,
        dist in 10.0f64..10_000.0,
    ) {
        let c = CorrelationMatrix::from_points(&pts, base, dist);
        for i in 0..c.dim() {
            prop_assert_eq!(c.get(i, i), 1.0);
            for j in 0..c.dim() {
                prop_assert_eq!(c.get(i, j), c.get(j, i));
            }
        }
    }

    #[test]
    fn radial_depth_is_non_increasing_and_zero_beyond_radius(
        radius in 100.0f64..10_000.0,
        depth in 0.0f64..5.0,
        mut ds in prop::collection::vec(0.0f64..20_000.0, 2..20),
    ) {
        ds.sort_by(f64::total_cmp);
        let model = FloodRiskModel::new(
            ds.iter()
                .enumerate()
                .map(|(i, d)| Property::new(format!("P{i}"), 51.5 + d / METRES_PER_DEGREE, -0.1, 1.0))
                .collect(),
            FloodEvent::single(51.5, -0.1, radius, depth),
            Vec::new(),
            ModelConfig::default(),
        )
        .unwrap();
        let depths = model.calculate_flood_depths();
        for w in depths.windows(2) {
            prop_assert!(w[1] <= w[0] + 1e-12);
        }
        for (d, got) in ds.iter().zip(&depths) {
            // Stay clear of the degree round-trip at exactly the radius.
            if *d >= radius * (1.0 + 1e-9) {
                prop_assert_eq!(*got, 0.0);
            }
        }
    }

    #[test]
    fn damage_is_a_fraction(
        depth in -5.0f64..20.0,
        alpha in 0.0f64..1.0,
        bt in building_type(),
    ) {
        let damage = DamageFunction { model: DamageModel::Tanh { alpha }, ..DamageFunction::default() };
        let f = damage.loss_fraction(depth, &bt);
        prop_assert!((0.0..=1.0).contains(&f));
        if depth <= 0.0 {
            prop_assert_eq!(f, 0.0);
        }
        let curve = DamageFunction { model: DamageModel::default_curve(), ..DamageFunction::default() };
        prop_assert!((0.0..=1.0).contains(&curve.loss_fraction(depth, &bt)));
    }

    #[test]
    fn zero_shock_trials_equal_deterministic_loss(props in portfolio(25), seed in any::<u64>()) {
        let config = ModelConfig { shock_factor: 0.0, seed, ..ModelConfig::default() };
        let model = radial_model(props, config);
        let impacts = model.calculate_direct_impacts(&model.calculate_flood_depths()).unwrap();
        let expected: f64 = model.properties().iter().zip(&impacts).map(|(p, i)| p.value * i).sum();
        let result = model.simulate_portfolio_impact(50).unwrap();
        for l in &result.trial_losses {
            prop_assert_eq!(*l, expected);
        }
    }

    #[test]
    fn tail_statistics_are_ordered(losses in prop::collection::vec(0.0f64..1.0e7, 1..400)) {
        let s = LossStatistics::from_losses(&losses);
        prop_assert!(s.var_95 <= s.max);
        prop_assert!(s.es_95 >= s.var_95);
        prop_assert!(s.var_99 <= s.max);
        prop_assert!(s.es_99 >= s.var_99);
    }

    #[test]
    fn simulated_tail_is_ordered(props in portfolio(20), seed in any::<u64>()) {
        let model = radial_model(props, ModelConfig { seed, ..ModelConfig::default() });
        let r = model.simulate_portfolio_impact(200).unwrap();
        prop_assert!(r.var_95() <= r.max());
        prop_assert!(r.es_95() >= r.var_95());
    }

    #[test]
    fn flood_depths_are_idempotent(props in portfolio(40)) {
        let model = radial_model(props, ModelConfig::default());
        prop_assert_eq!(model.calculate_flood_depths(), model.calculate_flood_depths());
    }

    #[test]
    fn outside_radius_means_no_loss(bt in building_type(), extra in 0.0f64..5_000.0) {
        let lat = 51.5 + (1_000.0 + 1.0 + extra) / METRES_PER_DEGREE;
        let p = Property::new("P", lat, -0.1, 500_000.0).with_building_type(bt);
        let model = FloodRiskModel::new(
            vec![p],
            FloodEvent::single(51.5, -0.1, 1_000.0, 2.0),
            Vec::new(),
            ModelConfig::default(),
        )
        .unwrap();
        let depths = model.calculate_flood_depths();
        prop_assert_eq!(depths[0], 0.0);
        prop_assert_eq!(model.calculate_direct_impacts(&depths).unwrap()[0], 0.0);
    }

    #[test]
    fn equal_values_in_distinct_cells_give_one_over_n(n in 1usize..30) {
        // 2 km apart with 1 km cells: every property in its own cell.
        let props: Vec<Property> = (0..n)
            .map(|i| Property::new(format!("P{i}"), 51.0 + i as f64 * 2_000.0 / METRES_PER_DEGREE, -0.1, 1.0e5))
            .collect();
        let depths = vec![1.0; n];
        let impacts = vec![0.2; n];
        let c = spatial_concentration(&props, &depths, &impacts, 1_000.0);
        prop_assert_eq!(c.grid_cells.len(), n);
        prop_assert!((c.geographic_hhi - 1.0 / n as f64).abs() < 1e-9);
    }
}

#[test]
fn centre_property_tanh_loss() {
    let model = FloodRiskModel::new(
        vec![Property::new("P", 51.5, -0.1, 1.0)],
        FloodEvent::single(51.5, -0.1, 1_000.0, 2.0),
        Vec::new(),
        ModelConfig::default(),
    )
    .unwrap();
    let depths = model.calculate_flood_depths();
    assert_eq!(depths, vec![2.0]);
    let impact = model.calculate_direct_impacts(&depths).unwrap()[0];
    assert!((impact - 0.08 * (1.0 + 2.0_f64.tanh())).abs() < 1e-12);
    assert!((impact - 0.1571).abs() < 1e-3);
}

#[test]
fn single_cell_portfolio_is_fully_concentrated() {
    let props: Vec<Property> =
        (0..5).map(|i| Property::new(format!("P{i}"), 51.5 + i as f64 * 1e-5, -0.1, 1.0e5 * (i + 1) as f64)).collect();
    let c = spatial_concentration(&props, &[0.5; 5], &[0.1; 5], 1_000.0);
    assert_eq!(c.grid_cells.len(), 1);
    assert!((c.geographic_hhi - 1.0).abs() < 1e-12);
    assert!((c.impact_hhi - 1.0).abs() < 1e-12);
}
