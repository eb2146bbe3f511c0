use nalgebra::DMatrix;
use proptest::prelude::*;
use proptest::test_runner::Config as ProptestConfig;

use smart_process_analytics::data::sample::{SyntheticKind, generate};
use smart_process_analytics::domain::{CvStrategy, ModelFamily, RunConfig};
use smart_process_analytics::fit::{evaluate_iteration, outer_splits};
use smart_process_analytics::math::StandardScaler;
use smart_process_analytics::models::FitterRegistry;

fn table() -> impl Strategy<Value = (usize, usize, Vec<f64>)> {
    (2usize..30, 1usize..5).prop_flat_map(|(rows, cols)| {
        (
            Just(rows),
            Just(cols),
            prop::collection::vec(-1.0e3f64..1.0e3, rows * cols),
        )
    })
}

proptest! {
    #[test]
    fn scaler_inverse_recovers_the_input((rows, cols, values) in table()) {
        let x = DMatrix::from_vec(rows, cols, values);
        let scaler = StandardScaler::fit(&x).unwrap();
        let back = scaler.inverse_transform(&scaler.transform(&x));
        for (a, b) in x.iter().zip(back.iter()) {
            prop_assert!((a - b).abs() <= 1e-9 * a.abs().max(1.0), "{a} vs {b}");
        }
    }

    #[test]
    fn standardized_columns_have_zero_mean((rows, cols, values) in table()) {
        let x = DMatrix::from_vec(rows, cols, values);
        let z = StandardScaler::fit(&x).unwrap().transform(&x);
        for col in z.column_iter() {
            prop_assert!((col.sum() / rows as f64).abs() < 1e-9);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    /// Outer-validation responses never influence the hyperparameters the
    /// inner loop picks.
    #[test]
    fn outer_validation_rows_do_not_leak_into_inner_selection(
        shift in prop::collection::vec(-50.0f64..50.0, 10),
    ) {
        let dataset = generate(SyntheticKind::Collinear, 50, 6).unwrap();
        let cfg = RunConfig {
            num_outer: 1,
            k_fold: 5,
            alpha_num: 5,
            seed: 2,
            ..RunConfig::default()
        };
        let split = outer_splits(&dataset, false, &cfg).unwrap().remove(0);
        prop_assert_eq!(split.validation.len(), 10);

        let mut perturbed = dataset.clone();
        for (&i, s) in split.validation.iter().zip(&shift) {
            perturbed.y[i] += s;
        }

        let candidates = [
            (ModelFamily::Ridge, Some(CvStrategy::KFold)),
            (ModelFamily::PartialLeastSquares, Some(CvStrategy::KFold)),
        ];
        let registry = FitterRegistry::default();
        let base = evaluate_iteration(&registry, &dataset, &split, &candidates, &cfg).unwrap();
        let moved = evaluate_iteration(&registry, &perturbed, &split, &candidates, &cfg).unwrap();
        for (a, b) in base.iter().zip(&moved) {
            let (a, b) = (a.as_ref().unwrap(), b.as_ref().unwrap());
            prop_assert_eq!(&a.1, &b.1);
        }
    }
}
