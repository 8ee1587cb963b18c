//! Integration test: model training, artifacts and predictions

use ledgerml::dataset::{Dataset, LabeledSample};
use ledgerml::evaluation::Evaluator;
use ledgerml::export::{ArtifactStore, FileArtifactStore, Prediction, SerializationFormat, SerializedModel, TrainedModel};
use ledgerml::text::TfIdfVectorizer;
use ledgerml::training::{
    GradientBoostingConfig, GradientBoostingModel, NaiveBayesConfig, NaiveBayesModel, RandomForestConfig,
    RandomForestModel, TreeBuilder, TreeParams,
};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

fn fraud_dataset(n: usize) -> Dataset {
    let samples = (0..n)
        .map(|i| {
            let fraud = i % 6 == 0;
            let amount = if fraud { 800.0 + (i % 13) as f64 * 25.0 } else { 15.0 + (i % 40) as f64 * 4.0 };
            let hour = if fraud { (i % 4) as f64 } else { 8.0 + (i % 12) as f64 };
            let velocity = if fraud { 5.0 + (i % 3) as f64 } else { (i % 2) as f64 };
            LabeledSample::new(vec![amount, hour, velocity], if fraud { 1.0 } else { 0.0 })
        })
        .collect();
    Dataset::new(vec!["amount".into(), "hour_of_day".into(), "velocity_1h".into()], samples).unwrap()
}

fn credit_dataset(n: usize) -> Dataset {
    let samples = (0..n)
        .map(|i| {
            let income = 200.0 + (i % 30) as f64 * 50.0;
            let on_time = 0.5 + (i % 5) as f64 * 0.1;
            let overdrafts = (i % 4) as f64;
            let score = 350.0 + income * 0.15 + on_time * 200.0 - overdrafts * 25.0;
            LabeledSample::new(vec![income, on_time, overdrafts], score)
        })
        .collect();
    Dataset::new(
        vec!["monthly_income".into(), "on_time_payment_ratio".into(), "overdraft_count".into()],
        samples,
    )
    .unwrap()
}

fn categorization_dataset() -> (Dataset, Vec<String>) {
    let categories = vec![
        "GROCERIES".to_string(),
        "MOBILE_MONEY.AIRTIME".to_string(),
        "UTILITIES".to_string(),
    ];
    let texts = [
        ("buy airtime", 1.0),
        ("topup bundle", 1.0),
        ("airtime topup", 1.0),
        ("supermarket groceries", 0.0),
        ("groceries market", 0.0),
        ("fresh market", 0.0),
        ("power bill", 2.0),
        ("water bill", 2.0),
        ("electricity token", 2.0),
    ];
    let samples = texts
        .iter()
        .enumerate()
        .map(|(i, (text, label))| {
            LabeledSample::with_text(vec![10.0 + i as f64, 1.0, 12.0, (i % 7) as f64], *label, *text)
        })
        .collect();
    let ds = Dataset::new(
        vec!["amount".into(), "is_debit".into(), "hour_of_day".into(), "day_of_week".into()],
        samples,
    )
    .unwrap();
    (ds, categories)
}

fn small_forest() -> RandomForestConfig {
    RandomForestConfig::default()
        .with_n_estimators(15)
        .with_random_state(7)
        .with_tree_params(TreeParams {
            max_depth: 5,
            min_samples_split: 4,
            min_samples_leaf: 2,
        })
}

fn small_boosting() -> GradientBoostingConfig {
    GradientBoostingConfig {
        n_estimators: 30,
        tree: TreeParams {
            max_depth: 3,
            min_samples_split: 4,
            min_samples_leaf: 2,
        },
        ..GradientBoostingConfig::default()
    }
}

#[test]
fn test_cart_splits_between_clusters() {
    let samples = [1.0, 2.0, 10.0, 11.0]
        .iter()
        .zip([0.0, 0.0, 1.0, 1.0])
        .map(|(x, y)| LabeledSample::new(vec![*x], y))
        .collect();
    let ds = Dataset::new(vec!["x".into()], samples).unwrap();
    let tree = TreeBuilder::classifier(TreeParams {
        max_depth: 3,
        min_samples_split: 2,
        min_samples_leaf: 1,
    })
    .fit(&ds.features_matrix(), &ds.labels())
    .unwrap();

    assert_eq!(tree.n_leaves(), 2);
    assert_eq!(tree.predict_row(ndarray::arr1(&[1.5]).view()), 0.0);
    assert_eq!(tree.predict_row(ndarray::arr1(&[10.5]).view()), 1.0);
}

#[test]
fn test_forest_probabilities_and_threshold_bounds() {
    let ds = fraud_dataset(180);
    let model = RandomForestModel::fit(&small_forest(), &ds).unwrap();

    assert!(model.threshold >= 0.10 && model.threshold <= 0.90);
    let probs = model.predict_proba(&ds.features_matrix()).unwrap();
    assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));

    let labels = ds.labels().to_vec();
    let metrics = Evaluator::classification(&labels, &probs.to_vec(), model.threshold).unwrap();
    assert!(metrics.auc_roc > 0.9, "auc was {}", metrics.auc_roc);
}

#[test]
fn test_forest_is_deterministic_for_a_seed() {
    let ds = fraud_dataset(120);
    let a = RandomForestModel::fit(&small_forest(), &ds).unwrap();
    let b = RandomForestModel::fit(&small_forest(), &ds).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_boosting_scores_are_integral_and_clamped() {
    let ds = credit_dataset(150);
    let model = GradientBoostingModel::fit(&small_boosting(), &ds).unwrap();
    let scores = model.predict(&ds.features_matrix()).unwrap();

    for score in scores.iter() {
        assert!((300.0..=850.0).contains(score));
        assert_eq!(score.fract(), 0.0);
    }

    let metrics = Evaluator::regression(&ds.labels().to_vec(), &scores.to_vec(), 50.0).unwrap();
    assert!(metrics.r2 > 0.8, "r2 was {}", metrics.r2);
}

#[test]
fn test_naive_bayes_categorizes_airtime() {
    let (ds, categories) = categorization_dataset();
    let config = NaiveBayesConfig {
        vectorizer: TfIdfVectorizer::new().with_min_doc_freq(1),
        ..NaiveBayesConfig::default()
    };
    let model = NaiveBayesModel::fit(&config, &ds, categories).unwrap();

    assert!(model.vocabulary.contains("airtime"));
    assert!(model.vocabulary.contains("topup"));
    let features = ds.samples()[0].features();
    assert_eq!(
        model.predict_category("airtime topup", features).unwrap(),
        "MOBILE_MONEY.AIRTIME"
    );
}

#[test]
fn test_balance_reaches_target_ratio() {
    let samples = (0..100)
        .map(|i| LabeledSample::new(vec![i as f64, (i % 9) as f64], if i < 10 { 1.0 } else { 0.0 }))
        .collect();
    let ds = Dataset::new(vec!["a".into(), "b".into()], samples).unwrap();
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);

    let balanced = ds.balance(0.3, &mut rng).unwrap();
    assert_eq!(balanced.binary_counts(), (39, 90));

    let again = balanced.balance(0.3, &mut rng).unwrap();
    assert_eq!(again.binary_counts(), (39, 90));
}

fn assert_same_predictions(a: &[Prediction], b: &[Prediction]) {
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b) {
        match (x, y) {
            (Prediction::Fraud { probability: p, .. }, Prediction::Fraud { probability: q, .. }) => {
                assert_eq!(p.to_bits(), q.to_bits())
            }
            (Prediction::CreditScore { score: p, .. }, Prediction::CreditScore { score: q, .. }) => {
                assert_eq!(p.to_bits(), q.to_bits())
            }
            _ => assert_eq!(x, y),
        }
    }
}

#[test]
fn test_artifacts_round_trip_with_identical_predictions() {
    let dir = tempfile::tempdir().unwrap();
    let fraud = fraud_dataset(90);
    let credit = credit_dataset(90);
    let (texts, categories) = categorization_dataset();

    let nb_config = NaiveBayesConfig {
        vectorizer: TfIdfVectorizer::new().with_min_doc_freq(1),
        ..NaiveBayesConfig::default()
    };
    let cases = vec![
        (
            SerializedModel::new(
                "rf-1",
                TrainedModel::RandomForest(RandomForestModel::fit(&small_forest(), &fraud).unwrap()),
            ),
            fraud,
        ),
        (
            SerializedModel::new(
                "gb-1",
                TrainedModel::GradientBoosting(GradientBoostingModel::fit(&small_boosting(), &credit).unwrap()),
            ),
            credit,
        ),
        (
            SerializedModel::new(
                "nb-1",
                TrainedModel::NaiveBayes(NaiveBayesModel::fit(&nb_config, &texts, categories).unwrap()),
            ),
            texts,
        ),
    ];

    for format in [SerializationFormat::Json, SerializationFormat::Bincode] {
        let store = FileArtifactStore::new(dir.path()).with_format(format);
        for (artifact, ds) in &cases {
            let before = artifact.predict_dataset(ds).unwrap();
            let location = store
                .save(artifact, &store.default_location(artifact.model_kind, &artifact.version))
                .unwrap();
            let loaded = store.load(&location).unwrap();

            assert_eq!(&loaded, artifact);
            assert_same_predictions(&before, &loaded.predict_dataset(ds).unwrap());
        }
    }
}

#[test]
fn test_artifact_rejects_wrong_width() {
    let ds = credit_dataset(60);
    let artifact = SerializedModel::new(
        "gb-1",
        TrainedModel::GradientBoosting(GradientBoostingModel::fit(&small_boosting(), &ds).unwrap()),
    );
    assert!(artifact.predict(&LabeledSample::new(vec![1.0, 2.0], 0.0)).is_err());
}
