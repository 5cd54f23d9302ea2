mod common;

use common::Harness;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_each_group_trains_on_its_own_fields() {
    let temp = TempDir::new().unwrap();
    let harness = Harness::new(true, true);
    let config = marlbench_core::ExperimentConfig { max_n_iters: Some(2), ..common::small_config(temp.path()) };
    let mut experiment = harness.builder(config).build().await.unwrap();
    experiment.run_until(CancellationToken::new()).await.unwrap();

    let seen = harness.recorder.seen_keys.lock().unwrap();
    for (group, other) in [("alpha", "beta"), ("beta", "alpha")] {
        let keys = &seen[group];
        assert!(keys.contains(&format!("{}/observation", group)));
        assert!(keys.contains(&format!("next/{}/reward", group)));
        assert!(keys.contains("next/done"));
        for key in keys {
            assert!(!key.starts_with(&format!("{}/", other)), "{} saw {}", group, key);
            assert!(!key.starts_with(&format!("next/{}/", other)), "{} saw {}", group, key);
            assert!(!key.starts_with("info/"), "{} saw {}", group, key);
            assert!(!key.starts_with(&format!("{}/info", group)), "{} saw {}", group, key);
            assert!(!key.starts_with(&format!("next/{}/info", group)), "{} saw {}", group, key);
        }
    }
}
