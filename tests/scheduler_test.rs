/// Ordering properties of the build scheduler over generated catalogs
#[cfg(test)]
mod scheduler_tests {
    use chainbuild::catalog::ImageDefinition;
    use chainbuild::error::ChainBuildError;
    use chainbuild::scheduler::{plan_order, BuildScheduler, SchedulerStatus};
    use std::collections::{BTreeMap, HashMap};

    /// Deterministic generator so failures are reproducible.
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self, bound: usize) -> usize {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((self.0 >> 33) as usize) % bound.max(1)
        }
    }

    /// Acyclic catalog: image `i` may only depend on images `< i`.
    fn random_dag(size: usize, seed: u64) -> Vec<ImageDefinition> {
        let mut rng = Lcg(seed);
        (0..size)
            .map(|i| {
                let mut deps: Vec<String> = (0..rng.next(4))
                    .filter(|_| i > 0)
                    .map(|_| format!("img{:03}", rng.next(i)))
                    .collect();
                deps.sort();
                deps.dedup();
                ImageDefinition::new(format!("img{:03}", i), "src").with_dependencies(deps)
            })
            .rev()
            .collect()
    }

    #[test]
    fn test_every_image_follows_its_dependencies() {
        for seed in 1..=20 {
            let images = random_dag(60, seed);
            let order = plan_order(images.clone(), BTreeMap::new(), |_| "v001".to_string())
                .unwrap_or_else(|e| panic!("seed {seed}: {e}"));

            assert_eq!(order.len(), images.len(), "seed {seed}");
            let position: HashMap<&str, usize> = order
                .iter()
                .enumerate()
                .map(|(i, repo)| (repo.as_str(), i))
                .collect();
            for image in &images {
                for dep in &image.dependencies {
                    assert!(
                        position[dep.as_str()] < position[image.repo.as_str()],
                        "seed {seed}: {} built before its dependency {}",
                        image.repo,
                        dep
                    );
                }
            }
        }
    }

    #[test]
    fn test_order_is_deterministic() {
        let images = random_dag(40, 7);
        let first = plan_order(images.clone(), BTreeMap::new(), |_| "v1".to_string()).unwrap();
        let mut shuffled = images;
        shuffled.reverse();
        let second = plan_order(shuffled, BTreeMap::new(), |_| "v1".to_string()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_cycle_reports_members_and_everything_blocked() {
        let mut images = random_dag(10, 3);
        images.push(ImageDefinition::new("loop-a", "src").with_dependencies(["loop-b", "img000"]));
        images.push(ImageDefinition::new("loop-b", "src").with_dependencies(["loop-a"]));
        images.push(ImageDefinition::new("tail", "src").with_dependencies(["loop-b"]));

        let err = plan_order(images, BTreeMap::new(), |_| "v1".to_string()).unwrap_err();
        match err {
            ChainBuildError::Unreachable { repos } => {
                assert_eq!(repos, vec!["loop-a", "loop-b", "tail"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_prebuilt_versions_are_visible_to_dependents() {
        let mut prebuilt = BTreeMap::new();
        prebuilt.insert("base".to_string(), "v009".to_string());
        let mut scheduler = BuildScheduler::new(
            vec![ImageDefinition::new("app", "src").with_dependencies(["base"])],
            prebuilt,
        );

        assert_eq!(scheduler.next_ready().map(|i| i.repo.as_str()), Some("app"));
        assert_eq!(scheduler.built().get("base").map(String::as_str), Some("v009"));
        scheduler.mark_built("app", "v001").unwrap();
        assert_eq!(scheduler.status(), SchedulerStatus::Complete);
        assert_eq!(scheduler.order().to_vec(), vec!["app"]);
    }

    #[test]
    fn test_wide_fan_out_releases_dependents_together() {
        let mut images = vec![ImageDefinition::new("root", "src")];
        for i in 0..50 {
            images.push(ImageDefinition::new(format!("leaf{:02}", i), "src").with_dependencies(["root"]));
        }
        let mut scheduler = BuildScheduler::new(images, BTreeMap::new());

        let promoted = scheduler.mark_built("root", "v1").unwrap();
        assert_eq!(promoted.len(), 50);
        assert_eq!(scheduler.state().ready.len(), 50);
        assert!(scheduler.state().pending.is_empty());
        assert_eq!(scheduler.next_ready().map(|i| i.repo.as_str()), Some("leaf00"));
    }
}
