use super::*;

#[test]
fn default_enables_every_pass() {
    let config = OptConfig::default();
    assert_eq!(config.max_iterations, DEFAULT_MAX_ITERATIONS);
    assert!(config.constant_fold && config.value_number && config.wait_coalesce && config.fusion);
    assert!(config.unroll_loops && config.refcount_elim && config.dead_code);
}

#[test]
fn disabled_keeps_thresholds() {
    let config = OptConfig::disabled();
    assert!(!config.constant_fold && !config.dead_code && !config.unroll_loops);
    assert!(!config.wait_coalesce);
    assert_eq!(config.unroll, UnrollConfig::default());
}

#[test]
fn unroll_runs_every_third_iteration() {
    let config = OptConfig::with_max_iterations(9);
    let runs: Vec<u32> = (0..9).filter(|&i| config.unroll_in_iteration(i)).collect();
    assert_eq!(runs, vec![2, 5, 8]);
    assert!(!OptConfig::disabled().unroll_in_iteration(2));
}
