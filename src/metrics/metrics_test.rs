use super::*;

/// # Case 1: registered collectors show up in a gather, with the recorded
/// values; repeat registration is a no-op
#[test]
fn test_register_and_gather() {
    register_custom_metrics();
    register_custom_metrics();

    BATCHES_DELIVERED_METRIC.with_label_values(&["p1"]).inc();
    LEASE_ACQUIRED_METRIC.with_label_values(&["host-a"]).inc();

    let families = REGISTRY.gather();
    let names: Vec<&str> = families.iter().map(|f| f.get_name()).collect();
    assert!(names.contains(&"batches_delivered_total"));
    assert!(names.contains(&"lease_acquired_total"));
    assert!(names.contains(&"partition_fatal"));

    let batches = families
        .iter()
        .find(|f| f.get_name() == "batches_delivered_total")
        .expect("family present");
    let total: f64 = batches
        .get_metric()
        .iter()
        .map(|m| m.get_counter().get_value())
        .sum();
    assert!(total >= 1.0);
}
