use bao_bench_core::TestRegistry;

/// Registered test types, one per line
pub fn list_tests_command(registry: &TestRegistry) -> String {
    let mut out = String::new();
    for test_type in registry.test_types() {
        out.push_str(test_type);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lists_builtins() {
        let registry = bao_bench_targets::builtin_registry().unwrap();
        let out = list_tests_command(&registry);
        assert_eq!(out.lines().count(), registry.len());
        assert!(out.lines().any(|l| l == "kvv2_read"));
        assert!(out.lines().any(|l| l == "redis_dynamic_secret"));
    }
}
