//! Unit tests for partition module

#[cfg(test)]
mod tests {
    use crate::error::ControllerError;
    use crate::partition::*;
    use crate::probe::EnvironmentFacts;
    use crate::test_utils::*;
    use crds::DriverSpec;

    fn precompiled_driver() -> DriverSpec {
        let mut driver = driver_spec("nvcr.io/nvidia", "driver", "550.54.15");
        driver.use_precompiled = Some(true);
        driver
    }

    #[test]
    fn test_same_kernel_gives_one_variant() {
        let facts = facts(vec![
            node_fact("gpu-a", "5.15.0-91-generic", "ubuntu", "22.04"),
            node_fact("gpu-b", "5.15.0-91-generic", "ubuntu", "22.04"),
        ]);
        let variants = driver_variants("nvidia-driver-daemonset", &precompiled_driver(), None, &facts).unwrap();
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].image, "nvcr.io/nvidia/driver:550.54.15-5.15.0-91-generic-ubuntu22.04");
        assert_eq!(variants[0].kernel.as_deref(), Some("5.15.0-91-generic"));
        assert_eq!(variants[0].name, "nvidia-driver-daemonset-5.15.0-91-generic-ubuntu22.04");
    }

    #[test]
    fn test_different_kernels_give_two_variants() {
        let facts = facts(vec![
            node_fact("gpu-a", "5.15.0-91-generic", "ubuntu", "22.04"),
            node_fact("gpu-b", "5.15.0-105-generic", "ubuntu", "22.04"),
            node_fact("gpu-c", "5.15.0-91-generic", "ubuntu", "22.04"),
        ]);
        let partitions = facts.kernel_partitions();
        assert_eq!(partitions.len(), 2);
        assert_eq!(partitions["5.15.0-91-generic"].nodes.len(), 2);

        let variants = driver_variants("nvidia-driver-daemonset", &precompiled_driver(), None, &facts).unwrap();
        assert_eq!(variants.len(), 2);
        assert_ne!(variants[0].name, variants[1].name);
    }

    #[test]
    fn test_default_mode_is_single_workload_tagged_by_os() {
        let facts = facts(vec![
            node_fact("gpu-a", "5.15.0-91-generic", "ubuntu", "22.04"),
            node_fact("gpu-b", "5.15.0-105-generic", "ubuntu", "22.04"),
        ]);
        let driver = driver_spec("nvcr.io/nvidia", "driver", "550.54.15");
        let variants = driver_variants("nvidia-driver-daemonset", &driver, None, &facts).unwrap();
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].name, "nvidia-driver-daemonset");
        assert_eq!(variants[0].image, "nvcr.io/nvidia/driver:550.54.15-ubuntu22.04");
        assert_eq!(variants[0].kernel, None);
    }

    #[test]
    fn test_digest_ignores_os_suffix() {
        let facts = facts(vec![node_fact("gpu-a", "5.14.0-284.el9.x86_64", "rhel", "9.2")]);
        let driver = driver_spec("nvcr.io/nvidia", "driver", "sha256:abc123");
        let variants = driver_variants("nvidia-driver-daemonset", &driver, None, &facts).unwrap();
        assert_eq!(variants[0].image, "nvcr.io/nvidia/driver@sha256:abc123");
    }

    #[test]
    fn test_precompiled_digest_is_config_error() {
        let facts = facts(vec![node_fact("gpu-a", "5.15.0-91-generic", "ubuntu", "22.04")]);
        let mut driver = driver_spec("nvcr.io/nvidia", "driver", "sha256:abc123");
        driver.use_precompiled = Some(true);
        let err = driver_variants("nvidia-driver-daemonset", &driver, None, &facts).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(_)));
    }

    #[test]
    fn test_no_gpu_nodes_gives_no_variant() {
        let driver = driver_spec("nvcr.io/nvidia", "driver", "550.54.15");
        let variants = driver_variants("nvidia-driver-daemonset", &driver, None, &EnvironmentFacts::default()).unwrap();
        assert!(variants.is_empty());
    }

    #[test]
    fn test_variant_names_are_dns_safe() {
        let name = variant_name("nvidia-driver-daemonset", "4.18.0-372.9.1.el8_6.X86_64", "rhel8.6");
        assert!(name.len() <= 63);
        assert!(name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.'));
        assert!(!name.ends_with('-'));
        assert_eq!(kernel_label_value("5.15.0-91-generic"), "5.15.0-91-generic");
    }

    #[test]
    fn test_long_kernels_sharing_a_prefix_get_distinct_names() {
        let facts = facts(vec![
            node_fact("gpu-a", "4.18.0-372.9.1.rt7.166.el8.x86_64-custom-build-a", "rhel", "8.6"),
            node_fact("gpu-b", "4.18.0-372.9.1.rt7.166.el8.x86_64-custom-build-b", "rhel", "8.6"),
        ]);
        let variants = driver_variants("nvidia-driver-daemonset", &precompiled_driver(), None, &facts).unwrap();
        assert_eq!(variants.len(), 2);
        assert_ne!(variants[0].name, variants[1].name);
        for variant in &variants {
            assert!(variant.name.len() <= 63, "{}", variant.name);
            assert!(variant.name.starts_with("nvidia-driver-daemonset-4.18.0-372.9.1"));
            assert!(!variant.name.ends_with('-'));
        }

        let again = driver_variants("nvidia-driver-daemonset", &precompiled_driver(), None, &facts).unwrap();
        assert_eq!(again[0].name, variants[0].name, "names are stable across passes");
    }
}
