/// Named API routes, relative to the base URL.
pub const ENDPOINTS: &[(&str, &str)] = &[
    ("health", "/api/health"),
    ("weight_analyze", "/api/weight/analyze"),
    ("weight_rules", "/api/weight/rules"),
    ("coarse_time_analyze", "/api/coarse_time/analyze"),
    ("fine_time_analyze", "/api/fine_time/analyze"),
    ("flight_material_analyze", "/api/flight_material/analyze"),
    ("adaptive_learning_analyze", "/api/adaptive_learning/analyze"),
];

pub fn endpoint_path(name: &str) -> Option<&'static str> {
    ENDPOINTS
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, path)| *path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_path() {
        assert_eq!(endpoint_path("health"), Some("/api/health"));
        assert_eq!(endpoint_path("weight_rules"), Some("/api/weight/rules"));
        assert_eq!(endpoint_path("Health"), None);
    }

    #[test]
    fn test_paths_are_absolute() {
        assert!(ENDPOINTS.iter().all(|(_, path)| path.starts_with("/api/")));
    }
}
