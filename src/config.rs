use crate::grades::Semester;
use std::path::PathBuf;

pub const DEFAULT_LOG_FILTER: &str = "info";
pub const DEFAULT_ACADEMIC_YEAR: &str = "2024/2025";

#[derive(Debug, Clone)]
pub struct Config {
    pub workspace: Option<PathBuf>,
    pub log_filter: String,
    pub default_semester: Semester,
    pub default_academic_year: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: None,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            default_semester: Semester::Ganjil,
            default_academic_year: DEFAULT_ACADEMIC_YEAR.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut cfg = Self::default();
        cfg.workspace = get("RAPORD_WORKSPACE").map(PathBuf::from);
        if let Some(filter) = get("RAPORD_LOG") {
            cfg.log_filter = filter;
        }
        if let Some(raw) = get("RAPORD_DEFAULT_SEMESTER") {
            cfg.default_semester = Semester::parse(&raw).ok_or_else(|| {
                anyhow::anyhow!("RAPORD_DEFAULT_SEMESTER must be Ganjil or Genap, got {raw:?}")
            })?;
        }
        if let Some(year) = get("RAPORD_DEFAULT_ACADEMIC_YEAR") {
            cfg.default_academic_year = year;
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn empty_environment_uses_form_defaults() {
        let cfg = Config::from_lookup(lookup_from(&[])).expect("config");
        assert!(cfg.workspace.is_none());
        assert_eq!(cfg.log_filter, "info");
        assert_eq!(cfg.default_semester, Semester::Ganjil);
        assert_eq!(cfg.default_academic_year, "2024/2025");
    }

    #[test]
    fn overrides_are_trimmed_and_applied() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("RAPORD_WORKSPACE", " /tmp/rapor "),
            ("RAPORD_LOG", "rapord=debug"),
            ("RAPORD_DEFAULT_SEMESTER", "genap"),
            ("RAPORD_DEFAULT_ACADEMIC_YEAR", "2025/2026"),
        ]))
        .expect("config");
        assert_eq!(cfg.workspace, Some(PathBuf::from("/tmp/rapor")));
        assert_eq!(cfg.log_filter, "rapord=debug");
        assert_eq!(cfg.default_semester, Semester::Genap);
        assert_eq!(cfg.default_academic_year, "2025/2026");
    }

    #[test]
    fn blank_values_count_as_unset() {
        let cfg = Config::from_lookup(lookup_from(&[("RAPORD_LOG", "   ")])).expect("config");
        assert_eq!(cfg.log_filter, "info");
    }

    #[test]
    fn unknown_semester_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[("RAPORD_DEFAULT_SEMESTER", "Summer")]))
            .expect_err("bad semester");
        assert!(err.to_string().contains("Summer"));
    }
}
