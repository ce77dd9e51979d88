use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::schema::BenchmarkSpec;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Profile {
    Quick,
    Full,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Quick => "quick",
            Profile::Full => "full",
        }
    }

    /// Repetitions of the looping benchmarks.
    pub fn full_passes(&self) -> usize {
        match self {
            Profile::Quick => 1,
            Profile::Full => 3,
        }
    }

    /// Repetitions of the start-up-only benchmarks.
    pub fn fast_passes(&self) -> usize {
        match self {
            Profile::Quick => 2,
            Profile::Full => 5,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BenchConfig {
    pub profile: Profile,
    pub full_passes: usize,
    pub fast_passes: usize,
    /// Loop count for the kernel benchmark; `None` skips it.
    pub kernel_loops: Option<u64>,
    pub cpu_sweep: bool,
    pub count_events: bool,
    pub seed: u64,
}

impl BenchConfig {
    pub fn new(profile: Profile) -> Self {
        Self {
            profile,
            full_passes: profile.full_passes(),
            fast_passes: profile.fast_passes(),
            kernel_loops: Some(1_000_000),
            cpu_sweep: true,
            count_events: false,
            seed: 0,
        }
    }

    pub fn passes(&self, group: PassGroup) -> usize {
        match group {
            PassGroup::Full => self.full_passes,
            PassGroup::Fast => self.fast_passes,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassGroup {
    Full,
    Fast,
}

/// A named benchmark and how often it is repeated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteEntry {
    pub name: String,
    pub group: PassGroup,
    #[serde(flatten)]
    pub spec: BenchmarkSpec,
}

impl SuiteEntry {
    pub fn new(name: &str, group: PassGroup, spec: BenchmarkSpec) -> Self {
        Self {
            name: name.to_string(),
            group,
            spec,
        }
    }
}

/// The stock suite: three looping benchmarks measuring per-event cost, then
/// the same pairs without a loop count measuring start-up cost only.
pub fn default_suite() -> Vec<SuiteEntry> {
    let basic = BenchmarkSpec::new("basic-benchmark", "basic-benchmark-ust");
    let sha2 = BenchmarkSpec::new("sha2-benchmark", "sha2-benchmark-ust");
    let gen_tp = BenchmarkSpec::new("basic-benchmark", "basic-benchmark-gen-tp");

    vec![
        SuiteEntry::new("basic", PassGroup::Full, basic.clone().with_loops(10_000_000)),
        SuiteEntry::new("sha2", PassGroup::Full, sha2.clone().with_loops(1_000_000)),
        SuiteEntry::new(
            "gen-tp",
            PassGroup::Full,
            gen_tp.clone().with_loops(1_000_000).with_tp_per_loop(16),
        ),
        SuiteEntry::new("basic", PassGroup::Fast, basic),
        SuiteEntry::new("sha2", PassGroup::Fast, sha2),
        SuiteEntry::new("gen-tp", PassGroup::Fast, gen_tp),
    ]
}

/// Load a suite from a JSON array of entries.
pub fn load_suite<P: AsRef<Path>>(path: P) -> Result<Vec<SuiteEntry>> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn quick_profile_matches_stock_sweep() {
        let cfg = BenchConfig::new(Profile::Quick);
        assert_eq!(cfg.passes(PassGroup::Full), 1);
        assert_eq!(cfg.passes(PassGroup::Fast), 2);
        assert_eq!(cfg.profile.as_str(), "quick");
    }

    #[test]
    fn default_suite_shape() {
        let suite = default_suite();
        assert_eq!(suite.len(), 6);
        let gen_tp = &suite[2];
        assert_eq!(gen_tp.name, "gen-tp");
        assert_eq!(gen_tp.spec.nr_events(), Some(16_000_000));
        assert!(suite[3..].iter().all(|e| e.group == PassGroup::Fast && e.spec.nr_loops.is_none()));
    }

    #[test]
    fn suite_file_round_trips_through_flattened_spec() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("suite.json");
        fs::write(
            &path,
            r#"[{"name": "basic", "group": "full", "baseline": ["basic-benchmark"],
                 "ust": ["basic-benchmark-ust"], "nr_loops": 100, "tp_per_loop": 2}]"#,
        )
        .unwrap();

        let suite = load_suite(&path).unwrap();
        assert_eq!(
            suite,
            vec![SuiteEntry::new(
                "basic",
                PassGroup::Full,
                BenchmarkSpec::new("basic-benchmark", "basic-benchmark-ust")
                    .with_loops(100)
                    .with_tp_per_loop(2)
            )]
        );
    }
}
