use kibitz_protocol::UciCommand;
use serde::Serialize;

pub const MAX_MULTI_PV: u8 = 5;
pub const MIN_HASH_MB: u32 = 1;
pub const MAX_HASH_MB: u32 = 1024;
pub const MAX_SKILL_LEVEL: u8 = 20;
/// Ceiling for preset thread counts on constrained hosts.
pub const MAX_PRESET_THREADS: u32 = 4;

/// Search parameters applied to an engine when it starts and whenever the
/// configuration is replaced.
///
/// Values are clamped on construction, so a config that exists is always
/// in range. Sessions hold it behind an `Arc` and swap the whole value on
/// update; it is never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineConfig {
    multi_pv: u8,
    hash_mb: u32,
    threads: u32,
    max_depth: u32,
    skill_level: Option<u8>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            multi_pv: 1,
            hash_mb: 64,
            threads: 1,
            max_depth: 0,
            skill_level: None,
        }
    }
}

impl EngineConfig {
    pub fn new(multi_pv: u8, hash_mb: u32, threads: u32, max_depth: u32) -> Self {
        Self::default()
            .with_multi_pv(multi_pv)
            .with_hash_mb(hash_mb)
            .with_threads(threads)
            .with_max_depth(max_depth)
    }

    /// Analysis board on a phone or laptop: a few lines, moderate hash, at
    /// most half the cores.
    pub fn mobile(cores: usize) -> Self {
        Self::new(3, 64, half_cores(cores), 22)
    }

    /// Fast, shallow single-line evaluation.
    pub fn quick_eval(cores: usize) -> Self {
        Self::new(1, 16, half_cores(cores).min(2), 12)
    }

    /// A sparring opponent limited by the engine's skill setting and a
    /// shallow depth cap that grows with the level.
    pub fn play_at_level(level: u8, cores: usize) -> Self {
        let level = level.min(MAX_SKILL_LEVEL);
        Self::new(1, 16, half_cores(cores).min(2), 4 + u32::from(level) / 2)
            .with_skill_level(Some(level))
    }

    /// Background warm-up: unbounded depth so the first real search is not
    /// capped, threads sized from the host.
    pub fn prewarm(cores: usize) -> Self {
        Self::new(1, 64, half_cores(cores), 0)
    }

    /// Look up a preset by name. `level-N` selects [`EngineConfig::play_at_level`].
    pub fn preset(name: &str, cores: usize) -> Option<Self> {
        match name {
            "default" => Some(Self::default()),
            "mobile" => Some(Self::mobile(cores)),
            "quick-eval" => Some(Self::quick_eval(cores)),
            "prewarm" => Some(Self::prewarm(cores)),
            other => {
                let level = other.strip_prefix("level-")?.parse::<u8>().ok()?;
                (level <= MAX_SKILL_LEVEL).then(|| Self::play_at_level(level, cores))
            }
        }
    }

    #[must_use]
    pub fn with_multi_pv(mut self, multi_pv: u8) -> Self {
        self.multi_pv = multi_pv.clamp(1, MAX_MULTI_PV);
        self
    }

    #[must_use]
    pub fn with_hash_mb(mut self, hash_mb: u32) -> Self {
        self.hash_mb = hash_mb.clamp(MIN_HASH_MB, MAX_HASH_MB);
        self
    }

    #[must_use]
    pub fn with_threads(mut self, threads: u32) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// `0` means no depth cap.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    #[must_use]
    pub fn with_skill_level(mut self, skill_level: Option<u8>) -> Self {
        self.skill_level = skill_level.map(|level| level.min(MAX_SKILL_LEVEL));
        self
    }

    pub fn multi_pv(&self) -> u8 {
        self.multi_pv
    }

    pub fn hash_mb(&self) -> u32 {
        self.hash_mb
    }

    pub fn threads(&self) -> u32 {
        self.threads
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn skill_level(&self) -> Option<u8> {
        self.skill_level
    }

    /// The `setoption` commands that apply this config, one per field.
    pub fn option_commands(&self) -> Vec<UciCommand> {
        let mut commands = vec![
            UciCommand::set_option("MultiPV", self.multi_pv),
            UciCommand::set_option("Hash", self.hash_mb),
            UciCommand::set_option("Threads", self.threads),
        ];
        if let Some(level) = self.skill_level {
            commands.push(UciCommand::set_option("Skill Level", level));
        }
        commands
    }
}

fn half_cores(cores: usize) -> u32 {
    let half = u32::try_from(cores / 2).unwrap_or(u32::MAX);
    half.clamp(1, MAX_PRESET_THREADS)
}

#[derive(Debug, Clone, Serialize)]
pub struct PresetInfo {
    pub name: &'static str,
    pub description: &'static str,
}

const PRESETS: &[PresetInfo] = &[
    PresetInfo {
        name: "default",
        description: "Single line, 64 MB hash, one thread, unbounded depth",
    },
    PresetInfo {
        name: "mobile",
        description: "Three lines, 64 MB hash, half the cores, depth 22",
    },
    PresetInfo {
        name: "quick-eval",
        description: "Single line, 16 MB hash, depth 12",
    },
    PresetInfo {
        name: "prewarm",
        description: "Background warm-up: half the cores, unbounded depth",
    },
    PresetInfo {
        name: "level-N",
        description: "Sparring opponent at skill level N (0-20)",
    },
];

pub fn list_presets() -> &'static [PresetInfo] {
    PRESETS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_clamped() {
        let config = EngineConfig::new(9, 0, 0, 30);
        assert_eq!(config.multi_pv(), MAX_MULTI_PV);
        assert_eq!(config.hash_mb(), MIN_HASH_MB);
        assert_eq!(config.threads(), 1);
        assert_eq!(config.max_depth(), 30);

        let config = EngineConfig::default()
            .with_multi_pv(0)
            .with_hash_mb(1 << 20)
            .with_skill_level(Some(99));
        assert_eq!(config.multi_pv(), 1);
        assert_eq!(config.hash_mb(), MAX_HASH_MB);
        assert_eq!(config.skill_level(), Some(MAX_SKILL_LEVEL));
    }

    #[test]
    fn presets_size_threads_from_cores() {
        assert_eq!(EngineConfig::prewarm(1).threads(), 1);
        assert_eq!(EngineConfig::prewarm(4).threads(), 2);
        assert_eq!(EngineConfig::prewarm(64).threads(), MAX_PRESET_THREADS);
        assert_eq!(EngineConfig::prewarm(8).max_depth(), 0);
        assert_eq!(EngineConfig::quick_eval(16).threads(), 2);
        assert_eq!(EngineConfig::mobile(8).multi_pv(), 3);
    }

    #[test]
    fn play_at_level_sets_skill() {
        let config = EngineConfig::play_at_level(10, 8);
        assert_eq!(config.skill_level(), Some(10));
        assert_eq!(config.max_depth(), 9);
        assert_eq!(EngineConfig::play_at_level(40, 8).skill_level(), Some(20));
    }

    #[test]
    fn preset_lookup() {
        assert_eq!(EngineConfig::preset("default", 8), Some(EngineConfig::default()));
        assert_eq!(EngineConfig::preset("mobile", 8), Some(EngineConfig::mobile(8)));
        assert_eq!(
            EngineConfig::preset("level-5", 8),
            Some(EngineConfig::play_at_level(5, 8))
        );
        assert!(EngineConfig::preset("level-21", 8).is_none());
        assert!(EngineConfig::preset("level-x", 8).is_none());
        assert!(EngineConfig::preset("blitz", 8).is_none());
    }

    #[test]
    fn listed_presets_resolve() {
        for preset in list_presets() {
            let name = preset.name.replace('N', "3");
            assert!(EngineConfig::preset(&name, 4).is_some(), "{name}");
        }
    }

    #[test]
    fn option_commands_one_per_field() {
        let rendered: Vec<String> = EngineConfig::new(2, 128, 3, 0)
            .option_commands()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            rendered,
            vec![
                "setoption name MultiPV value 2",
                "setoption name Hash value 128",
                "setoption name Threads value 3",
            ]
        );

        let with_skill = EngineConfig::default().with_skill_level(Some(4));
        assert_eq!(
            with_skill.option_commands().last().map(ToString::to_string).as_deref(),
            Some("setoption name Skill Level value 4")
        );
    }
}
