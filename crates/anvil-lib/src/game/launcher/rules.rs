/// Platform rule evaluation for libraries and argument tokens
use crate::game::installer::types::{Arch, Platform};
use crate::game::launcher::version_parser::{Rule, RuleAction};
use regex::Regex;
use std::collections::HashMap;

/// Enabled state of optional launcher features (`is_demo_user`, `has_custom_resolution`...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureSet {
    enabled: HashMap<String, bool>,
}

impl FeatureSet {
    /// No optional feature is enabled.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, enabled: bool) -> Self {
        self.enabled.insert(name.into(), enabled);
        self
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.get(name).copied().unwrap_or(false)
    }
}

/// Whether a rule list permits the host. Empty list allows; otherwise the last
/// matching rule decides and no match means disallow.
pub fn allowed(rules: &[Rule], platform: &Platform) -> bool {
    allowed_with_features(rules, platform, &FeatureSet::none())
}

pub fn allowed_with_features(rules: &[Rule], platform: &Platform, features: &FeatureSet) -> bool {
    if rules.is_empty() {
        return true;
    }

    let mut allow = false;
    for rule in rules {
        if rule_matches(rule, platform, features) {
            allow = rule.action == RuleAction::Allow;
        }
    }
    allow
}

/// Optional rule list as carried by libraries.
pub fn allowed_opt(rules: Option<&Vec<Rule>>, platform: &Platform) -> bool {
    rules.map(|r| allowed(r, platform)).unwrap_or(true)
}

fn rule_matches(rule: &Rule, platform: &Platform, features: &FeatureSet) -> bool {
    if let Some(ref os_rule) = rule.os {
        if let Some(ref os_name) = os_rule.name {
            if os_name != platform.os.as_str() {
                return false;
            }
        }

        if let Some(ref arch) = os_rule.arch {
            if normalize_arch(arch) != Some(platform.arch) {
                return false;
            }
        }

        if let Some(ref version_expr) = os_rule.version {
            match Regex::new(version_expr) {
                Ok(re) if re.is_match(&platform.os_version) => {}
                Ok(_) => return false,
                Err(e) => {
                    log::warn!("Ignoring rule with invalid os.version {:?}: {}", version_expr, e);
                    return false;
                }
            }
        }
    }

    if let Some(ref required) = rule.features {
        for (name, state) in required {
            if features.is_enabled(name) != *state {
                return false;
            }
        }
    }

    true
}

fn normalize_arch(arch: &str) -> Option<Arch> {
    match arch.to_ascii_lowercase().as_str() {
        "x86_64" | "x64" | "amd64" => Some(Arch::X64),
        "x86" | "i386" | "i686" => Some(Arch::X86),
        "arm64" | "aarch64" => Some(Arch::Arm64),
        "arm32" | "arm" => Some(Arch::Arm32),
        _ => None,
    }
}
