use dirserve_core::policy::{Intent, Need, PolicyConfig};
use dirserve_core::{Error, Result};

use super::ResolvedPath;

/// Admission check applied to every resolved path before it reaches the filesystem.
#[derive(Debug, Clone, Copy)]
pub struct PolicyGate {
    policy: PolicyConfig,
}

impl PolicyGate {
    pub fn new(policy: PolicyConfig) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    pub fn admit(&self, path: &ResolvedPath, intent: Intent, need: Need) -> Result<()> {
        if intent == Intent::Write && self.policy.read_only {
            return Err(Error::PolicyDenied("server is read-only".to_string()));
        }
        if !self.policy.show_hidden
            && let Some(seg) = path.segments().iter().find(|seg| seg.starts_with('.'))
        {
            return Err(Error::PolicyDenied(format!("hidden segment {seg:?}")));
        }
        if !self.policy.show_symlinks && path.via_symlink() {
            return Err(Error::PolicyDenied(format!(
                "{path} goes through a symbolic link"
            )));
        }
        if need == Need::Existing && !path.exists() {
            return Err(Error::NotFound(path.to_string()));
        }
        Ok(())
    }
}
