use crate::CoreError;
use serde::Serialize;
use std::fmt;

/// Build progress of one environment, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStage {
    Uninitialized,
    LayoutComputed,
    SkeletonCopied,
    ShimWritten,
    ExecutableInstalled,
    AuxPackagesInstalled,
    ActivationWritten,
    Complete,
}

impl BuildStage {
    pub const ALL: [BuildStage; 8] = [
        BuildStage::Uninitialized,
        BuildStage::LayoutComputed,
        BuildStage::SkeletonCopied,
        BuildStage::ShimWritten,
        BuildStage::ExecutableInstalled,
        BuildStage::AuxPackagesInstalled,
        BuildStage::ActivationWritten,
        BuildStage::Complete,
    ];

    pub fn next(self) -> Option<BuildStage> {
        let idx = Self::ALL.iter().position(|s| *s == self)?;
        Self::ALL.get(idx + 1).copied()
    }
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::LayoutComputed => "layout_computed",
            Self::SkeletonCopied => "skeleton_copied",
            Self::ShimWritten => "shim_written",
            Self::ExecutableInstalled => "executable_installed",
            Self::AuxPackagesInstalled => "aux_packages_installed",
            Self::ActivationWritten => "activation_written",
            Self::Complete => "complete",
        };
        f.write_str(s)
    }
}

/// Stages only ever advance one step at a time.
pub fn validate_transition(from: BuildStage, to: BuildStage) -> Result<(), CoreError> {
    if from.next() == Some(to) {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
