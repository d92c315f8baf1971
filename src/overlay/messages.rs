use crate::overlay::model::{HistoryEntry, SceneId};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Procedures broadcast to every privileged client. Only the responsible
/// authority acts on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "procedure", content = "payload", rename_all = "camelCase")]
pub enum HistoryRpc {
    CommitHistory { scene: SceneId, entry: HistoryEntry },
    ResetHistory { scene: SceneId },
    StepBackHistory { scene: SceneId, steps: usize },
}

impl HistoryRpc {
    pub fn procedure(&self) -> &'static str {
        match self {
            Self::CommitHistory { .. } => "commitHistory",
            Self::ResetHistory { .. } => "resetHistory",
            Self::StepBackHistory { .. } => "stepBackHistory",
        }
    }

    pub fn scene(&self) -> &SceneId {
        match self {
            Self::CommitHistory { scene, .. }
            | Self::ResetHistory { scene }
            | Self::StepBackHistory { scene, .. } => scene,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).with_context(|| format!("encode {} rpc", self.procedure()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("decode history rpc")
    }
}
