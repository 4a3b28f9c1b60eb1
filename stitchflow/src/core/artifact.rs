//! Artifact roles and the snapshot of stitcher output images.

use super::CompletedRun;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Named output image written by the stitcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactRole {
    /// The equirectangular composite.
    Panorama,
    /// Cube face, -X.
    Left,
    /// Cube face, +X.
    Right,
    /// Cube face, +Y.
    Top,
    /// Cube face, -Y.
    Bottom,
    /// Cube face, +Z.
    Front,
    /// Cube face, -Z.
    Back,
}

impl ArtifactRole {
    /// Every role, composite first.
    pub const ALL: [Self; 7] = [
        Self::Panorama,
        Self::Left,
        Self::Right,
        Self::Top,
        Self::Bottom,
        Self::Front,
        Self::Back,
    ];

    /// The six cube faces.
    pub const FACES: [Self; 6] = [
        Self::Left,
        Self::Right,
        Self::Top,
        Self::Bottom,
        Self::Front,
        Self::Back,
    ];

    /// Returns the role name used as the response field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Panorama => "panorama",
            Self::Left => "left",
            Self::Right => "right",
            Self::Top => "top",
            Self::Bottom => "bottom",
            Self::Front => "front",
            Self::Back => "back",
        }
    }

    /// Returns the filename the stitcher writes for this role.
    ///
    /// Faces are derived from the composite's stem: `panorama_<face>.jpg`.
    #[must_use]
    pub fn file_name(self) -> String {
        match self {
            Self::Panorama => "panorama.jpg".to_string(),
            face => format!("panorama_{}.jpg", face.as_str()),
        }
    }
}

impl fmt::Display for ArtifactRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which artifacts to read after a successful run, and which of them must exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPlan {
    required: Vec<ArtifactRole>,
    optional: Vec<ArtifactRole>,
}

impl ArtifactPlan {
    /// Only the composite, which is required.
    #[must_use]
    pub fn composite_only() -> Self {
        Self {
            required: vec![ArtifactRole::Panorama],
            optional: Vec::new(),
        }
    }

    /// The composite plus all six faces.
    ///
    /// The composite is always required. Faces are required when
    /// `faces_required` is set, otherwise they are read if present.
    #[must_use]
    pub fn with_faces(faces_required: bool) -> Self {
        let mut required = vec![ArtifactRole::Panorama];
        let mut optional = Vec::new();
        if faces_required {
            required.extend(ArtifactRole::FACES);
        } else {
            optional.extend(ArtifactRole::FACES);
        }
        Self { required, optional }
    }

    /// Roles whose absence is a failure.
    #[must_use]
    pub fn required(&self) -> &[ArtifactRole] {
        &self.required
    }

    /// Roles read on a best-effort basis.
    #[must_use]
    pub fn optional(&self) -> &[ArtifactRole] {
        &self.optional
    }

    /// All roles in the plan.
    pub fn roles(&self) -> impl Iterator<Item = ArtifactRole> + '_ {
        self.required.iter().chain(self.optional.iter()).copied()
    }
}

/// Read-only snapshot of the images produced by one successful run.
#[derive(Debug, Clone)]
pub struct StitchArtifacts {
    images: BTreeMap<ArtifactRole, Vec<u8>>,
}

impl StitchArtifacts {
    /// Starts a snapshot. Requires the success proof of the run it belongs to.
    pub(crate) fn for_run(_run: &CompletedRun) -> Self {
        Self {
            images: BTreeMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, role: ArtifactRole, bytes: Vec<u8>) {
        self.images.insert(role, bytes);
    }

    /// Raw bytes for a role.
    #[must_use]
    pub fn get(&self, role: ArtifactRole) -> Option<&[u8]> {
        self.images.get(&role).map(Vec::as_slice)
    }

    /// Base64 (standard alphabet, padded) encoding of a role's bytes.
    #[must_use]
    pub fn encoded(&self, role: ArtifactRole) -> Option<String> {
        self.get(role).map(|bytes| STANDARD.encode(bytes))
    }

    /// Roles present in the snapshot.
    pub fn roles(&self) -> impl Iterator<Item = ArtifactRole> + '_ {
        self.images.keys().copied()
    }

    /// Number of artifacts read.
    #[must_use]
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Returns true when nothing was read.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Total bytes across all artifacts.
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.images.values().map(Vec::len).sum()
    }
}
