pub mod types;

pub use types::{
    ArtifactInfo, ArtifactKind, CompareResult, Differences, FieldDifference, UserProfile,
    Verification, VerificationId, VerificationStatus,
};
