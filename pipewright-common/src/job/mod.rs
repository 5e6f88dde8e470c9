mod compute;
mod descriptor;
mod schedule;

pub use compute::*;
pub use descriptor::*;
pub use schedule::*;

/// Identity and placement keys that only environment-scoped configuration may
/// provide. A job descriptor naming any of them is rejected.
pub const IDENTITY_FIELDS: [&str; 7] = [
    "project",
    "project_id",
    "region",
    "location",
    "service_account",
    "bucket",
    "gcp",
];

/// Parameter that selects the image in older descriptors; never forwarded as an argument.
pub const IMAGE_PARAMETER: &str = "image";
